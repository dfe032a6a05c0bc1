use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Reads ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) stale_hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Miss-path loads ---
  pub(crate) loads: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,

  // --- Background refreshes ---
  pub(crate) refreshes: CachePadded<AtomicU64>,
  pub(crate) refresh_failures: CachePadded<AtomicU64>,

  // --- Writes ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) removals: CachePadded<AtomicU64>,

  // --- Persistence ---
  pub(crate) snapshots_written: CachePadded<AtomicU64>,
  pub(crate) snapshot_failures: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      stale_hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      loads: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      refreshes: CachePadded::new(AtomicU64::new(0)),
      refresh_failures: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      removals: CachePadded::new(AtomicU64::new(0)),
      snapshots_written: CachePadded::new(AtomicU64::new(0)),
      snapshot_failures: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let stale_hits = self.stale_hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + stale_hits + misses;

    MetricsSnapshot {
      hits,
      stale_hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        (hits + stale_hits) as f64 / total_lookups as f64
      },
      loads: self.loads.load(Ordering::Relaxed),
      load_failures: self.load_failures.load(Ordering::Relaxed),
      refreshes: self.refreshes.load(Ordering::Relaxed),
      refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
      inserts: self.inserts.load(Ordering::Relaxed),
      removals: self.removals.load(Ordering::Relaxed),
      snapshots_written: self.snapshots_written.load(Ordering::Relaxed),
      snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Reads served from a fresh entry.
  pub hits: u64,
  /// Reads served from a stale entry (a refresh may have been started).
  pub stale_hits: u64,
  /// Reads that found no entry and had to call the loader.
  pub misses: u64,
  /// Share of reads answered from the cache, fresh or stale.
  pub hit_ratio: f64,
  /// Loader calls made on the miss path.
  pub loads: u64,
  /// Miss-path loader calls that returned an error.
  pub load_failures: u64,
  /// Background refreshes started.
  pub refreshes: u64,
  /// Background refreshes whose loader failed; the stale value was kept.
  pub refresh_failures: u64,
  /// Values stored, by `add`, a miss-path load or a successful refresh.
  pub inserts: u64,
  /// Entries removed by `remove` or `clear`.
  pub removals: u64,
  /// Snapshots successfully written to the target.
  pub snapshots_written: u64,
  /// Snapshot writes that failed.
  pub snapshot_failures: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("stale_hits", &self.stale_hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("loads", &self.loads)
      .field("load_failures", &self.load_failures)
      .field("refreshes", &self.refreshes)
      .field("refresh_failures", &self.refresh_failures)
      .field("inserts", &self.inserts)
      .field("removals", &self.removals)
      .field("snapshots_written", &self.snapshots_written)
      .field("snapshot_failures", &self.snapshot_failures)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
