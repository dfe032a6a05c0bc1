use crate::metrics::Metrics;
use crate::snapshot::{CacheSnapshot, Persistence};
use crate::store::Store;

use std::hash::{BuildHasher, Hash};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Everything the flusher thread needs. It deliberately holds the store and
/// not the whole cache, so that dropping the last cache handle can stop it.
pub(crate) struct FlusherContext<K, V, H> {
  pub(crate) store: Arc<Store<K, V, H>>,
  pub(crate) persistence: Arc<Persistence<K, V>>,
  pub(crate) metrics: Arc<Metrics>,
}

impl<K, V, H> Clone for FlusherContext<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      persistence: Arc::clone(&self.persistence),
      metrics: Arc::clone(&self.metrics),
    }
  }
}

impl<K, V, H> FlusherContext<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  /// Captures and writes one snapshot, recording the outcome in the metrics.
  pub(crate) fn flush(&self) -> Result<usize, crate::error::SnapshotError> {
    let snapshot = CacheSnapshot::capture(&self.store);
    match self.persistence.write(&snapshot) {
      Ok(()) => {
        Metrics::incr(&self.metrics.snapshots_written);
        Ok(snapshot.len())
      }
      Err(e) => {
        Metrics::incr(&self.metrics.snapshot_failures);
        Err(e)
      }
    }
  }
}

#[derive(Default)]
struct StopSignal {
  stopped: Mutex<bool>,
  wake: Condvar,
}

/// The background thread that writes a snapshot every `interval`.
pub(crate) struct Flusher {
  handle: Option<JoinHandle<()>>,
  signal: Arc<StopSignal>,
}

impl Flusher {
  /// Spawns the flusher thread. The first snapshot is written one full
  /// `interval` after this call.
  pub(crate) fn spawn<K, V, H>(context: FlusherContext<K, V, H>, interval: Duration) -> io::Result<Self>
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Send + Sync + 'static,
  {
    let signal = Arc::new(StopSignal::default());
    let thread_signal = signal.clone();

    let handle = thread::Builder::new()
      .name("fibre-refresh-flusher".into())
      .spawn(move || {
        let mut stopped = thread_signal.stopped.lock();
        loop {
          match Instant::now().checked_add(interval) {
            Some(deadline) => {
              while !*stopped && !thread_signal.wake.wait_until(&mut stopped, deadline).timed_out() {}
            }
            // An interval too large to schedule never elapses.
            None => {
              while !*stopped {
                thread_signal.wake.wait(&mut stopped);
              }
            }
          }
          if *stopped {
            break;
          }

          MutexGuard::unlocked(&mut stopped, || match context.flush() {
            Ok(entries) => tracing::debug!(entries, "cache snapshot written"),
            Err(error) => tracing::error!(%error, "periodic cache snapshot failed"),
          });
        }
        tracing::debug!("cache flusher stopped");
      })?;

    Ok(Self {
      handle: Some(handle),
      signal,
    })
  }

  /// Signals the thread to exit and waits for it. A snapshot that is being
  /// written when this is called is allowed to finish.
  ///
  /// The join blocks the calling thread. This runs when the last cache
  /// reference drops, which can happen at the end of an async refresh task,
  /// so an executor worker may stall for the length of one snapshot write.
  pub(crate) fn stop(mut self) {
    *self.signal.stopped.lock() = true;
    self.signal.wake.notify_all();
    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        tracing::error!("cache flusher thread panicked");
      }
    }
  }
}
