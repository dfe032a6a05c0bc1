use crate::error::Result;
use crate::shared::CacheShared;
use crate::snapshot::CacheSnapshot;
use crate::{AsyncCache, MetricsSnapshot};

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

/// A thread-safe, blocking refresh-ahead cache.
///
/// Cloning is cheap; clones share the same entries, loader and background
/// tasks. The background flusher stops when the last clone is dropped.
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> fmt::Debug for Cache<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Converts this `Cache` into an `AsyncCache` over the same entries.
  /// This is a zero-cost conversion.
  pub fn to_async(&self) -> AsyncCache<K, V, H> {
    AsyncCache {
      shared: self.shared.clone(),
    }
  }

  /// Returns the value for `key`, loading it on a miss.
  ///
  /// - A fresh entry is returned as is.
  /// - A stale entry is returned as is, and a single background refresh is
  ///   started for it unless one is already running. This never waits for the
  ///   loader.
  /// - A missing key is loaded on the calling thread. The value is cached and
  ///   returned; a loader error is returned as [`Error::Load`] and nothing is
  ///   cached.
  ///
  /// Concurrent misses on the same key each call the loader.
  ///
  /// [`Error::Load`]: crate::Error::Load
  pub fn get(&self, key: &K) -> Result<Arc<V>> {
    if let Some(value) = CacheShared::read(&self.shared, key) {
      return Ok(value);
    }

    let outcome = self.shared.loader.load_blocking(key);
    let value = self.shared.settle_load(outcome)?;
    Ok(self.shared.add(key.clone(), value))
  }

  /// Returns the cached value for `key` without loading, refreshing, or
  /// touching the metrics. Stale values are returned too.
  pub fn peek(&self, key: &K) -> Option<Arc<V>> {
    self.shared.store.get(key).map(|entry| entry.value())
  }

  /// Sets `key` to `value`, replacing any existing entry. The entry is fresh
  /// from now on.
  pub fn add(&self, key: K, value: V) {
    self.shared.add(key, value);
  }

  /// Removes `key`, returning whether it was present.
  ///
  /// A refresh already running for the key is not cancelled; when it
  /// completes it adds the key back.
  pub fn remove(&self, key: &K) -> bool {
    let removed = self.shared.store.remove(key).is_some();
    self.shared.record_removal(usize::from(removed));
    removed
  }

  /// Removes every entry.
  pub fn clear(&self) {
    let removed = self.shared.store.clear();
    self.shared.record_removal(removed);
  }

  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.store.contains_key(key)
  }

  /// The number of entries, stale ones included.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn lifetime(&self) -> Duration {
    self.shared.lifetime
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Writes a snapshot to the configured target now, on the calling thread.
  ///
  /// Returns [`Error::SnapshotDisabled`](crate::Error::SnapshotDisabled) if
  /// the cache was built without one.
  pub fn flush(&self) -> Result<()> {
    self.shared.flush()
  }

  /// Returns a point-in-time copy of every entry.
  pub fn to_snapshot(&self) -> CacheSnapshot<K, V> {
    self.shared.to_snapshot()
  }
}
