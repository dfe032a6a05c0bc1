use crate::error::Result;
use crate::shared::CacheShared;
use crate::snapshot::CacheSnapshot;
use crate::{Cache, MetricsSnapshot};

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

/// A thread-safe, asynchronous refresh-ahead cache.
///
/// Writes wait for the store lock without blocking the executor. Reads hold
/// the lock only long enough to clone an `Arc` and never await.
pub struct AsyncCache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> fmt::Debug for AsyncCache<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncCache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> Clone for AsyncCache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<K, V, H> AsyncCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Converts this `AsyncCache` into a blocking `Cache` over the same
  /// entries. This is a zero-cost conversion.
  ///
  /// The resulting handle still refreshes through the async loader in the
  /// background, but its misses are reported as load errors, since a blocking
  /// caller cannot drive the loader.
  pub fn to_sync(&self) -> Cache<K, V, H> {
    Cache {
      shared: self.shared.clone(),
    }
  }

  /// Returns the value for `key`, loading it on a miss.
  ///
  /// Behaves like [`Cache::get`]; the miss path awaits the loader.
  pub async fn get(&self, key: &K) -> Result<Arc<V>> {
    if let Some(value) = CacheShared::read(&self.shared, key) {
      return Ok(value);
    }

    let outcome = self.shared.loader.load(key).await;
    let value = self.shared.settle_load(outcome)?;
    Ok(self.shared.add_async(key.clone(), value).await)
  }

  /// Returns the cached value for `key` without loading or refreshing.
  pub fn peek(&self, key: &K) -> Option<Arc<V>> {
    self.shared.store.get(key).map(|entry| entry.value())
  }

  pub async fn add(&self, key: K, value: V) {
    self.shared.add_async(key, value).await;
  }

  /// Removes `key`, returning whether it was present.
  pub async fn remove(&self, key: &K) -> bool {
    let removed = self.shared.store.remove_async(key).await.is_some();
    self.shared.record_removal(usize::from(removed));
    removed
  }

  pub async fn clear(&self) {
    let removed = self.shared.store.clear_async().await;
    self.shared.record_removal(removed);
  }

  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.store.contains_key(key)
  }

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

  /// Writes a snapshot now.
  ///
  /// Encoding and I/O run on the calling task; call this from a blocking
  /// context if the snapshot is large.
  pub fn flush(&self) -> Result<()> {
    self.shared.flush()
  }

  pub fn to_snapshot(&self) -> CacheSnapshot<K, V> {
    self.shared.to_snapshot()
  }
}
