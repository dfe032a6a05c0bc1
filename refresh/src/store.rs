use crate::entry::CacheEntry;
use crate::sync::HybridRwLock;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

pub(crate) type EntryMap<K, V, H> = HashMap<K, Arc<CacheEntry<V>>, H>;

/// The key -> entry map, guarded by a single reader-writer lock.
///
/// Lookups hold the read lock only long enough to clone the entry's `Arc`;
/// everything done with the entry afterwards (staleness checks, the refresh
/// CAS) happens outside the lock.
pub(crate) struct Store<K, V, H> {
  map: HybridRwLock<EntryMap<K, V, H>>,
}

impl<K, V, H> fmt::Debug for Store<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Store")
      .field("len", &self.len())
      .finish()
  }
}

impl<K, V, H> Store<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  pub(crate) fn new(hasher: H) -> Self {
    Self {
      map: HybridRwLock::new(HashMap::with_hasher(hasher)),
    }
  }

  #[inline]
  pub(crate) fn get(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    self.map.read().get(key).cloned()
  }

  #[inline]
  pub(crate) fn contains_key(&self, key: &K) -> bool {
    self.map.read().contains_key(key)
  }

  pub(crate) fn len(&self) -> usize {
    self.map.read().len()
  }

  /// Installs `entry` under `key`, returning the entry it replaced.
  pub(crate) fn insert(&self, key: K, entry: Arc<CacheEntry<V>>) -> Option<Arc<CacheEntry<V>>> {
    self.map.write().insert(key, entry)
  }

  pub(crate) async fn insert_async(
    &self,
    key: K,
    entry: Arc<CacheEntry<V>>,
  ) -> Option<Arc<CacheEntry<V>>> {
    self.map.write_async().await.insert(key, entry)
  }

  pub(crate) fn remove(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    self.map.write().remove(key)
  }

  pub(crate) async fn remove_async(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    self.map.write_async().await.remove(key)
  }

  /// Removes every entry, returning how many there were.
  pub(crate) fn clear(&self) -> usize {
    let mut guard = self.map.write();
    let removed = guard.len();
    guard.clear();
    removed
  }

  pub(crate) async fn clear_async(&self) -> usize {
    let mut guard = self.map.write_async().await;
    let removed = guard.len();
    guard.clear();
    removed
  }

  /// Bulk-installs entries under a single write lock.
  pub(crate) fn extend<I>(&self, entries: I)
  where
    I: IntoIterator<Item = (K, Arc<CacheEntry<V>>)>,
  {
    self.map.write().extend(entries);
  }

  /// Maps every entry through `f` while holding the read lock.
  ///
  /// Writers are held off for the duration, so the result is a consistent
  /// point-in-time view. `f` should be cheap.
  pub(crate) fn collect<R, F>(&self, mut f: F) -> Vec<R>
  where
    F: FnMut(&K, &CacheEntry<V>) -> R,
  {
    let guard = self.map.read();
    guard.iter().map(|(key, entry)| f(key, entry)).collect()
  }
}
