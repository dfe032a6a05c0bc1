use crate::entry::CacheEntry;
use crate::error::Error;
use crate::loader::{BoxError, Loader};
use crate::metrics::Metrics;
use crate::snapshot::CacheSnapshot;
use crate::store::Store;
use crate::task::flusher::{Flusher, FlusherContext};
use crate::{time, TaskSpawner};

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, thread};

/// The internal, thread-safe core of the cache, shared by every handle and
/// by in-flight refresh tasks.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: Arc<Store<K, V, H>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) lifetime: Duration,
  pub(crate) loader: Loader<K, V>,
  pub(crate) spawner: Option<Arc<dyn TaskSpawner>>,
  /// Present when a snapshot target is configured.
  pub(crate) flush_context: Option<FlusherContext<K, V, H>>,
  pub(crate) flusher: Option<Flusher>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("len", &self.store.len())
      .field("lifetime", &self.lifetime)
      .field("async_loader", &self.loader.is_async())
      .field("persistent", &self.flush_context.is_some())
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  // The last reference may be released by a refresh task, so this can run on
  // an async executor thread and block it until the flusher is joined.
  fn drop(&mut self) {
    if let Some(flusher) = self.flusher.take() {
      flusher.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// The lock-scoped half of a read: returns the cached value, fresh or
  /// stale, or `None` on a miss.
  ///
  /// On a stale hit the caller that wins the entry's `Ready -> Updating`
  /// transition launches the one background refresh for it. Everyone else,
  /// winner included, gets the stale value back without waiting.
  pub(crate) fn read(shared: &Arc<Self>, key: &K) -> Option<Arc<V>> {
    let Some(entry) = shared.store.get(key) else {
      Metrics::incr(&shared.metrics.misses);
      return None;
    };

    if entry.is_stale(shared.lifetime, time::now_millis()) {
      Metrics::incr(&shared.metrics.stale_hits);
      if entry.try_begin_refresh() {
        Self::spawn_refresh(Arc::clone(shared), key.clone(), entry.clone());
      }
    } else {
      Metrics::incr(&shared.metrics.hits);
    }

    Some(entry.value())
  }

  /// Upserts `value`, returning the shared handle to it.
  pub(crate) fn add(&self, key: K, value: V) -> Arc<V> {
    let value = Arc::new(value);
    self
      .store
      .insert(key, Arc::new(CacheEntry::new(value.clone())));
    Metrics::incr(&self.metrics.inserts);
    value
  }

  pub(crate) async fn add_async(&self, key: K, value: V) -> Arc<V> {
    let value = Arc::new(value);
    self
      .store
      .insert_async(key, Arc::new(CacheEntry::new(value.clone())))
      .await;
    Metrics::incr(&self.metrics.inserts);
    value
  }

  /// Records the outcome of a miss-path load.
  pub(crate) fn settle_load(&self, outcome: Result<V, BoxError>) -> Result<V, Error> {
    Metrics::incr(&self.metrics.loads);
    outcome.map_err(|error| {
      Metrics::incr(&self.metrics.load_failures);
      Error::Load(error)
    })
  }

  pub(crate) fn record_removal(&self, removed: usize) {
    if removed > 0 {
      self
        .metrics
        .removals
        .fetch_add(removed as u64, std::sync::atomic::Ordering::Relaxed);
    }
  }

  /// Writes a snapshot now, on the calling thread.
  pub(crate) fn flush(&self) -> Result<(), Error> {
    let context = self.flush_context.as_ref().ok_or(Error::SnapshotDisabled)?;
    let entries = context.flush()?;
    tracing::debug!(entries, "cache snapshot written on demand");
    Ok(())
  }

  pub(crate) fn to_snapshot(&self) -> CacheSnapshot<K, V> {
    CacheSnapshot::capture(&self.store)
  }

  /// Runs the loader for `key` in the background and settles `entry`, which
  /// the caller has already moved to `Updating`.
  ///
  /// A sync loader gets its own thread; an async loader is handed to the
  /// configured spawner. Storing the new value replaces the entry, which is
  /// what resets the key to `Ready`. Any other ending (loader error, panic,
  /// a task dropped before completion) resets the won entry through its
  /// [`RefreshGuard`], so the stale value keeps serving and the next stale
  /// read retries.
  fn spawn_refresh(shared: Arc<Self>, key: K, entry: Arc<CacheEntry<V>>) {
    Metrics::incr(&shared.metrics.refreshes);
    tracing::debug!("stale entry, dispatching background refresh");
    let guard = RefreshGuard::new(entry, Arc::clone(&shared.metrics));

    match shared.loader.clone() {
      Loader::Sync(load) => {
        let spawned = thread::Builder::new()
          .name("fibre-refresh-loader".into())
          .spawn(move || match load(&key) {
            Ok(value) => {
              shared.add(key, value);
              guard.complete();
            }
            Err(error) => guard.fail(&error),
          });
        // On failure the closure, and the guard with it, has been dropped.
        if let Err(error) = spawned {
          tracing::error!(%error, "failed to spawn refresh thread");
        }
      }
      Loader::Async(load) => {
        // The builder refuses async loaders without a spawner.
        let Some(spawner) = shared.spawner.clone() else {
          return;
        };
        spawner.spawn(Box::pin(async move {
          match load(key.clone()).await {
            Ok(value) => {
              shared.add_async(key, value).await;
              guard.complete();
            }
            Err(error) => guard.fail(&error),
          }
        }));
      }
    }
  }
}

/// Owns a won `Ready -> Updating` transition until the refresh ends.
///
/// Unless [`complete`](Self::complete) is called, dropping the guard puts the
/// entry back to `Ready` and counts a refresh failure. Unwinding out of a
/// panicking loader drops it too.
struct RefreshGuard<V> {
  entry: Arc<CacheEntry<V>>,
  metrics: Arc<Metrics>,
  completed: bool,
  reported: bool,
}

impl<V> RefreshGuard<V> {
  fn new(entry: Arc<CacheEntry<V>>, metrics: Arc<Metrics>) -> Self {
    Self {
      entry,
      metrics,
      completed: false,
      reported: false,
    }
  }

  /// The replacement entry is stored; nothing to reset.
  fn complete(mut self) {
    self.completed = true;
    tracing::debug!("background refresh completed");
  }

  fn fail(mut self, error: &BoxError) {
    self.reported = true;
    tracing::warn!(%error, "background refresh failed, keeping stale value");
  }
}

impl<V> Drop for RefreshGuard<V> {
  fn drop(&mut self) {
    if self.completed {
      return;
    }
    self.entry.abandon_refresh();
    Metrics::incr(&self.metrics.refresh_failures);
    if !self.reported {
      tracing::warn!("background refresh ended without a value, keeping stale value");
    }
  }
}
