use crate::config::{CacheConfig, DEFAULT_LIFETIME};
use crate::error::BuildError;
use crate::handles::{AsyncCache, Cache};
use crate::loader::{BoxError, Loader};
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::snapshot::{CacheSnapshot, FileTarget, JsonCodec, Persistence, SnapshotCodec, SnapshotTarget};
use crate::store::Store;
use crate::task::flusher::{Flusher, FlusherContext};
use crate::TaskSpawner;

use core::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A builder for creating `Cache` and `AsyncCache` instances.
///
/// A loader is mandatory; everything else has a default. Persistence is off
/// unless a snapshot file or target is set.
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  lifetime: Duration,
  flush_interval: Duration,
  hasher: H,
  loader: Option<Loader<K, V>>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  persistence: Option<Persistence<K, V>>,
}

impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("lifetime", &self.lifetime)
      .field("flush_interval", &self.flush_interval)
      .field("has_loader", &self.loader.is_some())
      .field("has_spawner", &self.spawner.is_some())
      .field("persistent", &self.persistence.is_some())
      .finish_non_exhaustive()
  }
}

// --- Default Constructor ---
impl<K, V> CacheBuilder<K, V, ahash::RandomState> {
  /// Creates a new `CacheBuilder` with default settings: a 60 second
  /// lifetime, no persistence and no loader. Use [`hasher`](Self::hasher) to
  /// swap the hasher.
  pub fn new() -> Self {
    Self {
      lifetime: DEFAULT_LIFETIME,
      flush_interval: Duration::ZERO,
      hasher: ahash::RandomState::new(),
      loader: None,
      spawner: None,
      persistence: None,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V> CacheBuilder<K, V, ahash::RandomState>
where
  K: Serialize + DeserializeOwned + Eq + Hash + 'static,
  V: Serialize + DeserializeOwned + 'static,
{
  /// Creates a builder pre-populated from externally supplied settings.
  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new().config(config)
  }
}

// --- General Configuration Methods ---
impl<K, V, H> CacheBuilder<K, V, H> {
  /// How long after being set an entry is served as fresh. Once older, reads
  /// still return it but trigger a background refresh.
  pub fn lifetime(mut self, lifetime: Duration) -> Self {
    self.lifetime = lifetime;
    self
  }

  /// How often the whole cache is written to the snapshot target. Zero, the
  /// default, disables periodic snapshots; `flush()` still works.
  pub fn flush_interval(mut self, interval: Duration) -> Self {
    self.flush_interval = interval;
    self
  }

  /// Sets the hasher for the cache's map.
  pub fn hasher<H2: BuildHasher>(self, hasher: H2) -> CacheBuilder<K, V, H2> {
    CacheBuilder {
      lifetime: self.lifetime,
      flush_interval: self.flush_interval,
      hasher,
      loader: self.loader,
      spawner: self.spawner,
      persistence: self.persistence,
    }
  }

  /// Sets the spawner used to run background refreshes of an async loader.
  ///
  /// Defaults to the Tokio runtime current at build time.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Persists the cache through a custom codec and storage target.
  pub fn snapshot_target<T, C>(mut self, target: T, codec: C) -> Self
  where
    T: SnapshotTarget + 'static,
    C: SnapshotCodec<K, V> + 'static,
  {
    self.persistence = Some(Persistence::new(Arc::new(codec), Arc::new(target)));
    self
  }
}

impl<K: 'static, V: 'static, H> CacheBuilder<K, V, H> {
  /// Sets the synchronous loader.
  ///
  /// It is called on the reading thread for a missing key, and on a fresh
  /// thread to refresh a stale one.
  pub fn loader<F, E>(mut self, f: F) -> Self
  where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
  {
    self.loader = Some(Loader::from_sync(f));
    self
  }

  /// Sets the asynchronous loader. Only an `AsyncCache` can be built with one.
  pub fn async_loader<F, Fut, E>(mut self, f: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    self.loader = Some(Loader::from_async(f));
    self
  }
}

impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Serialize + DeserializeOwned + Eq + Hash + 'static,
  V: Serialize + DeserializeOwned + 'static,
{
  /// Persists the cache as JSON in the file at `path`. An empty path disables
  /// persistence.
  ///
  /// The file is read once at build time; a missing or unreadable file yields
  /// an empty cache.
  pub fn snapshot_file(mut self, path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    self.persistence = if path.as_os_str().is_empty() {
      None
    } else {
      Some(Persistence::new(Arc::new(JsonCodec), Arc::new(FileTarget::new(path))))
    };
    self
  }

  /// Applies every setting in `config`.
  pub fn config(self, config: &CacheConfig) -> Self {
    let builder = self
      .lifetime(config.lifetime)
      .flush_interval(config.flush_interval);
    match config.snapshot_path() {
      Some(path) => builder.snapshot_file(path.clone()),
      None => builder,
    }
  }
}

// --- Build Methods ---
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Builds a blocking `Cache`. Fails if the loader is async.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate(false)?;
    let shared = self.build_shared_core(None)?;
    Ok(Cache { shared })
  }

  /// Builds an `AsyncCache`.
  pub fn build_async(self) -> Result<AsyncCache<K, V, H>, BuildError> {
    self.validate(true)?;
    let shared = self.build_shared_core(None)?;
    Ok(AsyncCache { shared })
  }

  /// Builds a `Cache` populated from `snapshot` instead of the snapshot
  /// target. A configured target is still used for writing.
  pub fn build_from_snapshot(self, snapshot: CacheSnapshot<K, V>) -> Result<Cache<K, V, H>, BuildError> {
    self.validate(false)?;
    let shared = self.build_shared_core(Some(snapshot))?;
    Ok(Cache { shared })
  }

  /// Async counterpart of [`build_from_snapshot`](Self::build_from_snapshot).
  pub fn build_from_snapshot_async(
    self,
    snapshot: CacheSnapshot<K, V>,
  ) -> Result<AsyncCache<K, V, H>, BuildError> {
    self.validate(true)?;
    let shared = self.build_shared_core(Some(snapshot))?;
    Ok(AsyncCache { shared })
  }

  fn validate(&self, for_async: bool) -> Result<(), BuildError> {
    match &self.loader {
      None => Err(BuildError::LoaderRequired),
      Some(loader) if loader.is_async() && !for_async => Err(BuildError::AsyncLoaderRequiresAsyncCache),
      Some(_) => Ok(()),
    }
  }

  /// Central logic to construct the shared core of the cache.
  fn build_shared_core(
    self,
    snapshot: Option<CacheSnapshot<K, V>>,
  ) -> Result<Arc<CacheShared<K, V, H>>, BuildError> {
    let loader = self.loader.ok_or(BuildError::LoaderRequired)?;
    let spawner = match self.spawner {
      Some(spawner) => Some(spawner),
      None if loader.is_async() => Some(default_spawner()?),
      None => None,
    };

    let store = Arc::new(Store::new(self.hasher));
    let metrics = Arc::new(Metrics::new());
    let persistence = self.persistence.map(Arc::new);

    // --- Populate from the given snapshot, or from the target ---
    let initial = match (snapshot, &persistence) {
      (Some(snapshot), _) => Some(snapshot),
      (None, Some(persistence)) => restore(persistence),
      (None, None) => None,
    };
    if let Some(snapshot) = initial {
      let restored = snapshot.len();
      store.extend(snapshot.into_entries());
      tracing::debug!(entries = restored, "cache populated from snapshot");
    }

    let flush_context = persistence.map(|persistence| FlusherContext {
      store: Arc::clone(&store),
      persistence,
      metrics: Arc::clone(&metrics),
    });

    let flusher = match &flush_context {
      Some(context) if !self.flush_interval.is_zero() => {
        match Flusher::spawn(context.clone(), self.flush_interval) {
          Ok(flusher) => Some(flusher),
          Err(error) => {
            tracing::error!(%error, "failed to spawn cache flusher, periodic snapshots disabled");
            None
          }
        }
      }
      _ => None,
    };

    Ok(Arc::new(CacheShared {
      store,
      metrics,
      lifetime: self.lifetime,
      loader,
      spawner,
      flush_context,
      flusher,
    }))
  }
}

fn restore<K, V>(persistence: &Persistence<K, V>) -> Option<CacheSnapshot<K, V>> {
  match persistence.restore() {
    Ok(Some(snapshot)) => Some(snapshot),
    Ok(None) => {
      tracing::debug!("no cache snapshot found, starting empty");
      None
    }
    Err(error) => {
      tracing::warn!(%error, "failed to restore cache snapshot, starting empty");
      None
    }
  }
}

fn default_spawner() -> Result<Arc<dyn TaskSpawner>, BuildError> {
  #[cfg(feature = "tokio")]
  {
    if let Some(spawner) = crate::runtime::TokioSpawner::try_current() {
      return Ok(Arc::new(spawner));
    }
  }
  Err(BuildError::SpawnerRequired)
}
