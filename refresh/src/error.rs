use crate::loader::BoxError;

use std::io;

use thiserror::Error;

/// Errors returned by cache operations.
#[derive(Debug, Error)]
pub enum Error {
  /// The loader failed while populating a missing key. Nothing was cached,
  /// so the next read of the key calls the loader again.
  #[error("loader failed: {0}")]
  Load(#[source] BoxError),

  #[error("snapshot failed: {0}")]
  Snapshot(#[from] SnapshotError),

  /// `flush` was called on a cache built without a snapshot target.
  #[error("no snapshot target is configured")]
  SnapshotDisabled,
}

/// Errors raised while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot storage I/O failed: {0}")]
  Io(#[from] io::Error),

  #[error("failed to encode snapshot: {0}")]
  Encode(#[source] BoxError),

  #[error("failed to decode snapshot: {0}")]
  Decode(#[source] BoxError),
}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
  /// Every cache needs a loader to serve misses and refreshes.
  #[error("a loader must be configured")]
  LoaderRequired,
  /// A blocking `Cache` cannot drive an async loader. Use `build_async()`.
  #[error("an async loader can only be used with an AsyncCache")]
  AsyncLoaderRequiresAsyncCache,
  /// An async loader was provided, but no `TaskSpawner` was configured and no
  /// Tokio runtime was available to fall back on.
  #[error("an async loader requires a task spawner or a running Tokio runtime")]
  SpawnerRequired,
}

/// A specialized `Result` type for cache operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
