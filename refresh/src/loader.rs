use crate::error::BuildError;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// The error type loaders report. Any `E: Into<BoxError>` is accepted at the
/// builder and boxed once.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) type SyncLoadFn<K, V> = dyn Fn(&K) -> Result<V, BoxError> + Send + Sync;
pub(crate) type AsyncLoadFn<K, V> =
  dyn Fn(K) -> BoxFuture<'static, Result<V, BoxError>> + Send + Sync;

/// The user-supplied function that (re)populates a key.
///
/// It is called on a miss by the reading caller and on a stale hit by a
/// background refresh task, so it must be safe to call concurrently. The cache
/// applies no timeout or retry of its own.
pub(crate) enum Loader<K, V> {
  Sync(Arc<SyncLoadFn<K, V>>),
  Async(Arc<AsyncLoadFn<K, V>>),
}

impl<K, V> Clone for Loader<K, V> {
  fn clone(&self) -> Self {
    match self {
      Loader::Sync(f) => Loader::Sync(f.clone()),
      Loader::Async(f) => Loader::Async(f.clone()),
    }
  }
}

impl<K: 'static, V: 'static> Loader<K, V> {
  pub(crate) fn from_sync<F, E>(f: F) -> Self
  where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
  {
    Loader::Sync(Arc::new(move |key: &K| -> Result<V, BoxError> {
      f(key).map_err(Into::into)
    }))
  }

  pub(crate) fn from_async<F, Fut, E>(f: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
  {
    Loader::Async(Arc::new(move |key: K| {
      let fut = f(key);
      Box::pin(async move { fut.await.map_err(Into::into) }) as BoxFuture<'static, Result<V, BoxError>>
    }))
  }
}

impl<K, V> Loader<K, V> {
  #[inline]
  pub(crate) fn is_async(&self) -> bool {
    matches!(self, Loader::Async(_))
  }

  /// Runs the loader on the calling thread.
  ///
  /// Blocking handles are never built with an async loader; if one ever gets
  /// here it is reported as a load failure rather than a panic.
  pub(crate) fn load_blocking(&self, key: &K) -> Result<V, BoxError> {
    match self {
      Loader::Sync(f) => f(key),
      Loader::Async(_) => Err(BuildError::AsyncLoaderRequiresAsyncCache.into()),
    }
  }

  /// Runs the loader from async code. A sync loader runs inline.
  pub(crate) async fn load(&self, key: &K) -> Result<V, BoxError>
  where
    K: Clone,
  {
    match self {
      Loader::Sync(f) => f(key),
      Loader::Async(f) => f(key.clone()).await,
    }
  }
}
