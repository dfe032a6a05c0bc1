use std::{future::Future, pin::Pin};

/// A trait for spawning a future onto an asynchronous runtime.
///
/// Background refreshes driven by an async loader are handed to this spawner.
/// The cache never awaits the spawned task; its result is only observed by a
/// later read.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner bound to the given runtime.
  pub fn new(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }

  /// Creates a spawner for the Tokio runtime the caller is running in, or
  /// `None` outside of a runtime.
  pub fn try_current() -> Option<Self> {
    tokio::runtime::Handle::try_current().ok().map(Self)
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    self.0.spawn(future);
  }
}
