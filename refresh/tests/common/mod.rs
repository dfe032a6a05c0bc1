#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

/// Routes the crate's `tracing` output through the test harness. Set
/// `RUST_LOG=fibre_refresh=debug` to see it.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Counts loader invocations across clones.
#[derive(Clone, Default)]
pub struct LoadCounter(Arc<AtomicUsize>);

impl LoadCounter {
  /// Records a call and returns its 1-based sequence number.
  pub fn record(&self) -> usize {
    self.0.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn count(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TestError(pub &'static str);

/// Polls `condition` until it holds or `timeout` passes. Background refreshes
/// land asynchronously, so tests wait for them instead of sleeping blindly.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

pub async fn wait_until_async(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  condition()
}

/// A lifetime short enough for tests to outlive, paired with the sleep that
/// reliably makes an entry stale.
pub const SHORT_LIFETIME: Duration = Duration::from_millis(50);
pub const PAST_LIFETIME: Duration = Duration::from_millis(120);
pub const SETTLE: Duration = Duration::from_secs(3);
