use crate::time;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The refresh state of a cache entry.
///
/// Persisted in snapshots as a small integer: `0` for `Ready`, `1` for
/// `Updating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum EntryState {
  /// No refresh is in flight. A stale read may start one.
  Ready = 0,
  /// A background refresh owns this entry until it stores a replacement or
  /// gives up.
  Updating = 1,
}

/// Returned when a snapshot carries a state code this crate does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown entry state code {0}")]
pub struct UnknownEntryState(pub u8);

impl From<EntryState> for u8 {
  fn from(state: EntryState) -> Self {
    state as u8
  }
}

impl TryFrom<u8> for EntryState {
  type Error = UnknownEntryState;

  fn try_from(code: u8) -> Result<Self, Self::Error> {
    match code {
      0 => Ok(EntryState::Ready),
      1 => Ok(EntryState::Updating),
      other => Err(UnknownEntryState(other)),
    }
  }
}

/// A value in the cache together with its age and refresh state.
///
/// Apart from `state`, an entry is immutable once built. Replacing a value
/// means installing a whole new `CacheEntry` in the store, which is also what
/// resets the state of that key to `Ready`.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  value: Arc<V>,
  /// Wall-clock milliseconds at which the value was set.
  born: u64,
  state: AtomicU8,
}

impl<V> CacheEntry<V> {
  /// Creates a fresh entry stamped with the current time.
  pub(crate) fn new(value: Arc<V>) -> Self {
    Self::with_born(value, time::now_millis())
  }

  /// Creates an entry with an explicit birth time, in a `Ready` state.
  /// Used when restoring from a snapshot.
  pub(crate) fn with_born(value: Arc<V>, born: u64) -> Self {
    Self {
      value,
      born,
      state: AtomicU8::new(EntryState::Ready as u8),
    }
  }

  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn born(&self) -> u64 {
    self.born
  }

  #[inline]
  pub(crate) fn state(&self) -> EntryState {
    match self.state.load(Ordering::Acquire) {
      0 => EntryState::Ready,
      _ => EntryState::Updating,
    }
  }

  #[inline]
  pub(crate) fn is_stale(&self, lifetime: Duration, now: u64) -> bool {
    time::is_stale(self.born, now, lifetime)
  }

  /// Attempts the `Ready -> Updating` transition.
  ///
  /// Exactly one caller wins until the state is reset, so the winner is the
  /// only one allowed to launch a refresh for this entry.
  #[inline]
  pub(crate) fn try_begin_refresh(&self) -> bool {
    self
      .state
      .compare_exchange(
        EntryState::Ready as u8,
        EntryState::Updating as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
      )
      .is_ok()
  }

  /// Puts the entry back to `Ready` after a refresh that did not replace it.
  #[inline]
  pub(crate) fn abandon_refresh(&self) {
    self
      .state
      .store(EntryState::Ready as u8, Ordering::Release);
  }
}
