use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Entries are stamped with wall-clock time rather than an `Instant` so that a
// `born` value stays meaningful after being written to a snapshot and read
// back by another process.

/// The current wall-clock time in milliseconds since the Unix epoch.
#[inline]
pub(crate) fn now_millis() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map_or(0, |since_epoch| since_epoch.as_millis() as u64)
}

/// Converts an internal millisecond timestamp into the Unix seconds stored
/// in snapshots.
#[inline]
pub(crate) fn millis_to_secs(millis: u64) -> u64 {
  millis / 1_000
}

/// Converts Unix seconds read from a snapshot back into milliseconds.
#[inline]
pub(crate) fn secs_to_millis(secs: u64) -> u64 {
  secs.saturating_mul(1_000)
}

/// Returns `true` if a value stamped at `born` has outlived `lifetime` at `now`.
///
/// An age exactly equal to the lifetime still counts as fresh. A `born` in the
/// future (clock stepped backwards) is treated as age zero.
#[inline]
pub(crate) fn is_stale(born: u64, now: u64, lifetime: Duration) -> bool {
  u128::from(now.saturating_sub(born)) > lifetime.as_millis()
}
