//! A concurrent, refresh-ahead cache that keeps serving while it reloads.
//!
//! Every entry has a lifetime. A read of an entry older than that still
//! returns the cached value immediately, and hands the key to exactly one
//! background refresh that calls your loader and replaces the value when it
//! succeeds. Callers never wait on a refresh; they only wait on the loader
//! when a key is missing altogether.
//!
//! # Features
//! - **Sync & Async**: a blocking [`Cache`] and an [`AsyncCache`] sharing one
//!   core, with sync or async loaders.
//! - **Single-flight refresh**: per-entry atomic state guarantees at most one
//!   refresh in flight per key.
//! - **Persistence**: optional periodic snapshots of the whole cache, restored
//!   at startup. JSON by default, pluggable codecs and storage targets.
//! - **Non-Clone Support**: values are stored in an `Arc<V>`.
//! - **Observability**: `tracing` events and a [`MetricsSnapshot`] of counters.
//!
//! ```no_run
//! use fibre_refresh::CacheBuilder;
//! use std::time::Duration;
//!
//! let cache = CacheBuilder::<String, String>::new()
//!   .lifetime(Duration::from_secs(30))
//!   .snapshot_file("/var/cache/users.json")
//!   .flush_interval(Duration::from_secs(60))
//!   .loader(|user: &String| -> Result<String, std::io::Error> { Ok(format!("profile of {user}")) })
//!   .build()
//!   .unwrap();
//!
//! let profile = cache.get(&"alice".to_string()).unwrap();
//! assert_eq!(*profile, "profile of alice");
//! ```

// Public modules that form the API
pub mod builder;
pub mod config;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod runtime;
pub mod snapshot;

// Internal, crate-only modules
mod entry;
mod loader;
mod shared;
mod store;
mod sync;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use config::CacheConfig;
pub use entry::{EntryState, UnknownEntryState};
pub use error::{BuildError, Error, Result, SnapshotError};
pub use handles::{AsyncCache, Cache};
pub use loader::BoxError;
pub use metrics::MetricsSnapshot;
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
#[cfg(feature = "bincode")]
pub use snapshot::BincodeCodec;
pub use snapshot::{CacheSnapshot, FileTarget, JsonCodec, PersistentEntry, SnapshotCodec, SnapshotTarget};
