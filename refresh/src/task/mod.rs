//! Background work owned by a cache instance. Refresh tasks are short-lived
//! and spawned from `shared.rs`; the flusher lives as long as the cache.

pub(crate) mod flusher;
