//! Persisting the cache to durable storage and reading it back.
//!
//! A snapshot is the whole cache: for every key, its value, the Unix second
//! it was born at and its refresh state. With the default [`JsonCodec`] it is
//! written as a single JSON object keyed by cache key:
//!
//! ```json
//! { "user:1": { "Key": "user:1", "Born": 1700000000, "State": 0, "Value": "..." } }
//! ```
//!
//! Every write replaces the previous snapshot in full. There is no version
//! field; changing the value type is a breaking change for existing files.

use crate::entry::{CacheEntry, EntryState};
use crate::error::SnapshotError;
use crate::loader::BoxError;
use crate::store::Store;
use crate::time;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::hash::{BuildHasher, Hash};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A single persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersistentEntry<K, V> {
  pub key: K,
  /// Unix seconds at which the value was set.
  pub born: u64,
  pub state: EntryState,
  pub value: Arc<V>,
}

/// A serializable, point-in-time copy of every entry in a cache.
///
/// Created with `Cache::to_snapshot()`, written periodically by the
/// background flusher, and accepted by `CacheBuilder::build_from_snapshot()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(
  serialize = "K: Serialize + Eq + Hash, V: Serialize",
  deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct CacheSnapshot<K, V> {
  entries: HashMap<K, PersistentEntry<K, V>>,
}

impl<K, V> Default for CacheSnapshot<K, V> {
  fn default() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }
}

impl<K: Eq + Hash, V> CacheSnapshot<K, V> {
  /// Captures every entry of `store` under its read lock.
  pub(crate) fn capture<H>(store: &Store<K, V, H>) -> Self
  where
    K: Clone,
    H: BuildHasher,
  {
    let entries = store.collect(|key, entry| {
      (
        key.clone(),
        PersistentEntry {
          key: key.clone(),
          born: time::millis_to_secs(entry.born()),
          state: entry.state(),
          value: entry.value(),
        },
      )
    });
    Self {
      entries: entries.into_iter().collect(),
    }
  }

  /// Adds or replaces an entry. Useful for seeding a cache by hand.
  pub fn insert(&mut self, key: K, value: V, born_secs: u64)
  where
    K: Clone,
  {
    let entry = PersistentEntry {
      key: key.clone(),
      born: born_secs,
      state: EntryState::Ready,
      value: Arc::new(value),
    };
    self.entries.insert(key, entry);
  }

  pub fn get(&self, key: &K) -> Option<&PersistentEntry<K, V>> {
    self.entries.get(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&K, &PersistentEntry<K, V>)> {
    self.entries.iter()
  }

  /// Turns the snapshot into live entries.
  ///
  /// Every entry comes back `Ready`: whatever refresh was in flight when the
  /// snapshot was taken does not exist in this process, and leaving the entry
  /// `Updating` would block refreshes for that key forever.
  pub(crate) fn into_entries(self) -> impl Iterator<Item = (K, Arc<CacheEntry<V>>)> {
    self.entries.into_iter().map(|(key, persisted)| {
      let born = time::secs_to_millis(persisted.born);
      (key, Arc::new(CacheEntry::with_born(persisted.value, born)))
    })
  }
}

/// Turns snapshots into bytes and back.
pub trait SnapshotCodec<K, V>: Send + Sync {
  fn encode(&self, snapshot: &CacheSnapshot<K, V>) -> Result<Vec<u8>, BoxError>;
  fn decode(&self, bytes: &[u8]) -> Result<CacheSnapshot<K, V>, BoxError>;
}

/// The default codec: a JSON object keyed by cache key.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<K, V> SnapshotCodec<K, V> for JsonCodec
where
  K: Serialize + DeserializeOwned + Eq + Hash,
  V: Serialize + DeserializeOwned,
{
  fn encode(&self, snapshot: &CacheSnapshot<K, V>) -> Result<Vec<u8>, BoxError> {
    Ok(serde_json::to_vec(snapshot)?)
  }

  fn decode(&self, bytes: &[u8]) -> Result<CacheSnapshot<K, V>, BoxError> {
    Ok(serde_json::from_slice(bytes)?)
  }
}

/// A compact binary codec. Not interchangeable with [`JsonCodec`] files.
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[cfg(feature = "bincode")]
impl<K, V> SnapshotCodec<K, V> for BincodeCodec
where
  K: Serialize + DeserializeOwned + Eq + Hash,
  V: Serialize + DeserializeOwned,
{
  fn encode(&self, snapshot: &CacheSnapshot<K, V>) -> Result<Vec<u8>, BoxError> {
    Ok(bincode::serialize(snapshot)?)
  }

  fn decode(&self, bytes: &[u8]) -> Result<CacheSnapshot<K, V>, BoxError> {
    Ok(bincode::deserialize(bytes)?)
  }
}

/// Durable storage for the encoded snapshot.
pub trait SnapshotTarget: Send + Sync {
  /// Reads the most recent snapshot, or `None` if none was ever written.
  fn load(&self) -> io::Result<Option<Vec<u8>>>;

  /// Replaces the stored snapshot with `bytes`.
  fn store(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Keeps the snapshot in a single file.
///
/// Writes go to a sibling `<name>.tmp` file which is then renamed over the
/// destination, so readers only ever see a complete snapshot.
#[derive(Debug, Clone)]
pub struct FileTarget {
  path: PathBuf,
}

impl FileTarget {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn temp_path(&self) -> PathBuf {
    let mut name = self
      .path
      .file_name()
      .map(OsString::from)
      .unwrap_or_default();
    name.push(".tmp");
    self.path.with_file_name(name)
  }
}

impl SnapshotTarget for FileTarget {
  fn load(&self) -> io::Result<Option<Vec<u8>>> {
    match fs::read(&self.path) {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn store(&self, bytes: &[u8]) -> io::Result<()> {
    let temp = self.temp_path();
    let written = File::create(&temp).and_then(|mut file| {
      file.write_all(bytes)?;
      file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&temp, &self.path)) {
      let _ = fs::remove_file(&temp);
      return Err(e);
    }
    Ok(())
  }
}

/// A codec paired with a target: everything the cache needs to save and
/// restore itself.
pub(crate) struct Persistence<K, V> {
  codec: Arc<dyn SnapshotCodec<K, V>>,
  target: Arc<dyn SnapshotTarget>,
}

impl<K, V> Persistence<K, V> {
  pub(crate) fn new(codec: Arc<dyn SnapshotCodec<K, V>>, target: Arc<dyn SnapshotTarget>) -> Self {
    Self { codec, target }
  }

  /// Reads the stored snapshot. `Ok(None)` means nothing has been stored yet.
  pub(crate) fn restore(&self) -> Result<Option<CacheSnapshot<K, V>>, SnapshotError> {
    match self.target.load()? {
      Some(bytes) => self
        .codec
        .decode(&bytes)
        .map(Some)
        .map_err(SnapshotError::Decode),
      None => Ok(None),
    }
  }

  /// Encodes `snapshot` and replaces the stored one with it.
  pub(crate) fn write(&self, snapshot: &CacheSnapshot<K, V>) -> Result<(), SnapshotError> {
    let bytes = self.codec.encode(snapshot).map_err(SnapshotError::Encode)?;
    self.target.store(&bytes)?;
    Ok(())
  }
}
