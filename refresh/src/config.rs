use serde::{de, Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of an entry before it is considered stale.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(60);

/// Externally supplied cache settings, e.g. a section of a service's YAML or
/// JSON config file.
///
/// Durations accept either a plain integer number of seconds or a humantime
/// string such as `"90s"` or `"5m"`.
///
/// ```yaml
/// lifetime: 5m
/// flush_interval: 30s
/// snapshot_file: /var/cache/users.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
  /// How long after being set an entry is served as fresh.
  #[serde(deserialize_with = "de_duration")]
  pub lifetime: Duration,
  /// How often the whole cache is written to `snapshot_file`. Zero disables
  /// periodic snapshots.
  #[serde(deserialize_with = "de_duration")]
  pub flush_interval: Duration,
  /// Where snapshots are read from at startup and written to. Absent or empty
  /// disables persistence.
  pub snapshot_file: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      lifetime: DEFAULT_LIFETIME,
      flush_interval: Duration::ZERO,
      snapshot_file: None,
    }
  }
}

impl CacheConfig {
  /// The snapshot file, treating an empty path as "not configured".
  pub fn snapshot_path(&self) -> Option<&PathBuf> {
    self
      .snapshot_file
      .as_ref()
      .filter(|path| !path.as_os_str().is_empty())
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
  Secs(u64),
  Text(String),
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
  D: Deserializer<'de>,
{
  match RawDuration::deserialize(deserializer)? {
    RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
    RawDuration::Text(text) => humantime::parse_duration(text.trim()).map_err(de::Error::custom),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn parses_humantime_and_integer_seconds() {
    let config: CacheConfig = serde_json::from_str(
      r#"{ "lifetime": "5m", "flush_interval": 30, "snapshot_file": "cache.json" }"#,
    )
    .unwrap();

    assert_eq!(
      config,
      CacheConfig {
        lifetime: Duration::from_secs(300),
        flush_interval: Duration::from_secs(30),
        snapshot_file: Some(PathBuf::from("cache.json")),
      }
    );
  }

  #[test]
  fn missing_fields_take_defaults() {
    let config: CacheConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, CacheConfig::default());
    assert_eq!(config.snapshot_path(), None);
  }

  #[test]
  fn empty_snapshot_file_is_disabled() {
    let config: CacheConfig = serde_json::from_str(r#"{ "snapshot_file": "" }"#).unwrap();
    assert_eq!(config.snapshot_path(), None);
  }

  #[test]
  fn rejects_unknown_fields_and_bad_durations() {
    assert!(serde_json::from_str::<CacheConfig>(r#"{ "ttl": "5m" }"#).is_err());
    assert!(serde_json::from_str::<CacheConfig>(r#"{ "lifetime": "soon" }"#).is_err());
  }
}
