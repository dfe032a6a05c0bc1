mod common;

use common::{LoadCounter, TestError};
use fibre_refresh::{Cache, CacheBuilder};

fn build_cache(counter: &LoadCounter) -> Cache<String, i32> {
  let counter = counter.clone();
  CacheBuilder::new()
    .loader(move |_key: &String| -> Result<i32, TestError> {
      counter.record();
      Err(TestError("loader should not run"))
    })
    .build()
    .unwrap()
}

#[test]
fn test_add_and_get() {
  let counter = LoadCounter::default();
  let cache = build_cache(&counter);

  cache.add("a".to_string(), 1);
  assert_eq!(*cache.get(&"a".to_string()).unwrap(), 1);
  assert_eq!(cache.len(), 1);
  assert_eq!(counter.count(), 0, "a fresh hit never calls the loader");
}

#[test]
fn test_add_replaces_existing_value() {
  let cache = build_cache(&LoadCounter::default());

  cache.add("a".to_string(), 1);
  cache.add("a".to_string(), 2);

  assert_eq!(*cache.get(&"a".to_string()).unwrap(), 2);
  assert_eq!(cache.len(), 1);
  assert_eq!(cache.metrics().inserts, 2);
}

#[test]
fn test_remove() {
  let cache = build_cache(&LoadCounter::default());
  cache.add("a".to_string(), 1);

  assert!(cache.remove(&"a".to_string()));
  assert!(!cache.remove(&"a".to_string()), "second remove is a no-op");
  assert!(!cache.contains_key(&"a".to_string()));
  assert!(cache.is_empty());
  assert_eq!(cache.metrics().removals, 1);
}

#[test]
fn test_peek_does_not_load() {
  let counter = LoadCounter::default();
  let cache = build_cache(&counter);

  assert!(cache.peek(&"missing".to_string()).is_none());
  assert_eq!(counter.count(), 0);

  cache.add("a".to_string(), 7);
  assert_eq!(cache.peek(&"a".to_string()).as_deref(), Some(&7));

  let metrics = cache.metrics();
  assert_eq!(metrics.hits, 0);
  assert_eq!(metrics.misses, 0);
}

#[test]
fn test_clear() {
  let cache = build_cache(&LoadCounter::default());
  for i in 0..5 {
    cache.add(format!("k{i}"), i);
  }
  assert_eq!(cache.len(), 5);

  cache.clear();

  assert!(cache.is_empty());
  assert_eq!(cache.metrics().removals, 5);
}

#[test]
fn test_clones_share_entries() {
  let cache = build_cache(&LoadCounter::default());
  let other = cache.clone();

  cache.add("a".to_string(), 1);
  assert_eq!(other.peek(&"a".to_string()).as_deref(), Some(&1));

  let async_view = other.to_async();
  assert!(async_view.contains_key(&"a".to_string()));
}

#[test]
fn test_hit_metrics() {
  let cache = build_cache(&LoadCounter::default());
  cache.add("a".to_string(), 1);

  cache.get(&"a".to_string()).unwrap();
  cache.get(&"a".to_string()).unwrap();
  let _ = cache.get(&"b".to_string());

  let metrics = cache.metrics();
  assert_eq!(metrics.hits, 2);
  assert_eq!(metrics.misses, 1);
  assert_eq!(metrics.load_failures, 1);
}
