#![cfg(feature = "tokio")]

mod common;

use common::{init_tracing, wait_until_async, LoadCounter, TestError, PAST_LIFETIME, SETTLE, SHORT_LIFETIME};
use fibre_refresh::{AsyncCache, CacheBuilder, Error, TaskSpawner, TokioSpawner};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn build_cache(counter: &LoadCounter) -> AsyncCache<String, usize> {
  let counter = counter.clone();
  CacheBuilder::new()
    .lifetime(SHORT_LIFETIME)
    .async_loader(move |_key: String| {
      let counter = counter.clone();
      async move {
        let call = counter.record();
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, TestError>(call * 100)
      }
    })
    .build_async()
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_miss_loads_and_populates() {
  let counter = LoadCounter::default();
  let cache = build_cache(&counter);
  let key = "k".to_string();

  assert_eq!(*cache.get(&key).await.unwrap(), 100);
  assert_eq!(*cache.get(&key).await.unwrap(), 100);
  assert_eq!(counter.count(), 1);
  assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_stale_refresh() {
  init_tracing();
  let counter = LoadCounter::default();
  let cache = build_cache(&counter);
  let key = "k".to_string();

  cache.add(key.clone(), 1).await;
  tokio::time::sleep(PAST_LIFETIME).await;

  assert_eq!(*cache.get(&key).await.unwrap(), 1, "stale value served");
  assert_eq!(*cache.get(&key).await.unwrap(), 1, "refresh still in flight");

  assert!(wait_until_async(SETTLE, || cache.peek(&key).as_deref() == Some(&100)).await);
  assert_eq!(counter.count(), 1);
  assert_eq!(cache.metrics().refreshes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_single_flight_across_tasks() {
  let counter = LoadCounter::default();
  let cache = build_cache(&counter);
  let key = "k".to_string();

  cache.add(key.clone(), 1).await;
  tokio::time::sleep(PAST_LIFETIME).await;

  let tasks: Vec<_> = (0..16)
    .map(|_| {
      let cache = cache.clone();
      let key = key.clone();
      tokio::spawn(async move { *cache.get(&key).await.unwrap() })
    })
    .collect();
  for task in tasks {
    assert_eq!(task.await.unwrap(), 1);
  }

  assert!(wait_until_async(SETTLE, || cache.peek(&key).as_deref() == Some(&100)).await);
  assert_eq!(counter.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_loader_error_is_not_cached() {
  let counter = LoadCounter::default();
  let cache: AsyncCache<u32, u32> = CacheBuilder::new()
    .async_loader({
      let counter = counter.clone();
      move |key: u32| {
        let call = counter.record();
        async move {
          if call == 1 {
            Err(TestError("first call fails"))
          } else {
            Ok(key)
          }
        }
      }
    })
    .build_async()
    .unwrap();

  assert!(matches!(cache.get(&7).await, Err(Error::Load(_))));
  assert!(cache.is_empty());
  assert_eq!(*cache.get(&7).await.unwrap(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_panicking_refresh_is_retried() {
  init_tracing();
  let counter = LoadCounter::default();
  let cache: AsyncCache<String, usize> = CacheBuilder::new()
    .lifetime(SHORT_LIFETIME)
    .async_loader({
      let counter = counter.clone();
      move |_key: String| {
        let counter = counter.clone();
        async move {
          match counter.record() {
            1 => panic!("loader blew up"),
            call => Ok::<_, TestError>(call * 100),
          }
        }
      }
    })
    .build_async()
    .unwrap();
  let key = "k".to_string();

  cache.add(key.clone(), 1).await;
  tokio::time::sleep(PAST_LIFETIME).await;

  assert_eq!(*cache.get(&key).await.unwrap(), 1);
  assert!(wait_until_async(SETTLE, || cache.metrics().refresh_failures == 1).await);
  assert_eq!(cache.peek(&key).as_deref(), Some(&1));

  assert_eq!(*cache.get(&key).await.unwrap(), 1);
  assert!(wait_until_async(SETTLE, || cache.peek(&key).as_deref() == Some(&200)).await);
  assert_eq!(counter.count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_loader_in_async_cache() {
  let counter = LoadCounter::default();
  let cache: AsyncCache<String, usize> = CacheBuilder::new()
    .lifetime(SHORT_LIFETIME)
    .loader({
      let counter = counter.clone();
      move |_key: &String| -> Result<usize, TestError> { Ok(counter.record() * 100) }
    })
    .build_async()
    .unwrap();
  let key = "k".to_string();

  assert_eq!(*cache.get(&key).await.unwrap(), 100);
  tokio::time::sleep(PAST_LIFETIME).await;
  assert_eq!(*cache.get(&key).await.unwrap(), 100);
  assert!(wait_until_async(SETTLE, || cache.peek(&key).as_deref() == Some(&200)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remove_and_clear_async() {
  let cache = build_cache(&LoadCounter::default());

  cache.add("a".to_string(), 1).await;
  cache.add("b".to_string(), 2).await;

  assert!(cache.remove(&"a".to_string()).await);
  assert!(!cache.remove(&"a".to_string()).await);
  cache.clear().await;

  assert!(cache.is_empty());
  assert_eq!(cache.metrics().removals, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_to_sync_shares_entries() {
  let cache = build_cache(&LoadCounter::default());
  cache.add("a".to_string(), 1).await;

  let sync_view = cache.to_sync();
  assert_eq!(*sync_view.get(&"a".to_string()).unwrap(), 1);

  // A blocking handle cannot drive an async loader on a miss.
  assert!(matches!(sync_view.get(&"b".to_string()), Err(Error::Load(_))));
}

struct CountingSpawner {
  inner: TokioSpawner,
  spawned: Arc<AtomicUsize>,
}

impl TaskSpawner for CountingSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    self.spawned.fetch_add(1, Ordering::SeqCst);
    self.inner.spawn(future);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_custom_spawner_runs_refreshes() {
  let spawned = Arc::new(AtomicUsize::new(0));
  let spawner = CountingSpawner {
    inner: TokioSpawner::new(tokio::runtime::Handle::current()),
    spawned: spawned.clone(),
  };

  let cache: AsyncCache<u32, u32> = CacheBuilder::new()
    .lifetime(SHORT_LIFETIME)
    .spawner(Arc::new(spawner))
    .async_loader(|key: u32| async move { Ok::<_, TestError>(key + 1) })
    .build_async()
    .unwrap();

  cache.add(1, 1).await;
  tokio::time::sleep(PAST_LIFETIME).await;
  cache.get(&1).await.unwrap();

  assert!(wait_until_async(SETTLE, || cache.peek(&1).as_deref() == Some(&2)).await);
  assert_eq!(spawned.load(Ordering::SeqCst), 1);
}
