use fibre_refresh::{AsyncCache, CacheBuilder};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("user service unavailable")]
struct Unavailable;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter("fibre_refresh=debug")
    .init();

  let calls = Arc::new(AtomicUsize::new(0));
  let cache: AsyncCache<u64, String> = CacheBuilder::new()
    .lifetime(Duration::from_millis(500))
    .async_loader({
      let calls = calls.clone();
      move |user_id: u64| {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
          tokio::time::sleep(Duration::from_millis(200)).await;
          // Every third call fails; the stale value keeps being served.
          if call % 3 == 0 {
            return Err(Unavailable);
          }
          Ok(format!("user {user_id} (load #{call})"))
        }
      }
    })
    .build_async()
    .unwrap();

  for round in 0..8 {
    let started = tokio::time::Instant::now();
    let value = cache.get(&7).await.unwrap();
    println!("round {round}: {value} in {:?}", started.elapsed());
    tokio::time::sleep(Duration::from_millis(300)).await;
  }

  println!("\nFinal Metrics: {:#?}", cache.metrics());
}
