use fibre_refresh::CacheBuilder;
use serde::{Deserialize, Serialize};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Data {
  version: usize,
  content: String,
}

fn main() {
  let load_counter = Arc::new(AtomicUsize::new(0));
  let snapshot_path = std::env::temp_dir().join("fibre_refresh_demo.json");

  let cache = CacheBuilder::default()
    .lifetime(Duration::from_secs(2))
    .snapshot_file(&snapshot_path)
    .loader({
      let counter = load_counter.clone();
      move |key: &String| -> Result<Data, std::io::Error> {
        let version = counter.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[Loader] Loading version {} for key '{}'...", version, key);
        thread::sleep(Duration::from_millis(500)); // Simulate slow load
        Ok(Data {
          version,
          content: format!("Content for {} - version {}", key, version),
        })
      }
    })
    .build()
    .unwrap();

  let key = "my-data".to_string();
  // A previous run may have left a snapshot behind.
  if let Some(restored) = cache.peek(&key) {
    println!("Restored from {}: {:?}", snapshot_path.display(), *restored);
  }
  cache.remove(&key);

  println!("--- Step 1: Initial Load (miss, blocks on the loader) ---");
  let value1 = cache.get(&key).unwrap();
  println!("Received: {:?}", *value1);
  assert_eq!(value1.version, 1);

  println!("\n--- Step 2: Cache Hit (Fresh) ---");
  let value2 = cache.get(&key).unwrap();
  println!("Received: {:?}", *value2);
  assert_eq!(load_counter.load(Ordering::Relaxed), 1);

  println!("\n--- Step 3: Wait for the lifetime to pass (3 seconds) ---");
  thread::sleep(Duration::from_secs(3));

  println!("\n--- Step 4: Stale Read ---");
  let value3 = cache.get(&key).unwrap();
  println!("IMMEDIATELY Received (stale): {:?}", *value3);
  assert_eq!(value3.version, 1, "Should return stale version 1 immediately");
  println!("A background refresh has been triggered.");

  println!("\n--- Step 5: Wait for Background Refresh to Complete ---");
  thread::sleep(Duration::from_secs(1));

  let value4 = cache.get(&key).unwrap();
  println!("Received (refreshed): {:?}", *value4);
  assert_eq!(value4.version, 2);
  println!("Loader calls: {}", load_counter.load(Ordering::Relaxed));

  println!("\n--- Step 6: Snapshot ---");
  cache.flush().unwrap();
  println!("Wrote {} entries to {}", cache.len(), snapshot_path.display());
  println!("\nFinal Metrics: {:#?}", cache.metrics());
}
