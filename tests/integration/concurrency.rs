//! Concurrency tests
//!
//! One writer and many readers share a single backend handle:
//! - Readers never observe a partially applied bulk insert
//! - Concurrent writers to distinct keys do not lose updates

use std::sync::Arc;

use energy_store::codec::{Interval, TimeOfDay};
use energy_store::storage::{DataPoint, StorageBackend};
use futures::future::join_all;

use super::helpers::*;

const BATCHES: u32 = 10;
const BATCH_SIZE: u32 = 60;

fn batch(hour: u32) -> Vec<DataPoint> {
    (0..BATCH_SIZE)
        .map(|minute| {
            let time = TimeOfDay::from_hm(hour, minute).unwrap();
            DataPoint::new(NAMESPACE, day(DATE_1_2_22), time, TAG_1, 1.0)
        })
        .collect()
}

async fn readers_see_whole_batches(backend: Arc<dyn StorageBackend>) {
    backend.clear().await.unwrap();

    let writer = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            for hour in 0..BATCHES {
                backend.bulk_insert(batch(hour)).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let readers = (0..8).map(|_| {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            for _ in 0..20 {
                let size = backend.size().await.unwrap();
                assert_eq!(size % u64::from(BATCH_SIZE), 0, "saw a partial batch");

                let result = backend
                    .retrieve(NAMESPACE, day(DATE_1_2_22), Interval::Hour, Some(TAG_1))
                    .await
                    .unwrap();
                for tags in result[NAMESPACE][&day(DATE_1_2_22)].values() {
                    assert_eq!(tags[TAG_1], Some(f64::from(BATCH_SIZE)));
                }
                tokio::task::yield_now().await;
            }
        })
    });

    writer.await.unwrap();
    for reader in join_all(readers).await {
        reader.unwrap();
    }

    assert_eq!(backend.size().await.unwrap(), u64::from(BATCHES * BATCH_SIZE));
}

async fn concurrent_writers_keep_every_key(backend: Arc<dyn StorageBackend>) {
    backend.clear().await.unwrap();

    let writers = (0..BATCHES).map(|hour| {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move { backend.bulk_insert(batch(hour)).await })
    });

    for result in join_all(writers).await {
        result.unwrap().unwrap();
    }

    assert_eq!(backend.size().await.unwrap(), u64::from(BATCHES * BATCH_SIZE));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_readers_see_whole_batches() {
    let store = memory("readers").await;
    readers_see_whole_batches(store.backend.clone()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_readers_see_whole_batches() {
    let store = sqlite_file("readers").await;
    readers_see_whole_batches(store.backend.clone()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_writers() {
    let store = memory("writers").await;
    concurrent_writers_keep_every_key(store.backend.clone()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_writers() {
    let store = sqlite_file("writers").await;
    concurrent_writers_keep_every_key(store.backend.clone()).await;
}
