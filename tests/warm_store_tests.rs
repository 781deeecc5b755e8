//! Integration tests for the warm tier over the filesystem blob backend.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use tiercache::cache::entry::CacheEntry;
use tiercache::cache::warm::WarmStore;
use tiercache::query::{CacheKey, QueryDescriptor};
use tiercache::store::blob::FsBlobStore;
use tiercache::table::{Column, ColumnValues, ResultTable};

fn key_for(dataset: &str) -> CacheKey {
    QueryDescriptor {
        dataset: dataset.into(),
        filters: vec![],
        aggregation: None,
    }
    .canonicalize()
    .unwrap()
    .cache_key()
    .unwrap()
}

fn mixed_table() -> ResultTable {
    ResultTable::new(vec![
        Column::new(
            "cohort",
            ColumnValues::Utf8(vec![Some("2024-01".into()), None, Some("2024-02".into())]),
        ),
        Column::new(
            "subscriptions",
            ColumnValues::Int64(vec![Some(i64::MAX), Some(0), None]),
        ),
        Column::new(
            "churn_rate",
            ColumnValues::Float64(vec![Some(0.1), Some(f64::MIN_POSITIVE), None]),
        ),
        Column::new("active", ColumnValues::Bool(vec![None, Some(true), Some(false)])),
    ])
    .unwrap()
}

async fn warm_in(dir: &TempDir) -> WarmStore {
    let blob = FsBlobStore::new(dir.path().join("bucket")).await.unwrap();
    WarmStore::new(Arc::new(blob), 3)
}

#[tokio::test]
async fn test_fs_roundtrip_is_lossless() {
    let dir = TempDir::new().unwrap();
    let warm = warm_in(&dir).await;

    let key = key_for("sales");
    let entry = CacheEntry::new(key, "sales".into(), Arc::new(mixed_table()));
    warm.store(&entry).await.unwrap();

    let fetched = warm.fetch(&key).await.unwrap().unwrap();
    assert_eq!(*fetched.table, mixed_table());
    assert_eq!(fetched.dataset, "sales");
}

#[tokio::test]
async fn test_entries_survive_store_reopen() {
    let dir = TempDir::new().unwrap();
    let key = key_for("sales");

    {
        let warm = warm_in(&dir).await;
        let entry = CacheEntry::with_created_at(
            key,
            "sales".into(),
            Arc::new(mixed_table()),
            SystemTime::now() - Duration::from_secs(60),
        );
        warm.store(&entry).await.unwrap();
    }

    // A fresh store over the same bucket models another replica or a
    // restarted process.
    let warm = warm_in(&dir).await;
    let fetched = warm.fetch(&key).await.unwrap().unwrap();
    assert!(fetched.age(SystemTime::now()) >= Duration::from_secs(59));
}

#[tokio::test]
async fn test_rewrite_replaces_entry_atomically() {
    let dir = TempDir::new().unwrap();
    let warm = warm_in(&dir).await;
    let key = key_for("sales");

    let old = CacheEntry::new(key, "sales".into(), Arc::new(ResultTable::empty()));
    warm.store(&old).await.unwrap();

    let new = CacheEntry::new(key, "sales".into(), Arc::new(mixed_table()));
    warm.store(&new).await.unwrap();

    let fetched = warm.fetch(&key).await.unwrap().unwrap();
    assert_eq!(*fetched.table, mixed_table());
}

#[tokio::test]
async fn test_concurrent_writers_leave_a_readable_blob() {
    let dir = TempDir::new().unwrap();
    let warm = warm_in(&dir).await;
    let key = key_for("sales");

    let writes = (0..8).map(|_| {
        let warm = warm.clone();
        let entry = CacheEntry::new(key, "sales".into(), Arc::new(mixed_table()));
        async move { warm.store(&entry).await }
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }

    // Last-write-wins: whichever write landed, the blob decodes cleanly.
    let fetched = warm.fetch(&key).await.unwrap().unwrap();
    assert_eq!(*fetched.table, mixed_table());
}

#[tokio::test]
async fn test_invalidate_then_fetch_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let warm = warm_in(&dir).await;
    let key = key_for("sales");

    let entry = CacheEntry::new(key, "sales".into(), Arc::new(mixed_table()));
    warm.store(&entry).await.unwrap();
    warm.invalidate(&key).await.unwrap();

    assert!(warm.fetch(&key).await.unwrap().is_none());
}
