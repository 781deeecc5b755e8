//! Integration tests for the tier orchestrator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::future::join_all;

use tiercache::cache::entry::{CacheEntry, Origin};
use tiercache::cache::freshness::FreshnessPolicy;
use tiercache::cache::hot::HotStore;
use tiercache::cache::orchestrator::{CacheError, Orchestrator};
use tiercache::cache::warm::WarmStore;
use tiercache::config::{FreshnessConfig, HotConfig};
use tiercache::query::{FilterOp, FilterPredicate, FilterValue, QueryDescriptor};
use tiercache::store::blob::MemoryBlobStore;
use tiercache::store::warehouse::{ColdStore, ColdStoreError};
use tiercache::table::{Column, ColumnValues, ResultTable};

/// Cold store double that counts invocations and can be told to fail.
struct MockWarehouse {
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Duration,
    table: ResultTable,
}

impl MockWarehouse {
    fn new(table: ResultTable) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: Duration::ZERO,
            table,
        })
    }

    fn with_delay(table: ResultTable, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay,
            table,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ColdStore for MockWarehouse {
    async fn run_query(&self, _sql: &str) -> Result<ResultTable, ColdStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ColdStoreError::Status {
                status: 503,
                detail: "warehouse offline".into(),
            });
        }
        Ok(self.table.clone())
    }
}

fn sales_table() -> ResultTable {
    ResultTable::new(vec![
        Column::new(
            "plan",
            ColumnValues::Utf8(vec![Some("monthly".into()), Some("annual".into())]),
        ),
        Column::new("revenue", ColumnValues::Float64(vec![Some(120.5), None])),
    ])
    .unwrap()
}

fn sales_descriptor() -> QueryDescriptor {
    QueryDescriptor {
        dataset: "sales".into(),
        filters: vec![
            FilterPredicate {
                field: "region".into(),
                op: FilterOp::Eq,
                value: FilterValue::Str("emea".into()),
            },
            FilterPredicate {
                field: "year".into(),
                op: FilterOp::Ge,
                value: FilterValue::Int(2024),
            },
        ],
        aggregation: None,
    }
}

/// Orchestrator over an in-memory blob store, 5-minute staleness for
/// "sales", 30-minute default.
fn build_orchestrator(
    blob: Arc<MemoryBlobStore>,
    cold: Arc<MockWarehouse>,
) -> Orchestrator {
    let mut freshness = FreshnessConfig::default();
    freshness
        .max_staleness_per_dataset
        .insert("sales".into(), 300);

    Orchestrator::new(
        HotStore::new(&HotConfig {
            max_entries: 32,
            max_bytes: 0,
        }),
        WarmStore::new(blob, 3),
        cold,
        FreshnessPolicy::new(freshness),
    )
}

/// Seed the warm tier with an entry of a given age.
async fn seed_warm(blob: Arc<MemoryBlobStore>, descriptor: &QueryDescriptor, age: Duration) {
    let key = descriptor.canonicalize().unwrap().cache_key().unwrap();
    let entry = CacheEntry::with_created_at(
        key,
        descriptor.dataset.clone(),
        Arc::new(sales_table()),
        SystemTime::now() - age,
    );
    WarmStore::new(blob, 3).store(&entry).await.unwrap();
}

#[tokio::test]
async fn test_cold_fetch_then_hot_hit() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let orchestrator = build_orchestrator(blob, cold.clone());
    let descriptor = sales_descriptor();

    let first = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(first.origin, Origin::Cold);
    assert_eq!(*first.table, sales_table());
    assert_eq!(cold.calls(), 1);

    // Within the freshness window the warehouse must not be consulted.
    let second = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(second.origin, Origin::Hot);
    assert!(!second.stale);
    assert_eq!(cold.calls(), 1);
}

#[tokio::test]
async fn test_warm_survives_process_restart() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let descriptor = sales_descriptor();

    let orchestrator = build_orchestrator(blob.clone(), cold.clone());
    orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(cold.calls(), 1);

    // A new orchestrator models a restarted replica: empty hot tier,
    // shared warm tier.
    let restarted = build_orchestrator(blob, cold.clone());
    let outcome = restarted.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::Warm);
    assert_eq!(cold.calls(), 1);

    // The warm hit populated the new hot tier.
    let outcome = restarted.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::Hot);
}

#[tokio::test]
async fn test_permuted_filters_hit_the_same_entry() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let orchestrator = build_orchestrator(blob, cold.clone());

    let mut permuted = sales_descriptor();
    permuted.filters.reverse();

    orchestrator.get(&sales_descriptor()).await.unwrap();
    let outcome = orchestrator.get(&permuted).await.unwrap();
    assert_eq!(outcome.origin, Origin::Hot);
    assert_eq!(cold.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_gets_share_one_cold_fetch() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::with_delay(sales_table(), Duration::from_millis(100));
    let orchestrator = build_orchestrator(blob, cold.clone());
    let descriptor = sales_descriptor();

    let outcomes = join_all((0..16).map(|_| {
        let orchestrator = orchestrator.clone();
        let descriptor = descriptor.clone();
        async move { orchestrator.get(&descriptor).await }
    }))
    .await;

    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.origin, Origin::Cold);
        assert_eq!(*outcome.table, sales_table());
    }
    assert_eq!(cold.calls(), 1, "single-flight must dedupe the burst");
}

#[tokio::test]
async fn test_fresh_warm_entry_served_without_cold_call() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let descriptor = sales_descriptor();

    // Entry aged 4 minutes under a 5-minute window.
    seed_warm(blob.clone(), &descriptor, Duration::from_secs(240)).await;

    let orchestrator = build_orchestrator(blob, cold.clone());
    let outcome = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::Warm);
    assert!(outcome.age >= Duration::from_secs(239));
    assert_eq!(cold.calls(), 0);
}

#[tokio::test]
async fn test_expired_warm_entry_triggers_cold_fetch() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let descriptor = sales_descriptor();

    // Entry aged 6 minutes under a 5-minute window.
    seed_warm(blob.clone(), &descriptor, Duration::from_secs(360)).await;

    let orchestrator = build_orchestrator(blob, cold.clone());
    let outcome = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::Cold);
    assert_eq!(cold.calls(), 1);
}

#[tokio::test]
async fn test_stale_fallback_when_warehouse_down() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let descriptor = sales_descriptor();

    // 10-minute-old entry, 5-minute window, warehouse down.
    seed_warm(blob.clone(), &descriptor, Duration::from_secs(600)).await;
    cold.set_failing(true);

    let orchestrator = build_orchestrator(blob, cold.clone());
    let outcome = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::StaleFallback);
    assert!(outcome.stale);
    assert!(outcome.warning.is_some());
    assert_eq!(*outcome.table, sales_table());
    assert_eq!(cold.calls(), 1);
}

#[tokio::test]
async fn test_cold_failure_without_fallback_propagates() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    cold.set_failing(true);

    let orchestrator = build_orchestrator(blob, cold);
    let err = orchestrator.get(&sales_descriptor()).await.unwrap_err();
    assert!(matches!(err, CacheError::Cold(_)));
}

#[tokio::test]
async fn test_empty_result_set_is_a_cache_hit() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(ResultTable::empty());
    let orchestrator = build_orchestrator(blob, cold.clone());
    let descriptor = sales_descriptor();

    let first = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(first.origin, Origin::Cold);
    assert_eq!(first.table.num_rows(), 0);

    // An empty payload must not read as a miss.
    let second = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(second.origin, Origin::Hot);
    assert_eq!(cold.calls(), 1);
}

#[tokio::test]
async fn test_corrupt_warm_blob_falls_through_to_cold() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let descriptor = sales_descriptor();

    seed_warm(blob.clone(), &descriptor, Duration::from_secs(10)).await;
    let key = descriptor.canonicalize().unwrap().cache_key().unwrap();
    blob.corrupt(
        &WarmStore::object_key(&key),
        bytes::Bytes::from_static(b"garbage"),
    );

    let orchestrator = build_orchestrator(blob, cold.clone());
    let outcome = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::Cold);
    assert_eq!(cold.calls(), 1);
}

#[tokio::test]
async fn test_invalidate_purges_stale_fallback_eligibility() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let orchestrator = build_orchestrator(blob, cold.clone());
    let descriptor = sales_descriptor();

    orchestrator.get(&descriptor).await.unwrap();
    orchestrator.invalidate(&descriptor).await.unwrap();

    // With both tiers purged and the warehouse down there is nothing left
    // to serve, stale or otherwise.
    cold.set_failing(true);
    let err = orchestrator.get(&descriptor).await.unwrap_err();
    assert!(matches!(err, CacheError::Cold(_)));
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let orchestrator = build_orchestrator(blob, cold.clone());
    let descriptor = sales_descriptor();

    orchestrator.get(&descriptor).await.unwrap();
    orchestrator.invalidate(&descriptor).await.unwrap();

    let outcome = orchestrator.get(&descriptor).await.unwrap();
    assert_eq!(outcome.origin, Origin::Cold);
    assert_eq!(cold.calls(), 2);
}

#[tokio::test]
async fn test_stats_track_tier_hits() {
    let blob = Arc::new(MemoryBlobStore::new());
    let cold = MockWarehouse::new(sales_table());
    let orchestrator = build_orchestrator(blob, cold);
    let descriptor = sales_descriptor();

    orchestrator.get(&descriptor).await.unwrap();
    orchestrator.get(&descriptor).await.unwrap();
    orchestrator.get(&descriptor).await.unwrap();

    let stats = orchestrator.stats();
    assert_eq!(stats.counters.cold_fetches, 1);
    assert_eq!(stats.counters.hot_hits, 2);
    assert_eq!(stats.hot.entries, 1);
    assert_eq!(stats.inflight_fetches, 0);
}
