//! Cache orchestrator: Hot → Warm → Cold lookup with populate-up.
//!
//! The one entry point the presentation layer calls. Given a query
//! descriptor it derives the cache key, walks the tiers fastest-first,
//! populates the faster tiers on a slower hit, and coordinates cold-store
//! fetches through the single-flight registry so a burst of identical
//! requests costs exactly one warehouse query.
//!
//! Cold fetches run in a spawned task: a caller abandoning its request never
//! cancels a fetch other callers are joined to, and the completed result
//! still lands in both cache tiers for whoever asks next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::entry::{CacheEntry, Origin};
use crate::cache::freshness::FreshnessPolicy;
use crate::cache::hot::{HotStore, HotStoreStats};
use crate::cache::singleflight::{Flight, FlightLeader, SingleFlight};
use crate::cache::warm::WarmStore;
use crate::query::{CacheKey, CanonicalQuery, KeyError, QueryDescriptor};
use crate::store::warehouse::{ColdStore, ColdStoreError};
use crate::table::ResultTable;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The descriptor could not be canonicalized. Fatal for this request
    /// only.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The warehouse failed and no stale entry was available to fall back
    /// on. The caller owns retry policy.
    #[error("data unavailable: {0}")]
    Cold(Arc<ColdStoreError>),

    /// The shared fetch this caller was joined to went away without
    /// resolving (leader task aborted).
    #[error("warehouse fetch was aborted before completing")]
    FetchAborted,
}

/// What `get` hands back: the rows plus how fresh they are.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub table: Arc<ResultTable>,
    pub origin: Origin,
    pub age: Duration,
    pub stale: bool,
    /// Set when stale data is being served because the warehouse is down.
    pub warning: Option<String>,
}

/// Monotonic tier counters, for the stats surface.
#[derive(Default)]
pub struct TierCounters {
    pub hot_hits: AtomicU64,
    pub warm_hits: AtomicU64,
    pub cold_fetches: AtomicU64,
    pub cold_failures: AtomicU64,
    pub flight_joins: AtomicU64,
    pub stale_fallbacks: AtomicU64,
    pub invalidations: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_fetches: u64,
    pub cold_failures: u64,
    pub flight_joins: u64,
    pub stale_fallbacks: u64,
    pub invalidations: u64,
}

impl TierCounters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.warm_hits.load(Ordering::Relaxed),
            cold_fetches: self.cold_fetches.load(Ordering::Relaxed),
            cold_failures: self.cold_failures.load(Ordering::Relaxed),
            flight_joins: self.flight_joins.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Cache-wide statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hot: HotStoreStats,
    pub counters: CounterSnapshot,
    pub inflight_fetches: usize,
}

/// The tier coordinator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    hot: HotStore,
    warm: WarmStore,
    cold: Arc<dyn ColdStore>,
    policy: Arc<FreshnessPolicy>,
    flights: SingleFlight,
    counters: Arc<TierCounters>,
}

impl Orchestrator {
    pub fn new(
        hot: HotStore,
        warm: WarmStore,
        cold: Arc<dyn ColdStore>,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            policy: Arc::new(policy),
            flights: SingleFlight::new(),
            counters: Arc::new(TierCounters::default()),
        }
    }

    /// Serve a query: hot tier, then warm, then a single-flight cold fetch.
    ///
    /// On a cold-store failure any resident stale entry (hot or warm) is
    /// served with `origin = stale-fallback` and a soft warning; only a
    /// failure with nothing to fall back on propagates as an error.
    pub async fn get(&self, descriptor: &QueryDescriptor) -> Result<QueryOutcome, CacheError> {
        let canonical = descriptor.canonicalize()?;
        let key = canonical.cache_key()?;
        let now = SystemTime::now();

        if let Some(entry) = self.hot.peek(&key) {
            if self.policy.is_fresh(&entry, now) {
                self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Hot hit");
                return Ok(self.fresh_outcome(entry, Origin::Hot, now));
            }
            debug!(key = %key, "Hot entry stale");
        }

        match self.warm.fetch(&key).await {
            Ok(Some(entry)) if self.policy.is_fresh(&entry, now) => {
                let entry = Arc::new(entry);
                self.hot.put(entry.clone());
                self.counters.warm_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(self.fresh_outcome(entry, Origin::Warm, now));
            }
            Ok(Some(_)) => debug!(key = %key, "Warm entry stale"),
            Ok(None) => {}
            // Warm failures are soft misses; the cold store settles it.
            Err(err) => warn!(key = %key, error = %err, "Warm read failed, treating as miss"),
        }

        let mut rx = match self.flights.join(key) {
            Flight::Leader(leader) => {
                // A concurrent fetch may have landed between the miss check
                // and the join; serve it instead of re-querying.
                if let Some(entry) = self.hot.peek(&key) {
                    let now = SystemTime::now();
                    if self.policy.is_fresh(&entry, now) {
                        self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
                        leader.complete(Ok(entry.clone()));
                        return Ok(self.fresh_outcome(entry, Origin::Hot, now));
                    }
                }
                let rx = leader.subscribe();
                self.spawn_cold_fetch(canonical, key, leader);
                rx
            }
            Flight::Follower(rx) => {
                self.counters.flight_joins.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Joined in-flight fetch");
                rx
            }
        };

        match rx.recv().await {
            Ok(Ok(entry)) => {
                let now = SystemTime::now();
                Ok(self.fresh_outcome(entry, Origin::Cold, now))
            }
            Ok(Err(cold_err)) => self.stale_fallback(&key, cold_err).await,
            Err(_) => Err(CacheError::FetchAborted),
        }
    }

    /// Drop the entry for a descriptor from both caching tiers.
    ///
    /// This also removes stale-fallback eligibility on purpose:
    /// invalidation says the data is wrong, not merely old, and wrong rows
    /// must not resurface under a `stale-fallback` tag.
    pub async fn invalidate(&self, descriptor: &QueryDescriptor) -> Result<(), CacheError> {
        let key = descriptor.canonicalize()?.cache_key()?;
        let evicted_hot = self.hot.evict(&key);
        if let Err(err) = self.warm.invalidate(&key).await {
            warn!(key = %key, error = %err, "Warm invalidation failed");
        }
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        info!(key = %key, evicted_hot, "Invalidated cache entry");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hot: self.hot.stats(),
            counters: self.counters.snapshot(),
            inflight_fetches: self.flights.len(),
        }
    }

    /// Run the cold fetch on its own task so it outlives any one caller,
    /// then publish through the flight.
    fn spawn_cold_fetch(&self, canonical: CanonicalQuery, key: CacheKey, leader: FlightLeader) {
        let cold = self.cold.clone();
        let warm = self.warm.clone();
        let hot = self.hot.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            counters.cold_fetches.fetch_add(1, Ordering::Relaxed);
            let sql = canonical.to_sql();
            info!(key = %key, dataset = canonical.dataset(), "Cold fetch");

            match cold.run_query(&sql).await {
                Ok(table) => {
                    let entry = Arc::new(CacheEntry::new(
                        key,
                        canonical.dataset().to_string(),
                        Arc::new(table),
                    ));
                    // Warm first, then hot: once an entry is peekable the
                    // durable copy already exists.
                    if let Err(err) = warm.store(&entry).await {
                        warn!(key = %key, error = %err, "Warm write failed, hot tier only");
                    }
                    hot.put(entry.clone());
                    leader.complete(Ok(entry));
                }
                Err(err) => {
                    counters.cold_failures.fetch_add(1, Ordering::Relaxed);
                    error!(key = %key, error = %err, "Cold fetch failed");
                    leader.complete(Err(Arc::new(err)));
                }
            }
        });
    }

    fn fresh_outcome(
        &self,
        entry: Arc<CacheEntry>,
        origin: Origin,
        now: SystemTime,
    ) -> QueryOutcome {
        QueryOutcome {
            age: entry.age(now),
            table: entry.table.clone(),
            origin,
            stale: false,
            warning: None,
        }
    }

    /// The warehouse is down; serve an expired entry if either tier still
    /// holds one.
    async fn stale_fallback(
        &self,
        key: &CacheKey,
        cold_err: Arc<ColdStoreError>,
    ) -> Result<QueryOutcome, CacheError> {
        let entry = match self.hot.peek(key) {
            Some(entry) => Some(entry),
            None => match self.warm.fetch(key).await {
                Ok(Some(entry)) => {
                    let entry = Arc::new(entry);
                    self.hot.put(entry.clone());
                    Some(entry)
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(key = %key, error = %err, "Warm read failed during stale fallback");
                    None
                }
            },
        };

        match entry {
            Some(entry) => {
                let now = SystemTime::now();
                let age = entry.age(now);
                self.counters.stale_fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    age_secs = age.as_secs(),
                    error = %cold_err,
                    "Warehouse unavailable, serving stale entry"
                );
                Ok(QueryOutcome {
                    table: entry.table.clone(),
                    origin: Origin::StaleFallback,
                    age,
                    stale: true,
                    warning: Some(format!(
                        "warehouse unavailable; serving cached results {}s old",
                        age.as_secs()
                    )),
                })
            }
            None => Err(CacheError::Cold(cold_err)),
        }
    }
}
