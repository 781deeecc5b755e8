//! Cache entries and result-origin tags.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::query::CacheKey;
use crate::table::ResultTable;

/// Which tier a result came out of. Returned to the caller with every
/// response so the UI can show a freshness indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Hot,
    Warm,
    Cold,
    StaleFallback,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Hot => write!(f, "hot"),
            Origin::Warm => write!(f, "warm"),
            Origin::Cold => write!(f, "cold"),
            Origin::StaleFallback => write!(f, "stale-fallback"),
        }
    }
}

/// One cached result set.
///
/// The payload is immutable once published; re-fetching a key produces a new
/// entry with a new `created_at` rather than mutating this one. Hot-tier
/// copies are `Arc`-shared with in-flight callers, warm-tier copies are the
/// serialized form of exactly these fields.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key this entry was stored under.
    pub key: CacheKey,

    /// Dataset the query ran against; drives the freshness window.
    pub dataset: String,

    /// When the cold store produced this payload.
    pub created_at: SystemTime,

    /// The columnar payload.
    pub table: Arc<ResultTable>,
}

impl CacheEntry {
    /// Create an entry stamped now. Used on a successful cold fetch.
    pub fn new(key: CacheKey, dataset: String, table: Arc<ResultTable>) -> Self {
        Self {
            key,
            dataset,
            created_at: SystemTime::now(),
            table,
        }
    }

    /// Create an entry with an explicit creation time (warm-store decode,
    /// tests).
    pub fn with_created_at(
        key: CacheKey,
        dataset: String,
        table: Arc<ResultTable>,
        created_at: SystemTime,
    ) -> Self {
        Self {
            key,
            dataset,
            created_at,
            table,
        }
    }

    /// Entry age at `now`. An entry stamped ahead of `now` (replica clock
    /// skew through the warm store) counts as zero age.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.created_at).unwrap_or(Duration::ZERO)
    }

    /// Approximate resident size, for hot-store byte accounting.
    pub fn approx_bytes(&self) -> usize {
        self.table.approx_bytes() + self.dataset.len() + 96
    }
}
