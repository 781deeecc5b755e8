//! Freshness policy: is a cached entry still usable?
//!
//! A pure function of entry age and configuration. The verdict is computed at
//! read time and never stored; the same entry can be fresh for one dataset's
//! window and stale under another configuration.

use std::time::{Duration, SystemTime};

use crate::cache::entry::CacheEntry;
use crate::config::FreshnessConfig;

/// Per-dataset max-staleness windows with a default.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    config: FreshnessConfig,
}

impl FreshnessPolicy {
    pub fn new(config: FreshnessConfig) -> Self {
        Self { config }
    }

    /// The max-staleness window for a dataset.
    pub fn max_staleness(&self, dataset: &str) -> Duration {
        self.config.max_staleness(dataset)
    }

    /// Whether `entry` is still fresh at `now`. Deterministic given the same
    /// `now`; no side effects.
    pub fn is_fresh(&self, entry: &CacheEntry, now: SystemTime) -> bool {
        entry.age(now) <= self.max_staleness(&entry.dataset)
    }
}
