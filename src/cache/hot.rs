//! Hot store: process-local in-memory LRU tier.
//!
//! Fastest tier, lost on restart, deliberately not shared across replicas.
//! Bounded by a resident-entry count and an approximate byte budget;
//! exceeding either evicts in strict least-recently-used order. The index is
//! mutex-guarded; payloads are immutable `Arc`s, so a peek hands out a cheap
//! clone and never blocks on I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::config::HotConfig;
use crate::query::CacheKey;

/// Hot-store occupancy snapshot, for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct HotStoreStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub evictions: u64,
}

struct Slot {
    entry: Arc<CacheEntry>,
    bytes: usize,
}

struct HotInner {
    slots: HashMap<CacheKey, Slot>,
    /// Recency queue: front is least recently used, back is most recent.
    /// Each resident key appears exactly once.
    order: VecDeque<CacheKey>,
    bytes: usize,
    evictions: u64,
}

/// The process-local LRU cache. Cheap to clone; clones share the index.
#[derive(Clone)]
pub struct HotStore {
    inner: Arc<Mutex<HotInner>>,
    max_entries: usize,
    max_bytes: usize,
}

impl HotStore {
    pub fn new(config: &HotConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HotInner {
                slots: HashMap::new(),
                order: VecDeque::new(),
                bytes: 0,
                evictions: 0,
            })),
            max_entries: config.max_entries,
            max_bytes: config.max_bytes,
        }
    }

    /// Look up an entry, refreshing its recency. Freshness-agnostic: the
    /// caller decides whether an old entry is still usable (or wanted as a
    /// stale fallback).
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.slots.get(key).map(|slot| slot.entry.clone())?;
        inner.order.retain(|k| k != key);
        inner.order.push_back(*key);
        Some(entry)
    }

    /// Insert or replace an entry, then evict LRU victims until both budgets
    /// are satisfied.
    pub fn put(&self, entry: Arc<CacheEntry>) {
        let key = entry.key;
        let bytes = entry.approx_bytes();

        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.slots.insert(key, Slot { entry, bytes }) {
            inner.bytes -= old.bytes;
        }
        inner.bytes += bytes;
        inner.order.retain(|k| k != &key);
        inner.order.push_back(key);

        while self.over_budget(&inner) {
            let Some(victim) = inner.order.pop_front() else {
                break;
            };
            if let Some(slot) = inner.slots.remove(&victim) {
                inner.bytes -= slot.bytes;
                inner.evictions += 1;
                debug!(key = %victim, bytes = slot.bytes, "Evicted hot entry");
            }
        }
    }

    fn over_budget(&self, inner: &HotInner) -> bool {
        (self.max_entries > 0 && inner.slots.len() > self.max_entries)
            || (self.max_bytes > 0 && inner.bytes > self.max_bytes)
    }

    /// Remove a specific entry. Returns whether one was resident.
    pub fn evict(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.slots.remove(key) {
            Some(slot) => {
                inner.bytes -= slot.bytes;
                inner.order.retain(|k| k != key);
                true
            }
            None => false,
        }
    }

    /// Drop every resident entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.clear();
        inner.order.clear();
        inner.bytes = 0;
    }

    pub fn stats(&self) -> HotStoreStats {
        let inner = self.inner.lock().unwrap();
        HotStoreStats {
            entries: inner.slots.len(),
            bytes: inner.bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            evictions: inner.evictions,
        }
    }
}
