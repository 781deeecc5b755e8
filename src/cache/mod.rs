//! Tiered result-cache management.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`entry`]: CacheEntry and result-origin tags
//! - [`hot`]: process-local LRU tier
//! - [`warm`]: durable object-storage tier and its on-disk codec
//! - [`freshness`]: per-dataset max-staleness policy
//! - [`singleflight`]: per-key in-flight fetch deduplication
//! - [`orchestrator`]: Hot → Warm → Cold lookup and populate-up

pub mod entry;
pub mod freshness;
pub mod hot;
pub mod orchestrator;
pub mod singleflight;
pub mod warm;
