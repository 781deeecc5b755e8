//! tiercache: tiered query-result cache for analytics dashboards.
//!
//! Sits between an interactive UI and a slow, metered data warehouse and
//! serves per-user queries through three tiers:
//!   process memory (hot) → object storage (warm) → warehouse (cold)
//!
//! The orchestrator walks tiers fastest-first, populates faster tiers on a
//! slower hit, and deduplicates concurrent warehouse fetches per cache key.
//! Exposes a small HTTP API the presentation layer calls with a query
//! descriptor, getting back a columnar result plus a freshness tag.

pub mod cache;
pub mod config;
pub mod query;
pub mod server;
pub mod store;
pub mod table;
