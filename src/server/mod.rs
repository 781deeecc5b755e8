//! HTTP surface for the cache.
//!
//! - [`api`]: request/response types and route handlers
//!
//! The dashboard/presentation layer is an external consumer of these routes;
//! it sees rows, columns, and a freshness tag, never tier internals.

pub mod api;
