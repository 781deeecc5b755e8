//! Backing stores behind the cache tiers.
//!
//! - [`blob`]: object-storage-style byte store backing the warm tier
//! - [`warehouse`]: cold-store client issuing queries against the warehouse

pub mod blob;
pub mod warehouse;
