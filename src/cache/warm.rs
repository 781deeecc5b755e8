//! Warm store: durable result cache in object storage.
//!
//! Shared across every replica and survives restarts. Entries are serialized
//! as a versioned JSON envelope and zstd-compressed before hitting the blob
//! backend; decode failures of any kind are soft misses for the orchestrator,
//! never fatal errors.
//!
//! There is no cross-instance locking — the blob backend's atomic publish
//! plus last-write-wins is the whole coherence story, and both writers were
//! caching the same warehouse answer anyway.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::query::CacheKey;
use crate::store::blob::{BlobStore, BlobStoreError};
use crate::table::ResultTable;

/// On-disk format version. Bump when the envelope changes shape; readers
/// treat unknown versions as a miss and re-fetch.
const FORMAT_VERSION: u32 = 1;

/// Object key suffix: query result set, zstd-compressed.
const OBJECT_SUFFIX: &str = ".qrs.zst";

#[derive(Error, Debug)]
pub enum WarmStoreError {
    #[error("blob backend error: {0}")]
    Blob(#[from] BlobStoreError),

    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("envelope encode/decode error: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("unsupported warm format version {0}")]
    FormatVersion(u32),

    #[error("blob key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },
}

/// Serialized form of a cache entry. Round-trips column names, types, and
/// values exactly.
#[derive(Serialize, Deserialize)]
struct WarmEnvelope {
    version: u32,
    key: String,
    dataset: String,
    created_at_unix_ms: u64,
    table: ResultTable,
}

/// The warm tier. Cheap to clone; clones share the blob backend.
#[derive(Clone)]
pub struct WarmStore {
    blob: Arc<dyn BlobStore>,
    zstd_level: i32,
}

impl WarmStore {
    pub fn new(blob: Arc<dyn BlobStore>, zstd_level: i32) -> Self {
        Self { blob, zstd_level }
    }

    /// Object key for a cache key.
    pub fn object_key(key: &CacheKey) -> String {
        format!("{key}{OBJECT_SUFFIX}")
    }

    /// Fetch and decode the entry for `key`, if present.
    ///
    /// Every error here is recoverable from the orchestrator's point of
    /// view: it logs and falls through to the cold store.
    pub async fn fetch(&self, key: &CacheKey) -> Result<Option<CacheEntry>, WarmStoreError> {
        let object_key = Self::object_key(key);
        let Some(blob) = self.blob.get(&object_key).await? else {
            return Ok(None);
        };

        let decompressed = zstd::decode_all(&blob[..])?;
        let envelope: WarmEnvelope = serde_json::from_slice(&decompressed)?;

        if envelope.version != FORMAT_VERSION {
            return Err(WarmStoreError::FormatVersion(envelope.version));
        }
        let expected = key.to_hex();
        if envelope.key != expected {
            return Err(WarmStoreError::KeyMismatch {
                expected,
                found: envelope.key,
            });
        }

        let created_at = UNIX_EPOCH + Duration::from_millis(envelope.created_at_unix_ms);
        debug!(
            key = %key,
            rows = envelope.table.num_rows(),
            compressed_bytes = blob.len(),
            "Warm hit"
        );

        Ok(Some(CacheEntry::with_created_at(
            *key,
            envelope.dataset,
            Arc::new(envelope.table),
            created_at,
        )))
    }

    /// Serialize and publish an entry.
    pub async fn store(&self, entry: &CacheEntry) -> Result<(), WarmStoreError> {
        let created_at_unix_ms = entry
            .created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;

        let envelope = WarmEnvelope {
            version: FORMAT_VERSION,
            key: entry.key.to_hex(),
            dataset: entry.dataset.clone(),
            created_at_unix_ms,
            table: (*entry.table).clone(),
        };

        let encoded = serde_json::to_vec(&envelope)?;
        let compressed = zstd::encode_all(&encoded[..], self.zstd_level)?;

        debug!(
            key = %entry.key,
            raw_bytes = encoded.len(),
            compressed_bytes = compressed.len(),
            "Publishing warm entry"
        );
        self.blob
            .put(&Self::object_key(&entry.key), Bytes::from(compressed))
            .await?;
        Ok(())
    }

    /// Remove the entry for `key`, if any.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), WarmStoreError> {
        self.blob.delete(&Self::object_key(key)).await?;
        Ok(())
    }
}
