//! Object-storage-style blob backend for the warm tier.
//!
//! The warm store talks to a [`BlobStore`]: get/put/delete of opaque byte
//! blobs under string keys. [`FsBlobStore`] is the directory-backed
//! implementation; [`MemoryBlobStore`] backs tests and single-node setups.
//!
//! Writes are atomic from a reader's point of view: blobs are written to a
//! temporary name and renamed into place, so a concurrent reader sees either
//! the old blob, the new blob, or nothing — never a partial write. Concurrent
//! writers to the same key resolve last-write-wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid blob key {0:?}")]
    InvalidKey(String),
}

/// Byte-blob storage seam. Deployment backends (GCS, S3) and the local
/// filesystem implement the same three calls.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob; `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BlobStoreError>;

    /// Publish a blob under a key, replacing any previous blob atomically.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobStoreError>;

    /// Remove a blob. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
}

/// Filesystem-backed blob store.
///
/// Keys map to a two-level sharded layout (`ab/abcdef….qrs.zst`) to keep
/// directory fanout bounded with many cached queries.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a blob store rooted at `root`, creating the directory if
    /// needed.
    pub async fn new(root: PathBuf) -> Result<Self, BlobStoreError> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        // Keys are hex digests plus a format suffix; anything that could
        // escape the root is rejected outright.
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(BlobStoreError::InvalidKey(key.to_string()));
        }
        let shard = &key[..key.len().min(2)];
        Ok(self.root.join(shard).join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BlobStoreError> {
        let path = self.blob_path(key)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!(key, size = data.len(), "Read blob");
                Ok(Some(Bytes::from(data)))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobStoreError> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write-to-temporary-then-rename publish. The temp name carries a
        // random component so concurrent writers of the same key cannot
        // collide; the final rename is last-write-wins.
        let tmp = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key, size = data.len(), path = %path.display(), "Published blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted blob");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory blob store for tests and single-node runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a stored blob with arbitrary bytes. Test hook for
    /// corruption scenarios.
    pub fn corrupt(&self, key: &str, garbage: Bytes) {
        self.blobs.lock().unwrap().insert(key.to_string(), garbage);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BlobStoreError> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobStoreError> {
        self.blobs.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}
