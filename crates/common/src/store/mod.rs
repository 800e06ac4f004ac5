//! Content-addressed block storage
//!
//! The archive importer and exporter only ever talk to storage through
//! [`BlockStore`]: `put` hands bytes to the store and gets back the hash the
//! store addressed them by, `get` returns the bytes for a hash or
//! [`BlockStoreError::NotFound`]. Addressing is entirely the store's job.
//!
//! [`BlobsStore`] is the shipped implementation, backed by iroh-blobs.

mod blobs_store;

use async_trait::async_trait;
use bytes::Bytes;

use crate::linked_data::Hash;

pub use blobs_store::{BlobsStore, BlobsStoreError};

#[derive(Debug, thiserror::Error)]
pub enum BlockStoreError {
    #[error("block not found: {0}")]
    NotFound(Hash),
    #[error("blobs store error: {0}")]
    Blobs(#[from] BlobsStoreError),
    #[error("block store error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A content-addressed block store.
///
/// Implementations must be safe to call concurrently, and `put` must be
///  idempotent: storing the same bytes twice yields the same hash and
///  leaves the store unchanged the second time.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist a block, returning the hash it is addressed by
    async fn put(&self, data: Bytes) -> Result<Hash, BlockStoreError>;

    /// Fetch a block by hash
    async fn get(&self, hash: &Hash) -> Result<Bytes, BlockStoreError>;

    /// Check whether a block is present
    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError>;
}

#[async_trait]
impl BlockStore for BlobsStore {
    async fn put(&self, data: Bytes) -> Result<Hash, BlockStoreError> {
        let len = data.len();
        let hash = BlobsStore::put(self, data).await?;
        tracing::debug!("BlockStore::put stored {} bytes at {}", len, hash);
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Bytes, BlockStoreError> {
        // the empty blob is implicitly present in every iroh store
        if *hash == empty_hash() {
            return Ok(Bytes::new());
        }
        if !self.stat(hash).await? {
            tracing::debug!("BlockStore::get: hash {} not present", hash);
            return Err(BlockStoreError::NotFound(*hash));
        }
        Ok(BlobsStore::get(self, hash).await?)
    }

    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError> {
        if *hash == empty_hash() {
            return Ok(true);
        }
        Ok(self.stat(hash).await?)
    }
}

fn empty_hash() -> Hash {
    Hash::new([])
}
