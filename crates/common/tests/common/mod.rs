//! Shared test utilities for archive integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ::common::archive::{
    ArchiveNode, EntryNode, ExportOptions, Exporter, ImportOptions, Importer, RootNode,
};
use ::common::linked_data::{Hash, Link};
use ::common::store::{BlobsStore, BlockStore, BlockStoreError};

/// Set up an on-disk blob store in a fresh temp dir
pub async fn setup_test_store() -> (Arc<BlobsStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let blob_path = temp_dir.path().join("blobs");
    let blobs = BlobsStore::fs(&blob_path).await.unwrap();
    (Arc::new(blobs), temp_dir)
}

pub async fn memory_store() -> Arc<BlobsStore> {
    Arc::new(BlobsStore::memory().await.unwrap())
}

/// One entry of a fixture archive
pub enum Fixture {
    File(String, Vec<u8>),
    Dir(String),
    Symlink(String, String),
}

impl Fixture {
    pub fn file(name: &str, data: impl Into<Vec<u8>>) -> Self {
        Fixture::File(name.to_string(), data.into())
    }

    pub fn dir(name: &str) -> Self {
        Fixture::Dir(name.to_string())
    }

    pub fn symlink(name: &str, target: &str) -> Self {
        Fixture::Symlink(name.to_string(), target.to_string())
    }
}

// Every numeric field has to be set: the tar reader refuses
//  empty ones
fn base_header(kind: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_mode(mode);
    header.set_uid(1000);
    header.set_gid(100);
    header.set_mtime(1_700_000_000);
    header.set_size(size);
    header.set_entry_type(kind);
    header.set_username("builder").unwrap();
    header.set_groupname("users").unwrap();
    header
}

/// Build a GNU tar archive in memory with `tar::Builder`
pub fn build_archive(entries: &[Fixture]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        match entry {
            Fixture::File(name, data) => {
                let mut header = base_header(tar::EntryType::Regular, 0o644, data.len() as u64);
                builder
                    .append_data(&mut header, name, Cursor::new(data))
                    .unwrap();
            }
            Fixture::Dir(name) => {
                let mut header = base_header(tar::EntryType::Directory, 0o755, 0);
                builder
                    .append_data(&mut header, name, std::io::empty())
                    .unwrap();
            }
            Fixture::Symlink(name, target) => {
                let mut header = base_header(tar::EntryType::Symlink, 0o777, 0);
                builder.append_link(&mut header, name, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

/// Deterministic pseudo-random bytes
pub fn noise(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

pub async fn import<S: BlockStore + 'static>(
    store: &Arc<S>,
    archive: Vec<u8>,
    options: ImportOptions,
) -> Link {
    Importer::new(store.clone(), options)
        .import(Cursor::new(archive), CancellationToken::new())
        .await
        .unwrap()
}

pub async fn export<S: BlockStore + 'static>(store: &Arc<S>, root: &Link) -> Vec<u8> {
    let mut out = Vec::new();
    Exporter::new(store.clone(), ExportOptions::default())
        .export_to_writer(root, &mut out, CancellationToken::new())
        .await
        .unwrap();
    out
}

/// Read entries of a tar stream back as (name, content) pairs
pub fn read_archive(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut archive = tar::Archive::new(Cursor::new(data));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = String::from_utf8(entry.path_bytes().into_owned()).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (name, content)
        })
        .collect()
}

pub async fn load_root<S: BlockStore>(store: &S, root: &Link) -> RootNode {
    let data = store.get(&root.hash()).await.unwrap();
    ArchiveNode::from_block(&data).unwrap().into_root().unwrap()
}

pub async fn load_entries<S: BlockStore>(store: &S, root: &Link) -> Vec<EntryNode> {
    let mut entries = Vec::new();
    for link in load_root(store, root).await.entries {
        let data = store.get(&link.hash()).await.unwrap();
        entries.push(ArchiveNode::from_block(&data).unwrap().into_entry().unwrap());
    }
    entries
}

/// Store wrapper that delays each write by a hash-derived amount,
///  so writes complete out of issue order
pub struct JitterStore {
    pub inner: Arc<BlobsStore>,
}

#[async_trait]
impl BlockStore for JitterStore {
    async fn put(&self, data: Bytes) -> Result<Hash, BlockStoreError> {
        let delay = Hash::new(&data).as_bytes()[0] % 8;
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        BlockStore::put(self.inner.as_ref(), data).await
    }

    async fn get(&self, hash: &Hash) -> Result<Bytes, BlockStoreError> {
        let delay = hash.as_bytes()[1] % 8;
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        BlockStore::get(self.inner.as_ref(), hash).await
    }

    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError> {
        BlockStore::has(self.inner.as_ref(), hash).await
    }
}

/// Store wrapper that records every write and can be told to fail
pub struct RecordingStore {
    pub inner: Arc<BlobsStore>,
    pub puts: Mutex<Vec<Hash>>,
    pub fail_after: Option<usize>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub put_delay: Duration,
}

impl RecordingStore {
    pub fn new(inner: Arc<BlobsStore>) -> Self {
        Self {
            inner,
            puts: Mutex::new(Vec::new()),
            fail_after: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            put_delay: Duration::ZERO,
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

#[async_trait]
impl BlockStore for RecordingStore {
    async fn put(&self, data: Bytes) -> Result<Hash, BlockStoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        let result = match self.fail_after {
            Some(limit) if self.put_count() >= limit => {
                Err(BlockStoreError::Default(anyhow::anyhow!("store is full")))
            }
            _ => BlockStore::put(self.inner.as_ref(), data).await,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let hash = result?;
        self.puts.lock().unwrap().push(hash);
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Bytes, BlockStoreError> {
        BlockStore::get(self.inner.as_ref(), hash).await
    }

    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError> {
        BlockStore::has(self.inner.as_ref(), hash).await
    }
}
