use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::linked_data::{Link, LD_CBOR_CODEC, LD_RAW_CODEC};
use crate::store::BlockStore;

use super::chunker::{Chunker, DEFAULT_CHUNK_SIZE};
use super::header::read_entry_header;
use super::node::{leaf_block, ArchiveNode, EntryHeader};
use super::{ArchiveError, DEFAULT_CONCURRENCY};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Maximum leaf size in bytes
    pub chunk_size: usize,
    /// Maximum number of store writes in flight
    pub concurrency: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ImportOptions {
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.chunk_size == 0 {
            return Err(ArchiveError::InvalidOptions(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ArchiveError::InvalidOptions(
                "concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What an import produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub root: Link,
    pub entries: usize,
    /// Leaves written, counting repeated chunks each time
    pub leaves: usize,
    /// Total content bytes across all entries
    pub bytes: u64,
}

/// Events sent from the blocking archive reader to the import loop.
///  For every entry: one `Entry`, its `Chunk`s in order, one `EntryDone`.
#[derive(Debug)]
pub(crate) enum ImportEvent {
    Entry(EntryHeader),
    Chunk(Bytes),
    EntryDone,
}

/// A store write the accumulator wants issued
#[derive(Debug)]
pub(crate) enum Work {
    PutLeaf {
        slot: usize,
        index: usize,
        chunk: Bytes,
    },
    PutEntry {
        slot: usize,
        node: ArchiveNode,
    },
}

/// A finished store write, tagged with the position it was issued for
#[derive(Debug)]
pub(crate) enum Stored {
    Leaf {
        slot: usize,
        index: usize,
        link: Link,
        len: usize,
    },
    Entry {
        slot: usize,
        link: Link,
    },
}

#[derive(Debug)]
struct OpenEntry {
    header: EntryHeader,
    content: Vec<Option<Link>>,
    pending: usize,
    sealed: bool,
}

/// Owned assembly state for one import.
///  Every entry gets a slot when its header is seen, and every
///  leaf an index within its entry, so store writes may finish in
///  any order without disturbing archive order.
#[derive(Debug, Default)]
pub(crate) struct ImportAccumulator {
    entries: Vec<Option<Link>>,
    open: HashMap<usize, OpenEntry>,
    current: Option<usize>,
    leaves: usize,
    bytes: u64,
}

impl ImportAccumulator {
    pub fn on_event(&mut self, event: ImportEvent) -> Result<Option<Work>, ArchiveError> {
        match event {
            ImportEvent::Entry(header) => {
                if self.current.is_some() {
                    return Err(out_of_sequence("entry header inside another entry"));
                }
                let slot = self.entries.len();
                self.entries.push(None);
                self.open.insert(
                    slot,
                    OpenEntry {
                        header,
                        content: Vec::new(),
                        pending: 0,
                        sealed: false,
                    },
                );
                self.current = Some(slot);
                Ok(None)
            }
            ImportEvent::Chunk(chunk) => {
                let slot = self
                    .current
                    .ok_or_else(|| out_of_sequence("content outside of an entry"))?;
                let entry = self.open_entry(slot)?;
                let index = entry.content.len();
                entry.content.push(None);
                entry.pending += 1;
                Ok(Some(Work::PutLeaf { slot, index, chunk }))
            }
            ImportEvent::EntryDone => {
                let slot = self
                    .current
                    .take()
                    .ok_or_else(|| out_of_sequence("entry end without an entry"))?;
                self.open_entry(slot)?.sealed = true;
                self.try_close(slot)
            }
        }
    }

    pub fn on_stored(&mut self, stored: Stored) -> Result<Option<Work>, ArchiveError> {
        match stored {
            Stored::Leaf {
                slot,
                index,
                link,
                len,
            } => {
                let entry = self.open_entry(slot)?;
                entry.content[index] = Some(link);
                entry.pending -= 1;
                self.leaves += 1;
                self.bytes += len as u64;
                self.try_close(slot)
            }
            Stored::Entry { slot, link } => {
                self.entries[slot] = Some(link);
                Ok(None)
            }
        }
    }

    // Once an entry has seen all of its content and every leaf
    //  is stored, its node can be built
    fn try_close(&mut self, slot: usize) -> Result<Option<Work>, ArchiveError> {
        let ready = self
            .open
            .get(&slot)
            .is_some_and(|entry| entry.sealed && entry.pending == 0);
        if !ready {
            return Ok(None);
        }
        let entry = self
            .open
            .remove(&slot)
            .ok_or_else(|| out_of_sequence("closing an unknown entry"))?;
        let content = entry
            .content
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| out_of_sequence("entry closed with missing leaves"))?;
        Ok(Some(Work::PutEntry {
            slot,
            node: ArchiveNode::entry(entry.header, content),
        }))
    }

    fn open_entry(&mut self, slot: usize) -> Result<&mut OpenEntry, ArchiveError> {
        self.open
            .get_mut(&slot)
            .ok_or_else(|| out_of_sequence("no open entry for slot"))
    }

    /// Entry links in archive order, once everything has been stored
    pub fn finish(self) -> Result<(Vec<Link>, usize, u64), ArchiveError> {
        if self.current.is_some() || !self.open.is_empty() {
            return Err(out_of_sequence("archive ended inside an entry"));
        }
        let entries = self
            .entries
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| out_of_sequence("archive ended with unstored entries"))?;
        Ok((entries, self.leaves, self.bytes))
    }
}

fn out_of_sequence(msg: &str) -> ArchiveError {
    ArchiveError::ArchiveCorrupt(format!("import out of sequence: {}", msg))
}

/// Stores a tar stream as a DAG.
pub struct Importer<S> {
    store: Arc<S>,
    options: ImportOptions,
}

impl<S: BlockStore + 'static> Importer<S> {
    pub fn new(store: Arc<S>, options: ImportOptions) -> Self {
        Self { store, options }
    }

    /// Import a tar stream, returning the link to its root node
    pub async fn import<R>(&self, reader: R, cancel: CancellationToken) -> Result<Link, ArchiveError>
    where
        R: Read + Send + 'static,
    {
        Ok(self.import_with_summary(reader, cancel).await?.root)
    }

    pub async fn import_with_summary<R>(
        &self,
        reader: R,
        cancel: CancellationToken,
    ) -> Result<ImportSummary, ArchiveError>
    where
        R: Read + Send + 'static,
    {
        self.options.validate()?;
        let concurrency = self.options.concurrency;
        let chunk_size = self.options.chunk_size;

        // The tar reader is blocking; it runs on its own thread and
        //  stalls once the channel is full
        let (tx, rx) = flume::bounded(concurrency);
        let mut reader = Some(tokio::task::spawn_blocking(move || {
            read_archive(reader, chunk_size, tx)
        }));

        let mut acc = ImportAccumulator::default();
        let mut in_flight = FuturesUnordered::new();

        loop {
            let can_read = reader.is_some() && in_flight.len() < concurrency;
            if !can_read && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("import cancelled with {} writes in flight", in_flight.len());
                    return Err(ArchiveError::Cancelled);
                }
                Some(stored) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Some(work) = acc.on_stored(stored?)? {
                        in_flight.push(self.issue(work)?);
                    }
                }
                event = rx.recv_async(), if can_read => match event {
                    Ok(event) => {
                        if let Some(work) = acc.on_event(event)? {
                            in_flight.push(self.issue(work)?);
                        }
                    }
                    // The reader hung up: either it is done or it failed
                    Err(_) => {
                        if let Some(handle) = reader.take() {
                            handle
                                .await
                                .map_err(|e| ArchiveError::StreamRead(std::io::Error::other(e)))??;
                        }
                    }
                },
            }
        }

        let (entries, leaves, bytes) = acc.finish()?;
        let count = entries.len();
        let root = ArchiveNode::root(entries).to_block()?;
        let hash = self.store.put(root).await?;
        let root = Link::new(LD_CBOR_CODEC, hash);

        tracing::info!(
            "imported archive {}: {} entries, {} leaves, {} bytes",
            root,
            count,
            leaves,
            bytes
        );
        Ok(ImportSummary {
            root,
            entries: count,
            leaves,
            bytes,
        })
    }

    fn issue(&self, work: Work) -> Result<BoxFuture<'static, Result<Stored, ArchiveError>>, ArchiveError> {
        let store = self.store.clone();
        match work {
            Work::PutLeaf { slot, index, chunk } => Ok(async move {
                let len = chunk.len();
                let hash = store.put(leaf_block(chunk)).await?;
                Ok(Stored::Leaf {
                    slot,
                    index,
                    link: Link::new(LD_RAW_CODEC, hash),
                    len,
                })
            }
            .boxed()),
            Work::PutEntry { slot, node } => {
                let block = node.to_block()?;
                Ok(async move {
                    let hash = store.put(block).await?;
                    let link = Link::new(LD_CBOR_CODEC, hash);
                    tracing::debug!("stored entry node {} at position {}", link, slot);
                    Ok(Stored::Entry { slot, link })
                }
                .boxed())
            }
        }
    }
}

// Walk the tar stream on a blocking thread, feeding the import loop.
//  Returns early without error if the loop has gone away.
fn read_archive<R: Read>(
    reader: R,
    chunk_size: usize,
    tx: flume::Sender<ImportEvent>,
) -> Result<(), ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                ArchiveError::ArchiveCorrupt(format!("truncated archive: {}", e))
            }
            _ => ArchiveError::StreamRead(e),
        })?;
        let header = read_entry_header(&mut entry)?;
        let name = header.name.clone();
        let declared = header.size;
        let carries_content = header.carries_content();

        if tx.send(ImportEvent::Entry(header)).is_err() {
            return Ok(());
        }

        if carries_content {
            let mut read = 0u64;
            for chunk in Chunker::new(&mut entry, chunk_size) {
                let chunk = chunk?;
                read += chunk.len() as u64;
                if tx.send(ImportEvent::Chunk(chunk)).is_err() {
                    return Ok(());
                }
            }
            if read != declared {
                return Err(ArchiveError::ArchiveCorrupt(format!(
                    "entry {} declares {} bytes but {} are present",
                    name, declared, read
                )));
            }
        }

        if tx.send(ImportEvent::EntryDone).is_err() {
            return Ok(());
        }
    }
    Ok(())
}
