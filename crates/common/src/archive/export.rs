use std::sync::Arc;

use bytes::Bytes;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::linked_data::{Link, LD_CBOR_CODEC, LD_RAW_CODEC};
use crate::store::{BlockStore, BlockStoreError};

use super::header::{end_of_archive, header_blocks, zero_padding};
use super::node::{ArchiveNode, EntryHeader, EntryNode, RootNode};
use super::{ArchiveError, DEFAULT_CONCURRENCY};

/// A tar byte stream rebuilt from the store.
///  Ends after the first error.
pub type ExportStream = BoxStream<'static, Result<Bytes, ArchiveError>>;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Maximum number of store reads in flight, per level
    pub concurrency: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.concurrency == 0 {
            return Err(ArchiveError::InvalidOptions(
                "concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rebuilds tar streams from stored roots.
pub struct Exporter<S> {
    store: Arc<S>,
    options: ExportOptions,
}

impl<S: BlockStore + 'static> Exporter<S> {
    pub fn new(store: Arc<S>, options: ExportOptions) -> Self {
        Self { store, options }
    }

    /// Start exporting the archive under `root`.
    ///  The root node is read before this returns, so a missing or
    ///  malformed root fails here rather than inside the stream.
    pub async fn export(
        &self,
        root: &Link,
        cancel: CancellationToken,
    ) -> Result<ExportStream, ArchiveError> {
        self.options.validate()?;
        let root_node = fetch_root(self.store.as_ref(), root).await?;
        tracing::debug!(
            "exporting archive {} with {} entries",
            root,
            root_node.entries.len()
        );

        let concurrency = self.options.concurrency;
        let store = self.store.clone();
        let entries = entry_nodes(self.store.clone(), root_node.entries, concurrency);
        let body = entries
            .map(move |entry| match entry {
                Ok(entry) => entry_stream(store.clone(), entry, concurrency).left_stream(),
                Err(e) => stream::once(future::ready(Err(e))).right_stream(),
            })
            .flatten();

        let cancelled = cancel.clone();
        let trailer = stream::once(async move {
            if cancelled.is_cancelled() {
                Err(ArchiveError::Cancelled)
            } else {
                Ok(end_of_archive())
            }
        });

        let stream = body
            .take_until(cancel.cancelled_owned())
            .chain(trailer)
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            });

        Ok(stream.boxed())
    }

    /// Export the archive under `root` into `writer`, returning the
    ///  number of bytes written
    pub async fn export_to_writer<W>(
        &self,
        root: &Link,
        writer: &mut W,
        cancel: CancellationToken,
    ) -> Result<u64, ArchiveError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.export(root, cancel).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        tracing::info!("exported archive {}: {} bytes", root, written);
        Ok(written)
    }

    /// Read the metadata of every entry under `root`, in archive order
    pub async fn list(
        &self,
        root: &Link,
        cancel: CancellationToken,
    ) -> Result<Vec<EntryHeader>, ArchiveError> {
        self.options.validate()?;
        let root_node = fetch_root(self.store.as_ref(), root).await?;
        let headers = entry_nodes(
            self.store.clone(),
            root_node.entries,
            self.options.concurrency,
        )
        .map_ok(|entry| entry.header)
        .try_collect::<Vec<_>>();

        tokio::select! {
            _ = cancel.cancelled() => Err(ArchiveError::Cancelled),
            headers = headers => headers,
        }
    }
}

// Entry nodes, fetched ahead with bounded concurrency but
//  yielded in root order
fn entry_nodes<S: BlockStore + 'static>(
    store: Arc<S>,
    links: Vec<Link>,
    concurrency: usize,
) -> BoxStream<'static, Result<EntryNode, ArchiveError>> {
    stream::iter(links)
        .map(move |link| {
            let store = store.clone();
            async move { fetch_node(store.as_ref(), &link).await?.into_entry() }
        })
        .buffered(concurrency)
        .boxed()
}

struct EntryBody {
    leaves: BoxStream<'static, Result<Bytes, ArchiveError>>,
    name: String,
    size: u64,
    seen: u64,
    done: bool,
}

// Header block(s), then content checked against the recorded size,
//  then padding out to the next block
fn entry_stream<S: BlockStore + 'static>(
    store: Arc<S>,
    entry: EntryNode,
    concurrency: usize,
) -> BoxStream<'static, Result<Bytes, ArchiveError>> {
    let header = stream::once(future::ready(header_blocks(&entry.header)));

    let leaves = stream::iter(entry.content)
        .map(move |link| fetch_leaf(store.clone(), link))
        .buffered(concurrency)
        .boxed();
    let state = EntryBody {
        leaves,
        name: entry.header.name,
        size: entry.header.size,
        seen: 0,
        done: false,
    };

    let body = stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            match state.leaves.next().await {
                Some(Ok(data)) => {
                    state.seen += data.len() as u64;
                    if state.seen > state.size {
                        state.done = true;
                        let err = size_mismatch(&state.name, state.size, state.seen);
                        return Some((Err(err), state));
                    }
                    if data.is_empty() {
                        continue;
                    }
                    return Some((Ok(data), state));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    if state.seen != state.size {
                        let err = size_mismatch(&state.name, state.size, state.seen);
                        return Some((Err(err), state));
                    }
                    let padding = zero_padding(state.size);
                    if padding.is_empty() {
                        return None;
                    }
                    return Some((Ok(padding), state));
                }
            }
        }
    });

    header.chain(body).boxed()
}

fn size_mismatch(name: &str, size: u64, seen: u64) -> ArchiveError {
    ArchiveError::ArchiveCorrupt(format!(
        "entry {} records {} bytes but its leaves hold at least {}",
        name, size, seen
    ))
}

async fn fetch_leaf<S: BlockStore>(store: Arc<S>, link: Link) -> Result<Bytes, ArchiveError> {
    if link.codec() != LD_RAW_CODEC {
        return Err(ArchiveError::StructuralCorrupt(format!(
            "expected a raw leaf at {}",
            link
        )));
    }
    fetch_block(store.as_ref(), &link).await
}

async fn fetch_root<S: BlockStore>(store: &S, root: &Link) -> Result<RootNode, ArchiveError> {
    fetch_node(store, root).await?.into_root()
}

async fn fetch_node<S: BlockStore>(store: &S, link: &Link) -> Result<ArchiveNode, ArchiveError> {
    if link.codec() != LD_CBOR_CODEC {
        return Err(ArchiveError::StructuralCorrupt(format!(
            "expected a dag-cbor node at {}",
            link
        )));
    }
    let data = fetch_block(store, link).await?;
    ArchiveNode::from_block(&data)
}

async fn fetch_block<S: BlockStore>(store: &S, link: &Link) -> Result<Bytes, ArchiveError> {
    let hash = link.hash();
    match store.get(&hash).await {
        Ok(data) => {
            tracing::debug!("fetched block {} ({} bytes)", link, data.len());
            Ok(data)
        }
        Err(BlockStoreError::NotFound(_)) => Err(ArchiveError::NotFound(*link)),
        Err(e) => Err(e.into()),
    }
}
