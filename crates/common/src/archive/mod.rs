//! Tar archive <-> DAG translation
//!
//! An imported archive is stored as three layers of blocks:
//!
//! ```text
//! Root { entries: [Link] }              dag-cbor, archive order
//!   └─ Entry { header, content: [Link] } dag-cbor, one per tar entry
//!        └─ leaf                          raw bytes, at most chunk_size
//! ```
//!
//! [`Importer`] walks a tar stream and writes these blocks through a
//! [`BlockStore`](crate::store::BlockStore); [`Exporter`] walks them back
//! into a tar stream. Identical chunks hash to the same leaf, so repeated
//! content is stored once, across entries and across archives.

mod chunker;
mod error;
mod export;
mod header;
mod import;
mod node;

pub use chunker::{Chunker, DEFAULT_CHUNK_SIZE};
pub use error::ArchiveError;
pub use export::{ExportOptions, ExportStream, Exporter};
pub use header::{end_of_archive, header_blocks, padding, BLOCK_SIZE};
pub use import::{ImportOptions, ImportSummary, Importer};
pub use node::{leaf_block, ArchiveNode, EntryHeader, EntryKind, EntryNode, RootNode};

/// Default number of store operations kept in flight
pub const DEFAULT_CONCURRENCY: usize = 8;
