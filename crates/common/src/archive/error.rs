use crate::linked_data::Link;
use crate::store::BlockStoreError;

/// Errors surfaced by archive import and export.
///  Every variant aborts the running operation; an import
///  that fails never yields a root link.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive stream (or export sink) failed at the i/o level
    #[error("stream i/o error: {0}")]
    StreamRead(#[from] std::io::Error),
    /// Declared metadata disagrees with the content actually present
    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),
    /// A stored node does not decode as the kind of node expected
    #[error("structural corruption: {0}")]
    StructuralCorrupt(String),
    #[error("block store error: {0}")]
    Store(#[from] BlockStoreError),
    #[error("block not found: {0}")]
    NotFound(Link),
    /// The archive uses a feature outside the supported entry model
    #[error("unsupported archive entry: {0}")]
    Unsupported(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}
