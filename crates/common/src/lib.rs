/**
 * Tar archive <-> DAG translation.
 *  - Chunking of entry content into raw leaves
 *  - Entry and root node schema
 *  - Streaming import and export
 */
pub mod archive;
/**
 * Internal wrapper around IPLD, renamed to
 *  something a little more down-to-earth.
 * Handles translation between IPLD CIDs and
 *  the BLAKE3 hashes our blob store hands out.
 */
pub mod linked_data;
/**
 * Storage layer implementation.
 *  A small `BlockStore` seam plus a light
 *  wrapper around an iroh-blobs store
 */
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::archive::{
        ArchiveError, EntryHeader, EntryKind, ExportOptions, Exporter, ImportOptions,
        ImportSummary, Importer,
    };
    pub use crate::linked_data::{multibase, Cid, Link, LinkError};
    pub use crate::store::{BlobsStore, BlockStore, BlockStoreError};
    pub use crate::version::build_info;
}
