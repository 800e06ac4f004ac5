//! Linked data primitives
//!
//! Everything we persist is a block addressed by the BLAKE3 hash the blob
//! store computes over its bytes. A [`Link`] pairs that hash with the IPLD
//! codec describing how to interpret the block:
//!
//! - **Raw** (`0x55`): opaque bytes, used for content leaves
//! - **DAG-CBOR** (`0x71`): structured nodes, see [`BlockEncoded`]
//!
//! Links render as CIDv1 strings (multibase base32 by default), so a root
//! link can be handed to users and parsed back later.

mod codec;
mod link;

pub use cid::multibase;
pub use cid::{Cid, Error as CidError};
pub use iroh_blobs::Hash;

pub use codec::{BlockEncoded, CodecError, DagCborCodec};
pub use link::{Link, LinkError};

/// Multicodec code for raw, uninterpreted bytes
pub const LD_RAW_CODEC: u64 = 0x55;
/// Multicodec code for DAG-CBOR encoded nodes
pub const LD_CBOR_CODEC: u64 = 0x71;
/// Multihash code for BLAKE3 (32 byte digest)
pub const BLAKE3_HASH_CODE: u64 = 0x1e;
