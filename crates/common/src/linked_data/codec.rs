use std::fmt::Display;

use ipld_core::codec::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use serde_ipld_dagcbor::codec::DagCborCodec;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode block: {0}")]
    Encode(String),
    #[error("failed to decode block: {0}")]
    Decode(String),
}

/// A type that is stored as a single block under the codec `C`.
///  Implementors get `encode` / `decode` for free.
pub trait BlockEncoded<C>: Serialize + DeserializeOwned
where
    C: Codec<Self>,
    <C as Codec<Self>>::Error: Display,
{
    /// The multicodec code blocks of this type are stored under
    fn codec(&self) -> u64 {
        <C as Codec<Self>>::CODE
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        <C as Codec<Self>>::encode_to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        <C as Codec<Self>>::decode_from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
