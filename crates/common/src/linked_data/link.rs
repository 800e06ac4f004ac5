use std::fmt;
use std::str::FromStr;

use cid::{Cid, Version};
use multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Hash, BLAKE3_HASH_CODE};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("invalid cid: {0}")]
    Cid(#[from] cid::Error),
    #[error("unsupported cid version: only CIDv1 links are supported")]
    UnsupportedVersion,
    #[error("unsupported multihash code {0:#x}: only blake3 links are supported")]
    UnsupportedHash(u64),
    #[error("invalid digest length {0}: expected 32 bytes")]
    InvalidDigestLength(usize),
}

/// A typed pointer to a block in the store.
///  The hash is whatever the store returned for the block's
///  bytes; the codec says how to read them back.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    codec: u64,
    hash: Hash,
}

impl Link {
    pub fn new(codec: u64, hash: Hash) -> Self {
        Self { codec, hash }
    }

    pub fn codec(&self) -> u64 {
        self.codec
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The CIDv1 describing this link
    pub fn cid(&self) -> Cid {
        let multihash = Multihash::<64>::wrap(BLAKE3_HASH_CODE, self.hash.as_bytes())
            .expect("a 32 byte digest always fits in a 64 byte multihash");
        Cid::new_v1(self.codec, multihash)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.cid())
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cid())
    }
}

impl TryFrom<Cid> for Link {
    type Error = LinkError;

    fn try_from(cid: Cid) -> Result<Self, Self::Error> {
        if cid.version() != Version::V1 {
            return Err(LinkError::UnsupportedVersion);
        }
        let multihash = cid.hash();
        if multihash.code() != BLAKE3_HASH_CODE {
            return Err(LinkError::UnsupportedHash(multihash.code()));
        }
        let digest: [u8; 32] = multihash
            .digest()
            .try_into()
            .map_err(|_| LinkError::InvalidDigestLength(multihash.digest().len()))?;
        Ok(Link::new(cid.codec(), Hash::from_bytes(digest)))
    }
}

impl From<Link> for Cid {
    fn from(link: Link) -> Self {
        link.cid()
    }
}

impl FromStr for Link {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cid = Cid::try_from(s.trim())?;
        Link::try_from(cid)
    }
}

// Links are written as IPLD links (CBOR tag 42) so that
//  any IPLD tooling can walk our nodes.
impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cid().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cid = Cid::deserialize(deserializer)?;
        Link::try_from(cid).map_err(serde::de::Error::custom)
    }
}
