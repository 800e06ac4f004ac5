//! Node schema shared by the importer and the exporter.
//!
//! Content leaves are stored as raw blocks. Everything else is an
//! [`ArchiveNode`], a DAG-CBOR map keyed by its variant name, so a
//! reader always knows which kind of node it is holding before it
//! looks at any field.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::linked_data::{BlockEncoded, DagCborCodec, Link, LD_CBOR_CODEC, LD_RAW_CODEC};

use super::ArchiveError;

/// What kind of filesystem object a tar entry describes.
///  Stored as the raw tar type flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    /// Any other type flag (hard links, devices, fifos, ...)
    Other(u8),
}

impl EntryKind {
    pub fn type_flag(&self) -> u8 {
        match self {
            EntryKind::Regular => b'0',
            EntryKind::Directory => b'5',
            EntryKind::Symlink => b'2',
            EntryKind::Other(flag) => *flag,
        }
    }

    /// Single character used by listings, `ls -l` style
    pub fn symbol(&self) -> char {
        match self {
            EntryKind::Regular => '-',
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::Other(b'1') => 'h',
            EntryKind::Other(b'3') => 'c',
            EntryKind::Other(b'4') => 'b',
            EntryKind::Other(b'6') => 'p',
            EntryKind::Other(_) => '?',
        }
    }
}

impl From<u8> for EntryKind {
    fn from(flag: u8) -> Self {
        match flag {
            // v7 archives mark regular files with a NUL flag
            b'0' | b'\0' => EntryKind::Regular,
            b'5' => EntryKind::Directory,
            b'2' => EntryKind::Symlink,
            other => EntryKind::Other(other),
        }
    }
}

impl From<EntryKind> for u8 {
    fn from(kind: EntryKind) -> Self {
        kind.type_flag()
    }
}

/// Metadata of a single archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub name: String,
    pub kind: EntryKind,
    /// Content length in bytes
    pub size: u64,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Modification time, seconds since the epoch
    pub mtime: u64,
    // Optional fields are still required keys: a node without
    //  them is rejected rather than read as None
    #[serde(deserialize_with = "Option::deserialize")]
    pub link_target: Option<String>,
    pub uname: String,
    pub gname: String,
    /// Major and minor numbers of character and block devices
    #[serde(deserialize_with = "Option::deserialize")]
    pub device: Option<(u32, u32)>,
}

impl EntryHeader {
    /// Whether this entry is stored with content leaves.
    ///  Regular files always are (an empty file gets one empty
    ///  leaf); anything else only when it declares a size.
    pub fn carries_content(&self) -> bool {
        self.kind == EntryKind::Regular || self.size > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryNode {
    pub header: EntryHeader,
    /// Raw leaves, concatenated in order to rebuild the content
    pub content: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootNode {
    /// Entry nodes in archive order
    pub entries: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveNode {
    Root(RootNode),
    Entry(EntryNode),
}

impl BlockEncoded<DagCborCodec> for ArchiveNode {}

/// Encode a content chunk as a leaf block. Leaves carry no
///  metadata, so this is the chunk itself.
pub fn leaf_block(chunk: Bytes) -> Bytes {
    chunk
}

impl ArchiveNode {
    pub fn entry(header: EntryHeader, content: Vec<Link>) -> Self {
        ArchiveNode::Entry(EntryNode { header, content })
    }

    pub fn root(entries: Vec<Link>) -> Self {
        ArchiveNode::Root(RootNode { entries })
    }

    pub fn to_block(&self) -> Result<Bytes, ArchiveError> {
        let encoded = self
            .encode()
            .map_err(|e| ArchiveError::StructuralCorrupt(e.to_string()))?;
        Ok(Bytes::from(encoded))
    }

    /// Decode a stored node; anything that does not parse as
    ///  one of our variants is structural corruption
    pub fn from_block(data: &[u8]) -> Result<Self, ArchiveError> {
        <Self as BlockEncoded<DagCborCodec>>::decode(data)
            .map_err(|e| ArchiveError::StructuralCorrupt(e.to_string()))
    }

    pub fn into_entry(self) -> Result<EntryNode, ArchiveError> {
        match self {
            ArchiveNode::Entry(entry) => {
                entry.validate()?;
                Ok(entry)
            }
            ArchiveNode::Root(_) => Err(ArchiveError::StructuralCorrupt(
                "expected an entry node, found a root node".to_string(),
            )),
        }
    }

    pub fn into_root(self) -> Result<RootNode, ArchiveError> {
        match self {
            ArchiveNode::Root(root) => {
                root.validate()?;
                Ok(root)
            }
            ArchiveNode::Entry(entry) => Err(ArchiveError::StructuralCorrupt(format!(
                "expected a root node, found entry node for {}",
                entry.header.name
            ))),
        }
    }
}

impl EntryNode {
    fn validate(&self) -> Result<(), ArchiveError> {
        if let Some(link) = self.content.iter().find(|l| l.codec() != LD_RAW_CODEC) {
            return Err(ArchiveError::StructuralCorrupt(format!(
                "content link {} of {} is not a raw leaf",
                link, self.header.name
            )));
        }
        if self.header.kind == EntryKind::Symlink && self.header.link_target.is_none() {
            return Err(ArchiveError::StructuralCorrupt(format!(
                "symlink {} has no link target",
                self.header.name
            )));
        }
        if self.header.carries_content() == self.content.is_empty() {
            return Err(ArchiveError::StructuralCorrupt(format!(
                "entry {} ({} bytes) has {} content links",
                self.header.name,
                self.header.size,
                self.content.len()
            )));
        }
        Ok(())
    }
}

impl RootNode {
    fn validate(&self) -> Result<(), ArchiveError> {
        match self.entries.iter().find(|l| l.codec() != LD_CBOR_CODEC) {
            Some(link) => Err(ArchiveError::StructuralCorrupt(format!(
                "root entry link {} is not a dag-cbor node",
                link
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linked_data::Hash;

    fn header(name: &str, kind: EntryKind, size: u64) -> EntryHeader {
        EntryHeader {
            name: name.to_string(),
            kind,
            size,
            mode: 0o644,
            uid: 1000,
            gid: 1000,
            mtime: 1_700_000_000,
            link_target: None,
            uname: "alice".to_string(),
            gname: "staff".to_string(),
            device: None,
        }
    }

    fn raw(seed: &[u8]) -> Link {
        Link::new(LD_RAW_CODEC, Hash::new(seed))
    }

    #[test]
    fn test_entry_node_roundtrip() {
        let mut h = header("dir/file.txt", EntryKind::Regular, 10);
        h.device = Some((8, 1));
        let node = ArchiveNode::entry(h.clone(), vec![raw(b"a"), raw(b"b")]);

        let block = node.to_block().unwrap();
        let entry = ArchiveNode::from_block(&block)
            .unwrap()
            .into_entry()
            .unwrap();
        assert_eq!(entry.header, h);
        assert_eq!(entry.content, vec![raw(b"a"), raw(b"b")]);
    }

    #[test]
    fn test_symlink_roundtrip() {
        let mut h = header("link", EntryKind::Symlink, 0);
        h.link_target = Some("../target".to_string());
        let node = ArchiveNode::entry(h.clone(), vec![]);
        let decoded = ArchiveNode::from_block(&node.to_block().unwrap())
            .unwrap()
            .into_entry()
            .unwrap();
        assert_eq!(decoded.header.link_target.as_deref(), Some("../target"));
        assert!(decoded.content.is_empty());
    }

    #[test]
    fn test_root_is_not_an_entry() {
        let root = ArchiveNode::root(vec![]);
        let decoded = ArchiveNode::from_block(&root.to_block().unwrap()).unwrap();
        assert!(matches!(
            decoded.into_entry(),
            Err(ArchiveError::StructuralCorrupt(_))
        ));
    }

    #[test]
    fn test_entry_is_not_a_root() {
        let node = ArchiveNode::entry(header("a", EntryKind::Directory, 0), vec![]);
        let decoded = ArchiveNode::from_block(&node.to_block().unwrap()).unwrap();
        assert!(matches!(
            decoded.into_root(),
            Err(ArchiveError::StructuralCorrupt(_))
        ));
    }

    #[test]
    fn test_garbage_is_structural_corruption() {
        assert!(matches!(
            ArchiveNode::from_block(b"definitely not cbor"),
            Err(ArchiveError::StructuralCorrupt(_))
        ));
    }

    #[test]
    fn test_content_links_must_be_raw() {
        let node = ArchiveNode::entry(
            header("f", EntryKind::Regular, 1),
            vec![Link::new(LD_CBOR_CODEC, Hash::new(b"x"))],
        );
        let decoded = ArchiveNode::from_block(&node.to_block().unwrap()).unwrap();
        assert!(matches!(
            decoded.into_entry(),
            Err(ArchiveError::StructuralCorrupt(_))
        ));
    }

    #[test]
    fn test_regular_file_needs_a_leaf() {
        let node = ArchiveNode::entry(header("empty", EntryKind::Regular, 0), vec![]);
        let decoded = ArchiveNode::from_block(&node.to_block().unwrap()).unwrap();
        assert!(decoded.into_entry().is_err());
    }

    #[test]
    fn test_symlink_needs_a_target() {
        let node = ArchiveNode::entry(header("dangling", EntryKind::Symlink, 0), vec![]);
        let decoded = ArchiveNode::from_block(&node.to_block().unwrap()).unwrap();
        assert!(matches!(
            decoded.into_entry(),
            Err(ArchiveError::StructuralCorrupt(_))
        ));
    }

    #[derive(Serialize)]
    struct HeaderWithoutTarget {
        name: String,
        kind: u8,
        size: u64,
        mode: u32,
        uid: u64,
        gid: u64,
        mtime: u64,
        uname: String,
        gname: String,
        device: Option<(u32, u32)>,
    }

    #[derive(Serialize)]
    enum BareNode {
        Entry {
            header: HeaderWithoutTarget,
            content: Vec<Link>,
        },
    }

    #[test]
    fn test_missing_optional_key_is_rejected() {
        let node = BareNode::Entry {
            header: HeaderWithoutTarget {
                name: "dir".to_string(),
                kind: b'5',
                size: 0,
                mode: 0o755,
                uid: 0,
                gid: 0,
                mtime: 0,
                uname: String::new(),
                gname: String::new(),
                device: None,
            },
            content: vec![],
        };
        let block = serde_ipld_dagcbor::to_vec(&node).unwrap();
        assert!(matches!(
            ArchiveNode::from_block(&block),
            Err(ArchiveError::StructuralCorrupt(_))
        ));
    }

    #[test]
    fn test_kind_flags() {
        assert_eq!(EntryKind::from(b'\0'), EntryKind::Regular);
        assert_eq!(EntryKind::from(b'1'), EntryKind::Other(b'1'));
        assert_eq!(u8::from(EntryKind::Directory), b'5');
        assert_eq!(EntryKind::Other(b'6').symbol(), 'p');
    }
}
