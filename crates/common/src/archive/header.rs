//! Mapping between tar headers and [`EntryHeader`].
//!
//! Headers are always written in GNU format. Names and link
//! targets that do not fit the 100 byte header fields are
//! carried in GNU long-name (`L`) and long-link (`K`) records
//! ahead of the entry, the same way `tar::Builder` emits them.

use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};
use tar::{EntryType, Header};

use super::{ArchiveError, EntryHeader, EntryKind};

/// Size of a tar block
pub const BLOCK_SIZE: usize = 512;

const NAME_FIELD_LEN: usize = 100;
const OWNER_FIELD_LEN: usize = 32;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";

static END_OF_ARCHIVE: [u8; 2 * BLOCK_SIZE] = [0u8; 2 * BLOCK_SIZE];
static ZEROS: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Two zero blocks terminating an archive
pub fn end_of_archive() -> Bytes {
    Bytes::from_static(&END_OF_ARCHIVE)
}

/// Number of zero bytes needed to pad `len` content bytes
///  out to a block boundary
pub fn padding(len: u64) -> usize {
    let rem = (len % BLOCK_SIZE as u64) as usize;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

pub(crate) fn zero_padding(len: u64) -> Bytes {
    Bytes::from_static(&ZEROS[..padding(len)])
}

/// Read the metadata of a parsed tar entry.
///  Long-name and long-link records have already been folded into
///  the entry by the tar reader.
pub(crate) fn read_entry_header<R: Read>(
    entry: &mut tar::Entry<'_, R>,
) -> Result<EntryHeader, ArchiveError> {
    let flag = entry.header().entry_type().as_byte();
    match flag {
        b'x' | b'g' => {
            return Err(ArchiveError::Unsupported(
                "pax extended headers".to_string(),
            ))
        }
        b'S' => return Err(ArchiveError::Unsupported("gnu sparse entries".to_string())),
        _ => {}
    }
    if entry.pax_extensions()?.is_some() {
        return Err(ArchiveError::Unsupported(
            "pax extended headers".to_string(),
        ));
    }

    let name = utf8(entry.path_bytes().into_owned(), "entry name")?;
    let link_target = entry
        .link_name_bytes()
        .map(|bytes| utf8(bytes.into_owned(), "link target"))
        .transpose()?;
    let size = entry.size();

    let header = entry.header();
    let kind = EntryKind::from(flag);
    // a symlink always records its target, even an empty one
    let link_target = match kind {
        EntryKind::Symlink => Some(link_target.unwrap_or_default()),
        _ => link_target,
    };
    let field = |field: &str, err: std::io::Error| {
        ArchiveError::ArchiveCorrupt(format!("invalid {} in header of {}: {}", field, name, err))
    };
    let mode = header.mode().map_err(|e| field("mode", e))?;
    let uid = header.uid().map_err(|e| field("uid", e))?;
    let gid = header.gid().map_err(|e| field("gid", e))?;
    let mtime = header.mtime().map_err(|e| field("mtime", e))?;
    let uname = header
        .username_bytes()
        .map(|bytes| utf8(bytes.to_vec(), "user name"))
        .transpose()?
        .unwrap_or_default();
    let gname = header
        .groupname_bytes()
        .map(|bytes| utf8(bytes.to_vec(), "group name"))
        .transpose()?
        .unwrap_or_default();
    let device = match kind {
        EntryKind::Other(b'3') | EntryKind::Other(b'4') => {
            let major = header.device_major().map_err(|e| field("device major", e))?;
            let minor = header.device_minor().map_err(|e| field("device minor", e))?;
            major.zip(minor)
        }
        _ => None,
    };

    Ok(EntryHeader {
        name,
        kind,
        size,
        mode,
        uid,
        gid,
        mtime,
        link_target,
        uname,
        gname,
        device,
    })
}

fn utf8(bytes: Vec<u8>, what: &str) -> Result<String, ArchiveError> {
    String::from_utf8(bytes)
        .map_err(|_| ArchiveError::Unsupported(format!("{} is not valid utf-8", what)))
}

/// Render the header block(s) for an entry: any long-name and
///  long-link records followed by the entry's own GNU header.
pub fn header_blocks(entry: &EntryHeader) -> Result<Bytes, ArchiveError> {
    let mut out = BytesMut::with_capacity(BLOCK_SIZE);

    let name = entry.name.as_bytes();
    if name.len() > NAME_FIELD_LEN {
        long_record(&mut out, b'L', name);
    }
    if let Some(target) = &entry.link_target {
        if target.len() > NAME_FIELD_LEN {
            long_record(&mut out, b'K', target.as_bytes());
        }
    }

    let mut header = Header::new_gnu();
    {
        let old = header.as_old_mut();
        copy_truncated(&mut old.name, &entry.name);
        if let Some(target) = &entry.link_target {
            copy_truncated(&mut old.linkname, target);
        }
    }
    header.set_mode(entry.mode);
    header.set_uid(entry.uid);
    header.set_gid(entry.gid);
    header.set_mtime(entry.mtime);
    header.set_size(entry.size);
    header.set_entry_type(EntryType::new(entry.kind.type_flag()));
    if let Some(gnu) = header.as_gnu_mut() {
        copy_owner(&mut gnu.uname, &entry.uname, &entry.name)?;
        copy_owner(&mut gnu.gname, &entry.gname, &entry.name)?;
    }
    if let Some((major, minor)) = entry.device {
        header.set_device_major(major)?;
        header.set_device_minor(minor)?;
    }
    header.set_cksum();
    out.extend_from_slice(header.as_bytes());

    Ok(out.freeze())
}

// GNU long-name / long-link record: a pseudo entry whose
//  content is the NUL terminated name
fn long_record(out: &mut BytesMut, flag: u8, data: &[u8]) {
    let mut header = Header::new_gnu();
    header.as_old_mut().name[..LONG_LINK_NAME.len()].copy_from_slice(LONG_LINK_NAME);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(data.len() as u64 + 1);
    header.set_entry_type(EntryType::new(flag));
    header.set_cksum();

    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    out.put_u8(0);
    out.extend_from_slice(&ZEROS[..padding(data.len() as u64 + 1)]);
}

// Keep whole characters when cutting a name down to its field
fn copy_truncated(field: &mut [u8; NAME_FIELD_LEN], value: &str) {
    let mut end = value.len().min(NAME_FIELD_LEN);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&value.as_bytes()[..end]);
}

fn copy_owner(
    field: &mut [u8; OWNER_FIELD_LEN],
    value: &str,
    entry: &str,
) -> Result<(), ArchiveError> {
    if value.len() > OWNER_FIELD_LEN {
        return Err(ArchiveError::Unsupported(format!(
            "owner name {} of {} exceeds {} bytes",
            value, entry, OWNER_FIELD_LEN
        )));
    }
    field[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample(name: &str) -> EntryHeader {
        EntryHeader {
            name: name.to_string(),
            kind: EntryKind::Regular,
            size: 5,
            mode: 0o640,
            uid: 501,
            gid: 20,
            mtime: 1_650_000_000,
            link_target: None,
            uname: "bob".to_string(),
            gname: "wheel".to_string(),
            device: None,
        }
    }

    // Parse emitted header blocks (plus content) back with the tar reader
    fn reparse(entry: &EntryHeader, content: &[u8]) -> EntryHeader {
        let mut data = header_blocks(entry).unwrap().to_vec();
        data.extend_from_slice(content);
        data.extend_from_slice(&zero_padding(content.len() as u64));
        data.extend_from_slice(&end_of_archive());

        let mut archive = tar::Archive::new(Cursor::new(data));
        let mut entries = archive.entries().unwrap();
        let mut first = entries.next().unwrap().unwrap();
        read_entry_header(&mut first).unwrap()
    }

    #[test]
    fn test_padding() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 511);
        assert_eq!(padding(512), 0);
        assert_eq!(padding(1000), 24);
    }

    #[test]
    fn test_header_roundtrip() {
        let entry = sample("docs/readme.md");
        let blocks = header_blocks(&entry).unwrap();
        assert_eq!(blocks.len(), BLOCK_SIZE);
        assert_eq!(reparse(&entry, b"hello"), entry);
    }

    #[test]
    fn test_long_name_uses_gnu_record() {
        let entry = sample(&"deep/".repeat(40));
        let blocks = header_blocks(&entry).unwrap();
        // long-name header, name data (201 bytes -> 1 block), entry header
        assert_eq!(blocks.len(), 3 * BLOCK_SIZE);
        assert_eq!(blocks[156], b'L');
        assert_eq!(reparse(&entry, b"hello"), entry);
    }

    #[test]
    fn test_long_link_target() {
        let mut entry = sample("link");
        entry.kind = EntryKind::Symlink;
        entry.size = 0;
        entry.link_target = Some("target/".repeat(30));
        let blocks = header_blocks(&entry).unwrap();
        assert_eq!(blocks[156], b'K');
        assert_eq!(reparse(&entry, b""), entry);
    }

    #[test]
    fn test_device_numbers() {
        let mut entry = sample("dev/tty0");
        entry.kind = EntryKind::Other(b'3');
        entry.size = 0;
        entry.device = Some((4, 1));
        assert_eq!(reparse(&entry, b""), entry);
    }

    #[test]
    fn test_matches_tar_builder() {
        let mut header = Header::new_gnu();
        header.set_mode(0o640);
        header.set_uid(501);
        header.set_gid(20);
        header.set_mtime(1_650_000_000);
        header.set_size(5);
        header.set_entry_type(EntryType::Regular);
        header.set_username("bob").unwrap();
        header.set_groupname("wheel").unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_data(&mut header, "docs/readme.md", &b"hello"[..])
            .unwrap();
        let built = builder.into_inner().unwrap();

        let ours = header_blocks(&sample("docs/readme.md")).unwrap();
        assert_eq!(&built[..BLOCK_SIZE], &ours[..]);
    }

    #[test]
    fn test_oversized_owner_rejected() {
        let mut entry = sample("f");
        entry.uname = "u".repeat(40);
        assert!(matches!(
            header_blocks(&entry),
            Err(ArchiveError::Unsupported(_))
        ));
    }
}
