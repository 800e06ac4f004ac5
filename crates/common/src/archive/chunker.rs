//! Fixed-size splitting of entry content.

use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

/// Default maximum chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Lazily splits a reader into chunks of at most `max` bytes.
///
/// Every chunk but the last is exactly `max` bytes long. Empty
/// input yields a single empty chunk, so that even an empty file
/// is represented by one leaf. Once the reader is exhausted (or
/// fails) the iterator is done; it cannot be restarted.
pub struct Chunker<R> {
    reader: R,
    max: usize,
    emitted: bool,
    done: bool,
}

impl<R: Read> Chunker<R> {
    pub fn new(reader: R, max: usize) -> Self {
        Self {
            reader,
            max,
            emitted: false,
            done: false,
        }
    }

    // Read until the buffer is full or the reader hits EOF.
    fn fill(&mut self) -> std::io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(self.max);
        let mut filled = 0;
        while filled < self.max {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = std::io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let chunk = match self.fill() {
            Ok(chunk) => chunk,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if chunk.len() < self.max {
            self.done = true;
        }
        if chunk.is_empty() && self.emitted {
            return None;
        }

        self.emitted = true;
        Some(Ok(chunk))
    }
}
