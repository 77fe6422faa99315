//! Container scanners.
//!
//! Every scanner walks a whole file, resynchronises on damaged data instead
//! of aborting, and records where the samples of each elementary stream live
//! as a [`BitstreamMap`](crate::bitstream::BitstreamMap).

use std::io::{self, SeekFrom};

use crate::bitstream::ByteSource;
use crate::bitstream::source::read_fully;

pub mod mp3;
pub mod mpeg_ps;
pub mod mpeg_ts;
pub mod pes;
pub mod riff;

const WINDOW_SIZE: usize = 64 * 1024;

/// Random access reader over a [`ByteSource`] with a single read-ahead
/// window.
///
/// Scanners ask for short byte ranges at absolute offsets, mostly in
/// increasing order, so a window reloaded on a miss keeps I/O sequential.
#[derive(Debug)]
pub struct SourceReader<S: ByteSource> {
    source: S,
    size: u64,
    window: Vec<u8>,
    window_offset: u64,
}

impl<S: ByteSource> SourceReader<S> {
    pub fn new(source: S) -> Self {
        let size = source.size();

        Self {
            source,
            size,
            window: Vec::with_capacity(WINDOW_SIZE),
            window_offset: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Returns up to `len` bytes starting at `offset`. The slice is shorter
    /// only when the source ends first.
    pub fn bytes(&mut self, offset: u64, len: usize) -> io::Result<&[u8]> {
        let end = (offset + len as u64).min(self.size);
        if offset >= end {
            return Ok(&[]);
        }

        let window_end = self.window_offset + self.window.len() as u64;
        if offset < self.window_offset || end > window_end {
            self.load(offset, len)?;
        }

        let start = (offset - self.window_offset) as usize;
        let stop = (end - self.window_offset) as usize;
        Ok(&self.window[start..stop])
    }

    /// Like [`bytes`](Self::bytes), but fails unless all `len` bytes exist.
    pub fn exact(&mut self, offset: u64, len: usize) -> io::Result<&[u8]> {
        let size = self.size;
        let bytes = self.bytes(offset, len)?;
        if bytes.len() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{len} bytes at offset {offset} exceed source size {size}"),
            ));
        }

        Ok(bytes)
    }

    fn load(&mut self, offset: u64, len: usize) -> io::Result<()> {
        let want = len.max(WINDOW_SIZE).min((self.size - offset) as usize);

        self.source.seek(SeekFrom::Start(offset))?;
        self.window.resize(want, 0);

        let filled = read_fully(&mut self.source, &mut self.window)?;
        if filled < want {
            self.window.clear();
            self.window_offset = 0;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "short read at offset {offset}: {filled} of {want} bytes (source size {})",
                    self.size
                ),
            ));
        }

        self.window_offset = offset;
        Ok(())
    }

    /// Offset of the next occurrence of `pattern` at or after `offset`.
    pub fn find(&mut self, offset: u64, pattern: &[u8]) -> io::Result<Option<u64>> {
        let mut position = offset;

        while position + pattern.len() as u64 <= self.size {
            let chunk = self.bytes(position, WINDOW_SIZE)?;
            if let Some(found) = chunk.windows(pattern.len()).position(|w| w == pattern) {
                return Ok(Some(position + found as u64));
            }

            // overlap so a pattern split across chunks is still seen
            let advance = chunk.len().saturating_sub(pattern.len() - 1).max(1);
            position += advance as u64;
        }

        Ok(None)
    }
}

/// Reads a big-endian 24-bit start code prefix followed by one code byte.
pub(crate) fn start_code_at(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [0, 0, 1, code, ..] => Some(*code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek};

    use super::*;

    #[test]
    fn windowed_reads() {
        let data: Vec<u8> = (0..=255u8).cycle().take(WINDOW_SIZE * 2 + 10).collect();
        let mut reader = SourceReader::new(Cursor::new(data.clone()));

        assert_eq!(reader.bytes(0, 4).unwrap(), &data[..4]);
        let far = WINDOW_SIZE as u64 + 100;
        assert_eq!(reader.bytes(far, 8).unwrap(), &data[far as usize..far as usize + 8]);
        assert_eq!(reader.bytes(data.len() as u64 - 3, 8).unwrap().len(), 3);
        assert!(reader.exact(data.len() as u64 - 3, 8).is_err());
        assert!(reader.bytes(data.len() as u64 + 5, 1).unwrap().is_empty());
    }

    #[test]
    fn find_across_windows() {
        let mut data = vec![0xAAu8; WINDOW_SIZE * 2];
        data[WINDOW_SIZE - 1..WINDOW_SIZE + 3].copy_from_slice(b"RIFF");
        let mut reader = SourceReader::new(Cursor::new(data));

        assert_eq!(reader.find(0, b"RIFF").unwrap(), Some(WINDOW_SIZE as u64 - 1));
        assert_eq!(reader.find(WINDOW_SIZE as u64, b"RIFF").unwrap(), None);
    }

    /// Claims more bytes than it can deliver, like a file truncated while
    /// it is being scanned.
    #[derive(Debug)]
    struct TruncatedSource {
        inner: Cursor<Vec<u8>>,
        claimed: u64,
    }

    impl Read for TruncatedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for TruncatedSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl ByteSource for TruncatedSource {
        fn size(&self) -> u64 {
            self.claimed
        }
    }

    #[test]
    fn short_read_is_an_error() {
        let mut reader = SourceReader::new(TruncatedSource {
            inner: Cursor::new(vec![0xAB; 10]),
            claimed: 20,
        });

        let err = reader.bytes(0, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(reader.exact(4, 4).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        assert!(reader.find(0, b"RIFF").is_err());
    }

    #[test]
    fn start_codes() {
        assert_eq!(start_code_at(&[0, 0, 1, 0xBA, 0x44]), Some(0xBA));
        assert_eq!(start_code_at(&[0, 0, 2, 0xBA]), None);
        assert_eq!(start_code_at(&[0, 0, 1]), None);
    }
}
