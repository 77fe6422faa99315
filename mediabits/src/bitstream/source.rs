//! Seekable byte sources consumed by the bitstream cursor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A seekable source of bytes with a known total size.
///
/// The cursor only ever seeks to absolute offsets and reads exact byte counts
/// from it.
pub trait ByteSource: Read + Seek {
    fn size(&self) -> u64;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn size(&self) -> u64 {
        (**self).size()
    }
}

impl<T: AsRef<[u8]>> ByteSource for io::Cursor<T> {
    fn size(&self) -> u64 {
        self.get_ref().as_ref().len() as u64
    }
}

/// Reads until `buf` is full or the reader reports end of file, retrying
/// interrupted reads. Returns the number of bytes filled.
pub(crate) fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// An open media file.
#[derive(Debug)]
pub struct MediaFile {
    file: File,
    path: PathBuf,
    size: u64,
}

impl MediaFile {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self { file, path, size })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lowercase file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    /// Reads up to `buf.len()` bytes from the start of the file without
    /// disturbing later absolute seeks.
    pub fn read_head(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(0))?;
        read_fully(&mut self.file, buf)
    }
}

impl Read for MediaFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for MediaFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ByteSource for MediaFile {
    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `chunk` bytes per call and fails every other call
    /// with `Interrupted`.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
        interrupt: bool,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }

            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn read_fully_retries_and_stops_at_eof() {
        let data: Vec<u8> = (0..10).collect();

        let mut reader = Trickle { data: &data, chunk: 3, interrupt: false };
        let mut buf = [0u8; 8];
        assert_eq!(read_fully(&mut reader, &mut buf).unwrap(), 8);
        assert_eq!(&buf[..], &data[..8]);

        let mut reader = Trickle { data: &data, chunk: 4, interrupt: false };
        let mut buf = [0u8; 16];
        assert_eq!(read_fully(&mut reader, &mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], &data[..]);
    }

    #[test]
    fn media_file_head() {
        let path = std::env::temp_dir().join(format!("mediabits-head-{}.MP3", std::process::id()));
        std::fs::write(&path, b"ID3\x04\x00").unwrap();

        let mut file = MediaFile::open(&path).unwrap();
        assert_eq!(file.size(), 5);
        assert_eq!(file.extension().as_deref(), Some("mp3"));

        let mut head = [0u8; 16];
        assert_eq!(file.read_head(&mut head).unwrap(), 5);
        assert_eq!(&head[..3], b"ID3");

        std::fs::remove_file(&path).unwrap();
    }
}
