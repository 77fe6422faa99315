//! Slice-backed bit reader for fixed-layout headers.
//!
//! Container headers (MPEG audio frame headers, TS packets, PSI sections, PES
//! and pack headers) are short and fully buffered once located, so they are
//! decoded from byte slices with `bitstream-io` instead of going through the
//! refilling [`Bitstream`](crate::bitstream::cursor::Bitstream) cursor.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader, SignedInteger, UnsignedInteger};

use crate::utils::crc::Crc32;

const STACK_BUF_SIZE: usize = 256;

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        if n as u64 > self.available()? {
            return Err(self.out_of_bounds("get_n", n));
        }

        self.bs.read_unsigned_var(n)
    }

    #[inline(always)]
    pub fn get_s<S: SignedInteger>(&mut self, n: u32) -> io::Result<S> {
        if n as u64 > self.available()? {
            return Err(self.out_of_bounds("get_s", n));
        }

        self.bs.read_signed_var(n)
    }

    /// Reads a `marker_bit`, returning whether it was set.
    #[inline(always)]
    pub fn marker(&mut self) -> io::Result<bool> {
        self.get()
    }

    /// Reads a 33-bit MPEG timestamp split as 3 + 15 + 15 bits with marker
    /// bits after each part. Returns the value and whether all markers were
    /// set.
    pub fn get_timestamp33(&mut self) -> io::Result<(u64, bool)> {
        let high: u64 = self.get_n(3)?;
        let m0 = self.marker()?;
        let mid: u64 = self.get_n(15)?;
        let m1 = self.marker()?;
        let low: u64 = self.get_n(15)?;
        let m2 = self.marker()?;

        Ok(((high << 30) | (mid << 15) | low, m0 && m1 && m2))
    }

    pub fn get_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if (buf.len() as u64) << 3 > self.available()? {
            return Err(self.out_of_bounds("get_bytes", (buf.len() << 3) as u32));
        }

        self.bs.read_bytes(buf)
    }

    #[inline(always)]
    pub fn seek(&mut self, offset: i64) -> io::Result<u64> {
        if (offset < 0 && self.position()? as i64 + offset >= 0)
            || (offset >= 0 && self.available()? as i64 >= offset)
        {
            return self.bs.seek_bits(SeekFrom::Current(offset));
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "seek({}): out of bounds bits at {}",
                offset,
                self.position()?
            ),
        ))
    }

    /// CRC-32 over `len` bits starting at bit `start`. Both must be byte
    /// aligned. The reader position is restored afterwards.
    pub fn crc32_check(&mut self, crc: &Crc32, start: u64, len: u64) -> io::Result<u32> {
        let position = self.position()?;

        if start + len > self.len || start & 7 != 0 || len & 7 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "crc32_check: range out of bounds or unaligned",
            ));
        }

        self.bs.seek_bits(SeekFrom::Start(start))?;

        let bytes_len = (len >> 3) as usize;
        let checksum = if bytes_len <= STACK_BUF_SIZE {
            let mut stack_buf = [0u8; STACK_BUF_SIZE];
            let buf = &mut stack_buf[..bytes_len];
            self.bs.read_bytes(buf)?;
            crc.checksum(buf)
        } else {
            let mut heap_buf = vec![0; bytes_len];
            self.bs.read_bytes(&mut heap_buf)?;
            crc.checksum(&heap_buf)
        };

        self.bs.seek_bits(SeekFrom::Start(position))?;

        Ok(checksum)
    }

    #[inline(always)]
    pub fn byte_align(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip_n: out of bounds bits",
            ));
        }

        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    fn out_of_bounds(&mut self, what: &str, n: u32) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{what}({n}): out of bounds bits at {}",
                self.bs.position_in_bits().unwrap_or(0)
            ),
        )
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}
