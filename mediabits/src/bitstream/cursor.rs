//! Buffered bit-level cursor over a [`ByteSource`].
//!
//! The cursor owns a byte window refilled from the source on demand and a bit
//! position inside that window. Every read either completes from the window,
//! completes after exactly one refill, or fails with an end-of-stream error.
//! `refill` is the only place that performs I/O.
//!
//! When bound to a [`BitstreamMap`] the cursor is scoped to the current sample:
//! refills never cross the end of that sample and absolute seeks select the
//! sample that covers the target offset.

use std::io::{Seek, SeekFrom};

use log::trace;

use super::map::{BitstreamMap, Sample};
use super::source::{ByteSource, read_fully};
use crate::utils::errors::BitstreamError;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Smallest window able to hold any single 64-bit read with front padding.
pub const MIN_BUFFER_CAPACITY: usize = 9;

pub type BsResult<T> = Result<T, BitstreamError>;

#[derive(Debug)]
pub struct Bitstream<'m, S: ByteSource> {
    source: S,
    source_size: u64,
    /// Absolute source offset of buffer position 0.
    source_offset: u64,
    buffer: Vec<u8>,
    buffer_length: usize,
    buffer_saved_capacity: usize,
    bit_cursor: usize,
    /// Bytes removed from the window by emulation prevention since the last
    /// refill.
    discarded_bytes: usize,
    map: Option<&'m BitstreamMap>,
    sample_cursor: usize,
    refill_count: usize,
}

impl<'m, S: ByteSource> Bitstream<'m, S> {
    pub fn open(source: S) -> BsResult<Self> {
        Self::open_at(source, 0, DEFAULT_BUFFER_CAPACITY)
    }

    /// Opens a raw cursor and fills the first window at `initial_offset`.
    pub fn open_at(source: S, initial_offset: u64, buffer_capacity: usize) -> BsResult<Self> {
        let source_size = source.size();
        if source_size == 0 {
            return Err(BitstreamError::InvalidSource("source is empty".into()));
        }

        if buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(BitstreamError::InvalidSource(format!(
                "buffer capacity {buffer_capacity} is below {MIN_BUFFER_CAPACITY} bytes"
            )));
        }

        let mut bs = Self::with_parts(source, source_size, buffer_capacity, None);
        bs.refill(Some(initial_offset))?;

        Ok(bs)
    }

    /// Opens a cursor bound to a sample map. Nothing is buffered until the
    /// first read or [`load_sample`](Self::load_sample).
    pub fn open_mapped(source: S, map: &'m BitstreamMap) -> BsResult<Self> {
        let source_size = source.size();
        if source_size == 0 {
            return Err(BitstreamError::InvalidSource("source is empty".into()));
        }

        let Some(first) = map.sample(0) else {
            return Err(BitstreamError::InvalidSource("sample map is empty".into()));
        };

        let mut bs = Self::with_parts(source, source_size, DEFAULT_BUFFER_CAPACITY, Some(map));
        bs.source_offset = first.offset;
        bs.buffer_length = 0;

        Ok(bs)
    }

    fn with_parts(
        source: S,
        source_size: u64,
        capacity: usize,
        map: Option<&'m BitstreamMap>,
    ) -> Self {
        Self {
            source,
            source_size,
            source_offset: 0,
            buffer: vec![0; capacity],
            buffer_length: capacity,
            buffer_saved_capacity: capacity,
            bit_cursor: 0,
            discarded_bytes: 0,
            map,
            sample_cursor: 0,
            refill_count: 0,
        }
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    pub fn source_offset(&self) -> u64 {
        self.source_offset
    }

    pub fn bit_cursor(&self) -> usize {
        self.bit_cursor
    }

    pub fn byte_cursor(&self) -> usize {
        self.bit_cursor >> 3
    }

    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    pub fn discarded_bytes(&self) -> usize {
        self.discarded_bytes
    }

    /// Number of refills performed since construction, the initial fill
    /// included.
    pub fn refill_count(&self) -> usize {
        self.refill_count
    }

    pub fn map(&self) -> Option<&'m BitstreamMap> {
        self.map
    }

    pub fn sample_cursor(&self) -> usize {
        self.sample_cursor
    }

    pub fn current_sample(&self) -> Option<&'m Sample> {
        self.map.and_then(|map| map.sample(self.sample_cursor))
    }

    /// Buffered bytes from window position 0 up to `buffer_length`.
    pub fn window(&self) -> &[u8] {
        &self.buffer[..self.buffer_length]
    }

    pub fn absolute_byte_offset(&self) -> u64 {
        self.source_offset + (self.bit_cursor >> 3) as u64 + self.discarded_bytes as u64
    }

    pub fn absolute_bit_offset(&self) -> u64 {
        (self.absolute_byte_offset() << 3) + (self.bit_cursor & 7) as u64
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_cursor & 7 == 0
    }

    pub fn byte_align(&mut self) {
        self.bit_cursor = (self.bit_cursor + 7) & !7;
    }

    /// Bits left in the current window without refilling.
    pub fn buffered_bits(&self) -> usize {
        (self.buffer_length << 3) - self.bit_cursor
    }

    /// End of the readable region: the current sample end when mapped, the
    /// source size otherwise.
    fn data_end(&self) -> u64 {
        match self.current_sample() {
            Some(sample) => sample.end().min(self.source_size),
            None => self.source_size,
        }
    }

    pub fn more_data(&self) -> bool {
        match self.map {
            None => self.source_offset + ((self.bit_cursor >> 3) as u64) < self.source_size,
            Some(map) => {
                self.sample_cursor + 1 < map.sample_count()
                    || self.absolute_byte_offset() < self.data_end()
            }
        }
    }

    /// Refills the window.
    ///
    /// `Some(offset)` anchors the window at `offset` with the cursor at bit 0.
    /// `None` continues from the current position, keeping the unread bits of
    /// the current byte and folding discarded bytes into the source offset.
    pub fn refill(&mut self, target: Option<u64>) -> BsResult<()> {
        let (offset, bit_cursor) = match target {
            Some(offset) => (offset, 0),
            None => (
                self.source_offset + (self.bit_cursor >> 3) as u64 + self.discarded_bytes as u64,
                self.bit_cursor & 7,
            ),
        };

        let end = self.data_end();
        if offset >= end {
            return Err(BitstreamError::PrematureEndOfStream { offset, end });
        }

        let length = (self.buffer_saved_capacity as u64).min(end - offset) as usize;

        self.source.seek(SeekFrom::Start(offset))?;
        let read = read_fully(&mut self.source, &mut self.buffer[..length])?;

        self.source_offset = offset;
        self.bit_cursor = bit_cursor;
        self.discarded_bytes = 0;
        self.refill_count += 1;

        if read < length {
            self.buffer_length = 0;
            self.bit_cursor = 0;
            return Err(BitstreamError::ShortRead {
                offset,
                expected: length,
                read,
            });
        }

        self.buffer_length = length;

        trace!(
            "refill #{}: {} bytes at offset {} (bit {})",
            self.refill_count, length, offset, bit_cursor
        );

        Ok(())
    }

    /// Assembles the next `n` bits MSB first, advancing only when `consume`
    /// is set.
    fn fetch(&mut self, n: u32, consume: bool) -> BsResult<u64> {
        if n == 0 {
            return Ok(0);
        }

        if n > 64 {
            return Err(BitstreamError::TooManyBits(n));
        }

        let front_padding = self.bit_cursor & 7;
        let to_be_read = (n as usize + front_padding).div_ceil(8);

        if self.byte_cursor() + to_be_read > self.buffer_length {
            self.refill(None)?;

            if self.byte_cursor() + to_be_read > self.buffer_length {
                return Err(BitstreamError::PrematureEndOfStream {
                    offset: self.absolute_byte_offset() + to_be_read as u64,
                    end: self.data_end(),
                });
            }
        }

        let start = self.byte_cursor();
        let bytes = &self.buffer[start..start + to_be_read];

        let mut acc = (bytes[0] & (0xFF >> front_padding)) as u128;
        for &byte in &bytes[1..] {
            acc = (acc << 8) | byte as u128;
        }

        let value = (acc >> (to_be_read * 8 - n as usize - front_padding)) as u64;

        if consume {
            self.bit_cursor += n as usize;
        }

        Ok(value)
    }

    #[inline]
    pub fn read_bit(&mut self) -> BsResult<bool> {
        self.fetch(1, true).map(|bit| bit == 1)
    }

    #[inline]
    pub fn next_bit(&mut self) -> BsResult<bool> {
        self.fetch(1, false).map(|bit| bit == 1)
    }

    /// Reads up to 32 bits.
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> BsResult<u32> {
        if n > 32 {
            return Err(BitstreamError::TooManyBits(n));
        }

        self.fetch(n, true).map(|value| value as u32)
    }

    #[inline]
    pub fn next_bits(&mut self, n: u32) -> BsResult<u32> {
        if n > 32 {
            return Err(BitstreamError::TooManyBits(n));
        }

        self.fetch(n, false).map(|value| value as u32)
    }

    #[inline]
    pub fn read_bits_64(&mut self, n: u32) -> BsResult<u64> {
        self.fetch(n, true)
    }

    #[inline]
    pub fn next_bits_64(&mut self, n: u32) -> BsResult<u64> {
        self.fetch(n, false)
    }

    #[inline]
    pub fn read_byte_aligned(&mut self) -> BsResult<u8> {
        debug_assert!(self.is_byte_aligned(), "read_byte_aligned on unaligned cursor");
        self.fetch(8, true).map(|value| value as u8)
    }

    #[inline]
    pub fn next_byte_aligned(&mut self) -> BsResult<u8> {
        debug_assert!(self.is_byte_aligned(), "next_byte_aligned on unaligned cursor");
        self.fetch(8, false).map(|value| value as u8)
    }

    /// Copies `buf.len()` bytes from a byte aligned position, refilling as
    /// many times as needed.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> BsResult<()> {
        debug_assert!(self.is_byte_aligned(), "read_bytes on unaligned cursor");

        let mut filled = 0;
        while filled < buf.len() {
            if self.byte_cursor() >= self.buffer_length {
                self.refill(None)?;
            }

            let start = self.byte_cursor();
            let count = (self.buffer_length - start).min(buf.len() - filled);
            buf[filled..filled + count].copy_from_slice(&self.buffer[start..start + count]);

            filled += count;
            self.bit_cursor += count << 3;
        }

        Ok(())
    }

    pub fn skip_bits(&mut self, n: u64) -> BsResult<()> {
        let window_bits = (self.buffer_length as u64) << 3;

        if self.bit_cursor as u64 + n <= window_bits {
            self.bit_cursor += n as usize;
            return Ok(());
        }

        if n < (self.buffer_saved_capacity as u64) << 3 {
            self.refill(None)?;

            if self.bit_cursor as u64 + n <= (self.buffer_length as u64) << 3 {
                self.bit_cursor += n as usize;
                return Ok(());
            }
        }

        let absolute = self.absolute_bit_offset() + n;
        self.seek_to(absolute >> 3)?;
        self.bit_cursor = (absolute & 7) as usize;

        Ok(())
    }

    pub fn rewind_bits(&mut self, n: u64) -> BsResult<()> {
        if n <= self.bit_cursor as u64 {
            self.bit_cursor -= n as usize;
            return Ok(());
        }

        let current = self.absolute_bit_offset();
        if n > current {
            return Err(BitstreamError::SeekOutOfRange {
                offset: (current as i64 - n as i64) >> 3,
                size: self.source_size,
            });
        }

        let absolute = current - n;
        self.seek_to(absolute >> 3)?;
        self.bit_cursor = (absolute & 7) as usize;

        Ok(())
    }

    /// Jumps to an absolute byte offset and refills there. Valid targets are
    /// `0 < offset < source_size`; the start of the source is reached through
    /// [`open_at`](Self::open_at) or a relative rewind.
    pub fn goto_offset(&mut self, offset: i64) -> BsResult<()> {
        if offset <= 0 {
            return Err(BitstreamError::SeekOutOfRange {
                offset,
                size: self.source_size,
            });
        }

        self.seek_to(offset as u64)
    }

    fn seek_to(&mut self, target: u64) -> BsResult<()> {
        if target >= self.source_size {
            return Err(BitstreamError::PrematureEndOfStream {
                offset: target,
                end: self.source_size,
            });
        }

        if let Some(map) = self.map {
            let index = map
                .sample_at_offset(target)
                .ok_or(BitstreamError::SeekOutOfRange {
                    offset: target as i64,
                    size: self.source_size,
                })?;

            if index != self.sample_cursor {
                self.select_sample(index)?;
            }
        }

        self.refill(Some(target))
    }

    fn select_sample(&mut self, index: usize) -> BsResult<&'m Sample> {
        let map = self.map.ok_or_else(|| {
            BitstreamError::InvalidSource("cursor is not bound to a sample map".into())
        })?;

        let sample = map.sample(index).ok_or(BitstreamError::SampleOutOfRange {
            index,
            count: map.sample_count(),
        })?;

        let size = sample.size as usize;
        if size > self.buffer.len() {
            self.buffer.resize(size, 0);
        }
        self.buffer_saved_capacity = self.buffer_saved_capacity.max(size);
        self.sample_cursor = index;

        Ok(sample)
    }

    /// Buffers sample `index` of the bound map in full and positions the
    /// cursor at its first bit.
    pub fn load_sample(&mut self, index: usize) -> BsResult<()> {
        let sample = self.select_sample(index)?;

        if sample.size == 0 {
            self.source_offset = sample.offset;
            self.buffer_length = 0;
            self.bit_cursor = 0;
            self.discarded_bytes = 0;
            return Ok(());
        }

        self.refill(Some(sample.offset))
    }

    /// Loads the sample after the current one. Returns `false` once the map
    /// is exhausted.
    pub fn next_sample(&mut self) -> BsResult<bool> {
        let count = self.map.map_or(0, |map| map.sample_count());
        if self.sample_cursor + 1 >= count {
            return Ok(false);
        }

        self.load_sample(self.sample_cursor + 1)?;
        Ok(true)
    }

    /// Advances to the next `00 00 01` prefix, searching across refills.
    /// Leaves the cursor on the first zero byte and returns `true`, or at the
    /// end of the data and returns `false`.
    pub fn find_start_code(&mut self) -> BsResult<bool> {
        self.byte_align();

        loop {
            let start = self.byte_cursor();
            let window = &self.buffer[start..self.buffer_length];

            if let Some(pos) = window.windows(3).position(|w| w == [0, 0, 1]) {
                self.bit_cursor = (start + pos) << 3;
                return Ok(true);
            }

            let buffered_end =
                self.source_offset + self.buffer_length as u64 + self.discarded_bytes as u64;
            if buffered_end >= self.data_end() {
                self.bit_cursor = self.buffer_length << 3;
                return Ok(false);
            }

            // keep two bytes so a prefix split by the window edge is found
            let keep = window.len().min(2);
            self.bit_cursor = (self.buffer_length - keep) << 3;
            self.refill(None)?;
        }
    }

    /// Removes the buffered byte at `index` by shifting the rest of the
    /// window left.
    pub(crate) fn discard_buffered_byte(&mut self, index: usize) {
        debug_assert!(index < self.buffer_length);

        self.buffer.copy_within(index + 1..self.buffer_length, index);
        self.buffer_length -= 1;
        self.discarded_bytes += 1;
    }
}
