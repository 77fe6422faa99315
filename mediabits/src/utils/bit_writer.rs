//! Bit-level stream builder for unit tests.

use bitstream_io::{BigEndian, BitWrite, BitWriter};

pub struct BitBuilder {
    writer: BitWriter<Vec<u8>, BigEndian>,
}

impl BitBuilder {
    pub fn new() -> Self {
        Self {
            writer: BitWriter::new(Vec::new()),
        }
    }

    pub fn bits(mut self, n: u32, value: u64) -> Self {
        if n > 0 {
            self.writer.write_unsigned_var(n, value).unwrap();
        }
        self
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.writer.write_bit(value).unwrap();
        self
    }

    pub fn ue(self, value: u32) -> Self {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        self.bits(len - 1, 0).bits(len, code)
    }

    pub fn se(self, value: i32) -> Self {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.ue(code)
    }

    /// Appends a bit string such as `"0010 1"`; spaces are ignored.
    pub fn pattern(mut self, bits: &str) -> Self {
        for c in bits.chars().filter(|c| !c.is_whitespace()) {
            self = self.flag(c == '1');
        }
        self
    }

    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        for &byte in bytes {
            self = self.bits(8, byte as u64);
        }
        self
    }

    /// rbsp_trailing_bits.
    pub fn trailing(mut self) -> Self {
        self = self.flag(true);
        while !self.writer.byte_aligned() {
            self = self.flag(false);
        }
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.writer.byte_align().unwrap();
        self.writer.into_writer()
    }
}

/// Inserts emulation prevention bytes so `rbsp` can sit in an Annex B stream.
pub fn escape(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0;

    for &byte in rbsp {
        if zeros >= 2 && byte <= 3 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }

    out
}
