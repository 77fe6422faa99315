//! CRC validation utilities for media bitstreams.
//!
//! Provides the table driven, non-reflected CRC-16 and CRC-32 variants used by
//! MPEG audio frame protection and MPEG-2 PSI sections.

/// CRC algorithm specification with polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-16 protecting MPEG audio frame headers and side information.
pub const CRC_MPEG_AUDIO_ALG: Algorithm<u16> = Algorithm {
    poly: 0x8005,
    init: 0xFFFF,
};

/// CRC-32/MPEG-2 protecting PSI sections (PAT, PMT, ...).
pub const CRC_MPEG2_SECTION_ALG: Algorithm<u32> = Algorithm {
    poly: 0x04C1_1DB7,
    init: 0xFFFF_FFFF,
};

/// Shifts a CRC-16 register through `len` bits of zero input.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    value <<= 8;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

/// Shifts a CRC-32 register through `len` bits of zero input.
#[inline(always)]
pub const fn crc32(poly: u32, mut value: u32, len: usize) -> u32 {
    value <<= 24;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 31) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, i as u16, 8);
        i += 1;
    }

    table
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    table: [u16; 256],
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    table: [u32; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm<u16>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc16_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table[((crc >> 8) as u8 ^ bytes[i]) as usize] ^ (crc << 8);
            i += 1;
        }

        crc
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u16 {
        self.update(self.init, bytes)
    }
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc32_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table[((crc >> 24) as u8 ^ bytes[i]) as usize] ^ (crc << 8);
            i += 1;
        }

        crc
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.update(self.init, bytes)
    }
}

#[test]
fn crc_check_values() {
    // Standard check input "123456789".
    let crc32 = Crc32::new(&CRC_MPEG2_SECTION_ALG);
    assert_eq!(crc32.checksum(b"123456789"), 0x0376_E6E7);

    let crc16 = Crc16::new(&CRC_MPEG_AUDIO_ALG);
    assert_eq!(crc16.checksum(b"123456789"), 0xAEE7);
}

#[test]
fn crc32_section_residue_is_zero() {
    let crc32 = Crc32::new(&CRC_MPEG2_SECTION_ALG);
    let mut section = b"mediabits section".to_vec();
    let crc = crc32.checksum(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    assert_eq!(crc32.checksum(&section), 0);
}
