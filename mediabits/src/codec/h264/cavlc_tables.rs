//! Static CAVLC code tables, clause 9.2.
//!
//! coeff_token entries are indexed `TotalCoeff * 4 + TrailingOnes`; a zero
//! length marks an impossible combination. total_zeros tables have one row
//! per TotalCoeff, run_before tables one row per min(zerosLeft, 7).

/// Code lengths and values of one 2D VLC table, scanned linearly.
#[derive(Debug, Clone, Copy)]
pub struct VlcTable {
    pub name: &'static str,
    pub lengths: &'static [u8],
    pub codes: &'static [u8],
    pub width: usize,
    pub height: usize,
}

impl VlcTable {
    pub const fn len(&self) -> usize {
        self.width * self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const fn row(name: &'static str, lengths: &'static [u8], codes: &'static [u8]) -> VlcTable {
    VlcTable {
        name,
        lengths,
        codes,
        width: lengths.len(),
        height: 1,
    }
}

const fn coeff_token(name: &'static str, lengths: &'static [u8], codes: &'static [u8]) -> VlcTable {
    VlcTable {
        name,
        lengths,
        codes,
        width: 4,
        height: lengths.len() / 4,
    }
}

// Table 9-5, 0 <= nC < 2
#[rustfmt::skip]
const COEFF_TOKEN_LEN_0: [u8; 68] = [
     1, 0, 0, 0,
     6, 2, 0, 0,     8, 6, 3, 0,     9, 8, 7, 5,    10, 9, 8, 6,
    11,10, 9, 7,    13,11,10, 8,    13,13,11, 9,    13,13,13,10,
    14,14,13,11,    14,14,14,13,    15,15,14,14,    15,15,15,14,
    16,15,15,15,    16,16,16,15,    16,16,16,16,    16,16,16,16,
];

#[rustfmt::skip]
const COEFF_TOKEN_BITS_0: [u8; 68] = [
     1, 0, 0, 0,
     5, 1, 0, 0,     7, 4, 1, 0,     7, 6, 5, 3,     7, 6, 5, 3,
     7, 6, 5, 4,    15, 6, 5, 4,    11,14, 5, 4,     8,10,13, 4,
    15,14, 9, 4,    11,10,13,12,    15,14, 9,12,    11,10,13, 8,
    15, 1, 9,12,    11,14,13, 8,     7,10, 9,12,     4, 6, 5, 8,
];

// 2 <= nC < 4
#[rustfmt::skip]
const COEFF_TOKEN_LEN_1: [u8; 68] = [
     2, 0, 0, 0,
     6, 2, 0, 0,     6, 5, 3, 0,     7, 6, 6, 4,     8, 6, 6, 4,
     8, 7, 7, 5,     9, 8, 8, 6,    11, 9, 9, 6,    11,11,11, 7,
    12,11,11, 9,    12,12,12,11,    12,12,12,11,    13,13,13,12,
    13,13,13,13,    13,14,13,13,    14,14,14,13,    14,14,14,14,
];

#[rustfmt::skip]
const COEFF_TOKEN_BITS_1: [u8; 68] = [
     3, 0, 0, 0,
    11, 2, 0, 0,     7, 7, 3, 0,     7,10, 9, 5,     7, 6, 5, 4,
     4, 6, 5, 6,     7, 6, 5, 8,    15, 6, 5, 4,    11,14,13, 4,
    15,10, 9, 4,    11,14,13,12,     8,10, 9, 8,    15,14,13,12,
    11,10, 9,12,     7,11, 6, 8,     9, 8,10, 1,     7, 6, 5, 4,
];

// 4 <= nC < 8
#[rustfmt::skip]
const COEFF_TOKEN_LEN_2: [u8; 68] = [
     4, 0, 0, 0,
     6, 4, 0, 0,     6, 5, 4, 0,     6, 5, 5, 4,     7, 5, 5, 4,
     7, 5, 5, 4,     7, 6, 6, 4,     7, 6, 6, 4,     8, 7, 7, 5,
     8, 8, 7, 6,     9, 8, 8, 7,     9, 9, 8, 8,     9, 9, 9, 8,
    10, 9, 9, 9,    10,10,10,10,    10,10,10,10,    10,10,10,10,
];

#[rustfmt::skip]
const COEFF_TOKEN_BITS_2: [u8; 68] = [
    15, 0, 0, 0,
    15,14, 0, 0,    11,15,13, 0,     8,12,14,12,    15,10,11,11,
    11, 8, 9,10,     9,14,13, 9,     8,10, 9, 8,    15,14,13,13,
    11,14,10,12,    15,10,13,12,    11,14, 9,12,     8,10,13, 8,
    13, 7, 9,12,     9,12,11,10,     5, 8, 7, 6,     1, 4, 3, 2,
];

// 8 <= nC, 6 bit fixed length codes
#[rustfmt::skip]
const COEFF_TOKEN_LEN_3: [u8; 68] = [
     6, 0, 0, 0,
     6, 6, 0, 0,     6, 6, 6, 0,     6, 6, 6, 6,     6, 6, 6, 6,
     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,
     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,
     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,
];

#[rustfmt::skip]
const COEFF_TOKEN_BITS_3: [u8; 68] = [
     3, 0, 0, 0,
     0, 1, 0, 0,     4, 5, 6, 0,     8, 9,10,11,    12,13,14,15,
    16,17,18,19,    20,21,22,23,    24,25,26,27,    28,29,30,31,
    32,33,34,35,    36,37,38,39,    40,41,42,43,    44,45,46,47,
    48,49,50,51,    52,53,54,55,    56,57,58,59,    60,61,62,63,
];

// nC == -1
#[rustfmt::skip]
const CHROMA_DC_COEFF_TOKEN_LEN: [u8; 20] = [
     2, 0, 0, 0,
     6, 1, 0, 0,
     6, 6, 3, 0,
     6, 7, 7, 6,
     6, 8, 8, 7,
];

#[rustfmt::skip]
const CHROMA_DC_COEFF_TOKEN_BITS: [u8; 20] = [
     1, 0, 0, 0,
     7, 1, 0, 0,
     4, 6, 1, 0,
     3, 3, 2, 5,
     2, 3, 2, 0,
];

// nC == -2
#[rustfmt::skip]
const CHROMA422_DC_COEFF_TOKEN_LEN: [u8; 36] = [
     1, 0, 0, 0,
     7, 2, 0, 0,
     7, 7, 3, 0,
     9, 7, 7, 5,
     9, 9, 7, 6,
    10,10, 9, 7,
    11,11,10, 7,
    12,12,11,10,
    13,12,12,11,
];

#[rustfmt::skip]
const CHROMA422_DC_COEFF_TOKEN_BITS: [u8; 36] = [
     1, 0, 0, 0,
    15, 1, 0, 0,
    14,13, 1, 0,
     7,12,11, 1,
     6, 5,10, 1,
     7, 6, 4, 9,
     7, 6, 5, 8,
     7, 6, 5, 4,
     7, 5, 4, 4,
];

pub static COEFF_TOKEN: [VlcTable; 4] = [
    coeff_token("coeff_token 0<=nC<2", &COEFF_TOKEN_LEN_0, &COEFF_TOKEN_BITS_0),
    coeff_token("coeff_token 2<=nC<4", &COEFF_TOKEN_LEN_1, &COEFF_TOKEN_BITS_1),
    coeff_token("coeff_token 4<=nC<8", &COEFF_TOKEN_LEN_2, &COEFF_TOKEN_BITS_2),
    coeff_token("coeff_token 8<=nC", &COEFF_TOKEN_LEN_3, &COEFF_TOKEN_BITS_3),
];

pub static CHROMA_DC_COEFF_TOKEN: VlcTable = coeff_token(
    "coeff_token nC=-1",
    &CHROMA_DC_COEFF_TOKEN_LEN,
    &CHROMA_DC_COEFF_TOKEN_BITS,
);

pub static CHROMA422_DC_COEFF_TOKEN: VlcTable = coeff_token(
    "coeff_token nC=-2",
    &CHROMA422_DC_COEFF_TOKEN_LEN,
    &CHROMA422_DC_COEFF_TOKEN_BITS,
);

// Tables 9-7 and 9-8, 4x4 blocks
pub static TOTAL_ZEROS: [VlcTable; 15] = [
    row("total_zeros tzVlcIndex 1", &[1, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 9], &[1, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 1]),
    row("total_zeros tzVlcIndex 2", &[3, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 6, 6, 6, 6], &[7, 6, 5, 4, 3, 5, 4, 3, 2, 3, 2, 3, 2, 1, 0]),
    row("total_zeros tzVlcIndex 3", &[4, 3, 3, 3, 4, 4, 3, 3, 4, 5, 5, 6, 5, 6], &[5, 7, 6, 5, 4, 3, 4, 3, 2, 3, 2, 1, 1, 0]),
    row("total_zeros tzVlcIndex 4", &[5, 3, 4, 4, 3, 3, 3, 4, 3, 4, 5, 5, 5], &[3, 7, 5, 4, 6, 5, 4, 3, 3, 2, 2, 1, 0]),
    row("total_zeros tzVlcIndex 5", &[4, 4, 4, 3, 3, 3, 3, 3, 4, 5, 4, 5], &[5, 4, 3, 7, 6, 5, 4, 3, 2, 1, 1, 0]),
    row("total_zeros tzVlcIndex 6", &[6, 5, 3, 3, 3, 3, 3, 3, 4, 3, 6], &[1, 1, 7, 6, 5, 4, 3, 2, 1, 1, 0]),
    row("total_zeros tzVlcIndex 7", &[6, 5, 3, 3, 3, 2, 3, 4, 3, 6], &[1, 1, 5, 4, 3, 3, 2, 1, 1, 0]),
    row("total_zeros tzVlcIndex 8", &[6, 4, 5, 3, 2, 2, 3, 3, 6], &[1, 1, 1, 3, 3, 2, 2, 1, 0]),
    row("total_zeros tzVlcIndex 9", &[6, 6, 4, 2, 2, 3, 2, 5], &[1, 0, 1, 3, 2, 1, 1, 1]),
    row("total_zeros tzVlcIndex 10", &[5, 5, 3, 2, 2, 2, 4], &[1, 0, 1, 3, 2, 1, 1]),
    row("total_zeros tzVlcIndex 11", &[4, 4, 3, 3, 1, 3], &[0, 1, 1, 2, 1, 3]),
    row("total_zeros tzVlcIndex 12", &[4, 4, 2, 1, 3], &[0, 1, 1, 1, 1]),
    row("total_zeros tzVlcIndex 13", &[3, 3, 1, 2], &[0, 1, 1, 1]),
    row("total_zeros tzVlcIndex 14", &[2, 2, 1], &[0, 1, 1]),
    row("total_zeros tzVlcIndex 15", &[1, 1], &[0, 1]),
];

// Table 9-9a, chroma DC 4:2:0
pub static CHROMA_DC_TOTAL_ZEROS: [VlcTable; 3] = [
    row("chroma DC total_zeros tzVlcIndex 1", &[1, 2, 3, 3], &[1, 1, 1, 0]),
    row("chroma DC total_zeros tzVlcIndex 2", &[1, 2, 2], &[1, 1, 0]),
    row("chroma DC total_zeros tzVlcIndex 3", &[1, 1], &[1, 0]),
];

// Table 9-9b, chroma DC 4:2:2
pub static CHROMA422_DC_TOTAL_ZEROS: [VlcTable; 7] = [
    row("chroma422 DC total_zeros tzVlcIndex 1", &[1, 3, 3, 4, 4, 4, 5, 5], &[1, 2, 3, 2, 3, 1, 1, 0]),
    row("chroma422 DC total_zeros tzVlcIndex 2", &[3, 2, 3, 3, 3, 3, 3], &[0, 1, 1, 4, 5, 6, 7]),
    row("chroma422 DC total_zeros tzVlcIndex 3", &[3, 3, 2, 2, 3, 3], &[0, 1, 1, 2, 6, 7]),
    row("chroma422 DC total_zeros tzVlcIndex 4", &[3, 2, 2, 2, 3], &[6, 0, 1, 2, 7]),
    row("chroma422 DC total_zeros tzVlcIndex 5", &[2, 2, 2, 2], &[0, 1, 2, 3]),
    row("chroma422 DC total_zeros tzVlcIndex 6", &[2, 2, 1], &[0, 1, 1]),
    row("chroma422 DC total_zeros tzVlcIndex 7", &[1, 1], &[0, 1]),
];

// Table 9-10
pub static RUN_BEFORE: [VlcTable; 7] = [
    row("run_before zerosLeft 1", &[1, 1], &[1, 0]),
    row("run_before zerosLeft 2", &[1, 2, 2], &[1, 1, 0]),
    row("run_before zerosLeft 3", &[2, 2, 2, 2], &[3, 2, 1, 0]),
    row("run_before zerosLeft 4", &[2, 2, 2, 3, 3], &[3, 2, 1, 1, 0]),
    row("run_before zerosLeft 5", &[2, 2, 3, 3, 3, 3], &[3, 2, 3, 2, 1, 0]),
    row("run_before zerosLeft 6", &[2, 3, 3, 3, 3, 3, 3], &[3, 0, 1, 3, 2, 5, 4]),
    row(
        "run_before zerosLeft >6",
        &[3, 3, 3, 3, 3, 3, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        &[7, 6, 5, 4, 3, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    ),
];
