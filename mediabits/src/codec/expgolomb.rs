//! Exp-Golomb codes, ITU-T H.264 clause 9.1 / H.265 clause 9.2.
//!
//! Stateless readers over the cursor. Buffering is left to [`Bitstream`].

use anyhow::{Result, bail};

use crate::bitstream::{Bitstream, ByteSource};
use crate::utils::errors::ExpGolombError;

/// Longest prefix whose codeNum still fits 32 bits.
const MAX_LEADING_ZERO_BITS: u32 = 31;

/// codeNum to coded_block_pattern, ChromaArrayType 1 or 2, Intra_4x4/Intra_8x8.
const CBP_INTRA: [u8; 48] = [
    47, 31, 15, 0, 23, 27, 29, 30, 7, 11, 13, 14, 39, 43, 45, 46, 16, 3, 5, 10, 12, 19, 21, 26, 28,
    35, 37, 42, 44, 1, 2, 4, 8, 17, 18, 20, 24, 6, 9, 22, 25, 32, 33, 34, 36, 40, 38, 41,
];

/// codeNum to coded_block_pattern, ChromaArrayType 1 or 2, Inter.
const CBP_INTER: [u8; 48] = [
    0, 16, 1, 2, 4, 8, 32, 3, 5, 10, 12, 15, 47, 7, 11, 13, 14, 6, 9, 31, 35, 37, 42, 44, 33, 34,
    36, 40, 39, 43, 45, 46, 17, 18, 20, 24, 19, 21, 26, 28, 23, 27, 29, 30, 22, 25, 38, 41,
];

/// ChromaArrayType 0 or 3, Intra_4x4/Intra_8x8.
const CBP_INTRA_NO_CHROMA: [u8; 16] = [15, 0, 7, 11, 13, 14, 3, 5, 10, 12, 1, 2, 4, 8, 6, 9];

/// ChromaArrayType 0 or 3, Inter.
const CBP_INTER_NO_CHROMA: [u8; 16] = [0, 1, 2, 4, 8, 3, 5, 10, 12, 15, 7, 11, 13, 14, 6, 9];

/// ue(v)
pub fn read_ue<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<u32> {
    let mut leading_zero_bits = 0;
    while !bs.read_bit()? {
        leading_zero_bits += 1;
        if leading_zero_bits > MAX_LEADING_ZERO_BITS {
            bail!(ExpGolombError::CodeTooLong(leading_zero_bits));
        }
    }

    if leading_zero_bits == 0 {
        return Ok(0);
    }

    let suffix = bs.read_bits(leading_zero_bits)? as u64;

    Ok(((1u64 << leading_zero_bits) - 1 + suffix) as u32)
}

/// se(v)
pub fn read_se<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<i32> {
    let code_num = read_ue(bs)? as i64;
    let magnitude = (code_num + 1) >> 1;

    Ok(if code_num & 1 == 1 {
        magnitude as i32
    } else {
        -magnitude as i32
    })
}

/// me(v), mapped to coded_block_pattern.
pub fn read_me<S: ByteSource>(
    bs: &mut Bitstream<S>,
    chroma_array_type: u8,
    intra: bool,
) -> Result<u8> {
    let code_num = read_ue(bs)?;

    let table: &[u8] = match (chroma_array_type, intra) {
        (1 | 2, true) => &CBP_INTRA,
        (1 | 2, false) => &CBP_INTER,
        (_, true) => &CBP_INTRA_NO_CHROMA,
        (_, false) => &CBP_INTER_NO_CHROMA,
    };

    match table.get(code_num as usize) {
        Some(&cbp) => Ok(cbp),
        None => bail!(ExpGolombError::MappedCodeOutOfRange {
            code_num,
            max: table.len()
        }),
    }
}

/// te(v) with the syntax element range `range`.
pub fn read_te<S: ByteSource>(bs: &mut Bitstream<S>, range: u32) -> Result<u32> {
    if range > 1 {
        read_ue(bs)
    } else {
        Ok(!bs.read_bit()? as u32)
    }
}
