//! CAVLC residual block parsing, clauses 7.3.5.3.3 and 9.2.

use std::ops::RangeInclusive;

use anyhow::{Result, bail};
use log::trace;

pub use super::cavlc_tables::VlcTable;
use super::cavlc_tables::{
    CHROMA_DC_COEFF_TOKEN, CHROMA_DC_TOTAL_ZEROS, CHROMA422_DC_COEFF_TOKEN,
    CHROMA422_DC_TOTAL_ZEROS, COEFF_TOKEN, RUN_BEFORE, TOTAL_ZEROS,
};
use super::macroblock::{BlockType, MacroblockContext};
use crate::bitstream::{Bitstream, ByteSource};
use crate::utils::errors::CavlcError;

/// Longest level_prefix accepted; larger values cannot be represented in
/// 32-bit level codes.
const MAX_LEVEL_PREFIX: u32 = 28;

/// Coefficients of one residual block, in scanning order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResidualBlock {
    pub coeff_level: [i32; 16],
    pub max_num_coeff: usize,
    pub total_coeff: usize,
    pub trailing_ones: usize,
}

impl ResidualBlock {
    pub fn coefficients(&self) -> &[i32] {
        &self.coeff_level[..self.max_num_coeff]
    }
}

/// Matches the next code of `table` and returns its entry index. The cursor
/// only advances on a match.
pub fn decode_table_lookup<S: ByteSource>(bs: &mut Bitstream<S>, table: &VlcTable) -> Result<usize> {
    for index in 0..table.len() {
        let length = table.lengths[index] as u32;
        if length == 0 {
            continue;
        }

        match bs.next_bits(length) {
            Ok(code) if code == table.codes[index] as u32 => {
                bs.skip_bits(length as u64)?;
                return Ok(index);
            }
            Ok(_) => {}
            // fewer bits left than this code needs, a shorter one may still match
            Err(e) if e.is_end_of_stream() => {}
            Err(e) => return Err(e.into()),
        }
    }

    bail!(CavlcError::VlcTableMiss {
        table: table.name,
        offset: bs.absolute_bit_offset(),
    })
}

fn coeff_token_table(nc: i32) -> &'static VlcTable {
    match nc {
        -1 => &CHROMA_DC_COEFF_TOKEN,
        i32::MIN..=-2 => &CHROMA422_DC_COEFF_TOKEN,
        0..=1 => &COEFF_TOKEN[0],
        2..=3 => &COEFF_TOKEN[1],
        4..=7 => &COEFF_TOKEN[2],
        _ => &COEFF_TOKEN[3],
    }
}

fn read_level_prefix<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<u32> {
    let mut leading_zeros = 0;
    while !bs.read_bit()? {
        leading_zeros += 1;
        if leading_zeros > MAX_LEVEL_PREFIX {
            bail!(CavlcError::LevelPrefixTooLarge(leading_zeros));
        }
    }

    Ok(leading_zeros)
}

/// Non-trailing-one levels with the adaptive suffixLength, 7.3.5.3.3.
fn read_levels<S: ByteSource>(
    bs: &mut Bitstream<S>,
    level: &mut [i32; 16],
    total_coeff: usize,
    trailing_ones: usize,
) -> Result<()> {
    let mut suffix_length: u32 = if total_coeff > 10 && trailing_ones < 3 { 1 } else { 0 };

    for i in 0..total_coeff {
        if i < trailing_ones {
            level[i] = if bs.read_bit()? { -1 } else { 1 };
            continue;
        }

        let level_prefix = read_level_prefix(bs)?;
        let mut level_code = (level_prefix.min(15) << suffix_length) as i32;

        if suffix_length > 0 || level_prefix >= 14 {
            let level_suffix_size = match level_prefix {
                14 if suffix_length == 0 => 4,
                15.. => level_prefix - 3,
                _ => suffix_length,
            };
            if level_suffix_size > 0 {
                level_code += bs.read_bits(level_suffix_size)? as i32;
            }
        }

        if level_prefix >= 15 && suffix_length == 0 {
            level_code += 15;
        }
        if level_prefix >= 16 {
            level_code += (1 << (level_prefix - 3)) - 4096;
        }
        if i == trailing_ones && trailing_ones < 3 {
            level_code += 2;
        }

        level[i] = if level_code % 2 == 0 {
            (level_code + 2) >> 1
        } else {
            (-level_code - 1) >> 1
        };

        if suffix_length == 0 {
            suffix_length = 1;
        }
        if level[i].unsigned_abs() > (3 << (suffix_length - 1)) && suffix_length < 6 {
            suffix_length += 1;
        }
    }

    Ok(())
}

fn total_zeros_table(block_type: BlockType, max_num_coeff: usize, total_coeff: usize) -> &'static VlcTable {
    match block_type {
        BlockType::ChromaDc if max_num_coeff == 4 => &CHROMA_DC_TOTAL_ZEROS[total_coeff - 1],
        BlockType::ChromaDc => &CHROMA422_DC_TOTAL_ZEROS[total_coeff - 1],
        _ => &TOTAL_ZEROS[total_coeff - 1],
    }
}

/// residual_block_cavlc() for the coefficients `block_range` of a block.
///
/// nC is predicted from `mb_context` and the block's TotalCoeff is recorded
/// there on success. Any error leaves the returned coefficients unset.
pub fn decode_block<S: ByteSource>(
    bs: &mut Bitstream<S>,
    mb_context: &mut MacroblockContext,
    block_range: RangeInclusive<usize>,
    block_type: BlockType,
    block_index: usize,
) -> Result<ResidualBlock> {
    let max_num_coeff = block_type.max_num_coeff(mb_context.chroma_array_type());
    let (start_idx, end_idx) = (*block_range.start(), *block_range.end());
    if start_idx > end_idx || end_idx >= max_num_coeff {
        bail!(CavlcError::InvalidRange {
            start: start_idx,
            end: end_idx,
        });
    }
    let coded = end_idx - start_idx + 1;

    let nc = mb_context.predict_nc(block_type, block_index);
    let token = decode_table_lookup(bs, coeff_token_table(nc))?;
    let (total_coeff, trailing_ones) = (token / 4, token % 4);

    let mut block = ResidualBlock {
        max_num_coeff,
        total_coeff,
        trailing_ones,
        ..Default::default()
    };

    if total_coeff > coded {
        bail!(CavlcError::TooManyCoefficients {
            total_coeff,
            max: coded,
        });
    }

    if total_coeff > 0 {
        let mut level = [0i32; 16];
        let mut run = [0usize; 16];
        read_levels(bs, &mut level, total_coeff, trailing_ones)?;

        let mut zeros_left = if total_coeff < coded {
            decode_table_lookup(bs, total_zeros_table(block_type, max_num_coeff, total_coeff))?
        } else {
            0
        };
        if total_coeff + zeros_left > coded {
            bail!(CavlcError::RunOverflow {
                position: start_idx + total_coeff + zeros_left - 1,
                end: end_idx,
            });
        }

        for i in 0..total_coeff - 1 {
            if zeros_left > 0 {
                run[i] = decode_table_lookup(bs, &RUN_BEFORE[zeros_left.min(7) - 1])?;
                if run[i] > zeros_left {
                    bail!(CavlcError::RunOverflow {
                        position: start_idx + run[i],
                        end: start_idx + zeros_left,
                    });
                }
            }
            zeros_left -= run[i];
        }
        run[total_coeff - 1] = zeros_left;

        let mut coeff_num = 0;
        for i in (0..total_coeff).rev() {
            coeff_num += run[i] + 1;
            let position = start_idx + coeff_num - 1;
            if position > end_idx {
                bail!(CavlcError::RunOverflow {
                    position,
                    end: end_idx,
                });
            }
            block.coeff_level[position] = level[i];
        }
    }

    mb_context.record(block_type, block_index, total_coeff as u8);

    trace!(
        "{block_type:?}[{block_index}] nC={nc} TotalCoeff={total_coeff} TrailingOnes={trailing_ones}"
    );

    Ok(block)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::h264::macroblock::{MbKind, Plane};
    use crate::utils::bit_writer::BitBuilder;

    const Y4X4: BlockType = BlockType::Luma4x4(Plane::Y);

    fn context() -> MacroblockContext {
        let mut ctx = MacroblockContext::new(2, 1, 1);
        ctx.start_macroblock(0, 0, MbKind::Intra).unwrap();
        ctx
    }

    #[test]
    fn coeff_token_every_bucket() {
        let dc_tables = [&CHROMA_DC_COEFF_TOKEN, &CHROMA422_DC_COEFF_TOKEN];

        for table in COEFF_TOKEN.iter().chain(dc_tables) {
            for index in (0..table.len()).filter(|&i| table.lengths[i] != 0) {
                let data = BitBuilder::new()
                    .bits(table.lengths[index] as u32, table.codes[index] as u64)
                    .bits(16, 0xFFFF)
                    .finish();
                let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

                assert_eq!(decode_table_lookup(&mut bs, table).unwrap(), index, "{}", table.name);
                assert_eq!(bs.bit_cursor(), table.lengths[index] as usize);
            }
        }
    }

    #[test]
    fn nc_selects_bucket() {
        assert_eq!(coeff_token_table(-1).name, CHROMA_DC_COEFF_TOKEN.name);
        assert_eq!(coeff_token_table(-2).name, CHROMA422_DC_COEFF_TOKEN.name);
        assert_eq!(coeff_token_table(1).name, COEFF_TOKEN[0].name);
        assert_eq!(coeff_token_table(3).name, COEFF_TOKEN[1].name);
        assert_eq!(coeff_token_table(7).name, COEFF_TOKEN[2].name);
        assert_eq!(coeff_token_table(16).name, COEFF_TOKEN[3].name);
    }

    #[test]
    fn full_luma_block() {
        let data = BitBuilder::new()
            .pattern("0000 100") // TotalCoeff 5, TrailingOnes 3
            .pattern("001") // signs + + -
            .pattern("01") // level -1
            .pattern("001 0") // level 3
            .pattern("110") // total_zeros 4
            .pattern("10 11 01 1") // run_before 1 0 2 0
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let mut ctx = context();

        let block = decode_block(&mut bs, &mut ctx, 0..=15, Y4X4, 0).unwrap();
        assert_eq!(block.total_coeff, 5);
        assert_eq!(block.trailing_ones, 3);
        assert_eq!(
            block.coefficients(),
            &[0, 3, -1, 0, 0, -1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(ctx.total_coeff(Y4X4, 0), 5);
        assert_eq!(bs.bit_cursor(), 26);
    }

    #[test]
    fn escaped_level() {
        let data = BitBuilder::new()
            .pattern("0001 01") // TotalCoeff 1, TrailingOnes 0
            .pattern("0000 0000 0000 001") // level_prefix 14
            .pattern("0010")
            .pattern("1") // total_zeros 0
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        let block = decode_block(&mut bs, &mut context(), 0..=15, Y4X4, 0).unwrap();
        assert_eq!(block.coeff_level[0], 10);
        assert_eq!(block.coeff_level[1..], [0; 15]);
    }

    #[test]
    fn pcm_neighbour_uses_fixed_length_codes() {
        let mut ctx = MacroblockContext::new(2, 1, 1);
        ctx.start_macroblock(0, 0, MbKind::IPcm).unwrap();
        ctx.start_macroblock(1, 0, MbKind::Intra).unwrap();

        let data = BitBuilder::new()
            .pattern("0000 01") // TotalCoeff 1, TrailingOnes 1
            .pattern("1") // sign
            .pattern("0000 0000 1") // total_zeros 15
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        let block = decode_block(&mut bs, &mut ctx, 0..=15, Y4X4, 0).unwrap();
        assert_eq!(block.coeff_level[15], -1);
        assert_eq!(block.coeff_level[..15], [0; 15]);
    }

    #[test]
    fn chroma_dc_420() {
        let data = BitBuilder::new()
            .pattern("1") // TotalCoeff 1, TrailingOnes 1
            .pattern("1")
            .pattern("001") // total_zeros 2
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        let block = decode_block(&mut bs, &mut context(), 0..=3, BlockType::ChromaDc, 0).unwrap();
        assert_eq!(block.coefficients(), &[0, 0, -1, 0]);
    }

    #[test]
    fn ac_block_range_is_offset() {
        let data = BitBuilder::new()
            .pattern("01") // TotalCoeff 1, TrailingOnes 1
            .pattern("0")
            .pattern("011") // total_zeros 1
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        let ac = BlockType::Intra16x16Ac(Plane::Y);
        let block = decode_block(&mut bs, &mut context(), 0..=14, ac, 3).unwrap();
        assert_eq!(block.max_num_coeff, 15);
        assert_eq!(block.coeff_level[1], 1);
    }

    #[test]
    fn table_miss_is_reported() {
        let data = [0u8; 3];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        let err = decode_block(&mut bs, &mut context(), 0..=15, Y4X4, 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CavlcError>(),
            Some(CavlcError::VlcTableMiss { .. })
        ));
        assert_eq!(bs.bit_cursor(), 0);
    }

    #[test]
    fn invalid_range() {
        let data = [0xFFu8; 2];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        assert!(decode_block(&mut bs, &mut context(), 3..=1, Y4X4, 0).is_err());
        assert!(decode_block(&mut bs, &mut context(), 0..=15, BlockType::ChromaAc, 0).is_err());
    }
}
