//! Macroblock neighbour state for CAVLC nC prediction, clause 9.2.1.
//!
//! Only frame macroblock addressing is modelled: the left neighbour of
//! `mb_addr` is `mb_addr - 1` on the same row and the upper neighbour is one
//! row up.

use anyhow::{Result, bail};

use super::sps::H264Sps;
use crate::utils::array2d::Array2D;
use crate::utils::errors::ParameterSetError;

/// Coarse macroblock prediction class, enough for the nC rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MbKind {
    #[default]
    Intra,
    Inter,
    IPcm,
    Skip,
}

impl MbKind {
    pub fn is_intra(self) -> bool {
        matches!(self, Self::Intra | Self::IPcm)
    }
}

/// Colour plane of a luma-like residual block. Cb and Cr only appear here
/// when ChromaArrayType is 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Y = 0,
    Cb = 1,
    Cr = 2,
}

/// Residual block category as in residual_luma() and residual().
///
/// `block_index` passed alongside is the 4x4 luma blkIdx (for `Luma8x8`,
/// `luma8x8BlkIdx * 4 + i4x4`), `iCbCr` for `ChromaDc`, and
/// `iCbCr * 8 + chroma4x4BlkIdx` for `ChromaAc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Intra16x16Dc(Plane),
    Intra16x16Ac(Plane),
    Luma4x4(Plane),
    Luma8x8(Plane),
    ChromaDc,
    ChromaAc,
}

impl BlockType {
    pub fn max_num_coeff(self, chroma_array_type: u8) -> usize {
        match self {
            BlockType::Intra16x16Ac(_) | BlockType::ChromaAc => 15,
            BlockType::ChromaDc if chroma_array_type == 2 => 8,
            BlockType::ChromaDc => 4,
            _ => 16,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MbState {
    decoded: bool,
    slice_num: u32,
    kind: MbKind,
    /// TotalCoeff per 4x4 block in raster order, per colour plane.
    luma: [[u8; 16]; 3],
    /// TotalCoeff per chroma AC block in raster order, two blocks wide.
    chroma: [[u8; 8]; 2],
}

/// Raster position of a 4x4 luma block inside its macroblock.
fn luma_position(blk_idx: usize) -> (usize, usize) {
    let x = ((blk_idx >> 2) & 1) * 2 + (blk_idx & 1);
    let y = ((blk_idx >> 3) & 1) * 2 + ((blk_idx >> 1) & 1);
    (x, y)
}

#[derive(Debug, Clone)]
pub struct MacroblockContext {
    mbs: Array2D<MbState>,
    current: (usize, usize),
    chroma_array_type: u8,
    constrained_intra_pred: bool,
    data_partitioned: bool,
}

impl MacroblockContext {
    pub fn new(width_in_mbs: usize, height_in_mbs: usize, chroma_array_type: u8) -> Self {
        Self {
            mbs: Array2D::new(width_in_mbs.max(1), height_in_mbs.max(1)),
            current: (0, 0),
            chroma_array_type,
            constrained_intra_pred: false,
            data_partitioned: false,
        }
    }

    pub fn from_sps(sps: &H264Sps) -> Self {
        Self::new(
            sps.pic_width_in_mbs_minus1 as usize + 1,
            sps.frame_height_in_mbs() as usize,
            sps.chroma_array_type(),
        )
    }

    /// Enables the constrained intra rule: with data partitioning, an intra
    /// macroblock does not see inter neighbours.
    pub fn set_constrained_intra_pred(&mut self, constrained: bool, data_partitioned: bool) {
        self.constrained_intra_pred = constrained;
        self.data_partitioned = data_partitioned;
    }

    pub fn chroma_array_type(&self) -> u8 {
        self.chroma_array_type
    }

    pub fn width_in_mbs(&self) -> usize {
        self.mbs.width()
    }

    pub fn current_mb_addr(&self) -> usize {
        self.current.1 * self.mbs.width() + self.current.0
    }

    /// Starts decoding `mb_addr`; its coefficient counts are cleared.
    pub fn start_macroblock(&mut self, mb_addr: usize, slice_num: u32, kind: MbKind) -> Result<()> {
        let width = self.mbs.width();
        let (x, y) = (mb_addr % width, mb_addr / width);
        if y >= self.mbs.height() {
            bail!(ParameterSetError::ValueOutOfRange {
                field: "mb_addr",
                value: mb_addr as i64,
                min: 0,
                max: (width * self.mbs.height()) as i64 - 1,
            });
        }

        self.current = (x, y);
        self.mbs[(y, x)] = MbState {
            decoded: true,
            slice_num,
            kind,
            ..Default::default()
        };

        Ok(())
    }

    /// Forgets every macroblock, for a new picture.
    pub fn reset(&mut self) {
        self.mbs.fill(MbState::default());
        self.current = (0, 0);
    }

    fn current_state(&self) -> &MbState {
        &self.mbs[(self.current.1, self.current.0)]
    }

    /// Block grid position, grid size, and the counter slot for a block.
    fn geometry(&self, block_type: BlockType, block_index: usize) -> (usize, usize, usize, usize) {
        match block_type {
            BlockType::ChromaAc => {
                let blk = block_index & 7;
                let height = if self.chroma_array_type == 2 { 4 } else { 2 };
                (blk & 1, blk >> 1, 2, height)
            }
            BlockType::Intra16x16Dc(_) => (0, 0, 4, 4),
            _ => {
                let (x, y) = luma_position(block_index & 15);
                (x, y, 4, 4)
            }
        }
    }

    fn count_at(&self, state: &MbState, block_type: BlockType, block_index: usize, x: usize, y: usize) -> u8 {
        match block_type {
            BlockType::ChromaAc => state.chroma[(block_index >> 3) & 1][y * 2 + x],
            BlockType::Intra16x16Dc(plane)
            | BlockType::Intra16x16Ac(plane)
            | BlockType::Luma4x4(plane)
            | BlockType::Luma8x8(plane) => state.luma[plane as usize][y * 4 + x],
            BlockType::ChromaDc => 0,
        }
    }

    /// nN of one neighbour, or None when the neighbour is not available.
    fn neighbour_count(
        &self,
        neighbour: &MbState,
        block_type: BlockType,
        block_index: usize,
        x: usize,
        y: usize,
    ) -> Option<u8> {
        let current = self.current_state();
        if !neighbour.decoded || neighbour.slice_num != current.slice_num {
            return None;
        }
        if current.kind.is_intra()
            && self.constrained_intra_pred
            && self.data_partitioned
            && !neighbour.kind.is_intra()
        {
            return None;
        }

        Some(match neighbour.kind {
            MbKind::Skip => 0,
            MbKind::IPcm => 16,
            _ => self.count_at(neighbour, block_type, block_index, x, y),
        })
    }

    /// nC for the next coeff_token of the current macroblock.
    pub fn predict_nc(&self, block_type: BlockType, block_index: usize) -> i32 {
        if block_type == BlockType::ChromaDc {
            return if self.chroma_array_type == 2 { -2 } else { -1 };
        }

        let (mb_x, mb_y) = self.current;
        let current = self.current_state();
        let (x, y, width, height) = self.geometry(block_type, block_index);

        let left = if x > 0 {
            self.neighbour_count(current, block_type, block_index, x - 1, y)
        } else if mb_x > 0 {
            self.neighbour_count(&self.mbs[(mb_y, mb_x - 1)], block_type, block_index, width - 1, y)
        } else {
            None
        };

        let above = if y > 0 {
            self.neighbour_count(current, block_type, block_index, x, y - 1)
        } else if mb_y > 0 {
            self.neighbour_count(&self.mbs[(mb_y - 1, mb_x)], block_type, block_index, x, height - 1)
        } else {
            None
        };

        match (left, above) {
            (Some(a), Some(b)) => (a as i32 + b as i32 + 1) >> 1,
            (Some(a), None) => a as i32,
            (None, Some(b)) => b as i32,
            (None, None) => 0,
        }
    }

    /// Stores TotalCoeff of a decoded block. DC blocks are not neighbours of
    /// anything and are ignored.
    pub fn record(&mut self, block_type: BlockType, block_index: usize, total_coeff: u8) {
        let (x, y, _, _) = self.geometry(block_type, block_index);
        let (mb_x, mb_y) = self.current;
        let state = &mut self.mbs[(mb_y, mb_x)];

        match block_type {
            BlockType::ChromaAc => state.chroma[(block_index >> 3) & 1][y * 2 + x] = total_coeff,
            BlockType::Intra16x16Ac(plane) | BlockType::Luma4x4(plane) | BlockType::Luma8x8(plane) => {
                state.luma[plane as usize][y * 4 + x] = total_coeff
            }
            BlockType::Intra16x16Dc(_) | BlockType::ChromaDc => {}
        }
    }

    pub fn total_coeff(&self, block_type: BlockType, block_index: usize) -> u8 {
        let (x, y, _, _) = self.geometry(block_type, block_index);
        self.count_at(self.current_state(), block_type, block_index, x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Y4X4: BlockType = BlockType::Luma4x4(Plane::Y);

    #[test]
    fn block_positions() {
        assert_eq!(luma_position(0), (0, 0));
        assert_eq!(luma_position(5), (3, 0));
        assert_eq!(luma_position(7), (3, 1));
        assert_eq!(luma_position(10), (0, 3));
        assert_eq!(luma_position(15), (3, 3));
    }

    #[test]
    fn neighbours_inside_and_across_macroblocks() {
        let mut ctx = MacroblockContext::new(2, 2, 1);

        ctx.start_macroblock(0, 0, MbKind::Intra).unwrap();
        assert_eq!(ctx.predict_nc(Y4X4, 0), 0);
        ctx.record(Y4X4, 5, 6);
        ctx.record(Y4X4, 7, 4);

        ctx.start_macroblock(1, 0, MbKind::Inter).unwrap();
        assert_eq!(ctx.predict_nc(Y4X4, 0), 6);
        ctx.record(Y4X4, 0, 2);
        assert_eq!(ctx.predict_nc(Y4X4, 1), 2);
        assert_eq!(ctx.predict_nc(Y4X4, 2), 3);
        assert_eq!(ctx.total_coeff(Y4X4, 0), 2);
    }

    #[test]
    fn skip_pcm_and_slice_boundaries() {
        let mut ctx = MacroblockContext::new(3, 1, 1);

        ctx.start_macroblock(0, 0, MbKind::IPcm).unwrap();
        ctx.start_macroblock(1, 0, MbKind::Intra).unwrap();
        assert_eq!(ctx.predict_nc(Y4X4, 0), 16);

        ctx.start_macroblock(0, 0, MbKind::Skip).unwrap();
        ctx.start_macroblock(1, 0, MbKind::Intra).unwrap();
        assert_eq!(ctx.predict_nc(Y4X4, 0), 0);
        ctx.record(Y4X4, 5, 9);

        ctx.start_macroblock(2, 1, MbKind::Intra).unwrap();
        assert_eq!(ctx.predict_nc(Y4X4, 0), 0);
    }

    #[test]
    fn constrained_intra_with_partitioning() {
        let mut ctx = MacroblockContext::new(2, 1, 1);
        ctx.set_constrained_intra_pred(true, true);

        ctx.start_macroblock(0, 0, MbKind::Inter).unwrap();
        ctx.record(Y4X4, 5, 8);
        ctx.start_macroblock(1, 0, MbKind::Intra).unwrap();
        assert_eq!(ctx.predict_nc(Y4X4, 0), 0);

        ctx.set_constrained_intra_pred(true, false);
        assert_eq!(ctx.predict_nc(Y4X4, 0), 8);
    }

    #[test]
    fn chroma_blocks() {
        let mut ctx = MacroblockContext::new(1, 2, 2);
        assert_eq!(ctx.predict_nc(BlockType::ChromaDc, 0), -2);

        ctx.start_macroblock(0, 0, MbKind::Intra).unwrap();
        // Cr block 6 is the bottom-left of a 2x4 grid
        ctx.record(BlockType::ChromaAc, 8 + 6, 5);
        ctx.start_macroblock(1, 0, MbKind::Intra).unwrap();
        assert_eq!(ctx.predict_nc(BlockType::ChromaAc, 8), 5);
        assert_eq!(ctx.predict_nc(BlockType::ChromaAc, 0), 0);

        assert_eq!(MacroblockContext::new(1, 1, 1).predict_nc(BlockType::ChromaDc, 1), -1);
        assert!(ctx.start_macroblock(2, 0, MbKind::Intra).is_err());
    }
}
