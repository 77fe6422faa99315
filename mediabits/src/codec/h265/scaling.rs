//! scaling_list_data(), clause 7.3.4, with the default lists of Table 7-6.
//!
//! Lists are kept in coded (up-right diagonal) order.

use anyhow::{Result, bail};

use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::{read_se, read_ue};
use crate::utils::array2d::Array2D;
use crate::utils::errors::ParameterSetError;

#[rustfmt::skip]
pub const DEFAULT_8X8_INTRA: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 16, 17, 16, 17, 18,
    17, 18, 18, 17, 18, 21, 19, 20, 21, 20, 19, 21, 24, 22, 22, 24,
    24, 22, 22, 24, 25, 25, 27, 30, 27, 25, 25, 29, 31, 35, 35, 31,
    29, 36, 41, 44, 41, 36, 47, 54, 54, 47, 65, 70, 65, 88, 88, 115,
];

#[rustfmt::skip]
pub const DEFAULT_8X8_INTER: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 17, 17, 17, 17, 18,
    18, 18, 18, 18, 18, 20, 20, 20, 20, 20, 20, 20, 24, 24, 24, 24,
    24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 28, 28, 28, 28, 28,
    28, 33, 33, 33, 33, 33, 41, 41, 41, 41, 54, 54, 54, 71, 71, 91,
];

/// Number of sizeId values: 4x4, 8x8, 16x16 and 32x32.
pub const SIZE_COUNT: usize = 4;
const MATRIX_COUNT: usize = 6;

fn coef_num(size_id: usize) -> usize {
    64.min(1 << (4 + (size_id << 1)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingListData {
    /// One 64 wide row per matrixId, for each sizeId.
    lists: [Array2D<u8>; SIZE_COUNT],
    /// scaling_list_dc_coef_minus8 + 8 for sizeId 2 and 3.
    dc_coef: Array2D<u8>,
}

impl Default for ScalingListData {
    fn default() -> Self {
        let mut lists: [Array2D<u8>; SIZE_COUNT] =
            std::array::from_fn(|_| Array2D::filled(64, MATRIX_COUNT, 16));

        for size_lists in lists.iter_mut().skip(1) {
            for matrix_id in 0..MATRIX_COUNT {
                let default = if matrix_id < 3 {
                    &DEFAULT_8X8_INTRA
                } else {
                    &DEFAULT_8X8_INTER
                };
                size_lists.row_mut(matrix_id).copy_from_slice(default);
            }
        }

        Self {
            lists,
            dc_coef: Array2D::filled(MATRIX_COUNT, 2, 16),
        }
    }
}

impl ScalingListData {
    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>, chroma_format_idc: u32) -> Result<Self> {
        let mut data = Self::default();

        for size_id in 0..SIZE_COUNT {
            let step = if size_id == 3 { 3 } else { 1 };

            for matrix_id in (0..MATRIX_COUNT).step_by(step) {
                let scaling_list_pred_mode_flag = bs.read_bit()?;

                if !scaling_list_pred_mode_flag {
                    let delta = read_ue(bs)? as usize;
                    let max_delta = matrix_id / step;
                    if delta > max_delta {
                        bail!(ParameterSetError::ValueOutOfRange {
                            field: "scaling_list_pred_matrix_id_delta",
                            value: delta as i64,
                            min: 0,
                            max: max_delta as i64,
                        });
                    }

                    // delta 0 keeps the default list
                    if delta > 0 {
                        data.copy_list(size_id, matrix_id, matrix_id - delta * step);
                    }
                    continue;
                }

                let mut next_coef: i32 = 8;
                if size_id > 1 {
                    let dc = read_se(bs)?;
                    check_range("scaling_list_dc_coef_minus8", dc as i64, -7, 247)?;
                    next_coef = dc + 8;
                    data.dc_coef[(size_id - 2, matrix_id)] = next_coef as u8;
                }

                for i in 0..coef_num(size_id) {
                    let delta = read_se(bs)?;
                    check_range("scaling_list_delta_coef", delta as i64, -128, 127)?;
                    next_coef = (next_coef + delta + 256) % 256;
                    data.lists[size_id][(matrix_id, i)] = next_coef as u8;
                }
            }
        }

        // 32x32 chroma lists are only used for 4:4:4 and follow the 16x16 ones
        if chroma_format_idc == 3 {
            for matrix_id in [1, 2, 4, 5] {
                let row = data.lists[2].row(matrix_id).to_vec();
                data.lists[3].row_mut(matrix_id).copy_from_slice(&row);
                data.dc_coef[(1, matrix_id)] = data.dc_coef[(0, matrix_id)];
            }
        }

        Ok(data)
    }

    fn copy_list(&mut self, size_id: usize, matrix_id: usize, ref_matrix_id: usize) {
        let row = self.lists[size_id].row(ref_matrix_id).to_vec();
        self.lists[size_id].row_mut(matrix_id).copy_from_slice(&row);
        if size_id > 1 {
            self.dc_coef[(size_id - 2, matrix_id)] = self.dc_coef[(size_id - 2, ref_matrix_id)];
        }
    }

    pub fn list(&self, size_id: usize, matrix_id: usize) -> &[u8] {
        &self.lists[size_id].row(matrix_id)[..coef_num(size_id)]
    }

    pub fn dc_coef(&self, size_id: usize, matrix_id: usize) -> Option<u8> {
        (size_id > 1).then(|| self.dc_coef[(size_id - 2, matrix_id)])
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    /// Every list predicted from its default.
    fn all_default(mut builder: BitBuilder) -> BitBuilder {
        for size_id in 0..SIZE_COUNT {
            let count = if size_id == 3 { 2 } else { 6 };
            for _ in 0..count {
                builder = builder.flag(false).ue(0);
            }
        }
        builder
    }

    #[test]
    fn defaults() {
        let data = all_default(BitBuilder::new()).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let lists = ScalingListData::read(&mut bs, 1).unwrap();

        assert_eq!(lists, ScalingListData::default());
        assert_eq!(lists.list(0, 0), &[16; 16]);
        assert_eq!(lists.list(1, 4), &DEFAULT_8X8_INTER);
        assert_eq!(lists.dc_coef(3, 0), Some(16));
        assert_eq!(lists.dc_coef(1, 0), None);
    }

    #[test]
    fn explicit_and_copied_lists() {
        let mut builder = BitBuilder::new().flag(true);
        // 4x4 intra Y: flat 8 then 9..
        builder = builder.se(0);
        for _ in 1..16 {
            builder = builder.se(1);
        }
        // Cb copies Y
        builder = builder.flag(false).ue(1);
        for _ in 2..6 {
            builder = builder.flag(false).ue(0);
        }
        // 8x8 lists default
        for _ in 0..6 {
            builder = builder.flag(false).ue(0);
        }
        // 16x16 Y with dc 20 and flat 30
        builder = builder.flag(true).se(12).se(10);
        for _ in 1..64 {
            builder = builder.se(0);
        }
        for _ in 1..6 {
            builder = builder.flag(false).ue(0);
        }
        // 32x32: Y default, inter Y copies intra Y (delta 1 with step 3)
        builder = builder.flag(false).ue(0).flag(false).ue(1);

        let data = builder.finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let lists = ScalingListData::read(&mut bs, 1).unwrap();

        let expected: Vec<u8> = (8..24).collect();
        assert_eq!(lists.list(0, 0), expected.as_slice());
        assert_eq!(lists.list(0, 1), expected.as_slice());
        assert_eq!(lists.list(2, 0), &[30; 64]);
        assert_eq!(lists.dc_coef(2, 0), Some(20));
        assert_eq!(lists.list(3, 3), &DEFAULT_8X8_INTRA);
    }

    #[test]
    fn rejects_bad_prediction_delta() {
        let data = BitBuilder::new().flag(false).ue(1).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        assert!(ScalingListData::read(&mut bs, 1).is_err());
    }
}
