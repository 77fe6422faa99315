//! pic_parameter_set_rbsp(), clause 7.3.2.3.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::debug;

use super::scaling::ScalingListData;
use super::sps::{H265Sps, MAX_SPS};
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::{read_se, read_ue};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::errors::ParameterSetError;

pub const MAX_PPS: usize = 64;

/// Tile grid bounds of the highest level, 20 columns by 22 rows.
const MAX_TILE_COLUMNS: usize = 20;
const MAX_TILE_ROWS: usize = 22;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TileSpacing {
    #[default]
    Uniform,
    Explicit {
        column_width_minus1: Vec<u32>,
        row_height_minus1: Vec<u32>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tiles {
    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub spacing: TileSpacing,
    pub loop_filter_across_tiles_enabled_flag: bool,
}

impl Tiles {
    fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        let num_tile_columns_minus1 = read_ue(bs)?;
        check_range(
            "num_tile_columns_minus1",
            num_tile_columns_minus1 as i64,
            0,
            MAX_TILE_COLUMNS as i64 - 1,
        )?;
        let num_tile_rows_minus1 = read_ue(bs)?;
        check_range(
            "num_tile_rows_minus1",
            num_tile_rows_minus1 as i64,
            0,
            MAX_TILE_ROWS as i64 - 1,
        )?;

        let spacing = if bs.read_bit()? {
            TileSpacing::Uniform
        } else {
            TileSpacing::Explicit {
                column_width_minus1: (0..num_tile_columns_minus1)
                    .map(|_| read_ue(bs))
                    .collect::<Result<_>>()?,
                row_height_minus1: (0..num_tile_rows_minus1)
                    .map(|_| read_ue(bs))
                    .collect::<Result<_>>()?,
            }
        };

        Ok(Self {
            num_tile_columns_minus1,
            num_tile_rows_minus1,
            spacing,
            loop_filter_across_tiles_enabled_flag: bs.read_bit()?,
        })
    }

    pub fn count(&self) -> u32 {
        (self.num_tile_columns_minus1 + 1) * (self.num_tile_rows_minus1 + 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deblocking {
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_beta_offset_div2: i32,
    pub pps_tc_offset_div2: i32,
}

/// pps_range_extension(), 7.3.2.3.2
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpsRangeExtension {
    pub log2_max_transform_skip_block_size_minus2: u32,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list_enabled_flag: bool,
    pub diff_cu_chroma_qp_offset_depth: u32,
    pub cb_qp_offset_list: Vec<i32>,
    pub cr_qp_offset_list: Vec<i32>,
    pub log2_sao_offset_scale_luma: u32,
    pub log2_sao_offset_scale_chroma: u32,
}

impl PpsRangeExtension {
    fn read<S: ByteSource>(bs: &mut Bitstream<S>, transform_skip_enabled_flag: bool) -> Result<Self> {
        let mut ext = Self::default();

        if transform_skip_enabled_flag {
            ext.log2_max_transform_skip_block_size_minus2 = read_ue(bs)?;
        }
        ext.cross_component_prediction_enabled_flag = bs.read_bit()?;
        ext.chroma_qp_offset_list_enabled_flag = bs.read_bit()?;

        if ext.chroma_qp_offset_list_enabled_flag {
            ext.diff_cu_chroma_qp_offset_depth = read_ue(bs)?;
            let chroma_qp_offset_list_len_minus1 = read_ue(bs)?;
            check_range(
                "chroma_qp_offset_list_len_minus1",
                chroma_qp_offset_list_len_minus1 as i64,
                0,
                5,
            )?;
            for _ in 0..=chroma_qp_offset_list_len_minus1 {
                let cb = read_se(bs)?;
                check_range("cb_qp_offset_list", cb as i64, -12, 12)?;
                let cr = read_se(bs)?;
                check_range("cr_qp_offset_list", cr as i64, -12, 12)?;
                ext.cb_qp_offset_list.push(cb);
                ext.cr_qp_offset_list.push(cr);
            }
        }

        ext.log2_sao_offset_scale_luma = read_ue(bs)?;
        ext.log2_sao_offset_scale_chroma = read_ue(bs)?;

        Ok(ext)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H265Pps {
    pub pps_pic_parameter_set_id: u32,
    pub pps_seq_parameter_set_id: u32,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub diff_cu_qp_delta_depth: u32,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,
    pub tiles: Option<Tiles>,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
    pub deblocking: Option<Deblocking>,
    pub scaling_list_data: Option<ScalingListData>,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,

    pub pps_extension_present_flag: bool,
    pub range_extension: Option<PpsRangeExtension>,
    pub pps_multilayer_extension_flag: bool,
    pub pps_3d_extension_flag: bool,
    pub pps_scc_extension_flag: bool,
    pub pps_extension_4bits: u8,
}

impl H265Pps {
    /// pic_parameter_set_rbsp(), starting after the NAL unit header.
    ///
    /// The referenced SPS is only needed for explicit scaling lists; when it
    /// has not been received 4:2:0 is assumed.
    pub fn read<S: ByteSource>(
        options: &ParseOptions,
        bs: &mut Bitstream<S>,
        sps_list: &[Option<H265Sps>],
    ) -> Result<Self> {
        let mut pps = Self {
            pps_pic_parameter_set_id: read_ue(bs)?,
            pps_seq_parameter_set_id: read_ue(bs)?,
            ..Default::default()
        };

        if pps.pps_pic_parameter_set_id as usize >= MAX_PPS {
            bail!(ParameterSetError::IdOutOfRange {
                kind: "pic_parameter_set",
                id: pps.pps_pic_parameter_set_id,
                max: MAX_PPS - 1,
            });
        }
        if pps.pps_seq_parameter_set_id as usize >= MAX_SPS {
            bail!(ParameterSetError::IdOutOfRange {
                kind: "seq_parameter_set",
                id: pps.pps_seq_parameter_set_id,
                max: MAX_SPS - 1,
            });
        }

        pps.dependent_slice_segments_enabled_flag = bs.read_bit()?;
        pps.output_flag_present_flag = bs.read_bit()?;
        pps.num_extra_slice_header_bits = bs.read_bits(3)? as u8;
        pps.sign_data_hiding_enabled_flag = bs.read_bit()?;
        pps.cabac_init_present_flag = bs.read_bit()?;

        pps.num_ref_idx_l0_default_active_minus1 = read_ue(bs)?;
        check_range(
            "num_ref_idx_l0_default_active_minus1",
            pps.num_ref_idx_l0_default_active_minus1 as i64,
            0,
            14,
        )?;
        pps.num_ref_idx_l1_default_active_minus1 = read_ue(bs)?;
        check_range(
            "num_ref_idx_l1_default_active_minus1",
            pps.num_ref_idx_l1_default_active_minus1 as i64,
            0,
            14,
        )?;

        pps.init_qp_minus26 = read_se(bs)?;
        // the lower bound depends on the luma bit depth
        check_range("init_qp_minus26", pps.init_qp_minus26 as i64, -(26 + 48), 25)?;
        pps.constrained_intra_pred_flag = bs.read_bit()?;
        pps.transform_skip_enabled_flag = bs.read_bit()?;

        pps.cu_qp_delta_enabled_flag = bs.read_bit()?;
        if pps.cu_qp_delta_enabled_flag {
            pps.diff_cu_qp_delta_depth = read_ue(bs)?;
        }

        pps.pps_cb_qp_offset = read_se(bs)?;
        check_range("pps_cb_qp_offset", pps.pps_cb_qp_offset as i64, -12, 12)?;
        pps.pps_cr_qp_offset = read_se(bs)?;
        check_range("pps_cr_qp_offset", pps.pps_cr_qp_offset as i64, -12, 12)?;

        pps.pps_slice_chroma_qp_offsets_present_flag = bs.read_bit()?;
        pps.weighted_pred_flag = bs.read_bit()?;
        pps.weighted_bipred_flag = bs.read_bit()?;
        pps.transquant_bypass_enabled_flag = bs.read_bit()?;

        let tiles_enabled_flag = bs.read_bit()?;
        pps.entropy_coding_sync_enabled_flag = bs.read_bit()?;
        if tiles_enabled_flag {
            pps.tiles = Some(Tiles::read(bs)?);
        }

        pps.pps_loop_filter_across_slices_enabled_flag = bs.read_bit()?;

        if bs.read_bit()? {
            let mut deblocking = Deblocking {
                deblocking_filter_override_enabled_flag: bs.read_bit()?,
                pps_deblocking_filter_disabled_flag: bs.read_bit()?,
                ..Default::default()
            };
            if !deblocking.pps_deblocking_filter_disabled_flag {
                deblocking.pps_beta_offset_div2 = read_se(bs)?;
                check_range("pps_beta_offset_div2", deblocking.pps_beta_offset_div2 as i64, -6, 6)?;
                deblocking.pps_tc_offset_div2 = read_se(bs)?;
                check_range("pps_tc_offset_div2", deblocking.pps_tc_offset_div2 as i64, -6, 6)?;
            }
            pps.deblocking = Some(deblocking);
        }

        if bs.read_bit()? {
            let chroma_format_idc = match sps_list
                .get(pps.pps_seq_parameter_set_id as usize)
                .and_then(Option::as_ref)
            {
                Some(sps) => sps.chroma_format_idc,
                None => {
                    log_or_err!(
                        options,
                        Warn,
                        anyhow!(ParameterSetError::MissingReference {
                            kind: "seq_parameter_set",
                            id: pps.pps_seq_parameter_set_id,
                        })
                    );
                    1
                }
            };
            pps.scaling_list_data = Some(ScalingListData::read(bs, chroma_format_idc)?);
        }

        pps.lists_modification_present_flag = bs.read_bit()?;
        pps.log2_parallel_merge_level_minus2 = read_ue(bs)?;
        check_range(
            "log2_parallel_merge_level_minus2",
            pps.log2_parallel_merge_level_minus2 as i64,
            0,
            4,
        )?;
        pps.slice_segment_header_extension_present_flag = bs.read_bit()?;

        pps.pps_extension_present_flag = bs.read_bit()?;
        if pps.pps_extension_present_flag {
            let pps_range_extension_flag = bs.read_bit()?;
            pps.pps_multilayer_extension_flag = bs.read_bit()?;
            pps.pps_3d_extension_flag = bs.read_bit()?;
            pps.pps_scc_extension_flag = bs.read_bit()?;
            pps.pps_extension_4bits = bs.read_bits(4)? as u8;

            if pps_range_extension_flag {
                pps.range_extension = Some(PpsRangeExtension::read(bs, pps.transform_skip_enabled_flag)?);
            }
        }

        debug!(
            "PPS {} -> SPS {}: {} tile(s), wpp {}",
            pps.pps_pic_parameter_set_id,
            pps.pps_seq_parameter_set_id,
            pps.tiles.as_ref().map_or(1, Tiles::count),
            pps.entropy_coding_sync_enabled_flag
        );

        Ok(pps)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    fn head(id: u32, sps_id: u32) -> BitBuilder {
        BitBuilder::new()
            .ue(id)
            .ue(sps_id)
            .flag(false)
            .flag(false)
            .bits(3, 0)
            .flag(true) // sign_data_hiding_enabled_flag
            .flag(false)
            .ue(2)
            .ue(0)
            .se(-4) // init_qp_minus26
            .flag(false)
            .flag(true) // transform_skip_enabled_flag
            .flag(true)
            .ue(1) // diff_cu_qp_delta_depth
            .se(1)
            .se(-1)
            .flag(false)
            .flag(false)
            .flag(false)
            .flag(false)
    }

    #[test]
    fn plain_pps() {
        let data = head(0, 0)
            .flag(false) // tiles_enabled_flag
            .flag(true) // entropy_coding_sync_enabled_flag
            .flag(true)
            .flag(true) // deblocking_filter_control_present_flag
            .flag(false)
            .flag(false)
            .se(2)
            .se(-2)
            .flag(false) // pps_scaling_list_data_present_flag
            .flag(false)
            .ue(0)
            .flag(false)
            .flag(false)
            .trailing()
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let pps = H265Pps::read(&ParseOptions::default(), &mut bs, &[]).unwrap();

        assert!(pps.sign_data_hiding_enabled_flag);
        assert_eq!(pps.num_ref_idx_l0_default_active_minus1, 2);
        assert_eq!(pps.init_qp_minus26, -4);
        assert_eq!(pps.diff_cu_qp_delta_depth, 1);
        assert_eq!((pps.pps_cb_qp_offset, pps.pps_cr_qp_offset), (1, -1));
        assert!(pps.entropy_coding_sync_enabled_flag);
        assert!(pps.tiles.is_none());
        let deblocking = pps.deblocking.unwrap();
        assert_eq!((deblocking.pps_beta_offset_div2, deblocking.pps_tc_offset_div2), (2, -2));
    }

    #[test]
    fn explicit_tiles_and_range_extension() {
        let data = head(5, 1)
            .flag(true) // tiles_enabled_flag
            .flag(false)
            .ue(2) // three columns
            .ue(1) // two rows
            .flag(false)
            .ue(3)
            .ue(4)
            .ue(7)
            .flag(true)
            .flag(true)
            .flag(false) // deblocking_filter_control_present_flag
            .flag(false)
            .flag(true)
            .ue(2)
            .flag(false)
            .flag(true) // pps_extension_present_flag
            .flag(true) // pps_range_extension_flag
            .pattern("000 0000")
            .ue(1) // log2_max_transform_skip_block_size_minus2
            .flag(false)
            .flag(true) // chroma_qp_offset_list_enabled_flag
            .ue(0)
            .ue(1)
            .se(2)
            .se(-2)
            .se(3)
            .se(-3)
            .ue(0)
            .ue(1)
            .trailing()
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let pps = H265Pps::read(&ParseOptions::default(), &mut bs, &[]).unwrap();

        let tiles = pps.tiles.as_ref().unwrap();
        assert_eq!(tiles.count(), 6);
        assert_eq!(
            tiles.spacing,
            TileSpacing::Explicit {
                column_width_minus1: vec![3, 4],
                row_height_minus1: vec![7],
            }
        );
        assert!(pps.lists_modification_present_flag);
        assert_eq!(pps.log2_parallel_merge_level_minus2, 2);

        let ext = pps.range_extension.unwrap();
        assert_eq!(ext.log2_max_transform_skip_block_size_minus2, 1);
        assert_eq!(ext.cb_qp_offset_list, vec![2, 3]);
        assert_eq!(ext.cr_qp_offset_list, vec![-2, -3]);
        assert_eq!(ext.log2_sao_offset_scale_chroma, 1);
    }

    #[test]
    fn rejects_pps_id_out_of_range() {
        let data = head(64, 0).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = H265Pps::read(&ParseOptions::default(), &mut bs, &[]).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParameterSetError>(),
            Some(ParameterSetError::IdOutOfRange { id: 64, .. })
        ));
    }

    #[test]
    fn missing_sps_for_scaling_lists() {
        let mut builder = head(0, 3)
            .flag(false)
            .flag(false)
            .flag(true)
            .flag(false)
            .flag(true); // pps_scaling_list_data_present_flag
        for size_id in 0..4 {
            let count = if size_id == 3 { 2 } else { 6 };
            for _ in 0..count {
                builder = builder.flag(false).ue(0);
            }
        }
        let data = builder.flag(false).ue(0).flag(false).flag(false).trailing().finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let pps = H265Pps::read(&ParseOptions::default(), &mut bs, &[]).unwrap();
        assert_eq!(pps.scaling_list_data, Some(ScalingListData::default()));

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        assert!(H265Pps::read(&ParseOptions::strict(), &mut bs, &[]).is_err());
    }
}
