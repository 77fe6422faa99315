//! Picture parameter set, clause 7.3.2.2.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::debug;

use super::sps::{H264Sps, MAX_SPS, ScalingMatrices};
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::expgolomb::{read_se, read_ue};
use crate::codec::nalu::more_rbsp_data;
use crate::codec::{ceil_log2, check_range};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::errors::ParameterSetError;

pub const MAX_PPS: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SliceGroupMap {
    #[default]
    None,
    Interleaved {
        run_length_minus1: Vec<u32>,
    },
    Dispersed,
    Foreground {
        top_left: Vec<u32>,
        bottom_right: Vec<u32>,
    },
    Changing {
        slice_group_map_type: u32,
        slice_group_change_direction_flag: bool,
        slice_group_change_rate_minus1: u32,
    },
    Explicit {
        pic_size_in_map_units_minus1: u32,
        slice_group_id: Vec<u32>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H264Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    pub slice_group_map: SliceGroupMap,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,

    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    pub scaling_matrices: Option<ScalingMatrices>,
    pub second_chroma_qp_index_offset: i32,
}

impl H264Pps {
    /// pic_parameter_set_rbsp(), starting after the NAL unit header. The
    /// whole NAL unit must be buffered for the trailing extension check.
    pub fn read<S: ByteSource>(
        options: &ParseOptions,
        bs: &mut Bitstream<S>,
        sps_list: &[Option<H264Sps>],
    ) -> Result<Self> {
        let mut pps = Self {
            pic_parameter_set_id: read_ue(bs)?,
            seq_parameter_set_id: read_ue(bs)?,
            ..Default::default()
        };

        if pps.pic_parameter_set_id as usize >= MAX_PPS {
            bail!(ParameterSetError::IdOutOfRange {
                kind: "pic_parameter_set",
                id: pps.pic_parameter_set_id,
                max: MAX_PPS - 1,
            });
        }
        if pps.seq_parameter_set_id as usize >= MAX_SPS {
            bail!(ParameterSetError::IdOutOfRange {
                kind: "seq_parameter_set",
                id: pps.seq_parameter_set_id,
                max: MAX_SPS - 1,
            });
        }

        pps.entropy_coding_mode_flag = bs.read_bit()?;
        pps.bottom_field_pic_order_in_frame_present_flag = bs.read_bit()?;

        pps.num_slice_groups_minus1 = read_ue(bs)?;
        check_range("num_slice_groups_minus1", pps.num_slice_groups_minus1 as i64, 0, 7)?;
        if pps.num_slice_groups_minus1 > 0 {
            pps.slice_group_map = Self::read_slice_group_map(bs, pps.num_slice_groups_minus1)?;
        }

        pps.num_ref_idx_l0_default_active_minus1 = read_ue(bs)?;
        check_range(
            "num_ref_idx_l0_default_active_minus1",
            pps.num_ref_idx_l0_default_active_minus1 as i64,
            0,
            31,
        )?;
        pps.num_ref_idx_l1_default_active_minus1 = read_ue(bs)?;
        check_range(
            "num_ref_idx_l1_default_active_minus1",
            pps.num_ref_idx_l1_default_active_minus1 as i64,
            0,
            31,
        )?;

        pps.weighted_pred_flag = bs.read_bit()?;
        pps.weighted_bipred_idc = bs.read_bits(2)? as u8;
        pps.pic_init_qp_minus26 = read_se(bs)?;
        pps.pic_init_qs_minus26 = read_se(bs)?;
        pps.chroma_qp_index_offset = read_se(bs)?;
        check_range("chroma_qp_index_offset", pps.chroma_qp_index_offset as i64, -12, 12)?;

        pps.deblocking_filter_control_present_flag = bs.read_bit()?;
        pps.constrained_intra_pred_flag = bs.read_bit()?;
        pps.redundant_pic_cnt_present_flag = bs.read_bit()?;

        pps.second_chroma_qp_index_offset = pps.chroma_qp_index_offset;

        if more_rbsp_data(bs) {
            pps.transform_8x8_mode_flag = bs.read_bit()?;
            pps.pic_scaling_matrix_present_flag = bs.read_bit()?;

            if pps.pic_scaling_matrix_present_flag {
                let chroma_format_idc = match sps_list
                    .get(pps.seq_parameter_set_id as usize)
                    .and_then(Option::as_ref)
                {
                    Some(sps) => sps.chroma_format_idc,
                    None => {
                        log_or_err!(
                            options,
                            Warn,
                            anyhow!(ParameterSetError::MissingReference {
                                kind: "seq_parameter_set",
                                id: pps.seq_parameter_set_id,
                            })
                        );
                        1
                    }
                };

                let extra = if chroma_format_idc != 3 { 2 } else { 6 };
                let count = 6 + extra * pps.transform_8x8_mode_flag as usize;
                pps.scaling_matrices = Some(ScalingMatrices::read(bs, count)?);
            }

            pps.second_chroma_qp_index_offset = read_se(bs)?;
        }

        debug!(
            "PPS {} -> SPS {}: {}",
            pps.pic_parameter_set_id,
            pps.seq_parameter_set_id,
            if pps.entropy_coding_mode_flag { "CABAC" } else { "CAVLC" }
        );

        Ok(pps)
    }

    fn read_slice_group_map<S: ByteSource>(
        bs: &mut Bitstream<S>,
        num_slice_groups_minus1: u32,
    ) -> Result<SliceGroupMap> {
        let slice_group_map_type = read_ue(bs)?;

        let map = match slice_group_map_type {
            0 => SliceGroupMap::Interleaved {
                run_length_minus1: (0..=num_slice_groups_minus1)
                    .map(|_| read_ue(bs))
                    .collect::<Result<_>>()?,
            },
            1 => SliceGroupMap::Dispersed,
            2 => {
                let mut top_left = Vec::new();
                let mut bottom_right = Vec::new();
                for _ in 0..num_slice_groups_minus1 {
                    top_left.push(read_ue(bs)?);
                    bottom_right.push(read_ue(bs)?);
                }
                SliceGroupMap::Foreground {
                    top_left,
                    bottom_right,
                }
            }
            3..=5 => SliceGroupMap::Changing {
                slice_group_map_type,
                slice_group_change_direction_flag: bs.read_bit()?,
                slice_group_change_rate_minus1: read_ue(bs)?,
            },
            6 => {
                let pic_size_in_map_units_minus1 = read_ue(bs)?;
                check_range(
                    "pic_size_in_map_units_minus1",
                    pic_size_in_map_units_minus1 as i64,
                    0,
                    139_264,
                )?;

                let bits = ceil_log2(num_slice_groups_minus1 + 1);
                let slice_group_id = (0..=pic_size_in_map_units_minus1)
                    .map(|_| bs.read_bits(bits).map_err(Into::into))
                    .collect::<Result<_>>()?;

                SliceGroupMap::Explicit {
                    pic_size_in_map_units_minus1,
                    slice_group_id,
                }
            }
            value => bail!(ParameterSetError::ValueOutOfRange {
                field: "slice_group_map_type",
                value: value as i64,
                min: 0,
                max: 6,
            }),
        };

        Ok(map)
    }

    pub fn slice_group_change_rate(&self) -> Option<u32> {
        match self.slice_group_map {
            SliceGroupMap::Changing {
                slice_group_change_rate_minus1,
                ..
            } => Some(slice_group_change_rate_minus1 + 1),
            _ => None,
        }
    }
}
