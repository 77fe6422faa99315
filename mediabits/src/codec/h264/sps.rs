//! Sequence parameter set, clause 7.3.2.1.1.

use anyhow::{Result, bail};
use log::debug;

use super::vui::VuiParameters;
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::{read_se, read_ue};
use crate::utils::array2d::Array2D;
use crate::utils::errors::ParameterSetError;

pub const MAX_SPS: usize = 32;

/// Default_4x4_Intra, Table 7-3, zig-zag order.
pub const DEFAULT_4X4_INTRA: [u8; 16] = [6, 13, 13, 20, 20, 20, 28, 28, 28, 28, 32, 32, 32, 37, 37, 42];

/// Default_4x4_Inter, Table 7-3.
pub const DEFAULT_4X4_INTER: [u8; 16] =
    [10, 14, 14, 20, 20, 20, 24, 24, 24, 24, 27, 27, 27, 30, 30, 34];

/// Default_8x8_Intra, Table 7-4.
pub const DEFAULT_8X8_INTRA: [u8; 64] = [
    6, 10, 10, 13, 11, 13, 16, 16, 16, 16, 18, 18, 18, 18, 18, 23, 23, 23, 23, 23, 23, 25, 25, 25,
    25, 25, 25, 25, 27, 27, 27, 27, 27, 27, 27, 27, 29, 29, 29, 29, 29, 29, 29, 31, 31, 31, 31, 31,
    31, 33, 33, 33, 33, 33, 36, 36, 36, 36, 38, 38, 38, 40, 40, 42,
];

/// Default_8x8_Inter, Table 7-4.
pub const DEFAULT_8X8_INTER: [u8; 64] = [
    9, 13, 13, 15, 13, 15, 17, 17, 17, 17, 19, 19, 19, 19, 19, 21, 21, 21, 21, 21, 21, 22, 22, 22,
    22, 22, 22, 22, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 27, 27, 27, 27, 27,
    27, 28, 28, 28, 28, 28, 30, 30, 30, 30, 32, 32, 32, 33, 33, 35,
];

const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

/// Scaling matrices carried by an SPS or a PPS. Rows are list indices,
/// columns coefficients in scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingMatrices {
    pub list_present_flag: [bool; 12],
    pub scaling_list_4x4: Array2D<u8>,
    pub scaling_list_8x8: Array2D<u8>,
    pub use_default_scaling_matrix_4x4_flag: [bool; 6],
    pub use_default_scaling_matrix_8x8_flag: [bool; 6],
}

impl Default for ScalingMatrices {
    fn default() -> Self {
        Self {
            list_present_flag: [false; 12],
            scaling_list_4x4: Array2D::filled(16, 6, 16),
            scaling_list_8x8: Array2D::filled(64, 6, 16),
            use_default_scaling_matrix_4x4_flag: [false; 6],
            use_default_scaling_matrix_8x8_flag: [false; 6],
        }
    }
}

impl ScalingMatrices {
    /// Reads `count` scaling_list() entries, as in the SPS and PPS loops.
    pub(crate) fn read<S: ByteSource>(bs: &mut Bitstream<S>, count: usize) -> Result<Self> {
        let mut matrices = Self::default();

        for i in 0..count {
            matrices.list_present_flag[i] = bs.read_bit()?;
            if !matrices.list_present_flag[i] {
                matrices.apply_fallback(i);
                continue;
            }

            if i < 6 {
                matrices.use_default_scaling_matrix_4x4_flag[i] =
                    read_scaling_list(bs, matrices.scaling_list_4x4.row_mut(i))?;
                if matrices.use_default_scaling_matrix_4x4_flag[i] {
                    let default = if i < 3 { &DEFAULT_4X4_INTRA } else { &DEFAULT_4X4_INTER };
                    matrices.scaling_list_4x4.row_mut(i).copy_from_slice(default);
                }
            } else {
                let j = i - 6;
                matrices.use_default_scaling_matrix_8x8_flag[j] =
                    read_scaling_list(bs, matrices.scaling_list_8x8.row_mut(j))?;
                if matrices.use_default_scaling_matrix_8x8_flag[j] {
                    let default = if j % 2 == 0 { &DEFAULT_8X8_INTRA } else { &DEFAULT_8X8_INTER };
                    matrices.scaling_list_8x8.row_mut(j).copy_from_slice(default);
                }
            }
        }

        Ok(matrices)
    }

    /// Fall-back rule A of Table 7-2 for a list that is not present.
    fn apply_fallback(&mut self, i: usize) {
        match i {
            0 => self.scaling_list_4x4.row_mut(0).copy_from_slice(&DEFAULT_4X4_INTRA),
            3 => self.scaling_list_4x4.row_mut(3).copy_from_slice(&DEFAULT_4X4_INTER),
            1 | 2 | 4 | 5 => {
                let previous = self.scaling_list_4x4.row(i - 1).to_vec();
                self.scaling_list_4x4.row_mut(i).copy_from_slice(&previous);
            }
            6 => self.scaling_list_8x8.row_mut(0).copy_from_slice(&DEFAULT_8X8_INTRA),
            7 => self.scaling_list_8x8.row_mut(1).copy_from_slice(&DEFAULT_8X8_INTER),
            _ => {
                let j = i - 6;
                let previous = self.scaling_list_8x8.row(j - 2).to_vec();
                self.scaling_list_8x8.row_mut(j).copy_from_slice(&previous);
            }
        }
    }
}

/// scaling_list(), clause 7.3.2.1.1.1. Returns useDefaultScalingMatrixFlag.
fn read_scaling_list<S: ByteSource>(bs: &mut Bitstream<S>, list: &mut [u8]) -> Result<bool> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    let mut use_default = false;

    for j in 0..list.len() {
        if next_scale != 0 {
            let delta_scale = read_se(bs)?;
            check_range("delta_scale", delta_scale as i64, -128, 127)?;

            next_scale = (last_scale + delta_scale + 256) % 256;
            use_default = j == 0 && next_scale == 0;
        }

        last_scale = if next_scale == 0 { last_scale } else { next_scale };
        list[j] = last_scale as u8;
    }

    Ok(use_default)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H264Sps {
    pub profile_idc: u8,
    pub constraint_set_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,

    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub seq_scaling_matrix_present_flag: bool,
    pub scaling_matrices: Option<ScalingMatrices>,

    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub delta_pic_order_always_zero_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub num_ref_frames_in_pic_order_cnt_cycle: u32,
    pub offset_for_ref_frame: Vec<i32>,

    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,

    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,

    pub vui_parameters_present_flag: bool,
    pub vui: Option<VuiParameters>,
}

impl H264Sps {
    /// seq_parameter_set_data(), starting after the NAL unit header.
    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        let mut sps = Self {
            profile_idc: bs.read_bits(8)? as u8,
            constraint_set_flags: bs.read_bits(8)? as u8,
            level_idc: bs.read_bits(8)? as u8,
            chroma_format_idc: 1,
            ..Default::default()
        };

        sps.seq_parameter_set_id = read_ue(bs)?;
        if sps.seq_parameter_set_id as usize >= MAX_SPS {
            bail!(ParameterSetError::IdOutOfRange {
                kind: "seq_parameter_set",
                id: sps.seq_parameter_set_id,
                max: MAX_SPS - 1,
            });
        }

        if HIGH_PROFILES.contains(&sps.profile_idc) {
            sps.chroma_format_idc = read_ue(bs)?;
            check_range("chroma_format_idc", sps.chroma_format_idc as i64, 0, 3)?;
            if sps.chroma_format_idc == 3 {
                sps.separate_colour_plane_flag = bs.read_bit()?;
            }

            sps.bit_depth_luma_minus8 = read_ue(bs)?;
            check_range("bit_depth_luma_minus8", sps.bit_depth_luma_minus8 as i64, 0, 6)?;
            sps.bit_depth_chroma_minus8 = read_ue(bs)?;
            check_range("bit_depth_chroma_minus8", sps.bit_depth_chroma_minus8 as i64, 0, 6)?;

            sps.qpprime_y_zero_transform_bypass_flag = bs.read_bit()?;
            sps.seq_scaling_matrix_present_flag = bs.read_bit()?;
            if sps.seq_scaling_matrix_present_flag {
                let count = if sps.chroma_format_idc != 3 { 8 } else { 12 };
                sps.scaling_matrices = Some(ScalingMatrices::read(bs, count)?);
            }
        }

        sps.log2_max_frame_num_minus4 = read_ue(bs)?;
        check_range("log2_max_frame_num_minus4", sps.log2_max_frame_num_minus4 as i64, 0, 12)?;

        sps.pic_order_cnt_type = read_ue(bs)?;
        check_range("pic_order_cnt_type", sps.pic_order_cnt_type as i64, 0, 2)?;

        match sps.pic_order_cnt_type {
            0 => {
                sps.log2_max_pic_order_cnt_lsb_minus4 = read_ue(bs)?;
                check_range(
                    "log2_max_pic_order_cnt_lsb_minus4",
                    sps.log2_max_pic_order_cnt_lsb_minus4 as i64,
                    0,
                    12,
                )?;
            }
            1 => {
                sps.delta_pic_order_always_zero_flag = bs.read_bit()?;
                sps.offset_for_non_ref_pic = read_se(bs)?;
                sps.offset_for_top_to_bottom_field = read_se(bs)?;
                sps.num_ref_frames_in_pic_order_cnt_cycle = read_ue(bs)?;
                check_range(
                    "num_ref_frames_in_pic_order_cnt_cycle",
                    sps.num_ref_frames_in_pic_order_cnt_cycle as i64,
                    0,
                    255,
                )?;

                for _ in 0..sps.num_ref_frames_in_pic_order_cnt_cycle {
                    sps.offset_for_ref_frame.push(read_se(bs)?);
                }
            }
            _ => {}
        }

        sps.max_num_ref_frames = read_ue(bs)?;
        sps.gaps_in_frame_num_value_allowed_flag = bs.read_bit()?;
        sps.pic_width_in_mbs_minus1 = read_ue(bs)?;
        sps.pic_height_in_map_units_minus1 = read_ue(bs)?;

        sps.frame_mbs_only_flag = bs.read_bit()?;
        if !sps.frame_mbs_only_flag {
            sps.mb_adaptive_frame_field_flag = bs.read_bit()?;
        }
        sps.direct_8x8_inference_flag = bs.read_bit()?;

        sps.frame_cropping_flag = bs.read_bit()?;
        if sps.frame_cropping_flag {
            sps.frame_crop_left_offset = read_ue(bs)?;
            sps.frame_crop_right_offset = read_ue(bs)?;
            sps.frame_crop_top_offset = read_ue(bs)?;
            sps.frame_crop_bottom_offset = read_ue(bs)?;
        }

        sps.vui_parameters_present_flag = bs.read_bit()?;
        if sps.vui_parameters_present_flag {
            sps.vui = Some(VuiParameters::read(bs)?);
        }

        debug!(
            "SPS {}: profile {} level {} {}x{}",
            sps.seq_parameter_set_id,
            sps.profile_idc,
            sps.level_idc,
            sps.width(),
            sps.height()
        );

        Ok(sps)
    }

    /// ChromaArrayType
    pub fn chroma_array_type(&self) -> u8 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc as u8
        }
    }

    /// (SubWidthC, SubHeightC), Table 6-1.
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self.chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        }
    }

    pub fn max_frame_num(&self) -> u32 {
        1 << (self.log2_max_frame_num_minus4 + 4)
    }

    pub fn frame_height_in_mbs(&self) -> u32 {
        (2 - self.frame_mbs_only_flag as u32) * (self.pic_height_in_map_units_minus1 + 1)
    }

    pub fn pic_size_in_map_units(&self) -> u32 {
        (self.pic_width_in_mbs_minus1 + 1) * (self.pic_height_in_map_units_minus1 + 1)
    }

    fn crop_units(&self) -> (u32, u32) {
        let field_factor = 2 - self.frame_mbs_only_flag as u32;
        if self.chroma_array_type() == 0 {
            (1, field_factor)
        } else {
            let (sub_width, sub_height) = self.chroma_subsampling();
            (sub_width, sub_height * field_factor)
        }
    }

    /// Luma width after frame cropping.
    pub fn width(&self) -> u32 {
        let (crop_x, _) = self.crop_units();
        ((self.pic_width_in_mbs_minus1 + 1) * 16).saturating_sub(
            crop_x * (self.frame_crop_left_offset + self.frame_crop_right_offset),
        )
    }

    /// Luma height after frame cropping.
    pub fn height(&self) -> u32 {
        let (_, crop_y) = self.crop_units();
        (self.frame_height_in_mbs() * 16).saturating_sub(
            crop_y * (self.frame_crop_top_offset + self.frame_crop_bottom_offset),
        )
    }

    pub fn bit_depth_luma(&self) -> u32 {
        self.bit_depth_luma_minus8 + 8
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.vui.as_ref().and_then(|vui| vui.frame_rate())
    }

    pub fn profile_name(&self) -> &'static str {
        let constraint_set1 = self.constraint_set_flags & 0x40 != 0;
        let constraint_set3 = self.constraint_set_flags & 0x10 != 0;

        match self.profile_idc {
            66 if constraint_set1 => "Constrained Baseline",
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 if constraint_set3 => "High 10 Intra",
            110 => "High 10",
            122 if constraint_set3 => "High 4:2:2 Intra",
            122 => "High 4:2:2",
            244 if constraint_set3 => "High 4:4:4 Intra",
            244 => "High 4:4:4 Predictive",
            44 => "CAVLC 4:4:4 Intra",
            83 => "Scalable Baseline",
            86 => "Scalable High",
            118 => "Multiview High",
            128 => "Stereo High",
            134 => "MFC High",
            135 => "MFC Depth High",
            138 => "Multiview Depth High",
            139 => "Enhanced Multiview Depth High",
            _ => "Unknown",
        }
    }

    /// level_idc as the conventional "major.minor" string.
    pub fn level_name(&self) -> String {
        let constraint_set3 = self.constraint_set_flags & 0x10 != 0;
        match self.level_idc {
            11 if constraint_set3 && matches!(self.profile_idc, 66 | 77 | 88) => "1b".into(),
            9 => "1b".into(),
            level => format!("{}.{}", level / 10, level % 10),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    #[test]
    fn baseline_1080p() {
        // x264 style Constrained Baseline SPS payload, 1920x1080 (1088 cropped by 8)
        let data = BitBuilder::new()
            .bits(8, 66)
            .bits(8, 0xC0)
            .bits(8, 40)
            .ue(0)
            .ue(0) // log2_max_frame_num_minus4
            .ue(2) // pic_order_cnt_type
            .ue(3)
            .flag(false)
            .ue(119)
            .ue(67)
            .flag(true) // frame_mbs_only_flag
            .flag(true)
            .flag(true) // frame_cropping_flag
            .ue(0)
            .ue(0)
            .ue(0)
            .ue(4)
            .flag(true) // vui_parameters_present_flag
            .flag(true)
            .bits(8, 1)
            .flag(false)
            .flag(false)
            .flag(false)
            .flag(true) // timing_info_present_flag
            .bits(32, 1001)
            .bits(32, 60000)
            .flag(true)
            .flag(false)
            .flag(false)
            .flag(false)
            .flag(false)
            .trailing()
            .finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sps = H264Sps::read(&mut bs).unwrap();

        assert_eq!(sps.profile_name(), "Constrained Baseline");
        assert_eq!(sps.level_name(), "4.0");
        assert_eq!(sps.chroma_array_type(), 1);
        assert_eq!((sps.width(), sps.height()), (1920, 1080));
        assert_eq!(sps.max_num_ref_frames, 3);

        let vui = sps.vui.as_ref().unwrap();
        assert_eq!(vui.sample_aspect_ratio(), Some((1, 1)));
        assert!((sps.frame_rate().unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn high_profile_scaling_lists() {
        let mut builder = BitBuilder::new()
            .bits(8, 100)
            .bits(8, 0)
            .bits(8, 41)
            .ue(1)
            .ue(1) // chroma_format_idc
            .ue(0)
            .ue(0)
            .flag(false)
            .flag(true) // seq_scaling_matrix_present_flag
            .flag(true) // list 0 present, default via delta_scale = -8
            .se(-8);
        // list 1 absent (fall back to list 0), list 2 flat
        builder = builder.flag(false).flag(true).se(8);
        for _ in 1..16 {
            builder = builder.se(0);
        }
        for _ in 3..8 {
            builder = builder.flag(false);
        }
        let data = builder
            .ue(2)
            .ue(0)
            .ue(4)
            .ue(4)
            .flag(false)
            .ue(79)
            .ue(44)
            .flag(true)
            .flag(true)
            .flag(false)
            .flag(false)
            .trailing()
            .finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sps = H264Sps::read(&mut bs).unwrap();

        assert_eq!(sps.seq_parameter_set_id, 1);
        assert_eq!(sps.profile_name(), "High");
        assert_eq!((sps.width(), sps.height()), (1280, 720));
        assert_eq!(sps.pic_order_cnt_type, 0);

        let matrices = sps.scaling_matrices.as_ref().unwrap();
        assert!(matrices.use_default_scaling_matrix_4x4_flag[0]);
        assert_eq!(matrices.scaling_list_4x4.row(0), &DEFAULT_4X4_INTRA);
        assert_eq!(matrices.scaling_list_4x4.row(1), &DEFAULT_4X4_INTRA);
        assert!(matrices.scaling_list_4x4.row(2).iter().all(|&v| v == 16));
        assert_eq!(matrices.scaling_list_4x4.row(3), &DEFAULT_4X4_INTER);
        assert_eq!(matrices.scaling_list_8x8.row(1), &DEFAULT_8X8_INTER);
    }

    #[test]
    fn rejects_sps_id_out_of_range() {
        let data = BitBuilder::new().bits(24, 0x42_00_1E).ue(32).bits(16, 0xFFFF).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = H264Sps::read(&mut bs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParameterSetError>(),
            Some(ParameterSetError::IdOutOfRange { id: 32, .. })
        ));
    }
}
