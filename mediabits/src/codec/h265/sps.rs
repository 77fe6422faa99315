//! seq_parameter_set_rbsp(), clause 7.3.2.2, with the range extension.

use anyhow::{Result, bail};
use log::debug;

use super::ptl::ProfileTierLevel;
use super::rps::{MAX_SHORT_TERM_RPS, ShortTermRps};
use super::scaling::ScalingListData;
use super::vps::{MAX_SUB_LAYERS, SubLayerOrdering, read_sub_layer_ordering};
use super::vui::H265Vui;
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::read_ue;
use crate::utils::errors::ParameterSetError;

pub const MAX_SPS: usize = 16;

/// Upper bound on num_long_term_ref_pics_sps.
pub const MAX_LONG_TERM_REF_PICS: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConformanceWindow {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcmParameters {
    pub pcm_sample_bit_depth_luma_minus1: u8,
    pub pcm_sample_bit_depth_chroma_minus1: u8,
    pub log2_min_pcm_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u32,
    pub pcm_loop_filter_disabled_flag: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LongTermRefPic {
    pub lt_ref_pic_poc_lsb_sps: u32,
    pub used_by_curr_pic_lt_sps_flag: bool,
}

/// sps_range_extension(), 7.3.2.2.2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled_flag: bool,
    pub transform_skip_context_enabled_flag: bool,
    pub implicit_rdpcm_enabled_flag: bool,
    pub explicit_rdpcm_enabled_flag: bool,
    pub extended_precision_processing_flag: bool,
    pub intra_smoothing_disabled_flag: bool,
    pub high_precision_offsets_enabled_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub cabac_bypass_alignment_enabled_flag: bool,
}

impl SpsRangeExtension {
    fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        Ok(Self {
            transform_skip_rotation_enabled_flag: bs.read_bit()?,
            transform_skip_context_enabled_flag: bs.read_bit()?,
            implicit_rdpcm_enabled_flag: bs.read_bit()?,
            explicit_rdpcm_enabled_flag: bs.read_bit()?,
            extended_precision_processing_flag: bs.read_bit()?,
            intra_smoothing_disabled_flag: bs.read_bit()?,
            high_precision_offsets_enabled_flag: bs.read_bit()?,
            persistent_rice_adaptation_enabled_flag: bs.read_bit()?,
            cabac_bypass_alignment_enabled_flag: bs.read_bit()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H265Sps {
    pub sps_video_parameter_set_id: u8,
    pub sps_max_sub_layers_minus1: u8,
    pub sps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub sps_seq_parameter_set_id: u32,

    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub conformance_window: Option<ConformanceWindow>,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,

    pub sps_sub_layer_ordering_info_present_flag: bool,
    pub sub_layer_ordering: Vec<SubLayerOrdering>,

    pub log2_min_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_luma_coding_block_size: u32,
    pub log2_min_luma_transform_block_size_minus2: u32,
    pub log2_diff_max_min_luma_transform_block_size: u32,
    pub max_transform_hierarchy_depth_inter: u32,
    pub max_transform_hierarchy_depth_intra: u32,

    pub scaling_list_enabled_flag: bool,
    pub scaling_list_data: Option<ScalingListData>,
    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm: Option<PcmParameters>,

    pub short_term_ref_pic_sets: Vec<ShortTermRps>,
    pub long_term_ref_pics_present_flag: bool,
    pub long_term_ref_pics: Vec<LongTermRefPic>,
    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,

    pub vui: Option<H265Vui>,

    pub sps_extension_present_flag: bool,
    pub range_extension: Option<SpsRangeExtension>,
    pub sps_multilayer_extension_flag: bool,
    pub sps_3d_extension_flag: bool,
    pub sps_scc_extension_flag: bool,
    pub sps_extension_4bits: u8,
}

impl H265Sps {
    /// seq_parameter_set_rbsp(), starting after the NAL unit header.
    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        let mut sps = Self {
            sps_video_parameter_set_id: bs.read_bits(4)? as u8,
            sps_max_sub_layers_minus1: bs.read_bits(3)? as u8,
            sps_temporal_id_nesting_flag: bs.read_bit()?,
            ..Default::default()
        };

        if sps.sps_max_sub_layers_minus1 as usize >= MAX_SUB_LAYERS {
            bail!(ParameterSetError::ValueOutOfRange {
                field: "sps_max_sub_layers_minus1",
                value: sps.sps_max_sub_layers_minus1 as i64,
                min: 0,
                max: MAX_SUB_LAYERS as i64 - 1,
            });
        }

        sps.profile_tier_level = ProfileTierLevel::read(bs, true, sps.sps_max_sub_layers_minus1)?;

        sps.sps_seq_parameter_set_id = read_ue(bs)?;
        if sps.sps_seq_parameter_set_id as usize >= MAX_SPS {
            bail!(ParameterSetError::IdOutOfRange {
                kind: "seq_parameter_set",
                id: sps.sps_seq_parameter_set_id,
                max: MAX_SPS - 1,
            });
        }

        sps.chroma_format_idc = read_ue(bs)?;
        check_range("chroma_format_idc", sps.chroma_format_idc as i64, 0, 3)?;
        if sps.chroma_format_idc == 3 {
            sps.separate_colour_plane_flag = bs.read_bit()?;
        }

        sps.pic_width_in_luma_samples = read_ue(bs)?;
        sps.pic_height_in_luma_samples = read_ue(bs)?;
        check_range("pic_width_in_luma_samples", sps.pic_width_in_luma_samples as i64, 1, 16888)?;
        check_range("pic_height_in_luma_samples", sps.pic_height_in_luma_samples as i64, 1, 16888)?;

        if bs.read_bit()? {
            sps.conformance_window = Some(ConformanceWindow {
                left_offset: read_ue(bs)?,
                right_offset: read_ue(bs)?,
                top_offset: read_ue(bs)?,
                bottom_offset: read_ue(bs)?,
            });
        }

        sps.bit_depth_luma_minus8 = read_ue(bs)?;
        check_range("bit_depth_luma_minus8", sps.bit_depth_luma_minus8 as i64, 0, 8)?;
        sps.bit_depth_chroma_minus8 = read_ue(bs)?;
        check_range("bit_depth_chroma_minus8", sps.bit_depth_chroma_minus8 as i64, 0, 8)?;
        sps.log2_max_pic_order_cnt_lsb_minus4 = read_ue(bs)?;
        check_range(
            "log2_max_pic_order_cnt_lsb_minus4",
            sps.log2_max_pic_order_cnt_lsb_minus4 as i64,
            0,
            12,
        )?;

        sps.sps_sub_layer_ordering_info_present_flag = bs.read_bit()?;
        sps.sub_layer_ordering = read_sub_layer_ordering(
            bs,
            sps.sps_sub_layer_ordering_info_present_flag,
            sps.sps_max_sub_layers_minus1,
        )?;

        sps.log2_min_luma_coding_block_size_minus3 = read_ue(bs)?;
        sps.log2_diff_max_min_luma_coding_block_size = read_ue(bs)?;
        check_range("Log2CtbSizeY", sps.log2_ctb_size() as i64, 4, 6)?;
        sps.log2_min_luma_transform_block_size_minus2 = read_ue(bs)?;
        sps.log2_diff_max_min_luma_transform_block_size = read_ue(bs)?;
        sps.max_transform_hierarchy_depth_inter = read_ue(bs)?;
        sps.max_transform_hierarchy_depth_intra = read_ue(bs)?;

        sps.scaling_list_enabled_flag = bs.read_bit()?;
        if sps.scaling_list_enabled_flag {
            // sps_scaling_list_data_present_flag, else the default lists apply
            sps.scaling_list_data = Some(if bs.read_bit()? {
                ScalingListData::read(bs, sps.chroma_format_idc)?
            } else {
                ScalingListData::default()
            });
        }

        sps.amp_enabled_flag = bs.read_bit()?;
        sps.sample_adaptive_offset_enabled_flag = bs.read_bit()?;

        if bs.read_bit()? {
            sps.pcm = Some(PcmParameters {
                pcm_sample_bit_depth_luma_minus1: bs.read_bits(4)? as u8,
                pcm_sample_bit_depth_chroma_minus1: bs.read_bits(4)? as u8,
                log2_min_pcm_luma_coding_block_size_minus3: read_ue(bs)?,
                log2_diff_max_min_pcm_luma_coding_block_size: read_ue(bs)?,
                pcm_loop_filter_disabled_flag: bs.read_bit()?,
            });
        }

        let num_short_term_ref_pic_sets = read_ue(bs)? as usize;
        check_range(
            "num_short_term_ref_pic_sets",
            num_short_term_ref_pic_sets as i64,
            0,
            MAX_SHORT_TERM_RPS as i64,
        )?;
        for i in 0..num_short_term_ref_pic_sets {
            let rps = ShortTermRps::read(bs, i, num_short_term_ref_pic_sets, &sps.short_term_ref_pic_sets)?;
            sps.short_term_ref_pic_sets.push(rps);
        }

        sps.long_term_ref_pics_present_flag = bs.read_bit()?;
        if sps.long_term_ref_pics_present_flag {
            let num_long_term_ref_pics_sps = read_ue(bs)?;
            check_range(
                "num_long_term_ref_pics_sps",
                num_long_term_ref_pics_sps as i64,
                0,
                MAX_LONG_TERM_REF_PICS as i64,
            )?;
            let lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 + 4;
            for _ in 0..num_long_term_ref_pics_sps {
                sps.long_term_ref_pics.push(LongTermRefPic {
                    lt_ref_pic_poc_lsb_sps: bs.read_bits(lsb_bits)?,
                    used_by_curr_pic_lt_sps_flag: bs.read_bit()?,
                });
            }
        }

        sps.sps_temporal_mvp_enabled_flag = bs.read_bit()?;
        sps.strong_intra_smoothing_enabled_flag = bs.read_bit()?;

        if bs.read_bit()? {
            sps.vui = Some(H265Vui::read(bs, sps.sps_max_sub_layers_minus1)?);
        }

        sps.sps_extension_present_flag = bs.read_bit()?;
        if sps.sps_extension_present_flag {
            let sps_range_extension_flag = bs.read_bit()?;
            sps.sps_multilayer_extension_flag = bs.read_bit()?;
            sps.sps_3d_extension_flag = bs.read_bit()?;
            sps.sps_scc_extension_flag = bs.read_bit()?;
            sps.sps_extension_4bits = bs.read_bits(4)? as u8;

            if sps_range_extension_flag {
                sps.range_extension = Some(SpsRangeExtension::read(bs)?);
            }
        }

        debug!(
            "SPS {} -> VPS {}: {} level {}, {}x{}, {}-bit",
            sps.sps_seq_parameter_set_id,
            sps.sps_video_parameter_set_id,
            sps.profile_tier_level.profile_name(),
            sps.profile_tier_level.level_name(),
            sps.width(),
            sps.height(),
            sps.bit_depth_luma()
        );

        Ok(sps)
    }

    pub fn chroma_array_type(&self) -> u8 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc as u8
        }
    }

    /// (SubWidthC, SubHeightC), Table 6-1.
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self.chroma_array_type() {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        }
    }

    pub fn log2_ctb_size(&self) -> u32 {
        self.log2_min_luma_coding_block_size_minus3 + 3 + self.log2_diff_max_min_luma_coding_block_size
    }

    pub fn pic_width_in_ctbs(&self) -> u32 {
        self.pic_width_in_luma_samples.div_ceil(1 << self.log2_ctb_size())
    }

    pub fn pic_height_in_ctbs(&self) -> u32 {
        self.pic_height_in_luma_samples.div_ceil(1 << self.log2_ctb_size())
    }

    /// Luma width inside the conformance window.
    pub fn width(&self) -> u32 {
        let window = self.conformance_window.unwrap_or_default();
        let (sub_width, _) = self.chroma_subsampling();
        self.pic_width_in_luma_samples
            .saturating_sub(sub_width * (window.left_offset + window.right_offset))
    }

    /// Luma height inside the conformance window.
    pub fn height(&self) -> u32 {
        let window = self.conformance_window.unwrap_or_default();
        let (_, sub_height) = self.chroma_subsampling();
        self.pic_height_in_luma_samples
            .saturating_sub(sub_height * (window.top_offset + window.bottom_offset))
    }

    pub fn bit_depth_luma(&self) -> u32 {
        self.bit_depth_luma_minus8 + 8
    }

    pub fn bit_depth_chroma(&self) -> u32 {
        self.bit_depth_chroma_minus8 + 8
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.vui.as_ref().and_then(|vui| vui.frame_rate())
    }
}
