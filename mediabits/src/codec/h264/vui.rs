//! VUI and HRD parameters, Annex E.

use anyhow::Result;

use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::read_ue;

pub const EXTENDED_SAR: u8 = 255;

/// Sample aspect ratios for aspect_ratio_idc 1..=16, Table E-1.
pub(crate) const SAMPLE_ASPECT_RATIOS: [(u16, u16); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpbSpec {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cbr_flag: bool,
}

/// hrd_parameters(), E.1.2
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HrdParameters {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb: Vec<CpbSpec>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}

impl HrdParameters {
    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        let cpb_cnt_minus1 = read_ue(bs)?;
        check_range("cpb_cnt_minus1", cpb_cnt_minus1 as i64, 0, 31)?;

        let bit_rate_scale = bs.read_bits(4)? as u8;
        let cpb_size_scale = bs.read_bits(4)? as u8;

        let mut cpb = Vec::with_capacity(cpb_cnt_minus1 as usize + 1);
        for _ in 0..=cpb_cnt_minus1 {
            cpb.push(CpbSpec {
                bit_rate_value_minus1: read_ue(bs)?,
                cpb_size_value_minus1: read_ue(bs)?,
                cbr_flag: bs.read_bit()?,
            });
        }

        Ok(Self {
            cpb_cnt_minus1,
            bit_rate_scale,
            cpb_size_scale,
            cpb,
            initial_cpb_removal_delay_length_minus1: bs.read_bits(5)? as u8,
            cpb_removal_delay_length_minus1: bs.read_bits(5)? as u8,
            dpb_output_delay_length_minus1: bs.read_bits(5)? as u8,
            time_offset_length: bs.read_bits(5)? as u8,
        })
    }

    /// BitRate[0] in bits per second.
    pub fn bit_rate(&self) -> Option<u64> {
        self.cpb.first().map(|spec| {
            (spec.bit_rate_value_minus1 as u64 + 1) << (6 + self.bit_rate_scale as u64)
        })
    }
}

/// vui_parameters(), E.1.1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VuiParameters {
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,

    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,

    pub video_signal_type_present_flag: bool,
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,

    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,

    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,

    pub nal_hrd_parameters: Option<HrdParameters>,
    pub vcl_hrd_parameters: Option<HrdParameters>,
    pub low_delay_hrd_flag: bool,
    pub pic_struct_present_flag: bool,

    pub bitstream_restriction_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_mb_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

impl VuiParameters {
    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        let mut vui = Self {
            video_format: 5,
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coefficients: 2,
            ..Default::default()
        };

        vui.aspect_ratio_info_present_flag = bs.read_bit()?;
        if vui.aspect_ratio_info_present_flag {
            vui.aspect_ratio_idc = bs.read_bits(8)? as u8;
            if vui.aspect_ratio_idc == EXTENDED_SAR {
                vui.sar_width = bs.read_bits(16)? as u16;
                vui.sar_height = bs.read_bits(16)? as u16;
            }
        }

        vui.overscan_info_present_flag = bs.read_bit()?;
        if vui.overscan_info_present_flag {
            vui.overscan_appropriate_flag = bs.read_bit()?;
        }

        vui.video_signal_type_present_flag = bs.read_bit()?;
        if vui.video_signal_type_present_flag {
            vui.video_format = bs.read_bits(3)? as u8;
            vui.video_full_range_flag = bs.read_bit()?;
            vui.colour_description_present_flag = bs.read_bit()?;
            if vui.colour_description_present_flag {
                vui.colour_primaries = bs.read_bits(8)? as u8;
                vui.transfer_characteristics = bs.read_bits(8)? as u8;
                vui.matrix_coefficients = bs.read_bits(8)? as u8;
            }
        }

        vui.chroma_loc_info_present_flag = bs.read_bit()?;
        if vui.chroma_loc_info_present_flag {
            vui.chroma_sample_loc_type_top_field = read_ue(bs)?;
            vui.chroma_sample_loc_type_bottom_field = read_ue(bs)?;
            check_range(
                "chroma_sample_loc_type_top_field",
                vui.chroma_sample_loc_type_top_field as i64,
                0,
                5,
            )?;
        }

        vui.timing_info_present_flag = bs.read_bit()?;
        if vui.timing_info_present_flag {
            vui.num_units_in_tick = bs.read_bits(32)?;
            vui.time_scale = bs.read_bits(32)?;
            vui.fixed_frame_rate_flag = bs.read_bit()?;
        }

        if bs.read_bit()? {
            vui.nal_hrd_parameters = Some(HrdParameters::read(bs)?);
        }
        if bs.read_bit()? {
            vui.vcl_hrd_parameters = Some(HrdParameters::read(bs)?);
        }
        if vui.nal_hrd_parameters.is_some() || vui.vcl_hrd_parameters.is_some() {
            vui.low_delay_hrd_flag = bs.read_bit()?;
        }

        vui.pic_struct_present_flag = bs.read_bit()?;

        vui.bitstream_restriction_flag = bs.read_bit()?;
        if vui.bitstream_restriction_flag {
            vui.motion_vectors_over_pic_boundaries_flag = bs.read_bit()?;
            vui.max_bytes_per_pic_denom = read_ue(bs)?;
            vui.max_bits_per_mb_denom = read_ue(bs)?;
            vui.log2_max_mv_length_horizontal = read_ue(bs)?;
            vui.log2_max_mv_length_vertical = read_ue(bs)?;
            vui.max_num_reorder_frames = read_ue(bs)?;
            vui.max_dec_frame_buffering = read_ue(bs)?;
        }

        Ok(vui)
    }

    pub fn sample_aspect_ratio(&self) -> Option<(u16, u16)> {
        if !self.aspect_ratio_info_present_flag {
            return None;
        }

        match self.aspect_ratio_idc {
            EXTENDED_SAR if self.sar_width != 0 && self.sar_height != 0 => {
                Some((self.sar_width, self.sar_height))
            }
            idc @ 1..=16 => Some(SAMPLE_ASPECT_RATIOS[idc as usize - 1]),
            _ => None,
        }
    }

    /// Frames per second, assuming two ticks per frame.
    pub fn frame_rate(&self) -> Option<f64> {
        (self.timing_info_present_flag && self.num_units_in_tick != 0 && self.time_scale != 0)
            .then(|| self.time_scale as f64 / (2.0 * self.num_units_in_tick as f64))
    }
}
