//! vui_parameters(), clause E.2.1.

use anyhow::Result;

use super::hrd::H265Hrd;
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::read_ue;
use crate::codec::h264::vui::{EXTENDED_SAR, SAMPLE_ASPECT_RATIOS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayWindow {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H265Vui {
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
    pub matrix_coeffs: u8,

    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,

    pub neutral_chroma_indication_flag: bool,
    pub field_seq_flag: bool,
    pub frame_field_info_present_flag: bool,
    pub default_display_window: Option<DisplayWindow>,

    pub vui_timing_info_present_flag: bool,
    pub vui_num_units_in_tick: u32,
    pub vui_time_scale: u32,
    pub vui_poc_proportional_to_timing_flag: bool,
    pub vui_num_ticks_poc_diff_one_minus1: u32,
    pub hrd_parameters: Option<H265Hrd>,

    pub bitstream_restriction_flag: bool,
    pub tiles_fixed_structure_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub restricted_ref_pic_lists_flag: bool,
    pub min_spatial_segmentation_idc: u32,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_min_cu_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
}

impl H265Vui {
    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>, sps_max_sub_layers_minus1: u8) -> Result<Self> {
        let mut vui = Self {
            video_format: 5,
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coeffs: 2,
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
                vui.matrix_coeffs = bs.read_bits(8)? as u8;
            }
        }

        vui.chroma_loc_info_present_flag = bs.read_bit()?;
        if vui.chroma_loc_info_present_flag {
            vui.chroma_sample_loc_type_top_field = read_ue(bs)?;
            vui.chroma_sample_loc_type_bottom_field = read_ue(bs)?;
            check_range(
                "chroma_sample_loc_type_bottom_field",
                vui.chroma_sample_loc_type_bottom_field as i64,
                0,
                5,
            )?;
        }

        vui.neutral_chroma_indication_flag = bs.read_bit()?;
        vui.field_seq_flag = bs.read_bit()?;
        vui.frame_field_info_present_flag = bs.read_bit()?;

        if bs.read_bit()? {
            vui.default_display_window = Some(DisplayWindow {
                left_offset: read_ue(bs)?,
                right_offset: read_ue(bs)?,
                top_offset: read_ue(bs)?,
                bottom_offset: read_ue(bs)?,
            });
        }

        vui.vui_timing_info_present_flag = bs.read_bit()?;
        if vui.vui_timing_info_present_flag {
            vui.vui_num_units_in_tick = bs.read_bits(32)?;
            vui.vui_time_scale = bs.read_bits(32)?;
            vui.vui_poc_proportional_to_timing_flag = bs.read_bit()?;
            if vui.vui_poc_proportional_to_timing_flag {
                vui.vui_num_ticks_poc_diff_one_minus1 = read_ue(bs)?;
            }
            if bs.read_bit()? {
                vui.hrd_parameters = Some(H265Hrd::read(bs, true, sps_max_sub_layers_minus1)?);
            }
        }

        vui.bitstream_restriction_flag = bs.read_bit()?;
        if vui.bitstream_restriction_flag {
            vui.tiles_fixed_structure_flag = bs.read_bit()?;
            vui.motion_vectors_over_pic_boundaries_flag = bs.read_bit()?;
            vui.restricted_ref_pic_lists_flag = bs.read_bit()?;
            vui.min_spatial_segmentation_idc = read_ue(bs)?;
            check_range(
                "min_spatial_segmentation_idc",
                vui.min_spatial_segmentation_idc as i64,
                0,
                4095,
            )?;
            vui.max_bytes_per_pic_denom = read_ue(bs)?;
            vui.max_bits_per_min_cu_denom = read_ue(bs)?;
            vui.log2_max_mv_length_horizontal = read_ue(bs)?;
            vui.log2_max_mv_length_vertical = read_ue(bs)?;
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

    /// One tick per picture, unlike H.264 field-based timing.
    pub fn frame_rate(&self) -> Option<f64> {
        (self.vui_timing_info_present_flag && self.vui_num_units_in_tick != 0 && self.vui_time_scale != 0)
            .then(|| self.vui_time_scale as f64 / self.vui_num_units_in_tick as f64)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    #[test]
    fn timing_and_display_window() {
        let data = BitBuilder::new()
            .flag(true)
            .bits(8, 1) // square pixels
            .flag(false)
            .flag(true)
            .bits(3, 5)
            .flag(false)
            .flag(true)
            .bits(8, 1)
            .bits(8, 1)
            .bits(8, 1)
            .flag(false)
            .pattern("000")
            .flag(true)
            .ue(0)
            .ue(0)
            .ue(0)
            .ue(8)
            .flag(true)
            .bits(32, 1001)
            .bits(32, 60000)
            .flag(false)
            .flag(false) // hrd
            .flag(false)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let vui = H265Vui::read(&mut bs, 0).unwrap();

        assert_eq!(vui.sample_aspect_ratio(), Some((1, 1)));
        assert_eq!(vui.colour_primaries, 1);
        assert_eq!(vui.default_display_window.unwrap().bottom_offset, 8);
        let fps = vui.frame_rate().unwrap();
        assert!((fps - 59.94).abs() < 0.01);
    }
}
