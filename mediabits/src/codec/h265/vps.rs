//! video_parameter_set_rbsp(), clause 7.3.2.1.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::debug;

use super::hrd::H265Hrd;
use super::ptl::ProfileTierLevel;
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::read_ue;
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::errors::ParameterSetError;

pub const MAX_VPS: usize = 16;

/// Upper bound on sub-layers, sps_max_sub_layers_minus1 + 1.
pub const MAX_SUB_LAYERS: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubLayerOrdering {
    pub max_dec_pic_buffering_minus1: u32,
    pub max_num_reorder_pics: u32,
    pub max_latency_increase_plus1: u32,
}

/// Reads the sub-layer ordering loop shared by VPS and SPS. Entries below
/// the first coded one repeat it.
pub(crate) fn read_sub_layer_ordering<S: ByteSource>(
    bs: &mut Bitstream<S>,
    present_flag: bool,
    max_sub_layers_minus1: u8,
) -> Result<Vec<SubLayerOrdering>> {
    let first = if present_flag { 0 } else { max_sub_layers_minus1 };
    let mut ordering = Vec::with_capacity(max_sub_layers_minus1 as usize + 1);

    for _ in first..=max_sub_layers_minus1 {
        let entry = SubLayerOrdering {
            max_dec_pic_buffering_minus1: read_ue(bs)?,
            max_num_reorder_pics: read_ue(bs)?,
            max_latency_increase_plus1: read_ue(bs)?,
        };
        check_range(
            "max_dec_pic_buffering_minus1",
            entry.max_dec_pic_buffering_minus1 as i64,
            0,
            15,
        )?;
        check_range(
            "max_num_reorder_pics",
            entry.max_num_reorder_pics as i64,
            0,
            entry.max_dec_pic_buffering_minus1 as i64,
        )?;
        ordering.push(entry);
    }

    if !present_flag {
        let entry = ordering[0];
        ordering.splice(0..0, std::iter::repeat_n(entry, max_sub_layers_minus1 as usize));
    }

    Ok(ordering)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpsHrd {
    pub hrd_layer_set_idx: u32,
    pub cprms_present_flag: bool,
    pub hrd_parameters: H265Hrd,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H265Vps {
    pub vps_video_parameter_set_id: u8,
    pub vps_base_layer_internal_flag: bool,
    pub vps_base_layer_available_flag: bool,
    pub vps_max_layers_minus1: u8,
    pub vps_max_sub_layers_minus1: u8,
    pub vps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,

    pub vps_sub_layer_ordering_info_present_flag: bool,
    pub sub_layer_ordering: Vec<SubLayerOrdering>,

    pub vps_max_layer_id: u8,
    pub vps_num_layer_sets_minus1: u32,
    /// layer_id_included_flag for layer sets 1..=vps_num_layer_sets_minus1.
    pub layer_id_included: Vec<Vec<bool>>,

    pub vps_timing_info_present_flag: bool,
    pub vps_num_units_in_tick: u32,
    pub vps_time_scale: u32,
    pub vps_poc_proportional_to_timing_flag: bool,
    pub vps_num_ticks_poc_diff_one_minus1: u32,
    pub hrd: Vec<VpsHrd>,

    pub vps_extension_flag: bool,
}

impl H265Vps {
    pub fn read<S: ByteSource>(options: &ParseOptions, bs: &mut Bitstream<S>) -> Result<Self> {
        let mut vps = Self {
            vps_video_parameter_set_id: bs.read_bits(4)? as u8,
            vps_base_layer_internal_flag: bs.read_bit()?,
            vps_base_layer_available_flag: bs.read_bit()?,
            vps_max_layers_minus1: bs.read_bits(6)? as u8,
            vps_max_sub_layers_minus1: bs.read_bits(3)? as u8,
            vps_temporal_id_nesting_flag: bs.read_bit()?,
            ..Default::default()
        };

        if vps.vps_max_sub_layers_minus1 as usize >= MAX_SUB_LAYERS {
            bail!(ParameterSetError::ValueOutOfRange {
                field: "vps_max_sub_layers_minus1",
                value: vps.vps_max_sub_layers_minus1 as i64,
                min: 0,
                max: MAX_SUB_LAYERS as i64 - 1,
            });
        }

        let reserved = bs.read_bits(16)?;
        if reserved != 0xFFFF {
            log_or_err!(
                options,
                Warn,
                anyhow!(ParameterSetError::ValueOutOfRange {
                    field: "vps_reserved_0xffff_16bits",
                    value: reserved as i64,
                    min: 0xFFFF,
                    max: 0xFFFF,
                })
            );
        }

        vps.profile_tier_level = ProfileTierLevel::read(bs, true, vps.vps_max_sub_layers_minus1)?;

        vps.vps_sub_layer_ordering_info_present_flag = bs.read_bit()?;
        vps.sub_layer_ordering = read_sub_layer_ordering(
            bs,
            vps.vps_sub_layer_ordering_info_present_flag,
            vps.vps_max_sub_layers_minus1,
        )?;

        vps.vps_max_layer_id = bs.read_bits(6)? as u8;
        vps.vps_num_layer_sets_minus1 = read_ue(bs)?;
        check_range("vps_num_layer_sets_minus1", vps.vps_num_layer_sets_minus1 as i64, 0, 1023)?;

        for _ in 1..=vps.vps_num_layer_sets_minus1 {
            let mut included = Vec::with_capacity(vps.vps_max_layer_id as usize + 1);
            for _ in 0..=vps.vps_max_layer_id {
                included.push(bs.read_bit()?);
            }
            vps.layer_id_included.push(included);
        }

        vps.vps_timing_info_present_flag = bs.read_bit()?;
        if vps.vps_timing_info_present_flag {
            vps.vps_num_units_in_tick = bs.read_bits(32)?;
            vps.vps_time_scale = bs.read_bits(32)?;
            vps.vps_poc_proportional_to_timing_flag = bs.read_bit()?;
            if vps.vps_poc_proportional_to_timing_flag {
                vps.vps_num_ticks_poc_diff_one_minus1 = read_ue(bs)?;
            }

            let vps_num_hrd_parameters = read_ue(bs)?;
            check_range(
                "vps_num_hrd_parameters",
                vps_num_hrd_parameters as i64,
                0,
                vps.vps_num_layer_sets_minus1 as i64 + 1,
            )?;

            for i in 0..vps_num_hrd_parameters {
                let hrd_layer_set_idx = read_ue(bs)?;
                let cprms_present_flag = if i > 0 { bs.read_bit()? } else { true };
                vps.hrd.push(VpsHrd {
                    hrd_layer_set_idx,
                    cprms_present_flag,
                    hrd_parameters: H265Hrd::read(
                        bs,
                        cprms_present_flag,
                        vps.vps_max_sub_layers_minus1,
                    )?,
                });
            }
        }

        vps.vps_extension_flag = bs.read_bit()?;

        debug!(
            "VPS {}: {} sub-layer(s), {} {} level {}",
            vps.vps_video_parameter_set_id,
            vps.vps_max_sub_layers_minus1 + 1,
            vps.profile_tier_level.profile_name(),
            vps.profile_tier_level.tier_name(),
            vps.profile_tier_level.level_name()
        );

        Ok(vps)
    }
}
