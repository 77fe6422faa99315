//! hrd_parameters() and sub_layer_hrd_parameters(), clause E.2.2.

use anyhow::Result;

use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::read_ue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubLayerCpb {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cpb_size_du_value_minus1: u32,
    pub bit_rate_du_value_minus1: u32,
    pub cbr_flag: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubLayerHrd {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    pub elemental_duration_in_tc_minus1: u32,
    pub low_delay_hrd_flag: bool,
    pub cpb_cnt_minus1: u32,
    pub nal: Vec<SubLayerCpb>,
    pub vcl: Vec<SubLayerCpb>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H265Hrd {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub sub_pic_hrd_params_present_flag: bool,
    pub tick_divisor_minus2: u8,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u8,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb_size_du_scale: u8,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub au_cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub sub_layers: Vec<SubLayerHrd>,
}

impl H265Hrd {
    pub fn read<S: ByteSource>(
        bs: &mut Bitstream<S>,
        common_inf_present_flag: bool,
        max_num_sub_layers_minus1: u8,
    ) -> Result<Self> {
        let mut hrd = Self::default();

        if common_inf_present_flag {
            hrd.nal_hrd_parameters_present_flag = bs.read_bit()?;
            hrd.vcl_hrd_parameters_present_flag = bs.read_bit()?;

            if hrd.nal_hrd_parameters_present_flag || hrd.vcl_hrd_parameters_present_flag {
                hrd.sub_pic_hrd_params_present_flag = bs.read_bit()?;
                if hrd.sub_pic_hrd_params_present_flag {
                    hrd.tick_divisor_minus2 = bs.read_bits(8)? as u8;
                    hrd.du_cpb_removal_delay_increment_length_minus1 = bs.read_bits(5)? as u8;
                    hrd.sub_pic_cpb_params_in_pic_timing_sei_flag = bs.read_bit()?;
                    hrd.dpb_output_delay_du_length_minus1 = bs.read_bits(5)? as u8;
                }

                hrd.bit_rate_scale = bs.read_bits(4)? as u8;
                hrd.cpb_size_scale = bs.read_bits(4)? as u8;
                if hrd.sub_pic_hrd_params_present_flag {
                    hrd.cpb_size_du_scale = bs.read_bits(4)? as u8;
                }

                hrd.initial_cpb_removal_delay_length_minus1 = bs.read_bits(5)? as u8;
                hrd.au_cpb_removal_delay_length_minus1 = bs.read_bits(5)? as u8;
                hrd.dpb_output_delay_length_minus1 = bs.read_bits(5)? as u8;
            }
        }

        for _ in 0..=max_num_sub_layers_minus1 {
            let mut sub_layer = SubLayerHrd {
                fixed_pic_rate_general_flag: bs.read_bit()?,
                ..Default::default()
            };

            sub_layer.fixed_pic_rate_within_cvs_flag = if sub_layer.fixed_pic_rate_general_flag {
                true
            } else {
                bs.read_bit()?
            };

            if sub_layer.fixed_pic_rate_within_cvs_flag {
                sub_layer.elemental_duration_in_tc_minus1 = read_ue(bs)?;
                check_range(
                    "elemental_duration_in_tc_minus1",
                    sub_layer.elemental_duration_in_tc_minus1 as i64,
                    0,
                    2047,
                )?;
            } else {
                sub_layer.low_delay_hrd_flag = bs.read_bit()?;
            }

            if !sub_layer.low_delay_hrd_flag {
                sub_layer.cpb_cnt_minus1 = read_ue(bs)?;
                check_range("cpb_cnt_minus1", sub_layer.cpb_cnt_minus1 as i64, 0, 31)?;
            }

            if hrd.nal_hrd_parameters_present_flag {
                sub_layer.nal = hrd.read_sub_layer(bs, sub_layer.cpb_cnt_minus1)?;
            }
            if hrd.vcl_hrd_parameters_present_flag {
                sub_layer.vcl = hrd.read_sub_layer(bs, sub_layer.cpb_cnt_minus1)?;
            }

            hrd.sub_layers.push(sub_layer);
        }

        Ok(hrd)
    }

    fn read_sub_layer<S: ByteSource>(
        &self,
        bs: &mut Bitstream<S>,
        cpb_cnt_minus1: u32,
    ) -> Result<Vec<SubLayerCpb>> {
        let mut cpbs = Vec::with_capacity(cpb_cnt_minus1 as usize + 1);

        for _ in 0..=cpb_cnt_minus1 {
            let mut cpb = SubLayerCpb {
                bit_rate_value_minus1: read_ue(bs)?,
                cpb_size_value_minus1: read_ue(bs)?,
                ..Default::default()
            };
            if self.sub_pic_hrd_params_present_flag {
                cpb.cpb_size_du_value_minus1 = read_ue(bs)?;
                cpb.bit_rate_du_value_minus1 = read_ue(bs)?;
            }
            cpb.cbr_flag = bs.read_bit()?;
            cpbs.push(cpb);
        }

        Ok(cpbs)
    }

    /// BitRate of the first NAL CPB of the highest sub-layer, in bits per second.
    pub fn bit_rate(&self) -> Option<u64> {
        let cpb = self.sub_layers.last()?.nal.first()?;
        Some((cpb.bit_rate_value_minus1 as u64 + 1) << (6 + self.bit_rate_scale as u64))
    }
}
