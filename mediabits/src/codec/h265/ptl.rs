//! profile_tier_level(), clause 7.3.3.

use anyhow::Result;

use crate::bitstream::{Bitstream, ByteSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerProfile {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub profile_compatibility_flags: u32,
    pub progressive_source_flag: bool,
    pub interlaced_source_flag: bool,
    pub non_packed_constraint_flag: bool,
    pub frame_only_constraint_flag: bool,
    /// The 43 constraint bits and the inbld/reserved bit, MSB first.
    pub constraint_flags: u64,
}

impl LayerProfile {
    fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        Ok(Self {
            profile_space: bs.read_bits(2)? as u8,
            tier_flag: bs.read_bit()?,
            profile_idc: bs.read_bits(5)? as u8,
            profile_compatibility_flags: bs.read_bits(32)?,
            progressive_source_flag: bs.read_bit()?,
            interlaced_source_flag: bs.read_bit()?,
            non_packed_constraint_flag: bs.read_bit()?,
            frame_only_constraint_flag: bs.read_bit()?,
            constraint_flags: bs.read_bits_64(44)?,
        })
    }

    pub fn is_compatible_with(&self, profile_idc: u8) -> bool {
        profile_idc < 32 && self.profile_compatibility_flags & (1 << (31 - profile_idc)) != 0
    }

    /// profile_idc, falling back to the lowest compatibility flag set.
    pub fn effective_profile_idc(&self) -> u8 {
        if self.profile_idc != 0 {
            return self.profile_idc;
        }

        (1..32).find(|&idc| self.is_compatible_with(idc)).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubLayer {
    pub profile: Option<LayerProfile>,
    pub level_idc: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTierLevel {
    pub general_profile: Option<LayerProfile>,
    pub general_level_idc: u8,
    pub sub_layers: Vec<SubLayer>,
}

impl ProfileTierLevel {
    pub fn read<S: ByteSource>(
        bs: &mut Bitstream<S>,
        profile_present_flag: bool,
        max_num_sub_layers_minus1: u8,
    ) -> Result<Self> {
        let general_profile = if profile_present_flag {
            Some(LayerProfile::read(bs)?)
        } else {
            None
        };
        let general_level_idc = bs.read_bits(8)? as u8;

        let mut present = Vec::with_capacity(max_num_sub_layers_minus1 as usize);
        for _ in 0..max_num_sub_layers_minus1 {
            present.push((bs.read_bit()?, bs.read_bit()?));
        }
        if max_num_sub_layers_minus1 > 0 {
            // reserved_zero_2bits
            bs.skip_bits(2 * (8 - max_num_sub_layers_minus1 as u64))?;
        }

        let mut sub_layers = Vec::with_capacity(present.len());
        for (profile_present, level_present) in present {
            let profile = if profile_present {
                Some(LayerProfile::read(bs)?)
            } else {
                None
            };
            let level_idc = if level_present {
                Some(bs.read_bits(8)? as u8)
            } else {
                None
            };
            sub_layers.push(SubLayer { profile, level_idc });
        }

        Ok(Self {
            general_profile,
            general_level_idc,
            sub_layers,
        })
    }

    pub fn profile_name(&self) -> &'static str {
        let Some(profile) = &self.general_profile else {
            return "Unknown";
        };

        match profile.effective_profile_idc() {
            1 => "Main",
            2 => "Main 10",
            3 => "Main Still Picture",
            4 => "Format Range Extensions",
            5 => "High Throughput",
            6 => "Multiview Main",
            7 => "Scalable Main",
            8 => "3D Main",
            9 => "Screen Content Coding Extensions",
            10 => "Scalable Format Range Extensions",
            11 => "High Throughput Screen Content Coding Extensions",
            _ => "Unknown",
        }
    }

    pub fn tier_name(&self) -> &'static str {
        match self.general_profile {
            Some(LayerProfile { tier_flag: true, .. }) => "High",
            _ => "Main",
        }
    }

    /// general_level_idc is 30 times the level number.
    pub fn level_name(&self) -> String {
        let idc = self.general_level_idc as u32;
        format!("{}.{}", idc / 30, (idc % 30) / 3)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    pub(crate) fn main_profile(builder: BitBuilder) -> BitBuilder {
        builder
            .bits(2, 0)
            .flag(false)
            .bits(5, 1)
            .bits(32, 0x6000_0000)
            .pattern("1001")
            .bits(44, 0)
    }

    #[test]
    fn general_only() {
        let data = main_profile(BitBuilder::new()).bits(8, 93).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let ptl = ProfileTierLevel::read(&mut bs, true, 0).unwrap();

        assert_eq!(ptl.profile_name(), "Main");
        assert_eq!(ptl.tier_name(), "Main");
        assert_eq!(ptl.level_name(), "3.1");
        assert!(ptl.general_profile.unwrap().is_compatible_with(2));
        assert!(ptl.sub_layers.is_empty());
        assert_eq!(bs.bit_cursor(), 96);
    }

    #[test]
    fn sub_layers() {
        let builder = main_profile(BitBuilder::new())
            .bits(8, 120)
            .pattern("01 00") // level only for sub-layer 0
            .bits(12, 0); // reserved_zero_2bits for 2..8
        let data = builder.bits(8, 90).finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let ptl = ProfileTierLevel::read(&mut bs, true, 2).unwrap();

        assert_eq!(ptl.level_name(), "4.0");
        assert_eq!(ptl.sub_layers.len(), 2);
        assert_eq!(ptl.sub_layers[0].level_idc, Some(90));
        assert_eq!(ptl.sub_layers[1], SubLayer::default());
    }
}
