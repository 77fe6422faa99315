//! H.265 NAL unit header, clause 7.3.1.2.

use anyhow::{Result, bail};
use log::trace;

use crate::bitstream::{Bitstream, ByteSource};
use crate::utils::errors::NaluError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H265NalUnitType {
    TrailN,
    TrailR,
    TsaN,
    TsaR,
    StsaN,
    StsaR,
    RadlN,
    RadlR,
    RaslN,
    RaslR,
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    IdrWRadl,
    IdrNLp,
    Cra,
    Vps,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfBitstream,
    FillerData,
    PrefixSei,
    SuffixSei,
    Reserved(u8),
    Unspecified(u8),
}

impl From<u8> for H265NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::AccessUnitDelimiter,
            36 => Self::EndOfSequence,
            37 => Self::EndOfBitstream,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            10..=15 | 22..=31 | 41..=47 => Self::Reserved(value),
            _ => Self::Unspecified(value),
        }
    }
}

impl H265NalUnitType {
    fn raw(self) -> Option<u8> {
        match self {
            Self::Reserved(v) | Self::Unspecified(v) => Some(v),
            _ => None,
        }
    }

    /// VCL types are 0..=31, reserved ones included.
    pub fn is_vcl(self) -> bool {
        match self.raw() {
            Some(v) => v < 32,
            None => !matches!(
                self,
                Self::Vps
                    | Self::Sps
                    | Self::Pps
                    | Self::AccessUnitDelimiter
                    | Self::EndOfSequence
                    | Self::EndOfBitstream
                    | Self::FillerData
                    | Self::PrefixSei
                    | Self::SuffixSei
            ),
        }
    }

    pub fn is_idr(self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// Intra random access point, types 16..=23.
    pub fn is_irap(self) -> bool {
        match self.raw() {
            Some(v) => (16..=23).contains(&v),
            None => matches!(
                self,
                Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp | Self::IdrWRadl | Self::IdrNLp | Self::Cra
            ),
        }
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, Self::Vps | Self::Sps | Self::Pps)
    }
}

/// Human readable name of `nal_unit_type`, Table 7-1.
pub fn nal_type_description(nal_unit_type: u8) -> &'static str {
    match nal_unit_type {
        0 => "Coded slice segment of a non-TSA, non-STSA trailing picture (TRAIL_N)",
        1 => "Coded slice segment of a non-TSA, non-STSA trailing picture (TRAIL_R)",
        2 => "Coded slice segment of a TSA picture (TSA_N)",
        3 => "Coded slice segment of a TSA picture (TSA_R)",
        4 => "Coded slice segment of an STSA picture (STSA_N)",
        5 => "Coded slice segment of an STSA picture (STSA_R)",
        6 => "Coded slice segment of a RADL picture (RADL_N)",
        7 => "Coded slice segment of a RADL picture (RADL_R)",
        8 => "Coded slice segment of a RASL picture (RASL_N)",
        9 => "Coded slice segment of a RASL picture (RASL_R)",
        10..=15 => "Reserved non-IRAP VCL",
        16 => "Coded slice segment of a BLA picture (BLA_W_LP)",
        17 => "Coded slice segment of a BLA picture (BLA_W_RADL)",
        18 => "Coded slice segment of a BLA picture (BLA_N_LP)",
        19 => "Coded slice segment of an IDR picture (IDR_W_RADL)",
        20 => "Coded slice segment of an IDR picture (IDR_N_LP)",
        21 => "Coded slice segment of a CRA picture (CRA_NUT)",
        22 | 23 => "Reserved IRAP VCL",
        24..=31 => "Reserved non-IRAP VCL",
        32 => "Video parameter set",
        33 => "Sequence parameter set",
        34 => "Picture parameter set",
        35 => "Access unit delimiter",
        36 => "End of sequence",
        37 => "End of bitstream",
        38 => "Filler data",
        39 => "Supplemental enhancement information (prefix SEI)",
        40 => "Supplemental enhancement information (suffix SEI)",
        41..=47 => "Reserved",
        48..=63 => "Unspecified",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct H265NalUnit {
    pub byte_offset: u64,
    pub forbidden_zero_bit: bool,
    pub nal_unit_type: u8,
    pub nuh_layer_id: u8,
    pub nuh_temporal_id_plus1: u8,
}

impl H265NalUnit {
    pub const HEADER_SIZE: usize = 2;

    pub fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        let byte_offset = bs.absolute_byte_offset();

        let forbidden_zero_bit = bs.read_bit()?;
        if forbidden_zero_bit {
            bail!(NaluError::ForbiddenBitSet(byte_offset));
        }

        let nal_unit_type = bs.read_bits(6)? as u8;
        let nuh_layer_id = bs.read_bits(6)? as u8;
        let nuh_temporal_id_plus1 = bs.read_bits(3)? as u8;
        if nuh_temporal_id_plus1 == 0 {
            bail!(NaluError::ZeroTemporalId(byte_offset));
        }

        trace!(
            "NAL @{byte_offset}: type {nal_unit_type} ({}), layer {nuh_layer_id}, tid {}",
            nal_type_description(nal_unit_type),
            nuh_temporal_id_plus1 - 1
        );

        Ok(Self {
            byte_offset,
            forbidden_zero_bit,
            nal_unit_type,
            nuh_layer_id,
            nuh_temporal_id_plus1,
        })
    }

    pub fn unit_type(&self) -> H265NalUnitType {
        self.nal_unit_type.into()
    }

    pub fn temporal_id(&self) -> u8 {
        self.nuh_temporal_id_plus1.saturating_sub(1)
    }

    pub fn description(&self) -> &'static str {
        nal_type_description(self.nal_unit_type)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn vps_header() {
        let data = [0x40, 0x01, 0x0C];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let nal = H265NalUnit::read(&mut bs).unwrap();

        assert_eq!(nal.nal_unit_type, 32);
        assert_eq!(nal.unit_type(), H265NalUnitType::Vps);
        assert_eq!(nal.nuh_layer_id, 0);
        assert_eq!(nal.temporal_id(), 0);
        assert_eq!(bs.bit_cursor(), 16);
    }

    #[test]
    fn idr_slice_header() {
        let data = [0x26, 0x01];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let nal = H265NalUnit::read(&mut bs).unwrap();

        assert!(nal.unit_type().is_idr());
        assert!(nal.unit_type().is_irap());
        assert!(nal.unit_type().is_vcl());
        assert_eq!(nal.description(), "Coded slice segment of an IDR picture (IDR_W_RADL)");
    }

    #[test]
    fn zero_temporal_id() {
        let data = [0x40, 0x00];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = H265NalUnit::read(&mut bs).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<NaluError>(),
            Some(NaluError::ZeroTemporalId(0))
        ));
    }

    #[test]
    fn type_classes() {
        assert!(H265NalUnitType::from(23).is_irap());
        assert!(H265NalUnitType::from(30).is_vcl());
        assert!(!H265NalUnitType::from(39).is_vcl());
        assert!(H265NalUnitType::from(34).is_parameter_set());
        assert_eq!(nal_type_description(50), "Unspecified");
        assert_eq!(nal_type_description(64), "Unknown");
    }
}
