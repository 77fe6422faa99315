//! H.264 NAL unit header, clause 7.3.1, with the SVC (Annex G), MVC
//! (Annex H) and 3D-AVC (Annex J) header extensions.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::trace;

use crate::bitstream::{Bitstream, ByteSource};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::errors::NaluError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264NalUnitType {
    Unspecified(u8),
    Slice,
    SliceDataA,
    SliceDataB,
    SliceDataC,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    SpsExtension,
    PrefixNal,
    SubsetSps,
    DepthParameterSet,
    AuxiliarySlice,
    SliceExtension,
    SliceExtensionDepth,
    Reserved(u8),
}

impl From<u8> for H264NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Slice,
            2 => Self::SliceDataA,
            3 => Self::SliceDataB,
            4 => Self::SliceDataC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::PrefixNal,
            15 => Self::SubsetSps,
            16 => Self::DepthParameterSet,
            19 => Self::AuxiliarySlice,
            20 => Self::SliceExtension,
            21 => Self::SliceExtensionDepth,
            17 | 18 | 22 | 23 => Self::Reserved(value),
            _ => Self::Unspecified(value),
        }
    }
}

impl H264NalUnitType {
    pub fn is_vcl(self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDataA | Self::SliceDataB | Self::SliceDataC | Self::IdrSlice
        )
    }

    pub fn is_idr(self) -> bool {
        self == Self::IdrSlice
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(
            self,
            Self::Sps | Self::Pps | Self::SpsExtension | Self::SubsetSps | Self::DepthParameterSet
        )
    }
}

/// Human readable name of `nal_unit_type`, Table 7-1.
pub fn nal_type_description(nal_unit_type: u8) -> &'static str {
    match nal_unit_type {
        0 | 24..=31 => "Unspecified",
        1 => "Coded slice of a non-IDR picture",
        2 => "Coded slice data partition A",
        3 => "Coded slice data partition B",
        4 => "Coded slice data partition C",
        5 => "Coded slice of an IDR picture",
        6 => "Supplemental enhancement information (SEI)",
        7 => "Sequence parameter set",
        8 => "Picture parameter set",
        9 => "Access unit delimiter",
        10 => "End of sequence",
        11 => "End of stream",
        12 => "Filler data",
        13 => "Sequence parameter set extension",
        14 => "Prefix NAL unit",
        15 => "Subset sequence parameter set",
        16 => "Depth parameter set",
        17 | 18 | 22 | 23 => "Reserved",
        19 => "Coded slice of an auxiliary coded picture without partitioning",
        20 => "Coded slice extension",
        21 => "Coded slice extension for a depth view component or a 3D-AVC texture view component",
        _ => "Unknown",
    }
}

/// nal_unit_header_svc_extension(), G.7.3.1.1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SvcExtension {
    pub idr_flag: bool,
    pub priority_id: u8,
    pub no_inter_layer_pred_flag: bool,
    pub dependency_id: u8,
    pub quality_id: u8,
    pub temporal_id: u8,
    pub use_ref_base_pic_flag: bool,
    pub discardable_flag: bool,
    pub output_flag: bool,
    pub reserved_three_2bits: u8,
}

impl SvcExtension {
    fn read<S: ByteSource>(options: &ParseOptions, bs: &mut Bitstream<S>) -> Result<Self> {
        let ext = Self {
            idr_flag: bs.read_bit()?,
            priority_id: bs.read_bits(6)? as u8,
            no_inter_layer_pred_flag: bs.read_bit()?,
            dependency_id: bs.read_bits(3)? as u8,
            quality_id: bs.read_bits(4)? as u8,
            temporal_id: bs.read_bits(3)? as u8,
            use_ref_base_pic_flag: bs.read_bit()?,
            discardable_flag: bs.read_bit()?,
            output_flag: bs.read_bit()?,
            reserved_three_2bits: bs.read_bits(2)? as u8,
        };

        if ext.reserved_three_2bits != 3 {
            log_or_err!(
                options,
                Warn,
                anyhow!(NaluError::SvcReservedBits(ext.reserved_three_2bits))
            );
        }

        Ok(ext)
    }
}

/// nal_unit_header_3davc_extension(), J.7.3.1.1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Avc3dExtension {
    pub view_idx: u8,
    pub depth_flag: bool,
    pub non_idr_flag: bool,
    pub temporal_id: u8,
    pub anchor_pic_flag: bool,
    pub inter_view_flag: bool,
}

impl Avc3dExtension {
    fn read<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<Self> {
        Ok(Self {
            view_idx: bs.read_bits(8)? as u8,
            depth_flag: bs.read_bit()?,
            non_idr_flag: bs.read_bit()?,
            temporal_id: bs.read_bits(3)? as u8,
            anchor_pic_flag: bs.read_bit()?,
            inter_view_flag: bs.read_bit()?,
        })
    }
}

/// nal_unit_header_mvc_extension(), H.7.3.1.1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MvcExtension {
    pub non_idr_flag: bool,
    pub priority_id: u8,
    pub view_id: u16,
    pub temporal_id: u8,
    pub anchor_pic_flag: bool,
    pub inter_view_flag: bool,
    pub reserved_one_bit: bool,
}

impl MvcExtension {
    fn read<S: ByteSource>(options: &ParseOptions, bs: &mut Bitstream<S>) -> Result<Self> {
        let ext = Self {
            non_idr_flag: bs.read_bit()?,
            priority_id: bs.read_bits(6)? as u8,
            view_id: bs.read_bits(10)? as u16,
            temporal_id: bs.read_bits(3)? as u8,
            anchor_pic_flag: bs.read_bit()?,
            inter_view_flag: bs.read_bit()?,
            reserved_one_bit: bs.read_bit()?,
        };

        if !ext.reserved_one_bit {
            log_or_err!(options, Warn, anyhow!(NaluError::MvcReservedBit));
        }

        Ok(ext)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalExtension {
    Svc(SvcExtension),
    Avc3d(Avc3dExtension),
    Mvc(MvcExtension),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct H264NalUnit {
    pub byte_offset: u64,
    pub forbidden_zero_bit: bool,
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
    pub extension: Option<NalExtension>,
}

impl H264NalUnit {
    pub fn read<S: ByteSource>(options: &ParseOptions, bs: &mut Bitstream<S>) -> Result<Self> {
        let byte_offset = bs.absolute_byte_offset();

        let forbidden_zero_bit = bs.read_bit()?;
        if forbidden_zero_bit {
            bail!(NaluError::ForbiddenBitSet(byte_offset));
        }

        let nal_ref_idc = bs.read_bits(2)? as u8;
        let nal_unit_type = bs.read_bits(5)? as u8;

        let extension = match nal_unit_type {
            14 | 20 => {
                if bs.read_bit()? {
                    Some(NalExtension::Svc(SvcExtension::read(options, bs)?))
                } else {
                    Some(NalExtension::Mvc(MvcExtension::read(options, bs)?))
                }
            }
            21 => {
                if bs.read_bit()? {
                    Some(NalExtension::Avc3d(Avc3dExtension::read(bs)?))
                } else {
                    Some(NalExtension::Mvc(MvcExtension::read(options, bs)?))
                }
            }
            _ => None,
        };

        trace!(
            "NAL @{byte_offset}: type {nal_unit_type} ({}), ref_idc {nal_ref_idc}",
            nal_type_description(nal_unit_type)
        );

        Ok(Self {
            byte_offset,
            forbidden_zero_bit,
            nal_ref_idc,
            nal_unit_type,
            extension,
        })
    }

    pub fn unit_type(&self) -> H264NalUnitType {
        self.nal_unit_type.into()
    }

    pub fn description(&self) -> &'static str {
        nal_type_description(self.nal_unit_type)
    }

    /// Header length in bytes, extension included.
    pub fn header_size(&self) -> usize {
        match self.extension {
            None => 1,
            Some(NalExtension::Avc3d(_)) => 3,
            Some(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    #[test]
    fn plain_sps_header() {
        let data = [0x67, 0x42];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let nal = H264NalUnit::read(&ParseOptions::default(), &mut bs).unwrap();

        assert_eq!(nal.nal_ref_idc, 3);
        assert_eq!(nal.nal_unit_type, 7);
        assert_eq!(nal.unit_type(), H264NalUnitType::Sps);
        assert!(nal.extension.is_none());
        assert_eq!(bs.byte_cursor(), 1);
    }

    #[test]
    fn svc_prefix_extension() {
        let data = BitBuilder::new()
            .pattern("0 11 01110")
            .flag(true) // svc_extension_flag
            .flag(true) // idr_flag
            .bits(6, 21)
            .flag(false)
            .bits(3, 5)
            .bits(4, 9)
            .bits(3, 2)
            .flag(true)
            .flag(false)
            .flag(true)
            .bits(2, 3)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let nal = H264NalUnit::read(&ParseOptions::default(), &mut bs).unwrap();

        assert_eq!(nal.nal_unit_type, 14);
        assert_eq!(nal.header_size(), 4);
        let Some(NalExtension::Svc(svc)) = nal.extension else {
            panic!("expected SVC extension, got {:?}", nal.extension);
        };
        assert!(svc.idr_flag);
        assert_eq!(svc.priority_id, 21);
        assert_eq!(svc.dependency_id, 5);
        assert_eq!(svc.quality_id, 9);
        assert_eq!(svc.temporal_id, 2);
        assert!(svc.use_ref_base_pic_flag && !svc.discardable_flag && svc.output_flag);
        assert_eq!(bs.absolute_byte_offset(), 4);
    }

    #[test]
    fn mvc_reserved_bit_policy() {
        let data = BitBuilder::new()
            .pattern("0 01 10100")
            .flag(false) // svc_extension_flag
            .flag(true)
            .bits(6, 0)
            .bits(10, 513)
            .bits(3, 1)
            .flag(false)
            .flag(true)
            .flag(false) // reserved_one_bit
            .finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let nal = H264NalUnit::read(&ParseOptions::default(), &mut bs).unwrap();
        let Some(NalExtension::Mvc(mvc)) = nal.extension else {
            panic!("expected MVC extension");
        };
        assert_eq!(mvc.view_id, 513);

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = H264NalUnit::read(&ParseOptions::strict(), &mut bs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NaluError>(),
            Some(NaluError::MvcReservedBit)
        ));
    }

    #[test]
    fn avc3d_extension() {
        let data = BitBuilder::new()
            .pattern("0 11 10101")
            .flag(true)
            .bits(8, 7)
            .flag(true)
            .flag(false)
            .bits(3, 4)
            .flag(true)
            .flag(true)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let nal = H264NalUnit::read(&ParseOptions::default(), &mut bs).unwrap();

        assert_eq!(
            nal.extension,
            Some(NalExtension::Avc3d(Avc3dExtension {
                view_idx: 7,
                depth_flag: true,
                non_idr_flag: false,
                temporal_id: 4,
                anchor_pic_flag: true,
                inter_view_flag: true,
            }))
        );
    }

    #[test]
    fn forbidden_bit_rejected() {
        let data = [0xE7];
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = H264NalUnit::read(&ParseOptions::default(), &mut bs).unwrap_err();
        assert!(err.downcast_ref::<NaluError>().is_some());
    }

    #[test]
    fn descriptions() {
        assert_eq!(nal_type_description(5), "Coded slice of an IDR picture");
        assert_eq!(nal_type_description(18), "Reserved");
        assert_eq!(nal_type_description(40), "Unknown");
    }
}
