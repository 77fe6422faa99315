//! Leading fields of slice_segment_header(), clause 7.3.6.1, up to
//! slice_pic_order_cnt_lsb.

use std::fmt::Display;

use anyhow::{Result, bail};
use log::trace;

use super::nalu::H265NalUnit;
use super::pps::H265Pps;
use super::sps::H265Sps;
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::expgolomb::read_ue;
use crate::codec::{ceil_log2, check_range};
use crate::utils::errors::ParameterSetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H265SliceType {
    B,
    P,
    I,
}

impl H265SliceType {
    pub fn from_slice_type(slice_type: u32) -> Result<Self> {
        Ok(match slice_type {
            0 => Self::B,
            1 => Self::P,
            2 => Self::I,
            _ => bail!(ParameterSetError::InvalidSliceType(slice_type)),
        })
    }
}

impl Display for H265SliceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            H265SliceType::B => "B",
            H265SliceType::P => "P",
            H265SliceType::I => "I",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H265SliceHeader {
    pub first_slice_segment_in_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    pub slice_pic_parameter_set_id: u32,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,
    /// Inherited from the preceding independent segment when dependent.
    pub slice_type: Option<H265SliceType>,
    pub pic_output_flag: bool,
    pub colour_plane_id: u8,
    pub slice_pic_order_cnt_lsb: u32,
}

impl H265SliceHeader {
    pub fn read<S: ByteSource>(
        bs: &mut Bitstream<S>,
        nal: &H265NalUnit,
        sps_list: &[Option<H265Sps>],
        pps_list: &[Option<H265Pps>],
    ) -> Result<Self> {
        let first_slice_segment_in_pic_flag = bs.read_bit()?;
        let nal_type = nal.unit_type();
        let no_output_of_prior_pics_flag = nal_type.is_irap() && bs.read_bit()?;

        let slice_pic_parameter_set_id = read_ue(bs)?;
        let Some(pps) = pps_list
            .get(slice_pic_parameter_set_id as usize)
            .and_then(Option::as_ref)
        else {
            bail!(ParameterSetError::MissingReference {
                kind: "pic_parameter_set",
                id: slice_pic_parameter_set_id,
            });
        };
        let Some(sps) = sps_list
            .get(pps.pps_seq_parameter_set_id as usize)
            .and_then(Option::as_ref)
        else {
            bail!(ParameterSetError::MissingReference {
                kind: "seq_parameter_set",
                id: pps.pps_seq_parameter_set_id,
            });
        };

        let mut sh = Self {
            first_slice_segment_in_pic_flag,
            no_output_of_prior_pics_flag,
            slice_pic_parameter_set_id,
            dependent_slice_segment_flag: false,
            slice_segment_address: 0,
            slice_type: None,
            pic_output_flag: true,
            colour_plane_id: 0,
            slice_pic_order_cnt_lsb: 0,
        };

        if !first_slice_segment_in_pic_flag {
            if pps.dependent_slice_segments_enabled_flag {
                sh.dependent_slice_segment_flag = bs.read_bit()?;
            }
            let pic_size_in_ctbs = sps.pic_width_in_ctbs() * sps.pic_height_in_ctbs();
            sh.slice_segment_address = bs.read_bits(ceil_log2(pic_size_in_ctbs))?;
            check_range(
                "slice_segment_address",
                sh.slice_segment_address as i64,
                1,
                pic_size_in_ctbs as i64 - 1,
            )?;
        }

        if !sh.dependent_slice_segment_flag {
            bs.skip_bits(pps.num_extra_slice_header_bits as u64)?;
            sh.slice_type = Some(H265SliceType::from_slice_type(read_ue(bs)?)?);
            if pps.output_flag_present_flag {
                sh.pic_output_flag = bs.read_bit()?;
            }
            if sps.separate_colour_plane_flag {
                sh.colour_plane_id = bs.read_bits(2)? as u8;
            }
            if !nal_type.is_idr() {
                sh.slice_pic_order_cnt_lsb = bs.read_bits(sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?;
            }
        }

        trace!(
            "slice segment: first {}, address {}, type {}, poc lsb {}",
            sh.first_slice_segment_in_pic_flag,
            sh.slice_segment_address,
            sh.slice_type.map_or_else(|| "-".to_string(), |t| t.to_string()),
            sh.slice_pic_order_cnt_lsb
        );

        Ok(sh)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::h265::sps::tests::main_1080p_sps;
    use crate::utils::bit_writer::BitBuilder;

    fn context() -> (Vec<Option<H265Sps>>, Vec<Option<H265Pps>>) {
        let data = main_1080p_sps();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sps = H265Sps::read(&mut bs).unwrap();
        let pps = H265Pps {
            dependent_slice_segments_enabled_flag: true,
            num_extra_slice_header_bits: 1,
            ..Default::default()
        };
        (vec![Some(sps)], vec![Some(pps)])
    }

    fn nal(nal_unit_type: u8) -> H265NalUnit {
        H265NalUnit {
            nal_unit_type,
            nuh_temporal_id_plus1: 1,
            ..Default::default()
        }
    }

    #[test]
    fn idr_first_segment() {
        let (sps, pps) = context();
        let data = BitBuilder::new()
            .flag(true)
            .flag(false) // no_output_of_prior_pics_flag
            .ue(0)
            .flag(false) // slice_reserved_flag
            .ue(2)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sh = H265SliceHeader::read(&mut bs, &nal(19), &sps, &pps).unwrap();

        assert!(sh.first_slice_segment_in_pic_flag);
        assert_eq!(sh.slice_type, Some(H265SliceType::I));
        assert_eq!(sh.slice_pic_order_cnt_lsb, 0);
    }

    #[test]
    fn dependent_segment() {
        let (sps, pps) = context();
        // 30x17 CTBs need a 9-bit address
        let data = BitBuilder::new().flag(false).ue(0).flag(true).bits(9, 255).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sh = H265SliceHeader::read(&mut bs, &nal(1), &sps, &pps).unwrap();

        assert!(sh.dependent_slice_segment_flag);
        assert_eq!(sh.slice_segment_address, 255);
        assert_eq!(sh.slice_type, None);
    }

    #[test]
    fn trailing_picture_reads_poc() {
        let (sps, pps) = context();
        let data = BitBuilder::new()
            .flag(true)
            .ue(0)
            .flag(false)
            .ue(1)
            .bits(8, 17)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sh = H265SliceHeader::read(&mut bs, &nal(1), &sps, &pps).unwrap();

        assert_eq!(sh.slice_type, Some(H265SliceType::P));
        assert_eq!(sh.slice_pic_order_cnt_lsb, 17);
    }

    #[test]
    fn missing_pps() {
        let (sps, _) = context();
        let data = BitBuilder::new().flag(true).ue(3).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = H265SliceHeader::read(&mut bs, &nal(1), &sps, &[]).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParameterSetError>(),
            Some(ParameterSetError::MissingReference { id: 3, .. })
        ));
    }
}
