//! Slice header, clause 7.3.3, and the access unit delimiter.

use std::fmt::Display;

use anyhow::{Result, bail};
use log::trace;

use super::nalu::H264NalUnit;
use super::pps::{H264Pps, SliceGroupMap};
use super::sps::H264Sps;
use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::expgolomb::{read_se, read_ue};
use crate::codec::{ceil_log2, check_range};
use crate::utils::errors::ParameterSetError;

/// Upper bound on memory_management_control_operation entries per slice.
const MAX_MMCO_COUNT: usize = 66;

/// Upper bound on ref_pic_list_modification entries per list.
const MAX_MODIFICATION_COUNT: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    pub fn from_slice_type(slice_type: u32) -> Result<Self> {
        Ok(match slice_type % 5 {
            0 if slice_type <= 9 => Self::P,
            1 if slice_type <= 9 => Self::B,
            2 if slice_type <= 9 => Self::I,
            3 if slice_type <= 9 => Self::Sp,
            4 if slice_type <= 9 => Self::Si,
            _ => bail!(ParameterSetError::InvalidSliceType(slice_type)),
        })
    }

    pub fn is_intra(self) -> bool {
        matches!(self, Self::I | Self::Si)
    }
}

impl Display for SliceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SliceType::P => "P",
            SliceType::B => "B",
            SliceType::I => "I",
            SliceType::Sp => "SP",
            SliceType::Si => "SI",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefPicListModification {
    pub modification_of_pic_nums_idc: u32,
    /// abs_diff_pic_num_minus1, long_term_pic_num or abs_diff_view_idx_minus1
    /// depending on the idc.
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightEntry {
    pub luma_weight: Option<(i32, i32)>,
    pub chroma_weight: Option<[(i32, i32); 2]>,
}

/// pred_weight_table(), clause 7.3.3.2
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub chroma_log2_weight_denom: u32,
    pub l0: Vec<WeightEntry>,
    pub l1: Vec<WeightEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryManagementOperation {
    pub memory_management_control_operation: u32,
    pub difference_of_pic_nums_minus1: u32,
    pub long_term_pic_num: u32,
    pub long_term_frame_idx: u32,
    pub max_long_term_frame_idx_plus1: u32,
}

/// dec_ref_pic_marking(), clause 7.3.3.3
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecRefPicMarking {
    pub no_output_of_prior_pics_flag: bool,
    pub long_term_reference_flag: bool,
    pub adaptive_ref_pic_marking_mode_flag: bool,
    pub operations: Vec<MemoryManagementOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H264SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub pic_parameter_set_id: u32,
    pub colour_plane_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    pub redundant_pic_cnt: u32,
    pub direct_spatial_mv_pred_flag: bool,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_modification_l0: Vec<RefPicListModification>,
    pub ref_pic_list_modification_l1: Vec<RefPicListModification>,
    pub pred_weight_table: Option<PredWeightTable>,
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
    pub cabac_init_idc: u32,
    pub slice_qp_delta: i32,
    pub sp_for_switch_flag: bool,
    pub slice_qs_delta: i32,
    pub disable_deblocking_filter_idc: u32,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,
    pub slice_group_change_cycle: u32,
}

impl H264SliceHeader {
    /// Reads only first_mb_in_slice, slice_type and pic_parameter_set_id.
    pub fn peek_pps_id<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<u32> {
        let start = bs.absolute_bit_offset();
        read_ue(bs)?;
        read_ue(bs)?;
        let pps_id = read_ue(bs)?;
        bs.rewind_bits(bs.absolute_bit_offset() - start)?;

        Ok(pps_id)
    }

    /// slice_header(), starting after the NAL unit header.
    pub fn read<S: ByteSource>(
        bs: &mut Bitstream<S>,
        nal: &H264NalUnit,
        sps_list: &[Option<H264Sps>],
        pps_list: &[Option<H264Pps>],
    ) -> Result<Self> {
        let first_mb_in_slice = read_ue(bs)?;
        let slice_type = read_ue(bs)?;
        let kind = SliceType::from_slice_type(slice_type)?;
        let pic_parameter_set_id = read_ue(bs)?;

        let Some(pps) = pps_list
            .get(pic_parameter_set_id as usize)
            .and_then(Option::as_ref)
        else {
            bail!(ParameterSetError::MissingReference {
                kind: "pic_parameter_set",
                id: pic_parameter_set_id,
            });
        };

        let Some(sps) = sps_list
            .get(pps.seq_parameter_set_id as usize)
            .and_then(Option::as_ref)
        else {
            bail!(ParameterSetError::MissingReference {
                kind: "seq_parameter_set",
                id: pps.seq_parameter_set_id,
            });
        };

        let idr_pic_flag = nal.unit_type().is_idr();

        let mut sh = Self {
            first_mb_in_slice,
            slice_type,
            pic_parameter_set_id,
            colour_plane_id: 0,
            frame_num: 0,
            field_pic_flag: false,
            bottom_field_flag: false,
            idr_pic_id: 0,
            pic_order_cnt_lsb: 0,
            delta_pic_order_cnt_bottom: 0,
            delta_pic_order_cnt: [0; 2],
            redundant_pic_cnt: 0,
            direct_spatial_mv_pred_flag: false,
            num_ref_idx_active_override_flag: false,
            num_ref_idx_l0_active_minus1: pps.num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_active_minus1: pps.num_ref_idx_l1_default_active_minus1,
            ref_pic_list_modification_l0: Vec::new(),
            ref_pic_list_modification_l1: Vec::new(),
            pred_weight_table: None,
            dec_ref_pic_marking: None,
            cabac_init_idc: 0,
            slice_qp_delta: 0,
            sp_for_switch_flag: false,
            slice_qs_delta: 0,
            disable_deblocking_filter_idc: 0,
            slice_alpha_c0_offset_div2: 0,
            slice_beta_offset_div2: 0,
            slice_group_change_cycle: 0,
        };

        if sps.separate_colour_plane_flag {
            sh.colour_plane_id = bs.read_bits(2)? as u8;
        }

        sh.frame_num = bs.read_bits(sps.log2_max_frame_num_minus4 + 4)?;

        if !sps.frame_mbs_only_flag {
            sh.field_pic_flag = bs.read_bit()?;
            if sh.field_pic_flag {
                sh.bottom_field_flag = bs.read_bit()?;
            }
        }

        if idr_pic_flag {
            sh.idr_pic_id = read_ue(bs)?;
            check_range("idr_pic_id", sh.idr_pic_id as i64, 0, 65535)?;
        }

        if sps.pic_order_cnt_type == 0 {
            sh.pic_order_cnt_lsb = bs.read_bits(sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?;
            if pps.bottom_field_pic_order_in_frame_present_flag && !sh.field_pic_flag {
                sh.delta_pic_order_cnt_bottom = read_se(bs)?;
            }
        }

        if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
            sh.delta_pic_order_cnt[0] = read_se(bs)?;
            if pps.bottom_field_pic_order_in_frame_present_flag && !sh.field_pic_flag {
                sh.delta_pic_order_cnt[1] = read_se(bs)?;
            }
        }

        if pps.redundant_pic_cnt_present_flag {
            sh.redundant_pic_cnt = read_ue(bs)?;
        }

        if kind == SliceType::B {
            sh.direct_spatial_mv_pred_flag = bs.read_bit()?;
        }

        if matches!(kind, SliceType::P | SliceType::Sp | SliceType::B) {
            sh.num_ref_idx_active_override_flag = bs.read_bit()?;
            if sh.num_ref_idx_active_override_flag {
                sh.num_ref_idx_l0_active_minus1 = read_ue(bs)?;
                if kind == SliceType::B {
                    sh.num_ref_idx_l1_active_minus1 = read_ue(bs)?;
                }
            }
        }

        let max_ref_idx = if sh.field_pic_flag { 31 } else { 15 };
        check_range(
            "num_ref_idx_l0_active_minus1",
            sh.num_ref_idx_l0_active_minus1 as i64,
            0,
            max_ref_idx,
        )?;
        check_range(
            "num_ref_idx_l1_active_minus1",
            sh.num_ref_idx_l1_active_minus1 as i64,
            0,
            max_ref_idx,
        )?;

        if !kind.is_intra() {
            sh.ref_pic_list_modification_l0 = read_ref_pic_list_modification(bs)?;
        }
        if kind == SliceType::B {
            sh.ref_pic_list_modification_l1 = read_ref_pic_list_modification(bs)?;
        }

        if (pps.weighted_pred_flag && matches!(kind, SliceType::P | SliceType::Sp))
            || (pps.weighted_bipred_idc == 1 && kind == SliceType::B)
        {
            sh.pred_weight_table = Some(sh.read_pred_weight_table(bs, sps, kind)?);
        }

        if nal.nal_ref_idc != 0 {
            sh.dec_ref_pic_marking = Some(read_dec_ref_pic_marking(bs, idr_pic_flag)?);
        }

        if pps.entropy_coding_mode_flag && !kind.is_intra() {
            sh.cabac_init_idc = read_ue(bs)?;
            check_range("cabac_init_idc", sh.cabac_init_idc as i64, 0, 2)?;
        }

        sh.slice_qp_delta = read_se(bs)?;

        if matches!(kind, SliceType::Sp | SliceType::Si) {
            if kind == SliceType::Sp {
                sh.sp_for_switch_flag = bs.read_bit()?;
            }
            sh.slice_qs_delta = read_se(bs)?;
        }

        if pps.deblocking_filter_control_present_flag {
            sh.disable_deblocking_filter_idc = read_ue(bs)?;
            check_range(
                "disable_deblocking_filter_idc",
                sh.disable_deblocking_filter_idc as i64,
                0,
                2,
            )?;
            if sh.disable_deblocking_filter_idc != 1 {
                sh.slice_alpha_c0_offset_div2 = read_se(bs)?;
                sh.slice_beta_offset_div2 = read_se(bs)?;
            }
        }

        if pps.num_slice_groups_minus1 > 0
            && matches!(pps.slice_group_map, SliceGroupMap::Changing { .. })
        {
            let rate = pps.slice_group_change_rate().unwrap_or(1);
            let bits = ceil_log2(sps.pic_size_in_map_units() / rate + 1);
            sh.slice_group_change_cycle = bs.read_bits(bits)?;
        }

        trace!(
            "slice {kind} frame_num {} first_mb {} pps {}",
            sh.frame_num, sh.first_mb_in_slice, sh.pic_parameter_set_id
        );

        Ok(sh)
    }

    pub fn kind(&self) -> SliceType {
        // validated on read
        SliceType::from_slice_type(self.slice_type).unwrap_or(SliceType::I)
    }

    fn read_pred_weight_table<S: ByteSource>(
        &self,
        bs: &mut Bitstream<S>,
        sps: &H264Sps,
        kind: SliceType,
    ) -> Result<PredWeightTable> {
        let chroma = sps.chroma_array_type() != 0;

        let mut table = PredWeightTable {
            luma_log2_weight_denom: read_ue(bs)?,
            ..Default::default()
        };
        check_range("luma_log2_weight_denom", table.luma_log2_weight_denom as i64, 0, 7)?;

        if chroma {
            table.chroma_log2_weight_denom = read_ue(bs)?;
            check_range(
                "chroma_log2_weight_denom",
                table.chroma_log2_weight_denom as i64,
                0,
                7,
            )?;
        }

        table.l0 = read_weights(bs, self.num_ref_idx_l0_active_minus1, chroma)?;
        if kind == SliceType::B {
            table.l1 = read_weights(bs, self.num_ref_idx_l1_active_minus1, chroma)?;
        }

        Ok(table)
    }
}

fn read_weights<S: ByteSource>(
    bs: &mut Bitstream<S>,
    num_ref_idx_active_minus1: u32,
    chroma: bool,
) -> Result<Vec<WeightEntry>> {
    let mut entries = Vec::with_capacity(num_ref_idx_active_minus1 as usize + 1);

    for _ in 0..=num_ref_idx_active_minus1 {
        let mut entry = WeightEntry::default();

        if bs.read_bit()? {
            entry.luma_weight = Some((read_se(bs)?, read_se(bs)?));
        }

        if chroma && bs.read_bit()? {
            let mut weights = [(0, 0); 2];
            for weight in &mut weights {
                *weight = (read_se(bs)?, read_se(bs)?);
            }
            entry.chroma_weight = Some(weights);
        }

        entries.push(entry);
    }

    Ok(entries)
}

/// ref_pic_list_modification() for one list, including the MVC view index
/// operations.
fn read_ref_pic_list_modification<S: ByteSource>(
    bs: &mut Bitstream<S>,
) -> Result<Vec<RefPicListModification>> {
    let mut modifications = Vec::new();

    if !bs.read_bit()? {
        return Ok(modifications);
    }

    loop {
        let modification_of_pic_nums_idc = read_ue(bs)?;
        if modification_of_pic_nums_idc == 3 {
            break;
        }

        check_range(
            "modification_of_pic_nums_idc",
            modification_of_pic_nums_idc as i64,
            0,
            5,
        )?;

        if modifications.len() >= MAX_MODIFICATION_COUNT {
            bail!(ParameterSetError::ValueOutOfRange {
                field: "ref_pic_list_modification count",
                value: modifications.len() as i64 + 1,
                min: 0,
                max: MAX_MODIFICATION_COUNT as i64,
            });
        }

        modifications.push(RefPicListModification {
            modification_of_pic_nums_idc,
            value: read_ue(bs)?,
        });
    }

    Ok(modifications)
}

fn read_dec_ref_pic_marking<S: ByteSource>(
    bs: &mut Bitstream<S>,
    idr_pic_flag: bool,
) -> Result<DecRefPicMarking> {
    let mut marking = DecRefPicMarking::default();

    if idr_pic_flag {
        marking.no_output_of_prior_pics_flag = bs.read_bit()?;
        marking.long_term_reference_flag = bs.read_bit()?;
        return Ok(marking);
    }

    marking.adaptive_ref_pic_marking_mode_flag = bs.read_bit()?;
    if !marking.adaptive_ref_pic_marking_mode_flag {
        return Ok(marking);
    }

    loop {
        let mmco = read_ue(bs)?;
        if mmco == 0 {
            break;
        }

        check_range("memory_management_control_operation", mmco as i64, 0, 6)?;

        if marking.operations.len() >= MAX_MMCO_COUNT {
            bail!(ParameterSetError::ValueOutOfRange {
                field: "memory_management_control_operation count",
                value: marking.operations.len() as i64 + 1,
                min: 0,
                max: MAX_MMCO_COUNT as i64,
            });
        }

        let mut op = MemoryManagementOperation {
            memory_management_control_operation: mmco,
            difference_of_pic_nums_minus1: 0,
            long_term_pic_num: 0,
            long_term_frame_idx: 0,
            max_long_term_frame_idx_plus1: 0,
        };

        if mmco == 1 || mmco == 3 {
            op.difference_of_pic_nums_minus1 = read_ue(bs)?;
        }
        if mmco == 2 {
            op.long_term_pic_num = read_ue(bs)?;
        }
        if mmco == 3 || mmco == 6 {
            op.long_term_frame_idx = read_ue(bs)?;
        }
        if mmco == 4 {
            op.max_long_term_frame_idx_plus1 = read_ue(bs)?;
        }

        marking.operations.push(op);
    }

    Ok(marking)
}

/// access_unit_delimiter_rbsp(), clause 7.3.2.4. Returns primary_pic_type.
pub fn read_access_unit_delimiter<S: ByteSource>(bs: &mut Bitstream<S>) -> Result<u8> {
    Ok(bs.read_bits(3)? as u8)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    fn parameter_sets() -> (Vec<Option<H264Sps>>, Vec<Option<H264Pps>>) {
        let sps = H264Sps {
            log2_max_frame_num_minus4: 0,
            pic_order_cnt_type: 0,
            log2_max_pic_order_cnt_lsb_minus4: 2,
            frame_mbs_only_flag: true,
            chroma_format_idc: 1,
            pic_width_in_mbs_minus1: 19,
            pic_height_in_map_units_minus1: 14,
            ..Default::default()
        };
        let pps = H264Pps {
            deblocking_filter_control_present_flag: true,
            num_ref_idx_l0_default_active_minus1: 0,
            ..Default::default()
        };

        let mut sps_list = vec![None; 32];
        sps_list[0] = Some(sps);
        let mut pps_list = vec![None; 256];
        pps_list[0] = Some(pps);

        (sps_list, pps_list)
    }

    #[test]
    fn idr_slice_header() {
        let (sps_list, pps_list) = parameter_sets();
        let nal = H264NalUnit {
            nal_ref_idc: 3,
            nal_unit_type: 5,
            ..Default::default()
        };

        let data = BitBuilder::new()
            .ue(0)
            .ue(7) // I, all slices of the picture
            .ue(0)
            .bits(4, 0) // frame_num
            .ue(1) // idr_pic_id
            .bits(6, 0) // pic_order_cnt_lsb
            .flag(false) // no_output_of_prior_pics_flag
            .flag(false)
            .se(-4)
            .ue(0)
            .se(1)
            .se(-1)
            .trailing()
            .finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let sh = H264SliceHeader::read(&mut bs, &nal, &sps_list, &pps_list).unwrap();

        assert_eq!(sh.kind(), SliceType::I);
        assert_eq!(sh.idr_pic_id, 1);
        assert_eq!(sh.slice_qp_delta, -4);
        assert_eq!(sh.slice_alpha_c0_offset_div2, 1);
        assert_eq!(sh.slice_beta_offset_div2, -1);
        assert!(sh.dec_ref_pic_marking.is_some());
    }

    #[test]
    fn p_slice_with_mmco() {
        let (sps_list, pps_list) = parameter_sets();
        let nal = H264NalUnit {
            nal_ref_idc: 2,
            nal_unit_type: 1,
            ..Default::default()
        };

        let data = BitBuilder::new()
            .ue(30)
            .ue(0) // P
            .ue(0)
            .bits(4, 9)
            .bits(6, 18)
            .flag(true) // num_ref_idx_active_override_flag
            .ue(1)
            .flag(true) // ref_pic_list_modification_flag_l0
            .ue(0)
            .ue(2)
            .ue(3)
            .flag(true) // adaptive_ref_pic_marking_mode_flag
            .ue(1)
            .ue(0)
            .ue(0)
            .se(2)
            .ue(1)
            .trailing()
            .finish();

        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        assert_eq!(H264SliceHeader::peek_pps_id(&mut bs).unwrap(), 0);
        assert_eq!(bs.absolute_bit_offset(), 0);

        let sh = H264SliceHeader::read(&mut bs, &nal, &sps_list, &pps_list).unwrap();
        assert_eq!(sh.kind(), SliceType::P);
        assert_eq!(sh.frame_num, 9);
        assert_eq!(sh.pic_order_cnt_lsb, 18);
        assert_eq!(sh.num_ref_idx_l0_active_minus1, 1);
        assert_eq!(
            sh.ref_pic_list_modification_l0,
            [RefPicListModification {
                modification_of_pic_nums_idc: 0,
                value: 2
            }]
        );
        let marking = sh.dec_ref_pic_marking.unwrap();
        assert_eq!(marking.operations.len(), 1);
        assert_eq!(marking.operations[0].difference_of_pic_nums_minus1, 0);
        assert_eq!(sh.slice_qp_delta, 2);
        assert_eq!(sh.disable_deblocking_filter_idc, 1);
    }

    #[test]
    fn unknown_pps_is_error() {
        let (sps_list, pps_list) = parameter_sets();
        let data = BitBuilder::new().ue(0).ue(2).ue(9).bits(16, 0).finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();

        let err = H264SliceHeader::read(&mut bs, &H264NalUnit::default(), &sps_list, &pps_list)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParameterSetError>(),
            Some(ParameterSetError::MissingReference { id: 9, .. })
        ));
    }

    #[test]
    fn slice_type_range() {
        assert_eq!(SliceType::from_slice_type(6).unwrap(), SliceType::B);
        assert!(SliceType::from_slice_type(10).is_err());
    }
}
