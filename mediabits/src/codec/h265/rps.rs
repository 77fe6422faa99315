//! st_ref_pic_set(), clause 7.3.7, with the inter-RPS derivation of
//! clause 7.4.8.

use anyhow::{Result, bail};

use crate::bitstream::{Bitstream, ByteSource};
use crate::codec::check_range;
use crate::codec::expgolomb::read_ue;
use crate::utils::errors::ParameterSetError;

/// Upper bound on pictures in either half of a short-term RPS.
pub const MAX_DPB_SIZE: usize = 16;

/// Upper bound on num_short_term_ref_pic_sets.
pub const MAX_SHORT_TERM_RPS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortTermRps {
    pub inter_ref_pic_set_prediction_flag: bool,
    pub delta_idx_minus1: u32,
    pub delta_rps_sign: bool,
    pub abs_delta_rps_minus1: u32,

    pub delta_poc_s0: Vec<i32>,
    pub used_by_curr_pic_s0: Vec<bool>,
    pub delta_poc_s1: Vec<i32>,
    pub used_by_curr_pic_s1: Vec<bool>,
}

impl ShortTermRps {
    /// Reads set `st_rps_idx`. `previous` holds sets 0..st_rps_idx; an index
    /// equal to `num_short_term_ref_pic_sets` is the slice header's own set.
    pub fn read<S: ByteSource>(
        bs: &mut Bitstream<S>,
        st_rps_idx: usize,
        num_short_term_ref_pic_sets: usize,
        previous: &[ShortTermRps],
    ) -> Result<Self> {
        let mut rps = Self::default();

        if st_rps_idx != 0 {
            rps.inter_ref_pic_set_prediction_flag = bs.read_bit()?;
        }

        if rps.inter_ref_pic_set_prediction_flag {
            if st_rps_idx == num_short_term_ref_pic_sets {
                rps.delta_idx_minus1 = read_ue(bs)?;
            }
            rps.delta_rps_sign = bs.read_bit()?;
            rps.abs_delta_rps_minus1 = read_ue(bs)?;
            check_range("abs_delta_rps_minus1", rps.abs_delta_rps_minus1 as i64, 0, (1 << 15) - 1)?;

            let ref_rps_idx = st_rps_idx as i64 - (rps.delta_idx_minus1 as i64 + 1);
            let Some(reference) = usize::try_from(ref_rps_idx)
                .ok()
                .and_then(|idx| previous.get(idx))
            else {
                bail!(ParameterSetError::InvalidRpsReference {
                    index: st_rps_idx,
                    reference: ref_rps_idx,
                });
            };

            let num_delta_pocs = reference.num_delta_pocs();
            let mut used_by_curr_pic_flag = Vec::with_capacity(num_delta_pocs + 1);
            let mut use_delta_flag = Vec::with_capacity(num_delta_pocs + 1);
            for _ in 0..=num_delta_pocs {
                let used = bs.read_bit()?;
                used_by_curr_pic_flag.push(used);
                use_delta_flag.push(if used { true } else { bs.read_bit()? });
            }

            let delta_rps = (1 - 2 * rps.delta_rps_sign as i32) * (rps.abs_delta_rps_minus1 as i32 + 1);
            rps.predict(reference, delta_rps, &used_by_curr_pic_flag, &use_delta_flag);
        } else {
            let num_negative_pics = read_ue(bs)? as usize;
            check_range("num_negative_pics", num_negative_pics as i64, 0, MAX_DPB_SIZE as i64)?;
            let num_positive_pics = read_ue(bs)? as usize;
            check_range(
                "num_positive_pics",
                num_positive_pics as i64,
                0,
                (MAX_DPB_SIZE - num_negative_pics) as i64,
            )?;

            let mut poc = 0;
            for _ in 0..num_negative_pics {
                let delta_poc_s0_minus1 = read_ue(bs)?;
                check_range("delta_poc_s0_minus1", delta_poc_s0_minus1 as i64, 0, (1 << 15) - 1)?;
                poc -= delta_poc_s0_minus1 as i32 + 1;
                rps.delta_poc_s0.push(poc);
                rps.used_by_curr_pic_s0.push(bs.read_bit()?);
            }

            poc = 0;
            for _ in 0..num_positive_pics {
                let delta_poc_s1_minus1 = read_ue(bs)?;
                check_range("delta_poc_s1_minus1", delta_poc_s1_minus1 as i64, 0, (1 << 15) - 1)?;
                poc += delta_poc_s1_minus1 as i32 + 1;
                rps.delta_poc_s1.push(poc);
                rps.used_by_curr_pic_s1.push(bs.read_bit()?);
            }
        }

        Ok(rps)
    }

    /// Equations 7-61 and 7-62.
    fn predict(&mut self, reference: &ShortTermRps, delta_rps: i32, used: &[bool], use_delta: &[bool]) {
        let num_negative = reference.num_negative_pics();
        let num_delta_pocs = reference.num_delta_pocs();

        for j in (0..reference.num_positive_pics()).rev() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc < 0 && use_delta[num_negative + j] {
                self.delta_poc_s0.push(d_poc);
                self.used_by_curr_pic_s0.push(used[num_negative + j]);
            }
        }
        if delta_rps < 0 && use_delta[num_delta_pocs] {
            self.delta_poc_s0.push(delta_rps);
            self.used_by_curr_pic_s0.push(used[num_delta_pocs]);
        }
        for j in 0..num_negative {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc < 0 && use_delta[j] {
                self.delta_poc_s0.push(d_poc);
                self.used_by_curr_pic_s0.push(used[j]);
            }
        }

        for j in (0..num_negative).rev() {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc > 0 && use_delta[j] {
                self.delta_poc_s1.push(d_poc);
                self.used_by_curr_pic_s1.push(used[j]);
            }
        }
        if delta_rps > 0 && use_delta[num_delta_pocs] {
            self.delta_poc_s1.push(delta_rps);
            self.used_by_curr_pic_s1.push(used[num_delta_pocs]);
        }
        for j in 0..reference.num_positive_pics() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc > 0 && use_delta[num_negative + j] {
                self.delta_poc_s1.push(d_poc);
                self.used_by_curr_pic_s1.push(used[num_negative + j]);
            }
        }
    }

    pub fn num_negative_pics(&self) -> usize {
        self.delta_poc_s0.len()
    }

    pub fn num_positive_pics(&self) -> usize {
        self.delta_poc_s1.len()
    }

    pub fn num_delta_pocs(&self) -> usize {
        self.num_negative_pics() + self.num_positive_pics()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::utils::bit_writer::BitBuilder;

    #[test]
    fn explicit_set() {
        let data = BitBuilder::new()
            .ue(2) // num_negative_pics
            .ue(1) // num_positive_pics
            .ue(0)
            .flag(true)
            .ue(1)
            .flag(false)
            .ue(3)
            .flag(true)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let rps = ShortTermRps::read(&mut bs, 0, 2, &[]).unwrap();

        assert_eq!(rps.delta_poc_s0, vec![-1, -3]);
        assert_eq!(rps.used_by_curr_pic_s0, vec![true, false]);
        assert_eq!(rps.delta_poc_s1, vec![4]);
        assert_eq!(rps.num_delta_pocs(), 3);
    }

    #[test]
    fn inter_rps_prediction() {
        let reference = ShortTermRps {
            delta_poc_s0: vec![-1, -3],
            used_by_curr_pic_s0: vec![true, true],
            delta_poc_s1: vec![2],
            used_by_curr_pic_s1: vec![true],
            ..Default::default()
        };

        // deltaRps = -1, every candidate kept
        let data = BitBuilder::new()
            .flag(true) // inter_ref_pic_set_prediction_flag
            .flag(true) // delta_rps_sign
            .ue(0)
            .pattern("1 1 1 1")
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let rps = ShortTermRps::read(&mut bs, 1, 2, &[reference]).unwrap();

        assert_eq!(rps.delta_poc_s0, vec![-1, -2, -4]);
        assert_eq!(rps.delta_poc_s1, vec![1]);
        assert!(rps.used_by_curr_pic_s0.iter().all(|&used| used));
    }

    #[test]
    fn slice_header_set_references_missing_rps() {
        let data = BitBuilder::new()
            .flag(true)
            .ue(3) // delta_idx_minus1
            .flag(false)
            .ue(0)
            .finish();
        let mut bs = Bitstream::open(Cursor::new(&data)).unwrap();
        let err = ShortTermRps::read(&mut bs, 2, 2, &vec![ShortTermRps::default(); 2]).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ParameterSetError>(),
            Some(ParameterSetError::InvalidRpsReference { index: 2, reference: -2 })
        ));
    }
}
