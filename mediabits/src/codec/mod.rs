//! Codec syntax readers layered on the bitstream cursor.

use anyhow::{Result, bail};

use crate::utils::errors::ParameterSetError;

pub mod expgolomb;
pub mod h264;
pub mod h265;
pub mod nalu;

/// Rejects a syntax element outside its semantic range.
pub(crate) fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min || value > max {
        bail!(ParameterSetError::ValueOutOfRange {
            field,
            value,
            min,
            max
        });
    }

    Ok(())
}

/// Ceil(Log2(value)) for value >= 1.
pub(crate) fn ceil_log2(value: u32) -> u32 {
    match value {
        0 | 1 => 0,
        v => 32 - (v - 1).leading_zeros(),
    }
}

#[test]
fn ceil_log2_values() {
    assert_eq!(ceil_log2(1), 0);
    assert_eq!(ceil_log2(2), 1);
    assert_eq!(ceil_log2(3), 2);
    assert_eq!(ceil_log2(8), 3);
    assert_eq!(ceil_log2(9), 4);
}
