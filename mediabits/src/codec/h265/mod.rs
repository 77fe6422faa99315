//! ITU-T H.265 syntax: NAL unit headers, parameter sets and the leading
//! slice segment header fields.

pub mod hrd;
pub mod nalu;
pub mod pps;
pub mod ptl;
pub mod rps;
pub mod scaling;
pub mod slice;
pub mod sps;
pub mod vps;
pub mod vui;

pub use nalu::{H265NalUnit, H265NalUnitType, nal_type_description};
pub use pps::{H265Pps, MAX_PPS};
pub use ptl::ProfileTierLevel;
pub use slice::{H265SliceHeader, H265SliceType};
pub use sps::{H265Sps, MAX_SPS};
pub use vps::{H265Vps, MAX_VPS};
