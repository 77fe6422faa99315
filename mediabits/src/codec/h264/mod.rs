//! ITU-T H.264 syntax: NAL unit headers, parameter sets, slice headers and
//! CAVLC residual blocks.

pub mod cavlc;
pub mod cavlc_tables;
pub mod macroblock;
pub mod nalu;
pub mod pps;
pub mod slice;
pub mod sps;
pub mod vui;

pub use cavlc::{ResidualBlock, decode_block, decode_table_lookup};
pub use macroblock::{BlockType, MacroblockContext, MbKind, Plane};
pub use nalu::{H264NalUnit, H264NalUnitType, NalExtension, nal_type_description};
pub use pps::{H264Pps, MAX_PPS};
pub use slice::{H264SliceHeader, SliceType};
pub use sps::{H264Sps, MAX_SPS};
