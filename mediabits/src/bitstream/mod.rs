//! Byte sources, sample maps and the bit-level cursor built on them.

pub mod cursor;
pub mod map;
pub mod source;

pub use cursor::Bitstream;
pub use map::{BitstreamMap, CodecId, Sample, SampleType, StreamType};
pub use source::{ByteSource, MediaFile};
