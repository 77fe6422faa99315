/// Container detection from leading bytes and file extension.
pub mod probe;

/// Annex B start code scanning into per-NAL sample maps.
pub mod annexb;

/// H.264 decoding context: parameter sets by id, per-NAL dispatch.
pub mod h264;

/// H.265 decoding context: parameter sets by id, per-NAL dispatch.
pub mod h265;

/// Top-level file parsing into a [`MediaReport`](media::MediaReport).
pub mod media;

use crate::bitstream::CodecId;

/// Conformance policy shared by every syntax reader.
///
/// Checks reported at a level at or above `fail_level` abort the enclosing
/// syntax structure; less severe ones are only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub fail_level: log::Level,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            fail_level: log::Level::Warn,
        }
    }

    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }
}

/// One NAL unit as seen by a decoding context.
#[derive(Debug, Clone, PartialEq)]
pub struct NalRecord {
    pub index: usize,
    pub offset: u64,
    pub size: u32,
    pub nal_unit_type: u8,
    pub description: &'static str,
    /// Parsed payload summary, or the error that stopped parsing.
    pub detail: Option<String>,
    pub error: bool,
}

/// Stream properties derived from the active sequence parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub profile: String,
    pub level: String,
    pub chroma_format: &'static str,
    pub bit_depth: u32,
    pub frame_rate: Option<f64>,
}

pub fn chroma_format_name(chroma_format_idc: u32) -> &'static str {
    match chroma_format_idc {
        0 => "4:0:0",
        1 => "4:2:0",
        2 => "4:2:2",
        3 => "4:4:4",
        _ => "unknown",
    }
}
