//! Per-stream sample index ("bitstream map").
//!
//! Container scanners record where every sample of an elementary stream lives
//! in the file. A [`Bitstream`](super::cursor::Bitstream) bound to a map reads
//! sample by sample instead of walking the raw file.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamType {
    #[default]
    Unknown,
    Audio,
    Video,
    Text,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecId {
    #[default]
    Unknown,
    H264,
    H265,
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4Part2,
    MpegAudioLayer1,
    MpegAudioLayer2,
    Mp3,
    Aac,
    Ac3,
    Lpcm,
    Pcm,
}

impl Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CodecId::Unknown => "Unknown",
            CodecId::H264 => "H.264 / AVC",
            CodecId::H265 => "H.265 / HEVC",
            CodecId::Mpeg1Video => "MPEG-1 Video",
            CodecId::Mpeg2Video => "MPEG-2 Video",
            CodecId::Mpeg4Part2 => "MPEG-4 Part 2",
            CodecId::MpegAudioLayer1 => "MPEG Audio Layer I",
            CodecId::MpegAudioLayer2 => "MPEG Audio Layer II",
            CodecId::Mp3 => "MPEG Audio Layer III",
            CodecId::Aac => "AAC",
            CodecId::Ac3 => "AC-3",
            CodecId::Lpcm => "LPCM",
            CodecId::Pcm => "PCM",
        };
        write!(f, "{name}")
    }
}

impl Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamType::Unknown => "unknown",
            StreamType::Audio => "audio",
            StreamType::Video => "video",
            StreamType::Text => "text",
            StreamType::Data => "data",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    #[default]
    Unknown,
    Audio,
    Video,
    /// Random access point (IDR / key frame).
    VideoSync,
    /// Parameter sets and other stream configuration units.
    VideoParameter,
    Text,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    pub sample_type: SampleType,
    pub size: u32,
    pub offset: u64,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
}

impl Sample {
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Ordered sample table of one elementary stream.
#[derive(Debug, Clone, Default)]
pub struct BitstreamMap {
    pub stream_type: StreamType,
    pub codec: CodecId,
    /// Container specific stream identifier (PID, PES stream_id, track id).
    pub stream_id: u32,
    /// Time base of `pts`/`dts` as ticks per second.
    pub timescale: u32,
    samples: Vec<Sample>,
    total_bytes: u64,
}

impl BitstreamMap {
    pub fn new(stream_type: StreamType, codec: CodecId) -> Self {
        Self {
            stream_type,
            codec,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_timescale(mut self, timescale: u32) -> Self {
        self.timescale = timescale;
        self
    }

    pub fn push(&mut self, sample: Sample) {
        self.total_bytes += sample.size as u64;
        self.samples.push(sample);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Index of the sample covering absolute byte `offset`.
    pub fn sample_at_offset(&self, offset: u64) -> Option<usize> {
        let candidate = self.samples.partition_point(|s| s.offset <= offset);
        if candidate == 0 {
            return None;
        }

        let index = candidate - 1;
        (offset < self.samples[index].end()).then_some(index)
    }

    /// Duration in seconds between the first and the last timestamped sample,
    /// extended by the average sample spacing.
    pub fn duration_secs(&self) -> Option<f64> {
        if self.timescale == 0 {
            return None;
        }

        let pts: Vec<i64> = self.samples.iter().filter_map(|s| s.pts).collect();
        let (first, last) = (*pts.iter().min()?, *pts.iter().max()?);
        if pts.len() < 2 {
            return Some(0.0);
        }

        let span = (last - first) as f64;
        let step = span / (pts.len() - 1) as f64;

        Some((span + step) / self.timescale as f64)
    }

    pub fn count_of(&self, sample_type: SampleType) -> usize {
        self.samples
            .iter()
            .filter(|s| s.sample_type == sample_type)
            .count()
    }
}
