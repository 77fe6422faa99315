//! MPEG-1/2/2.5 audio elementary streams (ISO/IEC 11172-3, 13818-3).
//!
//! The scanner skips leading ID3v2 tags, walks frame headers and stops at an
//! ID3v1 or APE trailer. An unrecognised header triggers manual parsing: the
//! scan slides forward one byte at a time until a frame header whose
//! successor also parses is found.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, warn};

use super::SourceReader;
use crate::bitstream::{BitstreamMap, ByteSource, CodecId, Sample, SampleType, StreamType};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::{CRC_MPEG_AUDIO_ALG, Crc16};
use crate::utils::errors::Mp3Error;

pub const ID3V2_HEADER_SIZE: usize = 10;
pub const ID3V1_SIZE: u64 = 128;

const FRAME_SYNC: u32 = 0x7FF;

#[rustfmt::skip]
const BITRATES_KBPS: [[u16; 15]; 5] = [
    // MPEG-1 Layer I, II, III
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    // MPEG-2/2.5 Layer I, then II and III
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

const SAMPLING_RATES: [u32; 3] = [44100, 48000, 32000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl std::fmt::Display for MpegVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MpegVersion::V1 => "MPEG-1",
            MpegVersion::V2 => "MPEG-2",
            MpegVersion::V25 => "MPEG-2.5",
        };
        write!(f, "{name}")
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layer::I => "Layer I",
            Layer::II => "Layer II",
            Layer::III => "Layer III",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub protection_bit: bool,
    pub bitrate_index: u8,
    pub sampling_frequency: u8,
    pub padding_bit: bool,
    pub private_bit: bool,
    pub mode: ChannelMode,
    pub mode_extension: u8,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: u8,

    /// Bits per second.
    pub bitrate: u32,
    pub sample_rate: u32,
    pub frame_size: u32,
    pub samples_per_frame: u32,
}

impl FrameHeader {
    /// Decodes and validates the 32-bit frame header and derives the frame
    /// geometry.
    pub fn parse_frame_full(header: u32) -> Result<Self> {
        let bytes = header.to_be_bytes();
        let reader = &mut BsIoSliceReader::from_slice(&bytes);

        let sync: u32 = reader.get_n(11)?;
        if sync != FRAME_SYNC {
            bail!(Mp3Error::InvalidSync(sync));
        }

        let version = match reader.get_n::<u8>(2)? {
            0b00 => MpegVersion::V25,
            0b10 => MpegVersion::V2,
            0b11 => MpegVersion::V1,
            _ => bail!(Mp3Error::ReservedVersion),
        };
        let layer = match reader.get_n::<u8>(2)? {
            0b01 => Layer::III,
            0b10 => Layer::II,
            0b11 => Layer::I,
            _ => bail!(Mp3Error::ReservedLayer),
        };

        let protection_bit = reader.get()?;
        let bitrate_index: u8 = reader.get_n(4)?;
        let sampling_frequency: u8 = reader.get_n(2)?;
        let padding_bit = reader.get()?;
        let private_bit = reader.get()?;
        let mode = match reader.get_n::<u8>(2)? {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };
        let mode_extension = reader.get_n(2)?;
        let copyright = reader.get()?;
        let original = reader.get()?;
        let emphasis = reader.get_n(2)?;

        // free format streams have no derivable frame size
        if bitrate_index == 0 || bitrate_index == 15 {
            bail!(Mp3Error::InvalidBitrate(bitrate_index));
        }
        if sampling_frequency == 3 {
            bail!(Mp3Error::InvalidSamplingRate(sampling_frequency));
        }
        if emphasis == 2 {
            bail!(Mp3Error::ReservedEmphasis);
        }

        let table = match (version, layer) {
            (MpegVersion::V1, Layer::I) => 0,
            (MpegVersion::V1, Layer::II) => 1,
            (MpegVersion::V1, Layer::III) => 2,
            (_, Layer::I) => 3,
            _ => 4,
        };
        let bitrate = BITRATES_KBPS[table][bitrate_index as usize] as u32 * 1000;

        let sample_rate = match version {
            MpegVersion::V1 => SAMPLING_RATES[sampling_frequency as usize],
            MpegVersion::V2 => SAMPLING_RATES[sampling_frequency as usize] / 2,
            MpegVersion::V25 => SAMPLING_RATES[sampling_frequency as usize] / 4,
        };

        let padding = padding_bit as u32;
        let (frame_size, samples_per_frame) = match (layer, version) {
            (Layer::I, _) => ((12 * bitrate / sample_rate + padding) * 4, 384),
            (Layer::II, _) => (144 * bitrate / sample_rate + padding, 1152),
            (Layer::III, MpegVersion::V1) => (144 * bitrate / sample_rate + padding, 1152),
            (Layer::III, _) => (72 * bitrate / sample_rate + padding, 576),
        };

        Ok(Self {
            version,
            layer,
            protection_bit,
            bitrate_index,
            sampling_frequency,
            padding_bit,
            private_bit,
            mode,
            mode_extension,
            copyright,
            original,
            emphasis,
            bitrate,
            sample_rate,
            frame_size,
            samples_per_frame,
        })
    }

    pub fn channels(&self) -> u32 {
        if self.mode == ChannelMode::Mono { 1 } else { 2 }
    }

    /// A 16-bit CRC follows the header when protection_bit is 0.
    pub fn has_crc(&self) -> bool {
        !self.protection_bit
    }

    /// Layer III side information size in bytes.
    pub fn side_info_size(&self) -> usize {
        match (self.version, self.channels()) {
            (MpegVersion::V1, 1) => 17,
            (MpegVersion::V1, _) => 32,
            (_, 1) => 9,
            _ => 17,
        }
    }

    pub fn codec(&self) -> CodecId {
        match self.layer {
            Layer::I => CodecId::MpegAudioLayer1,
            Layer::II => CodecId::MpegAudioLayer2,
            Layer::III => CodecId::Mp3,
        }
    }

    /// Whether `other` could belong to the same stream.
    fn is_consistent_with(&self, other: &FrameHeader) -> bool {
        self.version == other.version && self.layer == other.layer && self.sample_rate == other.sample_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VbrKind {
    Xing,
    Info,
    Vbri,
}

/// VBR summary stored in the first frame by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VbrHeader {
    pub kind: VbrKind,
    pub frames: Option<u32>,
    pub bytes: Option<u32>,
    pub quality: Option<u32>,
}

impl VbrHeader {
    /// Looks for a Xing/Info header after the side information or a VBRI
    /// header 32 bytes after the frame header.
    pub fn read(header: &FrameHeader, frame: &[u8]) -> Option<Self> {
        let xing = 4 + header.side_info_size();
        let tag = frame.get(xing..xing + 4)?;

        if tag == b"Xing" || tag == b"Info" {
            let kind = if tag == b"Xing" { VbrKind::Xing } else { VbrKind::Info };
            let mut reader = BsIoSliceReader::from_slice(frame.get(xing + 4..)?);
            let flags: u32 = reader.get_n(32).ok()?;

            let frames = (flags & 0x1 != 0).then(|| reader.get_n::<u32>(32)).transpose().ok()?;
            let bytes = (flags & 0x2 != 0).then(|| reader.get_n::<u32>(32)).transpose().ok()?;
            if flags & 0x4 != 0 {
                reader.skip_n(100 * 8).ok()?;
            }
            let quality = (flags & 0x8 != 0).then(|| reader.get_n::<u32>(32)).transpose().ok()?;

            return Some(Self {
                kind,
                frames,
                bytes,
                quality,
            });
        }

        if frame.get(36..40)? == b"VBRI" {
            let mut reader = BsIoSliceReader::from_slice(frame.get(40..)?);
            reader.skip_n(32).ok()?; // version and delay
            let quality = reader.get_n::<u32>(16).ok()?;
            let bytes = reader.get_n::<u32>(32).ok()?;
            let frames = reader.get_n::<u32>(32).ok()?;

            return Some(Self {
                kind: VbrKind::Vbri,
                frames: Some(frames),
                bytes: Some(bytes),
                quality: Some(quality),
            });
        }

        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id3v2Tag {
    pub offset: u64,
    pub major_version: u8,
    /// Including the header and the optional footer.
    pub size: u64,
}

impl Id3v2Tag {
    /// Parses an ID3v2 header; the size field is a 28-bit syncsafe integer.
    pub fn read(offset: u64, bytes: &[u8]) -> Option<Self> {
        let [b'I', b'D', b'3', major_version, _, flags, s0, s1, s2, s3, ..] = *bytes else {
            return None;
        };
        if [s0, s1, s2, s3].iter().any(|b| b & 0x80 != 0) {
            return None;
        }

        let size = ((s0 as u64) << 21) | ((s1 as u64) << 14) | ((s2 as u64) << 7) | s3 as u64;
        let footer = if flags & 0x10 != 0 { 10 } else { 0 };

        Some(Self {
            offset,
            major_version,
            size: ID3V2_HEADER_SIZE as u64 + size + footer,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mp3Scan {
    pub id3v2: Vec<Id3v2Tag>,
    pub has_id3v1: bool,
    pub has_ape: bool,
    pub first_header: Option<FrameHeader>,
    pub vbr: Option<VbrHeader>,
    /// Bytes skipped while resynchronising.
    pub skipped_bytes: u64,
    pub crc_errors: usize,
    pub map: BitstreamMap,
}

impl Mp3Scan {
    pub fn frame_count(&self) -> usize {
        self.map.sample_count()
    }

    /// Average bitrate over the mapped frames in bits per second.
    pub fn average_bitrate(&self) -> Option<u64> {
        let secs = self.map.duration_secs()?;
        (secs > 0.0).then(|| (self.map.total_bytes() as f64 * 8.0 / secs) as u64)
    }
}

pub fn scan<S: ByteSource>(options: &ParseOptions, reader: &mut SourceReader<S>) -> Result<Mp3Scan> {
    let size = reader.size();
    let crc = Crc16::new(&CRC_MPEG_AUDIO_ALG);

    let mut scan = Mp3Scan {
        map: BitstreamMap::new(StreamType::Audio, CodecId::Mp3),
        ..Default::default()
    };

    let mut pos = 0;
    let mut locked = false;
    let mut resync_start = 0;
    let mut pts: i64 = 0;

    while pos + 4 <= size {
        let head = reader.bytes(pos, ID3V2_HEADER_SIZE)?;

        if head.starts_with(b"TAG") && size - pos <= ID3V1_SIZE {
            scan.has_id3v1 = true;
            break;
        }
        if head.starts_with(b"APETAGEX") {
            scan.has_ape = true;
            break;
        }
        if let Some(tag) = Id3v2Tag::read(pos, head) {
            debug!("ID3v2.{} tag at {pos}, {} bytes", tag.major_version, tag.size);
            pos += tag.size;
            scan.id3v2.push(tag);
            continue;
        }

        let word = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        let header = match FrameHeader::parse_frame_full(word) {
            Ok(header) => header,
            Err(e) => {
                if locked {
                    warn!("{e} at offset {pos}, resynchronising");
                    locked = false;
                    resync_start = pos;
                }
                scan.skipped_bytes += 1;
                pos += 1;
                continue;
            }
        };

        let frame_end = pos + header.frame_size as u64;
        if frame_end > size {
            log_or_err!(
                options,
                Warn,
                anyhow!(Mp3Error::TruncatedFrame {
                    offset: pos,
                    size: header.frame_size,
                })
            );
            break;
        }

        if !locked {
            if !is_confirmed(reader, frame_end, &header)? {
                scan.skipped_bytes += 1;
                pos += 1;
                continue;
            }
            if pos > resync_start && scan.first_header.is_some() {
                debug!("Resynchronised at {pos} after {} bytes", pos - resync_start);
            }
            locked = true;
        }

        let frame = reader.exact(pos, header.frame_size as usize)?;

        if header.has_crc() && header.layer == Layer::III {
            let side_info_end = 6 + header.side_info_size();
            if let Some(side_info) = frame.get(6..side_info_end) {
                let read = u16::from_be_bytes([frame[4], frame[5]]);
                let calculated = crc.update(crc.update(crc.init, &frame[2..4]), side_info);
                if read != calculated {
                    scan.crc_errors += 1;
                    log_or_err!(
                        options,
                        Warn,
                        anyhow!(Mp3Error::CrcMismatch {
                            offset: pos,
                            read,
                            calculated,
                        })
                    );
                }
            }
        }

        match scan.first_header {
            None => {
                scan.first_header = Some(header);
                scan.map = BitstreamMap::new(StreamType::Audio, header.codec()).with_timescale(header.sample_rate);

                if let Some(vbr) = VbrHeader::read(&header, frame) {
                    debug!("{:?} header: {:?} frames, {:?} bytes", vbr.kind, vbr.frames, vbr.bytes);
                    scan.vbr = Some(vbr);
                    pos = frame_end;
                    continue;
                }
            }
            Some(first) if !first.is_consistent_with(&header) => {
                warn!(
                    "Frame at {pos} switches to {} {} {} Hz",
                    header.version, header.layer, header.sample_rate
                );
            }
            Some(_) => {}
        }

        scan.map.push(Sample {
            sample_type: SampleType::Audio,
            size: header.frame_size,
            offset: pos,
            pts: Some(pts),
            dts: Some(pts),
        });
        pts += header.samples_per_frame as i64;
        pos = frame_end;
    }

    if scan.skipped_bytes > 0 {
        warn!("Skipped {} bytes of unrecognised data", scan.skipped_bytes);
    }

    Ok(scan)
}

/// A candidate found while unlocked must be followed by another consistent
/// frame header, a trailer, or the end of the file.
fn is_confirmed<S: ByteSource>(reader: &mut SourceReader<S>, next: u64, header: &FrameHeader) -> Result<bool> {
    let size = reader.size();
    if next + 4 > size {
        return Ok(true);
    }

    let bytes = reader.bytes(next, 8)?;
    if bytes.starts_with(b"TAG") || bytes.starts_with(b"APETAGEX") || bytes.starts_with(b"ID3") {
        return Ok(true);
    }

    let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok(FrameHeader::parse_frame_full(word).is_ok_and(|next| header.is_consistent_with(&next)))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, joint stereo.
    const HEADER_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x40];

    fn frame(header: [u8; 4], size: usize) -> Vec<u8> {
        let mut frame = vec![0; size];
        frame[..4].copy_from_slice(&header);
        frame
    }

    fn id3v2(body: usize) -> Vec<u8> {
        let mut tag = b"ID3\x04\x00\x00".to_vec();
        let size = body as u32;
        tag.extend_from_slice(&[
            (size >> 21) as u8 & 0x7F,
            (size >> 14) as u8 & 0x7F,
            (size >> 7) as u8 & 0x7F,
            size as u8 & 0x7F,
        ]);
        tag.resize(ID3V2_HEADER_SIZE + body, 0);
        tag
    }

    #[test]
    fn frame_geometry() {
        let h = FrameHeader::parse_frame_full(u32::from_be_bytes(HEADER_128K)).unwrap();
        assert_eq!((h.version, h.layer), (MpegVersion::V1, Layer::III));
        assert_eq!(h.bitrate, 128_000);
        assert_eq!(h.sample_rate, 44100);
        assert_eq!(h.frame_size, 417);
        assert_eq!(h.samples_per_frame, 1152);
        assert_eq!(h.mode, ChannelMode::JointStereo);
        assert!(!h.has_crc());

        // MPEG-2 Layer III 64 kbit/s 22.05 kHz mono, padded
        let h = FrameHeader::parse_frame_full(0xFFF3_82C0).unwrap();
        assert_eq!(h.version, MpegVersion::V2);
        assert_eq!(h.frame_size, 209);
        assert_eq!(h.samples_per_frame, 576);
        assert_eq!(h.side_info_size(), 9);

        // MPEG-1 Layer I 384 kbit/s 32 kHz, padded
        let h = FrameHeader::parse_frame_full(0xFFFF_CA00).unwrap();
        assert_eq!(h.layer, Layer::I);
        assert_eq!(h.frame_size, 580);
        assert_eq!(h.samples_per_frame, 384);
        assert_eq!(h.codec(), CodecId::MpegAudioLayer1);
    }

    #[test]
    fn invalid_headers() {
        let cases: [(u32, fn(&Mp3Error) -> bool); 6] = [
            (0xFFC0_0000, |e| matches!(e, Mp3Error::InvalidSync(_))),
            (0xFFEB_9040, |e| matches!(e, Mp3Error::ReservedVersion)),
            (0xFFF9_9040, |e| matches!(e, Mp3Error::ReservedLayer)),
            (0xFFFB_F040, |e| matches!(e, Mp3Error::InvalidBitrate(15))),
            (0xFFFB_9C40, |e| matches!(e, Mp3Error::InvalidSamplingRate(3))),
            (0xFFFB_9042, |e| matches!(e, Mp3Error::ReservedEmphasis)),
        ];

        for (word, check) in cases {
            let err = FrameHeader::parse_frame_full(word).unwrap_err();
            let err = err.downcast_ref::<Mp3Error>().unwrap();
            assert!(check(err), "{word:#010X}: {err}");
        }
    }

    #[test]
    fn scan_with_tags_and_garbage() {
        let mut data = id3v2(20);
        for _ in 0..3 {
            data.extend(frame(HEADER_128K, 417));
        }
        data.extend_from_slice(&[0; 5]);
        for _ in 0..2 {
            data.extend(frame(HEADER_128K, 417));
        }
        let mut trailer = b"TAG".to_vec();
        trailer.resize(ID3V1_SIZE as usize, b' ');
        data.extend(trailer);

        let mut reader = SourceReader::new(Cursor::new(data));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        assert_eq!(scan.id3v2.len(), 1);
        assert_eq!(scan.id3v2[0].size, 30);
        assert!(scan.has_id3v1);
        assert_eq!(scan.frame_count(), 5);
        assert_eq!(scan.skipped_bytes, 5);
        assert_eq!(scan.map.sample(0).unwrap().offset, 30);
        assert_eq!(scan.map.sample(3).unwrap().offset, 30 + 3 * 417 + 5);
        assert_eq!(scan.map.sample(4).unwrap().pts, Some(4 * 1152));
        assert_eq!(scan.map.timescale, 44100);
        assert_eq!(scan.map.codec, CodecId::Mp3);
    }

    #[test]
    fn xing_frame_is_not_audio() {
        let mut first = frame(HEADER_128K, 417);
        first[36..40].copy_from_slice(b"Xing");
        first[40..44].copy_from_slice(&3u32.to_be_bytes());
        first[44..48].copy_from_slice(&100u32.to_be_bytes());
        first[48..52].copy_from_slice(&41_700u32.to_be_bytes());

        let mut data = first;
        data.extend(frame(HEADER_128K, 417));
        data.extend(frame(HEADER_128K, 417));

        let mut reader = SourceReader::new(Cursor::new(data));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        let vbr = scan.vbr.unwrap();
        assert_eq!(vbr.kind, VbrKind::Xing);
        assert_eq!(vbr.frames, Some(100));
        assert_eq!(vbr.bytes, Some(41_700));
        assert_eq!(vbr.quality, None);
        assert_eq!(scan.frame_count(), 2);
    }

    #[test]
    fn truncated_last_frame() {
        let mut data = frame(HEADER_128K, 417);
        data.extend(frame(HEADER_128K, 417));
        data.truncate(417 + 100);

        let mut reader = SourceReader::new(Cursor::new(data.clone()));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();
        assert_eq!(scan.frame_count(), 1);

        let mut reader = SourceReader::new(Cursor::new(data));
        assert!(super::scan(&ParseOptions::strict(), &mut reader).is_err());
    }

    #[test]
    fn layer3_crc() {
        // protection_bit 0
        let header = [0xFF, 0xFA, 0x90, 0x40];
        let mut good = frame(header, 417);
        good[6..38].fill(0x5A);
        let crc = Crc16::new(&CRC_MPEG_AUDIO_ALG);
        let value = crc.update(crc.update(crc.init, &good[2..4]), &good[6..38]);
        good[4..6].copy_from_slice(&value.to_be_bytes());

        let mut data = good.clone();
        data.extend(&good);
        let mut reader = SourceReader::new(Cursor::new(data.clone()));
        let clean = scan(&ParseOptions::strict(), &mut reader).unwrap();
        assert_eq!(clean.crc_errors, 0);

        data[417 + 10] ^= 0xFF;
        let mut reader = SourceReader::new(Cursor::new(data.clone()));
        assert_eq!(scan(&ParseOptions::default(), &mut reader).unwrap().crc_errors, 1);
        let mut reader = SourceReader::new(Cursor::new(data));
        assert!(scan(&ParseOptions::strict(), &mut reader).is_err());
    }
}
