//! RIFF chunk trees and WAVE audio.
//!
//! Chunk sizes are little-endian and every chunk body is padded to an even
//! length. `RIFF` and `LIST` chunks carry a form type followed by nested
//! chunks.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace, warn};

use super::SourceReader;
use crate::bitstream::{BitstreamMap, ByteSource, CodecId, Sample, SampleType, StreamType};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::errors::RiffError;

pub const CHUNK_HEADER_SIZE: u64 = 8;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_ALAW: u16 = 0x0006;
pub const WAVE_FORMAT_MULAW: u16 = 0x0007;
pub const WAVE_FORMAT_MPEG: u16 = 0x0050;
pub const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// PCM frames per mapped sample of a `data` chunk.
pub const FRAMES_PER_SAMPLE: u32 = 1024;

const MAX_LIST_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub fourcc: [u8; 4],
    /// Offset of the chunk header.
    pub offset: u64,
    pub size: u32,
    /// Form or list type of `RIFF` and `LIST` chunks.
    pub list_type: Option<[u8; 4]>,
    pub children: Vec<Chunk>,
}

impl Chunk {
    pub fn id(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }

    pub fn data_offset(&self) -> u64 {
        self.offset + CHUNK_HEADER_SIZE
    }

    /// Header, body and pad byte.
    pub fn total_size(&self) -> u64 {
        CHUNK_HEADER_SIZE + self.size as u64 + (self.size & 1) as u64
    }

    pub fn is_list(&self) -> bool {
        self.list_type.is_some()
    }

    /// Depth-first search for the first chunk with `fourcc`.
    pub fn find(&self, fourcc: &[u8; 4]) -> Option<&Chunk> {
        self.children
            .iter()
            .find_map(|child| if &child.fourcc == fourcc { Some(child) } else { child.find(fourcc) })
    }
}

/// WAVEFORMATEX with the WAVEFORMATEXTENSIBLE tail when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub valid_bits_per_sample: Option<u16>,
    pub channel_mask: Option<u32>,
    pub sub_format: Option<[u8; 16]>,
}

impl WaveFormat {
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 16 {
            bail!(RiffError::FormatTooSmall(bytes.len() as u32));
        }

        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        let mut format = Self {
            format_tag: u16_at(0),
            channels: u16_at(2),
            samples_per_sec: u32_at(4),
            avg_bytes_per_sec: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
            ..Default::default()
        };

        if format.format_tag == WAVE_FORMAT_EXTENSIBLE {
            // cbSize, then 22 bytes of extension
            if bytes.len() < 40 || u16_at(16) < 22 {
                bail!(RiffError::FormatTooSmall(bytes.len() as u32));
            }

            format.valid_bits_per_sample = Some(u16_at(18));
            format.channel_mask = Some(u32_at(20));
            let mut sub_format = [0; 16];
            sub_format.copy_from_slice(&bytes[24..40]);
            format.sub_format = Some(sub_format);
        }

        Ok(format)
    }

    /// The format tag, taken from the sub-format GUID for extensible
    /// formats.
    pub fn effective_format_tag(&self) -> u16 {
        match self.sub_format {
            Some(guid) => u16::from_le_bytes([guid[0], guid[1]]),
            None => self.format_tag,
        }
    }

    pub fn codec(&self) -> CodecId {
        match self.effective_format_tag() {
            WAVE_FORMAT_PCM | WAVE_FORMAT_IEEE_FLOAT | WAVE_FORMAT_ALAW | WAVE_FORMAT_MULAW => CodecId::Pcm,
            WAVE_FORMAT_MPEG => CodecId::MpegAudioLayer2,
            WAVE_FORMAT_MPEGLAYER3 => CodecId::Mp3,
            _ => CodecId::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiffScan {
    /// The top-level `RIFF` chunk.
    pub root: Chunk,
    pub format: Option<WaveFormat>,
    /// Sample map of the WAVE `data` chunk.
    pub map: Option<BitstreamMap>,
}

impl RiffScan {
    pub fn form_type(&self) -> [u8; 4] {
        self.root.list_type.unwrap_or_default()
    }
}

pub fn scan<S: ByteSource>(options: &ParseOptions, reader: &mut SourceReader<S>) -> Result<RiffScan> {
    let size = reader.size();

    let head = reader.bytes(0, 12)?;
    if head.len() < 12 || &head[..4] != b"RIFF" {
        let mut read = [0; 4];
        read[..head.len().min(4)].copy_from_slice(&head[..head.len().min(4)]);
        bail!(RiffError::MissingHeader(read));
    }

    let riff_size = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
    let form_type = [head[8], head[9], head[10], head[11]];

    let mut end = CHUNK_HEADER_SIZE + riff_size as u64;
    if end > size {
        log_or_err!(
            options,
            Warn,
            anyhow!(RiffError::ChunkOverrun {
                fourcc: "RIFF".to_string(),
                offset: 0,
                size: riff_size,
            })
        );
        end = size;
    }
    if end < size {
        debug!("{} bytes after the RIFF chunk", size - end);
    }

    let children = read_chunks(options, reader, 12, end, 1)?;
    let root = Chunk {
        fourcc: *b"RIFF",
        offset: 0,
        size: riff_size,
        list_type: Some(form_type),
        children,
    };

    let mut scan = RiffScan {
        root,
        format: None,
        map: None,
    };

    if form_type != *b"WAVE" {
        debug!("RIFF form {:?} has no audio mapping", String::from_utf8_lossy(&form_type));
        return Ok(scan);
    }

    let Some(fmt) = scan.root.find(b"fmt ") else {
        warn!("WAVE file without a fmt chunk");
        return Ok(scan);
    };
    let fmt_bytes = reader.exact(fmt.data_offset(), fmt.size as usize)?;
    let format = WaveFormat::read(fmt_bytes)?;
    debug!(
        "WAVE format {:#06X}: {} ch, {} Hz, {} bits, block {}",
        format.effective_format_tag(),
        format.channels,
        format.samples_per_sec,
        format.bits_per_sample,
        format.block_align
    );
    scan.format = Some(format);

    if let Some(data) = scan.root.find(b"data") {
        scan.map = Some(map_data(&format, data));
    } else {
        warn!("WAVE file without a data chunk");
    }

    Ok(scan)
}

fn read_chunks<S: ByteSource>(
    options: &ParseOptions,
    reader: &mut SourceReader<S>,
    start: u64,
    end: u64,
    depth: usize,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    let mut pos = start;

    while pos + CHUNK_HEADER_SIZE <= end {
        let header = reader.exact(pos, CHUNK_HEADER_SIZE as usize)?;
        let fourcc = [header[0], header[1], header[2], header[3]];
        let mut size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let data_offset = pos + CHUNK_HEADER_SIZE;
        if data_offset + size as u64 > end {
            log_or_err!(
                options,
                Warn,
                anyhow!(RiffError::ChunkOverrun {
                    fourcc: String::from_utf8_lossy(&fourcc).into_owned(),
                    offset: pos,
                    size,
                })
            );
            size = (end - data_offset) as u32;
        }

        let mut chunk = Chunk {
            fourcc,
            offset: pos,
            size,
            list_type: None,
            children: Vec::new(),
        };

        if &fourcc == b"LIST" && size >= 4 {
            let list_type = reader.exact(data_offset, 4)?;
            chunk.list_type = Some([list_type[0], list_type[1], list_type[2], list_type[3]]);

            if depth < MAX_LIST_DEPTH {
                chunk.children = read_chunks(options, reader, data_offset + 4, data_offset + size as u64, depth + 1)?;
            } else {
                warn!("LIST nesting deeper than {MAX_LIST_DEPTH} at offset {pos}");
            }
        }

        trace!("{}chunk {} at {pos}, {size} bytes", "  ".repeat(depth), chunk.id());
        pos += chunk.total_size();
        chunks.push(chunk);
    }

    Ok(chunks)
}

/// Splits the `data` chunk into runs of [`FRAMES_PER_SAMPLE`] frames.
fn map_data(format: &WaveFormat, data: &Chunk) -> BitstreamMap {
    let mut map = BitstreamMap::new(StreamType::Audio, format.codec()).with_timescale(format.samples_per_sec);

    let block_align = format.block_align.max(1) as u64;
    let step = block_align * FRAMES_PER_SAMPLE as u64;
    let end = data.data_offset() + data.size as u64;

    let mut offset = data.data_offset();
    let mut frames: i64 = 0;
    while offset < end {
        let size = step.min(end - offset);
        map.push(Sample {
            sample_type: SampleType::Audio,
            size: size as u32,
            offset,
            pts: Some(frames),
            dts: Some(frames),
        });
        frames += (size / block_align) as i64;
        offset += size;
    }

    map
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn chunk(fourcc: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut chunk = fourcc.to_vec();
        chunk.extend_from_slice(&(data.len() as u32).to_le_bytes());
        chunk.extend_from_slice(data);
        if data.len() % 2 == 1 {
            chunk.push(0);
        }
        chunk
    }

    fn riff(form: &[u8; 4], chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut body = form.to_vec();
        for c in chunks {
            body.extend_from_slice(c);
        }
        chunk(b"RIFF", &body)
    }

    fn pcm_fmt(channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&rate.to_le_bytes());
        fmt.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt
    }

    #[test]
    fn wave_tree_and_map() {
        let mut info = b"INFO".to_vec();
        info.extend(chunk(b"INAM", b"tone"));
        info.extend(chunk(b"ISFT", b"mediabits"));

        let wav = riff(
            b"WAVE",
            &[
                chunk(b"fmt ", &pcm_fmt(2, 44100, 16)),
                chunk(b"LIST", &info),
                chunk(b"data", &vec![0; 5000 * 4]),
            ],
        );

        let mut reader = SourceReader::new(Cursor::new(wav));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        assert_eq!(&scan.form_type(), b"WAVE");
        assert_eq!(scan.root.children.len(), 3);
        let list = &scan.root.children[1];
        assert_eq!(list.list_type, Some(*b"INFO"));
        assert_eq!(list.children.len(), 2);
        assert_eq!(list.children[1].size, 9);
        assert!(scan.root.find(b"ISFT").is_some());

        let format = scan.format.unwrap();
        assert_eq!((format.channels, format.samples_per_sec), (2, 44100));
        assert_eq!(format.codec(), CodecId::Pcm);

        let map = scan.map.unwrap();
        assert_eq!(map.timescale, 44100);
        assert_eq!(map.sample_count(), 5);
        assert_eq!(map.total_bytes(), 20000);
        assert_eq!(map.sample(2).unwrap().pts, Some(2048));
        assert_eq!(map.sample(4).unwrap().size, (5000 - 4096) * 4);
        assert_eq!(map.sample(0).unwrap().offset, scan.root.find(b"data").unwrap().data_offset());
    }

    #[test]
    fn extensible_format() {
        let mut fmt = pcm_fmt(6, 48000, 24);
        fmt[..2].copy_from_slice(&WAVE_FORMAT_EXTENSIBLE.to_le_bytes());
        fmt.extend_from_slice(&22u16.to_le_bytes());
        fmt.extend_from_slice(&24u16.to_le_bytes());
        fmt.extend_from_slice(&0x3Fu32.to_le_bytes());
        // KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
        fmt.extend_from_slice(&[
            0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
        ]);

        let format = WaveFormat::read(&fmt).unwrap();
        assert_eq!(format.format_tag, WAVE_FORMAT_EXTENSIBLE);
        assert_eq!(format.effective_format_tag(), WAVE_FORMAT_IEEE_FLOAT);
        assert_eq!(format.channel_mask, Some(0x3F));
        assert_eq!(format.valid_bits_per_sample, Some(24));
        assert_eq!(format.codec(), CodecId::Pcm);

        let err = WaveFormat::read(&fmt[..30]).unwrap_err();
        assert!(matches!(err.downcast_ref::<RiffError>(), Some(RiffError::FormatTooSmall(30))));
    }

    #[test]
    fn truncated_data_chunk() {
        let mut wav = riff(
            b"WAVE",
            &[chunk(b"fmt ", &pcm_fmt(1, 8000, 8)), chunk(b"data", &[0x80; 100])],
        );
        wav.truncate(wav.len() - 40);

        let mut reader = SourceReader::new(Cursor::new(wav.clone()));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();
        assert_eq!(scan.map.unwrap().total_bytes(), 60);

        let mut reader = SourceReader::new(Cursor::new(wav));
        assert!(super::scan(&ParseOptions::strict(), &mut reader).is_err());
    }

    #[test]
    fn other_forms_and_bad_headers() {
        let avi = riff(b"AVI ", &[chunk(b"JUNK", &[0; 3])]);
        let mut reader = SourceReader::new(Cursor::new(avi));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();
        assert_eq!(&scan.form_type(), b"AVI ");
        assert_eq!(scan.root.children[0].total_size(), 12);
        assert!(scan.map.is_none());

        let mut reader = SourceReader::new(Cursor::new(b"RIFX\0\0\0\0WAVE".to_vec()));
        let err = super::scan(&ParseOptions::default(), &mut reader).unwrap_err();
        assert!(matches!(err.downcast_ref::<RiffError>(), Some(RiffError::MissingHeader(id)) if id == b"RIFX"));
    }
}
