//! MPEG program streams (ISO/IEC 13818-1 2.5) and MPEG-1 system streams
//! (ISO/IEC 11172-1).
//!
//! Packs, system headers and PES packets are walked by start code. PES
//! payloads are grouped into one map per stream_id, and private_stream_1 is
//! split further by its substream id.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace, warn};

use super::pes::{PADDING_STREAM, PES_TIMESCALE, PRIVATE_STREAM_1, PesHeader, is_audio_stream, is_video_stream};
use super::{SourceReader, start_code_at};
use crate::bitstream::{BitstreamMap, ByteSource, CodecId, Sample, SampleType, StreamType};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{PesError, PsError};

pub const PROGRAM_END_CODE: u8 = 0xB9;
pub const PACK_START_CODE: u8 = 0xBA;
pub const SYSTEM_HEADER_START_CODE: u8 = 0xBB;

/// Bytes fetched to parse a PES header: prefix, optional header and the
/// longest PES_header_data.
const MAX_PES_HEADER: usize = 9 + 255;

/// MPEG-2 pack header with the longest pack_stuffing.
const MAX_PACK_HEADER: usize = 14 + 7;

const SEQUENCE_HEADER_CODE: [u8; 4] = [0, 0, 1, 0xB3];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackHeader {
    pub mpeg2: bool,
    /// system_clock_reference in 27 MHz units.
    pub system_clock_reference: u64,
    /// In units of 50 bytes/s.
    pub program_mux_rate: u32,
    pub header_length: usize,
}

impl PackHeader {
    /// Parses the pack header at the start of `bytes`; `offset` is only used
    /// in error messages.
    pub fn read(options: &ParseOptions, bytes: &[u8], offset: u64) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(bytes);

        let start_code: u32 = reader.get_n(32)?;
        if start_code != 0x100 | PACK_START_CODE as u32 {
            bail!(PsError::InvalidPackHeader(offset));
        }

        let mut header = Self::default();

        if reader.get_n::<u8>(2)? == 0b01 {
            header.mpeg2 = true;

            let (base, markers) = reader.get_timestamp33()?;
            let extension: u64 = reader.get_n(9)?;
            let m0 = reader.marker()?;
            header.program_mux_rate = reader.get_n(22)?;
            let m1 = reader.marker()?;
            let m2 = reader.marker()?;
            reader.skip_n(5)?;
            let pack_stuffing_length: usize = reader.get_n::<u8>(3)? as usize;

            if !(markers && m0 && m1 && m2) {
                log_or_err!(options, Warn, anyhow!(PesError::MissingMarker("pack_header")));
            }

            header.system_clock_reference = base * 300 + extension;
            header.header_length = 14 + pack_stuffing_length;
        } else {
            reader.seek(-2)?;
            if reader.get_n::<u8>(4)? != 0b0010 {
                bail!(PsError::InvalidPackHeader(offset));
            }

            let (base, markers) = reader.get_timestamp33()?;
            let m0 = reader.marker()?;
            header.program_mux_rate = reader.get_n(22)?;
            let m1 = reader.marker()?;

            if !(markers && m0 && m1) {
                log_or_err!(options, Warn, anyhow!(PesError::MissingMarker("pack_header")));
            }

            header.system_clock_reference = base * 300;
            header.header_length = 12;
        }

        Ok(header)
    }
}

/// Stream kind and codec of a private_stream_1 substream, with the size of
/// the substream header that precedes the payload.
pub fn private_substream(substream_id: u8) -> (StreamType, CodecId, usize) {
    match substream_id {
        0x20..=0x3F => (StreamType::Text, CodecId::Unknown, 1),
        0x80..=0x87 => (StreamType::Audio, CodecId::Ac3, 4),
        0x88..=0x8F => (StreamType::Audio, CodecId::Unknown, 4),
        0xA0..=0xA7 => (StreamType::Audio, CodecId::Lpcm, 7),
        _ => (StreamType::Data, CodecId::Unknown, 1),
    }
}

#[derive(Debug, Clone, Default)]
pub struct PsScan {
    /// `None` until the first pack header.
    pub mpeg2: Option<bool>,
    pub pack_count: u64,
    pub pes_count: u64,
    pub first_scr: Option<u64>,
    pub last_scr: Option<u64>,
    pub program_end: bool,
    pub resync_count: usize,
    pub skipped_bytes: u64,
    pub maps: Vec<BitstreamMap>,
}

impl PsScan {
    pub fn scr_duration_secs(&self) -> Option<f64> {
        let (first, last) = (self.first_scr?, self.last_scr?);
        (last > first).then(|| (last - first) as f64 / 27_000_000.0)
    }
}

/// Offset of the next start code at or after `from` whose code is a system
/// layer one (0xB9 and above).
fn next_system_start_code<S: ByteSource>(reader: &mut SourceReader<S>, from: u64) -> Result<Option<u64>> {
    let mut position = from;

    while let Some(found) = reader.find(position, &[0, 0, 1])? {
        match reader.bytes(found + 3, 1)? {
            [code] if *code >= PROGRAM_END_CODE => return Ok(Some(found)),
            [] => return Ok(None),
            _ => position = found + 1,
        }
    }

    Ok(None)
}

pub fn scan<S: ByteSource>(options: &ParseOptions, reader: &mut SourceReader<S>) -> Result<PsScan> {
    let size = reader.size();

    let mut scan = PsScan::default();
    let mut streams: HashMap<u32, usize> = HashMap::new();
    let mut pos = 0;

    while pos + 4 <= size {
        let code = start_code_at(reader.bytes(pos, 4)?);

        let code = match code {
            Some(code) if code >= PROGRAM_END_CODE => code,
            other => {
                match other {
                    Some(code) => log_or_err!(options, Warn, anyhow!(PsError::UnknownStartCode { code, offset: pos })),
                    None => log_or_err!(options, Warn, anyhow!(PsError::LostSync(pos))),
                }

                scan.resync_count += 1;
                let Some(next) = next_system_start_code(reader, pos + 1)? else {
                    scan.skipped_bytes += size - pos;
                    break;
                };
                debug!("Program stream resynchronised at {next} after {} bytes", next - pos);
                scan.skipped_bytes += next - pos;
                pos = next;
                continue;
            }
        };

        match code {
            PACK_START_CODE => {
                let header = match PackHeader::read(options, reader.bytes(pos, MAX_PACK_HEADER)?, pos) {
                    Ok(header) => header,
                    Err(e) => {
                        log_or_err!(options, Warn, e);
                        pos += 4;
                        continue;
                    }
                };

                if scan.mpeg2.is_some_and(|mpeg2| mpeg2 != header.mpeg2) {
                    warn!("Pack at {pos} switches system layer syntax");
                }
                scan.mpeg2 = Some(header.mpeg2);
                scan.pack_count += 1;
                scan.first_scr.get_or_insert(header.system_clock_reference);
                scan.last_scr = Some(header.system_clock_reference);

                trace!("Pack at {pos}: SCR {}", header.system_clock_reference);
                pos += header.header_length as u64;
            }
            SYSTEM_HEADER_START_CODE => {
                let bytes = reader.bytes(pos + 4, 2)?;
                if bytes.len() < 2 {
                    break;
                }
                let header_length = u16::from_be_bytes([bytes[0], bytes[1]]) as u64;
                debug!("System header at {pos}, {header_length} bytes");
                pos += 6 + header_length;
            }
            PROGRAM_END_CODE => {
                debug!("Program end code at {pos}");
                scan.program_end = true;
                pos += 4;
            }
            _ => {
                let header = match PesHeader::read(options, reader.bytes(pos, MAX_PES_HEADER)?) {
                    Ok(header) => header,
                    Err(e) => {
                        log_or_err!(options, Warn, anyhow!("PES packet at {pos}: {e}"));
                        pos += 4;
                        continue;
                    }
                };
                scan.pes_count += 1;

                let packet_end = match header.packet_size() {
                    Some(packet_size) => pos + packet_size as u64,
                    None => next_system_start_code(reader, pos + header.header_length as u64)?.unwrap_or(size),
                };
                if packet_end > size {
                    warn!("PES packet at {pos} is truncated by {} bytes", packet_end - size);
                }
                let packet_end = packet_end.min(size);

                if header.stream_id != PADDING_STREAM {
                    map_payload(reader, &mut scan, &mut streams, &header, pos, packet_end)?;
                }

                pos = packet_end;
            }
        }
    }

    if scan.pack_count == 0 && scan.pes_count == 0 {
        bail!(PsError::LostSync(0));
    }

    Ok(scan)
}

fn map_payload<S: ByteSource>(
    reader: &mut SourceReader<S>,
    scan: &mut PsScan,
    streams: &mut HashMap<u32, usize>,
    header: &PesHeader,
    pos: u64,
    packet_end: u64,
) -> Result<()> {
    let mut payload_start = pos + header.header_length as u64;
    if payload_start >= packet_end {
        return Ok(());
    }

    let stream_id = header.stream_id;
    let (key, stream_type, codec) = if stream_id == PRIVATE_STREAM_1 {
        let substream_id = reader.bytes(payload_start, 1)?[0];
        let (stream_type, codec, substream_header) = private_substream(substream_id);
        payload_start = (payload_start + substream_header as u64).min(packet_end);
        (((stream_id as u32) << 8) | substream_id as u32, stream_type, codec)
    } else if is_video_stream(stream_id) {
        let codec = match scan.mpeg2 {
            Some(false) => CodecId::Mpeg1Video,
            _ => CodecId::Mpeg2Video,
        };
        (stream_id as u32, StreamType::Video, codec)
    } else if is_audio_stream(stream_id) {
        (stream_id as u32, StreamType::Audio, CodecId::MpegAudioLayer2)
    } else {
        (stream_id as u32, StreamType::Data, CodecId::Unknown)
    };

    let index = *streams.entry(key).or_insert_with(|| {
        debug!("Stream {key:#06X}: {codec}");
        scan.maps.push(
            BitstreamMap::new(stream_type, codec)
                .with_id(key)
                .with_timescale(PES_TIMESCALE),
        );
        scan.maps.len() - 1
    });

    let sequence_start = stream_type == StreamType::Video && reader.bytes(payload_start, 4)? == SEQUENCE_HEADER_CODE;
    let sample_type = match stream_type {
        StreamType::Video if sequence_start => SampleType::VideoSync,
        StreamType::Video => SampleType::Video,
        StreamType::Audio => SampleType::Audio,
        StreamType::Text => SampleType::Text,
        _ => SampleType::Other,
    };

    let size = (packet_end - payload_start) as u32;
    if size > 0 {
        scan.maps[index].push(Sample {
            sample_type,
            size,
            offset: payload_start,
            pts: header.pts.map(|pts| pts as i64),
            dts: header.dts.or(header.pts).map(|dts| dts as i64),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::container::pes::mpeg2_packet;
    use crate::utils::bit_writer::BitBuilder;

    fn mpeg2_pack(scr_base: u64, stuffing: u8) -> Vec<u8> {
        BitBuilder::new()
            .bytes(&[0, 0, 1, PACK_START_CODE])
            .pattern("01")
            .bits(3, scr_base >> 30)
            .flag(true)
            .bits(15, (scr_base >> 15) & 0x7FFF)
            .flag(true)
            .bits(15, scr_base & 0x7FFF)
            .flag(true)
            .bits(9, 0)
            .flag(true)
            .bits(22, 25200)
            .flag(true)
            .flag(true)
            .bits(5, 0x1F)
            .bits(3, stuffing as u64)
            .bytes(&vec![0xFF; stuffing as usize])
            .finish()
    }

    fn mpeg1_pack(scr_base: u64) -> Vec<u8> {
        BitBuilder::new()
            .bytes(&[0, 0, 1, PACK_START_CODE])
            .pattern("0010")
            .bits(3, scr_base >> 30)
            .flag(true)
            .bits(15, (scr_base >> 15) & 0x7FFF)
            .flag(true)
            .bits(15, scr_base & 0x7FFF)
            .flag(true)
            .flag(true)
            .bits(22, 1000)
            .flag(true)
            .finish()
    }

    #[test]
    fn pack_headers() {
        let options = ParseOptions::default();

        let pack = mpeg2_pack(90_000, 2);
        let header = PackHeader::read(&options, &pack, 0).unwrap();
        assert!(header.mpeg2);
        assert_eq!(header.header_length, 16);
        assert_eq!(header.system_clock_reference, 90_000 * 300);
        assert_eq!(header.program_mux_rate, 25200);

        let pack = mpeg1_pack(45_000);
        let header = PackHeader::read(&options, &pack, 0).unwrap();
        assert!(!header.mpeg2);
        assert_eq!(pack.len(), 12);
        assert_eq!(header.header_length, 12);
        assert_eq!(header.system_clock_reference, 45_000 * 300);

        let err = PackHeader::read(&options, &[0, 0, 1, 0xBA, 0xC4, 0, 0, 0, 0, 0, 0, 0], 7).unwrap_err();
        assert!(matches!(err.downcast_ref::<PsError>(), Some(PsError::InvalidPackHeader(7))));
    }

    fn program_stream() -> Vec<u8> {
        let mut ps = mpeg2_pack(0, 0);
        ps.extend_from_slice(&[0, 0, 1, SYSTEM_HEADER_START_CODE, 0, 3, 0x80, 0x01, 0x01]);

        let mut video = SEQUENCE_HEADER_CODE.to_vec();
        video.extend_from_slice(&[0x55; 60]);
        ps.extend(mpeg2_packet(0xE0, Some(3600), &video, true));
        ps.extend(mpeg2_packet(0xC0, Some(3000), &[0x66; 40], true));

        let mut ac3 = vec![0x80, 0x01, 0x00, 0x01];
        ac3.extend_from_slice(&[0x0B, 0x77, 0x00, 0x00]);
        ps.extend(mpeg2_packet(PRIVATE_STREAM_1, Some(3000), &ac3, true));

        ps.extend_from_slice(&[0, 0, 1, PADDING_STREAM, 0, 4, 0xFF, 0xFF, 0xFF, 0xFF]);
        ps.extend(mpeg2_pack(3600, 0));
        ps.extend(mpeg2_packet(0xE0, Some(7200), &[0x77; 30], true));
        ps.extend_from_slice(&[0, 0, 1, PROGRAM_END_CODE]);
        ps
    }

    #[test]
    fn scan_streams() {
        let ps = program_stream();
        let mut reader = SourceReader::new(Cursor::new(ps));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        assert_eq!(scan.mpeg2, Some(true));
        assert_eq!(scan.pack_count, 2);
        assert_eq!(scan.pes_count, 5);
        assert!(scan.program_end);
        assert_eq!(scan.resync_count, 0);
        assert_eq!(scan.scr_duration_secs(), Some(0.04));
        assert_eq!(scan.maps.len(), 3);

        let video = &scan.maps[0];
        assert_eq!((video.codec, video.stream_id), (CodecId::Mpeg2Video, 0xE0));
        assert_eq!(video.sample_count(), 2);
        assert_eq!(video.sample(0).unwrap().sample_type, SampleType::VideoSync);
        assert_eq!(video.sample(0).unwrap().offset, 14 + 9 + 14);
        assert_eq!(video.sample(0).unwrap().size, 64);
        assert_eq!(video.sample(1).unwrap().sample_type, SampleType::Video);
        assert_eq!(video.sample(1).unwrap().pts, Some(7200));

        let audio = &scan.maps[1];
        assert_eq!(audio.codec, CodecId::MpegAudioLayer2);
        assert_eq!(audio.total_bytes(), 40);

        let ac3 = &scan.maps[2];
        assert_eq!((ac3.codec, ac3.stream_id), (CodecId::Ac3, 0xBD80));
        assert_eq!(ac3.total_bytes(), 4);
    }

    #[test]
    fn resync_after_garbage() {
        let mut ps = mpeg2_pack(0, 0);
        ps.extend_from_slice(&[0x12, 0x34, 0x00, 0x00, 0x01, 0x00, 0x56]);
        ps.extend(mpeg2_packet(0xC0, None, &[0x66; 10], true));

        let mut reader = SourceReader::new(Cursor::new(ps.clone()));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();
        assert_eq!(scan.resync_count, 1);
        assert_eq!(scan.skipped_bytes, 7);
        assert_eq!(scan.maps[0].total_bytes(), 10);

        let mut reader = SourceReader::new(Cursor::new(ps));
        assert!(super::scan(&ParseOptions::strict(), &mut reader).is_err());
    }

    #[test]
    fn mpeg1_system_stream() {
        let mut ps = mpeg1_pack(0);
        let mut packet = vec![0, 0, 1, 0xE0, 0, 9, 0x0F];
        packet.extend_from_slice(&[0x11; 8]);
        ps.extend(packet);

        let mut reader = SourceReader::new(Cursor::new(ps));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        assert_eq!(scan.mpeg2, Some(false));
        assert_eq!(scan.maps[0].codec, CodecId::Mpeg1Video);
        assert_eq!(scan.maps[0].sample(0).unwrap().offset, 12 + 7);
        assert_eq!(scan.maps[0].total_bytes(), 8);
    }

    #[test]
    fn not_a_program_stream() {
        let mut reader = SourceReader::new(Cursor::new(vec![0xAB; 64]));
        assert!(scan(&ParseOptions::default(), &mut reader).is_err());
    }
}
