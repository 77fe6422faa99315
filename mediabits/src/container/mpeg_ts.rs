//! MPEG-2 transport streams (ISO/IEC 13818-1 2.4.3), including the 192 byte
//! M2TS packet variant.
//!
//! PAT and PMT sections are reassembled per PID and CRC checked. Every
//! elementary PID announced by a PMT gets its own map whose samples are the
//! packet payloads that follow the PES headers.

use std::collections::BTreeMap;
use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace, warn};

use super::SourceReader;
use super::pes::{PES_TIMESCALE, PesHeader};
use crate::bitstream::{BitstreamMap, ByteSource, CodecId, Sample, SampleType, StreamType};
use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::{CRC_MPEG2_SECTION_ALG, Crc32};
use crate::utils::errors::TsError;

pub const TS_PACKET_SIZE: usize = 188;
pub const M2TS_PACKET_SIZE: usize = 192;
pub const SYNC_BYTE: u8 = 0x47;

pub const PAT_PID: u16 = 0x0000;
pub const NULL_PID: u16 = 0x1FFF;

pub const PAT_TABLE_ID: u8 = 0x00;
pub const PMT_TABLE_ID: u8 = 0x02;

/// PCR clock.
pub const PCR_TIMESCALE: u64 = 27_000_000;

/// Packets checked in a row before a packet size is trusted.
const SYNC_CONFIRMATIONS: usize = 3;

/// Maps a PMT stream_type onto the stream kind and codec, Table 2-34.
pub fn codec_for_stream_type(stream_type: u8) -> (StreamType, CodecId) {
    match stream_type {
        0x01 => (StreamType::Video, CodecId::Mpeg1Video),
        0x02 => (StreamType::Video, CodecId::Mpeg2Video),
        0x03 | 0x04 => (StreamType::Audio, CodecId::MpegAudioLayer2),
        0x0F | 0x11 => (StreamType::Audio, CodecId::Aac),
        0x10 => (StreamType::Video, CodecId::Mpeg4Part2),
        0x1B => (StreamType::Video, CodecId::H264),
        0x24 => (StreamType::Video, CodecId::H265),
        0x80 => (StreamType::Audio, CodecId::Lpcm),
        0x81 => (StreamType::Audio, CodecId::Ac3),
        0x90 | 0x92 => (StreamType::Text, CodecId::Unknown),
        _ => (StreamType::Data, CodecId::Unknown),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TsPacketHeader {
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub transport_scrambling_control: u8,
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
}

impl TsPacketHeader {
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0b10 != 0
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0b01 != 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationField {
    pub adaptation_field_length: u8,
    pub discontinuity_indicator: bool,
    pub random_access_indicator: bool,
    pub elementary_stream_priority_indicator: bool,
    /// program_clock_reference in 27 MHz units.
    pub pcr: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TsPacket {
    pub header: TsPacketHeader,
    pub adaptation_field: Option<AdaptationField>,
    /// Payload start within the 188 byte packet.
    pub payload_offset: usize,
}

impl TsPacket {
    /// Parses the 188 byte packet at the start of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(bytes.get(..TS_PACKET_SIZE).unwrap_or(bytes));

        let sync: u8 = reader.get_n(8)?;
        if sync != SYNC_BYTE {
            bail!(TsError::LostSync(0));
        }

        let header = TsPacketHeader {
            transport_error_indicator: reader.get()?,
            payload_unit_start_indicator: reader.get()?,
            transport_priority: reader.get()?,
            pid: reader.get_n(13)?,
            transport_scrambling_control: reader.get_n(2)?,
            adaptation_field_control: reader.get_n(2)?,
            continuity_counter: reader.get_n(4)?,
        };

        let mut packet = Self {
            header,
            adaptation_field: None,
            payload_offset: 4,
        };

        if header.has_adaptation_field() {
            let adaptation_field_length: u8 = reader.get_n(8)?;
            if adaptation_field_length > 183 {
                bail!(TsError::AdaptationFieldTooLong(adaptation_field_length));
            }

            let mut field = AdaptationField {
                adaptation_field_length,
                ..Default::default()
            };

            if adaptation_field_length > 0 {
                field.discontinuity_indicator = reader.get()?;
                field.random_access_indicator = reader.get()?;
                field.elementary_stream_priority_indicator = reader.get()?;
                let pcr_flag = reader.get()?;
                reader.skip_n(4)?;

                if pcr_flag && adaptation_field_length >= 7 {
                    let base: u64 = reader.get_n(33)?;
                    reader.skip_n(6)?;
                    let extension: u64 = reader.get_n(9)?;
                    field.pcr = Some(base * 300 + extension);
                }
            }

            packet.adaptation_field = Some(field);
            packet.payload_offset = 5 + adaptation_field_length as usize;
        }

        Ok(packet)
    }

    pub fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        if !self.header.has_payload() {
            return &[];
        }

        bytes
            .get(self.payload_offset..TS_PACKET_SIZE.min(bytes.len()))
            .unwrap_or_default()
    }
}

/// A PSI section with the common long-form header, 2.4.4.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsiSection {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub section_length: u16,
    pub table_id_extension: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    /// Bytes after last_section_number, CRC_32 excluded.
    pub body: Vec<u8>,
}

impl PsiSection {
    /// Parses one complete section and checks its CRC_32.
    pub fn read(crc: &Crc32, bytes: &[u8]) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(bytes);

        let mut section = Self {
            table_id: reader.get_n(8)?,
            section_syntax_indicator: reader.get()?,
            ..Default::default()
        };
        reader.skip_n(3)?;
        section.section_length = reader.get_n(12)?;

        let total = 3 + section.section_length as usize;
        if total > bytes.len() || section.section_length < 9 {
            bail!(TsError::SectionTooLong(section.section_length));
        }

        // the CRC register over a section including its CRC_32 ends at zero
        if reader.crc32_check(crc, 0, total as u64 * 8)? != 0 {
            let calculated = reader.crc32_check(crc, 0, (total as u64 - 4) * 8)?;
            bail!(TsError::CrcMismatch {
                table_id: section.table_id,
                calculated,
            });
        }

        section.table_id_extension = reader.get_n(16)?;
        reader.skip_n(2)?;
        section.version_number = reader.get_n(5)?;
        section.current_next_indicator = reader.get()?;
        section.section_number = reader.get_n(8)?;
        section.last_section_number = reader.get_n(8)?;
        section.body = bytes[8..total - 4].to_vec();

        Ok(section)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsElementaryStream {
    pub pid: u16,
    pub stream_type: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsProgram {
    pub program_number: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub streams: Vec<TsElementaryStream>,
}

/// program_association_section body: (program_number, PID) pairs. Program
/// number 0 points at the network PID.
pub fn read_pat(section: &PsiSection) -> Result<Vec<(u16, u16)>> {
    if section.table_id != PAT_TABLE_ID {
        bail!(TsError::UnexpectedTable {
            read: section.table_id,
            expected: PAT_TABLE_ID,
        });
    }

    section
        .body
        .chunks_exact(4)
        .map(|entry| -> Result<(u16, u16)> {
            let reader = &mut BsIoSliceReader::from_slice(entry);
            let program_number: u16 = reader.get_n(16)?;
            reader.skip_n(3)?;
            let pid: u16 = reader.get_n(13)?;
            Ok((program_number, pid))
        })
        .collect()
}

/// TS_program_map_section body.
pub fn read_pmt(section: &PsiSection, pmt_pid: u16) -> Result<TsProgram> {
    if section.table_id != PMT_TABLE_ID {
        bail!(TsError::UnexpectedTable {
            read: section.table_id,
            expected: PMT_TABLE_ID,
        });
    }

    let reader = &mut BsIoSliceReader::from_slice(&section.body);
    let mut program = TsProgram {
        program_number: section.table_id_extension,
        pmt_pid,
        ..Default::default()
    };

    reader.skip_n(3)?;
    program.pcr_pid = reader.get_n(13)?;
    reader.skip_n(4)?;
    let program_info_length: u32 = reader.get_n(12)?;
    reader.skip_n(program_info_length * 8)?;

    while reader.available()? >= 40 {
        let stream_type: u8 = reader.get_n(8)?;
        reader.skip_n(3)?;
        let pid: u16 = reader.get_n(13)?;
        reader.skip_n(4)?;
        let es_info_length: u32 = reader.get_n(12)?;
        reader.skip_n(es_info_length * 8)?;

        program.streams.push(TsElementaryStream { pid, stream_type });
    }

    Ok(program)
}

/// Collects section bytes spread over consecutive packets of one PID.
#[derive(Debug, Default)]
struct SectionBuffer {
    data: Vec<u8>,
    active: bool,
}

impl SectionBuffer {
    fn expected_len(&self) -> Option<usize> {
        (self.data.len() >= 3).then(|| 3 + ((((self.data[1] as usize) & 0x0F) << 8) | self.data[2] as usize))
    }

    /// Feeds one packet payload; returns a completed section.
    fn push(&mut self, payload: &[u8], unit_start: bool) -> Option<Vec<u8>> {
        if unit_start {
            let pointer_field = *payload.first()? as usize;
            let start = (1 + pointer_field).min(payload.len());
            self.data.clear();
            self.data.extend_from_slice(&payload[start..]);
            self.active = true;
        } else if self.active {
            self.data.extend_from_slice(payload);
        } else {
            return None;
        }

        let expected = self.expected_len()?;
        if self.data.len() < expected {
            return None;
        }

        self.active = false;
        self.data.truncate(expected);
        Some(std::mem::take(&mut self.data))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TsScan {
    pub packet_size: usize,
    pub packet_count: u64,
    pub resync_count: usize,
    pub crc_errors: usize,
    pub continuity_errors: usize,
    pub programs: Vec<TsProgram>,
    pub first_pcr: Option<u64>,
    pub last_pcr: Option<u64>,
    pub maps: Vec<BitstreamMap>,
}

impl TsScan {
    pub fn pcr_duration_secs(&self) -> Option<f64> {
        let (first, last) = (self.first_pcr?, self.last_pcr?);
        (last > first).then(|| (last - first) as f64 / PCR_TIMESCALE as f64)
    }
}

/// First packet offset and packet size, confirmed by consecutive sync bytes.
pub fn detect_packet_size<S: ByteSource>(reader: &mut SourceReader<S>) -> Result<Option<(u64, usize)>> {
    let probe = reader.bytes(0, M2TS_PACKET_SIZE * (SYNC_CONFIRMATIONS + 1))?.to_vec();

    for start in 0..TS_PACKET_SIZE.min(probe.len()) {
        for packet_size in [TS_PACKET_SIZE, M2TS_PACKET_SIZE] {
            let sync_offset = packet_size - TS_PACKET_SIZE;
            let confirmed = (0..SYNC_CONFIRMATIONS)
                .map(|i| start + sync_offset + i * packet_size)
                .take_while(|&p| p < probe.len())
                .all(|p| probe[p] == SYNC_BYTE);
            let seen = start + sync_offset < probe.len();

            if seen && confirmed {
                return Ok(Some((start as u64, packet_size)));
            }
        }
    }

    Ok(None)
}

struct EsState {
    map_index: usize,
    is_video: bool,
    continuity_counter: Option<u8>,
}

pub fn scan<S: ByteSource>(options: &ParseOptions, reader: &mut SourceReader<S>) -> Result<TsScan> {
    let size = reader.size();
    let crc = Crc32::new(&CRC_MPEG2_SECTION_ALG);

    let Some((mut pos, packet_size)) = detect_packet_size(reader)? else {
        bail!(TsError::LostSync(0));
    };
    let sync_offset = (packet_size - TS_PACKET_SIZE) as u64;

    let mut scan = TsScan {
        packet_size,
        ..Default::default()
    };

    let mut sections: HashMap<u16, SectionBuffer> = HashMap::new();
    let mut pmt_pids: BTreeMap<u16, u16> = BTreeMap::new();
    let mut streams: HashMap<u16, EsState> = HashMap::new();

    sections.insert(PAT_PID, SectionBuffer::default());

    while pos + packet_size as u64 <= size {
        let bytes = reader.exact(pos + sync_offset, TS_PACKET_SIZE)?.to_vec();

        if bytes[0] != SYNC_BYTE {
            log_or_err!(options, Warn, anyhow!(TsError::LostSync(pos)));
            scan.resync_count += 1;
            match resync(reader, pos + 1, packet_size)? {
                Some(next) => {
                    debug!("TS sync regained at {next} after {} bytes", next - pos);
                    pos = next;
                    continue;
                }
                None => break,
            }
        }

        let packet_offset = pos + sync_offset;
        pos += packet_size as u64;
        scan.packet_count += 1;

        let packet = match TsPacket::read(&bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Packet at {packet_offset}: {e}");
                continue;
            }
        };
        let header = packet.header;

        if header.transport_error_indicator {
            debug!("Packet at {packet_offset} on PID {:#06X} flagged as erroneous", header.pid);
            continue;
        }
        if header.pid == NULL_PID {
            continue;
        }

        if let Some(pcr) = packet.adaptation_field.and_then(|af| af.pcr) {
            scan.first_pcr.get_or_insert(pcr);
            scan.last_pcr = Some(pcr);
        }

        let payload = packet.payload(&bytes);
        if payload.is_empty() {
            continue;
        }

        if let Some(buffer) = sections.get_mut(&header.pid) {
            let Some(section_bytes) = buffer.push(payload, header.payload_unit_start_indicator) else {
                continue;
            };

            let section = match PsiSection::read(&crc, &section_bytes) {
                Ok(section) => section,
                Err(e) => {
                    if matches!(e.downcast_ref::<TsError>(), Some(TsError::CrcMismatch { .. })) {
                        scan.crc_errors += 1;
                    }
                    log_or_err!(options, Warn, e);
                    continue;
                }
            };

            if header.pid == PAT_PID {
                let programs = match read_pat(&section) {
                    Ok(programs) => programs,
                    Err(e) => {
                        log_or_err!(options, Warn, e);
                        continue;
                    }
                };
                for (program_number, pid) in programs {
                    if program_number != 0 && pmt_pids.insert(pid, program_number).is_none() {
                        debug!("Program {program_number} -> PMT PID {pid:#06X}");
                        sections.entry(pid).or_default();
                    }
                }
            } else if section.table_id == PMT_TABLE_ID && pmt_pids.contains_key(&header.pid) {
                let program = read_pmt(&section, header.pid)?;
                register_program(&mut scan, &mut streams, &program);
                if let Some(existing) = scan.programs.iter_mut().find(|p| p.pmt_pid == header.pid) {
                    *existing = program;
                } else {
                    scan.programs.push(program);
                }
            }
            continue;
        }

        let Some(es) = streams.get_mut(&header.pid) else {
            continue;
        };

        let discontinuity = packet.adaptation_field.is_some_and(|af| af.discontinuity_indicator);
        if let Some(last) = es.continuity_counter {
            let expected = (last + 1) & 0x0F;
            if !discontinuity && header.continuity_counter != expected && header.continuity_counter != last {
                scan.continuity_errors += 1;
                debug!(
                    "PID {:#06X}: continuity_counter {} after {last} at {packet_offset}",
                    header.pid, header.continuity_counter
                );
            }
        }
        es.continuity_counter = Some(header.continuity_counter);

        let payload_start = packet_offset + packet.payload_offset as u64;
        let mut sample = Sample {
            sample_type: if es.is_video { SampleType::Video } else { SampleType::Audio },
            size: payload.len() as u32,
            offset: payload_start,
            pts: None,
            dts: None,
        };

        if header.payload_unit_start_indicator && header.transport_scrambling_control == 0 {
            match PesHeader::read(options, payload) {
                Ok(pes) => {
                    let header_length = pes.header_length.min(payload.len());
                    sample.offset += header_length as u64;
                    sample.size -= header_length as u32;
                    sample.pts = pes.pts.map(|pts| pts as i64);
                    sample.dts = pes.dts.or(pes.pts).map(|dts| dts as i64);
                    trace!("PES on PID {:#06X} at {packet_offset}: pts {:?}", header.pid, pes.pts);
                }
                Err(e) => log_or_err!(
                    options,
                    Warn,
                    anyhow!("PES header on PID {:#06X} at {packet_offset}: {e}", header.pid)
                ),
            }

            let random_access = packet.adaptation_field.is_some_and(|af| af.random_access_indicator);
            if es.is_video && random_access {
                sample.sample_type = SampleType::VideoSync;
            }
        }

        if sample.size > 0 {
            scan.maps[es.map_index].push(sample);
        }
    }

    if scan.resync_count > 0 {
        warn!("Transport stream lost sync {} time(s)", scan.resync_count);
    }

    Ok(scan)
}

fn register_program(scan: &mut TsScan, streams: &mut HashMap<u16, EsState>, program: &TsProgram) {
    for es in &program.streams {
        if streams.contains_key(&es.pid) {
            continue;
        }

        let (stream_type, codec) = codec_for_stream_type(es.stream_type);
        debug!(
            "Program {}: PID {:#06X} stream_type {:#04X} ({codec})",
            program.program_number, es.pid, es.stream_type
        );

        scan.maps.push(
            BitstreamMap::new(stream_type, codec)
                .with_id(es.pid as u32)
                .with_timescale(PES_TIMESCALE),
        );
        streams.insert(
            es.pid,
            EsState {
                map_index: scan.maps.len() - 1,
                is_video: stream_type == StreamType::Video,
                continuity_counter: None,
            },
        );
    }
}

/// Next offset after `from` holding a sync byte that is followed by another
/// one a packet later (or by the end of the file).
fn resync<S: ByteSource>(reader: &mut SourceReader<S>, from: u64, packet_size: usize) -> Result<Option<u64>> {
    let size = reader.size();
    let sync_offset = (packet_size - TS_PACKET_SIZE) as u64;
    let mut candidate = from;

    while let Some(found) = reader.find(candidate + sync_offset, &[SYNC_BYTE])? {
        let start = found - sync_offset;
        let next = found + packet_size as u64;
        if next >= size || reader.bytes(next, 1)? == [SYNC_BYTE] {
            return Ok(Some(start));
        }
        candidate = start + 1;
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::container::pes::mpeg2_packet;

    /// A packet carrying `payload`, padded with adaptation field stuffing.
    pub(crate) fn packet(pid: u16, unit_start: bool, cc: u8, payload: &[u8], flags: u8) -> Vec<u8> {
        assert!(payload.len() <= 184);
        let mut packet = vec![
            SYNC_BYTE,
            ((unit_start as u8) << 6) | (pid >> 8) as u8,
            pid as u8,
            0x10 | (cc & 0x0F),
        ];

        if payload.len() < 184 {
            packet[3] |= 0x20;
            let adaptation_field_length = 183 - payload.len();
            packet.push(adaptation_field_length as u8);
            if adaptation_field_length > 0 {
                packet.push(flags);
                packet.resize(5 + adaptation_field_length, 0xFF);
            }
        }

        packet.extend_from_slice(payload);
        assert_eq!(packet.len(), TS_PACKET_SIZE);
        packet
    }

    pub(crate) fn section(table_id: u8, extension: u16, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut section = vec![
            table_id,
            0xB0 | (section_length >> 8) as u8,
            section_length as u8,
            (extension >> 8) as u8,
            extension as u8,
            0xC1,
            0,
            0,
        ];
        section.extend_from_slice(body);
        let crc = Crc32::new(&CRC_MPEG2_SECTION_ALG).checksum(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    pub(crate) fn psi_packet(pid: u16, section: &[u8]) -> Vec<u8> {
        let mut payload = vec![0];
        payload.extend_from_slice(section);
        packet(pid, true, 0, &payload, 0)
    }

    pub(crate) fn pat(pmt_pid: u16) -> Vec<u8> {
        section(PAT_TABLE_ID, 1, &[0, 1, 0xE0 | (pmt_pid >> 8) as u8, pmt_pid as u8])
    }

    pub(crate) fn pmt(streams: &[(u8, u16)]) -> Vec<u8> {
        let mut body = vec![0xE1, 0x00, 0xF0, 0x00];
        for &(stream_type, pid) in streams {
            body.extend_from_slice(&[stream_type, 0xE0 | (pid >> 8) as u8, pid as u8, 0xF0, 0x00]);
        }
        section(PMT_TABLE_ID, 1, &body)
    }

    #[test]
    fn packet_with_pcr() {
        let mut bytes = packet(0x100, false, 3, &[0xAB; 176], 0x10);
        // PCR base 90000 (1 s), extension 12
        let base: u64 = 90_000;
        let pcr = (base << 15) | (0x3F << 9) | 12;
        bytes[6..12].copy_from_slice(&pcr.to_be_bytes()[2..]);

        let packet = TsPacket::read(&bytes).unwrap();
        assert_eq!(packet.header.pid, 0x100);
        assert_eq!(packet.header.continuity_counter, 3);
        let af = packet.adaptation_field.unwrap();
        assert_eq!(af.pcr, Some(90_000 * 300 + 12));
        assert_eq!(packet.payload(&bytes), &[0xAB; 176]);
    }

    #[test]
    fn pat_and_pmt_sections() {
        let crc = Crc32::new(&CRC_MPEG2_SECTION_ALG);

        let pat_section = PsiSection::read(&crc, &pat(0x1000)).unwrap();
        assert_eq!(read_pat(&pat_section).unwrap(), vec![(1, 0x1000)]);
        assert!(read_pmt(&pat_section, 0x1000).is_err());

        let pmt_section = PsiSection::read(&crc, &pmt(&[(0x1B, 0x100), (0x0F, 0x101)])).unwrap();
        let program = read_pmt(&pmt_section, 0x1000).unwrap();
        assert_eq!(program.pcr_pid, 0x100);
        assert_eq!(program.streams.len(), 2);
        assert_eq!(program.streams[1], TsElementaryStream { pid: 0x101, stream_type: 0x0F });

        let mut corrupt = pmt(&[(0x1B, 0x100)]);
        corrupt[10] ^= 0x01;
        let err = PsiSection::read(&crc, &corrupt).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TsError>(),
            Some(TsError::CrcMismatch { table_id: PMT_TABLE_ID, .. })
        ));
    }

    pub(crate) fn sample_stream() -> Vec<u8> {
        let video = mpeg2_packet(0xE0, Some(3600), &[0x11; 200], false);
        let audio = mpeg2_packet(0xC0, Some(3000), &[0x22; 50], true);

        let mut ts = Vec::new();
        ts.extend(psi_packet(PAT_PID, &pat(0x1000)));
        ts.extend(psi_packet(0x1000, &pmt(&[(0x1B, 0x100), (0x03, 0x101)])));
        ts.extend(packet(0x100, true, 0, &video[..184], 0));
        ts.extend(packet(0x100, false, 1, &video[184..], 0));
        ts.extend(packet(0x101, true, 0, &audio, 0));
        ts
    }

    #[test]
    fn scan_programs_and_pes() {
        let mut ts = sample_stream();
        ts.extend_from_slice(&[0x00; 7]);
        ts.extend(packet(0x101, false, 1, &[0x33; 184], 0));

        let mut reader = SourceReader::new(Cursor::new(ts));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        assert_eq!(scan.packet_size, TS_PACKET_SIZE);
        assert_eq!(scan.packet_count, 6);
        assert_eq!(scan.resync_count, 1);
        assert_eq!(scan.programs.len(), 1);
        assert_eq!(scan.maps.len(), 2);

        let video = &scan.maps[0];
        assert_eq!((video.codec, video.stream_id), (CodecId::H264, 0x100));
        assert_eq!(video.sample_count(), 2);
        let first = video.sample(0).unwrap();
        assert_eq!(first.offset, 2 * 188 + 4 + 14);
        assert_eq!(first.size, 184 - 14);
        assert_eq!(first.pts, Some(3600));
        assert_eq!(video.total_bytes(), 200);

        let audio = &scan.maps[1];
        assert_eq!(audio.codec, CodecId::MpegAudioLayer2);
        assert_eq!(audio.sample_count(), 2);
        assert_eq!(audio.sample(0).unwrap().size, 50);
        assert_eq!(audio.sample(1).unwrap().offset, 5 * 188 + 7 + 4);
    }

    #[test]
    fn corrupt_pat_policy() {
        let mut ts = sample_stream();
        // last byte of the PAT CRC_32
        ts[187] ^= 0x40;

        let mut reader = SourceReader::new(Cursor::new(ts.clone()));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();
        assert_eq!(scan.crc_errors, 1);
        assert!(scan.maps.is_empty());

        let mut reader = SourceReader::new(Cursor::new(ts));
        assert!(super::scan(&ParseOptions::strict(), &mut reader).is_err());
    }

    #[test]
    fn m2ts_packets() {
        let mut m2ts = Vec::new();
        for packet in sample_stream().chunks(TS_PACKET_SIZE) {
            m2ts.extend_from_slice(&[0, 0, 0, 0]);
            m2ts.extend_from_slice(packet);
        }

        let mut reader = SourceReader::new(Cursor::new(m2ts));
        let scan = scan(&ParseOptions::default(), &mut reader).unwrap();

        assert_eq!(scan.packet_size, M2TS_PACKET_SIZE);
        assert_eq!(scan.maps[0].sample(0).unwrap().offset, 2 * 192 + 4 + 4 + 14);
    }
}
