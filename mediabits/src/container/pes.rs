//! PES packet headers (ISO/IEC 13818-1 2.4.3.6) shared by the transport and
//! program stream scanners, including the MPEG-1 system layer variant.

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;

use crate::log_or_err;
use crate::process::ParseOptions;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::PesError;

pub const PROGRAM_STREAM_MAP: u8 = 0xBC;
pub const PRIVATE_STREAM_1: u8 = 0xBD;
pub const PADDING_STREAM: u8 = 0xBE;
pub const PRIVATE_STREAM_2: u8 = 0xBF;

/// PTS/DTS clock.
pub const PES_TIMESCALE: u32 = 90_000;

/// Longest run of MPEG-1 stuffing bytes.
const MAX_MPEG1_STUFFING: usize = 16;

pub fn is_audio_stream(stream_id: u8) -> bool {
    (0xC0..=0xDF).contains(&stream_id)
}

pub fn is_video_stream(stream_id: u8) -> bool {
    (0xE0..=0xEF).contains(&stream_id)
}

/// Stream ids whose packets carry no optional header, Table 2-22.
fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        PROGRAM_STREAM_MAP | PADDING_STREAM | PRIVATE_STREAM_2 | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub pes_packet_length: u16,
    /// `false` for the MPEG-1 system layer syntax.
    pub mpeg2: bool,
    pub pes_scrambling_control: u8,
    pub data_alignment_indicator: bool,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// Bytes from the start code to the first payload byte.
    pub header_length: usize,
}

impl PesHeader {
    /// Parses the header at the start of `bytes`, which must begin with the
    /// `00 00 01` prefix.
    pub fn read(options: &ParseOptions, bytes: &[u8]) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(bytes);

        let prefix: u32 = reader.get_n(24)?;
        if prefix != 1 {
            bail!(PesError::InvalidStartCode(prefix));
        }

        let mut header = Self {
            stream_id: reader.get_n(8)?,
            pes_packet_length: reader.get_n(16)?,
            header_length: 6,
            ..Default::default()
        };

        if !has_optional_header(header.stream_id) {
            return Ok(header);
        }

        match bytes.get(6) {
            Some(byte) if byte >> 6 == 0b10 => header.read_mpeg2(options, reader, bytes.len())?,
            Some(_) => header.read_mpeg1(options, reader)?,
            None => bail!(PesError::HeaderTooLong(0)),
        }

        Ok(header)
    }

    fn read_mpeg2(&mut self, options: &ParseOptions, reader: &mut BsIoSliceReader, available: usize) -> Result<()> {
        self.mpeg2 = true;

        reader.skip_n(2)?;
        self.pes_scrambling_control = reader.get_n(2)?;
        reader.skip_n(1)?;
        self.data_alignment_indicator = reader.get()?;
        reader.skip_n(2)?;
        let pts_dts_flags: u8 = reader.get_n(2)?;
        reader.skip_n(6)?;
        let pes_header_data_length: u8 = reader.get_n(8)?;

        self.header_length = 9 + pes_header_data_length as usize;
        if self.header_length > available {
            bail!(PesError::HeaderTooLong(pes_header_data_length));
        }

        match pts_dts_flags {
            0b10 => self.pts = Some(Self::read_timestamp(options, reader, "PTS")?),
            0b11 => {
                self.pts = Some(Self::read_timestamp(options, reader, "PTS")?);
                self.dts = Some(Self::read_timestamp(options, reader, "DTS")?);
            }
            0b01 => log_or_err!(options, Warn, anyhow!(PesError::MissingMarker("PTS_DTS_flags"))),
            _ => {}
        }

        Ok(())
    }

    fn read_mpeg1(&mut self, options: &ParseOptions, reader: &mut BsIoSliceReader) -> Result<()> {
        let mut length = 6;

        let mut stuffing = 0;
        while reader.available()? >= 8 {
            let byte: u8 = reader.get_n(8)?;
            if byte != 0xFF {
                reader.seek(-8)?;
                break;
            }
            stuffing += 1;
            if stuffing > MAX_MPEG1_STUFFING {
                bail!(PesError::HeaderTooLong(stuffing as u8));
            }
        }
        length += stuffing;

        // STD_buffer_scale and STD_buffer_size
        if reader.get_n::<u8>(2)? == 0b01 {
            reader.skip_n(14)?;
            length += 2;
        } else {
            reader.seek(-2)?;
        }

        match reader.get_n::<u8>(4)? {
            0b0010 => {
                reader.seek(-4)?;
                self.pts = Some(Self::read_timestamp(options, reader, "PTS")?);
                length += 5;
            }
            0b0011 => {
                reader.seek(-4)?;
                self.pts = Some(Self::read_timestamp(options, reader, "PTS")?);
                self.dts = Some(Self::read_timestamp(options, reader, "DTS")?);
                length += 10;
            }
            _ => {
                // '0000 1111'
                reader.skip_n(4)?;
                length += 1;
            }
        }

        self.header_length = length;
        Ok(())
    }

    /// Four prefix bits then a 33-bit timestamp with marker bits.
    fn read_timestamp(options: &ParseOptions, reader: &mut BsIoSliceReader, what: &'static str) -> Result<u64> {
        reader.skip_n(4)?;
        let (timestamp, markers) = reader.get_timestamp33()?;
        if !markers {
            log_or_err!(options, Warn, anyhow!(PesError::MissingMarker(what)));
        }

        Ok(timestamp)
    }

    /// Payload bytes announced by PES_packet_length; `None` when unbounded.
    pub fn payload_length(&self) -> Option<usize> {
        (self.pes_packet_length != 0)
            .then(|| (6 + self.pes_packet_length as usize).saturating_sub(self.header_length))
    }

    /// Total packet size including the six byte prefix; `None` when
    /// unbounded.
    pub fn packet_size(&self) -> Option<usize> {
        (self.pes_packet_length != 0).then(|| 6 + self.pes_packet_length as usize)
    }
}

/// Encodes a 33-bit timestamp with the given four bit prefix.
#[cfg(test)]
pub(crate) fn encode_timestamp(prefix: u8, ts: u64) -> [u8; 5] {
    [
        (prefix << 4) | ((((ts >> 30) & 7) as u8) << 1) | 1,
        (ts >> 22) as u8,
        ((((ts >> 15) & 0x7F) as u8) << 1) | 1,
        (ts >> 7) as u8,
        (((ts & 0x7F) as u8) << 1) | 1,
    ]
}

/// A minimal MPEG-2 PES packet carrying `payload` with an optional PTS.
#[cfg(test)]
pub(crate) fn mpeg2_packet(stream_id: u8, pts: Option<u64>, payload: &[u8], bounded: bool) -> Vec<u8> {
    let mut optional = vec![0x80, 0x00, 0x00];
    if let Some(pts) = pts {
        optional[1] = 0x80;
        optional[2] = 5;
        optional.extend_from_slice(&encode_timestamp(0b0010, pts));
    }

    let length = if bounded { optional.len() + payload.len() } else { 0 };
    let mut packet = vec![0, 0, 1, stream_id, (length >> 8) as u8, length as u8];
    packet.extend_from_slice(&optional);
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpeg2_with_pts() {
        let packet = mpeg2_packet(0xE0, Some(0x1_2345_6789), &[9; 10], true);
        let header = PesHeader::read(&ParseOptions::default(), &packet).unwrap();

        assert!(header.mpeg2);
        assert_eq!(header.stream_id, 0xE0);
        assert_eq!(header.pts, Some(0x1_2345_6789));
        assert_eq!(header.dts, None);
        assert_eq!(header.header_length, 14);
        assert_eq!(header.payload_length(), Some(10));
        assert_eq!(header.packet_size(), Some(packet.len()));
    }

    #[test]
    fn unbounded_video_packet() {
        let packet = mpeg2_packet(0xE0, None, &[1, 2, 3], false);
        let header = PesHeader::read(&ParseOptions::default(), &packet).unwrap();

        assert_eq!(header.header_length, 9);
        assert_eq!(header.payload_length(), None);
    }

    #[test]
    fn mpeg1_with_stuffing_and_std_buffer() {
        let mut packet = vec![0, 0, 1, 0xC0, 0, 20, 0xFF, 0xFF, 0x40, 0x20];
        packet.extend_from_slice(&encode_timestamp(0b0010, 90_000));
        packet.extend_from_slice(&[0; 7]);
        let header = PesHeader::read(&ParseOptions::default(), &packet).unwrap();

        assert!(!header.mpeg2);
        assert_eq!(header.pts, Some(90_000));
        assert_eq!(header.header_length, 6 + 2 + 2 + 5);
        assert_eq!(header.payload_length(), Some(11));
    }

    #[test]
    fn mpeg1_without_timestamps() {
        let packet = [0, 0, 1, 0xE0, 0, 4, 0x0F, 1, 2, 3];
        let header = PesHeader::read(&ParseOptions::default(), &packet).unwrap();

        assert_eq!(header.pts, None);
        assert_eq!(header.header_length, 7);
    }

    #[test]
    fn padding_has_no_optional_header() {
        let packet = [0, 0, 1, PADDING_STREAM, 0, 2, 0xFF, 0xFF];
        let header = PesHeader::read(&ParseOptions::default(), &packet).unwrap();

        assert_eq!(header.header_length, 6);
        assert_eq!(header.payload_length(), Some(2));
    }

    #[test]
    fn missing_marker_policy() {
        let mut packet = mpeg2_packet(0xE0, Some(1000), &[], true);
        packet[13] &= 0xFE;

        assert!(PesHeader::read(&ParseOptions::default(), &packet).is_ok());
        assert!(PesHeader::read(&ParseOptions::strict(), &packet).is_err());
    }

    #[test]
    fn rejects_bad_prefix() {
        let err = PesHeader::read(&ParseOptions::default(), &[0, 0, 2, 0xE0, 0, 0]).unwrap_err();
        assert!(matches!(err.downcast_ref::<PesError>(), Some(PesError::InvalidStartCode(2))));
    }
}
