use std::fmt::Display;

use anyhow::{Result, bail};
use log::debug;

use crate::codec::h264::H264NalUnitType;
use crate::codec::h265::H265NalUnitType;
use crate::container::mp3::FrameHeader;
use crate::container::mpeg_ts::{M2TS_PACKET_SIZE, SYNC_BYTE, TS_PACKET_SIZE};
use crate::utils::errors::ProbeError;

/// Leading bytes needed by [`probe`].
pub const PROBE_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Mp3,
    MpegTs,
    MpegPs,
    Riff,
    H264AnnexB,
    H265AnnexB,
}

impl Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContainerKind::Mp3 => "MPEG audio",
            ContainerKind::MpegTs => "MPEG-2 transport stream",
            ContainerKind::MpegPs => "MPEG program stream",
            ContainerKind::Riff => "RIFF",
            ContainerKind::H264AnnexB => "H.264 Annex B elementary stream",
            ContainerKind::H265AnnexB => "H.265 Annex B elementary stream",
        };
        write!(f, "{name}")
    }
}

impl ContainerKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        Some(match extension.to_ascii_lowercase().as_str() {
            "mp3" | "mp2" | "mp1" | "mpa" => Self::Mp3,
            "ts" | "m2ts" | "mts" | "tp" => Self::MpegTs,
            "mpg" | "mpeg" | "vob" | "ps" | "m2p" => Self::MpegPs,
            "wav" | "avi" | "rmi" => Self::Riff,
            "264" | "h264" | "avc" | "jsv" => Self::H264AnnexB,
            "265" | "h265" | "hevc" => Self::H265AnnexB,
            _ => return None,
        })
    }
}

/// Detects the container from the first bytes of a file. The extension only
/// breaks ties between Annex B codecs and names formats without a signature
/// in `head`.
pub fn probe(head: &[u8], extension: Option<&str>) -> Result<ContainerKind> {
    if head.is_empty() {
        bail!(ProbeError::EmptyFile);
    }

    let hint = extension.and_then(ContainerKind::from_extension);

    let kind = if head.starts_with(b"RIFF") {
        Some(ContainerKind::Riff)
    } else if head.starts_with(b"ID3") {
        Some(ContainerKind::Mp3)
    } else if is_transport_stream(head) {
        Some(ContainerKind::MpegTs)
    } else if head.starts_with(&[0, 0, 1, 0xBA]) {
        Some(ContainerKind::MpegPs)
    } else if let Some(kind) = annexb_codec(head, hint) {
        Some(kind)
    } else if is_mpeg_audio(head) {
        Some(ContainerKind::Mp3)
    } else {
        hint
    };

    match kind {
        Some(kind) => {
            debug!("Probed {kind} (extension {extension:?})");
            Ok(kind)
        }
        None => bail!(ProbeError::UnknownFormat),
    }
}

fn is_transport_stream(head: &[u8]) -> bool {
    let synced = |first: usize, step: usize| {
        let positions: Vec<usize> = (0..3).map(|i| first + i * step).filter(|&p| p < head.len()).collect();
        positions.len() >= 2 && positions.iter().all(|&p| head[p] == SYNC_BYTE)
    };

    synced(0, TS_PACKET_SIZE) || synced(M2TS_PACKET_SIZE - TS_PACKET_SIZE, M2TS_PACKET_SIZE)
}

fn is_mpeg_audio(head: &[u8]) -> bool {
    match head {
        [a, b, c, d, ..] => FrameHeader::parse_frame_full(u32::from_be_bytes([*a, *b, *c, *d])).is_ok(),
        _ => false,
    }
}

/// Scores the NAL headers after every start code in `head` against both
/// codecs.
fn annexb_codec(head: &[u8], hint: Option<ContainerKind>) -> Option<ContainerKind> {
    let leading_zeros = head.iter().take_while(|&&b| b == 0).count();
    if !(2..=3).contains(&leading_zeros) || head.get(leading_zeros) != Some(&1) {
        return None;
    }

    let mut h264 = (0, false);
    let mut h265 = (0, false);

    let mut index = 0;
    while let Some(pos) = head[index..].windows(3).position(|w| w == [0, 0, 1]) {
        let header = &head[index + pos + 3..];
        index += pos + 3;

        if let Some(&byte) = header.first() {
            let nal_unit_type = byte & 0x1F;
            if byte & 0x80 == 0 && (1..=23).contains(&nal_unit_type) {
                h264.0 += 1;
                h264.1 |= H264NalUnitType::from(nal_unit_type) == H264NalUnitType::Sps;
            }
        }

        if let [b0, b1, ..] = header {
            let nal_unit_type = (b0 >> 1) & 0x3F;
            let nuh_layer_id = ((b0 & 1) << 5) | (b1 >> 3);
            if b0 & 0x80 == 0 && nuh_layer_id == 0 && b1 & 7 != 0 && nal_unit_type <= 40 {
                h265.0 += 1;
                h265.1 |= H265NalUnitType::from(nal_unit_type) == H265NalUnitType::Sps;
            }
        }
    }

    let kind = match (h264, h265) {
        ((0, _), (0, _)) => return None,
        ((_, _), (0, _)) => ContainerKind::H264AnnexB,
        ((0, _), (_, _)) => ContainerKind::H265AnnexB,
        _ if matches!(hint, Some(ContainerKind::H264AnnexB | ContainerKind::H265AnnexB)) => hint?,
        ((_, true), (_, false)) => ContainerKind::H264AnnexB,
        ((_, false), (_, true)) => ContainerKind::H265AnnexB,
        ((a, _), (b, _)) if b > a => ContainerKind::H265AnnexB,
        _ => ContainerKind::H264AnnexB,
    };

    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures() {
        assert_eq!(probe(b"RIFF\x10\0\0\0WAVE", None).unwrap(), ContainerKind::Riff);
        assert_eq!(probe(b"ID3\x04\0\0\0\0\0\0", Some("bin")).unwrap(), ContainerKind::Mp3);
        assert_eq!(probe(&[0, 0, 1, 0xBA, 0x44], None).unwrap(), ContainerKind::MpegPs);
        assert_eq!(probe(&[0xFF, 0xFB, 0x90, 0x00], None).unwrap(), ContainerKind::Mp3);

        let mut ts = vec![0u8; TS_PACKET_SIZE * 3];
        ts[0] = SYNC_BYTE;
        ts[TS_PACKET_SIZE] = SYNC_BYTE;
        ts[TS_PACKET_SIZE * 2] = SYNC_BYTE;
        assert_eq!(probe(&ts, None).unwrap(), ContainerKind::MpegTs);

        let mut m2ts = vec![0u8; M2TS_PACKET_SIZE * 2];
        m2ts[4] = SYNC_BYTE;
        m2ts[4 + M2TS_PACKET_SIZE] = SYNC_BYTE;
        assert_eq!(probe(&m2ts, None).unwrap(), ContainerKind::MpegTs);
    }

    #[test]
    fn annexb_codecs() {
        let h264 = [0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, 0, 0, 1, 0x68, 0xCE, 0x38, 0x80];
        assert_eq!(probe(&h264, None).unwrap(), ContainerKind::H264AnnexB);

        let h265 = [0, 0, 0, 1, 0x40, 0x01, 0x0C, 0, 0, 1, 0x42, 0x01, 0x01, 0, 0, 1, 0x44, 0x01, 0xC1];
        assert_eq!(probe(&h265, None).unwrap(), ContainerKind::H265AnnexB);

        // 0x46 0x01 is an H.265 access unit delimiter and an H.264 SEI
        let ambiguous = [0, 0, 1, 0x46, 0x01, 0x50];
        assert_eq!(probe(&ambiguous, Some("hevc")).unwrap(), ContainerKind::H265AnnexB);
        assert_eq!(probe(&ambiguous, Some("264")).unwrap(), ContainerKind::H264AnnexB);
    }

    #[test]
    fn extension_fallback_and_failures() {
        assert_eq!(probe(&[0x12, 0x34, 0x56, 0x78], Some("MP3")).unwrap(), ContainerKind::Mp3);

        let err = probe(&[], None).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProbeError>(), Some(ProbeError::EmptyFile)));

        let err = probe(&[0x12, 0x34, 0x56, 0x78], Some("txt")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProbeError>(), Some(ProbeError::UnknownFormat)));
    }
}
