use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use log::{debug, info};

use crate::bitstream::{BitstreamMap, ByteSource, CodecId, MediaFile};
use crate::container::mp3::{FrameHeader, VbrHeader};
use crate::container::riff::WaveFormat;
use crate::container::{SourceReader, mp3, mpeg_ps, mpeg_ts, riff};
use crate::process::annexb::build_map;
use crate::process::h264::H264Parser;
use crate::process::h265::H265Parser;
use crate::process::probe::{ContainerKind, PROBE_SIZE, probe};
use crate::process::{NalRecord, ParseOptions, VideoInfo};
use crate::utils::errors::ProbeError;

/// Codec level description of one stream, when its syntax was parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecInfo {
    Video(VideoInfo),
    MpegAudio {
        header: FrameHeader,
        vbr: Option<VbrHeader>,
        average_bitrate: Option<u64>,
    },
    Wave(WaveFormat),
    None,
}

#[derive(Debug, Clone)]
pub struct StreamReport {
    pub map: BitstreamMap,
    pub info: CodecInfo,
    /// NAL units that failed to parse; always 0 for other codecs.
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct MediaReport {
    pub path: Option<PathBuf>,
    pub container: ContainerKind,
    pub file_size: u64,
    /// Container clock span (PCR or SCR) when one is present.
    pub duration_secs: Option<f64>,
    pub streams: Vec<StreamReport>,
}

impl MediaReport {
    pub fn sample_count(&self) -> usize {
        self.streams.iter().map(|s| s.map.sample_count()).sum()
    }

    /// The container clock span, else the longest stream.
    pub fn duration(&self) -> Option<f64> {
        self.duration_secs.or_else(|| {
            self.streams
                .iter()
                .filter_map(|s| s.map.duration_secs())
                .reduce(f64::max)
        })
    }
}

/// Probes and scans the file at `path`.
pub fn parse_media<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<MediaReport> {
    parse_media_with(path, options, |_| {})
}

/// Like [`parse_media`], also handing every NAL unit of an elementary
/// stream to `visit`.
pub fn parse_media_with<P, F>(path: P, options: &ParseOptions, visit: F) -> Result<MediaReport>
where
    P: AsRef<Path>,
    F: FnMut(NalRecord),
{
    let mut file = MediaFile::open(path)?;

    let mut head = vec![0; PROBE_SIZE];
    let filled = file.read_head(&mut head)?;
    head.truncate(filled);

    let container = probe(&head, file.extension().as_deref())?;
    info!("{}: {container}", file.path().display());

    let path = file.path().to_path_buf();
    let mut report = parse_source(file, container, options, visit)?;
    report.path = Some(path);

    Ok(report)
}

/// Scans `source` as `container`. Fails when no stream with at least one
/// sample is found.
pub fn parse_source<S, F>(source: S, container: ContainerKind, options: &ParseOptions, visit: F) -> Result<MediaReport>
where
    S: ByteSource,
    F: FnMut(NalRecord),
{
    let mut reader = SourceReader::new(source);
    let file_size = reader.size();
    let mut duration_secs = None;

    let streams = match container {
        ContainerKind::Mp3 => {
            let scan = mp3::scan(options, &mut reader)?;
            let average_bitrate = scan.average_bitrate();
            let info = match scan.first_header {
                Some(header) => CodecInfo::MpegAudio {
                    header,
                    vbr: scan.vbr,
                    average_bitrate,
                },
                None => CodecInfo::None,
            };
            vec![StreamReport {
                map: scan.map,
                info,
                errors: scan.crc_errors,
            }]
        }
        ContainerKind::MpegTs => {
            let scan = mpeg_ts::scan(options, &mut reader)?;
            duration_secs = scan.pcr_duration_secs();
            scan.maps.into_iter().map(container_stream).collect()
        }
        ContainerKind::MpegPs => {
            let scan = mpeg_ps::scan(options, &mut reader)?;
            duration_secs = scan.scr_duration_secs();
            scan.maps.into_iter().map(container_stream).collect()
        }
        ContainerKind::Riff => {
            let scan = riff::scan(options, &mut reader)?;
            let info = scan.format.map_or(CodecInfo::None, CodecInfo::Wave);
            scan.map
                .into_iter()
                .map(|map| StreamReport {
                    map,
                    info: info.clone(),
                    errors: 0,
                })
                .collect()
        }
        ContainerKind::H264AnnexB | ContainerKind::H265AnnexB => {
            let codec = if container == ContainerKind::H264AnnexB {
                CodecId::H264
            } else {
                CodecId::H265
            };
            let map = build_map(&mut reader, codec)?;
            vec![parse_elementary(reader.into_inner(), map, options, visit)?]
        }
    };

    let streams: Vec<StreamReport> = streams.into_iter().filter(|s| !s.map.is_empty()).collect();
    if streams.is_empty() {
        bail!(ProbeError::NoStreams(container.to_string()));
    }

    debug!("{} stream(s), {file_size} bytes", streams.len());

    Ok(MediaReport {
        path: None,
        container,
        file_size,
        duration_secs,
        streams,
    })
}

fn container_stream(map: BitstreamMap) -> StreamReport {
    StreamReport {
        map,
        info: CodecInfo::None,
        errors: 0,
    }
}

fn parse_elementary<S, F>(source: S, map: BitstreamMap, options: &ParseOptions, visit: F) -> Result<StreamReport>
where
    S: ByteSource,
    F: FnMut(NalRecord),
{
    let (info, errors) = match map.codec {
        CodecId::H264 => {
            let mut parser = H264Parser::new(*options);
            parser.parse_map(source, &map, visit)?;
            (parser.video_info(), parser.stats().errors)
        }
        _ => {
            let mut parser = H265Parser::new(*options);
            parser.parse_map(source, &map, visit)?;
            (parser.video_info(), parser.stats().errors)
        }
    };

    Ok(StreamReport {
        map,
        info: info.map_or(CodecInfo::None, CodecInfo::Video),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::bitstream::StreamType;
    use crate::container::mpeg_ts::tests::sample_stream;
    use crate::process::h264::tests::baseline_stream;

    fn parse(data: Vec<u8>, container: ContainerKind) -> Result<MediaReport> {
        parse_source(Cursor::new(data), container, &ParseOptions::default(), |_| {})
    }

    #[test]
    fn annexb_report() {
        let mut types = Vec::new();
        let report = parse_source(
            Cursor::new(baseline_stream()),
            ContainerKind::H264AnnexB,
            &ParseOptions::default(),
            |record| types.push(record.nal_unit_type),
        )
        .unwrap();

        assert_eq!(types, vec![7, 8, 5, 1, 1]);
        assert_eq!(report.streams.len(), 1);

        let stream = &report.streams[0];
        assert_eq!(stream.errors, 1);
        assert_eq!(stream.map.stream_type, StreamType::Video);
        match &stream.info {
            CodecInfo::Video(info) => assert_eq!((info.width, info.height), (320, 240)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn container_reports() {
        let report = parse(sample_stream(), ContainerKind::MpegTs).unwrap();
        assert_eq!(report.streams.len(), 2);
        assert_eq!(report.sample_count(), 3);
        assert_eq!(report.streams[0].info, CodecInfo::None);

        let frame = {
            let mut frame = vec![0; 417];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x40]);
            frame
        };
        let report = parse(frame.repeat(3), ContainerKind::Mp3).unwrap();
        assert_eq!(report.sample_count(), 3);
        match report.streams[0].info {
            CodecInfo::MpegAudio { header, .. } => assert_eq!(header.bitrate, 128_000),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nothing_to_report() {
        let err = parse(vec![0x12; 64], ContainerKind::H265AnnexB).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProbeError>(), Some(ProbeError::NoStreams(_))));
    }

    #[test]
    fn parse_file() {
        let path = std::env::temp_dir().join(format!("mediabits-{}.264", std::process::id()));
        std::fs::write(&path, baseline_stream()).unwrap();

        let report = parse_media(&path, &ParseOptions::default());
        std::fs::remove_file(&path).unwrap();

        let report = report.unwrap();
        assert_eq!(report.container, ContainerKind::H264AnnexB);
        assert_eq!(report.path.as_deref(), Some(path.as_path()));
        assert_eq!(report.streams[0].map.sample_count(), 5);

        let missing = parse_media(std::env::temp_dir().join("mediabits-missing.ts"), &ParseOptions::default());
        assert!(missing.is_err());
    }
}
