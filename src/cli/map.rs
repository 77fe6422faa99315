use anyhow::Result;
use indicatif::MultiProgress;
use serde::Serialize;

use super::command::{Cli, MapArgs};
use super::spinner;
use crate::timestamp::ticks_str;
use mediabits::bitstream::{BitstreamMap, Sample, SampleType};
use mediabits::process::media::{MediaReport, parse_media};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MapDocument {
    container: String,
    file_size: u64,
    streams: Vec<StreamDocument>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamDocument {
    #[serde(rename = "type")]
    stream_type: String,
    codec: String,
    stream_id: u32,
    timescale: u32,
    samples: Vec<SampleDocument>,
}

#[derive(Debug, Serialize)]
struct SampleDocument {
    #[serde(rename = "type")]
    sample_type: &'static str,
    offset: u64,
    size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dts: Option<i64>,
}

impl MapDocument {
    fn from_report(report: &MediaReport) -> Self {
        Self {
            container: report.container.to_string(),
            file_size: report.file_size,
            streams: report.streams.iter().map(|s| StreamDocument::from_map(&s.map)).collect(),
        }
    }
}

impl StreamDocument {
    fn from_map(map: &BitstreamMap) -> Self {
        Self {
            stream_type: map.stream_type.to_string(),
            codec: map.codec.to_string(),
            stream_id: map.stream_id,
            timescale: map.timescale,
            samples: map.samples().iter().map(SampleDocument::from).collect(),
        }
    }
}

impl From<&Sample> for SampleDocument {
    fn from(sample: &Sample) -> Self {
        Self {
            sample_type: sample_type_name(sample.sample_type),
            offset: sample.offset,
            size: sample.size,
            pts: sample.pts,
            dts: sample.dts,
        }
    }
}

fn sample_type_name(sample_type: SampleType) -> &'static str {
    match sample_type {
        SampleType::Unknown => "unknown",
        SampleType::Video => "video",
        SampleType::VideoSync => "sync",
        SampleType::VideoParameter => "parameter",
        SampleType::Audio => "audio",
        SampleType::Text => "text",
        SampleType::Other => "other",
    }
}

pub fn cmd_map(args: &MapArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let pb = spinner(multi, "Scanning...")?;
    let result = parse_media(&args.input, &cli.parse_options());
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let report = result?;

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&MapDocument::from_report(&report))?);
        return Ok(());
    }

    for (index, stream) in report.streams.iter().enumerate() {
        let map = &stream.map;
        println!(
            "Stream {index}: {} {} (id 0x{:X}), {} samples",
            map.stream_type,
            map.codec,
            map.stream_id,
            map.sample_count()
        );
        println!("{:>8}  {:>10}  {:>12}  {:>8}  {:>14}", "Index", "Type", "Offset", "Size", "PTS");

        for (i, sample) in map.samples().iter().enumerate() {
            let pts = sample.pts.map_or_else(String::new, |pts| ticks_str(pts, map.timescale));
            println!(
                "{i:>8}  {:>10}  {:>12}  {:>8}  {pts:>14}",
                sample_type_name(sample.sample_type),
                sample.offset,
                sample.size
            );
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediabits::bitstream::{CodecId, StreamType};

    #[test]
    fn yaml_document() {
        let mut map = BitstreamMap::new(StreamType::Audio, CodecId::Mp3)
            .with_id(1)
            .with_timescale(44100);
        map.push(Sample {
            sample_type: SampleType::Audio,
            size: 417,
            offset: 10,
            pts: Some(0),
            dts: None,
        });

        let yaml = serde_yaml_ng::to_string(&StreamDocument::from_map(&map)).unwrap();
        assert!(yaml.contains("codec: MPEG Audio Layer III"));
        assert!(yaml.contains("streamId: 1"));
        assert!(yaml.contains("pts: 0"));
        assert!(!yaml.contains("dts"));
    }
}
