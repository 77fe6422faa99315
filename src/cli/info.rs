use anyhow::Result;
use indicatif::MultiProgress;

use super::command::{Cli, InputArgs};
use super::spinner;
use crate::timestamp::time_str;
use mediabits::bitstream::SampleType;
use mediabits::container::mp3::VbrHeader;
use mediabits::process::VideoInfo;
use mediabits::process::media::{CodecInfo, MediaReport, StreamReport, parse_media};

pub fn cmd_info(args: &InputArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing: {}", args.input.display());

    let pb = spinner(multi, "Scanning...")?;
    let result = parse_media(&args.input, &cli.parse_options());
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    display_report(&result?);

    Ok(())
}

fn display_report(report: &MediaReport) {
    println!();
    println!("Container Information");
    println!("=====================");
    println!();
    println!("  Format                    {}", report.container);

    let size_mb = report.file_size as f64 / 1_000_000.0;
    println!(
        "  Size                      {size_mb:.2} MB ({} bytes)",
        report.file_size
    );
    if let Some(duration) = report.duration() {
        println!("  Duration                  {}", time_str(duration));
    }
    println!("  Streams                   {}", report.streams.len());
    println!();

    for (index, stream) in report.streams.iter().enumerate() {
        display_stream(index, stream);
    }
}

fn display_stream(index: usize, stream: &StreamReport) {
    let map = &stream.map;

    println!("Stream {index}");
    println!("  Type                      {}", map.stream_type);
    println!("  Codec                     {}", map.codec);
    if map.stream_id != 0 {
        println!("  Stream ID                 0x{:X}", map.stream_id);
    }
    println!("  Samples                   {}", map.sample_count());

    let sync = map.count_of(SampleType::VideoSync);
    if sync > 0 {
        println!("  Random access points      {sync}");
    }
    println!("  Payload                   {} bytes", map.total_bytes());

    if let Some(duration) = map.duration_secs() {
        println!("  Duration                  {}", time_str(duration));
        if duration > 0.0 {
            let kbps = map.total_bytes() as f64 * 8.0 / (duration * 1000.0);
            println!("  Average data rate         {kbps:.1} kbps");
        }
    }

    match &stream.info {
        CodecInfo::Video(video) => display_video(video),
        CodecInfo::MpegAudio {
            header,
            vbr,
            average_bitrate,
        } => {
            println!("  Version / layer           {} {}", header.version, header.layer);
            println!("  Sampling rate             {} Hz", header.sample_rate);
            println!("  Channels                  {}", header.channels());
            println!("  First frame bitrate       {} kbps", header.bitrate / 1000);
            if let Some(bitrate) = average_bitrate {
                println!("  Average bitrate           {} kbps", bitrate / 1000);
            }
            if let Some(vbr) = vbr {
                display_vbr(vbr);
            }
        }
        CodecInfo::Wave(format) => {
            println!("  Format tag                0x{:04X}", format.effective_format_tag());
            println!("  Sampling rate             {} Hz", format.samples_per_sec);
            println!("  Channels                  {}", format.channels);
            println!("  Bits per sample           {}", format.bits_per_sample);
            if let Some(mask) = format.channel_mask {
                println!("  Channel mask              0x{mask:08X}");
            }
        }
        CodecInfo::None => {}
    }

    if stream.errors > 0 {
        println!("  Errors                    {}", stream.errors);
    }
    println!();
}

fn display_video(video: &VideoInfo) {
    println!("  Resolution                {}x{}", video.width, video.height);
    println!("  Profile                   {}", video.profile);
    println!("  Level                     {}", video.level);
    println!("  Chroma format             {}", video.chroma_format);
    println!("  Bit depth                 {}", video.bit_depth);
    if let Some(fps) = video.frame_rate {
        println!("  Frame rate                {fps:.3} fps");
    }
}

fn display_vbr(vbr: &VbrHeader) {
    println!("  VBR header                {:?}", vbr.kind);
    if let Some(frames) = vbr.frames {
        println!("    Frames                  {frames}");
    }
    if let Some(bytes) = vbr.bytes {
        println!("    Bytes                   {bytes}");
    }
    if let Some(quality) = vbr.quality {
        println!("    Quality                 {quality}");
    }
}
