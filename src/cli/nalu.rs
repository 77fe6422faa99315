use anyhow::Result;
use indicatif::MultiProgress;

use super::command::{Cli, NaluArgs};
use super::{spinner, suspend};
use mediabits::process::NalRecord;
use mediabits::process::media::parse_media_with;

pub fn cmd_nalu(args: &NaluArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let pb = spinner(multi, "Parsing NAL units...")?;
    let limit = args.limit.unwrap_or(usize::MAX);
    let mut seen = 0usize;

    suspend(pb.as_ref(), || {
        println!("{:>8}  {:>12}  {:>8}  {:>4}  Description", "Index", "Offset", "Size", "Type");
    });

    let report = parse_media_with(&args.input, &cli.parse_options(), |record| {
        if seen < limit {
            suspend(pb.as_ref(), || print_record(&record));
        }
        seen += 1;

        if seen.is_multiple_of(1000) {
            if let Some(pb) = &pb {
                pb.set_message(format!("Parsing NAL units...      {seen}"));
            }
        }
    });

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let report = report?;

    if seen == 0 {
        log::warn!("{} has no NAL units to list", report.container);
    } else if seen > limit {
        println!("... {} more", seen - limit);
    }

    Ok(())
}

fn print_record(record: &NalRecord) {
    let marker = if record.error { "!" } else { " " };
    print!(
        "{:>8}  {:>12}  {:>8}  {:>4}{marker} {}",
        record.index, record.offset, record.size, record.nal_unit_type, record.description
    );
    match &record.detail {
        Some(detail) => println!(" [{detail}]"),
        None => println!(),
    }
}
