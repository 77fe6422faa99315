use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::info::cmd_info;
use cli::map::cmd_map;
use cli::nalu::cmd_nalu;

mod cli;
pub(crate) mod timestamp;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    init_logger(&cli, &multi)?;
    let pb = cli.progress.then_some(&multi);

    match cli.command {
        Commands::Info(ref args) => cmd_info(args, &cli, pb)?,
        Commands::Nalu(ref args) => cmd_nalu(args, &cli, pb)?,
        Commands::Map(ref args) => cmd_map(args, &cli, pb)?,
    }

    Ok(())
}

/// Installs env_logger with the `--loglevel` base filter and one filter per
/// `--trace` directive, routed through `multi` when progress is shown.
fn init_logger(cli: &Cli, multi: &MultiProgress) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());

    for directive in &cli.trace {
        let (target, level) = directive.filter();
        builder.filter_module(target, level);
    }

    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":\"{}\",\"lvl\":\"{}\",\"target\":\"{}\",\"msg\":{:?}}}",
                    buf.timestamp(),
                    record.level(),
                    record.target(),
                    record.args().to_string()
                )
            });
        }
    }

    if cli.progress {
        let logger = builder.build();
        let max_level = logger.filter();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        log::set_max_level(max_level);
    } else {
        builder.try_init()?;
    }

    Ok(())
}
