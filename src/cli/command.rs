use std::path::PathBuf;
use std::sync::LazyLock;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use mediabits::process::ParseOptions;
use mediabits::utils::trace::TraceDirective;

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{} ({}, built {})\nmediabits library {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown revision"),
        env!("BUILD_TIMESTAMP"),
        env!("MEDIABITS_VERSION"),
    )
});

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION.as_str(),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting H.264/H.265, MP3, MPEG-PS/TS and RIFF bitstreams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress spinners during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Per-module verbosity, e.g. `h264=lvl2` (repeatable).
    ///
    /// Modules: bitstream, expgolomb, h264, h265, mp3, mpegts, mpegps, riff,
    /// demux. Levels: off, error, warn, info, lvl1, lvl2, lvl3.
    #[arg(long, global = true, value_name = "MODULE=LEVEL")]
    pub trace: Vec<TraceDirective>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn parse_options(&self) -> ParseOptions {
        if self.strict {
            ParseOptions::strict()
        } else {
            ParseOptions::default()
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print container and stream information
    Info(InputArgs),

    /// List the NAL units of an H.264 or H.265 elementary stream
    Nalu(NaluArgs),

    /// Dump the sample index of every stream
    Map(MapArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input media file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct NaluArgs {
    /// Input Annex B elementary stream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Stop listing after this many NAL units.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    /// Input media file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Emit YAML instead of a table.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_line() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "mediabits",
            "--strict",
            "--trace",
            "h264=lvl1",
            "nalu",
            "clip.264",
            "--limit",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.parse_options(), ParseOptions::strict());
        assert_eq!(cli.trace.len(), 1);
        match cli.command {
            Commands::Nalu(args) => assert_eq!(args.limit, Some(10)),
            other => panic!("unexpected {other:?}"),
        }

        assert!(Cli::try_parse_from(["mediabits", "--trace", "h264", "info", "a.ts"]).is_err());
    }
}
