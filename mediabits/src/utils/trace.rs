//! Trace taxonomy for library log output.
//!
//! Log records are emitted through the `log` facade with the emitting module
//! path as target. [`TraceModule`] names the module groups and
//! [`TraceLevel`] the verbosity steps, so a front-end can build per-module
//! filters for whatever logger it installs.

use std::fmt::Display;
use std::str::FromStr;

use log::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Off,
    Error,
    Warn,
    Info,
    Lvl1,
    Lvl2,
    Lvl3,
}

impl TraceLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            TraceLevel::Off => LevelFilter::Off,
            TraceLevel::Error => LevelFilter::Error,
            TraceLevel::Warn => LevelFilter::Warn,
            TraceLevel::Info => LevelFilter::Info,
            TraceLevel::Lvl1 => LevelFilter::Debug,
            TraceLevel::Lvl2 | TraceLevel::Lvl3 => LevelFilter::Trace,
        }
    }
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(TraceLevel::Off),
            "error" => Ok(TraceLevel::Error),
            "warn" => Ok(TraceLevel::Warn),
            "info" => Ok(TraceLevel::Info),
            "lvl1" => Ok(TraceLevel::Lvl1),
            "lvl2" => Ok(TraceLevel::Lvl2),
            "lvl3" => Ok(TraceLevel::Lvl3),
            _ => Err(format!("unknown trace level '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceModule {
    Bitstream,
    ExpGolomb,
    H264,
    H265,
    Mp3,
    MpegTs,
    MpegPs,
    Riff,
    Demux,
}

impl TraceModule {
    pub const ALL: [TraceModule; 9] = [
        TraceModule::Bitstream,
        TraceModule::ExpGolomb,
        TraceModule::H264,
        TraceModule::H265,
        TraceModule::Mp3,
        TraceModule::MpegTs,
        TraceModule::MpegPs,
        TraceModule::Riff,
        TraceModule::Demux,
    ];

    /// Log target prefix covering every record of this module group.
    pub fn target(self) -> &'static str {
        match self {
            TraceModule::Bitstream => "mediabits::bitstream",
            TraceModule::ExpGolomb => "mediabits::codec::expgolomb",
            TraceModule::H264 => "mediabits::codec::h264",
            TraceModule::H265 => "mediabits::codec::h265",
            TraceModule::Mp3 => "mediabits::container::mp3",
            TraceModule::MpegTs => "mediabits::container::mpeg_ts",
            TraceModule::MpegPs => "mediabits::container::mpeg_ps",
            TraceModule::Riff => "mediabits::container::riff",
            TraceModule::Demux => "mediabits::process",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TraceModule::Bitstream => "bitstream",
            TraceModule::ExpGolomb => "expgolomb",
            TraceModule::H264 => "h264",
            TraceModule::H265 => "h265",
            TraceModule::Mp3 => "mp3",
            TraceModule::MpegTs => "mpegts",
            TraceModule::MpegPs => "mpegps",
            TraceModule::Riff => "riff",
            TraceModule::Demux => "demux",
        }
    }
}

impl Display for TraceModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TraceModule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        TraceModule::ALL
            .into_iter()
            .find(|module| module.name() == s)
            .ok_or_else(|| format!("unknown trace module '{s}'"))
    }
}

/// One `MODULE=LEVEL` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceDirective {
    pub module: TraceModule,
    pub level: TraceLevel,
}

impl FromStr for TraceDirective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, level) = s
            .split_once('=')
            .ok_or_else(|| format!("expected MODULE=LEVEL, got '{s}'"))?;

        Ok(Self {
            module: module.trim().parse()?,
            level: level.trim().parse()?,
        })
    }
}

impl TraceDirective {
    pub fn filter(&self) -> (&'static str, LevelFilter) {
        (self.module.target(), self.level.to_level_filter())
    }
}

#[test]
fn parse_directive() {
    let directive: TraceDirective = "H264=lvl2".parse().unwrap();
    assert_eq!(directive.module, TraceModule::H264);
    assert_eq!(
        directive.filter(),
        ("mediabits::codec::h264", LevelFilter::Trace)
    );

    assert!("bitstream".parse::<TraceDirective>().is_err());
    assert!("nope=info".parse::<TraceDirective>().is_err());
}
