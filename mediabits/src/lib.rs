#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Bit-exact inspection of compressed media: a buffered bit cursor over any
//! seekable byte source, the ITU-T H.264 / H.265 syntax layers on top of
//! it, and resilient container scanners that locate every elementary stream
//! sample without decoding it.
//!
//! ### Reading Model
//!
//! **Linear**: the cursor refills a fixed window from the source as bits
//! are consumed.
//! **Mapped**: a [`bitstream::BitstreamMap`] lists sample offsets and sizes,
//! and the cursor buffers one whole sample at a time.
//!
//! ### Conformance Policy
//!
//! Syntax readers return typed errors through `anyhow`. Recoverable
//! violations are routed through [`log_or_err!`], so the caller picks the
//! severity at which parsing stops with
//! [`process::ParseOptions::fail_level`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediabits::process::ParseOptions;
//! use mediabits::process::media::{CodecInfo, parse_media};
//!
//! let report = parse_media("clip.264", &ParseOptions::default())?;
//!
//! for stream in &report.streams {
//!     println!(
//!         "{} {}: {} samples, {} bytes",
//!         stream.map.stream_type,
//!         stream.map.codec,
//!         stream.map.sample_count(),
//!         stream.map.total_bytes()
//!     );
//!
//!     if let CodecInfo::Video(video) = &stream.info {
//!         println!("{}x{} {} {}", video.width, video.height, video.profile, video.level);
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Bit cursor, byte sources and sample maps.
///
/// - **Cursor** ([`bitstream::cursor`]): buffered MSB-first bit reads with
///   refill, seek and rewind
/// - **Sources** ([`bitstream::source`]): the `Read + Seek + size` contract
/// - **Maps** ([`bitstream::map`]): per-stream sample indexes
pub mod bitstream;

/// Codec syntax: Exp-Golomb codes, NAL units, H.264 and H.265 parameter
/// sets and slice headers, CAVLC residual blocks.
pub mod codec;

/// Container scanners for MPEG audio, MPEG-2 TS, MPEG PS and RIFF.
pub mod container;

/// Probing, elementary stream mapping and the per-codec decoding contexts.
pub mod process;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): fixed-layout header reads
/// - **CRC Validation** ([`utils::crc`]): CRC-16 and CRC-32/MPEG-2
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Tracing** ([`utils::trace`]): log targets and verbosity steps
/// - **2D storage** ([`utils::array2d`]): row-major tables
pub mod utils;
