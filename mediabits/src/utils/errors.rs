#[macro_export]
macro_rules! log_or_err {
    ($options:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $options.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum BitstreamError {
    #[error("Invalid byte source: {0}")]
    InvalidSource(String),

    #[error("Premature end of stream at byte offset {offset} (data ends at {end})")]
    PrematureEndOfStream { offset: u64, end: u64 },

    #[error("Seek target {offset} is outside of the source (size {size})")]
    SeekOutOfRange { offset: i64, size: u64 },

    #[error("Short read: expected {expected} bytes at offset {offset}, got {read}")]
    ShortRead {
        offset: u64,
        expected: usize,
        read: usize,
    },

    #[error("Cannot read {0} bits in a single call")]
    TooManyBits(u32),

    #[error("Sample {index} is out of range ({count} samples in map)")]
    SampleOutOfRange { index: usize, count: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BitstreamError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self,
            BitstreamError::PrematureEndOfStream { .. } | BitstreamError::SampleOutOfRange { .. }
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExpGolombError {
    #[error("Exp-Golomb code with {0} leading zero bits cannot be represented")]
    CodeTooLong(u32),

    #[error("Mapped Exp-Golomb codeNum {code_num} exceeds table size {max}")]
    MappedCodeOutOfRange { code_num: u32, max: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum NaluError {
    #[error("forbidden_zero_bit is set in NAL unit at offset {0}")]
    ForbiddenBitSet(u64),

    #[error("reserved_three_2bits must be 3 in SVC extension. Read {0}")]
    SvcReservedBits(u8),

    #[error("reserved_one_bit must be 1 in MVC extension")]
    MvcReservedBit,

    #[error("nuh_temporal_id_plus1 must not be 0 (offset {0})")]
    ZeroTemporalId(u64),

    #[error("rbsp_stop_one_bit is missing")]
    MissingStopBit,
}

#[derive(thiserror::Error, Debug)]
pub enum CavlcError {
    #[error("No VLC code matched in {table} table at bit offset {offset}")]
    VlcTableMiss { table: &'static str, offset: u64 },

    #[error("TotalCoeff {total_coeff} exceeds maxNumCoeff {max}")]
    TooManyCoefficients { total_coeff: usize, max: usize },

    #[error("level_prefix {0} exceeds the allowed range")]
    LevelPrefixTooLarge(u32),

    #[error("Coefficient run overflows the block: position {position} > {end}")]
    RunOverflow { position: usize, end: usize },

    #[error("Invalid coefficient range {start}..={end}")]
    InvalidRange { start: usize, end: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ParameterSetError {
    #[error("{kind} id {id} exceeds maximum {max}")]
    IdOutOfRange {
        kind: &'static str,
        id: u32,
        max: usize,
    },

    #[error("{kind} {id} referenced but never received")]
    MissingReference { kind: &'static str, id: u32 },

    #[error("{field} = {value} is out of range [{min}, {max}]")]
    ValueOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Unsupported slice_type {0}")]
    InvalidSliceType(u32),

    #[error("Short-term RPS {index} predicts from unavailable set {reference}")]
    InvalidRpsReference { index: usize, reference: i64 },
}

#[derive(thiserror::Error, Debug)]
pub enum Mp3Error {
    #[error("Invalid MPEG audio sync word: {0:#05X}")]
    InvalidSync(u32),

    #[error("Reserved MPEG audio version")]
    ReservedVersion,

    #[error("Reserved MPEG audio layer")]
    ReservedLayer,

    #[error("Invalid bitrate index {0}")]
    InvalidBitrate(u8),

    #[error("Invalid sampling rate index {0}")]
    InvalidSamplingRate(u8),

    #[error("Frame at offset {offset} extends past end of file ({size} bytes)")]
    TruncatedFrame { offset: u64, size: u32 },

    #[error("Emphasis value 2 is reserved")]
    ReservedEmphasis,

    #[error("Frame CRC mismatch at offset {offset}. Read {read:#06X}, calculated {calculated:#06X}")]
    CrcMismatch { offset: u64, read: u16, calculated: u16 },
}

#[derive(thiserror::Error, Debug)]
pub enum TsError {
    #[error("Lost TS sync at offset {0}")]
    LostSync(u64),

    #[error("Adaptation field length {0} exceeds packet")]
    AdaptationFieldTooLong(u8),

    #[error("Section CRC mismatch on table {table_id:#04X}. Calculated {calculated:#010X}")]
    CrcMismatch { table_id: u8, calculated: u32 },

    #[error("Section length {0} exceeds available payload")]
    SectionTooLong(u16),

    #[error("Unexpected table_id {read:#04X}, expected {expected:#04X}")]
    UnexpectedTable { read: u8, expected: u8 },
}

#[derive(thiserror::Error, Debug)]
pub enum PesError {
    #[error("Invalid PES start code prefix {0:#08X}")]
    InvalidStartCode(u32),

    #[error("Marker bit missing in {0}")]
    MissingMarker(&'static str),

    #[error("PES header data length {0} exceeds packet")]
    HeaderTooLong(u8),
}

#[derive(thiserror::Error, Debug)]
pub enum PsError {
    #[error("Invalid pack header marker at offset {0}")]
    InvalidPackHeader(u64),

    #[error("Unknown start code {code:#04X} at offset {offset}")]
    UnknownStartCode { code: u8, offset: u64 },

    #[error("No start code at offset {0}")]
    LostSync(u64),
}

#[derive(thiserror::Error, Debug)]
pub enum RiffError {
    #[error("Missing RIFF header, read {0:?}")]
    MissingHeader([u8; 4]),

    #[error("Chunk {fourcc} at offset {offset} overruns its parent (size {size})")]
    ChunkOverrun {
        fourcc: String,
        offset: u64,
        size: u32,
    },

    #[error("fmt chunk is too small ({0} bytes)")]
    FormatTooSmall(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("File is empty")]
    EmptyFile,

    #[error("Unrecognized container format")]
    UnknownFormat,

    #[error("No parsable stream in {0}")]
    NoStreams(String),
}
