use std::fmt;
use std::io;
use thiserror::Error;

/// Bytes produced by blocks that finished before a run was aborted.
///
/// Never equal to the full payload: anything held here stopped short of the
/// final block.
pub struct PartialOutput(pub Vec<u8>);

impl fmt::Debug for PartialOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialOutput({} bytes)", self.0.len())
    }
}

/// Terminal failure of one DEFLATE decoding run.
#[derive(Error, Debug)]
pub enum InflateError {
    #[error("unexpected end of compressed data")]
    EndOfStream,

    #[error("block {block}: unsupported block type {btype}")]
    UnsupportedBlockType {
        block: usize,
        btype: u8,
        partial: PartialOutput,
    },

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("invalid back-reference: distance {distance} with only {available} bytes of output")]
    InvalidBackReference { distance: usize, available: usize },

    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl InflateError {
    pub fn malformed<T: fmt::Display>(msg: T) -> Self {
        InflateError::MalformedStream(msg.to_string())
    }
}

impl From<io::Error> for InflateError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            InflateError::EndOfStream
        } else {
            InflateError::Io(err)
        }
    }
}

pub type InflateResult<T> = Result<T, InflateError>;

#[derive(Error, Debug)]
pub enum GzipError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid compressed data--format violated: {0}")]
    Inflate(#[from] InflateError),

    #[error("not in gzip format")]
    NotGzip,

    #[error("unknown method {0} -- not supported")]
    UnknownMethod(u8),

    #[error("is encrypted -- not supported")]
    Encrypted,

    #[error("has flags 0x{0:x} -- not supported")]
    ReservedFlags(u8),

    #[error("header checksum 0x{stored:04x} != computed checksum 0x{computed:04x}")]
    HeaderChecksum { stored: u16, computed: u16 },

    #[error("invalid compressed data--crc error (stored 0x{stored:08x}, computed 0x{computed:08x})")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("invalid compressed data--length error (stored {stored}, computed {computed})")]
    LengthMismatch { stored: u32, computed: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GzipError {
    pub fn invalid_argument<T: fmt::Display>(msg: T) -> Self {
        GzipError::InvalidArgument(msg.to_string())
    }
}

pub type GzipResult<T> = Result<T, GzipError>;
