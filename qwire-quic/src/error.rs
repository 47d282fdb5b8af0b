use thiserror::Error;

/// Result type for QUIC wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or unprotecting QUIC Initial packets.
#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer too short: need {need} bytes, have {have}")]
    BufferTooShort { need: usize, have: usize },

    #[error("varint value {0} exceeds 2^62 - 1")]
    VarIntOutOfRange(u64),

    #[error("not a long-header packet")]
    NotLongHeader,

    #[error("fixed bit is not set")]
    InvalidFixedBit,

    #[error("not an Initial packet (long packet type {0})")]
    NotInitial(u8),

    #[error("unsupported QUIC version {0:#010x}")]
    UnsupportedVersion(u32),

    #[error("invalid connection ID length {0}")]
    InvalidCidLength(u8),

    #[error("frame encoding error at offset {0}")]
    FrameEncoding(usize),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("crypto stream reassembly: {0}")]
    Reassembly(String),
}

impl Error {
    pub(crate) fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    pub(crate) fn reassembly(msg: impl Into<String>) -> Self {
        Error::Reassembly(msg.into())
    }
}
