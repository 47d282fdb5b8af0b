//! HTTP/3 error types and the RFC 9114 Section 8.1 codes this crate can
//! raise.

use std::fmt;
use thiserror::Error;

/// HTTP/3 error codes (RFC 9114 Section 8.1), limited to the codes this
/// crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ErrorCode {
    /// H3_NO_ERROR (0x0100): closing without an error to signal.
    NoError = 0x0100,

    /// H3_GENERAL_PROTOCOL_ERROR (0x0101): a protocol violation with no
    /// more specific code.
    GeneralProtocolError = 0x0101,

    /// H3_INTERNAL_ERROR (0x0102): an internal error in the HTTP stack.
    InternalError = 0x0102,

    /// H3_FRAME_ERROR (0x0106): a frame that violates layout or size
    /// requirements.
    FrameError = 0x0106,
}

impl ErrorCode {
    /// Numeric form, for use as a QUIC application error code.
    pub fn to_code(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => write!(f, "H3_NO_ERROR"),
            Self::GeneralProtocolError => write!(f, "H3_GENERAL_PROTOCOL_ERROR"),
            Self::InternalError => write!(f, "H3_INTERNAL_ERROR"),
            Self::FrameError => write!(f, "H3_FRAME_ERROR"),
        }
    }
}

/// Result type for HTTP/3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP/3 serialization errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol violation with a specific HTTP/3 error code.
    #[error("Protocol error ({code}): {message}")]
    Protocol { code: ErrorCode, message: String },

    /// Length miscomputation or writer overrun inside the encoder. Not
    /// retryable; the frame must not be sent.
    #[error("Internal error: {0}")]
    Internal(String),

    /// PRIORITY_UPDATE frames for push streams cannot be serialized.
    #[error("PRIORITY_UPDATE for push streams is not implemented")]
    UnsupportedPriorityType,
}

impl Error {
    /// Create a protocol error with a specific error code.
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map to the HTTP/3 error code to surface on abort.
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            Self::Protocol { code, .. } => *code,
            Self::Internal(_) | Self::UnsupportedPriorityType => ErrorCode::InternalError,
        }
    }
}
