//! # qwire-h3: HTTP/3 frame serialization
//!
//! Byte-exact serializers for the HTTP/3 frames a QUIC endpoint emits
//! outside the request path: SETTINGS, GOAWAY, PRIORITY_UPDATE,
//! ACCEPT_CH, GREASE, the WebTransport stream preface, and Capsule
//! frames, plus the bare DATA/HEADERS frame headers (payloads are
//! appended by the caller).
//!
//! All serializers are pure: no state is retained between calls and
//! different serializers may run in parallel. The only shared datum is
//! the process-wide GREASE mode in [`config`].
//!
//! The variable-length integer codec is shared with `qwire-quic` and
//! re-exported as [`varint`].

pub use qwire_quic::varint;

/// Error codes and error types.
pub mod error;

/// Process-wide tunables.
pub mod config;

/// Bounded frame writer.
pub mod writer;

/// Frame and capsule models.
pub mod frame;

/// Frame serializers.
pub mod encoder;

pub use error::{Error, ErrorCode, Result};
pub use frame::{
    AcceptChEntry, AcceptChFrame, Capsule, GoAwayFrame, PrioritizedElementType,
    PriorityUpdateFrame, SettingsFrame,
};
pub use writer::FrameWriter;
