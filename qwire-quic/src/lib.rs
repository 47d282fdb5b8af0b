//! # qwire-quic: QUIC Initial wire support
//!
//! Wire-level building blocks for working with QUIC Initial packets:
//!
//! - [`varint`] — RFC 9000 Section 16 variable-length integers
//! - [`packet`] — zero-copy Initial long-header parsing (RFC 9000 Section 17)
//! - [`crypto`] — Initial packet protection via BoringSSL (RFC 9001 Section 5)
//! - [`frames`] — CRYPTO-frame dispatch over decrypted Initial payloads
//! - [`stream`] — out-of-order CRYPTO stream reassembly
//! - [`tls`] — TLS ClientHello extraction ([`tls::TlsChloExtractor`])
//!
//! The crate is a pure state machine: no sockets, no event loops, no
//! async. Callers feed in received datagrams and read out parsed state.

/// Unified error type for QUIC wire operations.
pub mod error;

/// Variable-length integer codec (RFC 9000 Section 16).
pub mod varint;

/// Initial long-header parsing (RFC 9000 Section 17.2.2).
pub mod packet;

/// Initial-level packet protection (RFC 9001 Section 5, RFC 9369).
pub mod crypto;

/// Frame walking for decrypted Initial payloads.
pub mod frames;

/// CRYPTO stream reassembly.
pub mod stream;

/// TLS ClientHello extraction.
pub mod tls;

pub use crypto::{InitialKeys, Side};
pub use error::{Error, Result};
pub use frames::CryptoFrame;
pub use packet::{parse_initial, InitialHeader, VERSION_V1, VERSION_V2};
pub use stream::CryptoStreamSequencer;
pub use tls::{State, TlsChloExtractor};
