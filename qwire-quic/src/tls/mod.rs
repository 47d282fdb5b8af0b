//! TLS integration at the QUIC Initial encryption level.

mod chlo;

pub use chlo::{State, TlsChloExtractor};
