//! Bounded frame writer.
//!
//! Serializers size their output exactly before writing; this writer
//! enforces that bound so any length miscomputation surfaces as a loud
//! error instead of a malformed frame on the wire.

use bytes::{BufMut, Bytes, BytesMut};
use qwire_quic::varint;

use crate::error::{Error, Result};

/// Append-only writer with a fixed capacity.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
    capacity: usize,
}

impl FrameWriter {
    /// Create a writer that accepts exactly `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total writable bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still writable.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Append a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let needed = varint::encoded_len(value);
        if self.remaining() < needed {
            return Err(Error::internal(format!(
                "varint of {needed} bytes does not fit in {} remaining",
                self.remaining()
            )));
        }
        varint::encode(value, &mut self.buf)
            .map_err(|e| Error::internal(format!("varint encode failed: {e}")))?;
        Ok(())
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.remaining() < bytes.len() {
            return Err(Error::internal(format!(
                "{} bytes do not fit in {} remaining",
                bytes.len(),
                self.remaining()
            )));
        }
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Freeze the written bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
