//! Variable-length integer encoding per RFC 9000 Section 16.
//!
//! The two most significant bits of the first byte select the length class
//! (1, 2, 4, or 8 bytes); the remaining bits carry the value big-endian.
//! Encoders always pick the shortest class that fits; decoders accept any
//! valid class.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Largest encodable value, 2^62 - 1.
pub const MAX: u64 = (1 << 62) - 1;

/// Number of bytes `value` occupies on the wire.
///
/// Values above [`MAX`] are reported as 8 so that length computations stay
/// total; `encode` rejects them.
pub fn encoded_len(value: u64) -> usize {
    if value < 1 << 6 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 30 {
        4
    } else {
        8
    }
}

/// Encode `value` into `buf` using the minimum length class.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// `VarIntOutOfRange` if `value` exceeds [`MAX`]; `BufferTooShort` if the
/// buffer cannot hold the encoding.
pub fn encode<B: BufMut>(value: u64, buf: &mut B) -> Result<usize> {
    if value > MAX {
        return Err(Error::VarIntOutOfRange(value));
    }
    let len = encoded_len(value);
    if buf.remaining_mut() < len {
        return Err(Error::BufferTooShort {
            need: len,
            have: buf.remaining_mut(),
        });
    }
    match len {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(value as u16 | 0x4000),
        4 => buf.put_u32(value as u32 | 0x8000_0000),
        _ => buf.put_u64(value | 0xc000_0000_0000_0000),
    }
    Ok(len)
}

/// Decode one varint from the front of `buf`, advancing it.
///
/// # Errors
///
/// `BufferTooShort` if the buffer is empty or ends inside the encoding.
pub fn decode<B: Buf>(buf: &mut B) -> Result<u64> {
    if !buf.has_remaining() {
        return Err(Error::BufferTooShort { need: 1, have: 0 });
    }
    let first = buf.chunk()[0];
    let len = 1usize << (first >> 6);
    if buf.remaining() < len {
        return Err(Error::BufferTooShort {
            need: len,
            have: buf.remaining(),
        });
    }
    let value = match len {
        1 => u64::from(buf.get_u8()),
        2 => u64::from(buf.get_u16() & 0x3fff),
        4 => u64::from(buf.get_u32() & 0x3fff_ffff),
        _ => buf.get_u64() & 0x3fff_ffff_ffff_ffff,
    };
    Ok(value)
}
