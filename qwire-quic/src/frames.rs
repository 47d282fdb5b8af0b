//! Frame walking for decrypted Initial payloads (RFC 9000 Section 12.4).
//!
//! Initial packets may only carry PADDING, PING, ACK, CRYPTO, and
//! CONNECTION_CLOSE frames. CRYPTO frames are dispatched to the caller;
//! everything else permitted at this level is skipped.

use crate::error::{Error, Result};
use crate::varint;

pub const FRAME_TYPE_PADDING: u64 = 0x00;
pub const FRAME_TYPE_PING: u64 = 0x01;
pub const FRAME_TYPE_ACK: u64 = 0x02;
pub const FRAME_TYPE_ACK_ECN: u64 = 0x03;
pub const FRAME_TYPE_CRYPTO: u64 = 0x06;
pub const FRAME_TYPE_CONNECTION_CLOSE: u64 = 0x1c;

/// CRYPTO frame contents (RFC 9000 Section 19.6), borrowing from the
/// decrypted packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoFrame<'a> {
    pub offset: u64,
    pub data: &'a [u8],
}

/// Walk every frame in a decrypted Initial payload, invoking `on_crypto`
/// for each CRYPTO frame in wire order.
///
/// # Errors
///
/// `FrameEncoding` when a frame is truncated or a frame type not
/// permitted in Initial packets appears; errors from `on_crypto` are
/// propagated immediately.
pub fn for_each_crypto_frame<'a, F>(payload: &'a [u8], mut on_crypto: F) -> Result<()>
where
    F: FnMut(CryptoFrame<'a>) -> Result<()>,
{
    let mut buf = payload;
    while !buf.is_empty() {
        let at = payload.len() - buf.len();
        let frame_type = varint::decode(&mut buf).map_err(|_| Error::FrameEncoding(at))?;
        match frame_type {
            FRAME_TYPE_PADDING => {
                while let [0x00, rest @ ..] = buf {
                    buf = rest;
                }
            }
            FRAME_TYPE_PING => {}
            FRAME_TYPE_ACK | FRAME_TYPE_ACK_ECN => {
                skip_ack(&mut buf, frame_type == FRAME_TYPE_ACK_ECN)
                    .map_err(|_| Error::FrameEncoding(at))?;
            }
            FRAME_TYPE_CRYPTO => {
                let offset = varint::decode(&mut buf).map_err(|_| Error::FrameEncoding(at))?;
                let len = varint::decode(&mut buf).map_err(|_| Error::FrameEncoding(at))?;
                let len = usize::try_from(len).map_err(|_| Error::FrameEncoding(at))?;
                if buf.len() < len {
                    return Err(Error::FrameEncoding(at));
                }
                let (data, rest) = buf.split_at(len);
                buf = rest;
                on_crypto(CryptoFrame { offset, data })?;
            }
            FRAME_TYPE_CONNECTION_CLOSE => {
                skip_connection_close(&mut buf).map_err(|_| Error::FrameEncoding(at))?;
            }
            _ => return Err(Error::FrameEncoding(at)),
        }
    }
    Ok(())
}

fn skip_ack(buf: &mut &[u8], ecn: bool) -> Result<()> {
    varint::decode(buf)?; // largest acknowledged
    varint::decode(buf)?; // ack delay
    let range_count = varint::decode(buf)?;
    varint::decode(buf)?; // first ack range
    for _ in 0..range_count {
        varint::decode(buf)?; // gap
        varint::decode(buf)?; // range length
    }
    if ecn {
        for _ in 0..3 {
            varint::decode(buf)?; // ECT0, ECT1, ECN-CE counts
        }
    }
    Ok(())
}

fn skip_connection_close(buf: &mut &[u8]) -> Result<()> {
    varint::decode(buf)?; // error code
    varint::decode(buf)?; // offending frame type
    let reason_len = varint::decode(buf)?;
    let reason_len = usize::try_from(reason_len).map_err(|_| Error::BufferTooShort {
        need: usize::MAX,
        have: buf.len(),
    })?;
    if buf.len() < reason_len {
        return Err(Error::BufferTooShort {
            need: reason_len,
            have: buf.len(),
        });
    }
    *buf = &buf[reason_len..];
    Ok(())
}
