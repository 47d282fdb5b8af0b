//! HTTP/3 frame serialization.
//!
//! Every serializer is stateless and reentrant: it computes the exact
//! frame size up front, writes through a bounded [`FrameWriter`], and
//! verifies the writer is exactly full before releasing the bytes. A
//! failure is a length-computation bug, reported loudly; the error
//! result must never be shipped on the wire.

use bytes::Bytes;
use qwire_quic::varint::encoded_len;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config;
use crate::error::{Error, Result};
use crate::frame::{
    AcceptChFrame, Capsule, GoAwayFrame, PrioritizedElementType, PriorityUpdateFrame,
    SettingsFrame, FRAME_TYPE_ACCEPT_CH, FRAME_TYPE_CAPSULE, FRAME_TYPE_DATA,
    FRAME_TYPE_GOAWAY, FRAME_TYPE_HEADERS, FRAME_TYPE_PRIORITY_UPDATE_REQUEST_STREAM,
    FRAME_TYPE_SETTINGS, FRAME_TYPE_WEBTRANSPORT_STREAM,
};
use crate::writer::FrameWriter;

fn write_frame_header(writer: &mut FrameWriter, frame_type: u64, payload_length: u64) -> Result<()> {
    writer.write_varint(frame_type)?;
    writer.write_varint(payload_length)
}

fn total_frame_length(frame_type: u64, payload_length: usize) -> usize {
    encoded_len(frame_type) + encoded_len(payload_length as u64) + payload_length
}

/// Release the serialized bytes, verifying the size computation held.
fn seal(writer: FrameWriter, frame_name: &str) -> Result<Bytes> {
    if writer.remaining() != 0 {
        tracing::error!(
            frame = frame_name,
            written = writer.len(),
            capacity = writer.capacity(),
            "frame serialization length mismatch"
        );
        return Err(Error::internal(format!(
            "{frame_name} serialization wrote {} of {} bytes",
            writer.len(),
            writer.capacity()
        )));
    }
    Ok(writer.finish())
}

/// Size of the frame header written by [`serialize_data_frame_header`].
///
/// `payload_length` must be non-zero: an empty DATA frame has no reason
/// to exist.
pub fn data_frame_header_length(payload_length: u64) -> usize {
    debug_assert_ne!(payload_length, 0);
    encoded_len(FRAME_TYPE_DATA) + encoded_len(payload_length)
}

/// Serialize only the header of a DATA frame.
///
/// The payload is not copied: DATA payloads are typically large and
/// externally owned, so the caller appends them on the wire directly
/// after this header.
pub fn serialize_data_frame_header(payload_length: u64) -> Result<Bytes> {
    debug_assert_ne!(payload_length, 0);
    let mut writer = FrameWriter::with_capacity(data_frame_header_length(payload_length));
    write_frame_header(&mut writer, FRAME_TYPE_DATA, payload_length)?;
    seal(writer, "DATA header")
}

/// Serialize only the header of a HEADERS frame; the caller appends the
/// compressed field section.
pub fn serialize_headers_frame_header(payload_length: u64) -> Result<Bytes> {
    debug_assert_ne!(payload_length, 0);
    let header_length = encoded_len(FRAME_TYPE_HEADERS) + encoded_len(payload_length);
    let mut writer = FrameWriter::with_capacity(header_length);
    write_frame_header(&mut writer, FRAME_TYPE_HEADERS, payload_length)?;
    seal(writer, "HEADERS header")
}

/// Serialize a SETTINGS frame.
///
/// Pairs are sorted ascending by (identifier, value) before writing, so
/// equal multisets of settings always produce identical bytes.
pub fn serialize_settings_frame(settings: &SettingsFrame) -> Result<Bytes> {
    let mut ordered = settings.values.clone();
    ordered.sort_unstable();

    let payload_length: usize = ordered
        .iter()
        .map(|&(id, value)| encoded_len(id) + encoded_len(value))
        .sum();

    let mut writer =
        FrameWriter::with_capacity(total_frame_length(FRAME_TYPE_SETTINGS, payload_length));
    write_frame_header(&mut writer, FRAME_TYPE_SETTINGS, payload_length as u64)?;
    for (id, value) in ordered {
        writer.write_varint(id)?;
        writer.write_varint(value)?;
    }
    seal(writer, "SETTINGS")
}

/// Serialize a GOAWAY frame.
pub fn serialize_goaway_frame(goaway: &GoAwayFrame) -> Result<Bytes> {
    let payload_length = encoded_len(goaway.id);
    let mut writer =
        FrameWriter::with_capacity(total_frame_length(FRAME_TYPE_GOAWAY, payload_length));
    write_frame_header(&mut writer, FRAME_TYPE_GOAWAY, payload_length as u64)?;
    writer.write_varint(goaway.id)?;
    seal(writer, "GOAWAY")
}

/// Serialize a PRIORITY_UPDATE frame for a request stream.
///
/// The priority field value is written verbatim with no length prefix;
/// it is delimited by the outer frame length (RFC 9218 Section 7.2).
///
/// # Errors
///
/// `UnsupportedPriorityType` for push-stream updates.
pub fn serialize_priority_update_frame(priority_update: &PriorityUpdateFrame) -> Result<Bytes> {
    if priority_update.prioritized_element_type != PrioritizedElementType::RequestStream {
        tracing::error!("PRIORITY_UPDATE for push streams not implemented");
        return Err(Error::UnsupportedPriorityType);
    }

    let payload_length = encoded_len(priority_update.prioritized_element_id)
        + priority_update.priority_field_value.len();
    let mut writer = FrameWriter::with_capacity(total_frame_length(
        FRAME_TYPE_PRIORITY_UPDATE_REQUEST_STREAM,
        payload_length,
    ));
    write_frame_header(
        &mut writer,
        FRAME_TYPE_PRIORITY_UPDATE_REQUEST_STREAM,
        payload_length as u64,
    )?;
    writer.write_varint(priority_update.prioritized_element_id)?;
    writer.write_bytes(&priority_update.priority_field_value)?;
    seal(writer, "PRIORITY_UPDATE")
}

/// Serialize an ACCEPT_CH frame.
///
/// Entries keep their given order and are neither deduplicated nor
/// validated; each origin and value is varint-length-prefixed.
pub fn serialize_accept_ch_frame(accept_ch: &AcceptChFrame) -> Result<Bytes> {
    let payload_length: usize = accept_ch
        .entries
        .iter()
        .map(|entry| {
            encoded_len(entry.origin.len() as u64)
                + entry.origin.len()
                + encoded_len(entry.value.len() as u64)
                + entry.value.len()
        })
        .sum();

    let mut writer =
        FrameWriter::with_capacity(total_frame_length(FRAME_TYPE_ACCEPT_CH, payload_length));
    write_frame_header(&mut writer, FRAME_TYPE_ACCEPT_CH, payload_length as u64)?;
    for entry in &accept_ch.entries {
        writer.write_varint(entry.origin.len() as u64)?;
        writer.write_bytes(&entry.origin)?;
        writer.write_varint(entry.value.len() as u64)?;
        writer.write_bytes(&entry.value)?;
    }
    seal(writer, "ACCEPT_CH")
}

/// Serialize a frame of a reserved type (RFC 9114 Section 7.2.8) to
/// exercise peer tolerance of unknown frames.
///
/// With grease randomness disabled (the default) the output is the fixed
/// frame `0x40` with payload `"a"`. With it enabled, one 32-bit value
/// `r` is sampled from a cryptographically secure source; the frame type
/// is `0x1f * r + 0x21` and the payload is `r % 4` random bytes.
pub fn serialize_greasing_frame() -> Result<Bytes> {
    let (frame_type, payload) = if !config::http3_grease_randomness_enabled() {
        (0x40, Bytes::from_static(b"a"))
    } else {
        let mut sample = [0u8; 4];
        OsRng.fill_bytes(&mut sample);
        let r = u32::from_ne_bytes(sample);
        let frame_type = 0x1fu64.wrapping_mul(u64::from(r)).wrapping_add(0x21);

        let payload_length = (r % 4) as usize;
        let mut payload = vec![0u8; payload_length];
        OsRng.fill_bytes(&mut payload);
        (frame_type, Bytes::from(payload))
    };

    let payload_length = payload.len();
    let mut writer = FrameWriter::with_capacity(total_frame_length(frame_type, payload_length));
    write_frame_header(&mut writer, frame_type, payload_length as u64)?;
    if !payload.is_empty() {
        writer.write_bytes(&payload)?;
    }
    seal(writer, "GREASE")
}

/// Serialize the WEBTRANSPORT_STREAM preface marking a QUIC stream as
/// belonging to a WebTransport session.
///
/// No frame length follows: the remainder of the stream is raw
/// WebTransport data.
pub fn serialize_webtransport_stream_header(session_id: u64) -> Result<Bytes> {
    let header_length = encoded_len(FRAME_TYPE_WEBTRANSPORT_STREAM) + encoded_len(session_id);
    let mut writer = FrameWriter::with_capacity(header_length);
    writer.write_varint(FRAME_TYPE_WEBTRANSPORT_STREAM)?;
    writer.write_varint(session_id)?;
    seal(writer, "WEBTRANSPORT_STREAM header")
}

/// Serialize a capsule wrapped in an HTTP/3 CAPSULE frame.
pub fn serialize_capsule_frame(capsule: &Capsule) -> Result<Bytes> {
    let capsule_type = capsule.capsule_type();
    let capsule_data_length = match capsule {
        Capsule::RegisterDatagramContext {
            context_id,
            context_extensions,
        }
        | Capsule::CloseDatagramContext {
            context_id,
            context_extensions,
        } => encoded_len(*context_id) + context_extensions.len(),
        Capsule::Datagram {
            context_id,
            payload,
        } => (*context_id).map_or(0, encoded_len) + payload.len(),
        Capsule::RegisterDatagramNoContext { context_extensions } => context_extensions.len(),
        Capsule::Unknown { data, .. } => data.len(),
    };

    let inner_length = encoded_len(capsule_type) + capsule_data_length;
    let total_length = encoded_len(FRAME_TYPE_CAPSULE)
        + encoded_len(inner_length as u64)
        + inner_length;

    let mut writer = FrameWriter::with_capacity(total_length);
    writer.write_varint(FRAME_TYPE_CAPSULE)?;
    writer.write_varint(inner_length as u64)?;
    writer.write_varint(capsule_type)?;
    match capsule {
        Capsule::RegisterDatagramContext {
            context_id,
            context_extensions,
        }
        | Capsule::CloseDatagramContext {
            context_id,
            context_extensions,
        } => {
            writer.write_varint(*context_id)?;
            writer.write_bytes(context_extensions)?;
        }
        Capsule::Datagram {
            context_id,
            payload,
        } => {
            if let Some(context_id) = context_id {
                writer.write_varint(*context_id)?;
            }
            writer.write_bytes(payload)?;
        }
        Capsule::RegisterDatagramNoContext { context_extensions } => {
            writer.write_bytes(context_extensions)?;
        }
        Capsule::Unknown { data, .. } => {
            writer.write_bytes(data)?;
        }
    }
    seal(writer, "CAPSULE")
}
