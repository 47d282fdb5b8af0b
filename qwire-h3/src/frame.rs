//! HTTP/3 frame and capsule models.
//!
//! Frame type codepoints per RFC 9114 Section 7.2, RFC 9218, RFC 9220,
//! and the HTTP Datagram capsule drafts. Only the shapes this crate
//! serializes are modeled.

use bytes::Bytes;

/// DATA frame (RFC 9114 Section 7.2.1).
pub const FRAME_TYPE_DATA: u64 = 0x00;
/// HEADERS frame (RFC 9114 Section 7.2.2).
pub const FRAME_TYPE_HEADERS: u64 = 0x01;
/// SETTINGS frame (RFC 9114 Section 7.2.4).
pub const FRAME_TYPE_SETTINGS: u64 = 0x04;
/// GOAWAY frame (RFC 9114 Section 7.2.6).
pub const FRAME_TYPE_GOAWAY: u64 = 0x07;
/// ACCEPT_CH frame (draft-davidben-http-client-hint-reliability).
pub const FRAME_TYPE_ACCEPT_CH: u64 = 0x89;
/// PRIORITY_UPDATE frame for request streams (RFC 9218 Section 7.2).
pub const FRAME_TYPE_PRIORITY_UPDATE_REQUEST_STREAM: u64 = 0xf0700;
/// CAPSULE frame; the codepoint is assigned per deployment, this crate
/// pins the draft value.
pub const FRAME_TYPE_CAPSULE: u64 = 0xffcab5;
/// WEBTRANSPORT_STREAM signal (draft-ietf-webtrans-http3). Used as a
/// stream preface rather than a framed frame: no length field follows.
pub const FRAME_TYPE_WEBTRANSPORT_STREAM: u64 = 0x41;

/// SETTINGS_QPACK_MAX_TABLE_CAPACITY (RFC 9204).
pub const SETTINGS_QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
/// SETTINGS_MAX_FIELD_SECTION_SIZE (RFC 9114).
pub const SETTINGS_MAX_FIELD_SECTION_SIZE: u64 = 0x06;
/// SETTINGS_QPACK_BLOCKED_STREAMS (RFC 9204).
pub const SETTINGS_QPACK_BLOCKED_STREAMS: u64 = 0x07;

/// SETTINGS frame contents: an unordered identifier-to-value mapping.
///
/// Serialization orders the pairs, so two frames equal as multisets
/// produce identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsFrame {
    pub values: Vec<(u64, u64)>,
}

/// GOAWAY frame contents: a stream or push ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub id: u64,
}

/// Which kind of element a PRIORITY_UPDATE frame prioritizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrioritizedElementType {
    RequestStream,
    PushStream,
}

/// PRIORITY_UPDATE frame contents (RFC 9218 Section 7.2).
///
/// `priority_field_value` carries the Priority field as Structured-Field
/// text; it is emitted verbatim and runs to the end of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityUpdateFrame {
    pub prioritized_element_type: PrioritizedElementType,
    pub prioritized_element_id: u64,
    pub priority_field_value: Bytes,
}

/// One origin/value pair of an ACCEPT_CH frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptChEntry {
    pub origin: Bytes,
    pub value: Bytes,
}

/// ACCEPT_CH frame contents: entries serialized in the given order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptChFrame {
    pub entries: Vec<AcceptChEntry>,
}

/// REGISTER_DATAGRAM_CONTEXT capsule type.
pub const CAPSULE_TYPE_REGISTER_DATAGRAM_CONTEXT: u64 = 0x00;
/// CLOSE_DATAGRAM_CONTEXT capsule type.
pub const CAPSULE_TYPE_CLOSE_DATAGRAM_CONTEXT: u64 = 0x01;
/// DATAGRAM capsule type.
pub const CAPSULE_TYPE_DATAGRAM: u64 = 0x02;
/// REGISTER_DATAGRAM_NO_CONTEXT capsule type.
pub const CAPSULE_TYPE_REGISTER_DATAGRAM_NO_CONTEXT: u64 = 0x03;

/// A capsule carried inside an HTTP/3 CAPSULE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capsule {
    RegisterDatagramContext {
        context_id: u64,
        context_extensions: Bytes,
    },
    CloseDatagramContext {
        context_id: u64,
        context_extensions: Bytes,
    },
    Datagram {
        context_id: Option<u64>,
        payload: Bytes,
    },
    RegisterDatagramNoContext {
        context_extensions: Bytes,
    },
    Unknown {
        capsule_type: u64,
        data: Bytes,
    },
}

impl Capsule {
    /// The capsule-type codepoint written on the wire.
    pub fn capsule_type(&self) -> u64 {
        match self {
            Capsule::RegisterDatagramContext { .. } => CAPSULE_TYPE_REGISTER_DATAGRAM_CONTEXT,
            Capsule::CloseDatagramContext { .. } => CAPSULE_TYPE_CLOSE_DATAGRAM_CONTEXT,
            Capsule::Datagram { .. } => CAPSULE_TYPE_DATAGRAM,
            Capsule::RegisterDatagramNoContext { .. } => {
                CAPSULE_TYPE_REGISTER_DATAGRAM_NO_CONTEXT
            }
            Capsule::Unknown { capsule_type, .. } => *capsule_type,
        }
    }
}
