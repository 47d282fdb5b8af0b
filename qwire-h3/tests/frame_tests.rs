//! Golden-byte checks for the frame serializers. The layouts are fixed
//! by RFC 9114/9218 and the capsule drafts, so the expected bytes are
//! written out in full.

use std::sync::Mutex;

use bytes::Bytes;
use qwire_h3::config::set_enable_http3_grease_randomness;
use qwire_h3::encoder;
use qwire_h3::varint::encoded_len;
use qwire_h3::{
    AcceptChEntry, AcceptChFrame, Capsule, Error, GoAwayFrame, PrioritizedElementType,
    PriorityUpdateFrame, SettingsFrame,
};

// The GREASE mode is process-wide; serialize access from the tests that
// touch it.
static GREASE_MODE: Mutex<()> = Mutex::new(());

#[test]
fn data_frame_header() {
    assert_eq!(encoder::data_frame_header_length(5), 2);
    let header = encoder::serialize_data_frame_header(5).unwrap();
    assert_eq!(&header[..], &[0x00, 0x05]);
}

#[test]
fn data_frame_header_long_payload() {
    // 70000 needs a 4-byte varint.
    let header = encoder::serialize_data_frame_header(70000).unwrap();
    assert_eq!(header.len(), encoder::data_frame_header_length(70000));
    assert_eq!(&header[..], &[0x00, 0x80, 0x01, 0x11, 0x70]);
}

#[test]
fn headers_frame_header() {
    let header = encoder::serialize_headers_frame_header(7).unwrap();
    assert_eq!(&header[..], &[0x01, 0x07]);
}

#[test]
fn settings_frame_is_canonically_ordered() {
    let settings = SettingsFrame {
        values: vec![(0x6, 0x400), (0x1, 0x100)],
    };
    let frame = encoder::serialize_settings_frame(&settings).unwrap();
    // type=0x04, payload length 6, then (0x1, 0x100) before (0x6, 0x400).
    assert_eq!(
        &frame[..],
        &[0x04, 0x06, 0x01, 0x41, 0x00, 0x06, 0x44, 0x00]
    );
}

#[test]
fn settings_multiset_equality_gives_identical_bytes() {
    let a = SettingsFrame {
        values: vec![(0x7, 100), (0x1, 4096), (0x6, 0)],
    };
    let b = SettingsFrame {
        values: vec![(0x6, 0), (0x7, 100), (0x1, 4096)],
    };
    assert_eq!(
        encoder::serialize_settings_frame(&a).unwrap(),
        encoder::serialize_settings_frame(&b).unwrap()
    );
}

#[test]
fn empty_settings_frame() {
    let frame = encoder::serialize_settings_frame(&SettingsFrame::default()).unwrap();
    assert_eq!(&frame[..], &[0x04, 0x00]);
}

#[test]
fn goaway_frame() {
    let frame = encoder::serialize_goaway_frame(&GoAwayFrame { id: 0x1234 }).unwrap();
    assert_eq!(&frame[..], &[0x07, 0x02, 0x52, 0x34]);
}

#[test]
fn priority_update_request_stream() {
    let frame = encoder::serialize_priority_update_frame(&PriorityUpdateFrame {
        prioritized_element_type: PrioritizedElementType::RequestStream,
        prioritized_element_id: 0x08,
        priority_field_value: Bytes::from_static(b"u=3, i"),
    })
    .unwrap();

    let mut expected = vec![0x80, 0x0f, 0x07, 0x00]; // type 0xf0700 as 4-byte varint
    expected.push(0x07); // payload length: 1 + 6
    expected.push(0x08); // prioritized element id
    expected.extend_from_slice(b"u=3, i"); // no length prefix
    assert_eq!(&frame[..], &expected[..]);
}

#[test]
fn priority_update_push_stream_is_rejected() {
    let result = encoder::serialize_priority_update_frame(&PriorityUpdateFrame {
        prioritized_element_type: PrioritizedElementType::PushStream,
        prioritized_element_id: 4,
        priority_field_value: Bytes::new(),
    });
    assert!(matches!(result, Err(Error::UnsupportedPriorityType)));
}

#[test]
fn accept_ch_frame_preserves_order() {
    let frame = encoder::serialize_accept_ch_frame(&AcceptChFrame {
        entries: vec![
            AcceptChEntry {
                origin: Bytes::from_static(b"https://b.example"),
                value: Bytes::from_static(b"Sec-CH-UA"),
            },
            AcceptChEntry {
                origin: Bytes::from_static(b"https://a.example"),
                value: Bytes::from_static(b""),
            },
        ],
    })
    .unwrap();

    let mut expected = vec![0x40, 0x89]; // type 0x89 as 2-byte varint
    expected.push(47); // payload length
    expected.push(17);
    expected.extend_from_slice(b"https://b.example");
    expected.push(9);
    expected.extend_from_slice(b"Sec-CH-UA");
    expected.push(17);
    expected.extend_from_slice(b"https://a.example");
    expected.push(0);
    assert_eq!(&frame[..], &expected[..]);
}

#[test]
fn empty_accept_ch_frame() {
    let frame = encoder::serialize_accept_ch_frame(&AcceptChFrame::default()).unwrap();
    assert_eq!(&frame[..], &[0x40, 0x89, 0x00]);
}

#[test]
fn greasing_frame_deterministic_mode() {
    let _guard = GREASE_MODE.lock().unwrap();
    set_enable_http3_grease_randomness(false);
    let frame = encoder::serialize_greasing_frame().unwrap();
    assert_eq!(&frame[..], &[0x40, 0x40, 0x01, 0x61]);
}

#[test]
fn greasing_frame_randomized_mode() {
    let _guard = GREASE_MODE.lock().unwrap();
    set_enable_http3_grease_randomness(true);
    for _ in 0..64 {
        let frame = encoder::serialize_greasing_frame().unwrap();

        let mut rest = &frame[..];
        let frame_type = qwire_h3::varint::decode(&mut rest).unwrap();
        let payload_length = qwire_h3::varint::decode(&mut rest).unwrap();

        // Frame type stays on the 0x1f * N + 0x21 reserved grid
        // (RFC 9114 Section 7.2.8).
        assert_eq!((frame_type.wrapping_sub(0x21)) % 0x1f, 0);
        assert!(payload_length <= 3);
        assert_eq!(rest.len() as u64, payload_length);
    }
    set_enable_http3_grease_randomness(false);
}

#[test]
fn webtransport_stream_header() {
    let header = encoder::serialize_webtransport_stream_header(4).unwrap();
    // varint(0x41) || varint(4), and nothing else: no length field.
    assert_eq!(&header[..], &[0x40, 0x41, 0x04]);
}

#[test]
fn capsule_register_datagram_context() {
    let frame = encoder::serialize_capsule_frame(&Capsule::RegisterDatagramContext {
        context_id: 2,
        context_extensions: Bytes::from_static(&[0xde, 0xad]),
    })
    .unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&[0x80, 0xff, 0xca, 0xb5]); // CAPSULE type
    expected.push(4); // inner length: type(1) + id(1) + extensions(2)
    expected.push(0x00); // REGISTER_DATAGRAM_CONTEXT
    expected.push(0x02);
    expected.extend_from_slice(&[0xde, 0xad]);
    assert_eq!(&frame[..], &expected[..]);
}

#[test]
fn capsule_datagram_with_and_without_context() {
    let with_context = encoder::serialize_capsule_frame(&Capsule::Datagram {
        context_id: Some(3),
        payload: Bytes::from_static(b"ping"),
    })
    .unwrap();
    let mut expected = Vec::new();
    expected.extend_from_slice(&[0x80, 0xff, 0xca, 0xb5]);
    expected.push(6); // type(1) + context id(1) + payload(4)
    expected.push(0x02); // DATAGRAM
    expected.push(0x03);
    expected.extend_from_slice(b"ping");
    assert_eq!(&with_context[..], &expected[..]);

    let without_context = encoder::serialize_capsule_frame(&Capsule::Datagram {
        context_id: None,
        payload: Bytes::from_static(b"ping"),
    })
    .unwrap();
    let mut expected = Vec::new();
    expected.extend_from_slice(&[0x80, 0xff, 0xca, 0xb5]);
    expected.push(5);
    expected.push(0x02);
    expected.extend_from_slice(b"ping");
    assert_eq!(&without_context[..], &expected[..]);
}

#[test]
fn capsule_unknown_type() {
    let frame = encoder::serialize_capsule_frame(&Capsule::Unknown {
        capsule_type: 0x29,
        data: Bytes::from_static(&[0x01, 0x02, 0x03]),
    })
    .unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&[0x80, 0xff, 0xca, 0xb5]);
    expected.push(4);
    expected.push(0x29);
    expected.extend_from_slice(&[0x01, 0x02, 0x03]);
    assert_eq!(&frame[..], &expected[..]);
}

#[test]
fn every_serializer_length_matches_varint_arithmetic() {
    let settings = SettingsFrame {
        values: vec![(1, 70000), (6, 3)],
    };
    let frame = encoder::serialize_settings_frame(&settings).unwrap();
    let payload = encoded_len(1) + encoded_len(70000) + encoded_len(6) + encoded_len(3);
    assert_eq!(frame.len(), encoded_len(0x04) + encoded_len(payload as u64) + payload);

    let goaway = encoder::serialize_goaway_frame(&GoAwayFrame { id: 1 << 31 }).unwrap();
    assert_eq!(goaway.len(), 1 + 1 + encoded_len(1 << 31));
}
