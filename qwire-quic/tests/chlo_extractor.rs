//! End-to-end ClientHello extraction from protected Initial packets.

use qwire_quic::crypto::{InitialKeys, Side};
use qwire_quic::tls::{State, TlsChloExtractor};
use qwire_quic::varint;
use qwire_quic::{VERSION_V1, VERSION_V2};

const DCID: &[u8] = &[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08];
const SCID: &[u8] = &[0xf0, 0x67, 0xa5, 0x50, 0x2a, 0x42, 0x62, 0xb5];

fn extension(out: &mut Vec<u8>, ext_type: u16, body: &[u8]) {
    out.extend_from_slice(&ext_type.to_be_bytes());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
}

/// A structurally valid TLS 1.3 ClientHello handshake message carrying
/// the given SNI and ALPN list, as a QUIC client would send it.
fn client_hello(server_name: &str, alpns: &[&str]) -> Vec<u8> {
    let mut extensions = Vec::new();

    // server_name (RFC 6066)
    let mut sni = Vec::new();
    sni.extend_from_slice(&((server_name.len() + 3) as u16).to_be_bytes());
    sni.push(0x00); // host_name
    sni.extend_from_slice(&(server_name.len() as u16).to_be_bytes());
    sni.extend_from_slice(server_name.as_bytes());
    extension(&mut extensions, 0x0000, &sni);

    // application_layer_protocol_negotiation (RFC 7301)
    if !alpns.is_empty() {
        let mut protocols = Vec::new();
        for alpn in alpns {
            protocols.push(alpn.len() as u8);
            protocols.extend_from_slice(alpn.as_bytes());
        }
        let mut alpn_body = Vec::new();
        alpn_body.extend_from_slice(&(protocols.len() as u16).to_be_bytes());
        alpn_body.extend_from_slice(&protocols);
        extension(&mut extensions, 0x0010, &alpn_body);
    }

    // supported_groups: x25519
    extension(&mut extensions, 0x000a, &[0x00, 0x02, 0x00, 0x1d]);

    // signature_algorithms: ecdsa_secp256r1_sha256, rsa_pss_rsae_sha256
    extension(&mut extensions, 0x000d, &[0x00, 0x04, 0x04, 0x03, 0x08, 0x04]);

    // supported_versions: TLS 1.3
    extension(&mut extensions, 0x002b, &[0x02, 0x03, 0x04]);

    // psk_key_exchange_modes: psk_dhe_ke
    extension(&mut extensions, 0x002d, &[0x01, 0x01]);

    // key_share: x25519 with a fixed public value
    let mut key_share = Vec::new();
    key_share.extend_from_slice(&36u16.to_be_bytes());
    key_share.extend_from_slice(&[0x00, 0x1d]);
    key_share.extend_from_slice(&32u16.to_be_bytes());
    key_share.extend_from_slice(&[0x5a; 32]);
    extension(&mut extensions, 0x0033, &key_share);

    // quic_transport_parameters: initial_source_connection_id (empty),
    // initial_max_data = 25
    extension(&mut extensions, 0x0039, &[0x0f, 0x00, 0x04, 0x01, 0x19]);

    let mut body = Vec::new();
    body.extend_from_slice(&[0x03, 0x03]); // legacy_version
    body.extend_from_slice(&[0x42; 32]); // random
    body.push(0x00); // empty legacy_session_id
    body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]); // TLS_AES_128_GCM_SHA256
    body.extend_from_slice(&[0x01, 0x00]); // null compression
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut message = vec![0x01]; // client_hello
    message.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    message.extend_from_slice(&body);
    message
}

/// Wrap a CRYPTO frame around `data` at `offset` and seal it into a
/// padded Initial packet.
fn initial_packet(version: u32, packet_number: u64, offset: u64, data: &[u8]) -> Vec<u8> {
    let mut frames = vec![0x06];
    varint::encode(offset, &mut frames).unwrap();
    varint::encode(data.len() as u64, &mut frames).unwrap();
    frames.extend_from_slice(data);
    frames.resize(frames.len().max(1100), 0x00); // PADDING to a plausible size

    let keys = InitialKeys::derive(version, DCID, Side::Client).unwrap();
    keys.seal_packet(version, DCID, SCID, packet_number, &frames)
        .unwrap()
}

#[test]
fn single_packet_chlo() {
    let chlo = client_hello("example.org", &["h3"]);
    let packet = initial_packet(VERSION_V1, 0, 0, &chlo);

    let mut extractor = TlsChloExtractor::new();
    assert_eq!(extractor.state(), State::Initial);

    extractor.ingest_packet(VERSION_V1, &packet);
    assert_eq!(extractor.state(), State::ParsedFullSinglePacketChlo, "{}", extractor.error_details());
    assert!(extractor.has_parsed_full_chlo());
    assert_eq!(extractor.server_name().as_deref(), Some("example.org"));
    assert_eq!(extractor.alpns(), vec!["h3".to_string()]);
    assert!(extractor.error_details().is_empty());
}

#[test]
fn multi_packet_chlo() {
    let chlo = client_hello("example.org", &["h3"]);
    let split = chlo.len() / 2;
    let first = initial_packet(VERSION_V1, 0, 0, &chlo[..split]);
    let second = initial_packet(VERSION_V1, 1, split as u64, &chlo[split..]);

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &first);
    assert_eq!(extractor.state(), State::ParsedPartialChloFragment);
    assert!(!extractor.has_parsed_full_chlo());
    assert!(extractor.server_name().is_none());

    extractor.ingest_packet(VERSION_V1, &second);
    assert_eq!(extractor.state(), State::ParsedFullMultiPacketChlo, "{}", extractor.error_details());
    assert_eq!(extractor.server_name().as_deref(), Some("example.org"));
    assert_eq!(extractor.alpns(), vec!["h3".to_string()]);
}

#[test]
fn out_of_order_packets() {
    let chlo = client_hello("example.org", &["h3", "h3-29"]);
    let split = chlo.len() / 3;
    let tail = initial_packet(VERSION_V1, 1, split as u64, &chlo[split..]);
    let head = initial_packet(VERSION_V1, 0, 0, &chlo[..split]);

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &tail);
    assert_eq!(extractor.state(), State::ParsedPartialChloFragment);

    extractor.ingest_packet(VERSION_V1, &head);
    assert_eq!(extractor.state(), State::ParsedFullMultiPacketChlo, "{}", extractor.error_details());
    assert_eq!(
        extractor.alpns(),
        vec!["h3".to_string(), "h3-29".to_string()]
    );
}

#[test]
fn terminal_state_is_idempotent() {
    let chlo = client_hello("example.org", &["h3"]);
    let packet = initial_packet(VERSION_V1, 0, 0, &chlo);

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &packet);
    assert!(extractor.has_parsed_full_chlo());

    let other_chlo = client_hello("other.example", &["hq-interop"]);
    let other = initial_packet(VERSION_V1, 2, 0, &other_chlo);
    extractor.ingest_packet(VERSION_V1, &other);

    assert_eq!(extractor.state(), State::ParsedFullSinglePacketChlo);
    assert_eq!(extractor.server_name().as_deref(), Some("example.org"));
    assert_eq!(extractor.alpns(), vec!["h3".to_string()]);
}

#[test]
fn version_mismatch_packets_are_dropped() {
    let chlo = client_hello("example.org", &["h3"]);
    let split = chlo.len() / 2;
    let first = initial_packet(VERSION_V1, 0, 0, &chlo[..split]);
    let second_v2 = initial_packet(VERSION_V2, 1, split as u64, &chlo[split..]);

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &first);
    assert_eq!(extractor.state(), State::ParsedPartialChloFragment);

    // The first packet fixed the version; this one must be ignored.
    extractor.ingest_packet(VERSION_V2, &second_v2);
    assert_eq!(extractor.state(), State::ParsedPartialChloFragment);
    assert!(!extractor.has_parsed_full_chlo());
}

#[test]
fn unsupported_version_is_dropped() {
    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(0xdead_beef, &[0xc0; 1200]);
    assert_eq!(extractor.state(), State::Initial);
}

#[test]
fn short_header_packet_is_dropped() {
    let mut extractor = TlsChloExtractor::new();
    let mut packet = vec![0x43]; // short header form
    packet.extend_from_slice(&[0u8; 64]);
    extractor.ingest_packet(VERSION_V1, &packet);
    assert_eq!(extractor.state(), State::Initial);
}

#[test]
fn undecryptable_packet_is_dropped() {
    let chlo = client_hello("example.org", &["h3"]);
    let mut packet = initial_packet(VERSION_V1, 0, 0, &chlo);
    let last = packet.len() - 1;
    packet[last] ^= 0xff; // corrupt the AEAD tag

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &packet);
    assert_eq!(extractor.state(), State::Initial);
    assert!(extractor.error_details().is_empty());
}

#[test]
fn conflicting_crypto_retransmission_fails() {
    let chlo = client_hello("example.org", &["h3"]);
    let split = chlo.len() / 2;
    // The tail is buffered but not consumed while the head is missing.
    let tail = initial_packet(VERSION_V1, 0, split as u64, &chlo[split..]);

    let mut conflicting = chlo[split..].to_vec();
    conflicting[0] ^= 0xff;
    let conflicting_tail = initial_packet(VERSION_V1, 1, split as u64, &conflicting);

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &tail);
    assert_eq!(extractor.state(), State::ParsedPartialChloFragment);

    extractor.ingest_packet(VERSION_V1, &conflicting_tail);
    assert_eq!(extractor.state(), State::UnrecoverableFailure);
    assert!(extractor.error_details().contains("Crypto stream error"));

    // Sticky: further packets are ignored even if they would complete
    // the ClientHello.
    let head = initial_packet(VERSION_V1, 2, 0, &chlo[..split]);
    extractor.ingest_packet(VERSION_V1, &head);
    assert_eq!(extractor.state(), State::UnrecoverableFailure);
    assert!(!extractor.has_parsed_full_chlo());
}

#[test]
fn chlo_without_alpn_still_parses() {
    let chlo = client_hello("example.org", &[]);
    let packet = initial_packet(VERSION_V1, 0, 0, &chlo);

    let mut extractor = TlsChloExtractor::new();
    extractor.ingest_packet(VERSION_V1, &packet);
    assert!(extractor.has_parsed_full_chlo(), "{}", extractor.error_details());
    assert_eq!(extractor.server_name().as_deref(), Some("example.org"));
    assert!(extractor.alpns().is_empty());
}
