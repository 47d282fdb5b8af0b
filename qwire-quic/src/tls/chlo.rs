//! TLS ClientHello extraction from QUIC Initial packets.
//!
//! [`TlsChloExtractor`] ingests received datagrams, decrypts their
//! Initial-level payloads, reassembles the CRYPTO stream, and drives a
//! BoringSSL server handshake just far enough to parse the ClientHello.
//! The certificate-selection callback captures the SNI and ALPN list and
//! then aborts the handshake before any private-key operation.

use boring_sys as ffi;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_int, c_void};
use std::ptr;

use crate::crypto::{InitialKeys, Side};
use crate::error::Error;
use crate::frames;
use crate::packet::{self, is_supported_version};
use crate::stream::CryptoStreamSequencer;

// Values fixed by RFC 6066 / RFC 7301 / RFC 8446.
const TLSEXT_NAMETYPE_HOST_NAME: c_int = 0;
const TLSEXT_TYPE_ALPN: u16 = 16;
const TLS1_3_VERSION: u16 = 0x0304;
const TLS_ALERT_HANDSHAKE_FAILURE: u8 = 40;

/// Progress of the extraction, observable via [`TlsChloExtractor::state`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// No CRYPTO frame ingested yet.
    #[default]
    Initial,
    /// The whole ClientHello arrived in a single packet.
    ParsedFullSinglePacketChlo,
    /// The ClientHello was reassembled from more than one packet.
    ParsedFullMultiPacketChlo,
    /// CRYPTO data seen, ClientHello still incomplete.
    ParsedPartialChloFragment,
    /// Extraction cannot make progress; see
    /// [`TlsChloExtractor::error_details`].
    UnrecoverableFailure,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Initial => "Initial",
            State::ParsedFullSinglePacketChlo => "ParsedFullSinglePacketChlo",
            State::ParsedFullMultiPacketChlo => "ParsedFullMultiPacketChlo",
            State::ParsedPartialChloFragment => "ParsedPartialChloFragment",
            State::UnrecoverableFailure => "UnrecoverableFailure",
        };
        f.write_str(name)
    }
}

/// The part of the extractor the BoringSSL callbacks can reach.
///
/// Boxed behind a stable heap address so the extractor value itself can
/// move freely while the `SSL` handle keeps its ex-data back-pointer.
#[derive(Debug, Default)]
struct CallbackState {
    state: State,
    server_name: Option<String>,
    alpns: Vec<String>,
    error_details: String,
}

impl CallbackState {
    fn has_parsed_full_chlo(&self) -> bool {
        matches!(
            self.state,
            State::ParsedFullSinglePacketChlo | State::ParsedFullMultiPacketChlo
        )
    }

    fn handle_unrecoverable_error(&mut self, details: &str) {
        if self.has_parsed_full_chlo() {
            tracing::debug!(details, "ignoring error after full ClientHello");
            return;
        }
        tracing::debug!(details, "handling unrecoverable error");
        self.state = State::UnrecoverableFailure;
        if self.error_details.is_empty() {
            self.error_details = details.to_owned();
        } else {
            self.error_details = format!("{}; {}", self.error_details, details);
        }
    }

    fn handle_unexpected_callback(&mut self, callback_name: &str) {
        let details = format!("Unexpected callback {callback_name}");
        tracing::error!("{details}");
        self.handle_unrecoverable_error(&details);
    }

    fn on_send_alert(&mut self, alert: u8, description: &str) {
        if alert == TLS_ALERT_HANDSHAKE_FAILURE && self.has_parsed_full_chlo() {
            // Expected: the certificate-selection callback returns an
            // error to cancel processing, and BoringSSL responds by
            // trying to tell the client the handshake failed.
            return;
        }
        self.handle_unrecoverable_error(&format!(
            "BoringSSL attempted to send alert {alert} {description}"
        ));
    }

    /// Invoked with the parsed ClientHello from the certificate-selection
    /// callback.
    fn on_parsed_chlo(&mut self, server_name: Option<String>, alpn_extension: Option<&[u8]>) {
        if let Some(name) = server_name {
            self.server_name = Some(name);
        }

        if let Some(bytes) = alpn_extension {
            // A 16-bit length-prefixed vector of 8-bit length-prefixed
            // protocol names (RFC 7301 Section 3.1).
            if bytes.len() < 2 {
                self.handle_unrecoverable_error("Failed to read alpns_payload");
                return;
            }
            let total = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
            let Some(mut rest) = bytes.get(2..2 + total) else {
                self.handle_unrecoverable_error("Failed to read alpns_payload");
                return;
            };
            while let [len, tail @ ..] = rest {
                let len = usize::from(*len);
                if tail.len() < len {
                    self.handle_unrecoverable_error("Failed to read alpn_payload");
                    return;
                }
                self.alpns
                    .push(String::from_utf8_lossy(&tail[..len]).into_owned());
                rest = &tail[len..];
            }
        }

        match self.state {
            State::Initial => self.state = State::ParsedFullSinglePacketChlo,
            State::ParsedPartialChloFragment => self.state = State::ParsedFullMultiPacketChlo,
            other => tracing::error!(state = %other, "unexpected state on successful parse"),
        }
    }
}

/// Shared BoringSSL context and ex-data index.
///
/// Built once per process and never torn down: context setup is the
/// expensive part, and the table of callbacks is immutable.
struct SharedSslHandles {
    ctx: *mut ffi::SSL_CTX,
    ex_data_index: c_int,
}

unsafe impl Send for SharedSslHandles {}
unsafe impl Sync for SharedSslHandles {}

static QUIC_CALLBACKS: ffi::SSL_QUIC_METHOD = ffi::SSL_QUIC_METHOD {
    set_read_secret: Some(set_read_secret_callback),
    set_write_secret: Some(set_write_secret_callback),
    add_handshake_data: Some(write_message_callback),
    flush_flight: Some(flush_flight_callback),
    send_alert: Some(send_alert_callback),
};

static SHARED_HANDLES: Lazy<SharedSslHandles> = Lazy::new(|| unsafe {
    ffi::CRYPTO_library_init();
    let ctx = ffi::SSL_CTX_new(ffi::TLS_with_buffers_method());
    assert!(!ctx.is_null(), "SSL_CTX_new failed");
    ffi::SSL_CTX_set_min_proto_version(ctx, TLS1_3_VERSION);
    ffi::SSL_CTX_set_max_proto_version(ctx, TLS1_3_VERSION);
    ffi::SSL_CTX_set_quic_method(ctx, &QUIC_CALLBACKS);
    ffi::SSL_CTX_set_select_certificate_cb(ctx, Some(select_certificate_callback));
    let ex_data_index =
        ffi::SSL_get_ex_new_index(0, ptr::null_mut(), ptr::null_mut(), None, None);
    assert!(ex_data_index >= 0, "SSL_get_ex_new_index failed");
    SharedSslHandles { ctx, ex_data_index }
});

/// Resolve the owning extractor's callback state from an `SSL` handle.
unsafe fn callback_state<'a>(ssl: *const ffi::SSL) -> Option<&'a RefCell<CallbackState>> {
    let ptr = ffi::SSL_get_ex_data(ssl as *mut ffi::SSL, SHARED_HANDLES.ex_data_index)
        as *const RefCell<CallbackState>;
    ptr.as_ref()
}

unsafe extern "C" fn set_read_secret_callback(
    ssl: *mut ffi::SSL,
    _level: ffi::ssl_encryption_level_t,
    _cipher: *const ffi::SSL_CIPHER,
    _secret: *const u8,
    _secret_len: usize,
) -> c_int {
    if let Some(state) = callback_state(ssl) {
        state.borrow_mut().handle_unexpected_callback("SetReadSecretCallback");
    }
    0
}

unsafe extern "C" fn set_write_secret_callback(
    ssl: *mut ffi::SSL,
    _level: ffi::ssl_encryption_level_t,
    _cipher: *const ffi::SSL_CIPHER,
    _secret: *const u8,
    _secret_len: usize,
) -> c_int {
    if let Some(state) = callback_state(ssl) {
        state.borrow_mut().handle_unexpected_callback("SetWriteSecretCallback");
    }
    0
}

unsafe extern "C" fn write_message_callback(
    ssl: *mut ffi::SSL,
    _level: ffi::ssl_encryption_level_t,
    _data: *const u8,
    _len: usize,
) -> c_int {
    if let Some(state) = callback_state(ssl) {
        state.borrow_mut().handle_unexpected_callback("WriteMessageCallback");
    }
    0
}

unsafe extern "C" fn flush_flight_callback(ssl: *mut ffi::SSL) -> c_int {
    if let Some(state) = callback_state(ssl) {
        state.borrow_mut().handle_unexpected_callback("FlushFlightCallback");
    }
    0
}

unsafe extern "C" fn send_alert_callback(
    ssl: *mut ffi::SSL,
    _level: ffi::ssl_encryption_level_t,
    alert: u8,
) -> c_int {
    let description = {
        let desc = ffi::SSL_alert_desc_string_long(c_int::from(alert));
        if desc.is_null() {
            String::new()
        } else {
            CStr::from_ptr(desc).to_string_lossy().into_owned()
        }
    };
    if let Some(state) = callback_state(ssl) {
        state.borrow_mut().on_send_alert(alert, &description);
    }
    0
}

unsafe extern "C" fn select_certificate_callback(
    client_hello: *const ffi::SSL_CLIENT_HELLO,
) -> ffi::ssl_select_cert_result_t {
    let ssl = (*client_hello).ssl;

    let server_name = {
        let name = ffi::SSL_get_servername(ssl, TLSEXT_NAMETYPE_HOST_NAME);
        if name.is_null() {
            None
        } else {
            Some(CStr::from_ptr(name).to_string_lossy().into_owned())
        }
    };

    let mut alpn_data: *const u8 = ptr::null();
    let mut alpn_len: usize = 0;
    let alpn = if ffi::SSL_early_callback_ctx_extension_get(
        client_hello,
        TLSEXT_TYPE_ALPN,
        &mut alpn_data,
        &mut alpn_len,
    ) == 1
        && !alpn_data.is_null()
    {
        Some(std::slice::from_raw_parts(alpn_data, alpn_len))
    } else {
        None
    };

    if let Some(state) = callback_state(ssl) {
        state.borrow_mut().on_parsed_chlo(server_name, alpn);
    }

    // Always an error: this cancels any further processing in BoringSSL
    // before it would need a certificate or private key.
    ffi::ssl_select_cert_result_t::ssl_select_cert_error
}

struct SslHandle(*mut ffi::SSL);

impl Drop for SslHandle {
    fn drop(&mut self) {
        unsafe { ffi::SSL_free(self.0) };
    }
}

/// Extracts the SNI and ALPN list from the TLS ClientHello carried by
/// one or more QUIC Initial packets.
///
/// Not reentrant: callers serialize [`ingest_packet`] invocations per
/// instance. All work completes synchronously before control returns.
///
/// [`ingest_packet`]: Self::ingest_packet
#[derive(Default)]
pub struct TlsChloExtractor {
    version: Option<u32>,
    sequencer: CryptoStreamSequencer,
    ssl: Option<SslHandle>,
    shared_state: Box<RefCell<CallbackState>>,
}

impl TlsChloExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one received datagram.
    ///
    /// Packets that are not long-header Initials, carry an unsupported
    /// version, disagree with the version fixed by the first packet, or
    /// fail decryption are dropped without a state change. In the failure
    /// terminal state this is a no-op.
    pub fn ingest_packet(&mut self, version: u32, packet: &[u8]) {
        if self.state() == State::UnrecoverableFailure {
            tracing::debug!("not ingesting packet after unrecoverable error");
            return;
        }
        if !is_supported_version(version) {
            tracing::debug!(version, "not ingesting packet with unsupported version");
            return;
        }
        match self.version {
            Some(expected) if expected != version => {
                tracing::debug!(
                    expected,
                    got = version,
                    "not ingesting packet with version mismatch"
                );
                return;
            }
            None => self.version = Some(version),
            _ => {}
        }

        let mut parsed_crypto_frame_in_this_packet = false;
        let parse_success =
            self.process_packet(version, packet, &mut parsed_crypto_frame_in_this_packet);

        if self.state() == State::Initial && parsed_crypto_frame_in_this_packet {
            // A CRYPTO frame was seen but did not complete the CHLO, so
            // more packets are needed. Tracking this distinguishes the
            // single-packet and multi-packet outcomes.
            self.shared_state.borrow_mut().state = State::ParsedPartialChloFragment;
        }

        if !parse_success {
            tracing::debug!("failed to process packet");
        }
    }

    /// True once the ClientHello has been fully parsed.
    pub fn has_parsed_full_chlo(&self) -> bool {
        self.shared_state.borrow().has_parsed_full_chlo()
    }

    /// The server_name extension value; `None` until a full ClientHello
    /// has been parsed or when the client sent no SNI.
    pub fn server_name(&self) -> Option<String> {
        self.shared_state.borrow().server_name.clone()
    }

    /// The ALPN list in client preference order; empty until a full
    /// ClientHello has been parsed.
    pub fn alpns(&self) -> Vec<String> {
        self.shared_state.borrow().alpns.clone()
    }

    /// Accumulated diagnostics; non-empty iff the state is
    /// [`State::UnrecoverableFailure`].
    pub fn error_details(&self) -> String {
        self.shared_state.borrow().error_details.clone()
    }

    pub fn state(&self) -> State {
        self.shared_state.borrow().state
    }

    fn process_packet(
        &mut self,
        version: u32,
        packet: &[u8],
        parsed_crypto_frame: &mut bool,
    ) -> bool {
        let header = match packet::parse_initial(packet) {
            Ok(header) => header,
            Err(error) => {
                tracing::debug!(%error, "not parsing packet");
                return false;
            }
        };

        // Initial keys are seeded from each packet's destination
        // connection ID (RFC 9001 Section 5.2).
        let keys = match InitialKeys::derive(version, header.dcid, Side::Client) {
            Ok(keys) => keys,
            Err(error) => {
                tracing::debug!(%error, "failed to derive Initial keys");
                return false;
            }
        };
        let payload = match keys.open(&header) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(%error, "failed to decrypt packet");
                return false;
            }
        };

        let sequencer = &mut self.sequencer;
        let walked = frames::for_each_crypto_frame(&payload, |frame| {
            *parsed_crypto_frame = true;
            sequencer.offer(frame.offset, frame.data)
        });
        match walked {
            Ok(()) => {}
            Err(error @ Error::Reassembly(_)) => {
                self.handle_unrecoverable_error(&format!("Crypto stream error: {error}"));
                return false;
            }
            Err(error) => {
                tracing::debug!(%error, "failed to parse frames");
                return false;
            }
        }

        self.on_data_available();
        true
    }

    /// Feed every newly contiguous CRYPTO byte to BoringSSL and let it
    /// attempt to parse a full ClientHello.
    fn on_data_available(&mut self) {
        if self.sequencer.readable_region().is_none() {
            return;
        }
        self.setup_ssl_handle();
        let Some(ssl) = self.ssl.as_ref().map(|handle| handle.0) else {
            return;
        };

        loop {
            let (data, len) = match self.sequencer.readable_region() {
                Some(region) => (region.as_ptr(), region.len()),
                None => break,
            };
            let rv = unsafe {
                ffi::SSL_provide_quic_data(
                    ssl,
                    ffi::ssl_encryption_level_t::ssl_encryption_initial,
                    data,
                    len,
                )
            };
            if rv != 1 {
                self.handle_unrecoverable_error("SSL_provide_quic_data failed");
                return;
            }
            self.sequencer.mark_consumed(len);
        }

        // The return value is deliberately ignored: the handshake is
        // cancelled from the certificate-selection callback once the
        // ClientHello has been parsed.
        let _ = unsafe { ffi::SSL_do_handshake(ssl) };
    }

    fn setup_ssl_handle(&mut self) {
        if self.ssl.is_some() {
            return;
        }
        let handles = &*SHARED_HANDLES;
        let ssl = unsafe { ffi::SSL_new(handles.ctx) };
        if ssl.is_null() {
            self.handle_unrecoverable_error("SSL_new failed");
            return;
        }
        let state_ptr = &*self.shared_state as *const RefCell<CallbackState> as *mut c_void;
        let rv = unsafe { ffi::SSL_set_ex_data(ssl, handles.ex_data_index, state_ptr) };
        if rv != 1 {
            unsafe { ffi::SSL_free(ssl) };
            self.handle_unrecoverable_error("SSL_set_ex_data failed");
            return;
        }
        unsafe { ffi::SSL_set_accept_state(ssl) };
        self.ssl = Some(SslHandle(ssl));
    }

    fn handle_unrecoverable_error(&self, details: &str) {
        self.shared_state.borrow_mut().handle_unrecoverable_error(details);
    }
}

impl fmt::Debug for TlsChloExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared_state.borrow();
        f.debug_struct("TlsChloExtractor")
            .field("version", &self.version)
            .field("state", &state.state)
            .field("server_name", &state.server_name)
            .field("alpns", &state.alpns)
            .field("error_details", &state.error_details)
            .finish()
    }
}
