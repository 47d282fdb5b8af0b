//! Process-wide HTTP/3 tunables.

use std::sync::atomic::{AtomicBool, Ordering};

/// When false (the default), [`crate::encoder::serialize_greasing_frame`]
/// emits a fixed reserved-type frame; when true it samples the frame type
/// and payload from a cryptographically secure source.
static ENABLE_HTTP3_GREASE_RANDOMNESS: AtomicBool = AtomicBool::new(false);

/// Select the GREASE mode for subsequent serializer calls.
pub fn set_enable_http3_grease_randomness(enabled: bool) {
    ENABLE_HTTP3_GREASE_RANDOMNESS.store(enabled, Ordering::Relaxed);
}

/// Current GREASE mode; read once per serializer call.
pub fn http3_grease_randomness_enabled() -> bool {
    ENABLE_HTTP3_GREASE_RANDOMNESS.load(Ordering::Relaxed)
}
