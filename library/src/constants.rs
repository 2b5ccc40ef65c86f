use std::time::Duration;

/// Pause between a failure and the next connection attempt.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 5000;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(DEFAULT_RESTART_DELAY_MS);

pub const SDP_CONTENT_TYPE: &str = "application/sdp";
pub const TRICKLE_ICE_CONTENT_TYPE: &str = "application/trickle-ice-sdpfrag";
