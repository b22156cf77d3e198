//! Network Constants
//!
//! Endpoints and limits for the telemetry intake and the smoothness-analysis link.

// ===== ENDPOINTS =====

/// Inbound telemetry PULL endpoint; the sensor feeder PUSHes here.
pub const DEFAULT_TELEMETRY_ENDPOINT: &str = "tcp://127.0.0.1:5555";

/// Smoothness-analysis service address.
pub const DEFAULT_ANALYSIS_ADDR: &str = "127.0.0.1:5556";

// ===== WINDOWING =====

/// Samples per smoothness analysis window.
///
/// At the feeder's 60 Hz output rate this is one exchange every 5 seconds.
pub const SMOOTHNESS_WINDOW_CAPACITY: usize = 300;

/// Telemetry entries consumed per message (thigh and shin).
pub const MAX_SENSORS_PER_MESSAGE: usize = 2;

// ===== LIMITS & TIMEOUTS =====

/// Response buffer for the unframed legacy protocol (bytes).
pub const UNFRAMED_RESPONSE_BUFFER: usize = 1024;

/// Largest document accepted on the length-prefixed protocol (bytes).
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Connect timeout for the analysis link (milliseconds).
pub const ANALYSIS_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Read/write timeout bounding one analysis exchange (milliseconds).
pub const ANALYSIS_IO_TIMEOUT_MS: u64 = 2000;

/// How long the receive loop blocks before re-checking its stop flag (milliseconds).
pub const TELEMETRY_POLL_INTERVAL_MS: u64 = 50;

/// Upper bound on waiting for the receive loop to exit on stop (milliseconds).
pub const TELEMETRY_JOIN_TIMEOUT_MS: u64 = 500;

/// Foreground tick period (milliseconds), about 60 Hz.
pub const TICK_INTERVAL_MS: u64 = 16;
