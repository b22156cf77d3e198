//! Calibration Constants

/// Time the user gets to stand straight before capture begins (seconds).
pub const SETTLE_DELAY_S: f64 = 3.0;

/// Time spent holding still in the capture phase before the snapshot (seconds).
pub const CAPTURE_DELAY_S: f64 = 2.0;

/// Smallest quaternion norm accepted as a real orientation.
///
/// The telemetry feeder's placeholder reading is an all-zero quaternion; anything
/// this short is treated as "no orientation".
pub const MIN_QUATERNION_NORM: f64 = 1e-6;
