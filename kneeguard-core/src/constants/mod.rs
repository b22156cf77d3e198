//! Constants for KneeGuard Core
//!
//! Centralized values used throughout the session engine. Defaults in the config
//! structs point here rather than repeating literals.
//!
//! ## Organization
//!
//! - **Game**: timing, scoring and gauge geometry of the assessment game
//! - **Calibration**: settle and capture delays
//! - **Network**: endpoints, buffer sizes and timeouts for the two sockets

/// Assessment game timing, scoring budget and gauge geometry.
pub mod game;

/// Calibration delays.
pub mod calibration;

/// Endpoints, framing limits and socket timeouts.
pub mod network;

// Re-export commonly used constants for convenience
pub use game::{
    GAME_DURATION_S, ASSESSMENT_INTERVAL_S, POINTS_PER_ASSESSMENT, MAX_POINTS,
    MIN_KNEE_ANGLE_DEG, MAX_KNEE_ANGLE_DEG, WINDOW_MOVEMENT_SPEED,
};

pub use network::{
    DEFAULT_TELEMETRY_ENDPOINT, DEFAULT_ANALYSIS_ADDR, SMOOTHNESS_WINDOW_CAPACITY,
};
