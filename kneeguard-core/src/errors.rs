//! Error Types for the KneeGuard Core
//!
//! ## Error Categories
//!
//! Every failure in the core lands in one of five buckets, and each bucket has a
//! fixed blast radius:
//!
//! ### Transport
//! - `Transport`: socket bind/receive/connect/write failures. The telemetry loop logs
//!   and keeps going; the smoothness client disables itself for the rest of the session.
//!
//! ### Payload
//! - `Decode`: malformed telemetry or analysis-response document. The message is
//!   dropped and counted, never propagated into the tick loop.
//!
//! ### Computation
//! - `InvalidInput`: missing or non-finite orientation data reached the angle
//!   calculator. The caller picks the fallback (hold last angle, skip the tick).
//!
//! ### Session
//! - `CalibrationFailure`: readings missing or sensor roles unresolved. Shows up as the
//!   calibration `Failed` phase and is user-retriable.
//! - `InvalidTransition`: a control command arrived in a phase that cannot accept it.
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use kneeguard_core::KneeGuardError;
//!
//! fn on_angle(result: Result<f64, KneeGuardError>, last_angle: &mut Option<f64>) {
//!     match result {
//!         Ok(angle) => *last_angle = Some(angle),
//!         Err(KneeGuardError::InvalidInput { .. }) => {
//!             // keep showing the last good angle
//!         }
//!         Err(_) => {}
//!     }
//! }
//! ```
//!
//! No variant is fatal to the process: the worst outcome is a degraded feature.

use serde::Serialize;
use thiserror::Error;

/// Result type for core operations
pub type KneeGuardResult<T> = Result<T, KneeGuardError>;

/// Core error taxonomy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KneeGuardError {
    /// Socket-level failure (bind, receive, connect, write, read timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Orientation data unusable for angle computation
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input
        reason: &'static str,
    },

    /// Calibration could not capture a usable baseline
    #[error("Calibration failed: {reason}")]
    CalibrationFailure {
        /// Why the capture was rejected
        reason: CalibrationFailureReason,
    },

    /// Control command issued in the wrong phase
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        /// Requested action
        action: &'static str,
        /// Phase the session was in
        phase: &'static str,
    },

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file I/O (session export, config loading)
    #[error("I/O error: {0}")]
    Io(String),
}

/// Why a calibration capture failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationFailureReason {
    /// One or both sensor slots had no reading
    MissingReading,
    /// A reading carried an id that maps to no segment role
    UnknownSensor,
    /// Both readings mapped to the same role
    DuplicateRole,
}

impl core::fmt::Display for CalibrationFailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::MissingReading => "sensor reading missing",
            Self::UnknownSensor => "sensor id does not map to thigh or shin",
            Self::DuplicateRole => "both sensors resolve to the same segment",
        };
        f.write_str(text)
    }
}

impl From<std::io::Error> for KneeGuardError {
    fn from(err: std::io::Error) -> Self {
        KneeGuardError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KneeGuardError {
    fn from(err: serde_json::Error) -> Self {
        KneeGuardError::Decode(err.to_string())
    }
}

impl KneeGuardError {
    /// Transport errors end analysis for the session; everything else is per-message
    pub fn is_transport(&self) -> bool {
        matches!(self, KneeGuardError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        let err = KneeGuardError::CalibrationFailure {
            reason: CalibrationFailureReason::DuplicateRole,
        };
        assert_eq!(
            err.to_string(),
            "Calibration failed: both sensors resolve to the same segment"
        );

        let err = KneeGuardError::InvalidTransition { action: "start", phase: "uncalibrated" };
        assert_eq!(err.to_string(), "Cannot start while uncalibrated");
    }

    #[test]
    fn json_errors_become_decode_errors() {
        let err: KneeGuardError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, KneeGuardError::Decode(_)));
        assert!(!err.is_transport());
    }
}
