//! Transports for the KneeGuard session engine
//!
//! ## Overview
//!
//! The core crate never touches a socket. This crate supplies the two links it needs:
//!
//! | Link | Direction | Transport | Type |
//! |------|-----------|-----------|------|
//! | Telemetry intake | feeder → session | ZeroMQ PULL (bound) | [`TelemetryChannel`] over a [`MessageSource`] |
//! | Smoothness analysis | session ↔ service | TCP request/response | [`AnalysisClient`], [`AnalysisWorker`] |
//!
//! ### Telemetry intake
//!
//! One background thread per channel blocks on the source for at most a poll interval,
//! decodes each message and overwrites the latest-reading cache. Bad messages are
//! counted and dropped; the loop only exits when asked to or when the source closes.
//!
//! ```text
//! feeder ──PUSH──▶ ZmqPullSource ──poll──▶ receive loop ──publish──▶ LatestReadingCache ◀── tick loop
//!                                              │
//!                                              └── stop flag checked between polls
//! ```
//!
//! ### Smoothness analysis
//!
//! [`AnalysisClient`] performs the exchange inline: it stalls the calling tick for one
//! round trip, bounded by socket timeouts. [`AnalysisWorker`] moves the same client onto
//! its own thread and hands results back through a channel, so the tick never waits.
//!
//! ## Example
//!
//! ```no_run
//! use kneeguard_connectors::{telemetry::TelemetryChannel, zmq::ZmqPullSource};
//! use kneeguard_core::{SensorSlot, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! let source = ZmqPullSource::bind(&config.endpoint)?;
//! let mut channel = TelemetryChannel::new(source, &config);
//! channel.start()?;
//!
//! if let Some(reading) = channel.latest(SensorSlot::First) {
//!     println!("{} -> {:?}", reading.sensor_id, reading.orientation);
//! }
//! channel.stop();
//! # Ok::<(), kneeguard_connectors::ConnectorError>(())
//! ```

pub mod analysis;
pub mod telemetry;

#[cfg(feature = "zmq")]
pub mod zmq;

// Re-export common types
pub use analysis::{AnalysisClient, AnalysisStats, AnalysisWorker};
pub use telemetry::{ChannelSource, MessageSource, TelemetryChannel, TelemetryStats};

#[cfg(feature = "zmq")]
pub use zmq::ZmqPullSource;

use kneeguard_core::KneeGuardError;
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Source closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<ConnectorError> for KneeGuardError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::ConfigError(msg) => KneeGuardError::Config(msg),
            other => KneeGuardError::Transport(other.to_string()),
        }
    }
}
