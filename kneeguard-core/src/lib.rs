//! Core session engine for KneeGuard
//!
//! Turns two streams of sensor-fused orientations (thigh and shin) into a calibrated
//! knee-flexion angle, scores it against a moving target window, and cuts the tracked
//! segment's motion into fixed windows for smoothness analysis.
//!
//! No sockets live here. Telemetry arrives through [`ReadingSource`] (normally a
//! [`LatestReadingCache`] fed by a receive thread) and smoothness windows leave through
//! [`SmoothnessAnalyzer`]; `kneeguard-connectors` supplies both over the network.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kneeguard_core::{DisabledAnalyzer, LatestReadingCache, MonotonicTime, Session, SessionConfig};
//!
//! let cache = Arc::new(LatestReadingCache::new());
//! let mut session = Session::new(
//!     SessionConfig::default(),
//!     Arc::clone(&cache),
//!     DisabledAnalyzer,
//!     Box::new(MonotonicTime::new()),
//! )?;
//!
//! session.trigger_calibration()?;
//! loop {
//!     session.tick();
//!     let snapshot = session.snapshot();
//!     if snapshot.state.current_grade.is_some() {
//!         break;
//!     }
//! }
//! # Ok::<(), kneeguard_core::KneeGuardError>(())
//! ```

#![deny(unsafe_code)]

pub mod angle;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod errors;
pub mod framing;
pub mod orientation;
pub mod recorder;
pub mod scoring;
pub mod session;
pub mod smoothness;
pub mod telemetry;
pub mod time;
pub mod traits;

// Public API
pub use angle::knee_angle;
pub use cache::LatestReadingCache;
pub use calibration::{
    resolve_roles, CalibrationBaseline, CalibrationEngine, CalibrationPhase, RoleMap, SegmentPair, SegmentRole,
};
pub use config::{
    AnalysisConfig, AnalysisMode, AnglePolicy, CalibrationConfig, GameConfig, SessionConfig, TelemetryConfig,
};
pub use errors::{CalibrationFailureReason, KneeGuardError, KneeGuardResult};
pub use framing::Framing;
pub use orientation::Orientation;
pub use recorder::{SessionRecorder, SessionRow};
pub use scoring::{Grade, ScoringEngine, ScoringPhase, SessionState, WindowBand};
pub use session::{Session, SessionSnapshot};
pub use smoothness::{AnalysisRequest, DisabledAnalyzer, SmoothnessMetrics, SmoothnessTracker};
pub use telemetry::{decode_telemetry, SensorReading, SensorSlot};
pub use time::{FixedTime, MonotonicTime, TimeSource, Timestamp};
pub use traits::{ReadingSource, SmoothnessAnalyzer};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
