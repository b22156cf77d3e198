//! Time management for the tick loop
//!
//! Scoring, countdowns and smoothness deltas all run off one clock abstraction:
//! - Monotonic clock (production, immune to wall-clock adjustments)
//! - Fixed clock (tests and replays, advanced by hand)

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Timestamp in milliseconds since the clock's origin
pub type Timestamp = u64;

/// Source of time for the session
pub trait TimeSource: Send {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;
}

/// Monotonic time source backed by `Instant`
///
/// Starts at 0 when created, never goes backwards
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// Fixed time source for testing
///
/// Clones share the same underlying instant, so a test can keep a handle and
/// advance the clock a session owns.
#[derive(Debug, Clone, Default)]
pub struct FixedTime {
    timestamp: Arc<Mutex<Timestamp>>,
}

impl FixedTime {
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp: Arc::new(Mutex::new(timestamp)) }
    }

    pub fn set(&self, timestamp: Timestamp) {
        *self.timestamp.lock().unwrap_or_else(PoisonError::into_inner) = timestamp;
    }

    pub fn advance(&self, ms: u64) {
        *self.timestamp.lock().unwrap_or_else(PoisonError::into_inner) += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        *self.timestamp.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// Convert a millisecond delta to seconds
pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Elapsed seconds between two timestamps, zero if the clock went backwards
pub fn delta_secs(earlier: Timestamp, later: Timestamp) -> f64 {
    ms_to_secs(later.saturating_sub(earlier))
}
