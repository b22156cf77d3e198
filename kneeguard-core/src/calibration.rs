//! Calibration: baseline capture and sensor-to-segment role resolution
//!
//! ## State machine
//!
//! ```text
//!            trigger                settle delay            capture delay
//!   Idle ───────────▶ AwaitingStillness ─────────▶ Capturing ─────────▶ Calibrated
//!     ▲                                                 │
//!     │ reset                                           └──── missing reading /
//!     │                                                       unresolved roles ──▶ Failed
//! ```
//!
//! `trigger` is accepted from every state and drops the previous baseline in the same
//! step, so no reader can ever see a baseline from one pass mixed with another.
//! Baselines are handed out as `Arc<CalibrationBaseline>`: immutable snapshots that stay
//! valid for whoever holds them, even across a recalibration.
//!
//! ## Role resolution
//!
//! Slots are positional and unstable; identity tags are not. Every consumer that needs
//! to know which reading is the thigh goes through [`resolve_roles`].

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;
use crate::errors::{CalibrationFailureReason, KneeGuardError, KneeGuardResult};
use crate::orientation::Orientation;
use crate::telemetry::{SensorReading, SensorSlot};
use crate::time::{delta_secs, Timestamp};
use crate::traits::ReadingSource;

/// Leg segment a sensor is strapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentRole {
    Thigh,
    Shin,
}

impl SegmentRole {
    pub const fn name(self) -> &'static str {
        match self {
            SegmentRole::Thigh => "thigh",
            SegmentRole::Shin => "shin",
        }
    }
}

/// Sensor identity tag to segment role table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleMap(BTreeMap<String, SegmentRole>);

impl Default for RoleMap {
    /// Role names map to themselves; the stock feeder's index-based ids put the
    /// first device on the thigh.
    fn default() -> Self {
        Self::empty()
            .assign("thigh", SegmentRole::Thigh)
            .assign("shin", SegmentRole::Shin)
            .assign(SensorSlot::First.name(), SegmentRole::Thigh)
            .assign(SensorSlot::Second.name(), SegmentRole::Shin)
    }
}

impl RoleMap {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Map `sensor_id` to `role`, replacing any earlier entry for that id
    pub fn assign(mut self, sensor_id: impl Into<String>, role: SegmentRole) -> Self {
        self.0.insert(sensor_id.into(), role);
        self
    }

    pub fn role_of(&self, sensor_id: &str) -> Option<SegmentRole> {
        self.0.get(sensor_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// At least one id maps to each segment
    pub fn covers_both(&self) -> bool {
        let mut roles = self.0.values();
        roles.clone().any(|r| *r == SegmentRole::Thigh) && roles.any(|r| *r == SegmentRole::Shin)
    }
}

/// Reference pose captured at calibration
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBaseline {
    pub thigh_sensor_id: String,
    pub shin_sensor_id: String,
    pub thigh_baseline: Orientation,
    pub shin_baseline: Orientation,
}

impl CalibrationBaseline {
    /// Build a baseline from two readings, assigning roles through `roles`
    pub fn capture(
        a: &SensorReading,
        b: &SensorReading,
        roles: &RoleMap,
    ) -> KneeGuardResult<Self> {
        let failure = |reason| KneeGuardError::CalibrationFailure { reason };

        let role_a = roles
            .role_of(&a.sensor_id)
            .ok_or(failure(CalibrationFailureReason::UnknownSensor))?;
        let role_b = roles
            .role_of(&b.sensor_id)
            .ok_or(failure(CalibrationFailureReason::UnknownSensor))?;

        let (thigh, shin) = match (role_a, role_b) {
            (SegmentRole::Thigh, SegmentRole::Shin) => (a, b),
            (SegmentRole::Shin, SegmentRole::Thigh) => (b, a),
            _ => return Err(failure(CalibrationFailureReason::DuplicateRole)),
        };

        // two slots carrying the same physical sensor can't be told apart later
        if thigh.sensor_id == shin.sensor_id {
            return Err(failure(CalibrationFailureReason::DuplicateRole));
        }

        Ok(Self {
            thigh_sensor_id: thigh.sensor_id.clone(),
            shin_sensor_id: shin.sensor_id.clone(),
            thigh_baseline: thigh.orientation,
            shin_baseline: shin.orientation,
        })
    }
}

/// Two readings sorted into their calibrated segments
#[derive(Debug, Clone, Copy)]
pub struct SegmentPair<'a> {
    pub thigh: &'a SensorReading,
    pub shin: &'a SensorReading,
}

impl<'a> SegmentPair<'a> {
    pub fn get(&self, role: SegmentRole) -> &'a SensorReading {
        match role {
            SegmentRole::Thigh => self.thigh,
            SegmentRole::Shin => self.shin,
        }
    }
}

/// Sort two readings into (thigh, shin) by identity tag against `baseline`
///
/// Slot order is irrelevant: either argument may carry either segment.
pub fn resolve_roles<'a>(
    a: &'a SensorReading,
    b: &'a SensorReading,
    baseline: &CalibrationBaseline,
) -> KneeGuardResult<SegmentPair<'a>> {
    let is_thigh = |r: &SensorReading| r.sensor_id == baseline.thigh_sensor_id;
    let is_shin = |r: &SensorReading| r.sensor_id == baseline.shin_sensor_id;

    if is_thigh(a) && is_shin(b) {
        Ok(SegmentPair { thigh: a, shin: b })
    } else if is_shin(a) && is_thigh(b) {
        Ok(SegmentPair { thigh: b, shin: a })
    } else {
        Err(KneeGuardError::InvalidInput {
            reason: "readings do not match the calibrated sensors",
        })
    }
}

/// Calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "reason")]
pub enum CalibrationPhase {
    Idle,
    AwaitingStillness,
    Capturing,
    Calibrated,
    Failed(CalibrationFailureReason),
}

impl CalibrationPhase {
    pub const fn name(&self) -> &'static str {
        match self {
            CalibrationPhase::Idle => "idle",
            CalibrationPhase::AwaitingStillness => "awaiting stillness",
            CalibrationPhase::Capturing => "capturing",
            CalibrationPhase::Calibrated => "calibrated",
            CalibrationPhase::Failed(_) => "failed",
        }
    }

    /// Still waiting on the settle or capture delay
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, CalibrationPhase::AwaitingStillness | CalibrationPhase::Capturing)
    }
}

/// Drives one calibration pass at a time and owns the resulting baseline
#[derive(Debug)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
    phase: CalibrationPhase,
    phase_started: Timestamp,
    baseline: Option<Arc<CalibrationBaseline>>,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            phase: CalibrationPhase::Idle,
            phase_started: 0,
            baseline: None,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Current baseline, only while `Calibrated`
    pub fn baseline(&self) -> Option<Arc<CalibrationBaseline>> {
        self.baseline.clone()
    }

    pub fn is_calibrated(&self) -> bool {
        self.phase == CalibrationPhase::Calibrated
    }

    /// Start a new pass, invalidating the previous baseline
    pub fn trigger(&mut self, now: Timestamp) {
        self.baseline = None;
        self.enter(CalibrationPhase::AwaitingStillness, now);
        info!("Calibration started: stand straight and face the screen");
    }

    /// Back to `Idle` without a baseline
    pub fn reset(&mut self) {
        self.baseline = None;
        self.phase = CalibrationPhase::Idle;
    }

    /// Advance the delays and capture once the capture delay has passed
    pub fn update<S: ReadingSource + ?Sized>(&mut self, now: Timestamp, source: &S) -> CalibrationPhase {
        let elapsed = delta_secs(self.phase_started, now);

        match self.phase {
            CalibrationPhase::AwaitingStillness if elapsed >= self.config.settle_delay_s => {
                self.enter(CalibrationPhase::Capturing, now);
                info!("Calibration capturing");
            }
            CalibrationPhase::Capturing if elapsed >= self.config.capture_delay_s => {
                let first = source.latest(SensorSlot::First);
                let second = source.latest(SensorSlot::Second);
                self.capture(first.as_deref(), second.as_deref(), now);
            }
            _ => {}
        }

        self.phase
    }

    fn capture(&mut self, first: Option<&SensorReading>, second: Option<&SensorReading>, now: Timestamp) {
        let result = match (first, second) {
            (Some(a), Some(b)) => CalibrationBaseline::capture(a, b, &self.config.roles),
            _ => Err(KneeGuardError::CalibrationFailure {
                reason: CalibrationFailureReason::MissingReading,
            }),
        };

        match result {
            Ok(baseline) => {
                info!(
                    "Calibration complete: thigh={} shin={}",
                    baseline.thigh_sensor_id, baseline.shin_sensor_id
                );
                self.baseline = Some(Arc::new(baseline));
                self.enter(CalibrationPhase::Calibrated, now);
            }
            Err(KneeGuardError::CalibrationFailure { reason }) => {
                warn!("Calibration failed: {}", reason);
                self.enter(CalibrationPhase::Failed(reason), now);
            }
            Err(other) => {
                warn!("Calibration failed: {}", other);
                self.enter(CalibrationPhase::Failed(CalibrationFailureReason::MissingReading), now);
            }
        }
    }

    /// Prompt for the presentation layer
    pub fn status_message(&self) -> &'static str {
        match self.phase {
            CalibrationPhase::Idle => "Please calibrate",
            CalibrationPhase::AwaitingStillness => "Stand straight and face the PC",
            CalibrationPhase::Capturing => "Calibrating...",
            CalibrationPhase::Calibrated => "Calibration complete",
            CalibrationPhase::Failed(_) => "Calibration failed. Please try again.",
        }
    }

    fn enter(&mut self, phase: CalibrationPhase, now: Timestamp) {
        self.phase = phase;
        self.phase_started = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LatestReadingCache;

    fn reading(id: &str) -> SensorReading {
        SensorReading::new(id, Orientation::identity(), 1)
    }

    fn engine() -> CalibrationEngine {
        CalibrationEngine::new(CalibrationConfig::default())
    }

    fn populated_cache(first: &str, second: &str) -> LatestReadingCache {
        let cache = LatestReadingCache::new();
        cache.publish(SensorSlot::First, reading(first));
        cache.publish(SensorSlot::Second, reading(second));
        cache
    }

    #[test]
    fn full_pass_reaches_calibrated() {
        let cache = populated_cache("sensor1", "sensor2");
        let mut engine = engine();

        engine.trigger(0);
        assert_eq!(engine.update(2_999, &cache), CalibrationPhase::AwaitingStillness);
        assert_eq!(engine.update(3_000, &cache), CalibrationPhase::Capturing);
        assert_eq!(engine.update(4_999, &cache), CalibrationPhase::Capturing);
        assert_eq!(engine.update(5_000, &cache), CalibrationPhase::Calibrated);

        let baseline = engine.baseline().unwrap();
        assert_eq!(baseline.thigh_sensor_id, "sensor1");
        assert_eq!(baseline.shin_sensor_id, "sensor2");
    }

    #[test]
    fn roles_follow_tags_not_slots() {
        let cache = populated_cache("shin", "thigh");
        let mut engine = engine();
        engine.trigger(0);
        engine.update(3_000, &cache);
        engine.update(5_000, &cache);

        let baseline = engine.baseline().unwrap();
        assert_eq!(baseline.thigh_sensor_id, "thigh");
        assert_eq!(baseline.shin_sensor_id, "shin");
    }

    #[test]
    fn missing_reading_fails() {
        let cache = LatestReadingCache::new();
        cache.publish(SensorSlot::First, reading("sensor1"));
        let mut engine = engine();
        engine.trigger(0);
        engine.update(3_000, &cache);

        assert_eq!(
            engine.update(5_000, &cache),
            CalibrationPhase::Failed(CalibrationFailureReason::MissingReading)
        );
        assert!(engine.baseline().is_none());
    }

    #[test]
    fn unresolved_roles_fail() {
        let mut engine = engine();

        let cache = populated_cache("thigh", "thigh");
        engine.trigger(0);
        engine.update(3_000, &cache);
        assert_eq!(
            engine.update(5_000, &cache),
            CalibrationPhase::Failed(CalibrationFailureReason::DuplicateRole)
        );

        let cache = populated_cache("thigh", "elbow");
        engine.trigger(10_000);
        engine.update(13_000, &cache);
        assert_eq!(
            engine.update(15_000, &cache),
            CalibrationPhase::Failed(CalibrationFailureReason::UnknownSensor)
        );
    }

    #[test]
    fn retrigger_drops_previous_baseline() {
        let cache = populated_cache("sensor1", "sensor2");
        let mut engine = engine();
        engine.trigger(0);
        engine.update(3_000, &cache);
        engine.update(5_000, &cache);
        let held = engine.baseline().unwrap();

        engine.trigger(6_000);
        assert_eq!(engine.phase(), CalibrationPhase::AwaitingStillness);
        assert!(engine.baseline().is_none());
        // snapshot held by a reader is untouched
        assert_eq!(held.thigh_sensor_id, "sensor1");
    }

    #[test]
    fn resolve_roles_is_order_independent() {
        let baseline = CalibrationBaseline::capture(&reading("thigh"), &reading("shin"), &RoleMap::default()).unwrap();
        let thigh = reading("thigh");
        let shin = reading("shin");

        let forward = resolve_roles(&thigh, &shin, &baseline).unwrap();
        let swapped = resolve_roles(&shin, &thigh, &baseline).unwrap();
        assert_eq!(forward.thigh.sensor_id, swapped.thigh.sensor_id);
        assert_eq!(forward.get(SegmentRole::Shin).sensor_id, "shin");

        let stranger = reading("sensor9");
        assert!(resolve_roles(&thigh, &stranger, &baseline).is_err());
    }

    #[test]
    fn role_map_from_json() {
        let roles: RoleMap = serde_json::from_str(r#"{"D4:22:CD:00:1A":"thigh","D4:22:CD:00:2B":"shin"}"#).unwrap();
        assert_eq!(roles.role_of("D4:22:CD:00:2B"), Some(SegmentRole::Shin));
        assert_eq!(roles.role_of("sensor1"), None);
    }
}
