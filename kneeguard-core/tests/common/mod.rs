//! Shared fixtures for the core integration suites
//!
//! - Leg pose generators that produce thigh/shin orientations for a target flexion
//! - A scripted analyzer standing in for the smoothness service
//! - A session builder wired to a `FixedTime` clock

#![allow(dead_code)]

use std::sync::Arc;

use kneeguard_core::{
    AnalysisRequest, FixedTime, KneeGuardError, KneeGuardResult, LatestReadingCache, Orientation, SensorReading,
    SensorSlot, Session, SessionConfig, SmoothnessAnalyzer, SmoothnessMetrics,
};

/// 60 Hz feeder period (milliseconds, rounded down the way the tick clock sees it)
pub const FEED_PERIOD_MS: u64 = 16;

/// Pose of the leg with the shin flexed `flexion_deg` away from straight about x
pub fn leg_pose(flexion_deg: f64) -> (Orientation, Orientation) {
    let thigh = Orientation::identity();
    let shin = Orientation::from_axis_angle([1.0, 0.0, 0.0], 180.0 - flexion_deg).unwrap();
    (thigh, shin)
}

/// Publish a thigh/shin pair, optionally in swapped slots
pub fn publish_pose(cache: &LatestReadingCache, thigh: Orientation, shin: Orientation, swapped: bool, seq: u64) {
    let (first, second) = if swapped {
        (SensorReading::new("shin", shin, seq), SensorReading::new("thigh", thigh, seq))
    } else {
        (SensorReading::new("thigh", thigh, seq), SensorReading::new("shin", shin, seq))
    };
    cache.publish(SensorSlot::First, first);
    cache.publish(SensorSlot::Second, second);
}

/// Analyzer that answers each window with fixed metrics, or fails every exchange
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    pub reply: Result<SmoothnessMetrics, KneeGuardError>,
    pub requests: Vec<AnalysisRequest>,
    pending: Option<SmoothnessMetrics>,
    enabled: bool,
}

impl ScriptedAnalyzer {
    pub fn answering(sparc: f64, ldlj: f64) -> Self {
        Self { reply: Ok(SmoothnessMetrics { sparc, ldlj }), requests: Vec::new(), pending: None, enabled: true }
    }

    pub fn failing(err: KneeGuardError) -> Self {
        Self { reply: Err(err), requests: Vec::new(), pending: None, enabled: true }
    }
}

impl SmoothnessAnalyzer for ScriptedAnalyzer {
    fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()> {
        self.requests.push(request);
        match &self.reply {
            Ok(metrics) => {
                self.pending = Some(*metrics);
                Ok(())
            }
            Err(err) => {
                if err.is_transport() {
                    self.enabled = false;
                }
                Err(err.clone())
            }
        }
    }

    fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
        self.pending.take()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub type TestSession = Session<Arc<LatestReadingCache>, ScriptedAnalyzer>;

/// Session on a fixed clock at t=0, plus handles to its cache and clock
pub fn session_with(analyzer: ScriptedAnalyzer, config: SessionConfig) -> (TestSession, Arc<LatestReadingCache>, FixedTime) {
    let cache = Arc::new(LatestReadingCache::new());
    let clock = FixedTime::new(0);
    let session = Session::new(config, Arc::clone(&cache), analyzer, Box::new(clock.clone())).unwrap();
    (session, cache, clock)
}

/// Advance the clock one feeder period and tick
pub fn step(session: &mut TestSession, clock: &FixedTime) {
    clock.advance(FEED_PERIOD_MS);
    session.tick();
}

/// Run calibration to completion with the leg held straight
pub fn calibrate_straight(session: &mut TestSession, cache: &LatestReadingCache, clock: &FixedTime) {
    let (thigh, shin) = leg_pose(180.0);
    publish_pose(cache, thigh, shin, false, 0);
    session.trigger_calibration().unwrap();
    while session.calibration_phase().is_in_progress() {
        step(session, clock);
    }
}
