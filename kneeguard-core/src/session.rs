//! Session: the fixed-rate tick loop and the control/query surface
//!
//! A [`Session`] owns every piece of per-session state and is driven from one thread:
//!
//! ```text
//! tick()
//!   ├─ collect finished smoothness metrics (worker-backed analyzers)
//!   ├─ advance calibration while Calibrating
//!   ├─ if calibrated and both readings present:
//!   │    ├─ resolve roles, compute knee angle, apply AnglePolicy on failure
//!   │    ├─ append smoothness sample, submit full windows  (may stall this tick)
//!   │    └─ record a SessionRow
//!   └─ advance scoring by the measured tick delta
//! ```
//!
//! Tick deltas come from the session clock read at the start of each tick, so a tick
//! stretched by a blocking analysis exchange shows up as a longer delta on the next one
//! instead of being assumed away.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::angle::knee_angle;
use crate::calibration::{resolve_roles, CalibrationEngine, CalibrationPhase};
use crate::config::{AnglePolicy, SessionConfig};
use crate::errors::KneeGuardResult;
use crate::recorder::{SessionRecorder, SessionRow};
use crate::scoring::{Grade, ScoringEngine, ScoringPhase, SessionState, TickOutcome, WindowBand};
use crate::smoothness::{SmoothnessMetrics, SmoothnessStats, SmoothnessTracker};
use crate::time::{delta_secs, ms_to_secs, TimeSource, Timestamp};
use crate::traits::{ReadingSource, SmoothnessAnalyzer};

/// Everything the presentation layer shows, captured at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub calibration: CalibrationPhase,
    pub calibration_status: &'static str,
    /// Knee angle after the fallback policy (degrees)
    pub angle: Option<f64>,
    pub window_band: WindowBand,
    /// Indicator on the gauge, when there is an angle to show
    pub indicator_position: Option<f64>,
    pub countdown_label: Option<String>,
    /// Game time left (seconds)
    pub remaining_time: f64,
    pub difficulty: f64,
    pub metrics: Option<SmoothnessMetrics>,
    pub analysis_enabled: bool,
}

/// Counters kept across the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub ticks: u64,
    /// Ticks where the angle could not be computed while calibrated
    pub angle_failures: u64,
    /// Analysis submissions that failed
    pub analysis_errors: u64,
}

/// One play session
pub struct Session<R: ReadingSource, A: SmoothnessAnalyzer> {
    config: SessionConfig,
    clock: Box<dyn TimeSource>,
    source: R,
    analyzer: A,
    calibration: CalibrationEngine,
    scoring: ScoringEngine,
    smoothness: SmoothnessTracker,
    recorder: SessionRecorder,
    last_tick: Option<Timestamp>,
    angle: Option<f64>,
    last_valid_angle: Option<f64>,
    stats: SessionStats,
    shut_down: bool,
}

impl<R: ReadingSource, A: SmoothnessAnalyzer> Session<R, A> {
    /// Build a session after validating `config`
    pub fn new(config: SessionConfig, source: R, analyzer: A, clock: Box<dyn TimeSource>) -> KneeGuardResult<Self> {
        config.validate()?;
        Ok(Self {
            calibration: CalibrationEngine::new(config.calibration.clone()),
            scoring: ScoringEngine::new(config.game.clone()),
            smoothness: SmoothnessTracker::new(config.analysis.segment),
            recorder: SessionRecorder::new(),
            config,
            clock,
            source,
            analyzer,
            last_tick: None,
            angle: None,
            last_valid_angle: None,
            stats: SessionStats::default(),
            shut_down: false,
        })
    }

    /// Run one tick of the loop
    pub fn tick(&mut self) -> TickOutcome {
        if self.shut_down {
            return TickOutcome::default();
        }

        let now = self.clock.now();
        let dt = self.last_tick.map_or(0.0, |last| delta_secs(last, now));
        self.last_tick = Some(now);
        self.stats.ticks += 1;

        if let Some(metrics) = self.smoothness.collect(&mut self.analyzer) {
            info!("Smoothness: SPARC={:.3} LDLJ={:.3}", metrics.sparc, metrics.ldlj);
        }

        if self.scoring.phase() == ScoringPhase::Calibrating {
            match self.calibration.update(now, &self.source) {
                CalibrationPhase::Calibrated => self.scoring.calibration_finished(true),
                CalibrationPhase::Failed(_) => self.scoring.calibration_finished(false),
                _ => {}
            }
        }

        if self.calibration.is_calibrated() {
            self.track_calibrated(now, dt);
        }

        self.scoring.tick(dt, self.angle)
    }

    fn track_calibrated(&mut self, now: Timestamp, dt: f64) {
        let Some(baseline) = self.calibration.baseline() else {
            return;
        };
        let Some((first, second)) = self.source.latest_pair() else {
            self.angle_unavailable("sensor reading missing");
            return;
        };

        match knee_angle(&first, &second, &baseline) {
            Ok(angle) => {
                self.angle = Some(angle);
                self.last_valid_angle = Some(angle);
                debug!("Knee angle {:.1}", angle);
            }
            Err(err) => {
                debug!("Knee angle unavailable: {}", err);
                self.angle_unavailable("angle computation failed");
            }
        }

        let Ok(pair) = resolve_roles(&first, &second, &baseline) else {
            return;
        };

        let tracked = pair.get(self.smoothness.segment()).orientation;
        let before = self.clock.now();
        let submitted = self.smoothness.record_and_submit(tracked, now, dt, &mut self.analyzer);
        let stall_ms = self.clock.now().saturating_sub(before);
        if stall_ms > 0 {
            debug!("Analysis exchange held the tick for {} ms", stall_ms);
        }
        if let Err(err) = submitted {
            self.stats.analysis_errors += 1;
            warn!("Smoothness window dropped: {}", err);
        }

        self.recorder.record(SessionRow {
            timestamp: ms_to_secs(now),
            thigh: pair.thigh.orientation,
            shin: pair.shin.orientation,
            metrics: self.smoothness.metrics(),
            knee_angle: self.angle,
        });
    }

    fn angle_unavailable(&mut self, reason: &str) {
        self.stats.angle_failures += 1;
        self.angle = match self.config.angle_policy {
            AnglePolicy::HoldLast => self.last_valid_angle,
            AnglePolicy::Skip => None,
        };
        if self.stats.angle_failures == 1 {
            warn!("Knee angle unavailable ({}), applying {:?}", reason, self.config.angle_policy);
        }
    }

    /// Start (or restart) calibration; rejected during a game
    pub fn trigger_calibration(&mut self) -> KneeGuardResult<()> {
        self.scoring.begin_calibration()?;
        self.calibration.trigger(self.clock.now());
        self.smoothness.discard_window();
        self.angle = None;
        self.last_valid_angle = None;
        Ok(())
    }

    /// Begin the countdown
    pub fn start_session(&mut self) -> KneeGuardResult<()> {
        self.scoring.start()
    }

    /// End the game, or abandon an in-progress calibration
    pub fn stop_session(&mut self) -> KneeGuardResult<()> {
        let abandoning_calibration = self.scoring.phase() == ScoringPhase::Calibrating;
        self.scoring.stop()?;
        if abandoning_calibration {
            self.calibration.reset();
        }
        Ok(())
    }

    /// Discard all session state and return to `Uncalibrated`
    pub fn restart_session(&mut self) {
        self.scoring.restart();
        self.calibration.reset();
        self.smoothness.reset();
        self.recorder.clear();
        self.angle = None;
        self.last_valid_angle = None;
        self.stats = SessionStats::default();
        info!("Session restarted");
    }

    pub fn set_difficulty(&mut self, difficulty: f64) -> KneeGuardResult<()> {
        self.scoring.set_difficulty(difficulty)
    }

    /// Write the recorded rows to a timestamped CSV in `dir`
    pub fn export_session(&self, dir: impl AsRef<Path>) -> KneeGuardResult<PathBuf> {
        self.recorder.export_csv(dir)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.scoring.state(),
            calibration: self.calibration.phase(),
            calibration_status: self.calibration.status_message(),
            angle: self.angle,
            window_band: self.scoring.window_band(),
            indicator_position: self.angle.map(|a| self.scoring.indicator_position(a)),
            countdown_label: self.scoring.countdown_label(),
            remaining_time: self.scoring.remaining_time(),
            difficulty: self.scoring.difficulty(),
            metrics: self.smoothness.metrics(),
            analysis_enabled: self.analyzer.is_enabled(),
        }
    }

    /// Leave no phase half-finished and abandon in-flight analysis
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        match self.scoring.phase() {
            ScoringPhase::Calibrating | ScoringPhase::Countdown | ScoringPhase::Running => {
                if let Err(err) = self.stop_session() {
                    warn!("Stop on shutdown failed: {}", err);
                }
            }
            _ => {}
        }
        self.analyzer.shutdown();
        self.shut_down = true;
        info!("Session shut down in phase {}", self.scoring.phase().name());
    }

    pub fn phase(&self) -> ScoringPhase {
        self.scoring.phase()
    }

    pub fn current_angle(&self) -> Option<f64> {
        self.angle
    }

    pub fn current_points(&self) -> u32 {
        self.scoring.total_points()
    }

    pub fn current_grade(&self) -> Option<Grade> {
        self.scoring.grade()
    }

    pub fn current_window_band(&self) -> WindowBand {
        self.scoring.window_band()
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.calibration.phase()
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn smoothness_stats(&self) -> SmoothnessStats {
        self.smoothness.stats()
    }

    pub fn pending_smoothness_samples(&self) -> usize {
        self.smoothness.pending_samples()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }
}

impl<R: ReadingSource, A: SmoothnessAnalyzer> Drop for Session<R, A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LatestReadingCache;
    use crate::orientation::Orientation;
    use crate::smoothness::DisabledAnalyzer;
    use crate::telemetry::{SensorReading, SensorSlot};
    use crate::time::FixedTime;
    use std::sync::Arc;

    type TestSession = Session<Arc<LatestReadingCache>, DisabledAnalyzer>;

    fn setup(policy: AnglePolicy) -> (TestSession, Arc<LatestReadingCache>, FixedTime) {
        let cache = Arc::new(LatestReadingCache::new());
        let clock = FixedTime::new(0);
        let config = SessionConfig::default().with_angle_policy(policy);
        let session = Session::new(config, Arc::clone(&cache), DisabledAnalyzer, Box::new(clock.clone())).unwrap();
        (session, cache, clock)
    }

    fn publish(cache: &LatestReadingCache, thigh: Orientation, shin: Orientation) {
        cache.publish(SensorSlot::First, SensorReading::new("thigh", thigh, 0));
        cache.publish(SensorSlot::Second, SensorReading::new("shin", shin, 0));
    }

    fn calibrate(session: &mut TestSession, clock: &FixedTime) {
        session.trigger_calibration().unwrap();
        for _ in 0..6 {
            clock.advance(1000);
            session.tick();
        }
        assert_eq!(session.phase(), ScoringPhase::ReadyToStart);
    }

    #[test]
    fn calibrates_then_reports_angle() {
        let (mut session, cache, clock) = setup(AnglePolicy::HoldLast);
        publish(&cache, Orientation::identity(), Orientation::identity());
        calibrate(&mut session, &clock);
        assert_eq!(session.snapshot().calibration_status, "Calibration complete");

        let bent = Orientation::from_axis_angle([1.0, 0.0, 0.0], 90.0).unwrap();
        publish(&cache, Orientation::identity(), bent);
        clock.advance(16);
        session.tick();
        assert!((session.current_angle().unwrap() - 90.0).abs() < 1e-6);
        assert!(!session.recorder().is_empty());
    }

    #[test]
    fn missing_readings_fail_calibration() {
        let (mut session, _cache, clock) = setup(AnglePolicy::HoldLast);
        session.trigger_calibration().unwrap();
        for _ in 0..6 {
            clock.advance(1000);
            session.tick();
        }
        assert_eq!(session.phase(), ScoringPhase::Uncalibrated);
        assert!(matches!(session.calibration_phase(), CalibrationPhase::Failed(_)));
    }

    #[test]
    fn angle_policy_decides_fallback() {
        for (policy, expected) in [(AnglePolicy::HoldLast, Some(180.0)), (AnglePolicy::Skip, None)] {
            let (mut session, cache, clock) = setup(policy);
            publish(&cache, Orientation::identity(), Orientation::identity());
            calibrate(&mut session, &clock);
            clock.advance(16);
            session.tick();

            // shin sensor swapped for an unknown device
            cache.publish(SensorSlot::Second, SensorReading::new("stranger", Orientation::identity(), 1));
            clock.advance(16);
            session.tick();

            assert_eq!(session.current_angle().map(|a| a.round()), expected);
            assert!(session.stats().angle_failures >= 1);
        }
    }

    #[test]
    fn shutdown_leaves_a_settled_phase() {
        let (mut session, cache, clock) = setup(AnglePolicy::HoldLast);
        publish(&cache, Orientation::identity(), Orientation::identity());
        calibrate(&mut session, &clock);
        session.start_session().unwrap();
        clock.advance(16);
        session.tick();
        assert_eq!(session.phase(), ScoringPhase::Countdown);

        session.shutdown();
        assert_eq!(session.phase(), ScoringPhase::Ended);
        clock.advance(5000);
        assert_eq!(session.tick(), TickOutcome::default());

        let (mut calibrating, _cache, _clock) = setup(AnglePolicy::HoldLast);
        calibrating.trigger_calibration().unwrap();
        calibrating.shutdown();
        assert_eq!(calibrating.phase(), ScoringPhase::Uncalibrated);
        assert_eq!(calibrating.calibration_phase(), CalibrationPhase::Idle);
    }

    #[test]
    fn restart_discards_everything() {
        let (mut session, cache, clock) = setup(AnglePolicy::HoldLast);
        publish(&cache, Orientation::identity(), Orientation::identity());
        calibrate(&mut session, &clock);
        session.start_session().unwrap();
        session.stop_session().unwrap();
        assert_eq!(session.current_grade(), Some(Grade::F));

        session.restart_session();
        assert_eq!(session.phase(), ScoringPhase::Uncalibrated);
        assert_eq!(session.calibration_phase(), CalibrationPhase::Idle);
        assert!(session.recorder().is_empty());
        assert_eq!(session.current_grade(), None);
        assert_eq!(session.current_angle(), None);
    }
}
