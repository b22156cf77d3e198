//! Assessment game state machine
//!
//! ## Phases
//!
//! ```text
//!                begin_calibration         calibration_finished(ok)        start
//! Uncalibrated ───────────────────▶ Calibrating ──────────────────▶ ReadyToStart ──────▶ Countdown
//!      ▲                                 │ failed / stop                                     │ 3-2-1-GO
//!      │ restart (from any phase)        ▼                                                   ▼
//!      └──────────────────────────── Uncalibrated                 Ended ◀──── timer / stop ── Running
//! ```
//!
//! ## Target window
//!
//! Angles map linearly onto a gauge of `gauge_height` screen units centred on 0. The
//! band is `lerp(window_max_height, window_min_height, difficulty)` units tall and its
//! centre sweeps the gauge once every `1 / movement_speed` seconds of running time,
//! starting at the deepest end. The centre stops half a band short of either end so
//! the whole band stays on the gauge:
//!
//! ```text
//! p(t)      = (sin(2π·speed·t − π/2) + 1) / 2
//! max_y     = (gauge_height − height) / 2
//! centre(t) = lerp(−max_y, max_y, p(t))
//! ```
//!
//! ## Scoring
//!
//! Every tick while running is scored in [0, 1] (1 inside the band, falling off linearly
//! over half a band height outside it). At each assessment boundary the time-weighted
//! mean of those scores times `points_per_assessment`, rounded, is added to the total.
//! Ticks that straddle a boundary are split across it.

use core::f64::consts::PI;
use core::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::constants::game::GRADE_BREAKPOINTS;
use crate::errors::{KneeGuardError, KneeGuardResult};

/// Slack when comparing accumulated tick time against interval and game boundaries
const BOUNDARY_TOLERANCE_S: f64 = 1e-9;

/// Session phase; the only source of truth for which subsystems are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPhase {
    Uncalibrated,
    Calibrating,
    ReadyToStart,
    Countdown,
    Running,
    Ended,
}

impl ScoringPhase {
    pub const fn name(self) -> &'static str {
        match self {
            ScoringPhase::Uncalibrated => "uncalibrated",
            ScoringPhase::Calibrating => "calibrating",
            ScoringPhase::ReadyToStart => "ready to start",
            ScoringPhase::Countdown => "counting down",
            ScoringPhase::Running => "running",
            ScoringPhase::Ended => "ended",
        }
    }
}

/// Letter grade from the share of the maximum total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Grade for `total / max`; breakpoints are inclusive lower bounds
    pub fn from_ratio(ratio: f64) -> Self {
        GRADE_BREAKPOINTS
            .iter()
            .find(|(threshold, _)| ratio >= *threshold)
            .map_or(Grade::F, |&(_, grade)| grade)
    }

    pub const fn letter(self) -> char {
        match self {
            Grade::A => 'A',
            Grade::B => 'B',
            Grade::C => 'C',
            Grade::D => 'D',
            Grade::F => 'F',
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Target band for one instant, in both angle and gauge coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBand {
    /// Angle that puts the indicator on the band centre (degrees)
    pub center_deg: f64,
    /// Band centre on the gauge (screen units)
    pub center: f64,
    /// Band height (screen units)
    pub height: f64,
}

impl WindowBand {
    pub fn bottom(&self) -> f64 {
        self.center - self.height / 2.0
    }

    pub fn top(&self) -> f64 {
        self.center + self.height / 2.0
    }
}

/// One completed assessment interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// 1-based interval number
    pub index: u32,
    /// Time-weighted share of the interval spent in the band
    pub percentage: f64,
    pub points: u32,
}

/// What a tick changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub assessments: Vec<Assessment>,
    /// Countdown finished on this tick
    pub started: bool,
    /// Game timer expired on this tick
    pub ended: bool,
}

/// Read-only view of the scoring state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: ScoringPhase,
    /// Running time so far (seconds)
    pub elapsed_time: f64,
    pub total_points: u32,
    pub current_grade: Option<Grade>,
}

#[derive(Debug, Clone, Copy, Default)]
struct IntervalAccumulator {
    weighted_score: f64,
    covered: f64,
}

impl IntervalAccumulator {
    fn add(&mut self, score: f64, dt: f64) {
        self.weighted_score += score * dt;
        self.covered += dt;
    }

    fn percentage(&self) -> f64 {
        if self.covered > 0.0 {
            (self.weighted_score / self.covered).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Deterministic scoring engine driven by explicit time deltas
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: GameConfig,
    phase: ScoringPhase,
    difficulty: f64,
    countdown_elapsed: f64,
    running_elapsed: f64,
    interval_elapsed: f64,
    interval: IntervalAccumulator,
    assessments: Vec<Assessment>,
    total_points: u32,
    grade: Option<Grade>,
}

impl ScoringEngine {
    pub fn new(config: GameConfig) -> Self {
        let difficulty = config.difficulty.clamp(0.0, 1.0);
        Self {
            config,
            phase: ScoringPhase::Uncalibrated,
            difficulty,
            countdown_elapsed: 0.0,
            running_elapsed: 0.0,
            interval_elapsed: 0.0,
            interval: IntervalAccumulator::default(),
            assessments: Vec::new(),
            total_points: 0,
            grade: None,
        }
    }

    pub fn phase(&self) -> ScoringPhase {
        self.phase
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }

    /// Final grade, only once the session has ended
    pub fn grade(&self) -> Option<Grade> {
        self.grade
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            phase: self.phase,
            elapsed_time: self.running_elapsed,
            total_points: self.total_points,
            current_grade: self.grade,
        }
    }

    /// Enter `Calibrating`; rejected while a game is counting down or running
    pub fn begin_calibration(&mut self) -> KneeGuardResult<()> {
        match self.phase {
            ScoringPhase::Countdown | ScoringPhase::Running => Err(self.invalid("calibrate")),
            ScoringPhase::Ended => {
                self.clear_score();
                self.transition(ScoringPhase::Calibrating);
                Ok(())
            }
            _ => {
                self.transition(ScoringPhase::Calibrating);
                Ok(())
            }
        }
    }

    /// Leave `Calibrating` for `ReadyToStart` or back to `Uncalibrated`
    pub fn calibration_finished(&mut self, success: bool) {
        if self.phase != ScoringPhase::Calibrating {
            return;
        }
        if success {
            self.transition(ScoringPhase::ReadyToStart);
        } else {
            self.transition(ScoringPhase::Uncalibrated);
        }
    }

    /// Begin the countdown; only from `ReadyToStart`
    pub fn start(&mut self) -> KneeGuardResult<()> {
        if self.phase != ScoringPhase::ReadyToStart {
            return Err(self.invalid("start"));
        }
        self.countdown_elapsed = 0.0;
        self.transition(ScoringPhase::Countdown);
        Ok(())
    }

    /// Advance by `dt` seconds with the current knee angle, if any
    pub fn tick(&mut self, dt: f64, angle_deg: Option<f64>) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !(dt.is_finite() && dt > 0.0) {
            return outcome;
        }

        match self.phase {
            ScoringPhase::Countdown => {
                self.countdown_elapsed += dt;
                let overshoot = self.countdown_elapsed - self.config.countdown_s();
                if overshoot >= 0.0 {
                    self.running_elapsed = 0.0;
                    self.interval_elapsed = 0.0;
                    self.interval = IntervalAccumulator::default();
                    self.transition(ScoringPhase::Running);
                    outcome.started = true;
                    // The part of the tick past "GO!" is running time
                    if overshoot > BOUNDARY_TOLERANCE_S {
                        self.advance_running(overshoot, angle_deg, &mut outcome);
                    }
                }
            }
            ScoringPhase::Running => self.advance_running(dt, angle_deg, &mut outcome),
            _ => {}
        }

        outcome
    }

    fn advance_running(&mut self, dt: f64, angle_deg: Option<f64>, outcome: &mut TickOutcome) {
        let remaining_game = (self.config.duration_s - self.running_elapsed).max(0.0);
        let mut left = dt.min(remaining_game);

        // Score against the band at the end of the tick
        let score = angle_deg.map_or(0.0, |angle| {
            let band = self.window_band_at(self.running_elapsed + left);
            Self::percentage_in_window(self.indicator_position(angle), &band)
        });

        while left > 0.0 {
            let step = left.min(self.config.assessment_interval_s - self.interval_elapsed);
            self.interval.add(score, step);
            self.interval_elapsed += step;
            self.running_elapsed += step;
            left -= step;

            if self.interval_elapsed >= self.config.assessment_interval_s - BOUNDARY_TOLERANCE_S {
                outcome.assessments.push(self.close_interval());
            }
        }

        if self.running_elapsed >= self.config.duration_s - BOUNDARY_TOLERANCE_S {
            if self.interval.covered > BOUNDARY_TOLERANCE_S {
                outcome.assessments.push(self.close_interval());
            }
            self.running_elapsed = self.config.duration_s;
            self.finish();
            outcome.ended = true;
        }
    }

    fn close_interval(&mut self) -> Assessment {
        let percentage = self.interval.percentage();
        let points = (f64::from(self.config.points_per_assessment) * percentage).round() as u32;
        self.total_points += points;

        let assessment = Assessment {
            index: self.assessments.len() as u32 + 1,
            percentage,
            points,
        };
        debug!(
            "Assessment {}: {:.1}% in window, +{} points (total {})",
            assessment.index,
            percentage * 100.0,
            points,
            self.total_points
        );
        self.assessments.push(assessment);
        self.interval = IntervalAccumulator::default();
        self.interval_elapsed = 0.0;
        assessment
    }

    /// End the game early; from `Calibrating` this abandons the calibration
    pub fn stop(&mut self) -> KneeGuardResult<()> {
        match self.phase {
            ScoringPhase::Countdown | ScoringPhase::Running => {
                self.finish();
                Ok(())
            }
            ScoringPhase::Calibrating => {
                self.transition(ScoringPhase::Uncalibrated);
                Ok(())
            }
            _ => Err(self.invalid("stop")),
        }
    }

    /// Discard the session and return to `Uncalibrated`
    pub fn restart(&mut self) {
        self.clear_score();
        self.transition(ScoringPhase::Uncalibrated);
    }

    /// Set difficulty in [0, 1]; takes effect on the next tick
    pub fn set_difficulty(&mut self, difficulty: f64) -> KneeGuardResult<()> {
        if !(difficulty.is_finite() && (0.0..=1.0).contains(&difficulty)) {
            return Err(KneeGuardError::InvalidInput { reason: "difficulty must be within 0..1" });
        }
        self.difficulty = difficulty;
        Ok(())
    }

    /// Band for the current running time
    pub fn window_band(&self) -> WindowBand {
        self.window_band_at(self.running_elapsed)
    }

    /// Band at running time `t` seconds
    pub fn window_band_at(&self, t: f64) -> WindowBand {
        let phase = ((2.0 * PI * self.config.movement_speed * t - PI / 2.0).sin() + 1.0) / 2.0;
        let height = lerp(self.config.window_max_height, self.config.window_min_height, self.difficulty);
        let max_y = ((self.config.gauge_height - height) / 2.0).max(0.0);
        let center = lerp(-max_y, max_y, phase);
        WindowBand { center_deg: self.angle_at(center), center, height }
    }

    /// Angle mapped onto the gauge, clamped to its ends
    pub fn indicator_position(&self, angle_deg: f64) -> f64 {
        let span = self.config.max_angle_deg - self.config.min_angle_deg;
        let normalized = ((angle_deg - self.config.min_angle_deg) / span).clamp(0.0, 1.0);
        normalized * self.config.gauge_height - self.config.gauge_height / 2.0
    }

    /// Inverse of `indicator_position` inside the gauge
    fn angle_at(&self, position: f64) -> f64 {
        let normalized = (position + self.config.gauge_height / 2.0) / self.config.gauge_height;
        lerp(self.config.min_angle_deg, self.config.max_angle_deg, normalized)
    }

    /// 1 inside the band, linear falloff to 0 over half a band height outside it
    pub fn percentage_in_window(indicator: f64, band: &WindowBand) -> f64 {
        if indicator >= band.bottom() && indicator <= band.top() {
            return 1.0;
        }
        let distance = (indicator - band.bottom()).abs().min((indicator - band.top()).abs());
        let half = band.height / 2.0;
        if half <= 0.0 {
            return 0.0;
        }
        (1.0 - distance / half).clamp(0.0, 1.0)
    }

    /// "3", "2", "1", then "GO!" while counting down
    pub fn countdown_label(&self) -> Option<String> {
        if self.phase != ScoringPhase::Countdown {
            return None;
        }
        let step = (self.countdown_elapsed / self.config.countdown_step_s).floor() as u32;
        if step < self.config.countdown_steps {
            Some((self.config.countdown_steps - step).to_string())
        } else {
            Some("GO!".to_string())
        }
    }

    /// Game time left (seconds)
    pub fn remaining_time(&self) -> f64 {
        match self.phase {
            ScoringPhase::Ended => 0.0,
            _ => (self.config.duration_s - self.running_elapsed).max(0.0),
        }
    }

    fn finish(&mut self) {
        let ratio = f64::from(self.total_points) / f64::from(self.config.max_points);
        let grade = Grade::from_ratio(ratio);
        self.grade = Some(grade);
        self.transition(ScoringPhase::Ended);
        info!("Game over: {} points, grade {}", self.total_points, grade);
    }

    fn clear_score(&mut self) {
        self.countdown_elapsed = 0.0;
        self.running_elapsed = 0.0;
        self.interval_elapsed = 0.0;
        self.interval = IntervalAccumulator::default();
        self.assessments.clear();
        self.total_points = 0;
        self.grade = None;
    }

    fn transition(&mut self, next: ScoringPhase) {
        if self.phase != next {
            info!("Phase {} -> {}", self.phase.name(), next.name());
        }
        self.phase = next;
    }

    fn invalid(&self, action: &'static str) -> KneeGuardError {
        KneeGuardError::InvalidTransition { action, phase: self.phase.name() }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
