//! Session configuration
//!
//! Every field defaults to the constant of the same meaning in [`crate::constants`], so an
//! empty document (`{}`) is a complete configuration. Builders follow the usual
//! `Config::default().with_x(..)` chain; [`SessionConfig::validate`] runs once before a
//! session is built.
//!
//! ```json
//! {
//!   "game":        { "difficulty": 0.7, "duration_s": 45.0 },
//!   "calibration": { "roles": { "left_thigh": "thigh", "left_shin": "shin" } },
//!   "telemetry":   { "endpoint": "tcp://0.0.0.0:5555" },
//!   "analysis":    { "addr": "10.0.0.2:5556", "framing": "unframed", "mode": "worker" },
//!   "angle_policy": "skip"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{RoleMap, SegmentRole};
use crate::constants::calibration::{CAPTURE_DELAY_S, SETTLE_DELAY_S};
use crate::constants::game::*;
use crate::constants::network::*;
use crate::errors::{KneeGuardError, KneeGuardResult};
use crate::framing::Framing;

/// What the session shows when the angle cannot be computed for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnglePolicy {
    /// Keep reporting the last valid angle
    #[default]
    HoldLast,
    /// Report no angle; scoring treats the indicator as absent for the tick
    Skip,
}

/// How the tick loop talks to the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Exchange inline on the tick that completes the window
    #[default]
    Blocking,
    /// Hand the window to a dedicated thread and pick up the result later
    Worker,
}

/// Assessment game parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub duration_s: f64,
    pub assessment_interval_s: f64,
    pub points_per_assessment: u32,
    pub max_points: u32,
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
    /// Window oscillation frequency (cycles per second)
    pub movement_speed: f64,
    pub window_max_height: f64,
    pub window_min_height: f64,
    pub gauge_height: f64,
    /// Initial difficulty in [0, 1]
    pub difficulty: f64,
    pub countdown_steps: u32,
    pub countdown_step_s: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            duration_s: GAME_DURATION_S,
            assessment_interval_s: ASSESSMENT_INTERVAL_S,
            points_per_assessment: POINTS_PER_ASSESSMENT,
            max_points: MAX_POINTS,
            min_angle_deg: MIN_KNEE_ANGLE_DEG,
            max_angle_deg: MAX_KNEE_ANGLE_DEG,
            movement_speed: WINDOW_MOVEMENT_SPEED,
            window_max_height: WINDOW_MAX_HEIGHT,
            window_min_height: WINDOW_MIN_HEIGHT,
            gauge_height: GAUGE_HEIGHT,
            difficulty: DEFAULT_DIFFICULTY,
            countdown_steps: COUNTDOWN_STEPS,
            countdown_step_s: COUNTDOWN_STEP_S,
        }
    }
}

impl GameConfig {
    pub fn with_duration_s(mut self, seconds: f64) -> Self {
        self.duration_s = seconds;
        self
    }

    pub fn with_difficulty(mut self, difficulty: f64) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_angle_range(mut self, min_deg: f64, max_deg: f64) -> Self {
        self.min_angle_deg = min_deg;
        self.max_angle_deg = max_deg;
        self
    }

    /// Total countdown length including the "GO!" step (seconds)
    pub fn countdown_s(&self) -> f64 {
        f64::from(self.countdown_steps + 1) * self.countdown_step_s
    }

    fn validate(&self) -> KneeGuardResult<()> {
        let positive = [
            ("game.duration_s", self.duration_s),
            ("game.assessment_interval_s", self.assessment_interval_s),
            ("game.movement_speed", self.movement_speed),
            ("game.window_min_height", self.window_min_height),
            ("game.gauge_height", self.gauge_height),
            ("game.countdown_step_s", self.countdown_step_s),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(KneeGuardError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.window_max_height < self.window_min_height {
            return Err(KneeGuardError::Config("game.window_max_height is below window_min_height".into()));
        }
        if !(0.0..=STRAIGHT_LEG_DEG).contains(&self.min_angle_deg)
            || !(0.0..=STRAIGHT_LEG_DEG).contains(&self.max_angle_deg)
            || self.min_angle_deg >= self.max_angle_deg
        {
            return Err(KneeGuardError::Config(format!(
                "game angle range {}..{} must be increasing within 0..180",
                self.min_angle_deg, self.max_angle_deg
            )));
        }
        if !(0.0..=1.0).contains(&self.difficulty) {
            return Err(KneeGuardError::Config(format!("game.difficulty {} outside 0..1", self.difficulty)));
        }
        if self.max_points == 0 {
            return Err(KneeGuardError::Config("game.max_points must be non-zero".into()));
        }
        Ok(())
    }
}

/// Calibration delays and the sensor-id to segment table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub settle_delay_s: f64,
    pub capture_delay_s: f64,
    pub roles: RoleMap,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            settle_delay_s: SETTLE_DELAY_S,
            capture_delay_s: CAPTURE_DELAY_S,
            roles: RoleMap::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn with_delays(mut self, settle_s: f64, capture_s: f64) -> Self {
        self.settle_delay_s = settle_s;
        self.capture_delay_s = capture_s;
        self
    }

    pub fn with_roles(mut self, roles: RoleMap) -> Self {
        self.roles = roles;
        self
    }

    fn validate(&self) -> KneeGuardResult<()> {
        for (name, value) in [("settle_delay_s", self.settle_delay_s), ("capture_delay_s", self.capture_delay_s)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(KneeGuardError::Config(format!("calibration.{name} must be non-negative")));
            }
        }
        if !self.roles.covers_both() {
            return Err(KneeGuardError::Config("calibration.roles must name a thigh and a shin sensor".into()));
        }
        Ok(())
    }
}

/// Inbound telemetry socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub endpoint: String,
    /// Receive timeout between stop-flag checks (milliseconds)
    pub poll_interval_ms: u64,
    /// Bound on waiting for the receive loop on stop (milliseconds)
    pub join_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TELEMETRY_ENDPOINT.to_string(),
            poll_interval_ms: TELEMETRY_POLL_INTERVAL_MS,
            join_timeout_ms: TELEMETRY_JOIN_TIMEOUT_MS,
        }
    }
}

impl TelemetryConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Smoothness-analysis link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// `false` runs without smoothness metrics
    pub enabled: bool,
    pub addr: String,
    pub framing: Framing,
    pub mode: AnalysisMode,
    pub connect_timeout_ms: u64,
    /// Read and write timeout bounding one exchange (milliseconds)
    pub io_timeout_ms: u64,
    /// Segment whose orientation is windowed
    pub segment: SegmentRole,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: DEFAULT_ANALYSIS_ADDR.to_string(),
            framing: Framing::default(),
            mode: AnalysisMode::default(),
            connect_timeout_ms: ANALYSIS_CONNECT_TIMEOUT_MS,
            io_timeout_ms: ANALYSIS_IO_TIMEOUT_MS,
            segment: SegmentRole::Thigh,
        }
    }
}

impl AnalysisConfig {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_io_timeout_ms(mut self, ms: u64) -> Self {
        self.io_timeout_ms = ms;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Largest response document accepted for the configured framing
    pub fn response_limit(&self) -> usize {
        match self.framing {
            Framing::LengthPrefixed => MAX_FRAME_BYTES,
            Framing::Unframed => UNFRAMED_RESPONSE_BUFFER,
        }
    }

    fn validate(&self) -> KneeGuardResult<()> {
        if self.enabled && self.addr.trim().is_empty() {
            return Err(KneeGuardError::Config("analysis.addr is empty".into()));
        }
        if self.io_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(KneeGuardError::Config("analysis timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Everything a session needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub game: GameConfig,
    pub calibration: CalibrationConfig,
    pub telemetry: TelemetryConfig,
    pub analysis: AnalysisConfig,
    pub angle_policy: AnglePolicy,
    /// Foreground tick period (milliseconds)
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            calibration: CalibrationConfig::default(),
            telemetry: TelemetryConfig::default(),
            analysis: AnalysisConfig::default(),
            angle_policy: AnglePolicy::default(),
            tick_interval_ms: TICK_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    pub fn with_game(mut self, game: GameConfig) -> Self {
        self.game = game;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_angle_policy(mut self, policy: AnglePolicy) -> Self {
        self.angle_policy = policy;
        self
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> KneeGuardResult<()> {
        self.game.validate()?;
        self.calibration.validate()?;
        self.analysis.validate()?;
        if self.telemetry.endpoint.trim().is_empty() {
            return Err(KneeGuardError::Config("telemetry.endpoint is empty".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(KneeGuardError::Config("tick_interval_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> KneeGuardResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| KneeGuardError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> KneeGuardResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KneeGuardError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = SessionConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.tick_interval_ms, TICK_INTERVAL_MS);
        assert_eq!(config.analysis.segment, SegmentRole::Thigh);
        assert_eq!(config.game.countdown_s(), 4.0);
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = SessionConfig::from_json_str(
            r#"{
                "game": { "difficulty": 0.7 },
                "analysis": { "framing": "unframed", "mode": "worker", "segment": "shin" },
                "angle_policy": "skip"
            }"#,
        )
        .unwrap();

        assert_eq!(config.game.difficulty, 0.7);
        assert_eq!(config.game.duration_s, GAME_DURATION_S);
        assert_eq!(config.analysis.framing, Framing::Unframed);
        assert_eq!(config.analysis.mode, AnalysisMode::Worker);
        assert_eq!(config.analysis.segment, SegmentRole::Shin);
        assert_eq!(config.analysis.response_limit(), UNFRAMED_RESPONSE_BUFFER);
        assert_eq!(config.angle_policy, AnglePolicy::Skip);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad_difficulty = SessionConfig::default().with_game(GameConfig::default().with_difficulty(1.5));
        assert!(matches!(bad_difficulty.validate(), Err(KneeGuardError::Config(_))));

        let inverted = SessionConfig::default().with_game(GameConfig::default().with_angle_range(170.0, 60.0));
        assert!(inverted.validate().is_err());

        let no_shin = SessionConfig::default().with_calibration(
            CalibrationConfig::default().with_roles(RoleMap::empty().assign("a", SegmentRole::Thigh)),
        );
        assert!(no_shin.validate().is_err());

        let err = SessionConfig::from_json_str(r#"{"game": {"duration_s": "long"}}"#).unwrap_err();
        assert!(matches!(err, KneeGuardError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"telemetry": {"endpoint": "tcp://0.0.0.0:6000"}}"#).unwrap();

        let config = SessionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.telemetry.endpoint, "tcp://0.0.0.0:6000");

        let missing = SessionConfig::from_json_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(missing, KneeGuardError::Io(_)));
    }
}
