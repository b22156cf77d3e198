//! Assessment Game Constants
//!
//! Timing, scoring and gauge geometry for the knee-angle tracking game. The
//! point budget is sized so a perfect run scores exactly `MAX_POINTS`:
//! `GAME_DURATION_S / ASSESSMENT_INTERVAL_S * POINTS_PER_ASSESSMENT = 6000`.

use crate::scoring::Grade;

// ===== TIMING =====

/// Length of one running session (seconds).
pub const GAME_DURATION_S: f64 = 30.0;

/// Interval between two performance assessments (seconds).
pub const ASSESSMENT_INTERVAL_S: f64 = 3.0;

/// Countdown steps shown before the game starts ("3", "2", "1").
pub const COUNTDOWN_STEPS: u32 = 3;

/// Duration of each countdown step, including the final "GO!" (seconds).
pub const COUNTDOWN_STEP_S: f64 = 1.0;

// ===== SCORING =====

/// Points awarded for an assessment spent fully inside the window.
pub const POINTS_PER_ASSESSMENT: u32 = 600;

/// Maximum total over one session; the grade is computed against this.
pub const MAX_POINTS: u32 = 6000;

/// Grade breakpoints as fractions of `MAX_POINTS`, best grade first.
pub const GRADE_BREAKPOINTS: [(f64, Grade); 4] =
    [(0.90, Grade::A), (0.80, Grade::B), (0.70, Grade::C), (0.60, Grade::D)];

// ===== TARGET WINDOW =====

/// Deepest knee angle the window travels to (degrees).
pub const MIN_KNEE_ANGLE_DEG: f64 = 60.0;

/// Most extended knee angle the window travels to (degrees).
pub const MAX_KNEE_ANGLE_DEG: f64 = 170.0;

/// Window oscillation frequency (cycles per second of running time).
///
/// 0.2 gives one full squat cycle every 5 seconds.
pub const WINDOW_MOVEMENT_SPEED: f64 = 0.2;

/// Band height at difficulty 0 (screen units).
pub const WINDOW_MAX_HEIGHT: f64 = 100.0;

/// Band height at difficulty 1 (screen units).
pub const WINDOW_MIN_HEIGHT: f64 = 20.0;

/// Height of the gauge the window and indicator move along (screen units).
pub const GAUGE_HEIGHT: f64 = 400.0;

/// Difficulty used until the player moves the slider.
pub const DEFAULT_DIFFICULTY: f64 = 0.5;

// ===== ANGLE =====

/// Knee angle reported for a fully extended leg (degrees).
pub const STRAIGHT_LEG_DEG: f64 = 180.0;
