//! End-to-end session scenarios on a fixed clock
//!
//! Covers:
//! - Calibration and angle computation through the cache
//! - Smoothness windowing against a scripted analysis service
//! - A full 30 s game with perfect tracking
//! - Stop, restart and export

mod common;

use kneeguard_core::{
    scoring::ScoringEngine, AnglePolicy, CalibrationPhase, GameConfig, Grade, KneeGuardError, ScoringPhase,
    SessionConfig, SmoothnessMetrics,
};

use common::{calibrate_straight, leg_pose, publish_pose, session_with, step, ScriptedAnalyzer};

const WINDOW: usize = 300;

#[test]
fn quarter_turn_of_the_shin_reads_ninety_degrees() {
    let (mut session, cache, clock) = session_with(ScriptedAnalyzer::answering(-1.5, -8.0), SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);
    assert_eq!(session.calibration_phase(), CalibrationPhase::Calibrated);
    assert_eq!(session.phase(), ScoringPhase::ReadyToStart);

    let (thigh, shin) = leg_pose(90.0);
    publish_pose(&cache, thigh, shin, true, 1);
    step(&mut session, &clock);

    let angle = session.current_angle().unwrap();
    assert!((angle - 90.0).abs() < 1e-6, "angle was {angle}");
}

#[test]
fn window_of_300_samples_reports_service_metrics_and_resets() {
    let (mut session, cache, clock) = session_with(ScriptedAnalyzer::answering(-1.5, -8.0), SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);

    while session.analyzer().requests.is_empty() {
        step(&mut session, &clock);
    }
    assert_eq!(session.pending_smoothness_samples(), 0);

    let request = &session.analyzer().requests[0];
    assert_eq!(request.quaternions.len(), WINDOW);
    assert_eq!(request.quaternions[0].delta_time, 0.0);
    assert!(request.quaternions[1..].iter().all(|s| (s.delta_time - 0.016).abs() < 1e-12));

    step(&mut session, &clock);
    assert_eq!(session.snapshot().metrics, Some(SmoothnessMetrics { sparc: -1.5, ldlj: -8.0 }));
    assert_eq!(session.pending_smoothness_samples(), 1);
}

#[test]
fn decode_failure_drops_the_window_and_keeps_analysis_enabled() {
    let analyzer = ScriptedAnalyzer::failing(KneeGuardError::Decode("not json".into()));
    let (mut session, cache, clock) = session_with(analyzer, SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);

    for _ in 0..WINDOW * 2 {
        step(&mut session, &clock);
    }

    assert_eq!(session.analyzer().requests.len(), 2);
    assert!(session.pending_smoothness_samples() < WINDOW);
    assert_eq!(session.snapshot().metrics, None);
    assert!(session.snapshot().analysis_enabled);
    assert_eq!(session.stats().analysis_errors, 2);
}

#[test]
fn transport_failure_disables_analysis_for_the_session() {
    let analyzer = ScriptedAnalyzer::failing(KneeGuardError::Transport("connection reset".into()));
    let (mut session, cache, clock) = session_with(analyzer, SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);

    for _ in 0..WINDOW * 3 {
        step(&mut session, &clock);
    }

    assert_eq!(session.analyzer().requests.len(), 1);
    assert!(!session.snapshot().analysis_enabled);
    let stats = session.smoothness_stats();
    assert_eq!(stats.windows_completed, 3);
    assert_eq!(stats.windows_dropped, 3);
}

#[test]
fn perfect_tracking_with_unstable_slots_scores_an_a() {
    let (mut session, cache, clock) = session_with(ScriptedAnalyzer::answering(-1.5, -8.0), SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);
    session.start_session().unwrap();

    let mut seq = 1;
    while session.phase() != ScoringPhase::Ended {
        let target = session.current_window_band().center_deg;
        let (thigh, shin) = leg_pose(target);
        publish_pose(&cache, thigh, shin, seq % 2 == 0, seq);
        seq += 1;
        step(&mut session, &clock);
    }

    assert_eq!(session.current_points(), 6000);
    assert_eq!(session.current_grade(), Some(Grade::A));
    assert_eq!(session.snapshot().remaining_time, 0.0);
}

#[test]
fn countdown_is_visible_before_running() {
    let (mut session, cache, clock) = session_with(ScriptedAnalyzer::answering(-1.5, -8.0), SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);
    session.start_session().unwrap();

    let mut labels = Vec::new();
    while session.phase() == ScoringPhase::Countdown {
        if let Some(label) = session.snapshot().countdown_label {
            if labels.last() != Some(&label) {
                labels.push(label);
            }
        }
        step(&mut session, &clock);
    }
    assert_eq!(labels, ["3", "2", "1", "GO!"]);
    assert_eq!(session.phase(), ScoringPhase::Running);
}

#[test]
fn stop_then_restart_then_export() {
    let (mut session, cache, clock) = session_with(ScriptedAnalyzer::answering(-1.5, -8.0), SessionConfig::default());
    calibrate_straight(&mut session, &cache, &clock);
    session.start_session().unwrap();
    for _ in 0..400 {
        step(&mut session, &clock);
    }
    assert_eq!(session.phase(), ScoringPhase::Running);
    assert!(matches!(session.trigger_calibration(), Err(KneeGuardError::InvalidTransition { .. })));

    session.stop_session().unwrap();
    assert_eq!(session.phase(), ScoringPhase::Ended);
    assert!(session.current_grade().is_some());

    let dir = tempfile::tempdir().unwrap();
    let path = session.export_session(dir.path()).unwrap();
    let rows = std::fs::read_to_string(path).unwrap().lines().count() - 1;
    assert_eq!(rows, session.recorder().len());

    session.restart_session();
    assert_eq!(session.phase(), ScoringPhase::Uncalibrated);
    assert_eq!(session.current_points(), 0);
    assert!(session.recorder().is_empty());
}

#[test]
fn skip_policy_reports_no_angle_when_sensors_drop_out() {
    let config = SessionConfig::default().with_angle_policy(AnglePolicy::Skip);
    let (mut session, cache, clock) = session_with(ScriptedAnalyzer::answering(-1.5, -8.0), config);
    calibrate_straight(&mut session, &cache, &clock);
    assert!(session.current_angle().is_some());

    cache.clear();
    step(&mut session, &clock);
    assert_eq!(session.current_angle(), None);
    assert_eq!(session.snapshot().indicator_position, None);
}

#[test]
fn grade_boundaries_hold_for_session_totals() {
    let max = f64::from(GameConfig::default().max_points);
    assert_eq!(Grade::from_ratio(5400.0 / max), Grade::A);
    assert_eq!(Grade::from_ratio(0.8999), Grade::B);
    assert_eq!(Grade::from_ratio(4800.0 / max), Grade::B);
    assert_eq!(Grade::from_ratio(4799.0 / max), Grade::C);
}

#[test]
fn window_centre_repeats_every_five_seconds() {
    let engine = ScoringEngine::new(GameConfig::default());
    let period = 1.0 / GameConfig::default().movement_speed;
    let config = GameConfig::default();
    let start = engine.window_band_at(0.0);
    assert!((start.bottom() + config.gauge_height / 2.0).abs() < 1e-9);
    for i in 0..50 {
        let t = i as f64 * 0.37;
        let a = engine.window_band_at(t).center_deg;
        let b = engine.window_band_at(t + period).center_deg;
        assert!((a - b).abs() < 1e-9);
    }
}
