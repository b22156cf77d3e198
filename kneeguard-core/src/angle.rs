//! Knee flexion angle from two segment orientations
//!
//! ```text
//! thigh_rel = thigh_baseline⁻¹ ⊗ thigh          rotation of the thigh since calibration
//! shin_rel  = shin_baseline⁻¹  ⊗ shin           rotation of the shin since calibration
//! knee      = thigh_rel⁻¹ ⊗ shin_rel            shin relative to thigh
//! flexion   = clamp(180° − |knee|, 0°, 180°)
//! ```
//!
//! A leg held in the calibration pose reads 180°. Removing each baseline first makes
//! the result independent of how each sensor's axes happen to sit on the limb.
//!
//! The calculator has no fallback value. Readings that don't match the calibrated
//! sensors come back as `InvalidInput` and the caller decides what to show.

use crate::calibration::{resolve_roles, CalibrationBaseline};
use crate::constants::game::STRAIGHT_LEG_DEG;
use crate::errors::{KneeGuardError, KneeGuardResult};
use crate::orientation::Orientation;
use crate::telemetry::SensorReading;

/// Flexion angle in degrees for two readings in any slot order
pub fn knee_angle(
    a: &SensorReading,
    b: &SensorReading,
    baseline: &CalibrationBaseline,
) -> KneeGuardResult<f64> {
    let pair = resolve_roles(a, b, baseline)?;
    knee_angle_from_orientations(&pair.thigh.orientation, &pair.shin.orientation, baseline)
}

/// Flexion angle in degrees for already-resolved segment orientations
pub fn knee_angle_from_orientations(
    thigh: &Orientation,
    shin: &Orientation,
    baseline: &CalibrationBaseline,
) -> KneeGuardResult<f64> {
    let thigh_rel = thigh.relative_to(&baseline.thigh_baseline);
    let shin_rel = shin.relative_to(&baseline.shin_baseline);
    let knee = thigh_rel.inverse().compose(&shin_rel);

    let bend = knee.angle_deg();
    if !bend.is_finite() {
        return Err(KneeGuardError::InvalidInput { reason: "knee rotation is not finite" });
    }

    Ok((STRAIGHT_LEG_DEG - bend).clamp(0.0, STRAIGHT_LEG_DEG))
}
