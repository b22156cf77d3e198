//! Angular speed from an orientation time series
//!
//! ```text
//! q̇ᵢ ≈ (qᵢ₊₁ − qᵢ₋₁) / (tᵢ₊₁ − tᵢ₋₁)       one-sided at both ends
//! ωᵢ = 2 · q̇ᵢ · qᵢ*                           pure quaternion, vector part is ω
//! speedᵢ = |ωᵢ|                               rad/s
//! ```
//!
//! `q` and `−q` are the same rotation, so the series is first forced onto one
//! hemisphere; otherwise a sign flip between samples reads as a huge spin.

use std::cmp::Ordering;

use nalgebra::Quaternion;

use kneeguard_core::Orientation;

use crate::error::{SmoothnessError, SmoothnessResult};

/// Angular speed magnitude (rad/s) at every sample
///
/// `times` are absolute sample times in seconds and must strictly increase.
pub fn angular_speed(orientations: &[Orientation], times: &[f64]) -> SmoothnessResult<Vec<f64>> {
    if orientations.len() != times.len() {
        return Err(SmoothnessError::LengthMismatch { orientations: orientations.len(), times: times.len() });
    }
    if orientations.len() < 2 {
        return Err(SmoothnessError::TooFewSamples { needed: 2, got: orientations.len() });
    }
    if let Some(index) = times.windows(2).position(|pair| pair[1].partial_cmp(&pair[0]) != Some(Ordering::Greater)) {
        return Err(SmoothnessError::NonMonotonicTime { index: index + 1 });
    }

    let quats = continuous(orientations);
    let last = quats.len() - 1;

    let speeds = (0..quats.len())
        .map(|i| {
            let (lo, hi) = (i.saturating_sub(1), (i + 1).min(last));
            let q_dot = (quats[hi] - quats[lo]) / (times[hi] - times[lo]);
            let omega = q_dot * quats[i].conjugate() * 2.0;
            omega.imag().norm()
        })
        .collect();
    Ok(speeds)
}

fn continuous(orientations: &[Orientation]) -> Vec<Quaternion<f64>> {
    let mut out: Vec<Quaternion<f64>> = Vec::with_capacity(orientations.len());
    for orientation in orientations {
        let q = *orientation.as_unit_quaternion().quaternion();
        let q = match out.last() {
            Some(prev) if prev.dot(&q) < 0.0 => -q,
            _ => q,
        };
        out.push(q);
    }
    out
}
