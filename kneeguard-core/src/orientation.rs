//! Sensor orientation as a validated unit quaternion
//!
//! The sensors ship already-fused orientation, so this module does not filter or
//! integrate anything. Its job is to make sure nothing but a real rotation gets past
//! the wire: non-finite components and (near) zero-length quaternions are rejected,
//! everything else is normalized.
//!
//! ## Conventions
//!
//! - Components are ordered `(w, x, y, z)` on the wire and in constructors.
//! - `relative_to(baseline)` is `baseline⁻¹ ⊗ current`: the rotation expressed in the
//!   segment's own calibrated frame.
//! - `angle_deg()` is the rotation magnitude against identity, always in `[0°, 180°]`
//!   (`q` and `-q` give the same answer).

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::constants::calibration::MIN_QUATERNION_NORM;
use crate::errors::{KneeGuardError, KneeGuardResult};

/// Normalized rotation of one sensor relative to its own reference frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QuaternionWire", into = "QuaternionWire")]
pub struct Orientation(UnitQuaternion<f64>);

/// `{w, x, y, z}` document shape shared by telemetry, analysis and export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionWire {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Orientation {
    /// Build from raw components, rejecting malformed input
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> KneeGuardResult<Self> {
        if ![w, x, y, z].iter().all(|c| c.is_finite()) {
            return Err(KneeGuardError::InvalidInput {
                reason: "quaternion has non-finite components",
            });
        }

        let raw = Quaternion::new(w, x, y, z);
        if raw.norm() < MIN_QUATERNION_NORM {
            return Err(KneeGuardError::InvalidInput {
                reason: "quaternion has zero length",
            });
        }

        Ok(Self(UnitQuaternion::from_quaternion(raw)))
    }

    /// No rotation
    pub fn identity() -> Self {
        Self(UnitQuaternion::identity())
    }

    /// Rotation of `angle_deg` about `axis` (need not be unit length)
    pub fn from_axis_angle(axis: [f64; 3], angle_deg: f64) -> KneeGuardResult<Self> {
        let axis = Unit::try_new(Vector3::new(axis[0], axis[1], axis[2]), MIN_QUATERNION_NORM)
            .ok_or(KneeGuardError::InvalidInput { reason: "rotation axis has zero length" })?;
        if !angle_deg.is_finite() {
            return Err(KneeGuardError::InvalidInput { reason: "rotation angle is not finite" });
        }
        Ok(Self(UnitQuaternion::from_axis_angle(&axis, angle_deg.to_radians())))
    }

    pub fn w(&self) -> f64 {
        self.0.w
    }

    pub fn x(&self) -> f64 {
        self.0.i
    }

    pub fn y(&self) -> f64 {
        self.0.j
    }

    pub fn z(&self) -> f64 {
        self.0.k
    }

    /// Components in wire order `[w, x, y, z]`
    pub fn components(&self) -> [f64; 4] {
        [self.w(), self.x(), self.y(), self.z()]
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Hamilton product `self ⊗ rhs`
    pub fn compose(&self, rhs: &Orientation) -> Self {
        Self(self.0 * rhs.0)
    }

    /// Rotation since `baseline`, in the baseline's frame
    pub fn relative_to(&self, baseline: &Orientation) -> Self {
        baseline.inverse().compose(self)
    }

    /// Rotation magnitude against identity in degrees, within `[0, 180]`
    pub fn angle_deg(&self) -> f64 {
        self.0.angle().to_degrees()
    }

    pub fn as_unit_quaternion(&self) -> &UnitQuaternion<f64> {
        &self.0
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<UnitQuaternion<f64>> for Orientation {
    fn from(q: UnitQuaternion<f64>) -> Self {
        Self(q)
    }
}

impl From<Orientation> for QuaternionWire {
    fn from(o: Orientation) -> Self {
        Self { w: o.w(), x: o.x(), y: o.y(), z: o.z() }
    }
}

impl TryFrom<QuaternionWire> for Orientation {
    type Error = KneeGuardError;

    fn try_from(q: QuaternionWire) -> Result<Self, Self::Error> {
        Orientation::new(q.w, q.x, q.y, q.z)
    }
}
