//! Pose and per-tick state shared by the sensor and both solvers.

use rapier3d::math::{Isometry, Point, Rotation, Translation, Vector};
use rapier3d::prelude::Real;

use crate::math::try_normalize;

/// Body orientation in radians. At zero angles forward is -Z, right is +X and up is +Y.
///
/// Yaw turns toward the right about world up, pitch raises the nose about the
/// body right axis and roll raises the right side about the body forward axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Orientation {
    pub yaw: Real,
    pub pitch: Real,
    pub roll: Real,
}

impl Orientation {
    pub fn from_yaw(yaw: Real) -> Self {
        Self {
            yaw,
            ..Default::default()
        }
    }

    pub fn yaw_rotation(&self) -> Rotation<Real> {
        Rotation::from_axis_angle(&Vector::y_axis(), -self.yaw)
    }

    pub fn rotation(&self) -> Rotation<Real> {
        self.yaw_rotation()
            * Rotation::from_axis_angle(&Vector::x_axis(), self.pitch)
            * Rotation::from_axis_angle(&Vector::z_axis(), self.roll)
    }

    pub fn forward(&self) -> Vector<Real> {
        self.rotation() * -Vector::z()
    }

    pub fn right(&self) -> Vector<Real> {
        self.rotation() * Vector::x()
    }

    pub fn up(&self) -> Vector<Real> {
        self.rotation() * Vector::y()
    }

    /// Right axis of the heading alone (horizontal, ignores pitch and roll).
    pub fn heading_right(&self) -> Vector<Real> {
        self.yaw_rotation() * Vector::x()
    }

    pub fn with_yaw_delta(self, delta: Real) -> Self {
        Self {
            yaw: self.yaw + delta,
            ..self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyPose {
    pub position: Point<Real>,
    pub orientation: Orientation,
}

impl BodyPose {
    pub fn new(position: Point<Real>, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn isometry(&self) -> Isometry<Real> {
        Isometry::from_parts(
            Translation::from(self.position.coords),
            self.orientation.rotation(),
        )
    }

    pub fn transform_point(&self, local: &Point<Real>) -> Point<Real> {
        self.isometry() * local
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundSample {
    pub grounded: bool,
    /// Unit surface normal; world up when ungrounded or when the normal ray missed.
    pub normal: Vector<Real>,
    /// False when `normal` is the world-up fallback rather than a surface hit.
    pub normal_from_hit: bool,
}

impl GroundSample {
    pub fn airborne() -> Self {
        Self {
            grounded: false,
            normal: Vector::y(),
            normal_from_hit: false,
        }
    }

    pub fn grounded(normal: Vector<Real>) -> Self {
        Self {
            grounded: true,
            normal,
            normal_from_hit: true,
        }
        .sanitized()
    }

    /// Replaces a zero or non-finite normal with world up.
    pub fn sanitized(self) -> Self {
        match try_normalize(self.normal) {
            Some(normal) => Self { normal, ..self },
            None => Self {
                normal: Vector::y(),
                normal_from_hit: false,
                ..self
            },
        }
    }
}

impl Default for GroundSample {
    fn default() -> Self {
        Self::airborne()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionState {
    pub target_velocity: Vector<Real>,
    /// Only integrated while airborne; reset on contact.
    pub vertical_speed: Real,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            target_velocity: Vector::zeros(),
            vertical_speed: 0.0,
        }
    }
}

/// Brake engagement, 0 released and 1 fully pulled.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BrakeInputs {
    pub left: Real,
    pub right: Real,
}

impl BrakeInputs {
    pub fn new(left: Real, right: Real) -> Self {
        Self {
            left: clamp_ratio(left),
            right: clamp_ratio(right),
        }
    }

    pub fn released() -> Self {
        Self::default()
    }

    pub fn total(&self) -> Real {
        self.left + self.right
    }

    pub fn differential(&self) -> Real {
        self.right - self.left
    }
}

pub fn clamp_ratio(value: Real) -> Real {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
