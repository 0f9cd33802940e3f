//! Rider center-of-mass proxies.

use bob_motor::BodyPose;
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

pub trait RiderProxy {
    /// Center-of-mass proxy in world space for this tick. `pose` is the
    /// heading and ground-aligned frame, without the body's overturn roll.
    fn center_of_mass(&self, pose: &BodyPose, base: Point<Real>) -> Point<Real>;
}

/// Rider sitting on the bob, tracked through the head.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeatedRider {
    /// Head position relative to the body origin, body frame.
    pub head_offset: Vector<Real>,
    /// Sideways lean of the head along body right, meters.
    pub lean: Real,
    /// Where the mass sits on the base-to-head segment (1 = at the head).
    pub com_weight: Real,
}

impl Default for SeatedRider {
    fn default() -> Self {
        Self {
            head_offset: Vector::new(0.0, 0.8, 0.0),
            lean: 0.0,
            com_weight: 1.0,
        }
    }
}

impl SeatedRider {
    pub fn set_lean(&mut self, lean: Real) {
        self.lean = if lean.is_finite() { lean } else { 0.0 };
    }

    pub fn head(&self, pose: &BodyPose) -> Point<Real> {
        let local = self.head_offset + Vector::x() * self.lean;
        pose.transform_point(&Point::from(local))
    }
}

impl RiderProxy for SeatedRider {
    fn center_of_mass(&self, pose: &BodyPose, base: Point<Real>) -> Point<Real> {
        base + (self.head(pose) - base) * self.com_weight
    }
}
