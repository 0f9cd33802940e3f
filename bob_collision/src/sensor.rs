//! Grounded test, ground normal raycast and brake lever deflection.

use bob_motor::{clamp_ratio, BodyPose, GroundSample};
use physics_rapier::SurfaceClass;
use rapier3d::math::{Isometry, Point, Vector};
use rapier3d::prelude::Real;

use crate::query::SpatialQuery;

/// Max reach of the downward normal ray in meters.
pub const NORMAL_RAY_DISTANCE: Real = 10.0;

/// Body collider dimensions (capsule along the body up axis).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColliderGeometry {
    pub radius: Real,
    /// Total height including both caps.
    pub height: Real,
    /// Collider center relative to the body origin, body frame.
    pub center: Vector<Real>,
    /// Contact shell kept around the collider.
    pub skin_width: Real,
}

impl Default for ColliderGeometry {
    fn default() -> Self {
        Self {
            radius: 0.5,
            height: 1.2,
            center: Vector::zeros(),
            skin_width: 0.08,
        }
    }
}

impl ColliderGeometry {
    pub fn is_degenerate(&self) -> bool {
        !(self.radius > 0.0)
            || !self.radius.is_finite()
            || !self.height.is_finite()
            || !(self.skin_width >= 0.0)
            || !self.skin_width.is_finite()
            || !self.center.iter().all(|c| c.is_finite())
    }

    /// Half length of the capsule segment (zero for a sphere).
    pub fn half_segment(&self) -> Real {
        (self.height * 0.5 - self.radius).max(0.0)
    }

    pub fn contact_radius(&self) -> Real {
        self.radius + 2.0 * self.skin_width
    }

    pub fn world_center(&self, pose: &BodyPose) -> Point<Real> {
        pose.transform_point(&Point::from(self.center))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GroundSensor {
    pub normal_ray_distance: Real,
}

impl Default for GroundSensor {
    fn default() -> Self {
        Self {
            normal_ray_distance: NORMAL_RAY_DISTANCE,
        }
    }
}

impl GroundSensor {
    /// Samples grounded state and normal for the current pose.
    ///
    /// A grounded body whose downward ray misses reports world up with
    /// `normal_from_hit == false`; the solvers then treat the ground as flat.
    pub fn sense<Q: SpatialQuery + ?Sized>(
        &self,
        query: &Q,
        pose: &BodyPose,
        geometry: &ColliderGeometry,
    ) -> GroundSample {
        if geometry.is_degenerate() {
            return GroundSample::airborne();
        }
        let center = geometry.world_center(pose);
        let hits = query.overlap_sphere(center, geometry.contact_radius(), SurfaceClass::Ground);
        if hits == 0 {
            return GroundSample::airborne();
        }
        match query.cast_ray(
            pose.position,
            -Vector::y(),
            self.normal_ray_distance,
            SurfaceClass::Ground,
        ) {
            Some(hit) => GroundSample::grounded(hit.normal),
            None => {
                tracing::debug!(hits, "grounded without a normal hit; assuming flat ground");
                GroundSample {
                    grounded: true,
                    normal: Vector::y(),
                    normal_from_hit: false,
                }
            }
        }
    }
}

/// Brake lever hinged on the body. Its blade points along the pivot's +Z
/// (backward at rest) and dips toward the ground as the lever is pulled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrakeLever {
    /// Hinge in the body frame.
    pub pivot: Isometry<Real>,
    /// Blade length in meters; also the ray reach.
    pub length: Real,
}

impl BrakeLever {
    pub fn new(pivot: Isometry<Real>, length: Real) -> Self {
        Self { pivot, length }
    }

    /// Same lever with the hinge pitched by `angle` radians (pulled when positive).
    pub fn pulled(&self, angle: Real) -> Self {
        let mut pivot = self.pivot;
        pivot.rotation *= rapier3d::math::Rotation::from_axis_angle(&Vector::x_axis(), angle);
        Self { pivot, ..*self }
    }
}

/// How far the lever blade is pushed into the ground: `(length - hit) / length`,
/// 0 when the blade does not reach ground.
pub fn measure_lever<Q: SpatialQuery + ?Sized>(
    query: &Q,
    pose: &BodyPose,
    lever: &BrakeLever,
) -> Real {
    if !(lever.length > 0.0) || !lever.length.is_finite() {
        return 0.0;
    }
    let hinge = pose.isometry() * lever.pivot;
    let origin = Point::from(hinge.translation.vector);
    let blade = hinge.rotation * Vector::z();
    match query.cast_ray(origin, blade, lever.length, SurfaceClass::Ground) {
        Some(hit) => clamp_ratio((lever.length - hit.distance) / lever.length),
        None => 0.0,
    }
}
