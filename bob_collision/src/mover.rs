//! Rapier KCC wrapper that applies solver displacements.
//!
//! Policy: collision response stays inside Rapier KCC; the bob only decides the
//! desired translation.

use bob_motor::BodyPose;
use physics_rapier::PhysicsWorld;
use rapier3d::control::{CharacterLength, KinematicCharacterController};
use rapier3d::math::{Point, Translation, UnitVector, Vector};
use rapier3d::prelude::{QueryFilter, Real, SharedShape};

use crate::sensor::ColliderGeometry;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoverProfile {
    /// Separation kept between the collider and the environment.
    pub offset: Real,
    /// Steepest slope the mover will climb, radians.
    pub max_slope_climb_angle: Real,
    /// Small nudge applied along contact normals to prevent sticking.
    pub normal_nudge_factor: Real,
}

impl Default for MoverProfile {
    fn default() -> Self {
        Self {
            offset: 0.02,
            max_slope_climb_angle: 85.0_f32.to_radians(),
            normal_nudge_factor: 1.0e-4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveResult {
    pub position: Point<Real>,
    /// Translation actually applied.
    pub translation: Vector<Real>,
    /// True when the environment rejected part of the desired translation.
    pub blocked: bool,
}

pub struct BodyMover {
    controller: KinematicCharacterController,
    shape: SharedShape,
    center: Vector<Real>,
}

impl BodyMover {
    pub fn new(geometry: &ColliderGeometry, profile: MoverProfile) -> Self {
        let half = geometry.half_segment();
        let shape = if half > 0.0 {
            SharedShape::capsule_y(half, geometry.radius)
        } else {
            SharedShape::ball(geometry.radius)
        };
        let controller = KinematicCharacterController {
            offset: CharacterLength::Absolute(profile.offset),
            slide: true,
            autostep: None,
            max_slope_climb_angle: profile.max_slope_climb_angle,
            // Slope sliding is the locomotion solver's job.
            min_slope_slide_angle: std::f32::consts::FRAC_PI_2,
            snap_to_ground: None,
            normal_nudge_factor: profile.normal_nudge_factor,
            ..Default::default()
        };
        Self {
            controller,
            shape,
            center: geometry.center,
        }
    }

    pub fn move_body(
        &mut self,
        world: &PhysicsWorld,
        pose: &BodyPose,
        displacement: Vector<Real>,
        dt: Real,
    ) -> MoveResult {
        if displacement.norm_squared() <= 0.0 || !displacement.iter().all(|c| c.is_finite()) {
            return MoveResult {
                position: pose.position,
                translation: Vector::zeros(),
                blocked: false,
            };
        }
        self.controller.up = UnitVector::new_normalize(world.up());
        let shape_pos = pose.isometry() * Translation::from(self.center);
        let output = self.controller.move_shape(
            dt,
            world.bodies(),
            world.colliders(),
            world.query_pipeline(),
            &*self.shape,
            &shape_pos,
            displacement,
            QueryFilter::default(),
            |_| {},
        );
        let translation = output.translation;
        let blocked = (translation - displacement).norm() > 1.0e-4;
        MoveResult {
            position: pose.position + translation,
            translation,
            blocked,
        }
    }
}
