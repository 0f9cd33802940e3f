//! Bob locomotion solver (ground-following velocity accumulator).
#![forbid(unsafe_code)]

pub mod math;
pub mod state;

use rapier3d::math::Vector;
use rapier3d::prelude::Real;

use crate::math::{
    move_towards, move_towards_vector, project_on_plane, sign_or_positive, try_normalize,
};
pub use crate::state::{clamp_ratio, BodyPose, BrakeInputs, GroundSample, MotionState, Orientation};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocomotionConfig {
    pub gravity: Vector<Real>,
    /// Exponential decay per second, applied as `v *= 1 - drag * dt`.
    pub drag: Real,
    /// Max straight-line step of the unit velocity direction per second.
    pub direction_change_speed: Real,
    /// Deceleration per unit of sideways motion (velocity direction dotted with right).
    pub lateral_friction: Real,
    /// Deceleration per unit of summed brake ratio.
    pub brake_force_max: Real,
    /// Upper bound for brake-differential turning in degrees/sec.
    pub steer_rate_max_deg: Real,
    /// Turning rate at standstill in degrees/sec.
    pub steer_rate_base_deg: Real,
    /// Fraction of `steer_rate_max_deg` gained per m/s of forward speed.
    pub steer_rate_speed_scale: Real,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            gravity: Vector::new(0.0, -9.81, 0.0),
            drag: 0.5,
            direction_change_speed: 5.0,
            lateral_friction: 1.0,
            brake_force_max: 0.5,
            steer_rate_max_deg: 270.0,
            steer_rate_base_deg: 10.0,
            steer_rate_speed_scale: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocomotionOutput {
    pub state: MotionState,
    /// Translation to hand to the body mover; it may be partially rejected.
    pub displacement: Vector<Real>,
    /// Yaw change in radians from brake steering, positive toward the right.
    pub yaw_delta: Real,
}

#[derive(Clone, Debug)]
pub struct LocomotionSolver {
    config: LocomotionConfig,
}

impl LocomotionSolver {
    pub fn new(config: LocomotionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> LocomotionConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut LocomotionConfig {
        &mut self.config
    }

    pub fn step(
        &self,
        state: MotionState,
        ground: &GroundSample,
        brakes: BrakeInputs,
        orientation: &Orientation,
        dt: Real,
    ) -> LocomotionOutput {
        if !(dt > 0.0) || !dt.is_finite() {
            return LocomotionOutput {
                state,
                displacement: Vector::zeros(),
                yaw_delta: 0.0,
            };
        }
        let ground = ground.sanitized();
        let mut next = state;
        let mut yaw_delta = 0.0;

        if ground.grounded {
            yaw_delta =
                brake_steering(&self.config, state.target_velocity, brakes, orientation, dt);
            let orientation = orientation.with_yaw_delta(yaw_delta);
            next.vertical_speed = 0.0;
            next.target_velocity =
                self.grounded_velocity(state.target_velocity, &ground, brakes, &orientation, dt);
        } else {
            next.vertical_speed += self.config.gravity.y * dt;
        }

        let decay = 1.0 - self.config.drag * dt;
        next.target_velocity *= decay;
        next.vertical_speed *= decay;

        let displacement =
            next.target_velocity * dt + Vector::y() * next.vertical_speed * dt;
        tracing::trace!(
            grounded = ground.grounded,
            speed = next.target_velocity.norm(),
            vertical_speed = next.vertical_speed,
            yaw_delta,
            "locomotion step"
        );
        LocomotionOutput {
            state: next,
            displacement,
            yaw_delta,
        }
    }

    fn grounded_velocity(
        &self,
        velocity: Vector<Real>,
        ground: &GroundSample,
        brakes: BrakeInputs,
        orientation: &Orientation,
        dt: Real,
    ) -> Vector<Real> {
        let normal = ground.normal;
        let forward = orientation.forward();
        let right = orientation.right();
        let fwd_on_ground = ground_axis(forward, normal);

        // Lateral slope acceleration is zero: the runners do not side-slip.
        let f_acc = fwd_on_ground * self.config.gravity.dot(&fwd_on_ground);

        let velocity = project_on_plane(velocity, normal);
        let speed = velocity.norm();
        let direction = try_normalize(velocity);
        let steered = match direction {
            Some(dir) => {
                let step = self.config.direction_change_speed.max(0.0) * dt;
                try_normalize(move_towards_vector(dir, fwd_on_ground, step))
                    .unwrap_or(fwd_on_ground)
            }
            None => fwd_on_ground,
        };

        let lateral = direction.map(|dir| dir.dot(&right)).unwrap_or(0.0);
        let decel = (lateral * self.config.lateral_friction
            + brakes.total() * self.config.brake_force_max)
            .abs();
        let magnitude = move_towards(speed, 0.0, decel * dt);

        steered * magnitude + f_acc * dt
    }
}

/// Body axis projected onto the ground plane; falls back to the plane-projected
/// world forward when the axis is parallel to the normal.
fn ground_axis(axis: Vector<Real>, normal: Vector<Real>) -> Vector<Real> {
    try_normalize(project_on_plane(axis, normal))
        .or_else(|| try_normalize(project_on_plane(-Vector::z(), normal)))
        .unwrap_or_else(|| -Vector::z())
}

/// Turning from uneven braking: pulling the right lever turns right when
/// moving forward and mirrors when moving backward.
fn brake_steering(
    config: &LocomotionConfig,
    velocity: Vector<Real>,
    brakes: BrakeInputs,
    orientation: &Orientation,
    dt: Real,
) -> Real {
    let differential = brakes.differential();
    if differential == 0.0 {
        return 0.0;
    }
    let forward = orientation.forward();
    let horizontal = Vector::new(velocity.x, 0.0, velocity.z);
    let forward_speed = horizontal.dot(&forward).abs();
    let sign = sign_or_positive(velocity.dot(&forward));
    let max_rate = config.steer_rate_max_deg.max(0.0);
    let rate = max_rate.min(
        max_rate * config.steer_rate_speed_scale * forward_speed + config.steer_rate_base_deg,
    );
    sign * rate.to_radians() * dt * differential
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Real = 1.0 / 60.0;

    fn no_drag() -> LocomotionConfig {
        LocomotionConfig {
            drag: 0.0,
            ..Default::default()
        }
    }

    fn flat() -> GroundSample {
        GroundSample::grounded(Vector::y())
    }

    fn assert_close(a: Real, b: Real) {
        assert!((a - b).abs() < 1.0e-4, "{} != {}", a, b);
    }

    #[test]
    fn rest_on_flat_ground_stays_at_rest() {
        let solver = LocomotionSolver::new(LocomotionConfig::default());
        let output = solver.step(
            MotionState::default(),
            &flat(),
            BrakeInputs::released(),
            &Orientation::default(),
            DT,
        );
        assert!(output.displacement.norm() < 1.0e-6);
        assert_eq!(output.state.vertical_speed, 0.0);
        assert_eq!(output.yaw_delta, 0.0);
    }

    #[test]
    fn airborne_free_fall_matches_gravity() {
        let config = LocomotionConfig {
            gravity: Vector::new(0.0, -9.8, 0.0),
            ..no_drag()
        };
        let solver = LocomotionSolver::new(config);
        let output = solver.step(
            MotionState::default(),
            &GroundSample::airborne(),
            BrakeInputs::released(),
            &Orientation::default(),
            1.0,
        );
        assert_close(output.state.vertical_speed, -9.8);
        assert_close(output.displacement.y, -9.8);
    }

    #[test]
    fn airborne_horizontal_velocity_only_decays_by_drag() {
        let solver = LocomotionSolver::new(LocomotionConfig::default());
        let state = MotionState {
            target_velocity: Vector::new(3.0, 0.0, -4.0),
            vertical_speed: -1.0,
        };
        let brakes = BrakeInputs::new(1.0, 0.0);
        let output = solver.step(
            state,
            &GroundSample::airborne(),
            brakes,
            &Orientation::default(),
            DT,
        );
        let decay = 1.0 - 0.5 * DT;
        assert!((output.state.target_velocity - state.target_velocity * decay).norm() < 1.0e-6);
        let expected = (-1.0 - 9.81 * DT) * decay;
        assert_close(output.state.vertical_speed, expected);
        assert!(output.state.vertical_speed < state.vertical_speed);
        assert_eq!(output.yaw_delta, 0.0);
    }

    #[test]
    fn drag_never_flips_sign() {
        let config = LocomotionConfig {
            drag: 50.0,
            ..Default::default()
        };
        let solver = LocomotionSolver::new(config);
        let mut state = MotionState {
            target_velocity: Vector::new(-2.0, 0.0, 5.0),
            vertical_speed: 4.0,
        };
        for _ in 0..30 {
            let next = solver
                .step(
                    state,
                    &GroundSample::airborne(),
                    BrakeInputs::released(),
                    &Orientation::default(),
                    0.01,
                )
                .state;
            assert!(next.target_velocity.x <= 0.0);
            assert!(next.target_velocity.z >= 0.0);
            state = next;
        }
    }

    #[test]
    fn zero_dt_is_identity() {
        let solver = LocomotionSolver::new(LocomotionConfig::default());
        let state = MotionState {
            target_velocity: Vector::new(1.0, 0.5, -2.0),
            vertical_speed: -3.0,
        };
        let output = solver.step(
            state,
            &flat(),
            BrakeInputs::new(1.0, 0.0),
            &Orientation::default(),
            0.0,
        );
        assert_eq!(output.state, state);
        assert_eq!(output.displacement, Vector::zeros());
        assert_eq!(output.yaw_delta, 0.0);
    }

    #[test]
    fn slope_accelerates_along_ground_forward() {
        let solver = LocomotionSolver::new(no_drag());
        let tilt = 10.0_f32.to_radians();
        let normal = Vector::new(0.0, tilt.cos(), tilt.sin());
        let output = solver.step(
            MotionState::default(),
            &GroundSample::grounded(normal),
            BrakeInputs::released(),
            &Orientation::default(),
            DT,
        );
        let fwd_on_ground = Vector::new(0.0, tilt.sin(), -tilt.cos());
        let expected = fwd_on_ground * (Vector::new(0.0, -9.81, 0.0).dot(&fwd_on_ground) * DT);
        assert!((output.state.target_velocity - expected).norm() < 1.0e-5);
        // Facing uphill, gravity pulls backward and down the slope.
        assert!(output.state.target_velocity.z > 0.0);
        assert!(output.state.target_velocity.y < 0.0);
    }

    #[test]
    fn velocity_turns_toward_forward_at_bounded_rate() {
        let solver = LocomotionSolver::new(LocomotionConfig {
            lateral_friction: 0.0,
            ..no_drag()
        });
        let state = MotionState {
            target_velocity: Vector::new(4.0, 0.0, 0.0),
            vertical_speed: 0.0,
        };
        let output = solver.step(
            state,
            &flat(),
            BrakeInputs::released(),
            &Orientation::default(),
            DT,
        );
        let velocity = output.state.target_velocity;
        assert_close(velocity.norm(), 4.0);
        assert!(velocity.z < 0.0);
        assert!(velocity.x > 3.9);
    }

    #[test]
    fn brakes_slow_without_reversing() {
        let solver = LocomotionSolver::new(LocomotionConfig {
            brake_force_max: 100.0,
            ..no_drag()
        });
        let state = MotionState {
            target_velocity: Vector::new(0.0, 0.0, -1.0),
            vertical_speed: 0.0,
        };
        let output = solver.step(
            state,
            &flat(),
            BrakeInputs::new(1.0, 1.0),
            &Orientation::default(),
            DT,
        );
        assert!(output.state.target_velocity.norm() < 1.0e-6);
    }

    #[test]
    fn lateral_motion_is_damped_by_friction() {
        let solver = LocomotionSolver::new(LocomotionConfig {
            lateral_friction: 2.0,
            direction_change_speed: 0.0,
            ..no_drag()
        });
        let state = MotionState {
            target_velocity: Vector::new(3.0, 0.0, 0.0),
            vertical_speed: 0.0,
        };
        let output = solver.step(
            state,
            &flat(),
            BrakeInputs::released(),
            &Orientation::default(),
            0.1,
        );
        assert_close(output.state.target_velocity.norm(), 2.8);
    }

    #[test]
    fn grounding_clears_vertical_speed_and_normal_component() {
        let solver = LocomotionSolver::new(no_drag());
        let state = MotionState {
            target_velocity: Vector::new(0.0, -5.0, -2.0),
            vertical_speed: -7.0,
        };
        let output = solver.step(
            state,
            &flat(),
            BrakeInputs::released(),
            &Orientation::default(),
            DT,
        );
        assert_eq!(output.state.vertical_speed, 0.0);
        assert!(output.state.target_velocity.y.abs() < 1.0e-6);
    }

    #[test]
    fn right_brake_turns_right_when_moving_forward() {
        let solver = LocomotionSolver::new(LocomotionConfig::default());
        let state = MotionState {
            target_velocity: Vector::new(0.0, 0.0, -3.0),
            vertical_speed: 0.0,
        };
        let output = solver.step(
            state,
            &flat(),
            BrakeInputs::new(0.0, 1.0),
            &Orientation::default(),
            DT,
        );
        assert!(output.yaw_delta > 0.0);
        let rate: Real = (270.0_f32).min(270.0 * 0.1 * 3.0 + 10.0);
        assert_close(output.yaw_delta, rate.to_radians() * DT);

        let reverse = MotionState {
            target_velocity: Vector::new(0.0, 0.0, 3.0),
            vertical_speed: 0.0,
        };
        let output = solver.step(
            reverse,
            &flat(),
            BrakeInputs::new(0.0, 1.0),
            &Orientation::default(),
            DT,
        );
        assert!(output.yaw_delta < 0.0);
    }
}
