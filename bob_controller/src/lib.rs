//! Bob controller composition (brakes + sensor + solvers + mover).
#![forbid(unsafe_code)]

pub mod brakes;
pub mod rider;

use bob_balance::{alignment_targets, BalanceConfig, BalanceContext, BalanceSolver, BalanceState};
use bob_collision::{BodyMover, ColliderGeometry, GroundSensor, MoveResult, MoverProfile};
use bob_motor::{
    BodyPose, BrakeInputs, GroundSample, LocomotionConfig, LocomotionSolver, MotionState,
    Orientation,
};
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

pub use crate::brakes::{
    BrakeSource, Capability, GrabbedLever, GrabbedLevers, InteractorKind, LeverBrakes, LeverSide,
    ManualBrakes,
};
pub use crate::rider::{RiderProxy, SeatedRider};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("collider geometry is required")]
    MissingCollider,
    #[error("rider proxy is required")]
    MissingRider,
    #[error("degenerate collider geometry: {0}")]
    DegenerateCollider(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Clone, Copy, Debug)]
pub struct BobFrame {
    pub pose: BodyPose,
    pub ground: GroundSample,
    pub motion: MotionState,
    pub balance: BalanceState,
    pub brakes: BrakeInputs,
    pub lean_offset: Real,
    pub yaw_delta: Real,
    pub movement: MoveResult,
}

pub struct BobControllerBuilder<B: BrakeSource, R: RiderProxy> {
    brakes: B,
    rider: Option<R>,
    geometry: Option<ColliderGeometry>,
    pose: BodyPose,
    locomotion: LocomotionConfig,
    balance: BalanceConfig,
    mover: MoverProfile,
    sensor: GroundSensor,
}

impl<B: BrakeSource, R: RiderProxy> BobControllerBuilder<B, R> {
    pub fn new(brakes: B) -> Self {
        Self {
            brakes,
            rider: None,
            geometry: None,
            pose: BodyPose::new(Point::origin(), Default::default()),
            locomotion: LocomotionConfig::default(),
            balance: BalanceConfig::default(),
            mover: MoverProfile::default(),
            sensor: GroundSensor::default(),
        }
    }

    pub fn rider(mut self, rider: R) -> Self {
        self.rider = Some(rider);
        self
    }

    pub fn collider(mut self, geometry: ColliderGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn pose(mut self, pose: BodyPose) -> Self {
        self.pose = pose;
        self
    }

    pub fn locomotion(mut self, config: LocomotionConfig) -> Self {
        self.locomotion = config;
        self
    }

    pub fn balance(mut self, config: BalanceConfig) -> Self {
        self.balance = config;
        self
    }

    pub fn mover(mut self, profile: MoverProfile) -> Self {
        self.mover = profile;
        self
    }

    pub fn sensor(mut self, sensor: GroundSensor) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn build(self) -> Result<BobController<B, R>, ControllerError> {
        let geometry = self.geometry.ok_or(ControllerError::MissingCollider)?;
        let rider = self.rider.ok_or(ControllerError::MissingRider)?;
        if geometry.is_degenerate() {
            return Err(ControllerError::DegenerateCollider(format!(
                "radius {} height {} skin {}",
                geometry.radius, geometry.height, geometry.skin_width
            )));
        }
        check_locomotion(&self.locomotion)?;
        check_balance(&self.balance)?;
        if !pose_is_finite(&self.pose) {
            return Err(ControllerError::InvalidConfig(
                "initial pose must be finite".to_string(),
            ));
        }
        tracing::info!(
            radius = geometry.radius,
            height = geometry.height,
            strategy = self.balance.strategy.as_str(),
            "bob controller ready"
        );
        Ok(BobController {
            brakes: self.brakes,
            rider,
            sensor: self.sensor,
            locomotion: LocomotionSolver::new(self.locomotion),
            balance: BalanceSolver::new(self.balance),
            mover: BodyMover::new(&geometry, self.mover),
            geometry,
            pose: self.pose,
            motion: MotionState::default(),
            balance_state: BalanceState::default(),
            ground: GroundSample::airborne(),
        })
    }
}

fn check_locomotion(config: &LocomotionConfig) -> Result<(), ControllerError> {
    let scalars = [
        ("drag", config.drag),
        ("direction_change_speed", config.direction_change_speed),
        ("lateral_friction", config.lateral_friction),
        ("brake_force_max", config.brake_force_max),
        ("steer_rate_max_deg", config.steer_rate_max_deg),
        ("steer_rate_base_deg", config.steer_rate_base_deg),
        ("steer_rate_speed_scale", config.steer_rate_speed_scale),
    ];
    check_non_negative(&scalars)?;
    if !config.gravity.iter().all(|c| c.is_finite()) {
        return Err(ControllerError::InvalidConfig("gravity must be finite".to_string()));
    }
    Ok(())
}

fn check_balance(config: &BalanceConfig) -> Result<(), ControllerError> {
    let scalars = [
        ("support_radius", config.support_radius),
        ("align_speed_deg", config.align_speed_deg),
        ("max_overturn_deg", config.max_overturn_deg),
        ("tip_speed_deg", config.tip_speed_deg),
        ("recovery_speed_deg", config.recovery_speed_deg),
        ("mass_factor", config.mass_factor),
        ("skid_gain", config.skid_gain),
        ("slope_gain", config.slope_gain),
        ("force_scale", config.force_scale),
    ];
    check_non_negative(&scalars)?;
    if config.max_overturn_deg > 90.0 {
        return Err(ControllerError::InvalidConfig(format!(
            "max_overturn_deg {} exceeds 90",
            config.max_overturn_deg
        )));
    }
    Ok(())
}

fn check_non_negative(values: &[(&str, Real)]) -> Result<(), ControllerError> {
    for (name, value) in values {
        if !value.is_finite() || *value < 0.0 {
            return Err(ControllerError::InvalidConfig(format!(
                "{} must be finite and >= 0 (got {})",
                name, value
            )));
        }
    }
    Ok(())
}

fn pose_is_finite(pose: &BodyPose) -> bool {
    let o = pose.orientation;
    pose.position.coords.iter().all(|c| c.is_finite())
        && o.yaw.is_finite()
        && o.pitch.is_finite()
        && o.roll.is_finite()
}

pub struct BobController<B: BrakeSource, R: RiderProxy> {
    brakes: B,
    rider: R,
    sensor: GroundSensor,
    locomotion: LocomotionSolver,
    balance: BalanceSolver,
    mover: BodyMover,
    geometry: ColliderGeometry,
    pose: BodyPose,
    motion: MotionState,
    balance_state: BalanceState,
    ground: GroundSample,
}

impl<B: BrakeSource, R: RiderProxy> BobController<B, R> {
    pub fn builder(brakes: B) -> BobControllerBuilder<B, R> {
        BobControllerBuilder::new(brakes)
    }

    pub fn pose(&self) -> &BodyPose {
        &self.pose
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn balance_state(&self) -> &BalanceState {
        &self.balance_state
    }

    pub fn ground(&self) -> &GroundSample {
        &self.ground
    }

    pub fn geometry(&self) -> &ColliderGeometry {
        &self.geometry
    }

    pub fn brakes(&self) -> &B {
        &self.brakes
    }

    pub fn brakes_mut(&mut self) -> &mut B {
        &mut self.brakes
    }

    pub fn rider(&self) -> &R {
        &self.rider
    }

    pub fn rider_mut(&mut self) -> &mut R {
        &mut self.rider
    }

    pub fn locomotion(&self) -> &LocomotionSolver {
        &self.locomotion
    }

    pub fn balance(&self) -> &BalanceSolver {
        &self.balance
    }

    /// Bottom of the support base, measured in the rider frame.
    pub fn base_point(&self) -> Point<Real> {
        let frame = rider_frame(self.pose.position, self.pose.orientation, &self.ground);
        self.support_base(&frame)
    }

    fn support_base(&self, frame: &BodyPose) -> Point<Real> {
        frame.position - frame.orientation.up() * self.geometry.radius
    }

    pub fn tick(&mut self, world: &PhysicsWorld, dt: Real) -> BobFrame {
        if !(dt > 0.0) || !dt.is_finite() {
            return self.idle_frame();
        }
        let brakes = self.brakes.sample(world, &self.pose, dt);
        let ground = self.sensor.sense(world, &self.pose, &self.geometry);
        if ground.grounded != self.ground.grounded {
            tracing::debug!(
                grounded = ground.grounded,
                normal_from_hit = ground.normal_from_hit,
                "ground contact changed"
            );
        }

        let locomotion = self
            .locomotion
            .step(self.motion, &ground, brakes, &self.pose.orientation, dt);
        let orientation = self.pose.orientation.with_yaw_delta(locomotion.yaw_delta);

        let frame = rider_frame(self.pose.position, orientation, &ground);
        let base_point = self.support_base(&frame);
        let center_of_mass = self.rider.center_of_mass(&frame, base_point);
        let balance = self.balance.step(
            self.balance_state,
            orientation,
            &BalanceContext {
                ground,
                motion: locomotion.state,
                center_of_mass,
                base_point,
            },
            dt,
        );

        let moved_pose = BodyPose::new(self.pose.position, balance.orientation);
        let movement = self
            .mover
            .move_body(world, &moved_pose, locomotion.displacement, dt);

        self.pose = BodyPose::new(movement.position, balance.orientation);
        self.motion = locomotion.state;
        self.balance_state = balance.state;
        self.ground = ground;

        BobFrame {
            pose: self.pose,
            ground,
            motion: self.motion,
            balance: self.balance_state,
            brakes,
            lean_offset: balance.lean_offset,
            yaw_delta: locomotion.yaw_delta,
            movement,
        }
    }

    fn idle_frame(&self) -> BobFrame {
        BobFrame {
            pose: self.pose,
            ground: self.ground,
            motion: self.motion,
            balance: self.balance_state,
            brakes: BrakeInputs::released(),
            lean_offset: 0.0,
            yaw_delta: 0.0,
            movement: MoveResult {
                position: self.pose.position,
                translation: Vector::zeros(),
                blocked: false,
            },
        }
    }
}

/// Heading plus ground alignment, without the overturn roll. The rider's lean
/// is read in this frame so a tipped body does not feed its own overturn.
fn rider_frame(position: Point<Real>, orientation: Orientation, ground: &GroundSample) -> BodyPose {
    let (pitch, roll) = alignment_targets(&orientation, ground.normal, 0.0);
    BodyPose::new(
        position,
        Orientation {
            yaw: orientation.yaw,
            pitch,
            roll,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bob_motor::Orientation;
    use rapier3d::prelude::ColliderBuilder;

    const DT: Real = 1.0 / 60.0;

    fn build_scene(world: &mut PhysicsWorld) {
        let floor = ColliderBuilder::cuboid(20.0, 0.1, 20.0)
            .translation(Vector::new(0.0, -0.1, 0.0))
            .build();
        world.insert_ground(floor);
        world.update_queries();
    }

    fn controller_at(y: Real) -> BobController<ManualBrakes, SeatedRider> {
        BobController::builder(ManualBrakes::default())
            .rider(SeatedRider::default())
            .collider(ColliderGeometry::default())
            .pose(BodyPose::new(Point::new(0.0, y, 0.0), Orientation::default()))
            .build()
            .expect("valid controller")
    }

    #[test]
    fn builder_requires_collider() {
        let result = BobControllerBuilder::<ManualBrakes, SeatedRider>::new(ManualBrakes::default())
            .rider(SeatedRider::default())
            .build();
        assert_eq!(result.err(), Some(ControllerError::MissingCollider));
    }

    #[test]
    fn builder_requires_rider() {
        let result = BobControllerBuilder::<ManualBrakes, SeatedRider>::new(ManualBrakes::default())
            .collider(ColliderGeometry::default())
            .build();
        assert_eq!(result.err(), Some(ControllerError::MissingRider));
    }

    #[test]
    fn builder_rejects_degenerate_collider() {
        let result = BobController::builder(ManualBrakes::default())
            .rider(SeatedRider::default())
            .collider(ColliderGeometry {
                radius: 0.0,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(ControllerError::DegenerateCollider(_))));
    }

    #[test]
    fn builder_rejects_bad_tuning() {
        let result = BobController::builder(ManualBrakes::default())
            .rider(SeatedRider::default())
            .collider(ColliderGeometry::default())
            .locomotion(LocomotionConfig {
                drag: -1.0,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));

        let result = BobController::builder(ManualBrakes::default())
            .rider(SeatedRider::default())
            .collider(ColliderGeometry::default())
            .balance(BalanceConfig {
                max_overturn_deg: 120.0,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }

    #[test]
    fn zero_dt_leaves_everything_untouched() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
        build_scene(&mut world);
        let mut controller = controller_at(0.62);
        controller.tick(&world, DT);
        let pose = *controller.pose();
        let motion = *controller.motion();
        let balance = *controller.balance_state();
        let frame = controller.tick(&world, 0.0);
        assert_eq!(frame.pose, pose);
        assert_eq!(*controller.pose(), pose);
        assert_eq!(*controller.motion(), motion);
        assert_eq!(*controller.balance_state(), balance);
    }

    #[test]
    fn rests_on_flat_ground() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
        build_scene(&mut world);
        let mut controller = controller_at(0.62);
        for _ in 0..120 {
            let frame = controller.tick(&world, DT);
            assert!(frame.ground.grounded);
        }
        let pose = controller.pose();
        assert!((pose.position - Point::new(0.0, 0.62, 0.0)).norm() < 1.0e-3);
        assert!(controller.motion().target_velocity.norm() < 1.0e-4);
        assert!(pose.orientation.pitch.abs() < 1.0e-4);
        assert!(pose.orientation.roll.abs() < 1.0e-4);
    }

    #[test]
    fn falls_until_landing() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
        build_scene(&mut world);
        let mut controller = controller_at(3.0);
        let first = controller.tick(&world, DT);
        assert!(!first.ground.grounded);
        assert!(first.motion.vertical_speed < 0.0);
        let mut landed = false;
        for _ in 0..240 {
            if controller.tick(&world, DT).ground.grounded {
                landed = true;
                break;
            }
        }
        assert!(landed);
        assert!(controller.pose().position.y > 0.55);
        assert!(controller.pose().position.y < 3.0);
    }

    #[test]
    fn leaning_rider_tips_the_bob() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
        build_scene(&mut world);
        let mut controller = controller_at(0.62);
        controller.rider_mut().set_lean(1.0);
        let mut last = 0.0;
        for _ in 0..30 {
            let frame = controller.tick(&world, DT);
            assert!(frame.balance.overturn_deg > last);
            last = frame.balance.overturn_deg;
        }

        controller.rider_mut().set_lean(0.0);
        for _ in 0..600 {
            controller.tick(&world, DT);
        }
        assert_eq!(controller.balance_state().overturn_deg, 0.0);
    }

    #[test]
    fn full_overturn_does_not_feed_the_lean() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
        build_scene(&mut world);
        let mut controller = controller_at(0.62);
        controller.rider_mut().set_lean(1.0);
        let mut frame = controller.tick(&world, DT);
        for _ in 0..240 {
            frame = controller.tick(&world, DT);
            assert!(frame.lean_offset.is_finite());
            assert!(frame.lean_offset.abs() <= 2.0 + 1.0e-3);
        }
        assert!((frame.balance.overturn_deg - 90.0).abs() < 1.0e-3);

        controller.rider_mut().set_lean(0.0);
        let frame = controller.tick(&world, DT);
        assert!(frame.lean_offset.abs() < 1.0e-3);
        assert!(frame.balance.overturn_deg < 90.0);
        for _ in 0..120 {
            controller.tick(&world, DT);
        }
        assert_eq!(controller.balance_state().overturn_deg, 0.0);
    }

    #[test]
    fn right_brake_turns_right() {
        let mut world = PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0));
        build_scene(&mut world);
        let mut controller = controller_at(0.62);
        controller.brakes_mut().set_ratios(0.0, 1.0);
        let frame = controller.tick(&world, DT);
        assert!(frame.yaw_delta > 0.0);
        assert!(controller.pose().orientation.yaw > 0.0);
    }
}
