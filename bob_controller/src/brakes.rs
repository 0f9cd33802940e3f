//! Brake ratio sources: direct input, lever raycasts and hand-grabbed levers.

use bob_collision::{measure_lever, BrakeLever, SpatialQuery};
use bob_motor::math::move_towards;
use bob_motor::{clamp_ratio, BodyPose, BrakeInputs};
use rapier3d::prelude::Real;

pub trait BrakeSource {
    fn sample(&mut self, query: &dyn SpatialQuery, pose: &BodyPose, dt: Real) -> BrakeInputs;
}

/// Button-style brakes: each side ramps toward its held target, fully pulled
/// while pressed and released otherwise.
#[derive(Clone, Copy, Debug)]
pub struct ManualBrakes {
    /// Ratio change per second.
    pub ramp_rate: Real,
    target: BrakeInputs,
    current: BrakeInputs,
}

impl Default for ManualBrakes {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl ManualBrakes {
    pub fn new(ramp_rate: Real) -> Self {
        Self {
            ramp_rate,
            target: BrakeInputs::released(),
            current: BrakeInputs::released(),
        }
    }

    pub fn set_pressed(&mut self, left: bool, right: bool) {
        let held = |pressed: bool| if pressed { 1.0 } else { 0.0 };
        self.target = BrakeInputs::new(held(left), held(right));
    }

    /// Jumps straight to the given ratios, bypassing the ramp, and holds them
    /// until the next `set_pressed` or `set_ratios`.
    pub fn set_ratios(&mut self, left: Real, right: Real) {
        self.current = BrakeInputs::new(left, right);
        self.target = self.current;
    }

    pub fn current(&self) -> BrakeInputs {
        self.current
    }
}

impl BrakeSource for ManualBrakes {
    fn sample(&mut self, _query: &dyn SpatialQuery, _pose: &BodyPose, dt: Real) -> BrakeInputs {
        if dt > 0.0 && dt.is_finite() {
            let step = self.ramp_rate.max(0.0) * dt;
            self.current = BrakeInputs::new(
                move_towards(self.current.left, self.target.left, step),
                move_towards(self.current.right, self.target.right, step),
            );
        }
        self.current
    }
}

/// Physical levers whose blades dig into the ground; the ratio is how deep
/// each blade reaches.
#[derive(Clone, Copy, Debug)]
pub struct LeverBrakes {
    pub left: BrakeLever,
    pub right: BrakeLever,
    /// Current hinge angles in radians, 0 at rest.
    angles: [Real; 2],
}

impl LeverBrakes {
    pub fn new(left: BrakeLever, right: BrakeLever) -> Self {
        Self {
            left,
            right,
            angles: [0.0; 2],
        }
    }

    pub fn set_angles(&mut self, left: Real, right: Real) {
        self.angles = [left, right];
    }

    pub fn angles(&self) -> [Real; 2] {
        self.angles
    }
}

impl BrakeSource for LeverBrakes {
    fn sample(&mut self, query: &dyn SpatialQuery, pose: &BodyPose, _dt: Real) -> BrakeInputs {
        let left = measure_lever(query, pose, &self.left.pulled(self.angles[0]));
        let right = measure_lever(query, pose, &self.right.pulled(self.angles[1]));
        BrakeInputs::new(left, right)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    DirectGrab,
    RemoteGrab,
    Press,
}

/// Kinds of VR interactors that can touch a lever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractorKind {
    Direct,
    Ray,
    Poke,
}

impl InteractorKind {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            InteractorKind::Direct => &[Capability::DirectGrab, Capability::Press],
            InteractorKind::Ray => &[Capability::RemoteGrab],
            InteractorKind::Poke => &[Capability::Press],
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeverSide {
    Left,
    Right,
}

/// Lever driven by the angle of the hand holding it (degrees).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrabbedLever {
    pub min_angle_deg: Real,
    pub max_angle_deg: Real,
    angle_deg: Real,
    /// Hand angle minus lever angle captured on grab.
    grab_offset: Option<Real>,
}

impl Default for GrabbedLever {
    fn default() -> Self {
        Self::new(0.0, 90.0)
    }
}

impl GrabbedLever {
    pub fn new(min_angle_deg: Real, max_angle_deg: Real) -> Self {
        Self {
            min_angle_deg,
            max_angle_deg,
            angle_deg: min_angle_deg,
            grab_offset: None,
        }
    }

    pub fn angle_deg(&self) -> Real {
        self.angle_deg
    }

    pub fn is_held(&self) -> bool {
        self.grab_offset.is_some()
    }

    /// Returns false (and ignores the grab) unless the interactor can grab directly.
    pub fn grab(&mut self, kind: InteractorKind, hand_angle_deg: Real) -> bool {
        if !kind.supports(Capability::DirectGrab) || !hand_angle_deg.is_finite() {
            return false;
        }
        self.grab_offset = Some(hand_angle_deg - self.angle_deg);
        true
    }

    pub fn release(&mut self) {
        self.grab_offset = None;
    }

    pub fn update(&mut self, hand_angle_deg: Real) {
        let Some(offset) = self.grab_offset else {
            return;
        };
        if !hand_angle_deg.is_finite() {
            return;
        }
        let clamped =
            hand_angle_deg.clamp(offset + self.min_angle_deg, offset + self.max_angle_deg);
        self.angle_deg = clamped - offset;
    }

    pub fn ratio(&self) -> Real {
        let range = self.max_angle_deg - self.min_angle_deg;
        if !(range > 0.0) {
            return 0.0;
        }
        clamp_ratio((self.angle_deg - self.min_angle_deg) / range)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GrabbedLevers {
    pub left: GrabbedLever,
    pub right: GrabbedLever,
}

impl GrabbedLevers {
    pub fn new(left: GrabbedLever, right: GrabbedLever) -> Self {
        Self { left, right }
    }

    pub fn lever_mut(&mut self, side: LeverSide) -> &mut GrabbedLever {
        match side {
            LeverSide::Left => &mut self.left,
            LeverSide::Right => &mut self.right,
        }
    }
}

impl BrakeSource for GrabbedLevers {
    fn sample(&mut self, _query: &dyn SpatialQuery, _pose: &BodyPose, _dt: Real) -> BrakeInputs {
        BrakeInputs::new(self.left.ratio(), self.right.ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bob_motor::Orientation;
    use physics_rapier::PhysicsWorld;
    use rapier3d::math::{Isometry, Point, Vector};

    fn empty_world() -> PhysicsWorld {
        PhysicsWorld::new(Vector::new(0.0, -9.81, 0.0))
    }

    fn pose() -> BodyPose {
        BodyPose::new(Point::origin(), Orientation::default())
    }

    #[test]
    fn manual_brakes_ramp_both_ways() {
        let world = empty_world();
        let mut brakes = ManualBrakes::new(2.0);
        brakes.set_pressed(true, false);
        let first = brakes.sample(&world, &pose(), 0.25);
        assert!((first.left - 0.5).abs() < 1.0e-6);
        assert_eq!(first.right, 0.0);
        let full = brakes.sample(&world, &pose(), 1.0);
        assert_eq!(full.left, 1.0);

        brakes.set_pressed(false, false);
        let released = brakes.sample(&world, &pose(), 1.0);
        assert_eq!(released.left, 0.0);
    }

    #[test]
    fn manual_brakes_hold_on_zero_dt() {
        let world = empty_world();
        let mut brakes = ManualBrakes::default();
        brakes.set_ratios(0.3, 0.6);
        brakes.set_pressed(false, false);
        let sample = brakes.sample(&world, &pose(), 0.0);
        assert_eq!(sample, BrakeInputs::new(0.3, 0.6));
    }

    #[test]
    fn manual_brakes_hold_partial_ratios() {
        let world = empty_world();
        let mut brakes = ManualBrakes::default();
        brakes.set_ratios(0.5, 0.25);
        for _ in 0..120 {
            let sample = brakes.sample(&world, &pose(), 1.0 / 60.0);
            assert_eq!(sample, BrakeInputs::new(0.5, 0.25));
        }

        brakes.set_pressed(false, true);
        let sample = brakes.sample(&world, &pose(), 0.25);
        assert_eq!(sample, BrakeInputs::new(0.0, 1.0));
    }

    #[test]
    fn lever_brakes_read_zero_without_ground() {
        let world = empty_world();
        let lever = BrakeLever::new(Isometry::identity(), 0.5);
        let mut brakes = LeverBrakes::new(lever, lever);
        brakes.set_angles(1.0, 1.0);
        assert_eq!(brakes.sample(&world, &pose(), 1.0 / 60.0), BrakeInputs::released());
    }

    #[test]
    fn only_direct_interactors_grab() {
        let mut lever = GrabbedLever::default();
        assert!(!lever.grab(InteractorKind::Ray, 10.0));
        assert!(!lever.grab(InteractorKind::Poke, 10.0));
        assert!(!lever.is_held());
        assert!(lever.grab(InteractorKind::Direct, 10.0));
        assert!(lever.is_held());
    }

    #[test]
    fn grabbed_angle_is_clamped_to_range() {
        let mut lever = GrabbedLever::new(0.0, 90.0);
        assert!(lever.grab(InteractorKind::Direct, 30.0));
        lever.update(75.0);
        assert!((lever.angle_deg() - 45.0).abs() < 1.0e-5);
        assert!((lever.ratio() - 0.5).abs() < 1.0e-5);
        lever.update(500.0);
        assert_eq!(lever.angle_deg(), 90.0);
        assert_eq!(lever.ratio(), 1.0);
        lever.update(-500.0);
        assert_eq!(lever.angle_deg(), 0.0);
    }

    #[test]
    fn released_lever_ignores_hand() {
        let mut lever = GrabbedLever::default();
        lever.grab(InteractorKind::Direct, 0.0);
        lever.update(45.0);
        lever.release();
        lever.update(0.0);
        assert!((lever.ratio() - 0.5).abs() < 1.0e-5);
    }

    #[test]
    fn grabbed_levers_feed_brake_inputs() {
        let world = empty_world();
        let mut levers = GrabbedLevers::default();
        let right = levers.lever_mut(LeverSide::Right);
        right.grab(InteractorKind::Direct, 0.0);
        right.update(90.0);
        let sample = levers.sample(&world, &pose(), 1.0 / 60.0);
        assert_eq!(sample, BrakeInputs::new(0.0, 1.0));
    }
}
