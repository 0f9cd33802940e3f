//! Bob balance solver (ground alignment plus overturn roll).
#![forbid(unsafe_code)]

use std::f32::consts::PI;

use bob_motor::math::{angle_deg, move_towards, project_on_plane, try_normalize, EPSILON};
use bob_motor::{GroundSample, MotionState, Orientation};
use rapier3d::math::{Point, Rotation, UnitVector, Vector};
use rapier3d::prelude::Real;
use serde::Deserialize;

/// Lateral speed (m/s) below which the bob counts as not sliding sideways.
pub const STANDSTILL_SPEED: Real = 1.0e-3;

/// Floor for the tilt stretch in `lateral_lean` (cos 60 deg).
const MIN_TILT_COS: Real = 0.5;

/// How the overturn angle evolves while grounded.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// Follow the ground only; any overturn decays away.
    GroundAlign,
    /// Tip once the rider's lean leaves the support base against the slide.
    #[default]
    #[serde(alias = "lean")]
    LeanOverturn,
    /// Force model combining lean, sideways skid and side slope.
    #[serde(alias = "speed_slope")]
    SpeedSlopeOverturn,
}

impl BalanceStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceStrategy::GroundAlign => "ground_align",
            BalanceStrategy::LeanOverturn => "lean_overturn",
            BalanceStrategy::SpeedSlopeOverturn => "speed_slope_overturn",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceConfig {
    pub strategy: BalanceStrategy,
    /// Lateral half-width of the ground contact in meters.
    pub support_radius: Real,
    /// Pitch/roll slew rate toward the ground-aligned target, degrees/sec.
    pub align_speed_deg: Real,
    /// Overturn saturation in degrees (<= 90).
    pub max_overturn_deg: Real,
    /// Lean strategy: overturn growth rate, degrees/sec.
    pub tip_speed_deg: Real,
    /// Decay rate back to upright, degrees/sec.
    pub recovery_speed_deg: Real,
    /// Force strategy: weight of the center-of-mass lever arm.
    pub mass_factor: Real,
    /// Force strategy: sideways-skid force at standstill.
    pub skid_gain: Real,
    /// Force strategy: side-slope force at a vertical wall.
    pub slope_gain: Real,
    /// Force strategy: degrees/sec of overturn per unit force.
    pub force_scale: Real,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            strategy: BalanceStrategy::default(),
            support_radius: 0.5,
            align_speed_deg: 120.0,
            max_overturn_deg: 90.0,
            tip_speed_deg: 45.0,
            recovery_speed_deg: 90.0,
            mass_factor: 1.0,
            skid_gain: 0.75,
            slope_gain: 0.75,
            force_scale: 20.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BalanceState {
    /// Extra roll in degrees; positive tips the body to its right.
    pub overturn_deg: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct BalanceContext {
    pub ground: GroundSample,
    pub motion: MotionState,
    /// Center-of-mass proxy in world space (e.g. the rider's head).
    pub center_of_mass: Point<Real>,
    /// Bottom of the body along its up axis.
    pub base_point: Point<Real>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BalanceOutput {
    pub state: BalanceState,
    pub orientation: Orientation,
    /// Signed lateral lean (meters, positive toward the right).
    pub lean_offset: Real,
}

#[derive(Clone, Debug)]
pub struct BalanceSolver {
    config: BalanceConfig,
}

impl BalanceSolver {
    pub fn new(config: BalanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> BalanceConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut BalanceConfig {
        &mut self.config
    }

    pub fn step(
        &self,
        state: BalanceState,
        orientation: Orientation,
        ctx: &BalanceContext,
        dt: Real,
    ) -> BalanceOutput {
        let lean_offset = lateral_lean(&orientation, ctx.center_of_mass, ctx.base_point);
        if !ctx.ground.grounded || !(dt > 0.0) || !dt.is_finite() {
            return BalanceOutput {
                state,
                orientation,
                lean_offset,
            };
        }
        let ground = ctx.ground.sanitized();
        let overturn_deg = self.next_overturn(
            state.overturn_deg,
            &orientation,
            &ground,
            ctx,
            lean_offset,
            dt,
        );
        let (target_pitch, target_roll) =
            alignment_targets(&orientation, ground.normal, overturn_deg);
        let max_step = self.config.align_speed_deg.max(0.0).to_radians() * dt;
        let next_orientation = Orientation {
            yaw: orientation.yaw,
            pitch: move_towards_angle(orientation.pitch, target_pitch, max_step),
            roll: move_towards_angle(orientation.roll, target_roll, max_step),
        };
        tracing::trace!(
            strategy = self.config.strategy.as_str(),
            lean_offset,
            overturn_deg,
            target_pitch = target_pitch.to_degrees(),
            target_roll = target_roll.to_degrees(),
            "balance step"
        );
        BalanceOutput {
            state: BalanceState { overturn_deg },
            orientation: next_orientation,
            lean_offset,
        }
    }

    fn next_overturn(
        &self,
        overturn: Real,
        orientation: &Orientation,
        ground: &GroundSample,
        ctx: &BalanceContext,
        lean: Real,
        dt: Real,
    ) -> Real {
        let config = &self.config;
        let max = config.max_overturn_deg.clamp(0.0, 90.0);
        let recovery = config.recovery_speed_deg.max(0.0) * dt;
        let next = match config.strategy {
            BalanceStrategy::GroundAlign => move_towards(overturn, 0.0, recovery),
            BalanceStrategy::LeanOverturn => {
                let lateral_speed = ctx.motion.target_velocity.dot(&orientation.heading_right());
                match lean_tip_target(lean, lateral_speed, config.support_radius, max) {
                    Some(target) => {
                        move_towards(overturn, target, config.tip_speed_deg.max(0.0) * dt)
                    }
                    None => move_towards(overturn, 0.0, recovery),
                }
            }
            BalanceStrategy::SpeedSlopeOverturn => {
                let forces =
                    OverturnForces::measure(config, orientation, ground, &ctx.motion, lean);
                let total = forces.total(overturn);
                if total != 0.0 {
                    tracing::debug!(
                        right = forces.right,
                        left = forces.left,
                        external = forces.external,
                        total,
                        "overturn force"
                    );
                }
                integrate_force(overturn, total * config.force_scale * dt)
            }
        };
        next.clamp(-max, max)
    }
}

/// Forces acting on the overturn angle; positive pushes toward a right tip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverturnForces {
    /// Positive once the lean passes the right edge of the support base.
    pub right: Real,
    /// Negative once the lean passes the left edge of the support base.
    pub left: Real,
    /// Skid plus side-slope contribution.
    pub external: Real,
}

impl OverturnForces {
    pub fn measure(
        config: &BalanceConfig,
        orientation: &Orientation,
        ground: &GroundSample,
        motion: &MotionState,
        lean: Real,
    ) -> Self {
        let radius = config.support_radius.max(0.0);
        let mass = config.mass_factor;
        let right_h = orientation.heading_right();

        let mut external = 0.0;
        let velocity = motion.target_velocity;
        let velocity_h = horizontal(velocity);
        if try_normalize(velocity_h).is_some() {
            let max = config.skid_gain / (1.0 + velocity.norm());
            external += max * (1.0 - angle_deg(velocity_h, right_h) / 90.0);
        }
        let normal_h = horizontal(ground.normal);
        let slope = normal_h.norm();
        if slope > EPSILON {
            let max = config.slope_gain * slope;
            external += max * (1.0 - angle_deg(right_h, normal_h) / 90.0);
        }

        Self {
            right: mass * (lean - radius),
            left: mass * (lean + radius),
            external,
        }
    }

    /// Net force given the current overturn; zero while fully stable.
    pub fn total(&self, overturn: Real) -> Real {
        let external = if self.external.abs() <= EPSILON {
            0.0
        } else {
            self.external
        };
        let inside_base = self.right <= 0.0 && self.left >= 0.0;
        if overturn == 0.0 && external == 0.0 && inside_base {
            return 0.0;
        }
        if external == 0.0 {
            if overturn > 0.0 {
                self.right
            } else if overturn < 0.0 {
                self.left
            } else if self.right > 0.0 {
                self.right
            } else {
                self.left
            }
        } else if overturn > 0.0 {
            external + self.right
        } else if overturn < 0.0 {
            external + self.left
        } else if external > 0.0 {
            (external + self.right).max(0.0)
        } else {
            (external + self.left).min(0.0)
        }
    }
}

/// Overturn target for the lean strategy, `None` while the bob should recover.
///
/// Tipping needs the lean outside the support base on the side away from the
/// lateral motion and heads toward the motion side. Below `STANDSTILL_SPEED`
/// there is no motion side and the lean side is used instead.
pub fn lean_tip_target(
    lean: Real,
    lateral_speed: Real,
    support_radius: Real,
    max_overturn_deg: Real,
) -> Option<Real> {
    if !(lean.abs() > support_radius) {
        return None;
    }
    if !(lateral_speed.abs() > STANDSTILL_SPEED) {
        return Some(lean.signum() * max_overturn_deg);
    }
    if lean.signum() == lateral_speed.signum() {
        return None;
    }
    Some(lateral_speed.signum() * max_overturn_deg)
}

/// Adds `delta`; a delta opposing the current overturn may bring it to zero but never past.
fn integrate_force(overturn: Real, delta: Real) -> Real {
    if overturn == 0.0 || overturn * delta > 0.0 {
        overturn + delta
    } else if overturn > 0.0 {
        (overturn + delta).max(0.0)
    } else {
        (overturn + delta).min(0.0)
    }
}

/// Signed lateral distance of the center of mass from the base, as seen from above.
///
/// Measured along the heading right axis and stretched by `1 / |cos tilt|` so a
/// tipped body reads the lean along its own right axis. The stretch is capped
/// at `1 / MIN_TILT_COS`.
pub fn lateral_lean(
    orientation: &Orientation,
    center_of_mass: Point<Real>,
    base: Point<Real>,
) -> Real {
    let world_up = Vector::y();
    let fall = project_on_plane(center_of_mass - base, world_up);
    let lean = fall.dot(&orientation.heading_right());
    let cos = orientation.up().dot(&world_up).abs();
    lean / cos.max(MIN_TILT_COS)
}

/// Pitch/roll that put the body up axis on `normal` rotated about the ground
/// forward axis by `overturn_deg`.
pub fn alignment_targets(
    orientation: &Orientation,
    normal: Vector<Real>,
    overturn_deg: Real,
) -> (Real, Real) {
    let local = orientation.yaw_rotation().inverse() * normal;
    let biased = if overturn_deg != 0.0 {
        let forward = try_normalize(project_on_plane(-Vector::z(), local)).unwrap_or(-Vector::z());
        let axis = UnitVector::new_unchecked(forward);
        Rotation::from_axis_angle(&axis, overturn_deg.to_radians()) * local
    } else {
        local
    };
    let pitch = biased.z.atan2(biased.y);
    let roll = (-biased.x).clamp(-1.0, 1.0).asin();
    (pitch, roll)
}

fn horizontal(v: Vector<Real>) -> Vector<Real> {
    Vector::new(v.x, 0.0, v.z)
}

fn wrap_angle(angle: Real) -> Real {
    let mut wrapped = (angle + PI) % (2.0 * PI);
    if wrapped < 0.0 {
        wrapped += 2.0 * PI;
    }
    wrapped - PI
}

fn move_towards_angle(current: Real, target: Real, max_delta: Real) -> Real {
    let delta = wrap_angle(target - current);
    if delta.abs() <= max_delta {
        current + delta
    } else {
        current + delta.signum() * max_delta
    }
}
