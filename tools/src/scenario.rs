//! Headless bob scenarios on small Rapier scenes.

use bob_config::RuntimeTuning;
use bob_controller::{BobController, BobFrame, ControllerError, ManualBrakes, SeatedRider};
use bob_motor::{BodyPose, Orientation};
use clap::ValueEnum;
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::{ColliderBuilder, Real};

const SLOPE_DEG: Real = 10.0;
/// Sideways head offset used by the lean scenario, meters.
const LEAN_OFFSET: Real = 1.0;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    Flat,
    Slope,
    Airborne,
    Lean,
}

impl Scenario {
    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Flat => "flat",
            Scenario::Slope => "slope",
            Scenario::Airborne => "airborne",
            Scenario::Lean => "lean",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ScenarioReport {
    pub ticks: u32,
    pub grounded_ticks: u32,
    pub blocked_ticks: u32,
    pub max_overturn_deg: Real,
    pub start: BodyPose,
    pub last: BobFrame,
}

impl ScenarioReport {
    pub fn distance(&self) -> Real {
        (self.last.pose.position - self.start.position).norm()
    }
}

fn build_world(scenario: Scenario, gravity: Vector<Real>) -> (PhysicsWorld, BodyPose) {
    let mut world = PhysicsWorld::new(gravity);
    let start = match scenario {
        Scenario::Flat | Scenario::Lean => {
            insert_floor(&mut world);
            BodyPose::new(Point::new(0.0, 0.62, 0.0), Orientation::default())
        }
        Scenario::Airborne => {
            insert_floor(&mut world);
            BodyPose::new(Point::new(0.0, 5.0, 0.0), Orientation::default())
        }
        Scenario::Slope => {
            // Descends toward +Z; the bob faces downhill.
            let tilt = SLOPE_DEG.to_radians();
            let slope = ColliderBuilder::cuboid(10.0, 0.1, 60.0)
                .rotation(Vector::new(tilt, 0.0, 0.0))
                .translation(Vector::new(0.0, -0.1, 0.0))
                .build();
            world.insert_ground(slope);
            let z = -20.0;
            let surface = -tilt.tan() * z;
            BodyPose::new(
                Point::new(0.0, surface + 0.62 / tilt.cos(), z),
                Orientation::from_yaw(std::f32::consts::PI),
            )
        }
    };
    world.update_queries();
    (world, start)
}

fn insert_floor(world: &mut PhysicsWorld) {
    let floor = ColliderBuilder::cuboid(50.0, 0.1, 50.0)
        .translation(Vector::new(0.0, -0.1, 0.0))
        .build();
    world.insert_ground(floor);
}

pub fn run(
    scenario: Scenario,
    tuning: &RuntimeTuning,
    brakes: (Real, Real),
    ticks: u32,
    dt: Real,
) -> Result<ScenarioReport, ControllerError> {
    let (mut world, start) = build_world(scenario, tuning.locomotion.gravity);
    let mut manual = ManualBrakes::default();
    manual.set_ratios(brakes.0, brakes.1);
    let mut rider = tuning.rider;
    if scenario == Scenario::Lean {
        rider.set_lean(LEAN_OFFSET);
    }
    let mut controller = BobController::<ManualBrakes, SeatedRider>::builder(manual)
        .rider(rider)
        .collider(tuning.collider)
        .locomotion(tuning.locomotion)
        .balance(tuning.balance)
        .pose(start)
        .build()?;

    tracing::info!(scenario = scenario.as_str(), ticks, dt, "scenario start");
    let mut last = controller.tick(&world, 0.0);
    let mut grounded_ticks = 0;
    let mut blocked_ticks = 0;
    let mut max_overturn_deg: Real = 0.0;
    for tick in 0..ticks {
        last = controller.tick(&world, dt);
        world.step(dt);
        if last.ground.grounded {
            grounded_ticks += 1;
        }
        if last.movement.blocked {
            blocked_ticks += 1;
        }
        max_overturn_deg = max_overturn_deg.max(last.balance.overturn_deg.abs());
        tracing::debug!(
            tick,
            x = last.pose.position.x,
            y = last.pose.position.y,
            z = last.pose.position.z,
            speed = last.motion.target_velocity.norm(),
            overturn_deg = last.balance.overturn_deg,
            "tick"
        );
    }
    Ok(ScenarioReport {
        ticks,
        grounded_ticks,
        blocked_ticks,
        max_overturn_deg,
        start,
        last,
    })
}
