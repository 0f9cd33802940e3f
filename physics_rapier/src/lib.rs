//! Rapier world setup and surface classification for bob queries.
#![forbid(unsafe_code)]

use rapier3d::prelude::*;

/// Membership group carried by colliders the bob can ride on.
pub const GROUND_GROUP: Group = Group::GROUP_1;
/// Membership group for everything else (walls, props, the rider's own parts).
pub const OBSTACLE_GROUP: Group = Group::GROUP_2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceClass {
    Ground,
    Obstacle,
}

impl SurfaceClass {
    pub fn membership(self) -> Group {
        match self {
            SurfaceClass::Ground => GROUND_GROUP,
            SurfaceClass::Obstacle => OBSTACLE_GROUP,
        }
    }

    /// Groups assigned to a collider of this class.
    pub fn collider_groups(self) -> InteractionGroups {
        InteractionGroups::new(self.membership(), Group::ALL)
    }

    /// Query filter that only reports colliders of this class.
    pub fn query_filter(self) -> QueryFilter<'static> {
        QueryFilter::default().groups(InteractionGroups::new(Group::ALL, self.membership()))
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn query_pipeline(&self) -> &QueryPipeline {
        &self.query_pipeline
    }

    /// World up derived from gravity; +Y when gravity is zero.
    pub fn up(&self) -> Vector<Real> {
        if self.gravity.norm_squared() > 1.0e-6 {
            -self.gravity.normalize()
        } else {
            Vector::y()
        }
    }

    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &physics_hooks,
            &event_handler,
        );
        self.query_pipeline.update(&self.colliders);
    }

    /// Refreshes the query acceleration structure without advancing time.
    pub fn update_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    pub fn insert_surface(&mut self, collider: Collider, class: SurfaceClass) -> ColliderHandle {
        let mut collider = collider;
        collider.set_collision_groups(class.collider_groups());
        self.colliders.insert(collider)
    }

    pub fn insert_ground(&mut self, collider: Collider) -> ColliderHandle {
        self.insert_surface(collider, SurfaceClass::Ground)
    }

    pub fn insert_obstacle(&mut self, collider: Collider) -> ColliderHandle {
        self.insert_surface(collider, SurfaceClass::Obstacle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_floor(world: &mut PhysicsWorld) {
        let floor = ColliderBuilder::cuboid(5.0, 0.1, 5.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_ground(floor);
    }

    #[test]
    fn ground_filter_skips_obstacles() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let wall = ColliderBuilder::cuboid(5.0, 0.1, 5.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_obstacle(wall);
        world.update_queries();

        let ray = Ray::new(point![0.0, 1.0, 0.0], vector![0.0, -1.0, 0.0]);
        let ground_hit = world.query_pipeline().cast_ray(
            world.bodies(),
            world.colliders(),
            &ray,
            10.0,
            true,
            SurfaceClass::Ground.query_filter(),
        );
        let obstacle_hit = world.query_pipeline().cast_ray(
            world.bodies(),
            world.colliders(),
            &ray,
            10.0,
            true,
            SurfaceClass::Obstacle.query_filter(),
        );
        assert!(ground_hit.is_none());
        assert!(obstacle_hit.is_some());
    }

    #[test]
    fn ground_filter_reports_floor() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        world.step(1.0 / 60.0);

        let ray = Ray::new(point![0.0, 1.0, 0.0], vector![0.0, -1.0, 0.0]);
        let hit = world.query_pipeline().cast_ray_and_get_normal(
            world.bodies(),
            world.colliders(),
            &ray,
            10.0,
            true,
            SurfaceClass::Ground.query_filter(),
        );
        let (_, hit) = hit.expect("floor hit");
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn up_follows_gravity() {
        let world = PhysicsWorld::new(vector![0.0, 0.0, 0.0]);
        assert_eq!(world.up(), Vector::y());
        let world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        assert!((world.up() - Vector::y()).norm() < 1.0e-6);
    }
}
