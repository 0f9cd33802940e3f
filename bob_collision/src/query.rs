//! Spatial query seam between the bob and whatever world answers it.

use bob_motor::math::try_normalize;
use physics_rapier::{PhysicsWorld, SurfaceClass};
use rapier3d::math::{Isometry, Point, Vector};
use rapier3d::prelude::{Ball, Ray, Real};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub distance: Real,
}

/// Read-only world queries filtered by surface class.
pub trait SpatialQuery {
    /// Number of `class` colliders intersecting the sphere.
    fn overlap_sphere(&self, center: Point<Real>, radius: Real, class: SurfaceClass) -> usize;

    /// Closest `class` hit along `direction` within `max_distance`.
    fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        class: SurfaceClass,
    ) -> Option<RayHit>;
}

impl SpatialQuery for PhysicsWorld {
    fn overlap_sphere(&self, center: Point<Real>, radius: Real, class: SurfaceClass) -> usize {
        if !(radius > 0.0) || !radius.is_finite() || !center.coords.iter().all(|c| c.is_finite()) {
            return 0;
        }
        let ball = Ball::new(radius);
        let position = Isometry::translation(center.x, center.y, center.z);
        let mut hits = 0;
        self.query_pipeline().intersections_with_shape(
            self.bodies(),
            self.colliders(),
            &position,
            &ball,
            class.query_filter(),
            |_| {
                hits += 1;
                true
            },
        );
        hits
    }

    fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        class: SurfaceClass,
    ) -> Option<RayHit> {
        if !(max_distance > 0.0) || !max_distance.is_finite() {
            return None;
        }
        let direction = try_normalize(direction)?;
        let ray = Ray::new(origin, direction);
        let (_, hit) = self
            .query_pipeline()
            .cast_ray_and_get_normal(
                self.bodies(),
                self.colliders(),
                &ray,
                max_distance,
                true,
                class.query_filter(),
            )
            .or_else(|| {
                self.query_pipeline().cast_ray_and_get_normal(
                    self.bodies(),
                    self.colliders(),
                    &ray,
                    max_distance,
                    false,
                    class.query_filter(),
                )
            })?;
        Some(RayHit {
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            distance: hit.time_of_impact,
        })
    }
}
