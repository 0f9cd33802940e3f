//! Small vector helpers shared by the bob solvers.

use rapier3d::math::Vector;
use rapier3d::prelude::Real;

pub const EPSILON: Real = 1.0e-6;

pub fn project_on_plane(v: Vector<Real>, normal: Vector<Real>) -> Vector<Real> {
    v - normal * v.dot(&normal)
}

/// Unit vector or `None` for (near) zero-length input.
pub fn try_normalize(v: Vector<Real>) -> Option<Vector<Real>> {
    let len_sq = v.norm_squared();
    if len_sq > EPSILON * EPSILON && len_sq.is_finite() {
        Some(v / len_sq.sqrt())
    } else {
        None
    }
}

pub fn normalize_or_zero(v: Vector<Real>) -> Vector<Real> {
    try_normalize(v).unwrap_or_else(Vector::zeros)
}

/// Moves `current` toward `target` by at most `max_delta`, never overshooting.
pub fn move_towards(current: Real, target: Real, max_delta: Real) -> Real {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + delta.signum() * max_delta
    }
}

/// Point-wise move-towards in vector space (straight line, bounded step).
pub fn move_towards_vector(
    current: Vector<Real>,
    target: Vector<Real>,
    max_delta: Real,
) -> Vector<Real> {
    let delta = target - current;
    let dist = delta.norm();
    if dist <= max_delta || dist <= EPSILON {
        target
    } else {
        current + delta / dist * max_delta
    }
}

/// Unsigned angle between two vectors in degrees; 0 when either is zero.
pub fn angle_deg(a: Vector<Real>, b: Vector<Real>) -> Real {
    match (try_normalize(a), try_normalize(b)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos().to_degrees(),
        _ => 0.0,
    }
}

/// `signum` that maps zero to +1.
pub fn sign_or_positive(value: Real) -> Real {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}
