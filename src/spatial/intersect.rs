//! Ray intersection helpers shared by the AABB tree and gameplay raycasts.

use glam::Vec3;

use crate::spatial::BoundingBox;

/// Slab test of a ray against an AABB.
///
/// `inv_dir` is the component-wise reciprocal of the ray direction;
/// divisions by a zero component produce infinities that the min/max logic
/// handles. On hit returns `(t_min, t_max)` along the ray.
#[inline]
#[must_use]
pub fn ray_intersect_box(origin: Vec3, inv_dir: Vec3, bounds: &BoundingBox) -> Option<(f32, f32)> {
    let t0 = (bounds.min - origin) * inv_dir;
    let t1 = (bounds.max - origin) * inv_dir;

    let t_small = t0.min(t1);
    let t_big = t0.max(t1);

    let t_min = t_small.max_element().max(0.0);
    let t_max = t_big.min_element();

    if t_min <= t_max {
        Some((t_min, t_max))
    } else {
        None
    }
}

/// Moller-Trumbore ray/triangle intersection.
///
/// Returns `(distance, u, v)` with `u`/`v` the barycentric coordinates of the
/// hit relative to `v1`/`v2`. Backfaces are reported too; callers that need
/// single-sided hits check the triangle normal.
#[must_use]
pub fn ray_intersect_triangle(
    origin: Vec3,
    dir: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<(f32, f32, f32)> {
    const EPSILON: f32 = 1e-7;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = dir.cross(edge2);
    let det = edge1.dot(h);

    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(h) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    if t > EPSILON {
        Some((t, u, v))
    } else {
        None
    }
}
