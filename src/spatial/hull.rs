use glam::Vec3;
use smallvec::SmallVec;

use crate::spatial::plane::Plane;
use crate::spatial::BoundingBox;

/// Distance below which a winding point is considered on a clip plane.
const CLIP_EPSILON: f32 = 1e-5;

/// Convex planar winding, used for portal hulls.
///
/// Points are stored counter-clockwise as seen from the front side of the
/// winding plane.
#[derive(Debug, Clone, Default)]
pub struct ConvexHull {
    points: SmallVec<[Vec3; 8]>,
}

impl ConvexHull {
    /// Windings are clipped against many planes during a portal flood; this
    /// bounds the vertex count growth (each clip adds at most one vertex).
    pub const MAX_HULL_VERTS: usize = 32;

    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        debug_assert!(points.len() >= 3 && points.len() <= Self::MAX_HULL_VERTS);
        Self {
            points: SmallVec::from_slice(points),
        }
    }

    #[inline]
    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    /// The winding plane derived from the first non-degenerate corner.
    #[must_use]
    pub fn plane(&self) -> Option<Plane> {
        let n = self.points.len();
        for i in 0..n {
            if let Some(p) = Plane::from_points(
                self.points[i],
                self.points[(i + 1) % n],
                self.points[(i + 2) % n],
            ) {
                return Some(p);
            }
        }
        None
    }

    /// Winding with reversed point order, facing the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self { points }
    }

    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        let mut b = BoundingBox::EMPTY;
        for &p in &self.points {
            b.add_point(p);
        }
        b
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        if self.points.is_empty() {
            return Vec3::ZERO;
        }
        self.points.iter().copied().sum::<Vec3>() / self.points.len() as f32
    }

    /// Sutherland-Hodgman clip against the front half-space of `plane`.
    /// Returns `None` when nothing remains.
    #[must_use]
    pub fn clip_by_plane(&self, plane: &Plane) -> Option<Self> {
        let n = self.points.len();
        if n < 3 {
            return None;
        }

        let mut result: SmallVec<[Vec3; 8]> = SmallVec::new();
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let da = plane.normal.dot(a) + plane.d;
            let db = plane.normal.dot(b) + plane.d;

            if da >= -CLIP_EPSILON {
                result.push(a);
            }
            // Edge crosses the plane: emit the intersection point
            if (da > CLIP_EPSILON && db < -CLIP_EPSILON) || (da < -CLIP_EPSILON && db > CLIP_EPSILON)
            {
                let t = da / (da - db);
                result.push(a + (b - a) * t);
            }
            if result.len() >= Self::MAX_HULL_VERTS {
                break;
            }
        }

        if result.len() < 3 {
            return None;
        }
        Some(Self { points: result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ConvexHull {
        ConvexHull::from_points(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn plane_matches_winding() {
        let p = quad().plane().unwrap();
        assert!((p.normal.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn clip_keeps_front_half() {
        let clipped = quad().clip_by_plane(&Plane::new(Vec3::X, 0.0)).unwrap();
        let b = clipped.bounds();
        assert!(b.min.x >= -1e-4);
        assert!((b.max.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn clip_away_entirely() {
        let clipped = quad().clip_by_plane(&Plane::new(Vec3::X, -2.0));
        assert!(clipped.is_none());
    }

    #[test]
    fn reversed_flips_plane() {
        let p = quad().reversed().plane().unwrap();
        assert!((p.normal.z + 1.0).abs() < 1e-5);
    }
}
