use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};
use smallvec::SmallVec;

use crate::spatial::hull::ConvexHull;
use crate::spatial::plane::{Plane, PlaneSide};
use crate::spatial::BoundingBox;

/// Largest number of planes a portal-clipped frustum can carry: one plane per
/// clipped winding edge plus the portal plane itself.
pub const MAX_FRUSTUM_PLANES: usize = ConvexHull::MAX_HULL_VERTS + 1;

/// View frustum as a set of inward-facing planes.
///
/// A camera frustum has six planes in the order left, right, bottom, top,
/// near, far; the far plane of an infinite reverse-Z projection degenerates
/// to zero and is skipped by all tests. A portal-clipped frustum rebuilt from
/// the view origin and a clipped winding can carry more planes.
#[derive(Debug, Clone, Default)]
pub struct Frustum {
    planes: SmallVec<[Plane; 6]>,
}

impl Frustum {
    /// Extracts frustum planes from a view-projection matrix using the
    /// Gribb-Hartmann method. With a reverse-Z projection the near plane
    /// corresponds to NDC `z = 1` and the far plane of an infinite
    /// projection comes out degenerate; degenerate planes are dropped.
    #[must_use]
    pub fn from_view_projection(m: &Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let raw: [Vec4; 6] = [
            rows[3] + rows[0], // left
            rows[3] - rows[0], // right
            rows[3] + rows[1], // bottom
            rows[3] - rows[1], // top
            rows[3] - rows[2], // near (reverse-Z)
            rows[3] + rows[2], // far
        ];

        let mut planes = SmallVec::new();
        for p in raw {
            let normal = p.xyz();
            let length = normal.length();
            if length > 1e-6 {
                planes.push(Plane::new(normal / length, p.w / length));
            }
        }
        Self { planes }
    }

    /// Builds a frustum from a set of inward-facing planes.
    #[must_use]
    pub fn from_planes(planes: &[Plane]) -> Self {
        Self {
            planes: SmallVec::from_slice(planes),
        }
    }

    /// Rebuilds a frustum from the view origin and a (portal) winding: one
    /// plane per winding edge through the apex, plus the portal plane so the
    /// flood cannot look back through the portal it entered.
    ///
    /// The winding must be oriented so its plane normal faces the viewer.
    #[must_use]
    pub fn from_apex_winding(origin: Vec3, winding: &ConvexHull, portal_plane: Plane) -> Self {
        let mut planes: SmallVec<[Plane; 6]> = SmallVec::new();
        let verts = winding.points();
        let n = verts.len();
        for i in 0..n {
            let a = verts[i];
            let b = verts[(i + 1) % n];
            // Edge plane through the apex; winding is CCW toward the viewer,
            // so (b - a) x (origin - a) faces inward.
            if let Some(plane) = Plane::from_points(origin, b, a) {
                planes.push(plane);
            }
        }
        planes.push(portal_plane.flipped());
        Self { planes }
    }

    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Bitmask with one bit set per plane; used as the initial cull-bits of
    /// a BSP walk.
    #[inline]
    #[must_use]
    pub fn all_plane_bits(&self) -> u32 {
        match self.planes.len() {
            0 => 0,
            1..=31 => (1u32 << self.planes.len()) - 1,
            _ => u32::MAX,
        }
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        for plane in &self.planes {
            if plane.distance(center) < -radius {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        for plane in &self.planes {
            if plane.distance(bounds.farthest_corner(plane.normal)) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Tests a box against the planes selected by `cull_bits`.
    ///
    /// Returns `None` when the box is fully behind some plane, otherwise the
    /// reduced bitmask: a plane the box is fully in front of is elided from
    /// the children of a BSP walk.
    #[must_use]
    pub fn cull_box_bits(&self, bounds: &BoundingBox, cull_bits: u32) -> Option<u32> {
        let mut bits = cull_bits;
        for (i, plane) in self.planes.iter().enumerate() {
            if i >= 32 {
                break;
            }
            let bit = 1u32 << i;
            if bits & bit == 0 {
                continue;
            }
            match plane.side_of_box(bounds) {
                PlaneSide::Back => return None,
                PlaneSide::Front => bits &= !bit,
                PlaneSide::Straddle => {}
            }
        }
        Some(bits)
    }

    /// Clips a winding against every frustum plane. Returns `None` when the
    /// winding is clipped away entirely.
    #[must_use]
    pub fn clip_winding(&self, winding: &ConvexHull) -> Option<ConvexHull> {
        let mut result = winding.clone();
        for plane in &self.planes {
            result = result.clip_by_plane(plane)?;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn look_down_neg_z(fov_deg: f32) -> Frustum {
        let proj = Mat4::perspective_infinite_reverse_rh(fov_deg.to_radians(), 1.0, 0.1);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn sphere_in_front_is_visible() {
        let f = look_down_neg_z(60.0);
        assert!(f.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
        assert!(!f.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn box_culling_matches_sphere() {
        let f = look_down_neg_z(60.0);
        let visible = BoundingBox::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE);
        let behind = BoundingBox::from_center_half_extents(Vec3::new(0.0, 0.0, 5.0), Vec3::ONE);
        assert!(f.intersects_box(&visible));
        assert!(!f.intersects_box(&behind));
    }

    #[test]
    fn cull_bits_elide_contained_planes() {
        let f = look_down_neg_z(90.0);
        let tight = BoundingBox::from_center_half_extents(Vec3::new(0.0, 0.0, -10.0), Vec3::splat(0.1));
        let bits = f.cull_box_bits(&tight, f.all_plane_bits()).unwrap();
        // A small box in the middle of the frustum is fully inside every plane
        assert_eq!(bits, 0);
    }

    #[test]
    fn apex_winding_frustum_contains_points_behind_portal() {
        let winding = ConvexHull::from_points(&[
            Vec3::new(-1.0, -1.0, -5.0),
            Vec3::new(1.0, -1.0, -5.0),
            Vec3::new(1.0, 1.0, -5.0),
            Vec3::new(-1.0, 1.0, -5.0),
        ]);
        let portal_plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let f = Frustum::from_apex_winding(Vec3::ZERO, &winding, portal_plane);
        assert!(f.intersects_sphere(Vec3::new(0.0, 0.0, -8.0), 0.5));
        assert!(!f.intersects_sphere(Vec3::new(0.0, 10.0, -8.0), 0.5));
        // In front of the portal plane (viewer side) is rejected
        assert!(!f.intersects_sphere(Vec3::new(0.0, 0.0, -2.0), 0.5));
    }
}
