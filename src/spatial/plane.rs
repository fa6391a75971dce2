use glam::Vec3;

use crate::spatial::BoundingBox;

/// Which side of a plane a volume lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    Front,
    Back,
    /// The volume straddles the plane.
    Straddle,
}

/// Axial classification of a plane normal, cached at construction so BSP
/// point classification can use a single component compare for the common
/// axis-aligned case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneAxialType {
    AxialX,
    AxialY,
    AxialZ,
    NonAxial,
}

/// Plane in the form `normal · p + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
    pub axial_type: PlaneAxialType,
}

impl Plane {
    #[must_use]
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self {
            normal,
            d,
            axial_type: Self::classify_axial(normal),
        }
    }

    /// Plane through `point` with the given normal.
    #[must_use]
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self::new(normal, -normal.dot(point))
    }

    /// Plane through three points (counter-clockwise winding faces front).
    /// Returns `None` for degenerate triangles.
    #[must_use]
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        let normal = (b - a).cross(c - a);
        let len_sq = normal.length_squared();
        if len_sq < 1e-12 {
            return None;
        }
        let normal = normal / len_sq.sqrt();
        Some(Self::from_point_normal(a, normal))
    }

    fn classify_axial(normal: Vec3) -> PlaneAxialType {
        if normal.x == 1.0 || normal.x == -1.0 {
            PlaneAxialType::AxialX
        } else if normal.y == 1.0 || normal.y == -1.0 {
            PlaneAxialType::AxialY
        } else if normal.z == 1.0 || normal.z == -1.0 {
            PlaneAxialType::AxialZ
        } else {
            PlaneAxialType::NonAxial
        }
    }

    /// Signed distance from `point` to the plane.
    #[inline]
    #[must_use]
    pub fn distance(&self, point: Vec3) -> f32 {
        match self.axial_type {
            PlaneAxialType::AxialX => self.normal.x * point.x + self.d,
            PlaneAxialType::AxialY => self.normal.y * point.y + self.d,
            PlaneAxialType::AxialZ => self.normal.z * point.z + self.d,
            PlaneAxialType::NonAxial => self.normal.dot(point) + self.d,
        }
    }

    /// Classifies an AABB against the plane using its p/n-vertices.
    #[must_use]
    pub fn side_of_box(&self, bounds: &BoundingBox) -> PlaneSide {
        if self.distance(bounds.nearest_corner(self.normal)) > 0.0 {
            PlaneSide::Front
        } else if self.distance(bounds.farthest_corner(self.normal)) < 0.0 {
            PlaneSide::Back
        } else {
            PlaneSide::Straddle
        }
    }

    #[inline]
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            d: -self.d,
            axial_type: self.axial_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axial_plane_distance() {
        let p = Plane::new(Vec3::Y, 0.0);
        assert_eq!(p.axial_type, PlaneAxialType::AxialY);
        assert!((p.distance(Vec3::new(5.0, 2.0, -3.0)) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn box_classification() {
        let p = Plane::new(Vec3::Y, 0.0);
        let above = BoundingBox::new(Vec3::new(-1.0, 1.0, -1.0), Vec3::new(1.0, 2.0, 1.0));
        let below = BoundingBox::new(Vec3::new(-1.0, -2.0, -1.0), Vec3::new(1.0, -1.0, 1.0));
        let across = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(p.side_of_box(&above), PlaneSide::Front);
        assert_eq!(p.side_of_box(&below), PlaneSide::Back);
        assert_eq!(p.side_of_box(&across), PlaneSide::Straddle);
    }

    #[test]
    fn from_points_winding() {
        let p = Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::Z).unwrap();
        // CCW looking from -Y: normal points down
        assert!(p.normal.y < 0.0);
    }
}
