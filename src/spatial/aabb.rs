use glam::{Affine3A, Vec3};

/// Axis-aligned bounding box.
///
/// An empty box is represented by `min > max` (see [`BoundingBox::EMPTY`]);
/// adding points or boxes to an empty box behaves as expected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// The inverted box that absorbs any point or box added to it.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[inline]
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centered at `center` with the given half extents.
    #[inline]
    #[must_use]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Volume of the box; zero for an empty box.
    #[inline]
    #[must_use]
    pub fn volume(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let e = self.size();
        e.x * e.y * e.z
    }

    #[inline]
    pub fn add_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    #[inline]
    pub fn add_aabb(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grows the box by `amount` on every side.
    #[inline]
    #[must_use]
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[inline]
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Transforms the box and returns the AABB of the result.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        if self.is_empty() {
            return *self;
        }
        let center = self.center();
        let half = self.half_extents();

        let new_center = matrix.transform_point3(center);
        let abs_x = matrix.matrix3.x_axis.abs();
        let abs_y = matrix.matrix3.y_axis.abs();
        let abs_z = matrix.matrix3.z_axis.abs();
        let new_half = Vec3::from(abs_x) * half.x + Vec3::from(abs_y) * half.y + Vec3::from(abs_z) * half.z;

        Self {
            min: new_center - new_half,
            max: new_center + new_half,
        }
    }

    /// The corner of the box farthest along `normal` (the p-vertex).
    #[inline]
    #[must_use]
    pub fn farthest_corner(&self, normal: Vec3) -> Vec3 {
        Vec3::new(
            if normal.x >= 0.0 { self.max.x } else { self.min.x },
            if normal.y >= 0.0 { self.max.y } else { self.min.y },
            if normal.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }

    /// The corner of the box nearest along `normal` (the n-vertex).
    #[inline]
    #[must_use]
    pub fn nearest_corner(&self, normal: Vec3) -> Vec3 {
        Vec3::new(
            if normal.x >= 0.0 { self.min.x } else { self.max.x },
            if normal.y >= 0.0 { self.min.y } else { self.max.y },
            if normal.z >= 0.0 { self.min.z } else { self.max.z },
        )
    }
}

/// Bounding sphere, used for quick rejection before box tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    #[inline]
    #[must_use]
    pub fn from_aabb(aabb: &BoundingBox) -> Self {
        Self {
            center: aabb.center(),
            radius: aabb.half_extents().length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_absorbs_points() {
        let mut b = BoundingBox::EMPTY;
        assert!(b.is_empty());
        b.add_point(Vec3::new(1.0, 2.0, 3.0));
        assert!(!b.is_empty());
        assert_eq!(b.min, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn transform_rotated_box_stays_conservative() {
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let m = Affine3A::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let t = b.transform(&m);
        // A rotated unit cube grows along X/Z
        assert!(t.max.x > 1.0 && t.max.z > 1.0);
        assert!((t.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn farthest_corner_follows_normal() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(b.farthest_corner(Vec3::new(1.0, -1.0, 1.0)), Vec3::new(1.0, 0.0, 1.0));
    }
}
