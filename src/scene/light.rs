use glam::{Affine3A, Mat4, Vec3};

use crate::spatial::BoundingBox;

/// Point or spot parameters of an analytic light.
#[derive(Debug, Clone, Copy)]
pub enum AnalyticLightKind {
    Point,
    Spot {
        /// Inner cone angle in radians.
        inner_cone: f32,
        /// Outer cone angle in radians.
        outer_cone: f32,
        exponent: f32,
    },
}

/// Punctual light with a finite influence volume.
///
/// The influence volume is an oriented box; its world-to-unit-box inverse is
/// cached on transform commit and used by the clustered light assignment to
/// test cluster corners.
#[derive(Debug)]
pub struct AnalyticLight {
    pub kind: AnalyticLightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub rendering_group: u32,
    pub enabled: bool,
    pub cast_shadow: bool,

    pub(crate) world_bounds: BoundingBox,
    pub(crate) obb_transform_inverse: Mat4,
}

impl AnalyticLight {
    #[must_use]
    pub fn point(color: Vec3, intensity: f32, outer_radius: f32) -> Self {
        Self {
            kind: AnalyticLightKind::Point,
            color,
            intensity,
            inner_radius: 0.0,
            outer_radius,
            rendering_group: !0,
            enabled: true,
            cast_shadow: false,
            world_bounds: BoundingBox::EMPTY,
            obb_transform_inverse: Mat4::IDENTITY,
        }
    }

    #[must_use]
    pub fn spot(color: Vec3, intensity: f32, outer_radius: f32, inner_cone: f32, outer_cone: f32) -> Self {
        Self {
            kind: AnalyticLightKind::Spot {
                inner_cone,
                outer_cone,
                exponent: 1.0,
            },
            ..Self::point(color, intensity, outer_radius)
        }
    }

    #[inline]
    #[must_use]
    pub fn world_bounds(&self) -> &BoundingBox {
        &self.world_bounds
    }

    #[inline]
    #[must_use]
    pub fn obb_transform_inverse(&self) -> &Mat4 {
        &self.obb_transform_inverse
    }

    /// Refreshes the influence OBB from the component world matrix.
    pub fn update_world_bounds(&mut self, world_matrix: &Affine3A) {
        let obb = *world_matrix * Affine3A::from_scale(Vec3::splat(self.outer_radius.max(1e-3)));
        self.obb_transform_inverse = Mat4::from(obb).inverse();
        self.world_bounds =
            BoundingBox::new(-Vec3::ONE, Vec3::ONE).transform(&obb);
    }
}

/// Sun-style light covering the whole view, shadowed through cascades.
#[derive(Debug)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub rendering_group: u32,
    pub enabled: bool,
    pub cast_shadow: bool,
    pub max_shadow_cascades: u32,
}

impl DirectionalLight {
    #[must_use]
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            rendering_group: !0,
            enabled: true,
            cast_shadow: true,
            max_shadow_cascades: 4,
        }
    }
}

/// Image-based-lighting probe with an oriented influence volume, assigned to
/// clusters like analytic lights.
#[derive(Debug)]
pub struct IblProbe {
    /// Backend irradiance map reference.
    pub irradiance_map: u32,
    /// Backend reflection map reference.
    pub reflection_map: u32,
    pub radius: f32,
    pub rendering_group: u32,
    pub enabled: bool,

    pub(crate) world_bounds: BoundingBox,
    pub(crate) obb_transform_inverse: Mat4,
}

impl IblProbe {
    #[must_use]
    pub fn new(irradiance_map: u32, reflection_map: u32, radius: f32) -> Self {
        Self {
            irradiance_map,
            reflection_map,
            radius,
            rendering_group: !0,
            enabled: true,
            world_bounds: BoundingBox::EMPTY,
            obb_transform_inverse: Mat4::IDENTITY,
        }
    }

    #[inline]
    #[must_use]
    pub fn world_bounds(&self) -> &BoundingBox {
        &self.world_bounds
    }

    #[inline]
    #[must_use]
    pub fn obb_transform_inverse(&self) -> &Mat4 {
        &self.obb_transform_inverse
    }

    pub fn update_world_bounds(&mut self, world_matrix: &Affine3A) {
        let obb = *world_matrix * Affine3A::from_scale(Vec3::splat(self.radius.max(1e-3)));
        self.obb_transform_inverse = Mat4::from(obb).inverse();
        self.world_bounds = BoundingBox::new(-Vec3::ONE, Vec3::ONE).transform(&obb);
    }
}
