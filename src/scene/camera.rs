use glam::{Affine3A, Mat4, Vec3};

use crate::spatial::Frustum;

/// Camera projection parameters.
#[derive(Debug, Clone, Copy)]
pub enum CameraProjection {
    /// Reverse-Z infinite perspective.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        z_near: f32,
    },
    /// Reverse-Z orthographic (near and far swapped in the matrix).
    Orthographic {
        mins: Vec3,
        maxs: Vec3,
    },
}

/// Camera scene component.
///
/// The view matrix is the inverse of the owning component's world matrix;
/// this struct only carries projection state and derives matrices and the
/// frustum on demand.
#[derive(Debug, Clone)]
pub struct CameraComponent {
    pub projection: CameraProjection,
    pub aspect: f32,
    /// Far distance used by the finite cluster-grid projection.
    pub cluster_z_far: f32,
}

impl CameraComponent {
    #[must_use]
    pub fn perspective(fov_y_degrees: f32, aspect: f32, z_near: f32) -> Self {
        Self {
            projection: CameraProjection::Perspective {
                fov_y: fov_y_degrees.to_radians(),
                z_near,
            },
            aspect,
            cluster_z_far: 100.0,
        }
    }

    #[must_use]
    pub fn z_near(&self) -> f32 {
        match self.projection {
            CameraProjection::Perspective { z_near, .. } => z_near,
            CameraProjection::Orthographic { mins, .. } => mins.z,
        }
    }

    #[must_use]
    pub fn is_perspective(&self) -> bool {
        matches!(self.projection, CameraProjection::Perspective { .. })
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            CameraProjection::Perspective { fov_y, z_near } => {
                Mat4::perspective_infinite_reverse_rh(fov_y, self.aspect, z_near)
            }
            CameraProjection::Orthographic { mins, maxs } => {
                // Reverse Z: swap near and far
                Mat4::orthographic_rh(mins.x, maxs.x, mins.y, maxs.y, maxs.z, mins.z)
            }
        }
    }

    /// Finite-far projection for the view-space cluster grid.
    #[must_use]
    pub fn cluster_projection_matrix(&self) -> Mat4 {
        match self.projection {
            CameraProjection::Perspective { fov_y, z_near } => {
                Mat4::perspective_rh(fov_y, self.aspect, z_near, self.cluster_z_far)
            }
            CameraProjection::Orthographic { mins, maxs } => {
                Mat4::orthographic_rh(mins.x, maxs.x, mins.y, maxs.y, mins.z, maxs.z)
            }
        }
    }

    /// View matrix from the owning component's world matrix.
    #[must_use]
    pub fn view_matrix(world_matrix: &Affine3A) -> Mat4 {
        Mat4::from(*world_matrix).inverse()
    }

    #[must_use]
    pub fn frustum(&self, world_matrix: &Affine3A) -> Frustum {
        let vp = self.projection_matrix() * Self::view_matrix(world_matrix);
        Frustum::from_view_projection(&vp)
    }
}
