//! Directional-light shadow cascades and the shadow caster query.
//!
//! Cascades slice the view frustum by distance; each slice's corners are
//! fit with an axis-aligned box in light space, extended a fraction toward
//! the light to catch casters between the light and the slice. The caster
//! query tests every shadow caster's world bounds against all cascade
//! frusta in blocks of four and accumulates a per-caster cascade bitmask.

use glam::{Mat3, Mat4, Vec3};

use crate::scene::camera::CameraProjection;
use crate::scene::ComponentKey;
use crate::spatial::Frustum;
use crate::world::World;

pub const MAX_SHADOW_CASCADES: usize = 4;

/// Default cascade split distances (slice boundaries along the view
/// direction).
pub const DEFAULT_CASCADE_SPLITS: [f32; MAX_SHADOW_CASCADES + 1] = [0.1, 4.0, 16.0, 64.0, 256.0];

/// Fraction of the slice depth the light-space box is extended toward the
/// light.
const CASCADE_BACKUP_FRACTION: f32 = 0.1;

/// Cascade matrices of one directional light for one view.
#[derive(Debug, Clone, Default)]
pub struct CascadeSet {
    /// Light view-projection per cascade (reverse-Z ortho).
    pub matrices: Vec<Mat4>,
    /// Far boundary of each cascade along the view direction.
    pub boundaries: Vec<f32>,
}

/// Builds cascades for a directional light.
///
/// `view_basis` is the camera's world basis (columns: right, up, back);
/// `light_basis` rotates world space into light space (the light shines
/// along its local -Z). Cascade count is clamped to
/// [`MAX_SHADOW_CASCADES`].
#[must_use]
pub fn create_directional_light_cascades(
    view_position: Vec3,
    view_basis: Mat3,
    projection: &CameraProjection,
    aspect: f32,
    light_basis: Mat3,
    num_cascades: u32,
) -> CascadeSet {
    let num_cascades = (num_cascades as usize).clamp(1, MAX_SHADOW_CASCADES);
    let mut set = CascadeSet::default();

    let right = view_basis.x_axis;
    let up = view_basis.y_axis;
    let forward = -view_basis.z_axis;

    // Lateral half extents of the view slice at distance `d`
    let half_extents_at = |d: f32| -> (f32, f32) {
        match *projection {
            CameraProjection::Perspective { fov_y, .. } => {
                let half_h = d * (fov_y * 0.5).tan();
                (half_h * aspect, half_h)
            }
            CameraProjection::Orthographic { mins, maxs } => {
                ((maxs.x - mins.x) * 0.5, (maxs.y - mins.y) * 0.5)
            }
        }
    };

    for cascade in 0..num_cascades {
        let near = DEFAULT_CASCADE_SPLITS[cascade];
        let far = DEFAULT_CASCADE_SPLITS[cascade + 1];

        // Fit the eight slice corners in light space
        let mut mins = Vec3::splat(f32::INFINITY);
        let mut maxs = Vec3::splat(f32::NEG_INFINITY);
        for &d in &[near, far] {
            let (half_w, half_h) = half_extents_at(d);
            let center = view_position + forward * d;
            for (sx, sy) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let corner = center + right * (half_w * sx) + up * (half_h * sy);
                let light_space = light_basis * corner;
                mins = mins.min(light_space);
                maxs = maxs.max(light_space);
            }
        }

        // Extend toward the light (light-space +Z) to catch casters between
        // the light and the slice
        let backup = (maxs.z - mins.z).max(1.0) * CASCADE_BACKUP_FRACTION;
        maxs.z += backup;

        let light_view = Mat4::from_mat3(light_basis);
        // Reverse-Z ortho: near and far swapped
        let light_projection =
            Mat4::orthographic_rh(mins.x, maxs.x, mins.y, maxs.y, -mins.z, -maxs.z);

        set.matrices.push(light_projection * light_view);
        set.boundaries.push(far);
    }
    set
}

impl World {
    /// Tests every shadow caster against each cascade frustum and returns
    /// `(caster, cascade_bitmask)` for casters visible in at least one
    /// cascade (bit `i` set when visible in cascade `i`).
    #[must_use]
    pub fn query_shadow_casters(
        &self,
        cascades: &CascadeSet,
        visibility_mask: u32,
    ) -> Vec<(ComponentKey, u32)> {
        let frusta: Vec<Frustum> = cascades
            .matrices
            .iter()
            .map(Frustum::from_view_projection)
            .collect();

        let mut casters: Vec<(ComponentKey, u32)> = Vec::new();
        let mut batch: Vec<(ComponentKey, crate::spatial::BoundingBox)> = Vec::new();

        for (key, component) in &self.components {
            if component.pending_kill {
                continue;
            }
            let Some(drawable) = component.scene.as_ref().and_then(|s| s.as_drawable()) else {
                continue;
            };
            if !drawable.cast_shadow
                || !drawable.visible
                || drawable.rendering_group & visibility_mask == 0
            {
                continue;
            }
            batch.push((key, *drawable.world_bounds()));
        }

        // Wide pass: four casters at a time against every cascade
        for chunk in batch.chunks(4) {
            let mut masks = [0u32; 4];
            for (cascade_index, frustum) in frusta.iter().enumerate() {
                for (slot, (_, bounds)) in chunk.iter().enumerate() {
                    if frustum.intersects_box(bounds) {
                        masks[slot] |= 1 << cascade_index;
                    }
                }
            }
            for (slot, &(key, _)) in chunk.iter().enumerate() {
                if masks[slot] != 0 {
                    casters.push((key, masks[slot]));
                }
            }
        }

        casters
    }

    /// Casters visible in a single light frustum (omnidirectional shadow
    /// faces).
    #[must_use]
    pub fn query_shadow_casters_single(
        &self,
        frustum: &Frustum,
        visibility_mask: u32,
    ) -> Vec<ComponentKey> {
        let mut casters = Vec::new();
        for (key, component) in &self.components {
            if component.pending_kill {
                continue;
            }
            let Some(drawable) = component.scene.as_ref().and_then(|s| s.as_drawable()) else {
                continue;
            };
            if !drawable.cast_shadow
                || !drawable.visible
                || drawable.rendering_group & visibility_mask == 0
            {
                continue;
            }
            if frustum.intersects_box(drawable.world_bounds()) {
                casters.push(key);
            }
        }
        casters
    }
}
