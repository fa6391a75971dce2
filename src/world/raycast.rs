//! Per-triangle raycasts over the world's drawables.
//!
//! These walk drawable world bounds first (the per-AABB variants), then the
//! per-subpart AABB trees of the meshes. Rays are transformed into mesh
//! space per drawable, so non-uniformly scaled drawables report correct
//! triangle hits with world-space distances.

use glam::Vec3;

use crate::scene::component::SceneKind;
use crate::scene::ComponentKey;
use crate::spatial::mesh::RAYCAST_MIN_DISTANCE;
use crate::spatial::TriangleHitResult;
use crate::world::World;

/// Filter for render-world raycasts.
#[derive(Debug, Clone)]
pub struct RaycastFilter {
    /// Rendering-group bits a drawable must intersect.
    pub rendering_mask: u32,
    /// Sort all-hit results by distance.
    pub sort_by_distance: bool,
}

impl Default for RaycastFilter {
    fn default() -> Self {
        Self {
            rendering_mask: !0,
            sort_by_distance: false,
        }
    }
}

/// One triangle hit attributed to a drawable component.
#[derive(Debug, Clone, Copy)]
pub struct WorldRaycastHit {
    pub drawable: ComponentKey,
    pub triangle: TriangleHitResult,
}

/// One bounds-only hit.
#[derive(Debug, Clone, Copy)]
pub struct BoxHitResult {
    pub drawable: ComponentKey,
    pub distance_min: f32,
    pub distance_max: f32,
}

impl World {
    fn drawable_keys(&self) -> impl Iterator<Item = ComponentKey> + '_ {
        self.components
            .iter()
            .filter(|(_, c)| {
                !c.pending_kill
                    && matches!(
                        c.scene.as_ref().map(|s| &s.kind),
                        Some(SceneKind::Drawable(_))
                    )
            })
            .map(|(k, _)| k)
    }

    /// Per-AABB raycast: every drawable whose world bounds the ray crosses.
    pub fn raycast_aabb(
        &self,
        results: &mut Vec<BoxHitResult>,
        ray_start: Vec3,
        ray_end: Vec3,
        filter: &RaycastFilter,
    ) -> bool {
        let delta = ray_end - ray_start;
        let distance = delta.length();
        if distance < RAYCAST_MIN_DISTANCE {
            return false;
        }
        let dir = delta / distance;
        let inv_dir = dir.recip();
        let start_len = results.len();

        for key in self.drawable_keys() {
            let Some(drawable) = self.scene_of(key).and_then(|s| s.as_drawable()) else {
                continue;
            };
            if !drawable.visible || drawable.rendering_group & filter.rendering_mask == 0 {
                continue;
            }
            if let Some((t_min, t_max)) =
                crate::spatial::ray_intersect_box(ray_start, inv_dir, drawable.world_bounds())
            {
                if t_min <= distance {
                    results.push(BoxHitResult {
                        drawable: key,
                        distance_min: t_min,
                        distance_max: t_max,
                    });
                }
            }
        }

        if filter.sort_by_distance {
            results[start_len..].sort_by(|a, b| {
                a.distance_min
                    .partial_cmp(&b.distance_min)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        results.len() > start_len
    }

    /// Per-triangle raycast over all drawables; appends every hit.
    pub fn raycast(
        &self,
        results: &mut Vec<WorldRaycastHit>,
        ray_start: Vec3,
        ray_end: Vec3,
        filter: &RaycastFilter,
    ) -> bool {
        let delta = ray_end - ray_start;
        let distance = delta.length();
        if distance < RAYCAST_MIN_DISTANCE {
            return false;
        }
        let dir = delta / distance;
        let start_len = results.len();
        let mut scratch = Vec::new();

        for key in self.drawable_keys() {
            let world_matrix = self.world_transform_matrix(key);
            let Some(drawable) = self.scene_of(key).and_then(|s| s.as_drawable()) else {
                continue;
            };
            if !drawable.visible || drawable.rendering_group & filter.rendering_mask == 0 {
                continue;
            }
            if crate::spatial::ray_intersect_box(ray_start, dir.recip(), drawable.world_bounds())
                .is_none_or(|(t_min, _)| t_min > distance)
            {
                continue;
            }

            // Trace in mesh space
            let inverse = world_matrix.inverse();
            let local_start = inverse.transform_point3(ray_start);
            let local_end = inverse.transform_point3(ray_end);
            let local_delta = local_end - local_start;
            let local_distance = local_delta.length();
            if local_distance < RAYCAST_MIN_DISTANCE {
                continue;
            }
            let local_dir = local_delta / local_distance;

            scratch.clear();
            drawable
                .mesh
                .raycast(local_start, local_dir, local_distance, &mut scratch);
            for hit in &scratch {
                let world_location = world_matrix.transform_point3(hit.location);
                let world_distance = (world_location - ray_start).length();
                results.push(WorldRaycastHit {
                    drawable: key,
                    triangle: TriangleHitResult {
                        location: world_location,
                        normal: world_matrix
                            .transform_vector3(hit.normal)
                            .normalize_or_zero(),
                        distance: world_distance,
                        ..*hit
                    },
                });
            }
        }

        if filter.sort_by_distance {
            results[start_len..].sort_by(|a, b| {
                a.triangle
                    .distance
                    .partial_cmp(&b.triangle.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        results.len() > start_len
    }

    /// Closest per-triangle hit.
    #[must_use]
    pub fn raycast_closest(
        &self,
        ray_start: Vec3,
        ray_end: Vec3,
        filter: &RaycastFilter,
    ) -> Option<WorldRaycastHit> {
        let mut hits = Vec::new();
        self.raycast(&mut hits, ray_start, ray_end, filter);
        hits.into_iter().min_by(|a, b| {
            a.triangle
                .distance
                .partial_cmp(&b.triangle.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
