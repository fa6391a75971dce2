//! The per-view visibility query.
//!
//! Steps: resolve the view area per level, mark BSP leaves in the view
//! cluster's PVS and walk the tree with the view frustum for surfaces,
//! flood across portals with per-portal frustum clipping, then emit the
//! movable primitives of every reached area that pass the (possibly
//! clipped) frustum. Lights and probes are tested against the base frustum.
//! Surfaces come back sorted by their packed sort key so runs with an
//! identical merge prefix can become single draws.

use bitflags::bitflags;
use glam::Vec3;

use crate::scene::component::SceneKind;
use crate::scene::{ComponentKey, LevelKey};
use crate::spatial::Frustum;
use crate::world::level::Level;
use crate::world::World;

/// Portal recursion bound; cycles are broken by vis marks, this only guards
/// against degenerate portal soups.
const MAX_PORTAL_DEPTH: usize = 32;

bitflags! {
    /// What a visibility query selects.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct QueryMask: u32 {
        const VISIBLE               = 1 << 0;
        const VISIBLE_IN_LIGHT_PASS = 1 << 1;
        const SHADOW_CAST           = 1 << 2;
    }
}

/// Inputs of a visibility query.
#[derive(Debug, Clone)]
pub struct VisibilityQuery {
    pub frustum: Frustum,
    pub view_position: Vec3,
    pub view_right: Vec3,
    pub view_up: Vec3,
    /// Matched against each primitive's rendering-group bits.
    pub visibility_mask: u32,
    pub query_mask: QueryMask,
}

/// A visible brush surface with its precomputed sort key.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceRef {
    pub level: LevelKey,
    pub surface: u32,
    pub sort_key: u64,
}

/// Output lists of a visibility query.
#[derive(Debug, Default)]
pub struct VisibilityResult {
    pub drawables: Vec<ComponentKey>,
    pub lights: Vec<ComponentKey>,
    pub directional_lights: Vec<ComponentKey>,
    pub probes: Vec<ComponentKey>,
    /// Sorted by `sort_key`.
    pub surfaces: Vec<SurfaceRef>,
}

impl VisibilityResult {
    pub fn clear(&mut self) {
        self.drawables.clear();
        self.lights.clear();
        self.directional_lights.clear();
        self.probes.clear();
        self.surfaces.clear();
    }
}

/// Recursive portal flood. Pushes `(area, frustum)` pairs; the frustum
/// shrinks at every crossed portal.
fn portal_flood(
    level: &mut Level,
    area: i32,
    frustum: &Frustum,
    view_position: Vec3,
    vis_frame: u64,
    depth: usize,
    out: &mut Vec<(i32, Frustum)>,
) {
    out.push((area, frustum.clone()));
    if depth >= MAX_PORTAL_DEPTH {
        log::warn!("portal flood depth limit hit");
        return;
    }

    let mut portal_index = level.area(area).first_portal;
    while portal_index >= 0 {
        let (next, owner, to_area, plane, hull) = {
            let ap = &level.area_portals[portal_index as usize];
            (ap.next, ap.owner as usize, ap.to_area, ap.plane, ap.hull.clone())
        };
        portal_index = next;

        // The viewer must be on the front side of this directed portal
        if plane.distance(view_position) <= 0.0 {
            continue;
        }
        // Cycle break: each two-sided portal is crossed at most once
        if level.portals[owner].vis_mark == vis_frame {
            continue;
        }
        // Clip the winding by the incoming frustum; a fully clipped portal
        // is invisible from here
        let Some(clipped) = frustum.clip_winding(&hull) else {
            continue;
        };
        level.portals[owner].vis_mark = vis_frame;

        let clipped_frustum = Frustum::from_apex_winding(view_position, &clipped, plane);
        portal_flood(
            level,
            to_area,
            &clipped_frustum,
            view_position,
            vis_frame,
            depth + 1,
            out,
        );
    }
}

impl World {
    /// Runs a visibility query over every level of the world.
    pub fn query_visible_primitives(&mut self, query: &VisibilityQuery, out: &mut VisibilityResult) {
        out.clear();
        self.vis_frame += 1;
        let vis_frame = self.vis_frame;

        let level_keys: Vec<LevelKey> = self.levels().to_vec();
        let mut reached: Vec<(Frustum, Vec<ComponentKey>)> = Vec::new();

        for level_key in level_keys {
            let mut flooded = Vec::new();
            {
                let Some(level) = self.level_mut(level_key) else {
                    continue;
                };

                // Brush surfaces: PVS mark + frustum walk
                if !level.bsp.leafs.is_empty() {
                    if let Some(view_leaf) = level.bsp.find_leaf(query.view_position) {
                        level.bsp.mark_leafs(view_leaf);
                        let mut surfaces = Vec::new();
                        level
                            .bsp
                            .collect_visible_surfaces(&query.frustum, &mut surfaces);
                        let model = level.model_id;
                        for surface in surfaces {
                            let sort_key =
                                level.bsp.surfaces[surface as usize].sort_key(model);
                            out.surfaces.push(SurfaceRef {
                                level: level_key,
                                surface,
                                sort_key,
                            });
                        }
                    }
                }

                // Area flood with per-portal clipping
                let view_area = level.find_area(query.view_position);
                portal_flood(
                    level,
                    view_area,
                    &query.frustum,
                    query.view_position,
                    vis_frame,
                    0,
                    &mut flooded,
                );
            }

            // Snapshot the movable lists; emission below needs the
            // component map
            if let Some(level) = self.level(level_key) {
                for (area, frustum) in flooded {
                    reached.push((frustum, level.area(area).movables.clone()));
                }
            }
        }

        // Emit drawables of every reached area
        for (frustum, movables) in &reached {
            for &key in movables {
                let Some(component) = self.components.get_mut(key) else {
                    continue;
                };
                if component.pending_kill {
                    continue;
                }
                let Some(drawable) = component.scene.as_mut().and_then(|s| s.as_drawable_mut())
                else {
                    continue;
                };
                if drawable.vis_mark == vis_frame {
                    continue;
                }
                if !drawable.visible || drawable.rendering_group & query.visibility_mask == 0 {
                    continue;
                }
                if query.query_mask.contains(QueryMask::SHADOW_CAST)
                    && !query.query_mask.contains(QueryMask::VISIBLE)
                    && !drawable.cast_shadow
                {
                    continue;
                }
                if !frustum.intersects_box(&drawable.world_bounds) {
                    continue;
                }
                drawable.vis_mark = vis_frame;
                out.drawables.push(key);
            }
        }

        // Lights and probes are few; cull against the base frustum
        for (key, component) in &self.components {
            if component.pending_kill {
                continue;
            }
            let Some(scene) = component.scene.as_ref() else {
                continue;
            };
            match &scene.kind {
                SceneKind::Light(light) => {
                    if light.enabled
                        && light.rendering_group & query.visibility_mask != 0
                        && query.frustum.intersects_box(light.world_bounds())
                    {
                        out.lights.push(key);
                    }
                }
                SceneKind::DirectionalLight(light) => {
                    if light.enabled && light.rendering_group & query.visibility_mask != 0 {
                        out.directional_lights.push(key);
                    }
                }
                SceneKind::IblProbe(probe) => {
                    if probe.enabled
                        && probe.rendering_group & query.visibility_mask != 0
                        && query.frustum.intersects_box(probe.world_bounds())
                    {
                        out.probes.push(key);
                    }
                }
                _ => {}
            }
        }

        // Sort surfaces so mergeable runs are adjacent
        out.surfaces.sort_by_key(|s| s.sort_key);
    }
}
