//! Clustered light assignment.
//!
//! Visible lights and probes are placed into a fixed 3D grid over the view
//! frustum. Each item carries its world AABB and a clip-to-OBB matrix; a
//! cluster keeps an item when the item's NDC box covers it and at least one
//! cluster corner lands inside the item's oriented box (or the item fully
//! covers the cluster). The per-cluster index lists are packed into a
//! buffer the backend reads per pixel.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::spatial::BoundingBox;

pub const MAX_FRUSTUM_CLUSTERS_X: usize = 16;
pub const MAX_FRUSTUM_CLUSTERS_Y: usize = 8;
pub const MAX_FRUSTUM_CLUSTERS_Z: usize = 24;

const NUM_CLUSTERS: usize =
    MAX_FRUSTUM_CLUSTERS_X * MAX_FRUSTUM_CLUSTERS_Y * MAX_FRUSTUM_CLUSTERS_Z;

/// Hard cap of item indices across all clusters.
pub const MAX_CLUSTER_ITEMS: usize = 64 * 1024;

/// Per-cluster slice into the packed item index buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct ClusterHeader {
    pub first_item: u32,
    pub num_lights: u16,
    pub num_probes: u16,
}

/// One light or probe registered for voxelization.
#[derive(Debug, Clone, Copy)]
pub struct ClusterItem {
    /// Index into the view's light or probe list.
    pub index: u32,
    pub bounds: BoundingBox,
    /// World-space point to unit-box matrix of the item's OBB.
    pub obb_transform_inverse: Mat4,
}

#[derive(Debug, Clone, Copy)]
struct GridRange {
    min: [usize; 3],
    max: [usize; 3],
}

/// The voxelizer; reused across views, buffers grow to the high-water mark.
#[derive(Debug, Default)]
pub struct LightVoxelizer {
    headers: Vec<ClusterHeader>,
    items: Vec<u32>,
    // Per-cluster scratch filled during assignment
    cluster_lights: Vec<Vec<u32>>,
    cluster_probes: Vec<Vec<u32>>,
}

fn cluster_index(x: usize, y: usize, z: usize) -> usize {
    (z * MAX_FRUSTUM_CLUSTERS_Y + y) * MAX_FRUSTUM_CLUSTERS_X + x
}

/// NDC box of `bounds` under `view_projection`, clamped to the grid.
fn grid_range(bounds: &BoundingBox, view_projection: &Mat4) -> Option<GridRange> {
    let mut ndc_min = Vec3::splat(f32::INFINITY);
    let mut ndc_max = Vec3::splat(f32::NEG_INFINITY);
    let mut any_in_front = false;

    for i in 0..8 {
        let corner = Vec3::new(
            if i & 1 == 0 { bounds.min.x } else { bounds.max.x },
            if i & 2 == 0 { bounds.min.y } else { bounds.max.y },
            if i & 4 == 0 { bounds.min.z } else { bounds.max.z },
        );
        let clip = *view_projection * Vec4::new(corner.x, corner.y, corner.z, 1.0);
        if clip.w <= 1e-5 {
            // Behind the near plane; extend the range to the near edge
            continue;
        }
        any_in_front = true;
        let ndc = clip.xyz() / clip.w;
        ndc_min = ndc_min.min(ndc);
        ndc_max = ndc_max.max(ndc);
    }
    if !any_in_front {
        return None;
    }

    // x/y map [-1,1] to grid columns/rows; z maps [0,1] to slices
    let to_cell = |v: f32, cells: usize, zero_one: bool| -> (usize, usize) {
        let t = if zero_one { v } else { v * 0.5 + 0.5 };
        let t = t.clamp(0.0, 1.0);
        let c = ((t * cells as f32) as usize).min(cells - 1);
        (c, c)
    };

    let (min_x, _) = to_cell(ndc_min.x, MAX_FRUSTUM_CLUSTERS_X, false);
    let (max_x, _) = to_cell(ndc_max.x, MAX_FRUSTUM_CLUSTERS_X, false);
    let (min_y, _) = to_cell(ndc_min.y, MAX_FRUSTUM_CLUSTERS_Y, false);
    let (max_y, _) = to_cell(ndc_max.y, MAX_FRUSTUM_CLUSTERS_Y, false);
    let (min_z, _) = to_cell(ndc_min.z.min(ndc_max.z), MAX_FRUSTUM_CLUSTERS_Z, true);
    let (max_z, _) = to_cell(ndc_min.z.max(ndc_max.z), MAX_FRUSTUM_CLUSTERS_Z, true);

    Some(GridRange {
        min: [min_x, min_y, min_z],
        max: [max_x, max_y, max_z],
    })
}

/// World-space corner of a cluster cell, reconstructed from NDC.
fn cluster_corner_world(
    inverse_view_projection: &Mat4,
    x: usize,
    y: usize,
    z: usize,
) -> Option<Vec3> {
    let ndc = Vec3::new(
        x as f32 / MAX_FRUSTUM_CLUSTERS_X as f32 * 2.0 - 1.0,
        y as f32 / MAX_FRUSTUM_CLUSTERS_Y as f32 * 2.0 - 1.0,
        (z as f32 / MAX_FRUSTUM_CLUSTERS_Z as f32).clamp(1e-4, 1.0),
    );
    let world = *inverse_view_projection * Vec4::new(ndc.x, ndc.y, ndc.z, 1.0);
    if world.w.abs() < 1e-8 {
        return None;
    }
    Some(world.xyz() / world.w)
}

fn cluster_touches_obb(
    inverse_view_projection: &Mat4,
    obb_inverse: &Mat4,
    range: &GridRange,
    x: usize,
    y: usize,
    z: usize,
) -> bool {
    // Items spanning at most two cells per axis keep their whole covered
    // range; corner containment cannot separate overlaps that small
    if range.max[0] - range.min[0] <= 1
        && range.max[1] - range.min[1] <= 1
        && range.max[2] - range.min[2] <= 1
    {
        return true;
    }
    // An item whose NDC box covers the whole grid cell range trivially
    // touches every covered cluster
    if range.min == [0, 0, 0]
        && range.max
            == [
                MAX_FRUSTUM_CLUSTERS_X - 1,
                MAX_FRUSTUM_CLUSTERS_Y - 1,
                MAX_FRUSTUM_CLUSTERS_Z - 1,
            ]
    {
        return true;
    }

    for corner in 0..8 {
        let cx = x + (corner & 1);
        let cy = y + ((corner >> 1) & 1);
        let cz = z + ((corner >> 2) & 1);
        let Some(world) = cluster_corner_world(inverse_view_projection, cx, cy, cz) else {
            continue;
        };
        let local = *obb_inverse * Vec4::new(world.x, world.y, world.z, 1.0);
        if local.x.abs() <= 1.0 && local.y.abs() <= 1.0 && local.z.abs() <= 1.0 {
            return true;
        }
    }
    // Keep the cluster anyway when its cell is strictly inside the item's
    // NDC box; corner tests alone miss thin overlaps
    x > range.min[0] && x < range.max[0] && y > range.min[1] && y < range.max[1]
}

impl LightVoxelizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: vec![ClusterHeader::default(); NUM_CLUSTERS],
            items: Vec::new(),
            cluster_lights: (0..NUM_CLUSTERS).map(|_| Vec::new()).collect(),
            cluster_probes: (0..NUM_CLUSTERS).map(|_| Vec::new()).collect(),
        }
    }

    /// Assigns lights and probes to clusters under the view's cluster
    /// view-projection.
    pub fn voxelize(
        &mut self,
        cluster_view_projection: &Mat4,
        lights: &[ClusterItem],
        probes: &[ClusterItem],
    ) {
        for list in &mut self.cluster_lights {
            list.clear();
        }
        for list in &mut self.cluster_probes {
            list.clear();
        }

        let inverse = cluster_view_projection.inverse();

        for (items, lists) in [
            (lights, &mut self.cluster_lights),
            (probes, &mut self.cluster_probes),
        ] {
            for item in items {
                let Some(range) = grid_range(&item.bounds, cluster_view_projection) else {
                    continue;
                };
                for z in range.min[2]..=range.max[2] {
                    for y in range.min[1]..=range.max[1] {
                        for x in range.min[0]..=range.max[0] {
                            if cluster_touches_obb(
                                &inverse,
                                &item.obb_transform_inverse,
                                &range,
                                x,
                                y,
                                z,
                            ) {
                                lists[cluster_index(x, y, z)].push(item.index);
                            }
                        }
                    }
                }
            }
        }

        // Pack the per-cluster lists; clusters past the item budget come out
        // empty rather than stale
        self.items.clear();
        let mut overflowed = false;
        for i in 0..NUM_CLUSTERS {
            let first = self.items.len();
            let lights = &self.cluster_lights[i];
            let probes = &self.cluster_probes[i];
            if self.items.len() + lights.len() + probes.len() > MAX_CLUSTER_ITEMS {
                if !overflowed {
                    overflowed = true;
                    log::warn!("cluster item buffer full");
                }
                self.headers[i] = ClusterHeader {
                    first_item: first as u32,
                    num_lights: 0,
                    num_probes: 0,
                };
                continue;
            }
            self.items.extend_from_slice(lights);
            self.items.extend_from_slice(probes);
            self.headers[i] = ClusterHeader {
                first_item: first as u32,
                num_lights: lights.len() as u16,
                num_probes: probes.len() as u16,
            };
        }
    }

    #[inline]
    #[must_use]
    pub fn headers(&self) -> &[ClusterHeader] {
        &self.headers
    }

    #[inline]
    #[must_use]
    pub fn items(&self) -> &[u32] {
        &self.items
    }

    /// Items of one cluster cell, lights first.
    #[must_use]
    pub fn cluster_items(&self, x: usize, y: usize, z: usize) -> &[u32] {
        let header = &self.headers[cluster_index(x, y, z)];
        let first = header.first_item as usize;
        let count = header.num_lights as usize + header.num_probes as usize;
        &self.items[first..first + count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Affine3A;

    fn view_projection() -> Mat4 {
        let projection = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        projection * view
    }

    fn point_light_item(index: u32, position: Vec3, radius: f32) -> ClusterItem {
        let obb = Affine3A::from_translation(position)
            * Affine3A::from_scale(Vec3::splat(radius));
        ClusterItem {
            index,
            bounds: BoundingBox::from_center_half_extents(position, Vec3::splat(radius)),
            obb_transform_inverse: Mat4::from(obb).inverse(),
        }
    }

    #[test]
    fn centered_light_lands_in_central_clusters() {
        let vp = view_projection();
        let mut voxelizer = LightVoxelizer::new();
        let light = point_light_item(0, Vec3::new(0.0, 0.0, -20.0), 3.0);
        voxelizer.voxelize(&vp, &[light], &[]);

        let assigned: usize = voxelizer
            .headers()
            .iter()
            .map(|h| h.num_lights as usize)
            .sum();
        assert!(assigned > 0, "light was not assigned to any cluster");

        // The edge columns should be empty for a small centered light
        let mut edge = 0usize;
        for z in 0..MAX_FRUSTUM_CLUSTERS_Z {
            for y in 0..MAX_FRUSTUM_CLUSTERS_Y {
                edge += voxelizer.cluster_items(0, y, z).len();
                edge += voxelizer.cluster_items(MAX_FRUSTUM_CLUSTERS_X - 1, y, z).len();
            }
        }
        assert_eq!(edge, 0);
    }

    #[test]
    fn light_behind_view_is_dropped() {
        let vp = view_projection();
        let mut voxelizer = LightVoxelizer::new();
        let light = point_light_item(0, Vec3::new(0.0, 0.0, 50.0), 3.0);
        voxelizer.voxelize(&vp, &[light], &[]);
        let assigned: usize = voxelizer
            .headers()
            .iter()
            .map(|h| h.num_lights as usize)
            .sum();
        assert_eq!(assigned, 0);
    }

    #[test]
    fn probes_pack_after_lights() {
        let vp = view_projection();
        let mut voxelizer = LightVoxelizer::new();
        let light = point_light_item(7, Vec3::new(0.0, 0.0, -20.0), 5.0);
        let probe = point_light_item(3, Vec3::new(0.0, 0.0, -20.0), 5.0);
        voxelizer.voxelize(&vp, &[light], &[probe]);

        let mut found = false;
        for z in 0..MAX_FRUSTUM_CLUSTERS_Z {
            for y in 0..MAX_FRUSTUM_CLUSTERS_Y {
                for x in 0..MAX_FRUSTUM_CLUSTERS_X {
                    let header = &voxelizer.headers()[cluster_index(x, y, z)];
                    if header.num_lights > 0 && header.num_probes > 0 {
                        let items = voxelizer.cluster_items(x, y, z);
                        assert_eq!(items[0], 7);
                        assert_eq!(items[header.num_lights as usize], 3);
                        found = true;
                    }
                }
            }
        }
        assert!(found);
    }
}
