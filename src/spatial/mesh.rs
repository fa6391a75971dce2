//! Indexed triangle mesh with subparts.
//!
//! A mesh owns one shared vertex/index buffer pair; each subpart addresses a
//! contiguous index range with a base-vertex offset and carries its own
//! bounds plus an optional [`AabbTree`] for raycasts. Skinned meshes carry
//! four weights per vertex.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::spatial::aabb_tree::AabbTree;
use crate::spatial::intersect::ray_intersect_triangle;
use crate::spatial::BoundingBox;

/// Raycasts shorter than this report no hit.
pub const RAYCAST_MIN_DISTANCE: f32 = 0.0001;

/// Interleaved mesh vertex; plain data so it can land in streamed frame
/// memory directly.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl MeshVertex {
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// Four joint influences for one skinned vertex.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexWeight {
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

/// One hit of an all-hits mesh raycast.
#[derive(Debug, Clone, Copy)]
pub struct TriangleHitResult {
    pub location: Vec3,
    pub normal: Vec3,
    /// Barycentric coordinates of the hit.
    pub uv: Vec2,
    pub distance: f32,
    pub indices: [u32; 3],
    /// Material slot of the subpart that was hit.
    pub material: u32,
}

/// Contiguous index range of a mesh with a base-vertex offset.
#[derive(Debug, Clone, Default)]
pub struct MeshSubpart {
    pub base_vertex: u32,
    pub vertex_count: u32,
    pub first_index: u32,
    pub index_count: u32,
    pub bounding_box: BoundingBox,
    /// Material slot resolved by the frontend.
    pub material: u32,
    aabb_tree: Option<AabbTree>,
}

impl MeshSubpart {
    #[must_use]
    pub fn new(base_vertex: u32, vertex_count: u32, first_index: u32, index_count: u32) -> Self {
        Self {
            base_vertex,
            vertex_count,
            first_index,
            index_count,
            bounding_box: BoundingBox::EMPTY,
            material: 0,
            aabb_tree: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn aabb_tree(&self) -> Option<&AabbTree> {
        self.aabb_tree.as_ref()
    }
}

/// Triangulated 3d surface with indexed vertices.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    weights: Vec<VertexWeight>,
    subparts: Vec<MeshSubpart>,
    skinned: bool,
    bounding_box: BoundingBox,
}

impl Mesh {
    #[must_use]
    pub fn new(
        name: &str,
        vertices: Vec<MeshVertex>,
        indices: Vec<u32>,
        subparts: Vec<MeshSubpart>,
    ) -> Self {
        let mut mesh = Self {
            name: name.to_owned(),
            vertices,
            indices,
            weights: Vec::new(),
            subparts,
            skinned: false,
            bounding_box: BoundingBox::EMPTY,
        };
        mesh.update_bounds();
        mesh
    }

    /// Attaches per-vertex joint weights, turning this into a skinned mesh.
    pub fn set_weights(&mut self, weights: Vec<VertexWeight>) {
        debug_assert_eq!(weights.len(), self.vertices.len());
        self.weights = weights;
        self.skinned = true;
    }

    #[inline]
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        self.skinned
    }

    #[inline]
    #[must_use]
    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    #[must_use]
    pub fn weights(&self) -> &[VertexWeight] {
        &self.weights
    }

    #[inline]
    #[must_use]
    pub fn subparts(&self) -> &[MeshSubpart] {
        &self.subparts
    }

    #[inline]
    #[must_use]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Recomputes subpart bounds and the mesh bound from vertex data.
    pub fn update_bounds(&mut self) {
        self.bounding_box = BoundingBox::EMPTY;
        for subpart in &mut self.subparts {
            let mut bounds = BoundingBox::EMPTY;
            let first = subpart.first_index as usize;
            let last = first + subpart.index_count as usize;
            for &index in &self.indices[first..last] {
                bounds.add_point(self.vertices[(subpart.base_vertex + index) as usize].position);
            }
            subpart.bounding_box = bounds;
            self.bounding_box.add_aabb(&bounds);
        }
    }

    /// Builds a raycast tree for every subpart.
    pub fn generate_aabb_trees(&mut self, primitives_per_leaf: u32) {
        let positions: Vec<Vec3> = self.vertices.iter().map(|v| v.position).collect();
        for subpart in &mut self.subparts {
            let first = subpart.first_index as usize;
            let tree = AabbTree::build(
                &positions,
                &self.indices[first..first + subpart.index_count as usize],
                subpart.index_count as usize,
                subpart.base_vertex,
                primitives_per_leaf,
            );
            subpart.aabb_tree = Some(tree);
        }
    }

    /// Ray intersection against one subpart; appends every hit. Results are
    /// unordered by distance. Returns whether anything was hit.
    pub fn raycast_subpart(
        &self,
        subpart_index: usize,
        ray_start: Vec3,
        ray_dir: Vec3,
        distance: f32,
        hits: &mut Vec<TriangleHitResult>,
    ) -> bool {
        if distance < RAYCAST_MIN_DISTANCE {
            return false;
        }

        let subpart = &self.subparts[subpart_index];
        let indices = &self.indices[subpart.first_index as usize..];
        let mut ret = false;

        let mut test_triangle = |first_of_triangle: usize| {
            let i0 = subpart.base_vertex + indices[first_of_triangle];
            let i1 = subpart.base_vertex + indices[first_of_triangle + 1];
            let i2 = subpart.base_vertex + indices[first_of_triangle + 2];
            let v0 = self.vertices[i0 as usize].position;
            let v1 = self.vertices[i1 as usize].position;
            let v2 = self.vertices[i2 as usize].position;
            if let Some((d, u, v)) = ray_intersect_triangle(ray_start, ray_dir, v0, v1, v2) {
                if d < distance {
                    hits.push(TriangleHitResult {
                        location: ray_start + ray_dir * d,
                        normal: (v1 - v0).cross(v2 - v0).normalize_or_zero(),
                        uv: Vec2::new(u, v),
                        distance: d,
                        indices: [i0, i1, i2],
                        material: subpart.material,
                    });
                    ret = true;
                }
            }
        };

        if let Some(tree) = &subpart.aabb_tree {
            let indirection = tree.indirection();
            tree.trace_ray(ray_start, ray_dir, distance, |first_slot, count| {
                for t in 0..count {
                    test_triangle(indirection[(first_slot + t) as usize] as usize);
                }
            });
        } else {
            let prim_count = subpart.index_count as usize / 3;
            for tri in 0..prim_count {
                test_triangle(tri * 3);
            }
        }
        ret
    }

    /// Ray intersection across all subparts; appends every hit.
    pub fn raycast(
        &self,
        ray_start: Vec3,
        ray_dir: Vec3,
        distance: f32,
        hits: &mut Vec<TriangleHitResult>,
    ) -> bool {
        let mut ret = false;
        for i in 0..self.subparts.len() {
            ret |= self.raycast_subpart(i, ray_start, ray_dir, distance, hits);
        }
        ret
    }

    /// Closest-hit ray intersection across all subparts.
    #[must_use]
    pub fn raycast_closest(
        &self,
        ray_start: Vec3,
        ray_dir: Vec3,
        distance: f32,
    ) -> Option<TriangleHitResult> {
        if distance < RAYCAST_MIN_DISTANCE {
            return None;
        }

        let mut scratch = Vec::new();
        let mut best: Option<TriangleHitResult> = None;
        let mut max_distance = distance;

        for i in 0..self.subparts.len() {
            scratch.clear();
            self.raycast_subpart(i, ray_start, ray_dir, max_distance, &mut scratch);
            for hit in &scratch {
                if best.is_none_or(|b| hit.distance < b.distance) {
                    best = Some(*hit);
                    max_distance = hit.distance;
                }
            }
        }
        best
    }

    // ========================================================================
    // Procedural helpers (used by tests and collision defaults)
    // ========================================================================

    /// Axis-aligned box mesh with a single subpart.
    #[must_use]
    pub fn create_box(size: Vec3) -> Self {
        let h = size * 0.5;
        let corners = [
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        // Six faces, outward winding
        let faces: [([usize; 4], Vec3); 6] = [
            ([4, 5, 6, 7], Vec3::Z),
            ([1, 0, 3, 2], Vec3::NEG_Z),
            ([5, 1, 2, 6], Vec3::X),
            ([0, 4, 7, 3], Vec3::NEG_X),
            ([7, 6, 2, 3], Vec3::Y),
            ([0, 1, 5, 4], Vec3::NEG_Y),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (face, normal) in faces {
            let base = vertices.len() as u32;
            for (k, &ci) in face.iter().enumerate() {
                let uv = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y][k];
                vertices.push(MeshVertex {
                    position: corners[ci],
                    normal,
                    tex_coord: uv,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let subpart = MeshSubpart::new(0, vertices.len() as u32, 0, indices.len() as u32);
        Self::new("Mesh.Box", vertices, indices, vec![subpart])
    }

    /// Flat plane in XZ with a single subpart.
    #[must_use]
    pub fn create_plane(width: f32, depth: f32) -> Self {
        let hw = width * 0.5;
        let hd = depth * 0.5;
        let vertices = vec![
            MeshVertex {
                position: Vec3::new(-hw, 0.0, -hd),
                normal: Vec3::Y,
                tex_coord: Vec2::ZERO,
            },
            MeshVertex {
                position: Vec3::new(-hw, 0.0, hd),
                normal: Vec3::Y,
                tex_coord: Vec2::Y,
            },
            MeshVertex {
                position: Vec3::new(hw, 0.0, hd),
                normal: Vec3::Y,
                tex_coord: Vec2::ONE,
            },
            MeshVertex {
                position: Vec3::new(hw, 0.0, -hd),
                normal: Vec3::Y,
                tex_coord: Vec2::X,
            },
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        let subpart = MeshSubpart::new(0, 4, 0, 6);
        Self::new("Mesh.Plane", vertices, indices, vec![subpart])
    }
}
