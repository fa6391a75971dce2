use std::sync::Arc;

use glam::Affine3A;
use smallvec::SmallVec;

use crate::core::{class_id, ClassId};
use crate::scene::LevelKey;
use crate::spatial::{BoundingBox, Mesh};

/// Lightweight material reference the core passes through to the backend,
/// with the flags the frontend needs for sorting and shadow filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    /// Backend material id.
    pub id: u32,
    /// Sort-key priority; lower draws first.
    pub priority: u8,
    pub translucent: bool,
    pub cast_shadow: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            id: 0,
            priority: 0,
            translucent: false,
            cast_shadow: true,
        }
    }
}

/// The three drawable kinds.
#[derive(Debug)]
pub enum DrawableKind {
    StaticMesh {
        /// Lightmap UV channel for static lit geometry.
        lightmap_uv_channel: u32,
        lightmap_block: u32,
    },
    SkinnedMesh {
        /// Object-space joint pose, written by animation; sockets and the
        /// render skeleton read from it.
        joint_poses: Vec<Affine3A>,
    },
    ProceduralMesh,
}

impl DrawableKind {
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        match self {
            Self::StaticMesh { .. } => class_id("MeshComponent"),
            Self::SkinnedMesh { .. } => class_id("SkinnedComponent"),
            Self::ProceduralMesh => class_id("ProceduralMeshComponent"),
        }
    }
}

/// A scene component that produces render instances.
#[derive(Debug)]
pub struct Drawable {
    pub mesh: Arc<Mesh>,
    pub kind: DrawableKind,
    /// Per-subpart materials; the last entry covers any remaining subparts.
    pub materials: SmallVec<[Material; 4]>,
    /// Rendering-group bits matched against the query's visibility mask.
    pub rendering_group: u32,
    pub visible: bool,
    pub cast_shadow: bool,
    pub outlined: bool,
    /// Mesh id packed into instance sort keys for batch-friendly ordering.
    pub mesh_id: u32,

    /// World-space bounds, refreshed when the owning component's transform
    /// is committed.
    pub(crate) world_bounds: BoundingBox,
    /// World matrix of the previous rendered frame, for motion
    /// reprojection.
    pub(crate) prev_world_matrix: Affine3A,
    /// Areas currently holding this drawable in their movable lists; `-1`
    /// is the outdoor area.
    pub(crate) area_links: SmallVec<[(LevelKey, i32); 4]>,
    /// Frame stamp preventing double emission when several areas see it.
    pub(crate) vis_mark: u64,
}

impl Drawable {
    #[must_use]
    pub fn new(mesh: Arc<Mesh>, kind: DrawableKind) -> Self {
        let bounds = *mesh.bounding_box();
        Self {
            mesh,
            kind,
            materials: SmallVec::from_elem(Material::default(), 1),
            rendering_group: !0,
            visible: true,
            cast_shadow: false,
            outlined: false,
            mesh_id: 0,
            world_bounds: bounds,
            prev_world_matrix: Affine3A::IDENTITY,
            area_links: SmallVec::new(),
            vis_mark: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        matches!(self.kind, DrawableKind::SkinnedMesh { .. })
    }

    #[inline]
    #[must_use]
    pub fn world_bounds(&self) -> &BoundingBox {
        &self.world_bounds
    }

    /// Material for a subpart index, clamped to the last slot.
    #[must_use]
    pub fn material(&self, subpart: usize) -> Material {
        self.materials
            .get(subpart)
            .or_else(|| self.materials.last())
            .copied()
            .unwrap_or_default()
    }

    /// Recomputes world bounds from the mesh bound and a world matrix.
    /// Skinned meshes get their bounds inflated; animation moves vertices
    /// outside the bind-pose bound.
    pub fn update_world_bounds(&mut self, world_matrix: &Affine3A) {
        let local = *self.mesh.bounding_box();
        let local = if self.is_skinned() {
            local.inflate(0.15 * local.size().max_element().max(1.0))
        } else {
            local
        };
        self.world_bounds = local.transform(world_matrix);
    }
}
