//! Render and shadow instances plus the per-view light definitions.

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::frontend::frame::StreamHandle;
use crate::scene::drawable::Material;
use crate::scene::ComponentKey;
use crate::spatial::BoundingBox;

/// Where an instance's geometry lives: a persistent mesh buffer or
/// per-frame streamed memory (merged surfaces).
#[derive(Debug, Clone, Copy)]
pub enum GeometrySource {
    Mesh {
        /// Backend mesh buffer id.
        mesh: u32,
    },
    Stream {
        vertices: StreamHandle,
        indices: StreamHandle,
    },
}

/// Packs the batch-friendly instance sort key:
/// material priority, dynamic/static bit, mesh id.
#[inline]
#[must_use]
pub fn pack_sort_key(priority: u8, dynamic: bool, mesh_id: u32) -> u64 {
    (u64::from(priority) << 40) | (u64::from(dynamic) << 32) | u64::from(mesh_id)
}

/// One drawable subpart prepared for the backend.
#[derive(Debug, Clone)]
pub struct RenderInstance {
    pub material: Material,
    pub geometry: GeometrySource,
    /// Weights buffer id for skinned geometry; zero when unused.
    pub weights_buffer: u32,

    pub index_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: u32,

    /// Skinned: range of streamed joint matrices.
    pub skeleton_offset: u32,
    pub skeleton_size: u32,
    /// Static lit: lightmap addressing.
    pub lightmap_uv_channel: u32,
    pub lightmap_block: u32,

    /// Projection * view * model.
    pub matrix: Mat4,
    /// Previous-frame equivalent for motion reprojection.
    pub matrix_prev: Mat4,
    pub world_matrix: Mat4,
    pub normal_to_view: Mat3,

    pub sort_key: u64,
}

/// Kind of one shadow map draw list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMapKind {
    /// Cascade `i` of a directional light.
    DirectionalCascade { cascade: u32 },
    /// One face of an omnidirectional cube shadow.
    CubeFace { face: u32 },
}

/// One shadow map with its range into the shadow instance array.
#[derive(Debug, Clone)]
pub struct ShadowMapDef {
    pub light: ComponentKey,
    pub kind: ShadowMapKind,
    /// Light view-projection (reverse-Z).
    pub matrix: Mat4,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// A caster prepared for shadow rendering.
#[derive(Debug, Clone)]
pub struct ShadowRenderInstance {
    pub material: Material,
    pub geometry: GeometrySource,
    pub weights_buffer: u32,

    pub index_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: u32,

    pub skeleton_offset: u32,
    pub skeleton_size: u32,

    pub world_matrix: Mat4,
    /// Bit `i` set when the caster is visible in cascade `i`.
    pub cascade_mask: u32,

    pub sort_key: u64,
}

/// Directional light prepared for the backend.
#[derive(Debug, Clone)]
pub struct DirectionalLightDef {
    pub component: ComponentKey,
    pub color_and_intensity: Vec4,
    /// World-space direction the light shines along.
    pub direction: Vec3,
    pub render_mask: u32,
    pub cast_shadow: bool,
    pub max_shadow_cascades: u32,
    /// Filled by the shadow pass.
    pub first_cascade: u32,
    pub num_cascades: u32,
}

/// Point or spot light prepared for the backend and the cluster grid.
#[derive(Debug, Clone)]
pub struct LightDef {
    pub component: ComponentKey,
    pub spot: bool,
    pub position: Vec3,
    pub color_and_intensity: Vec4,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub inner_cone_cos: f32,
    pub outer_cone_cos: f32,
    pub spot_direction: Vec3,
    pub spot_exponent: f32,
    pub bounding_box: BoundingBox,
    pub obb_transform_inverse: Mat4,
    pub render_mask: u32,
}

/// IBL probe prepared for the backend and the cluster grid.
#[derive(Debug, Clone)]
pub struct ProbeDef {
    pub component: ComponentKey,
    pub position: Vec3,
    pub radius: f32,
    pub irradiance_map: u32,
    pub reflection_map: u32,
    pub bounding_box: BoundingBox,
    pub obb_transform_inverse: Mat4,
}
