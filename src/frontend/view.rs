//! The per-view header of a frame packet.

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::frontend::frame::StreamHandle;

/// Vignette parameters passed through to the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct VignetteParams {
    pub color_intensity: Vec4,
    pub outer_radius_sqr: f32,
    pub inner_radius_sqr: f32,
}

/// Camera matrices, post-processing references and the ranges this view
/// occupies in the frame packet's shared arrays.
#[derive(Debug, Clone, Default)]
pub struct RenderView {
    pub view_index: u32,
    pub width: u32,
    pub height: u32,

    pub game_running_time_seconds: f64,
    pub gameplay_time_seconds: f64,

    // === Camera ===
    pub view_position: Vec3,
    pub view_right: Vec3,
    pub view_up: Vec3,
    pub view_dir: Vec3,
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
    pub view_projection: Mat4,
    /// Previous-frame matrices for motion reprojection.
    pub view_matrix_prev: Mat4,
    pub projection_matrix_prev: Mat4,
    pub view_projection_prev: Mat4,
    pub inverse_projection_matrix: Mat4,
    pub view_space_to_world_space: Mat4,
    pub clip_space_to_world_space: Mat4,
    pub normal_to_view_matrix: Mat3,
    pub z_near: f32,
    pub z_far: f32,
    pub perspective: bool,

    // === Clustered shading ===
    pub cluster_projection_matrix: Mat4,
    pub cluster_view_projection: Mat4,
    pub cluster_header_stream: StreamHandle,
    pub cluster_item_stream: StreamHandle,

    // === Post processing ===
    pub background_color: Vec3,
    pub clear_background: bool,
    pub vignette: Option<VignetteParams>,
    /// Backend LUT reference; zero when color grading is off.
    pub color_grading_lut: u32,
    /// Backend exposure texture reference.
    pub current_exposure: u32,

    // === Shadow cascades ===
    /// Streamed cascade view-projection matrices of this view.
    pub shadow_cascade_matrices: StreamHandle,
    pub num_shadow_cascades: u32,

    // === Ranges into the packet arrays ===
    pub first_instance: u32,
    pub instance_count: u32,
    pub first_translucent_instance: u32,
    pub translucent_instance_count: u32,
    pub first_outline_instance: u32,
    pub outline_instance_count: u32,
    pub first_shadow_map: u32,
    pub shadow_map_count: u32,
    pub first_directional_light: u32,
    pub directional_light_count: u32,
    pub first_light: u32,
    pub light_count: u32,
    pub first_probe: u32,
    pub probe_count: u32,
    pub first_debug_draw_command: u32,
    pub debug_draw_command_count: u32,
}
