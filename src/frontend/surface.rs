//! Brush surface merging.
//!
//! Visible surfaces arrive sorted by their packed key; adjacent surfaces
//! sharing the `(model, lightmap_block, material)` prefix are merged into a
//! single draw by streaming their vertices and rebased indices into frame
//! memory and emitting one instance per run.

use bumpalo::Bump;
use glam::{Mat3, Mat4};

use crate::frontend::frame::StreamedMemory;
use crate::frontend::instance::{pack_sort_key, GeometrySource, RenderInstance};
use crate::scene::drawable::Material;
use crate::spatial::MeshVertex;
use crate::visibility::SurfaceRef;
use crate::world::World;

/// Merges sorted surfaces into streamed draws appended to `out`.
pub(crate) fn merge_and_emit_surfaces(
    world: &World,
    surfaces: &[SurfaceRef],
    view_projection: &Mat4,
    view_projection_prev: &Mat4,
    normal_to_view: Mat3,
    scratch: &Bump,
    stream: &mut StreamedMemory,
    out: &mut Vec<RenderInstance>,
) {
    let mut i = 0;
    while i < surfaces.len() {
        let merge_key = surfaces[i].sort_key & !0xffff;
        let mut run_end = i + 1;
        while run_end < surfaces.len() && surfaces[run_end].sort_key & !0xffff == merge_key {
            run_end += 1;
        }

        let mut vertices = bumpalo::collections::Vec::<MeshVertex>::new_in(scratch);
        let mut indices = bumpalo::collections::Vec::<u32>::new_in(scratch);
        let mut material = 0u16;
        let mut lightmap_block = 0u16;

        for surface_ref in &surfaces[i..run_end] {
            let Some(level) = world.level(surface_ref.level) else {
                continue;
            };
            let surface = &level.bsp.surfaces[surface_ref.surface as usize];
            material = surface.material;
            lightmap_block = surface.lightmap_block;

            let base = vertices.len() as u32;
            let first_vertex = surface.first_vertex as usize;
            vertices.extend_from_slice(
                &level.vertices[first_vertex..first_vertex + surface.num_vertices as usize],
            );

            let first_index = surface.first_index as usize;
            for &index in &level.indices[first_index..first_index + surface.num_indices as usize] {
                indices.push(base + (index - surface.first_vertex));
            }
        }

        if !indices.is_empty() {
            let vertex_stream = stream.allocate(&vertices[..]);
            let index_stream = stream.allocate(&indices[..]);

            out.push(RenderInstance {
                material: Material {
                    id: u32::from(material),
                    priority: 0,
                    translucent: false,
                    cast_shadow: true,
                },
                geometry: GeometrySource::Stream {
                    vertices: vertex_stream,
                    indices: index_stream,
                },
                weights_buffer: 0,
                index_count: indices.len() as u32,
                start_index_location: 0,
                base_vertex_location: 0,
                skeleton_offset: 0,
                skeleton_size: 0,
                lightmap_uv_channel: 0,
                lightmap_block: u32::from(lightmap_block),
                // Brush geometry is world-space: model is identity
                matrix: *view_projection,
                matrix_prev: *view_projection_prev,
                world_matrix: Mat4::IDENTITY,
                normal_to_view,
                sort_key: pack_sort_key(0, false, u32::from(material)),
            });
        }

        i = run_end;
    }
}
