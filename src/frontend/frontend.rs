//! The render frontend.
//!
//! For each viewport: build the [`RenderView`], run the visibility query,
//! turn visible drawables into render instances (translucent and outlined
//! instances split into their own lists), merge brush surfaces, build
//! shadow draw lists per directional cascade and per point-light cube face,
//! and voxelize lights/probes into the cluster grid. The frontend never
//! renders; it only produces the frame packet.

use bumpalo::Bump;
use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::frontend::frame::FramePacket;
use crate::frontend::instance::{
    pack_sort_key, DirectionalLightDef, GeometrySource, LightDef, ProbeDef, RenderInstance,
    ShadowMapDef, ShadowMapKind, ShadowRenderInstance,
};
use crate::frontend::surface::merge_and_emit_surfaces;
use crate::frontend::view::{RenderView, VignetteParams};
use crate::scene::component::SceneKind;
use crate::scene::drawable::{Drawable, DrawableKind};
use crate::scene::light::AnalyticLightKind;
use crate::scene::{CameraComponent, ComponentKey};
use crate::spatial::Frustum;
use crate::visibility::{
    create_directional_light_cascades, ClusterItem, LightVoxelizer, QueryMask, VisibilityQuery,
    VisibilityResult,
};
use crate::world::World;

/// Near plane of omnidirectional shadow faces.
const CUBE_SHADOW_Z_NEAR: f32 = 0.05;

/// Per-viewport rendering setup provided by the windowing layer.
#[derive(Debug, Clone)]
pub struct RenderingParameters {
    pub visibility_mask: u32,
    pub background_color: Vec3,
    pub clear_background: bool,
    /// Backend LUT reference; zero disables color grading.
    pub color_grading_lut: u32,
    /// Backend exposure texture reference.
    pub current_exposure: u32,
    pub vignette: Option<VignetteParams>,
    pub draw_debug: bool,

    // Previous-frame camera matrices, kept here so motion reprojection
    // survives camera cuts per viewport
    pub(crate) view_matrix_prev: Mat4,
    pub(crate) projection_matrix_prev: Mat4,
}

impl Default for RenderingParameters {
    fn default() -> Self {
        Self {
            visibility_mask: !0,
            background_color: Vec3::ZERO,
            clear_background: true,
            color_grading_lut: 0,
            current_exposure: 0,
            vignette: None,
            draw_debug: false,
            view_matrix_prev: Mat4::IDENTITY,
            projection_matrix_prev: Mat4::IDENTITY,
        }
    }
}

/// A viewport handed to the frontend by the windowing layer.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Camera scene component driving the view.
    pub camera: ComponentKey,
    pub rendering_params: RenderingParameters,
}

/// Builds frame packets from worlds and viewports.
pub struct RenderFrontend {
    frame_number: u64,
    packet: FramePacket,
    voxelizer: LightVoxelizer,
    visibility: VisibilityResult,
    scratch: Bump,
}

impl Default for RenderFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderFrontend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame_number: 0,
            packet: FramePacket::default(),
            voxelizer: LightVoxelizer::new(),
            visibility: VisibilityResult::default(),
            scratch: Bump::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Resets the packet and frame scratch for a new frame.
    pub fn begin_frame(&mut self) {
        self.frame_number += 1;
        self.packet.reset(self.frame_number);
        self.scratch.reset();
    }

    /// The packet built so far this frame.
    #[inline]
    #[must_use]
    pub fn frame_packet(&self) -> &FramePacket {
        &self.packet
    }

    /// Renders one viewport into the frame packet.
    pub fn render_view(&mut self, world: &mut World, viewport: &mut Viewport) {
        let camera_world = world.world_transform_matrix(viewport.camera);
        let Some(camera) = world
            .scene_of(viewport.camera)
            .and_then(|s| match &s.kind {
                SceneKind::Camera(c) => Some(c.clone()),
                _ => None,
            })
        else {
            log::warn!("render_view: viewport camera is not a camera component");
            return;
        };
        let mut camera: CameraComponent = camera;
        camera.aspect = viewport.width as f32 / viewport.height.max(1) as f32;

        let rp = &mut viewport.rendering_params;

        // === Camera matrices ===
        let view_matrix = CameraComponent::view_matrix(&camera_world);
        let projection_matrix = camera.projection_matrix();
        let view_projection = projection_matrix * view_matrix;
        let view_projection_prev = rp.projection_matrix_prev * rp.view_matrix_prev;

        let basis = Mat3::from_mat4(Mat4::from(camera_world));
        let view_position: Vec3 = camera_world.translation.into();
        let view_right = basis.x_axis;
        let view_up = basis.y_axis;
        let view_dir = -basis.z_axis;

        let cluster_projection = camera.cluster_projection_matrix();
        let cluster_view_projection = cluster_projection * view_matrix;

        let mut view = RenderView {
            view_index: self.packet.views.len() as u32,
            width: viewport.width,
            height: viewport.height,
            game_running_time_seconds: world.running_time_micro() as f64 * 1e-6,
            gameplay_time_seconds: world.gameplay_time_micro() as f64 * 1e-6,
            view_position,
            view_right,
            view_up,
            view_dir,
            view_matrix,
            projection_matrix,
            view_projection,
            view_matrix_prev: rp.view_matrix_prev,
            projection_matrix_prev: rp.projection_matrix_prev,
            view_projection_prev,
            inverse_projection_matrix: projection_matrix.inverse(),
            view_space_to_world_space: view_matrix.inverse(),
            clip_space_to_world_space: view_matrix.inverse() * projection_matrix.inverse(),
            normal_to_view_matrix: Mat3::from_mat4(view_matrix),
            z_near: camera.z_near(),
            z_far: camera.cluster_z_far,
            perspective: camera.is_perspective(),
            cluster_projection_matrix: cluster_projection,
            cluster_view_projection,
            background_color: rp.background_color,
            clear_background: rp.clear_background,
            vignette: rp.vignette,
            color_grading_lut: rp.color_grading_lut,
            current_exposure: rp.current_exposure,
            first_instance: self.packet.instances.len() as u32,
            first_translucent_instance: self.packet.translucent_instances.len() as u32,
            first_outline_instance: self.packet.outline_instances.len() as u32,
            first_shadow_map: self.packet.shadow_maps.len() as u32,
            first_directional_light: self.packet.directional_lights.len() as u32,
            first_light: self.packet.lights.len() as u32,
            first_probe: self.packet.probes.len() as u32,
            first_debug_draw_command: self.packet.debug_draw.len() as u32,
            ..Default::default()
        };

        rp.view_matrix_prev = view_matrix;
        rp.projection_matrix_prev = projection_matrix;

        // === Visibility ===
        let query = VisibilityQuery {
            frustum: Frustum::from_view_projection(&view_projection),
            view_position,
            view_right,
            view_up,
            visibility_mask: rp.visibility_mask,
            query_mask: QueryMask::VISIBLE | QueryMask::VISIBLE_IN_LIGHT_PASS,
        };
        let visibility_mask = rp.visibility_mask;
        world.query_visible_primitives(&query, &mut self.visibility);

        // === Lights & probes ===
        self.add_light_defs(world);
        self.voxelize_clusters(&cluster_view_projection, &mut view);

        // === Drawable instances ===
        for i in 0..self.visibility.drawables.len() {
            let key = self.visibility.drawables[i];
            self.add_drawable_instances(world, key, &view_matrix, &view_projection, &view_projection_prev);
        }

        // Batch-friendly ordering inside this view's range
        let opaque_range = view.first_instance as usize..self.packet.instances.len();
        self.packet.instances[opaque_range].sort_by_key(|i| i.sort_key);
        let translucent_range =
            view.first_translucent_instance as usize..self.packet.translucent_instances.len();
        self.packet.translucent_instances[translucent_range].sort_by_key(|i| i.sort_key);

        // === Brush surfaces ===
        merge_and_emit_surfaces(
            world,
            &self.visibility.surfaces,
            &view_projection,
            &view_projection_prev,
            Mat3::from_mat4(view_matrix),
            &self.scratch,
            &mut self.packet.stream,
            &mut self.packet.instances,
        );

        // === Shadow draw lists ===
        self.add_directional_shadowmaps(
            world,
            &mut view,
            view_position,
            basis,
            &camera.projection,
            camera.aspect,
            visibility_mask,
        );
        self.add_cube_shadowmaps(world, &view, visibility_mask);

        // === Finalize ranges ===
        view.instance_count = self.packet.instances.len() as u32 - view.first_instance;
        view.translucent_instance_count =
            self.packet.translucent_instances.len() as u32 - view.first_translucent_instance;
        view.outline_instance_count =
            self.packet.outline_instances.len() as u32 - view.first_outline_instance;
        view.shadow_map_count = self.packet.shadow_maps.len() as u32 - view.first_shadow_map;
        view.directional_light_count =
            self.packet.directional_lights.len() as u32 - view.first_directional_light;
        view.light_count = self.packet.lights.len() as u32 - view.first_light;
        view.probe_count = self.packet.probes.len() as u32 - view.first_probe;
        view.debug_draw_command_count =
            self.packet.debug_draw.len() as u32 - view.first_debug_draw_command;

        self.packet.views.push(view);
    }

    // ========================================================================
    // Lights
    // ========================================================================

    fn add_light_defs(&mut self, world: &World) {
        for &key in &self.visibility.directional_lights {
            let Some(scene) = world.scene_of(key) else {
                continue;
            };
            let SceneKind::DirectionalLight(light) = &scene.kind else {
                continue;
            };
            let world_matrix = world.world_transform_matrix(key);
            let direction = world_matrix.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
            self.packet.directional_lights.push(DirectionalLightDef {
                component: key,
                color_and_intensity: Vec4::new(
                    light.color.x,
                    light.color.y,
                    light.color.z,
                    light.intensity,
                ),
                direction,
                render_mask: light.rendering_group,
                cast_shadow: light.cast_shadow,
                max_shadow_cascades: light.max_shadow_cascades,
                first_cascade: 0,
                num_cascades: 0,
            });
        }

        for &key in &self.visibility.lights {
            let Some(scene) = world.scene_of(key) else {
                continue;
            };
            let SceneKind::Light(light) = &scene.kind else {
                continue;
            };
            let world_matrix = world.world_transform_matrix(key);
            let position: Vec3 = world_matrix.translation.into();
            let spot_direction = world_matrix.transform_vector3(Vec3::NEG_Z).normalize_or_zero();

            let (spot, inner_cone_cos, outer_cone_cos, spot_exponent) = match light.kind {
                AnalyticLightKind::Point => (false, 0.0, 0.0, 0.0),
                AnalyticLightKind::Spot {
                    inner_cone,
                    outer_cone,
                    exponent,
                } => (true, inner_cone.cos(), outer_cone.cos(), exponent),
            };

            self.packet.lights.push(LightDef {
                component: key,
                spot,
                position,
                color_and_intensity: Vec4::new(
                    light.color.x,
                    light.color.y,
                    light.color.z,
                    light.intensity,
                ),
                inner_radius: light.inner_radius,
                outer_radius: light.outer_radius,
                inner_cone_cos,
                outer_cone_cos,
                spot_direction,
                spot_exponent,
                bounding_box: *light.world_bounds(),
                obb_transform_inverse: *light.obb_transform_inverse(),
                render_mask: light.rendering_group,
            });
        }

        for &key in &self.visibility.probes {
            let Some(scene) = world.scene_of(key) else {
                continue;
            };
            let SceneKind::IblProbe(probe) = &scene.kind else {
                continue;
            };
            let world_matrix = world.world_transform_matrix(key);
            self.packet.probes.push(ProbeDef {
                component: key,
                position: world_matrix.translation.into(),
                radius: probe.radius,
                irradiance_map: probe.irradiance_map,
                reflection_map: probe.reflection_map,
                bounding_box: *probe.world_bounds(),
                obb_transform_inverse: *probe.obb_transform_inverse(),
            });
        }
    }

    fn voxelize_clusters(&mut self, cluster_view_projection: &Mat4, view: &mut RenderView) {
        let first_light = view.first_light as usize;
        let light_items: Vec<ClusterItem> = self.packet.lights[first_light..]
            .iter()
            .enumerate()
            .map(|(i, l)| ClusterItem {
                index: i as u32,
                bounds: l.bounding_box,
                obb_transform_inverse: l.obb_transform_inverse,
            })
            .collect();
        let first_probe = view.first_probe as usize;
        let probe_items: Vec<ClusterItem> = self.packet.probes[first_probe..]
            .iter()
            .enumerate()
            .map(|(i, p)| ClusterItem {
                index: i as u32,
                bounds: p.bounding_box,
                obb_transform_inverse: p.obb_transform_inverse,
            })
            .collect();

        self.voxelizer
            .voxelize(cluster_view_projection, &light_items, &probe_items);

        view.cluster_header_stream = self.packet.stream.allocate(self.voxelizer.headers());
        view.cluster_item_stream = self.packet.stream.allocate(self.voxelizer.items());
    }

    // ========================================================================
    // Drawables
    // ========================================================================

    fn add_drawable_instances(
        &mut self,
        world: &mut World,
        key: ComponentKey,
        view_matrix: &Mat4,
        view_projection: &Mat4,
        view_projection_prev: &Mat4,
    ) {
        let world_matrix = world.world_transform_matrix(key);
        let Some(drawable) = world.scene_of_mut(key).and_then(|s| s.as_drawable_mut()) else {
            return;
        };

        let model = Mat4::from(world_matrix);
        let model_prev = Mat4::from(drawable.prev_world_matrix);
        drawable.prev_world_matrix = world_matrix;

        let normal_to_view = Mat3::from_mat4(*view_matrix * model)
            .inverse()
            .transpose();

        let dynamic = !matches!(drawable.kind, DrawableKind::StaticMesh { .. });
        let (skeleton_offset, skeleton_size) = self.stream_skeleton(drawable);
        let (lightmap_uv_channel, lightmap_block) = match drawable.kind {
            DrawableKind::StaticMesh {
                lightmap_uv_channel,
                lightmap_block,
            } => (lightmap_uv_channel, lightmap_block),
            _ => (0, 0),
        };
        let weights_buffer = if drawable.is_skinned() { drawable.mesh_id } else { 0 };

        for (subpart_index, subpart) in drawable.mesh.subparts().iter().enumerate() {
            let material = drawable.material(subpart_index);
            let instance = RenderInstance {
                material,
                geometry: GeometrySource::Mesh {
                    mesh: drawable.mesh_id,
                },
                weights_buffer,
                index_count: subpart.index_count,
                start_index_location: subpart.first_index,
                base_vertex_location: subpart.base_vertex,
                skeleton_offset,
                skeleton_size,
                lightmap_uv_channel,
                lightmap_block,
                matrix: *view_projection * model,
                matrix_prev: *view_projection_prev * model_prev,
                world_matrix: model,
                normal_to_view,
                sort_key: pack_sort_key(material.priority, dynamic, drawable.mesh_id),
            };

            if material.translucent {
                self.packet.translucent_instances.push(instance.clone());
            } else {
                self.packet.instances.push(instance.clone());
            }
            if drawable.outlined {
                self.packet.outline_instances.push(instance);
            }
        }
    }

    /// Streams a skinned drawable's joint matrices; zero range otherwise.
    fn stream_skeleton(&mut self, drawable: &Drawable) -> (u32, u32) {
        if let DrawableKind::SkinnedMesh { joint_poses } = &drawable.kind {
            if !joint_poses.is_empty() {
                let matrices: Vec<Mat4> = joint_poses.iter().map(|p| Mat4::from(*p)).collect();
                let handle = self.packet.stream.allocate(&matrices);
                return (handle.offset, handle.size);
            }
        }
        (0, 0)
    }

    // ========================================================================
    // Shadow maps
    // ========================================================================

    fn add_directional_shadowmaps(
        &mut self,
        world: &mut World,
        view: &mut RenderView,
        view_position: Vec3,
        view_basis: Mat3,
        projection: &crate::scene::camera::CameraProjection,
        aspect: f32,
        visibility_mask: u32,
    ) {
        let mut cascade_matrices: Vec<Mat4> = Vec::new();

        for def_index in view.first_directional_light as usize..self.packet.directional_lights.len()
        {
            let (component, cast_shadow, max_cascades) = {
                let def = &self.packet.directional_lights[def_index];
                (def.component, def.cast_shadow, def.max_shadow_cascades)
            };
            if !cast_shadow {
                continue;
            }

            let light_world = world.world_transform_matrix(component);
            let light_basis = Mat3::from_mat4(Mat4::from(light_world)).transpose();
            let cascades = create_directional_light_cascades(
                view_position,
                view_basis,
                projection,
                aspect,
                light_basis,
                max_cascades,
            );
            let casters = world.query_shadow_casters(&cascades, visibility_mask);

            {
                let def = &mut self.packet.directional_lights[def_index];
                def.first_cascade = cascade_matrices.len() as u32;
                def.num_cascades = cascades.matrices.len() as u32;
            }

            for (cascade_index, matrix) in cascades.matrices.iter().enumerate() {
                let first_instance = self.packet.shadow_instances.len() as u32;
                for &(caster, mask) in &casters {
                    if mask & (1 << cascade_index) == 0 {
                        continue;
                    }
                    self.add_shadow_instances(world, caster, mask);
                }
                self.packet.shadow_maps.push(ShadowMapDef {
                    light: component,
                    kind: ShadowMapKind::DirectionalCascade {
                        cascade: cascade_index as u32,
                    },
                    matrix: *matrix,
                    first_instance,
                    instance_count: self.packet.shadow_instances.len() as u32 - first_instance,
                });
            }
            cascade_matrices.extend_from_slice(&cascades.matrices);
        }

        view.shadow_cascade_matrices = self.packet.stream.allocate(&cascade_matrices);
        view.num_shadow_cascades = cascade_matrices.len() as u32;
    }

    /// Omnidirectional cube shadows: six reverse-Z perspective views.
    fn add_cube_shadowmaps(&mut self, world: &mut World, view: &RenderView, visibility_mask: u32) {
        // (forward, up) per cube face, +X -X +Y -Y +Z -Z
        const FACES: [(Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::Z),
            (Vec3::Z, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y),
        ];

        for def_index in view.first_light as usize..self.packet.lights.len() {
            let (component, position, outer_radius, spot) = {
                let def = &self.packet.lights[def_index];
                (def.component, def.position, def.outer_radius, def.spot)
            };
            if spot {
                continue;
            }
            let casts = world
                .scene_of(component)
                .and_then(|s| match &s.kind {
                    SceneKind::Light(l) => Some(l.cast_shadow),
                    _ => None,
                })
                .unwrap_or(false);
            if !casts {
                continue;
            }

            for (face, (forward, up)) in FACES.iter().enumerate() {
                let face_view = Mat4::look_at_rh(position, position + *forward, *up);
                let render_projection = Mat4::perspective_infinite_reverse_rh(
                    std::f32::consts::FRAC_PI_2,
                    1.0,
                    CUBE_SHADOW_Z_NEAR,
                );
                // Culling uses the light's finite reach
                let cull_projection = Mat4::perspective_rh(
                    std::f32::consts::FRAC_PI_2,
                    1.0,
                    CUBE_SHADOW_Z_NEAR,
                    outer_radius.max(CUBE_SHADOW_Z_NEAR * 2.0),
                );
                let cull_frustum = Frustum::from_view_projection(&(cull_projection * face_view));
                let casters = world.query_shadow_casters_single(&cull_frustum, visibility_mask);
                if casters.is_empty() {
                    continue;
                }

                let first_instance = self.packet.shadow_instances.len() as u32;
                for caster in casters {
                    self.add_shadow_instances(world, caster, !0);
                }
                self.packet.shadow_maps.push(ShadowMapDef {
                    light: component,
                    kind: ShadowMapKind::CubeFace { face: face as u32 },
                    matrix: render_projection * face_view,
                    first_instance,
                    instance_count: self.packet.shadow_instances.len() as u32 - first_instance,
                });
            }
        }
    }

    /// Emits one shadow instance per subpart of a caster, filtering
    /// materials that cannot cast shadow.
    fn add_shadow_instances(&mut self, world: &mut World, caster: ComponentKey, cascade_mask: u32) {
        let world_matrix = world.world_transform_matrix(caster);
        let Some(drawable) = world.scene_of(caster).and_then(|s| s.as_drawable()) else {
            return;
        };

        let (skeleton_offset, skeleton_size) = self.stream_skeleton(drawable);
        let weights_buffer = if drawable.is_skinned() { drawable.mesh_id } else { 0 };
        let dynamic = !matches!(drawable.kind, DrawableKind::StaticMesh { .. });

        for (subpart_index, subpart) in drawable.mesh.subparts().iter().enumerate() {
            let material = drawable.material(subpart_index);
            if !material.cast_shadow {
                continue;
            }
            self.packet.shadow_instances.push(ShadowRenderInstance {
                material,
                geometry: GeometrySource::Mesh {
                    mesh: drawable.mesh_id,
                },
                weights_buffer,
                index_count: subpart.index_count,
                start_index_location: subpart.first_index,
                base_vertex_location: subpart.base_vertex,
                skeleton_offset,
                skeleton_size,
                world_matrix: Mat4::from(world_matrix),
                cascade_mask,
                sort_key: pack_sort_key(material.priority, dynamic, drawable.mesh_id),
            });
        }
    }
}
