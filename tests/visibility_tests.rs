//! Visibility and render frontend tests
//!
//! Tests for:
//! - Portal flood visibility across areas (and its frustum clipping)
//! - Frustum culling of outdoor drawables
//! - Shadow cascade bitmasks and per-cascade shadow lists
//! - Brush surface merging into streamed draws
//! - Light defs and cluster streams in the frame packet

use std::any::Any;
use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use glam::{Mat3, Quat, Vec3};
use saga::core::{ClassDescriptor, ObjectFactory};
use saga::frontend::{GeometrySource, RenderFrontend, RenderingParameters, ShadowMapKind, Viewport};
use saga::scene::camera::{CameraComponent, CameraProjection};
use saga::scene::drawable::{Drawable, DrawableKind};
use saga::scene::light::{AnalyticLight, DirectionalLight};
use saga::scene::{ActorScript, ComponentKey, ScriptContext, SceneKind};
use saga::spatial::bsp::{BspLeaf, SurfaceDef};
use saga::spatial::{BoundingBox, Mesh, MeshVertex};
use saga::visibility::{create_directional_light_cascades, QueryMask, VisibilityQuery, VisibilityResult};
use saga::world::{SpawnInfo, World, WorldContext};

const DT: f32 = 1.0 / 60.0;

// ============================================================================
// Helpers
// ============================================================================

struct EmptyActor;

impl ActorScript for EmptyActor {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn on_spawn(&mut self, ctx: &mut ScriptContext) {
        ctx.world
            .create_scene_component(ctx.actor, "Root", SceneKind::Plain)
            .unwrap();
    }
}

fn test_world() -> World {
    let mut factory = ObjectFactory::new("Actor factory");
    factory.register(ClassDescriptor::new("Empty", None, || {
        Box::new(EmptyActor) as Box<dyn ActorScript>
    }));
    World::create(WorldContext::new(Arc::new(factory))).unwrap()
}

fn spawn_camera(world: &mut World, position: Vec3, rotation: Quat) -> ComponentKey {
    let actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let camera = world
        .create_scene_component(
            actor,
            "Camera",
            SceneKind::Camera(CameraComponent::perspective(60.0, 1.0, 0.1)),
        )
        .unwrap();
    world.set_component_transform(camera, position, rotation, Vec3::ONE);
    camera
}

fn spawn_box_drawable(world: &mut World, position: Vec3, cast_shadow: bool) -> ComponentKey {
    let actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let mesh = Arc::new(Mesh::create_box(Vec3::ONE));
    let mut drawable = Drawable::new(
        mesh,
        DrawableKind::StaticMesh {
            lightmap_uv_channel: 0,
            lightmap_block: 0,
        },
    );
    drawable.cast_shadow = cast_shadow;
    drawable.mesh_id = 1;
    let key = world
        .create_scene_component(actor, "Box", SceneKind::Drawable(drawable))
        .unwrap();
    world.set_component_position(key, position);
    key
}

fn camera_query(world: &World, camera: ComponentKey) -> VisibilityQuery {
    let world_matrix = world.world_transform_matrix(camera);
    let scene = world.component(camera).unwrap().scene.as_ref().unwrap();
    let SceneKind::Camera(cam) = &scene.kind else {
        panic!("not a camera");
    };
    let basis = Mat3::from_quat(world_matrix.to_scale_rotation_translation().1);
    VisibilityQuery {
        frustum: cam.frustum(&world_matrix),
        view_position: world_matrix.translation.into(),
        view_right: basis.x_axis,
        view_up: basis.y_axis,
        visibility_mask: !0,
        query_mask: QueryMask::VISIBLE,
    }
}

// ============================================================================
// Portal visibility
// ============================================================================

/// Two rooms split at x = 0, joined by a 2x2 portal.
fn build_two_room_level(world: &mut World) -> (i32, i32) {
    let persistent = world.persistent_level();
    let level = world.level_mut(persistent).unwrap();
    let a1 = level.create_area(Vec3::new(-5.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);
    let a2 = level.create_area(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);

    // Wound counter-clockwise as seen from a1 (the -X side)
    let points = [
        Vec3::new(0.0, -1.0, -1.0),
        Vec3::new(0.0, -1.0, 1.0),
        Vec3::new(0.0, 1.0, 1.0),
        Vec3::new(0.0, 1.0, -1.0),
    ];
    level.create_portal(&points, a1, a2).unwrap();
    (a1, a2)
}

#[test]
fn drawable_behind_portal_is_visible_through_it() {
    let mut world = test_world();
    build_two_room_level(&mut world);

    // Camera in area 1 facing +X toward the portal
    let camera = spawn_camera(
        &mut world,
        Vec3::new(-5.0, 0.0, 0.0),
        Quat::from_rotation_y(-FRAC_PI_2),
    );
    let drawable = spawn_box_drawable(&mut world, Vec3::new(5.0, 0.0, 0.0), false);
    world.tick(DT);

    let query = camera_query(&world, camera);
    let mut result = VisibilityResult::default();
    world.query_visible_primitives(&query, &mut result);
    assert!(
        result.drawables.contains(&drawable),
        "drawable should be visible through the portal"
    );

    // Rotate the camera 180 degrees: the portal is behind, the flood never
    // leaves area 1
    world.set_component_rotation(camera, Quat::from_rotation_y(FRAC_PI_2));
    let query = camera_query(&world, camera);
    world.query_visible_primitives(&query, &mut result);
    assert!(!result.drawables.contains(&drawable));
}

#[test]
fn portal_frustum_clips_off_axis_drawables() {
    let mut world = test_world();
    build_two_room_level(&mut world);

    let camera = spawn_camera(
        &mut world,
        Vec3::new(-5.0, 0.0, 0.0),
        Quat::from_rotation_y(-FRAC_PI_2),
    );
    // Inside area 2 but far off the portal's sight line
    let hidden = spawn_box_drawable(&mut world, Vec3::new(5.0, 0.0, 4.0), false);
    let seen = spawn_box_drawable(&mut world, Vec3::new(5.0, 0.0, 0.0), false);
    world.tick(DT);

    let query = camera_query(&world, camera);
    let mut result = VisibilityResult::default();
    world.query_visible_primitives(&query, &mut result);
    assert!(result.drawables.contains(&seen));
    assert!(
        !result.drawables.contains(&hidden),
        "the clipped portal frustum must cull off-axis drawables"
    );
}

#[test]
fn outdoor_drawables_frustum_cull() {
    let mut world = test_world();
    // No areas: everything is outdoor
    let camera = spawn_camera(&mut world, Vec3::ZERO, Quat::IDENTITY);
    let in_front = spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, -10.0), false);
    let behind = spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, 10.0), false);
    world.tick(DT);

    let query = camera_query(&world, camera);
    let mut result = VisibilityResult::default();
    world.query_visible_primitives(&query, &mut result);
    assert!(result.drawables.contains(&in_front));
    assert!(!result.drawables.contains(&behind));
}

// ============================================================================
// Shadow cascades
// ============================================================================

#[test]
fn caster_in_one_slice_gets_single_cascade_bit() {
    let mut world = test_world();
    // Mesh fully inside cascade 2's depth slice [16, 64]
    let drawable = spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, -30.0), true);
    world.tick(DT);

    let cascades = create_directional_light_cascades(
        Vec3::ZERO,
        Mat3::IDENTITY,
        &CameraProjection::Perspective {
            fov_y: 60f32.to_radians(),
            z_near: 0.1,
        },
        1.0,
        Mat3::IDENTITY,
        4,
    );
    let casters = world.query_shadow_casters(&cascades, !0);
    assert_eq!(casters.len(), 1);
    assert_eq!(casters[0].0, drawable);
    assert_eq!(casters[0].1, 0b0100, "cascade mask");
}

#[test]
fn shadow_instances_land_only_in_masked_cascade_lists() {
    let mut world = test_world();
    let camera = spawn_camera(&mut world, Vec3::ZERO, Quat::IDENTITY);
    spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, -30.0), true);

    // Sun with identity rotation shines along -Z like the camera
    let sun_actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    world
        .create_scene_component(
            sun_actor,
            "Sun",
            SceneKind::DirectionalLight(DirectionalLight::new(Vec3::ONE, 2.0)),
        )
        .unwrap();
    world.tick(DT);

    let mut frontend = RenderFrontend::new();
    let mut viewport = Viewport {
        width: 512,
        height: 512,
        camera,
        rendering_params: RenderingParameters::default(),
    };
    frontend.begin_frame();
    frontend.render_view(&mut world, &mut viewport);
    let packet = frontend.frame_packet();

    assert_eq!(packet.directional_lights.len(), 1);
    let mut populated = Vec::new();
    for map in &packet.shadow_maps {
        if let ShadowMapKind::DirectionalCascade { cascade } = map.kind {
            if map.instance_count > 0 {
                populated.push(cascade);
            }
        }
    }
    assert_eq!(populated, vec![2], "caster must appear only in cascade 2");
}

// ============================================================================
// Frame packet
// ============================================================================

#[test]
fn translucent_materials_split_into_their_own_list() {
    let mut world = test_world();
    let camera = spawn_camera(&mut world, Vec3::ZERO, Quat::IDENTITY);
    let drawable = spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, -5.0), false);
    {
        let component = world.component_mut(drawable).unwrap();
        let d = component.scene.as_mut().unwrap().as_drawable_mut().unwrap();
        d.materials[0].translucent = true;
    }
    world.tick(DT);

    let mut frontend = RenderFrontend::new();
    let mut viewport = Viewport {
        width: 256,
        height: 256,
        camera,
        rendering_params: RenderingParameters::default(),
    };
    frontend.begin_frame();
    frontend.render_view(&mut world, &mut viewport);
    let packet = frontend.frame_packet();

    assert_eq!(packet.instances.len(), 0);
    assert_eq!(packet.translucent_instances.len(), 1);
    let view = &packet.views[0];
    assert_eq!(view.translucent_instance_count, 1);
}

#[test]
fn brush_surfaces_merge_into_one_streamed_draw() {
    let mut world = test_world();
    let camera = spawn_camera(&mut world, Vec3::ZERO, Quat::IDENTITY);

    // Two quads in front of the camera sharing material and lightmap block
    {
        let persistent = world.persistent_level();
        let level = world.level_mut(persistent).unwrap();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut surfaces = Vec::new();
        for x in [-1.5f32, 0.5] {
            let first_vertex = vertices.len() as u32;
            let first_index = indices.len() as u32;
            for (dx, dy) in [(0.0f32, 0.0f32), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                vertices.push(MeshVertex::from_position(Vec3::new(x + dx, dy, -5.0)));
            }
            indices.extend_from_slice(&[
                first_vertex,
                first_vertex + 1,
                first_vertex + 2,
                first_vertex,
                first_vertex + 2,
                first_vertex + 3,
            ]);
            surfaces.push(SurfaceDef {
                bounds: BoundingBox::new(Vec3::new(x, 0.0, -5.1), Vec3::new(x + 1.0, 1.0, -4.9)),
                first_vertex,
                num_vertices: 4,
                first_index,
                num_indices: 6,
                material: 3,
                lightmap_block: 0,
                ..Default::default()
            });
        }
        level.vertices = vertices;
        level.indices = indices;
        level.bsp.surfaces = surfaces;
        level.bsp.mark_surfaces = vec![0, 1];
        let mut leaf = BspLeaf::new(
            BoundingBox::new(Vec3::splat(-100.0), Vec3::splat(100.0)),
            0,
            0,
        );
        leaf.first_mark_surface = 0;
        leaf.num_mark_surfaces = 2;
        level.bsp.leafs.push(leaf);
    }
    world.tick(DT);

    let mut frontend = RenderFrontend::new();
    let mut viewport = Viewport {
        width: 256,
        height: 256,
        camera,
        rendering_params: RenderingParameters::default(),
    };
    frontend.begin_frame();
    frontend.render_view(&mut world, &mut viewport);
    let packet = frontend.frame_packet();

    let streamed: Vec<_> = packet
        .instances
        .iter()
        .filter(|i| matches!(i.geometry, GeometrySource::Stream { .. }))
        .collect();
    assert_eq!(streamed.len(), 1, "both surfaces share one merged draw");
    assert_eq!(streamed[0].index_count, 12);
    assert_eq!(streamed[0].material.id, 3);

    // The streamed vertex data is readable through the packet
    let GeometrySource::Stream { vertices, indices } = streamed[0].geometry else {
        panic!("expected streamed geometry");
    };
    assert_eq!(packet.stream.read::<MeshVertex>(vertices).len(), 8);
    assert_eq!(packet.stream.read::<u32>(indices).len(), 12);
}

#[test]
fn point_light_defs_and_cluster_streams() {
    let mut world = test_world();
    let camera = spawn_camera(&mut world, Vec3::ZERO, Quat::IDENTITY);

    let light_actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let light = world
        .create_scene_component(
            light_actor,
            "Lamp",
            SceneKind::Light(AnalyticLight::point(Vec3::new(1.0, 0.8, 0.6), 100.0, 5.0)),
        )
        .unwrap();
    world.set_component_position(light, Vec3::new(0.0, 0.0, -15.0));
    world.tick(DT);

    let mut frontend = RenderFrontend::new();
    let mut viewport = Viewport {
        width: 256,
        height: 256,
        camera,
        rendering_params: RenderingParameters::default(),
    };
    frontend.begin_frame();
    frontend.render_view(&mut world, &mut viewport);
    let packet = frontend.frame_packet();

    assert_eq!(packet.lights.len(), 1);
    let def = &packet.lights[0];
    assert!(!def.spot);
    assert_eq!(def.position, Vec3::new(0.0, 0.0, -15.0));
    assert!((def.outer_radius - 5.0).abs() < 1e-6);

    let view = &packet.views[0];
    assert_eq!(view.light_count, 1);
    assert!(!view.cluster_header_stream.is_empty());
    assert!(!view.cluster_item_stream.is_empty());
}

#[test]
fn world_raycast_hits_drawable_triangles() {
    let mut world = test_world();
    let drawable = spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, -5.0), false);
    world.tick(DT);

    // Off the face diagonals so exactly one triangle per face is hit
    let start = Vec3::new(0.1, 0.2, 0.0);
    let end = Vec3::new(0.1, 0.2, -20.0);
    let filter = saga::world::RaycastFilter::default();
    let hit = world
        .raycast_closest(start, end, &filter)
        .expect("box hit");
    assert_eq!(hit.drawable, drawable);
    assert!((hit.triangle.distance - 4.5).abs() < 1e-4);

    // All-hit raycast agrees with the closest hit
    let mut hits = Vec::new();
    world.raycast(&mut hits, start, end, &filter);
    let min = hits
        .iter()
        .map(|h| h.triangle.distance)
        .fold(f32::INFINITY, f32::min);
    assert!((min - hit.triangle.distance).abs() < 1e-5);

    // Bounds-only raycast sees the same drawable
    let mut boxes = Vec::new();
    world.raycast_aabb(&mut boxes, start, end, &filter);
    assert!(boxes.iter().any(|b| b.drawable == drawable));
}

#[test]
fn rotated_camera_drops_forward_drawables() {
    let mut world = test_world();
    let camera = spawn_camera(&mut world, Vec3::ZERO, Quat::from_rotation_y(PI));
    let behind_now = spawn_box_drawable(&mut world, Vec3::new(0.0, 0.0, -10.0), false);
    world.tick(DT);

    let query = camera_query(&world, camera);
    let mut result = VisibilityResult::default();
    world.query_visible_primitives(&query, &mut result);
    assert!(!result.drawables.contains(&behind_now));
}
