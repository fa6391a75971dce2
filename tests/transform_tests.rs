//! Scene component tree tests
//!
//! Tests for:
//! - Dirty propagation from any ancestor to all descendants
//! - Lazy world-matrix recomputation and idempotent reads
//! - Absolute position/rotation/scale channel masking
//! - Socket attachment rules and pose-driven socket matrices
//! - keep-world-transform attach/detach
//! - Cycle rejection

use std::any::Any;
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};
use saga::core::{ClassDescriptor, ObjectFactory};
use saga::errors::SagaError;
use saga::scene::drawable::{Drawable, DrawableKind};
use saga::scene::{ActorScript, ComponentKey, ScriptContext, SceneKind, Socket, TransformFlags};
use saga::spatial::Mesh;
use saga::world::{SpawnInfo, World, WorldContext};

// ============================================================================
// Helpers
// ============================================================================

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

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

/// Spawns an actor and returns its root plus `depth` chained children, each
/// translated +1 along X.
fn spawn_chain(world: &mut World, depth: usize) -> Vec<ComponentKey> {
    let actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let root = world.actor(actor).unwrap().root_component.unwrap();
    world.set_component_position(root, Vec3::new(1.0, 0.0, 0.0));

    let mut chain = vec![root];
    for i in 0..depth {
        let child = world
            .create_scene_component(actor, &format!("Node{i}"), SceneKind::Plain)
            .unwrap();
        world
            .attach_component(child, *chain.last().unwrap(), None, false)
            .unwrap();
        world.set_component_position(child, Vec3::new(1.0, 0.0, 0.0));
        chain.push(child);
    }
    chain
}

fn world_position(world: &World, key: ComponentKey) -> Vec3 {
    world.world_transform_matrix(key).translation.into()
}

fn is_dirty(world: &World, key: ComponentKey) -> bool {
    world
        .component(key)
        .unwrap()
        .scene
        .as_ref()
        .unwrap()
        .transform
        .is_dirty()
}

// ============================================================================
// Dirty propagation
// ============================================================================

#[test]
fn chain_accumulates_translations() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 4);

    for (i, &key) in chain.iter().enumerate() {
        let expected = (i + 1) as f32;
        let position = world_position(&world, key);
        assert!(
            approx_eq(position.x, expected),
            "node {i}: expected x={expected}, got {}",
            position.x
        );
    }
}

#[test]
fn ancestor_setter_dirties_all_descendants() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 4);

    // Read everything once; all clean afterwards
    for &key in &chain {
        let _ = world.world_transform_matrix(key);
    }
    assert!(chain.iter().all(|&k| !is_dirty(&world, k)));

    // A setter on the middle node dirties it and everything below, but not
    // its ancestors
    world.set_component_position(chain[2], Vec3::new(5.0, 0.0, 0.0));
    assert!(!is_dirty(&world, chain[0]));
    assert!(!is_dirty(&world, chain[1]));
    assert!(is_dirty(&world, chain[2]));
    assert!(is_dirty(&world, chain[3]));
    assert!(is_dirty(&world, chain[4]));

    // Reads recompute and clear
    let tail = world_position(&world, chain[4]);
    assert!(approx_eq(tail.x, 2.0 + 5.0 + 1.0 + 1.0));
    assert!(!is_dirty(&world, chain[4]));
}

#[test]
fn world_matrix_reads_are_idempotent() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 2);

    world.set_component_rotation(chain[0], Quat::from_rotation_y(FRAC_PI_2));
    let first = world.world_transform_matrix(chain[2]);
    let second = world.world_transform_matrix(chain[2]);
    assert_eq!(first, second);
}

#[test]
fn rotation_and_scale_compose() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let root = world.actor(actor).unwrap().root_component.unwrap();
    let child = world
        .create_scene_component(actor, "Child", SceneKind::Plain)
        .unwrap();
    world.attach_component(child, root, None, false).unwrap();

    // Parent: translate (5,0,0), rotate 90 degrees around Y, scale 2x
    world.set_component_transform(
        root,
        Vec3::new(5.0, 0.0, 0.0),
        Quat::from_rotation_y(FRAC_PI_2),
        Vec3::splat(2.0),
    );
    world.set_component_position(child, Vec3::new(1.0, 0.0, 0.0));

    // Child local (1,0,0): rotated to (0,0,-1), scaled to (0,0,-2),
    // translated to (5,0,-2)
    let position = world_position(&world, child);
    assert!(vec3_approx(position, Vec3::new(5.0, 0.0, -2.0)));
}

// ============================================================================
// Absolute channels
// ============================================================================

#[test]
fn absolute_position_ignores_parent_translation() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 1);

    world
        .component_mut(chain[1])
        .unwrap()
        .scene
        .as_mut()
        .unwrap()
        .transform
        .flags = TransformFlags::ABSOLUTE_POSITION;
    world.set_component_position(chain[1], Vec3::new(0.0, 3.0, 0.0));

    let position = world_position(&world, chain[1]);
    assert!(vec3_approx(position, Vec3::new(0.0, 3.0, 0.0)));
}

#[test]
fn absolute_rotation_ignores_parent_rotation() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 1);

    world.set_component_rotation(chain[0], Quat::from_rotation_y(FRAC_PI_2));
    world
        .component_mut(chain[1])
        .unwrap()
        .scene
        .as_mut()
        .unwrap()
        .transform
        .flags = TransformFlags::ABSOLUTE_ROTATION;
    world.set_component_position(chain[1], Vec3::new(1.0, 0.0, 0.0));

    // Parent translation still applies, parent rotation does not
    let position = world_position(&world, chain[1]);
    assert!(vec3_approx(position, Vec3::new(2.0, 0.0, 0.0)));
}

// ============================================================================
// Attachment
// ============================================================================

#[test]
fn attach_to_self_or_ancestor_is_rejected() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 2);

    assert!(matches!(
        world.attach_component(chain[0], chain[0], None, false),
        Err(SagaError::AttachCycle)
    ));
    assert!(matches!(
        world.attach_component(chain[0], chain[2], None, false),
        Err(SagaError::AttachCycle)
    ));

    // The failed attach left the hierarchy intact
    assert!(approx_eq(world_position(&world, chain[2]).x, 3.0));
}

#[test]
fn keep_world_transform_preserves_position() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let root = world.actor(actor).unwrap().root_component.unwrap();
    world.set_component_position(root, Vec3::new(10.0, 0.0, 0.0));

    let orbit = world
        .create_scene_component(actor, "Orbit", SceneKind::Plain)
        .unwrap();
    world.set_component_position(orbit, Vec3::new(0.0, 5.0, 0.0));
    let before = world_position(&world, orbit);

    world.attach_component(orbit, root, None, true).unwrap();
    let after = world_position(&world, orbit);
    assert!(vec3_approx(before, after), "{before:?} vs {after:?}");

    // Detach with keep-world also preserves it
    world.detach_component(orbit, true).unwrap();
    assert!(vec3_approx(world_position(&world, orbit), before));
}

// ============================================================================
// Sockets
// ============================================================================

fn spawn_skinned_parent(world: &mut World) -> (ComponentKey, ComponentKey) {
    let actor = world.spawn_actor(&SpawnInfo::by_name("Empty")).unwrap();
    let root = world.actor(actor).unwrap().root_component.unwrap();

    let mesh = Arc::new(Mesh::create_box(Vec3::ONE));
    let mut drawable = Drawable::new(
        mesh,
        DrawableKind::SkinnedMesh {
            joint_poses: vec![
                Affine3A::from_translation(Vec3::new(0.0, 2.0, 0.0)),
                Affine3A::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            ],
        },
    );
    drawable.cast_shadow = false;
    let skinned = world
        .create_scene_component(actor, "Skin", SceneKind::Drawable(drawable))
        .unwrap();
    world.attach_component(skinned, root, None, false).unwrap();

    let scene = world
        .component_mut(skinned)
        .unwrap()
        .scene
        .as_mut()
        .unwrap();
    scene.sockets.push(Socket {
        name: "head".to_owned(),
        joint: 0,
    });
    scene.sockets.push(Socket {
        name: "hand".to_owned(),
        joint: 1,
    });

    (actor_root_pair(world, actor).1, skinned)
}

fn actor_root_pair(world: &World, actor: saga::scene::ActorKey) -> (saga::scene::ActorKey, ComponentKey) {
    (actor, world.actor(actor).unwrap().root_component.unwrap())
}

#[test]
fn socket_attach_reads_joint_pose() {
    let mut world = test_world();
    let (_root, skinned) = spawn_skinned_parent(&mut world);

    let actor = world.component(skinned).unwrap().owner_actor();
    let hat = world
        .create_scene_component(actor, "Hat", SceneKind::Plain)
        .unwrap();
    world
        .attach_component(hat, skinned, Some("head"), false)
        .unwrap();

    assert!(world
        .component(hat)
        .unwrap()
        .scene
        .as_ref()
        .unwrap()
        .is_attached_to_socket());

    // Socket "head" is joint 0 at (0,2,0)
    let position = world_position(&world, hat);
    assert!(vec3_approx(position, Vec3::new(0.0, 2.0, 0.0)));
}

#[test]
fn socket_attach_requires_skinned_parent() {
    let mut world = test_world();
    let chain = spawn_chain(&mut world, 1);
    let actor = world.component(chain[0]).unwrap().owner_actor();

    let item = world
        .create_scene_component(actor, "Item", SceneKind::Plain)
        .unwrap();
    let result = world.attach_component(item, chain[0], Some("head"), false);
    assert!(matches!(result, Err(SagaError::SocketAttachFailed(_))));

    // Component remains unattached
    assert!(world
        .component(item)
        .unwrap()
        .scene
        .as_ref()
        .unwrap()
        .parent()
        .is_none());
}

#[test]
fn unknown_socket_name_is_rejected() {
    let mut world = test_world();
    let (_root, skinned) = spawn_skinned_parent(&mut world);
    let actor = world.component(skinned).unwrap().owner_actor();

    let item = world
        .create_scene_component(actor, "Item", SceneKind::Plain)
        .unwrap();
    // First attach somewhere valid
    world.attach_component(item, skinned, None, false).unwrap();

    // A failed socket attach keeps the previous parent
    let result = world.attach_component(item, skinned, Some("tail"), false);
    assert!(matches!(result, Err(SagaError::SocketAttachFailed(_))));
    let scene = world.component(item).unwrap().scene.as_ref().unwrap();
    assert_eq!(scene.parent(), Some(skinned));
    assert!(!scene.is_attached_to_socket());
}
