//! Physics world tests
//!
//! Tests for:
//! - Contact begin/update/end sequencing over the double-buffered set
//! - Contact points on the receiving side
//! - Spawn from inside a contact callback
//! - Broadphase filtering (group/mask and ignore lists)
//! - Trigger overlap events
//! - Queries, radial damage and traces

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use glam::{Quat, Vec3};
use saga::core::{ClassDescriptor, ObjectFactory};
use saga::physics::{
    CollisionComposition, CollisionQueryFilter, CollisionShape, ContactEvent, OverlapEvent,
    PhysicalBody,
};
use saga::scene::actor::ActorFlags;
use saga::scene::{ActorKey, ActorScript, ComponentKey, ScriptContext, SceneKind};
use saga::spatial::Plane;
use saga::world::{ActorFactory, SpawnInfo, World, WorldContext};

const DT: f32 = 1.0 / 60.0;

// ============================================================================
// Test scripts
// ============================================================================

type EventLog = Rc<RefCell<Vec<String>>>;

/// Static ground plane at y = 0.
struct Ground;

impl ActorScript for Ground {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn on_spawn(&mut self, ctx: &mut ScriptContext) {
        let body = PhysicalBody::new(
            CollisionComposition::single(CollisionShape::Plane {
                plane: Plane::new(Vec3::Y, 0.0),
            }),
            0.0,
        );
        let key = ctx
            .world
            .create_scene_component(ctx.actor, "Plane", SceneKind::Body(body))
            .unwrap();
        ctx.world.add_physical_body(key);
    }
}

/// Dynamic unit box that records its contact events.
struct FallingBox {
    events: EventLog,
    spawn_on_contact: Option<&'static str>,
    damage_taken: Rc<Cell<f32>>,
}

impl FallingBox {
    fn log(&self, kind: &str, points: usize) {
        self.events.borrow_mut().push(format!("{kind}:{points}"));
    }
}

impl ActorScript for FallingBox {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_spawn(&mut self, ctx: &mut ScriptContext) {
        let mut body = PhysicalBody::new(
            CollisionComposition::single(CollisionShape::Box {
                half_extents: Vec3::splat(0.5),
            }),
            1.0,
        );
        body.dispatch_contact_events = true;
        body.generate_contact_points = true;
        let key = ctx
            .world
            .create_scene_component(ctx.actor, "Box", SceneKind::Body(body))
            .unwrap();
        ctx.world.add_physical_body(key);
    }

    fn on_begin_contact(&mut self, ctx: &mut ScriptContext, event: &ContactEvent) {
        self.log("begin", event.points.len());
        if let Some(class) = self.spawn_on_contact.take() {
            ctx.world.spawn_actor(&SpawnInfo::by_name(class)).unwrap();
        }
    }

    fn on_update_contact(&mut self, _ctx: &mut ScriptContext, event: &ContactEvent) {
        self.log("update", event.points.len());
    }

    fn on_end_contact(&mut self, _ctx: &mut ScriptContext, event: &ContactEvent) {
        self.log("end", event.points.len());
    }

    fn apply_damage(&mut self, _ctx: &mut ScriptContext, amount: f32, _position: Vec3) {
        self.damage_taken.set(self.damage_taken.get() + amount);
    }
}

/// Static trigger volume that records overlaps.
struct TriggerVolume {
    events: EventLog,
}

impl ActorScript for TriggerVolume {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_spawn(&mut self, ctx: &mut ScriptContext) {
        let mut body = PhysicalBody::new(
            CollisionComposition::single(CollisionShape::Box {
                half_extents: Vec3::splat(1.0),
            }),
            0.0,
        );
        body.trigger = true;
        body.dispatch_overlap_events = true;
        let key = ctx
            .world
            .create_scene_component(ctx.actor, "Trigger", SceneKind::Body(body))
            .unwrap();
        ctx.world.add_physical_body(key);
    }

    fn on_begin_overlap(&mut self, _ctx: &mut ScriptContext, _event: &OverlapEvent) {
        self.events.borrow_mut().push("overlap_begin".to_owned());
    }

    fn on_update_overlap(&mut self, _ctx: &mut ScriptContext, _event: &OverlapEvent) {
        self.events.borrow_mut().push("overlap_update".to_owned());
    }

    fn on_end_overlap(&mut self, _ctx: &mut ScriptContext, _event: &OverlapEvent) {
        self.events.borrow_mut().push("overlap_end".to_owned());
    }
}

/// Counts main ticks; used to verify deferred visibility of spawns.
#[derive(Default)]
struct TickCounter {
    ticks: Rc<Cell<u32>>,
}

impl ActorScript for TickCounter {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn on_spawn(&mut self, ctx: &mut ScriptContext) {
        ctx.world.actor_mut(ctx.actor).unwrap().flags |= ActorFlags::CAN_EVER_TICK;
    }
    fn tick(&mut self, _ctx: &mut ScriptContext, _time_step: f32) {
        self.ticks.set(self.ticks.get() + 1);
    }
}

struct TestContext {
    events: EventLog,
    damage: Rc<Cell<f32>>,
    ticks: Rc<Cell<u32>>,
}

fn build_world() -> (World, TestContext) {
    let _ = env_logger::builder().is_test(true).try_init();

    let events: EventLog = Rc::new(RefCell::new(Vec::new()));
    let damage = Rc::new(Cell::new(0.0f32));
    let ticks = Rc::new(Cell::new(0u32));

    let mut factory: ActorFactory = ObjectFactory::new("Actor factory");
    factory.register(ClassDescriptor::new("Ground", None, || {
        Box::new(Ground) as Box<dyn ActorScript>
    }));
    {
        let events = events.clone();
        let damage = damage.clone();
        factory.register(ClassDescriptor::new("FallingBox", None, move || {
            Box::new(FallingBox {
                events: events.clone(),
                spawn_on_contact: None,
                damage_taken: damage.clone(),
            }) as Box<dyn ActorScript>
        }));
    }
    {
        let events = events.clone();
        factory.register(ClassDescriptor::new("TriggerVolume", None, move || {
            Box::new(TriggerVolume {
                events: events.clone(),
            }) as Box<dyn ActorScript>
        }));
    }
    {
        let ticks = ticks.clone();
        factory.register(ClassDescriptor::new("TickCounter", None, move || {
            Box::new(TickCounter {
                ticks: ticks.clone(),
            }) as Box<dyn ActorScript>
        }));
    }

    let world = World::create(WorldContext::new(Arc::new(factory))).unwrap();
    (
        world,
        TestContext {
            events,
            damage,
            ticks,
        },
    )
}

fn body_component(world: &World, actor: ActorKey) -> ComponentKey {
    world.actor(actor).unwrap().root_component.unwrap()
}

fn kinds(events: &EventLog) -> Vec<String> {
    events
        .borrow()
        .iter()
        .map(|e| e.split(':').next().unwrap().to_owned())
        .collect()
}

// ============================================================================
// Contact begin / update / end
// ============================================================================

#[test]
fn box_drop_fires_begin_updates_end() {
    let (mut world, ctx) = build_world();
    world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    let falling = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY))
        .unwrap();

    for _ in 0..50 {
        world.tick(DT);
    }

    let sequence = kinds(&ctx.events);
    let begins = sequence.iter().filter(|k| *k == "begin").count();
    let updates = sequence.iter().filter(|k| *k == "update").count();
    assert_eq!(begins, 1, "sequence: {sequence:?}");
    assert!(updates > 0, "resting contact must produce updates");
    assert_eq!(sequence[0], "begin");
    assert!(!sequence.contains(&"end".to_owned()));

    // Contact points were generated for begin and update events
    assert!(ctx.events.borrow().iter().all(|e| {
        let points: usize = e.split(':').nth(1).unwrap().parse().unwrap();
        points > 0
    }));

    // Removing the body yields exactly one end within one fixed step
    ctx.events.borrow_mut().clear();
    world.remove_physical_body(body_component(&world, falling));
    world.tick(DT);
    assert_eq!(kinds(&ctx.events), vec!["end"]);

    // No further events
    ctx.events.borrow_mut().clear();
    for _ in 0..10 {
        world.tick(DT);
    }
    assert!(ctx.events.borrow().is_empty());
}

#[test]
fn end_events_carry_no_points() {
    let (mut world, ctx) = build_world();
    world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    let falling = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY))
        .unwrap();

    for _ in 0..30 {
        world.tick(DT);
    }
    world.remove_physical_body(body_component(&world, falling));
    world.tick(DT);

    let last = ctx.events.borrow().last().unwrap().clone();
    assert_eq!(last, "end:0");
}

#[test]
fn spawn_inside_contact_callback_is_visible_next_frame() {
    let (mut world, ctx) = build_world();
    world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    let falling = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 0.6, 0.0), Quat::IDENTITY))
        .unwrap();
    world
        .script_mut(falling)
        .unwrap()
        .as_any_mut()
        .downcast_mut::<FallingBox>()
        .unwrap()
        .spawn_on_contact = Some("TickCounter");

    // Run until the contact fires
    let mut spawn_frame = None;
    for frame in 0..30 {
        world.tick(DT);
        if world.iter_actors().count() == 3 {
            spawn_frame = Some(frame);
            break;
        }
    }
    assert!(spawn_frame.is_some(), "contact never fired");

    // The spawned actor existed at frame end but got no tick that frame
    assert_eq!(ctx.ticks.get(), 0);
    world.tick(DT);
    assert_eq!(ctx.ticks.get(), 1);
}

// ============================================================================
// Broadphase filtering
// ============================================================================

#[test]
fn disjoint_groups_do_not_collide() {
    let (mut world, ctx) = build_world();
    world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    let falling = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY))
        .unwrap();

    // The box collides with nothing: its mask does not include the ground's
    // group and vice versa
    {
        let key = body_component(&world, falling);
        let component = world.component_mut(key).unwrap();
        let body = component.scene.as_mut().unwrap().as_body_mut().unwrap();
        body.collision_group = 0b10;
        body.collision_mask = 0b10;
    }

    for _ in 0..120 {
        world.tick(DT);
    }
    assert!(ctx.events.borrow().is_empty());

    // It fell through the plane
    let key = body_component(&world, falling);
    let y = world.world_transform_matrix(key).translation.y;
    assert!(y < -1.0, "box should have fallen through, y = {y}");
}

#[test]
fn collision_ignore_actors_suppress_pairs() {
    let (mut world, ctx) = build_world();
    let ground = world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    let falling = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY))
        .unwrap();

    {
        let key = body_component(&world, falling);
        let component = world.component_mut(key).unwrap();
        let body = component.scene.as_mut().unwrap().as_body_mut().unwrap();
        body.collision_ignore_actors.push(ground);
    }

    for _ in 0..120 {
        world.tick(DT);
    }
    assert!(ctx.events.borrow().is_empty());
    let key = body_component(&world, falling);
    assert!(world.world_transform_matrix(key).translation.y < -1.0);
}

// ============================================================================
// Trigger overlaps
// ============================================================================

#[test]
fn trigger_pair_produces_overlap_events_on_trigger_side() {
    let (mut world, ctx) = build_world();
    world
        .spawn_actor(&SpawnInfo::by_name("TriggerVolume").at(Vec3::ZERO, Quat::IDENTITY))
        .unwrap();
    world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 4.0, 0.0), Quat::IDENTITY))
        .unwrap();

    for _ in 0..180 {
        world.tick(DT);
    }

    let sequence = kinds(&ctx.events);
    let begins = sequence.iter().filter(|k| *k == "overlap_begin").count();
    let ends = sequence.iter().filter(|k| *k == "overlap_end").count();
    assert_eq!(begins, 1, "sequence: {sequence:?}");
    assert_eq!(ends, 1, "the box should fall through and leave the trigger");
    // No contact events for a trigger pair
    assert!(!sequence.iter().any(|k| k == "begin" || k == "update" || k == "end"));
}

// ============================================================================
// Queries & traces
// ============================================================================

#[test]
fn sphere_query_and_radial_damage() {
    let (mut world, ctx) = build_world();
    let near = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::ZERO, Quat::IDENTITY))
        .unwrap();
    let far = world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(20.0, 0.0, 0.0), Quat::IDENTITY))
        .unwrap();

    // Register bodies
    world.tick(DT);

    let mut actors = Vec::new();
    world.query_actors_sphere(&mut actors, Vec3::ZERO, 2.0, &CollisionQueryFilter::default());
    assert!(actors.contains(&near));
    assert!(!actors.contains(&far));

    world.apply_radial_damage(25.0, Vec3::ZERO, 2.0, &CollisionQueryFilter::default());
    assert!((ctx.damage.get() - 25.0).abs() < 1e-6);
}

#[test]
fn closest_trace_hits_the_plane() {
    let (mut world, _ctx) = build_world();
    world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    world.tick(DT);

    let hit = world
        .physics
        .trace_closest(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(0.0, -5.0, 0.0),
            &CollisionQueryFilter::default(),
        )
        .expect("plane hit");
    assert!((hit.distance - 5.0).abs() < 1e-3);
    assert!((hit.normal - Vec3::Y).length() < 1e-3);
}

#[test]
fn all_hit_traces_sort_by_distance_when_requested() {
    let (mut world, _ctx) = build_world();
    world.spawn_actor(&SpawnInfo::by_name("Ground")).unwrap();
    world
        .spawn_actor(&SpawnInfo::by_name("FallingBox").at(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY))
        .unwrap();
    world.tick(DT);

    let filter = CollisionQueryFilter {
        sort_by_distance: true,
        ..Default::default()
    };
    let mut results = Vec::new();
    world.physics.trace(
        &mut results,
        Vec3::new(0.0, 5.0, 0.0),
        Vec3::new(0.0, -5.0, 0.0),
        &filter,
    );
    assert!(results.len() >= 2);
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}
