//! World container tests
//!
//! Tests for:
//! - Spawn rules (unknown class, template class match, template cloning)
//! - Deferred destroy: pending-kill visibility, kickoff, no tick next frame
//! - Swap-with-last removal and the index invariants
//! - Level add/remove rules
//! - Pause semantics and the two clocks
//! - Timers and lifespan

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use glam::{Quat, Vec3};
use saga::core::{class_id, AttributeDescriptor, AttributeFlags, ClassDescriptor, ObjectFactory};
use saga::errors::SagaError;
use saga::scene::actor::ActorFlags;
use saga::scene::{ActorKey, ActorScript, ScriptContext, SceneKind, TimerKey};
use saga::world::{ActorFactory, Level, SpawnInfo, World, WorldContext};

// ============================================================================
// Test scripts
// ============================================================================

#[derive(Default)]
struct Probe {
    ticks: Rc<Cell<u32>>,
    timer_fires: Rc<Cell<u32>>,
    destroy_self_on_tick: bool,
    health: f32,
}

impl ActorScript for Probe {
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
        let flags = &mut ctx.world.actor_mut(ctx.actor).unwrap().flags;
        *flags |= ActorFlags::CAN_EVER_TICK;
    }

    fn tick(&mut self, ctx: &mut ScriptContext, _time_step: f32) {
        self.ticks.set(self.ticks.get() + 1);
        if self.destroy_self_on_tick {
            ctx.world.destroy_actor(ctx.actor);
        }
    }

    fn on_timer(&mut self, _ctx: &mut ScriptContext, _timer: TimerKey) {
        self.timer_fires.set(self.timer_fires.get() + 1);
    }
}

struct Bystander;

impl ActorScript for Bystander {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn factory() -> Arc<ActorFactory> {
    let mut factory = ObjectFactory::new("Actor factory");
    factory.register(
        ClassDescriptor::new("Probe", None, || {
            Box::new(Probe::default()) as Box<dyn ActorScript>
        })
        .with_attribute(AttributeDescriptor::new::<Probe, f32>(
            "Health",
            AttributeFlags::DEFAULT,
            |p| p.health,
            |p, v| p.health = v,
        )),
    );
    factory.register(ClassDescriptor::new("Bystander", None, || {
        Box::new(Bystander) as Box<dyn ActorScript>
    }));
    Arc::new(factory)
}

fn test_world() -> World {
    World::create(WorldContext::new(factory())).unwrap()
}

const DT: f32 = 1.0 / 60.0;

fn probe<'a>(world: &'a World, actor: ActorKey) -> &'a Probe {
    world
        .script(actor)
        .unwrap()
        .as_any()
        .downcast_ref::<Probe>()
        .unwrap()
}

// ============================================================================
// Spawn rules
// ============================================================================

#[test]
fn spawn_unknown_class_is_rejected() {
    let mut world = test_world();
    assert!(matches!(
        world.spawn_actor(&SpawnInfo::by_name("NoSuchClass")),
        Err(SagaError::UnknownClass(_))
    ));
    assert!(matches!(
        world.spawn_actor(&SpawnInfo::by_id(0x1234)),
        Err(SagaError::UnknownClass(_))
    ));
}

#[test]
fn spawn_applies_transform_to_root() {
    let mut world = test_world();
    let actor = world
        .spawn_actor(
            &SpawnInfo::by_name("Probe").at(Vec3::new(3.0, 4.0, 5.0), Quat::IDENTITY),
        )
        .unwrap();
    let root = world.actor(actor).unwrap().root_component.unwrap();
    let position: Vec3 = world.world_transform_matrix(root).translation.into();
    assert_eq!(position, Vec3::new(3.0, 4.0, 5.0));
}

#[test]
fn template_class_mismatch_is_rejected() {
    let mut world = test_world();
    let template = world.spawn_actor(&SpawnInfo::by_name("Bystander")).unwrap();

    let result = world.spawn_actor(&SpawnInfo::by_name("Probe").with_template(template));
    assert!(matches!(result, Err(SagaError::TemplateClassMismatch { .. })));
}

#[test]
fn template_attributes_are_cloned() {
    let mut world = test_world();
    let template = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    world
        .script_mut(template)
        .unwrap()
        .as_any_mut()
        .downcast_mut::<Probe>()
        .unwrap()
        .health = 0.1;

    let spawned = world
        .spawn_actor(&SpawnInfo::by_name("Probe").with_template(template))
        .unwrap();
    assert_eq!(probe(&world, spawned).health.to_bits(), 0.1f32.to_bits());
}

#[test]
fn spawn_by_id_resolves_like_name() {
    let mut world = test_world();
    let actor = world
        .spawn_actor(&SpawnInfo::by_id(class_id("Probe")))
        .unwrap();
    assert_eq!(world.actor(actor).unwrap().class_id(), class_id("Probe"));
}

// ============================================================================
// Deferred destroy
// ============================================================================

#[test]
fn destroy_is_deferred_to_kickoff() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();

    world.destroy_actor(actor);

    // (a) pending-kill for the remainder of the frame
    assert!(world.actor(actor).unwrap().is_pending_kill());
    // (b) iteration still returns it, flagged
    assert!(world.actors().contains(&actor));
    // Live iteration skips it
    assert_eq!(world.iter_actors().count(), 0);

    // (c) after the frame the actor is gone
    world.tick(DT);
    assert!(!world.actors().contains(&actor));
    assert!(world.actor(actor).is_none());
}

#[test]
fn destroy_during_tick_suppresses_future_ticks() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let ticks = probe(&world, actor).ticks.clone();
    world
        .script_mut(actor)
        .unwrap()
        .as_any_mut()
        .downcast_mut::<Probe>()
        .unwrap()
        .destroy_self_on_tick = true;

    world.tick(DT);
    assert_eq!(ticks.get(), 1);
    assert!(world.actor(actor).is_none());

    // (d) no tick is delivered next frame
    world.tick(DT);
    assert_eq!(ticks.get(), 1);
}

#[test]
fn swap_with_last_removal_keeps_indices_valid() {
    let mut world = test_world();
    let x = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let y = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let z = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();

    world.destroy_actor(y);
    world.tick(DT);

    let level = world.level(world.persistent_level()).unwrap();
    let actors: Vec<ActorKey> = level.actors().to_vec();
    assert_eq!(actors.len(), 2);
    assert!(actors.contains(&x) && actors.contains(&z));

    // Invariant: world.actors[a.world_idx] is a, level.actors[a.level_idx]
    // is a
    for &key in world.actors() {
        let actor = world.actor(key).unwrap();
        assert_eq!(world.actors()[actor.world_index()], key);
        let level = world.level(actor.level()).unwrap();
        assert_eq!(level.actors()[actor.level_index()], key);
    }
}

#[test]
fn destroyed_components_are_freed_at_kickoff() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let extra = world
        .create_scene_component(actor, "Extra", SceneKind::Plain)
        .unwrap();

    world.destroy_component(extra);
    assert!(world.component(extra).unwrap().is_pending_kill());

    world.tick(DT);
    assert!(world.component(extra).is_none());
    assert_eq!(world.actor(actor).unwrap().components().len(), 1);

    // Remaining component index is consistent
    let root = world.actor(actor).unwrap().components()[0];
    assert_eq!(world.component(root).unwrap().index_in_actor(), 0);
}

// ============================================================================
// Levels
// ============================================================================

#[test]
fn persistent_level_cannot_be_removed() {
    let mut world = test_world();
    let persistent = world.persistent_level();
    assert!(matches!(
        world.remove_level(persistent),
        Err(SagaError::PersistentLevel(_))
    ));
}

#[test]
fn streamed_level_owns_spawned_actors() {
    let mut world = test_world();
    let level = world.add_level(Level::new("Streamed")).unwrap();

    let actor = world
        .spawn_actor(&SpawnInfo::by_name("Probe").in_level(level))
        .unwrap();
    assert_eq!(world.actor(actor).unwrap().level(), level);
    assert!(world.level(level).unwrap().actors().contains(&actor));

    // Removing the level destroys its actors
    let removed = world.remove_level(level).unwrap();
    assert_eq!(removed.name, "Streamed");
    assert!(world.actor(actor).is_none());
    assert!(world.level(level).is_none());
}

#[test]
fn remove_level_fixes_swap_indices() {
    let mut world = test_world();
    let a = world.add_level(Level::new("A")).unwrap();
    let b = world.add_level(Level::new("B")).unwrap();

    world.remove_level(a).unwrap();
    assert_eq!(world.levels().len(), 2);
    assert!(world.levels().contains(&b));
    assert!(world.levels().contains(&world.persistent_level()));
}

// ============================================================================
// Pause & clocks
// ============================================================================

#[test]
fn pause_takes_effect_at_frame_boundary() {
    let mut world = test_world();
    let normal = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let resilient = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    world.actor_mut(resilient).unwrap().flags |= ActorFlags::TICK_EVEN_WHEN_PAUSED;

    let normal_ticks = probe(&world, normal).ticks.clone();
    let resilient_ticks = probe(&world, resilient).ticks.clone();

    world.tick(DT);
    assert_eq!(normal_ticks.get(), 1);
    assert_eq!(resilient_ticks.get(), 1);

    world.set_paused(true);
    world.tick(DT);

    // Ticks skipped except tick-even-when-paused
    assert_eq!(normal_ticks.get(), 1);
    assert_eq!(resilient_ticks.get(), 2);
    assert!(world.is_paused());

    // Running time advances while paused; gameplay time is frozen
    let running_before = world.running_time_micro();
    let gameplay_before = world.gameplay_time_micro();
    world.tick(DT);
    assert!(world.running_time_micro() > running_before);
    assert_eq!(world.gameplay_time_micro(), gameplay_before);
}

#[test]
fn clocks_are_monotonic_and_gameplay_lags_running() {
    let mut world = test_world();
    let mut last_running = 0;
    let mut last_gameplay = 0;
    for _ in 0..20 {
        world.tick(DT);
        assert!(world.running_time_micro() >= last_running);
        assert!(world.gameplay_time_micro() >= last_gameplay);
        assert!(world.gameplay_time_micro() <= world.running_time_micro() + 1);
        last_running = world.running_time_micro();
        last_gameplay = world.gameplay_time_micro();
    }
}

#[test]
fn gameplay_timer_reset_applies_at_step_boundary() {
    let mut world = test_world();
    for _ in 0..10 {
        world.tick(DT);
    }
    assert!(world.gameplay_time_micro() > 0);

    world.reset_gameplay_timer();
    world.tick(DT);
    world.tick(DT);
    // After the reset the gameplay clock restarted near zero
    assert!(world.gameplay_time_micro() < 40_000);
}

// ============================================================================
// Timers & lifespan
// ============================================================================

#[test]
fn one_shot_timer_fires_once() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let fires = probe(&world, actor).timer_fires.clone();

    world.add_timer(actor, 0.05, false).unwrap();
    for _ in 0..10 {
        world.tick(DT);
    }
    assert_eq!(fires.get(), 1);
}

#[test]
fn repeating_timer_fires_per_interval() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let fires = probe(&world, actor).timer_fires.clone();

    world.add_timer(actor, 0.05, true).unwrap();
    for _ in 0..30 {
        world.tick(DT);
    }
    // 0.5 seconds at 50 ms intervals
    assert!((9..=11).contains(&fires.get()), "fires = {}", fires.get());
}

#[test]
fn destroying_owner_cancels_timers() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    let fires = probe(&world, actor).timer_fires.clone();

    let timer = world.add_timer(actor, 0.02, true).unwrap();
    world.tick(DT);
    world.destroy_actor(actor);
    assert!(world.timer(timer).is_none());

    for _ in 0..10 {
        world.tick(DT);
    }
    let fired_before_destroy = fires.get();
    assert!(fired_before_destroy <= 1);
}

#[test]
fn lifespan_destroys_at_post_physics() {
    let mut world = test_world();
    let actor = world.spawn_actor(&SpawnInfo::by_name("Probe")).unwrap();
    world.actor_mut(actor).unwrap().life_span = 0.05;

    for _ in 0..2 {
        world.tick(DT);
    }
    assert!(world.actor(actor).is_some());

    for _ in 0..5 {
        world.tick(DT);
    }
    assert!(world.actor(actor).is_none());
}
