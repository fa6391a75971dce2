use std::any::Any;

use bitflags::bitflags;
use glam::Vec3;

use crate::core::ClassId;
use crate::physics::{ContactEvent, OverlapEvent};
use crate::scene::{ActorKey, ComponentKey, LevelKey, TimerKey};
use crate::world::World;

bitflags! {
    /// Per-actor tick opt-ins.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ActorFlags: u32 {
        const CAN_EVER_TICK        = 1 << 0;
        const TICK_EVEN_WHEN_PAUSED = 1 << 1;
        const TICK_PRE_PHYSICS     = 1 << 2;
        const TICK_POST_PHYSICS    = 1 << 3;
    }
}

/// A composable game-world entity: a set of components with a distinguished
/// root scene component, living in exactly one level.
///
/// While live, `world.actors[actor.world_index]` and
/// `level.actors[actor.level_index]` both refer back to this actor; kickoff
/// unlinks by swap-with-last through those indices.
#[derive(Debug)]
pub struct Actor {
    pub name: String,
    pub(crate) class: ClassId,
    pub(crate) world_index: usize,
    pub(crate) level: LevelKey,
    pub(crate) level_index: usize,
    pub(crate) components: Vec<ComponentKey>,
    pub root_component: Option<ComponentKey>,
    pub(crate) pending_kill: bool,
    pub flags: ActorFlags,
    /// Seconds this actor has existed.
    pub life_time: f32,
    /// Remaining lifespan in seconds; zero or negative means unlimited.
    pub life_span: f32,
    pub(crate) script: Option<Box<dyn ActorScript>>,
}

impl Actor {
    #[inline]
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class
    }

    #[inline]
    #[must_use]
    pub fn is_pending_kill(&self) -> bool {
        self.pending_kill
    }

    #[inline]
    #[must_use]
    pub fn level(&self) -> LevelKey {
        self.level
    }

    #[inline]
    #[must_use]
    pub fn world_index(&self) -> usize {
        self.world_index
    }

    #[inline]
    #[must_use]
    pub fn level_index(&self) -> usize {
        self.level_index
    }

    #[inline]
    #[must_use]
    pub fn components(&self) -> &[ComponentKey] {
        &self.components
    }
}

/// World access handed to script hooks.
///
/// The script box is taken out of the actor for the duration of the call,
/// so hooks get full mutable world access; spawn and destroy from inside a
/// hook follow the usual deferred rules.
pub struct ScriptContext<'a> {
    pub world: &'a mut World,
    /// The actor the hook runs on.
    pub actor: ActorKey,
}

/// Behavior attached to an actor class.
///
/// All hooks have empty defaults; gameplay code overrides what it needs.
/// Attribute thunks reach the script state through [`ActorScript::as_any`].
#[allow(unused_variables)]
pub trait ActorScript: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once after the actor is fully constructed and indexed, with
    /// the spawn transform already applied to the root component.
    fn on_spawn(&mut self, ctx: &mut ScriptContext) {}

    /// Main tick, before the physics step.
    fn tick(&mut self, ctx: &mut ScriptContext, time_step: f32) {}

    /// Fixed-step tick inside the physics update, before integration.
    fn tick_pre_physics(&mut self, ctx: &mut ScriptContext, time_step: f32) {}

    /// Fixed-step tick inside the physics update, after event dispatch.
    fn tick_post_physics(&mut self, ctx: &mut ScriptContext, time_step: f32) {}

    fn on_begin_contact(&mut self, ctx: &mut ScriptContext, event: &ContactEvent) {}
    fn on_update_contact(&mut self, ctx: &mut ScriptContext, event: &ContactEvent) {}
    fn on_end_contact(&mut self, ctx: &mut ScriptContext, event: &ContactEvent) {}

    fn on_begin_overlap(&mut self, ctx: &mut ScriptContext, event: &OverlapEvent) {}
    fn on_update_overlap(&mut self, ctx: &mut ScriptContext, event: &OverlapEvent) {}
    fn on_end_overlap(&mut self, ctx: &mut ScriptContext, event: &OverlapEvent) {}

    /// A timer owned by this actor fired.
    fn on_timer(&mut self, ctx: &mut ScriptContext, timer: TimerKey) {}

    /// Damage delivery, e.g. from radial damage queries.
    fn apply_damage(&mut self, ctx: &mut ScriptContext, amount: f32, position: Vec3) {}
}

/// The default script for actors spawned without behavior.
pub struct EmptyScript;

impl ActorScript for EmptyScript {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for dyn ActorScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ActorScript")
    }
}
