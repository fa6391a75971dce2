//! The world container: actors, components, levels, clocks and the frame
//! tick.
//!
//! Mutation rules: spawn and destroy are observed by later systems only
//! after the kickoff phase at frame end; a destroyed object stays reachable
//! through the iteration arrays for the rest of the frame with its
//! pending-kill flag set, and its memory is reclaimed during kickoff.

use std::sync::Arc;

use glam::{Quat, Vec3};
use slotmap::SlotMap;

use crate::core::{ClassId, ObjectFactory};
use crate::errors::{Result, SagaError};
use crate::physics::{CollisionSolver, PhysicsWorld, ReferenceSolver};
use crate::scene::actor::{Actor, ActorFlags, ActorScript, ScriptContext};
use crate::scene::component::ActorComponent;
use crate::scene::{ActorKey, ComponentKey, LevelKey, TimerKey};
use crate::world::level::Level;
use crate::world::timer::Timer;

/// Factory product for actor classes.
pub type ActorFactory = ObjectFactory<Box<dyn ActorScript>>;

/// Initial transform of a spawned actor's root component.
#[derive(Debug, Clone, Copy)]
pub struct SpawnTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for SpawnTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// How the spawn class is referenced.
#[derive(Debug, Clone)]
pub enum SpawnClass {
    Name(String),
    Id(ClassId),
}

/// Actor spawn parameters.
#[derive(Debug, Clone)]
pub struct SpawnInfo {
    pub class: SpawnClass,
    /// Level to spawn into; the persistent level when `None`.
    pub level: Option<LevelKey>,
    /// Existing actor to clone attributes from; its final class must match
    /// the spawn class.
    pub template: Option<ActorKey>,
    pub transform: SpawnTransform,
}

impl SpawnInfo {
    #[must_use]
    pub fn by_name(class_name: &str) -> Self {
        Self {
            class: SpawnClass::Name(class_name.to_owned()),
            level: None,
            template: None,
            transform: SpawnTransform::default(),
        }
    }

    #[must_use]
    pub fn by_id(class: ClassId) -> Self {
        Self {
            class: SpawnClass::Id(class),
            level: None,
            template: None,
            transform: SpawnTransform::default(),
        }
    }

    #[must_use]
    pub fn in_level(mut self, level: LevelKey) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: ActorKey) -> Self {
        self.template = Some(template);
        self
    }

    #[must_use]
    pub fn at(mut self, position: Vec3, rotation: Quat) -> Self {
        self.transform.position = position;
        self.transform.rotation = rotation;
        self
    }
}

/// Process-wide collaborators handed into world construction instead of
/// implicit globals.
pub struct WorldContext {
    pub actor_factory: Arc<ActorFactory>,
    pub solver: Box<dyn CollisionSolver>,
}

impl WorldContext {
    /// Context with the built-in reference solver.
    #[must_use]
    pub fn new(actor_factory: Arc<ActorFactory>) -> Self {
        Self {
            actor_factory,
            solver: Box::new(ReferenceSolver::new()),
        }
    }
}

/// Broadcast handler invoked after every successful spawn.
pub type ActorSpawnedHandler = fn(&mut World, ActorKey);

/// Top-level container owning levels, actors, physics and clocks.
pub struct World {
    pub(crate) actors: SlotMap<ActorKey, Actor>,
    /// Dense iteration array; `actor.world_index` points into it.
    pub(crate) actor_list: Vec<ActorKey>,
    pub(crate) components: SlotMap<ComponentKey, ActorComponent>,
    pub(crate) levels: SlotMap<LevelKey, Level>,
    pub(crate) level_list: Vec<LevelKey>,
    persistent_level: LevelKey,

    pub physics: PhysicsWorld,
    pub(crate) factory: Arc<ActorFactory>,

    timers: SlotMap<TimerKey, Timer>,
    timer_list: Vec<TimerKey>,

    paused: bool,
    pause_request: bool,
    unpause_request: bool,
    pub(crate) reset_gameplay_timer: bool,

    running_time_micro: i64,
    running_time_micro_after_tick: i64,
    pub(crate) gameplay_time_micro: i64,
    pub(crate) gameplay_time_micro_after_tick: i64,

    pub(crate) pending_kill: bool,
    pub(crate) world_index: usize,

    pub(crate) dying_actors: Vec<ActorKey>,
    pub(crate) dying_components: Vec<ComponentKey>,

    /// Drawables whose bounds/area links must be refreshed this frame.
    pub(crate) bounds_update_queue: Vec<ComponentKey>,

    on_actor_spawned: Vec<ActorSpawnedHandler>,

    /// Monotonic marker shared by visibility queries.
    pub(crate) vis_frame: u64,
}

impl World {
    /// Creates a world with its persistent level. Construction failures of
    /// required subsystems surface here; a failed world must not be used.
    pub fn create(context: WorldContext) -> Result<Self> {
        let WorldContext {
            actor_factory,
            solver,
        } = context;

        let mut levels = SlotMap::with_key();
        let mut persistent = Level::new("PersistentLevel");
        persistent.persistent = true;
        persistent.owned = true;
        persistent.world_index = 0;
        let persistent_level = levels.insert(persistent);

        Ok(Self {
            actors: SlotMap::with_key(),
            actor_list: Vec::new(),
            components: SlotMap::with_key(),
            levels,
            level_list: vec![persistent_level],
            persistent_level,
            physics: PhysicsWorld::new(solver),
            factory: actor_factory,
            timers: SlotMap::with_key(),
            timer_list: Vec::new(),
            paused: false,
            pause_request: false,
            unpause_request: false,
            reset_gameplay_timer: false,
            running_time_micro: 0,
            running_time_micro_after_tick: 0,
            gameplay_time_micro: 0,
            gameplay_time_micro_after_tick: 0,
            pending_kill: false,
            world_index: usize::MAX,
            dying_actors: Vec::new(),
            dying_components: Vec::new(),
            bounds_update_queue: Vec::new(),
            on_actor_spawned: Vec::new(),
            vis_frame: 0,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn actor(&self, key: ActorKey) -> Option<&Actor> {
        self.actors.get(key)
    }

    #[inline]
    #[must_use]
    pub fn actor_mut(&mut self, key: ActorKey) -> Option<&mut Actor> {
        self.actors.get_mut(key)
    }

    /// Dense actor array; includes pending-kill actors until kickoff.
    #[inline]
    #[must_use]
    pub fn actors(&self) -> &[ActorKey] {
        &self.actor_list
    }

    /// Live actors (pending-kill skipped).
    pub fn iter_actors(&self) -> impl Iterator<Item = (ActorKey, &Actor)> {
        self.actor_list
            .iter()
            .filter_map(|&key| self.actors.get(key).map(|a| (key, a)))
            .filter(|(_, a)| !a.pending_kill)
    }

    /// Live actors whose final class is `class`.
    pub fn iter_actors_of_class(&self, class: ClassId) -> impl Iterator<Item = (ActorKey, &Actor)> {
        self.iter_actors().filter(move |(_, a)| a.class == class)
    }

    #[inline]
    #[must_use]
    pub fn component(&self, key: ComponentKey) -> Option<&ActorComponent> {
        self.components.get(key)
    }

    #[inline]
    #[must_use]
    pub fn component_mut(&mut self, key: ComponentKey) -> Option<&mut ActorComponent> {
        self.components.get_mut(key)
    }

    /// Live components of an actor whose class is `class`.
    pub fn iter_components_of_class(
        &self,
        actor: ActorKey,
        class: ClassId,
    ) -> impl Iterator<Item = (ComponentKey, &ActorComponent)> {
        self.actors
            .get(actor)
            .map(|a| a.components.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&key| self.components.get(key).map(|c| (key, c)))
            .filter(move |(_, c)| !c.pending_kill && c.class == class)
    }

    #[inline]
    #[must_use]
    pub fn persistent_level(&self) -> LevelKey {
        self.persistent_level
    }

    #[inline]
    #[must_use]
    pub fn level(&self, key: LevelKey) -> Option<&Level> {
        self.levels.get(key)
    }

    #[inline]
    #[must_use]
    pub fn level_mut(&mut self, key: LevelKey) -> Option<&mut Level> {
        self.levels.get_mut(key)
    }

    #[inline]
    #[must_use]
    pub fn levels(&self) -> &[LevelKey] {
        &self.level_list
    }

    #[inline]
    #[must_use]
    pub fn factory(&self) -> &ActorFactory {
        &self.factory
    }

    #[inline]
    #[must_use]
    pub fn is_pending_kill(&self) -> bool {
        self.pending_kill
    }

    // ========================================================================
    // Pause & clocks
    // ========================================================================

    /// Freezes world and actor ticking starting at the next frame boundary.
    pub fn set_paused(&mut self, paused: bool) {
        self.pause_request = paused;
        self.unpause_request = !paused;
    }

    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Virtual time advancing every frame, in microseconds.
    #[inline]
    #[must_use]
    pub fn running_time_micro(&self) -> i64 {
        self.running_time_micro
    }

    /// Virtual time advancing only while unpaused, in microseconds.
    #[inline]
    #[must_use]
    pub fn gameplay_time_micro(&self) -> i64 {
        self.gameplay_time_micro
    }

    /// Resets the gameplay timer to zero; applied at the next fixed-step
    /// boundary.
    pub fn reset_gameplay_timer(&mut self) {
        self.reset_gameplay_timer = true;
    }

    // ========================================================================
    // Spawn & destroy
    // ========================================================================

    /// Spawns a new actor. Precondition violations (unknown class, template
    /// class mismatch, stale level) reject the spawn.
    pub fn spawn_actor(&mut self, info: &SpawnInfo) -> Result<ActorKey> {
        let descriptor = match &info.class {
            SpawnClass::Name(name) => self.factory.find_class(name).ok_or_else(|| {
                log::warn!("spawn_actor: invalid actor class {name:?}");
                SagaError::UnknownClass(name.clone())
            })?,
            SpawnClass::Id(id) => self.factory.lookup_class(*id).ok_or_else(|| {
                log::warn!("spawn_actor: invalid actor class id {id}");
                SagaError::UnknownClass(format!("#{id:016x}"))
            })?,
        };
        let class = descriptor.id;
        let class_name = descriptor.name;

        // Template's final class must match the chosen class
        if let Some(template_key) = info.template {
            let template = self
                .actors
                .get(template_key)
                .ok_or(SagaError::StaleActor)?;
            if template.class != class {
                log::warn!("spawn_actor: template class doesn't match {class_name:?}");
                return Err(SagaError::TemplateClassMismatch {
                    expected: class_name.to_owned(),
                    actual: format!("#{:016x}", template.class),
                });
            }
        }

        let level_key = info.level.unwrap_or(self.persistent_level);
        if !self.levels.contains_key(level_key) {
            return Err(SagaError::LevelNotInWorld);
        }

        let script = descriptor.create_instance();

        let world_index = self.actor_list.len();
        let level = &mut self.levels[level_key];
        let level_index = level.actors.len();

        let actor_key = self.actors.insert(Actor {
            name: format!("{class_name}:{world_index}"),
            class,
            world_index,
            level: level_key,
            level_index,
            components: Vec::new(),
            root_component: None,
            pending_kill: false,
            flags: ActorFlags::empty(),
            life_time: 0.0,
            life_span: 0.0,
            script: Some(script),
        });
        self.actor_list.push(actor_key);
        self.levels[level_key].actors.push(actor_key);

        // Clone attributes from the template before initialization
        if let Some(template_key) = info.template {
            let mut dst_script = self.actors[actor_key].script.take();
            if let (Some(dst), Some(src)) = (
                dst_script.as_deref_mut(),
                self.actors[template_key].script.as_deref(),
            ) {
                self.factory
                    .clone_attributes(class, src.as_any(), dst.as_any_mut());
            }
            self.actors[actor_key].script = dst_script;
        }

        // Initialize: the script builds its components, then the spawn
        // transform lands on the root
        self.with_script(actor_key, |script, ctx| script.on_spawn(ctx));
        if let Some(root) = self.actors[actor_key].root_component {
            self.set_component_transform(
                root,
                info.transform.position,
                info.transform.rotation,
                info.transform.scale,
            );
        }

        // Broadcast
        let handlers = self.on_actor_spawned.clone();
        for handler in handlers {
            handler(self, actor_key);
        }

        Ok(actor_key)
    }

    /// Marks an actor pending-kill: it is unlinked from live iteration at
    /// kickoff; until then iteration still returns it flagged.
    pub fn destroy_actor(&mut self, key: ActorKey) {
        let Some(actor) = self.actors.get_mut(key) else {
            return;
        };
        if actor.pending_kill {
            return;
        }
        actor.pending_kill = true;
        let components = actor.components.clone();
        self.dying_actors.push(key);

        for component in components {
            self.destroy_component(component);
        }
        self.cancel_actor_timers(key);
    }

    /// Destroys every actor in the world.
    pub fn destroy_actors(&mut self) {
        let all: Vec<ActorKey> = self.actor_list.clone();
        for key in all {
            self.destroy_actor(key);
        }
    }

    /// Marks a component pending-kill and unlinks it from physics, the
    /// scene tree and area lists. Freed at kickoff.
    pub fn destroy_component(&mut self, key: ComponentKey) {
        let Some(component) = self.components.get_mut(key) else {
            return;
        };
        if component.pending_kill {
            return;
        }
        component.pending_kill = true;
        let owner = component.owner;

        self.remove_physical_body(key);
        self.unlink_scene_component(key);
        self.unlink_drawable_areas(key);

        if let Some(actor) = self.actors.get_mut(owner) {
            if actor.root_component == Some(key) {
                actor.root_component = None;
            }
        }
        self.dying_components.push(key);
    }

    /// Destroys this world: all actors die, pending objects are reclaimed,
    /// and the scheduler drops the world at its own kickoff.
    pub fn destroy(&mut self) {
        if self.pending_kill {
            return;
        }
        self.pending_kill = true;
        self.destroy_actors();
        self.kickoff_pending_kill();
    }

    /// Registers a spawn broadcast handler.
    pub fn add_actor_spawned_handler(&mut self, handler: ActorSpawnedHandler) {
        self.on_actor_spawned.push(handler);
    }

    // ========================================================================
    // Levels
    // ========================================================================

    /// Adds a streamed level. The persistent level of another world is
    /// rejected.
    pub fn add_level(&mut self, level: Level) -> Result<LevelKey> {
        if level.persistent {
            log::warn!("add_level: can't add persistent level");
            return Err(SagaError::PersistentLevel("added"));
        }
        if self.physics.is_during_physics_update() {
            return Err(SagaError::DuringPhysicsUpdate);
        }
        let mut level = level;
        level.owned = true;
        level.world_index = self.level_list.len();
        let key = self.levels.insert(level);
        self.level_list.push(key);
        Ok(key)
    }

    /// Removes a streamed level, destroying its actors, and returns it.
    pub fn remove_level(&mut self, key: LevelKey) -> Result<Level> {
        {
            let level = self.levels.get(key).ok_or(SagaError::LevelNotInWorld)?;
            if level.persistent {
                log::warn!("remove_level: can't remove persistent level");
                return Err(SagaError::PersistentLevel("removed"));
            }
        }
        if self.physics.is_during_physics_update() {
            return Err(SagaError::DuringPhysicsUpdate);
        }

        let level_actors = self.levels[key].actors.clone();
        for actor in level_actors {
            self.destroy_actor(actor);
        }
        self.kickoff_pending_kill();

        let world_index = self.levels[key].world_index;
        let last = self.level_list.len() - 1;
        self.level_list.swap(world_index, last);
        self.level_list.pop();
        if world_index < self.level_list.len() {
            let moved = self.level_list[world_index];
            self.levels[moved].world_index = world_index;
        }

        let mut level = self.levels.remove(key).expect("level present");
        level.owned = false;
        level.world_index = usize::MAX;
        Ok(level)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Arms a timer owned by `owner`; fires through the actor script's
    /// `on_timer`.
    pub fn add_timer(&mut self, owner: ActorKey, interval: f32, repeat: bool) -> Option<TimerKey> {
        let actor = self.actors.get(owner)?;
        if actor.pending_kill {
            return None;
        }
        let key = self.timers.insert(Timer::new(owner, interval, repeat));
        self.timer_list.push(key);
        Some(key)
    }

    pub fn remove_timer(&mut self, key: TimerKey) {
        if self.timers.remove(key).is_some() {
            if let Some(pos) = self.timer_list.iter().position(|&k| k == key) {
                self.timer_list.swap_remove(pos);
            }
        }
    }

    #[must_use]
    pub fn timer(&self, key: TimerKey) -> Option<&Timer> {
        self.timers.get(key)
    }

    fn cancel_actor_timers(&mut self, owner: ActorKey) {
        let owned: Vec<TimerKey> = self
            .timer_list
            .iter()
            .copied()
            .filter(|&k| self.timers.get(k).is_some_and(|t| t.owner == owner))
            .collect();
        for key in owned {
            self.remove_timer(key);
        }
    }

    fn update_timers(&mut self, time_step: f32) {
        let keys: Vec<TimerKey> = self.timer_list.clone();
        for key in keys {
            let Some(timer) = self.timers.get_mut(key) else {
                continue;
            };
            let owner = timer.owner;
            let fires = timer.advance(time_step);
            let finished = timer.is_finished();

            for _ in 0..fires {
                let alive = self
                    .actors
                    .get(owner)
                    .is_some_and(|a| !a.pending_kill);
                if !alive {
                    break;
                }
                self.with_script(owner, |script, ctx| script.on_timer(ctx, key));
            }
            if finished {
                self.remove_timer(key);
            }
        }
    }

    // ========================================================================
    // Frame tick
    // ========================================================================

    /// Advances the world by one frame. See the frame scheduler for the
    /// full ordering contract.
    pub fn tick(&mut self, time_step: f32) {
        // Pause requests take effect exactly at frame boundaries
        if self.pause_request {
            self.pause_request = false;
            self.paused = true;
            log::info!("game paused");
        } else if self.unpause_request {
            self.unpause_request = false;
            self.paused = false;
            log::info!("game unpaused");
        }

        // Commit clocks accumulated by the previous tick
        self.running_time_micro = self.running_time_micro_after_tick;
        self.gameplay_time_micro = self.gameplay_time_micro_after_tick;

        self.update_timers(time_step);

        // Main actor tick (pre-physics stage of the frame)
        let snapshot: Vec<ActorKey> = self.actor_list.clone();
        for key in snapshot {
            let Some(actor) = self.actors.get(key) else {
                continue;
            };
            if actor.pending_kill {
                continue;
            }
            if self.paused && !actor.flags.contains(ActorFlags::TICK_EVEN_WHEN_PAUSED) {
                continue;
            }
            if actor.flags.contains(ActorFlags::CAN_EVER_TICK) {
                self.with_script(key, |script, ctx| script.tick(ctx, time_step));
            }
        }

        self.simulate_physics(time_step);

        self.update_drawable_areas();

        let levels: Vec<LevelKey> = self.level_list.clone();
        for key in levels {
            if let Some(level) = self.levels.get_mut(key) {
                level.tick(time_step);
            }
        }

        self.kickoff_pending_kill();

        let frame_duration = (f64::from(time_step) * 1_000_000.0) as i64;
        self.running_time_micro_after_tick += frame_duration;
    }

    /// Frees pending-kill components and actors, unlinking them from their
    /// owners by stored indices (swap-with-last).
    pub fn kickoff_pending_kill(&mut self) {
        while !self.dying_components.is_empty() || !self.dying_actors.is_empty() {
            let dying = std::mem::take(&mut self.dying_components);
            for key in dying {
                if let Some(component) = self.components.get(key) {
                    let owner = component.owner;
                    let index = component.index_in_actor;
                    if let Some(actor) = self.actors.get_mut(owner) {
                        if index < actor.components.len() && actor.components[index] == key {
                            let last = actor.components.len() - 1;
                            actor.components.swap(index, last);
                            actor.components.pop();
                            if index < actor.components.len() {
                                let moved = actor.components[index];
                                self.components[moved].index_in_actor = index;
                            }
                        }
                    }
                }
                self.components.remove(key);
            }

            let dying = std::mem::take(&mut self.dying_actors);
            for key in dying {
                if let Some(actor) = self.actors.get(key) {
                    let world_index = actor.world_index;
                    let level_key = actor.level;
                    let level_index = actor.level_index;

                    debug_assert_eq!(self.actor_list[world_index], key);
                    let last = self.actor_list.len() - 1;
                    self.actor_list.swap(world_index, last);
                    self.actor_list.pop();
                    if world_index < self.actor_list.len() {
                        let moved = self.actor_list[world_index];
                        self.actors[moved].world_index = world_index;
                    }

                    if let Some(level) = self.levels.get_mut(level_key) {
                        if level_index < level.actors.len() && level.actors[level_index] == key {
                            let last = level.actors.len() - 1;
                            level.actors.swap(level_index, last);
                            level.actors.pop();
                            if level_index < level.actors.len() {
                                let moved = level.actors[level_index];
                                self.actors[moved].level_index = level_index;
                            }
                        }
                    }
                }
                self.actors.remove(key);
            }
        }
    }

    // ========================================================================
    // Script dispatch
    // ========================================================================

    /// Runs `f` with the actor's script taken out of the actor, so the hook
    /// gets full mutable world access. Reentrant calls on the same actor
    /// are skipped (the box is already out).
    pub(crate) fn with_script(
        &mut self,
        key: ActorKey,
        f: impl FnOnce(&mut dyn ActorScript, &mut ScriptContext),
    ) {
        let Some(mut script) = self.actors.get_mut(key).and_then(|a| a.script.take()) else {
            return;
        };
        {
            let mut ctx = ScriptContext { world: self, actor: key };
            f(script.as_mut(), &mut ctx);
        }
        if let Some(actor) = self.actors.get_mut(key) {
            actor.script = Some(script);
        }
    }

    /// Immutable access to an actor's script state (for attribute reads and
    /// tests).
    #[must_use]
    pub fn script(&self, key: ActorKey) -> Option<&dyn ActorScript> {
        self.actors.get(key)?.script.as_deref()
    }

    /// Mutable access to an actor's script state. Direct state mutation
    /// only; hooks are driven by the tick.
    #[must_use]
    pub fn script_mut(&mut self, key: ActorKey) -> Option<&mut dyn ActorScript> {
        self.actors.get_mut(key)?.script.as_deref_mut()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("actors", &self.actor_list.len())
            .field("levels", &self.level_list.len())
            .field("paused", &self.paused)
            .field("running_time_micro", &self.running_time_micro)
            .finish()
    }
}
