//! Frame Scheduler
//!
//! [`GameEngine`] owns the live worlds and the render frontend and drives
//! the per-frame sequence: advance every live world (tick order documented
//! on [`World::tick`]), drop worlds that died this frame, then run the
//! frontend over each viewport and hand the packet to the backend. Frame
//! scratch memory is owned here and reset once the packet was consumed.

use std::sync::Arc;

use crate::errors::Result;
use crate::frontend::{FramePacket, RenderFrontend, Viewport};
use crate::world::{ActorFactory, World, WorldContext};

/// Index of a world inside the engine.
pub type WorldIndex = usize;

/// The top-level scheduler.
pub struct GameEngine {
    actor_factory: Arc<ActorFactory>,
    worlds: Vec<World>,
    frontend: RenderFrontend,
    frame_number: u64,
    /// Frame duration of the last update in microseconds.
    frame_duration_micro: i64,
}

impl GameEngine {
    #[must_use]
    pub fn new(actor_factory: Arc<ActorFactory>) -> Self {
        Self {
            actor_factory,
            worlds: Vec::new(),
            frontend: RenderFrontend::new(),
            frame_number: 0,
            frame_duration_micro: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn actor_factory(&self) -> &Arc<ActorFactory> {
        &self.actor_factory
    }

    #[inline]
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    // ========================================================================
    // Worlds
    // ========================================================================

    /// Creates a new world with the engine's shared collaborators.
    pub fn create_world(&mut self) -> Result<WorldIndex> {
        self.create_world_with(WorldContext::new(self.actor_factory.clone()))
    }

    /// Creates a new world with an explicit context (custom solver).
    pub fn create_world_with(&mut self, context: WorldContext) -> Result<WorldIndex> {
        let mut world = World::create(context)?;
        world.world_index = self.worlds.len();
        self.worlds.push(world);
        Ok(self.worlds.len() - 1)
    }

    #[must_use]
    pub fn world(&self, index: WorldIndex) -> Option<&World> {
        self.worlds.get(index)
    }

    #[must_use]
    pub fn world_mut(&mut self, index: WorldIndex) -> Option<&mut World> {
        self.worlds.get_mut(index)
    }

    #[must_use]
    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    /// Destroys every world; they are dropped at the next update's kickoff.
    pub fn destroy_worlds(&mut self) {
        for world in &mut self.worlds {
            world.destroy();
        }
    }

    // ========================================================================
    // The frame
    // ========================================================================

    /// Advances all live worlds by `time_step` seconds and then drops the
    /// worlds that died.
    pub fn update_worlds(&mut self, time_step: f32) {
        self.frame_number += 1;
        self.frame_duration_micro = (f64::from(time_step) * 1_000_000.0) as i64;

        for world in &mut self.worlds {
            if world.is_pending_kill() {
                continue;
            }
            world.tick(time_step);
        }

        self.kickoff_pending_kill_worlds();
    }

    /// Removes worlds marked pending-kill, fixing swap indices.
    fn kickoff_pending_kill_worlds(&mut self) {
        let mut i = 0;
        while i < self.worlds.len() {
            if self.worlds[i].is_pending_kill() {
                self.worlds.swap_remove(i);
                if i < self.worlds.len() {
                    self.worlds[i].world_index = i;
                }
            } else {
                i += 1;
            }
        }
    }

    /// Runs the render frontend over the given viewports and returns the
    /// frame packet for the backend. Each viewport names the world it
    /// renders.
    pub fn render_frame(
        &mut self,
        viewports: &mut [(WorldIndex, Viewport)],
    ) -> &FramePacket {
        self.frontend.begin_frame();
        for (world_index, viewport) in viewports {
            let Some(world) = self.worlds.get_mut(*world_index) else {
                log::warn!("render_frame: stale world index {world_index}");
                continue;
            };
            if world.is_pending_kill() {
                continue;
            }
            self.frontend.render_view(world, viewport);
        }
        self.frontend.frame_packet()
    }

    #[inline]
    #[must_use]
    pub fn frontend(&self) -> &RenderFrontend {
        &self.frontend
    }
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("worlds", &self.worlds.len())
            .field("frame_number", &self.frame_number)
            .finish()
    }
}
