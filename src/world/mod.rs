//! Level & World Container
//!
//! [`World`] owns its persistent level, streamed levels, the global physics
//! world and the per-frame tick. [`Level`] holds actors, visibility areas
//! with portals, BSP data and baked lighting for its brush geometry.
//!
//! The frame tick order is: pause requests, clocks, timers, actor ticks,
//! the fixed-step physics update (pre/post hooks, event dispatch), drawable
//! area maintenance, level ticks, and finally the pending-kill kickoff.

pub mod level;
pub mod physics_step;
pub mod raycast;
pub mod scene_graph;
pub mod timer;
#[allow(clippy::module_inception)]
pub mod world;

pub use level::{AreaPortal, Level, LevelPortal, NavMeshData, VisArea, OUTDOOR_AREA};
pub use raycast::{BoxHitResult, RaycastFilter, WorldRaycastHit};
pub use timer::Timer;
pub use world::{
    ActorFactory, ActorSpawnedHandler, SpawnClass, SpawnInfo, SpawnTransform, World, WorldContext,
};
