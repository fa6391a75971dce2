//! Scene Entities
//!
//! Actors, components and the scene component tree.
//!
//! An [`Actor`](actor::Actor) is a composition of components living in
//! exactly one level. Components optionally carry a spatial payload
//! ([`SceneComponent`](component::SceneComponent)): a local [`Transform`],
//! a parent link, a child list and sockets. The spatial payload's `kind`
//! is a closed tagged set ([`SceneKind`]) - drawables, lights, probes,
//! cameras and physical bodies.
//!
//! The scene tree is owned top-down: actors own their components through
//! the world's component map; parent links are plain handles. Structural
//! operations (attach, detach, dirty propagation, world-matrix reads) live
//! on [`World`](crate::world::World) because they touch several components
//! at once.

pub mod actor;
pub mod camera;
pub mod component;
pub mod drawable;
pub mod light;
pub mod transform;

pub use actor::{Actor, ActorFlags, ActorScript, ScriptContext};
pub use camera::{CameraComponent, CameraProjection};
pub use component::{ActorComponent, SceneComponent, SceneKind, Socket};
pub use drawable::{Drawable, DrawableKind, Material};
pub use light::{AnalyticLight, AnalyticLightKind, DirectionalLight, IblProbe};
pub use transform::{Transform, TransformFlags};

use slotmap::new_key_type;

new_key_type! {
    /// Handle of an actor in the world's actor map.
    pub struct ActorKey;

    /// Handle of an actor component in the world's component map.
    pub struct ComponentKey;

    /// Handle of a level owned by a world.
    pub struct LevelKey;

    /// Handle of a world timer.
    pub struct TimerKey;
}
