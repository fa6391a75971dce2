#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod engine;
pub mod errors;
pub mod frontend;
pub mod physics;
pub mod scene;
pub mod spatial;
pub mod visibility;
pub mod world;

pub use crate::core::{AttributeDescriptor, ClassDescriptor, ClassId, ObjectFactory};
pub use engine::GameEngine;
pub use errors::{Result, SagaError};
pub use frontend::{FramePacket, RenderFrontend, RenderView, Viewport};
pub use physics::{CollisionShape, ContactEvent, OverlapEvent, PhysicsWorld};
pub use scene::{ActorScript, SceneKind, Transform};
pub use spatial::{AabbTree, BoundingBox, BspData, Frustum, Mesh, Plane};
pub use world::{Level, SpawnInfo, World};
