//! Physics World
//!
//! Fixed-step physics around a black-box solver:
//!
//! - [`PhysicsWorld`] - stepping configuration, deferred body registration,
//!   traces and overlap queries
//! - [`CollisionSolver`](solver::CollisionSolver) - the contract a solver
//!   implements; [`ReferenceSolver`](reference::ReferenceSolver) is the
//!   built-in headless implementation
//! - [`PhysicalBody`](body::PhysicalBody) - the scene component owning a
//!   compound collision shape
//! - contact/overlap event machinery with a double-buffered, canonically
//!   hashed contact set
//!
//! The per-frame substep loop is driven by
//! [`World::simulate_physics`](crate::world::World), which calls the
//! pre/post hooks between solver fixed steps.

pub mod body;
pub mod contact;
pub mod reference;
pub mod shapes;
pub mod solver;
pub mod world;

pub use body::PhysicalBody;
pub use contact::{ContactEvent, ContactPoint, OverlapEvent};
pub use reference::ReferenceSolver;
pub use shapes::{CollisionComposition, CollisionShape, ShapeInstance};
pub use solver::{
    clamp_unsigned_short, CollisionSolver, Manifold, ManifoldPoint, QueryFilter, SolverBodyDesc,
    SolverBodyId, SolverHooks, SweepShape, TraceHit,
};
pub use world::{CollisionQueryFilter, CollisionTraceResult, PhysicsWorld, DEFAULT_PHYSICS_HERTZ};
