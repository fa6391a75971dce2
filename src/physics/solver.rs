//! The black-box solver contract.
//!
//! The core treats the physics solver as an opaque fixed-step integrator
//! behind [`CollisionSolver`]. The contract mirrors what the stepper needs:
//! body registration with unsigned-short group/mask, a broadphase filter
//! hook, a per-contact post-processing hook, persistent manifold
//! enumeration after each step, and ray/sweep/contact-test queries.
//!
//! [`ReferenceSolver`](crate::physics::reference::ReferenceSolver) backs the
//! contract for headless simulation and tests; a production solver slots in
//! behind the same trait.

use glam::{Affine3A, Quat, Vec3};
use smallvec::SmallVec;

use crate::physics::shapes::CollisionComposition;

/// Caller-assigned stable body identifier; also the canonical key for
/// contact pair hashing.
pub type SolverBodyId = u64;

/// Registration payload for [`CollisionSolver::add_rigid_body`].
#[derive(Debug, Clone)]
pub struct SolverBodyDesc {
    pub id: SolverBodyId,
    pub shape: CollisionComposition,
    pub transform: Affine3A,
    /// Zero mass makes the body static.
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Triggers report manifolds but are not resolved.
    pub trigger: bool,
    pub group: u16,
    pub mask: u16,
}

/// One contact point of a manifold, in world space on body B.
#[derive(Debug, Clone, Copy)]
pub struct ManifoldPoint {
    pub position: Vec3,
    /// Unit normal on B pointing toward A.
    pub normal: Vec3,
    /// Signed separation; negative when penetrating.
    pub distance: f32,
    /// Impulse applied by the resolver this step.
    pub impulse: f32,
    pub combined_friction: f32,
    pub combined_restitution: f32,
}

/// Persistent contact manifold between two bodies.
#[derive(Debug, Clone)]
pub struct Manifold {
    pub body_a: SolverBodyId,
    pub body_b: SolverBodyId,
    pub points: SmallVec<[ManifoldPoint; 4]>,
}

/// Core-side hooks invoked by the solver during a fixed step.
#[allow(unused_variables)]
pub trait SolverHooks {
    /// Extra broadphase pair rejection after the group/mask test (e.g.
    /// collision-ignore actor lists). Returning false drops the pair.
    fn broadphase_filter(&self, a: SolverBodyId, b: SolverBodyId) -> bool {
        true
    }

    /// Post-processes a freshly added contact point: triangle-mesh
    /// internal-edge normal fixes and combined material parameters.
    fn contact_added(&self, point: &mut ManifoldPoint, a: SolverBodyId, b: SolverBodyId) {}
}

/// Hooks instance with the default behavior.
pub struct NoHooks;
impl SolverHooks for NoHooks {}

/// One hit of a ray or sweep test.
#[derive(Debug, Clone, Copy)]
pub struct TraceHit {
    pub body: SolverBodyId,
    pub position: Vec3,
    pub normal: Vec3,
    /// Distance along the trace.
    pub distance: f32,
    /// Normalized position along the trace.
    pub fraction: f32,
}

/// Swept shape for [`CollisionSolver::sweep_test`].
#[derive(Debug, Clone)]
pub enum SweepShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Cylinder { half_extents: Vec3 },
    Capsule { radius: f32, height: f32 },
    Convex { vertices: Vec<Vec3> },
}

/// Solver-level query filter.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub group: u16,
    pub mask: u16,
    /// Body ids excluded from the query.
    pub ignore: SmallVec<[SolverBodyId; 4]>,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            group: 0xffff,
            mask: 0xffff,
            ignore: SmallVec::new(),
        }
    }
}

impl QueryFilter {
    #[must_use]
    pub fn accepts(&self, body_group: u16, body_mask: u16, body: SolverBodyId) -> bool {
        (u32::from(self.group) & u32::from(body_mask)) != 0
            && (u32::from(body_group) & u32::from(self.mask)) != 0
            && !self.ignore.contains(&body)
    }
}

/// The solver interface consumed by [`PhysicsWorld`](crate::physics::PhysicsWorld).
#[allow(unused_variables)]
pub trait CollisionSolver {
    fn set_gravity(&mut self, gravity: Vec3);

    /// Split-impulse and iteration count, applied at each step entry.
    fn set_solver_settings(&mut self, iterations: u32, split_impulse: bool);

    fn add_rigid_body(&mut self, desc: SolverBodyDesc);
    fn remove_rigid_body(&mut self, id: SolverBodyId);
    fn has_body(&self, id: SolverBodyId) -> bool;

    fn set_body_transform(&mut self, id: SolverBodyId, transform: Affine3A);
    fn body_transform(&self, id: SolverBodyId) -> Option<Affine3A>;
    fn body_velocity(&self, id: SolverBodyId) -> Option<(Vec3, Vec3)>;
    fn set_body_velocity(&mut self, id: SolverBodyId, linear: Vec3, angular: Vec3);

    /// Advances the simulation by exactly one fixed step.
    fn step_fixed(&mut self, time_step: f32, hooks: &dyn SolverHooks);

    /// Lets the solver blend render transforms between the last two fixed
    /// steps; optional.
    fn interpolate_transforms(&mut self, alpha: f32) {}

    /// Live manifolds after the last fixed step.
    fn manifolds(&self) -> &[Manifold];

    /// Ray test appending every hit.
    fn ray_test(
        &self,
        start: Vec3,
        end: Vec3,
        filter: &QueryFilter,
        hits: &mut Vec<TraceHit>,
    );

    /// Shape sweep from `start` to `end` with a fixed rotation.
    fn sweep_test(
        &self,
        shape: &SweepShape,
        rotation: Quat,
        start: Vec3,
        end: Vec3,
        filter: &QueryFilter,
        hits: &mut Vec<TraceHit>,
    );

    /// Overlap test of a transient ghost shape; appends the ids of every
    /// overlapping body.
    fn contact_test(
        &self,
        shape: &CollisionComposition,
        transform: Affine3A,
        filter: &QueryFilter,
        results: &mut Vec<SolverBodyId>,
    );
}

/// Clamps a signed collision group/mask to the solver's unsigned-short
/// boundary.
#[inline]
#[must_use]
pub fn clamp_unsigned_short(value: i64) -> u16 {
    value.clamp(0, 0xffff) as u16
}
