//! Physics world: fixed-step bookkeeping around the black-box solver.
//!
//! The substep loop itself is driven by `World::simulate_physics` so the
//! pre/post hooks can tick actors and dispatch events with full world
//! access; this type owns the solver, the stepping configuration, the
//! deferred registration queue and the double-buffered contact state.

use glam::{Affine3A, Quat, Vec3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::physics::contact::ContactState;
use crate::physics::solver::{
    CollisionSolver, QueryFilter, SolverBodyId, SweepShape, TraceHit,
};
use crate::scene::ComponentKey;

/// Default fixed-step rate.
pub const DEFAULT_PHYSICS_HERTZ: u32 = 60;
/// Upper bound of fixed steps consumed per frame; keeps a long frame from
/// spiraling.
pub const MAX_SIMULATION_STEPS: u32 = 8;

/// World-level query filter: broadphase bits plus component exclusions.
#[derive(Debug, Clone)]
pub struct CollisionQueryFilter {
    pub group: u32,
    pub mask: u32,
    pub ignore_bodies: SmallVec<[ComponentKey; 4]>,
    /// Sort all-hit traces by distance.
    pub sort_by_distance: bool,
}

impl Default for CollisionQueryFilter {
    fn default() -> Self {
        Self {
            group: 0xffff,
            mask: 0xffff,
            ignore_bodies: SmallVec::new(),
            sort_by_distance: false,
        }
    }
}

/// One hit of a world-level trace, resolved to a component.
#[derive(Debug, Clone, Copy)]
pub struct CollisionTraceResult {
    pub body: ComponentKey,
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub fraction: f32,
}

/// Physics state owned by a world.
pub struct PhysicsWorld {
    pub(crate) solver: Box<dyn CollisionSolver>,

    hertz: u32,
    interpolation: bool,
    pub(crate) accumulator: f32,

    gravity: Vec3,
    gravity_dirty: bool,
    iterations: u32,
    split_impulse: bool,

    pub(crate) fixed_tick_number: u64,
    pub(crate) during_physics_update: bool,

    /// Bodies queued for insertion at the next pre-physics callback.
    pub(crate) pending_add: Vec<ComponentKey>,
    /// Bodies currently registered with the solver.
    pub(crate) registered: Vec<ComponentKey>,
    pub(crate) component_of_body: FxHashMap<SolverBodyId, ComponentKey>,
    next_body_id: SolverBodyId,

    pub(crate) contact_state: ContactState,
    /// Transient anomalies are logged at most once per frame.
    pub(crate) anomaly_logged: bool,
}

impl PhysicsWorld {
    #[must_use]
    pub fn new(solver: Box<dyn CollisionSolver>) -> Self {
        Self {
            solver,
            hertz: DEFAULT_PHYSICS_HERTZ,
            interpolation: true,
            accumulator: 0.0,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            gravity_dirty: true,
            iterations: 10,
            split_impulse: false,
            fixed_tick_number: 0,
            during_physics_update: false,
            pending_add: Vec::new(),
            registered: Vec::new(),
            component_of_body: FxHashMap::default(),
            next_body_id: 0,
            contact_state: ContactState::default(),
            anomaly_logged: false,
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Physics simulation refresh rate.
    pub fn set_physics_hertz(&mut self, hertz: u32) {
        self.hertz = hertz.clamp(1, 1000);
    }

    #[inline]
    #[must_use]
    pub fn fixed_time_step(&self) -> f32 {
        1.0 / self.hertz as f32
    }

    /// Enables render-transform interpolation between fixed steps.
    pub fn set_physics_interpolation(&mut self, interpolation: bool) {
        self.interpolation = interpolation;
    }

    #[inline]
    #[must_use]
    pub fn physics_interpolation(&self) -> bool {
        self.interpolation
    }

    /// Gravity changes are deferred to the next step boundary.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        self.gravity_dirty = true;
    }

    #[inline]
    #[must_use]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_contact_solver_iterations(&mut self, iterations: u32) {
        self.iterations = iterations.clamp(1, 256);
    }

    pub fn set_contact_solver_split_impulse(&mut self, split_impulse: bool) {
        self.split_impulse = split_impulse;
    }

    #[inline]
    #[must_use]
    pub fn is_during_physics_update(&self) -> bool {
        self.during_physics_update
    }

    #[inline]
    #[must_use]
    pub fn fixed_tick_number(&self) -> u64 {
        self.fixed_tick_number
    }

    /// Applies deferred gravity and solver tuning; called at step entry.
    pub(crate) fn apply_step_settings(&mut self) {
        self.solver
            .set_solver_settings(self.iterations, self.split_impulse);
        if self.gravity_dirty {
            self.solver.set_gravity(self.gravity);
            self.gravity_dirty = false;
        }
    }

    /// Number of fixed steps to consume for `time_step`, and the residual
    /// left in the accumulator afterwards. The residual is carried in both
    /// modes; in interpolation mode it becomes the blend factor.
    pub(crate) fn plan_steps(&mut self, time_step: f32) -> u32 {
        self.accumulator += time_step;
        let fixed = self.fixed_time_step();
        let steps = (self.accumulator / fixed).floor() as u32;
        let steps = steps.min(MAX_SIMULATION_STEPS);
        self.accumulator -= steps as f32 * fixed;
        steps
    }

    /// Allocates the next stable body id (never zero).
    pub(crate) fn alloc_body_id(&mut self) -> SolverBodyId {
        self.next_body_id += 1;
        self.next_body_id
    }

    #[must_use]
    pub(crate) fn component_of(&self, id: SolverBodyId) -> Option<ComponentKey> {
        self.component_of_body.get(&id).copied()
    }

    // ========================================================================
    // Traces
    // ========================================================================

    fn solver_filter(&self, filter: &CollisionQueryFilter) -> QueryFilter {
        use crate::physics::solver::clamp_unsigned_short;
        let mut ignore = SmallVec::new();
        for (&id, &component) in &self.component_of_body {
            if filter.ignore_bodies.contains(&component) {
                ignore.push(id);
            }
        }
        QueryFilter {
            group: clamp_unsigned_short(i64::from(filter.group)),
            mask: clamp_unsigned_short(i64::from(filter.mask)),
            ignore,
        }
    }

    fn resolve_hits(
        &self,
        hits: Vec<TraceHit>,
        sort: bool,
        results: &mut Vec<CollisionTraceResult>,
    ) -> bool {
        let start = results.len();
        for hit in hits {
            if let Some(body) = self.component_of(hit.body) {
                results.push(CollisionTraceResult {
                    body,
                    position: hit.position,
                    normal: hit.normal,
                    distance: hit.distance,
                    fraction: hit.fraction,
                });
            }
        }
        if sort {
            results[start..].sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        results.len() > start
    }

    /// All-hits ray trace over collision bodies.
    pub fn trace(
        &self,
        results: &mut Vec<CollisionTraceResult>,
        ray_start: Vec3,
        ray_end: Vec3,
        filter: &CollisionQueryFilter,
    ) -> bool {
        let mut hits = Vec::new();
        self.solver
            .ray_test(ray_start, ray_end, &self.solver_filter(filter), &mut hits);
        self.resolve_hits(hits, filter.sort_by_distance, results)
    }

    /// Closest-hit ray trace.
    #[must_use]
    pub fn trace_closest(
        &self,
        ray_start: Vec3,
        ray_end: Vec3,
        filter: &CollisionQueryFilter,
    ) -> Option<CollisionTraceResult> {
        let mut results = Vec::new();
        self.trace(&mut results, ray_start, ray_end, filter);
        results.into_iter().min_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Shape sweep; first blocking hit per body.
    pub fn trace_shape(
        &self,
        results: &mut Vec<CollisionTraceResult>,
        shape: &SweepShape,
        rotation: Quat,
        ray_start: Vec3,
        ray_end: Vec3,
        filter: &CollisionQueryFilter,
    ) -> bool {
        let mut hits = Vec::new();
        self.solver.sweep_test(
            shape,
            rotation,
            ray_start,
            ray_end,
            &self.solver_filter(filter),
            &mut hits,
        );
        self.resolve_hits(hits, filter.sort_by_distance, results)
    }

    /// Overlap query via a transient ghost shape; appends the component
    /// keys of every overlapping registered body.
    pub fn query_bodies(
        &self,
        results: &mut Vec<ComponentKey>,
        shape: &crate::physics::shapes::CollisionComposition,
        transform: Affine3A,
        filter: &CollisionQueryFilter,
    ) {
        let mut ids = Vec::new();
        self.solver
            .contact_test(shape, transform, &self.solver_filter(filter), &mut ids);
        for id in ids {
            if let Some(component) = self.component_of(id) {
                results.push(component);
            }
        }
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("hertz", &self.hertz)
            .field("interpolation", &self.interpolation)
            .field("fixed_tick_number", &self.fixed_tick_number)
            .field("registered", &self.registered.len())
            .finish()
    }
}
