use smallvec::SmallVec;

use crate::physics::shapes::CollisionComposition;
use crate::physics::solver::SolverBodyId;
use crate::scene::ActorKey;

/// Scene component owning one compound collision shape and, while
/// registered, a rigid body in the physics world.
///
/// Registration is deferred: `World::add_physical_body` links the component
/// into a pending list drained at the next pre-physics callback, so bodies
/// may be added from inside tick or contact callbacks. Removal is immediate
/// and also purges the pending list.
#[derive(Debug)]
pub struct PhysicalBody {
    pub composition: CollisionComposition,
    /// Zero mass makes the body static.
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Broadphase group bits; clamped to unsigned short at the solver
    /// boundary.
    pub collision_group: u32,
    pub collision_mask: u32,
    /// Triggers classify their pairs as overlaps and never generate contact
    /// point arrays.
    pub trigger: bool,
    pub dispatch_contact_events: bool,
    pub dispatch_overlap_events: bool,
    /// Contact events carry contact-point arrays only when set; extraction
    /// is lazy and cached per side.
    pub generate_contact_points: bool,
    /// Actors whose bodies never collide with this one.
    pub collision_ignore_actors: SmallVec<[ActorKey; 2]>,
    /// Opaque soft-body handle; soft bodies never cross the event machinery.
    pub soft_body: Option<u64>,

    /// Stable id used for canonical contact hashing; assigned on first
    /// registration.
    pub(crate) body_id: SolverBodyId,
    pub(crate) in_world: bool,
    pub(crate) pending_add: bool,
}

impl PhysicalBody {
    #[must_use]
    pub fn new(composition: CollisionComposition, mass: f32) -> Self {
        Self {
            composition,
            mass,
            friction: 0.5,
            restitution: 0.0,
            collision_group: 1,
            collision_mask: 0xffff,
            trigger: false,
            dispatch_contact_events: false,
            dispatch_overlap_events: false,
            generate_contact_points: false,
            collision_ignore_actors: SmallVec::new(),
            soft_body: None,
            body_id: 0,
            in_world: false,
            pending_add: false,
        }
    }

    /// Stable body id; zero until the body was registered once.
    #[inline]
    #[must_use]
    pub fn body_id(&self) -> SolverBodyId {
        self.body_id
    }

    #[inline]
    #[must_use]
    pub fn is_in_world(&self) -> bool {
        self.in_world
    }

    /// Whether any pair involving this body must reach the event dispatch.
    #[must_use]
    pub fn wants_events(&self) -> bool {
        if self.trigger {
            self.dispatch_overlap_events
        } else {
            self.dispatch_contact_events
        }
    }
}
