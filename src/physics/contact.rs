//! Double-buffered contact set and event payloads.
//!
//! After each fixed step the live manifolds are folded into the current
//! contact set, hashed by the canonical `(max_id, min_id)` pair of stable
//! body ids. Pairing the current set against the previous one classifies
//! each contact as begin or update; previous-set entries missing from the
//! current set are ends. A pair with a trigger on either side is an
//! overlap, otherwise a contact.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::physics::solver::{Manifold, SolverBodyId};
use crate::scene::{ActorKey, ComponentKey};

/// One extracted contact point, oriented for the receiving side.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    pub position: Vec3,
    /// Normal pointing from the other body toward the receiver.
    pub normal: Vec3,
    pub distance: f32,
    pub impulse: f32,
}

/// Payload of a contact begin/update/end event.
#[derive(Debug, Clone)]
pub struct ContactEvent {
    pub self_actor: ActorKey,
    pub self_body: ComponentKey,
    pub other_actor: ActorKey,
    pub other_body: ComponentKey,
    /// Contact points; empty unless the receiving body generates them.
    /// Always empty on end events.
    pub points: Vec<ContactPoint>,
}

/// Payload of an overlap begin/update/end event (trigger pairs).
#[derive(Debug, Clone, Copy)]
pub struct OverlapEvent {
    pub self_actor: ActorKey,
    pub self_body: ComponentKey,
    pub other_actor: ActorKey,
    pub other_body: ComponentKey,
}

/// One tracked contact pair, canonicalized so `id_a > id_b`.
#[derive(Debug, Clone)]
pub(crate) struct CollisionContact {
    pub body_a: ComponentKey,
    pub body_b: ComponentKey,
    pub actor_a: ActorKey,
    pub actor_b: ActorKey,
    pub id_a: SolverBodyId,
    pub id_b: SolverBodyId,
    pub manifold: Manifold,
    /// Either side is a trigger: classify as overlap.
    pub overlap: bool,
    pub actor_a_wants_events: bool,
    pub actor_b_wants_events: bool,
    pub generate_points_a: bool,
    pub generate_points_b: bool,
}

impl CollisionContact {
    #[inline]
    pub(crate) fn key(&self) -> (SolverBodyId, SolverBodyId) {
        (self.id_a, self.id_b)
    }
}

/// The double buffer, indexed by `fixed_tick_number & 1`.
#[derive(Debug, Default)]
pub(crate) struct ContactState {
    pub contacts: [Vec<CollisionContact>; 2],
    pub hash: [FxHashMap<(SolverBodyId, SolverBodyId), u32>; 2],
    /// `(contact_index << 1) | side` of the cached extraction.
    points_cache_key: Option<u32>,
    points_cache: Vec<ContactPoint>,
}

impl ContactState {
    /// Clears the current-side buffers for refilling.
    pub fn begin_tick(&mut self, parity: usize) {
        self.contacts[parity].clear();
        self.hash[parity].clear();
        self.points_cache_key = None;
    }

    /// Inserts a canonicalized contact; duplicates of the same pair are
    /// rejected (logged once by the caller).
    pub fn insert(&mut self, parity: usize, contact: CollisionContact) -> bool {
        let key = contact.key();
        if self.hash[parity].contains_key(&key) {
            return false;
        }
        let index = self.contacts[parity].len() as u32;
        self.hash[parity].insert(key, index);
        self.contacts[parity].push(contact);
        true
    }

    /// Whether the pair existed in the other buffer (an update rather than
    /// a begin).
    #[must_use]
    pub fn existed_in(&self, parity: usize, key: (SolverBodyId, SolverBodyId)) -> bool {
        self.hash[parity].contains_key(&key)
    }

    /// Lazily extracts contact points for `(contact_index, side)` of the
    /// current buffer; repeated calls for the same key reuse the cache.
    /// Side 0 receives the manifold as-is (normals point toward body A),
    /// side 1 receives flipped normals.
    pub fn contact_points(&mut self, parity: usize, contact_index: u32, side: u32) -> &[ContactPoint] {
        let cache_key = (contact_index << 1) | side;
        if self.points_cache_key != Some(cache_key) {
            self.points_cache_key = Some(cache_key);
            self.points_cache.clear();
            let manifold = &self.contacts[parity][contact_index as usize].manifold;
            let flip = side == 1;
            for p in &manifold.points {
                self.points_cache.push(ContactPoint {
                    position: p.position,
                    normal: if flip { -p.normal } else { p.normal },
                    distance: p.distance,
                    impulse: p.impulse,
                });
            }
        }
        &self.points_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    use crate::physics::solver::ManifoldPoint;

    fn contact(id_a: u64, id_b: u64) -> CollisionContact {
        CollisionContact {
            body_a: ComponentKey::default(),
            body_b: ComponentKey::default(),
            actor_a: ActorKey::default(),
            actor_b: ActorKey::default(),
            id_a,
            id_b,
            manifold: Manifold {
                body_a: id_a,
                body_b: id_b,
                points: smallvec![ManifoldPoint {
                    position: Vec3::ZERO,
                    normal: Vec3::Y,
                    distance: -0.01,
                    impulse: 1.0,
                    combined_friction: 0.5,
                    combined_restitution: 0.0,
                }],
            },
            overlap: false,
            actor_a_wants_events: true,
            actor_b_wants_events: true,
            generate_points_a: true,
            generate_points_b: true,
        }
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let mut state = ContactState::default();
        state.begin_tick(0);
        assert!(state.insert(0, contact(2, 1)));
        assert!(!state.insert(0, contact(2, 1)));
        assert_eq!(state.contacts[0].len(), 1);
    }

    #[test]
    fn begin_vs_update_classification() {
        let mut state = ContactState::default();
        state.begin_tick(0);
        state.insert(0, contact(2, 1));

        // Next fixed tick: same pair shows up again
        state.begin_tick(1);
        state.insert(1, contact(2, 1));
        assert!(state.existed_in(0, (2, 1)));

        // A new pair is a begin
        state.insert(1, contact(5, 3));
        assert!(!state.existed_in(0, (5, 3)));
    }

    #[test]
    fn point_extraction_flips_for_side_b() {
        let mut state = ContactState::default();
        state.begin_tick(0);
        state.insert(0, contact(2, 1));

        let a_side = state.contact_points(0, 0, 0).to_vec();
        assert_eq!(a_side[0].normal, Vec3::Y);
        let b_side = state.contact_points(0, 0, 1).to_vec();
        assert_eq!(b_side[0].normal, -Vec3::Y);
    }
}
