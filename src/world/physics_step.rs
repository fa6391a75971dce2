//! The world side of the physics update: the fixed-substep loop, the
//! pre/post hooks, body registration and contact/overlap event dispatch.
//!
//! Per frame: settings are applied at step entry, then for each fixed step
//! the pending bodies are inserted, pre-physics actors tick, the solver
//! advances, body transforms sync back to the scene, events dispatch and
//! post-physics actors tick. The accumulator residual is carried; in
//! interpolation mode it becomes the render blend factor.

use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::physics::contact::{CollisionContact, ContactEvent, OverlapEvent};
use crate::physics::solver::{
    clamp_unsigned_short, Manifold, SolverBodyDesc, SolverBodyId, SolverHooks,
};
use crate::physics::{CollisionQueryFilter, CollisionShape};
use crate::scene::actor::ActorFlags;
use crate::scene::component::ActorComponent;
use crate::scene::{ActorKey, ComponentKey};
use crate::world::World;

/// Broadphase hook backed by the component map: rejects pairs whose bodies
/// list the other's owning actor in their ignore set.
struct WorldStepHooks<'a> {
    components: &'a SlotMap<ComponentKey, ActorComponent>,
    body_map: &'a FxHashMap<SolverBodyId, ComponentKey>,
}

impl SolverHooks for WorldStepHooks<'_> {
    fn broadphase_filter(&self, a: SolverBodyId, b: SolverBodyId) -> bool {
        let (Some(&key_a), Some(&key_b)) = (self.body_map.get(&a), self.body_map.get(&b)) else {
            return true;
        };
        let (Some(comp_a), Some(comp_b)) = (self.components.get(key_a), self.components.get(key_b))
        else {
            return true;
        };
        let (Some(body_a), Some(body_b)) = (
            comp_a.scene.as_ref().and_then(|s| s.as_body()),
            comp_b.scene.as_ref().and_then(|s| s.as_body()),
        ) else {
            return true;
        };
        if body_a.collision_ignore_actors.contains(&comp_b.owner) {
            return false;
        }
        if body_b.collision_ignore_actors.contains(&comp_a.owner) {
            return false;
        }
        true
    }
}

impl World {
    // ========================================================================
    // Body registration
    // ========================================================================

    /// Queues a physical-body component for insertion at the next
    /// pre-physics callback. Safe to call from tick and contact callbacks.
    pub fn add_physical_body(&mut self, key: ComponentKey) {
        let Some(body) = self
            .components
            .get_mut(key)
            .and_then(|c| c.scene.as_mut())
            .and_then(|s| s.as_body_mut())
        else {
            log::warn!("add_physical_body: component has no body payload");
            return;
        };
        if body.pending_add || body.in_world {
            return;
        }
        body.pending_add = true;
        self.physics.pending_add.push(key);
    }

    /// Removes a body immediately, including from the pending list.
    pub fn remove_physical_body(&mut self, key: ComponentKey) {
        let Some(body) = self
            .components
            .get_mut(key)
            .and_then(|c| c.scene.as_mut())
            .and_then(|s| s.as_body_mut())
        else {
            return;
        };

        if body.pending_add {
            body.pending_add = false;
            if let Some(pos) = self.physics.pending_add.iter().position(|&k| k == key) {
                self.physics.pending_add.swap_remove(pos);
            }
        }
        if body.in_world {
            body.in_world = false;
            let id = body.body_id;
            self.physics.solver.remove_rigid_body(id);
            self.physics.component_of_body.remove(&id);
            if let Some(pos) = self.physics.registered.iter().position(|&k| k == key) {
                self.physics.registered.swap_remove(pos);
            }
        }
    }

    /// Linear and angular velocity of a registered body.
    #[must_use]
    pub fn body_velocity(&self, key: ComponentKey) -> Option<(Vec3, Vec3)> {
        let body = self.scene_of(key)?.as_body()?;
        self.physics.solver.body_velocity(body.body_id)
    }

    pub fn set_body_velocity(&mut self, key: ComponentKey, linear: Vec3, angular: Vec3) {
        let Some(id) = self
            .scene_of(key)
            .and_then(|s| s.as_body())
            .map(|b| b.body_id)
        else {
            return;
        };
        self.physics.solver.set_body_velocity(id, linear, angular);
    }

    // ========================================================================
    // The substep loop
    // ========================================================================

    /// Runs the fixed-step physics update for one frame. Paused worlds skip
    /// the update entirely, freezing gameplay time.
    pub fn simulate_physics(&mut self, time_step: f32) {
        if self.is_paused() {
            return;
        }

        self.physics.apply_step_settings();
        let fixed = self.physics.fixed_time_step();
        let steps = self.physics.plan_steps(time_step);

        self.physics.during_physics_update = true;
        for _ in 0..steps {
            self.on_pre_physics(fixed);
            self.step_solver_once(fixed);
            self.sync_body_transforms();
            self.on_post_physics(fixed);
        }
        self.physics.during_physics_update = false;

        if self.physics.physics_interpolation() && steps > 0 {
            let alpha = self.physics.accumulator / fixed;
            self.physics.solver.interpolate_transforms(alpha);
            self.sync_body_transforms();
        }

        self.physics.anomaly_logged = false;
    }

    fn step_solver_once(&mut self, fixed_step: f32) {
        // The hook borrows the body map read-only while the solver runs
        let body_map = std::mem::take(&mut self.physics.component_of_body);
        {
            let hooks = WorldStepHooks {
                components: &self.components,
                body_map: &body_map,
            };
            self.physics.solver.step_fixed(fixed_step, &hooks);
        }
        self.physics.component_of_body = body_map;
    }

    /// Writes dynamic body transforms back to their scene components.
    fn sync_body_transforms(&mut self) {
        let registered = self.physics.registered.clone();
        for key in registered {
            let Some((mass, trigger, id)) = self
                .scene_of(key)
                .and_then(|s| s.as_body())
                .map(|b| (b.mass, b.trigger, b.body_id))
            else {
                continue;
            };
            if mass <= 0.0 || trigger {
                continue;
            }
            if let Some(transform) = self.physics.solver.body_transform(id) {
                let (_, rotation, position) = transform.to_scale_rotation_translation();
                self.set_component_world_transform(key, position, rotation);
            }
        }
    }

    fn on_pre_physics(&mut self, time_step: f32) {
        self.gameplay_time_micro = self.gameplay_time_micro_after_tick;

        // Insert pending bodies
        let pending = std::mem::take(&mut self.physics.pending_add);
        for key in pending {
            let world_transform = self.world_transform_matrix(key);

            let Some(component) = self.components.get_mut(key) else {
                continue;
            };
            if component.pending_kill {
                continue;
            }
            let Some(body) = component.scene.as_mut().and_then(|s| s.as_body_mut()) else {
                continue;
            };
            body.pending_add = false;
            if body.in_world || body.composition.is_empty() {
                continue;
            }
            if body.body_id == 0 {
                body.body_id = self.physics.alloc_body_id();
            }
            let id = body.body_id;
            let desc = SolverBodyDesc {
                id,
                shape: body.composition.clone(),
                transform: world_transform,
                mass: body.mass,
                friction: body.friction,
                restitution: body.restitution,
                trigger: body.trigger,
                group: clamp_unsigned_short(i64::from(body.collision_group)),
                mask: clamp_unsigned_short(i64::from(body.collision_mask)),
            };
            body.in_world = true;

            self.physics.solver.add_rigid_body(desc);
            self.physics.registered.push(key);
            self.physics.component_of_body.insert(id, key);
        }

        // Pre-physics actor ticks
        let snapshot: Vec<ActorKey> = self.actor_list.clone();
        for key in snapshot {
            let Some(actor) = self.actors.get(key) else {
                continue;
            };
            if actor.pending_kill {
                continue;
            }
            if actor
                .flags
                .contains(ActorFlags::CAN_EVER_TICK | ActorFlags::TICK_PRE_PHYSICS)
            {
                self.with_script(key, |script, ctx| script.tick_pre_physics(ctx, time_step));
            }
        }
    }

    fn on_post_physics(&mut self, time_step: f32) {
        self.dispatch_contact_and_overlap_events();

        let snapshot: Vec<ActorKey> = self.actor_list.clone();
        for key in snapshot {
            let Some(actor) = self.actors.get(key) else {
                continue;
            };
            if actor.pending_kill {
                continue;
            }
            if actor
                .flags
                .contains(ActorFlags::CAN_EVER_TICK | ActorFlags::TICK_POST_PHYSICS)
            {
                self.with_script(key, |script, ctx| script.tick_post_physics(ctx, time_step));
            }

            // Lifespan accounting happens at the post-physics stage
            let mut expired = false;
            if let Some(actor) = self.actors.get_mut(key) {
                actor.life_time += time_step;
                if actor.life_span > 0.0 {
                    actor.life_span -= time_step;
                    expired = actor.life_span < 0.0;
                }
            }
            if expired {
                self.destroy_actor(key);
            }
        }

        self.physics.fixed_tick_number += 1;

        if self.reset_gameplay_timer {
            self.reset_gameplay_timer = false;
            self.gameplay_time_micro_after_tick = 0;
        } else {
            self.gameplay_time_micro_after_tick +=
                (f64::from(time_step) * 1_000_000.0) as i64;
        }
    }

    fn log_physics_anomaly(&mut self, message: &str) {
        if !self.physics.anomaly_logged {
            self.physics.anomaly_logged = true;
            log::warn!("physics anomaly: {message}");
        }
    }

    // ========================================================================
    // Contact & overlap events
    // ========================================================================

    fn dispatch_contact_and_overlap_events(&mut self) {
        let parity = (self.physics.fixed_tick_number & 1) as usize;
        let prev = parity ^ 1;

        self.physics.contact_state.begin_tick(parity);

        // Fold live manifolds into the current contact set
        let manifolds: Vec<Manifold> = self.physics.solver.manifolds().to_vec();
        for manifold in manifolds {
            if manifold.points.is_empty() {
                continue;
            }
            let (Some(key_a), Some(key_b)) = (
                self.physics.component_of(manifold.body_a),
                self.physics.component_of(manifold.body_b),
            ) else {
                // Ghost object or stale user data
                self.log_physics_anomaly("manifold with unknown body");
                continue;
            };

            // Canonicalize by stable id so the pair hashes identically
            // across frames; point normals track the A side
            let mut manifold = manifold;
            let (id_a, id_b, key_a, key_b) = if manifold.body_a < manifold.body_b {
                for point in &mut manifold.points {
                    point.normal = -point.normal;
                }
                (manifold.body_b, manifold.body_a, key_b, key_a)
            } else {
                (manifold.body_a, manifold.body_b, key_a, key_b)
            };

            let (Some(comp_a), Some(comp_b)) =
                (self.components.get(key_a), self.components.get(key_b))
            else {
                continue;
            };
            let (actor_a, actor_b) = (comp_a.owner, comp_b.owner);
            let actors_alive = self
                .actors
                .get(actor_a)
                .is_some_and(|a| !a.pending_kill)
                && self.actors.get(actor_b).is_some_and(|a| !a.pending_kill);
            if !actors_alive || comp_a.pending_kill || comp_b.pending_kill {
                continue;
            }
            let (Some(body_a), Some(body_b)) = (
                comp_a.scene.as_ref().and_then(|s| s.as_body()),
                comp_b.scene.as_ref().and_then(|s| s.as_body()),
            ) else {
                self.log_physics_anomaly("manifold body without body payload");
                continue;
            };

            // Trigger pairs are overlaps; only the trigger side receives
            // overlap events
            let overlap = body_a.trigger || body_b.trigger;
            let a_wants = if overlap {
                body_a.trigger && body_a.dispatch_overlap_events
            } else {
                body_a.dispatch_contact_events
            };
            let b_wants = if overlap {
                body_b.trigger && body_b.dispatch_overlap_events
            } else {
                body_b.dispatch_contact_events
            };
            if !a_wants && !b_wants {
                continue;
            }

            let contact = CollisionContact {
                body_a: key_a,
                body_b: key_b,
                actor_a,
                actor_b,
                id_a,
                id_b,
                manifold,
                overlap,
                actor_a_wants_events: a_wants,
                actor_b_wants_events: b_wants,
                generate_points_a: body_a.generate_contact_points,
                generate_points_b: body_b.generate_contact_points,
            };
            if !self.physics.contact_state.insert(parity, contact) {
                self.log_physics_anomaly("duplicate contact pair");
            }
        }

        // Begins and updates over the current set
        let count = self.physics.contact_state.contacts[parity].len();
        for i in 0..count {
            let contact = self.physics.contact_state.contacts[parity][i].clone();
            let begin = !self.physics.contact_state.existed_in(prev, contact.key());

            if contact.overlap {
                if contact.actor_a_wants_events {
                    let event = OverlapEvent {
                        self_actor: contact.actor_a,
                        self_body: contact.body_a,
                        other_actor: contact.actor_b,
                        other_body: contact.body_b,
                    };
                    self.with_script(contact.actor_a, |script, ctx| {
                        if begin {
                            script.on_begin_overlap(ctx, &event);
                        } else {
                            script.on_update_overlap(ctx, &event);
                        }
                    });
                }
                if contact.actor_b_wants_events {
                    let event = OverlapEvent {
                        self_actor: contact.actor_b,
                        self_body: contact.body_b,
                        other_actor: contact.actor_a,
                        other_body: contact.body_a,
                    };
                    self.with_script(contact.actor_b, |script, ctx| {
                        if begin {
                            script.on_begin_overlap(ctx, &event);
                        } else {
                            script.on_update_overlap(ctx, &event);
                        }
                    });
                }
            } else {
                if contact.actor_a_wants_events {
                    let points = if contact.generate_points_a {
                        self.physics
                            .contact_state
                            .contact_points(parity, i as u32, 0)
                            .to_vec()
                    } else {
                        Vec::new()
                    };
                    let event = ContactEvent {
                        self_actor: contact.actor_a,
                        self_body: contact.body_a,
                        other_actor: contact.actor_b,
                        other_body: contact.body_b,
                        points,
                    };
                    self.with_script(contact.actor_a, |script, ctx| {
                        if begin {
                            script.on_begin_contact(ctx, &event);
                        } else {
                            script.on_update_contact(ctx, &event);
                        }
                    });
                }
                if contact.actor_b_wants_events {
                    let points = if contact.generate_points_b {
                        self.physics
                            .contact_state
                            .contact_points(parity, i as u32, 1)
                            .to_vec()
                    } else {
                        Vec::new()
                    };
                    let event = ContactEvent {
                        self_actor: contact.actor_b,
                        self_body: contact.body_b,
                        other_actor: contact.actor_a,
                        other_body: contact.body_a,
                        points,
                    };
                    self.with_script(contact.actor_b, |script, ctx| {
                        if begin {
                            script.on_begin_contact(ctx, &event);
                        } else {
                            script.on_update_contact(ctx, &event);
                        }
                    });
                }
            }
        }

        // Ends: previous-set pairs missing from the current set
        let prev_contacts: Vec<CollisionContact> =
            self.physics.contact_state.contacts[prev].clone();
        for contact in prev_contacts {
            if self
                .physics
                .contact_state
                .existed_in(parity, contact.key())
            {
                continue;
            }

            if contact.overlap {
                if contact.actor_a_wants_events {
                    let event = OverlapEvent {
                        self_actor: contact.actor_a,
                        self_body: contact.body_a,
                        other_actor: contact.actor_b,
                        other_body: contact.body_b,
                    };
                    self.with_script(contact.actor_a, |script, ctx| {
                        script.on_end_overlap(ctx, &event);
                    });
                }
                if contact.actor_b_wants_events {
                    let event = OverlapEvent {
                        self_actor: contact.actor_b,
                        self_body: contact.body_b,
                        other_actor: contact.actor_a,
                        other_body: contact.body_a,
                    };
                    self.with_script(contact.actor_b, |script, ctx| {
                        script.on_end_overlap(ctx, &event);
                    });
                }
            } else {
                // End events carry no contact points
                if contact.actor_a_wants_events {
                    let event = ContactEvent {
                        self_actor: contact.actor_a,
                        self_body: contact.body_a,
                        other_actor: contact.actor_b,
                        other_body: contact.body_b,
                        points: Vec::new(),
                    };
                    self.with_script(contact.actor_a, |script, ctx| {
                        script.on_end_contact(ctx, &event);
                    });
                }
                if contact.actor_b_wants_events {
                    let event = ContactEvent {
                        self_actor: contact.actor_b,
                        self_body: contact.body_b,
                        other_actor: contact.actor_a,
                        other_body: contact.body_a,
                        points: Vec::new(),
                    };
                    self.with_script(contact.actor_b, |script, ctx| {
                        script.on_end_contact(ctx, &event);
                    });
                }
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Bodies overlapping a sphere.
    pub fn query_bodies_sphere(
        &self,
        results: &mut Vec<ComponentKey>,
        position: Vec3,
        radius: f32,
        filter: &CollisionQueryFilter,
    ) {
        let shape = crate::physics::CollisionComposition::single(CollisionShape::Sphere { radius });
        self.physics
            .query_bodies(results, &shape, Affine3A::from_translation(position), filter);
    }

    /// Bodies overlapping a box.
    pub fn query_bodies_box(
        &self,
        results: &mut Vec<ComponentKey>,
        position: Vec3,
        half_extents: Vec3,
        filter: &CollisionQueryFilter,
    ) {
        let shape =
            crate::physics::CollisionComposition::single(CollisionShape::Box { half_extents });
        self.physics
            .query_bodies(results, &shape, Affine3A::from_translation(position), filter);
    }

    /// Bodies overlapping an AABB.
    pub fn query_bodies_aabb(
        &self,
        results: &mut Vec<ComponentKey>,
        bounds: &crate::spatial::BoundingBox,
        filter: &CollisionQueryFilter,
    ) {
        self.query_bodies_box(results, bounds.center(), bounds.half_extents(), filter);
    }

    /// Actors owning bodies that overlap an AABB.
    pub fn query_actors_aabb(
        &self,
        results: &mut Vec<ActorKey>,
        bounds: &crate::spatial::BoundingBox,
        filter: &CollisionQueryFilter,
    ) {
        let mut bodies = Vec::new();
        self.query_bodies_aabb(&mut bodies, bounds, filter);
        self.collect_owning_actors(&bodies, results);
    }

    /// Actors owning bodies that overlap a sphere, deduplicated and with
    /// pending-kill actors skipped.
    pub fn query_actors_sphere(
        &self,
        results: &mut Vec<ActorKey>,
        position: Vec3,
        radius: f32,
        filter: &CollisionQueryFilter,
    ) {
        let mut bodies = Vec::new();
        self.query_bodies_sphere(&mut bodies, position, radius, filter);
        self.collect_owning_actors(&bodies, results);
    }

    /// Actors owning bodies that overlap a box.
    pub fn query_actors_box(
        &self,
        results: &mut Vec<ActorKey>,
        position: Vec3,
        half_extents: Vec3,
        filter: &CollisionQueryFilter,
    ) {
        let mut bodies = Vec::new();
        self.query_bodies_box(&mut bodies, position, half_extents, filter);
        self.collect_owning_actors(&bodies, results);
    }

    fn collect_owning_actors(&self, bodies: &[ComponentKey], results: &mut Vec<ActorKey>) {
        for &body in bodies {
            let Some(component) = self.components.get(body) else {
                continue;
            };
            let owner = component.owner;
            if self.actors.get(owner).is_some_and(|a| !a.pending_kill)
                && !results.contains(&owner)
            {
                results.push(owner);
            }
        }
    }

    /// Applies `amount` of damage to every actor with a body in the radius.
    pub fn apply_radial_damage(
        &mut self,
        amount: f32,
        position: Vec3,
        radius: f32,
        filter: &CollisionQueryFilter,
    ) {
        let mut damaged = Vec::new();
        self.query_actors_sphere(&mut damaged, position, radius, filter);
        for actor in damaged {
            self.with_script(actor, |script, ctx| {
                script.apply_damage(ctx, amount, position);
            });
        }
    }
}
