//! Scene component tree operations on the world.
//!
//! Attachment, detachment, dirty-transform propagation and lazy world-matrix
//! reads live here because they touch several components at once. Mutating
//! setters only stamp dirty flags; matrices are recomposed on read and the
//! drawable/light bounds of moved components are refreshed once per frame by
//! [`World::update_drawable_areas`].

use glam::{Affine3A, Quat, Vec3};

use crate::errors::{Result, SagaError};
use crate::scene::component::{ActorComponent, SceneComponent, SceneKind};
use crate::scene::{ActorKey, ComponentKey};
use crate::world::World;

impl World {
    // ========================================================================
    // Component creation
    // ========================================================================

    /// Creates a component on an actor. The first spatial component becomes
    /// the actor's root.
    pub fn create_component(
        &mut self,
        actor_key: ActorKey,
        name: &str,
        scene: Option<SceneComponent>,
    ) -> Result<ComponentKey> {
        let actor = self.actors.get(actor_key).ok_or(SagaError::StaleActor)?;
        if actor.pending_kill {
            return Err(SagaError::StaleActor);
        }

        let spatial = scene.is_some();
        let key = self.components.insert(ActorComponent::new(name, actor_key, scene));

        let actor = self.actors.get_mut(actor_key).expect("checked above");
        self.components[key].index_in_actor = actor.components.len();
        actor.components.push(key);
        if spatial && actor.root_component.is_none() {
            actor.root_component = Some(key);
        }

        self.queue_bounds_update(key);
        Ok(key)
    }

    /// Convenience wrapper building the spatial payload from a kind.
    pub fn create_scene_component(
        &mut self,
        actor: ActorKey,
        name: &str,
        kind: SceneKind,
    ) -> Result<ComponentKey> {
        self.create_component(actor, name, Some(SceneComponent::new(kind)))
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Attaches `child` under `parent`, optionally to a named socket.
    ///
    /// Fails (leaving the child at its previous parent) on self/ancestor
    /// cycles, and on socket attaches where the parent is not skinned or
    /// the socket name does not resolve. With `keep_world_transform` the
    /// child's world transform is preserved by recomputing its local
    /// transform against the new parent.
    pub fn attach_component(
        &mut self,
        child: ComponentKey,
        parent: ComponentKey,
        socket: Option<&str>,
        keep_world_transform: bool,
    ) -> Result<()> {
        if self.physics.is_during_physics_update() {
            log::warn!("attach_component: rejected during physics update");
            return Err(SagaError::DuringPhysicsUpdate);
        }
        if child == parent {
            log::warn!("attach_component: cannot attach component to itself");
            return Err(SagaError::AttachCycle);
        }
        if self.scene_of(child).is_none() || self.scene_of(parent).is_none() {
            return Err(SagaError::StaleComponent);
        }

        // Ancestor cycle check: walking up from the parent must not reach
        // the child
        let mut cursor = Some(parent);
        while let Some(key) = cursor {
            if key == child {
                log::warn!("attach_component: attach would create a cycle");
                return Err(SagaError::AttachCycle);
            }
            cursor = self.scene_of(key).and_then(SceneComponent::parent);
        }

        // Resolve the socket before any unlinking so a failed socket attach
        // leaves the child where it was
        let socket_index = match socket {
            None => -1,
            Some(name) => {
                let parent_scene = self.scene_of(parent).expect("checked above");
                if !parent_scene.is_skinned() {
                    log::warn!("attach_component: socket attach to non-skinned parent");
                    return Err(SagaError::SocketAttachFailed(format!(
                        "parent is not a skinned component (socket {name:?})"
                    )));
                }
                let index = parent_scene.find_socket(name);
                if index < 0 {
                    log::warn!("attach_component: unknown socket {name:?}");
                    return Err(SagaError::SocketAttachFailed(format!(
                        "unknown socket {name:?}"
                    )));
                }
                index
            }
        };

        let world_snapshot = keep_world_transform.then(|| self.world_transform_matrix(child));

        self.unlink_from_parent(child);

        self.scene_of_mut(parent)
            .expect("checked above")
            .children
            .push(child);
        {
            let child_scene = self.scene_of_mut(child).expect("checked above");
            child_scene.parent = Some(parent);
            child_scene.socket_index = socket_index;
        }

        if let Some(world) = world_snapshot {
            let attach_matrix = self.parent_attach_matrix(child);
            let local = attach_matrix.inverse() * world;
            self.scene_of_mut(child)
                .expect("checked above")
                .transform
                .apply_local_matrix(local);
        }

        self.mark_transform_dirty(child);
        Ok(())
    }

    /// Detaches `child` from its parent, optionally preserving its world
    /// transform.
    pub fn detach_component(&mut self, child: ComponentKey, keep_world_transform: bool) -> Result<()> {
        if self.physics.is_during_physics_update() {
            return Err(SagaError::DuringPhysicsUpdate);
        }
        let Some(scene) = self.scene_of(child) else {
            return Err(SagaError::StaleComponent);
        };
        if scene.parent.is_none() {
            return Ok(());
        }

        let world_snapshot = keep_world_transform.then(|| self.world_transform_matrix(child));

        self.unlink_from_parent(child);
        {
            let scene = self.scene_of_mut(child).expect("checked above");
            scene.parent = None;
            scene.socket_index = -1;
        }
        if let Some(world) = world_snapshot {
            self.scene_of_mut(child)
                .expect("checked above")
                .transform
                .apply_local_matrix(world);
        }
        self.mark_transform_dirty(child);
        Ok(())
    }

    fn unlink_from_parent(&mut self, child: ComponentKey) {
        let parent = self.scene_of(child).and_then(SceneComponent::parent);
        if let Some(parent_key) = parent {
            if let Some(parent_scene) = self.scene_of_mut(parent_key) {
                parent_scene.children.retain(|c| *c != child);
            }
        }
    }

    /// Unlinks a dying component from the tree: removed from its parent,
    /// its children become detached roots.
    pub(crate) fn unlink_scene_component(&mut self, key: ComponentKey) {
        let Some(scene) = self.scene_of(key) else {
            return;
        };
        let children: Vec<ComponentKey> = scene.children.to_vec();
        self.unlink_from_parent(key);
        for child in children {
            if let Some(child_scene) = self.scene_of_mut(child) {
                child_scene.parent = None;
                child_scene.socket_index = -1;
            }
            self.mark_transform_dirty(child);
        }
        if let Some(scene) = self.scene_of_mut(key) {
            scene.parent = None;
            scene.children.clear();
        }
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    #[inline]
    pub(crate) fn scene_of(&self, key: ComponentKey) -> Option<&SceneComponent> {
        self.components.get(key)?.scene.as_ref()
    }

    #[inline]
    pub(crate) fn scene_of_mut(&mut self, key: ComponentKey) -> Option<&mut SceneComponent> {
        self.components.get_mut(key)?.scene.as_mut()
    }

    /// Sets the local TRS of a component and dirties its subtree.
    pub fn set_component_transform(
        &mut self,
        key: ComponentKey,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) {
        if let Some(scene) = self.scene_of_mut(key) {
            scene.transform.set_transform(position, rotation, scale);
            self.mark_transform_dirty(key);
        }
    }

    pub fn set_component_position(&mut self, key: ComponentKey, position: Vec3) {
        if let Some(scene) = self.scene_of_mut(key) {
            scene.transform.set_position(position);
            self.mark_transform_dirty(key);
        }
    }

    pub fn set_component_rotation(&mut self, key: ComponentKey, rotation: Quat) {
        if let Some(scene) = self.scene_of_mut(key) {
            scene.transform.set_rotation(rotation);
            self.mark_transform_dirty(key);
        }
    }

    pub fn set_component_scale(&mut self, key: ComponentKey, scale: Vec3) {
        if let Some(scene) = self.scene_of_mut(key) {
            scene.transform.set_scale(scale);
            self.mark_transform_dirty(key);
        }
    }

    /// Sets a component's world transform by recomputing its local against
    /// the current parent.
    pub fn set_component_world_transform(
        &mut self,
        key: ComponentKey,
        position: Vec3,
        rotation: Quat,
    ) {
        let attach = self.parent_attach_matrix(key);
        let world = Affine3A::from_rotation_translation(rotation, position);
        let local = attach.inverse() * world;
        if let Some(scene) = self.scene_of_mut(key) {
            scene.transform.apply_local_matrix(local);
            self.mark_transform_dirty(key);
        }
    }

    /// Marks the component and all descendants transform-dirty and queues
    /// bounds refreshes; nothing is recomputed here.
    pub fn mark_transform_dirty(&mut self, key: ComponentKey) {
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(scene) = self.scene_of(current) else {
                continue;
            };
            scene.transform.mark_dirty();
            stack.extend(scene.children.iter().copied());
            self.queue_bounds_update(current);
        }
    }

    /// Matrix the component's local transform composes against: the parent
    /// world matrix, times the socket pose when attached to one.
    fn parent_attach_matrix(&self, key: ComponentKey) -> Affine3A {
        let Some(scene) = self.scene_of(key) else {
            return Affine3A::IDENTITY;
        };
        let Some(parent) = scene.parent else {
            return Affine3A::IDENTITY;
        };
        let parent_world = self.world_transform_matrix(parent);
        if scene.socket_index >= 0 {
            parent_world * self.socket_local_matrix(parent, scene.socket_index as usize)
        } else {
            parent_world
        }
    }

    /// Pose matrix of a socket in the skinned parent's object space.
    fn socket_local_matrix(&self, parent: ComponentKey, socket_index: usize) -> Affine3A {
        let Some(scene) = self.scene_of(parent) else {
            return Affine3A::IDENTITY;
        };
        let Some(socket) = scene.sockets.get(socket_index) else {
            return Affine3A::IDENTITY;
        };
        if let SceneKind::Drawable(drawable) = &scene.kind {
            if let crate::scene::drawable::DrawableKind::SkinnedMesh { joint_poses } =
                &drawable.kind
            {
                return joint_poses
                    .get(socket.joint as usize)
                    .copied()
                    .unwrap_or(Affine3A::IDENTITY);
            }
        }
        Affine3A::IDENTITY
    }

    /// World transform of a component, recomputed lazily when dirty.
    /// Reads are idempotent: a second call returns the cached matrix.
    #[must_use]
    pub fn world_transform_matrix(&self, key: ComponentKey) -> Affine3A {
        let Some(scene) = self.scene_of(key) else {
            return Affine3A::IDENTITY;
        };
        if !scene.transform.is_dirty() {
            return scene.transform.cached_world_matrix();
        }
        let attach = self.parent_attach_matrix(key);
        let world = scene.transform.compose_world(&attach);
        scene.transform.store_world_matrix(world);
        world
    }

    /// World position of a component's origin.
    #[must_use]
    pub fn component_world_position(&self, key: ComponentKey) -> Vec3 {
        self.world_transform_matrix(key).translation.into()
    }

    // ========================================================================
    // Bounds & area maintenance
    // ========================================================================

    pub(crate) fn queue_bounds_update(&mut self, key: ComponentKey) {
        let Some(scene) = self.scene_of_mut(key) else {
            return;
        };
        let wants = matches!(
            scene.kind,
            SceneKind::Drawable(_) | SceneKind::Light(_) | SceneKind::IblProbe(_)
        );
        if wants && !scene.bounds_update_queued {
            scene.bounds_update_queued = true;
            self.bounds_update_queue.push(key);
        }
    }

    /// Drains the bounds-update queue: recomputes world bounds and OBB
    /// inverses and relinks drawables into the visibility areas overlapping
    /// their new bounds.
    pub(crate) fn update_drawable_areas(&mut self) {
        let queue = std::mem::take(&mut self.bounds_update_queue);
        for key in queue {
            let Some(component) = self.components.get(key) else {
                continue;
            };
            let owner = component.owner;
            if component.pending_kill {
                continue;
            }

            let world_matrix = self.world_transform_matrix(key);
            let level_key = match self.actors.get(owner) {
                Some(actor) => actor.level,
                None => continue,
            };

            // Refresh bounds first; area relinking follows with the
            // component borrow released
            let (new_bounds, old_links) = {
                let Some(scene) = self.components.get_mut(key).and_then(|c| c.scene.as_mut())
                else {
                    continue;
                };
                scene.bounds_update_queued = false;
                match &mut scene.kind {
                    SceneKind::Drawable(drawable) => {
                        drawable.update_world_bounds(&world_matrix);
                        (
                            Some(drawable.world_bounds),
                            std::mem::take(&mut drawable.area_links),
                        )
                    }
                    SceneKind::Light(light) => {
                        light.update_world_bounds(&world_matrix);
                        continue;
                    }
                    SceneKind::IblProbe(probe) => {
                        probe.update_world_bounds(&world_matrix);
                        continue;
                    }
                    _ => continue,
                }
            };

            let Some(bounds) = new_bounds else {
                continue;
            };
            for (level, area) in &old_links {
                if let Some(level) = self.levels.get_mut(*level) {
                    level.unlink_drawable(key, &[*area]);
                }
            }
            let mut new_links = smallvec::SmallVec::new();
            if let Some(level) = self.levels.get_mut(level_key) {
                for area in level.link_drawable(key, &bounds) {
                    new_links.push((level_key, area));
                }
            }
            if let Some(drawable) = self
                .components
                .get_mut(key)
                .and_then(|c| c.scene.as_mut())
                .and_then(|s| s.as_drawable_mut())
            {
                drawable.area_links = new_links;
            }
        }
    }

    /// Removes a dying drawable from every area list holding it.
    pub(crate) fn unlink_drawable_areas(&mut self, key: ComponentKey) {
        let Some(drawable) = self
            .components
            .get_mut(key)
            .and_then(|c| c.scene.as_mut())
            .and_then(|s| s.as_drawable_mut())
        else {
            return;
        };
        let links = std::mem::take(&mut drawable.area_links);
        for (level, area) in links {
            if let Some(level) = self.levels.get_mut(level) {
                level.unlink_drawable(key, &[area]);
            }
        }
    }
}
