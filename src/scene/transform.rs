use std::cell::Cell;

use bitflags::bitflags;
use glam::{Affine3A, Quat, Vec3};

bitflags! {
    /// Channels of the parent transform a scene component ignores when its
    /// world matrix is recomposed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct TransformFlags: u32 {
        const ABSOLUTE_POSITION = 1 << 0;
        const ABSOLUTE_ROTATION = 1 << 1;
        const ABSOLUTE_SCALE    = 1 << 2;
    }
}

/// Local TRS of a scene component with a lazily cached world matrix.
///
/// Setters only mark the transform dirty; the world matrix is recomputed on
/// the next read by composing the parent world matrix (or socket matrix)
/// with the local matrix. Dirty propagation to descendants is driven by the
/// world, which owns the tree.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    pub flags: TransformFlags,

    // Cached world matrix; interior mutability mirrors lazy
    // recompute-on-read (reads are idempotent)
    world_matrix: Cell<Affine3A>,
    dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            flags: TransformFlags::empty(),
            world_matrix: Cell::new(Affine3A::IDENTITY),
            dirty: Cell::new(true),
        }
    }

    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        let mut t = Self::new();
        t.position = position;
        t.rotation = rotation;
        t
    }

    // ========================================================================
    // Local accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Sets the local position and marks the node dirty. The caller is
    /// responsible for propagating the flag to descendants.
    #[inline]
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty.set(true);
    }

    #[inline]
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty.set(true);
    }

    #[inline]
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty.set(true);
    }

    #[inline]
    pub fn set_transform(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
        self.dirty.set(true);
    }

    /// Overwrites local TRS from a decomposed matrix.
    pub fn apply_local_matrix(&mut self, matrix: Affine3A) {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        self.set_transform(position, rotation, scale);
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    // ========================================================================
    // Cached world matrix
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Reads the cached world matrix without recomputing. Only valid right
    /// after a world-matrix read cleared the dirty flag.
    #[inline]
    #[must_use]
    pub fn cached_world_matrix(&self) -> Affine3A {
        self.world_matrix.get()
    }

    /// Stores a freshly composed world matrix and clears the dirty flag.
    #[inline]
    pub fn store_world_matrix(&self, matrix: Affine3A) {
        self.world_matrix.set(matrix);
        self.dirty.set(false);
    }

    /// Composes this node's world matrix from the parent's, honoring the
    /// absolute-channel flags.
    #[must_use]
    pub fn compose_world(&self, parent_world: &Affine3A) -> Affine3A {
        if self.flags.is_empty() {
            return *parent_world * self.local_matrix();
        }

        let (mut s, mut r, mut t) = parent_world.to_scale_rotation_translation();
        if self.flags.contains(TransformFlags::ABSOLUTE_POSITION) {
            t = Vec3::ZERO;
        }
        if self.flags.contains(TransformFlags::ABSOLUTE_ROTATION) {
            r = Quat::IDENTITY;
        }
        if self.flags.contains(TransformFlags::ABSOLUTE_SCALE) {
            s = Vec3::ONE;
        }
        Affine3A::from_scale_rotation_translation(s, r, t) * self.local_matrix()
    }
}
