use glam::{Affine3A, Vec3};

use crate::spatial::{BoundingBox, Plane};

/// The closed set of collision shapes a physical body can be composed of.
#[derive(Debug, Clone)]
pub enum CollisionShape {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
    },
    /// Capsule along the local Y axis; `height` is the cylinder part.
    Capsule {
        radius: f32,
        height: f32,
    },
    /// Cylinder along the local Y axis.
    Cylinder {
        half_extents: Vec3,
    },
    /// Infinite static plane.
    Plane {
        plane: Plane,
    },
    ConvexHull {
        vertices: Vec<Vec3>,
    },
    /// Static concave triangle soup (level geometry).
    TriangleSoup {
        vertices: Vec<Vec3>,
        indices: Vec<u32>,
    },
}

impl CollisionShape {
    /// Local-space bounds; planes report an infinite slab.
    #[must_use]
    pub fn local_bounds(&self) -> BoundingBox {
        match self {
            Self::Sphere { radius } => {
                BoundingBox::from_center_half_extents(Vec3::ZERO, Vec3::splat(*radius))
            }
            Self::Box { half_extents } | Self::Cylinder { half_extents } => {
                BoundingBox::from_center_half_extents(Vec3::ZERO, *half_extents)
            }
            Self::Capsule { radius, height } => BoundingBox::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(*radius, height * 0.5 + radius, *radius),
            ),
            Self::Plane { .. } => BoundingBox::new(
                Vec3::splat(f32::NEG_INFINITY),
                Vec3::splat(f32::INFINITY),
            ),
            Self::ConvexHull { vertices } | Self::TriangleSoup { vertices, .. } => {
                let mut b = BoundingBox::EMPTY;
                for &v in vertices {
                    b.add_point(v);
                }
                b
            }
        }
    }

    /// True for shapes that can only be static.
    #[must_use]
    pub fn is_static_only(&self) -> bool {
        matches!(self, Self::Plane { .. } | Self::TriangleSoup { .. })
    }
}

/// One shape of a compound body with its local placement.
#[derive(Debug, Clone)]
pub struct ShapeInstance {
    pub shape: CollisionShape,
    pub local_transform: Affine3A,
    /// Collision margin added around the shape.
    pub margin: f32,
}

impl ShapeInstance {
    #[must_use]
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            shape,
            local_transform: Affine3A::IDENTITY,
            margin: 0.01,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, local_transform: Affine3A) -> Self {
        self.local_transform = local_transform;
        self
    }
}

/// Compound collision shape of one body.
#[derive(Debug, Clone, Default)]
pub struct CollisionComposition {
    pub shapes: Vec<ShapeInstance>,
}

impl CollisionComposition {
    #[must_use]
    pub fn single(shape: CollisionShape) -> Self {
        Self {
            shapes: vec![ShapeInstance::new(shape)],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[must_use]
    pub fn is_static_only(&self) -> bool {
        self.shapes.iter().any(|s| s.shape.is_static_only())
    }

    /// Conservative bounds of the composition under `world`.
    #[must_use]
    pub fn world_bounds(&self, world: &Affine3A) -> BoundingBox {
        let mut bounds = BoundingBox::EMPTY;
        for instance in &self.shapes {
            let local = instance.shape.local_bounds();
            if local.min.x.is_infinite() {
                return local;
            }
            let placed = local
                .inflate(instance.margin)
                .transform(&(*world * instance.local_transform));
            bounds.add_aabb(&placed);
        }
        bounds
    }
}
