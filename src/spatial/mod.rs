//! Spatial Primitives
//!
//! Math and acceleration structures shared by gameplay queries, physics and
//! the visibility frontend:
//!
//! - [`BoundingBox`] / [`BoundingSphere`] - axis-aligned bounds
//! - [`Plane`] - plane with a cached axial type for fast BSP classification
//! - [`Frustum`] - plane set with box/sphere tests and portal clipping
//! - [`ConvexHull`] - convex winding used by area portals
//! - [`Mesh`] / [`MeshSubpart`] - indexed triangle mesh with subparts
//! - [`AabbTree`] - per-subpart SAH tree for raycasts
//! - [`BspData`] - binary space partition with a PVS for brush models
//!
//! Everything here is plain data plus free functions; nothing in this module
//! touches the scene graph or the world.

pub mod aabb;
pub mod aabb_tree;
pub mod bsp;
pub mod frustum;
pub mod hull;
pub mod intersect;
pub mod mesh;
pub mod plane;

pub use aabb::{BoundingBox, BoundingSphere};
pub use aabb_tree::{AabbTree, AabbTreeNode};
pub use bsp::{BspData, BspLeaf, BspNode, PvsRow, SurfaceDef};
pub use frustum::Frustum;
pub use hull::ConvexHull;
pub use intersect::{ray_intersect_box, ray_intersect_triangle};
pub use mesh::{Mesh, MeshSubpart, MeshVertex, TriangleHitResult, VertexWeight};
pub use plane::{Plane, PlaneSide};
