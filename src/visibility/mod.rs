//! Visibility & Culling
//!
//! Per view, the render frontend issues a single visibility query against a
//! world: a BSP/PVS walk for brush surfaces, a portal flood across areas
//! with per-portal frustum clipping, and frustum culling of the movables in
//! every reached area. Shadow casters are queried independently per cascade
//! and accumulate cascade bitmasks; visible lights and probes are assigned
//! to a fixed view-space cluster grid.

pub mod cluster;
pub mod query;
pub mod shadow;

pub use cluster::{
    ClusterHeader, ClusterItem, LightVoxelizer, MAX_CLUSTER_ITEMS, MAX_FRUSTUM_CLUSTERS_X,
    MAX_FRUSTUM_CLUSTERS_Y, MAX_FRUSTUM_CLUSTERS_Z,
};
pub use query::{QueryMask, SurfaceRef, VisibilityQuery, VisibilityResult};
pub use shadow::{create_directional_light_cascades, CascadeSet, MAX_SHADOW_CASCADES};
