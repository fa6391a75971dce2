//! Binary space partition with a potentially visible set, used by brush
//! models for indoor visibility.
//!
//! Leaves carry a cluster id and an offset into the visdata block; the PVS
//! row for a cluster is optionally run-length compressed (a zero byte
//! followed by a zero-run count). Rows are always decoded into a fresh
//! [`PvsRow`] owned by the query, so nested queries never alias.
//!
//! A query runs in two phases: [`BspData::mark_leafs`] stamps every leaf in
//! the view cluster's PVS (and its ancestor nodes) with a fresh visit
//! counter, then the frustum walk descends only into stamped nodes, passing
//! a shrinking cull-bit mask downward.

use glam::Vec3;

use crate::spatial::frustum::Frustum;
use crate::spatial::plane::Plane;
use crate::spatial::BoundingBox;

/// Decoded PVS bitmap for one cluster.
#[derive(Debug, Clone, Default)]
pub struct PvsRow {
    bits: Vec<u8>,
    /// Set when the source had no visdata: every cluster is visible.
    all_visible: bool,
}

impl PvsRow {
    #[inline]
    #[must_use]
    pub fn is_visible(&self, cluster: i32) -> bool {
        if cluster < 0 {
            return false;
        }
        if self.all_visible {
            return true;
        }
        let byte = (cluster >> 3) as usize;
        self.bits
            .get(byte)
            .is_some_and(|b| b & (1 << (cluster & 7)) != 0)
    }

    /// Marks every cluster visible; used when a leaf has no visdata.
    fn fill_all(&mut self) {
        self.bits.clear();
        self.all_visible = true;
    }
}

/// Interior node: a splitting plane and two children. A non-negative child
/// is a node index; a negative child encodes leaf `-(child + 1)`.
#[derive(Debug, Clone)]
pub struct BspNode {
    pub plane: u32,
    pub children: [i32; 2],
    pub bounds: BoundingBox,
    pub parent: i32,
    vis_frame: i32,
}

impl BspNode {
    #[must_use]
    pub fn new(plane: u32, children: [i32; 2], bounds: BoundingBox) -> Self {
        Self {
            plane,
            children,
            bounds,
            parent: -1,
            vis_frame: -1,
        }
    }
}

/// Leaf contents classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeafContents {
    #[default]
    Normal,
    Invisible,
}

/// BSP leaf with its PVS cluster and surface range.
#[derive(Debug, Clone)]
pub struct BspLeaf {
    pub bounds: BoundingBox,
    /// Cluster id; `-1` for leaves outside the PVS (always invisible).
    pub cluster: i32,
    /// Byte offset of this leaf's cluster row inside the visdata block.
    pub visdata_offset: usize,
    pub first_mark_surface: u32,
    pub num_mark_surfaces: u32,
    pub contents: LeafContents,
    pub parent: i32,
    vis_frame: i32,
}

impl BspLeaf {
    #[must_use]
    pub fn new(bounds: BoundingBox, cluster: i32, visdata_offset: usize) -> Self {
        Self {
            bounds,
            cluster,
            visdata_offset,
            first_mark_surface: 0,
            num_mark_surfaces: 0,
            contents: LeafContents::Normal,
            parent: -1,
            vis_frame: -1,
        }
    }
}

/// Surface geometry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceType {
    #[default]
    Planar,
    TriangleSoup,
}

/// A brush face: a range of the level's shared vertex/index buffers plus the
/// keys the frontend merges draws by.
#[derive(Debug, Clone, Default)]
pub struct SurfaceDef {
    pub bounds: BoundingBox,
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,
    pub surface_type: SurfaceType,
    pub plane: Option<Plane>,
    pub material: u16,
    pub lightmap_block: u16,
    /// Vis marker stamped by queries to deduplicate emission across leaves.
    pub marker: i32,
}

impl SurfaceDef {
    /// Packed sort key: model, lightmap block, material, first vertex.
    /// Runs with an identical `(model, lightmap_block, material)` prefix can
    /// be merged into a single draw.
    #[inline]
    #[must_use]
    pub fn sort_key(&self, model: u16) -> u64 {
        (u64::from(model) << 48)
            | (u64::from(self.lightmap_block) << 32)
            | (u64::from(self.material) << 16)
            | u64::from(self.first_vertex & 0xffff)
    }

    /// The merge prefix of [`SurfaceDef::sort_key`].
    #[inline]
    #[must_use]
    pub fn merge_key(&self, model: u16) -> u64 {
        self.sort_key(model) & !0xffff
    }
}

/// BSP and PVS data of one brush model.
#[derive(Debug, Clone, Default)]
pub struct BspData {
    pub planes: Vec<Plane>,
    pub nodes: Vec<BspNode>,
    pub leafs: Vec<BspLeaf>,
    /// Per-cluster visibility bitmaps, optionally RLE compressed.
    pub visdata: Option<Vec<u8>>,
    pub compressed_visdata: bool,
    pub num_vis_clusters: usize,
    pub surfaces: Vec<SurfaceDef>,
    /// Leaf -> surface indirection.
    pub mark_surfaces: Vec<u32>,

    visit_count: i32,
}

impl BspData {
    /// Bytes per decoded PVS row.
    #[inline]
    #[must_use]
    pub fn row_size(&self) -> usize {
        self.num_vis_clusters.div_ceil(8)
    }

    /// Links leaf/node parent indices; call once after building the arrays.
    pub fn link_parents(&mut self) {
        // Collect first to keep the borrow checker happy with the two arrays
        let links: Vec<(i32, [i32; 2])> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (i as i32, n.children))
            .collect();
        for (parent, children) in links {
            for child in children {
                if child < 0 {
                    self.leafs[(-child - 1) as usize].parent = parent;
                } else {
                    self.nodes[child as usize].parent = parent;
                }
            }
        }
    }

    /// Descends from the root to the leaf containing `position`.
    /// Returns `None` when the tree is empty.
    #[must_use]
    pub fn find_leaf(&self, position: Vec3) -> Option<usize> {
        if self.nodes.is_empty() {
            return if self.leafs.is_empty() { None } else { Some(0) };
        }

        let mut index: i32 = 0;
        loop {
            let node = &self.nodes[index as usize];
            let plane = &self.planes[node.plane as usize];
            let child = if plane.distance(position) > 0.0 {
                node.children[0]
            } else {
                node.children[1]
            };
            if child < 0 {
                return Some((-child - 1) as usize);
            }
            index = child;
        }
    }

    /// Decodes the PVS row for `leaf` into `row`. A leaf without visdata or
    /// without a cluster sees everything.
    pub fn leaf_pvs(&self, leaf: usize, row: &mut PvsRow) {
        let row_size = self.row_size();
        let leaf = &self.leafs[leaf];

        let Some(visdata) = &self.visdata else {
            row.fill_all();
            return;
        };
        if leaf.cluster < 0 {
            row.fill_all();
            return;
        }

        row.all_visible = false;
        row.bits.clear();
        if self.compressed_visdata {
            // Zero byte + run length of zero bytes
            let mut offset = leaf.visdata_offset;
            while row.bits.len() < row_size && offset < visdata.len() {
                let byte = visdata[offset];
                offset += 1;
                if byte == 0 {
                    let run = visdata.get(offset).copied().unwrap_or(1).max(1) as usize;
                    offset += 1;
                    for _ in 0..run.min(row_size - row.bits.len()) {
                        row.bits.push(0);
                    }
                } else {
                    row.bits.push(byte);
                }
            }
            row.bits.resize(row_size, 0);
        } else {
            let end = (leaf.visdata_offset + row_size).min(visdata.len());
            row.bits.extend_from_slice(&visdata[leaf.visdata_offset..end]);
            row.bits.resize(row_size, 0);
        }
    }

    /// Stamps every leaf whose cluster is visible from `view_leaf` (and the
    /// ancestor chain of each) with a fresh visit counter, and returns that
    /// counter. Subsequent frustum walks only descend into stamped nodes.
    pub fn mark_leafs(&mut self, view_leaf: usize) -> i32 {
        self.visit_count += 1;

        let mut row = PvsRow::default();
        self.leaf_pvs(view_leaf, &mut row);

        let vis = self.visit_count;
        for i in 0..self.leafs.len() {
            if !row.is_visible(self.leafs[i].cluster) {
                continue;
            }
            self.leafs[i].vis_frame = vis;

            // Propagate up so the walk can reach this leaf
            let mut parent = self.leafs[i].parent;
            while parent >= 0 {
                let node = &mut self.nodes[parent as usize];
                if node.vis_frame == vis {
                    break;
                }
                node.vis_frame = vis;
                parent = node.parent;
            }
        }
        vis
    }

    /// Top-down frustum walk over the stamped tree, appending the surface
    /// indices of every visible leaf to `out` (deduplicated by a per-surface
    /// marker). A plane the current bounds lie fully inside is elided from
    /// the cull-bit mask passed to children.
    pub fn collect_visible_surfaces(&mut self, frustum: &Frustum, out: &mut Vec<u32>) {
        let vis = self.visit_count;

        if self.nodes.is_empty() {
            for i in 0..self.leafs.len() {
                if self.leafs[i].vis_frame == vis {
                    self.emit_leaf_surfaces(i, frustum, frustum.all_plane_bits(), out);
                }
            }
            return;
        }

        let mut stack: Vec<(i32, u32)> = vec![(0, frustum.all_plane_bits())];

        while let Some((index, cull_bits)) = stack.pop() {
            if index < 0 {
                let leaf = (-index - 1) as usize;
                if self.leafs[leaf].vis_frame == vis {
                    self.emit_leaf_surfaces(leaf, frustum, cull_bits, out);
                }
                continue;
            }

            let node = &self.nodes[index as usize];
            if node.vis_frame != vis {
                continue;
            }
            let Some(bits) = frustum.cull_box_bits(&node.bounds, cull_bits) else {
                continue;
            };
            stack.push((node.children[1], bits));
            stack.push((node.children[0], bits));
        }
    }

    fn emit_leaf_surfaces(&mut self, leaf: usize, frustum: &Frustum, cull_bits: u32, out: &mut Vec<u32>) {
        let (bounds, contents, first, num) = {
            let l = &self.leafs[leaf];
            (l.bounds, l.contents, l.first_mark_surface, l.num_mark_surfaces)
        };
        if contents == LeafContents::Invisible {
            return;
        }
        if cull_bits != 0 && frustum.cull_box_bits(&bounds, cull_bits).is_none() {
            return;
        }

        let vis = self.visit_count;
        for i in first..first + num {
            let surface_index = self.mark_surfaces[i as usize];
            let surface = &mut self.surfaces[surface_index as usize];
            if surface.marker == vis {
                continue;
            }
            surface.marker = vis;
            if cull_bits == 0 || frustum.cull_box_bits(&surface.bounds, cull_bits).is_some() {
                out.push(surface_index);
            }
        }
    }
}
