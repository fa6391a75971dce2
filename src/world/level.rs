use glam::Vec3;
use smallvec::SmallVec;

use crate::scene::{ActorKey, ComponentKey};
use crate::spatial::{BoundingBox, BspData, ConvexHull, MeshVertex, Plane};

/// Sentinel area index for the outdoor area.
pub const OUTDOOR_AREA: i32 = -1;

/// A convex-ish region of a level used for portal-based visibility.
///
/// Holds the drawables currently overlapping it; the lists are maintained by
/// the world when transforms commit (invariant: a drawable appears in the
/// movables of every overlapping area and no others).
#[derive(Debug, Default)]
pub struct VisArea {
    pub bounds: BoundingBox,
    pub reference_point: Vec3,
    pub(crate) movables: Vec<ComponentKey>,
    /// Head of this area's portal list inside `Level::area_portals`; -1 ends
    /// the list.
    pub(crate) first_portal: i32,
}

impl VisArea {
    #[inline]
    #[must_use]
    pub fn movables(&self) -> &[ComponentKey] {
        &self.movables
    }
}

/// Directed half of a level portal, linked into the source area's list.
#[derive(Debug)]
pub struct AreaPortal {
    /// Destination area index; [`OUTDOOR_AREA`] for outdoors.
    pub to_area: i32,
    /// Winding facing the source area.
    pub hull: ConvexHull,
    pub plane: Plane,
    /// Next portal of the same source area; -1 ends the list.
    pub next: i32,
    /// Index of the owning [`LevelPortal`].
    pub owner: u32,
}

/// A two-sided portal linking two areas through a convex hull.
#[derive(Debug)]
pub struct LevelPortal {
    pub hull: ConvexHull,
    pub plane: Plane,
    /// The two linked area indices ([`OUTDOOR_AREA`] allowed).
    pub areas: [i32; 2],
    /// Frame stamp breaking cycles during the portal flood.
    pub(crate) vis_mark: u64,
}

/// Navigation mesh slot carried per level; generation is a collaborator.
#[derive(Debug, Default)]
pub struct NavMeshData {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub bounding_box: BoundingBox,
}

/// Logical subpart of a world: owns actors, visibility areas and portals,
/// BSP data and baked lighting for its brush geometry.
///
/// A level is persistent when created with the world, streamed otherwise.
#[derive(Debug)]
pub struct Level {
    pub name: String,
    pub(crate) persistent: bool,
    pub(crate) world_index: usize,
    pub(crate) owned: bool,
    pub(crate) actors: Vec<ActorKey>,

    pub areas: Vec<VisArea>,
    pub(crate) outdoor_area: VisArea,
    pub portals: Vec<LevelPortal>,
    pub(crate) area_portals: Vec<AreaPortal>,

    pub bsp: BspData,
    pub indoor_bounds: BoundingBox,

    /// Shared brush vertex/index buffers addressed by surface defs.
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// Backend texture references of the baked lightmap set.
    pub lightmaps: Vec<u32>,
    pub light_data: Vec<u8>,
    pub nav_mesh: NavMeshData,

    /// Brush model id packed into surface sort keys.
    pub model_id: u16,
}

impl Default for Level {
    fn default() -> Self {
        Self::new("Level")
    }
}

impl Level {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            persistent: false,
            world_index: usize::MAX,
            owned: false,
            actors: Vec::new(),
            areas: Vec::new(),
            outdoor_area: VisArea {
                bounds: BoundingBox::new(
                    Vec3::splat(f32::NEG_INFINITY),
                    Vec3::splat(f32::INFINITY),
                ),
                first_portal: -1,
                ..Default::default()
            },
            portals: Vec::new(),
            area_portals: Vec::new(),
            bsp: BspData::default(),
            indoor_bounds: BoundingBox::EMPTY,
            vertices: Vec::new(),
            indices: Vec::new(),
            lightmaps: Vec::new(),
            light_data: Vec::new(),
            nav_mesh: NavMeshData::default(),
            model_id: 0,
        }
    }

    /// Level is persistent if created by the world.
    #[inline]
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    #[inline]
    #[must_use]
    pub fn actors(&self) -> &[ActorKey] {
        &self.actors
    }

    #[inline]
    #[must_use]
    pub fn outdoor_area(&self) -> &VisArea {
        &self.outdoor_area
    }

    /// Area by signed index; [`OUTDOOR_AREA`] resolves to the outdoor area.
    #[must_use]
    pub fn area(&self, index: i32) -> &VisArea {
        if index < 0 {
            &self.outdoor_area
        } else {
            &self.areas[index as usize]
        }
    }

    pub(crate) fn area_mut(&mut self, index: i32) -> &mut VisArea {
        if index < 0 {
            &mut self.outdoor_area
        } else {
            &mut self.areas[index as usize]
        }
    }

    /// Finds the visibility area containing `position`;
    /// [`OUTDOOR_AREA`] when none does.
    #[must_use]
    pub fn find_area(&self, position: Vec3) -> i32 {
        for (i, area) in self.areas.iter().enumerate() {
            if area.bounds.contains_point(position) {
                return i as i32;
            }
        }
        OUTDOOR_AREA
    }

    /// Creates a visibility area and grows the indoor bounds.
    pub fn create_area(&mut self, position: Vec3, extents: Vec3, reference_point: Vec3) -> i32 {
        let bounds = BoundingBox::from_center_half_extents(position, extents * 0.5);
        self.indoor_bounds.add_aabb(&bounds);
        self.areas.push(VisArea {
            bounds,
            reference_point,
            movables: Vec::new(),
            first_portal: -1,
        });
        (self.areas.len() - 1) as i32
    }

    /// Creates a portal between two areas from a convex winding. The hull
    /// must be wound counter-clockwise as seen from `area1`. Returns the
    /// portal index, or `None` for a degenerate winding.
    pub fn create_portal(&mut self, hull_points: &[Vec3], area1: i32, area2: i32) -> Option<u32> {
        let hull = ConvexHull::from_points(hull_points);
        let plane = hull.plane()?;

        let portal_index = self.portals.len() as u32;
        self.portals.push(LevelPortal {
            hull: hull.clone(),
            plane,
            areas: [area1, area2],
            vis_mark: 0,
        });

        // Two directed halves, each facing its source area
        self.link_area_portal(area1, area2, hull.clone(), plane, portal_index);
        self.link_area_portal(area2, area1, hull.reversed(), plane.flipped(), portal_index);

        Some(portal_index)
    }

    fn link_area_portal(
        &mut self,
        from_area: i32,
        to_area: i32,
        hull: ConvexHull,
        plane: Plane,
        owner: u32,
    ) {
        let index = self.area_portals.len() as i32;
        let head = self.area(from_area).first_portal;
        self.area_portals.push(AreaPortal {
            to_area,
            hull,
            plane,
            next: head,
            owner,
        });
        self.area_mut(from_area).first_portal = index;
    }

    /// Destroys all areas and portals; movables must be re-linked by the
    /// owner world afterwards.
    pub fn destroy_portal_tree(&mut self) {
        self.areas.clear();
        self.portals.clear();
        self.area_portals.clear();
        self.outdoor_area.first_portal = -1;
        self.outdoor_area.movables.clear();
        self.indoor_bounds = BoundingBox::EMPTY;
    }

    /// Iterates the directed portals leaving `area`.
    pub fn area_portals_of(&self, area: i32) -> impl Iterator<Item = &AreaPortal> {
        let mut next = self.area(area).first_portal;
        std::iter::from_fn(move || {
            if next < 0 {
                return None;
            }
            let portal = &self.area_portals[next as usize];
            next = portal.next;
            Some(portal)
        })
    }

    /// Links a drawable into every area overlapping `bounds` (the outdoor
    /// area when it overlaps none, or when it leaves the indoor bounds).
    /// Returns the linked area indices.
    pub(crate) fn link_drawable(
        &mut self,
        component: ComponentKey,
        bounds: &BoundingBox,
    ) -> SmallVec<[i32; 4]> {
        let mut linked: SmallVec<[i32; 4]> = SmallVec::new();
        for (i, area) in self.areas.iter_mut().enumerate() {
            if area.bounds.overlaps(bounds) {
                area.movables.push(component);
                linked.push(i as i32);
            }
        }
        let fully_indoor = !self.indoor_bounds.is_empty()
            && self.indoor_bounds.contains_point(bounds.min)
            && self.indoor_bounds.contains_point(bounds.max);
        if linked.is_empty() || !fully_indoor {
            self.outdoor_area.movables.push(component);
            linked.push(OUTDOOR_AREA);
        }
        linked
    }

    pub(crate) fn unlink_drawable(&mut self, component: ComponentKey, areas: &[i32]) {
        for &index in areas {
            let movables = &mut self.area_mut(index).movables;
            if let Some(pos) = movables.iter().position(|&c| c == component) {
                movables.swap_remove(pos);
            }
        }
    }

    /// Level ticking: streaming and navmesh upkeep hooks. Called by the
    /// owner world once per frame.
    pub(crate) fn tick(&mut self, _time_step: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_area_prefers_enclosing_area() {
        let mut level = Level::new("test");
        level.create_area(Vec3::ZERO, Vec3::splat(10.0), Vec3::ZERO);
        level.create_area(Vec3::new(20.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);

        assert_eq!(level.find_area(Vec3::ZERO), 0);
        assert_eq!(level.find_area(Vec3::new(20.0, 0.0, 0.0)), 1);
        assert_eq!(level.find_area(Vec3::new(100.0, 0.0, 0.0)), OUTDOOR_AREA);
    }

    #[test]
    fn portal_links_both_directions() {
        let mut level = Level::new("test");
        let a1 = level.create_area(Vec3::new(-5.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);
        let a2 = level.create_area(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);

        let points = [
            Vec3::new(0.0, -1.0, 1.0),
            Vec3::new(0.0, -1.0, -1.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        level.create_portal(&points, a1, a2).unwrap();

        let from_a1: Vec<i32> = level.area_portals_of(a1).map(|p| p.to_area).collect();
        let from_a2: Vec<i32> = level.area_portals_of(a2).map(|p| p.to_area).collect();
        assert_eq!(from_a1, vec![a2]);
        assert_eq!(from_a2, vec![a1]);

        // The two directed hulls face opposite ways
        let p1 = level.area_portals_of(a1).next().unwrap().plane;
        let p2 = level.area_portals_of(a2).next().unwrap().plane;
        assert!((p1.normal + p2.normal).length() < 1e-5);
    }

    #[test]
    fn drawable_linking_spans_areas() {
        let mut level = Level::new("test");
        level.create_area(Vec3::new(-5.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);
        level.create_area(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(10.0), Vec3::ZERO);

        let key = ComponentKey::default();
        let straddling = BoundingBox::from_center_half_extents(Vec3::ZERO, Vec3::splat(2.0));
        let linked = level.link_drawable(key, &straddling);
        assert!(linked.contains(&0) && linked.contains(&1));

        level.unlink_drawable(key, &linked);
        assert!(level.areas.iter().all(|a| a.movables.is_empty()));
        assert!(level.outdoor_area.movables.is_empty());
    }
}
