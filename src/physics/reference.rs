//! Reference implementation of the solver contract.
//!
//! A compact headless stepper so the registration, filter, event and query
//! machinery is fully exercisable without a production physics library:
//! semi-implicit Euler integration, pairwise manifolds for
//! sphere/box/plane/triangle-soup, impulse-plus-projection resolution that
//! holds resting contact, and swept queries by conservative stepping.
//!
//! Capsules, cylinders and convex hulls collide through their bounding
//! spheres; this is deliberately conservative. Not a constraint solver.

use glam::{Affine3A, Quat, Vec3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::physics::shapes::{CollisionComposition, CollisionShape};
use crate::physics::solver::{
    CollisionSolver, Manifold, ManifoldPoint, QueryFilter, SolverBodyDesc, SolverBodyId,
    SolverHooks, SweepShape, TraceHit,
};
use crate::spatial::intersect::{ray_intersect_box, ray_intersect_triangle};
use crate::spatial::{BoundingBox, Plane};

const PENETRATION_CORRECTION: f32 = 0.8;
const PENETRATION_SLOP: f32 = 0.001;
const RESTITUTION_THRESHOLD: f32 = 1.0;

/// World-space collision proxy of one shape instance.
#[derive(Debug, Clone)]
enum Proxy {
    Sphere {
        center: Vec3,
        radius: f32,
    },
    Obb {
        center: Vec3,
        half_extents: Vec3,
        rotation: Quat,
    },
    Plane(Plane),
    /// Static triangle soup with pre-transformed world vertices.
    Tris {
        vertices: Vec<Vec3>,
        indices: Vec<u32>,
    },
}

#[derive(Debug)]
struct RefBody {
    id: SolverBodyId,
    shape: CollisionComposition,
    transform: Affine3A,
    prev_transform: Affine3A,
    render_transform: Affine3A,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    inv_mass: f32,
    friction: f32,
    restitution: f32,
    trigger: bool,
    group: u16,
    mask: u16,
    proxies: Vec<Proxy>,
    bounds: BoundingBox,
}

impl RefBody {
    fn is_dynamic(&self) -> bool {
        self.inv_mass > 0.0 && !self.trigger
    }

    fn rebuild_proxies(&mut self) {
        self.proxies.clear();
        self.bounds = BoundingBox::EMPTY;
        for instance in &self.shape.shapes {
            let world = self.transform * instance.local_transform;
            let (scale, rotation, translation) = world.to_scale_rotation_translation();
            let uniform = scale.max_element();
            let proxy = match &instance.shape {
                CollisionShape::Sphere { radius } => Proxy::Sphere {
                    center: translation,
                    radius: radius * uniform + instance.margin,
                },
                CollisionShape::Box { half_extents } => Proxy::Obb {
                    center: translation,
                    half_extents: *half_extents * scale + Vec3::splat(instance.margin),
                    rotation,
                },
                CollisionShape::Capsule { radius, height } => Proxy::Sphere {
                    center: translation,
                    radius: (height * 0.5 + radius) * uniform + instance.margin,
                },
                CollisionShape::Cylinder { half_extents } => Proxy::Sphere {
                    center: translation,
                    radius: half_extents.length() * uniform + instance.margin,
                },
                CollisionShape::Plane { plane } => {
                    let normal = world.transform_vector3(plane.normal).normalize_or_zero();
                    let point = world.transform_point3(plane.normal * -plane.d);
                    Proxy::Plane(Plane::from_point_normal(point, normal))
                }
                CollisionShape::ConvexHull { vertices } => {
                    let mut bounds = BoundingBox::EMPTY;
                    for &v in vertices {
                        bounds.add_point(v);
                    }
                    Proxy::Sphere {
                        center: world.transform_point3(bounds.center()),
                        radius: bounds.half_extents().length() * uniform + instance.margin,
                    }
                }
                CollisionShape::TriangleSoup { vertices, indices } => Proxy::Tris {
                    vertices: vertices.iter().map(|&v| world.transform_point3(v)).collect(),
                    indices: indices.clone(),
                },
            };
            self.bounds.add_aabb(&proxy_bounds(&proxy));
            self.proxies.push(proxy);
        }
    }
}

fn proxy_bounds(proxy: &Proxy) -> BoundingBox {
    match proxy {
        Proxy::Sphere { center, radius } => {
            BoundingBox::from_center_half_extents(*center, Vec3::splat(*radius))
        }
        Proxy::Obb {
            center,
            half_extents,
            rotation,
        } => obb_aabb(*center, *half_extents, *rotation),
        Proxy::Plane(_) => BoundingBox::new(
            Vec3::splat(f32::NEG_INFINITY),
            Vec3::splat(f32::INFINITY),
        ),
        Proxy::Tris { vertices, .. } => {
            let mut b = BoundingBox::EMPTY;
            for &v in vertices {
                b.add_point(v);
            }
            b
        }
    }
}

fn obb_aabb(center: Vec3, half_extents: Vec3, rotation: Quat) -> BoundingBox {
    let m = Affine3A::from_rotation_translation(rotation, center);
    BoundingBox::from_center_half_extents(Vec3::ZERO, half_extents).transform(&m)
}

fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

type Points = SmallVec<[ManifoldPoint; 4]>;

fn make_point(position: Vec3, normal: Vec3, distance: f32) -> ManifoldPoint {
    ManifoldPoint {
        position,
        normal,
        distance,
        impulse: 0.0,
        combined_friction: 0.5,
        combined_restitution: 0.0,
    }
}

/// Collides proxy `a` against proxy `b`; point normals face from B toward A.
fn collide_proxies(a: &Proxy, b: &Proxy) -> Points {
    let mut points = Points::new();
    match (a, b) {
        (Proxy::Sphere { center: ca, radius: ra }, Proxy::Sphere { center: cb, radius: rb }) => {
            let delta = *ca - *cb;
            let dist = delta.length();
            if dist < ra + rb && dist > 1e-6 {
                let normal = delta / dist;
                points.push(make_point(*cb + normal * *rb, normal, dist - (ra + rb)));
            }
        }
        (Proxy::Sphere { center, radius }, Proxy::Plane(plane)) => {
            let d = plane.distance(*center);
            if d < *radius {
                points.push(make_point(*center - plane.normal * d, plane.normal, d - radius));
            }
        }
        (Proxy::Plane(_), Proxy::Sphere { .. }) => {
            return flip_points(&collide_proxies(b, a));
        }
        (Proxy::Sphere { center, radius }, Proxy::Obb { center: oc, half_extents, rotation }) => {
            let inv_rot = rotation.conjugate();
            let local = inv_rot * (*center - *oc);
            let closest = local.clamp(-*half_extents, *half_extents);
            let delta = local - closest;
            let dist = delta.length();
            if dist > 1e-6 {
                if dist < *radius {
                    let normal = *rotation * (delta / dist);
                    points.push(make_point(*oc + *rotation * closest, normal, dist - radius));
                }
            } else {
                // Center inside the box: push out along the axis of least depth
                let depths = *half_extents - local.abs();
                let axis = if depths.x < depths.y && depths.x < depths.z {
                    Vec3::X * local.x.signum()
                } else if depths.y < depths.z {
                    Vec3::Y * local.y.signum()
                } else {
                    Vec3::Z * local.z.signum()
                };
                let normal = *rotation * axis;
                points.push(make_point(*center, normal, -(depths.min_element() + radius)));
            }
        }
        (Proxy::Obb { .. }, Proxy::Sphere { .. }) => {
            return flip_points(&collide_proxies(b, a));
        }
        (Proxy::Obb { center, half_extents, rotation }, Proxy::Plane(plane)) => {
            let m = Affine3A::from_rotation_translation(*rotation, *center);
            let h = *half_extents;
            for sx in [-1.0f32, 1.0] {
                for sy in [-1.0f32, 1.0] {
                    for sz in [-1.0f32, 1.0] {
                        let corner = m.transform_point3(Vec3::new(h.x * sx, h.y * sy, h.z * sz));
                        let d = plane.distance(corner);
                        if d < 0.0 {
                            points.push(make_point(corner - plane.normal * d, plane.normal, d));
                        }
                    }
                }
            }
            keep_deepest(&mut points);
        }
        (Proxy::Plane(_), Proxy::Obb { .. }) => {
            return flip_points(&collide_proxies(b, a));
        }
        (Proxy::Obb { .. }, Proxy::Obb { .. }) => {
            // Reference-grade: world AABB penetration along the least axis
            let ba = proxy_bounds(a);
            let bb = proxy_bounds(b);
            if ba.overlaps(&bb) {
                let pen = (ba.max.min(bb.max)) - (ba.min.max(bb.min));
                let center = (ba.center() + bb.center()) * 0.5;
                let dir = ba.center() - bb.center();
                let (normal, depth) = if pen.x < pen.y && pen.x < pen.z {
                    (Vec3::X * dir.x.signum(), pen.x)
                } else if pen.y < pen.z {
                    (Vec3::Y * dir.y.signum(), pen.y)
                } else {
                    (Vec3::Z * dir.z.signum(), pen.z)
                };
                points.push(make_point(center, normal, -depth));
            }
        }
        (Proxy::Sphere { center, radius }, Proxy::Tris { vertices, indices }) => {
            for tri in indices.chunks_exact(3) {
                let v0 = vertices[tri[0] as usize];
                let v1 = vertices[tri[1] as usize];
                let v2 = vertices[tri[2] as usize];
                let closest = closest_point_on_triangle(*center, v0, v1, v2);
                let delta = *center - closest;
                let dist = delta.length();
                if dist < *radius && dist > 1e-6 {
                    let mut normal = delta / dist;
                    // Internal-edge correction: snap edge/vertex normals to
                    // the face normal so sliding over shared edges stays smooth
                    let face = (v1 - v0).cross(v2 - v0).normalize_or_zero();
                    if face.dot(normal) > 0.0 {
                        normal = face;
                    }
                    points.push(make_point(closest, normal, dist - radius));
                    if points.len() == points.inline_size() {
                        break;
                    }
                }
            }
            keep_deepest(&mut points);
        }
        (Proxy::Tris { .. }, Proxy::Sphere { .. }) => {
            return flip_points(&collide_proxies(b, a));
        }
        _ => {
            // Remaining combinations: conservative AABB manifold
            let ba = proxy_bounds(a);
            let bb = proxy_bounds(b);
            if !ba.min.x.is_infinite() && !bb.min.x.is_infinite() && ba.overlaps(&bb) {
                let dir = (ba.center() - bb.center()).normalize_or_zero();
                points.push(make_point(
                    (ba.center() + bb.center()) * 0.5,
                    if dir == Vec3::ZERO { Vec3::Y } else { dir },
                    -0.01,
                ));
            }
        }
    }
    points
}

fn flip_points(points: &Points) -> Points {
    points
        .iter()
        .map(|p| ManifoldPoint {
            normal: -p.normal,
            ..*p
        })
        .collect()
}

fn keep_deepest(points: &mut Points) {
    if points.len() > 4 {
        points.sort_unstable_by(|x, y| {
            x.distance
                .partial_cmp(&y.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        points.truncate(4);
    }
}

/// The built-in headless stepper.
pub struct ReferenceSolver {
    gravity: Vec3,
    iterations: u32,
    #[allow(dead_code)]
    split_impulse: bool,
    bodies: Vec<RefBody>,
    index_of: FxHashMap<SolverBodyId, usize>,
    manifolds: Vec<Manifold>,
}

impl Default for ReferenceSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceSolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            iterations: 4,
            split_impulse: false,
            bodies: Vec::new(),
            index_of: FxHashMap::default(),
            manifolds: Vec::new(),
        }
    }

    fn body(&self, id: SolverBodyId) -> Option<&RefBody> {
        self.index_of.get(&id).map(|&i| &self.bodies[i])
    }

    fn body_mut(&mut self, id: SolverBodyId) -> Option<&mut RefBody> {
        self.index_of.get(&id).copied().map(|i| &mut self.bodies[i])
    }

    fn resolve_pair(&mut self, ia: usize, ib: usize, manifold: &mut Manifold, project: bool) {
        debug_assert!(ia < ib);
        let (left, right) = self.bodies.split_at_mut(ib);
        let a = &mut left[ia];
        let b = &mut right[0];

        if a.trigger || b.trigger {
            return;
        }
        let inv_sum = a.inv_mass + b.inv_mass;
        if inv_sum <= 0.0 {
            return;
        }

        if project {
            // One projection per manifold along the deepest point; per-point
            // accumulation would overshoot and churn resting contacts
            let deepest = manifold
                .points
                .iter()
                .min_by(|x, y| {
                    x.distance
                        .partial_cmp(&y.distance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .copied();
            if let Some(point) = deepest {
                let pen = -point.distance - PENETRATION_SLOP;
                if pen > 0.0 {
                    let correction = point.normal * (pen * PENETRATION_CORRECTION / inv_sum);
                    a.transform.translation += glam::Vec3A::from(correction * a.inv_mass);
                    b.transform.translation -= glam::Vec3A::from(correction * b.inv_mass);
                }
            }
        }

        for point in &mut manifold.points {
            let pen = -point.distance - PENETRATION_SLOP;
            if pen <= 0.0 {
                continue;
            }

            // Normal impulse with restitution
            let rel_v = a.linear_velocity - b.linear_velocity;
            let vn = rel_v.dot(point.normal);
            if vn < 0.0 {
                let e = if -vn > RESTITUTION_THRESHOLD {
                    point.combined_restitution
                } else {
                    0.0
                };
                let j = -(1.0 + e) * vn / inv_sum;
                let impulse = point.normal * j;
                a.linear_velocity += impulse * a.inv_mass;
                b.linear_velocity -= impulse * b.inv_mass;
                point.impulse += j;

                // Coulomb-style friction against the tangential velocity
                let tangent_v = rel_v - point.normal * vn;
                let tangent_speed = tangent_v.length();
                if tangent_speed > 1e-5 {
                    let tangent = tangent_v / tangent_speed;
                    let jt = (tangent_speed / inv_sum).min(point.combined_friction * j);
                    let friction_impulse = tangent * jt;
                    a.linear_velocity -= friction_impulse * a.inv_mass;
                    b.linear_velocity += friction_impulse * b.inv_mass;
                }
            }
        }
    }
}

impl CollisionSolver for ReferenceSolver {
    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn set_solver_settings(&mut self, iterations: u32, split_impulse: bool) {
        self.iterations = iterations.clamp(1, 256);
        self.split_impulse = split_impulse;
    }

    fn add_rigid_body(&mut self, desc: SolverBodyDesc) {
        if self.index_of.contains_key(&desc.id) {
            log::warn!("ReferenceSolver: body {} already registered", desc.id);
            return;
        }
        let inv_mass = if desc.mass > 0.0 && !desc.shape.is_static_only() {
            1.0 / desc.mass
        } else {
            0.0
        };
        let mut body = RefBody {
            id: desc.id,
            shape: desc.shape,
            transform: desc.transform,
            prev_transform: desc.transform,
            render_transform: desc.transform,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inv_mass,
            friction: desc.friction,
            restitution: desc.restitution,
            trigger: desc.trigger,
            group: desc.group,
            mask: desc.mask,
            proxies: Vec::new(),
            bounds: BoundingBox::EMPTY,
        };
        body.rebuild_proxies();
        self.index_of.insert(desc.id, self.bodies.len());
        self.bodies.push(body);
    }

    fn remove_rigid_body(&mut self, id: SolverBodyId) {
        let Some(index) = self.index_of.remove(&id) else {
            return;
        };
        self.bodies.swap_remove(index);
        if index < self.bodies.len() {
            self.index_of.insert(self.bodies[index].id, index);
        }
        self.manifolds
            .retain(|m| m.body_a != id && m.body_b != id);
    }

    fn has_body(&self, id: SolverBodyId) -> bool {
        self.index_of.contains_key(&id)
    }

    fn set_body_transform(&mut self, id: SolverBodyId, transform: Affine3A) {
        if let Some(body) = self.body_mut(id) {
            body.transform = transform;
            body.prev_transform = transform;
            body.render_transform = transform;
            body.rebuild_proxies();
        }
    }

    fn body_transform(&self, id: SolverBodyId) -> Option<Affine3A> {
        self.body(id).map(|b| b.render_transform)
    }

    fn body_velocity(&self, id: SolverBodyId) -> Option<(Vec3, Vec3)> {
        self.body(id).map(|b| (b.linear_velocity, b.angular_velocity))
    }

    fn set_body_velocity(&mut self, id: SolverBodyId, linear: Vec3, angular: Vec3) {
        if let Some(body) = self.body_mut(id) {
            body.linear_velocity = linear;
            body.angular_velocity = angular;
        }
    }

    fn step_fixed(&mut self, time_step: f32, hooks: &dyn SolverHooks) {
        // Integrate
        for body in &mut self.bodies {
            body.prev_transform = body.transform;
            if !body.is_dynamic() {
                continue;
            }
            body.linear_velocity += self.gravity * time_step;
            body.transform.translation += glam::Vec3A::from(body.linear_velocity * time_step);

            let w = body.angular_velocity;
            if w.length_squared() > 1e-12 {
                let (scale, rotation, translation) = body.transform.to_scale_rotation_translation();
                let dq = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * rotation * (0.5 * time_step);
                let rotation = (rotation + dq).normalize();
                body.transform = Affine3A::from_scale_rotation_translation(scale, rotation, translation);
            }
        }
        for body in &mut self.bodies {
            body.rebuild_proxies();
        }

        // Broadphase + narrowphase
        self.manifolds.clear();
        let mut pairs: Vec<(usize, usize, Manifold)> = Vec::new();
        for ia in 0..self.bodies.len() {
            for ib in ia + 1..self.bodies.len() {
                let (a, b) = (&self.bodies[ia], &self.bodies[ib]);
                if (a.group & b.mask) == 0 || (b.group & a.mask) == 0 {
                    continue;
                }
                if !a.bounds.overlaps(&b.bounds) {
                    continue;
                }
                if !hooks.broadphase_filter(a.id, b.id) {
                    continue;
                }

                let mut points = Points::new();
                for pa in &a.proxies {
                    for pb in &b.proxies {
                        points.extend(collide_proxies(pa, pb));
                    }
                }
                keep_deepest(&mut points);
                if points.is_empty() {
                    continue;
                }

                for point in &mut points {
                    // Combined materials the way the contact-added callback
                    // computes them: product, friction clamped
                    point.combined_friction = (a.friction * b.friction).clamp(0.0, 10.0);
                    point.combined_restitution = a.restitution * b.restitution;
                    hooks.contact_added(point, a.id, b.id);
                }

                pairs.push((
                    ia,
                    ib,
                    Manifold {
                        body_a: a.id,
                        body_b: b.id,
                        points,
                    },
                ));
            }
        }

        // Resolve
        for iteration in 0..self.iterations.min(8) {
            for (ia, ib, manifold) in &mut pairs {
                self.resolve_pair(*ia, *ib, manifold, iteration == 0);
            }
        }

        self.manifolds = pairs.into_iter().map(|(_, _, m)| m).collect();

        for body in &mut self.bodies {
            body.render_transform = body.transform;
        }
    }

    fn interpolate_transforms(&mut self, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        for body in &mut self.bodies {
            if !body.is_dynamic() {
                continue;
            }
            let (ps, pr, pt) = body.prev_transform.to_scale_rotation_translation();
            let (cs, cr, ct) = body.transform.to_scale_rotation_translation();
            body.render_transform = Affine3A::from_scale_rotation_translation(
                ps.lerp(cs, alpha),
                pr.slerp(cr, alpha),
                pt.lerp(ct, alpha),
            );
        }
    }

    fn manifolds(&self) -> &[Manifold] {
        &self.manifolds
    }

    fn ray_test(&self, start: Vec3, end: Vec3, filter: &QueryFilter, hits: &mut Vec<TraceHit>) {
        let delta = end - start;
        let length = delta.length();
        if length < 1e-6 {
            return;
        }
        let dir = delta / length;
        let inv_dir = dir.recip();

        for body in &self.bodies {
            if !filter.accepts(body.group, body.mask, body.id) {
                continue;
            }
            for proxy in &body.proxies {
                let hit = match proxy {
                    Proxy::Sphere { center, radius } => {
                        ray_sphere(start, dir, length, *center, *radius)
                    }
                    Proxy::Plane(plane) => ray_plane(start, dir, length, plane),
                    Proxy::Obb {
                        center,
                        half_extents,
                        rotation,
                    } => {
                        let inv_rot = rotation.conjugate();
                        let local_start = inv_rot * (start - *center);
                        let local_dir = inv_rot * dir;
                        ray_intersect_box(
                            local_start,
                            local_dir.recip(),
                            &BoundingBox::from_center_half_extents(Vec3::ZERO, *half_extents),
                        )
                        .filter(|&(t, _)| t <= length)
                        .map(|(t, _)| {
                            let local_point = local_start + local_dir * t;
                            let normal = box_face_normal(local_point, *half_extents);
                            (t, *rotation * normal)
                        })
                    }
                    Proxy::Tris { vertices, indices } => {
                        let mut best: Option<(f32, Vec3)> = None;
                        for tri in indices.chunks_exact(3) {
                            let v0 = vertices[tri[0] as usize];
                            let v1 = vertices[tri[1] as usize];
                            let v2 = vertices[tri[2] as usize];
                            if let Some((t, _, _)) = ray_intersect_triangle(start, dir, v0, v1, v2)
                            {
                                if t <= length && best.is_none_or(|(bt, _)| t < bt) {
                                    best =
                                        Some((t, (v1 - v0).cross(v2 - v0).normalize_or_zero()));
                                }
                            }
                        }
                        best
                    }
                };
                if let Some((t, normal)) = hit {
                    hits.push(TraceHit {
                        body: body.id,
                        position: start + dir * t,
                        normal,
                        distance: t,
                        fraction: t / length,
                    });
                }
            }
        }
    }

    fn sweep_test(
        &self,
        shape: &SweepShape,
        rotation: Quat,
        start: Vec3,
        end: Vec3,
        filter: &QueryFilter,
        hits: &mut Vec<TraceHit>,
    ) {
        let delta = end - start;
        let length = delta.length();

        let (radius, composition) = match shape {
            SweepShape::Sphere { radius } => (
                *radius,
                CollisionComposition::single(CollisionShape::Sphere { radius: *radius }),
            ),
            SweepShape::Box { half_extents } => (
                half_extents.min_element(),
                CollisionComposition::single(CollisionShape::Box {
                    half_extents: *half_extents,
                }),
            ),
            SweepShape::Cylinder { half_extents } => (
                half_extents.min_element(),
                CollisionComposition::single(CollisionShape::Cylinder {
                    half_extents: *half_extents,
                }),
            ),
            SweepShape::Capsule { radius, height } => (
                *radius,
                CollisionComposition::single(CollisionShape::Capsule {
                    radius: *radius,
                    height: *height,
                }),
            ),
            SweepShape::Convex { vertices } => (
                0.1,
                CollisionComposition::single(CollisionShape::ConvexHull {
                    vertices: vertices.clone(),
                }),
            ),
        };

        // Conservative stepping: advance by half the smallest shape radius
        let step = (radius * 0.5).max(1e-3);
        let steps = ((length / step).ceil() as usize).clamp(1, 256);

        let mut overlaps = Vec::new();
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let position = start + delta * t;
            overlaps.clear();
            self.contact_test(
                &composition,
                Affine3A::from_rotation_translation(rotation, position),
                filter,
                &mut overlaps,
            );
            if let Some(&body) = overlaps.first() {
                let normal = (-delta).normalize_or_zero();
                hits.push(TraceHit {
                    body,
                    position,
                    normal,
                    distance: length * t,
                    fraction: t,
                });
                return;
            }
        }
    }

    fn contact_test(
        &self,
        shape: &CollisionComposition,
        transform: Affine3A,
        filter: &QueryFilter,
        results: &mut Vec<SolverBodyId>,
    ) {
        // Transient ghost body
        let mut ghost = RefBody {
            id: u64::MAX,
            shape: shape.clone(),
            transform,
            prev_transform: transform,
            render_transform: transform,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inv_mass: 0.0,
            friction: 0.0,
            restitution: 0.0,
            trigger: true,
            group: filter.group,
            mask: filter.mask,
            proxies: Vec::new(),
            bounds: BoundingBox::EMPTY,
        };
        ghost.rebuild_proxies();

        for body in &self.bodies {
            if !filter.accepts(body.group, body.mask, body.id) {
                continue;
            }
            if !ghost.bounds.overlaps(&body.bounds) {
                continue;
            }
            let touching = ghost.proxies.iter().any(|pa| {
                body.proxies
                    .iter()
                    .any(|pb| !collide_proxies(pa, pb).is_empty())
            });
            if touching {
                results.push(body.id);
            }
        }
    }
}

fn ray_sphere(start: Vec3, dir: Vec3, max_t: f32, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
    let oc = start - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t < 0.0 || t > max_t {
        return None;
    }
    let point = start + dir * t;
    Some((t, (point - center).normalize_or_zero()))
}

fn ray_plane(start: Vec3, dir: Vec3, max_t: f32, plane: &Plane) -> Option<(f32, Vec3)> {
    let denom = plane.normal.dot(dir);
    if denom.abs() < 1e-8 {
        return None;
    }
    let t = -(plane.normal.dot(start) + plane.d) / denom;
    if t < 0.0 || t > max_t {
        return None;
    }
    Some((t, plane.normal))
}

fn box_face_normal(local_point: Vec3, half_extents: Vec3) -> Vec3 {
    let rel = local_point / half_extents.max(Vec3::splat(1e-6));
    let abs = rel.abs();
    if abs.x >= abs.y && abs.x >= abs.z {
        Vec3::X * rel.x.signum()
    } else if abs.y >= abs.z {
        Vec3::Y * rel.y.signum()
    } else {
        Vec3::Z * rel.z.signum()
    }
}
