//! Point and constraint insertion
//!
//! Points are merged, located, then split into a face or an edge and the
//! surrounding edges are legalised with Lawson flips. Segments are threaded
//! through the mesh: crossed constrained edges are split at the intersection,
//! unconstrained crossings are flipped away and the resulting edge chain is
//! tagged.

use crate::quad_edge::{EdgeId, VertexId};
use crate::triangulation::{Location, Triangulation};
use crate::{Fault, LoopGuard};
use clearway_common::{
    closest_point_on_segment, distance_point_line, distance_point_segment, in_circle,
    is_convex_quad, line_intersection, orient2d, project_parameter, segments_cross, Vec2,
};
use std::collections::VecDeque;

/// Constraint data written onto every edge of an inserted segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
    pub constraint: Option<u32>,
    pub fixed: bool,
}

/// One step of tracing a segment from `u` towards `t`
enum Trace {
    /// Existing edge from `u` to a vertex on the segment
    Edge(EdgeId),
    /// Unconstrained edges crossed before reaching `end` on the segment
    Cross { crossings: Vec<EdgeId>, end: VertexId },
    /// First crossed edge is constrained
    Blocked(EdgeId),
}

impl Triangulation {
    /// Inserts `p` (clamped to the domain) and returns its vertex.
    ///
    /// Existing vertices within the merge distance are reused.
    pub(crate) fn insert_point(&mut self, p: Vec2) -> VertexId {
        let p = self.clamp(p);
        if let Some(v) = self.index.find_within(p, self.config.merge_point_distance) {
            return v;
        }

        match self.locate(p) {
            Location::Vertex(v) => v,
            Location::Edge(e) => {
                let q = closest_point_on_segment(p, self.mesh.org_pos(e), self.mesh.dest_pos(e));
                self.split_edge_at(e, q)
            }
            Location::Face(e) => {
                let v = self.new_vertex(p);
                self.mesh.split_face(e, v);
                self.legalize_around(v);
                v
            }
        }
    }

    fn new_vertex(&mut self, p: Vec2) -> VertexId {
        let v = self.mesh.add_vertex(p);
        self.index.insert(v, p);
        self.touched.push(v);
        v
    }

    /// Splits `e` at `p` (assumed to lie on it). Both halves keep the
    /// constraints of `e`.
    pub(crate) fn split_edge_at(&mut self, e: EdgeId, p: Vec2) -> VertexId {
        let v = self.new_vertex(p);
        let half = self.mesh.split_edge(e, v);
        if self.new_constraints.contains(&e) {
            self.new_constraints.push(half);
        }
        self.legalize_around(v);
        v
    }

    /// Legalises the edges opposite to `v` in all of its triangles
    pub(crate) fn legalize_around(&mut self, v: VertexId) {
        let stack: Vec<EdgeId> = self
            .mesh
            .ring(v)
            .filter(|&s| !self.mesh.is_exterior(s))
            .map(|s| self.mesh.lnext(s))
            .collect();
        self.legalize(stack);
    }

    /// Lawson flip loop over `stack`; constrained and boundary edges are never flipped
    pub(crate) fn legalize(&mut self, mut stack: Vec<EdgeId>) {
        let mut guard = LoopGuard::new(self.config.max_flip_iterations, Fault::FlipBudget);
        while let Some(e) = stack.pop() {
            let mesh = &self.mesh;
            if !mesh.is_alive(e)
                || mesh.is_constrained(e)
                || mesh.is_exterior(e)
                || mesh.is_exterior(e.sym())
            {
                continue;
            }
            let a = mesh.org_pos(e);
            let b = mesh.dest_pos(e);
            let c = mesh.position(mesh.apex(e));
            let d = mesh.position(mesh.apex(e.sym()));
            if in_circle(a, b, c, d) > 0.0 && is_convex_quad(a, d, b, c) {
                guard.tick();
                self.mesh.swap(e);
                let mesh = &self.mesh;
                stack.extend([
                    mesh.lnext(e),
                    mesh.lprev(e),
                    mesh.lnext(e.sym()),
                    mesh.lprev(e.sym()),
                ]);
            }
        }
    }

    /// Inserts the polyline `points` and tags its edges. Returns the distinct
    /// vertices of the polyline in order.
    pub(crate) fn insert_polyline(&mut self, points: &[Vec2], tag: Tag) -> Vec<VertexId> {
        let mut vertices: Vec<VertexId> = Vec::with_capacity(points.len());
        for &p in points {
            let v = self.insert_point(p);
            if vertices.last() != Some(&v) {
                vertices.push(v);
            }
        }
        for pair in vertices.windows(2) {
            self.insert_segment(pair[0], pair[1], tag);
        }
        vertices
    }

    /// Inserts the constrained segment `a -> b`
    pub(crate) fn insert_segment(&mut self, a: VertexId, b: VertexId, tag: Tag) {
        let mut pending = vec![(a, b)];
        let mut guard = LoopGuard::new(self.config.max_walk_iterations, Fault::SegmentBudget);

        while let Some((u, t)) = pending.pop() {
            guard.tick();
            if u == t {
                continue;
            }
            match self.trace(u, t) {
                Trace::Edge(e) => {
                    self.tag_edge(e, tag);
                    let w = self.mesh.dest(e);
                    if w != t {
                        pending.push((w, t));
                    }
                }
                Trace::Cross { crossings, end } => {
                    let e = self.flip_out_crossings(u, end, crossings, tag);
                    debug_assert_eq!(self.mesh.dest(e), end);
                    if end != t {
                        pending.push((end, t));
                    }
                }
                Trace::Blocked(x) => {
                    let p = self.split_crossed_constraint(x, u, t);
                    pending.push((p, t));
                    pending.push((u, p));
                }
            }
        }
    }

    fn tag_edge(&mut self, e: EdgeId, tag: Tag) {
        let mut changed = false;
        if let Some(id) = tag.constraint {
            changed |= self.mesh.add_constraint(e, id);
        }
        if tag.fixed && !self.mesh.is_fixed(e) {
            self.mesh.set_fixed(e, true);
            changed = true;
        }
        if changed {
            self.new_constraints.push(e);
        }
    }

    /// Walks from `u` towards `t` until a vertex on the segment or a constrained edge is met
    fn trace(&self, u: VertexId, t: VertexId) -> Trace {
        let mesh = &self.mesh;
        let margin = self.config.collinear_margin;
        let pu = mesh.position(u);
        let pt = mesh.position(t);

        // Neighbour lying on the segment, closest to u first
        let mut best: Option<(f64, EdgeId)> = None;
        for e in mesh.ring(u) {
            let w = mesh.dest(e);
            if w == t {
                return Trace::Edge(e);
            }
            let pw = mesh.position(w);
            let s = project_parameter(pw, pu, pt);
            if s > 0.0 && s < 1.0 && distance_point_line(pw, pu, pt) <= margin {
                if best.map_or(true, |(bs, _)| s < bs) {
                    best = Some((s, e));
                }
            }
        }
        if let Some((_, e)) = best {
            return Trace::Edge(e);
        }

        // Triangle around u that the segment enters
        let wedge = mesh.ring(u).find(|&e| {
            !mesh.is_exterior(e)
                && orient2d(pu, mesh.dest_pos(e), pt) > 0.0
                && orient2d(pu, mesh.dest_pos(mesh.onext(e)), pt) < 0.0
        });
        let wedge = match wedge {
            Some(e) => e,
            None => panic!("segment leaves vertex {u:?} through no triangle"),
        };

        let mut x = mesh.lnext(wedge).sym();
        let mut crossings = Vec::new();
        let mut guard = LoopGuard::new(self.config.max_walk_iterations, Fault::SegmentBudget);
        loop {
            guard.tick();
            if mesh.is_constrained(x) {
                return Trace::Blocked(x);
            }
            crossings.push(x);

            let w = mesh.apex(x);
            let pw = mesh.position(w);
            if w == t || distance_point_segment(pw, pu, pt) <= margin {
                return Trace::Cross { crossings, end: w };
            }

            let side_w = orient2d(pu, pt, pw) > 0.0;
            let side_org = orient2d(pu, pt, mesh.org_pos(x)) > 0.0;
            x = if side_w == side_org {
                mesh.lnext(x).sym()
            } else {
                mesh.lprev(x).sym()
            };
        }
    }

    /// Splits the constrained edge `x` where the segment `u -> t` crosses it.
    ///
    /// The split point only merges with the endpoints of `x`.
    fn split_crossed_constraint(&mut self, x: EdgeId, u: VertexId, t: VertexId) -> VertexId {
        let (a, b) = (self.mesh.org_pos(x), self.mesh.dest_pos(x));
        let (pu, pt) = (self.mesh.position(u), self.mesh.position(t));
        let hit = line_intersection(pu, pt, a, b).unwrap_or_else(|| a.lerp(b, 0.5));
        let p = closest_point_on_segment(hit, a, b);

        let merge = self.config.merge_point_distance;
        if p.distance(a) <= merge {
            return self.mesh.org(x);
        }
        if p.distance(b) <= merge {
            return self.mesh.dest(x);
        }
        self.split_edge_at(x, p)
    }

    /// Removes the unconstrained `crossings` of segment `u -> w` by flipping,
    /// then tags and returns the edge `u -> w`.
    fn flip_out_crossings(
        &mut self,
        u: VertexId,
        w: VertexId,
        crossings: Vec<EdgeId>,
        tag: Tag,
    ) -> EdgeId {
        let pu = self.mesh.position(u);
        let pw = self.mesh.position(w);
        let mut queue: VecDeque<EdgeId> = crossings.into();
        let mut created = Vec::new();
        let mut guard = LoopGuard::new(self.config.max_flip_iterations, Fault::FlipBudget);

        while let Some(e) = queue.pop_front() {
            guard.tick();
            let mesh = &self.mesh;
            let a = mesh.org_pos(e);
            let b = mesh.dest_pos(e);
            let c = mesh.position(mesh.apex(e));
            let d = mesh.position(mesh.apex(e.sym()));
            if !is_convex_quad(a, d, b, c) {
                queue.push_back(e);
                continue;
            }

            self.mesh.swap(e);
            let (o, t) = (self.mesh.org(e), self.mesh.dest(e));
            let touches = o == u || o == w || t == u || t == w;
            if !touches && segments_cross(pu, pw, self.mesh.position(o), self.mesh.position(t)) {
                queue.push_back(e);
            } else {
                created.push(e);
            }
        }

        let edge = match self.mesh.find_edge(u, w) {
            Some(e) => e,
            None => panic!("segment {u:?} -> {w:?} missing after removing crossings"),
        };
        self.tag_edge(edge, tag);
        self.touched.push(u);
        self.touched.push(w);
        self.legalize(created);
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavmeshConfig;

    const TAG: Tag = Tag {
        constraint: Some(1),
        fixed: false,
    };

    fn square() -> Triangulation {
        Triangulation::new(NavmeshConfig::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0)))
    }

    fn is_delaunay(tri: &Triangulation) -> bool {
        let mesh = &tri.mesh;
        mesh.edges().all(|e| {
            if mesh.is_constrained(e) || mesh.is_exterior(e) || mesh.is_exterior(e.sym()) {
                return true;
            }
            let a = mesh.org_pos(e);
            let b = mesh.dest_pos(e);
            let c = mesh.position(mesh.apex(e));
            let d = mesh.position(mesh.apex(e.sym()));
            in_circle(a, b, c, d) <= 0.0
        })
    }

    #[test]
    fn test_insert_points_stays_delaunay() {
        let mut tri = square();
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..200 {
            let p = Vec2::new(rng.f64() * 19.0 - 9.5, rng.f64() * 19.0 - 9.5);
            tri.insert_point(p);
        }
        assert_eq!(tri.mesh.vertex_count(), 204);
        assert!(is_delaunay(&tri));
        // Euler for a triangulated rectangle with all vertices: T = 2V - 2 - h, h = 4
        assert_eq!(tri.mesh.triangles().count(), 2 * 204 - 2 - 4);
    }

    #[test]
    fn test_merge_and_snap() {
        let mut tri = square();
        let v = tri.insert_point(Vec2::new(1.0, 1.0));
        assert_eq!(tri.insert_point(Vec2::new(1.0 + 1e-4, 1.0)), v);
        assert_eq!(tri.mesh.vertex_count(), 5);

        // Outside points are clamped onto the boundary, splitting it
        let w = tri.insert_point(Vec2::new(3.0, -20.0));
        assert_eq!(tri.mesh.position(w), Vec2::new(3.0, -10.0));
        let fixed = tri.mesh.ring(w).filter(|&e| tri.mesh.is_fixed(e)).count();
        assert_eq!(fixed, 2);
    }

    #[test]
    fn test_segment_through_points() {
        let mut tri = square();
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..100 {
            tri.insert_point(Vec2::new(rng.f64() * 18.0 - 9.0, rng.f64() * 18.0 - 9.0));
        }
        let a = tri.insert_point(Vec2::new(-8.0, -7.5));
        let b = tri.insert_point(Vec2::new(8.5, 6.0));
        tri.insert_segment(a, b, TAG);

        // The tagged chain connects a to b
        let (pa, pb) = (tri.mesh.position(a), tri.mesh.position(b));
        let mut current = a;
        let mut steps = 0;
        while current != b {
            let here = project_parameter(tri.mesh.position(current), pa, pb);
            let next = tri
                .mesh
                .ring(current)
                .find(|&e| {
                    tri.mesh.has_constraint(e, 1)
                        && project_parameter(tri.mesh.dest_pos(e), pa, pb) > here
                })
                .unwrap();
            current = tri.mesh.dest(next);
            steps += 1;
            assert!(steps < 100);
        }
        assert!(is_delaunay(&tri));
    }

    #[test]
    fn test_crossing_constraints_split() {
        let mut tri = square();
        let a = tri.insert_point(Vec2::new(-5.0, 0.0));
        let b = tri.insert_point(Vec2::new(5.0, 0.0));
        tri.insert_segment(a, b, TAG);

        let c = tri.insert_point(Vec2::new(0.0, -5.0));
        let d = tri.insert_point(Vec2::new(0.0, 5.0));
        tri.insert_segment(
            c,
            d,
            Tag {
                constraint: Some(2),
                fixed: false,
            },
        );

        let center = tri.index.find_within(Vec2::ZERO, 1e-9).unwrap();
        let constrained: Vec<_> = tri
            .mesh
            .ring(center)
            .filter(|&e| tri.mesh.is_constrained(e))
            .collect();
        assert_eq!(constrained.len(), 4);
        let ids: Vec<_> = constrained
            .iter()
            .map(|&e| tri.mesh.constraints(e)[0])
            .collect();
        assert_eq!(ids.iter().filter(|&&i| i == 1).count(), 2);
        assert_eq!(ids.iter().filter(|&&i| i == 2).count(), 2);
    }

    #[test]
    fn test_collinear_overlap_shares_edges() {
        let mut tri = square();
        let a = tri.insert_point(Vec2::new(-6.0, 2.0));
        let b = tri.insert_point(Vec2::new(6.0, 2.0));
        tri.insert_segment(a, b, TAG);
        let c = tri.insert_point(Vec2::new(0.0, 2.0));
        let d = tri.insert_point(Vec2::new(4.0, 2.0));
        tri.insert_segment(
            c,
            d,
            Tag {
                constraint: Some(5),
                fixed: false,
            },
        );

        let shared = tri.mesh.find_edge(c, d).unwrap();
        assert_eq!(tri.mesh.constraints(shared), &[1, 5]);
    }
}
