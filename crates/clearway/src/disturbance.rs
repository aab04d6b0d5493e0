//! Disturbance detection and refinement
//!
//! A corner `b` of triangle `(a, b, c)` whose sector sees a constrained edge
//! `s` beyond `ac` as its nearest obstacle is disturbed when some vertex `v`
//! sits between `ac` and `s`, closer to `s` than `b` is and closer to `s`
//! than to `b`. Such a vertex hides a passage narrower than the one the
//! corner reports. Splitting `s` at the projection of `v` makes the
//! narrower passage visible to the corners around `v`.

use crate::clearance::Limit;
use crate::quad_edge::{EdgeId, VertexId};
use crate::triangulation::Triangulation;
use clearway_common::{
    distance_point_segment, distance_segment_segment, orient2d, project_parameter, Vec2,
};
use std::collections::{HashSet, VecDeque};

/// A vertex hiding a narrower passage behind a traversal
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Disturbance {
    /// Constrained edge to split
    pub edge: EdgeId,
    pub vertex: VertexId,
    /// Projection of `vertex` onto `edge`
    pub reference: Vec2,
}

impl Triangulation {
    /// Checks the traversal turning around `org(e)` in the left triangle of `e`
    pub(crate) fn check_traversal(&mut self, e: EdgeId) -> Option<Disturbance> {
        if self.mesh.is_exterior(e) {
            return None;
        }
        let (reach, limit) = self.sector_limit(e);
        let s = match limit {
            Limit::Edge(s) => s,
            _ => return None,
        };
        let opposite = self.mesh.lnext(e);
        if s.canonical() == opposite.canonical() || self.mesh.refine_failed(s) {
            return None;
        }

        let mesh = &self.mesh;
        let b = mesh.org_pos(e);
        let c = mesh.dest_pos(e);
        let a = mesh.dest_pos(opposite);
        let (s0, s1) = (mesh.org_pos(s), mesh.dest_pos(s));
        let length = s0.distance(s1);
        if length <= 0.0 {
            return None;
        }
        let margin = self.config.merge_point_distance / length;
        let (ta, tc) = (project_parameter(a, s0, s1), project_parameter(c, s0, s1));
        let (t_lo, t_hi) = (ta.min(tc), ta.max(tc));
        let side_b = orient2d(s0, s1, b).signum();
        let side_ac = orient2d(a, c, b).signum();

        let candidates = self.region_vertices(opposite.sym(), a, c, s0, s1);
        let mut best: Option<(f64, f64, VertexId)> = None;
        for v in candidates {
            let mesh = &self.mesh;
            let p = mesh.position(v);
            if orient2d(a, c, p).signum() != -side_ac || orient2d(s0, s1, p).signum() != side_b {
                continue;
            }
            let t = project_parameter(p, s0, s1);
            if t <= margin || t >= 1.0 - margin || t <= t_lo || t >= t_hi {
                continue;
            }
            let d = distance_point_segment(p, s0, s1);
            if d >= reach || d >= p.distance(b) {
                continue;
            }
            let better = match best {
                None => true,
                Some((bd, bt, _)) => d < bd || (d == bd && t < bt),
            };
            if better {
                best = Some((d, t, v));
            }
        }

        best.map(|(_, t, vertex)| Disturbance {
            edge: s,
            vertex,
            reference: s0.lerp(s1, t),
        })
    }

    /// Vertices reachable from the left triangle of `start` without crossing a
    /// constraint, limited to the circle around `a`, `c` and their projections
    /// onto `s0 s1`
    fn region_vertices(
        &mut self,
        start: EdgeId,
        a: Vec2,
        c: Vec2,
        s0: Vec2,
        s1: Vec2,
    ) -> Vec<VertexId> {
        let project = |p: Vec2| s0.lerp(s1, project_parameter(p, s0, s1).clamp(0.0, 1.0));
        let hull = [a, c, project(a), project(c)];
        let center = hull.iter().fold(Vec2::ZERO, |acc, &p| acc + p) / 4.0;
        let radius = hull
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0_f64, f64::max);

        let mut found = Vec::new();
        if self.mesh.is_exterior(start) {
            return found;
        }
        let mark = self.mesh.next_mark();
        for edge in [start, self.mesh.lnext(start), self.mesh.lprev(start)] {
            self.mesh.mark_quad(edge, mark);
        }
        let mut queue = VecDeque::from([self.mesh.lnext(start), self.mesh.lprev(start)]);
        let apex = self.mesh.apex(start);
        if self.mesh.mark_vertex(apex, mark) {
            found.push(apex);
        }

        while let Some(f) = queue.pop_front() {
            let mesh = &self.mesh;
            if mesh.is_constrained(f)
                || distance_point_segment(center, mesh.org_pos(f), mesh.dest_pos(f)) >= radius
            {
                continue;
            }
            let g = f.sym();
            let w = mesh.apex(g);
            if self.mesh.mark_vertex(w, mark) {
                found.push(w);
            }
            for h in [self.mesh.lnext(g), self.mesh.lprev(g)] {
                if self.mesh.mark_quad(h, mark) {
                    queue.push_back(h);
                }
            }
        }
        found
    }

    /// First disturbance among the corners of the triangles around `v` and
    /// its neighbours
    pub(crate) fn find_disturbance_around(&mut self, v: VertexId) -> Option<Disturbance> {
        let mut hubs = vec![v];
        hubs.extend(self.mesh.ring(v).map(|e| self.mesh.dest(e)));

        let mut seen = HashSet::new();
        let mut corners = Vec::new();
        for hub in hubs {
            for e in self.mesh.ring(hub) {
                if self.mesh.is_exterior(e) || !seen.insert(self.mesh.tri(e)) {
                    continue;
                }
                let e1 = self.mesh.lnext(e);
                corners.extend([e, e1, self.mesh.lnext(e1)]);
            }
        }
        corners.into_iter().find_map(|e| self.check_traversal(e))
    }

    /// Splits the disturbed constraint, trying positions closer to its
    /// midpoint when the first one is rejected
    pub(crate) fn resolve(&mut self, d: Disturbance) -> Option<VertexId> {
        let s = d.edge;
        let (s0, s1) = (self.mesh.org_pos(s), self.mesh.dest_pos(s));
        let t = project_parameter(d.reference, s0, s1);
        let retries = self.config.refinement_retries;

        for k in 0..=retries {
            let tk = if retries == 0 {
                t
            } else {
                t + (0.5 - t) * k as f64 / retries as f64
            };
            let p = s0.lerp(s1, tk);
            if self.valid_split(s, p) {
                let v = self.split_edge_at(s, p);
                self.mesh.vertex_mut(v).steiner = true;
                log::debug!(
                    "refinement split constraint at ({:.4}, {:.4}) for vertex {:?}",
                    p.x,
                    p.y,
                    d.vertex
                );
                return Some(v);
            }
        }

        self.mesh.set_refine_failed(s, true);
        self.refine_failures += 1;
        log::warn!(
            "refinement could not split constraint ({:.4}, {:.4}) -> ({:.4}, {:.4}), skipping it",
            s0.x,
            s0.y,
            s1.x,
            s1.y
        );
        None
    }

    /// The four triangles created by splitting `s` at `p` are strictly
    /// counter-clockwise and `p` keeps its distance to every vertex
    fn valid_split(&self, s: EdgeId, p: Vec2) -> bool {
        if self.index.find_within(p, self.config.merge_point_distance).is_some() {
            return false;
        }
        let mesh = &self.mesh;
        let (a, b) = (mesh.org_pos(s), mesh.dest_pos(s));
        [s, s.sym()].into_iter().all(|side| {
            if mesh.is_exterior(side) {
                return true;
            }
            let apex = mesh.position(mesh.apex(side));
            let (o, d) = if side == s { (a, b) } else { (b, a) };
            orient2d(o, p, apex) > 0.0 && orient2d(p, d, apex) > 0.0
        })
    }

    /// Resolves disturbances reachable from `seeds` until none remain
    pub(crate) fn refine<I>(&mut self, seeds: I)
    where
        I: IntoIterator<Item = VertexId>,
    {
        let mut queue = VecDeque::new();
        let mut queued = HashSet::new();
        for v in seeds {
            if queued.insert(v) {
                queue.push_back(v);
            }
        }

        while let Some(v) = queue.pop_front() {
            queued.remove(&v);
            if !self.mesh.contains_vertex(v) {
                continue;
            }
            let Some(disturbance) = self.find_disturbance_around(v) else {
                continue;
            };
            if self.refinements >= self.config.max_refinements {
                log::warn!(
                    "refinement budget of {} insertions exhausted, clearance may be optimistic",
                    self.config.max_refinements
                );
                break;
            }

            let mut next = vec![v];
            if let Some(w) = self.resolve(disturbance) {
                self.refinements += 1;
                next.push(w);
                next.extend(self.mesh.ring(w).map(|e| self.mesh.dest(e)));
            }
            for u in next {
                if queued.insert(u) {
                    queue.push_back(u);
                }
            }
        }
    }

    /// Refinement seeded by every vertex of the mesh, repeated until a pass
    /// inserts nothing
    pub(crate) fn global_refine(&mut self) {
        loop {
            let before = self.refinements;
            let seeds: Vec<VertexId> = self.mesh.vertices().map(|(v, _)| v).collect();
            self.refine(seeds);
            if self.refinements == before || self.refinements >= self.config.max_refinements {
                break;
            }
        }
    }

    /// Vertices of the triangles that a new constraint can disturb.
    ///
    /// Starting from the faces of each new constrained edge, spreads across
    /// unconstrained edges that come closer to the constraint than the longer
    /// of the two triangles' longest edges.
    pub(crate) fn propagate(&self, constraints: &[EdgeId]) -> Vec<VertexId> {
        let mesh = &self.mesh;
        let mut seeds = Vec::new();
        let mut seen_vertices = HashSet::new();

        for &s in constraints {
            if !mesh.is_alive(s) {
                continue;
            }
            let (s0, s1) = (mesh.org_pos(s), mesh.dest_pos(s));
            let mut visited = HashSet::new();
            let mut queue: VecDeque<EdgeId> = [s, s.sym()]
                .into_iter()
                .filter(|&e| !mesh.is_exterior(e))
                .collect();

            while let Some(e) = queue.pop_front() {
                if !visited.insert(mesh.tri(e)) {
                    continue;
                }
                let e1 = mesh.lnext(e);
                let e2 = mesh.lnext(e1);
                let longest = self.longest_edge(e);
                for f in [e, e1, e2] {
                    let v = mesh.org(f);
                    if seen_vertices.insert(v) {
                        seeds.push(v);
                    }
                    let g = f.sym();
                    if mesh.is_constrained(f)
                        || mesh.is_exterior(g)
                        || visited.contains(&mesh.tri(g))
                    {
                        continue;
                    }
                    let reach = longest.max(self.longest_edge(g));
                    if distance_segment_segment(s0, s1, mesh.org_pos(f), mesh.dest_pos(f)) < reach {
                        queue.push_back(g);
                    }
                }
            }
        }
        seeds
    }

    fn longest_edge(&self, e: EdgeId) -> f64 {
        let e1 = self.mesh.lnext(e);
        let e2 = self.mesh.lnext(e1);
        self.mesh
            .length(e)
            .max(self.mesh.length(e1))
            .max(self.mesh.length(e2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavmeshConfig;
    use crate::insert::Tag;

    const WALL: Tag = Tag {
        constraint: Some(1),
        fixed: false,
    };

    fn domain() -> Triangulation {
        Triangulation::new(NavmeshConfig::new(Vec2::new(-20.0, -20.0), Vec2::new(20.0, 20.0)))
    }

    fn interior_corners(tri: &Triangulation) -> Vec<EdgeId> {
        tri.mesh
            .edges()
            .flat_map(|e| [e, e.sym()])
            .filter(|&e| !tri.mesh.is_exterior(e))
            .collect()
    }

    /// Long wall under a triangle `(-3, 2) (3, 2) (0, 5)`, with a vertex at
    /// `(2.9, 0.5)` just outside its circumcircle
    fn wall_scene() -> Triangulation {
        let mut tri = domain();
        tri.insert_polyline(&[Vec2::new(-15.0, 0.0), Vec2::new(15.0, 0.0)], WALL);
        for p in [
            Vec2::new(-3.0, 2.0),
            Vec2::new(3.0, 2.0),
            Vec2::new(0.0, 5.0),
            Vec2::new(2.9, 0.5),
        ] {
            tri.insert_point(p);
        }
        tri
    }

    fn vertex_at(tri: &Triangulation, p: Vec2) -> VertexId {
        tri.index.find_within(p, 1e-9).unwrap()
    }

    fn on_obstacle(p: Vec2) -> bool {
        let on_wall = p.y.abs() < 1e-9 && p.x.abs() <= 15.0;
        let on_boundary = (p.x.abs() - 20.0).abs() < 1e-9 || (p.y.abs() - 20.0).abs() < 1e-9;
        on_wall || on_boundary
    }

    #[test]
    fn test_hidden_vertex_disturbs_corner() {
        let mut tri = wall_scene();
        let a = vertex_at(&tri, Vec2::new(-3.0, 2.0));
        let b = vertex_at(&tri, Vec2::new(0.0, 5.0));
        let c = vertex_at(&tri, Vec2::new(3.0, 2.0));
        let v = vertex_at(&tri, Vec2::new(2.9, 0.5));

        let e = tri.mesh.find_edge(b, a).unwrap();
        assert_eq!(tri.mesh.apex(e), c);

        // The edges bound the clearance, the wall 5 below bounds the sector
        let (clearance, _) = tri.compute_corner_clearance(e);
        assert!((clearance - 18.0_f64.sqrt()).abs() < 1e-9);
        let (reach, limit) = tri.sector_limit(e);
        assert!((reach - 5.0).abs() < 1e-9);
        assert!(matches!(limit, Limit::Edge(s) if tri.mesh.has_constraint(s, 1)));

        let d = tri.check_traversal(e).unwrap();
        assert_eq!(d.vertex, v);
        assert!(d.reference.distance(Vec2::new(2.9, 0.0)) < 1e-9);
        assert!(tri.mesh.has_constraint(d.edge, 1));
    }

    #[test]
    fn test_split_joins_hidden_vertex_to_wall() {
        let mut tri = wall_scene();
        let b = vertex_at(&tri, Vec2::new(0.0, 5.0));
        let a = vertex_at(&tri, Vec2::new(-3.0, 2.0));
        let v = vertex_at(&tri, Vec2::new(2.9, 0.5));
        let e = tri.mesh.find_edge(b, a).unwrap();

        let d = tri.check_traversal(e).unwrap();
        let w = tri.resolve(d).unwrap();

        // The gap between the vertex and the wall is now an edge of its own
        let joined = tri.mesh.find_edge(v, w).unwrap();
        assert!((tri.mesh.length(joined) - 0.5).abs() < 1e-9);
        assert!(!tri.mesh.is_constrained(joined));
        assert!(tri.check_traversal(joined).is_none());
        assert!(tri.check_traversal(joined.sym()).is_none());
    }

    fn wall_edge(tri: &Triangulation) -> EdgeId {
        tri.mesh
            .edges()
            .find(|&e| tri.mesh.has_constraint(e, 1))
            .unwrap()
    }

    #[test]
    fn test_refinement_settles() {
        let mut tri = wall_scene();
        tri.global_refine();
        assert!(tri.refinements >= 1);
        let remaining = interior_corners(&tri)
            .into_iter()
            .filter(|&e| tri.check_traversal(e).is_some())
            .count();
        assert_eq!(remaining, 0);

        let steiner: Vec<Vec2> = tri
            .mesh
            .vertices()
            .filter(|(_, v)| v.is_steiner())
            .map(|(_, v)| v.position())
            .collect();
        assert_eq!(steiner.len(), tri.refinements);
        assert!(steiner.into_iter().all(on_obstacle));
    }

    #[test]
    fn test_resolve_splits_at_reference() {
        let mut tri = domain();
        tri.insert_polyline(&[Vec2::new(-15.0, 0.0), Vec2::new(15.0, 0.0)], WALL);
        let v = tri.insert_point(Vec2::new(2.0, 3.0));
        let wall = wall_edge(&tri);
        let before = tri.mesh.vertex_count();

        let w = tri
            .resolve(Disturbance {
                edge: wall,
                vertex: v,
                reference: Vec2::new(2.0, 0.0),
            })
            .unwrap();
        assert_eq!(tri.mesh.position(w), Vec2::new(2.0, 0.0));
        assert!(tri.mesh.vertex(w).is_steiner());
        assert_eq!(tri.mesh.vertex_count(), before + 1);
        let pieces = tri
            .mesh
            .ring(w)
            .filter(|&e| tri.mesh.has_constraint(e, 1))
            .count();
        assert_eq!(pieces, 2);
    }

    #[test]
    fn test_failed_split_is_flagged() {
        let mut tri = domain();
        tri.insert_polyline(&[Vec2::new(-15.0, 0.0), Vec2::new(15.0, 0.0)], WALL);
        let v = tri.insert_point(Vec2::new(2.0, 3.0));
        let wall = wall_edge(&tri);
        let (s0, s1) = (tri.mesh.org_pos(wall), tri.mesh.dest_pos(wall));

        // Every candidate position merges with an existing vertex
        tri.config.merge_point_distance = 100.0;
        let d = Disturbance {
            edge: wall,
            vertex: v,
            reference: Vec2::new(2.0, 0.0),
        };
        assert!(tri.resolve(d).is_none());
        assert!(tri.mesh.refine_failed(wall));
        assert_eq!(tri.refine_failures, 1);
        assert_eq!(tri.mesh.org_pos(wall), s0);
        assert_eq!(tri.mesh.dest_pos(wall), s1);
    }

    #[test]
    fn test_propagation_reaches_neighbourhood() {
        let mut tri = domain();
        let mut rng = fastrand::Rng::with_seed(21);
        for _ in 0..60 {
            tri.insert_point(Vec2::new(rng.f64() * 36.0 - 18.0, rng.f64() * 36.0 - 18.0));
        }
        tri.new_constraints.clear();
        let line = tri.insert_polyline(&[Vec2::new(-5.0, 0.5), Vec2::new(5.0, 0.5)], WALL);
        let new_constraints = tri.new_constraints.clone();
        assert!(!new_constraints.is_empty());

        let seeds = tri.propagate(&new_constraints);
        assert!(seeds.contains(&line[0]));
        assert!(seeds.contains(&line[1]));
        let unique: HashSet<_> = seeds.iter().collect();
        assert_eq!(unique.len(), seeds.len());
    }
}
