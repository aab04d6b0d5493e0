//! Constraint and vertex removal

use crate::edge_search::find_edge_path;
use crate::quad_edge::{EdgeId, VertexId};
use crate::triangulation::Triangulation;
use crate::{Fault, LoopGuard};
use clearway_common::{distance_point_line, orient2d, point_in_triangle};
use smallvec::SmallVec;

impl Triangulation {
    /// Strips constraint `id` from the chains realising the polyline `vertices`.
    ///
    /// Returns every vertex on the stripped chains, the candidates for removal
    /// once all obstacles of the cycle are gone, and the stripped edges.
    pub(crate) fn strip_constraint(
        &mut self,
        id: u32,
        vertices: &[VertexId],
    ) -> (Vec<VertexId>, Vec<EdgeId>) {
        let mut affected: Vec<VertexId> = vertices.to_vec();
        let mut stripped = Vec::new();
        let mut complete = true;

        for pair in vertices.windows(2) {
            let chain = find_edge_path(
                &self.mesh,
                pair[0],
                pair[1],
                self.config.max_edge_search_iterations,
                |mesh, e| mesh.has_constraint(e, id),
            );
            match chain {
                Some(chain) => {
                    for e in chain {
                        self.mesh.remove_constraint(e, id);
                        affected.push(self.mesh.dest(e));
                        stripped.push(e);
                    }
                }
                None => complete = false,
            }
        }

        if !complete {
            // Self-overlapping polylines can share chains with earlier segments
            let leftover: Vec<EdgeId> = self
                .mesh
                .edges()
                .filter(|&e| self.mesh.has_constraint(e, id))
                .collect();
            if !leftover.is_empty() {
                log::warn!(
                    "constraint {} left {} edges outside its chains, stripping them directly",
                    id,
                    leftover.len()
                );
            }
            for e in leftover {
                self.mesh.remove_constraint(e, id);
                affected.push(self.mesh.org(e));
                affected.push(self.mesh.dest(e));
                stripped.push(e);
            }
        }
        (affected, stripped)
    }

    /// Removes `v` if nothing pins it any more.
    ///
    /// Unconstrained vertices are deleted and their hole re-triangulated.
    /// Vertices between two collinear constrained edges with identical
    /// constraint data are dissolved into a single edge. Corners, point
    /// obstacles and junctions stay.
    pub(crate) fn try_remove_vertex(&mut self, v: VertexId) -> bool {
        if !self.mesh.contains_vertex(v) {
            return false;
        }
        let vertex = self.mesh.vertex(v);
        if vertex.corner || vertex.point_constraints > 0 {
            return false;
        }

        let constrained: SmallVec<[EdgeId; 4]> = self
            .mesh
            .ring(v)
            .filter(|&e| self.mesh.is_constrained(e))
            .collect();
        match constrained.as_slice() {
            [] => {
                self.remove_free_vertex(v);
                true
            }
            [e0, e1] if self.is_collinear_pass(v, *e0, *e1) => {
                self.dissolve_vertex(v, *e0, *e1);
                true
            }
            _ => false,
        }
    }

    fn is_collinear_pass(&self, v: VertexId, e0: EdgeId, e1: EdgeId) -> bool {
        let mesh = &self.mesh;
        if !mesh.same_constraints(e0, e1) {
            return false;
        }
        let p = mesh.position(v);
        let x = mesh.dest_pos(e0);
        let y = mesh.dest_pos(e1);
        (x - p).dot(y - p) < 0.0 && distance_point_line(p, x, y) <= self.config.collinear_margin
    }

    fn remove_free_vertex(&mut self, v: VertexId) {
        let spokes: Vec<EdgeId> = self.mesh.ring(v).collect();
        let hole = self.mesh.lnext(spokes[0]);
        self.index.remove(v, self.mesh.position(v));
        for s in spokes {
            self.mesh.delete_edge(s);
        }
        self.mesh.remove_vertex(v);
        self.fill_hole(hole);
    }

    /// Removes `v` lying between `v -> x` (`e0`) and `v -> y` (`e1`)
    fn dissolve_vertex(&mut self, v: VertexId, e0: EdgeId, e1: EdgeId) {
        let spokes: Vec<EdgeId> = self
            .mesh
            .ring(v)
            .filter(|&e| e != e0 && e != e1)
            .collect();
        self.index.remove(v, self.mesh.position(v));
        for s in spokes {
            self.mesh.delete_edge(s);
        }

        let edge = e0.sym();
        self.mesh.unsplit_edge(edge, e1);
        self.mesh.remove_vertex(v);
        self.touched.push(self.mesh.org(edge));
        self.touched.push(self.mesh.dest(edge));

        for side in [edge, edge.sym()] {
            if !self.mesh.is_exterior(side) {
                self.fill_hole(side);
            }
        }
    }

    /// Triangulates the polygonal left face of `e` by ear clipping, then
    /// legalises the result.
    fn fill_hole(&mut self, e: EdgeId) {
        let mut boundary = vec![e];
        let mut f = self.mesh.lnext(e);
        while f != e {
            boundary.push(f);
            f = self.mesh.lnext(f);
        }
        for &b in &boundary {
            self.touched.push(self.mesh.org(b));
        }

        let mut created = Vec::new();
        let mut current = e;
        let mut remaining = boundary.len();
        let mut guard = LoopGuard::new(remaining * remaining + 8, Fault::HoleBudget);

        while remaining > 3 {
            let mut cur = current;
            let mut clipped = false;
            for _ in 0..remaining {
                guard.tick();
                let next = self.mesh.lnext(cur);
                if self.is_ear(cur, next) {
                    let diagonal = self.mesh.connect(next, cur);
                    self.mesh.retag_face(diagonal);
                    created.push(diagonal);
                    current = diagonal.sym();
                    remaining -= 1;
                    clipped = true;
                    break;
                }
                cur = next;
            }
            assert!(clipped, "hole polygon has no ear");
        }
        self.mesh.retag_face(current);

        created.extend(boundary);
        self.legalize(created);
    }

    /// `cur` and `next` are consecutive boundary edges of the face; the ear is
    /// the triangle `org(cur), dest(cur), dest(next)`.
    fn is_ear(&self, cur: EdgeId, next: EdgeId) -> bool {
        let mesh = &self.mesh;
        let (ia, ib, ic) = (mesh.org(cur), mesh.dest(cur), mesh.dest(next));
        let (a, b, c) = (mesh.position(ia), mesh.position(ib), mesh.position(ic));
        if orient2d(a, b, c) <= 0.0 {
            return false;
        }

        let mut f = mesh.lnext(next);
        while f != cur {
            let w = mesh.org(f);
            if w != ia && w != ib && w != ic && point_in_triangle(mesh.position(w), a, b, c) {
                return false;
            }
            f = mesh.lnext(f);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::config::NavmeshConfig;
    use crate::insert::Tag;
    use crate::triangulation::Triangulation;
    use clearway_common::Vec2;

    fn square() -> Triangulation {
        Triangulation::new(NavmeshConfig::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0)))
    }

    #[test]
    fn test_remove_free_vertices() {
        let mut tri = square();
        let mut rng = fastrand::Rng::with_seed(5);
        let vertices: Vec<_> = (0..50)
            .map(|_| tri.insert_point(Vec2::new(rng.f64() * 16.0 - 8.0, rng.f64() * 16.0 - 8.0)))
            .collect();
        for v in vertices {
            assert!(tri.try_remove_vertex(v));
        }
        assert_eq!(tri.mesh.vertex_count(), 4);
        assert_eq!(tri.mesh.edge_count(), 5);
        assert_eq!(tri.mesh.triangles().count(), 2);
        assert_eq!(tri.index.len(), 4);
    }

    #[test]
    fn test_strip_and_dissolve() {
        let mut tri = square();
        let tag = Tag {
            constraint: Some(3),
            fixed: false,
        };
        let line = tri.insert_polyline(&[Vec2::new(-5.0, 1.0), Vec2::new(5.0, 1.0)], tag);
        // A vertex dropped on the constraint splits it
        let mid = tri.insert_point(Vec2::new(0.0, 1.0));
        assert!(!tri.try_remove_vertex(line[0]));

        // Endpoints are pinned by their single constrained edge; the midpoint dissolves
        assert!(tri.try_remove_vertex(mid));
        let edge = tri.mesh.find_edge(line[0], line[1]).unwrap();
        assert_eq!(tri.mesh.constraints(edge), &[3]);

        let (affected, stripped) = tri.strip_constraint(3, &line);
        assert!(affected.contains(&line[0]));
        assert_eq!(stripped, vec![edge]);
        assert!(!tri.mesh.is_constrained(edge));
        for v in affected {
            tri.try_remove_vertex(v);
        }
        assert_eq!(tri.mesh.vertex_count(), 4);
        assert_eq!(tri.mesh.edge_count(), 5);
    }

    #[test]
    fn test_boundary_vertex_dissolves() {
        let mut tri = square();
        let v = tri.insert_point(Vec2::new(2.0, -10.0));
        assert_eq!(tri.mesh.vertex_count(), 5);
        assert!(tri.try_remove_vertex(v));
        assert_eq!(tri.mesh.vertex_count(), 4);
        assert_eq!(tri.mesh.edge_count(), 5);
        assert_eq!(tri.mesh.triangles().count(), 2);
        assert_eq!(tri.mesh.edges().filter(|&e| tri.mesh.is_fixed(e)).count(), 4);
    }
}
