//! Corner clearance
//!
//! A disc crossing a triangle enters through one edge and leaves through
//! another; the two edges meet at a corner `b`. The widest disc that can make
//! that traversal is bounded by the two edges incident to `b` and by the
//! nearest obstacle beyond the opposite edge inside the wedge at `b`.
//! Disturbance detection uses the same search without the edge bound.
//!
//! Slot `e` of the mesh caches the clearance of the corner at `org(e)` in the
//! left triangle of `e`. Entering that triangle through `e`, `org(e)` is on
//! the traveller's left, so [`Triangulation::clearance_left`] reads slot `e`
//! and [`Triangulation::clearance_right`] reads slot `lnext(e)`.

use crate::quad_edge::{EdgeId, VertexId};
use crate::triangulation::Triangulation;
use clearway_common::{clip_segment_to_wedge, distance_point_segment, Vec2};
use std::collections::VecDeque;

/// What bounds the clearance of a corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Only the triangle's own edges
    None,
    /// A constrained edge; its left face is on the corner's side
    Edge(EdgeId),
    /// An obstacle vertex inside the wedge
    Point(VertexId),
}

impl Triangulation {
    /// Clearance of the corner at `org(e)` in the left triangle of `e`
    pub(crate) fn compute_corner_clearance(&mut self, e: EdgeId) -> (f64, Limit) {
        let b = self.mesh.org_pos(e);
        let bound = b
            .distance(self.mesh.dest_pos(e))
            .min(b.distance(self.mesh.position(self.mesh.apex(e))));
        self.search_corner(e, bound)
    }

    /// Nearest obstacle in the sector of the corner at `org(e)`, ignoring the
    /// lengths of the triangle's edges
    pub(crate) fn sector_limit(&mut self, e: EdgeId) -> (f64, Limit) {
        self.search_corner(e, f64::INFINITY)
    }

    /// Breadth-first search across unconstrained edges inside the wedge at
    /// `org(e)`, expanding only edges closer than the best distance so far
    fn search_corner(&mut self, e: EdgeId, bound: f64) -> (f64, Limit) {
        let mesh = &self.mesh;
        let b = mesh.org_pos(e);
        let c = mesh.dest_pos(e);
        let opposite = mesh.lnext(e);
        let a = mesh.dest_pos(opposite);

        let mut best = bound;
        let mut limit = Limit::None;

        let mark = self.mesh.next_mark();
        for edge in [e, opposite, self.mesh.lprev(e)] {
            self.mesh.mark_quad(edge, mark);
        }
        let mut queue = VecDeque::from([opposite]);

        while let Some(f) = queue.pop_front() {
            let mesh = &self.mesh;
            let (p, q) = (mesh.org_pos(f), mesh.dest_pos(f));
            let Some((p, q)) = clip_segment_to_wedge(b, a, c, p, q) else {
                continue;
            };
            let d = distance_point_segment(b, p, q);
            if d >= best {
                continue;
            }
            if mesh.is_constrained(f) {
                best = d;
                limit = Limit::Edge(f);
                continue;
            }

            let g = f.sym();
            let w = mesh.apex(g);
            let pw = mesh.position(w);
            let dw = b.distance(pw);
            if dw < best && self.is_obstacle_vertex(w) && in_wedge(b, a, c, pw) {
                best = dw;
                limit = Limit::Point(w);
            }

            for h in [self.mesh.lnext(g), self.mesh.lprev(g)] {
                if self.mesh.mark_quad(h, mark) {
                    queue.push_back(h);
                }
            }
        }
        (best, limit)
    }

    /// Point obstacles and endpoints of constrained edges
    pub(crate) fn is_obstacle_vertex(&self, v: VertexId) -> bool {
        self.mesh.vertex(v).point_constraints > 0
            || self.mesh.ring(v).any(|e| self.mesh.is_constrained(e))
    }

    /// Refreshes the cached clearance of every interior corner
    pub(crate) fn recompute_clearances(&mut self) {
        let slots: Vec<EdgeId> = self.mesh.edges().flat_map(|e| [e, e.sym()]).collect();
        for e in slots {
            let value = if self.mesh.is_exterior(e) {
                0.0
            } else {
                self.compute_corner_clearance(e).0
            };
            self.mesh.set_corner_clearance(e, value);
        }
    }

    /// Diameter of the widest disc entering the left triangle of `e` through
    /// `e` and turning around `org(e)`
    pub(crate) fn clearance_left(&self, e: EdgeId) -> f64 {
        self.mesh.corner_clearance(e)
    }

    /// Diameter of the widest disc entering the left triangle of `e` through
    /// `e` and turning around `dest(e)`
    pub(crate) fn clearance_right(&self, e: EdgeId) -> f64 {
        self.mesh.corner_clearance(self.mesh.lnext(e))
    }
}

fn in_wedge(apex: Vec2, ra: Vec2, rc: Vec2, p: Vec2) -> bool {
    clip_segment_to_wedge(apex, ra, rc, p, p).is_some()
}
