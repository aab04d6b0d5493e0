//! Triangulation state and point location

use crate::config::NavmeshConfig;
use crate::quad_edge::{EdgeId, Mesh, VertexId};
use crate::quadtree::{Aabb, QuadTree};
use crate::{Fault, LoopGuard};
use clearway_common::{distance_point_line, orient2d, Vec2};

/// Result of locating a point in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The point coincides with a vertex (within the merge distance)
    Vertex(VertexId),
    /// The point lies on this edge (within the collinear margin); the left
    /// face of the edge is a triangle
    Edge(EdgeId),
    /// The point lies strictly inside the left triangle of this edge
    Face(EdgeId),
}

/// Non-generic triangulation engine shared by insertion, removal and refinement
#[derive(Debug, Clone)]
pub(crate) struct Triangulation {
    pub(crate) config: NavmeshConfig,
    pub(crate) mesh: Mesh,
    pub(crate) index: QuadTree,
    /// Vertices created or whose neighbourhood changed during the current cycle
    pub(crate) touched: Vec<VertexId>,
    /// Constrained edges created during the current cycle
    pub(crate) new_constraints: Vec<EdgeId>,
    pub(crate) refinements: usize,
    pub(crate) refine_failures: usize,
}

impl Triangulation {
    /// Builds the bootstrap rectangle. `config` must already be validated.
    pub(crate) fn new(config: NavmeshConfig) -> Self {
        let mut mesh = Mesh::with_capacity(config.expected_vertices);
        let mut index = QuadTree::new(
            Aabb::new(config.min, config.max),
            config.quadtree_bucket_size,
            config.quadtree_max_depth,
        );
        for v in mesh.bootstrap(config.min, config.max) {
            index.insert(v, mesh.position(v));
        }
        Self {
            config,
            mesh,
            index,
            touched: Vec::new(),
            new_constraints: Vec::new(),
            refinements: 0,
            refine_failures: 0,
        }
    }

    /// Starts an edit cycle
    pub(crate) fn begin_cycle(&mut self) {
        self.mesh.begin_cycle();
        self.touched.clear();
        self.new_constraints.clear();
        self.refinements = 0;
        self.refine_failures = 0;
        let edges: Vec<_> = self.mesh.edges().collect();
        for e in edges {
            self.mesh.set_refine_failed(e, false);
        }
    }

    pub(crate) fn clamp(&self, p: Vec2) -> Vec2 {
        p.clamp(self.config.min, self.config.max)
    }

    pub(crate) fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.config.min.x
            && p.y >= self.config.min.y
            && p.x <= self.config.max.x
            && p.y <= self.config.max.y
    }

    /// Interior edge of the vertex closest to `p`, used as the walk start
    fn start_edge(&self, p: Vec2) -> EdgeId {
        let edge = self
            .index
            .nearest(p)
            .and_then(|v| self.mesh.interior_edge(v))
            .or_else(|| self.mesh.triangles().next());
        match edge {
            Some(e) => e,
            None => panic!("triangulation has no interior face"),
        }
    }

    /// Locates `p`, which must lie inside the domain.
    ///
    /// Visibility walk over triangles; the order in which the three edges are
    /// tested is shuffled with a generator seeded from `p`, which keeps the
    /// walk deterministic while avoiding cycles in constrained meshes.
    pub(crate) fn locate(&self, p: Vec2) -> Location {
        let mesh = &self.mesh;
        let mut e = self.start_edge(p);
        let mut rng = fastrand::Rng::with_seed(p.x.to_bits() ^ p.y.to_bits().rotate_left(29));
        let mut guard = LoopGuard::new(self.config.max_walk_iterations, Fault::WalkBudget);

        'walk: loop {
            guard.tick();
            let edges = [e, mesh.lnext(e), mesh.lprev(e)];
            let offset = rng.usize(0..3);
            for i in 0..3 {
                let f = edges[(i + offset) % 3];
                if orient2d(mesh.org_pos(f), mesh.dest_pos(f), p) < 0.0
                    && !mesh.is_exterior(f.sym())
                {
                    e = f.sym();
                    continue 'walk;
                }
            }
            return self.classify(e, p);
        }
    }

    /// Classifies `p` against the left triangle of `e`, which contains it
    fn classify(&self, e: EdgeId, p: Vec2) -> Location {
        let mesh = &self.mesh;
        let edges = [e, mesh.lnext(e), mesh.lprev(e)];

        let closest = edges
            .iter()
            .map(|&f| (mesh.org(f), mesh.org_pos(f).distance(p)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((v, d)) = closest {
            if d <= self.config.merge_point_distance {
                return Location::Vertex(v);
            }
        }

        for f in edges {
            let (a, b) = (mesh.org_pos(f), mesh.dest_pos(f));
            if orient2d(a, b, p) == 0.0
                || distance_point_line(p, a, b) <= self.config.collinear_margin
            {
                return Location::Edge(f);
            }
        }
        Location::Face(e)
    }

    /// Edge whose left triangle contains `p`, or `None` outside the domain
    pub(crate) fn locate_triangle(&self, p: Vec2) -> Option<EdgeId> {
        if !self.contains_point(p) {
            return None;
        }
        match self.locate(p) {
            Location::Vertex(v) => self.mesh.interior_edge(v),
            Location::Edge(e) | Location::Face(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_in_bootstrap() {
        let config = NavmeshConfig::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        let tri = Triangulation::new(config);

        match tri.locate(Vec2::new(7.0, 2.0)) {
            Location::Face(e) => {
                let mesh = &tri.mesh;
                let (a, b, c) = (
                    mesh.org_pos(e),
                    mesh.dest_pos(e),
                    mesh.position(mesh.apex(e)),
                );
                assert!(clearway_common::point_in_triangle(Vec2::new(7.0, 2.0), a, b, c));
            }
            other => panic!("unexpected location {other:?}"),
        }

        let origin = tri.index.nearest(Vec2::ZERO);
        assert_eq!(Some(tri.locate(Vec2::new(0.0, 0.0))), origin.map(Location::Vertex));
        assert!(matches!(tri.locate(Vec2::new(5.0, 5.0)), Location::Edge(_)));
        assert!(matches!(tri.locate(Vec2::new(5.0, 0.0)), Location::Edge(_)));
        assert!(tri.locate_triangle(Vec2::new(11.0, 0.0)).is_none());
        assert!(tri.locate_triangle(Vec2::new(3.0, 9.0)).is_some());
    }
}
