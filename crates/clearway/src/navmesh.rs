//! Dynamic navigation mesh
//!
//! [`Navmesh`] owns the triangulation and the obstacle registry, and runs edit
//! cycles: removals, insertions, disturbance refinement and the clearance
//! refresh. Between cycles the mesh is immutable and every query takes `&self`.

use crate::config::NavmeshConfig;
use crate::insert::Tag;
use crate::operation::Operation;
use crate::quad_edge::{EdgeId, Mesh, RingIter, VertexId};
use crate::triangulation::{Location, Triangulation};
use crate::ObstacleKey;
use clearway_common::{in_circle, orient2d, Error, Result, Vec2};
use std::collections::{BTreeMap, HashSet};

/// Registered removable obstacle
#[derive(Debug, Clone)]
struct Obstacle {
    /// Internal constraint id written onto the obstacle's edges
    cid: u32,
    /// Distinct polyline vertices in order; a single vertex is a point obstacle
    vertices: Vec<VertexId>,
}

/// Dynamic clearance-aware navigation mesh
///
/// Obstacles are identified by an opaque key `K`. Edits happen in cycles
/// through [`Navmesh::load`] and [`Navmesh::update`]; each cycle records the
/// ids of the triangles it invalidated.
#[derive(Debug, Clone)]
pub struct Navmesh<K: ObstacleKey> {
    pub(crate) tri: Triangulation,
    obstacles: BTreeMap<K, Obstacle>,
    /// Constraint id to obstacle key
    keys: BTreeMap<u32, K>,
    next_cid: u32,
    permanent_obstacles: usize,
    /// Update counter for change tracking
    update_counter: u64,
}

impl<K: ObstacleKey> Navmesh<K> {
    /// Creates a navmesh holding only the domain rectangle
    pub fn new(config: NavmeshConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;
        Ok(Self {
            tri: Triangulation::new(config),
            obstacles: BTreeMap::new(),
            keys: BTreeMap::new(),
            next_cid: 1,
            permanent_obstacles: 0,
            update_counter: 0,
        })
    }

    /// Rebuilds the mesh from scratch with `operations`
    ///
    /// Triangle ids restart, so any cached channel must be dropped.
    pub fn load(&mut self, operations: &[Operation<K>]) -> Result<()> {
        validate_operations(operations, |_| false)?;

        self.tri = Triangulation::new(self.tri.config.clone());
        self.obstacles.clear();
        self.keys.clear();
        self.next_cid = 1;
        self.permanent_obstacles = 0;
        self.tri.begin_cycle();

        for op in operations {
            self.insert_operation(op);
        }
        if self.tri.config.refine {
            self.tri.global_refine();
        }
        self.tri.recompute_clearances();
        self.update_counter += 1;

        log::info!(
            "Navmesh loaded (update {}, obstacles: {}, vertices: {}, triangles: {}, steiner: {})",
            self.update_counter,
            self.obstacles.len() + self.permanent_obstacles,
            self.tri.mesh.vertex_count(),
            self.triangle_count(),
            self.tri.refinements
        );
        Ok(())
    }

    /// Runs one edit cycle: removes `removals`, then inserts `operations`
    ///
    /// Every operation is validated before the mesh is touched. An id may be
    /// removed and re-inserted in the same cycle. Unknown removal ids are
    /// skipped with a warning.
    pub fn update(&mut self, operations: &[Operation<K>], removals: &[K]) -> Result<()> {
        validate_operations(operations, |id| {
            self.obstacles.contains_key(id) && !removals.contains(id)
        })?;

        self.tri.begin_cycle();

        let mut removed = 0;
        let mut candidates = Vec::new();
        let mut stripped = Vec::new();
        for id in removals {
            let Some(obstacle) = self.obstacles.remove(id) else {
                log::warn!("Cannot remove unknown obstacle {:?}, skipping", id);
                continue;
            };
            self.keys.remove(&obstacle.cid);
            removed += 1;

            if let [v] = obstacle.vertices[..] {
                let vertex = self.tri.mesh.vertex_mut(v);
                vertex.point_constraints = vertex.point_constraints.saturating_sub(1);
                candidates.push(v);
            } else {
                let (vertices, edges) = self.tri.strip_constraint(obstacle.cid, &obstacle.vertices);
                candidates.extend(vertices);
                stripped.extend(edges);
            }
        }
        if removed > 0 {
            self.remove_unpinned(candidates);
            self.tri.legalize(stripped);
        }

        for op in operations {
            self.insert_operation(op);
        }

        if self.tri.config.refine {
            if removed > 0 {
                self.tri.global_refine();
            } else {
                let new_constraints = std::mem::take(&mut self.tri.new_constraints);
                let mut seeds = std::mem::take(&mut self.tri.touched);
                seeds.extend(self.tri.propagate(&new_constraints));
                self.tri.refine(seeds);
            }
        }
        self.tri.recompute_clearances();
        self.update_counter += 1;

        log::info!(
            "Navmesh updated (update {}, inserted: {}, removed: {}, destroyed triangles: {}, steiner: {})",
            self.update_counter,
            operations.len(),
            removed,
            self.tri.mesh.destroyed().len(),
            self.tri.refinements
        );
        Ok(())
    }

    /// Removes the candidates and every Steiner vertex that no live obstacle
    /// references; refinement re-creates the Steiner vertices still needed
    fn remove_unpinned(&mut self, candidates: Vec<VertexId>) {
        let pinned: HashSet<VertexId> = self
            .obstacles
            .values()
            .flat_map(|o| o.vertices.iter().copied())
            .collect();
        let steiner: Vec<VertexId> = self
            .tri
            .mesh
            .vertices()
            .filter(|(_, v)| v.is_steiner())
            .map(|(v, _)| v)
            .collect();

        let mut seen = HashSet::new();
        let mut dropped = 0;
        for v in candidates.into_iter().chain(steiner) {
            if pinned.contains(&v) || !seen.insert(v) {
                continue;
            }
            if self.tri.try_remove_vertex(v) {
                dropped += 1;
            }
        }
        log::debug!("Removed {} vertices no longer held by obstacles", dropped);
    }

    fn insert_operation(&mut self, op: &Operation<K>) {
        match op {
            Operation::Insert { id, .. } => {
                let cid = self.next_cid;
                self.next_cid += 1;
                let tag = Tag {
                    constraint: Some(cid),
                    fixed: false,
                };
                let polyline = op.world_polylines().swap_remove(0);
                let vertices = self.insert_obstacle(&polyline, tag);
                self.keys.insert(cid, *id);
                self.obstacles.insert(*id, Obstacle { cid, vertices });
            }
            Operation::BulkInsert { .. } => {
                let tag = Tag {
                    constraint: None,
                    fixed: true,
                };
                for polyline in op.world_polylines() {
                    self.insert_obstacle(&polyline, tag);
                    self.permanent_obstacles += 1;
                }
            }
        }
    }

    /// Inserts one polyline; one that collapses to a single vertex becomes a
    /// point obstacle
    fn insert_obstacle(&mut self, polyline: &[Vec2], tag: Tag) -> Vec<VertexId> {
        let vertices = self.tri.insert_polyline(polyline, tag);
        // Reused Steiner vertices now belong to the obstacle
        for &v in &vertices {
            self.tri.mesh.vertex_mut(v).steiner = false;
        }
        if let [v] = vertices[..] {
            self.tri.mesh.vertex_mut(v).point_constraints += 1;
            self.tri.touched.push(v);
        }
        vertices
    }

    // ---- queries --------------------------------------------------------

    pub fn config(&self) -> &NavmeshConfig {
        &self.tri.config
    }

    /// Underlying quad-edge mesh, for traversal
    pub fn mesh(&self) -> &Mesh {
        &self.tri.mesh
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, Vec2)> + '_ {
        self.tri.mesh.vertices().map(|(v, vertex)| (v, vertex.position()))
    }

    pub fn vertex_position(&self, v: VertexId) -> Option<Vec2> {
        self.tri
            .mesh
            .contains_vertex(v)
            .then(|| self.tri.mesh.position(v))
    }

    /// One directed edge per undirected edge
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.tri.mesh.edges()
    }

    /// Outgoing edges of `v`, counter-clockwise
    pub fn vertex_edges(&self, v: VertexId) -> RingIter<'_> {
        self.tri.mesh.ring(v)
    }

    /// One edge per triangle; the triangle is its left face
    pub fn triangles(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.tri.mesh.triangles()
    }

    /// Locates `p`; `None` outside the domain
    pub fn locate(&self, p: Vec2) -> Option<Location> {
        self.tri.contains_point(p).then(|| self.tri.locate(p))
    }

    /// Edge whose left triangle contains `p`
    pub fn locate_triangle(&self, p: Vec2) -> Option<EdgeId> {
        self.tri.locate_triangle(p)
    }

    pub fn is_constrained(&self, e: EdgeId) -> bool {
        self.tri.mesh.is_constrained(e)
    }

    /// Keys of the removable obstacles running along `e`, in insertion order
    pub fn constraints(&self, e: EdgeId) -> Vec<K> {
        self.tri
            .mesh
            .constraints(e)
            .iter()
            .filter_map(|cid| self.keys.get(cid).copied())
            .collect()
    }

    /// Diameter of the widest disc that can enter the left triangle of `e`
    /// through `e` and leave through the edge incident to `org(e)`
    pub fn clearance_left(&self, e: EdgeId) -> f64 {
        self.tri.clearance_left(e)
    }

    /// Diameter of the widest disc that can enter the left triangle of `e`
    /// through `e` and leave through the edge incident to `dest(e)`
    pub fn clearance_right(&self, e: EdgeId) -> f64 {
        self.tri.clearance_right(e)
    }

    /// Id of the left triangle of `e`, [`crate::EXTERIOR`] outside the domain
    pub fn triangle_id(&self, e: EdgeId) -> u32 {
        self.tri.mesh.tri(e)
    }

    pub fn vertex_count(&self) -> usize {
        self.tri.mesh.vertex_count()
    }

    pub fn edge_count(&self) -> usize {
        self.tri.mesh.edge_count()
    }

    pub fn triangle_count(&self) -> usize {
        self.tri.mesh.triangles().count()
    }

    /// Sorted ids of the triangles that existed before the last cycle and
    /// were invalidated by it
    pub fn destroyed_triangles(&self) -> Vec<u32> {
        self.tri.mesh.destroyed().iter().copied().collect()
    }

    pub fn obstacle_ids(&self) -> impl Iterator<Item = &K> + '_ {
        self.obstacles.keys()
    }

    pub fn contains_obstacle(&self, id: &K) -> bool {
        self.obstacles.contains_key(id)
    }

    /// Get statistics about the navigation mesh
    pub fn statistics(&self) -> NavmeshStatistics {
        let mesh = &self.tri.mesh;
        NavmeshStatistics {
            vertices: mesh.vertex_count(),
            edges: mesh.edge_count(),
            triangles: self.triangle_count(),
            constrained_edges: mesh.edges().filter(|&e| mesh.is_constrained(e)).count(),
            steiner_vertices: mesh.vertices().filter(|(_, v)| v.is_steiner()).count(),
            obstacles: self.obstacles.len(),
            permanent_obstacles: self.permanent_obstacles,
            update_counter: self.update_counter,
            refinements: self.tri.refinements,
            refine_failures: self.tri.refine_failures,
        }
    }

    // ---- validation -----------------------------------------------------

    /// Structural checks of the quad-edge mesh
    pub fn validate_topology(&self) -> Vec<Violation> {
        let mesh = &self.tri.mesh;
        let mut violations = Vec::new();

        for e in mesh.edges() {
            for d in [e, e.sym()] {
                if d.sym().sym() != d
                    || mesh.onext(mesh.oprev(d)) != d
                    || mesh.org(mesh.onext(d)) != mesh.org(d)
                {
                    violations.push(Violation::BrokenLinks(d));
                    continue;
                }
                if mesh.is_exterior(d) {
                    continue;
                }
                let e1 = mesh.lnext(d);
                let e2 = mesh.lnext(e1);
                if mesh.lnext(e2) != d {
                    violations.push(Violation::NotTriangle(d));
                } else if orient2d(
                    mesh.org_pos(d),
                    mesh.dest_pos(d),
                    mesh.position(mesh.apex(d)),
                ) <= 0.0
                {
                    violations.push(Violation::Degenerate(d));
                }
            }
        }

        let limit = mesh.edge_count();
        for (v, vertex) in mesh.vertices() {
            let start = vertex.edge;
            if start.is_null() || mesh.org(start) != v {
                violations.push(Violation::Detached(v));
                continue;
            }
            let mut e = mesh.onext(start);
            let mut steps = 1;
            while e != start && steps <= limit {
                e = mesh.onext(e);
                steps += 1;
            }
            if e != start {
                violations.push(Violation::OpenRing(v));
            }
        }
        violations
    }

    /// Unconstrained interior edges whose opposite vertex lies strictly
    /// inside the circumcircle
    pub fn validate_delaunay(&self) -> Vec<Violation> {
        let mesh = &self.tri.mesh;
        mesh.edges()
            .filter(|&e| {
                !mesh.is_constrained(e) && !mesh.is_exterior(e) && !mesh.is_exterior(e.sym())
            })
            .filter(|&e| {
                in_circle(
                    mesh.org_pos(e),
                    mesh.dest_pos(e),
                    mesh.position(mesh.apex(e)),
                    mesh.position(mesh.apex(e.sym())),
                ) > 0.0
            })
            .map(Violation::NotDelaunay)
            .collect()
    }
}

fn validate_operations<K: ObstacleKey>(
    operations: &[Operation<K>],
    present: impl Fn(&K) -> bool,
) -> Result<()> {
    let mut ids = HashSet::new();
    for op in operations {
        op.validate().map_err(Error::InvalidOperation)?;
        if let Some(id) = op.id() {
            if present(id) || !ids.insert(*id) {
                return Err(Error::DuplicateObstacle(format!("{:?}", id)));
            }
        }
    }
    Ok(())
}

/// Statistics about the navigation mesh
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavmeshStatistics {
    pub vertices: usize,
    /// Undirected edges
    pub edges: usize,
    pub triangles: usize,
    /// Edges carrying an obstacle or lying on the domain boundary
    pub constrained_edges: usize,
    pub steiner_vertices: usize,
    /// Removable obstacles
    pub obstacles: usize,
    pub permanent_obstacles: usize,
    /// Update counter (increments with each cycle)
    pub update_counter: u64,
    /// Steiner insertions during the last cycle
    pub refinements: usize,
    /// Constraints refinement gave up on during the last cycle
    pub refine_failures: usize,
}

/// Inconsistency found by [`Navmesh::validate_topology`] or
/// [`Navmesh::validate_delaunay`]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("edge {0:?} has inconsistent ring links")]
    BrokenLinks(EdgeId),
    #[error("left face of edge {0:?} is not a triangle")]
    NotTriangle(EdgeId),
    #[error("left triangle of edge {0:?} is not counter-clockwise")]
    Degenerate(EdgeId),
    #[error("vertex {0:?} has no valid outgoing edge")]
    Detached(VertexId),
    #[error("edge ring of vertex {0:?} does not close")]
    OpenRing(VertexId),
    #[error("edge {0:?} is not locally Delaunay")]
    NotDelaunay(EdgeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NavmeshConfig {
        NavmeshConfig::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0))
    }

    #[test]
    fn test_create_navmesh() -> Result<()> {
        let navmesh = Navmesh::<u32>::new(config())?;
        assert_eq!(navmesh.vertex_count(), 4);
        assert_eq!(navmesh.edge_count(), 5);
        assert_eq!(navmesh.triangle_count(), 2);
        assert!(navmesh.validate_topology().is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let bad = config().with_bounds(Vec2::new(1.0, 1.0), Vec2::new(-1.0, 5.0));
        assert!(matches!(
            Navmesh::<u32>::new(bad),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_statistics() -> Result<()> {
        let mut navmesh = Navmesh::new(config())?;
        navmesh.load(&[
            Operation::insert(1u32, vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)]),
            Operation::bulk(vec![Vec2::new(0.0, 5.0)], vec![1]),
        ])?;
        let stats = navmesh.statistics();
        assert_eq!(stats.obstacles, 1);
        assert_eq!(stats.permanent_obstacles, 1);
        assert_eq!(stats.update_counter, 1);
        assert_eq!(stats.vertices, navmesh.vertex_count());
        // Boundary plus the wall
        assert!(stats.constrained_edges >= 5);
        Ok(())
    }
}
