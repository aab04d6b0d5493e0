//! Channel search
//!
//! A* over triangles. A node is a triangle together with the point where the
//! channel enters it; moving to a neighbour crosses one edge of the
//! triangle and turns around the vertex that edge shares with the entry
//! edge, so the move is admitted only when that corner's clearance fits the
//! disc. Leaving the start triangle has no entry edge and only the gate
//! width is checked.
//!
//! Nodes are keyed by their entry edge, so a channel may pass through the
//! same triangle twice, start and goal triangle included.

use crate::node_pool::{NodeFlags, NodeIndex, NodePool, NodeQueue, NULL_IDX};
use crate::{PathQueryConfig, PathQueryState};
use clearway::{EdgeId, Fault, Mesh, Navmesh, ObstacleKey, VertexId};
use clearway_common::{
    distance_point_segment, distance_segment_segment, segment_intersection, Vec2,
};
use log::debug;
use std::collections::{HashSet, VecDeque};

/// What a [`Gate`] stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum GateKind {
    /// Edge shared by two consecutive channel triangles
    Crossing,
    /// Obstacle vertex of the start triangle off every crossed edge
    Start,
    /// Obstacle vertex of the goal triangle off every crossed edge
    Goal,
}

/// Edge shared by two consecutive channel triangles, or an obstacle vertex
/// of an end triangle
///
/// For a crossing, `left` and `right` are the edge endpoints as seen by a
/// traveller crossing into the next triangle. For the end kinds both hold
/// the vertex; which side it ends up on depends on the smoothed path, so
/// [`crate::Funnel::get_path`] decides.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Gate {
    /// Crossed edge, its left face being the triangle entered;
    /// [`EdgeId::NULL`] for the end kinds
    #[cfg_attr(feature = "serialization", serde(skip, default = "null_edge"))]
    pub edge: EdgeId,
    pub left: Vec2,
    pub right: Vec2,
    pub kind: GateKind,
}

impl Gate {
    fn crossing(mesh: &Mesh, e: EdgeId) -> Self {
        Self {
            edge: e,
            left: mesh.org_pos(e),
            right: mesh.dest_pos(e),
            kind: GateKind::Crossing,
        }
    }

    fn vertex(position: Vec2, kind: GateKind) -> Self {
        Self {
            edge: EdgeId::NULL,
            left: position,
            right: position,
            kind,
        }
    }
}

#[cfg(feature = "serialization")]
fn null_edge() -> EdgeId {
    EdgeId::NULL
}

/// Reusable channel search state
pub struct PathQuery {
    config: PathQueryConfig,
    pool: NodePool,
    open: NodeQueue,
    gates: Vec<Gate>,
    triangle_ids: Vec<u32>,
    visited: HashSet<u32>,
    frontier: VecDeque<EdgeId>,
}

impl PathQuery {
    pub fn new(config: PathQueryConfig) -> Self {
        let pool = NodePool::new(config.max_nodes, config.max_nodes / 4);
        Self {
            config,
            pool,
            open: NodeQueue::new(),
            gates: Vec::new(),
            triangle_ids: Vec::new(),
            visited: HashSet::new(),
            frontier: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &PathQueryConfig {
        &self.config
    }

    /// Gates of the last channel found, start side first
    ///
    /// Besides the crossings this holds at most one [`GateKind::Start`] gate
    /// first and one [`GateKind::Goal`] gate last, for obstacle vertices of
    /// the end triangles close enough to the channel to matter.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Triangle ids of the last channel found, start triangle first
    pub fn triangle_ids(&self) -> &[u32] {
        &self.triangle_ids
    }

    /// Searches for a channel from `start` to `goal` wide enough for a disc
    /// of `radius`
    ///
    /// Endpoints outside the domain or within `radius` of an obstacle are
    /// rejected. On [`PathQueryState::PathFound`] the channel is available
    /// through [`Self::gates`] and [`Self::triangle_ids`]; otherwise both are
    /// empty.
    ///
    /// # Panics
    ///
    /// Panics with [`Fault::PathSearchBudget`] when the open list is popped
    /// more than `max_iterations` times.
    pub fn find_path<K: ObstacleKey>(
        &mut self,
        navmesh: &Navmesh<K>,
        start: Vec2,
        goal: Vec2,
        radius: f64,
    ) -> PathQueryState {
        self.gates.clear();
        self.triangle_ids.clear();
        let radius = radius.max(0.0);
        let mesh = navmesh.mesh();

        let Some(start_edge) = navmesh.locate_triangle(start).map(|e| interior(mesh, e)) else {
            debug!("Start {start:?} is outside the domain");
            return PathQueryState::StartInvalid;
        };
        if !self.is_clear(mesh, start_edge, start, start, radius) {
            debug!("Start {start:?} is within {radius} of an obstacle");
            return PathQueryState::StartInvalid;
        }
        let Some(goal_edge) = navmesh.locate_triangle(goal).map(|e| interior(mesh, e)) else {
            debug!("Goal {goal:?} is outside the domain");
            return PathQueryState::GoalInvalid;
        };
        if !self.is_clear(mesh, goal_edge, goal, goal, radius) {
            debug!("Goal {goal:?} is within {radius} of an obstacle");
            return PathQueryState::GoalInvalid;
        }

        let start_tri = navmesh.triangle_id(start_edge);
        let goal_tri = navmesh.triangle_id(goal_edge);
        if start_tri == goal_tri {
            if self.is_clear(mesh, start_edge, start, goal, radius) {
                self.triangle_ids.push(start_tri);
                return PathQueryState::PathFound;
            }
            debug!("Direct line inside triangle {start_tri} is blocked, searching around");
        }

        self.search(navmesh, start_edge, goal_tri, start, goal, radius)
    }

    fn search<K: ObstacleKey>(
        &mut self,
        navmesh: &Navmesh<K>,
        start_edge: EdgeId,
        goal_tri: u32,
        start: Vec2,
        goal: Vec2,
        radius: f64,
    ) -> PathQueryState {
        let mesh = navmesh.mesh();
        let diameter = 2.0 * radius;
        self.pool.clear();
        self.open.clear();

        let start_tri = navmesh.triangle_id(start_edge);
        let Some(start_idx) = self.pool.get_node(EdgeId::NULL, start_tri) else {
            return PathQueryState::NoPath;
        };
        {
            let node = self.pool.node_mut(start_idx);
            node.pos = start;
            node.total = start.distance(goal);
            node.flags.insert(NodeFlags::OPEN);
            self.open.push(start_idx, node.total);
        }

        let limit = self.config.max_iterations;
        let mut iterations = 0;
        while let Some((idx, total)) = self.open.pop() {
            iterations += 1;
            if iterations > limit {
                std::panic::panic_any(Fault::PathSearchBudget(limit));
            }

            let node = self.pool.node(idx).clone();
            if node.flags.contains(NodeFlags::CLOSED) || total != node.total {
                continue;
            }
            {
                let flags = &mut self.pool.node_mut(idx).flags;
                flags.remove(NodeFlags::OPEN);
                flags.insert(NodeFlags::CLOSED);
            }

            // The start node never ends the search: a blocked line inside one
            // triangle leaves through an edge and comes back
            if node.id == goal_tri && !node.entry.is_null() {
                self.reconstruct(mesh, idx);
                self.add_endpoint_gates(mesh, start, goal, radius);
                debug!(
                    "Channel of {} triangles found in {iterations} iterations, cost {:.3}",
                    self.triangle_ids.len(),
                    node.total
                );
                return PathQueryState::PathFound;
            }

            let exits = if node.entry.is_null() {
                let e = start_edge;
                [
                    Some((e, f64::INFINITY)),
                    Some((mesh.lnext(e), f64::INFINITY)),
                    Some((mesh.lprev(e), f64::INFINITY)),
                ]
            } else {
                let e = node.entry;
                [
                    Some((mesh.lnext(e), navmesh.clearance_right(e))),
                    Some((mesh.lprev(e), navmesh.clearance_left(e))),
                    None,
                ]
            };

            for (exit, clearance) in exits.into_iter().flatten() {
                if mesh.is_constrained(exit)
                    || clearance < diameter
                    || mesh.length(exit) < diameter
                {
                    continue;
                }
                let next = exit.sym();
                if mesh.is_exterior(next) {
                    continue;
                }
                let id = navmesh.triangle_id(next);

                let (a, b) = (mesh.org_pos(next), mesh.dest_pos(next));
                let pos = reference_point(node.pos, goal, a, b, radius);
                let mut cost = node.cost + node.pos.distance(pos);
                let heuristic = if id == goal_tri {
                    cost += pos.distance(goal);
                    0.0
                } else {
                    pos.distance(goal)
                };
                let total = cost + heuristic;

                let Some(n) = self.pool.get_node(next, id) else {
                    debug!("Node pool exhausted at {} nodes", self.pool.max_nodes());
                    continue;
                };
                let neighbour = self.pool.node_mut(n);
                let seen = neighbour.flags.contains(NodeFlags::OPEN)
                    || neighbour.flags.contains(NodeFlags::CLOSED);
                if seen && total >= neighbour.total {
                    continue;
                }

                neighbour.pos = pos;
                neighbour.cost = cost;
                neighbour.total = total;
                neighbour.parent = idx;
                neighbour.flags.remove(NodeFlags::CLOSED);
                neighbour.flags.insert(NodeFlags::OPEN);
                self.open.push(n, total);
            }
        }

        debug!("No channel after {iterations} iterations");
        PathQueryState::NoPath
    }

    fn reconstruct(&mut self, mesh: &Mesh, goal_idx: NodeIndex) {
        let mut idx = goal_idx;
        let mut steps = 0;
        while idx != NULL_IDX && steps <= self.pool.node_count() {
            let node = self.pool.node(idx);
            self.triangle_ids.push(node.id);
            if !node.entry.is_null() {
                self.gates.push(Gate::crossing(mesh, node.entry));
            }
            idx = node.parent;
            steps += 1;
        }
        self.triangle_ids.reverse();
        self.gates.reverse();
    }

    /// Adds the obstacle vertices of the start and goal triangles that are
    /// on no crossed edge
    ///
    /// The third vertex of an end triangle lies off the channel, so the funnel
    /// would never see it. The part of the path inside an end triangle stays
    /// within the endpoint and the crossed edge, so only a vertex within
    /// `radius` of that region is passed on.
    fn add_endpoint_gates(&mut self, mesh: &Mesh, start: Vec2, goal: Vec2, radius: f64) {
        let (Some(&first), Some(&last)) = (self.gates.first(), self.gates.last()) else {
            return;
        };
        let start_vertex = mesh.apex(first.edge.sym());
        let start_gate = endpoint_gate(mesh, start_vertex, start, first, radius, GateKind::Start);
        if let Some(gate) = start_gate {
            debug!("Start triangle vertex {:?} may touch the path", gate.left);
            self.gates.insert(0, gate);
        }
        let goal_vertex = mesh.apex(last.edge);
        if let Some(gate) = endpoint_gate(mesh, goal_vertex, goal, last, radius, GateKind::Goal) {
            debug!("Goal triangle vertex {:?} may touch the path", gate.left);
            self.gates.push(gate);
        }
    }

    /// True when the disc swept from `p0` to `p1` touches no constrained
    /// edge and no point obstacle
    ///
    /// Walks outwards from the triangle of `e` across every edge the swept
    /// disc reaches.
    fn is_clear(&mut self, mesh: &Mesh, e: EdgeId, p0: Vec2, p1: Vec2, radius: f64) -> bool {
        self.visited.clear();
        self.frontier.clear();
        self.visited.insert(mesh.tri(e));
        self.frontier.push_back(e);

        while let Some(t) = self.frontier.pop_front() {
            for f in [t, mesh.lnext(t), mesh.lprev(t)] {
                let v = mesh.org(f);
                if mesh.vertex(v).point_constraints() > 0
                    && distance_point_segment(mesh.position(v), p0, p1) <= radius
                {
                    return false;
                }

                let (a, b) = (mesh.org_pos(f), mesh.dest_pos(f));
                let d = if p0 == p1 {
                    distance_point_segment(p0, a, b)
                } else {
                    distance_segment_segment(p0, p1, a, b)
                };
                if d > radius {
                    continue;
                }
                if mesh.is_constrained(f) {
                    return false;
                }
                let g = f.sym();
                if !mesh.is_exterior(g) && self.visited.insert(mesh.tri(g)) {
                    self.frontier.push_back(g);
                }
            }
        }
        true
    }
}

fn endpoint_gate(
    mesh: &Mesh,
    v: VertexId,
    endpoint: Vec2,
    crossing: Gate,
    radius: f64,
    kind: GateKind,
) -> Option<Gate> {
    let obstacle =
        mesh.vertex(v).point_constraints() > 0 || mesh.ring(v).any(|e| mesh.is_constrained(e));
    if !obstacle {
        return None;
    }
    let p = mesh.position(v);
    let reach = distance_point_segment(p, endpoint, crossing.left)
        .min(distance_point_segment(p, endpoint, crossing.right))
        .min(distance_point_segment(p, crossing.left, crossing.right));
    (reach < radius).then(|| Gate::vertex(p, kind))
}

/// Orients a located edge so its left face is inside the domain
fn interior(mesh: &Mesh, e: EdgeId) -> EdgeId {
    if mesh.is_exterior(e) {
        e.sym()
    } else {
        e
    }
}

/// Point on gate `a b` where the channel is assumed to cross
///
/// Where the line towards the goal crosses the gate, otherwise the endpoint
/// nearest to that line, kept `radius` away from both endpoints.
fn reference_point(from: Vec2, goal: Vec2, a: Vec2, b: Vec2, radius: f64) -> Vec2 {
    let len = a.distance(b);
    if len <= 2.0 * radius {
        return a.lerp(b, 0.5);
    }
    let t = match segment_intersection(from, goal, a, b) {
        Some((_, t)) => t,
        None => {
            let (da, db) = (
                distance_point_segment(a, from, goal),
                distance_point_segment(b, from, goal),
            );
            if da <= db {
                0.0
            } else {
                1.0
            }
        }
    };
    let margin = radius / len;
    a.lerp(b, t.clamp(margin, 1.0 - margin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::{path_length, path_segments, Funnel, PathNode, PathNodeKind};
    use clearway::{NavmeshConfig, Operation};
    use clearway_common::Result;

    const EPS: f64 = 1e-6;

    fn navmesh(min: Vec2, max: Vec2, operations: &[Operation<u32>]) -> Result<Navmesh<u32>> {
        let mut navmesh = Navmesh::new(NavmeshConfig::new(min, max))?;
        navmesh.load(operations)?;
        Ok(navmesh)
    }

    fn square(operations: &[Operation<u32>]) -> Result<Navmesh<u32>> {
        navmesh(Vec2::splat(-20.0), Vec2::splat(20.0), operations)
    }

    fn smooth_path(query: &PathQuery, start: Vec2, goal: Vec2, radius: f64) -> Vec<PathNode> {
        let mut funnel = Funnel::new();
        funnel.get_path(query.gates(), start, goal, radius).iter().copied().collect()
    }

    fn smooth_length(query: &PathQuery, start: Vec2, goal: Vec2, radius: f64) -> f64 {
        path_length(&smooth_path(query, start, goal, radius), radius)
    }

    /// Closest approach of the smoothed path to any constrained edge, sampled
    fn clearance_along(navmesh: &Navmesh<u32>, nodes: &[PathNode], radius: f64) -> f64 {
        let mesh = navmesh.mesh();
        let walls: Vec<(Vec2, Vec2)> = navmesh
            .edges()
            .filter(|&e| navmesh.is_constrained(e))
            .map(|e| (mesh.org_pos(e), mesh.dest_pos(e)))
            .collect();
        let mut closest = f64::INFINITY;
        for segment in path_segments(nodes, radius) {
            for i in 0..=40 {
                let p = segment.point_at(f64::from(i) / 40.0);
                for &(a, b) in &walls {
                    closest = closest.min(distance_point_segment(p, a, b));
                }
            }
        }
        closest
    }

    #[test]
    fn test_reference_point() {
        let (a, b) = (Vec2::new(0.0, -2.0), Vec2::new(0.0, 2.0));
        // Crossing the gate
        let p = reference_point(Vec2::new(-1.0, 0.5), Vec2::new(1.0, 0.5), a, b, 0.1);
        assert!(p.distance(Vec2::new(0.0, 0.5)) < EPS);
        // Missing it: nearest endpoint, pulled in by the radius
        let p = reference_point(Vec2::new(-1.0, 5.0), Vec2::new(1.0, 5.0), a, b, 0.5);
        assert!(p.distance(Vec2::new(0.0, 1.5)) < EPS);
        // Too narrow for the margin
        let p = reference_point(Vec2::new(-1.0, 5.0), Vec2::new(1.0, 5.0), a, b, 3.0);
        assert!(p.distance(Vec2::ZERO) < EPS);
    }

    #[test]
    fn test_same_triangle() -> Result<()> {
        let navmesh = navmesh(Vec2::new(-25.0, -20.0), Vec2::new(25.0, 30.0), &[])?;
        let mut query = PathQuery::new(PathQueryConfig::default());
        let (start, goal) = (Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));

        assert_eq!(query.find_path(&navmesh, start, goal, 0.1), PathQueryState::PathFound);
        assert!(query.gates().is_empty());
        assert_eq!(query.triangle_ids().len(), 1);
        assert!((smooth_length(&query, start, goal, 0.1) - 10.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn test_crossing_one_gate() -> Result<()> {
        let navmesh = navmesh(Vec2::new(-25.0, -20.0), Vec2::new(25.0, 30.0), &[])?;
        let mut query = PathQuery::new(PathQueryConfig::default());
        let (start, goal) = (Vec2::new(0.0, 0.0), Vec2::new(0.0, 10.0));

        assert_eq!(query.find_path(&navmesh, start, goal, 0.1), PathQueryState::PathFound);
        assert_eq!(query.gates().len(), 1);
        assert_eq!(query.triangle_ids().len(), 2);
        assert_ne!(query.triangle_ids()[0], query.triangle_ids()[1]);

        // Heading north across the SW-NE diagonal, the SW corner is on the left
        let gate = query.gates()[0];
        assert_eq!(gate.kind, GateKind::Crossing);
        assert_eq!(gate.left, Vec2::new(-25.0, -20.0));
        assert_eq!(gate.right, Vec2::new(25.0, 30.0));
        assert!((smooth_length(&query, start, goal, 0.1) - 10.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn test_gap_admits_small_discs_only() -> Result<()> {
        let navmesh = square(&[
            Operation::insert(1, vec![Vec2::new(0.0, -20.0), Vec2::new(0.0, -0.5)]),
            Operation::insert(2, vec![Vec2::new(0.0, 0.5), Vec2::new(0.0, 20.0)]),
        ])?;
        let mut query = PathQuery::new(PathQueryConfig::default());
        let (start, goal) = (Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0));

        assert_eq!(query.find_path(&navmesh, start, goal, 0.6), PathQueryState::NoPath);
        assert!(query.gates().is_empty());
        assert!(query.triangle_ids().is_empty());

        assert_eq!(query.find_path(&navmesh, start, goal, 0.3), PathQueryState::PathFound);
        let length = smooth_length(&query, start, goal, 0.3);
        assert!(length >= 20.0 - EPS && length < 20.5, "length {length}");
        Ok(())
    }

    #[test]
    fn test_path_keeps_radius_from_walls() -> Result<()> {
        let wall = vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)];
        let navmesh = square(&[Operation::insert(1, wall)])?;
        let mut query = PathQuery::new(PathQueryConfig::default());
        let (start, goal, radius) = (Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0), 0.5);

        assert_eq!(query.find_path(&navmesh, start, goal, radius), PathQueryState::PathFound);
        let nodes = smooth_path(&query, start, goal, radius);
        // Around one end of the wall
        assert_eq!(nodes.len(), 3);
        assert!(nodes[1].position.x.abs() == 5.0 && nodes[1].position.y == 0.0);
        assert!((path_length(&nodes, radius) - 14.9629).abs() < 1e-3);
        assert!(clearance_along(&navmesh, &nodes, radius) >= radius - EPS);
        Ok(())
    }

    #[test]
    fn test_invalid_endpoints() -> Result<()> {
        let navmesh = square(&[
            Operation::insert(1, vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)]),
            Operation::insert(2, vec![Vec2::new(8.0, 8.0)]),
        ])?;
        let mut query = PathQuery::new(PathQueryConfig::default());
        let goal = Vec2::new(0.0, 5.0);

        let outside = Vec2::new(30.0, 0.0);
        let state = query.find_path(&navmesh, outside, goal, 0.5);
        assert_eq!(state, PathQueryState::StartInvalid);
        let near_wall = Vec2::new(0.0, -0.3);
        let state = query.find_path(&navmesh, near_wall, goal, 0.5);
        assert_eq!(state, PathQueryState::StartInvalid);
        let near_boundary = Vec2::new(0.0, -19.8);
        let state = query.find_path(&navmesh, near_boundary, goal, 0.5);
        assert_eq!(state, PathQueryState::StartInvalid);

        let start = Vec2::new(0.0, -5.0);
        let near_point = Vec2::new(8.2, 8.0);
        let state = query.find_path(&navmesh, start, near_point, 0.5);
        assert_eq!(state, PathQueryState::GoalInvalid);
        let state = query.find_path(&navmesh, start, outside, 0.5);
        assert_eq!(state, PathQueryState::GoalInvalid);

        // Farther than the radius is fine
        let state = query.find_path(&navmesh, Vec2::new(0.0, -0.6), goal, 0.5);
        assert_eq!(state, PathQueryState::PathFound);
        Ok(())
    }

    #[test]
    fn test_same_triangle_blocked_line() -> Result<()> {
        let config = NavmeshConfig::new(Vec2::splat(-20.0), Vec2::splat(20.0));
        let mut navmesh = Navmesh::new(config.with_refinement(false))?;
        navmesh.load(&[Operation::insert(1u32, vec![Vec2::ZERO])])?;
        let (start, goal) = (Vec2::new(2.0, -1.5), Vec2::new(2.0, 1.5));
        let start_tri = navmesh.locate_triangle(start).map(|e| navmesh.triangle_id(e));
        let goal_tri = navmesh.locate_triangle(goal).map(|e| navmesh.triangle_id(e));
        assert_eq!(start_tri, goal_tri);

        // The line clears the point obstacle for the small disc only
        let mut query = PathQuery::new(PathQueryConfig::default());
        assert_eq!(query.find_path(&navmesh, start, goal, 1.5), PathQueryState::PathFound);
        assert_eq!(query.triangle_ids().len(), 1);

        // The large one leaves the triangle and comes back round the far side
        let radius = 2.2;
        assert_eq!(query.find_path(&navmesh, start, goal, radius), PathQueryState::PathFound);
        let ids = query.triangle_ids();
        assert_eq!(ids.len(), 5);
        assert_eq!(Some(ids[0]), start_tri);
        assert_eq!(ids[0], ids[4]);
        assert_eq!(query.gates().len(), 4);

        let nodes = smooth_path(&query, start, goal, radius);
        assert_eq!(
            nodes,
            vec![PathNode::point(start), PathNode::right(Vec2::ZERO), PathNode::point(goal)]
        );
        for segment in path_segments(&nodes, radius) {
            for i in 0..=40 {
                let p = segment.point_at(f64::from(i) / 40.0);
                assert!(p.length() >= radius - EPS, "{p:?} is inside the obstacle's disc");
            }
        }
        assert!((path_length(&nodes, radius) - 11.1888).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_search_is_deterministic() -> Result<()> {
        let navmesh = square(&[
            Operation::insert(1, vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)]),
            Operation::insert_polygon(
                2,
                vec![Vec2::new(-8.0, 6.0), Vec2::new(-4.0, 6.0), Vec2::new(-6.0, 9.0)],
            ),
            Operation::insert(3, vec![Vec2::new(6.0, -6.0), Vec2::new(12.0, -3.0)]),
        ])?;
        let (start, goal) = (Vec2::new(-2.0, -10.0), Vec2::new(3.0, 12.0));

        let mut first = PathQuery::new(PathQueryConfig::default());
        let mut second = PathQuery::new(PathQueryConfig::default());
        assert_eq!(first.find_path(&navmesh, start, goal, 0.4), PathQueryState::PathFound);
        assert_eq!(second.find_path(&navmesh, start, goal, 0.4), PathQueryState::PathFound);
        assert_eq!(first.triangle_ids(), second.triangle_ids());
        assert_eq!(first.gates(), second.gates());

        // End triangle vertices only at the ends
        let gates = first.gates();
        for (i, gate) in gates.iter().enumerate() {
            match gate.kind {
                GateKind::Start => assert_eq!(i, 0),
                GateKind::Goal => assert_eq!(i, gates.len() - 1),
                GateKind::Crossing => assert!(!gate.edge.is_null()),
            }
        }

        // Crossed edges lead into consecutive triangles
        let crossed: Vec<&Gate> = gates.iter().filter(|g| g.kind == GateKind::Crossing).collect();
        assert_eq!(crossed.len() + 1, first.triangle_ids().len());
        for (gate, &id) in crossed.into_iter().zip(&first.triangle_ids()[1..]) {
            assert_eq!(navmesh.triangle_id(gate.edge), id);
        }
        Ok(())
    }

    #[test]
    fn test_random_paths_keep_clear_of_walls() -> Result<()> {
        let mut rng = fastrand::Rng::with_seed(29);
        let mut point = |extent: f64| {
            Vec2::new(
                rng.f64() * 2.0 * extent - extent,
                rng.f64() * 2.0 * extent - extent,
            )
        };
        let mut operations = Vec::new();
        for id in 0..7u32 {
            if id % 2 == 0 {
                operations.push(Operation::insert(id, vec![point(16.0), point(16.0)]));
            } else {
                let center = point(15.0);
                let corners = vec![center + point(2.5), center + point(2.5), center + point(2.5)];
                operations.push(Operation::insert_polygon(id, corners));
            }
        }
        let navmesh = square(&operations)?;

        let mut query = PathQuery::new(PathQueryConfig::default());
        let mut rng = fastrand::Rng::with_seed(31);
        let mut found = 0;
        for _ in 0..80 {
            let radius = 0.2 + rng.f64() * 0.8;
            let start = Vec2::new(rng.f64() * 36.0 - 18.0, rng.f64() * 36.0 - 18.0);
            let goal = Vec2::new(rng.f64() * 36.0 - 18.0, rng.f64() * 36.0 - 18.0);
            if !query.find_path(&navmesh, start, goal, radius).is_found() {
                continue;
            }
            found += 1;

            let nodes = smooth_path(&query, start, goal, radius);
            assert_eq!(nodes.first().map(|n| n.position), Some(start));
            assert_eq!(nodes.last().map(|n| n.position), Some(goal));
            assert!(nodes[1..nodes.len() - 1].iter().all(|n| n.kind != PathNodeKind::Point));
            let closest = clearance_along(&navmesh, &nodes, radius);
            assert!(
                closest >= radius - EPS,
                "path {start:?} -> {goal:?} with radius {radius} comes {closest} from a wall"
            );
        }
        assert!(found >= 20, "only {found} paths found");
        Ok(())
    }

    #[test]
    fn test_update_invalidates_crossed_channel() -> Result<()> {
        let mut navmesh = square(&[])?;
        let mut query = PathQuery::new(PathQueryConfig::default());
        let (start, goal) = (Vec2::new(-5.0, -10.0), Vec2::new(5.0, 10.0));
        assert!(query.find_path(&navmesh, start, goal, 0.5).is_found());
        assert_eq!(query.triangle_ids().len(), 2);
        let channel = query.triangle_ids().to_vec();

        let wall = vec![Vec2::new(-15.0, 0.0), Vec2::new(15.0, 0.0)];
        navmesh.update(&[Operation::insert(1, wall)], &[])?;
        assert!(!crate::channel_intact(&channel, &navmesh.destroyed_triangles()));
        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_ends_search() -> Result<()> {
        let wall = vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)];
        let navmesh = square(&[Operation::insert(1, wall)])?;
        let mut query = PathQuery::new(PathQueryConfig::default().with_max_nodes(1));
        let state = query.find_path(&navmesh, Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0), 0.5);
        assert_eq!(state, PathQueryState::NoPath);
        Ok(())
    }

    #[test]
    fn test_iteration_budget_faults() -> Result<()> {
        let wall = vec![Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)];
        let navmesh = square(&[Operation::insert(1, wall)])?;
        let mut query = PathQuery::new(PathQueryConfig::default().with_max_iterations(1));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            query.find_path(&navmesh, Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0), 0.5)
        }));
        let payload = result.expect_err("budget fault");
        assert_eq!(payload.downcast_ref::<Fault>(), Some(&Fault::PathSearchBudget(1)));
        Ok(())
    }
}
