//! Funnel smoothing for a disc of fixed radius
//!
//! Gate vertices are treated as discs of the agent radius. The funnel keeps
//! an apex and a taut chain on each side; a chain is taut while every vertex
//! on it turns the path towards that vertex's own side. Consecutive path
//! nodes are joined by their common tangent: outer tangents between two
//! vertices on the same side, inner tangents between vertices on opposite
//! sides.
//!
//! Vertices of the end triangles that lie on no crossed edge come without a
//! side. The funnel first runs over the crossings alone, then gives each such
//! vertex the side of the first or last leg it would touch and runs again.

use crate::channel::{Gate, GateKind};
use clearway_common::{cross, distance_point_segment, Vec2};
use std::collections::VecDeque;
use std::f64::consts::TAU;

/// Which side of the path a node's obstacle is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PathNodeKind {
    /// Start or goal; the path passes through it
    Point,
    /// Obstacle on the traveller's left, wrapped counter-clockwise
    Left,
    /// Obstacle on the traveller's right, wrapped clockwise
    Right,
}

impl PathNodeKind {
    /// Offset of the path from the node centre along the left normal of the
    /// travel direction, in radii
    fn offset(self) -> f64 {
        match self {
            PathNodeKind::Point => 0.0,
            PathNodeKind::Left => -1.0,
            PathNodeKind::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PathNode {
    pub kind: PathNodeKind,
    pub position: Vec2,
}

impl PathNode {
    pub fn point(position: Vec2) -> Self {
        Self {
            kind: PathNodeKind::Point,
            position,
        }
    }

    pub fn left(position: Vec2) -> Self {
        Self {
            kind: PathNodeKind::Left,
            position,
        }
    }

    pub fn right(position: Vec2) -> Self {
        Self {
            kind: PathNodeKind::Right,
            position,
        }
    }
}

/// Tangent from the disc of `a` to the disc of `b`, as the touching points
fn tangent(a: &PathNode, b: &PathNode, radius: f64) -> (Vec2, Vec2) {
    let d = b.position - a.position;
    let len_sq = d.length_squared();
    if len_sq == 0.0 {
        return (a.position, b.position);
    }
    // The direction u satisfies d = h * u + k * perp(u)
    let k = (a.kind.offset() - b.kind.offset()) * radius;
    let h = (len_sq - k * k).max(0.0).sqrt();
    let u = Vec2::new(h * d.x + k * d.y, h * d.y - k * d.x) / len_sq;
    let n = u.normalize_or_zero().perp();
    (
        a.position + n * (a.kind.offset() * radius),
        b.position + n * (b.kind.offset() * radius),
    )
}

fn direction(a: &PathNode, b: &PathNode, radius: f64) -> Vec2 {
    let (p, q) = tangent(a, b, radius);
    q - p
}

/// Turn at `w` travelling `prev -> w -> next`, positive to the left
fn turn(prev: &PathNode, w: &PathNode, next: &PathNode, radius: f64) -> f64 {
    cross(direction(prev, w, radius), direction(w, next, radius))
}

/// True when the apex moves onto `pivot` before `node` is added
///
/// `node` must lie past the tangent towards `pivot` on the side of `sign`
/// (`-1` for a right-hand pivot, `1` for a left-hand one). The path must
/// also bend around the pivot on the pivot's own side, or the direct leg
/// must cut into the pivot's disc. A node tucked in behind the pivot is
/// reached directly.
fn closes_on(
    apex: &PathNode,
    pivot: &PathNode,
    node: &PathNode,
    radius: f64,
    sign: f64,
) -> bool {
    let towards_pivot = direction(apex, pivot, radius);
    if sign * cross(towards_pivot, direction(apex, node, radius)) <= 0.0 {
        return false;
    }
    if sign * turn(apex, pivot, node, radius) > 0.0 {
        return true;
    }
    let (p, q) = tangent(apex, node, radius);
    distance_point_segment(pivot.position, p, q) < radius
}

/// Side a sideless vertex takes if it lies within `radius` of the leg from
/// `a` to `b`
fn wrap_side(a: &PathNode, b: &PathNode, v: Vec2, radius: f64) -> Option<PathNode> {
    let (p, q) = tangent(a, b, radius);
    if distance_point_segment(v, p, q) >= radius {
        return None;
    }
    if cross(q - p, v - p) > 0.0 {
        Some(PathNode::left(v))
    } else {
        Some(PathNode::right(v))
    }
}

/// Vertex shared with the previous gate on the same side, or the apex
fn is_repeat(apex: &PathNode, back: Option<&PathNode>, node: &PathNode) -> bool {
    apex.position == node.position || back.map_or(false, |n| n.position == node.position)
}

/// Simple stupid funnel for discs
#[derive(Debug, Default)]
pub struct Funnel {
    path: VecDeque<PathNode>,
    left: VecDeque<PathNode>,
    right: VecDeque<PathNode>,
}

impl Funnel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulls the channel described by `gates` taut
    ///
    /// Returns the start, every gate vertex the path wraps around, and the
    /// goal. The result is empty only if no call was made.
    pub fn get_path(
        &mut self,
        gates: &[Gate],
        start: Vec2,
        goal: Vec2,
        radius: f64,
    ) -> &VecDeque<PathNode> {
        let radius = radius.max(0.0);
        self.run(gates, None, None, start, goal, radius);

        let vertex = |kind| gates.iter().find(|g| g.kind == kind).map(|g| g.left);
        let first = vertex(GateKind::Start).and_then(|v| {
            let (a, b) = (self.path.front()?, self.path.get(1)?);
            wrap_side(a, b, v, radius)
        });
        let last = vertex(GateKind::Goal).and_then(|v| {
            let n = self.path.len();
            let (a, b) = (self.path.get(n.checked_sub(2)?)?, self.path.back()?);
            wrap_side(a, b, v, radius)
        });
        if first.is_some() || last.is_some() {
            self.run(gates, first, last, start, goal, radius);
        }
        &self.path
    }

    fn run(
        &mut self,
        gates: &[Gate],
        first: Option<PathNode>,
        last: Option<PathNode>,
        start: Vec2,
        goal: Vec2,
        radius: f64,
    ) {
        self.path.clear();
        self.left.clear();
        self.right.clear();

        let mut apex = PathNode::point(start);
        if let Some(node) = first {
            self.push(&mut apex, node, radius);
        }
        for gate in gates.iter().filter(|g| g.kind == GateKind::Crossing) {
            self.push_left(&mut apex, PathNode::left(gate.left), radius);
            self.push_right(&mut apex, PathNode::right(gate.right), radius);
        }
        if let Some(node) = last {
            self.push(&mut apex, node, radius);
        }
        self.push_left(&mut apex, PathNode::point(goal), radius);

        self.path.push_back(apex);
        self.path.extend(self.left.drain(..));
    }

    fn push(&mut self, apex: &mut PathNode, node: PathNode, radius: f64) {
        match node.kind {
            PathNodeKind::Right => self.push_right(apex, node, radius),
            _ => self.push_left(apex, node, radius),
        }
    }

    fn push_left(&mut self, apex: &mut PathNode, node: PathNode, radius: f64) {
        if node.kind != PathNodeKind::Point && is_repeat(apex, self.left.back(), &node) {
            return;
        }
        while let Some(w) = self.left.back().copied() {
            let prev = self.left.iter().rev().nth(1).copied().unwrap_or(*apex);
            if turn(&prev, &w, &node, radius) > 0.0 {
                break;
            }
            self.left.pop_back();
        }
        if self.left.is_empty() {
            // The new node crosses the first right tangent: the funnel closes
            while let Some(r) = self.right.front().copied() {
                if !closes_on(apex, &r, &node, radius, -1.0) {
                    break;
                }
                self.path.push_back(*apex);
                *apex = r;
                self.right.pop_front();
            }
        }
        self.left.push_back(node);
    }

    fn push_right(&mut self, apex: &mut PathNode, node: PathNode, radius: f64) {
        if is_repeat(apex, self.right.back(), &node) {
            return;
        }
        while let Some(w) = self.right.back().copied() {
            let prev = self.right.iter().rev().nth(1).copied().unwrap_or(*apex);
            if turn(&prev, &w, &node, radius) < 0.0 {
                break;
            }
            self.right.pop_back();
        }
        if self.right.is_empty() {
            while let Some(l) = self.left.front().copied() {
                if !closes_on(apex, &l, &node, radius, 1.0) {
                    break;
                }
                self.path.push_back(*apex);
                *apex = l;
                self.left.pop_front();
            }
        }
        self.right.push_back(node);
    }
}

/// Piece of a smoothed path
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum PathSegment {
    Line {
        from: Vec2,
        to: Vec2,
    },
    /// Counter-clockwise for a positive sweep
    Arc {
        center: Vec2,
        radius: f64,
        start_angle: f64,
        sweep: f64,
    },
}

impl PathSegment {
    pub fn length(&self) -> f64 {
        match *self {
            PathSegment::Line { from, to } => from.distance(to),
            PathSegment::Arc { radius, sweep, .. } => radius * sweep.abs(),
        }
    }

    /// Point at fraction `t` of the segment
    pub fn point_at(&self, t: f64) -> Vec2 {
        match *self {
            PathSegment::Line { from, to } => from.lerp(to, t),
            PathSegment::Arc {
                center,
                radius,
                start_angle,
                sweep,
            } => center + Vec2::from_angle(start_angle + sweep * t) * radius,
        }
    }
}

/// Expands funnel output into tangent lines and the arcs around each wrapped
/// vertex
pub fn path_segments(nodes: &[PathNode], radius: f64) -> Vec<PathSegment> {
    let radius = radius.max(0.0);
    let tangents: Vec<(Vec2, Vec2)> = nodes
        .windows(2)
        .map(|w| tangent(&w[0], &w[1], radius))
        .collect();

    let mut segments = Vec::with_capacity(tangents.len() * 2);
    for (i, &(from, to)) in tangents.iter().enumerate() {
        if i > 0 && radius > 0.0 {
            let node = &nodes[i];
            let arrive = tangents[i - 1].1;
            if let Some(arc) = arc(node, arrive, from, radius) {
                segments.push(arc);
            }
        }
        segments.push(PathSegment::Line { from, to });
    }
    segments
}

fn arc(node: &PathNode, arrive: Vec2, leave: Vec2, radius: f64) -> Option<PathSegment> {
    let start_angle = (arrive - node.position).to_angle();
    let end_angle = (leave - node.position).to_angle();
    let sweep = match node.kind {
        PathNodeKind::Point => return None,
        PathNodeKind::Left => (end_angle - start_angle).rem_euclid(TAU),
        PathNodeKind::Right => -(start_angle - end_angle).rem_euclid(TAU),
    };
    // Rounding on an almost straight pass
    let sweep = if sweep.abs() > TAU - 1e-9 { 0.0 } else { sweep };
    Some(PathSegment::Arc {
        center: node.position,
        radius,
        start_angle,
        sweep,
    })
}

/// Length of the smoothed path through `nodes`
pub fn path_length(nodes: &[PathNode], radius: f64) -> f64 {
    path_segments(nodes, radius).iter().map(PathSegment::length).sum()
}
