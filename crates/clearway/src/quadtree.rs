//! Region quadtree over mesh vertices
//!
//! Used to merge near-duplicate insertions, to validate refinement points and
//! to pick a good starting edge for point location.

use crate::quad_edge::VertexId;
use clearway_common::Vec2;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Squared distance from `p` to the box (zero inside)
    pub fn distance_squared(&self, p: Vec2) -> f64 {
        let clamped = p.clamp(self.min, self.max);
        clamped.distance_squared(p)
    }

    fn quadrant(&self, index: usize) -> Aabb {
        let c = self.center();
        let (min_x, max_x) = if index & 1 == 0 { (self.min.x, c.x) } else { (c.x, self.max.x) };
        let (min_y, max_y) = if index & 2 == 0 { (self.min.y, c.y) } else { (c.y, self.max.y) };
        Aabb::new(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y))
    }

    fn quadrant_of(&self, p: Vec2) -> usize {
        let c = self.center();
        usize::from(p.x >= c.x) | (usize::from(p.y >= c.y) << 1)
    }
}

#[derive(Debug, Clone)]
enum QuadNode {
    Leaf {
        bounds: Aabb,
        items: Vec<(VertexId, Vec2)>,
    },
    Internal {
        bounds: Aabb,
        children: Box<[QuadNode; 4]>,
    },
}

impl QuadNode {
    fn leaf(bounds: Aabb) -> Self {
        QuadNode::Leaf {
            bounds,
            items: Vec::new(),
        }
    }

    fn bounds(&self) -> &Aabb {
        match self {
            QuadNode::Leaf { bounds, .. } | QuadNode::Internal { bounds, .. } => bounds,
        }
    }

    fn insert(&mut self, v: VertexId, p: Vec2, depth: u32, bucket_size: usize, max_depth: u32) {
        match self {
            QuadNode::Leaf { bounds, items } => {
                items.push((v, p));
                if items.len() > bucket_size && depth < max_depth {
                    let bounds = *bounds;
                    let items = std::mem::take(items);
                    let mut children =
                        Box::new([0, 1, 2, 3].map(|i| QuadNode::leaf(bounds.quadrant(i))));
                    for (iv, ip) in items {
                        let child = &mut children[bounds.quadrant_of(ip)];
                        child.insert(iv, ip, depth + 1, bucket_size, max_depth);
                    }
                    *self = QuadNode::Internal { bounds, children };
                }
            }
            QuadNode::Internal { bounds, children } => {
                let i = bounds.quadrant_of(p);
                children[i].insert(v, p, depth + 1, bucket_size, max_depth);
            }
        }
    }

    fn remove(&mut self, v: VertexId, p: Vec2) -> bool {
        match self {
            QuadNode::Leaf { items, .. } => match items.iter().position(|(iv, _)| *iv == v) {
                Some(pos) => {
                    items.swap_remove(pos);
                    true
                }
                None => false,
            },
            QuadNode::Internal { bounds, children } => {
                let i = bounds.quadrant_of(p);
                let removed = children[i].remove(v, p);
                let empty = children
                    .iter()
                    .all(|c| matches!(c, QuadNode::Leaf { items, .. } if items.is_empty()));
                if removed && empty {
                    let bounds = *bounds;
                    *self = QuadNode::leaf(bounds);
                }
                removed
            }
        }
    }

    /// Branch-and-bound closest item search; `best` holds the squared distance bound
    fn closest(&self, p: Vec2, best: &mut Option<(VertexId, f64)>, bound_sq: &mut f64) {
        if self.bounds().distance_squared(p) > *bound_sq {
            return;
        }
        match self {
            QuadNode::Leaf { items, .. } => {
                for &(v, q) in items {
                    let d = q.distance_squared(p);
                    if d <= *bound_sq {
                        let better = match best {
                            Some((bv, bd)) => d < *bd || (d == *bd && v < *bv),
                            None => true,
                        };
                        if better {
                            *best = Some((v, d));
                            *bound_sq = d;
                        }
                    }
                }
            }
            QuadNode::Internal { children, .. } => {
                let mut order = [0usize, 1, 2, 3];
                order.sort_by(|&a, &b| {
                    let da = children[a].bounds().distance_squared(p);
                    let db = children[b].bounds().distance_squared(p);
                    da.total_cmp(&db)
                });
                for i in order {
                    children[i].closest(p, best, bound_sq);
                }
            }
        }
    }

    fn within(&self, p: Vec2, radius_sq: f64, out: &mut Vec<VertexId>) {
        if self.bounds().distance_squared(p) > radius_sq {
            return;
        }
        match self {
            QuadNode::Leaf { items, .. } => {
                out.extend(
                    items
                        .iter()
                        .filter(|(_, q)| q.distance_squared(p) <= radius_sq)
                        .map(|(v, _)| *v),
                );
            }
            QuadNode::Internal { children, .. } => {
                for child in children.iter() {
                    child.within(p, radius_sq, out);
                }
            }
        }
    }
}

/// Point-location index over vertex positions
#[derive(Debug, Clone)]
pub struct QuadTree {
    root: QuadNode,
    bucket_size: usize,
    max_depth: u32,
    len: usize,
}

impl QuadTree {
    pub fn new(bounds: Aabb, bucket_size: usize, max_depth: u32) -> Self {
        Self {
            root: QuadNode::leaf(bounds),
            bucket_size: bucket_size.max(1),
            max_depth,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, v: VertexId, p: Vec2) {
        self.root.insert(v, p, 0, self.bucket_size, self.max_depth);
        self.len += 1;
    }

    /// Removes `v`, which must have been inserted at `p`
    pub fn remove(&mut self, v: VertexId, p: Vec2) -> bool {
        let removed = self.root.remove(v, p);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Closest vertex within `eps` of `p`
    pub fn find_within(&self, p: Vec2, eps: f64) -> Option<VertexId> {
        let mut best = None;
        let mut bound = eps * eps;
        self.root.closest(p, &mut best, &mut bound);
        best.map(|(v, _)| v)
    }

    /// Closest vertex overall
    pub fn nearest(&self, p: Vec2) -> Option<VertexId> {
        let mut best = None;
        let mut bound = f64::INFINITY;
        self.root.closest(p, &mut best, &mut bound);
        best.map(|(v, _)| v)
    }

    /// All vertices within `radius` of `p`, unordered
    pub fn query_radius(&self, p: Vec2, radius: f64, out: &mut Vec<VertexId>) {
        self.root.within(p, radius * radius, out);
    }

    pub fn clear(&mut self) {
        self.root = QuadNode::leaf(*self.root.bounds());
        self.len = 0;
    }
}
