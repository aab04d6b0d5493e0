//! A* over the vertex graph of the mesh
//!
//! Used by constraint removal to recover the chain of edges that realises one
//! polyline segment of an obstacle.

use crate::quad_edge::{EdgeId, Mesh, VertexId};
use crate::{Fault, LoopGuard};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Open-list entry; ordered so that `BinaryHeap` pops the lowest `f` first and
/// breaks ties by insertion order
#[derive(Debug, Clone, Copy)]
struct HeapNode {
    vertex: VertexId,
    f: f64,
    seq: u64,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (lowest f value first, then oldest entry)
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct NodeInfo {
    g: f64,
    /// Edge used to reach this vertex
    parent: EdgeId,
    closed: bool,
}

/// Shortest chain of edges from `from` to `to` using only edges accepted by `filter`.
///
/// Returns the directed edges in order, or `None` if `to` is unreachable.
/// Faults with [`Fault::EdgeSearchBudget`] after `max_iterations` expansions.
pub fn find_edge_path<F>(
    mesh: &Mesh,
    from: VertexId,
    to: VertexId,
    max_iterations: usize,
    filter: F,
) -> Option<Vec<EdgeId>>
where
    F: Fn(&Mesh, EdgeId) -> bool,
{
    if from == to {
        return Some(Vec::new());
    }
    let goal = mesh.position(to);
    let mut nodes: HashMap<VertexId, NodeInfo> = HashMap::new();
    let mut open = BinaryHeap::new();
    let mut seq = 0u64;
    let mut guard = LoopGuard::new(max_iterations, Fault::EdgeSearchBudget);

    nodes.insert(
        from,
        NodeInfo {
            g: 0.0,
            parent: EdgeId::NULL,
            closed: false,
        },
    );
    open.push(HeapNode {
        vertex: from,
        f: mesh.position(from).distance(goal),
        seq,
    });

    while let Some(HeapNode { vertex, .. }) = open.pop() {
        guard.tick();
        let g = match nodes.get_mut(&vertex) {
            Some(info) if !info.closed => {
                info.closed = true;
                info.g
            }
            _ => continue,
        };

        if vertex == to {
            let mut path = Vec::new();
            let mut current = to;
            while current != from {
                let e = nodes[&current].parent;
                path.push(e);
                current = mesh.org(e);
            }
            path.reverse();
            return Some(path);
        }

        let pos = mesh.position(vertex);
        for e in mesh.ring(vertex) {
            if !filter(mesh, e) {
                continue;
            }
            let next = mesh.dest(e);
            let next_pos = mesh.position(next);
            let next_g = g + pos.distance(next_pos);
            let improved = match nodes.get(&next) {
                Some(info) => !info.closed && next_g < info.g,
                None => true,
            };
            if improved {
                nodes.insert(
                    next,
                    NodeInfo {
                        g: next_g,
                        parent: e,
                        closed: false,
                    },
                );
                seq += 1;
                open.push(HeapNode {
                    vertex: next,
                    f: next_g + next_pos.distance(goal),
                    seq,
                });
            }
        }
    }
    None
}
