//! Node pool and queue for the channel search
//!

use clearway::EdgeId;
use clearway_common::Vec2;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Node flags for search state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const OPEN: NodeFlags = NodeFlags(0x01);
    pub const CLOSED: NodeFlags = NodeFlags(0x02);

    pub fn contains(&self, flag: NodeFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: NodeFlags) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: NodeFlags) {
        self.0 &= !flag.0;
    }
}

/// Node index type
pub type NodeIndex = u32;

/// Null node index constant
pub const NULL_IDX: NodeIndex = NodeIndex::MAX;

/// One way into a triangle reached by the search
///
/// A triangle entered across different edges gives different nodes, since
/// the corners the search may turn around next depend on the entry edge.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Point where the channel enters the triangle
    pub pos: Vec2,
    /// Cost from the start to `pos`
    pub cost: f64,
    /// Cost plus the estimate to the goal
    pub total: f64,
    /// Index of the parent node
    pub parent: NodeIndex,
    pub flags: NodeFlags,
    /// Triangle id
    pub id: u32,
    /// Edge crossed to enter the triangle, its left face being the
    /// triangle; [`EdgeId::NULL`] for the start
    pub entry: EdgeId,
}

impl SearchNode {
    fn new(entry: EdgeId, id: u32) -> Self {
        Self {
            pos: Vec2::ZERO,
            cost: 0.0,
            total: 0.0,
            parent: NULL_IDX,
            flags: NodeFlags::default(),
            id,
            entry,
        }
    }
}

/// Fixed-capacity node storage with a hashed lookup by entry edge
pub struct NodePool {
    nodes: Vec<SearchNode>,
    /// First node index for each hash bucket
    first: Vec<NodeIndex>,
    /// Next node index in hash chain
    next: Vec<NodeIndex>,
    max_nodes: usize,
    hash_size: usize,
}

impl NodePool {
    /// Creates a pool; `hash_size` is rounded up to a power of two
    pub fn new(max_nodes: usize, hash_size: usize) -> Self {
        let hash_size = hash_size.max(1).next_power_of_two();
        Self {
            nodes: Vec::with_capacity(max_nodes),
            first: vec![NULL_IDX; hash_size],
            next: Vec::with_capacity(max_nodes),
            max_nodes,
            hash_size,
        }
    }

    pub fn clear(&mut self) {
        self.first.fill(NULL_IDX);
        self.next.clear();
        self.nodes.clear();
    }

    /// Gets or allocates the node entering triangle `id` across `entry`;
    /// `None` once the pool is full
    pub fn get_node(&mut self, entry: EdgeId, id: u32) -> Option<NodeIndex> {
        if let Some(idx) = self.find_node(entry) {
            return Some(idx);
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }

        let idx = self.nodes.len() as NodeIndex;
        let hash = self.bucket(entry);
        self.nodes.push(SearchNode::new(entry, id));
        self.next.push(self.first[hash]);
        self.first[hash] = idx;
        Some(idx)
    }

    pub fn find_node(&self, entry: EdgeId) -> Option<NodeIndex> {
        let mut idx = self.first[self.bucket(entry)];
        while idx != NULL_IDX {
            if self.nodes[idx as usize].entry == entry {
                return Some(idx);
            }
            idx = self.next[idx as usize];
        }
        None
    }

    pub fn node(&self, idx: NodeIndex) -> &SearchNode {
        &self.nodes[idx as usize]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut SearchNode {
        &mut self.nodes[idx as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    fn bucket(&self, entry: EdgeId) -> usize {
        // Primal slots are even
        let a = entry.index() >> 1;
        (a ^ (a >> 16)) & (self.hash_size - 1)
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapNode {
    index: NodeIndex,
    total: f64,
    seq: u64,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties pop in push order
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Open list ordered by total cost
///
/// Improving a node pushes a second entry; stale entries are told apart by
/// their recorded total when popped.
#[derive(Default)]
pub struct NodeQueue {
    heap: BinaryHeap<HeapNode>,
    seq: u64,
}

impl NodeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.seq = 0;
    }

    pub fn push(&mut self, index: NodeIndex, total: f64) {
        self.heap.push(HeapNode {
            index,
            total,
            seq: self.seq,
        });
        self.seq += 1;
    }

    /// Pops the cheapest entry as `(index, total at push time)`
    pub fn pop(&mut self) -> Option<(NodeIndex, f64)> {
        self.heap.pop().map(|n| (n.index, n.total))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
