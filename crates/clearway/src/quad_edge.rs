//! Quad-edge mesh
//!
//! Guibas–Stolfi quad-edge structure stored in a flat arena. Every undirected
//! edge owns four consecutive slots: the two primal directions (`0`, `2`) and
//! the two dual directions (`1`, `3`). `rot`, `sym` and `inv_rot` are plain bit
//! arithmetic on the slot index.
//!
//! Each primal slot caches the id of its left triangle and the clearance of
//! the corner at its origin inside that triangle. Per-quad data holds the
//! sorted constraint list shared by both directions.

use clearway_common::{Handle, Pool, Vec2};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Vertex handle
pub type VertexId = Handle;

/// Triangle id of the single unbounded face outside the domain rectangle
pub const EXTERIOR: u32 = 0;

/// Triangle id carried by faces that have not been tagged yet
const UNASSIGNED: u32 = u32::MAX;

/// Directed edge handle (slot index in the quad-edge arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    /// Edge that never refers to a live slot
    pub const NULL: EdgeId = EdgeId(u32::MAX);

    #[inline]
    pub fn rot(self) -> EdgeId {
        EdgeId((self.0 & !3) | (self.0.wrapping_add(1) & 3))
    }

    #[inline]
    pub fn sym(self) -> EdgeId {
        EdgeId(self.0 ^ 2)
    }

    #[inline]
    pub fn inv_rot(self) -> EdgeId {
        EdgeId((self.0 & !3) | (self.0.wrapping_add(3) & 3))
    }

    /// Index of the owning quad
    #[inline]
    pub fn quad(self) -> usize {
        (self.0 >> 2) as usize
    }

    /// Raw slot index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The primal edge of the quad with slot offset 0
    #[inline]
    pub fn canonical(self) -> EdgeId {
        EdgeId(self.0 & !3)
    }

    #[inline]
    pub fn is_primal(self) -> bool {
        self.0 & 1 == 0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Mesh vertex
#[derive(Debug, Clone)]
pub struct Vertex {
    pub(crate) pos: Vec2,
    /// One outgoing edge, entry point of the vertex ring
    pub(crate) edge: EdgeId,
    pub(crate) mark: u32,
    /// Number of point obstacles located at this vertex
    pub(crate) point_constraints: u32,
    /// Inserted by refinement rather than by an obstacle
    pub(crate) steiner: bool,
    /// One of the four domain corners
    pub(crate) corner: bool,
}

impl Vertex {
    pub fn position(&self) -> Vec2 {
        self.pos
    }

    pub fn point_constraints(&self) -> u32 {
        self.point_constraints
    }

    pub fn is_steiner(&self) -> bool {
        self.steiner
    }

    pub fn is_corner(&self) -> bool {
        self.corner
    }
}

#[derive(Debug, Clone)]
struct Slot {
    next: EdgeId,
    org: VertexId,
    tri: u32,
    clearance: f64,
}

#[derive(Debug, Clone, Default)]
struct Quad {
    constraints: SmallVec<[u32; 4]>,
    fixed: bool,
    refine_failed: bool,
    mark: u32,
    alive: bool,
}

/// Quad-edge arena plus vertex storage
#[derive(Debug, Clone)]
pub struct Mesh {
    slots: Vec<Slot>,
    quads: Vec<Quad>,
    free_quads: Vec<u32>,
    vertices: Pool<Vertex>,
    next_tri: u32,
    cycle_first_tri: u32,
    destroyed: BTreeSet<u32>,
    mark: u32,
}

impl Mesh {
    pub fn with_capacity(vertices: usize) -> Self {
        // Euler: roughly three edges per vertex
        let quads = vertices * 3 + 8;
        Self {
            slots: Vec::with_capacity(quads * 4),
            quads: Vec::with_capacity(quads),
            free_quads: Vec::new(),
            vertices: Pool::with_capacity(vertices),
            next_tri: EXTERIOR + 1,
            cycle_first_tri: EXTERIOR + 1,
            destroyed: BTreeSet::new(),
            mark: 0,
        }
    }

    /// Builds the domain rectangle split by one diagonal.
    ///
    /// Returns the corner vertices counter-clockwise starting at `min`.
    pub fn bootstrap(&mut self, min: Vec2, max: Vec2) -> [VertexId; 4] {
        let corners = [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ];
        let v = corners.map(|p| {
            let id = self.add_vertex(p);
            self.vertices[id].corner = true;
            id
        });

        let e: [EdgeId; 4] = std::array::from_fn(|i| self.make_edge(v[i], v[(i + 1) % 4]));
        for i in 0..4 {
            self.splice(e[i].sym(), e[(i + 1) % 4]);
        }
        for &edge in &e {
            self.quads[edge.quad()].fixed = true;
            self.slots[edge.sym().index()].tri = EXTERIOR;
        }

        let diagonal = self.connect(e[1], e[0]);
        self.retag_face(diagonal);
        self.retag_face(diagonal.sym());
        v
    }

    // ---- vertices -------------------------------------------------------

    pub fn add_vertex(&mut self, pos: Vec2) -> VertexId {
        self.vertices.insert(Vertex {
            pos,
            edge: EdgeId::NULL,
            mark: 0,
            point_constraints: 0,
            steiner: false,
            corner: false,
        })
    }

    /// Drops an isolated vertex
    pub fn remove_vertex(&mut self, v: VertexId) {
        self.vertices.remove(v);
    }

    #[inline]
    pub fn vertex(&self, v: VertexId) -> &Vertex {
        &self.vertices[v]
    }

    #[inline]
    pub fn vertex_mut(&mut self, v: VertexId) -> &mut Vertex {
        &mut self.vertices[v]
    }

    #[inline]
    pub fn position(&self, v: VertexId) -> Vec2 {
        self.vertices[v].pos
    }

    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.vertices.contains(v)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter()
    }

    /// Outgoing edges of `v` in counter-clockwise order
    pub fn ring(&self, v: VertexId) -> RingIter<'_> {
        let start = self.vertices[v].edge;
        RingIter {
            mesh: self,
            start,
            current: start,
            done: start.is_null(),
        }
    }

    /// Outgoing edge of `v` whose left face is a triangle
    pub fn interior_edge(&self, v: VertexId) -> Option<EdgeId> {
        self.ring(v).find(|&e| !self.is_exterior(e))
    }

    /// Outgoing edge of `a` that ends at `b`
    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeId> {
        self.ring(a).find(|&e| self.dest(e) == b)
    }

    // ---- traversal ------------------------------------------------------

    #[inline]
    pub fn onext(&self, e: EdgeId) -> EdgeId {
        self.slots[e.index()].next
    }

    #[inline]
    pub fn oprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e.rot()).rot()
    }

    #[inline]
    pub fn lnext(&self, e: EdgeId) -> EdgeId {
        self.onext(e.inv_rot()).rot()
    }

    #[inline]
    pub fn lprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e).sym()
    }

    #[inline]
    pub fn dnext(&self, e: EdgeId) -> EdgeId {
        self.onext(e.sym()).sym()
    }

    #[inline]
    pub fn dprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e.inv_rot()).inv_rot()
    }

    #[inline]
    pub fn rnext(&self, e: EdgeId) -> EdgeId {
        self.onext(e.rot()).inv_rot()
    }

    #[inline]
    pub fn rprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e.sym())
    }

    #[inline]
    pub fn org(&self, e: EdgeId) -> VertexId {
        self.slots[e.index()].org
    }

    #[inline]
    pub fn dest(&self, e: EdgeId) -> VertexId {
        self.slots[e.sym().index()].org
    }

    #[inline]
    pub fn org_pos(&self, e: EdgeId) -> Vec2 {
        self.position(self.org(e))
    }

    #[inline]
    pub fn dest_pos(&self, e: EdgeId) -> Vec2 {
        self.position(self.dest(e))
    }

    /// Third vertex of the left triangle of `e`
    #[inline]
    pub fn apex(&self, e: EdgeId) -> VertexId {
        self.dest(self.lnext(e))
    }

    pub fn length(&self, e: EdgeId) -> f64 {
        self.org_pos(e).distance(self.dest_pos(e))
    }

    // ---- topology -------------------------------------------------------

    /// Creates an isolated edge from `org` to `dest`
    pub fn make_edge(&mut self, org: VertexId, dest: VertexId) -> EdgeId {
        let q = match self.free_quads.pop() {
            Some(q) => q,
            None => {
                let q = self.quads.len() as u32;
                self.quads.push(Quad::default());
                for _ in 0..4 {
                    self.slots.push(Slot {
                        next: EdgeId::NULL,
                        org: VertexId::NULL,
                        tri: UNASSIGNED,
                        clearance: 0.0,
                    });
                }
                q
            }
        };

        let base = q << 2;
        let links = [base, base + 3, base + 2, base + 1];
        for (offset, next) in links.into_iter().enumerate() {
            let slot = &mut self.slots[base as usize + offset];
            slot.next = EdgeId(next);
            slot.org = VertexId::NULL;
            slot.tri = UNASSIGNED;
            slot.clearance = 0.0;
        }
        self.quads[q as usize] = Quad {
            alive: true,
            ..Quad::default()
        };

        let e = EdgeId(base);
        self.set_org(e, org);
        self.set_org(e.sym(), dest);
        e
    }

    fn set_org(&mut self, e: EdgeId, v: VertexId) {
        self.slots[e.index()].org = v;
        let vertex = &mut self.vertices[v];
        if vertex.edge.is_null() {
            vertex.edge = e;
        }
    }

    /// Guibas–Stolfi splice. Its own inverse.
    pub fn splice(&mut self, a: EdgeId, b: EdgeId) {
        let alpha = self.onext(a).rot();
        let beta = self.onext(b).rot();

        let t1 = self.onext(b);
        let t2 = self.onext(a);
        let t3 = self.onext(beta);
        let t4 = self.onext(alpha);

        self.slots[a.index()].next = t1;
        self.slots[b.index()].next = t2;
        self.slots[alpha.index()].next = t3;
        self.slots[beta.index()].next = t4;
    }

    /// New edge from `a.dest` to `b.org` sharing the left face of `a` and `b`
    pub fn connect(&mut self, a: EdgeId, b: EdgeId) -> EdgeId {
        let e = self.make_edge(self.dest(a), self.org(b));
        let a_next = self.lnext(a);
        self.splice(e, a_next);
        self.splice(e.sym(), b);
        e
    }

    /// Removes `e`, merging its two faces
    pub fn delete_edge(&mut self, e: EdgeId) {
        self.detach_from_vertex(e);
        self.detach_from_vertex(e.sym());
        self.record_destroyed(self.tri(e));
        self.record_destroyed(self.tri(e.sym()));

        let a = self.oprev(e);
        self.splice(e, a);
        let b = self.oprev(e.sym());
        self.splice(e.sym(), b);

        let q = e.quad();
        self.quads[q].alive = false;
        self.quads[q].constraints.clear();
        self.free_quads.push(q as u32);
    }

    /// Moves the ring entry of `org(e)` away from `e`
    fn detach_from_vertex(&mut self, e: EdgeId) {
        let v = self.org(e);
        if self.vertices[v].edge == e {
            let alt = self.onext(e);
            self.vertices[v].edge = if alt == e { EdgeId::NULL } else { alt };
        }
    }

    /// Flips `e` to the other diagonal of the quadrilateral formed by its two faces
    pub fn swap(&mut self, e: EdgeId) {
        self.detach_from_vertex(e);
        self.detach_from_vertex(e.sym());

        let a = self.oprev(e);
        let b = self.oprev(e.sym());
        self.splice(e, a);
        self.splice(e.sym(), b);
        let a_next = self.lnext(a);
        self.splice(e, a_next);
        let b_next = self.lnext(b);
        self.splice(e.sym(), b_next);

        let (da, db) = (self.dest(a), self.dest(b));
        self.set_org(e, da);
        self.set_org(e.sym(), db);

        self.retag_face(e);
        self.retag_face(e.sym());
    }

    /// Splits `e` at the new vertex `p`, shortening `e` to `org(e) -> p` and
    /// adding `p -> dest(e)`.
    ///
    /// Both faces are connected to `p` unless they are the exterior face.
    /// The new half inherits the constraint data of `e`. Returns the new half.
    pub fn split_edge(&mut self, e: EdgeId, p: VertexId) -> EdgeId {
        let left_exterior = self.is_exterior(e);
        let right_exterior = self.is_exterior(e.sym());
        let b = self.dest(e);
        let es = e.sym();

        self.detach_from_vertex(es);
        let x = self.oprev(es);
        self.splice(es, x);
        self.slots[es.index()].org = p;
        self.vertices[p].edge = es;

        let n = self.make_edge(p, b);
        self.splice(n, es);
        self.splice(n.sym(), x);

        let data = self.quads[e.quad()].clone();
        self.quads[n.quad()] = data;

        if left_exterior {
            self.slots[n.index()].tri = EXTERIOR;
        } else {
            // face a -> p -> b -> c
            let c_edge = self.lnext(n);
            let opposite = self.lnext(c_edge);
            let spoke = self.connect(e, opposite);
            self.retag_face(spoke);
            self.retag_face(spoke.sym());
        }

        if right_exterior {
            self.slots[n.sym().index()].tri = EXTERIOR;
        } else {
            // face p -> a -> d -> b
            let d_edge = self.lnext(self.lnext(es));
            let spoke = self.connect(n.sym(), d_edge);
            self.retag_face(spoke);
            self.retag_face(spoke.sym());
        }

        n
    }

    /// Inserts `p` inside the left triangle of `e`, connecting it to the three corners.
    ///
    /// Returns the spoke from the origin of `e` to `p`.
    pub fn split_face(&mut self, e: EdgeId, p: VertexId) -> EdgeId {
        let first = self.org(e);
        let mut base = self.make_edge(first, p);
        self.splice(base, e);
        let spoke = base;

        let mut edge = e;
        loop {
            base = self.connect(edge, base.sym());
            edge = self.oprev(base);
            if self.dest(edge) == first {
                break;
            }
        }

        let out = spoke.sym();
        for s in [out, self.onext(out), self.oprev(out)] {
            self.retag_face(s);
        }
        spoke
    }

    /// Detaches the collinear vertex between `e` (`x -> v`) and `n` (`v -> y`)
    /// so that `e` runs from `x` to `y`.
    ///
    /// `v` must have exactly these two edges.
    pub fn unsplit_edge(&mut self, e: EdgeId, n: EdgeId) {
        let v = self.dest(e);
        assert!(
            self.org(n) == v && self.onext(n) == e.sym() && self.onext(e.sym()) == n,
            "unsplit requires a vertex of degree two"
        );
        let y = self.dest(n);

        self.splice(n, e.sym());
        self.detach_from_vertex(n.sym());
        let y_prev = self.oprev(n.sym());
        self.splice(n.sym(), y_prev);
        self.splice(e.sym(), y_prev);
        self.slots[e.sym().index()].org = y;
        if self.vertices[y].edge.is_null() {
            self.vertices[y].edge = e.sym();
        }

        let right = self.tri(n.sym());
        self.slots[e.sym().index()].tri = right;
        self.vertices[v].edge = EdgeId::NULL;

        let q = n.quad();
        self.quads[q].alive = false;
        self.quads[q].constraints.clear();
        self.free_quads.push(q as u32);
    }

    // ---- faces ----------------------------------------------------------

    #[inline]
    pub fn tri(&self, e: EdgeId) -> u32 {
        self.slots[e.index()].tri
    }

    #[inline]
    pub fn is_exterior(&self, e: EdgeId) -> bool {
        self.tri(e) == EXTERIOR
    }

    /// Assigns a fresh triangle id to the left face of `e`
    pub fn retag_face(&mut self, e: EdgeId) {
        let e1 = self.lnext(e);
        let e2 = self.lnext(e1);
        assert!(self.lnext(e2) == e, "left face of {e:?} is not a triangle");

        let id = self.next_tri;
        self.next_tri += 1;
        for edge in [e, e1, e2] {
            let old = self.tri(edge);
            self.record_destroyed(old);
            self.slots[edge.index()].tri = id;
        }
    }

    /// Marks the face of `e` exterior after the hole left by a boundary vertex closed
    pub fn set_exterior(&mut self, e: EdgeId) {
        self.slots[e.index()].tri = EXTERIOR;
    }

    fn record_destroyed(&mut self, id: u32) {
        if id != EXTERIOR && id < self.cycle_first_tri {
            self.destroyed.insert(id);
        }
    }

    /// Starts a new edit cycle; triangles created from now on are not reported as destroyed
    pub fn begin_cycle(&mut self) {
        self.cycle_first_tri = self.next_tri;
        self.destroyed.clear();
    }

    /// Sorted ids of pre-cycle triangles invalidated during the current cycle
    pub fn destroyed(&self) -> &BTreeSet<u32> {
        &self.destroyed
    }

    /// Primal edges bounding a triangle, one per triangle
    pub fn triangles(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges()
            .flat_map(|e| [e, e.sym()])
            .filter(move |&e| {
                !self.is_exterior(e) && {
                    let e1 = self.lnext(e);
                    let e2 = self.lnext(e1);
                    e < e1 && e < e2
                }
            })
    }

    // ---- quad data ------------------------------------------------------

    /// Canonical edge of every live quad
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.quads
            .iter()
            .enumerate()
            .filter(|(_, q)| q.alive)
            .map(|(i, _)| EdgeId((i as u32) << 2))
    }

    pub fn edge_count(&self) -> usize {
        self.quads.len() - self.free_quads.len()
    }

    pub fn is_alive(&self, e: EdgeId) -> bool {
        self.quads.get(e.quad()).map_or(false, |q| q.alive)
    }

    /// Constrained edges block traversal: tagged by an obstacle or fixed
    #[inline]
    pub fn is_constrained(&self, e: EdgeId) -> bool {
        let q = &self.quads[e.quad()];
        q.fixed || !q.constraints.is_empty()
    }

    #[inline]
    pub fn constraints(&self, e: EdgeId) -> &[u32] {
        &self.quads[e.quad()].constraints
    }

    pub fn has_constraint(&self, e: EdgeId, id: u32) -> bool {
        self.quads[e.quad()].constraints.binary_search(&id).is_ok()
    }

    /// Adds `id` keeping the list sorted. Returns false if it was present.
    pub fn add_constraint(&mut self, e: EdgeId, id: u32) -> bool {
        let list = &mut self.quads[e.quad()].constraints;
        match list.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                list.insert(pos, id);
                true
            }
        }
    }

    pub fn remove_constraint(&mut self, e: EdgeId, id: u32) -> bool {
        let list = &mut self.quads[e.quad()].constraints;
        match list.binary_search(&id) {
            Ok(pos) => {
                list.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub fn is_fixed(&self, e: EdgeId) -> bool {
        self.quads[e.quad()].fixed
    }

    pub fn set_fixed(&mut self, e: EdgeId, fixed: bool) {
        self.quads[e.quad()].fixed = fixed;
    }

    #[inline]
    pub fn refine_failed(&self, e: EdgeId) -> bool {
        self.quads[e.quad()].refine_failed
    }

    pub fn set_refine_failed(&mut self, e: EdgeId, failed: bool) {
        self.quads[e.quad()].refine_failed = failed;
    }

    /// Two edges carry the same constraint set and flags
    pub fn same_constraints(&self, a: EdgeId, b: EdgeId) -> bool {
        let (qa, qb) = (&self.quads[a.quad()], &self.quads[b.quad()]);
        qa.fixed == qb.fixed && qa.constraints == qb.constraints
    }

    // ---- clearance cache ------------------------------------------------

    /// Cached clearance of the corner at `org(e)` inside the left triangle of `e`
    #[inline]
    pub fn corner_clearance(&self, e: EdgeId) -> f64 {
        self.slots[e.index()].clearance
    }

    pub fn set_corner_clearance(&mut self, e: EdgeId, value: f64) {
        self.slots[e.index()].clearance = value;
    }

    // ---- marks ----------------------------------------------------------

    /// Fresh mark value; anything tagged with an older mark counts as unvisited
    pub fn next_mark(&mut self) -> u32 {
        self.mark = self.mark.wrapping_add(1);
        if self.mark == 0 {
            for q in &mut self.quads {
                q.mark = 0;
            }
            let handles: Vec<_> = self.vertices.handles().collect();
            for v in handles {
                self.vertices[v].mark = 0;
            }
            self.mark = 1;
        }
        self.mark
    }

    /// Tags the quad of `e`; returns false if it already carried `mark`
    pub fn mark_quad(&mut self, e: EdgeId, mark: u32) -> bool {
        let q = &mut self.quads[e.quad()];
        if q.mark == mark {
            false
        } else {
            q.mark = mark;
            true
        }
    }

    /// Tags `v`; returns false if it already carried `mark`
    pub fn mark_vertex(&mut self, v: VertexId, mark: u32) -> bool {
        let vertex = &mut self.vertices[v];
        if vertex.mark == mark {
            false
        } else {
            vertex.mark = mark;
            true
        }
    }
}

/// Counter-clockwise iterator over the outgoing edges of a vertex
pub struct RingIter<'a> {
    mesh: &'a Mesh,
    start: EdgeId,
    current: EdgeId,
    done: bool,
}

impl Iterator for RingIter<'_> {
    type Item = EdgeId;

    fn next(&mut self) -> Option<EdgeId> {
        if self.done {
            return None;
        }
        let e = self.current;
        self.current = self.mesh.onext(e);
        if self.current == self.start {
            self.done = true;
        }
        Some(e)
    }
}
