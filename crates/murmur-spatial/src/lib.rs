//! Quadtree spatial index for moving 2D objects.
//!
//! This crate provides the spatial backbone of the murmur simulation:
//!
//! - [`Aabb2`] - 2D axis-aligned bounding box with quadrant subdivision
//! - [`Quadtree`] - region quadtree over a fixed domain, built for objects
//!   that move every tick: insertion, removal, incremental position updates,
//!   radius queries, and debug outline gathering
//!
//! Tree nodes live in an index-addressed arena and tracked objects are
//! referred to by generational [`SpatialHandle`]s, so re-indexing a moving
//! object touches only the path between its old and new leaf.
//!
//! # Example
//!
//! ```
//! use glam::Vec2;
//! use murmur_spatial::{Aabb2, Quadtree};
//!
//! let domain = Aabb2::from_center_half_extents(Vec2::ZERO, Vec2::splat(1000.0));
//! let mut tree = Quadtree::new(domain, 7);
//!
//! let a = tree.insert(Vec2::new(10.0, 20.0), "a");
//! let _b = tree.insert(Vec2::new(400.0, -250.0), "b");
//!
//! let mut hits = Vec::new();
//! tree.query_radius(Vec2::ZERO, 50.0, &mut hits);
//! assert_eq!(hits, vec![a]);
//! ```

use glam::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Aabb2
// ============================================================================

/// 2D axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb2 {
    /// Minimum corner (lower-left).
    pub min: Vec2,
    /// Maximum corner (upper-right).
    pub max: Vec2,
}

impl Aabb2 {
    /// Creates a new AABB from min and max corners.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Creates an AABB from center and half-extents.
    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Returns the center of the AABB.
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Returns the size of the AABB.
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Returns the half-extents of the AABB.
    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Checks if this AABB contains a point (closed on all edges).
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Returns the point inside the AABB closest to `point`.
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min, self.max)
    }

    /// Returns the four quadrant AABBs when subdividing this AABB.
    ///
    /// Order is SW, SE, NW, NE, matching [`Quadtree`]'s child layout.
    pub fn quadrants(&self) -> [Aabb2; 4] {
        let center = self.center();
        [
            Aabb2::new(self.min, center),
            Aabb2::new(
                Vec2::new(center.x, self.min.y),
                Vec2::new(self.max.x, center.y),
            ),
            Aabb2::new(
                Vec2::new(self.min.x, center.y),
                Vec2::new(center.x, self.max.y),
            ),
            Aabb2::new(center, self.max),
        ]
    }
}

// ============================================================================
// Quadtree
// ============================================================================

/// Default occupancy above which a leaf subdivides.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 8;

/// Default subtree occupancy at or below which an internal node collapses.
pub const DEFAULT_MERGE_THRESHOLD: usize = 4;

const NIL: u32 = u32::MAX;

/// Opaque handle to an object tracked by a [`Quadtree`].
///
/// Handles are generational: once the object is removed, its handle goes
/// stale and any further use of it is rejected loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpatialHandle {
    index: u32,
    generation: u32,
}

/// A node in the quadtree arena.
#[derive(Debug)]
struct Node {
    rect: Aabb2,
    depth: u8,
    parent: u32,
    /// Total occupancy of this node's subtree.
    count: usize,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    /// Leaf node holding slot indices of the objects it contains.
    Leaf { entries: Vec<u32> },
    /// Internal node with four children in SW, SE, NW, NE order.
    Internal { children: [u32; 4] },
}

/// Storage for one tracked object.
#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    position: Vec2,
    /// Arena index of the leaf currently holding this object.
    node: u32,
    /// Set once the out-of-domain clamp warning has fired for this object.
    warned: bool,
    data: Option<T>,
}

/// A region quadtree over a fixed square domain, tuned for moving objects.
///
/// Each tracked object is a point with associated data. Leaves subdivide when
/// their occupancy exceeds the split threshold (unless every contained object
/// sits at the exact same position, or the leaf is at maximum depth), and an
/// internal node collapses back into a leaf when its subtree occupancy falls
/// to the merge threshold or below. The merge threshold is strictly less than
/// the split threshold so the tree cannot oscillate.
///
/// Ownership of positions is half-open: an object on a leaf's interior right
/// or top edge belongs to the neighboring leaf. The domain's own max edges
/// are closed; positions outside the domain are clamped to its boundary (with
/// a warning, once per object).
#[derive(Debug)]
pub struct Quadtree<T> {
    nodes: Vec<Node>,
    free_nodes: Vec<u32>,
    slots: Vec<Slot<T>>,
    free_slots: Vec<u32>,
    root: u32,
    domain: Aabb2,
    max_depth: u8,
    split_threshold: usize,
    merge_threshold: usize,
    len: usize,
}

/// Child index for `position` under a node centered at `center`.
///
/// Bit 0 is east (`x >= center.x`), bit 1 is north (`y >= center.y`), which
/// yields the SW, SE, NW, NE layout of [`Aabb2::quadrants`] and the half-open
/// ownership convention.
fn quadrant_index(center: Vec2, position: Vec2) -> usize {
    (position.x >= center.x) as usize | (((position.y >= center.y) as usize) << 1)
}

impl<T> Quadtree<T> {
    /// Creates a quadtree over `domain` with the default split and merge
    /// thresholds.
    ///
    /// # Panics
    ///
    /// Panics if `domain` has non-positive area.
    pub fn new(domain: Aabb2, max_depth: u8) -> Self {
        Self::with_thresholds(
            domain,
            max_depth,
            DEFAULT_SPLIT_THRESHOLD,
            DEFAULT_MERGE_THRESHOLD,
        )
    }

    /// Creates a quadtree with explicit split and merge thresholds.
    ///
    /// # Panics
    ///
    /// Panics if `domain` has non-positive area, if `split_threshold` is
    /// zero, or if `merge_threshold` is not strictly less than
    /// `split_threshold`.
    pub fn with_thresholds(
        domain: Aabb2,
        max_depth: u8,
        split_threshold: usize,
        merge_threshold: usize,
    ) -> Self {
        let size = domain.size();
        assert!(
            size.x > 0.0 && size.y > 0.0,
            "quadtree: domain {domain:?} has non-positive area"
        );
        assert!(split_threshold > 0, "quadtree: split threshold must be > 0");
        assert!(
            merge_threshold < split_threshold,
            "quadtree: merge threshold ({merge_threshold}) must be strictly less than split threshold ({split_threshold})"
        );

        let root = Node {
            rect: domain,
            depth: 0,
            parent: NIL,
            count: 0,
            kind: NodeKind::Leaf {
                entries: Vec::with_capacity(split_threshold + 1),
            },
        };
        Self {
            nodes: vec![root],
            free_nodes: Vec::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            root: 0,
            domain,
            max_depth,
            split_threshold,
            merge_threshold,
            len: 0,
        }
    }

    /// Returns the domain rectangle covered by the root.
    pub fn domain(&self) -> Aabb2 {
        self.domain
    }

    /// Returns the number of tracked objects.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no objects are tracked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `handle` still refers to a tracked object.
    pub fn contains(&self, handle: SpatialHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.data.is_some())
    }

    /// Returns the indexed position of a tracked object.
    ///
    /// This is the position as the index sees it, i.e. after domain clamping.
    pub fn position(&self, handle: SpatialHandle) -> Vec2 {
        let index = self.check_handle(handle, "position");
        self.slots[index as usize].position
    }

    /// Returns a reference to a tracked object's data.
    pub fn get(&self, handle: SpatialHandle) -> &T {
        let index = self.check_handle(handle, "get");
        self.slots[index as usize].data.as_ref().unwrap()
    }

    /// Returns a mutable reference to a tracked object's data.
    pub fn get_mut(&mut self, handle: SpatialHandle) -> &mut T {
        let index = self.check_handle(handle, "get_mut");
        self.slots[index as usize].data.as_mut().unwrap()
    }

    /// Inserts an object and returns its handle.
    ///
    /// A position outside the domain is clamped to the nearest point on the
    /// boundary; the clamp is reported through `tracing::warn!` once per
    /// object. Descends to the owning leaf and subdivides it as needed.
    pub fn insert(&mut self, position: Vec2, data: T) -> SpatialHandle {
        let (position, clamped) = self.clamp_to_domain(position);
        let index = self.alloc_slot(position, clamped, data);
        let generation = self.slots[index as usize].generation;

        let leaf = self.leaf_for(position);
        self.attach(index, leaf);
        self.split_if_needed(leaf);
        self.len += 1;

        SpatialHandle { index, generation }
    }

    /// Removes an object and returns its data.
    ///
    /// Ancestors whose subtree occupancy falls to the merge threshold or
    /// below are collapsed back into leaves.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is stale or was never issued by this tree.
    pub fn remove(&mut self, handle: SpatialHandle) -> T {
        let index = self.check_handle(handle, "remove");
        let leaf = self.slots[index as usize].node;

        self.detach(index, leaf);
        self.merge_vacated(leaf, NIL);

        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.node = NIL;
        let data = slot.data.take().unwrap();
        self.free_slots.push(index);
        self.len -= 1;
        data
    }

    /// Moves an object to a new position.
    ///
    /// When the object's current leaf still owns the new position no
    /// structural work happens. Otherwise the object is re-attached along the
    /// shortest common-ancestor path: counts are decremented up the vacated
    /// branch and incremented down the receiving one, the vacated branch is
    /// collapsed if it fell to the merge threshold, and the receiving leaf is
    /// subdivided if it overflowed. Out-of-domain positions clamp exactly as
    /// in [`Quadtree::insert`].
    ///
    /// # Panics
    ///
    /// Panics if `handle` is stale or was never issued by this tree.
    pub fn update(&mut self, handle: SpatialHandle, position: Vec2) {
        let index = self.check_handle(handle, "update");
        let (position, clamped) = self.clamp_to_domain(position);
        if clamped && !self.slots[index as usize].warned {
            tracing::warn!(
                ?position,
                "object position outside quadtree domain, clamped to boundary"
            );
            self.slots[index as usize].warned = true;
        }

        let old_leaf = self.slots[index as usize].node;
        if self.node_owns(old_leaf, position) {
            self.slots[index as usize].position = position;
            return;
        }

        // Leave the old leaf, then climb to the lowest ancestor owning the
        // new position, shedding one count at every node left behind.
        self.detach_entry_only(index, old_leaf);
        self.slots[index as usize].position = position;

        let mut cur = old_leaf;
        while !self.node_owns(cur, position) {
            self.nodes[cur as usize].count -= 1;
            cur = self.nodes[cur as usize].parent;
        }
        let lca = cur;

        // Descend to the receiving leaf, growing counts on the way down.
        let mut cur = lca;
        loop {
            match &self.nodes[cur as usize].kind {
                NodeKind::Leaf { .. } => break,
                NodeKind::Internal { children } => {
                    let q = quadrant_index(self.nodes[cur as usize].rect.center(), position);
                    cur = children[q];
                    self.nodes[cur as usize].count += 1;
                }
            }
        }
        let new_leaf = cur;
        self.push_entry(index, new_leaf);

        self.merge_vacated(old_leaf, lca);
        self.split_if_needed(new_leaf);
    }

    /// Appends every object within `radius` of `center` to `out`.
    ///
    /// Nodes whose rectangle lies entirely outside the circle are pruned.
    /// The result order is unspecified but deterministic for a given tree
    /// state. A negative radius yields no results.
    pub fn query_radius(&self, center: Vec2, radius: f32, out: &mut Vec<SpatialHandle>) {
        if radius < 0.0 {
            return;
        }
        self.query_node(self.root, center, radius * radius, out);
    }

    /// Appends the endpoints of every node boundary as line segments.
    ///
    /// Each rectangle contributes four segments (eight points). Purely a
    /// debug aid; does not touch tree state.
    pub fn gather_outlines(&self, out: &mut Vec<Vec2>) {
        self.outline_node(self.root, out);
    }

    /// Walks the whole tree and panics on any violated invariant.
    ///
    /// Intended for tests and debugging after a batch of mutations.
    pub fn check_invariants(&self) {
        let root = &self.nodes[self.root as usize];
        assert_eq!(root.rect, self.domain, "root rect must equal the domain");
        assert_eq!(root.depth, 0, "root depth must be zero");
        assert_eq!(root.parent, NIL, "root must have no parent");

        let mut seen = vec![false; self.slots.len()];
        let total = self.verify_node(self.root, &mut seen);
        assert_eq!(total, self.len, "tree occupancy does not match len()");
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.data.is_some() {
                assert!(seen[index], "tracked object {index} is in no leaf");
            }
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn clamp_to_domain(&self, position: Vec2) -> (Vec2, bool) {
        let clamped = position.clamp(self.domain.min, self.domain.max);
        (clamped, clamped != position)
    }

    fn check_handle(&self, handle: SpatialHandle, op: &str) -> u32 {
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.data.is_some() => {
                handle.index
            }
            _ => panic!("quadtree: {op} on {handle:?}, which is not indexed"),
        }
    }

    fn alloc_slot(&mut self, position: Vec2, clamped: bool, data: T) -> u32 {
        if clamped {
            tracing::warn!(
                ?position,
                "object position outside quadtree domain, clamped to boundary"
            );
        }
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.position = position;
            slot.node = NIL;
            slot.warned = clamped;
            slot.data = Some(data);
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                position,
                node: NIL,
                warned: clamped,
                data: Some(data),
            });
            (self.slots.len() - 1) as u32
        }
    }

    fn alloc_node(&mut self, rect: Aabb2, depth: u8, parent: u32) -> u32 {
        let kind = NodeKind::Leaf {
            entries: Vec::with_capacity(self.split_threshold + 1),
        };
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id as usize] = Node {
                rect,
                depth,
                parent,
                count: 0,
                kind,
            };
            id
        } else {
            self.nodes.push(Node {
                rect,
                depth,
                parent,
                count: 0,
                kind,
            });
            (self.nodes.len() - 1) as u32
        }
    }

    /// Half-open ownership test; the domain's own max edges are closed.
    fn node_owns(&self, id: u32, position: Vec2) -> bool {
        let rect = self.nodes[id as usize].rect;
        position.x >= rect.min.x
            && position.y >= rect.min.y
            && (position.x < rect.max.x || rect.max.x >= self.domain.max.x)
            && (position.y < rect.max.y || rect.max.y >= self.domain.max.y)
    }

    fn leaf_for(&self, position: Vec2) -> u32 {
        let mut cur = self.root;
        loop {
            match &self.nodes[cur as usize].kind {
                NodeKind::Leaf { .. } => return cur,
                NodeKind::Internal { children } => {
                    let q = quadrant_index(self.nodes[cur as usize].rect.center(), position);
                    cur = children[q];
                }
            }
        }
    }

    /// Adds a slot to a leaf and grows counts up to the root.
    fn attach(&mut self, index: u32, leaf: u32) {
        self.push_entry(index, leaf);
        let mut cur = leaf;
        loop {
            self.nodes[cur as usize].count += 1;
            let parent = self.nodes[cur as usize].parent;
            if parent == NIL {
                break;
            }
            cur = parent;
        }
    }

    fn push_entry(&mut self, index: u32, leaf: u32) {
        self.slots[index as usize].node = leaf;
        match &mut self.nodes[leaf as usize].kind {
            NodeKind::Leaf { entries } => entries.push(index),
            NodeKind::Internal { .. } => unreachable!("push_entry on internal node"),
        }
    }

    /// Removes a slot from its leaf and shrinks counts up to the root.
    fn detach(&mut self, index: u32, leaf: u32) {
        self.detach_entry_only(index, leaf);
        let mut cur = leaf;
        loop {
            self.nodes[cur as usize].count -= 1;
            let parent = self.nodes[cur as usize].parent;
            if parent == NIL {
                break;
            }
            cur = parent;
        }
    }

    fn detach_entry_only(&mut self, index: u32, leaf: u32) {
        match &mut self.nodes[leaf as usize].kind {
            NodeKind::Leaf { entries } => {
                let at = entries
                    .iter()
                    .position(|&entry| entry == index)
                    .expect("object missing from its leaf");
                entries.swap_remove(at);
            }
            NodeKind::Internal { .. } => unreachable!("detach from internal node"),
        }
    }

    fn entries_colocated(&self, entries: &[u32]) -> bool {
        let Some((&first, rest)) = entries.split_first() else {
            return true;
        };
        let position = self.slots[first as usize].position;
        rest.iter()
            .all(|&entry| self.slots[entry as usize].position == position)
    }

    /// Recursively subdivides a leaf that exceeded the split threshold.
    ///
    /// Leaves at maximum depth never split, and neither does a leaf whose
    /// objects all share the exact same position (subdividing could never
    /// separate them).
    fn split_if_needed(&mut self, id: u32) {
        let should_split = {
            let node = &self.nodes[id as usize];
            match &node.kind {
                NodeKind::Leaf { entries } => {
                    entries.len() > self.split_threshold
                        && node.depth < self.max_depth
                        && !self.entries_colocated(entries)
                }
                NodeKind::Internal { .. } => false,
            }
        };
        if !should_split {
            return;
        }

        let (rect, depth, entries) = {
            let node = &mut self.nodes[id as usize];
            let entries = match &mut node.kind {
                NodeKind::Leaf { entries } => std::mem::take(entries),
                NodeKind::Internal { .. } => unreachable!(),
            };
            (node.rect, node.depth, entries)
        };

        let quadrants = rect.quadrants();
        let mut children = [NIL; 4];
        for (quadrant, child) in quadrants.iter().zip(children.iter_mut()) {
            *child = self.alloc_node(*quadrant, depth + 1, id);
        }

        let center = rect.center();
        for entry in entries {
            let q = quadrant_index(center, self.slots[entry as usize].position);
            let child = children[q];
            self.nodes[child as usize].count += 1;
            self.push_entry(entry, child);
        }
        self.nodes[id as usize].kind = NodeKind::Internal { children };

        for child in children {
            self.split_if_needed(child);
        }
    }

    /// Collapses the topmost ancestor on the path `start..stop` whose
    /// subtree occupancy fell to the merge threshold or below.
    ///
    /// Collapsing the topmost qualifying node subsumes any lower candidates.
    fn merge_vacated(&mut self, start: u32, stop: u32) {
        let mut candidate = NIL;
        let mut cur = start;
        while cur != stop && cur != NIL {
            let node = &self.nodes[cur as usize];
            if matches!(node.kind, NodeKind::Internal { .. }) && node.count <= self.merge_threshold
            {
                candidate = cur;
            }
            cur = node.parent;
        }
        if candidate != NIL {
            self.collapse(candidate);
        }
    }

    /// Turns an internal node back into a leaf holding all surviving
    /// descendants, releasing the child nodes to the arena free list.
    fn collapse(&mut self, id: u32) {
        let kind = std::mem::replace(
            &mut self.nodes[id as usize].kind,
            NodeKind::Leaf {
                entries: Vec::new(),
            },
        );
        let mut gathered = Vec::with_capacity(self.nodes[id as usize].count);
        self.drain_into(kind, &mut gathered);
        for &entry in &gathered {
            self.slots[entry as usize].node = id;
        }
        self.nodes[id as usize].kind = NodeKind::Leaf { entries: gathered };
    }

    fn drain_into(&mut self, kind: NodeKind, out: &mut Vec<u32>) {
        match kind {
            NodeKind::Leaf { mut entries } => out.append(&mut entries),
            NodeKind::Internal { children } => {
                for child in children {
                    let kind = std::mem::replace(
                        &mut self.nodes[child as usize].kind,
                        NodeKind::Leaf {
                            entries: Vec::new(),
                        },
                    );
                    self.drain_into(kind, out);
                    self.free_nodes.push(child);
                }
            }
        }
    }

    fn query_node(&self, id: u32, center: Vec2, radius_sq: f32, out: &mut Vec<SpatialHandle>) {
        let node = &self.nodes[id as usize];
        if node.count == 0 {
            return;
        }
        if node.rect.closest_point(center).distance_squared(center) > radius_sq {
            return;
        }
        match &node.kind {
            NodeKind::Leaf { entries } => {
                for &entry in entries {
                    let slot = &self.slots[entry as usize];
                    if slot.position.distance_squared(center) <= radius_sq {
                        out.push(SpatialHandle {
                            index: entry,
                            generation: slot.generation,
                        });
                    }
                }
            }
            NodeKind::Internal { children } => {
                for &child in children {
                    self.query_node(child, center, radius_sq, out);
                }
            }
        }
    }

    fn outline_node(&self, id: u32, out: &mut Vec<Vec2>) {
        let rect = self.nodes[id as usize].rect;
        let (lo, hi) = (rect.min, rect.max);
        let se = Vec2::new(hi.x, lo.y);
        let nw = Vec2::new(lo.x, hi.y);
        out.extend_from_slice(&[lo, se, se, hi, hi, nw, nw, lo]);
        if let NodeKind::Internal { children } = &self.nodes[id as usize].kind {
            for &child in children {
                self.outline_node(child, out);
            }
        }
    }

    fn verify_node(&self, id: u32, seen: &mut [bool]) -> usize {
        let node = &self.nodes[id as usize];
        match &node.kind {
            NodeKind::Leaf { entries } => {
                for &entry in entries {
                    let slot = &self.slots[entry as usize];
                    assert!(slot.data.is_some(), "leaf references a freed slot");
                    assert_eq!(slot.node, id, "back-reference does not match owning leaf");
                    assert!(
                        self.node_owns(id, slot.position),
                        "leaf rect {:?} does not own object at {:?}",
                        node.rect,
                        slot.position
                    );
                    assert!(!seen[entry as usize], "object indexed in two leaves");
                    seen[entry as usize] = true;
                }
                if node.depth < self.max_depth && entries.len() > self.split_threshold {
                    assert!(
                        self.entries_colocated(entries),
                        "overfull leaf below max depth holds distinct positions"
                    );
                }
                assert_eq!(entries.len(), node.count, "leaf count is stale");
                entries.len()
            }
            NodeKind::Internal { children } => {
                let mut total = 0;
                for &child in children {
                    assert_eq!(
                        self.nodes[child as usize].parent, id,
                        "child parent link is stale"
                    );
                    assert_eq!(
                        self.nodes[child as usize].depth,
                        node.depth + 1,
                        "child depth is inconsistent"
                    );
                    total += self.verify_node(child, seen);
                }
                assert_eq!(total, node.count, "internal subtree count is stale");
                total
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Aabb2 {
        Aabb2::from_center_half_extents(Vec2::ZERO, Vec2::splat(1000.0))
    }

    fn tree() -> Quadtree<usize> {
        Quadtree::new(domain(), 7)
    }

    fn xorshift(state: &mut u64) -> u64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        *state
    }

    fn random_point(state: &mut u64, half: f32) -> Vec2 {
        let x = (xorshift(state) as f32 / u64::MAX as f32) * 2.0 - 1.0;
        let y = (xorshift(state) as f32 / u64::MAX as f32) * 2.0 - 1.0;
        Vec2::new(x * half, y * half)
    }

    fn sorted(mut handles: Vec<SpatialHandle>) -> Vec<SpatialHandle> {
        handles.sort_by_key(|handle| handle.index);
        handles
    }

    /// Reference result: filter every mirror entry by distance.
    fn brute_force(
        mirror: &[(SpatialHandle, Vec2)],
        center: Vec2,
        radius: f32,
    ) -> Vec<SpatialHandle> {
        sorted(
            mirror
                .iter()
                .filter(|(_, position)| position.distance_squared(center) <= radius * radius)
                .map(|&(handle, _)| handle)
                .collect(),
        )
    }

    // Nine points spread so the root splits exactly once: SW gets 3, the
    // other quadrants 2 each.
    fn spread_points() -> Vec<Vec2> {
        vec![
            Vec2::new(-600.0, -600.0),
            Vec2::new(-300.0, -700.0),
            Vec2::new(-800.0, -200.0),
            Vec2::new(500.0, -500.0),
            Vec2::new(700.0, -100.0),
            Vec2::new(-400.0, 600.0),
            Vec2::new(-100.0, 300.0),
            Vec2::new(200.0, 800.0),
            Vec2::new(900.0, 100.0),
        ]
    }

    #[test]
    fn test_empty_query_and_root_outline() {
        let tree = tree();
        let mut hits = Vec::new();
        tree.query_radius(Vec2::ZERO, 100.0, &mut hits);
        assert!(hits.is_empty());

        let mut lines = Vec::new();
        tree.gather_outlines(&mut lines);
        assert_eq!(lines.len(), 8, "fresh tree outlines exactly one rect");
        tree.check_invariants();
    }

    #[test]
    fn test_split_trigger() {
        let mut tree = tree();
        let handles: Vec<_> = (0..9)
            .map(|i| tree.insert(Vec2::new(i as f32, 0.0), i))
            .collect();
        assert_eq!(tree.len(), 9);
        tree.check_invariants();

        let mut lines = Vec::new();
        tree.gather_outlines(&mut lines);
        assert!(lines.len() > 8, "nine clustered objects must split the root");

        let mut hits = Vec::new();
        tree.query_radius(Vec2::new(4.5, 0.0), 5.0, &mut hits);
        assert_eq!(sorted(hits), sorted(handles));
    }

    #[test]
    fn test_merge_back_to_single_leaf() {
        let mut tree = tree();
        let handles: Vec<_> = (0..9)
            .map(|i| tree.insert(Vec2::new(i as f32, 0.0), i))
            .collect();

        for (removed, handle) in handles.into_iter().enumerate() {
            assert_eq!(tree.remove(handle), removed);
            tree.check_invariants();

            if tree.len() <= DEFAULT_MERGE_THRESHOLD {
                let mut lines = Vec::new();
                tree.gather_outlines(&mut lines);
                assert_eq!(
                    lines.len(),
                    8,
                    "tree must collapse once occupancy reaches the merge threshold"
                );
            }
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_insert_remove_round_trip() {
        let mut tree = tree();
        let handle = tree.insert(Vec2::new(15.0, -40.0), 7);
        assert_eq!(tree.remove(handle), 7);

        assert!(tree.is_empty());
        let mut lines = Vec::new();
        tree.gather_outlines(&mut lines);
        assert_eq!(lines.len(), 8);
        tree.check_invariants();
    }

    #[test]
    fn test_update_same_position_is_structural_noop() {
        let mut tree = tree();
        let mut handles = Vec::new();
        for point in spread_points() {
            handles.push(tree.insert(point, 0));
        }
        let mut before = Vec::new();
        tree.gather_outlines(&mut before);

        for (handle, point) in handles.iter().zip(spread_points()) {
            tree.update(*handle, point);
        }
        let mut after = Vec::new();
        tree.gather_outlines(&mut after);
        assert_eq!(before, after);
        tree.check_invariants();
    }

    #[test]
    fn test_update_moves_between_leaves() {
        let mut tree = tree();
        let mut handles = Vec::new();
        for (i, point) in spread_points().into_iter().enumerate() {
            handles.push(tree.insert(point, i));
        }

        // First point lives in SW; send it to the NE quadrant.
        let target = Vec2::new(650.0, 450.0);
        tree.update(handles[0], target);
        tree.check_invariants();
        assert_eq!(tree.position(handles[0]), target);

        let mut hits = Vec::new();
        tree.query_radius(target, 1.0, &mut hits);
        assert_eq!(hits, vec![handles[0]]);

        hits.clear();
        tree.query_radius(Vec2::new(-600.0, -600.0), 1.0, &mut hits);
        assert!(hits.is_empty(), "object must have left its old position");
    }

    #[test]
    fn test_update_collapses_vacated_branch() {
        let mut tree = tree();
        // Nine points inside SW so SW itself splits, plus six spread in NE.
        let sw_center = Vec2::new(-500.0, -500.0);
        let mut handles = Vec::new();
        for point in spread_points() {
            handles.push(tree.insert(sw_center + point * 0.45, 0));
        }
        for i in 0..6 {
            let angle = i as f32;
            handles.push(tree.insert(
                Vec2::new(500.0 + 80.0 * angle.cos(), 500.0 + 80.0 * angle.sin()),
                0,
            ));
        }
        tree.check_invariants();

        // Walk the SW residents over to NE one by one; every step must keep
        // the tree consistent, including the collapse of the SW subtree.
        for (i, &handle) in handles[..9].iter().enumerate() {
            tree.update(handle, Vec2::new(300.0 + 10.0 * i as f32, 700.0));
            tree.check_invariants();
        }
        assert_eq!(tree.len(), 15);
    }

    #[test]
    fn test_query_zero_radius_exact_match() {
        let mut tree = tree();
        let here = tree.insert(Vec2::new(1.0, 1.0), 0);
        let _there = tree.insert(Vec2::new(2.0, 2.0), 1);

        let mut hits = Vec::new();
        tree.query_radius(Vec2::new(1.0, 1.0), 0.0, &mut hits);
        assert_eq!(hits, vec![here]);
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut tree = tree();
        let mut mirror = Vec::new();
        let mut state = 0x9e37_79b9_7f4a_7c15_u64;
        for i in 0..200 {
            let point = random_point(&mut state, 1000.0);
            mirror.push((tree.insert(point, i), point));
        }
        tree.check_invariants();

        let mut hits = Vec::new();
        for _ in 0..40 {
            let center = random_point(&mut state, 1100.0);
            let radius = (xorshift(&mut state) as f32 / u64::MAX as f32) * 400.0;
            hits.clear();
            tree.query_radius(center, radius, &mut hits);
            assert_eq!(sorted(hits.clone()), brute_force(&mirror, center, radius));
        }
    }

    #[test]
    fn test_query_is_deterministic() {
        let build = || {
            let mut tree = tree();
            let mut state = 42_u64;
            for i in 0..64 {
                tree.insert(random_point(&mut state, 900.0), i);
            }
            tree
        };
        let (a, b) = (build(), build());
        let mut hits_a = Vec::new();
        let mut hits_b = Vec::new();
        a.query_radius(Vec2::new(100.0, -50.0), 500.0, &mut hits_a);
        b.query_radius(Vec2::new(100.0, -50.0), 500.0, &mut hits_b);
        assert_eq!(hits_a, hits_b);
    }

    #[test]
    fn test_half_open_ownership() {
        let mut tree = tree();
        for (i, point) in spread_points().into_iter().enumerate() {
            tree.insert(point, i);
        }

        // The root center belongs to the NE child under the half-open rule.
        let at_center = tree.insert(Vec2::ZERO, 100);
        let leaf = tree.slots[at_center.index as usize].node;
        assert_eq!(tree.nodes[leaf as usize].rect.min, Vec2::ZERO);

        // Just west of center belongs to NW.
        let west = tree.insert(Vec2::new(-0.001, 0.0), 101);
        let leaf = tree.slots[west.index as usize].node;
        assert_eq!(tree.nodes[leaf as usize].rect.min, Vec2::new(-1000.0, 0.0));

        // The domain's own max corner stays inside the NE leaf.
        let corner = tree.insert(Vec2::new(1000.0, 1000.0), 102);
        let leaf = tree.slots[corner.index as usize].node;
        assert_eq!(tree.nodes[leaf as usize].rect.max, Vec2::new(1000.0, 1000.0));

        tree.check_invariants();
    }

    #[test]
    fn test_same_position_pile_up() {
        let mut tree = tree();
        let spot = Vec2::new(3.0, 4.0);
        tree.insert(spot, 0);
        for i in 1..101 {
            tree.insert(spot, i);
        }
        assert_eq!(tree.len(), 101);
        tree.check_invariants();

        let mut hits = Vec::new();
        tree.query_radius(spot, 0.0, &mut hits);
        assert_eq!(hits.len(), 101);

        // Colocated piles never split, so the root stays a leaf.
        let mut lines = Vec::new();
        tree.gather_outlines(&mut lines);
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_pile_up_with_outlier_still_terminates() {
        let mut tree = tree();
        let spot = Vec2::new(-250.0, 125.0);
        for i in 0..100 {
            tree.insert(spot, i);
        }
        tree.insert(Vec2::new(600.0, -600.0), 100);
        assert_eq!(tree.len(), 101);
        tree.check_invariants();
    }

    #[test]
    fn test_out_of_domain_insert_clamps() {
        let mut tree = tree();
        let handle = tree.insert(Vec2::new(5000.0, -3000.0), 0);
        assert_eq!(tree.position(handle), Vec2::new(1000.0, -1000.0));
        assert_eq!(tree.len(), 1);

        let mut hits = Vec::new();
        tree.query_radius(Vec2::new(1000.0, -1000.0), 1.0, &mut hits);
        assert_eq!(hits, vec![handle]);
        tree.check_invariants();
    }

    #[test]
    fn test_radius_larger_than_domain_returns_all() {
        let mut tree = tree();
        let mut state = 7_u64;
        let all: Vec<_> = (0..20)
            .map(|i| tree.insert(random_point(&mut state, 1000.0), i))
            .collect();

        let mut hits = Vec::new();
        tree.query_radius(Vec2::ZERO, 1.0e6, &mut hits);
        assert_eq!(sorted(hits), sorted(all));
    }

    #[test]
    fn test_stale_handle_is_detected() {
        let mut tree = tree();
        let handle = tree.insert(Vec2::ZERO, 0);
        tree.remove(handle);
        assert!(!tree.contains(handle));

        // The recycled slot mints a new generation; the old handle stays
        // stale even though the index is reused.
        let replacement = tree.insert(Vec2::ONE, 1);
        assert_eq!(replacement.index, handle.index);
        assert!(!tree.contains(handle));
        assert!(tree.contains(replacement));
    }

    #[test]
    #[should_panic(expected = "remove on")]
    fn test_remove_twice_panics() {
        let mut tree = tree();
        let handle = tree.insert(Vec2::ZERO, 0);
        tree.remove(handle);
        tree.remove(handle);
    }

    #[test]
    #[should_panic(expected = "update on")]
    fn test_update_removed_panics() {
        let mut tree = tree();
        let handle = tree.insert(Vec2::ZERO, 0);
        tree.remove(handle);
        tree.update(handle, Vec2::ONE);
    }

    #[test]
    #[should_panic(expected = "non-positive area")]
    fn test_zero_area_domain_panics() {
        let _ = Quadtree::<()>::new(Aabb2::new(Vec2::ZERO, Vec2::ZERO), 7);
    }

    #[test]
    #[should_panic(expected = "strictly less")]
    fn test_merge_not_below_split_panics() {
        let _ = Quadtree::<()>::with_thresholds(domain(), 7, 4, 4);
    }

    #[test]
    fn test_random_churn_keeps_invariants() {
        let mut tree = tree();
        let mut mirror: Vec<(SpatialHandle, Vec2)> = Vec::new();
        let mut state = 0xdead_beef_cafe_f00d_u64;

        for step in 0..400 {
            let roll = xorshift(&mut state) % 100;
            if mirror.is_empty() || roll < 45 {
                let point = random_point(&mut state, 1000.0);
                mirror.push((tree.insert(point, step), point));
            } else if roll < 75 {
                let at = (xorshift(&mut state) as usize) % mirror.len();
                let point = random_point(&mut state, 1000.0);
                tree.update(mirror[at].0, point);
                mirror[at].1 = point;
            } else {
                let at = (xorshift(&mut state) as usize) % mirror.len();
                let (handle, _) = mirror.swap_remove(at);
                tree.remove(handle);
            }

            if step % 25 == 0 {
                tree.check_invariants();
            }
        }
        tree.check_invariants();
        assert_eq!(tree.len(), mirror.len());

        let mut hits = Vec::new();
        for _ in 0..20 {
            let center = random_point(&mut state, 1000.0);
            let radius = (xorshift(&mut state) as f32 / u64::MAX as f32) * 600.0;
            hits.clear();
            tree.query_radius(center, radius, &mut hits);
            assert_eq!(sorted(hits.clone()), brute_force(&mirror, center, radius));
        }
    }

    #[test]
    fn test_get_and_get_mut() {
        let mut tree = tree();
        let handle = tree.insert(Vec2::new(5.0, 5.0), 10);
        assert_eq!(*tree.get(handle), 10);
        *tree.get_mut(handle) = 11;
        assert_eq!(*tree.get(handle), 11);
    }
}
