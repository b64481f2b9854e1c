//! Bounding-volume hierarchy over (time, pitch) boxes.
//!
//! Items live in a flat list together with the box computed for them at
//! insertion. [`SpatialIndex::rebuild`] builds a balanced median-split tree
//! over that list; every node caches the union of its subtree's boxes so a
//! query only touches nodes whose box overlaps the query box.
//!
//! Mutations mark the index dirty. Queries through `&mut self` rebuild first,
//! so newly added items are always visible. `query_range_built` serves
//! read-only callers and returns `None` while a rebuild is pending.

use std::fmt;
use std::time::Instant;

use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::bounds::{Axis, Bounds};

/// Maximum number of items held by a leaf node.
pub const LEAF_CAPACITY: usize = 4;

struct Entry<T> {
    item: T,
    bounds: Bounds,
}

enum NodeKind {
    Leaf(SmallVec<[usize; LEAF_CAPACITY]>),
    Branch { left: usize, right: usize },
}

struct Node {
    bounds: Bounds,
    kind: NodeKind,
}

/// Spatial index with a caller-supplied box projection.
pub struct SpatialIndex<T, F = fn(&T) -> Bounds> {
    entries: Vec<Entry<T>>,
    nodes: Vec<Node>,
    root: Option<usize>,
    depth: usize,
    dirty: bool,
    bounds_of: F,
}

impl<T, F> SpatialIndex<T, F>
where
    F: Fn(&T) -> Bounds,
{
    pub fn new(bounds_of: F) -> Self {
        Self {
            entries: Vec::new(),
            nodes: Vec::new(),
            root: None,
            depth: 0,
            dirty: false,
            bounds_of,
        }
    }

    pub fn add(&mut self, item: T) {
        let bounds = (self.bounds_of)(&item);
        self.entries.push(Entry { item, bounds });
        self.dirty = true;
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        let before = self.entries.len();
        for item in items {
            let bounds = (self.bounds_of)(&item);
            self.entries.push(Entry { item, bounds });
        }
        self.dirty |= self.entries.len() != before;
    }

    /// Keep only items matching `keep`; returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| keep(&entry.item));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.nodes.clear();
        self.root = None;
        self.depth = 0;
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Nodes in the current tree; stale while dirty.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Levels in the current tree; 0 when empty.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|entry| &entry.item)
    }

    /// Rebuild the tree over all items and clear the dirty flag.
    pub fn rebuild(&mut self) {
        let started = Instant::now();
        self.nodes.clear();
        self.root = None;
        self.depth = 0;
        self.dirty = false;

        if self.entries.is_empty() {
            return;
        }

        let mut ids: Vec<usize> = (0..self.entries.len()).collect();
        self.nodes.reserve(2 * self.entries.len() / LEAF_CAPACITY + 1);
        let (root, depth) = build_node(&mut self.nodes, &self.entries, &mut ids);
        self.root = Some(root);
        self.depth = depth;

        debug!(
            "Rebuilt BVH: {} items, {} nodes, depth {}, {:?}",
            self.entries.len(),
            self.nodes.len(),
            self.depth,
            started.elapsed()
        );
    }

    /// Items whose box overlaps `query` (closed intervals).
    ///
    /// Inverted or NaN query boxes match nothing.
    pub fn query_range(&mut self, query: Bounds) -> Vec<&T> {
        if self.dirty {
            self.rebuild();
        }
        self.collect_range(&query)
    }

    /// Like [`query_range`](Self::query_range) without rebuilding; `None`
    /// while the tree is stale.
    pub fn query_range_built(&self, query: Bounds) -> Option<Vec<&T>> {
        (!self.dirty).then(|| self.collect_range(&query))
    }

    pub fn query_time_range(&mut self, start: f64, end: f64) -> Vec<&T> {
        self.query_range(Bounds::time_span(start, end))
    }

    /// Items within `radius` of a point on both axes.
    pub fn query_nearby(&mut self, time: f64, pitch: f64, radius: f64) -> Vec<&T> {
        self.query_range(Bounds::around(time, pitch, radius))
    }

    /// Items whose box contains the point.
    pub fn query_point(&mut self, time: f64, pitch: f64) -> Vec<&T> {
        self.query_range(Bounds::new(time, pitch, time, pitch))
    }

    fn collect_range(&self, query: &Bounds) -> Vec<&T> {
        let mut found = Vec::new();
        let Some(root) = self.root else {
            return found;
        };
        if !query.is_valid() {
            return found;
        }

        let mut stack: SmallVec<[usize; 64]> = smallvec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.bounds.intersects(query) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(ids) => {
                    found.extend(
                        ids.iter()
                            .map(|&i| &self.entries[i])
                            .filter(|entry| entry.bounds.intersects(query))
                            .map(|entry| &entry.item),
                    );
                }
                NodeKind::Branch { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        found
    }
}

impl<T, F> fmt::Debug for SpatialIndex<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.entries.len())
            .field("nodes", &self.nodes.len())
            .field("depth", &self.depth)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Build the subtree over `ids`, returning its node id and depth.
fn build_node<T>(nodes: &mut Vec<Node>, entries: &[Entry<T>], ids: &mut [usize]) -> (usize, usize) {
    let bounds = ids
        .iter()
        .fold(Bounds::EMPTY, |acc, &i| acc.union(&entries[i].bounds));

    if ids.len() <= LEAF_CAPACITY {
        nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf(ids.iter().copied().collect()),
        });
        return (nodes.len() - 1, 1);
    }

    let axis = bounds.longest_axis();
    let mid = ids.len() / 2;
    ids.select_nth_unstable_by(mid, |&a, &b| {
        center(entries, a, axis).total_cmp(&center(entries, b, axis))
    });

    let (left_ids, right_ids) = ids.split_at_mut(mid);
    let (left, left_depth) = build_node(nodes, entries, left_ids);
    let (right, right_depth) = build_node(nodes, entries, right_ids);

    nodes.push(Node {
        bounds,
        kind: NodeKind::Branch { left, right },
    });
    (nodes.len() - 1, 1 + left_depth.max(right_depth))
}

#[inline]
fn center<T>(entries: &[Entry<T>], id: usize, axis: Axis) -> f64 {
    entries[id].bounds.center(axis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(&(t, p): &(f64, f64)) -> Bounds {
        Bounds::new(t, p, t + 1.0, p + 1.0)
    }

    fn grid(n: usize) -> SpatialIndex<(f64, f64)> {
        let mut index = SpatialIndex::new(unit_box as fn(&(f64, f64)) -> Bounds);
        for i in 0..n {
            index.add(((i % 50) as f64 * 2.0, (i / 50) as f64 * 2.0));
        }
        index
    }

    /// Every branch caches the union of its children, leaves stay small.
    fn check_node<T>(index: &SpatialIndex<T>, id: usize) -> Bounds {
        let node = &index.nodes[id];
        let expected = match &node.kind {
            NodeKind::Leaf(ids) => {
                assert!(!ids.is_empty() && ids.len() <= LEAF_CAPACITY);
                ids.iter()
                    .fold(Bounds::EMPTY, |acc, &i| acc.union(&index.entries[i].bounds))
            }
            NodeKind::Branch { left, right } => {
                check_node(index, *left).union(&check_node(index, *right))
            }
        };
        assert_eq!(node.bounds, expected);
        expected
    }

    #[test]
    fn test_empty_index() {
        let mut index = grid(0);
        assert!(index.query_range(Bounds::new(0.0, 0.0, 100.0, 100.0)).is_empty());
        assert_eq!(index.node_count(), 0);
        assert_eq!(index.depth(), 0);
    }

    #[test]
    fn test_tree_invariants() {
        let mut index = grid(1000);
        index.rebuild();
        let root = index.root.unwrap();
        check_node(&index, root);
        // Balanced median split: ceil(log2(1000 / 4)) + 1 levels
        assert_eq!(index.depth(), 9);
        assert!(!index.is_dirty());
    }

    #[test]
    fn test_query_matches_scan() {
        let mut index = grid(500);
        let query = Bounds::new(10.5, 3.0, 20.0, 9.0);
        let mut found: Vec<_> = index.query_range(query).into_iter().copied().collect();
        let mut expected: Vec<_> = index
            .iter()
            .filter(|item| unit_box(item).intersects(&query))
            .copied()
            .collect();
        found.sort_by(|a, b| a.partial_cmp(b).unwrap());
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(!expected.is_empty());
        assert_eq!(found, expected);
    }

    #[test]
    fn test_added_items_visible_immediately() {
        let mut index = grid(100);
        index.rebuild();
        index.add((500.0, 500.0));
        assert!(index.is_dirty());
        assert!(index.query_range_built(Bounds::around(500.0, 500.0, 0.1)).is_none());
        assert_eq!(index.query_point(500.5, 500.5), vec![&(500.0, 500.0)]);
        assert!(!index.is_dirty());
    }

    #[test]
    fn test_inverted_query_is_empty() {
        let mut index = grid(100);
        assert!(index.query_range(Bounds::new(10.0, 0.0, 0.0, 10.0)).is_empty());
        assert!(index.query_range(Bounds::new(f64::NAN, 0.0, 10.0, 10.0)).is_empty());
    }

    #[test]
    fn test_retain_marks_dirty() {
        let mut index = grid(100);
        index.rebuild();
        assert_eq!(index.retain(|&(t, _)| t < 50.0), 50);
        assert!(index.is_dirty());
        assert_eq!(index.query_time_range(0.0, 1000.0).len(), 50);
        assert_eq!(index.retain(|_| true), 0);
        assert!(!index.is_dirty());
    }

    #[test]
    fn test_query_nearby() {
        let mut index = grid(100);
        // (10,0) and (12,0) boxes are within 1.0 of (11.5, 0.5); (8,0) is not
        let mut found: Vec<_> = index.query_nearby(11.5, 0.5, 1.0).into_iter().copied().collect();
        found.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(found, vec![(10.0, 0.0), (12.0, 0.0)]);
    }
}
