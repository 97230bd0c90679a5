//! Balanced, duplicate-tolerant tree keyed by character offset.
//!
//! [`OffsetTree`] is an AVL tree stored in an arena. Each node owns every
//! entry sharing its key, in insertion order, so co-located annotations never
//! collide and never reorder. Every entry also carries a *partner* offset (the
//! end offset when keyed by start, the start offset when keyed by end) and each
//! node caches the partner bounds of its subtree, which lets range walks skip
//! subtrees that cannot contain a match.

use std::cmp::Ordering;
use std::ops::{Bound, RangeBounds};

use crate::AnnotationId;

type NodeIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    pub id: AnnotationId,
    pub partner: usize,
}

#[derive(Debug, Clone)]
struct Node {
    key: usize,
    entries: Vec<Entry>,
    left: Option<NodeIdx>,
    right: Option<NodeIdx>,
    height: i32,
    /// Partner bounds over this node's own entries
    local_min: usize,
    local_max: usize,
    /// Partner bounds over the whole subtree
    min_partner: usize,
    max_partner: usize,
}

impl Node {
    fn leaf(key: usize, entry: Entry) -> Self {
        Self {
            key,
            entries: vec![entry],
            left: None,
            right: None,
            height: 1,
            local_min: entry.partner,
            local_max: entry.partner,
            min_partner: entry.partner,
            max_partner: entry.partner,
        }
    }
}

/// Key and partner constraints for a pruned walk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RangeQuery {
    pub keys: (Bound<usize>, Bound<usize>),
    pub partners: (Bound<usize>, Bound<usize>),
}

impl RangeQuery {
    pub fn keys(keys: (Bound<usize>, Bound<usize>)) -> Self {
        Self {
            keys,
            partners: (Bound::Unbounded, Bound::Unbounded),
        }
    }

    pub fn with_partners(mut self, partners: (Bound<usize>, Bound<usize>)) -> Self {
        self.partners = partners;
        self
    }

    fn may_have_smaller_keys(&self, key: usize) -> bool {
        match self.keys.0 {
            Bound::Unbounded => true,
            Bound::Included(lo) | Bound::Excluded(lo) => key > lo,
        }
    }

    fn may_have_larger_keys(&self, key: usize) -> bool {
        match self.keys.1 {
            Bound::Unbounded => true,
            Bound::Included(hi) | Bound::Excluded(hi) => key < hi,
        }
    }

    /// Whether a subtree with these partner bounds can hold a match.
    fn partners_reachable(&self, min: usize, max: usize) -> bool {
        let low_ok = match self.partners.0 {
            Bound::Unbounded => true,
            Bound::Included(lo) => max >= lo,
            Bound::Excluded(lo) => max > lo,
        };
        let high_ok = match self.partners.1 {
            Bound::Unbounded => true,
            Bound::Included(hi) => min <= hi,
            Bound::Excluded(hi) => min < hi,
        };
        low_ok && high_ok
    }
}

/// AVL tree over `(offset, entry)` pairs.
#[derive(Debug, Clone, Default)]
pub(crate) struct OffsetTree {
    nodes: Vec<Node>,
    free: Vec<NodeIdx>,
    root: Option<NodeIdx>,
    len: usize,
    /// Nodes entered by the last `query`
    #[cfg(test)]
    visited: std::cell::Cell<usize>,
}

impl OffsetTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries (not distinct keys).
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub fn last_query_visits(&self) -> usize {
        self.visited.get()
    }

    /// Height of the tree; an empty tree has height 0.
    #[cfg(test)]
    pub fn height(&self) -> usize {
        self.height_of(self.root) as usize
    }

    pub fn insert(&mut self, key: usize, entry: Entry) {
        let root = self.root;
        let root = self.insert_at(root, key, entry);
        self.root = Some(root);
        self.len += 1;
    }

    /// Remove the entry for `id` stored under `key`.
    ///
    /// Returns false, leaving the tree untouched, when there is no such entry.
    pub fn remove(&mut self, key: usize, id: AnnotationId) -> bool {
        let mut removed = false;
        let root = self.root;
        self.root = self.remove_at(root, key, id, &mut removed);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Entries stored exactly at `key`.
    pub fn get(&self, key: usize) -> &[Entry] {
        let mut current = self.root;
        while let Some(idx) = current {
            let node = &self.nodes[idx];
            current = match key.cmp(&node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return &node.entries,
            };
        }
        &[]
    }

    /// Entries at the smallest key `>= key`.
    pub fn first_at_or_after(&self, key: usize) -> Option<(usize, &[Entry])> {
        let mut best = None;
        let mut current = self.root;
        while let Some(idx) = current {
            let node = &self.nodes[idx];
            match key.cmp(&node.key) {
                Ordering::Less => {
                    best = Some(idx);
                    current = node.left;
                }
                Ordering::Greater => current = node.right,
                Ordering::Equal => return Some((node.key, &node.entries)),
            }
        }
        best.map(|idx| (self.nodes[idx].key, self.nodes[idx].entries.as_slice()))
    }

    pub fn first(&self) -> Option<(usize, &[Entry])> {
        let mut idx = self.root?;
        while let Some(left) = self.nodes[idx].left {
            idx = left;
        }
        Some((self.nodes[idx].key, &self.nodes[idx].entries))
    }

    pub fn last(&self) -> Option<(usize, &[Entry])> {
        let mut idx = self.root?;
        while let Some(right) = self.nodes[idx].right {
            idx = right;
        }
        Some((self.nodes[idx].key, &self.nodes[idx].entries))
    }

    /// In-order iteration over `(key, entries)`.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            stack: Vec::new(),
            next: self.root,
        }
    }

    /// Ids of matching entries, in key order and insertion order within a key.
    pub fn query(&self, query: &RangeQuery) -> Vec<AnnotationId> {
        #[cfg(test)]
        self.visited.set(0);
        let mut found = Vec::new();
        self.walk(self.root, query, &mut found);
        found
    }

    fn walk(&self, node: Option<NodeIdx>, query: &RangeQuery, found: &mut Vec<AnnotationId>) {
        let Some(idx) = node else {
            return;
        };
        #[cfg(test)]
        self.visited.set(self.visited.get() + 1);
        let node = &self.nodes[idx];
        if !query.partners_reachable(node.min_partner, node.max_partner) {
            return;
        }

        if query.may_have_smaller_keys(node.key) {
            self.walk(node.left, query, found);
        }
        if query.keys.contains(&node.key) {
            found.extend(
                node.entries
                    .iter()
                    .filter(|entry| query.partners.contains(&entry.partner))
                    .map(|entry| entry.id),
            );
        }
        if query.may_have_larger_keys(node.key) {
            self.walk(node.right, query, found);
        }
    }

    // ------------------------------------------------------------------
    // Structural maintenance
    // ------------------------------------------------------------------

    fn alloc(&mut self, key: usize, entry: Entry) -> NodeIdx {
        let node = Node::leaf(key, entry);
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn insert_at(&mut self, node: Option<NodeIdx>, key: usize, entry: Entry) -> NodeIdx {
        let Some(idx) = node else {
            return self.alloc(key, entry);
        };

        match key.cmp(&self.nodes[idx].key) {
            Ordering::Less => {
                let left = self.nodes[idx].left;
                let left = self.insert_at(left, key, entry);
                self.nodes[idx].left = Some(left);
            }
            Ordering::Greater => {
                let right = self.nodes[idx].right;
                let right = self.insert_at(right, key, entry);
                self.nodes[idx].right = Some(right);
            }
            Ordering::Equal => {
                let node = &mut self.nodes[idx];
                node.entries.push(entry);
                node.local_min = node.local_min.min(entry.partner);
                node.local_max = node.local_max.max(entry.partner);
                self.refresh(idx);
                return idx;
            }
        }

        self.rebalance(idx)
    }

    fn remove_at(
        &mut self,
        node: Option<NodeIdx>,
        key: usize,
        id: AnnotationId,
        removed: &mut bool,
    ) -> Option<NodeIdx> {
        let idx = node?;

        match key.cmp(&self.nodes[idx].key) {
            Ordering::Less => {
                let left = self.nodes[idx].left;
                self.nodes[idx].left = self.remove_at(left, key, id, removed);
            }
            Ordering::Greater => {
                let right = self.nodes[idx].right;
                self.nodes[idx].right = self.remove_at(right, key, id, removed);
            }
            Ordering::Equal => {
                let entries = &mut self.nodes[idx].entries;
                let Some(pos) = entries.iter().position(|entry| entry.id == id) else {
                    return Some(idx);
                };
                entries.remove(pos);
                *removed = true;

                if self.nodes[idx].entries.is_empty() {
                    return self.unlink(idx);
                }
                self.refresh_local(idx);
                self.refresh(idx);
                return Some(idx);
            }
        }

        if !*removed {
            return Some(idx);
        }
        Some(self.rebalance(idx))
    }

    /// Drop an emptied node, splicing in its in-order successor if needed.
    fn unlink(&mut self, idx: NodeIdx) -> Option<NodeIdx> {
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        self.free.push(idx);

        match (left, right) {
            (None, None) => None,
            (Some(child), None) | (None, Some(child)) => Some(child),
            (Some(left), Some(right)) => {
                let (rest, successor) = self.detach_min(right);
                self.nodes[successor].left = Some(left);
                self.nodes[successor].right = rest;
                Some(self.rebalance(successor))
            }
        }
    }

    /// Detach the leftmost node of a subtree; returns (new subtree root, detached).
    fn detach_min(&mut self, idx: NodeIdx) -> (Option<NodeIdx>, NodeIdx) {
        match self.nodes[idx].left {
            None => (self.nodes[idx].right, idx),
            Some(left) => {
                let (rest, min) = self.detach_min(left);
                self.nodes[idx].left = rest;
                (Some(self.rebalance(idx)), min)
            }
        }
    }

    fn height_of(&self, node: Option<NodeIdx>) -> i32 {
        node.map_or(0, |idx| self.nodes[idx].height)
    }

    fn balance_of(&self, idx: NodeIdx) -> i32 {
        self.height_of(self.nodes[idx].left) - self.height_of(self.nodes[idx].right)
    }

    fn refresh_local(&mut self, idx: NodeIdx) {
        let node = &mut self.nodes[idx];
        node.local_min = node.entries.iter().map(|e| e.partner).min().unwrap_or(0);
        node.local_max = node.entries.iter().map(|e| e.partner).max().unwrap_or(0);
    }

    /// Recompute height and subtree partner bounds from the children.
    fn refresh(&mut self, idx: NodeIdx) {
        let (left, right) = (self.nodes[idx].left, self.nodes[idx].right);
        let height = 1 + self.height_of(left).max(self.height_of(right));

        let mut min_partner = self.nodes[idx].local_min;
        let mut max_partner = self.nodes[idx].local_max;
        for child in [left, right].into_iter().flatten() {
            min_partner = min_partner.min(self.nodes[child].min_partner);
            max_partner = max_partner.max(self.nodes[child].max_partner);
        }

        let node = &mut self.nodes[idx];
        node.height = height;
        node.min_partner = min_partner;
        node.max_partner = max_partner;
    }

    fn rebalance(&mut self, idx: NodeIdx) -> NodeIdx {
        self.refresh(idx);
        let balance = self.balance_of(idx);

        if balance > 1 {
            if let Some(left) = self.nodes[idx].left {
                if self.balance_of(left) < 0 {
                    let left = self.rotate_left(left);
                    self.nodes[idx].left = Some(left);
                }
            }
            return self.rotate_right(idx);
        }
        if balance < -1 {
            if let Some(right) = self.nodes[idx].right {
                if self.balance_of(right) > 0 {
                    let right = self.rotate_right(right);
                    self.nodes[idx].right = Some(right);
                }
            }
            return self.rotate_left(idx);
        }

        idx
    }

    fn rotate_right(&mut self, idx: NodeIdx) -> NodeIdx {
        let Some(pivot) = self.nodes[idx].left else {
            return idx;
        };
        self.nodes[idx].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(idx);
        self.refresh(idx);
        self.refresh(pivot);
        pivot
    }

    fn rotate_left(&mut self, idx: NodeIdx) -> NodeIdx {
        let Some(pivot) = self.nodes[idx].right else {
            return idx;
        };
        self.nodes[idx].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(idx);
        self.refresh(idx);
        self.refresh(pivot);
        pivot
    }

    /// Panics if ordering, balance, cached heights or partner bounds are off.
    #[cfg(test)]
    pub fn assert_invariants(&self) {
        fn check(tree: &OffsetTree, node: Option<NodeIdx>, lo: Option<usize>, hi: Option<usize>) -> (i32, usize, usize, usize) {
            let Some(idx) = node else {
                return (0, usize::MAX, 0, 0);
            };
            let n = &tree.nodes[idx];
            assert!(!n.entries.is_empty(), "empty node at key {}", n.key);
            assert!(lo.map_or(true, |lo| n.key > lo), "key {} out of order", n.key);
            assert!(hi.map_or(true, |hi| n.key < hi), "key {} out of order", n.key);

            let (lh, lmin, lmax, lcount) = check(tree, n.left, lo, Some(n.key));
            let (rh, rmin, rmax, rcount) = check(tree, n.right, Some(n.key), hi);
            assert!((lh - rh).abs() <= 1, "unbalanced at key {}", n.key);
            assert_eq!(n.height, 1 + lh.max(rh), "stale height at key {}", n.key);

            let own_min = n.entries.iter().map(|e| e.partner).min().unwrap();
            let own_max = n.entries.iter().map(|e| e.partner).max().unwrap();
            let min = own_min.min(lmin).min(rmin);
            let max = own_max.max(lmax).max(rmax);
            assert_eq!(n.min_partner, min, "stale min partner at key {}", n.key);
            assert_eq!(n.max_partner, max, "stale max partner at key {}", n.key);

            (n.height, min, max, lcount + rcount + n.entries.len())
        }

        let (_, _, _, count) = check(self, self.root, None, None);
        assert_eq!(count, self.len);
    }
}

/// In-order iterator over an [`OffsetTree`].
pub(crate) struct Iter<'a> {
    tree: &'a OffsetTree,
    stack: Vec<NodeIdx>,
    next: Option<NodeIdx>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (usize, &'a [Entry]);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.next {
            self.stack.push(idx);
            self.next = self.tree.nodes[idx].left;
        }
        let idx = self.stack.pop()?;
        let tree = self.tree;
        let node = &tree.nodes[idx];
        self.next = node.right;
        Some((node.key, &node.entries))
    }
}
