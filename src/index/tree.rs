//! B+Tree over row ids
//!
//! All keys live in the leaves; internal nodes hold separator copies.
//! Insertion splits full nodes on the way down and deletion rebalances
//! minimal nodes on the way down, so neither ever has to walk back up.

use std::ops::{Bound, RangeBounds};

use crate::error::{FrameError, Result};

use super::node::{Arena, Node, NodeId, NodeKind};
use super::{calculate_order, validate_order, Location, RowId};

/// Arena-backed B+Tree. Not synchronized; see [`super::Index`].
#[derive(Debug)]
pub struct BPlusTree {
    arena: Arena,
    root: NodeId,
    order: usize,
    len: usize,
}

impl BPlusTree {
    /// Create a tree sized for roughly `expected_rows` keys
    pub fn new(expected_rows: usize) -> Self {
        Self::build(calculate_order(expected_rows))
    }

    /// Create a tree with an explicit order (even, at least 4)
    pub fn with_order(order: usize) -> Result<Self> {
        validate_order(order)?;
        Ok(Self::build(order))
    }

    fn build(order: usize) -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(Node::leaf(order - 1));
        Self {
            arena,
            root,
            order,
            len: 0,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Levels from root to leaf (a lone root leaf is height 1)
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = self.root;
        while let Some(&child) = self.arena[node].children().first() {
            node = child;
            height += 1;
        }
        height
    }

    /// Nodes currently allocated
    pub fn node_count(&self) -> usize {
        self.arena.live()
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    fn min_keys(&self) -> usize {
        self.order / 2 - 1
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Location stored for `key`
    pub fn get(&self, key: RowId) -> Option<Location> {
        let leaf = self.find_leaf(key);
        let node = &self.arena[leaf];
        match &node.kind {
            NodeKind::Leaf { values, .. } => node.keys.binary_search(&key).ok().map(|i| values[i]),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Whether `key` is present
    pub fn search(&self, key: RowId) -> bool {
        self.get(key).is_some()
    }

    fn find_leaf(&self, key: RowId) -> NodeId {
        let mut node = self.root;
        loop {
            let current = &self.arena[node];
            match &current.kind {
                NodeKind::Leaf { .. } => return node,
                NodeKind::Internal { children } => node = children[current.route(key)],
            }
        }
    }

    fn leftmost_leaf(&self, mut node: NodeId) -> NodeId {
        while let Some(&child) = self.arena[node].children().first() {
            node = child;
        }
        node
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert a fresh key. Re-inserting a present key is `DuplicateKey`.
    pub fn insert(&mut self, key: RowId, location: Location) -> Result<()> {
        if self.arena[self.root].keys.len() == self.max_keys() {
            let old_root = self.root;
            self.root = self.arena.alloc(Node::internal(vec![old_root]));
            self.split_child(self.root, 0);
        }

        let mut node = self.root;
        loop {
            if self.arena[node].is_leaf() {
                let leaf = &mut self.arena[node];
                let pos = match leaf.keys.binary_search(&key) {
                    Ok(_) => return Err(FrameError::DuplicateKey { id: key }),
                    Err(pos) => pos,
                };
                leaf.keys.insert(pos, key);
                if let NodeKind::Leaf { values, .. } = &mut leaf.kind {
                    values.insert(pos, location);
                }
                self.len += 1;
                return Ok(());
            }

            let mut idx = self.arena[node].route(key);
            let child = self.arena[node].children()[idx];
            if self.arena[child].keys.len() == self.max_keys() {
                self.split_child(node, idx);
                if key >= self.arena[node].keys[idx] {
                    idx += 1;
                }
            }
            node = self.arena[node].children()[idx];
        }
    }

    /// Split the full child at `idx`, promoting its middle key into `parent`
    fn split_child(&mut self, parent: NodeId, idx: usize) {
        let child_id = self.arena[parent].children()[idx];
        let mut child = self.arena.take(child_id);
        let mid = child.keys.len() / 2;

        let (promoted, sibling) = match &mut child.kind {
            NodeKind::Leaf { values, next } => {
                let right_keys = child.keys.split_off(mid);
                let right_values = values.split_off(mid);
                let promoted = right_keys[0];
                let sibling = Node {
                    keys: right_keys,
                    kind: NodeKind::Leaf {
                        values: right_values,
                        next: *next,
                    },
                };
                (promoted, sibling)
            }
            NodeKind::Internal { children } => {
                let right_keys = child.keys.split_off(mid + 1);
                let promoted = child.keys.pop().unwrap_or_default();
                let right_children = children.split_off(mid + 1);
                (promoted, Node {
                    keys: right_keys,
                    kind: NodeKind::Internal {
                        children: right_children,
                    },
                })
            }
        };

        let sibling_id = self.arena.alloc(sibling);
        if let NodeKind::Leaf { next, .. } = &mut child.kind {
            *next = Some(sibling_id);
        }
        self.arena.put(child_id, child);

        let parent_node = &mut self.arena[parent];
        parent_node.keys.insert(idx, promoted);
        if let NodeKind::Internal { children } = &mut parent_node.kind {
            children.insert(idx + 1, sibling_id);
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove `key`. Returns false (and changes nothing) if it is absent.
    pub fn delete(&mut self, key: RowId) -> bool {
        if !self.search(key) {
            return false;
        }

        let mut node = self.root;
        loop {
            if self.arena[node].is_leaf() {
                let leaf = &mut self.arena[node];
                if let Ok(pos) = leaf.keys.binary_search(&key) {
                    leaf.keys.remove(pos);
                    if let NodeKind::Leaf { values, .. } = &mut leaf.kind {
                        values.remove(pos);
                    }
                }
                break;
            }

            let mut idx = self.arena[node].route(key);
            let child = self.arena[node].children()[idx];
            if self.arena[child].keys.len() <= self.min_keys() {
                idx = self.fix_child(node, idx);
            }
            node = self.arena[node].children()[idx];
        }

        self.len -= 1;
        self.collapse_root();
        self.replace_separator(key);
        true
    }

    /// Bring the child at `idx` above the minimum before descending into it.
    /// Returns the index of the child that now covers the same key range.
    fn fix_child(&mut self, parent: NodeId, idx: usize) -> usize {
        let min = self.min_keys();
        let children = self.arena[parent].children().to_vec();

        if idx > 0 && self.arena[children[idx - 1]].keys.len() > min {
            self.borrow_from_left(parent, idx);
            idx
        } else if idx + 1 < children.len() && self.arena[children[idx + 1]].keys.len() > min {
            self.borrow_from_right(parent, idx);
            idx
        } else if idx + 1 < children.len() {
            self.merge_children(parent, idx);
            idx
        } else {
            self.merge_children(parent, idx - 1);
            idx - 1
        }
    }

    fn borrow_from_left(&mut self, parent: NodeId, idx: usize) {
        let left_id = self.arena[parent].children()[idx - 1];
        let child_id = self.arena[parent].children()[idx];
        let mut left = self.arena.take(left_id);
        let mut child = self.arena.take(child_id);

        let separator = match (&mut left.kind, &mut child.kind) {
            (NodeKind::Leaf { values: lv, .. }, NodeKind::Leaf { values: cv, .. }) => {
                if let (Some(k), Some(v)) = (left.keys.pop(), lv.pop()) {
                    child.keys.insert(0, k);
                    cv.insert(0, v);
                }
                child.keys[0]
            }
            (NodeKind::Internal { children: lc }, NodeKind::Internal { children: cc }) => {
                let down = self.arena[parent].keys[idx - 1];
                child.keys.insert(0, down);
                if let Some(moved) = lc.pop() {
                    cc.insert(0, moved);
                }
                left.keys.pop().unwrap_or(down)
            }
            _ => unreachable!("siblings are always at the same level"),
        };

        self.arena[parent].keys[idx - 1] = separator;
        self.arena.put(left_id, left);
        self.arena.put(child_id, child);
    }

    fn borrow_from_right(&mut self, parent: NodeId, idx: usize) {
        let child_id = self.arena[parent].children()[idx];
        let right_id = self.arena[parent].children()[idx + 1];
        let mut child = self.arena.take(child_id);
        let mut right = self.arena.take(right_id);

        let separator = match (&mut child.kind, &mut right.kind) {
            (NodeKind::Leaf { values: cv, .. }, NodeKind::Leaf { values: rv, .. }) => {
                child.keys.push(right.keys.remove(0));
                cv.push(rv.remove(0));
                right.keys[0]
            }
            (NodeKind::Internal { children: cc }, NodeKind::Internal { children: rc }) => {
                child.keys.push(self.arena[parent].keys[idx]);
                cc.push(rc.remove(0));
                right.keys.remove(0)
            }
            _ => unreachable!("siblings are always at the same level"),
        };

        self.arena[parent].keys[idx] = separator;
        self.arena.put(child_id, child);
        self.arena.put(right_id, right);
    }

    /// Fold child `idx + 1` and their separator into child `idx`
    fn merge_children(&mut self, parent: NodeId, idx: usize) {
        let left_id = self.arena[parent].children()[idx];
        let right_id = self.arena[parent].children()[idx + 1];

        let parent_node = &mut self.arena[parent];
        let separator = parent_node.keys.remove(idx);
        if let NodeKind::Internal { children } = &mut parent_node.kind {
            children.remove(idx + 1);
        }

        let right = self.arena.take(right_id);
        let left = &mut self.arena[left_id];
        match (&mut left.kind, right.kind) {
            (NodeKind::Leaf { values, next }, NodeKind::Leaf { values: rv, next: rnext }) => {
                left.keys.extend(right.keys);
                values.extend(rv);
                *next = rnext;
            }
            (NodeKind::Internal { children }, NodeKind::Internal { children: rc }) => {
                left.keys.push(separator);
                left.keys.extend(right.keys);
                children.extend(rc);
            }
            _ => unreachable!("siblings are always at the same level"),
        }
        self.arena.free(right_id);
    }

    /// An internal root left without keys hands the tree to its only child
    fn collapse_root(&mut self) {
        while !self.arena[self.root].is_leaf() && self.arena[self.root].keys.is_empty() {
            let old_root = self.root;
            self.root = self.arena[old_root].children()[0];
            self.arena.free(old_root);
        }
    }

    /// Swap a stale separator equal to `key` for its in-order successor
    fn replace_separator(&mut self, key: RowId) {
        let mut node = self.root;
        while !self.arena[node].is_leaf() {
            if let Ok(pos) = self.arena[node].keys.binary_search(&key) {
                let right = self.arena[node].children()[pos + 1];
                let leaf = self.leftmost_leaf(right);
                if let Some(&successor) = self.arena[leaf].keys.first() {
                    self.arena[node].keys[pos] = successor;
                }
                return;
            }
            let idx = self.arena[node].route(key);
            node = self.arena[node].children()[idx];
        }
    }

    // =========================================================================
    // Ordered Access
    // =========================================================================

    /// Entries with keys in `range`, ascending, walking the leaf chain
    pub fn range<R: RangeBounds<RowId>>(&self, range: R) -> Vec<(RowId, Location)> {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => match s.checked_add(1) {
                Some(s) => s,
                None => return Vec::new(),
            },
            Bound::Unbounded => 0,
        };

        let mut out = Vec::new();
        let mut leaf = Some(self.find_leaf(start));
        while let Some(id) = leaf {
            let node = &self.arena[id];
            let (values, next) = match &node.kind {
                NodeKind::Leaf { values, next } => (values, *next),
                NodeKind::Internal { .. } => break,
            };
            for (key, location) in node.keys.iter().zip(values) {
                if *key < start {
                    continue;
                }
                let past_end = match range.end_bound() {
                    Bound::Included(&e) => *key > e,
                    Bound::Excluded(&e) => *key >= e,
                    Bound::Unbounded => false,
                };
                if past_end {
                    return out;
                }
                out.push((*key, *location));
            }
            leaf = next;
        }
        out
    }

    /// All keys in ascending order
    pub fn keys(&self) -> Vec<RowId> {
        self.range(..).into_iter().map(|(k, _)| k).collect()
    }

    /// The `n` smallest keys, ascending
    pub fn first(&self, n: usize) -> Vec<RowId> {
        let mut out = Vec::with_capacity(n.min(self.len));
        let mut leaf = Some(self.leftmost_leaf(self.root));
        while let Some(id) = leaf {
            if out.len() >= n {
                break;
            }
            let node = &self.arena[id];
            out.extend(node.keys.iter().take(n - out.len()));
            leaf = match &node.kind {
                NodeKind::Leaf { next, .. } => *next,
                NodeKind::Internal { .. } => None,
            };
        }
        out
    }

    /// The `n` largest keys, ascending
    pub fn last(&self, n: usize) -> Vec<RowId> {
        let mut out = Vec::with_capacity(n.min(self.len));
        self.collect_rev(self.root, n, &mut out);
        out.reverse();
        out
    }

    fn collect_rev(&self, node: NodeId, n: usize, out: &mut Vec<RowId>) {
        let current = &self.arena[node];
        match &current.kind {
            NodeKind::Leaf { .. } => {
                for key in current.keys.iter().rev() {
                    if out.len() >= n {
                        return;
                    }
                    out.push(*key);
                }
            }
            NodeKind::Internal { children } => {
                for child in children.iter().rev() {
                    if out.len() >= n {
                        return;
                    }
                    self.collect_rev(*child, n, out);
                }
            }
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check every structural invariant, describing the first violation
    ///
    /// - non-root fill within `[order/2 - 1, order - 1]`
    /// - keys sorted and within the separator bounds of their subtree
    /// - all leaves at the same depth
    /// - the leaf chain visits exactly the in-order key sequence
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        self.check_node(self.root, None, None, 1, &mut leaf_depth, &mut leaves)?;

        let mut in_order = Vec::with_capacity(self.len);
        for id in &leaves {
            in_order.extend_from_slice(&self.arena[*id].keys);
        }
        if in_order.len() != self.len {
            return Err(format!("len is {} but leaves hold {}", self.len, in_order.len()));
        }

        for pair in leaves.windows(2) {
            match &self.arena[pair[0]].kind {
                NodeKind::Leaf { next, .. } if *next == Some(pair[1]) => {}
                _ => return Err(format!("leaf {:?} is not linked to {:?}", pair[0], pair[1])),
            }
        }
        if let Some(last) = leaves.last() {
            if let NodeKind::Leaf { next: Some(n), .. } = &self.arena[*last].kind {
                return Err(format!("last leaf {:?} links to {:?}", last, n));
            }
        }

        if self.keys() != in_order {
            return Err("leaf chain disagrees with in-order traversal".to_string());
        }
        Ok(())
    }

    fn check_node(
        &self,
        id: NodeId,
        lower: Option<RowId>,
        upper: Option<RowId>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<NodeId>,
    ) -> std::result::Result<(), String> {
        let node = &self.arena[id];
        let count = node.keys.len();

        if count > self.max_keys() {
            return Err(format!("node {:?} holds {} keys (max {})", id, count, self.max_keys()));
        }
        if id != self.root && count < self.min_keys() {
            return Err(format!("node {:?} holds {} keys (min {})", id, count, self.min_keys()));
        }
        if node.keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("node {:?} keys are not strictly ascending", id));
        }
        if let (Some(lo), Some(first)) = (lower, node.keys.first()) {
            if *first < lo {
                return Err(format!("node {:?} key {} below bound {}", id, first, lo));
            }
        }
        if let (Some(hi), Some(last)) = (upper, node.keys.last()) {
            if *last >= hi {
                return Err(format!("node {:?} key {} not below bound {}", id, last, hi));
            }
        }

        match &node.kind {
            NodeKind::Leaf { values, .. } => {
                if values.len() != count {
                    return Err(format!("leaf {:?} has {} keys, {} values", id, count, values.len()));
                }
                match *leaf_depth {
                    Some(d) if d != depth => {
                        return Err(format!("leaf {:?} at depth {} (expected {})", id, depth, d));
                    }
                    Some(_) => {}
                    None => *leaf_depth = Some(depth),
                }
                leaves.push(id);
            }
            NodeKind::Internal { children } => {
                if children.len() != count + 1 {
                    return Err(format!(
                        "internal {:?} has {} keys, {} children",
                        id,
                        count,
                        children.len()
                    ));
                }
                for (i, child) in children.iter().enumerate() {
                    let lo = if i == 0 { lower } else { Some(node.keys[i - 1]) };
                    let hi = if i == count { upper } else { Some(node.keys[i]) };
                    self.check_node(*child, lo, hi, depth + 1, leaf_depth, leaves)?;
                }
            }
        }
        Ok(())
    }
}
