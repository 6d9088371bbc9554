//! Index nodes and the slot arena that owns them
//!
//! Nodes never hold references to each other. Children and leaf siblings
//! are `NodeId` slots into the arena, so a split or merge is slot
//! reassignment instead of pointer surgery.

use std::mem;
use std::ops::{Index, IndexMut};

use super::{Location, RowId};

/// Arena slot of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Internal nodes route; leaves carry values and the forward link
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Internal {
        /// Always `keys.len() + 1` entries
        children: Vec<NodeId>,
    },
    Leaf {
        /// Parallel to `keys`
        values: Vec<Location>,
        /// Next leaf in key order
        next: Option<NodeId>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) keys: Vec<RowId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn leaf(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            kind: NodeKind::Leaf {
                values: Vec::with_capacity(capacity),
                next: None,
            },
        }
    }

    pub(crate) fn internal(children: Vec<NodeId>) -> Self {
        Self {
            keys: Vec::new(),
            kind: NodeKind::Internal { children },
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Child slots; empty for leaves
    pub(crate) fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Internal { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// Index of the child whose key range contains `key`.
    ///
    /// Child `i` holds keys in `[keys[i - 1], keys[i])`, so a key equal to a
    /// separator routes right.
    pub(crate) fn route(&self, key: RowId) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }
}

/// Growable slot storage for nodes; freed slots are reused
#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Release a slot; its contents are dropped
    pub(crate) fn free(&mut self, id: NodeId) {
        self.nodes[id.0] = Node::leaf(0);
        self.free.push(id);
    }

    /// Move a node out for restructuring; pair with `put`
    pub(crate) fn take(&mut self, id: NodeId) -> Node {
        mem::replace(&mut self.nodes[id.0], Node::leaf(0))
    }

    pub(crate) fn put(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0] = node;
    }

    /// Number of nodes currently in use
    pub(crate) fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }
}

impl Index<NodeId> for Arena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for Arena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}
