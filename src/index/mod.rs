//! Index Module
//!
//! Ordered map from row id to the chunk that stores the row.
//!
//! ## Responsibilities
//! - Point lookup, insert, and delete of row ids
//! - Ordered scans for head/tail/range reads
//! - Self-balancing via split, borrow, and merge
//!
//! ## Data Structure Choice
//! A B+Tree whose nodes live in an arena and refer to each other by slot
//! (`NodeId`). The order comes from a block-size heuristic scaled to the
//! expected row count.
//!
//! ## Concurrency
//! `Index` wraps the tree in one `parking_lot::RwLock`:
//! - lookups and scans share the read lock
//! - every insert/delete (and therefore every split, borrow, merge, and
//!   root replacement) holds the write lock for the whole descent
//!
//! A reader can never observe a half-restructured subtree, and there is
//! only one lock to order against the rest of the engine.

mod node;
mod tree;

use std::ops::RangeBounds;

use parking_lot::RwLock;

use crate::error::{FrameError, Result};

pub use node::NodeId;
pub use tree::BPlusTree;

/// Logical row identifier
pub type RowId = u64;

/// Where a row's data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Row chunk index (`row_id / row_chunk_size`)
    pub row_chunk: u64,
}

impl Location {
    pub fn new(row_chunk: u64) -> Self {
        Self { row_chunk }
    }
}

// =============================================================================
// Order Policy
// =============================================================================

/// Disk block size the node layout is modeled on
const BLOCK_SIZE: usize = 4096;

/// Bytes per key-pointer pair
const KEY_POINTER_SIZE: usize = 16;

const MIN_ORDER: usize = 32;
const MAX_ORDER: usize = 256;

/// Derive the tree order for an expected row count.
///
/// Block capacity clamped to [32, 256], then quartered below 1,000 rows and
/// halved below 10,000 so small tables do not allocate wide nodes.
pub fn calculate_order(expected_rows: usize) -> usize {
    let max_order = (BLOCK_SIZE / KEY_POINTER_SIZE).clamp(MIN_ORDER, MAX_ORDER);

    if expected_rows < 1_000 {
        max_order / 4
    } else if expected_rows < 10_000 {
        max_order / 2
    } else {
        max_order
    }
}

/// Orders must be even (so a full node splits into two legal halves) and
/// at least 4 (so non-root nodes keep a key).
pub fn validate_order(order: usize) -> Result<()> {
    if order < 4 || order % 2 != 0 {
        return Err(FrameError::InvalidConfiguration(format!(
            "index order must be an even number >= 4, got {}",
            order
        )));
    }
    Ok(())
}

// =============================================================================
// Synchronized Index
// =============================================================================

/// Thread-safe row index
#[derive(Debug)]
pub struct Index {
    tree: RwLock<BPlusTree>,
}

impl Index {
    /// Create an index sized for `expected_rows`
    pub fn new(expected_rows: usize) -> Self {
        Self {
            tree: RwLock::new(BPlusTree::new(expected_rows)),
        }
    }

    /// Create an index with an explicit order
    pub fn with_order(order: usize) -> Result<Self> {
        Ok(Self {
            tree: RwLock::new(BPlusTree::with_order(order)?),
        })
    }

    /// Insert a fresh row id (`DuplicateKey` if present)
    pub fn insert(&self, id: RowId, location: Location) -> Result<()> {
        self.tree.write().insert(id, location)
    }

    pub fn get(&self, id: RowId) -> Option<Location> {
        self.tree.read().get(id)
    }

    pub fn search(&self, id: RowId) -> bool {
        self.tree.read().search(id)
    }

    /// Remove a row id; false if it was not present
    pub fn delete(&self, id: RowId) -> bool {
        self.tree.write().delete(id)
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    pub fn order(&self) -> usize {
        self.tree.read().order()
    }

    pub fn height(&self) -> usize {
        self.tree.read().height()
    }

    pub fn keys(&self) -> Vec<RowId> {
        self.tree.read().keys()
    }

    pub fn range<R: RangeBounds<RowId>>(&self, range: R) -> Vec<(RowId, Location)> {
        self.tree.read().range(range)
    }

    pub fn first(&self, n: usize) -> Vec<RowId> {
        self.tree.read().first(n)
    }

    pub fn last(&self, n: usize) -> Vec<RowId> {
        self.tree.read().last(n)
    }

    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.tree.read().check_invariants()
    }
}
