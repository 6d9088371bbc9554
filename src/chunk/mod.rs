//! Chunk Module
//!
//! Fixed-size partitions of column data, their on-disk format, and the
//! write-back cache in front of them.
//!
//! ## Responsibilities
//! - Map row ids to row chunks (`id / row_chunk_size`)
//! - Optionally split each row chunk into column-range files
//! - Cache chunk slices in memory and flush them all at once when the
//!   cache's byte estimate crosses the configured limit
//! - Load chunks back from disk on a cache miss
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                            │
//! │   Magic: "FDBC" (4) | Version: u16 (2) | PayloadLen: u64 (8) │
//! │   PayloadCRC32: u32 (4)                                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (PayloadLen bytes)                                   │
//! │   bincode(ChunkData)                                         │
//! │   base_row | width | column name → [Option<Value>; width]    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One file per unit, named by chunk kind and index:
//! `row_chunk_00000042.chunk` or `row_chunk_00000042_col_0003.chunk`.

mod cache;
mod codec;
mod store;

use std::fmt;

use crate::config::Config;
use crate::index::RowId;

pub use cache::ChunkCache;
pub use codec::{read_chunk, write_chunk, ChunkData};
pub use store::{ChunkStore, StoreStats};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a FrameDB chunk file
pub(crate) const MAGIC: &[u8; 4] = b"FDBC";

/// Current chunk format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + PayloadLen (8) + CRC (4) = 18 bytes
pub(crate) const HEADER_SIZE: usize = 18;

/// Chunk file extension
pub(crate) const EXTENSION: &str = "chunk";

// =============================================================================
// Chunk Identity
// =============================================================================

/// Identity of one persisted unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    /// Row chunk index
    pub row_chunk: u64,
    /// Column chunk index, when column chunking is enabled
    pub column_chunk: Option<u32>,
}

impl ChunkId {
    pub fn row(row_chunk: u64) -> Self {
        Self {
            row_chunk,
            column_chunk: None,
        }
    }

    pub fn column(row_chunk: u64, column_chunk: u32) -> Self {
        Self {
            row_chunk,
            column_chunk: Some(column_chunk),
        }
    }

    /// Deterministic file name for this unit
    pub fn file_name(&self) -> String {
        match self.column_chunk {
            None => format!("row_chunk_{:08}.{}", self.row_chunk, EXTENSION),
            Some(c) => format!("row_chunk_{:08}_col_{:04}.{}", self.row_chunk, c, EXTENSION),
        }
    }

    /// Parse a chunk file name
    /// "row_chunk_00000042.chunk" → row 42
    /// "row_chunk_00000042_col_0003.chunk" → row 42, column 3
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
        let rest = stem.strip_prefix("row_chunk_")?;
        match rest.split_once("_col_") {
            Some((row, col)) => Some(Self::column(row.parse().ok()?, col.parse().ok()?)),
            None => Some(Self::row(rest.parse().ok()?)),
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column_chunk {
            None => write!(f, "row chunk {}", self.row_chunk),
            Some(c) => write!(f, "row chunk {} column chunk {}", self.row_chunk, c),
        }
    }
}

// =============================================================================
// Chunk Sizing Policy
// =============================================================================

/// Chunk widths, fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizes {
    /// Rows per row chunk
    pub rows: usize,
    /// Columns per column chunk
    pub columns: usize,
}

impl ChunkSizes {
    /// Rows per chunk for small datasets
    pub const BASE_ROWS: usize = 1_000;

    /// Columns per column chunk for small datasets
    pub const BASE_COLUMNS: usize = 8;

    /// Tiered sizing: base up to 50,000 rows, double above, quadruple
    /// above 100,000.
    pub fn for_cardinality(rows: usize) -> Self {
        let factor = if rows > 100_000 {
            4
        } else if rows > 50_000 {
            2
        } else {
            1
        };
        Self {
            rows: Self::BASE_ROWS * factor,
            columns: Self::BASE_COLUMNS * factor,
        }
    }

    /// Tiered sizing with any pinned sizes from the config applied
    pub fn resolve(config: &Config, cardinality: usize) -> Self {
        let tiered = Self::for_cardinality(cardinality);
        Self {
            rows: config.row_chunk_size.unwrap_or(tiered.rows),
            columns: config.column_chunk_size.unwrap_or(tiered.columns),
        }
    }

    /// Row chunk holding `id`
    pub fn row_chunk_of(&self, id: RowId) -> u64 {
        id / self.rows as u64
    }

    /// First row id of a row chunk
    pub fn chunk_start(&self, row_chunk: u64) -> RowId {
        row_chunk * self.rows as u64
    }

    /// Column chunks needed for `num_columns` columns
    pub fn column_chunks(&self, num_columns: usize) -> u32 {
        num_columns.div_ceil(self.columns) as u32
    }
}
