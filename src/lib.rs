//! # FrameDB
//!
//! An embedded storage engine for tabular data:
//! - B+Tree index from row id to the chunk holding the row
//! - Column data partitioned into fixed-size row chunks (optionally split
//!   further by column ranges)
//! - Size-bounded write-back cache with all-or-nothing flush
//! - Parallel bulk load of homogeneous records
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │        bulk load · insert/read/update/delete · loc/head     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  state → row-chunk stripe → index → cache
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Index    │          │ Chunk Cache │
//!   │  (B+Tree)   │          │   (Mutex)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ flush / load
//!                                   ▼
//!                           ┌─────────────┐
//!                           │ Chunk Files │
//!                           │ {dir}/chunks│
//!                           └─────────────┘
//! ```
//!
//! ## Persistence Lifetime
//!
//! Chunk files are scratch space, not a durable database. Opening an engine
//! clears `{data_dir}/chunks`, and [`Engine::close`] flushes and then
//! **deletes every chunk file**.
//!
//! ## Example
//!
//! ```no_run
//! use framedb::{Config, Engine, Record};
//!
//! let records: Vec<Record> = (0..1000)
//!     .map(|i| Record::new().with("id", i as i64).with("name", format!("row {}", i)))
//!     .collect();
//!
//! let engine = Engine::from_records(Config::default(), records)?;
//! let row = engine.read_row(42)?;
//! assert_eq!(row.get("id").and_then(|v| v.as_int()), Some(42));
//! engine.close()?;
//! # Ok::<(), framedb::FrameError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod schema;
pub mod index;
pub mod chunk;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FrameError, Result};
pub use config::{Config, StorageMode};
pub use engine::{Engine, EngineState, FrameInfo};
pub use schema::{Field, Record, Schema, Tabular, Value, ValueType};
pub use index::{BPlusTree, Index, Location, RowId};
pub use chunk::{ChunkId, ChunkSizes};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FrameDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
