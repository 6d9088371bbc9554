//! Error types for FrameDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::chunk::ChunkId;
use crate::index::RowId;

/// Result type alias using FrameError
pub type Result<T> = std::result::Result<T, FrameError>;

/// Unified error type for FrameDB operations
#[derive(Debug, Error)]
pub enum FrameError {
    // -------------------------------------------------------------------------
    // Row Errors
    // -------------------------------------------------------------------------
    #[error("Row {id} not found")]
    NotFound { id: RowId },

    #[error("Row {id} already exists")]
    DuplicateKey { id: RowId },

    // -------------------------------------------------------------------------
    // Ingestion Errors
    // -------------------------------------------------------------------------
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Bulk load input is empty")]
    EmptyInput,

    #[error("Bulk load worker failed: {0}")]
    Worker(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {chunk}: {source}")]
    ChunkIo {
        chunk: ChunkId,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Chunk Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt {chunk}: {reason}")]
    Corrupt { chunk: ChunkId, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    Closed,
}

impl FrameError {
    /// Attach a chunk id to a raw IO error
    pub(crate) fn chunk_io(chunk: ChunkId, source: std::io::Error) -> Self {
        FrameError::ChunkIo { chunk, source }
    }

    /// Build a corruption error for a chunk
    pub(crate) fn corrupt(chunk: ChunkId, reason: impl Into<String>) -> Self {
        FrameError::Corrupt {
            chunk,
            reason: reason.into(),
        }
    }
}
