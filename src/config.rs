//! Configuration for FrameDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{FrameError, Result};

/// Main configuration for an engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── chunks/        (persisted chunk files, reset on open and close)
    pub data_dir: PathBuf,

    /// Whether chunks are persisted to disk or kept in memory only
    pub storage_mode: StorageMode,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Aggregate byte estimate at which the chunk cache is flushed (in bytes)
    pub cache_size_limit: usize,

    // -------------------------------------------------------------------------
    // Sizing Configuration
    // -------------------------------------------------------------------------
    /// Expected row count; drives index order and chunk size tiers.
    /// `None` means "use the bulk load length".
    pub expected_rows: Option<usize>,

    /// Fixed rows per row chunk (overrides the cardinality tier)
    pub row_chunk_size: Option<usize>,

    /// Fixed columns per column chunk (overrides the cardinality tier)
    pub column_chunk_size: Option<usize>,

    /// Split persisted row chunks further by column ranges
    pub column_chunking: bool,

    /// Fixed index order (overrides the block-size heuristic)
    pub index_order: Option<usize>,

    // -------------------------------------------------------------------------
    // Ingestion Configuration
    // -------------------------------------------------------------------------
    /// Number of bulk load worker threads
    pub worker_count: usize,
}

/// Where chunk data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Chunks are written to `{data_dir}/chunks` on flush
    Disk,

    /// Chunks stay in the cache forever; flush is a no-op
    Memory,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./framedb_data"),
            storage_mode: StorageMode::Disk,
            cache_size_limit: 1024 * 1024 * 1024, // 1 GiB
            expected_rows: None,
            row_chunk_size: None,
            column_chunk_size: None,
            column_chunking: false,
            index_order: None,
            worker_count: 32,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_size_limit == 0 {
            return Err(FrameError::InvalidConfiguration(
                "cache_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(FrameError::InvalidConfiguration(
                "worker_count must be greater than zero".to_string(),
            ));
        }
        if self.row_chunk_size == Some(0) {
            return Err(FrameError::InvalidConfiguration(
                "row_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.column_chunk_size == Some(0) {
            return Err(FrameError::InvalidConfiguration(
                "column_chunk_size must be greater than zero".to_string(),
            ));
        }
        if let Some(order) = self.index_order {
            crate::index::validate_order(order)?;
        }
        Ok(())
    }

    /// Whether chunks are written to disk
    pub fn is_persistent(&self) -> bool {
        self.storage_mode == StorageMode::Disk
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set disk-backed or in-memory-only storage
    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.config.storage_mode = mode;
        self
    }

    /// Set the cache flush threshold (in bytes)
    pub fn cache_size_limit(mut self, size: usize) -> Self {
        self.config.cache_size_limit = size;
        self
    }

    /// Set the expected row cardinality
    pub fn expected_rows(mut self, rows: usize) -> Self {
        self.config.expected_rows = Some(rows);
        self
    }

    /// Pin the row chunk size
    pub fn row_chunk_size(mut self, rows: usize) -> Self {
        self.config.row_chunk_size = Some(rows);
        self
    }

    /// Pin the column chunk size
    pub fn column_chunk_size(mut self, columns: usize) -> Self {
        self.config.column_chunk_size = Some(columns);
        self
    }

    /// Enable or disable column-range chunk files
    pub fn column_chunking(mut self, enabled: bool) -> Self {
        self.config.column_chunking = enabled;
        self
    }

    /// Pin the index order
    pub fn index_order(mut self, order: usize) -> Self {
        self.config.index_order = Some(order);
        self
    }

    /// Set the number of bulk load workers
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
