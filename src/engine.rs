//! Engine Module
//!
//! The storage engine façade that coordinates the index and the chunk store.
//!
//! ## Responsibilities
//! - Bulk load homogeneous records on a pool of worker threads
//! - Row-level insert/read/update/delete, atomic per row
//! - Ordered multi-row reads (`loc`, `head`, `tail`)
//! - Lifecycle: Loading → Ready → Closed
//!
//! ## Destructive Close
//! `close()` flushes and then deletes every chunk file. Nothing written
//! through an engine outlives it; the chunk directory is also reset when an
//! engine opens.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::chunk::{ChunkSizes, ChunkStore, StoreStats};
use crate::config::{Config, StorageMode};
use crate::error::{FrameError, Result};
use crate::index::{Index, Location, RowId};
use crate::schema::{Field, Record, Schema, Tabular};

/// Lifecycle of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Bulk load in progress; not yet handed to the caller
    Loading,
    /// Serving row operations
    Ready,
    /// Closed; every operation fails with `Closed`
    Closed,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// Every operation holds the state lock shared for its whole duration;
/// `close()` takes it exclusively. Row operations serialize on a stripe
/// lock chosen by row chunk, so two writers of the same chunk never
/// interleave while writers of different chunks proceed in parallel.
///
/// Locks are always acquired in this order:
/// state → row-chunk stripe → index → chunk cache
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Column layout registered at load time
    schema: Schema,

    /// Row id → row chunk (internal RwLock)
    index: Index,

    /// Chunk cache and files (internal Mutex)
    store: ChunkStore,

    /// Per-row-chunk write serialization
    stripes: Vec<Mutex<()>>,

    /// Lifecycle state
    state: RwLock<EngineState>,
}

impl Engine {
    /// Number of row-chunk lock stripes
    const STRIPES: usize = 64;

    /// Create an empty engine for an explicit schema
    ///
    /// Sizing comes from `config.expected_rows` (0 if unset).
    pub fn open(config: Config, schema: Schema) -> Result<Self> {
        config.validate()?;
        let cardinality = config.expected_rows.unwrap_or(0);
        let engine = Self::build(config, schema, cardinality)?;
        *engine.state.write() = EngineState::Ready;
        Ok(engine)
    }

    /// Bulk load records, deriving the schema from the first one
    ///
    /// Every record must have the same columns, in the same order, with
    /// values of the same types. Row ids are assigned `0..records.len()`.
    pub fn from_records(config: Config, records: Vec<Record>) -> Result<Self> {
        config.validate()?;
        if records.is_empty() {
            return Err(FrameError::EmptyInput);
        }
        let schema = Schema::infer(&records)?;
        Self::bulk_load(config, schema, records)
    }

    /// Bulk load values of a type that registers its own schema
    pub fn from_tabular<T: Tabular>(config: Config, rows: Vec<T>) -> Result<Self> {
        config.validate()?;
        if rows.is_empty() {
            return Err(FrameError::EmptyInput);
        }
        let schema = Schema::new(T::fields())?;
        let records: Vec<Record> = rows.into_iter().map(T::into_record).collect();
        for (i, record) in records.iter().enumerate() {
            schema
                .check_record(record)
                .map_err(|e| FrameError::SchemaMismatch(format!("record {}: {}", i, e)))?;
        }
        Self::bulk_load(config, schema, records)
    }

    fn build(config: Config, schema: Schema, cardinality: usize) -> Result<Self> {
        // Step 1: Index sized for the expected cardinality
        let index = match config.index_order {
            Some(order) => Index::with_order(order)?,
            None => Index::new(cardinality),
        };

        // Step 2: Chunk sizes are fixed from here on
        let sizes = ChunkSizes::resolve(&config, cardinality);

        // Step 3: Open (and reset) the chunk store
        let store = ChunkStore::open(&config, schema.clone(), sizes)?;

        Ok(Self {
            config,
            schema,
            index,
            store,
            stripes: (0..Self::STRIPES).map(|_| Mutex::new(())).collect(),
            state: RwLock::new(EngineState::Loading),
        })
    }

    fn bulk_load(config: Config, schema: Schema, records: Vec<Record>) -> Result<Self> {
        let rows = records.len();
        let cardinality = config.expected_rows.unwrap_or(rows);
        let engine = Self::build(config, schema, cardinality)?;

        tracing::info!(
            rows,
            columns = engine.schema.len(),
            workers = engine.config.worker_count,
            index_order = engine.index.order(),
            row_chunk_size = engine.store.sizes().rows,
            "Bulk load started"
        );
        let started = Instant::now();

        if let Err(e) = engine.load_parallel(records) {
            tracing::error!("Bulk load failed: {}", e);
            if let Err(cleanup) = engine.store.teardown() {
                tracing::warn!("Failed to remove partial chunks: {}", cleanup);
            }
            return Err(e);
        }

        *engine.state.write() = EngineState::Ready;
        tracing::info!(
            rows,
            height = engine.index.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk load finished"
        );
        Ok(engine)
    }

    /// Feed chunk-aligned id ranges to the worker pool and wait for all of
    /// them. The first failure stops the remaining workers.
    fn load_parallel(&self, records: Vec<Record>) -> Result<()> {
        let batch_size = self.store.sizes().rows;
        let (tx, rx) = crossbeam::channel::unbounded::<(RowId, Vec<Record>)>();

        let mut batches = 0;
        let mut next_id: RowId = 0;
        let mut remaining = records.into_iter();
        loop {
            let batch: Vec<Record> = remaining.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let len = batch.len() as RowId;
            tx.send((next_id, batch))
                .map_err(|e| FrameError::Worker(e.to_string()))?;
            next_id += len;
            batches += 1;
        }
        drop(tx);

        let workers = self.config.worker_count.min(batches).max(1);
        let abort = AtomicBool::new(false);

        let outcomes = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    let abort = &abort;
                    s.spawn(move |_| -> Result<()> {
                        for (start, batch) in rx.iter() {
                            if abort.load(Ordering::Relaxed) {
                                break;
                            }
                            for (offset, record) in batch.into_iter().enumerate() {
                                if let Err(e) = self.insert_unchecked(start + offset as RowId, record) {
                                    abort.store(true, Ordering::Relaxed);
                                    return Err(e);
                                }
                            }
                        }
                        Ok(())
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().map_err(|_| FrameError::Worker("worker panicked".to_string())))
                .collect::<Vec<_>>()
        })
        .map_err(|_| FrameError::Worker("worker scope panicked".to_string()))?;

        for outcome in outcomes {
            outcome??;
        }
        Ok(())
    }

    // =========================================================================
    // Row Operations
    // =========================================================================

    /// Insert a full row under a fresh id
    pub fn insert_row(&self, id: RowId, record: Record) -> Result<()> {
        let _state = self.live()?;
        self.schema.validate(&record)?;
        self.insert_unchecked(id, record)
    }

    /// Read one row
    pub fn read_row(&self, id: RowId) -> Result<Record> {
        let _state = self.live()?;
        self.read_unchecked(id)
    }

    /// Overwrite some fields of an existing row
    ///
    /// Unknown fields or values of the wrong type fail with `SchemaMismatch`
    /// and leave the row untouched.
    pub fn update_row(&self, id: RowId, fields: Record) -> Result<()> {
        let _state = self.live()?;
        self.schema.check_partial(&fields)?;

        let _stripe = self.stripe(id).lock();
        let location = self.index.get(id).ok_or(FrameError::NotFound { id })?;
        self.store.update_row(id, location, fields)
    }

    /// Remove a row
    pub fn delete_row(&self, id: RowId) -> Result<()> {
        let _state = self.live()?;

        let _stripe = self.stripe(id).lock();
        let location = self.index.get(id).ok_or(FrameError::NotFound { id })?;
        self.store.delete_row(id, location)?;
        self.index.delete(id);
        Ok(())
    }

    /// Whether a row id is present
    pub fn search(&self, id: RowId) -> Result<bool> {
        let _state = self.live()?;
        Ok(self.index.search(id))
    }

    // =========================================================================
    // Multi-Row Reads
    // =========================================================================

    /// Rows for the given ids, in the given order
    ///
    /// Fails with `NotFound` on the first absent id.
    pub fn loc(&self, ids: &[RowId]) -> Result<Vec<Record>> {
        let _state = self.live()?;
        ids.iter().map(|&id| self.read_unchecked(id)).collect()
    }

    /// The first `n` rows by id
    pub fn head(&self, n: usize) -> Result<Vec<(RowId, Record)>> {
        let _state = self.live()?;
        self.read_many(self.index.first(n))
    }

    /// The last `n` rows by id, in ascending order
    pub fn tail(&self, n: usize) -> Result<Vec<(RowId, Record)>> {
        let _state = self.live()?;
        self.read_many(self.index.last(n))
    }

    /// Every live row id, ascending
    pub fn row_ids(&self) -> Result<Vec<RowId>> {
        let _state = self.live()?;
        Ok(self.index.keys())
    }

    /// Number of live rows
    pub fn len(&self) -> Result<usize> {
        let _state = self.live()?;
        Ok(self.index.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        let _state = self.live()?;
        Ok(self.index.is_empty())
    }

    /// Summary of the engine's layout and activity
    pub fn info(&self) -> Result<FrameInfo> {
        let _state = self.live()?;
        let sizes = self.store.sizes();
        Ok(FrameInfo {
            rows: self.index.len(),
            fields: self.schema.fields().to_vec(),
            storage_mode: self.config.storage_mode,
            row_chunk_size: sizes.rows,
            column_chunk_size: sizes.columns,
            column_chunking: self.config.column_chunking,
            index_order: self.index.order(),
            index_height: self.index.height(),
            cached_chunks: self.store.cached_chunks().len(),
            cache_bytes: self.store.cache_bytes(),
            persisted_chunks: self.store.persisted_chunks()?.len(),
            stats: self.store.stats(),
        })
    }

    // =========================================================================
    // Cache and Lifecycle
    // =========================================================================

    /// Persist all dirty chunks and clear the cache
    ///
    /// Returns the number of chunk files written (0 in memory mode).
    pub fn flush(&self) -> Result<usize> {
        let _state = self.live()?;
        self.store.flush()
    }

    /// Drop the cache after persisting it (no-op in memory mode)
    pub fn evict_cache(&self) -> Result<()> {
        let _state = self.live()?;
        self.store.evict()
    }

    /// Close the engine
    ///
    /// Flushes outstanding dirty chunks (disk mode) and then **deletes every
    /// chunk file**, leaving the chunk directory empty. Rows are not
    /// recoverable afterwards. Calling `close` again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        if *state == EngineState::Closed {
            return Ok(());
        }

        let flushed = self.store.flush();
        let torn_down = self.store.teardown();
        *state = EngineState::Closed;

        tracing::info!(rows = self.index.len(), "Engine closed");
        flushed?;
        torn_down
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Shared state guard, or `Closed`
    fn live(&self) -> Result<RwLockReadGuard<'_, EngineState>> {
        let state = self.state.read();
        if *state == EngineState::Closed {
            return Err(FrameError::Closed);
        }
        Ok(state)
    }

    fn stripe(&self, id: RowId) -> &Mutex<()> {
        let row_chunk = self.store.sizes().row_chunk_of(id);
        &self.stripes[(row_chunk % self.stripes.len() as u64) as usize]
    }

    /// Insert a row already checked against the schema
    ///
    /// The index entry goes in first so a duplicate id never touches the
    /// store; a store failure removes it again.
    fn insert_unchecked(&self, id: RowId, record: Record) -> Result<()> {
        let _stripe = self.stripe(id).lock();

        let location = Location::new(self.store.sizes().row_chunk_of(id));
        self.index.insert(id, location)?;

        if let Err(e) = self.store.insert_row(id, record) {
            self.index.delete(id);
            return Err(e);
        }
        Ok(())
    }

    fn read_unchecked(&self, id: RowId) -> Result<Record> {
        let _stripe = self.stripe(id).lock();
        let location = self.index.get(id).ok_or(FrameError::NotFound { id })?;
        self.store.read_row(id, location)
    }

    fn read_many(&self, ids: Vec<RowId>) -> Result<Vec<(RowId, Record)>> {
        ids.into_iter()
            .map(|id| self.read_unchecked(id).map(|record| (id, record)))
            .collect()
    }
}

// =============================================================================
// Engine Summary
// =============================================================================

/// Snapshot of an engine's layout and activity
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    pub rows: usize,
    pub fields: Vec<Field>,
    pub storage_mode: StorageMode,
    pub row_chunk_size: usize,
    pub column_chunk_size: usize,
    pub column_chunking: bool,
    pub index_order: usize,
    pub index_height: usize,
    pub cached_chunks: usize,
    pub cache_bytes: usize,
    pub persisted_chunks: usize,
    pub stats: StoreStats,
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FrameDB engine: {} rows x {} columns", self.rows, self.fields.len())?;
        let width = self
            .fields
            .iter()
            .map(|field| field.name.len())
            .max()
            .unwrap_or(0)
            .max("Column".len());
        writeln!(f, " #  {:<width$}  Type", "Column", width = width)?;
        for (i, field) in self.fields.iter().enumerate() {
            writeln!(f, "{:>2}  {:<width$}  {}", i, field.name, field.ty, width = width)?;
        }
        writeln!(
            f,
            "storage: {:?}, row chunks of {}, column chunks of {}{}",
            self.storage_mode,
            self.row_chunk_size,
            self.column_chunk_size,
            if self.column_chunking { "" } else { " (disabled)" }
        )?;
        writeln!(f, "index: order {}, height {}", self.index_order, self.index_height)?;
        write!(
            f,
            "cache: {} chunks, ~{} bytes; {} chunk files, {} flushes, {} loads",
            self.cached_chunks,
            self.cache_bytes,
            self.persisted_chunks,
            self.stats.flushes,
            self.stats.chunk_loads
        )
    }
}
