//! Chunk Store
//!
//! Owns the chunk cache and the chunk directory of one engine.
//!
//! ## Write Path
//! 1. Locate the row chunk (`id / rows`) and slot offset
//! 2. If the write would bring the cache byte estimate to the limit, flush
//!    everything first; a failed flush fails the write with nothing changed
//! 3. Write into the cached entry, creating a partial entry on a miss
//!
//! ## Read Path
//! 1. Cached live slot → return directly
//! 2. Otherwise load every persisted unit of the row chunk, merge into the
//!    entry's unknown slots, then read
//!
//! ## Concurrency
//! All state sits behind one `parking_lot::Mutex`. Flushes triggered from
//! the write path run synchronously while that lock is held.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{FrameError, Result};
use crate::index::{Location, RowId};
use crate::schema::{Record, Schema, Value};

use super::cache::{CachedChunk, Slot};
use super::{read_chunk, write_chunk, ChunkCache, ChunkData, ChunkId, ChunkSizes};

/// Counters describing cache and persistence activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Completed cache flushes (automatic or explicit)
    pub flushes: u64,
    /// Chunk files written across all flushes
    pub chunks_written: u64,
    /// Row chunks loaded back from disk
    pub chunk_loads: u64,
}

struct StoreState {
    cache: ChunkCache,
    /// Row chunks with at least one persisted unit
    persisted: BTreeSet<u64>,
    stats: StoreStats,
}

/// Chunked column storage with a write-back cache
pub struct ChunkStore {
    dir: PathBuf,
    /// Disk mode; memory-mode stores never touch the directory
    persistent: bool,
    sizes: ChunkSizes,
    column_chunking: bool,
    schema: Schema,
    cache_limit: usize,
    state: Mutex<StoreState>,
}

impl ChunkStore {
    /// Open a store under `{data_dir}/chunks`
    ///
    /// In disk mode any chunk directory left by a previous engine is removed
    /// and recreated empty.
    pub fn open(config: &Config, schema: Schema, sizes: ChunkSizes) -> Result<Self> {
        let dir = config.data_dir.join("chunks");

        if config.is_persistent() {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }

        tracing::info!(
            dir = %dir.display(),
            mode = ?config.storage_mode,
            row_chunk_size = sizes.rows,
            column_chunk_size = sizes.columns,
            column_chunking = config.column_chunking,
            "Chunk store opened"
        );

        Ok(Self {
            dir,
            persistent: config.is_persistent(),
            sizes,
            column_chunking: config.column_chunking,
            schema,
            cache_limit: config.cache_size_limit,
            state: Mutex::new(StoreState {
                cache: ChunkCache::new(),
                persisted: BTreeSet::new(),
                stats: StoreStats::default(),
            }),
        })
    }

    // =========================================================================
    // Row Operations
    // =========================================================================

    /// Write a full row (already checked against the schema)
    pub fn insert_row(&self, id: RowId, record: Record) -> Result<Location> {
        let (row_chunk, offset) = self.slot_of(id);
        let values: Vec<Value> = record.into_iter().map(|(_, v)| v).collect();
        let incoming: usize = values.iter().map(Value::estimated_size).sum();

        let mut state = self.state.lock();
        self.make_room(&mut state, incoming)?;
        let complete = !state.persisted.contains(&row_chunk);
        state.cache.with_entry(
            row_chunk,
            || self.new_entry(row_chunk, complete),
            |entry| entry.set_row(offset, values),
        );

        Ok(Location::new(row_chunk))
    }

    /// Read the row stored at `location`
    pub fn read_row(&self, id: RowId, location: Location) -> Result<Record> {
        let (_, offset) = self.slot_of(id);
        let row_chunk = location.row_chunk;

        let mut state = self.state.lock();
        self.make_resident(&mut state, id, row_chunk, offset)?;
        let record = state
            .cache
            .get(row_chunk)
            .and_then(|entry| entry.record(offset, &self.schema))
            .ok_or_else(|| missing_row(id, row_chunk))?;
        self.make_room(&mut state, 0)?;

        Ok(record)
    }

    /// Overwrite the given fields of an existing row
    pub fn update_row(&self, id: RowId, location: Location, fields: Record) -> Result<()> {
        let (_, offset) = self.slot_of(id);
        let row_chunk = location.row_chunk;

        let mut changes = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let column = self
                .schema
                .position(&name)
                .ok_or_else(|| FrameError::SchemaMismatch(format!("unknown field '{}'", name)))?;
            changes.push((column, value));
        }
        let incoming: usize = changes.iter().map(|(_, v)| v.estimated_size()).sum();

        let mut state = self.state.lock();
        self.make_room(&mut state, incoming)?;
        self.make_resident(&mut state, id, row_chunk, offset)?;
        state.cache.with_entry(
            row_chunk,
            || self.new_entry(row_chunk, true),
            |entry| {
                for (column, value) in changes {
                    entry.set_value(offset, column, value);
                }
            },
        );
        Ok(())
    }

    /// Clear a row's slot; the next flush clears it on disk too
    pub fn delete_row(&self, id: RowId, location: Location) -> Result<()> {
        let (_, offset) = self.slot_of(id);
        let row_chunk = location.row_chunk;

        let mut state = self.state.lock();
        self.make_room(&mut state, 0)?;
        let complete = !state.persisted.contains(&row_chunk);
        state.cache.with_entry(
            row_chunk,
            || self.new_entry(row_chunk, complete),
            |entry| entry.delete_row(offset),
        );
        Ok(())
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Persist every dirty cached chunk, then empty the cache
    ///
    /// Returns the number of chunk files written. No-op in memory mode.
    pub fn flush(&self) -> Result<usize> {
        if !self.persistent {
            return Ok(0);
        }
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    /// Flush, leaving nothing cached (no-op in memory mode)
    pub fn evict(&self) -> Result<()> {
        self.flush().map(|_| ())
    }

    /// Delete every persisted chunk and drop the cache without flushing
    ///
    /// The chunk directory is recreated empty.
    pub fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.cache.drain();
        state.persisted.clear();

        if self.persistent {
            tracing::warn!(dir = %self.dir.display(), "Deleting all chunk files");
            if self.dir.exists() {
                fs::remove_dir_all(&self.dir)?;
            }
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Read the persisted content of a row chunk, bypassing the cache
    pub fn load_chunk(&self, row_chunk: u64) -> Result<ChunkData> {
        self.load_units(row_chunk)
    }

    /// Current cached content of a row chunk, if cached
    pub fn snapshot(&self, row_chunk: u64) -> Option<ChunkData> {
        let state = self.state.lock();
        state
            .cache
            .get(row_chunk)
            .map(|entry| entry.to_chunk_data(&self.schema))
    }

    /// Chunk units present in the chunk directory, sorted
    pub fn persisted_chunks(&self) -> Result<Vec<ChunkId>> {
        if !self.persistent || !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(ChunkId::parse_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Row chunks currently cached, ascending
    pub fn cached_chunks(&self) -> Vec<u64> {
        self.state.lock().cache.row_chunks()
    }

    /// Aggregate byte estimate of the cache
    pub fn cache_bytes(&self) -> usize {
        self.state.lock().cache.total_bytes()
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats
    }

    pub fn sizes(&self) -> ChunkSizes {
        self.sizes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn slot_of(&self, id: RowId) -> (u64, usize) {
        let row_chunk = self.sizes.row_chunk_of(id);
        let offset = (id - self.sizes.chunk_start(row_chunk)) as usize;
        (row_chunk, offset)
    }

    fn new_entry(&self, row_chunk: u64, complete: bool) -> CachedChunk {
        CachedChunk::new(
            self.sizes.chunk_start(row_chunk),
            self.sizes.rows,
            self.schema.len(),
            complete,
        )
    }

    fn unit_path(&self, id: ChunkId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    /// Schema column names stored in column chunk `c`
    fn column_range(&self, c: u32) -> impl Iterator<Item = &str> {
        let start = c as usize * self.sizes.columns;
        self.schema.names().skip(start).take(self.sizes.columns)
    }

    /// Ensure the slot for `id` is cached and live, loading from disk if needed
    fn make_resident(
        &self,
        state: &mut StoreState,
        id: RowId,
        row_chunk: u64,
        offset: usize,
    ) -> Result<()> {
        let needs_load = match state.cache.get(row_chunk) {
            Some(entry) => entry.slot(offset) == Slot::Unknown && !entry.complete,
            None => true,
        };

        if needs_load {
            if !state.persisted.contains(&row_chunk) {
                return Err(missing_row(id, row_chunk));
            }
            let data = self.load_units(row_chunk)?;
            state.stats.chunk_loads += 1;
            tracing::debug!(row_chunk, "Loaded chunk from disk");
            state.cache.with_entry(
                row_chunk,
                || self.new_entry(row_chunk, false),
                |entry| entry.merge_persisted(&data, &self.schema),
            );
        }

        match state.cache.get(row_chunk).map(|entry| entry.slot(offset)) {
            Some(Slot::Live) => Ok(()),
            _ => Err(missing_row(id, row_chunk)),
        }
    }

    /// Read and combine every persisted unit of a row chunk
    fn load_units(&self, row_chunk: u64) -> Result<ChunkData> {
        if !self.column_chunking {
            let id = ChunkId::row(row_chunk);
            return read_chunk(&self.unit_path(id), id);
        }

        let mut data = ChunkData::new(self.sizes.chunk_start(row_chunk), self.sizes.rows);
        for c in 0..self.sizes.column_chunks(self.schema.len()) {
            let id = ChunkId::column(row_chunk, c);
            data.absorb(read_chunk(&self.unit_path(id), id)?);
        }
        Ok(data)
    }

    /// Write every unit of a row chunk; returns the number of files written
    fn write_units(&self, row_chunk: u64, data: &ChunkData) -> Result<usize> {
        if !self.column_chunking {
            let id = ChunkId::row(row_chunk);
            write_chunk(&self.unit_path(id), id, data)?;
            return Ok(1);
        }

        let units = self.sizes.column_chunks(self.schema.len());
        for c in 0..units {
            let id = ChunkId::column(row_chunk, c);
            write_chunk(&self.unit_path(id), id, &data.project(self.column_range(c)))?;
        }
        Ok(units as usize)
    }

    /// Flush everything if adding `incoming` bytes would reach the limit.
    ///
    /// Runs before a write touches the cache, so an error here leaves the
    /// row exactly as it was.
    fn make_room(&self, state: &mut StoreState, incoming: usize) -> Result<()> {
        let cached = state.cache.total_bytes();
        if !self.persistent || state.cache.is_empty() || cached + incoming < self.cache_limit {
            return Ok(());
        }
        tracing::debug!(
            cache_bytes = cached,
            incoming,
            limit = self.cache_limit,
            "Cache limit reached, flushing"
        );
        self.flush_locked(state).map(|_| ())
    }

    /// Write all dirty entries, then clear the cache.
    ///
    /// The cache is cleared only once every write succeeded, so a failed
    /// flush keeps all dirty data cached.
    fn flush_locked(&self, state: &mut StoreState) -> Result<usize> {
        let mut files = 0;
        let mut chunks = 0;

        for row_chunk in state.cache.row_chunks() {
            let (dirty, complete) = match state.cache.get(row_chunk) {
                Some(entry) => (entry.dirty, entry.complete),
                None => continue,
            };
            if !dirty {
                continue;
            }

            if !complete {
                let data = self.load_units(row_chunk)?;
                state.cache.with_entry(
                    row_chunk,
                    || self.new_entry(row_chunk, false),
                    |entry| entry.merge_persisted(&data, &self.schema),
                );
            }

            let data = match state.cache.get(row_chunk) {
                Some(entry) => entry.to_chunk_data(&self.schema),
                None => continue,
            };
            files += self.write_units(row_chunk, &data)?;
            chunks += 1;
            state.persisted.insert(row_chunk);
        }

        let evicted = state.cache.drain().len();
        state.stats.flushes += 1;
        state.stats.chunks_written += files as u64;

        tracing::debug!(chunks, files, evicted, "Cache flushed");
        Ok(files)
    }
}

fn missing_row(id: RowId, row_chunk: u64) -> FrameError {
    FrameError::corrupt(
        ChunkId::row(row_chunk),
        format!("row {} is indexed but has no stored data", id),
    )
}
