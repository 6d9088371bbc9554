//! Chunk cache
//!
//! In-memory, possibly-dirty copies of row chunks with an aggregate byte
//! estimate. A write to an uncached chunk creates a *partial* entry instead
//! of reading the chunk first; the persisted content is merged in lazily,
//! on the first read of an unknown slot or at flush time.

use std::collections::HashMap;

use crate::index::RowId;
use crate::schema::{Record, Schema, Value};

use super::ChunkData;

/// What the cache knows about one row slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Not written here; persisted content (if any) is authoritative
    Unknown,
    /// Holds the current row
    Live,
    /// Row was deleted here; persisted content must be cleared
    Deleted,
}

/// One cached row chunk, columns in schema order
#[derive(Debug, Clone)]
pub(crate) struct CachedChunk {
    pub(crate) base_row: RowId,
    columns: Vec<Vec<Option<Value>>>,
    slots: Vec<Slot>,
    /// Whether every persisted row has been merged in
    pub(crate) complete: bool,
    pub(crate) dirty: bool,
    bytes: usize,
}

impl CachedChunk {
    pub(crate) fn new(base_row: RowId, width: usize, num_columns: usize, complete: bool) -> Self {
        Self {
            base_row,
            columns: vec![vec![None; width]; num_columns],
            slots: vec![Slot::Unknown; width],
            complete,
            dirty: false,
            bytes: 0,
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, offset: usize) -> Slot {
        self.slots[offset]
    }

    /// Store a full row (values in schema order)
    pub(crate) fn set_row(&mut self, offset: usize, values: Vec<Value>) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            let size = value.estimated_size();
            if let Some(old) = column[offset].replace(value) {
                self.bytes -= old.estimated_size();
            }
            self.bytes += size;
        }
        self.slots[offset] = Slot::Live;
        self.dirty = true;
    }

    /// Overwrite one column of a live row
    pub(crate) fn set_value(&mut self, offset: usize, column: usize, value: Value) {
        let size = value.estimated_size();
        if let Some(old) = self.columns[column][offset].replace(value) {
            self.bytes -= old.estimated_size();
        }
        self.bytes += size;
        self.dirty = true;
    }

    /// Drop a row, leaving a tombstone for the flush merge
    pub(crate) fn delete_row(&mut self, offset: usize) {
        for column in self.columns.iter_mut() {
            if let Some(old) = column[offset].take() {
                self.bytes -= old.estimated_size();
            }
        }
        self.slots[offset] = Slot::Deleted;
        self.dirty = true;
    }

    /// Materialize a live row as a record
    pub(crate) fn record(&self, offset: usize, schema: &Schema) -> Option<Record> {
        if self.slots[offset] != Slot::Live {
            return None;
        }
        let mut record = Record::with_capacity(schema.len());
        for (field, column) in schema.fields().iter().zip(&self.columns) {
            record.set(field.name.as_str(), column[offset].clone().unwrap_or(Value::Null));
        }
        Some(record)
    }

    /// Fill every `Unknown` slot from persisted content and mark complete.
    /// A slot is live only if every schema column holds a value for it.
    pub(crate) fn merge_persisted(&mut self, data: &ChunkData, schema: &Schema) {
        for offset in 0..self.width() {
            if self.slots[offset] != Slot::Unknown {
                continue;
            }
            let row: Option<Vec<Value>> = schema
                .fields()
                .iter()
                .map(|f| {
                    data.columns
                        .get(&f.name)
                        .and_then(|slice| slice.get(offset))
                        .and_then(|v| v.clone())
                })
                .collect();
            if let Some(values) = row {
                let dirty = self.dirty;
                self.set_row(offset, values);
                self.dirty = dirty;
            }
        }
        self.complete = true;
    }

    /// Persistable form: live slots become values, every other slot is empty
    pub(crate) fn to_chunk_data(&self, schema: &Schema) -> ChunkData {
        let mut data = ChunkData::new(self.base_row, self.width());
        for (field, column) in schema.fields().iter().zip(&self.columns) {
            let slice = column
                .iter()
                .zip(&self.slots)
                .map(|(value, slot)| match slot {
                    Slot::Live => value.clone(),
                    Slot::Unknown | Slot::Deleted => None,
                })
                .collect();
            data.columns.insert(field.name.clone(), slice);
        }
        data
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }
}

/// All cached chunks, keyed by row chunk index
#[derive(Debug, Default)]
pub struct ChunkCache {
    entries: HashMap<u64, CachedChunk>,
    total_bytes: usize,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate byte estimate of all cached values
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, row_chunk: u64) -> bool {
        self.entries.contains_key(&row_chunk)
    }

    /// Cached row chunk indexes, ascending
    pub fn row_chunks(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn get(&self, row_chunk: u64) -> Option<&CachedChunk> {
        self.entries.get(&row_chunk)
    }

    /// Run `f` on the entry for `row_chunk` (created by `create` if absent),
    /// keeping the aggregate byte estimate in step.
    pub(crate) fn with_entry<R>(
        &mut self,
        row_chunk: u64,
        create: impl FnOnce() -> CachedChunk,
        f: impl FnOnce(&mut CachedChunk) -> R,
    ) -> R {
        let entry = self.entries.entry(row_chunk).or_insert_with(create);
        let before = entry.bytes();
        let out = f(entry);
        self.total_bytes = self.total_bytes - before + entry.bytes();
        out
    }

    /// Remove every entry and reset the byte counter
    pub(crate) fn drain(&mut self) -> Vec<(u64, CachedChunk)> {
        self.total_bytes = 0;
        let mut drained: Vec<(u64, CachedChunk)> = self.entries.drain().collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained
    }
}
