//! Chunk codec
//!
//! Writes and reads one persisted chunk unit. The payload is bincode;
//! the header carries a CRC so a torn or foreign file is reported as
//! corrupt instead of decoding into garbage.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::index::RowId;
use crate::schema::Value;

use super::{ChunkId, HEADER_SIZE, MAGIC, VERSION};

/// Column slices of one chunk's row range
///
/// `columns[name][i]` is the value of row `base_row + i`; `None` marks a
/// slot with no row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    pub base_row: RowId,
    pub width: usize,
    pub columns: BTreeMap<String, Vec<Option<Value>>>,
}

impl ChunkData {
    pub fn new(base_row: RowId, width: usize) -> Self {
        Self {
            base_row,
            width,
            columns: BTreeMap::new(),
        }
    }

    /// Copy of this chunk restricted to `names`
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out = Self::new(self.base_row, self.width);
        for name in names {
            if let Some(slice) = self.columns.get(name) {
                out.columns.insert(name.to_string(), slice.clone());
            }
        }
        out
    }

    /// Fold another unit of the same row range into this one
    pub fn absorb(&mut self, other: ChunkData) {
        self.columns.extend(other.columns);
    }

    /// Number of slots holding a value in every column
    pub fn row_count(&self) -> usize {
        (0..self.width)
            .filter(|&i| {
                !self.columns.is_empty()
                    && self
                        .columns
                        .values()
                        .all(|slice| slice.get(i).map_or(false, Option::is_some))
            })
            .count()
    }
}

/// Serialize `data` and write it to `path`, replacing any previous file
pub fn write_chunk(path: &Path, id: ChunkId, data: &ChunkData) -> Result<u64> {
    let payload = bincode::serialize(data)
        .map_err(|e| FrameError::Serialization(format!("{}: {}", id, e)))?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u64_le(payload.len() as u64);
    buf.put_u32_le(crc32fast::hash(&payload));
    buf.put_slice(&payload);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| FrameError::chunk_io(id, e))?;
    file.write_all(&buf).map_err(|e| FrameError::chunk_io(id, e))?;
    file.sync_all().map_err(|e| FrameError::chunk_io(id, e))?;

    Ok(buf.len() as u64)
}

/// Read and verify the unit at `path`
pub fn read_chunk(path: &Path, id: ChunkId) -> Result<ChunkData> {
    let raw = fs::read(path).map_err(|e| FrameError::chunk_io(id, e))?;
    if raw.len() < HEADER_SIZE {
        return Err(FrameError::corrupt(
            id,
            format!("file is {} bytes, shorter than header", raw.len()),
        ));
    }

    let mut header = &raw[..HEADER_SIZE];
    let mut magic = [0u8; 4];
    header.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(FrameError::corrupt(id, format!("invalid magic {:?}", magic)));
    }

    let version = header.get_u16_le();
    if version != VERSION {
        return Err(FrameError::corrupt(id, format!("unsupported version {}", version)));
    }

    let payload_len = header.get_u64_le() as usize;
    let expected_crc = header.get_u32_le();

    let payload = &raw[HEADER_SIZE..];
    if payload.len() != payload_len {
        return Err(FrameError::corrupt(
            id,
            format!("payload is {} bytes, header says {}", payload.len(), payload_len),
        ));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(FrameError::corrupt(
            id,
            format!("checksum mismatch: stored {:#010x}, computed {:#010x}", expected_crc, actual_crc),
        ));
    }

    let data: ChunkData =
        bincode::deserialize(payload).map_err(|e| FrameError::corrupt(id, e.to_string()))?;
    if data.columns.values().any(|slice| slice.len() != data.width) {
        return Err(FrameError::corrupt(id, "column slice length differs from chunk width"));
    }
    Ok(data)
}
