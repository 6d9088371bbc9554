//! Tests for chunk identity, sizing, and the chunk file codec
//!
//! These tests verify:
//! - Deterministic chunk file names and their parsing
//! - Cardinality-tiered chunk sizes and config overrides
//! - Write/read of chunk files
//! - Corruption detection (magic, checksum, truncation)

use std::fs;

use framedb::chunk::{read_chunk, write_chunk, ChunkData, ChunkId, ChunkSizes};
use framedb::config::Config;
use framedb::error::FrameError;
use framedb::schema::Value;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_chunk() -> ChunkData {
    let mut data = ChunkData::new(200, 4);
    data.columns.insert(
        "name".to_string(),
        vec![
            Some(Value::from("a")),
            None,
            Some(Value::from("c")),
            Some(Value::Null),
        ],
    );
    data.columns.insert(
        "age".to_string(),
        vec![Some(Value::Int(1)), None, Some(Value::Int(3)), Some(Value::Int(4))],
    );
    data
}

// =============================================================================
// Chunk Identity Tests
// =============================================================================

#[test]
fn test_chunk_file_names() {
    assert_eq!(ChunkId::row(42).file_name(), "row_chunk_00000042.chunk");
    assert_eq!(
        ChunkId::column(42, 3).file_name(),
        "row_chunk_00000042_col_0003.chunk"
    );
}

#[test]
fn test_chunk_file_name_parsing() {
    assert_eq!(
        ChunkId::parse_file_name("row_chunk_00000042.chunk"),
        Some(ChunkId::row(42))
    );
    assert_eq!(
        ChunkId::parse_file_name("row_chunk_00000007_col_0012.chunk"),
        Some(ChunkId::column(7, 12))
    );
    assert_eq!(ChunkId::parse_file_name("row_chunk_00000042.tmp"), None);
    assert_eq!(ChunkId::parse_file_name("notes.chunk"), None);
    assert_eq!(ChunkId::parse_file_name("row_chunk_x.chunk"), None);
}

// =============================================================================
// Chunk Sizing Tests
// =============================================================================

#[test]
fn test_chunk_size_tiers() {
    let small = ChunkSizes::for_cardinality(10_000);
    assert_eq!((small.rows, small.columns), (1_000, 8));

    let boundary = ChunkSizes::for_cardinality(50_000);
    assert_eq!((boundary.rows, boundary.columns), (1_000, 8));

    let medium = ChunkSizes::for_cardinality(50_001);
    assert_eq!((medium.rows, medium.columns), (2_000, 16));

    let large = ChunkSizes::for_cardinality(100_001);
    assert_eq!((large.rows, large.columns), (4_000, 32));
}

#[test]
fn test_chunk_sizes_config_override() {
    let config = Config::builder().row_chunk_size(100).build();
    let sizes = ChunkSizes::resolve(&config, 1_000_000);

    assert_eq!(sizes.rows, 100);
    assert_eq!(sizes.columns, 32);
}

#[test]
fn test_chunk_coordinates() {
    let sizes = ChunkSizes {
        rows: 100,
        columns: 3,
    };

    assert_eq!(sizes.row_chunk_of(0), 0);
    assert_eq!(sizes.row_chunk_of(99), 0);
    assert_eq!(sizes.row_chunk_of(550), 5);
    assert_eq!(sizes.chunk_start(5), 500);
    assert_eq!(sizes.column_chunks(7), 3);
    assert_eq!(sizes.column_chunks(6), 2);
}

// =============================================================================
// Codec Tests
// =============================================================================

#[test]
fn test_write_then_read_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let id = ChunkId::row(2);
    let path = temp_dir.path().join(id.file_name());
    let data = sample_chunk();

    let written = write_chunk(&path, id, &data).unwrap();
    assert_eq!(written, fs::metadata(&path).unwrap().len());

    let loaded = read_chunk(&path, id).unwrap();
    assert_eq!(loaded, data);
    assert_eq!(loaded.row_count(), 3);
}

#[test]
fn test_rewrite_replaces_chunk() {
    let temp_dir = TempDir::new().unwrap();
    let id = ChunkId::row(0);
    let path = temp_dir.path().join(id.file_name());

    write_chunk(&path, id, &sample_chunk()).unwrap();
    let smaller = ChunkData::new(0, 4);
    write_chunk(&path, id, &smaller).unwrap();

    assert_eq!(read_chunk(&path, id).unwrap(), smaller);
}

#[test]
fn test_read_missing_chunk_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let id = ChunkId::row(9);

    let err = read_chunk(&temp_dir.path().join(id.file_name()), id).unwrap_err();
    assert!(matches!(err, FrameError::ChunkIo { chunk, .. } if chunk == id));
}

#[test]
fn test_corrupt_payload_detected() {
    let temp_dir = TempDir::new().unwrap();
    let id = ChunkId::row(1);
    let path = temp_dir.path().join(id.file_name());
    write_chunk(&path, id, &sample_chunk()).unwrap();

    let mut raw = fs::read(&path).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0xFF;
    fs::write(&path, &raw).unwrap();

    let err = read_chunk(&path, id).unwrap_err();
    match err {
        FrameError::Corrupt { chunk, reason } => {
            assert_eq!(chunk, id);
            assert!(reason.contains("checksum"), "{}", reason);
        }
        other => panic!("expected Corrupt, got {:?}", other),
    }
}

#[test]
fn test_bad_magic_detected() {
    let temp_dir = TempDir::new().unwrap();
    let id = ChunkId::row(1);
    let path = temp_dir.path().join(id.file_name());
    write_chunk(&path, id, &sample_chunk()).unwrap();

    let mut raw = fs::read(&path).unwrap();
    raw[0..4].copy_from_slice(b"XXXX");
    fs::write(&path, &raw).unwrap();

    assert!(matches!(
        read_chunk(&path, id),
        Err(FrameError::Corrupt { .. })
    ));
}

#[test]
fn test_truncated_chunk_detected() {
    let temp_dir = TempDir::new().unwrap();
    let id = ChunkId::column(3, 1);
    let path = temp_dir.path().join(id.file_name());
    write_chunk(&path, id, &sample_chunk()).unwrap();

    let raw = fs::read(&path).unwrap();
    fs::write(&path, &raw[..raw.len() / 2]).unwrap();
    assert!(matches!(
        read_chunk(&path, id),
        Err(FrameError::Corrupt { .. })
    ));

    fs::write(&path, &raw[..10]).unwrap();
    assert!(matches!(
        read_chunk(&path, id),
        Err(FrameError::Corrupt { .. })
    ));
}

#[test]
fn test_project_and_absorb() {
    let data = sample_chunk();

    let names = data.project(["name"]);
    let ages = data.project(["age", "missing"]);
    assert_eq!(names.columns.len(), 1);
    assert_eq!(ages.columns.len(), 1);

    let mut combined = ChunkData::new(200, 4);
    combined.absorb(names);
    combined.absorb(ages);
    assert_eq!(combined, data);
}
