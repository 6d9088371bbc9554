//! Tests for Engine
//!
//! These tests verify:
//! - Bulk load from records and from `Tabular` types
//! - Row-level insert/read/update/delete
//! - Multi-row reads (loc, head, tail) and info
//! - Concurrent access patterns
//! - Engine lifecycle (close, Closed errors)
//! - Row and bulk-load behavior when chunk writes fail

use std::fs;
#[cfg(target_os = "linux")]
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use framedb::config::{Config, StorageMode};
use framedb::engine::{Engine, EngineState};
use framedb::error::FrameError;
use framedb::schema::{Field, Record, Schema, Tabular, Value, ValueType};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn person(id: u64) -> Record {
    Record::new()
        .with("Name", format!("person-{}", id))
        .with("Age", 20 + (id % 50) as i64)
        .with("City", if id % 2 == 0 { "Chicago" } else { "Seattle" })
}

fn people(count: u64) -> Vec<Record> {
    (0..count).map(person).collect()
}

fn config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .worker_count(4)
        .build()
}

fn setup_temp_engine(rows: u64) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::from_records(config(&temp_dir), people(rows)).unwrap();
    (temp_dir, engine)
}

struct Person {
    name: &'static str,
    age: i64,
}

impl Tabular for Person {
    fn fields() -> Vec<Field> {
        vec![
            Field::new("name", ValueType::Text),
            Field::new("age", ValueType::Int),
        ]
    }

    fn into_record(self) -> Record {
        Record::new().with("name", self.name).with("age", self.age)
    }
}

// =============================================================================
// Bulk Load Tests
// =============================================================================

#[test]
fn test_from_records_assigns_sequential_ids() {
    let (_temp_dir, engine) = setup_temp_engine(1_000);

    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.len().unwrap(), 1_000);
    assert_eq!(engine.row_ids().unwrap(), (0..1_000).collect::<Vec<_>>());
    for id in [0, 1, 499, 999] {
        assert_eq!(engine.read_row(id).unwrap(), person(id));
    }
    engine.index().check_invariants().unwrap();
}

#[test]
fn test_from_records_sizing_follows_cardinality() {
    let (_temp_dir, engine) = setup_temp_engine(5_000);

    assert_eq!(engine.index().order(), 128);
    assert_eq!(engine.store().sizes().rows, 1_000);
}

#[test]
fn test_from_records_expected_rows_override() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .expected_rows(200_000)
        .build();
    let engine = Engine::from_records(config, people(100)).unwrap();

    assert_eq!(engine.index().order(), 256);
    assert_eq!(engine.store().sizes().rows, 4_000);
}

#[test]
fn test_from_tabular() {
    let temp_dir = TempDir::new().unwrap();
    let rows = vec![
        Person { name: "Alice", age: 30 },
        Person { name: "Bob", age: 25 },
        Person { name: "Charlie", age: 35 },
    ];

    let engine = Engine::from_tabular(config(&temp_dir), rows).unwrap();

    assert_eq!(engine.schema().names().collect::<Vec<_>>(), vec!["name", "age"]);
    assert_eq!(
        engine.read_row(1).unwrap().get("name"),
        Some(&Value::from("Bob"))
    );
}

#[test]
fn test_from_tabular_empty_input() {
    let temp_dir = TempDir::new().unwrap();
    let result = Engine::from_tabular::<Person>(config(&temp_dir), vec![]);

    assert!(matches!(result, Err(FrameError::EmptyInput)));
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let bad = Config::builder()
        .data_dir(temp_dir.path())
        .index_order(7)
        .build();

    assert!(matches!(
        Engine::from_records(bad, people(10)),
        Err(FrameError::InvalidConfiguration(_))
    ));

    let no_workers = Config::builder()
        .data_dir(temp_dir.path())
        .worker_count(0)
        .build();
    assert!(matches!(
        Engine::from_records(no_workers, people(10)),
        Err(FrameError::InvalidConfiguration(_))
    ));
}

// =============================================================================
// Row Operations Tests
// =============================================================================

#[test]
fn test_insert_and_read_row() {
    let (_temp_dir, engine) = setup_temp_engine(10);

    engine.insert_row(10, person(10)).unwrap();
    engine.insert_row(5_000, person(5_000)).unwrap();

    assert_eq!(engine.read_row(10).unwrap(), person(10));
    assert_eq!(engine.read_row(5_000).unwrap(), person(5_000));
    assert_eq!(engine.len().unwrap(), 12);
}

#[test]
fn test_insert_duplicate_rejected() {
    let (_temp_dir, engine) = setup_temp_engine(10);

    let result = engine.insert_row(3, person(99));

    assert!(matches!(result, Err(FrameError::DuplicateKey { id: 3 })));
    assert_eq!(engine.read_row(3).unwrap(), person(3));
}

#[test]
fn test_insert_wrong_shape_rejected() {
    let (_temp_dir, engine) = setup_temp_engine(10);

    let missing = Record::new().with("Name", "x").with("Age", 1i64);
    let wrong_type = person(11).with("Age", "eleven");

    assert!(matches!(
        engine.insert_row(11, missing),
        Err(FrameError::SchemaMismatch(_))
    ));
    assert!(matches!(
        engine.insert_row(11, wrong_type),
        Err(FrameError::SchemaMismatch(_))
    ));
    assert!(!engine.search(11).unwrap());
}

#[test]
fn test_read_missing_row() {
    let (_temp_dir, engine) = setup_temp_engine(10);

    assert!(matches!(
        engine.read_row(10),
        Err(FrameError::NotFound { id: 10 })
    ));
}

#[test]
fn test_update_row() {
    let (_temp_dir, engine) = setup_temp_engine(10);

    let update = Record::new().with("Age", 26i64).with("City", "Seattle");
    engine.update_row(1, update).unwrap();

    let row = engine.read_row(1).unwrap();
    assert_eq!(row.get("Name"), Some(&Value::from("person-1")));
    assert_eq!(row.get("Age"), Some(&Value::Int(26)));
    assert_eq!(row.get("City"), Some(&Value::from("Seattle")));
}

#[test]
fn test_update_row_errors() {
    let (_temp_dir, engine) = setup_temp_engine(10);

    assert!(matches!(
        engine.update_row(42, Record::new().with("Age", 1i64)),
        Err(FrameError::NotFound { id: 42 })
    ));
    assert!(matches!(
        engine.update_row(1, Record::new().with("Zip", "60601")),
        Err(FrameError::SchemaMismatch(_))
    ));
    assert!(matches!(
        engine.update_row(1, Record::new().with("Age", "old")),
        Err(FrameError::SchemaMismatch(_))
    ));
    assert_eq!(engine.read_row(1).unwrap(), person(1));
}

#[test]
fn test_delete_row() {
    let (_temp_dir, engine) = setup_temp_engine(100);

    engine.delete_row(42).unwrap();

    assert!(matches!(
        engine.read_row(42),
        Err(FrameError::NotFound { id: 42 })
    ));
    assert!(!engine.search(42).unwrap());
    assert!(matches!(
        engine.delete_row(42),
        Err(FrameError::NotFound { id: 42 })
    ));
    assert_eq!(engine.len().unwrap(), 99);
}

#[test]
fn test_delete_then_reinsert() {
    let (_temp_dir, engine) = setup_temp_engine(100);

    engine.delete_row(7).unwrap();
    engine.flush().unwrap();
    engine.insert_row(7, person(700)).unwrap();
    engine.evict_cache().unwrap();

    assert_eq!(engine.read_row(7).unwrap(), person(700));
}

#[test]
fn test_operations_survive_eviction() {
    let (_temp_dir, engine) = setup_temp_engine(3_000);

    engine.evict_cache().unwrap();
    engine.update_row(1_500, Record::new().with("Age", 99i64)).unwrap();
    engine.delete_row(2_999).unwrap();
    engine.evict_cache().unwrap();

    assert_eq!(
        engine.read_row(1_500).unwrap().get("Age"),
        Some(&Value::Int(99))
    );
    assert!(matches!(engine.read_row(2_999), Err(FrameError::NotFound { .. })));
    assert_eq!(engine.read_row(2_998).unwrap(), person(2_998));
}

// =============================================================================
// Multi-Row Read Tests
// =============================================================================

#[test]
fn test_loc() {
    let (_temp_dir, engine) = setup_temp_engine(100);

    let rows = engine.loc(&[5, 1, 99]).unwrap();
    assert_eq!(rows, vec![person(5), person(1), person(99)]);

    assert!(matches!(
        engine.loc(&[1, 100, 2]),
        Err(FrameError::NotFound { id: 100 })
    ));
}

#[test]
fn test_head_and_tail() {
    let (_temp_dir, engine) = setup_temp_engine(100);
    engine.delete_row(1).unwrap();

    let head = engine.head(3).unwrap();
    assert_eq!(
        head.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![0, 2, 3]
    );
    assert_eq!(head[1].1, person(2));

    let tail = engine.tail(2).unwrap();
    assert_eq!(tail, vec![(98, person(98)), (99, person(99))]);

    assert_eq!(engine.head(1_000).unwrap().len(), 99);
}

#[test]
fn test_info() {
    let (_temp_dir, engine) = setup_temp_engine(2_500);
    engine.flush().unwrap();

    let info = engine.info().unwrap();

    assert_eq!(info.rows, 2_500);
    assert_eq!(info.fields.len(), 3);
    assert_eq!(info.storage_mode, StorageMode::Disk);
    assert_eq!(info.row_chunk_size, 1_000);
    assert_eq!(info.index_order, 128);
    assert_eq!(info.persisted_chunks, 3);
    assert_eq!(info.cached_chunks, 0);
    assert_eq!(info.stats.flushes, 1);

    let text = info.to_string();
    assert!(text.contains("2500 rows x 3 columns"), "{}", text);
    assert!(text.contains("INTEGER"), "{}", text);
}

// =============================================================================
// Empty Engine Tests
// =============================================================================

#[test]
fn test_open_empty_engine() {
    let temp_dir = TempDir::new().unwrap();
    let schema = Schema::new(vec![
        Field::new("key", ValueType::Int),
        Field::new("at", ValueType::Timestamp),
    ])
    .unwrap();

    let engine = Engine::open(config(&temp_dir), schema).unwrap();
    assert!(engine.is_empty().unwrap());

    let record = Record::new()
        .with("key", 1i64)
        .with("at", Value::Timestamp(1_700_000_000_000));
    engine.insert_row(0, record.clone()).unwrap();

    assert_eq!(engine.read_row(0).unwrap(), record);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_disjoint_inserts() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .row_chunk_size(50)
        .cache_size_limit(16 * 1024)
        .build();
    let engine = Arc::new(Engine::from_records(config, people(10)).unwrap());
    let mut handles = vec![];

    for t in 0..8u64 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..200u64 {
                // Interleave ids so threads share row chunks
                let id = 10 + i * 8 + t;
                engine.insert_row(id, person(id)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len().unwrap(), 10 + 8 * 200);
    engine.index().check_invariants().unwrap();
    for id in 0..(10 + 8 * 200) {
        assert_eq!(engine.read_row(id).unwrap(), person(id));
    }
}

#[test]
fn test_concurrent_readers_and_writers() {
    let (_temp_dir, engine) = setup_temp_engine(2_000);
    let engine = Arc::new(engine);

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..100u64 {
                    let id = t * 500 + i;
                    engine
                        .update_row(id, Record::new().with("City", "Denver"))
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4u64)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let id = (t * 500 + i * 7) % 2_000;
                    let row = engine.read_row(id).unwrap();
                    assert_eq!(row.get("Name"), person(id).get("Name"));
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(
        engine.read_row(1_099).unwrap().get("City"),
        Some(&Value::from("Denver"))
    );
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let (temp_dir, engine) = setup_temp_engine(500);

    engine.close().unwrap();
    engine.close().unwrap();

    assert_eq!(engine.state(), EngineState::Closed);
    let chunks_dir = temp_dir.path().join("chunks");
    assert!(chunks_dir.is_dir());
    assert_eq!(std::fs::read_dir(&chunks_dir).unwrap().count(), 0);
}

#[test]
fn test_operations_after_close_fail() {
    let (_temp_dir, engine) = setup_temp_engine(10);
    engine.close().unwrap();

    assert!(matches!(engine.read_row(0), Err(FrameError::Closed)));
    assert!(matches!(engine.insert_row(10, person(10)), Err(FrameError::Closed)));
    assert!(matches!(
        engine.update_row(0, Record::new().with("Age", 1i64)),
        Err(FrameError::Closed)
    ));
    assert!(matches!(engine.delete_row(0), Err(FrameError::Closed)));
    assert!(matches!(engine.head(1), Err(FrameError::Closed)));
    assert!(matches!(engine.flush(), Err(FrameError::Closed)));
    assert!(matches!(engine.info(), Err(FrameError::Closed)));
    assert!(matches!(engine.len(), Err(FrameError::Closed)));
    assert!(matches!(engine.is_empty(), Err(FrameError::Closed)));
}

#[test]
fn test_memory_mode_engine() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .storage_mode(StorageMode::Memory)
        .cache_size_limit(1_024)
        .build();
    let engine = Engine::from_records(config, people(3_000)).unwrap();

    assert_eq!(engine.flush().unwrap(), 0);
    engine.evict_cache().unwrap();
    assert_eq!(engine.read_row(2_500).unwrap(), person(2_500));

    let info = engine.info().unwrap();
    assert_eq!(info.persisted_chunks, 0);
    assert_eq!(info.cached_chunks, 3);

    engine.close().unwrap();
    assert!(!temp_dir.path().join("chunks").exists());
}

#[test]
fn test_column_chunking_engine() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .row_chunk_size(100)
        .column_chunk_size(2)
        .column_chunking(true)
        .build();
    let engine = Engine::from_records(config, people(300)).unwrap();

    assert_eq!(engine.flush().unwrap(), 6);
    assert_eq!(engine.read_row(250).unwrap(), person(250));
    assert_eq!(engine.info().unwrap().persisted_chunks, 6);
}

// =============================================================================
// Write Failure Tests
// =============================================================================

/// A data directory whose `chunks` subdirectory fits in PATH_MAX while the
/// chunk file paths inside it do not
#[cfg(target_os = "linux")]
fn overlong_data_dir(root: &Path) -> PathBuf {
    let suffix = "/chunks".len();
    let mut dir = root.to_path_buf();
    while dir.as_os_str().len() + suffix + 1 < 4_080 {
        let room = 4_080 - dir.as_os_str().len() - suffix - 1;
        dir.push("d".repeat(room.min(200)));
    }
    dir
}

#[test]
fn test_failed_auto_flush_keeps_rows_consistent() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .row_chunk_size(100)
        .cache_size_limit(64)
        .build();
    let engine = Engine::from_records(config, people(10)).unwrap();
    engine.flush().unwrap();

    // The update loads chunk 0 back and leaves the cache over its limit
    engine
        .update_row(6, Record::new().with("Age", 99i64))
        .unwrap();

    let chunks_dir = temp_dir.path().join("chunks");
    fs::remove_dir_all(&chunks_dir).unwrap();
    fs::write(&chunks_dir, b"not a directory").unwrap();

    assert!(matches!(
        engine.delete_row(5),
        Err(FrameError::ChunkIo { .. })
    ));
    assert!(matches!(
        engine.update_row(6, Record::new().with("Age", 1i64)),
        Err(FrameError::ChunkIo { .. })
    ));
    assert!(matches!(
        engine.insert_row(10, person(10)),
        Err(FrameError::ChunkIo { .. })
    ));

    fs::remove_file(&chunks_dir).unwrap();
    fs::create_dir(&chunks_dir).unwrap();

    assert!(engine.search(5).unwrap());
    assert_eq!(engine.read_row(5).unwrap(), person(5));
    assert_eq!(engine.read_row(6).unwrap().get("Age"), Some(&Value::Int(99)));
    assert!(!engine.search(10).unwrap());
    assert_eq!(engine.len().unwrap(), 10);

    engine.delete_row(5).unwrap();
    engine.insert_row(10, person(10)).unwrap();
    engine.evict_cache().unwrap();
    assert_eq!(engine.row_ids().unwrap(), vec![0, 1, 2, 3, 4, 6, 7, 8, 9, 10]);
    assert_eq!(engine.read_row(10).unwrap(), person(10));
}

#[cfg(target_os = "linux")]
#[test]
fn test_bulk_load_write_failure_leaves_no_engine_or_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = overlong_data_dir(temp_dir.path());
    let config = Config::builder()
        .data_dir(data_dir.clone())
        .row_chunk_size(100)
        .cache_size_limit(1)
        .worker_count(4)
        .build();

    let result = Engine::from_records(config, people(1_000));

    assert!(matches!(result, Err(FrameError::ChunkIo { .. })));
    let chunks_dir = data_dir.join("chunks");
    assert!(chunks_dir.is_dir());
    assert_eq!(fs::read_dir(&chunks_dir).unwrap().count(), 0);
}
