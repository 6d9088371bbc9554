//! FrameDB Perf Binary
//!
//! Bulk loads synthetic rows, then times parallel inserts and random reads.

use std::time::Instant;

use clap::Parser;
use framedb::{Config, Engine, Field, Record, StorageMode, Tabular, ValueType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{fmt, EnvFilter};

/// FrameDB load and access timing
#[derive(Parser, Debug)]
#[command(name = "framedb-perf")]
#[command(about = "Time bulk load, parallel inserts, and random reads")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./framedb_data")]
    data_dir: String,

    /// Rows to bulk load
    #[arg(short, long, default_value = "100000")]
    rows: usize,

    /// Bulk load worker threads
    #[arg(short, long, default_value = "32")]
    workers: usize,

    /// Cache size limit in MB before flush
    #[arg(short, long, default_value = "1024")]
    cache_mb: usize,

    /// Rows inserted in parallel after the load
    #[arg(long, default_value = "100")]
    inserts: usize,

    /// Random point reads after the load
    #[arg(long, default_value = "100")]
    reads: usize,

    /// Seed for the read sampler
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Keep chunks in memory only
    #[arg(long)]
    memory: bool,
}

struct Person {
    name: String,
    age: i64,
    city: &'static str,
}

const CITIES: [&str; 4] = ["New York", "San Francisco", "Los Angeles", "Chicago"];

impl Person {
    fn synthetic(i: usize) -> Self {
        Self {
            name: format!("person-{}", i),
            age: 18 + (i % 60) as i64,
            city: CITIES[i % CITIES.len()],
        }
    }
}

impl Tabular for Person {
    fn fields() -> Vec<Field> {
        vec![
            Field::new("Name", ValueType::Text),
            Field::new("Age", ValueType::Int),
            Field::new("City", ValueType::Text),
        ]
    }

    fn into_record(self) -> Record {
        Record::new()
            .with("Name", self.name)
            .with("Age", self.age)
            .with("City", self.city)
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,framedb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("FrameDB perf v{}", framedb::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    if let Err(e) = run(&args) {
        tracing::error!("Perf run failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> framedb::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .storage_mode(if args.memory {
            StorageMode::Memory
        } else {
            StorageMode::Disk
        })
        .cache_size_limit(args.cache_mb * 1024 * 1024)
        .worker_count(args.workers)
        .build();

    // Phase 1: bulk load
    let people: Vec<Person> = (0..args.rows).map(Person::synthetic).collect();
    let started = Instant::now();
    let engine = Engine::from_tabular(config, people)?;
    println!(
        "Bulk load: {} rows in {:.2?} (index height {})",
        engine.len()?,
        started.elapsed(),
        engine.index().height()
    );

    // Phase 2: parallel inserts on fresh ids
    let base = args.rows as u64;
    let started = Instant::now();
    let failures = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = (0..args.inserts as u64)
            .map(|i| {
                let engine = &engine;
                s.spawn(move |_| {
                    let id = base + i;
                    engine.insert_row(id, Person::synthetic(id as usize).into_record())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| !matches!(r, Ok(Ok(()))))
            .count()
    })
    .map_err(|_| framedb::FrameError::Worker("insert scope panicked".to_string()))?;
    println!(
        "Parallel inserts: {} rows in {:.2?} ({} failed)",
        args.inserts,
        started.elapsed(),
        failures
    );

    // Phase 3: random point reads
    let total = engine.len()? as u64;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let started = Instant::now();
    for _ in 0..args.reads {
        let id = rng.gen_range(0..total);
        let row = engine.read_row(id)?;
        tracing::debug!(id, ?row, "Read row");
    }
    println!("Random reads: {} rows in {:.2?}", args.reads, started.elapsed());

    println!("{}", engine.info()?);

    engine.close()
}
