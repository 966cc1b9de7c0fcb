//! Bulk-load benchmark for the usage ledger.
//!
//! Generates fake files, writes them in batches and optionally collects
//! everything older than one second.

use chrono::Utc;
use clap::{ArgAction, Parser};
use log::info;
use std::time::Instant;

use hath_cache::file::{File, FileGenerator};
use hath_cache::store::{sqlite_store::SqliteStore, Store};

#[derive(Parser, Debug)]
#[command(name = "hath-bench-db", version, about = "Usage ledger load benchmark")]
struct Cli {
    /// Files to generate
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Bulk size
    #[arg(long, default_value_t = 10_000)]
    bulk: usize,

    /// Maximum file size in bytes
    #[arg(long = "size-max", default_value_t = 1024 * 100)]
    size_max: u64,

    /// Minimum file size in bytes
    #[arg(long = "size-min", default_value_t = 1024 * 5)]
    size_min: u64,

    /// Maximum ephemeral resolution
    #[arg(long = "res-max", default_value_t = 1980)]
    res_max: u32,

    /// Minimum ephemeral resolution
    #[arg(long = "res-min", default_value_t = 500)]
    res_min: u32,

    /// Generate data
    #[arg(long)]
    generate: bool,

    /// Collect old files
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    collect: bool,

    /// Database file
    #[arg(long, default_value = "db.sqlite")]
    dbfile: String,
}

fn generate(store: &SqliteStore, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let generator = FileGenerator {
        size_min: cli.size_min,
        size_max: cli.size_max,
        resolution_min: cli.res_min,
        resolution_max: cli.res_max,
    };
    info!("generating {} files", cli.count);
    println!("{:?}", generator);

    let files: Vec<File> = (0..cli.count).map(|_| generator.new_fake()).collect();
    let bulk = cli.bulk.max(1);

    let start = Instant::now();
    if files.len() < bulk {
        info!("writing");
        store.add_batch(&files)?;
    } else {
        info!("writing in bulks");
        for (n, chunk) in files.chunks(bulk).enumerate() {
            let bulk_start = Instant::now();
            store.add_batch(chunk)?;
            let from = n * bulk;
            info!("from {} to {} {:?}", from, from + chunk.len(), bulk_start.elapsed());
        }
    }
    let duration = start.elapsed();
    let rate = files.len() as f64 / duration.as_secs_f64();
    println!("OK for {:?} at rate {:.3} per second", duration, rate);
    Ok(())
}

fn collect(store: &SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
    info!("collecting");
    let start = Instant::now();
    let removed = store.collect(Utc::now() - chrono::Duration::seconds(1))?;
    let duration = start.elapsed();
    let rate = removed as f64 / duration.as_secs_f64();
    println!("Removed {} for {:?} at rate {:.3} per second", removed, duration, rate);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let store = SqliteStore::open(&cli.dbfile, true)?;
    let result = (|| {
        if cli.generate {
            generate(&store, &cli)?;
        }
        if cli.collect {
            collect(&store)?;
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })();
    store.close()?;
    result?;

    info!("OK");
    Ok(())
}
