//! refsel driver
//!
//! Reads a street column from a CSV file, selects reference entities and
//! appends them to a durable store.
//!
//! Usage:
//!   cargo run --features cli --bin refsel -- \
//!     --input customers.csv \
//!     --column customer_street \
//!     --config refsel.yaml \
//!     --data-dir ./refs
//!
//!   # Print the selection without persisting it
//!   cargo run --features cli --bin refsel -- --input customers.csv --dry-run

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use refsel::storage::persistent::{open_store, PersistentConfig};
use refsel::storage::{CsvStreetSource, ReferenceStore, StreetSource, DEFAULT_STREET_COLUMN};
use refsel::{ReferenceEntity, ReferenceSelectionEngine, RefselResult, SelectionConfig};

/// Select canonical reference streets from noisy address records
#[derive(Parser, Debug)]
#[command(name = "refsel", version)]
#[command(about = "Select canonical reference streets from noisy address records")]
struct Args {
    /// Headered CSV file holding the raw streets
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Column carrying the street text
    #[arg(long, short = 'c', default_value = DEFAULT_STREET_COLUMN)]
    column: String,

    /// YAML selection config; defaults apply when omitted
    #[arg(long, env = "REFSEL_CONFIG")]
    config: Option<PathBuf>,

    /// Reference store directory
    #[arg(long, short = 'd', env = "REFSEL_DATA_DIR", default_value = "./refs")]
    data_dir: PathBuf,

    /// Skip fsync after each batch
    #[arg(long)]
    no_sync: bool,

    /// Select and print, do not persist
    #[arg(long)]
    dry_run: bool,
}

fn print_entities(entities: &[ReferenceEntity]) {
    println!("id\tentity_value");
    for e in entities {
        println!("{}\t{}", e.id, e.entity_value);
    }
}

fn run(args: &Args) -> RefselResult<()> {
    let config = match &args.config {
        Some(path) => SelectionConfig::from_yaml_file(path)?,
        None => SelectionConfig::default(),
    };
    let engine = ReferenceSelectionEngine::new(config)?;
    let source = CsvStreetSource::with_column(&args.input, &args.column);

    if args.dry_run {
        let set = engine.select(&source.read_records()?)?;
        print_entities(&set.entities);
        return Ok(());
    }

    let store = open_store(
        &args.data_dir,
        Some(PersistentConfig {
            sync_on_write: !args.no_sync,
        }),
    )?;
    let report = engine.run(&source, &store)?;
    let entities = store.read_run(report.run_id)?.unwrap_or_default();
    print_entities(&entities);
    tracing::info!(
        run_id = %report.run_id,
        fingerprint = %report.fingerprint,
        persisted = report.persisted,
        total = store.count()?,
        "run complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
