mod cli;

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_appender::non_blocking;
use tracing_subscriber::{prelude::*, EnvFilter};

use cli::{Cli, Commands};
use signalforge_builtin::{
    ingest_price_csv, run_indicator_pipeline, run_outcome_pipeline, run_signal_pipeline,
};
use signalforge_rs::MarketStore;

fn init_tracing(log_file: Option<PathBuf>, quiet: bool) -> Result<()> {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // Leak the guard so the non-blocking writer stays alive for the
        // duration of the process without additional plumbing.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = if cli.no_file_log {
        None
    } else {
        Some(cli.db_path.with_extension("log"))
    };
    init_tracing(log_file, cli.quiet)?;

    let config = cli.to_config();
    match &cli.command {
        Commands::Init => {
            let store = MarketStore::open(&config.db_path, config.batch_size)?;
            store.init_schema()?;
            println!("Schema ready at {}", config.db_path.display());
        }
        Commands::Ingest(args) => {
            let rows = ingest_price_csv(
                &config,
                &args.csv_path,
                &args.symbol,
                args.name.as_deref(),
                args.sector.as_deref(),
            )?;
            println!("Ingested {rows} price rows for {}", args.symbol);
        }
        Commands::Indicators(_) => {
            let summary = run_indicator_pipeline(&config)?;
            println!(
                "Appended {} indicator rows ({} symbols, {} failed)",
                summary.rows_written, summary.symbols_ok, summary.symbols_failed
            );
        }
        Commands::Signals => {
            let summary = run_signal_pipeline(&config)?;
            println!(
                "Upserted {} signal rows ({} symbols, {} failed)",
                summary.rows_written, summary.symbols_ok, summary.symbols_failed
            );
        }
        Commands::Outcomes => {
            let summary = run_outcome_pipeline(&config)?;
            println!(
                "Appended {} outcome rows ({} symbols, {} failed)",
                summary.rows_written, summary.symbols_ok, summary.symbols_failed
            );
        }
        Commands::Export(args) => {
            let store = MarketStore::open(&config.db_path, config.batch_size)?;
            store.export_parquet(&args.table, &args.out)?;
            println!("Exported {} to {}", args.table, args.out.display());
        }
    }
    Ok(())
}
