use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use signalforge_rs::Config;

#[derive(Parser, Debug)]
#[command(
    name = "signalforge",
    about = "Daily technical indicator, trade-signal, and outcome pipeline"
)]
pub struct Cli {
    /// Path to the DuckDB database file
    #[arg(long = "db", value_name = "FILE", default_value = "signalforge.duckdb")]
    pub db_path: PathBuf,

    /// Disable the log file next to the database
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,

    /// Reduce log noise
    #[arg(long = "quiet", default_value_t = false)]
    pub quiet: bool,

    /// Number of worker threads for per-symbol fan-out (omit to use all
    /// logical cores)
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Rows per insert transaction
    #[arg(long = "batch-size", default_value_t = 100)]
    pub batch_size: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database schema (idempotent)
    Init,
    /// Load daily OHLCV history for one symbol from a CSV file
    Ingest(IngestArgs),
    /// Compute technical indicators and append them
    Indicators(IndicatorArgs),
    /// Derive trade signals and upsert them
    Signals,
    /// Compute forward-looking outcome labels and append them
    Outcomes,
    /// Export a table to Parquet
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Path to the CSV file with date/open/high/low/close[/adj_close/volume]
    #[arg(long = "csv", value_name = "FILE")]
    pub csv_path: PathBuf,

    /// Ticker symbol the rows belong to
    #[arg(long)]
    pub symbol: String,

    /// Optional company name
    #[arg(long)]
    pub name: Option<String>,

    /// Optional sector label
    #[arg(long)]
    pub sector: Option<String>,
}

#[derive(Args, Debug)]
pub struct IndicatorArgs {
    /// Only recompute over the recent price window instead of full history
    #[arg(long = "update", default_value_t = false)]
    pub update: bool,

    /// Trailing window in days for --update runs
    #[arg(long = "lookback-days", default_value_t = 100)]
    pub lookback_days: u32,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Table to export (stock_prices, technical_indicators,
    /// technical_trade_signals, outcomes)
    #[arg(long)]
    pub table: String,

    /// Destination Parquet file
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}

impl Cli {
    /// Fold the global flags (plus any subcommand overrides) into a run
    /// configuration.
    pub fn to_config(&self) -> Config {
        let mut config = Config::new(self.db_path.clone());
        config.batch_size = self.batch_size;
        config.n_workers = self.workers.unwrap_or(0);
        config.quiet = self.quiet;
        if let Commands::Indicators(args) = &self.command {
            config.update_mode = args.update;
            config.lookback_days = args.lookback_days;
        }
        config
    }
}
