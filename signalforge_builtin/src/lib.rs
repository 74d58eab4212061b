//! End-to-end pipeline runners: market store -> engines -> market store.
//!
//! Each runner opens the store, pulls the price window the run needs, fans
//! the computation out across symbols, logs (but does not propagate)
//! per-symbol validation failures, and persists the surviving blocks.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{info, warn};

use engines_rs::{generate_indicators, generate_outcomes, generate_signals};
use signalforge_rs::data::{PriceBar, SymbolFailure};
use signalforge_rs::{Config, MarketStore};

/// What a pipeline run accomplished; the CLI reports this to the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSummary {
    pub rows_written: usize,
    pub symbols_ok: usize,
    pub symbols_failed: usize,
}

/// Compute and append technical indicators for the configured price window.
pub fn run_indicator_pipeline(config: &Config) -> Result<PipelineSummary> {
    let store = MarketStore::open(&config.db_path, config.batch_size)?;
    let bars = fetch_window(&store, config)?;
    if bars.is_empty() {
        warn!("no stock price data found; ingest prices first");
        return Ok(PipelineSummary::default());
    }

    let output = with_worker_pool(config.n_workers, || {
        generate_indicators(bars, &config.engine)
    })?;
    log_failures(&output.failures);

    let rows_written = store.insert_indicators(&output.blocks)?;
    let summary = PipelineSummary {
        rows_written,
        symbols_ok: output.blocks.len(),
        symbols_failed: output.failures.len(),
    };
    info!(
        rows = summary.rows_written,
        symbols = summary.symbols_ok,
        failed = summary.symbols_failed,
        "indicator run complete"
    );
    Ok(summary)
}

/// Recompute indicators in memory from the full price history and upsert
/// the derived trade signals. The in-memory indicator frame still carries
/// the raw close column the rules need; the persisted indicator table does
/// not, which is why signals are not derived from it.
pub fn run_signal_pipeline(config: &Config) -> Result<PipelineSummary> {
    let store = MarketStore::open(&config.db_path, config.batch_size)?;
    let bars = store.fetch_all_prices()?;
    if bars.is_empty() {
        warn!("no stock price data found; ingest prices first");
        return Ok(PipelineSummary::default());
    }

    let output = with_worker_pool(config.n_workers, || {
        let indicators = generate_indicators(bars, &config.engine);
        let signals = generate_signals(&indicators.blocks, &config.engine);
        (indicators.failures, signals)
    })?;
    let (failures, signals) = output;
    log_failures(&failures);

    let rows_written = store.insert_signals(&signals.blocks)?;
    let summary = PipelineSummary {
        rows_written,
        symbols_ok: signals.blocks.len(),
        symbols_failed: failures.len(),
    };
    info!(
        rows = summary.rows_written,
        symbols = summary.symbols_ok,
        failed = summary.symbols_failed,
        "signal run complete"
    );
    Ok(summary)
}

/// Compute and append forward-looking outcome labels over the full history.
pub fn run_outcome_pipeline(config: &Config) -> Result<PipelineSummary> {
    let store = MarketStore::open(&config.db_path, config.batch_size)?;
    let bars = store.fetch_all_prices()?;
    if bars.is_empty() {
        warn!("no stock price data found; ingest prices first");
        return Ok(PipelineSummary::default());
    }

    let output = with_worker_pool(config.n_workers, || {
        generate_outcomes(bars, &config.engine)
    })?;
    log_failures(&output.failures);

    let rows_written = store.insert_outcomes(&output.blocks)?;
    let summary = PipelineSummary {
        rows_written,
        symbols_ok: output.blocks.len(),
        symbols_failed: output.failures.len(),
    };
    info!(
        rows = summary.rows_written,
        symbols = summary.symbols_ok,
        failed = summary.symbols_failed,
        "outcome run complete"
    );
    Ok(summary)
}

/// Load daily OHLCV rows for one symbol from a CSV file and upsert them as
/// price bars. Expects `date, open, high, low, close` columns; `adj_close`
/// and `volume` are optional.
pub fn ingest_price_csv(
    config: &Config,
    csv_path: &Path,
    symbol: &str,
    name: Option<&str>,
    sector: Option<&str>,
) -> Result<usize> {
    let df = read_price_frame(csv_path)?;
    let dates = date_column(&df, "date")?;
    let open = float_column(&df, "open")?;
    let high = float_column(&df, "high")?;
    let low = float_column(&df, "low")?;
    let close = float_column(&df, "close")?;
    let adj_close = match df.column("adj_close") {
        Ok(_) => float_column(&df, "adj_close")?,
        Err(_) => close.clone(),
    };
    let volume = match df.column("volume") {
        Ok(_) => float_column(&df, "volume")?,
        Err(_) => vec![0.0; close.len()],
    };

    let store = MarketStore::open(&config.db_path, config.batch_size)?;
    let symbol_id = store.insert_symbol(symbol, name, sector)?;

    let bars: Vec<PriceBar> = (0..dates.len())
        .map(|i| PriceBar {
            symbol_id,
            symbol: symbol.to_string(),
            date: dates[i],
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            adj_close: adj_close[i],
            volume: volume[i] as i64,
        })
        .collect();
    store.insert_price_bars(&bars)?;
    info!(symbol, rows = bars.len(), csv = %csv_path.display(), "ingested price history");
    Ok(bars.len())
}

fn fetch_window(store: &MarketStore, config: &Config) -> Result<Vec<PriceBar>> {
    if config.update_mode {
        store.fetch_recent_prices(config.lookback_days)
    } else {
        store.fetch_all_prices()
    }
}

/// Run `f` on a dedicated rayon pool when a worker count was requested;
/// otherwise use the global pool.
fn with_worker_pool<T: Send>(n_workers: usize, f: impl FnOnce() -> T + Send) -> Result<T> {
    if n_workers == 0 {
        return Ok(f());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .build()
        .context("Failed to build worker pool")?;
    Ok(pool.install(f))
}

fn log_failures(failures: &[SymbolFailure]) {
    for failure in failures {
        warn!(
            symbol = %failure.symbol,
            symbol_id = failure.symbol_id,
            error = %failure.error,
            "skipping symbol after validation failure"
        );
    }
}

fn read_price_frame(path: &Path) -> Result<DataFrame> {
    let lazy = LazyCsvReader::new(path)
        .has_header(true)
        .with_try_parse_dates(true)
        .with_ignore_errors(true)
        .finish()
        .with_context(|| format!("Failed to initialize CSV reader for {}", path.display()))?;
    lazy.collect()
        .with_context(|| format!("Failed to collect CSV data from {}", path.display()))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .with_context(|| format!("Missing column '{name}'"))?;
    let values = match series.dtype() {
        DataType::Float64 => series
            .f64()
            .context("Failed to interpret as f64")?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect(),
        DataType::Float32 => series
            .f32()
            .context("Failed to interpret as f32")?
            .into_iter()
            .map(|v| v.map(f64::from).unwrap_or(f64::NAN))
            .collect(),
        DataType::Int64 => series
            .i64()
            .context("Failed to interpret as i64")?
            .into_iter()
            .map(|v| v.map(|x| x as f64).unwrap_or(f64::NAN))
            .collect(),
        DataType::Int32 => series
            .i32()
            .context("Failed to interpret as i32")?
            .into_iter()
            .map(|v| v.map(f64::from).unwrap_or(f64::NAN))
            .collect(),
        other => anyhow::bail!("Column '{name}' has unsupported dtype {other:?}"),
    };
    Ok(values)
}

fn date_column(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
    let series = df
        .column(name)
        .with_context(|| format!("Missing column '{name}'"))?;
    match series.dtype() {
        DataType::Date => {
            let ca = series.date().context("Failed to interpret as date")?;
            ca.as_date_iter()
                .enumerate()
                .map(|(i, opt)| opt.with_context(|| format!("Null date at row {i}")))
                .collect()
        }
        DataType::String => {
            let ca = series.str().context("Failed to interpret as string")?;
            ca.into_iter()
                .enumerate()
                .map(|(i, opt)| {
                    let raw = opt.with_context(|| format!("Null date at row {i}"))?;
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .with_context(|| format!("Unable to parse date '{raw}'"))
                })
                .collect()
        }
        other => anyhow::bail!("Column '{name}' has unsupported dtype {other:?} for dates"),
    }
}
