use std::fmt::Write as _;

use tempfile::tempdir;

use signalforge_builtin::{
    ingest_price_csv, run_indicator_pipeline, run_outcome_pipeline, run_signal_pipeline,
};
use signalforge_rs::{Config, MarketStore};

const DAYS: usize = 130;

fn write_price_csv(path: &std::path::Path) {
    // ~6 months of weekday-agnostic daily bars rising 0.5% per day.
    let mut csv = String::from("date,open,high,low,close,adj_close,volume\n");
    let mut close = 100.0_f64;
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for i in 0..DAYS {
        let date = start + chrono::Days::new(i as u64);
        close *= 1.005;
        writeln!(
            csv,
            "{date},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
            close * 0.996,
            close * 1.004,
            close * 0.992,
            close,
            close,
            10_000 + i
        )
        .unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn prepared_config(dir: &std::path::Path) -> Config {
    let config = Config::new(dir.join("market.duckdb"));
    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    store.init_schema().unwrap();
    drop(store);

    let csv_path = dir.join("prices.csv");
    write_price_csv(&csv_path);
    let rows = ingest_price_csv(&config, &csv_path, "TEST", Some("Test Corp"), None).unwrap();
    assert_eq!(rows, DAYS);
    config
}

#[test]
fn ingest_is_a_keyed_overwrite() {
    let dir = tempdir().unwrap();
    let config = prepared_config(dir.path());

    // Re-ingesting the same file must not grow the price table.
    let csv_path = dir.path().join("prices.csv");
    ingest_price_csv(&config, &csv_path, "TEST", None, None).unwrap();

    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    assert_eq!(store.count_rows("stock_prices").unwrap(), DAYS);
    let bars = store.fetch_all_prices().unwrap();
    assert_eq!(bars.len(), DAYS);
    assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
}

#[test]
fn indicator_runs_append_while_signal_runs_upsert() {
    let dir = tempdir().unwrap();
    let config = prepared_config(dir.path());

    let first = run_indicator_pipeline(&config).unwrap();
    assert_eq!(first.rows_written, DAYS);
    assert_eq!(first.symbols_failed, 0);

    // Indicators are append-only: a second run duplicates rows.
    run_indicator_pipeline(&config).unwrap();
    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    assert_eq!(store.count_rows("technical_indicators").unwrap(), 2 * DAYS);
    drop(store);

    // Signals are keyed: a second run leaves one row per (symbol, date).
    run_signal_pipeline(&config).unwrap();
    run_signal_pipeline(&config).unwrap();
    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    assert_eq!(
        store.count_rows("technical_trade_signals").unwrap(),
        DAYS
    );
}

#[test]
fn outcome_run_covers_every_price_row() {
    let dir = tempdir().unwrap();
    let config = prepared_config(dir.path());

    let summary = run_outcome_pipeline(&config).unwrap();
    assert_eq!(summary.rows_written, DAYS);
    assert_eq!(summary.symbols_ok, 1);

    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    assert_eq!(store.count_rows("outcomes").unwrap(), DAYS);
}

#[test]
fn export_writes_a_parquet_file() {
    let dir = tempdir().unwrap();
    let config = prepared_config(dir.path());
    run_indicator_pipeline(&config).unwrap();

    let out = dir.path().join("indicators.parquet");
    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    store.export_parquet("technical_indicators", &out).unwrap();
    assert!(out.exists());
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
}

#[test]
fn empty_database_yields_an_empty_summary_not_an_error() {
    let dir = tempdir().unwrap();
    let config = Config::new(dir.path().join("empty.duckdb"));
    let store = MarketStore::open(&config.db_path, config.batch_size).unwrap();
    store.init_schema().unwrap();
    drop(store);

    let summary = run_indicator_pipeline(&config).unwrap();
    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.symbols_ok, 0);
}
