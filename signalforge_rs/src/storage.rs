use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection};
use tracing::{info, warn};

use crate::data::{FeatureBlock, PriceBar, SignalBlock};
use crate::schema::{OUTCOME_COLUMNS, TECHNICAL_INDICATOR_COLUMNS, TRADE_SIGNAL_COLUMNS};

/// Tables that can be exported to Parquet.
const EXPORTABLE_TABLES: &[&str] = &[
    "stock_prices",
    "technical_indicators",
    "technical_trade_signals",
    "outcomes",
];

/// DuckDB-backed store for price history and the derived tables.
///
/// Write semantics per table:
/// - `stock_prices`: keyed overwrite (`INSERT OR REPLACE`).
/// - `technical_indicators`: append only. Re-running over an overlapping
///   date range duplicates rows; deduplication is the caller's concern.
/// - `technical_trade_signals`: delete-then-insert per (symbol_id, date),
///   so a re-run leaves exactly one row per key.
/// - `outcomes`: append only.
pub struct MarketStore {
    conn: Connection,
    batch_size: usize,
}

impl MarketStore {
    pub fn open(db_path: &Path, batch_size: usize) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Unable to open {}", db_path.display()))?;
        info!(db_path = %db_path.display(), "opened market store");
        Ok(Self { conn, batch_size })
    }

    pub fn open_in_memory(batch_size: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Unable to open in-memory store")?;
        Ok(Self { conn, batch_size })
    }

    /// Create every table the pipeline reads or writes. Idempotent.
    pub fn init_schema(&self) -> Result<()> {
        let indicator_cols = ddl_columns(TECHNICAL_INDICATOR_COLUMNS, "DOUBLE");
        let signal_cols = ddl_columns(TRADE_SIGNAL_COLUMNS, "INTEGER");
        let outcome_cols = ddl_columns(OUTCOME_COLUMNS, "DOUBLE");

        let ddl = format!(
            "CREATE SEQUENCE IF NOT EXISTS symbols_seq;
             CREATE TABLE IF NOT EXISTS symbols (
                 symbol_id BIGINT PRIMARY KEY DEFAULT nextval('symbols_seq'),
                 symbol TEXT NOT NULL UNIQUE,
                 name TEXT,
                 sector TEXT,
                 is_active BOOLEAN NOT NULL DEFAULT TRUE,
                 updated_at TIMESTAMP NOT NULL DEFAULT current_timestamp
             );
             CREATE TABLE IF NOT EXISTS stock_prices (
                 symbol_id BIGINT NOT NULL,
                 date DATE NOT NULL,
                 open_price DOUBLE NOT NULL,
                 high_price DOUBLE NOT NULL,
                 low_price DOUBLE NOT NULL,
                 close_price DOUBLE NOT NULL,
                 adj_close DOUBLE NOT NULL,
                 volume BIGINT NOT NULL,
                 PRIMARY KEY (symbol_id, date)
             );
             CREATE TABLE IF NOT EXISTS technical_indicators (
                 symbol_id BIGINT NOT NULL,
                 date DATE NOT NULL{indicator_cols}
             );
             CREATE TABLE IF NOT EXISTS technical_trade_signals (
                 symbol_id BIGINT NOT NULL,
                 date DATE NOT NULL{signal_cols}
             );
             CREATE TABLE IF NOT EXISTS outcomes (
                 symbol_id BIGINT NOT NULL,
                 date DATE NOT NULL{outcome_cols}
             );"
        );
        self.conn
            .execute_batch(&ddl)
            .context("Failed to initialize schema")?;
        info!("schema initialized");
        Ok(())
    }

    /// Insert a symbol if it does not exist and return its id. Existing rows
    /// are returned untouched; fields are never overwritten with NULL.
    pub fn insert_symbol(
        &self,
        symbol: &str,
        name: Option<&str>,
        sector: Option<&str>,
    ) -> Result<i64> {
        let mut stmt = self
            .conn
            .prepare("SELECT symbol_id FROM symbols WHERE symbol = ?")?;
        let mut rows = stmt.query(params![symbol])?;
        if let Some(row) = rows.next()? {
            return Ok(row.get(0)?);
        }

        let id: i64 = self.conn.query_row(
            "INSERT INTO symbols (symbol, name, sector) VALUES (?, ?, ?) RETURNING symbol_id",
            params![symbol, name, sector],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Keyed overwrite of daily bars, batched into transactions.
    pub fn insert_price_bars(&self, bars: &[PriceBar]) -> Result<()> {
        if bars.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare(
            "INSERT OR REPLACE INTO stock_prices
             (symbol_id, date, open_price, high_price, low_price, close_price, adj_close, volume)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for chunk in bars.chunks(self.batch_size.max(1)) {
            self.conn.execute_batch("BEGIN TRANSACTION;")?;
            for bar in chunk {
                stmt.execute(params![
                    bar.symbol_id,
                    date_value(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.adj_close,
                    bar.volume,
                ])?;
            }
            self.conn.execute_batch("COMMIT;")?;
        }
        info!(rows = bars.len(), "inserted price bars");
        Ok(())
    }

    pub fn fetch_all_prices(&self) -> Result<Vec<PriceBar>> {
        self.fetch_prices(None)
    }

    /// Bars within the trailing `lookback_days` calendar window.
    pub fn fetch_recent_prices(&self, lookback_days: u32) -> Result<Vec<PriceBar>> {
        self.fetch_prices(Some(lookback_days))
    }

    fn fetch_prices(&self, lookback_days: Option<u32>) -> Result<Vec<PriceBar>> {
        let mut sql = String::from(
            "SELECT sp.symbol_id, s.symbol, CAST(sp.date AS VARCHAR),
                    sp.open_price, sp.high_price, sp.low_price, sp.close_price,
                    sp.adj_close, sp.volume
             FROM stock_prices sp
             JOIN symbols s ON sp.symbol_id = s.symbol_id",
        );
        if lookback_days.is_some() {
            sql.push_str(" WHERE sp.date >= current_date - CAST(? AS INTEGER)");
        }
        sql.push_str(" ORDER BY s.symbol, sp.date");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match lookback_days {
            Some(days) => stmt.query(params![days as i64])?,
            None => stmt.query([])?,
        };

        let mut bars = Vec::new();
        while let Some(row) = rows.next()? {
            let date_text: String = row.get(2)?;
            let date = parse_date(&date_text)?;
            bars.push(PriceBar {
                symbol_id: row.get(0)?,
                symbol: row.get(1)?,
                date,
                open: row.get(3)?,
                high: row.get(4)?,
                low: row.get(5)?,
                close: row.get(6)?,
                adj_close: row.get(7)?,
                volume: row.get(8)?,
            });
        }
        Ok(bars)
    }

    /// Append indicator blocks. Computed columns absent from the allow-list
    /// are dropped (logged once per batch); non-finite cells become NULL.
    pub fn insert_indicators(&self, blocks: &[FeatureBlock]) -> Result<usize> {
        self.insert_float_blocks("technical_indicators", TECHNICAL_INDICATOR_COLUMNS, blocks)
    }

    /// Append outcome blocks, same filtering rules as indicators.
    pub fn insert_outcomes(&self, blocks: &[FeatureBlock]) -> Result<usize> {
        self.insert_float_blocks("outcomes", OUTCOME_COLUMNS, blocks)
    }

    fn insert_float_blocks(
        &self,
        table: &str,
        allowed: &[&str],
        blocks: &[FeatureBlock],
    ) -> Result<usize> {
        let mut total = 0usize;
        let mut dropped: HashSet<String> = HashSet::new();

        for block in blocks {
            let kept: Vec<&(String, Vec<f64>)> = block
                .columns
                .iter()
                .filter(|(name, _)| {
                    let keep = allowed.contains(&name.as_str());
                    if !keep {
                        dropped.insert(name.clone());
                    }
                    keep
                })
                .collect();

            let names: Vec<&str> = kept.iter().map(|(name, _)| name.as_str()).collect();
            let sql = insert_sql(table, &names);
            let mut stmt = self.conn.prepare(&sql)?;

            let rows = block.rows();
            for start in (0..rows).step_by(self.batch_size.max(1)) {
                let end = (start + self.batch_size.max(1)).min(rows);
                self.conn.execute_batch("BEGIN TRANSACTION;")?;
                for i in start..end {
                    let mut values: Vec<Value> = Vec::with_capacity(2 + kept.len());
                    values.push(Value::BigInt(block.symbol_id));
                    values.push(date_value(block.dates[i]));
                    for (_, column) in &kept {
                        values.push(float_value(column[i]));
                    }
                    stmt.execute(params_from_iter(values))?;
                }
                self.conn.execute_batch("COMMIT;")?;
            }
            total += rows;
        }

        if !dropped.is_empty() {
            let mut names: Vec<String> = dropped.into_iter().collect();
            names.sort();
            warn!(table, dropped = ?names, "dropped columns not present in the target schema");
        }
        info!(table, rows = total, "appended rows");
        Ok(total)
    }

    /// Upsert signal blocks: delete every (symbol_id, date) present in the
    /// batch, then insert, all inside one transaction per block. Re-running
    /// the same batch leaves exactly one row per key.
    pub fn insert_signals(&self, blocks: &[SignalBlock]) -> Result<usize> {
        let mut total = 0usize;
        let mut dropped: HashSet<String> = HashSet::new();

        for block in blocks {
            let kept: Vec<&(String, Vec<i32>)> = block
                .columns
                .iter()
                .filter(|(name, _)| {
                    let keep = TRADE_SIGNAL_COLUMNS.contains(&name.as_str());
                    if !keep {
                        dropped.insert(name.clone());
                    }
                    keep
                })
                .collect();

            let names: Vec<&str> = kept.iter().map(|(name, _)| name.as_str()).collect();
            let sql = insert_sql("technical_trade_signals", &names);

            self.conn.execute_batch("BEGIN TRANSACTION;")?;
            {
                let mut delete = self.conn.prepare(
                    "DELETE FROM technical_trade_signals WHERE symbol_id = ? AND date = ?",
                )?;
                for date in &block.dates {
                    delete.execute(params![block.symbol_id, date_value(*date)])?;
                }

                let mut insert = self.conn.prepare(&sql)?;
                for i in 0..block.rows() {
                    let mut values: Vec<Value> = Vec::with_capacity(2 + kept.len());
                    values.push(Value::BigInt(block.symbol_id));
                    values.push(date_value(block.dates[i]));
                    for (_, column) in &kept {
                        values.push(Value::Int(column[i]));
                    }
                    insert.execute(params_from_iter(values))?;
                }
            }
            self.conn.execute_batch("COMMIT;")?;
            total += block.rows();
        }

        if !dropped.is_empty() {
            let mut names: Vec<String> = dropped.into_iter().collect();
            names.sort();
            warn!(
                table = "technical_trade_signals",
                dropped = ?names,
                "dropped columns not present in the target schema"
            );
        }
        info!(table = "technical_trade_signals", rows = total, "upserted rows");
        Ok(total)
    }

    /// Count helper used by the pipelines and tests.
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        ensure_known_table(table)?;
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    /// Dump a derived table to Parquet for downstream consumers.
    pub fn export_parquet(&self, table: &str, out: &Path) -> Result<()> {
        ensure_known_table(table)?;
        let path = out
            .to_str()
            .ok_or_else(|| anyhow!("non-UTF8 export path {}", out.display()))?
            .replace('\'', "''");
        self.conn
            .execute_batch(&format!(
                "COPY (SELECT * FROM {table}) TO '{path}' (FORMAT PARQUET);"
            ))
            .with_context(|| format!("Failed to export {table} to {}", out.display()))?;
        info!(table, out = %out.display(), "exported parquet");
        Ok(())
    }

    /// Column names of a derived table, for assertions and diagnostics.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        ensure_known_table(table)?;
        let mut stmt = self
            .conn
            .prepare("SELECT column_name FROM information_schema.columns WHERE table_name = ? ORDER BY ordinal_position")?;
        let mut rows = stmt.query(params![table])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }
}

fn ensure_known_table(table: &str) -> Result<()> {
    if EXPORTABLE_TABLES.contains(&table) || table == "symbols" {
        Ok(())
    } else {
        Err(anyhow!("unknown table '{table}'"))
    }
}

fn ddl_columns(columns: &[&str], sql_type: &str) -> String {
    columns
        .iter()
        .map(|name| format!(",\n                 {name} {sql_type}"))
        .collect()
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let mut names = vec!["symbol_id", "date"];
    names.extend_from_slice(columns);
    let placeholders = vec!["?"; names.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        names.join(", ")
    )
}

fn date_value(date: NaiveDate) -> Value {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    Value::Date32((date - epoch).num_days() as i32)
}

fn float_value(value: f64) -> Value {
    if value.is_finite() {
        Value::Double(value)
    } else {
        Value::Null
    }
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Unable to parse date '{text}'"))
}
