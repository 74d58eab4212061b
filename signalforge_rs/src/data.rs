use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

/// One daily OHLCV row. Unique per (symbol_id, date); re-insertion through
/// the store replaces the existing row.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub symbol_id: i64,
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: i64,
}

/// A single symbol's price history, sorted ascending by date, decomposed
/// into parallel column vectors for the rolling computations.
#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol_id: i64,
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub adj_close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl SymbolSeries {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

/// Per-symbol columnar result block with float columns. NaN cells persist
/// as SQL NULL.
#[derive(Debug, Clone)]
pub struct FeatureBlock {
    pub symbol_id: i64,
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<(String, Vec<f64>)>,
}

impl FeatureBlock {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn push(&mut self, name: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.push((name.into(), values));
    }

    pub fn rows(&self) -> usize {
        self.dates.len()
    }
}

/// Per-symbol columnar signal block. Every cell is a small integer
/// (-1/0/1, or 0/1 for trend-confirmation flags); signals are never NULL.
#[derive(Debug, Clone)]
pub struct SignalBlock {
    pub symbol_id: i64,
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<(String, Vec<i32>)>,
}

impl SignalBlock {
    pub fn column(&self, name: &str) -> Option<&[i32]> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn push(&mut self, name: impl Into<String>, values: Vec<i32>) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.push((name.into(), values));
    }

    pub fn rows(&self) -> usize {
        self.dates.len()
    }
}

/// Raised when a symbol's input rows cannot be trusted for windowed
/// computation. Aborts that symbol only; sibling symbols in the batch are
/// unaffected.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid price data for {symbol} (symbol_id={symbol_id}) at {date}: {reason}")]
pub struct DataValidationError {
    pub symbol_id: i64,
    pub symbol: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// One symbol that failed validation during a batch run.
#[derive(Debug, Clone)]
pub struct SymbolFailure {
    pub symbol_id: i64,
    pub symbol: String,
    pub error: DataValidationError,
}

/// Result of a batch engine run: successfully computed blocks plus the
/// per-symbol failures the caller may log, retry, or escalate.
#[derive(Debug, Clone)]
pub struct BatchOutput<T> {
    pub blocks: Vec<T>,
    pub failures: Vec<SymbolFailure>,
}

impl<T> BatchOutput<T> {
    pub fn total_rows(&self) -> usize
    where
        T: RowCount,
    {
        self.blocks.iter().map(|b| b.row_count()).sum()
    }
}

pub trait RowCount {
    fn row_count(&self) -> usize;
}

impl RowCount for FeatureBlock {
    fn row_count(&self) -> usize {
        self.rows()
    }
}

impl RowCount for SignalBlock {
    fn row_count(&self) -> usize {
        self.rows()
    }
}

/// Group an unordered bar batch by symbol and sort each group ascending by
/// date. Sorting happens before validation so duplicate detection only needs
/// to compare adjacent rows. Each symbol validates independently: a bad
/// symbol becomes an `Err` entry without poisoning the rest of the batch.
pub fn partition_by_symbol(
    bars: Vec<PriceBar>,
) -> Vec<Result<SymbolSeries, DataValidationError>> {
    let mut groups: BTreeMap<i64, Vec<PriceBar>> = BTreeMap::new();
    for bar in bars {
        groups.entry(bar.symbol_id).or_default().push(bar);
    }

    groups
        .into_values()
        .map(|mut rows| {
            rows.sort_by_key(|bar| bar.date);
            build_series(rows)
        })
        .collect()
}

fn build_series(rows: Vec<PriceBar>) -> Result<SymbolSeries, DataValidationError> {
    let symbol_id = rows[0].symbol_id;
    let symbol = rows[0].symbol.clone();
    let len = rows.len();

    let mut series = SymbolSeries {
        symbol_id,
        symbol: symbol.clone(),
        dates: Vec::with_capacity(len),
        open: Vec::with_capacity(len),
        high: Vec::with_capacity(len),
        low: Vec::with_capacity(len),
        close: Vec::with_capacity(len),
        adj_close: Vec::with_capacity(len),
        volume: Vec::with_capacity(len),
    };

    for bar in &rows {
        if let Some(last) = series.dates.last() {
            if *last == bar.date {
                return Err(DataValidationError {
                    symbol_id,
                    symbol: symbol.clone(),
                    date: bar.date,
                    reason: "duplicate (symbol, date) row".to_string(),
                });
            }
        }
        let prices = [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
            ("adj_close", bar.adj_close),
        ];
        for (field, value) in prices {
            if !value.is_finite() {
                return Err(DataValidationError {
                    symbol_id,
                    symbol: symbol.clone(),
                    date: bar.date,
                    reason: format!("non-finite {field} price"),
                });
            }
        }
        if bar.volume < 0 {
            return Err(DataValidationError {
                symbol_id,
                symbol: symbol.clone(),
                date: bar.date,
                reason: format!("negative volume {}", bar.volume),
            });
        }

        series.dates.push(bar.date);
        series.open.push(bar.open);
        series.high.push(bar.high);
        series.low.push(bar.low);
        series.close.push(bar.close);
        series.adj_close.push(bar.adj_close);
        series.volume.push(bar.volume as f64);
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(symbol_id: i64, day: u32, close: f64) -> PriceBar {
        PriceBar {
            symbol_id,
            symbol: format!("SYM{symbol_id}"),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            adj_close: close,
            volume: 1_000,
        }
    }

    #[test]
    fn partition_sorts_each_symbol_by_date() {
        let bars = vec![bar(1, 3, 12.0), bar(1, 1, 10.0), bar(1, 2, 11.0)];
        let mut groups = partition_by_symbol(bars);
        assert_eq!(groups.len(), 1);
        let series = groups.remove(0).expect("series");
        assert_eq!(series.close, vec![10.0, 11.0, 12.0]);
        assert!(series.dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn duplicate_dates_fail_only_the_offending_symbol() {
        let bars = vec![bar(1, 1, 10.0), bar(1, 1, 10.5), bar(2, 1, 20.0)];
        let groups = partition_by_symbol(bars);
        assert_eq!(groups.len(), 2);
        let err = groups[0].as_ref().expect_err("duplicate should fail");
        assert_eq!(err.symbol_id, 1);
        assert!(err.reason.contains("duplicate"));
        assert!(groups[1].is_ok());
    }

    #[test]
    fn non_finite_prices_are_rejected_with_symbol_and_date() {
        let mut poisoned = bar(7, 2, 10.0);
        poisoned.high = f64::NAN;
        let groups = partition_by_symbol(vec![bar(7, 1, 9.0), poisoned]);
        let err = groups[0].as_ref().expect_err("nan should fail");
        assert_eq!(err.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!(err.reason.contains("high"));
    }

    #[test]
    fn negative_volume_is_rejected() {
        let mut poisoned = bar(3, 1, 10.0);
        poisoned.volume = -5;
        let groups = partition_by_symbol(vec![poisoned]);
        assert!(groups[0].is_err());
    }
}
