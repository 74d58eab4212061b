//! Forward-looking price and return labels for supervised learning.

use rayon::prelude::*;
use tracing::debug;

use signalforge_rs::config::EngineParams;
use signalforge_rs::data::{
    partition_by_symbol, BatchOutput, FeatureBlock, PriceBar, SymbolFailure, SymbolSeries,
};

/// For every symbol and horizon H: `price_dH` is the close H bars ahead
/// (NaN past the series end) and `returns_dH` is its relative change from
/// the current close. A zero close yields a non-finite return that persists
/// as NULL; it is a data-quality anomaly, not an error.
pub fn generate_outcomes(bars: Vec<PriceBar>, params: &EngineParams) -> BatchOutput<FeatureBlock> {
    let groups = partition_by_symbol(bars);

    let results: Vec<Result<FeatureBlock, SymbolFailure>> = groups
        .into_par_iter()
        .map(|group| match group {
            Ok(series) => Ok(compute_symbol_outcomes(&series, params)),
            Err(error) => Err(SymbolFailure {
                symbol_id: error.symbol_id,
                symbol: error.symbol.clone(),
                error,
            }),
        })
        .collect();

    let mut blocks = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(block) => blocks.push(block),
            Err(failure) => failures.push(failure),
        }
    }
    BatchOutput { blocks, failures }
}

pub fn compute_symbol_outcomes(series: &SymbolSeries, params: &EngineParams) -> FeatureBlock {
    let mut block = FeatureBlock {
        symbol_id: series.symbol_id,
        symbol: series.symbol.clone(),
        dates: series.dates.clone(),
        columns: Vec::new(),
    };

    for &horizon in &params.horizons {
        let ahead = lead(&series.close, horizon);
        let returns = ahead
            .iter()
            .zip(series.close.iter())
            .map(|(future, current)| (future - current) / current)
            .collect();
        block.push(format!("price_d{horizon}"), ahead);
        block.push(format!("returns_d{horizon}"), returns);
    }

    debug!(symbol = %series.symbol, rows = block.rows(), "computed outcome block");
    block
}

/// Forward shift: the value `distance` rows ahead, NaN for the last
/// `distance` rows.
fn lead(values: &[f64], distance: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    for i in 0..len.saturating_sub(distance) {
        out[i] = values[i + distance];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                symbol_id: 1,
                symbol: "TEST".to_string(),
                date: start + chrono::Days::new(i as u64),
                open: *close,
                high: close + 1.0,
                low: close - 1.0,
                close: *close,
                adj_close: *close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn returns_d1_is_exact_for_a_one_percent_move() {
        let output = generate_outcomes(bars(&[100.0, 101.0]), &EngineParams::default());
        let block = &output.blocks[0];
        let returns = block.column("returns_d1").unwrap();
        assert_eq!(returns[0], 0.01);
        assert!(!returns[1].is_finite());

        let price = block.column("price_d1").unwrap();
        assert_eq!(price[0], 101.0);
    }

    #[test]
    fn price_d120_needs_120_remaining_rows() {
        let closes: Vec<f64> = (0..130).map(|i| 100.0 + i as f64).collect();
        let output = generate_outcomes(bars(&closes), &EngineParams::default());
        let price = output.blocks[0].column("price_d120").unwrap();

        for (i, value) in price.iter().enumerate() {
            if i + 120 < closes.len() {
                assert_eq!(*value, closes[i + 120], "row {i}");
            } else {
                assert!(!value.is_finite(), "row {i} should be undefined");
            }
        }
    }

    #[test]
    fn zero_close_propagates_as_undefined_not_error() {
        let output = generate_outcomes(bars(&[0.0, 10.0, 11.0]), &EngineParams::default());
        let returns = output.blocks[0].column("returns_d1").unwrap();
        assert!(!returns[0].is_finite());
        assert!((returns[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn every_default_horizon_gets_both_columns() {
        let closes: Vec<f64> = (0..130).map(|i| 100.0 + i as f64).collect();
        let params = EngineParams::default();
        let output = generate_outcomes(bars(&closes), &params);
        let block = &output.blocks[0];
        for h in &params.horizons {
            assert!(block.column(&format!("price_d{h}")).is_some());
            assert!(block.column(&format!("returns_d{h}")).is_some());
        }
        assert_eq!(block.columns.len(), 2 * params.horizons.len());
    }
}
