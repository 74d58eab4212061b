//! Discrete trade signals derived from indicator blocks.
//!
//! Rules evaluate row by row with IEEE comparison semantics: any NaN input
//! fails every comparison, so a row with insufficient indicator history can
//! never fire. Signal columns are always fully populated integers; absence
//! of a condition is 0, never NULL.

use rayon::prelude::*;
use tracing::debug;

use signalforge_rs::config::EngineParams;
use signalforge_rs::data::{BatchOutput, FeatureBlock, SignalBlock};

use crate::indicators::shift;

/// Derive one signal block per indicator block. The indicator block must
/// carry the raw `close` column (the in-memory engine output always does).
pub fn generate_signals(
    blocks: &[FeatureBlock],
    params: &EngineParams,
) -> BatchOutput<SignalBlock> {
    let blocks = blocks
        .par_iter()
        .map(|block| compute_symbol_signals(block, params))
        .collect();
    BatchOutput {
        blocks,
        failures: Vec::new(),
    }
}

pub fn compute_symbol_signals(block: &FeatureBlock, params: &EngineParams) -> SignalBlock {
    let nan_fill = vec![f64::NAN; block.rows()];
    let close = col(block, &nan_fill, "close").to_vec();

    let mut out = SignalBlock {
        symbol_id: block.symbol_id,
        symbol: block.symbol.clone(),
        dates: block.dates.clone(),
        columns: Vec::new(),
    };

    for &w in &params.rsi_windows {
        out.push(
            format!("rsi_signal_{w}"),
            threshold_signal(col(block, &nan_fill, &format!("rsi_{w}")), 70.0, 30.0),
        );
    }

    let smooth = params.stochastic_smoothing;
    for &w in &params.stochastic_windows {
        out.push(
            format!("stoch_signal_{w}_{smooth}"),
            threshold_signal(
                col(block, &nan_fill, &format!("stoch_k_{w}_{smooth}")),
                80.0,
                20.0,
            ),
        );
    }

    for cfg in &params.macd_configs {
        let suffix = format!("{}_{}_{}", cfg.fast, cfg.slow, cfg.signal);
        out.push(
            format!("macd_cross_signal_{suffix}"),
            cross_signal(
                col(block, &nan_fill, &format!("macd_{suffix}")),
                col(block, &nan_fill, &format!("macd_signal_{suffix}")),
            ),
        );
    }

    for &(short, long) in &params.sma_cross_pairs {
        out.push(
            format!("sma_cross_signal_{short}_{long}"),
            cross_signal(
                col(block, &nan_fill, &format!("sma_{short}")),
                col(block, &nan_fill, &format!("sma_{long}")),
            ),
        );
    }

    for &w in &params.bollinger_windows {
        out.push(
            format!("bb_signal_{w}"),
            band_signal(
                &close,
                col(block, &nan_fill, &format!("bb_upper_{w}")),
                col(block, &nan_fill, &format!("bb_lower_{w}")),
            ),
        );
    }

    for &w in &params.cci_windows {
        out.push(
            format!("cci_signal_{w}"),
            threshold_signal(col(block, &nan_fill, &format!("cci_{w}")), 100.0, -100.0),
        );
    }

    for &w in &params.adx_windows {
        out.push(
            format!("adx_signal_{w}"),
            trend_flag(col(block, &nan_fill, &format!("adx_{w}")), 20.0),
        );
    }

    for cfg in &params.psar_configs {
        out.push(
            format!("psar_signal_{}", cfg.suffix()),
            directional_signal(&close, col(block, &nan_fill, &format!("psar_{}", cfg.suffix()))),
        );
    }

    for &w in &params.donchian_windows {
        let prior_high = shift(col(block, &nan_fill, &format!("donchian_high_{w}")), 1);
        let prior_low = shift(col(block, &nan_fill, &format!("donchian_low_{w}")), 1);
        out.push(
            format!("donchian_signal_{w}"),
            breakout_signal(&close, &prior_high, &prior_low),
        );
    }

    debug!(
        symbol = %block.symbol,
        rows = out.rows(),
        columns = out.columns.len(),
        "computed signal block"
    );
    out
}

/// Indicator column lookup with an all-NaN fallback, so a block missing a
/// family still yields zero-valued (never absent) signal columns.
fn col<'a>(block: &'a FeatureBlock, nan_fill: &'a [f64], name: &str) -> &'a [f64] {
    block.column(name).unwrap_or(nan_fill)
}

/// Overbought/oversold: value above `upper` is -1, below `lower` is +1.
fn threshold_signal(values: &[f64], upper: f64, lower: f64) -> Vec<i32> {
    values
        .iter()
        .map(|v| {
            if *v > upper {
                -1
            } else if *v < lower {
                1
            } else {
                0
            }
        })
        .collect()
}

/// Strict two-row crossover: +1 when `a` moves from <= `b` to > `b`,
/// -1 for the reverse. Never fires on the first row.
fn cross_signal(a: &[f64], b: &[f64]) -> Vec<i32> {
    let len = a.len().min(b.len());
    let mut out = vec![0; len];
    for i in 1..len {
        let (prev_a, prev_b) = (a[i - 1], b[i - 1]);
        let (cur_a, cur_b) = (a[i], b[i]);
        if cur_a > cur_b && prev_a <= prev_b {
            out[i] = 1;
        } else if cur_a < cur_b && prev_a >= prev_b {
            out[i] = -1;
        }
    }
    out
}

/// Close escaping the band envelope: above upper -> -1, below lower -> +1.
fn band_signal(close: &[f64], upper: &[f64], lower: &[f64]) -> Vec<i32> {
    (0..close.len())
        .map(|i| {
            if close[i] > upper[i] {
                -1
            } else if close[i] < lower[i] {
                1
            } else {
                0
            }
        })
        .collect()
}

/// Binary trend confirmation: 1 while the value sits above `level`, else 0.
/// Not directional.
fn trend_flag(values: &[f64], level: f64) -> Vec<i32> {
    values.iter().map(|v| i32::from(*v > level)).collect()
}

/// Close relative to a reference line: above -> +1, below -> -1.
fn directional_signal(close: &[f64], reference: &[f64]) -> Vec<i32> {
    (0..close.len())
        .map(|i| {
            if close[i] > reference[i] {
                1
            } else if close[i] < reference[i] {
                -1
            } else {
                0
            }
        })
        .collect()
}

/// Channel breakout against the prior bar's channel edges.
fn breakout_signal(close: &[f64], prior_high: &[f64], prior_low: &[f64]) -> Vec<i32> {
    (0..close.len())
        .map(|i| {
            if close[i] > prior_high[i] {
                1
            } else if close[i] < prior_low[i] {
                -1
            } else {
                0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use signalforge_rs::data::SymbolSeries;

    use crate::indicators::compute_symbol_indicators;

    fn block_from_closes(closes: &[f64]) -> FeatureBlock {
        let len = closes.len();
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let series = SymbolSeries {
            symbol_id: 1,
            symbol: "TEST".to_string(),
            dates: (0..len)
                .map(|i| start + chrono::Days::new(i as u64))
                .collect(),
            open: closes.to_vec(),
            high: closes.iter().map(|c| c + 1.0).collect(),
            low: closes.iter().map(|c| c - 1.0).collect(),
            close: closes.to_vec(),
            adj_close: closes.to_vec(),
            volume: vec![1_000.0; len],
        };
        compute_symbol_indicators(&series, &EngineParams::default())
    }

    #[test]
    fn threshold_signal_marks_overbought_and_oversold() {
        let values = [f64::NAN, 75.0, 25.0, 50.0, 70.0, 30.0];
        assert_eq!(threshold_signal(&values, 70.0, 30.0), vec![0, -1, 1, 0, 0, 0]);
    }

    #[test]
    fn cross_signal_fires_on_transitions_only() {
        let a = [1.0, 3.0, 3.0, 1.0, 1.0];
        let b = [2.0, 2.0, 2.0, 2.0, 2.0];
        assert_eq!(cross_signal(&a, &b), vec![0, 1, 0, -1, 0]);
    }

    #[test]
    fn cross_signal_never_fires_on_the_first_row() {
        let a = [5.0, 5.0];
        let b = [1.0, 1.0];
        assert_eq!(cross_signal(&a, &b)[0], 0);
    }

    #[test]
    fn cross_signal_ignores_rows_with_undefined_inputs() {
        // The previous row is undefined, so neither leg of a cross can be
        // established yet.
        let a = [f64::NAN, f64::NAN, 3.0, 3.0];
        let b = [f64::NAN, 2.0, 2.0, 2.0];
        assert_eq!(cross_signal(&a, &b), vec![0, 0, 0, 0]);
    }

    #[test]
    fn trend_flag_is_binary() {
        let values = [f64::NAN, 25.0, 15.0];
        assert_eq!(trend_flag(&values, 20.0), vec![0, 1, 0]);
    }

    #[test]
    fn golden_cross_fires_exactly_once_on_a_v_shaped_series() {
        let mut closes = Vec::new();
        for i in 0..60 {
            closes.push(100.0 - 0.5 * i as f64);
        }
        let bottom = *closes.last().unwrap();
        for i in 1..=60 {
            closes.push(bottom + i as f64);
        }
        let block = block_from_closes(&closes);
        let signals = compute_symbol_signals(&block, &EngineParams::default());
        let cross = signals.column("sma_cross_signal_20_50").unwrap();

        let golden = cross.iter().filter(|v| **v == 1).count();
        let death = cross.iter().filter(|v| **v == -1).count();
        assert_eq!(golden, 1, "expected exactly one golden cross");
        assert_eq!(death, 0, "no death cross on a V-shaped series");

        let fire_idx = cross.iter().position(|v| *v == 1).unwrap();
        let sma20 = block.column("sma_20").unwrap();
        let sma50 = block.column("sma_50").unwrap();
        assert!(sma20[fire_idx] > sma50[fire_idx]);
        assert!(sma20[fire_idx - 1] <= sma50[fire_idx - 1]);
    }

    #[test]
    fn warmup_rows_never_fire_any_signal() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let block = block_from_closes(&closes);
        let signals = compute_symbol_signals(&block, &EngineParams::default());
        // Window 50 indicators are undefined over the whole 30-row series;
        // their signal columns must be all zeros, not NULL or fired.
        for name in ["rsi_signal_50", "cci_signal_40", "sma_cross_signal_50_200"] {
            let column = signals.column(name).unwrap();
            assert!(column.iter().all(|v| *v == 0), "{name} fired during warmup");
        }
    }

    #[test]
    fn psar_signal_tracks_price_side() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
        let block = block_from_closes(&closes);
        let signals = compute_symbol_signals(&block, &EngineParams::default());
        let psar_signal = signals.column("psar_signal_002_02").unwrap();
        assert_eq!(psar_signal[0], 0);
        assert_eq!(psar_signal[1], 0);
        // A steady uptrend keeps the SAR below price.
        assert!(psar_signal[10..].iter().all(|v| *v == 1));
    }

    #[test]
    fn donchian_breakout_compares_against_the_prior_channel() {
        // Close jumps 3 per bar while the high is only +1 above close, so
        // every close clears the prior bar's rolling high once defined.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + 3.0 * i as f64).collect();
        let block = block_from_closes(&closes);
        let signals = compute_symbol_signals(&block, &EngineParams::default());
        let breakout = signals.column("donchian_signal_10").unwrap();
        // Channel is defined from row 10 onward only via the prior row.
        assert!(breakout[..10].iter().all(|v| *v == 0));
        assert!(breakout[10..].iter().all(|v| *v == 1));
    }

    #[test]
    fn missing_indicator_columns_yield_all_zero_signals() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let block = FeatureBlock {
            symbol_id: 9,
            symbol: "BARE".to_string(),
            dates: (0..3).map(|i| start + chrono::Days::new(i)).collect(),
            columns: vec![("close".to_string(), vec![10.0, 11.0, 12.0])],
        };
        let signals = compute_symbol_signals(&block, &EngineParams::default());
        for (name, column) in &signals.columns {
            assert!(
                column.iter().all(|v| *v == 0),
                "{name} fired without indicator inputs"
            );
        }
    }
}
