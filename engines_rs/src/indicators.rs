//! Rolling technical indicators over per-symbol daily series.
//!
//! Every helper operates on plain `&[f64]` slices and returns a fresh
//! `Vec<f64>` of the same length, using NaN for rows with insufficient
//! trailing history. A windowed computation of window `w` is NaN for at
//! least its first `w - 1` rows; derived stages (MACD signal line, %D,
//! ADX) extend the warmup accordingly.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::debug;

use signalforge_rs::config::{EngineParams, MacdParams, PsarParams};
use signalforge_rs::data::{
    partition_by_symbol, BatchOutput, FeatureBlock, PriceBar, SymbolFailure, SymbolSeries,
};

/// Compute one indicator block per symbol with sufficient history. Symbols
/// that fail validation are reported in `failures` and do not affect
/// siblings.
pub fn generate_indicators(
    bars: Vec<PriceBar>,
    params: &EngineParams,
) -> BatchOutput<FeatureBlock> {
    let groups = partition_by_symbol(bars);

    let results: Vec<Result<FeatureBlock, SymbolFailure>> = groups
        .into_par_iter()
        .map(|group| match group {
            Ok(series) => Ok(compute_symbol_indicators(&series, params)),
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

/// All indicator families for a single, already-sorted symbol series.
pub fn compute_symbol_indicators(series: &SymbolSeries, params: &EngineParams) -> FeatureBlock {
    let mut block = FeatureBlock {
        symbol_id: series.symbol_id,
        symbol: series.symbol.clone(),
        dates: series.dates.clone(),
        columns: Vec::new(),
    };

    // Raw price columns ride along for downstream rule evaluation; the
    // persistence allow-list drops them.
    block.push("open", series.open.clone());
    block.push("high", series.high.clone());
    block.push("low", series.low.clone());
    block.push("close", series.close.clone());
    block.push("adj_close", series.adj_close.clone());
    block.push("volume", series.volume.clone());

    for &w in &params.rsi_windows {
        block.push(format!("rsi_{w}"), rsi(&series.close, w));
    }
    for &w in &params.sma_windows {
        block.push(format!("sma_{w}"), sma(&series.close, w));
    }
    for &w in &params.ema_windows {
        block.push(format!("ema_{w}"), ema(&series.close, w));
    }
    for cfg in &params.macd_configs {
        let (line, signal, hist) = macd(&series.close, *cfg);
        let MacdParams { fast, slow, signal: sig } = *cfg;
        block.push(format!("macd_{fast}_{slow}_{sig}"), line);
        block.push(format!("macd_signal_{fast}_{slow}_{sig}"), signal);
        block.push(format!("macd_hist_{fast}_{slow}_{sig}"), hist);
    }
    for &w in &params.bollinger_windows {
        let (mid, upper, lower) = bollinger(&series.close, w, 2.0);
        block.push(format!("bb_upper_{w}"), upper);
        block.push(format!("bb_middle_{w}"), mid);
        block.push(format!("bb_lower_{w}"), lower);
    }
    let smooth = params.stochastic_smoothing;
    for &w in &params.stochastic_windows {
        let (k, d) = stochastic(&series.high, &series.low, &series.close, w, smooth);
        block.push(format!("stoch_k_{w}_{smooth}"), k);
        block.push(format!("stoch_d_{w}_{smooth}"), d);
    }
    for &w in &params.cci_windows {
        block.push(
            format!("cci_{w}"),
            cci(&series.high, &series.low, &series.close, w),
        );
    }
    for &w in &params.atr_windows {
        block.push(
            format!("atr_{w}"),
            atr(&series.high, &series.low, &series.close, w),
        );
    }
    let obv_line = obv(&series.close, &series.volume);
    for &w in &params.obv_windows {
        block.push(format!("obv_{w}"), sma(&obv_line, w));
    }
    block.push("obv", obv_line);

    // The three configurations share the span-B window, so emit each
    // distinct window once.
    let mut emitted = HashSet::new();
    for cfg in &params.ichimoku_configs {
        if emitted.insert(("conv", cfg.conversion)) {
            block.push(
                format!("ichimoku_conv_{}", cfg.conversion),
                midpoint(&series.high, &series.low, cfg.conversion),
            );
        }
        if emitted.insert(("base", cfg.base)) {
            block.push(
                format!("ichimoku_base_{}", cfg.base),
                midpoint(&series.high, &series.low, cfg.base),
            );
        }
        if emitted.insert(("spanb", cfg.span_b)) {
            block.push(
                format!("ichimoku_spanb_{}", cfg.span_b),
                midpoint(&series.high, &series.low, cfg.span_b),
            );
        }
    }

    for &w in &params.donchian_windows {
        block.push(format!("donchian_high_{w}"), rolling_max(&series.high, w));
        block.push(format!("donchian_low_{w}"), rolling_min(&series.low, w));
    }
    for &w in &params.adx_windows {
        block.push(
            format!("adx_{w}"),
            adx(&series.high, &series.low, &series.close, w),
        );
    }
    for cfg in &params.psar_configs {
        block.push(
            format!("psar_{}", cfg.suffix()),
            psar(&series.high, &series.low, &series.close, *cfg),
        );
    }

    let lag_sources: [(&str, &[f64]); 5] = [
        ("close", &series.close),
        ("high", &series.high),
        ("low", &series.low),
        ("open", &series.open),
        ("volume", &series.volume),
    ];
    for (name, values) in lag_sources {
        for &lag in &params.lags {
            block.push(format!("{name}_lag_{lag}"), shift(values, lag));
        }
    }

    debug!(
        symbol = %series.symbol,
        rows = block.rows(),
        columns = block.columns.len(),
        "computed indicator block"
    );
    block
}

/// Plain lagged copy: NaN for the first `lag` rows.
pub fn shift(values: &[f64], lag: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    for i in lag..len {
        out[i] = values[i - lag];
    }
    out
}

/// Rolling mean. NaN while the window is short or contains a non-finite
/// value.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 {
        return out;
    }
    for i in 0..len {
        if i + 1 < period {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Exponential moving average seeded with the mean of the first `period`
/// values; defined from index `period - 1`.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for i in period..len {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// `period` finite values. Leading NaNs in the input push the warmup back
/// correspondingly.
pub fn wilder(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 {
        return out;
    }
    let alpha = 1.0 / period as f64;
    let mut seed_sum = 0.0;
    let mut seed_count = 0usize;
    let mut prev: Option<f64> = None;
    for i in 0..len {
        let value = values[i];
        if !value.is_finite() {
            continue;
        }
        match prev {
            None => {
                seed_sum += value;
                seed_count += 1;
                if seed_count == period {
                    let seed = seed_sum / period as f64;
                    out[i] = seed;
                    prev = Some(seed);
                }
            }
            Some(p) => {
                let next = alpha * value + (1.0 - alpha) * p;
                out[i] = next;
                prev = Some(next);
            }
        }
    }
    out
}

/// Rolling population standard deviation over the same window as the mean.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 {
        return out;
    }
    let mean = sma(values, period);
    for i in 0..len {
        if !mean[i].is_finite() {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        let variance = window.iter().map(|v| (v - mean[i]).powi(2)).sum::<f64>() / period as f64;
        out[i] = variance.sqrt();
    }
    out
}

pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 {
        return out;
    }
    for i in 0..len {
        if i + 1 < period {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        out[i] = window.iter().cloned().fold(f64::MIN, f64::max);
    }
    out
}

pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    let len = values.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 {
        return out;
    }
    for i in 0..len {
        if i + 1 < period {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        out[i] = window.iter().cloned().fold(f64::MAX, f64::min);
    }
    out
}

/// Wilder relative strength index, scaled to [0, 100]. A window with zero
/// average loss saturates at exactly 100.
pub fn rsi(close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut gains = vec![0.0; len];
    let mut losses = vec![0.0; len];
    for i in 1..len {
        let change = close[i] - close[i - 1];
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }
    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);
    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(gain, loss)| {
            if !gain.is_finite() || !loss.is_finite() {
                f64::NAN
            } else if *loss == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + gain / loss)
            }
        })
        .collect()
}

/// MACD line, signal line, histogram. The signal line is an EMA over the
/// MACD line's defined suffix, so it starts `signal - 1` rows after the
/// line does.
pub fn macd(close: &[f64], params: MacdParams) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let len = close.len();
    let fast = ema(close, params.fast);
    let slow = ema(close, params.slow);
    let line: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();

    let mut signal = vec![f64::NAN; len];
    if let Some(first_valid) = line.iter().position(|v| v.is_finite()) {
        let smoothed = ema(&line[first_valid..], params.signal);
        for (offset, value) in smoothed.into_iter().enumerate() {
            signal[first_valid + offset] = value;
        }
    }

    let hist = line
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| l - s)
        .collect();
    (line, signal, hist)
}

/// Bollinger middle/upper/lower bands: SMA +/- `mult` population standard
/// deviations.
pub fn bollinger(close: &[f64], period: usize, mult: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mid = sma(close, period);
    let std = rolling_std(close, period);
    let upper = mid
        .iter()
        .zip(std.iter())
        .map(|(m, s)| m + s * mult)
        .collect();
    let lower = mid
        .iter()
        .zip(std.iter())
        .map(|(m, s)| m - s * mult)
        .collect();
    (mid, upper, lower)
}

/// Raw %K from rolling high/low/close plus %D, the `smooth`-period rolling
/// mean of %K.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    smooth: usize,
) -> (Vec<f64>, Vec<f64>) {
    let len = close.len();
    let highest = rolling_max(high, period);
    let lowest = rolling_min(low, period);

    let mut k = vec![f64::NAN; len];
    for i in 0..len {
        let range = highest[i] - lowest[i];
        if !range.is_finite() || range == 0.0 {
            continue;
        }
        k[i] = ((close[i] - lowest[i]) / range * 100.0).clamp(0.0, 100.0);
    }

    let mut d = vec![f64::NAN; len];
    if let Some(first_valid) = k.iter().position(|v| v.is_finite()) {
        let smoothed = sma(&k[first_valid..], smooth);
        for (offset, value) in smoothed.into_iter().enumerate() {
            d[first_valid + offset] = value;
        }
    }
    (k, d)
}

/// Commodity channel index over the typical price (high+low+close)/3.
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let tp: Vec<f64> = (0..len)
        .map(|i| (high[i] + low[i] + close[i]) / 3.0)
        .collect();
    let mean = sma(&tp, period);

    let mut out = vec![f64::NAN; len];
    for i in 0..len {
        if !mean[i].is_finite() {
            continue;
        }
        let window = &tp[i + 1 - period..=i];
        let mad = window.iter().map(|v| (v - mean[i]).abs()).sum::<f64>() / period as f64;
        if mad == 0.0 {
            continue;
        }
        out[i] = (tp[i] - mean[i]) / (0.015 * mad);
    }
    out
}

/// Wilder average true range. The first bar's true range falls back to
/// high - low (no prior close).
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut tr = vec![f64::NAN; len];
    for i in 0..len {
        let high_low = high[i] - low[i];
        if i == 0 {
            tr[i] = high_low;
        } else {
            let high_close = (high[i] - close[i - 1]).abs();
            let low_close = (low[i] - close[i - 1]).abs();
            tr[i] = high_low.max(high_close).max(low_close);
        }
    }
    wilder(&tr, period)
}

/// On-balance volume: cumulative volume signed by the close-to-close
/// direction, seeded with the first bar's volume.
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let len = close.len();
    let mut out = vec![f64::NAN; len];
    if len == 0 {
        return out;
    }
    let mut acc = volume[0];
    out[0] = acc;
    for i in 1..len {
        if close[i] > close[i - 1] {
            acc += volume[i];
        } else if close[i] < close[i - 1] {
            acc -= volume[i];
        }
        out[i] = acc;
    }
    out
}

/// Rolling midpoint of the high/low range, the building block of every
/// Ichimoku line.
pub fn midpoint(high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    let highest = rolling_max(high, period);
    let lowest = rolling_min(low, period);
    highest
        .iter()
        .zip(lowest.iter())
        .map(|(h, l)| (h + l) / 2.0)
        .collect()
}

/// Wilder average directional index. DI lines are defined from index
/// `period - 1`; the final DX smoothing pushes ADX out to `2 * period - 2`.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    let mut plus_dm = vec![0.0; len];
    let mut minus_dm = vec![0.0; len];
    let mut tr = vec![0.0; len];
    if len == 0 {
        return Vec::new();
    }
    tr[0] = high[0] - low[0];
    for i in 1..len {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
        let high_low = high[i] - low[i];
        let high_close = (high[i] - close[i - 1]).abs();
        let low_close = (low[i] - close[i - 1]).abs();
        tr[i] = high_low.max(high_close).max(low_close);
    }

    let smoothed_tr = wilder(&tr, period);
    let smoothed_plus = wilder(&plus_dm, period);
    let smoothed_minus = wilder(&minus_dm, period);

    let mut dx = vec![f64::NAN; len];
    for i in 0..len {
        let atr = smoothed_tr[i];
        if !atr.is_finite() {
            continue;
        }
        let plus_di = if atr == 0.0 {
            0.0
        } else {
            smoothed_plus[i] / atr * 100.0
        };
        let minus_di = if atr == 0.0 {
            0.0
        } else {
            smoothed_minus[i] / atr * 100.0
        };
        let di_sum = plus_di + minus_di;
        dx[i] = if di_sum == 0.0 {
            0.0
        } else {
            (plus_di - minus_di).abs() / di_sum * 100.0
        };
    }
    wilder(&dx, period)
}

/// Parabolic stop-and-reverse. The first two rows have no defined value;
/// the recurrence starts from the second close.
pub fn psar(high: &[f64], low: &[f64], close: &[f64], params: PsarParams) -> Vec<f64> {
    let len = close.len();
    let mut out = vec![f64::NAN; len];
    if len < 3 {
        return out;
    }

    let step = params.step;
    let max_step = params.max_step;
    let mut up_trend = true;
    let mut af = step;
    let mut up_trend_high = high[0];
    let mut down_trend_low = low[0];
    let mut prev = close[1];

    for i in 2..len {
        let mut reversal = false;
        let max_high = high[i];
        let min_low = low[i];
        let mut cur;

        if up_trend {
            cur = prev + af * (up_trend_high - prev);
            if min_low < cur {
                reversal = true;
                cur = up_trend_high;
                down_trend_low = min_low;
                af = step;
            } else {
                if max_high > up_trend_high {
                    up_trend_high = max_high;
                    af = (af + step).min(max_step);
                }
                // SAR may never sit inside the prior two bars' range.
                if low[i - 2] < cur {
                    cur = low[i - 2];
                } else if low[i - 1] < cur {
                    cur = low[i - 1];
                }
            }
        } else {
            cur = prev - af * (prev - down_trend_low);
            if max_high > cur {
                reversal = true;
                cur = down_trend_low;
                up_trend_high = max_high;
                af = step;
            } else {
                if min_low < down_trend_low {
                    down_trend_low = min_low;
                    af = (af + step).min(max_step);
                }
                if high[i - 2] > cur {
                    cur = high[i - 2];
                } else if high[i - 1] > cur {
                    cur = high[i - 1];
                }
            }
        }

        up_trend = up_trend != reversal;
        out[i] = cur;
        prev = cur;
    }
    out
}
