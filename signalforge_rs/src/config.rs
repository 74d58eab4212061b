use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Run-level settings for a pipeline invocation. Constructed by the CLI and
/// passed explicitly into the pipeline runners; nothing is read from a global
/// config file at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the DuckDB database file holding prices and derived tables.
    pub db_path: PathBuf,
    /// When true, restrict the indicator/outcome runs to the recent price
    /// window instead of the full history.
    #[serde(default)]
    pub update_mode: bool,
    /// Trailing calendar window (in days) used by update-mode fetches.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Number of rows per insert transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of worker threads for per-symbol fan-out (0 = all logical cores).
    #[serde(default)]
    pub n_workers: usize,
    /// Reduce log noise (suppresses per-symbol progress events).
    #[serde(default)]
    pub quiet: bool,
    #[serde(default)]
    pub engine: EngineParams,
}

impl Config {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            update_mode: false,
            lookback_days: default_lookback_days(),
            batch_size: default_batch_size(),
            n_workers: 0,
            quiet: false,
            engine: EngineParams::default(),
        }
    }
}

const fn default_lookback_days() -> u32 {
    100
}

const fn default_batch_size() -> usize {
    100
}

/// MACD parameterization: fast EMA window, slow EMA window, signal EMA window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// Ichimoku parameterization: conversion, base, and span-B windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IchimokuParams {
    pub conversion: usize,
    pub base: usize,
    pub span_b: usize,
}

/// Parabolic SAR parameterization: acceleration step and its ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PsarParams {
    pub step: f64,
    pub max_step: f64,
}

impl PsarParams {
    /// Column suffix used for this configuration, e.g. (0.01, 0.2) -> "001_02".
    pub fn suffix(&self) -> String {
        format!("{}_{}", fraction_token(self.step), fraction_token(self.max_step))
    }
}

// 0.01 -> "001", 0.2 -> "02". Matches the persisted column naming, which
// strips the "0." prefix and keeps the remaining digits.
fn fraction_token(value: f64) -> String {
    let formatted = format!("{value}");
    formatted.replace("0.", "0")
}

/// Window sets and parameter tuples for every indicator/signal family. The
/// defaults are the canonical production configuration; callers may narrow
/// them for tests or experiments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParams {
    #[serde(default = "default_rsi_windows")]
    pub rsi_windows: Vec<usize>,
    #[serde(default = "default_ma_windows")]
    pub sma_windows: Vec<usize>,
    #[serde(default = "default_ma_windows")]
    pub ema_windows: Vec<usize>,
    #[serde(default = "default_macd_configs")]
    pub macd_configs: Vec<MacdParams>,
    #[serde(default = "default_bollinger_windows")]
    pub bollinger_windows: Vec<usize>,
    #[serde(default = "default_stochastic_windows")]
    pub stochastic_windows: Vec<usize>,
    #[serde(default = "default_stochastic_smoothing")]
    pub stochastic_smoothing: usize,
    #[serde(default = "default_cci_windows")]
    pub cci_windows: Vec<usize>,
    #[serde(default = "default_atr_windows")]
    pub atr_windows: Vec<usize>,
    #[serde(default = "default_obv_windows")]
    pub obv_windows: Vec<usize>,
    #[serde(default = "default_ichimoku_configs")]
    pub ichimoku_configs: Vec<IchimokuParams>,
    #[serde(default = "default_donchian_windows")]
    pub donchian_windows: Vec<usize>,
    #[serde(default = "default_adx_windows")]
    pub adx_windows: Vec<usize>,
    #[serde(default = "default_psar_configs")]
    pub psar_configs: Vec<PsarParams>,
    #[serde(default = "default_lags")]
    pub lags: Vec<usize>,
    /// SMA pairs (short, long) checked for golden/death crosses.
    #[serde(default = "default_sma_cross_pairs")]
    pub sma_cross_pairs: Vec<(usize, usize)>,
    /// Forward horizons (in bars) for outcome labels.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            rsi_windows: default_rsi_windows(),
            sma_windows: default_ma_windows(),
            ema_windows: default_ma_windows(),
            macd_configs: default_macd_configs(),
            bollinger_windows: default_bollinger_windows(),
            stochastic_windows: default_stochastic_windows(),
            stochastic_smoothing: default_stochastic_smoothing(),
            cci_windows: default_cci_windows(),
            atr_windows: default_atr_windows(),
            obv_windows: default_obv_windows(),
            ichimoku_configs: default_ichimoku_configs(),
            donchian_windows: default_donchian_windows(),
            adx_windows: default_adx_windows(),
            psar_configs: default_psar_configs(),
            lags: default_lags(),
            sma_cross_pairs: default_sma_cross_pairs(),
            horizons: default_horizons(),
        }
    }
}

fn default_rsi_windows() -> Vec<usize> {
    vec![7, 14, 30, 50]
}

fn default_ma_windows() -> Vec<usize> {
    vec![5, 10, 20, 50, 100, 200]
}

fn default_macd_configs() -> Vec<MacdParams> {
    vec![
        MacdParams { fast: 6, slow: 13, signal: 5 },
        MacdParams { fast: 12, slow: 26, signal: 9 },
        MacdParams { fast: 19, slow: 39, signal: 9 },
    ]
}

fn default_bollinger_windows() -> Vec<usize> {
    vec![10, 14, 20, 50]
}

fn default_stochastic_windows() -> Vec<usize> {
    vec![7, 10, 14, 21, 30]
}

const fn default_stochastic_smoothing() -> usize {
    3
}

fn default_cci_windows() -> Vec<usize> {
    vec![10, 14, 20, 40]
}

fn default_atr_windows() -> Vec<usize> {
    vec![7, 14, 21, 30]
}

fn default_obv_windows() -> Vec<usize> {
    vec![10, 20, 50]
}

fn default_ichimoku_configs() -> Vec<IchimokuParams> {
    vec![
        IchimokuParams { conversion: 9, base: 26, span_b: 52 },
        IchimokuParams { conversion: 7, base: 22, span_b: 52 },
        IchimokuParams { conversion: 12, base: 33, span_b: 52 },
    ]
}

fn default_donchian_windows() -> Vec<usize> {
    vec![10, 20, 50]
}

fn default_adx_windows() -> Vec<usize> {
    vec![7, 14, 21, 30]
}

fn default_psar_configs() -> Vec<PsarParams> {
    vec![
        PsarParams { step: 0.01, max_step: 0.2 },
        PsarParams { step: 0.02, max_step: 0.2 },
        PsarParams { step: 0.04, max_step: 0.2 },
    ]
}

fn default_lags() -> Vec<usize> {
    vec![1, 2, 3, 5, 10, 20]
}

fn default_sma_cross_pairs() -> Vec<(usize, usize)> {
    vec![(5, 20), (10, 50), (20, 100), (50, 200)]
}

fn default_horizons() -> Vec<usize> {
    vec![1, 3, 5, 7, 10, 14, 21, 28, 60, 90, 120]
}
