//! Versioned allow-lists of persisted column names, one per derived table.
//!
//! The store filters every computed block through these lists before
//! inserting: a computed column that is not listed here is silently dropped
//! (with a log line), so adding a new indicator family to the engines never
//! breaks persistence. `symbol_id` and `date` are implicit key columns on
//! every table and are always kept.

/// Columns of the `technical_indicators` table, in DDL order.
// NOTE: This list controls both the generated CREATE TABLE statement and the
// insert-time column filter. Removing a name here stops persisting it without
// touching the engines; to stop computing a column entirely, change
// `engines_rs::indicators` instead.
pub const TECHNICAL_INDICATOR_COLUMNS: &[&str] = &[
    "rsi_7", "rsi_14", "rsi_30", "rsi_50",
    "sma_5", "sma_10", "sma_20", "sma_50", "sma_100", "sma_200",
    "ema_5", "ema_10", "ema_20", "ema_50", "ema_100", "ema_200",
    "macd_6_13_5", "macd_signal_6_13_5", "macd_hist_6_13_5",
    "macd_12_26_9", "macd_signal_12_26_9", "macd_hist_12_26_9",
    "macd_19_39_9", "macd_signal_19_39_9", "macd_hist_19_39_9",
    "bb_upper_10", "bb_middle_10", "bb_lower_10",
    "bb_upper_14", "bb_middle_14", "bb_lower_14",
    "bb_upper_20", "bb_middle_20", "bb_lower_20",
    "bb_upper_50", "bb_middle_50", "bb_lower_50",
    "stoch_k_7_3", "stoch_d_7_3",
    "stoch_k_10_3", "stoch_d_10_3",
    "stoch_k_14_3", "stoch_d_14_3",
    "stoch_k_21_3", "stoch_d_21_3",
    "stoch_k_30_3", "stoch_d_30_3",
    "cci_10", "cci_14", "cci_20", "cci_40",
    "atr_7", "atr_14", "atr_21", "atr_30",
    "obv_10", "obv_20", "obv_50",
    "ichimoku_conv_9", "ichimoku_base_26", "ichimoku_spanb_52",
    "ichimoku_conv_7", "ichimoku_base_22",
    "ichimoku_conv_12", "ichimoku_base_33",
    "donchian_high_10", "donchian_low_10",
    "donchian_high_20", "donchian_low_20",
    "donchian_high_50", "donchian_low_50",
    "adx_7", "adx_14", "adx_21", "adx_30",
    "psar_001_02", "psar_002_02", "psar_004_02",
    "close_lag_1", "close_lag_2", "close_lag_3", "close_lag_5", "close_lag_10", "close_lag_20",
    "high_lag_1", "high_lag_2", "high_lag_3", "high_lag_5", "high_lag_10", "high_lag_20",
    "low_lag_1", "low_lag_2", "low_lag_3", "low_lag_5", "low_lag_10", "low_lag_20",
    "open_lag_1", "open_lag_2", "open_lag_3", "open_lag_5", "open_lag_10", "open_lag_20",
    "volume_lag_1", "volume_lag_2", "volume_lag_3", "volume_lag_5", "volume_lag_10", "volume_lag_20",
];

/// Columns of the `technical_trade_signals` table, in DDL order.
pub const TRADE_SIGNAL_COLUMNS: &[&str] = &[
    "rsi_signal_7", "rsi_signal_14", "rsi_signal_30", "rsi_signal_50",
    "stoch_signal_7_3", "stoch_signal_10_3", "stoch_signal_14_3",
    "stoch_signal_21_3", "stoch_signal_30_3",
    "macd_cross_signal_6_13_5", "macd_cross_signal_12_26_9", "macd_cross_signal_19_39_9",
    "sma_cross_signal_5_20", "sma_cross_signal_10_50",
    "sma_cross_signal_20_100", "sma_cross_signal_50_200",
    "bb_signal_10", "bb_signal_14", "bb_signal_20", "bb_signal_50",
    "cci_signal_10", "cci_signal_14", "cci_signal_20", "cci_signal_40",
    "adx_signal_7", "adx_signal_14", "adx_signal_21", "adx_signal_30",
    "psar_signal_001_02", "psar_signal_002_02", "psar_signal_004_02",
    "donchian_signal_10", "donchian_signal_20", "donchian_signal_50",
];

/// Columns of the `outcomes` table, in DDL order.
pub const OUTCOME_COLUMNS: &[&str] = &[
    "price_d1", "price_d3", "price_d5", "price_d7", "price_d10", "price_d14",
    "price_d21", "price_d28", "price_d60", "price_d90", "price_d120",
    "returns_d1", "returns_d3", "returns_d5", "returns_d7", "returns_d10",
    "returns_d14", "returns_d21", "returns_d28", "returns_d60", "returns_d90",
    "returns_d120",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_unique(columns: &[&str]) {
        let unique: HashSet<&&str> = columns.iter().collect();
        assert_eq!(unique.len(), columns.len(), "duplicate column names");
    }

    #[test]
    fn allow_lists_have_no_duplicates() {
        assert_unique(TECHNICAL_INDICATOR_COLUMNS);
        assert_unique(TRADE_SIGNAL_COLUMNS);
        assert_unique(OUTCOME_COLUMNS);
    }

    #[test]
    fn key_columns_are_implicit() {
        for list in [
            TECHNICAL_INDICATOR_COLUMNS,
            TRADE_SIGNAL_COLUMNS,
            OUTCOME_COLUMNS,
        ] {
            assert!(!list.contains(&"symbol_id"));
            assert!(!list.contains(&"date"));
        }
    }

    #[test]
    fn raw_price_columns_are_not_persisted() {
        for col in ["open", "high", "low", "close", "adj_close", "volume", "obv"] {
            assert!(!TECHNICAL_INDICATOR_COLUMNS.contains(&col));
        }
    }
}
