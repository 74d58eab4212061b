use chrono::NaiveDate;

use engines_rs::{generate_indicators, generate_signals};
use signalforge_rs::config::EngineParams;
use signalforge_rs::data::PriceBar;

fn rising_bars(symbol: &str, days: usize, start_close: f64, daily_gain: f64) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    (0..days)
        .map(|i| {
            let close = start_close * (1.0 + daily_gain).powi(i as i32);
            PriceBar {
                symbol_id: 1,
                symbol: symbol.to_string(),
                date: start + chrono::Days::new(i as u64),
                open: close * 0.995,
                high: close * 1.005,
                low: close * 0.99,
                close,
                adj_close: close,
                volume: 50_000,
            }
        })
        .collect()
}

#[test]
fn sixty_days_of_one_percent_gains_saturate_rsi_and_flag_overbought() {
    let params = EngineParams::default();
    let bars = rising_bars("TEST", 60, 100.0, 0.01);

    let indicators = generate_indicators(bars, &params);
    assert!(indicators.failures.is_empty());
    assert_eq!(indicators.blocks.len(), 1);

    let block = &indicators.blocks[0];
    let rsi_14 = block.column("rsi_14").unwrap();
    let last = *rsi_14.last().unwrap();
    assert!(
        (last - 100.0).abs() <= 1e-9,
        "monotonic rise should saturate rsi_14 at 100, got {last}"
    );

    let signals = generate_signals(&indicators.blocks, &params);
    let signal_block = &signals.blocks[0];
    let rsi_signal = signal_block.column("rsi_signal_14").unwrap();
    assert_eq!(*rsi_signal.last().unwrap(), -1, "rsi above 70 is overbought");
}

#[test]
fn signal_rows_align_one_to_one_with_indicator_rows() {
    let params = EngineParams::default();
    let bars = rising_bars("TEST", 60, 100.0, 0.01);

    let indicators = generate_indicators(bars, &params);
    let signals = generate_signals(&indicators.blocks, &params);

    let block = &signals.blocks[0];
    assert_eq!(block.dates, indicators.blocks[0].dates);
    for (name, column) in &block.columns {
        assert_eq!(column.len(), block.dates.len(), "ragged column {name}");
        assert!(
            column.iter().all(|v| (-1..=1).contains(v)),
            "{name} outside the signal alphabet"
        );
    }
}
