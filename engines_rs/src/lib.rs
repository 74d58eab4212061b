pub mod indicators;
pub mod outcomes;
pub mod signals;

pub use indicators::{compute_symbol_indicators, generate_indicators};
pub use outcomes::{compute_symbol_outcomes, generate_outcomes};
pub use signals::{compute_symbol_signals, generate_signals};
