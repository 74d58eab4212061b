pub mod config;
pub mod data;
pub mod schema;
pub mod storage;

pub use config::{Config, EngineParams, IchimokuParams, MacdParams, PsarParams};
pub use data::{
    BatchOutput, DataValidationError, FeatureBlock, PriceBar, SignalBlock, SymbolFailure,
    SymbolSeries,
};
pub use storage::MarketStore;
