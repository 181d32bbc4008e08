// flow_indicators - market-microstructure indicator engines
// CVD, VWAP, liquidity and heatmap on the hot path; RSI, MACD, ADX and
// volume profiles on the research path; one dispatcher in front of both

pub mod core;
pub mod dispatch;
pub mod engines;
pub mod research;
pub mod state;
pub mod wire;

pub use crate::core::{
    BookSide, BookSnapshot, Candle, ConfigError, ConfigManager, EngineConfig, EngineError,
    EngineResult, EngineSource, IndicatorKind, IndicatorResult, IndicatorValue, Level,
    MarketEvent, Side, Trade, Unavailable, ValidationError,
};
pub use crate::dispatch::{Dispatcher, DispatcherBuilder, DispatcherStatus, EngineProvider};
pub use crate::engines::IndicatorEngine;
