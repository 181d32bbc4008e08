// Core Module - Foundational types, errors, config, logging
// Everything the engines and dispatcher share

pub mod config;
pub mod error;
pub mod logger;
pub mod types;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{
    AdxConfig, BarPriceMode, ConfigError, ConfigManager, ConfigSummary, CvdConfig, DispatchConfig, EngineConfig,
    HeatmapConfig, LiquidityConfig, MacdConfig, MonitoringConfig, ProfileConfig, RsiConfig,
    StateConfig, VwapConfig,
};
pub use error::{EngineError, EngineResult, Unavailable, ValidationError};
pub use logger::setup_logging;
pub use types::*;
