// Configuration Management for the indicator engines
// One serde section per engine plus state, dispatch and monitoring

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::types::IndicatorKind;

pub const ENV_PREFER_FAST: &str = "INDICATORS_PREFER_FAST";
pub const ENV_LOG_LEVEL: &str = "INDICATORS_LOG_LEVEL";

pub const DAY_MS: i64 = 86_400_000;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvdConfig {
    pub window_ms: i64,
    pub window_capacity: usize,
    /// Reset accumulators when `ts / session_ms` changes. Off when `None`.
    pub session_ms: Option<i64>,
}

impl Default for CvdConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            window_capacity: 10_000,
            session_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VwapConfig {
    pub session_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Sum only the top N levels per side. All levels when `None`.
    pub depth_levels: Option<usize>,
    pub top_k_imbalance: usize,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            depth_levels: None,
            top_k_imbalance: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub bucket_width: f64,
    pub bucket_ms: i64,
    pub significance_threshold: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            bucket_width: 0.01,
            bucket_ms: 1000,
            significance_threshold: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiConfig {
    pub period: usize,
    /// Candle interval for trade aggregation. Tick mode when `None`.
    pub bar_ms: Option<i64>,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: 14,
            bar_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub bar_ms: Option<i64>,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            bar_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdxConfig {
    pub period: usize,
    pub bar_ms: Option<i64>,
}

impl Default for AdxConfig {
    fn default() -> Self {
        Self {
            period: 14,
            bar_ms: None,
        }
    }
}

/// Price a candle's volume is booked at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarPriceMode {
    Close,
    /// (high + low + close) / 3
    #[default]
    Typical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub price_step: f64,
    /// Histogram resets when the session changes. Continuous profile when `None`.
    pub session_ms: Option<i64>,
    pub value_area_pct: f64,
    /// Levels reported in `top`. 0 reports every bin.
    pub top_n: usize,
    pub bar_mode: BarPriceMode,
}

impl ProfileConfig {
    pub fn session() -> Self {
        Self {
            session_ms: Some(DAY_MS),
            ..Self::default()
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            price_step: 0.01,
            session_ms: None,
            value_area_pct: 0.70,
            top_n: 10,
            bar_mode: BarPriceMode::Typical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Per-engine symbol capacity before least-recently-touched eviction.
    pub max_symbols: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { max_symbols: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub prefer_fast: bool,
    /// Kinds that must stay unbound.
    pub disabled: Vec<IndicatorKind>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prefer_fast: true,
            disabled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_format: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json_format: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cvd: CvdConfig,
    pub vwap: VwapConfig,
    pub liquidity: LiquidityConfig,
    pub heatmap: HeatmapConfig,
    pub rsi: RsiConfig,
    pub macd: MacdConfig,
    pub adx: AdxConfig,
    pub svp: ProfileConfig,
    pub volume_profile: ProfileConfig,
    pub state: StateConfig,
    pub dispatch: DispatchConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cvd: CvdConfig::default(),
            vwap: VwapConfig::default(),
            liquidity: LiquidityConfig::default(),
            heatmap: HeatmapConfig::default(),
            rsi: RsiConfig::default(),
            macd: MacdConfig::default(),
            adx: AdxConfig::default(),
            svp: ProfileConfig::session(),
            volume_profile: ProfileConfig::default(),
            state: StateConfig::default(),
            dispatch: DispatchConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

fn check_session(errors: &mut Vec<String>, name: &str, session_ms: Option<i64>) {
    if matches!(session_ms, Some(ms) if ms <= 0) {
        errors.push(format!("{}.session_ms must be > 0 when set", name));
    }
}

fn check_bar(errors: &mut Vec<String>, name: &str, bar_ms: Option<i64>) {
    if matches!(bar_ms, Some(ms) if ms <= 0) {
        errors.push(format!("{}.bar_ms must be > 0 when set", name));
    }
}

fn check_profile(errors: &mut Vec<String>, name: &str, profile: &ProfileConfig) {
    if !(profile.price_step.is_finite() && profile.price_step > 0.0) {
        errors.push(format!("{}.price_step must be finite and > 0", name));
    }
    if !(profile.value_area_pct > 0.0 && profile.value_area_pct <= 1.0) {
        errors.push(format!("{}.value_area_pct must be within (0, 1]", name));
    }
    check_session(errors, name, profile.session_ms);
}

impl EngineConfig {
    /// Problems in the section `kind` is built from.
    pub fn kind_errors(&self, kind: IndicatorKind) -> Vec<String> {
        let mut errors = Vec::new();

        match kind {
            IndicatorKind::Cvd => {
                if self.cvd.window_ms <= 0 {
                    errors.push("cvd.window_ms must be > 0".to_string());
                }
                if self.cvd.window_capacity == 0 {
                    errors.push("cvd.window_capacity must be > 0".to_string());
                }
                check_session(&mut errors, "cvd", self.cvd.session_ms);
            }
            IndicatorKind::Vwap => check_session(&mut errors, "vwap", self.vwap.session_ms),
            IndicatorKind::Liquidity => {
                if self.liquidity.depth_levels == Some(0) {
                    errors.push("liquidity.depth_levels must be > 0 when set".to_string());
                }
                if self.liquidity.top_k_imbalance == 0 {
                    errors.push("liquidity.top_k_imbalance must be > 0".to_string());
                }
            }
            IndicatorKind::Heatmap => {
                if !(self.heatmap.bucket_width.is_finite() && self.heatmap.bucket_width > 0.0) {
                    errors.push("heatmap.bucket_width must be finite and > 0".to_string());
                }
                if self.heatmap.bucket_ms <= 0 {
                    errors.push("heatmap.bucket_ms must be > 0".to_string());
                }
                if !(0.0..=1.0).contains(&self.heatmap.significance_threshold) {
                    errors.push("heatmap.significance_threshold must be within [0, 1]".to_string());
                }
            }
            IndicatorKind::Rsi => {
                if self.rsi.period == 0 {
                    errors.push("rsi.period must be > 0".to_string());
                }
                check_bar(&mut errors, "rsi", self.rsi.bar_ms);
            }
            IndicatorKind::Macd => {
                if self.macd.fast == 0 || self.macd.slow == 0 || self.macd.signal == 0 {
                    errors.push("macd periods must be > 0".to_string());
                }
                if self.macd.fast >= self.macd.slow {
                    errors.push("macd.fast must be < macd.slow".to_string());
                }
                check_bar(&mut errors, "macd", self.macd.bar_ms);
            }
            IndicatorKind::Adx => {
                if self.adx.period == 0 {
                    errors.push("adx.period must be > 0".to_string());
                }
                check_bar(&mut errors, "adx", self.adx.bar_ms);
            }
            IndicatorKind::Svp => check_profile(&mut errors, "svp", &self.svp),
            IndicatorKind::VolumeProfile => {
                check_profile(&mut errors, "volume_profile", &self.volume_profile)
            }
        }

        errors
    }

    /// Validate only what `kind` depends on. Used when binding engines so one bad
    /// section leaves the other kinds usable.
    pub fn validate_kind(&self, kind: IndicatorKind) -> Result<(), ConfigError> {
        let errors = self.kind_errors(kind);
        if errors.is_empty() {
            return Ok(());
        }
        Err(ConfigError::Validation(errors.join("; ")))
    }

    /// Collects every problem instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = IndicatorKind::ALL
            .iter()
            .flat_map(|&kind| self.kind_errors(kind))
            .collect();
        if self.state.max_symbols == 0 {
            errors.push("state.max_symbols must be > 0".to_string());
        }

        if errors.is_empty() {
            return Ok(());
        }
        for error in &errors {
            warn!(error = %error, "Config validation error");
        }
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

// ============================================================================
// Configuration Summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub prefer_fast: bool,
    pub disabled: Vec<IndicatorKind>,
    pub max_symbols: usize,
    pub cvd_window_ms: i64,
    pub heatmap_bucket_width: f64,
    pub log_level: String,
}

// ============================================================================
// Configuration Manager
// ============================================================================

pub struct ConfigManager {
    config: Arc<RwLock<EngineConfig>>,
}

impl ConfigManager {
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut manager = Self {
            config: Arc::new(RwLock::new(EngineConfig::default())),
        };

        if let Some(path) = config_path {
            manager.load_from_file(path)?;
        }

        manager.load_from_env();
        manager.validate()?;

        info!("Configuration initialized");
        Ok(manager)
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Load configuration sections from a JSON file. Unknown sections are ignored,
    /// missing ones keep their defaults.
    pub fn load_from_file(&mut self, config_path: &str) -> Result<(), ConfigError> {
        let path = Path::new(config_path);
        if !path.exists() {
            warn!(path = config_path, "Config file not found");
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        let sections: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        let mut config = self.config.write();
        for (name, value) in sections {
            match name.as_str() {
                "cvd" => config.cvd = serde_json::from_value(value)?,
                "vwap" => config.vwap = serde_json::from_value(value)?,
                "liquidity" => config.liquidity = serde_json::from_value(value)?,
                "heatmap" => config.heatmap = serde_json::from_value(value)?,
                "rsi" => config.rsi = serde_json::from_value(value)?,
                "macd" => config.macd = serde_json::from_value(value)?,
                "adx" => config.adx = serde_json::from_value(value)?,
                "svp" => config.svp = serde_json::from_value(value)?,
                "volume_profile" => config.volume_profile = serde_json::from_value(value)?,
                "state" => config.state = serde_json::from_value(value)?,
                "dispatch" => config.dispatch = serde_json::from_value(value)?,
                "monitoring" => config.monitoring = serde_json::from_value(value)?,
                other => warn!(section = other, "Unknown config section ignored"),
            }
        }

        info!(path = config_path, "Configuration loaded");
        Ok(())
    }

    /// Overlay environment overrides.
    pub fn load_from_env(&mut self) {
        if let Ok(prefer_fast) = std::env::var(ENV_PREFER_FAST) {
            let value = matches!(prefer_fast.trim().to_lowercase().as_str(), "1" | "true" | "yes");
            self.config.write().dispatch.prefer_fast = value;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.config.write().monitoring.log_level = level.trim().to_uppercase();
            }
        }
    }

    pub fn save_to_file(&self, config_path: &str) -> Result<(), ConfigError> {
        if let Some(parent) = Path::new(config_path).parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*self.config.read())?;
        fs::write(config_path, json)?;

        info!(path = config_path, "Configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.read().validate()?;
        info!("Configuration validated successfully");
        Ok(())
    }

    pub fn get_summary(&self) -> ConfigSummary {
        let config = self.config.read();
        ConfigSummary {
            prefer_fast: config.dispatch.prefer_fast,
            disabled: config.dispatch.disabled.clone(),
            max_symbols: config.state.max_symbols,
            cvd_window_ms: config.cvd.window_ms,
            heatmap_bucket_width: config.heatmap.bucket_width,
            log_level: config.monitoring.log_level.clone(),
        }
    }

    /// Snapshot of the whole tree.
    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    pub fn dispatch(&self) -> DispatchConfig {
        self.config.read().dispatch.clone()
    }

    pub fn monitoring(&self) -> MonitoringConfig {
        self.config.read().monitoring.clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut EngineConfig)) {
        f(&mut self.config.write());
    }
}
