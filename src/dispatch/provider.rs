// Engine Providers - construct one engine variant or report why it cannot run

use std::sync::Arc;

use crate::core::config::EngineConfig;
use crate::core::error::Unavailable;
use crate::core::types::{EngineSource, IndicatorKind};
use crate::engines::{CvdEngine, HeatmapEngine, IndicatorEngine, LiquidityEngine, VwapEngine};
use crate::research::{ProfileEngine, SeriesEngine};

/// Asked once per kind when a dispatcher is built.
pub trait EngineProvider: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    fn source(&self) -> EngineSource;

    fn create(&self, config: &EngineConfig) -> Result<Arc<dyn IndicatorEngine>, Unavailable>;
}

/// Whether the sharded variants were compiled in.
pub fn fast_compiled() -> bool {
    cfg!(feature = "fast")
}

/// Disabled kinds and kinds with an invalid config section never build.
fn check_enabled(kind: IndicatorKind, config: &EngineConfig) -> Result<(), Unavailable> {
    if config.dispatch.disabled.contains(&kind) {
        return Err(Unavailable::new(format!("{} listed in dispatch.disabled", kind)));
    }
    config
        .validate_kind(kind)
        .map_err(|e| Unavailable::new(format!("invalid config: {}", e)))
}

#[derive(Debug, Clone, Copy)]
pub struct FastProvider {
    kind: IndicatorKind,
}

impl FastProvider {
    pub fn new(kind: IndicatorKind) -> Self {
        Self { kind }
    }
}

impl EngineProvider for FastProvider {
    fn kind(&self) -> IndicatorKind {
        self.kind
    }

    fn source(&self) -> EngineSource {
        EngineSource::Fast
    }

    fn create(&self, config: &EngineConfig) -> Result<Arc<dyn IndicatorEngine>, Unavailable> {
        check_enabled(self.kind, config)?;
        if !fast_compiled() {
            return Err(Unavailable::new("built without the `fast` feature"));
        }
        if !config.dispatch.prefer_fast {
            return Err(Unavailable::new("dispatch.prefer_fast = false"));
        }

        let max_symbols = config.state.max_symbols;
        let engine: Arc<dyn IndicatorEngine> = match self.kind {
            IndicatorKind::Cvd => Arc::new(CvdEngine::fast(config.cvd.clone(), max_symbols)),
            IndicatorKind::Vwap => Arc::new(VwapEngine::fast(config.vwap.clone(), max_symbols)),
            IndicatorKind::Liquidity => {
                Arc::new(LiquidityEngine::fast(config.liquidity.clone(), max_symbols))
            }
            IndicatorKind::Heatmap => {
                Arc::new(HeatmapEngine::fast(config.heatmap.clone(), max_symbols))
            }
            other => {
                return Err(Unavailable::new(format!("no fast variant for {}", other)));
            }
        };
        Ok(engine)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackProvider {
    kind: IndicatorKind,
}

impl FallbackProvider {
    pub fn new(kind: IndicatorKind) -> Self {
        Self { kind }
    }
}

impl EngineProvider for FallbackProvider {
    fn kind(&self) -> IndicatorKind {
        self.kind
    }

    fn source(&self) -> EngineSource {
        EngineSource::Fallback
    }

    fn create(&self, config: &EngineConfig) -> Result<Arc<dyn IndicatorEngine>, Unavailable> {
        check_enabled(self.kind, config)?;

        let max_symbols = config.state.max_symbols;
        let engine: Arc<dyn IndicatorEngine> = match self.kind {
            IndicatorKind::Cvd => Arc::new(CvdEngine::fallback(config.cvd.clone(), max_symbols)),
            IndicatorKind::Vwap => Arc::new(VwapEngine::fallback(config.vwap.clone(), max_symbols)),
            IndicatorKind::Liquidity => {
                Arc::new(LiquidityEngine::fallback(config.liquidity.clone(), max_symbols))
            }
            IndicatorKind::Heatmap => {
                Arc::new(HeatmapEngine::fallback(config.heatmap.clone(), max_symbols))
            }
            IndicatorKind::Rsi => Arc::new(SeriesEngine::rsi(&config.rsi, max_symbols)),
            IndicatorKind::Macd => Arc::new(SeriesEngine::macd(&config.macd, max_symbols)),
            IndicatorKind::Adx => Arc::new(SeriesEngine::adx(&config.adx, max_symbols)),
            IndicatorKind::Svp => Arc::new(ProfileEngine::svp(config.svp.clone(), max_symbols)),
            IndicatorKind::VolumeProfile => Arc::new(ProfileEngine::volume_profile(
                config.volume_profile.clone(),
                max_symbols,
            )),
        };
        Ok(engine)
    }
}

/// Fast first, then fallback, for every kind.
pub fn default_providers() -> Vec<Box<dyn EngineProvider>> {
    IndicatorKind::ALL
        .iter()
        .flat_map(|&kind| {
            [
                Box::new(FastProvider::new(kind)) as Box<dyn EngineProvider>,
                Box::new(FallbackProvider::new(kind)),
            ]
        })
        .collect()
}
