// Hybrid Dispatcher - binds each indicator kind to one engine at startup
// Fast variants when available, fallback otherwise; never rebinds per call

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::{ConfigManager, EngineConfig};
use crate::core::error::{EngineError, EngineResult};
use crate::core::types::{EngineSource, IndicatorKind, IndicatorResult, MarketEvent, Trade};
use crate::dispatch::provider::{default_providers, fast_compiled, EngineProvider};
use crate::engines::IndicatorEngine;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatcherStatus {
    pub fast_available: bool,
    pub bound_engines: BTreeMap<IndicatorKind, EngineSource>,
    /// Kinds with no engine, with the collected reasons.
    pub unbound: BTreeMap<IndicatorKind, String>,
}

enum Binding {
    Bound(Arc<dyn IndicatorEngine>),
    Unbound(String),
}

// ============================================================================
// Builder
// ============================================================================

/// Providers are tried in priority order per kind; the first that succeeds wins.
pub struct DispatcherBuilder {
    config: EngineConfig,
    providers: BTreeMap<IndicatorKind, Vec<Box<dyn EngineProvider>>>,
}

impl DispatcherBuilder {
    /// Starts with the built-in fast and fallback providers.
    pub fn new(config: EngineConfig) -> Self {
        let mut builder = Self::empty(config);
        for provider in default_providers() {
            builder
                .providers
                .entry(provider.kind())
                .or_default()
                .push(provider);
        }
        builder
    }

    /// No providers at all. Every kind stays unbound unless one is registered.
    pub fn empty(config: EngineConfig) -> Self {
        Self {
            config,
            providers: BTreeMap::new(),
        }
    }

    /// Register a provider ahead of those already present for its kind.
    pub fn provider(mut self, provider: impl EngineProvider + 'static) -> Self {
        self.providers
            .entry(provider.kind())
            .or_default()
            .insert(0, Box::new(provider));
        self
    }

    pub fn without_providers(mut self, kind: IndicatorKind) -> Self {
        self.providers.remove(&kind);
        self
    }

    pub fn build(self) -> Dispatcher {
        let fast_available = fast_compiled() && self.config.dispatch.prefer_fast;
        let mut bindings = BTreeMap::new();

        for kind in IndicatorKind::ALL {
            let mut reasons = Vec::new();
            let mut bound = None;

            for provider in self.providers.get(&kind).into_iter().flatten() {
                match provider.create(&self.config) {
                    Ok(engine) => {
                        info!(kind = %kind, source = %engine.source(), "Engine bound");
                        bound = Some(engine);
                        break;
                    }
                    Err(unavailable) => {
                        if provider.source() == EngineSource::Fast {
                            warn!(kind = %kind, reason = %unavailable.reason(), "Fast engine unavailable");
                        }
                        reasons.push(format!("{}: {}", provider.source(), unavailable.reason()));
                    }
                }
            }

            let binding = match bound {
                Some(engine) => Binding::Bound(engine),
                None => {
                    let reason = if reasons.is_empty() {
                        "no provider registered".to_string()
                    } else {
                        reasons.join("; ")
                    };
                    warn!(kind = %kind, reason = %reason, "No engine bound");
                    Binding::Unbound(reason)
                }
            };
            bindings.insert(kind, binding);
        }

        Dispatcher {
            fast_available,
            bindings,
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Uniform call surface over the bound engines. Safe to share across threads.
pub struct Dispatcher {
    fast_available: bool,
    bindings: BTreeMap<IndicatorKind, Binding>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        DispatcherBuilder::new(config).build()
    }

    pub fn from_manager(manager: &ConfigManager) -> Self {
        Self::new(manager.config())
    }

    pub fn builder(config: EngineConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn get_status(&self) -> DispatcherStatus {
        let mut bound_engines = BTreeMap::new();
        let mut unbound = BTreeMap::new();
        for (kind, binding) in &self.bindings {
            match binding {
                Binding::Bound(engine) => {
                    bound_engines.insert(*kind, engine.source());
                }
                Binding::Unbound(reason) => {
                    unbound.insert(*kind, reason.clone());
                }
            }
        }
        DispatcherStatus {
            fast_available: self.fast_available,
            bound_engines,
            unbound,
        }
    }

    /// The engine bound to `kind`, or the configuration error for it.
    pub fn engine(&self, kind: IndicatorKind) -> EngineResult<&Arc<dyn IndicatorEngine>> {
        match self.bindings.get(&kind) {
            Some(Binding::Bound(engine)) => Ok(engine),
            Some(Binding::Unbound(reason)) => Err(EngineError::NotBound {
                kind,
                reason: reason.clone(),
            }),
            None => Err(EngineError::NotBound {
                kind,
                reason: "unknown kind".to_string(),
            }),
        }
    }

    pub fn calculate(&self, kind: IndicatorKind, event: &MarketEvent) -> EngineResult<IndicatorResult> {
        self.engine(kind)?.on_event(event)
    }

    pub fn calculate_batch(
        &self,
        kind: IndicatorKind,
        trades: &[Trade],
    ) -> EngineResult<Vec<EngineResult<IndicatorResult>>> {
        Ok(self.engine(kind)?.on_trade_batch(trades))
    }

    /// Fan one event out to every bound kind that consumes its event type.
    pub fn calculate_all(&self, event: &MarketEvent) -> Vec<(IndicatorKind, EngineResult<IndicatorResult>)> {
        self.bindings
            .iter()
            .filter(|(kind, _)| kind.accepts(event))
            .filter_map(|(kind, binding)| match binding {
                Binding::Bound(engine) => Some((*kind, engine.on_event(event))),
                Binding::Unbound(_) => None,
            })
            .collect()
    }

    /// Drop a symbol from every bound engine. Returns how many held it.
    pub fn reset_symbol(&self, symbol: &str) -> usize {
        self.bound()
            .filter(|engine| engine.reset_symbol(symbol))
            .count()
    }

    pub fn reset_all(&self) {
        for engine in self.bound() {
            engine.reset_all();
        }
    }

    fn bound(&self) -> impl Iterator<Item = &Arc<dyn IndicatorEngine>> + '_ {
        self.bindings.values().filter_map(|binding| match binding {
            Binding::Bound(engine) => Some(engine),
            Binding::Unbound(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Unavailable;
    use crate::core::types::{BookSnapshot, IndicatorValue, Level, Side};
    use crate::dispatch::provider::FallbackProvider;

    struct Broken;

    impl EngineProvider for Broken {
        fn kind(&self) -> IndicatorKind {
            IndicatorKind::Cvd
        }

        fn source(&self) -> EngineSource {
            EngineSource::Fast
        }

        fn create(&self, _config: &EngineConfig) -> Result<Arc<dyn IndicatorEngine>, Unavailable> {
            Err(Unavailable::new("device missing"))
        }
    }

    #[test]
    fn test_default_binding() {
        let dispatcher = Dispatcher::new(EngineConfig::default());
        let status = dispatcher.get_status();

        assert_eq!(status.bound_engines.len(), IndicatorKind::ALL.len());
        assert!(status.unbound.is_empty());
        let expected = if fast_compiled() { EngineSource::Fast } else { EngineSource::Fallback };
        assert_eq!(status.bound_engines[&IndicatorKind::Cvd], expected);
        assert_eq!(status.bound_engines[&IndicatorKind::Rsi], EngineSource::Fallback);
    }

    #[test]
    fn test_prefer_fast_off_binds_fallback() {
        let mut config = EngineConfig::default();
        config.dispatch.prefer_fast = false;
        let status = Dispatcher::new(config).get_status();

        assert!(!status.fast_available);
        assert!(status.bound_engines.values().all(|s| *s == EngineSource::Fallback));
    }

    #[test]
    fn test_unavailable_provider_falls_back() {
        let dispatcher = Dispatcher::builder(EngineConfig::default()).provider(Broken).build();
        assert_eq!(
            dispatcher.get_status().bound_engines[&IndicatorKind::Cvd],
            if fast_compiled() { EngineSource::Fast } else { EngineSource::Fallback }
        );

        let only_broken = DispatcherBuilder::empty(EngineConfig::default()).provider(Broken).build();
        let err = only_broken
            .calculate(
                IndicatorKind::Cvd,
                &MarketEvent::Trade(Trade::new(1, "BTCUSDT", 1.0, 1.0, Side::Buy)),
            )
            .unwrap_err();
        match err {
            EngineError::NotBound { kind, reason } => {
                assert_eq!(kind, IndicatorKind::Cvd);
                assert!(reason.contains("device missing"));
            }
            other => panic!("expected NotBound, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_kind_is_isolated() {
        let mut config = EngineConfig::default();
        config.dispatch.disabled = vec![IndicatorKind::Heatmap];
        let dispatcher = Dispatcher::new(config);

        let snapshot = MarketEvent::Snapshot(BookSnapshot::new(
            1,
            "BTCUSDT",
            vec![Level::new(100.0, 1.0)],
            vec![Level::new(101.0, 1.0)],
        ));
        assert!(matches!(
            dispatcher.calculate(IndicatorKind::Heatmap, &snapshot),
            Err(EngineError::NotBound { .. })
        ));
        assert!(dispatcher.calculate(IndicatorKind::Liquidity, &snapshot).is_ok());

        let fanned = dispatcher.calculate_all(&snapshot);
        assert_eq!(fanned.len(), 1);
        assert_eq!(fanned[0].0, IndicatorKind::Liquidity);
    }

    #[test]
    fn test_invalid_section_leaves_kind_unbound() {
        let mut config = EngineConfig::default();
        config.heatmap.bucket_ms = 0;
        config.cvd.session_ms = Some(0);
        let dispatcher = Dispatcher::new(config);
        let status = dispatcher.get_status();

        assert!(status.unbound[&IndicatorKind::Heatmap].contains("heatmap.bucket_ms"));
        assert!(status.unbound[&IndicatorKind::Cvd].contains("cvd.session_ms"));
        assert!(!status.bound_engines.contains_key(&IndicatorKind::Heatmap));

        let snapshot = MarketEvent::Snapshot(BookSnapshot::new(
            1,
            "BTCUSDT",
            vec![Level::new(100.0, 1.0)],
            vec![Level::new(101.0, 1.0)],
        ));
        assert!(matches!(
            dispatcher.calculate(IndicatorKind::Heatmap, &snapshot),
            Err(EngineError::NotBound { kind: IndicatorKind::Heatmap, .. })
        ));
        assert!(dispatcher.calculate(IndicatorKind::Liquidity, &snapshot).is_ok());

        let trade = MarketEvent::Trade(Trade::new(1, "BTCUSDT", 100.0, 1.0, Side::Buy));
        assert!(matches!(
            dispatcher.calculate(IndicatorKind::Cvd, &trade),
            Err(EngineError::NotBound { .. })
        ));
        assert!(dispatcher.calculate(IndicatorKind::Vwap, &trade).is_ok());
    }

    #[test]
    fn test_calculate_all_for_trade() {
        let dispatcher = Dispatcher::builder(EngineConfig::default())
            .without_providers(IndicatorKind::Adx)
            .provider(FallbackProvider::new(IndicatorKind::Adx))
            .build();
        let trade = MarketEvent::Trade(Trade::new(1, "BTCUSDT", 100.0, 2.0, Side::Buy));
        let results = dispatcher.calculate_all(&trade);

        let kinds: Vec<IndicatorKind> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                IndicatorKind::Cvd,
                IndicatorKind::Vwap,
                IndicatorKind::Rsi,
                IndicatorKind::Macd,
                IndicatorKind::Adx,
                IndicatorKind::Svp,
                IndicatorKind::VolumeProfile,
            ]
        );
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(dispatcher.reset_symbol("BTCUSDT"), kinds.len());
    }

    #[test]
    fn test_unsupported_event_routing() {
        let dispatcher = Dispatcher::new(EngineConfig::default());
        let snapshot = MarketEvent::Snapshot(BookSnapshot::new(1, "BTCUSDT", vec![], vec![]));
        assert!(matches!(
            dispatcher.calculate(IndicatorKind::Cvd, &snapshot),
            Err(EngineError::UnsupportedEvent { .. })
        ));
    }

    #[test]
    fn test_batch_routes_to_bound_engine() {
        let dispatcher = Dispatcher::new(EngineConfig::default());
        let trades = vec![
            Trade::new(1, "BTCUSDT", 100.0, 100.0, Side::Buy),
            Trade::new(2, "BTCUSDT", 100.0, 40.0, Side::Sell),
        ];
        let results = dispatcher.calculate_batch(IndicatorKind::Cvd, &trades).unwrap();
        match &results[1].as_ref().unwrap().value {
            IndicatorValue::Cvd(r) => assert_eq!(r.cvd, 60.0),
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
