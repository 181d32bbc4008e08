// CVD Engine - Cumulative Volume Delta per symbol
// Running signed-volume total plus a rolling time-window delta

use tracing::debug;

use crate::core::config::CvdConfig;
use crate::core::error::EngineResult;
use crate::core::types::{
    CvdResult, EngineSource, IndicatorKind, IndicatorResult, IndicatorValue, Trade,
};
use crate::core::utils::session_of;
use crate::engines::{apply_in_runs, apply_one, IndicatorEngine};
use crate::state::{LockedStore, ShardedStore, SymbolStore, TimeWindow};

/// Accumulated delta for one symbol
#[derive(Debug, Clone)]
pub struct CvdState {
    cvd: f64,                 // Σ(signed size) since creation or last session roll
    window: TimeWindow<f64>,  // (ts, signed size)
    session: Option<i64>,
}

impl CvdState {
    fn new(config: &CvdConfig) -> Self {
        Self {
            cvd: 0.0,
            window: TimeWindow::new(config.window_ms, config.window_capacity),
            session: None,
        }
    }

    pub fn cvd(&self) -> f64 {
        self.cvd
    }

    fn roll_session(&mut self, trade: &Trade, session_ms: Option<i64>) {
        let Some(session_ms) = session_ms else {
            return;
        };
        let session = session_of(trade.ts, session_ms);
        match self.session {
            Some(current) if session > current => {
                debug!(symbol = %trade.symbol, from = current, to = session, "CVD session rolled");
                self.cvd = 0.0;
                self.window.clear();
                self.session = Some(session);
            }
            Some(_) => {}
            None => self.session = Some(session),
        }
    }

    fn apply(&mut self, trade: &Trade, session_ms: Option<i64>) -> CvdResult {
        self.roll_session(trade, session_ms);

        let delta = trade.signed_size();
        self.cvd += delta;
        self.window.push(trade.ts, delta);
        self.window.prune(trade.ts);

        CvdResult {
            cvd: self.cvd,
            windowed_cvd: self.window.sum(),
            window_trades: self.window.len(),
            last_side: trade.side,
            last_size: trade.size,
        }
    }
}

/// CVD engine generic over its state store.
///
/// `source` decides the batch strategy: fast engines lock each symbol once per
/// run of consecutive trades, fallback engines lock per trade. Results are the
/// same either way.
pub struct CvdEngine<St> {
    config: CvdConfig,
    source: EngineSource,
    store: St,
}

impl CvdEngine<ShardedStore<CvdState>> {
    pub fn fast(config: CvdConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fast, ShardedStore::new("cvd", max_symbols))
    }
}

impl CvdEngine<LockedStore<CvdState>> {
    pub fn fallback(config: CvdConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fallback, LockedStore::new("cvd", max_symbols))
    }
}

impl<St: SymbolStore<CvdState>> CvdEngine<St> {
    pub fn with_store(config: CvdConfig, source: EngineSource, store: St) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    pub fn update(&self, trade: &Trade) -> EngineResult<CvdResult> {
        let session_ms = self.config.session_ms;
        apply_one(
            IndicatorKind::Cvd,
            &self.store,
            trade,
            || CvdState::new(&self.config),
            |state, t| state.apply(t, session_ms),
        )
    }

    pub fn update_batch(&self, trades: &[Trade]) -> Vec<EngineResult<CvdResult>> {
        match self.source {
            EngineSource::Fast => {
                let session_ms = self.config.session_ms;
                apply_in_runs(
                    IndicatorKind::Cvd,
                    &self.store,
                    trades,
                    || CvdState::new(&self.config),
                    |state, t| state.apply(t, session_ms),
                )
            }
            EngineSource::Fallback => trades.iter().map(|t| self.update(t)).collect(),
        }
    }

    /// Current cumulative delta, `None` for an unseen symbol.
    pub fn get_cvd(&self, symbol: &str) -> Option<f64> {
        self.store.read(symbol, CvdState::cvd)
    }

    fn wrap(&self, trade: &Trade, result: CvdResult) -> IndicatorResult {
        IndicatorResult::new(
            IndicatorKind::Cvd,
            self.source,
            trade.symbol.clone(),
            trade.ts,
            IndicatorValue::Cvd(result),
        )
    }
}

impl<St: SymbolStore<CvdState>> IndicatorEngine for CvdEngine<St> {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Cvd
    }

    fn source(&self) -> EngineSource {
        self.source
    }

    fn on_trade(&self, trade: &Trade) -> EngineResult<IndicatorResult> {
        self.update(trade).map(|r| self.wrap(trade, r))
    }

    fn on_trade_batch(&self, trades: &[Trade]) -> Vec<EngineResult<IndicatorResult>> {
        self.update_batch(trades)
            .into_iter()
            .zip(trades)
            .map(|(result, trade)| result.map(|r| self.wrap(trade, r)))
            .collect()
    }

    fn symbol_count(&self) -> usize {
        self.store.len()
    }

    fn reset_symbol(&self, symbol: &str) -> bool {
        self.store.remove(symbol)
    }

    fn reset_all(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use crate::core::types::Side;

    fn buy(ts: i64, size: f64) -> Trade {
        Trade::new(ts, "BTCUSDT", 50_000.0, size, Side::Buy)
    }

    fn sell(ts: i64, size: f64) -> Trade {
        Trade::new(ts, "BTCUSDT", 50_000.0, size, Side::Sell)
    }

    #[test]
    fn test_buy_then_sell() {
        let engine = CvdEngine::fast(CvdConfig::default(), 100);
        engine.update(&buy(1, 100.0)).unwrap();
        let result = engine.update(&sell(2, 40.0)).unwrap();

        assert_eq!(result.cvd, 60.0);
        assert_eq!(result.windowed_cvd, 60.0);
        assert_eq!(result.last_side, Side::Sell);
        assert_eq!(result.last_size, 40.0);
        assert_eq!(engine.get_cvd("BTCUSDT"), Some(60.0));
    }

    #[test]
    fn test_window_evicts_old_deltas() {
        let config = CvdConfig {
            window_ms: 1000,
            ..CvdConfig::default()
        };
        let engine = CvdEngine::fallback(config, 100);
        engine.update(&buy(0, 5.0)).unwrap();
        engine.update(&buy(500, 3.0)).unwrap();
        let result = engine.update(&sell(1400, 1.0)).unwrap();

        assert_eq!(result.cvd, 7.0);
        assert_eq!(result.windowed_cvd, 2.0);
        assert_eq!(result.window_trades, 2);
    }

    #[test]
    fn test_rejected_trade_leaves_state() {
        let engine = CvdEngine::fallback(CvdConfig::default(), 100);
        engine.update(&buy(1, 10.0)).unwrap();

        let err = engine.update(&buy(2, -5.0)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(engine.get_cvd("BTCUSDT"), Some(10.0));
    }

    #[test]
    fn test_batch_matches_sequential() {
        let trades = vec![
            buy(1, 1.5),
            sell(2, 0.25),
            Trade::new(3, "ETHUSDT", 3000.0, 2.0, Side::Sell),
            buy(4, f64::NAN),
            buy(5, 7.0),
        ];

        let fast = CvdEngine::fast(CvdConfig::default(), 100);
        let fallback = CvdEngine::fallback(CvdConfig::default(), 100);
        let sequential: Vec<_> = trades.iter().map(|t| fallback.update(t)).collect();
        let batched = fast.update_batch(&trades);

        assert_eq!(batched.len(), trades.len());
        for (a, b) in batched.iter().zip(&sequential) {
            match (a, b) {
                (Ok(a), Ok(b)) => assert_eq!(a, b),
                (Err(_), Err(_)) => {}
                other => panic!("batch and sequential disagree: {:?}", other),
            }
        }
        assert_eq!(fast.get_cvd("BTCUSDT"), Some(8.25));
        assert_eq!(fast.get_cvd("ETHUSDT"), Some(-2.0));
    }

    #[test]
    fn test_session_reset() {
        let config = CvdConfig {
            session_ms: Some(1000),
            ..CvdConfig::default()
        };
        let engine = CvdEngine::fast(config, 100);
        engine.update(&buy(100, 4.0)).unwrap();
        engine.update(&buy(900, 1.0)).unwrap();

        let rolled = engine.update(&sell(1100, 2.0)).unwrap();
        assert_eq!(rolled.cvd, -2.0);
        assert_eq!(rolled.window_trades, 1);

        // a late print from the old session lands in the live one
        let late = engine.update(&buy(950, 1.0)).unwrap();
        assert_eq!(late.cvd, -1.0);
    }

    #[test]
    fn test_reset_and_count() {
        let engine = CvdEngine::fast(CvdConfig::default(), 100);
        engine.on_trade(&buy(1, 1.0)).unwrap();
        engine
            .on_trade(&Trade::new(1, "ETHUSDT", 3000.0, 1.0, Side::Buy))
            .unwrap();
        assert_eq!(engine.symbol_count(), 2);

        assert!(engine.reset_symbol("ETHUSDT"));
        assert_eq!(engine.symbol_count(), 1);
        engine.reset_all();
        assert_eq!(engine.get_cvd("BTCUSDT"), None);
    }

    #[test]
    fn test_zero_size_trade_is_valid() {
        let engine = CvdEngine::fast(CvdConfig::default(), 100);
        let result = engine.update(&buy(1, 0.0)).unwrap();
        assert_eq!(result.cvd, 0.0);
        assert_eq!(result.window_trades, 1);
    }
}
