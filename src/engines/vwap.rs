// VWAP Engine - Volume-Weighted Average Price per symbol
// Cumulative price×size over size, with deviation of the last print

use tracing::debug;

use crate::core::config::VwapConfig;
use crate::core::error::EngineResult;
use crate::core::types::{
    Candle, EngineSource, IndicatorKind, IndicatorResult, IndicatorValue, Trade, VwapResult,
};
use crate::core::utils::{safe_div, session_of};
use crate::engines::{apply_in_runs, apply_one, rejected, IndicatorEngine};
use crate::state::{LockedStore, ShardedStore, SymbolStore};

#[derive(Debug, Clone, Default)]
pub struct VwapState {
    pv_sum: f64,       // Σ(price × size)
    v_sum: f64,        // Σ(size)
    last_price: f64,
    session: Option<i64>,
}

impl VwapState {
    pub fn vwap(&self) -> Option<f64> {
        if self.v_sum > 0.0 {
            safe_div(self.pv_sum, self.v_sum)
        } else {
            None
        }
    }

    fn apply(&mut self, trade: &Trade, session_ms: Option<i64>) -> VwapResult {
        self.roll(&trade.symbol, trade.ts, session_ms);
        self.accumulate(trade.notional(), trade.size, trade.price)
    }

    /// Bars weigh their typical price by their volume; the close is the last price.
    fn apply_candle(&mut self, candle: &Candle, session_ms: Option<i64>) -> VwapResult {
        self.roll(&candle.symbol, candle.open_time, session_ms);
        self.accumulate(candle.typical_price() * candle.volume, candle.volume, candle.close)
    }

    fn roll(&mut self, symbol: &str, ts: i64, session_ms: Option<i64>) {
        if let Some(session_ms) = session_ms {
            let session = session_of(ts, session_ms);
            match self.session {
                Some(current) if session > current => {
                    debug!(symbol = %symbol, from = current, to = session, "VWAP session rolled");
                    self.pv_sum = 0.0;
                    self.v_sum = 0.0;
                    self.session = Some(session);
                }
                Some(_) => {}
                None => self.session = Some(session),
            }
        }
    }

    fn accumulate(&mut self, notional: f64, volume: f64, last_price: f64) -> VwapResult {
        self.pv_sum += notional;
        self.v_sum += volume;
        self.last_price = last_price;

        let vwap = self.vwap();
        let deviation_abs = vwap.map(|v| self.last_price - v);
        let deviation_pct = match (deviation_abs, vwap) {
            (Some(dev), Some(v)) => safe_div(dev, v).map(|r| r * 100.0),
            _ => None,
        };

        VwapResult {
            vwap,
            last_price: self.last_price,
            deviation_abs,
            deviation_pct,
            pv_sum: self.pv_sum,
            v_sum: self.v_sum,
        }
    }
}

/// VWAP engine generic over its state store. Batch strategy follows `source`
/// exactly as in [`crate::engines::CvdEngine`].
pub struct VwapEngine<St> {
    config: VwapConfig,
    source: EngineSource,
    store: St,
}

impl VwapEngine<ShardedStore<VwapState>> {
    pub fn fast(config: VwapConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fast, ShardedStore::new("vwap", max_symbols))
    }
}

impl VwapEngine<LockedStore<VwapState>> {
    pub fn fallback(config: VwapConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fallback, LockedStore::new("vwap", max_symbols))
    }
}

impl<St: SymbolStore<VwapState>> VwapEngine<St> {
    pub fn with_store(config: VwapConfig, source: EngineSource, store: St) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    pub fn update(&self, trade: &Trade) -> EngineResult<VwapResult> {
        let session_ms = self.config.session_ms;
        apply_one(
            IndicatorKind::Vwap,
            &self.store,
            trade,
            VwapState::default,
            |state, t| state.apply(t, session_ms),
        )
    }

    pub fn update_batch(&self, trades: &[Trade]) -> Vec<EngineResult<VwapResult>> {
        match self.source {
            EngineSource::Fast => {
                let session_ms = self.config.session_ms;
                apply_in_runs(
                    IndicatorKind::Vwap,
                    &self.store,
                    trades,
                    VwapState::default,
                    |state, t| state.apply(t, session_ms),
                )
            }
            EngineSource::Fallback => trades.iter().map(|t| self.update(t)).collect(),
        }
    }

    pub fn update_candle(&self, candle: &Candle) -> EngineResult<VwapResult> {
        candle
            .validate()
            .map_err(|e| rejected(IndicatorKind::Vwap, &candle.symbol, e))?;
        let session_ms = self.config.session_ms;
        Ok(self.store.with_state(&candle.symbol, VwapState::default, |state| {
            state.apply_candle(candle, session_ms)
        }))
    }

    /// `Some(None)` for a known symbol with no volume yet.
    pub fn get_vwap(&self, symbol: &str) -> Option<Option<f64>> {
        self.store.read(symbol, VwapState::vwap)
    }

    fn wrap(&self, trade: &Trade, result: VwapResult) -> IndicatorResult {
        IndicatorResult::new(
            IndicatorKind::Vwap,
            self.source,
            trade.symbol.clone(),
            trade.ts,
            IndicatorValue::Vwap(result),
        )
    }
}

impl<St: SymbolStore<VwapState>> IndicatorEngine for VwapEngine<St> {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Vwap
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

    fn on_candle(&self, candle: &Candle) -> EngineResult<IndicatorResult> {
        let result = self.update_candle(candle)?;
        Ok(IndicatorResult::new(
            IndicatorKind::Vwap,
            self.source,
            candle.symbol.clone(),
            candle.close_time,
            IndicatorValue::Vwap(result),
        ))
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
    use crate::core::types::Side;

    fn trade(ts: i64, price: f64, size: f64) -> Trade {
        Trade::new(ts, "AAPL", price, size, Side::Buy)
    }

    #[test]
    fn test_single_trade() {
        let engine = VwapEngine::fast(VwapConfig::default(), 100);
        let result = engine.update(&trade(1, 150.0, 100.0)).unwrap();

        assert_eq!(result.vwap, Some(150.0));
        assert_eq!(result.deviation_abs, Some(0.0));
        assert_eq!(result.deviation_pct, Some(0.0));
        assert_eq!(result.pv_sum, 15_000.0);
        assert_eq!(result.v_sum, 100.0);
    }

    #[test]
    fn test_weighted_average_and_deviation() {
        let engine = VwapEngine::fallback(VwapConfig::default(), 100);
        engine.update(&trade(1, 100.0, 1.0)).unwrap();
        let result = engine.update(&trade(2, 110.0, 3.0)).unwrap();

        assert_eq!(result.vwap, Some(107.5));
        assert_eq!(result.deviation_abs, Some(2.5));
        let pct = result.deviation_pct.unwrap();
        assert!((pct - 2.5 / 107.5 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_volume_is_undefined() {
        let engine = VwapEngine::fast(VwapConfig::default(), 100);
        let result = engine.update(&trade(1, 150.0, 0.0)).unwrap();

        assert_eq!(result.vwap, None);
        assert_eq!(result.deviation_abs, None);
        assert_eq!(result.deviation_pct, None);
        assert_eq!(result.last_price, 150.0);
        assert_eq!(engine.get_vwap("AAPL"), Some(None));
        assert_eq!(engine.get_vwap("MSFT"), None);
    }

    #[test]
    fn test_rejected_trade_leaves_state() {
        let engine = VwapEngine::fast(VwapConfig::default(), 100);
        engine.update(&trade(1, 100.0, 2.0)).unwrap();
        assert!(engine.update(&trade(2, -1.0, 2.0)).is_err());
        assert!(engine.update(&trade(3, f64::INFINITY, 2.0)).is_err());
        assert_eq!(engine.get_vwap("AAPL"), Some(Some(100.0)));
    }

    #[test]
    fn test_batch_matches_sequential() {
        let trades: Vec<Trade> = (0..50)
            .map(|i| trade(i, 100.0 + (i % 7) as f64 * 0.37, 0.1 + (i % 5) as f64))
            .collect();

        let fast = VwapEngine::fast(VwapConfig::default(), 100);
        let fallback = VwapEngine::fallback(VwapConfig::default(), 100);
        let batched = fast.update_batch(&trades);
        let sequential: Vec<_> = trades.iter().map(|t| fallback.update(t)).collect();

        assert_eq!(batched, sequential);
    }

    #[test]
    fn test_session_reset() {
        let engine = VwapEngine::fast(VwapConfig { session_ms: Some(1000) }, 100);
        engine.update(&trade(10, 100.0, 1.0)).unwrap();
        let result = engine.update(&trade(1010, 200.0, 1.0)).unwrap();
        assert_eq!(result.vwap, Some(200.0));
        assert_eq!(result.v_sum, 1.0);
    }

    fn bar(open_time: i64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            symbol: "AAPL".to_string(),
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_candle_weights_typical_price() {
        let engine = VwapEngine::fast(VwapConfig::default(), 100);
        // typical prices 100 and 112
        engine.update_candle(&bar(0, 103.0, 97.0, 100.0, 1.0)).unwrap();
        let result = engine.update_candle(&bar(60_000, 115.0, 109.0, 112.0, 3.0)).unwrap();

        assert_eq!(result.pv_sum, 436.0);
        assert_eq!(result.v_sum, 4.0);
        assert_eq!(result.vwap, Some(109.0));
        assert_eq!(result.last_price, 112.0);
        assert_eq!(result.deviation_abs, Some(3.0));
    }

    #[test]
    fn test_candle_session_roll_and_mixed_inputs() {
        let engine = VwapEngine::fallback(VwapConfig { session_ms: Some(60_000) }, 100);
        engine.update(&trade(10, 50.0, 2.0)).unwrap();
        let same_session = engine.update_candle(&bar(0, 103.0, 97.0, 100.0, 2.0)).unwrap();
        assert_eq!(same_session.vwap, Some(75.0));

        let rolled = engine.update_candle(&bar(60_000, 103.0, 97.0, 100.0, 2.0)).unwrap();
        assert_eq!(rolled.vwap, Some(100.0));
        assert_eq!(rolled.v_sum, 2.0);
    }

    #[test]
    fn test_on_candle_result_and_rejection() {
        let engine = VwapEngine::fast(VwapConfig::default(), 100);
        let result = engine.on_candle(&bar(0, 103.0, 97.0, 100.0, 1.0)).unwrap();
        assert_eq!(result.kind, IndicatorKind::Vwap);
        assert_eq!(result.ts, 59_999);

        let inverted = bar(60_000, 90.0, 110.0, 100.0, 1.0);
        assert!(engine.on_candle(&inverted).unwrap_err().is_validation());
        assert_eq!(engine.get_vwap("AAPL"), Some(Some(100.0)));

        let fresh = VwapEngine::fallback(VwapConfig::default(), 100);
        assert!(fresh.on_candle(&inverted).is_err());
        assert_eq!(fresh.symbol_count(), 0);
    }

    #[test]
    fn test_on_trade_tags_source() {
        let engine = VwapEngine::fallback(VwapConfig::default(), 100);
        let result = engine.on_trade(&trade(7, 10.0, 1.0)).unwrap();
        assert_eq!(result.kind, IndicatorKind::Vwap);
        assert_eq!(result.source, EngineSource::Fallback);
        assert_eq!(result.ts, 7);
        assert!(engine.on_snapshot(&crate::core::types::BookSnapshot::new(1, "AAPL", vec![], vec![])).is_err());
    }
}
