// Engines Module - per-indicator stateful engines behind one trait
// Fast variants shard state and amortize locks, fallback variants serialize

pub mod cvd;
pub mod heatmap;
pub mod liquidity;
pub mod vwap;

pub use cvd::{CvdEngine, CvdState};
pub use heatmap::{HeatmapEngine, HeatmapState};
pub use liquidity::LiquidityEngine;
pub use vwap::{VwapEngine, VwapState};

use tracing::debug;

use crate::core::error::{EngineError, EngineResult, ValidationError};
use crate::core::types::{
    BookSnapshot, Candle, EngineSource, IndicatorKind, IndicatorResult, MarketEvent, Trade,
};
use crate::state::SymbolStore;

// ============================================================================
// IndicatorEngine trait
// ============================================================================

/// Uniform call surface for every indicator implementation.
///
/// Engines own their symbol -> state map. Each capability defaults to
/// `UnsupportedEvent`, so an engine only implements the events it consumes.
pub trait IndicatorEngine: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    fn source(&self) -> EngineSource;

    fn on_trade(&self, trade: &Trade) -> EngineResult<IndicatorResult> {
        let _ = trade;
        Err(self.unsupported("trade"))
    }

    /// One result per input, in order. Must match sequential `on_trade` calls.
    fn on_trade_batch(&self, trades: &[Trade]) -> Vec<EngineResult<IndicatorResult>> {
        trades.iter().map(|t| self.on_trade(t)).collect()
    }

    fn on_snapshot(&self, snapshot: &BookSnapshot) -> EngineResult<IndicatorResult> {
        let _ = snapshot;
        Err(self.unsupported("snapshot"))
    }

    fn on_candle(&self, candle: &Candle) -> EngineResult<IndicatorResult> {
        let _ = candle;
        Err(self.unsupported("candle"))
    }

    fn on_event(&self, event: &MarketEvent) -> EngineResult<IndicatorResult> {
        match event {
            MarketEvent::Trade(trade) => self.on_trade(trade),
            MarketEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
            MarketEvent::Candle(candle) => self.on_candle(candle),
        }
    }

    fn symbol_count(&self) -> usize;

    /// Drop one symbol's state. Returns whether it existed.
    fn reset_symbol(&self, symbol: &str) -> bool;

    fn reset_all(&self);

    fn unsupported(&self, event: &'static str) -> EngineError {
        EngineError::UnsupportedEvent {
            kind: self.kind(),
            event,
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

pub(crate) fn rejected(kind: IndicatorKind, symbol: &str, error: ValidationError) -> EngineError {
    debug!(kind = %kind, symbol = %symbol, error = %error, "Rejected invalid event");
    EngineError::Validation(error)
}

/// Apply a trade batch while taking each symbol's lock once per run of
/// consecutive same-symbol trades. Invalid trades yield `Err` in place and
/// never create or touch state.
pub(crate) fn apply_in_runs<S, St, R>(
    kind: IndicatorKind,
    store: &St,
    trades: &[Trade],
    init: impl Fn() -> S,
    apply: impl Fn(&mut S, &Trade) -> R,
) -> Vec<EngineResult<R>>
where
    St: SymbolStore<S>,
{
    let mut results = Vec::with_capacity(trades.len());
    let mut start = 0;

    while start < trades.len() {
        let head = &trades[start];
        if let Err(e) = head.validate() {
            results.push(Err(rejected(kind, &head.symbol, e)));
            start += 1;
            continue;
        }

        let end = trades[start..]
            .iter()
            .position(|t| t.symbol != head.symbol)
            .map_or(trades.len(), |offset| start + offset);

        store.with_state(&head.symbol, &init, |state| {
            for trade in &trades[start..end] {
                match trade.validate() {
                    Ok(()) => results.push(Ok(apply(state, trade))),
                    Err(e) => results.push(Err(rejected(kind, &trade.symbol, e))),
                }
            }
        });
        start = end;
    }

    results
}

/// Per-trade application: validate, then one locked update.
pub(crate) fn apply_one<S, St, R>(
    kind: IndicatorKind,
    store: &St,
    trade: &Trade,
    init: impl FnOnce() -> S,
    apply: impl FnOnce(&mut S, &Trade) -> R,
) -> EngineResult<R>
where
    St: SymbolStore<S>,
{
    trade
        .validate()
        .map_err(|e| rejected(kind, &trade.symbol, e))?;
    Ok(store.with_state(&trade.symbol, init, |state| apply(state, trade)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;
    use crate::state::LockedStore;

    #[test]
    fn test_apply_in_runs_keeps_order_and_skips_invalid() {
        let store: LockedStore<f64> = LockedStore::new("test", 10);
        let trades = vec![
            Trade::new(1, "A", 10.0, 1.0, Side::Buy),
            Trade::new(2, "A", 10.0, -1.0, Side::Buy),
            Trade::new(3, "A", 10.0, 2.0, Side::Buy),
            Trade::new(4, "B", 0.0, 2.0, Side::Buy),
            Trade::new(5, "A", 10.0, 4.0, Side::Sell),
        ];

        let results = apply_in_runs(IndicatorKind::Cvd, &store, &trades, || 0.0, |s, t| {
            *s += t.signed_size();
            *s
        });

        assert_eq!(results.len(), 5);
        assert_eq!(results[0], Ok(1.0));
        assert!(results[1].is_err());
        assert_eq!(results[2], Ok(3.0));
        assert!(results[3].is_err());
        assert_eq!(results[4], Ok(-1.0));
        // B never validated, so no state was created for it
        assert!(!store.contains("B"));
    }

    #[test]
    fn test_apply_one_rejects_before_touching_state() {
        let store: LockedStore<f64> = LockedStore::new("test", 10);
        let bad = Trade::new(1, "A", f64::NAN, 1.0, Side::Buy);
        let result = apply_one(IndicatorKind::Vwap, &store, &bad, || 0.0, |s, _| *s);
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(store.is_empty());
    }
}
