// Research Module - sequential bar indicators and volume profiles
// Single-lock state, no batch equivalence guarantee

pub mod adx;
pub mod candles;
pub mod macd;
pub mod profile;
pub mod rsi;

pub use adx::Adx;
pub use candles::{BarUpdate, CandleBuilder};
pub use macd::Macd;
pub use profile::{Histogram, ProfileEngine};
pub use rsi::Rsi;

use std::sync::Arc;
use tracing::debug;

use crate::core::config::{AdxConfig, MacdConfig, RsiConfig};
use crate::core::error::EngineResult;
use crate::core::types::{
    Candle, EngineSource, IndicatorKind, IndicatorResult, IndicatorValue, Trade,
};
use crate::engines::{rejected, IndicatorEngine};
use crate::state::{LockedStore, SymbolStore};

/// Counts bars until an indicator has enough history.
#[derive(Debug, Clone, Copy)]
pub struct Warmup {
    need: usize,
    seen: usize,
}

impl Warmup {
    pub fn new(need: usize) -> Self {
        Self { need, seen: 0 }
    }

    /// Count one bar. Returns true while still warming up.
    pub fn tick(&mut self) -> bool {
        self.seen += 1;
        self.seen < self.need
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn left(&self) -> usize {
        self.need.saturating_sub(self.seen)
    }
}

/// Per-symbol calculator fed one closed bar at a time.
pub trait BarIndicator: Send + 'static {
    fn on_bar(&mut self, candle: &Candle) -> IndicatorValue;

    /// Latest output without consuming a bar.
    fn current(&self) -> IndicatorValue;
}

pub struct SeriesState<C> {
    builder: CandleBuilder,
    calc: C,
    last_open: Option<i64>,
}

impl<C: BarIndicator> SeriesState<C> {
    fn feed(&mut self, candle: &Candle) -> IndicatorValue {
        if matches!(self.last_open, Some(last) if candle.open_time < last) {
            debug!(symbol = %candle.symbol, open_time = candle.open_time, "Stale bar ignored");
            return self.calc.current();
        }
        self.last_open = Some(candle.open_time);
        self.calc.on_bar(candle)
    }
}

type Factory<C> = Arc<dyn Fn() -> C + Send + Sync>;

/// Drives a [`BarIndicator`] per symbol from trades or pre-built candles.
pub struct SeriesEngine<C> {
    kind: IndicatorKind,
    bar_ms: Option<i64>,
    factory: Factory<C>,
    store: LockedStore<SeriesState<C>>,
}

impl<C: BarIndicator> SeriesEngine<C> {
    pub fn new(
        kind: IndicatorKind,
        bar_ms: Option<i64>,
        max_symbols: usize,
        factory: impl Fn() -> C + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            bar_ms,
            factory: Arc::new(factory),
            store: LockedStore::new(kind.name(), max_symbols),
        }
    }

    fn init(&self) -> SeriesState<C> {
        SeriesState {
            builder: CandleBuilder::new(self.bar_ms),
            calc: (self.factory)(),
            last_open: None,
        }
    }

    pub fn update_trade(&self, trade: &Trade) -> EngineResult<IndicatorValue> {
        trade
            .validate()
            .map_err(|e| rejected(self.kind, &trade.symbol, e))?;

        Ok(self.store.with_state(&trade.symbol, || self.init(), |state| {
            match state.builder.push(trade) {
                BarUpdate::Closed(candle) => state.feed(&candle),
                BarUpdate::Pending => state.calc.current(),
                BarUpdate::Stale => {
                    debug!(kind = %self.kind, symbol = %trade.symbol, ts = trade.ts, "Stale trade ignored");
                    state.calc.current()
                }
            }
        }))
    }

    pub fn update_candle(&self, candle: &Candle) -> EngineResult<IndicatorValue> {
        candle
            .validate()
            .map_err(|e| rejected(self.kind, &candle.symbol, e))?;
        Ok(self
            .store
            .with_state(&candle.symbol, || self.init(), |state| state.feed(candle)))
    }

    pub fn current(&self, symbol: &str) -> Option<IndicatorValue> {
        self.store.read(symbol, |state| state.calc.current())
    }
}

impl SeriesEngine<Rsi> {
    pub fn rsi(config: &RsiConfig, max_symbols: usize) -> Self {
        let period = config.period;
        Self::new(IndicatorKind::Rsi, config.bar_ms, max_symbols, move || Rsi::new(period))
    }
}

impl SeriesEngine<Macd> {
    pub fn macd(config: &MacdConfig, max_symbols: usize) -> Self {
        let (fast, slow, signal) = (config.fast, config.slow, config.signal);
        Self::new(IndicatorKind::Macd, config.bar_ms, max_symbols, move || {
            Macd::new(fast, slow, signal)
        })
    }
}

impl SeriesEngine<Adx> {
    pub fn adx(config: &AdxConfig, max_symbols: usize) -> Self {
        let period = config.period;
        Self::new(IndicatorKind::Adx, config.bar_ms, max_symbols, move || Adx::new(period))
    }
}

impl<C: BarIndicator> IndicatorEngine for SeriesEngine<C> {
    fn kind(&self) -> IndicatorKind {
        self.kind
    }

    fn source(&self) -> EngineSource {
        EngineSource::Fallback
    }

    fn on_trade(&self, trade: &Trade) -> EngineResult<IndicatorResult> {
        let value = self.update_trade(trade)?;
        Ok(IndicatorResult::new(self.kind, EngineSource::Fallback, trade.symbol.clone(), trade.ts, value))
    }

    fn on_candle(&self, candle: &Candle) -> EngineResult<IndicatorResult> {
        let value = self.update_candle(candle)?;
        Ok(IndicatorResult::new(
            self.kind,
            EngineSource::Fallback,
            candle.symbol.clone(),
            candle.close_time,
            value,
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
