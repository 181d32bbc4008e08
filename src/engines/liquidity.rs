// Liquidity Engine - depth, imbalance and spread from L2 snapshots
// Stateless per call apart from memoizing the last snapshot per symbol

use crate::core::config::LiquidityConfig;
use crate::core::error::EngineResult;
use crate::core::types::{
    BookSnapshot, EngineSource, IndicatorKind, IndicatorResult, IndicatorValue, Level,
    LiquidityResult,
};
use crate::core::utils::safe_div;
use crate::engines::{rejected, IndicatorEngine};
use crate::state::{LockedStore, ShardedStore, SymbolStore};

/// Sum of sizes over the first `limit` levels, in book order.
fn depth(levels: &[Level], limit: usize) -> f64 {
    levels.iter().take(limit).fold(0.0, |acc, l| acc + l.size)
}

/// (bid - ask) / (bid + ask), clamped to [-1, 1]. 0 when both sides are empty.
pub fn imbalance(bid_depth: f64, ask_depth: f64) -> f64 {
    safe_div(bid_depth - ask_depth, bid_depth + ask_depth)
        .map(|v| v.clamp(-1.0, 1.0))
        .unwrap_or(0.0)
}

pub fn compute(snapshot: &BookSnapshot, config: &LiquidityConfig) -> LiquidityResult {
    let limit = config.depth_levels.unwrap_or(usize::MAX);
    let bid_depth = depth(&snapshot.bids, limit);
    let ask_depth = depth(&snapshot.asks, limit);

    let top_k = config.top_k_imbalance;
    let top_imbalance = imbalance(depth(&snapshot.bids, top_k), depth(&snapshot.asks, top_k));

    let best_bid = snapshot.best_bid();
    let best_ask = snapshot.best_ask();

    LiquidityResult {
        depth_imbalance: imbalance(bid_depth, ask_depth),
        // crossed books pass through with a negative spread
        spread: snapshot.spread(),
        bid_depth,
        ask_depth,
        mid: snapshot.mid_price(),
        best_bid: best_bid.map(|l| l.price),
        best_ask: best_ask.map(|l| l.price),
        bid1_size: best_bid.map(|l| l.size),
        ask1_size: best_ask.map(|l| l.size),
        top_imbalance,
        bid_levels: snapshot.bids.len(),
        ask_levels: snapshot.asks.len(),
    }
}

pub struct LiquidityEngine<St> {
    config: LiquidityConfig,
    source: EngineSource,
    last: St,
}

impl LiquidityEngine<ShardedStore<BookSnapshot>> {
    pub fn fast(config: LiquidityConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fast, ShardedStore::new("liquidity", max_symbols))
    }
}

impl LiquidityEngine<LockedStore<BookSnapshot>> {
    pub fn fallback(config: LiquidityConfig, max_symbols: usize) -> Self {
        Self::with_store(config, EngineSource::Fallback, LockedStore::new("liquidity", max_symbols))
    }
}

impl<St: SymbolStore<BookSnapshot>> LiquidityEngine<St> {
    pub fn with_store(config: LiquidityConfig, source: EngineSource, store: St) -> Self {
        Self {
            config,
            source,
            last: store,
        }
    }

    pub fn update(&self, snapshot: &BookSnapshot) -> EngineResult<LiquidityResult> {
        snapshot
            .validate()
            .map_err(|e| rejected(IndicatorKind::Liquidity, &snapshot.symbol, e))?;

        let result = compute(snapshot, &self.config);
        self.last.with_state(
            &snapshot.symbol,
            || BookSnapshot::new(snapshot.ts, snapshot.symbol.clone(), Vec::new(), Vec::new()),
            |memo| memo.clone_from(snapshot),
        );
        Ok(result)
    }

    pub fn last_snapshot(&self, symbol: &str) -> Option<BookSnapshot> {
        self.last.read(symbol, BookSnapshot::clone)
    }
}

impl<St: SymbolStore<BookSnapshot>> IndicatorEngine for LiquidityEngine<St> {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Liquidity
    }

    fn source(&self) -> EngineSource {
        self.source
    }

    fn on_snapshot(&self, snapshot: &BookSnapshot) -> EngineResult<IndicatorResult> {
        let result = self.update(snapshot)?;
        Ok(IndicatorResult::new(
            IndicatorKind::Liquidity,
            self.source,
            snapshot.symbol.clone(),
            snapshot.ts,
            IndicatorValue::Liquidity(result),
        ))
    }

    fn symbol_count(&self) -> usize {
        self.last.len()
    }

    fn reset_symbol(&self, symbol: &str) -> bool {
        self.last.remove(symbol)
    }

    fn reset_all(&self) {
        self.last.clear();
    }
}
