// Volume Profile - traded volume distribution across price buckets
// Session profile (SVP) resets per session, the continuous profile never does

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::config::{BarPriceMode, ProfileConfig, DAY_MS};
use crate::core::error::EngineResult;
use crate::core::types::{
    Candle, EngineSource, IndicatorKind, IndicatorResult, IndicatorValue, ProfileLevel,
    ProfileValue, Trade,
};
use crate::core::utils::{bucket_price, quantize_index, session_of};
use crate::engines::{rejected, IndicatorEngine};
use crate::state::{LockedStore, SymbolStore};

/// Volume by price bucket for one symbol
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    bins: BTreeMap<i64, f64>,
    total_volume: f64,
    last_bucket: Option<i64>,
    session: Option<i64>,
}

impl Histogram {
    pub fn add(&mut self, bucket: i64, volume: f64) {
        *self.bins.entry(bucket).or_insert(0.0) += volume;
        self.total_volume += volume;
        self.last_bucket = Some(bucket);
    }

    pub fn clear(&mut self) {
        self.bins.clear();
        self.total_volume = 0.0;
        self.last_bucket = None;
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Highest-volume bucket. Ties go to the bucket nearest the last traded
    /// bucket, then to the higher price.
    pub fn poc(&self) -> Option<(i64, f64)> {
        let max_volume = self.bins.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let anchor = self.last_bucket;

        self.bins
            .iter()
            .filter(|(_, v)| **v == max_volume)
            .map(|(b, v)| (*b, *v))
            .min_by_key(|(bucket, _)| {
                let distance = anchor.map_or(0, |a| (bucket - a).unsigned_abs());
                (distance, std::cmp::Reverse(*bucket))
            })
    }

    /// Expands outward from the POC over non-empty neighbours, taking the larger
    /// side each step (upper side on ties), until `pct` of the volume is covered.
    pub fn value_area(&self, pct: f64) -> Option<(i64, i64)> {
        let (poc, poc_volume) = self.poc()?;
        let target = self.total_volume * pct;
        let mut covered = poc_volume;
        let (mut low, mut high) = (poc, poc);

        while covered < target {
            let above = high.checked_add(1).and_then(|next| self.bins.range(next..).next());
            let below = self.bins.range(..low).next_back();
            match (above, below) {
                (Some((&b_up, &v_up)), Some((_, &v_down))) if v_up >= v_down => {
                    high = b_up;
                    covered += v_up;
                }
                (_, Some((&b_down, &v_down))) => {
                    low = b_down;
                    covered += v_down;
                }
                (Some((&b_up, &v_up)), None) => {
                    high = b_up;
                    covered += v_up;
                }
                (None, None) => break,
            }
        }

        Some((low, high))
    }

    /// Top `n` bins by volume, higher price first on ties. `n == 0` returns all.
    pub fn top(&self, n: usize) -> Vec<(i64, f64)> {
        let mut bins: Vec<(i64, f64)> = self.bins.iter().map(|(b, v)| (*b, *v)).collect();
        bins.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));
        if n > 0 {
            bins.truncate(n);
        }
        bins
    }
}

/// SVP and continuous volume profile share this engine. Fallback only.
pub struct ProfileEngine {
    kind: IndicatorKind,
    config: ProfileConfig,
    session_ms: Option<i64>,
    store: LockedStore<Histogram>,
}

impl ProfileEngine {
    /// Session profile. `session_ms` falls back to one UTC day when unset.
    pub fn svp(config: ProfileConfig, max_symbols: usize) -> Self {
        let session_ms = Some(config.session_ms.unwrap_or(DAY_MS));
        Self {
            kind: IndicatorKind::Svp,
            config,
            session_ms,
            store: LockedStore::new("svp", max_symbols),
        }
    }

    /// Continuous profile. Any configured session is ignored.
    pub fn volume_profile(config: ProfileConfig, max_symbols: usize) -> Self {
        Self {
            kind: IndicatorKind::VolumeProfile,
            config,
            session_ms: None,
            store: LockedStore::new("volume_profile", max_symbols),
        }
    }

    fn snapshot(&self, hist: &Histogram) -> ProfileValue {
        let step = self.config.price_step;
        let to_level = |(bucket, volume): (i64, f64)| ProfileLevel {
            price: bucket_price(bucket, step),
            volume,
        };
        let value_area = hist.value_area(self.config.value_area_pct);

        ProfileValue {
            session: hist.session,
            poc: hist.poc().map(to_level),
            value_area_low: value_area.map(|(low, _)| bucket_price(low, step)),
            value_area_high: value_area.map(|(_, high)| bucket_price(high, step)),
            total_volume: hist.total_volume,
            bins: hist.len(),
            top: hist.top(self.config.top_n).into_iter().map(to_level).collect(),
        }
    }

    /// Roll forward to a newer session. Older-session prints accrue to the live one.
    fn roll(&self, hist: &mut Histogram, symbol: &str, ts: i64) {
        let Some(session_ms) = self.session_ms else {
            return;
        };
        let session = session_of(ts, session_ms);
        match hist.session {
            Some(current) if session > current => {
                debug!(kind = %self.kind, symbol = %symbol, from = current, to = session, "Profile session rolled");
                hist.clear();
                hist.session = Some(session);
            }
            Some(_) => {}
            None => hist.session = Some(session),
        }
    }

    /// Buckets before touching the store so an unbucketable price leaves no state.
    fn accumulate(&self, symbol: &str, ts: i64, price: f64, volume: f64) -> EngineResult<ProfileValue> {
        let bucket =
            quantize_index(price, self.config.price_step).map_err(|e| rejected(self.kind, symbol, e))?;
        Ok(self.store.with_state(symbol, Histogram::default, |hist| {
            self.roll(hist, symbol, ts);
            if volume > 0.0 {
                hist.add(bucket, volume);
            }
            self.snapshot(hist)
        }))
    }

    pub fn update_trade(&self, trade: &Trade) -> EngineResult<ProfileValue> {
        trade
            .validate()
            .map_err(|e| rejected(self.kind, &trade.symbol, e))?;
        self.accumulate(&trade.symbol, trade.ts, trade.price, trade.size)
    }

    /// Bars contribute their volume at the close or the typical price, per `bar_mode`.
    pub fn update_candle(&self, candle: &Candle) -> EngineResult<ProfileValue> {
        candle
            .validate()
            .map_err(|e| rejected(self.kind, &candle.symbol, e))?;
        let price = match self.config.bar_mode {
            BarPriceMode::Close => candle.close,
            BarPriceMode::Typical => candle.typical_price(),
        };
        self.accumulate(&candle.symbol, candle.open_time, price, candle.volume)
    }

    pub fn profile(&self, symbol: &str) -> Option<ProfileValue> {
        self.store.read(symbol, |hist| self.snapshot(hist))
    }
}

impl IndicatorEngine for ProfileEngine {
    fn kind(&self) -> IndicatorKind {
        self.kind
    }

    fn source(&self) -> EngineSource {
        EngineSource::Fallback
    }

    fn on_trade(&self, trade: &Trade) -> EngineResult<IndicatorResult> {
        let value = self.update_trade(trade)?;
        Ok(IndicatorResult::new(
            self.kind,
            EngineSource::Fallback,
            trade.symbol.clone(),
            trade.ts,
            IndicatorValue::Profile(value),
        ))
    }

    fn on_candle(&self, candle: &Candle) -> EngineResult<IndicatorResult> {
        let value = self.update_candle(candle)?;
        Ok(IndicatorResult::new(
            self.kind,
            EngineSource::Fallback,
            candle.symbol.clone(),
            candle.close_time,
            IndicatorValue::Profile(value),
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
