// Core Type Definitions for the indicator engines
// Immutable event values (trades, book snapshots, candles) and indicator results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::ValidationError;

// ============================================================================
// Enums
// ============================================================================

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "B" | "BUYER" => Ok(Side::Buy),
            "SELL" | "S" | "SELLER" => Ok(Side::Sell),
            _ => Err(format!("Invalid Side: '{}'. Expected 'BUY' or 'SELL'", s)),
        }
    }
}

/// Order book side a level or heatmap tile belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookSide::Bid => write!(f, "bid"),
            BookSide::Ask => write!(f, "ask"),
        }
    }
}

/// Every indicator the dispatcher knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Cvd,
    Vwap,
    Liquidity,
    Heatmap,
    Rsi,
    Macd,
    Adx,
    Svp,
    VolumeProfile,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 9] = [
        IndicatorKind::Cvd,
        IndicatorKind::Vwap,
        IndicatorKind::Liquidity,
        IndicatorKind::Heatmap,
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Adx,
        IndicatorKind::Svp,
        IndicatorKind::VolumeProfile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Cvd => "cvd",
            IndicatorKind::Vwap => "vwap",
            IndicatorKind::Liquidity => "liquidity",
            IndicatorKind::Heatmap => "heatmap",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Adx => "adx",
            IndicatorKind::Svp => "svp",
            IndicatorKind::VolumeProfile => "volume_profile",
        }
    }

    /// Which event family feeds this indicator.
    pub fn input(&self) -> EventFamily {
        match self {
            IndicatorKind::Liquidity | IndicatorKind::Heatmap => EventFamily::Book,
            _ => EventFamily::Trade,
        }
    }

    /// Bar-driven indicators that also take pre-built candles.
    pub fn accepts_candles(&self) -> bool {
        matches!(
            self,
            IndicatorKind::Vwap
                | IndicatorKind::Rsi
                | IndicatorKind::Macd
                | IndicatorKind::Adx
                | IndicatorKind::Svp
                | IndicatorKind::VolumeProfile
        )
    }

    pub fn accepts(&self, event: &MarketEvent) -> bool {
        match event {
            MarketEvent::Trade(_) => self.input() == EventFamily::Trade,
            MarketEvent::Snapshot(_) => self.input() == EventFamily::Book,
            MarketEvent::Candle(_) => self.accepts_candles(),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for IndicatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        IndicatorKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("Unknown indicator kind: '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFamily {
    Trade,
    Book,
}

/// Provenance tag: which concrete implementation produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSource {
    Fast,
    Fallback,
}

impl fmt::Display for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSource::Fast => write!(f, "fast"),
            EngineSource::Fallback => write!(f, "fallback"),
        }
    }
}

// ============================================================================
// Trade
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ts: i64, // milliseconds
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub side: Side,
}

impl Trade {
    pub fn new(ts: i64, symbol: impl Into<String>, price: f64, size: f64, side: Side) -> Self {
        Self {
            ts,
            symbol: symbol.into(),
            price,
            size,
            side,
        }
    }

    /// Signed size: buys positive, sells negative.
    pub fn signed_size(&self) -> f64 {
        self.side.sign() * self.size
    }

    pub fn notional(&self) -> f64 {
        self.price * self.size
    }

    /// Rejects non-finite or non-positive prices, negative sizes and empty symbols.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if !self.price.is_finite() {
            return Err(ValidationError::NonFinite { field: "price", value: self.price });
        }
        if self.price <= 0.0 {
            return Err(ValidationError::NonPositivePrice { price: self.price });
        }
        if !self.size.is_finite() {
            return Err(ValidationError::NonFinite { field: "size", value: self.size });
        }
        if self.size < 0.0 {
            return Err(ValidationError::NegativeSize { size: self.size });
        }
        Ok(())
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade(symbol={}, price={:.4}, size={:.4}, side={}, ts={})",
            self.symbol, self.price, self.size, self.side, self.ts
        )
    }
}

// ============================================================================
// Level / BookSnapshot
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

impl Level {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub ts: i64,
    pub symbol: String,
    /// Descending by price.
    pub bids: Vec<Level>,
    /// Ascending by price.
    pub asks: Vec<Level>,
}

impl BookSnapshot {
    pub fn new(ts: i64, symbol: impl Into<String>, bids: Vec<Level>, asks: Vec<Level>) -> Self {
        Self {
            ts,
            symbol: symbol.into(),
            bids,
            asks,
        }
    }

    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<f64> {
        let best_bid = self.best_bid()?;
        let best_ask = self.best_ask()?;
        Some((best_bid.price + best_ask.price) / 2.0)
    }

    /// Best ask minus best bid. Negative when the book is crossed.
    pub fn spread(&self) -> Option<f64> {
        let best_bid = self.best_bid()?;
        let best_ask = self.best_ask()?;
        Some(best_ask.price - best_bid.price)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Levels tagged with their side, bids first.
    pub fn levels(&self) -> impl Iterator<Item = (BookSide, &Level)> {
        self.bids
            .iter()
            .map(|l| (BookSide::Bid, l))
            .chain(self.asks.iter().map(|l| (BookSide::Ask, l)))
    }

    /// Level ordering and crossing are not checked.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        for (side, levels) in [(BookSide::Bid, &self.bids), (BookSide::Ask, &self.asks)] {
            for (index, level) in levels.iter().enumerate() {
                if !level.price.is_finite() || level.price <= 0.0 {
                    return Err(ValidationError::InvalidLevel {
                        side,
                        index,
                        reason: format!("price {} must be finite and > 0", level.price),
                    });
                }
                if !level.size.is_finite() || level.size < 0.0 {
                    return Err(ValidationError::InvalidLevel {
                        side,
                        index,
                        reason: format!("size {} must be finite and >= 0", level.size),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for BookSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BookSnapshot(symbol={}, bids={}, asks={}, ts={})",
            self.symbol,
            self.bids.len(),
            self.asks.len(),
            self.ts
        )
    }
}

// ============================================================================
// Candle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A candle holding exactly one print.
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            symbol: trade.symbol.clone(),
            open_time: trade.ts,
            close_time: trade.ts,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.size,
        }
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ValidationError::NonPositivePrice { price: value });
            }
        }
        if !self.volume.is_finite() {
            return Err(ValidationError::NonFinite { field: "volume", value: self.volume });
        }
        if self.volume < 0.0 {
            return Err(ValidationError::NegativeSize { size: self.volume });
        }
        if self.high < self.low {
            return Err(ValidationError::InvertedRange { high: self.high, low: self.low });
        }
        Ok(())
    }
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Candle(symbol={}, O={:.2}, H={:.2}, L={:.2}, C={:.2}, V={:.4})",
            self.symbol, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

/// Any event the dispatcher can route.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Trade(Trade),
    Snapshot(BookSnapshot),
    Candle(Candle),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Trade(t) => &t.symbol,
            MarketEvent::Snapshot(s) => &s.symbol,
            MarketEvent::Candle(c) => &c.symbol,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::Trade(_) => "trade",
            MarketEvent::Snapshot(_) => "snapshot",
            MarketEvent::Candle(_) => "candle",
        }
    }
}

impl From<Trade> for MarketEvent {
    fn from(trade: Trade) -> Self {
        MarketEvent::Trade(trade)
    }
}

impl From<BookSnapshot> for MarketEvent {
    fn from(snapshot: BookSnapshot) -> Self {
        MarketEvent::Snapshot(snapshot)
    }
}

impl From<Candle> for MarketEvent {
    fn from(candle: Candle) -> Self {
        MarketEvent::Candle(candle)
    }
}

// ============================================================================
// Indicator payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvdResult {
    pub cvd: f64,
    pub windowed_cvd: f64,
    pub window_trades: usize,
    pub last_side: Side,
    pub last_size: f64,
}

/// `vwap` and the deviations are `None` while no volume has accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapResult {
    pub vwap: Option<f64>,
    pub last_price: f64,
    pub deviation_abs: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub pv_sum: f64,
    pub v_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityResult {
    pub depth_imbalance: f64,
    pub spread: Option<f64>,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub mid: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub bid1_size: Option<f64>,
    pub ask1_size: Option<f64>,
    pub top_imbalance: f64,
    pub bid_levels: usize,
    pub ask_levels: usize,
}

/// Only cells at or above the significance cutoff are emitted, so
/// `significant` is always `true` on a tile inside a [`HeatmapResult`].
/// Dropped cells still count towards `total_buckets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapTile {
    pub bucket: i64,
    pub price: f64,
    pub side: BookSide,
    pub size: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapResult {
    pub bucket_ts: i64,
    pub bucket_ms: i64,
    pub tiles: Vec<HeatmapTile>,
    pub max_size: f64,
    pub total_buckets: usize,
    pub compression_ratio: f64,
    /// Cells whose sums were carried over from the previous snapshot.
    pub reused_buckets: usize,
}

impl PartialEq for HeatmapResult {
    // reused_buckets is diagnostic only
    fn eq(&self, other: &Self) -> bool {
        self.bucket_ts == other.bucket_ts
            && self.bucket_ms == other.bucket_ms
            && self.tiles == other.tiles
            && self.max_size.to_bits() == other.max_size.to_bits()
            && self.total_buckets == other.total_buckets
            && self.compression_ratio.to_bits() == other.compression_ratio.to_bits()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiValue {
    pub rsi: Option<f64>,
    pub bars_seen: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdxValue {
    pub plus_di: f64,
    pub minus_di: f64,
    pub adx: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileLevel {
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileValue {
    /// Session id for session profiles, `None` for continuous ones.
    pub session: Option<i64>,
    pub poc: Option<ProfileLevel>,
    pub value_area_low: Option<f64>,
    pub value_area_high: Option<f64>,
    pub total_volume: f64,
    pub bins: usize,
    pub top: Vec<ProfileLevel>,
}

/// Indicator-specific payload carried by an [`IndicatorResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Cvd(CvdResult),
    Vwap(VwapResult),
    Liquidity(LiquidityResult),
    Heatmap(HeatmapResult),
    Rsi(RsiValue),
    /// `None` during warm-up.
    Macd(Option<MacdValue>),
    /// `None` during warm-up or while directional movement is flat.
    Adx(Option<AdxValue>),
    Profile(ProfileValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub kind: IndicatorKind,
    pub source: EngineSource,
    pub symbol: String,
    pub ts: i64,
    pub value: IndicatorValue,
}

impl IndicatorResult {
    pub fn new(
        kind: IndicatorKind,
        source: EngineSource,
        symbol: impl Into<String>,
        ts: i64,
        value: IndicatorValue,
    ) -> Self {
        Self {
            kind,
            source,
            symbol: symbol.into(),
            ts,
            value,
        }
    }
}

impl fmt::Display for IndicatorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IndicatorResult(kind={}, source={}, symbol={}, ts={})",
            self.kind, self.source, self.symbol, self.ts
        )
    }
}
