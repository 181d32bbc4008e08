// Wire Shapes - serde forms of inbound events and outbound results
// Decoding validates with the same rules the engines apply

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::error::ValidationError;
use crate::core::types::{
    BookSnapshot, EngineSource, IndicatorKind, IndicatorResult, Level, Side, Trade,
};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Invalid side: {0}")]
    Side(String),
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    #[serde(alias = "t", alias = "timestamp")]
    pub ts: i64,
    #[serde(alias = "sym", alias = "s")]
    pub symbol: String,
    #[serde(alias = "p")]
    pub price: f64,
    #[serde(alias = "qty", alias = "q")]
    pub size: f64,
    pub side: String,
}

impl TryFrom<TradeMessage> for Trade {
    type Error = WireError;

    fn try_from(msg: TradeMessage) -> Result<Self, Self::Error> {
        let side: Side = msg.side.parse().map_err(WireError::Side)?;
        let trade = Trade::new(msg.ts, msg.symbol, msg.price, msg.size, side);
        trade.validate()?;
        Ok(trade)
    }
}

/// Book levels arrive as `[price, size]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMessage {
    #[serde(alias = "t", alias = "timestamp")]
    pub ts: i64,
    #[serde(alias = "sym", alias = "s")]
    pub symbol: String,
    #[serde(default)]
    pub bids: Vec<[f64; 2]>,
    #[serde(default)]
    pub asks: Vec<[f64; 2]>,
}

impl TryFrom<BookMessage> for BookSnapshot {
    type Error = WireError;

    fn try_from(msg: BookMessage) -> Result<Self, Self::Error> {
        let to_levels = |pairs: Vec<[f64; 2]>| -> Vec<Level> {
            pairs.into_iter().map(|[price, size]| Level::new(price, size)).collect()
        };
        let snapshot = BookSnapshot::new(msg.ts, msg.symbol, to_levels(msg.bids), to_levels(msg.asks));
        snapshot.validate()?;
        Ok(snapshot)
    }
}

pub fn decode_trade(bytes: &[u8]) -> Result<Trade, WireError> {
    let msg: TradeMessage = serde_json::from_slice(bytes)?;
    Trade::try_from(msg)
}

pub fn decode_book(bytes: &[u8]) -> Result<BookSnapshot, WireError> {
    let msg: BookMessage = serde_json::from_slice(bytes)?;
    BookSnapshot::try_from(msg)
}

// ============================================================================
// Outbound
// ============================================================================

/// One published result: envelope fields plus the flattened indicator payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub indicator: IndicatorKind,
    pub symbol: String,
    pub ts: i64,
    pub source: EngineSource,
    /// Empty while the indicator is warming up.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl OutboundRecord {
    pub fn from_result(result: &IndicatorResult) -> Result<Self, WireError> {
        let payload = match serde_json::to_value(&result.value)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self {
            indicator: result.kind,
            symbol: result.symbol.clone(),
            ts: result.ts,
            source: result.source,
            payload,
        })
    }
}

pub fn encode_result(result: &IndicatorResult) -> Result<Vec<u8>, WireError> {
    let record = OutboundRecord::from_result(result)?;
    Ok(serde_json::to_vec(&record)?)
}
