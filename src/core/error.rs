// Error Types for the indicator engines
// Validation, routing and availability failures

use thiserror::Error;

use crate::core::types::{BookSide, IndicatorKind};

/// Field-level rejection of an inbound event. State is never touched when returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("price must be > 0, got {price}")]
    NonPositivePrice { price: f64 },
    #[error("size must be >= 0, got {size}")]
    NegativeSize { size: f64 },
    #[error("invalid {side} level #{index}: {reason}")]
    InvalidLevel {
        side: BookSide,
        index: usize,
        reason: String,
    },
    #[error("price {price} is out of range for bucket width {step}")]
    PriceOutOfRange { price: f64, step: f64 },
    #[error("candle high {high} below low {low}")]
    InvertedRange { high: f64, low: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("No engine bound for {kind}: {reason}")]
    NotBound { kind: IndicatorKind, reason: String },
    #[error("{kind} does not accept {event} events")]
    UnsupportedEvent {
        kind: IndicatorKind,
        event: &'static str,
    },
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

/// Returned by an engine provider whose variant cannot run in this process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("implementation unavailable: {0}")]
pub struct Unavailable(pub String);

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::from(ValidationError::NegativeSize { size: -2.0 });
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation error: size must be >= 0, got -2");

        let err = EngineError::UnsupportedEvent {
            kind: IndicatorKind::Cvd,
            event: "snapshot",
        };
        assert_eq!(err.to_string(), "cvd does not accept snapshot events");
        assert!(!err.is_validation());

        let unavailable = Unavailable::new("fast feature disabled");
        assert_eq!(unavailable.reason(), "fast feature disabled");
    }
}
