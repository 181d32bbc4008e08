// Candle Builder - folds trades into OHLCV bars
// Tick mode emits one bar per trade, interval mode closes a bar on rollover

use crate::core::types::{Candle, Trade};
use crate::core::utils::bucket_start;

/// Outcome of feeding one trade to a [`CandleBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub enum BarUpdate {
    /// A bar is complete and should be fed to the indicator.
    Closed(Candle),
    /// The trade extended the open bar.
    Pending,
    /// The trade belongs to an interval that already closed.
    Stale,
}

#[derive(Debug, Clone)]
pub struct CandleBuilder {
    bar_ms: Option<i64>,
    open: Option<Candle>,
}

impl CandleBuilder {
    pub fn new(bar_ms: Option<i64>) -> Self {
        Self { bar_ms, open: None }
    }

    pub fn is_tick_mode(&self) -> bool {
        self.bar_ms.is_none()
    }

    /// The bar still being built, if any.
    pub fn pending(&self) -> Option<&Candle> {
        self.open.as_ref()
    }

    pub fn push(&mut self, trade: &Trade) -> BarUpdate {
        let Some(bar_ms) = self.bar_ms else {
            return BarUpdate::Closed(Candle::from_trade(trade));
        };

        let open_time = bucket_start(trade.ts, bar_ms);
        match self.open.as_mut() {
            Some(bar) if open_time == bar.open_time => {
                bar.high = bar.high.max(trade.price);
                bar.low = bar.low.min(trade.price);
                bar.close = trade.price;
                bar.volume += trade.size;
                BarUpdate::Pending
            }
            Some(bar) if open_time < bar.open_time => BarUpdate::Stale,
            Some(_) => {
                let next = Self::start(trade, open_time, bar_ms);
                match self.open.replace(next) {
                    Some(closed) => BarUpdate::Closed(closed),
                    None => BarUpdate::Pending,
                }
            }
            None => {
                self.open = Some(Self::start(trade, open_time, bar_ms));
                BarUpdate::Pending
            }
        }
    }

    fn start(trade: &Trade, open_time: i64, bar_ms: i64) -> Candle {
        Candle {
            symbol: trade.symbol.clone(),
            open_time,
            close_time: open_time + bar_ms - 1,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.size,
        }
    }
}
