// MACD - fast/slow EMA spread with an EMA signal line

use crate::core::types::{Candle, IndicatorValue, MacdValue};
use crate::core::utils::{ema_alpha, ema_step};
use crate::research::{BarIndicator, Warmup};

#[derive(Debug, Clone)]
pub struct Macd {
    fast_alpha: f64,
    slow_alpha: f64,
    signal_alpha: f64,
    ema_fast: Option<f64>,
    ema_slow: Option<f64>,
    signal: Option<f64>,
    warmup: Warmup,
    value: Option<MacdValue>,
}

impl Macd {
    /// EMAs seed with the first close. Output starts after `slow + signal` bars.
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast_alpha: ema_alpha(fast),
            slow_alpha: ema_alpha(slow),
            signal_alpha: ema_alpha(signal),
            ema_fast: None,
            ema_slow: None,
            signal: None,
            warmup: Warmup::new(slow + signal),
            value: None,
        }
    }

    pub fn value(&self) -> Option<&MacdValue> {
        self.value.as_ref()
    }
}

impl BarIndicator for Macd {
    fn on_bar(&mut self, candle: &Candle) -> IndicatorValue {
        let close = candle.close;
        let ema_fast = self.ema_fast.map_or(close, |e| ema_step(e, close, self.fast_alpha));
        let ema_slow = self.ema_slow.map_or(close, |e| ema_step(e, close, self.slow_alpha));
        self.ema_fast = Some(ema_fast);
        self.ema_slow = Some(ema_slow);

        let macd = ema_fast - ema_slow;
        let signal = self.signal.map_or(macd, |s| ema_step(s, macd, self.signal_alpha));
        self.signal = Some(signal);

        if !self.warmup.tick() {
            self.value = Some(MacdValue {
                macd,
                signal,
                histogram: macd - signal,
            });
        }

        self.current()
    }

    fn current(&self) -> IndicatorValue {
        IndicatorValue::Macd(self.value.clone())
    }
}
