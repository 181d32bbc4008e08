// RSI - Wilder's Relative Strength Index over closing prices

use crate::core::types::{Candle, IndicatorValue, RsiValue};
use crate::core::utils::{rma_step, safe_div};
use crate::research::{BarIndicator, Warmup};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    avg_gain: Option<f64>,   // RMA of positive changes
    avg_loss: Option<f64>,   // RMA of negative changes, as magnitude
    warmup: Warmup,
    value: Option<f64>,
}

impl Rsi {
    /// Needs `period + 1` bars: the first only seeds the previous close.
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            avg_gain: None,
            avg_loss: None,
            warmup: Warmup::new(period + 1),
            value: None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    fn compute(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            return if avg_gain > 0.0 { 100.0 } else { 50.0 };
        }
        let rs = safe_div(avg_gain, avg_loss).unwrap_or(0.0);
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl BarIndicator for Rsi {
    fn on_bar(&mut self, candle: &Candle) -> IndicatorValue {
        let close = candle.close;
        let warming = self.warmup.tick();

        if let Some(prev) = self.prev_close.replace(close) {
            let change = close - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            let avg_gain = self.avg_gain.map_or(gain, |g| rma_step(g, gain, self.period));
            let avg_loss = self.avg_loss.map_or(loss, |l| rma_step(l, loss, self.period));
            self.avg_gain = Some(avg_gain);
            self.avg_loss = Some(avg_loss);

            if !warming {
                self.value = Some(Self::compute(avg_gain, avg_loss));
            }
        }

        self.current()
    }

    fn current(&self) -> IndicatorValue {
        IndicatorValue::Rsi(RsiValue {
            rsi: self.value,
            bars_seen: self.warmup.seen(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::tests::bar;

    fn rsi_of(value: IndicatorValue) -> Option<f64> {
        match value {
            IndicatorValue::Rsi(v) => v.rsi,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_warmup_length() {
        let mut rsi = Rsi::new(14);
        for i in 0..14 {
            assert_eq!(rsi_of(rsi.on_bar(&bar(i, 100.0 + i as f64))), None, "bar {}", i);
        }
        assert!(rsi_of(rsi.on_bar(&bar(14, 120.0))).is_some());
    }

    #[test]
    fn test_only_gains_is_100() {
        let mut rsi = Rsi::new(3);
        let mut last = None;
        for i in 0..4 {
            last = rsi_of(rsi.on_bar(&bar(i, 10.0 + i as f64)));
        }
        assert_eq!(last, Some(100.0));
    }

    #[test]
    fn test_flat_is_50() {
        let mut rsi = Rsi::new(3);
        let mut last = None;
        for i in 0..4 {
            last = rsi_of(rsi.on_bar(&bar(i, 10.0)));
        }
        assert_eq!(last, Some(50.0));
    }

    #[test]
    fn test_wilder_smoothing() {
        // period 2: changes +2, -1, +1
        let mut rsi = Rsi::new(2);
        for (i, close) in [10.0, 12.0, 11.0].iter().enumerate() {
            rsi.on_bar(&bar(i as i64, *close));
        }
        // seed gain 2, loss 0; then gain (2+0)/2 = 1, loss (0+1)/2 = 0.5 -> rs 2
        let value = rsi.value().unwrap();
        assert!((value - (100.0 - 100.0 / 3.0)).abs() < 1e-12);

        rsi.on_bar(&bar(3, 12.0));
        // gain (1+1)/2 = 1, loss (0.5+0)/2 = 0.25 -> rs 4 -> 80
        assert!((rsi.value().unwrap() - 80.0).abs() < 1e-12);
    }
}
