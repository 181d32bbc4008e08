// ADX - Wilder's Average Directional Index with +DI/-DI

use crate::core::types::{AdxValue, Candle, IndicatorValue};
use crate::core::utils::{rma_step, safe_div};
use crate::research::{BarIndicator, Warmup};

#[derive(Debug, Clone, Copy)]
struct PrevBar {
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    prev: Option<PrevBar>,
    tr: Option<f64>,        // smoothed true range
    plus_dm: Option<f64>,
    minus_dm: Option<f64>,
    adx: Option<f64>,
    warmup: Warmup,
    value: Option<AdxValue>,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            tr: None,
            plus_dm: None,
            minus_dm: None,
            adx: None,
            warmup: Warmup::new(period + 1),
            value: None,
        }
    }

    fn smooth(&self, prev: Option<f64>, value: f64) -> f64 {
        prev.map_or(value, |p| rma_step(p, value, self.period))
    }
}

impl BarIndicator for Adx {
    fn on_bar(&mut self, candle: &Candle) -> IndicatorValue {
        let warming = self.warmup.tick();
        let current = PrevBar {
            high: candle.high,
            low: candle.low,
            close: candle.close,
        };

        let Some(prev) = self.prev.replace(current) else {
            return self.current();
        };

        let tr = (current.high - current.low)
            .max((current.high - prev.close).abs())
            .max((current.low - prev.close).abs());
        let up = current.high - prev.high;
        let down = prev.low - current.low;
        let plus_dm = if up > 0.0 && up > down { up } else { 0.0 };
        let minus_dm = if down > 0.0 && down > up { down } else { 0.0 };

        let tr = self.smooth(self.tr, tr);
        let plus_dm = self.smooth(self.plus_dm, plus_dm);
        let minus_dm = self.smooth(self.minus_dm, minus_dm);
        self.tr = Some(tr);
        self.plus_dm = Some(plus_dm);
        self.minus_dm = Some(minus_dm);

        if warming {
            return self.current();
        }

        // No range or no directional movement: DX is undefined for this bar
        let (Some(plus_di), Some(minus_di)) = (safe_div(plus_dm, tr), safe_div(minus_dm, tr)) else {
            self.value = None;
            return self.current();
        };
        let plus_di = plus_di * 100.0;
        let minus_di = minus_di * 100.0;
        let Some(dx) = safe_div((plus_di - minus_di).abs(), plus_di + minus_di) else {
            self.value = None;
            return self.current();
        };

        let adx = self.smooth(self.adx, dx * 100.0);
        self.adx = Some(adx);
        self.value = Some(AdxValue {
            plus_di,
            minus_di,
            adx,
        });
        self.current()
    }

    fn current(&self) -> IndicatorValue {
        IndicatorValue::Adx(self.value.clone())
    }
}
