// Numeric helpers shared by the engines

use crate::core::error::ValidationError;

/// Largest bucket index whose price is still an exactly representable multiple.
pub const MAX_BUCKET_INDEX: i64 = 1 << 53;

/// Division that refuses to produce NaN or infinity.
#[inline]
pub fn safe_div(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return None;
    }
    let out = num / den;
    out.is_finite().then_some(out)
}

/// Bucket index of `price` on a grid of `width`, rounding to nearest.
/// Ratios past [`MAX_BUCKET_INDEX`] would merge distinct prices and are rejected.
#[inline]
pub fn quantize_index(price: f64, width: f64) -> Result<i64, ValidationError> {
    let index = (price / width).round();
    if !index.is_finite() || index.abs() > MAX_BUCKET_INDEX as f64 {
        return Err(ValidationError::PriceOutOfRange { price, step: width });
    }
    Ok(index as i64)
}

#[inline]
pub fn bucket_price(index: i64, width: f64) -> f64 {
    index as f64 * width
}

/// One EMA update with smoothing `alpha = 2 / (period + 1)`.
#[inline]
pub fn ema_step(prev: f64, value: f64, alpha: f64) -> f64 {
    prev + alpha * (value - prev)
}

#[inline]
pub fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Wilder's running moving average: `(prev * (n - 1) + value) / n`.
#[inline]
pub fn rma_step(prev: f64, value: f64, period: usize) -> f64 {
    let n = period as f64;
    (prev * (n - 1.0) + value) / n
}

/// Session id for `ts`. Floors toward negative infinity so pre-epoch stamps stay ordered.
#[inline]
pub fn session_of(ts: i64, session_ms: i64) -> i64 {
    ts.div_euclid(session_ms)
}

#[inline]
pub fn bucket_start(ts: i64, bucket_ms: i64) -> i64 {
    ts - ts.rem_euclid(bucket_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(10.0, 4.0), Some(2.5));
        assert_eq!(safe_div(1.0, 0.0), None);
        assert_eq!(safe_div(f64::NAN, 1.0), None);
        assert_eq!(safe_div(1.0, f64::INFINITY), None);
        assert_eq!(safe_div(f64::MAX, 1e-300), None);
    }

    #[test]
    fn test_quantize_index() {
        assert_eq!(quantize_index(100.004, 0.01), Ok(10000));
        assert_eq!(quantize_index(100.006, 0.01), Ok(10001));
        assert_eq!(quantize_index(50_012.0, 5.0), Ok(10002));
        assert_eq!(bucket_price(10002, 5.0), 50_010.0);
    }

    #[test]
    fn test_quantize_index_out_of_range() {
        assert_eq!(
            quantize_index(1e17, 0.01),
            Err(ValidationError::PriceOutOfRange { price: 1e17, step: 0.01 })
        );
        assert!(quantize_index(1.0, 0.0).is_err());
        assert_eq!(quantize_index(MAX_BUCKET_INDEX as f64, 1.0), Ok(MAX_BUCKET_INDEX));
    }

    #[test]
    fn test_smoothing_steps() {
        assert_eq!(ema_alpha(1), 1.0);
        assert!((ema_step(10.0, 20.0, ema_alpha(3)) - 15.0).abs() < 1e-12);
        assert!((rma_step(10.0, 24.0, 14) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_sessions_and_buckets() {
        assert_eq!(session_of(86_399_999, 86_400_000), 0);
        assert_eq!(session_of(86_400_000, 86_400_000), 1);
        assert_eq!(session_of(-1, 86_400_000), -1);
        assert_eq!(bucket_start(1_234_567_890, 1000), 1_234_567_000);
        assert_eq!(bucket_start(-1, 1000), -1000);
    }
}
