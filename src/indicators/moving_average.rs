use yata::core::{Method, PeriodType};
use yata::methods::EMA;

/// Simple Moving Average of the first `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average aligned with `prices`
///
/// Seeded with the SMA of the first `period` values, so the first defined
/// value sits at index `period - 1` and everything before it is `None`.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; prices.len()];

    let Ok(length) = PeriodType::try_from(period) else {
        return series;
    };
    let Some(seed) = calculate_sma(prices, period) else {
        return series;
    };
    let Ok(mut ema) = EMA::new(length, &seed) else {
        return series;
    };

    series[period - 1] = Some(seed);
    for (slot, price) in series.iter_mut().zip(prices).skip(period) {
        *slot = Some(ema.next(price));
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_ema_warm_up_and_seed() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = ema_series(&prices, 5);

        assert_eq!(ema.len(), prices.len());
        assert!(ema[..4].iter().all(Option::is_none));
        assert_eq!(ema[4], Some(104.0));

        // alpha = 2 / 6, so 104 + (110 - 104) / 3 = 106
        let last = ema[5].unwrap();
        assert!((last - 106.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_too_short_is_undefined() {
        let ema = ema_series(&[1.0, 2.0, 3.0], 5);
        assert_eq!(ema, vec![None, None, None]);
    }
}
