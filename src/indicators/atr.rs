/// Average True Range (ATR) indicator
///
/// Measures market volatility by averaging true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (yata's RMA) after a simple-average seed.

use yata::core::{Method, PeriodType};
use yata::methods::RMA;

use crate::models::Candle;

/// True range of `candles[index]`; `None` for the first candle (no previous close)
pub fn true_range(candles: &[Candle], index: usize) -> Option<f64> {
    if index == 0 || index >= candles.len() {
        return None;
    }

    let high = candles[index].high;
    let low = candles[index].low;
    let prev_close = candles[index - 1].close;

    Some(
        (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs()),
    )
}

/// ATR aligned with `candles`
///
/// The first defined value is at index `period`: it is the mean of the true
/// ranges of candles 1..=period.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; candles.len()];

    let Ok(length) = PeriodType::try_from(period) else {
        return series;
    };
    if period == 0 || candles.len() < period + 1 {
        return series;
    }

    let true_ranges: Vec<f64> = (1..candles.len())
        .filter_map(|i| true_range(candles, i))
        .collect();

    let seed = true_ranges.iter().take(period).sum::<f64>() / period as f64;
    let Ok(mut rma) = RMA::new(length, &seed) else {
        return series;
    };

    series[period] = Some(seed);
    for (offset, tr) in true_ranges.iter().enumerate().skip(period) {
        // true_ranges[k] belongs to candle k + 1
        series[offset + 1] = Some(rma.next(tr));
    }

    series
}

/// Latest ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    atr_series(candles, period).last().copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                open_time: Utc::now() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr() {
        // Low volatility market
        let low_vol_prices = vec![(100.0, 101.0, 99.0, 100.0); 15];

        let candles = create_test_candles(&low_vol_prices);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_some());
        // Every true range is exactly 2.0
        assert!((atr.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        // High volatility market with gaps
        let high_vol_prices = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let candles = create_test_candles(&high_vol_prices);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_some());
        assert!(atr.unwrap() > 10.0);
    }

    #[test]
    fn test_insufficient_data() {
        let prices = vec![(100.0, 101.0, 99.0, 100.0), (100.0, 101.0, 99.0, 100.0)];

        let candles = create_test_candles(&prices);
        assert!(calculate_atr(&candles, 14).is_none());
        assert!(atr_series(&candles, 14).iter().all(Option::is_none));
    }

    #[test]
    fn test_atr_series_alignment() {
        let mut prices = vec![(100.0, 105.0, 95.0, 100.0); 15];
        prices.push((100.0, 120.0, 100.0, 110.0));

        let candles = create_test_candles(&prices);
        let series = atr_series(&candles, 14);

        assert_eq!(series.len(), candles.len());
        assert!(series[..14].iter().all(Option::is_none));
        assert_eq!(series[14], Some(10.0));
        // Wilder step: (10 * 13 + 20) / 14
        let last = series[15].unwrap();
        assert!((last - 150.0 / 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0), (110.0, 112.0, 108.0, 111.0)]);
        assert_eq!(true_range(&candles, 0), None);
        assert_eq!(true_range(&candles, 1), Some(12.0));
    }
}
