// Technical indicators module
// EMA centerline and ATR volatility, combined into a per-candle snapshot

pub mod atr;
pub mod moving_average;

pub use atr::{atr_series, calculate_atr, true_range};
pub use moving_average::{calculate_sma, ema_series};

use crate::error::ConfigError;
use crate::models::Candle;

/// Largest period the underlying yata methods accept safely
pub const MAX_PERIOD: usize = 254;

/// Indicator values for one candle; `None` while still warming up
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub centerline: Option<f64>,
    pub volatility: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn is_defined(&self) -> bool {
        self.centerline.is_some() && self.volatility.is_some()
    }
}

/// Volatility band around the centerline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub upper: f64,
    pub lower: f64,
}

impl Band {
    /// `centerline ± multiplier * volatility`, if both are defined
    pub fn from_snapshot(snapshot: &IndicatorSnapshot, multiplier: f64) -> Option<Self> {
        let center = snapshot.centerline?;
        let volatility = snapshot.volatility?;
        Some(Self {
            upper: center + multiplier * volatility,
            lower: center - multiplier * volatility,
        })
    }
}

/// Computes EMA/ATR snapshots over a candle window
#[derive(Debug, Clone)]
pub struct IndicatorAdapter {
    trend_period: usize,
    volatility_period: usize,
}

impl IndicatorAdapter {
    pub fn new(trend_period: usize, volatility_period: usize) -> Result<Self, ConfigError> {
        for (name, period) in [("trend_period", trend_period), ("volatility_period", volatility_period)] {
            if period == 0 || period > MAX_PERIOD {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in 1..={}, got {}",
                    name, MAX_PERIOD, period
                )));
            }
        }

        Ok(Self {
            trend_period,
            volatility_period,
        })
    }

    pub fn trend_period(&self) -> usize {
        self.trend_period
    }

    pub fn volatility_period(&self) -> usize {
        self.volatility_period
    }

    /// Minimum window length for the last snapshot to be defined
    pub fn required_history(&self) -> usize {
        self.trend_period.max(self.volatility_period + 1)
    }

    /// Snapshots aligned 1:1 with `candles`.
    ///
    /// Windows shorter than [`required_history`](Self::required_history) come
    /// back entirely undefined.
    pub fn compute(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot> {
        if candles.len() < self.required_history() {
            return vec![IndicatorSnapshot::default(); candles.len()];
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let centerline = ema_series(&closes, self.trend_period);
        let volatility = atr_series(candles, self.volatility_period);

        centerline
            .into_iter()
            .zip(volatility)
            .map(|(centerline, volatility)| IndicatorSnapshot {
                centerline,
                volatility,
            })
            .collect()
    }
}
