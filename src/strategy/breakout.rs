use serde::{Deserialize, Serialize};

use crate::indicators::{Band, IndicatorSnapshot};
use crate::models::{BreakoutKind, Candle, SignalEvent};

/// How the volatility gate compares ATR against its threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityMode {
    /// ATR divided by the current close
    Percent,
    /// Raw ATR in quote currency
    Absolute,
}

/// Rejects breakouts that happen while volatility is too low
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VolatilityFilter {
    pub mode: VolatilityMode,
    pub threshold: f64,
}

impl VolatilityFilter {
    pub fn percent(threshold: f64) -> Self {
        Self {
            mode: VolatilityMode::Percent,
            threshold,
        }
    }

    pub fn absolute(threshold: f64) -> Self {
        Self {
            mode: VolatilityMode::Absolute,
            threshold,
        }
    }

    /// Value compared against the threshold
    pub fn measure(&self, volatility: f64, close: f64) -> f64 {
        match self.mode {
            VolatilityMode::Percent => volatility / close,
            VolatilityMode::Absolute => volatility,
        }
    }

    pub fn passes(&self, volatility: f64, close: f64) -> bool {
        self.measure(volatility, close) >= self.threshold
    }
}

/// Detects closes crossing the EMA ± k·ATR band between two candles
#[derive(Debug, Clone)]
pub struct BreakoutDetector {
    multiplier: f64,
    filter: VolatilityFilter,
}

impl BreakoutDetector {
    pub fn new(multiplier: f64, filter: VolatilityFilter) -> Self {
        Self { multiplier, filter }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn filter(&self) -> &VolatilityFilter {
        &self.filter
    }

    /// Classify the move from `prev` to `curr`.
    ///
    /// Gates run first: an open position or a failed volatility check yields
    /// `BreakoutKind::None` no matter what the closes did. If both band
    /// conditions hold (degenerate band), the upper breakout wins.
    pub fn detect(
        &self,
        prev: &IndicatorSnapshot,
        curr: &IndicatorSnapshot,
        prev_close: f64,
        curr_close: f64,
        has_open_position: bool,
    ) -> SignalEvent {
        if has_open_position {
            tracing::debug!("Position already open, skipping entry detection");
            return SignalEvent::none(curr.volatility);
        }

        let (Some(prev_band), Some(curr_band), Some(volatility)) = (
            Band::from_snapshot(prev, self.multiplier),
            Band::from_snapshot(curr, self.multiplier),
            curr.volatility,
        ) else {
            tracing::debug!("Indicators still warming up");
            return SignalEvent::none(curr.volatility);
        };

        if !self.filter.passes(volatility, curr_close) {
            tracing::info!(
                "Volatility too low ({:.6} < {}), skipping",
                self.filter.measure(volatility, curr_close),
                self.filter.threshold
            );
            return SignalEvent::none(Some(volatility));
        }

        let upper = prev_close <= prev_band.upper && curr_close > curr_band.upper;
        let lower = prev_close >= prev_band.lower && curr_close < curr_band.lower;

        let kind = if upper {
            BreakoutKind::UpperBreakout
        } else if lower {
            BreakoutKind::LowerBreakout
        } else {
            BreakoutKind::None
        };

        SignalEvent {
            kind,
            volatility: Some(volatility),
        }
    }

    /// Run [`detect`](Self::detect) on the last two candles of a window
    pub fn detect_window(
        &self,
        candles: &[Candle],
        snapshots: &[IndicatorSnapshot],
        has_open_position: bool,
    ) -> SignalEvent {
        let n = candles.len();
        if n < 2 || snapshots.len() != n {
            return SignalEvent::none(None);
        }

        self.detect(
            &snapshots[n - 2],
            &snapshots[n - 1],
            candles[n - 2].close,
            candles[n - 1].close,
            has_open_position,
        )
    }
}
