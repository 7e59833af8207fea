use std::collections::BTreeSet;

use crate::models::TradeMode;

/// Chooses trend-following or counter-trend trading by UTC hour
pub trait SessionPolicy: Send + Sync {
    fn mode_at(&self, hour_utc: u32) -> TradeMode;

    fn name(&self) -> &str;
}

/// Counter-trend during a fixed set of hours, trend-following otherwise
#[derive(Debug, Clone)]
pub struct HourTablePolicy {
    counter_trend_hours: BTreeSet<u32>,
}

impl HourTablePolicy {
    pub fn new(counter_trend_hours: impl IntoIterator<Item = u32>) -> Self {
        Self {
            counter_trend_hours: counter_trend_hours.into_iter().filter(|h| *h < 24).collect(),
        }
    }
}

impl Default for HourTablePolicy {
    /// Counter-trend from 04:00 to 11:59 UTC
    fn default() -> Self {
        Self::new(4..=11)
    }
}

impl SessionPolicy for HourTablePolicy {
    fn mode_at(&self, hour_utc: u32) -> TradeMode {
        if self.counter_trend_hours.contains(&hour_utc) {
            TradeMode::CounterTrend
        } else {
            TradeMode::TrendFollowing
        }
    }

    fn name(&self) -> &str {
        "hour_table"
    }
}

/// Same mode around the clock
#[derive(Debug, Clone, Copy)]
pub struct FixedModePolicy(pub TradeMode);

impl SessionPolicy for FixedModePolicy {
    fn mode_at(&self, _hour_utc: u32) -> TradeMode {
        self.0
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
