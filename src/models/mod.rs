use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// OHLCV candlestick as returned by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Check that a candle window is usable for indicator work.
///
/// Candles must be strictly increasing in `open_time` and carry finite,
/// positive prices.
pub fn validate_candles(candles: &[Candle]) -> Result<(), DataError> {
    for (index, candle) in candles.iter().enumerate() {
        let prices = [candle.open, candle.high, candle.low, candle.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(DataError::InvalidPrice { index });
        }
    }

    for (index, window) in candles.windows(2).enumerate() {
        if window[1].open_time == window[0].open_time {
            return Err(DataError::Duplicate {
                at: window[1].open_time,
            });
        }
        if window[1].open_time < window[0].open_time {
            return Err(DataError::Unsorted { index: index + 1 });
        }
    }

    Ok(())
}

/// Candle granularity, spelled the way OKX spells its `bar` parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_bar(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
        }
    }

    pub fn as_secs(&self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "3m" => Ok(Timeframe::M3),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "1H" => Ok(Timeframe::H1),
            "4h" | "4H" => Ok(Timeframe::H4),
            "1d" | "1D" => Ok(Timeframe::D1),
            other => Err(format!("unsupported timeframe '{}'", other)),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_bar().to_string()
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_bar())
    }
}

/// Raw band-crossing classification, before any session remap
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BreakoutKind {
    UpperBreakout,
    LowerBreakout,
    None,
}

/// Output of the band detector for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEvent {
    pub kind: BreakoutKind,
    /// Volatility at the current candle (ATR), if it was defined
    pub volatility: Option<f64>,
}

impl SignalEvent {
    pub fn none(volatility: Option<f64>) -> Self {
        Self {
            kind: BreakoutKind::None,
            volatility,
        }
    }

    pub fn is_breakout(&self) -> bool {
        self.kind != BreakoutKind::None
    }
}

/// How a breakout should be traded in the current session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    TrendFollowing,
    CounterTrend,
}

impl TradeMode {
    /// Map a raw breakout to the side of the position to open
    pub fn side_for(&self, kind: BreakoutKind) -> Option<PositionSide> {
        match (self, kind) {
            (_, BreakoutKind::None) => None,
            (TradeMode::TrendFollowing, BreakoutKind::UpperBreakout) => Some(PositionSide::Long),
            (TradeMode::TrendFollowing, BreakoutKind::LowerBreakout) => Some(PositionSide::Short),
            (TradeMode::CounterTrend, BreakoutKind::UpperBreakout) => Some(PositionSide::Short),
            (TradeMode::CounterTrend, BreakoutKind::LowerBreakout) => Some(PositionSide::Long),
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Position side in long/short (hedge) mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    /// Side of the order that opens this position
    pub fn entry_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Side of the orders that reduce this position
    pub fn exit_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }

    /// +1 for long, -1 for short
    pub fn direction(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// Entry order built for one signal; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub position_side: PositionSide,
    pub quantity: f64,
    pub stop_distance: f64,
    pub take_profit_distance: f64,
}

impl OrderIntent {
    pub fn entry_side(&self) -> Side {
        self.position_side.entry_side()
    }

    /// Stop-loss trigger for a given fill price
    pub fn stop_price(&self, entry_price: f64) -> f64 {
        entry_price - self.position_side.direction() * self.stop_distance
    }

    /// Take-profit (or trailing activation) price for a given fill price
    pub fn take_profit_price(&self, entry_price: f64) -> f64 {
        entry_price + self.position_side.direction() * self.take_profit_distance
    }
}

/// Order state as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Unknown(String),
}

/// Result of querying an order by id
#[derive(Debug, Clone, PartialEq)]
pub struct FillResult {
    pub status: OrderStatus,
    pub average_price: Option<f64>,
    pub filled_quantity: f64,
}

impl FillResult {
    /// Confirmed fill price, only when the order is complete
    pub fn confirmed_price(&self) -> Option<f64> {
        match (&self.status, self.average_price) {
            (OrderStatus::Filled, Some(price)) if price.is_finite() && price > 0.0 => Some(price),
            _ => None,
        }
    }
}

/// Kind of open order; algo orders live in a separate book on OKX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Standard,
    Algo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef {
    pub id: String,
    pub kind: OrderKind,
}

/// How the take-profit leg is expressed on the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum TakeProfitSpec {
    /// Trailing stop that activates at `activation_price` and follows by `callback_spread`
    Trailing {
        activation_price: f64,
        callback_spread: f64,
    },
    /// Limit exit at `limit_price`, armed when `trigger_price` trades
    Limit {
        trigger_price: f64,
        limit_price: f64,
    },
}

/// Protective legs placed after a confirmed entry
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectiveOrders {
    pub quantity: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub stop_order_id: String,
    pub take_profit_order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candle_at(minutes: i64, close: f64) -> Candle {
        Candle {
            open_time: DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(minutes),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_validate_accepts_ordered_window() {
        let candles = vec![candle_at(0, 100.0), candle_at(1, 101.0), candle_at(2, 99.0)];
        assert!(validate_candles(&candles).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_disorder() {
        let duplicate = vec![candle_at(0, 100.0), candle_at(0, 101.0)];
        assert!(matches!(
            validate_candles(&duplicate),
            Err(DataError::Duplicate { .. })
        ));

        let unsorted = vec![candle_at(2, 100.0), candle_at(1, 101.0)];
        assert_eq!(
            validate_candles(&unsorted),
            Err(DataError::Unsorted { index: 1 })
        );
    }

    #[test]
    fn test_validate_rejects_bad_prices() {
        let mut candles = vec![candle_at(0, 100.0), candle_at(1, 101.0)];
        candles[1].low = f64::NAN;
        assert_eq!(
            validate_candles(&candles),
            Err(DataError::InvalidPrice { index: 1 })
        );
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("15m".parse::<Timeframe>(), Ok(Timeframe::M15));
        assert_eq!("1h".parse::<Timeframe>(), Ok(Timeframe::H1));
        assert_eq!(Timeframe::H4.as_bar(), "4H");
        assert_eq!(Timeframe::M15.as_secs(), 900);
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_trade_mode_mapping() {
        let trend = TradeMode::TrendFollowing;
        let counter = TradeMode::CounterTrend;

        assert_eq!(trend.side_for(BreakoutKind::UpperBreakout), Some(PositionSide::Long));
        assert_eq!(trend.side_for(BreakoutKind::LowerBreakout), Some(PositionSide::Short));
        assert_eq!(counter.side_for(BreakoutKind::UpperBreakout), Some(PositionSide::Short));
        assert_eq!(counter.side_for(BreakoutKind::LowerBreakout), Some(PositionSide::Long));
        assert_eq!(trend.side_for(BreakoutKind::None), None);
    }

    #[test]
    fn test_protective_prices_follow_side() {
        let long = OrderIntent {
            position_side: PositionSide::Long,
            quantity: 1.0,
            stop_distance: 10.0,
            take_profit_distance: 20.0,
        };
        assert_eq!(long.stop_price(1000.0), 990.0);
        assert_eq!(long.take_profit_price(1000.0), 1020.0);

        let short = OrderIntent {
            position_side: PositionSide::Short,
            ..long
        };
        assert_eq!(short.stop_price(1000.0), 1010.0);
        assert_eq!(short.take_profit_price(1000.0), 980.0);
        assert_eq!(short.entry_side(), Side::Sell);
    }

    #[test]
    fn test_confirmed_price_requires_filled_status() {
        let filled = FillResult {
            status: OrderStatus::Filled,
            average_price: Some(100.0),
            filled_quantity: 1.0,
        };
        assert_eq!(filled.confirmed_price(), Some(100.0));

        let partial = FillResult {
            status: OrderStatus::PartiallyFilled,
            ..filled.clone()
        };
        assert_eq!(partial.confirmed_price(), None);

        let no_price = FillResult {
            average_price: None,
            ..filled
        };
        assert_eq!(no_price.confirmed_price(), None);
    }
}
