#![allow(dead_code)]

use async_trait::async_trait;
use bandbot::error::{GatewayError, NotifyError};
use bandbot::exchange::{ExchangeGateway, MarginMode};
use bandbot::models::{
    Candle, FillResult, OrderRef, OrderStatus, PositionSide, Side, TakeProfitSpec, Timeframe,
};
use bandbot::notify::Notifier;
use bandbot::BotConfig;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Every mutating call the orchestrator makes
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Cancel(Vec<OrderRef>),
    MarketOrder {
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        tag: String,
    },
    Stop {
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        trigger_price: f64,
    },
    TakeProfit {
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        spec: TakeProfitSpec,
    },
    SetLeverage {
        leverage: u32,
        position_side: PositionSide,
    },
}

#[derive(Default)]
struct Script {
    candles: Vec<Candle>,
    has_position: bool,
    open_orders: Vec<OrderRef>,
    fills: VecDeque<FillResult>,
    last_fill: Option<FillResult>,
    failing: HashSet<&'static str>,
    failing_once: HashSet<&'static str>,
    panic_on_candles: bool,
    calls: Vec<Call>,
}

/// In-memory exchange with scripted responses
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
    candle_fetches: AtomicUsize,
    order_queries: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(candles: Vec<Candle>) -> Self {
        let gateway = Self::default();
        gateway.script.lock().unwrap().candles = candles;
        gateway
    }

    pub fn with_position(self, has_position: bool) -> Self {
        self.script.lock().unwrap().has_position = has_position;
        self
    }

    pub fn with_open_orders(self, orders: Vec<OrderRef>) -> Self {
        self.script.lock().unwrap().open_orders = orders;
        self
    }

    /// Responses to `get_order`, in order; the last one repeats
    pub fn with_fills(self, fills: Vec<FillResult>) -> Self {
        self.script.lock().unwrap().fills = fills.into();
        self
    }

    /// Make the named operation fail, e.g. `"place_reduce_only_stop"`
    pub fn failing(self, operation: &'static str) -> Self {
        self.script.lock().unwrap().failing.insert(operation);
        self
    }

    /// Make the next call to the named operation fail, later calls succeed
    pub fn failing_once(self, operation: &'static str) -> Self {
        self.script.lock().unwrap().failing_once.insert(operation);
        self
    }

    pub fn panicking_on_candles(self) -> Self {
        self.script.lock().unwrap().panic_on_candles = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn candle_fetches(&self) -> usize {
        self.candle_fetches.load(Ordering::SeqCst)
    }

    pub fn order_queries(&self) -> usize {
        self.order_queries.load(Ordering::SeqCst)
    }

    pub fn protective_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Stop { .. } | Call::TakeProfit { .. }))
            .count()
    }

    fn check(&self, operation: &'static str) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        if script.failing.contains(operation) || script.failing_once.remove(operation) {
            return Err(GatewayError::Rejected {
                code: "50001".to_string(),
                msg: format!("scripted {} failure", operation),
            });
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.candle_fetches.fetch_add(1, Ordering::SeqCst);
        if self.script.lock().unwrap().panic_on_candles {
            panic!("scripted panic");
        }
        self.check("fetch_candles")?;
        let candles = self.script.lock().unwrap().candles.clone();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn fetch_open_positions(&self, _symbol: &str) -> Result<bool, GatewayError> {
        self.check("fetch_open_positions")?;
        Ok(self.script.lock().unwrap().has_position)
    }

    async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<OrderRef>, GatewayError> {
        self.check("fetch_open_orders")?;
        Ok(self.script.lock().unwrap().open_orders.clone())
    }

    async fn cancel_orders(&self, orders: &[OrderRef], _symbol: &str) -> Result<(), GatewayError> {
        self.check("cancel_orders")?;
        self.record(Call::Cancel(orders.to_vec()));
        self.script.lock().unwrap().open_orders.clear();
        Ok(())
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        client_order_id: &str,
        tag: &str,
    ) -> Result<String, GatewayError> {
        assert!(!client_order_id.is_empty());
        self.check("place_market_order")?;
        self.record(Call::MarketOrder {
            side,
            position_side,
            quantity,
            tag: tag.to_string(),
        });
        Ok("entry-1".to_string())
    }

    async fn get_order(&self, order_id: &str, _symbol: &str) -> Result<FillResult, GatewayError> {
        assert_eq!(order_id, "entry-1");
        self.order_queries.fetch_add(1, Ordering::SeqCst);
        self.check("get_order")?;

        let mut script = self.script.lock().unwrap();
        if let Some(fill) = script.fills.pop_front() {
            script.last_fill = Some(fill.clone());
            return Ok(fill);
        }
        Ok(script.last_fill.clone().unwrap_or(FillResult {
            status: OrderStatus::Open,
            average_price: None,
            filled_quantity: 0.0,
        }))
    }

    async fn place_reduce_only_stop(
        &self,
        _symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<String, GatewayError> {
        self.check("place_reduce_only_stop")?;
        self.record(Call::Stop {
            side,
            position_side,
            quantity,
            trigger_price,
        });
        Ok("stop-1".to_string())
    }

    async fn place_reduce_only_take_profit(
        &self,
        _symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        spec: &TakeProfitSpec,
    ) -> Result<String, GatewayError> {
        self.check("place_reduce_only_take_profit")?;
        self.record(Call::TakeProfit {
            side,
            position_side,
            quantity,
            spec: spec.clone(),
        });
        Ok("tp-1".to_string())
    }

    async fn set_leverage(
        &self,
        _symbol: &str,
        leverage: u32,
        _margin_mode: MarginMode,
        position_side: PositionSide,
    ) -> Result<(), GatewayError> {
        self.check("set_leverage")?;
        self.record(Call::SetLeverage {
            leverage,
            position_side,
        });
        Ok(())
    }

    async fn fetch_balance(&self, _currency: &str) -> Result<f64, GatewayError> {
        self.check("fetch_balance")?;
        Ok(1000.0)
    }
}

/// Collects notifications instead of sending them
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

/// Notifier whose endpoint always answers 500
#[derive(Default)]
pub struct FailingNotifier {
    attempts: AtomicUsize,
}

impl FailingNotifier {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
    }
}

/// 14:00 UTC, a trend-following hour under the default session table
pub fn afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
}

/// 06:00 UTC, counter-trend under the default session table
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
}

fn candle(index: usize, close: f64) -> Candle {
    Candle {
        open_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
            + Duration::minutes(index as i64),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 50.0,
    }
}

/// Closes alternating 100.5 / 99.5: EMA near 100, ATR 2
pub fn quiet_window(len: usize) -> Vec<Candle> {
    (0..len)
        .map(|i| candle(i, if i % 2 == 0 { 100.5 } else { 99.5 }))
        .collect()
}

/// Quiet window whose last candle closes at `last_close`
pub fn window_ending_at(len: usize, last_close: f64) -> Vec<Candle> {
    let mut candles = quiet_window(len - 1);
    candles.push(candle(len - 1, last_close));
    candles
}

/// Last candle jumps far above the upper band
pub fn upper_breakout_window(len: usize) -> Vec<Candle> {
    window_ending_at(len, 130.0)
}

/// Last candle drops far below the lower band
pub fn lower_breakout_window(len: usize) -> Vec<Candle> {
    window_ending_at(len, 70.0)
}

pub fn filled(price: f64, quantity: f64) -> FillResult {
    FillResult {
        status: OrderStatus::Filled,
        average_price: Some(price),
        filled_quantity: quantity,
    }
}

pub fn pending() -> FillResult {
    FillResult {
        status: OrderStatus::Open,
        average_price: None,
        filled_quantity: 0.0,
    }
}

/// Live-1m style settings with fast fill polling
pub fn test_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.fill.poll_attempts = 3;
    config.fill.poll_interval_ms = 10;
    config
}
