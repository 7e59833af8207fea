//! Exchange connectivity.
//!
//! The execution engine only talks to [`ExchangeGateway`]; [`okx::OkxClient`]
//! is the production implementation.

pub mod okx;

pub use okx::{OkxClient, OkxCredentials};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::{
    Candle, FillResult, OrderRef, PositionSide, Side, TakeProfitSpec, Timeframe,
};

/// Margin mode used when setting leverage and opening positions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Isolated,
    Cross,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Isolated => "isolated",
            MarginMode::Cross => "cross",
        }
    }
}

/// Operations the execution engine needs from an exchange.
///
/// Every call is a single attempt; retrying is left to the next polling
/// cycle.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Recent candles, oldest first
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Whether any non-zero position exists on `symbol`
    async fn fetch_open_positions(&self, symbol: &str) -> Result<bool, GatewayError>;

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OrderRef>, GatewayError>;

    async fn cancel_orders(&self, orders: &[OrderRef], symbol: &str) -> Result<(), GatewayError>;

    /// Submit a market order, returning the exchange order id
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        client_order_id: &str,
        tag: &str,
    ) -> Result<String, GatewayError>;

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<FillResult, GatewayError>;

    async fn place_reduce_only_stop(
        &self,
        symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<String, GatewayError>;

    async fn place_reduce_only_take_profit(
        &self,
        symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        spec: &TakeProfitSpec,
    ) -> Result<String, GatewayError>;

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        position_side: PositionSide,
    ) -> Result<(), GatewayError>;

    /// Total equity held in `currency`
    async fn fetch_balance(&self, currency: &str) -> Result<f64, GatewayError>;
}
