use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{ExchangeGateway, MarginMode};
use crate::error::GatewayError;
use crate::models::{
    Candle, FillResult, OrderKind, OrderRef, OrderStatus, PositionSide, Side, TakeProfitSpec,
    Timeframe,
};

pub const OKX_API_BASE: &str = "https://www.okx.com";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;
// Algo order types we place and therefore have to clean up
const ALGO_ORDER_TYPES: [&str; 2] = ["conditional", "move_order_stop"];

type HmacSha256 = Hmac<Sha256>;

type OkxRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API key triple for private endpoints
#[derive(Clone)]
pub struct OkxCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl OkxCredentials {
    /// Read `OKX_API_KEY`, `OKX_API_SECRET` and `OKX_API_PASSPHRASE`
    pub fn from_env() -> Result<Self, GatewayError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(GatewayError::Credentials(name))
        };

        Ok(Self {
            api_key: read("OKX_API_KEY")?,
            api_secret: read("OKX_API_SECRET")?,
            passphrase: read("OKX_API_PASSPHRASE")?,
        })
    }
}

impl std::fmt::Debug for OkxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxCredentials")
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Connection settings for [`OkxClient`]
#[derive(Debug, Clone)]
pub struct OkxSettings {
    pub base_url: String,
    pub credentials: Option<OkxCredentials>,
    /// Send `x-simulated-trading: 1` (demo trading)
    pub sandbox: bool,
    pub proxy: Option<String>,
    pub margin_mode: MarginMode,
    pub requests_per_second: u32,
}

impl Default for OkxSettings {
    fn default() -> Self {
        Self {
            base_url: OKX_API_BASE.to_string(),
            credentials: None,
            sandbox: false,
            proxy: None,
            margin_mode: MarginMode::Isolated,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

/// OKX v5 REST client for perpetual swaps
///
/// Cloneable; clones share the HTTP connection pool and the rate limiter.
#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
    credentials: Option<OkxCredentials>,
    sandbox: bool,
    margin_mode: MarginMode,
    rate_limiter: Arc<OkxRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRaw {
    #[serde(default)]
    inst_id: String,
    #[serde(default)]
    pos: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingOrderRaw {
    ord_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingAlgoRaw {
    algo_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    algo_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

impl OrderAck {
    fn is_rejected(&self) -> bool {
        !self.s_code.is_empty() && self.s_code != "0"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetailRaw {
    state: String,
    #[serde(default)]
    avg_px: String,
    #[serde(default)]
    acc_fill_sz: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRaw {
    #[serde(default)]
    details: Vec<BalanceDetailRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceDetailRaw {
    ccy: String,
    #[serde(default)]
    eq: String,
}

// ============== Implementation ==============

impl OkxClient {
    pub fn new(settings: OkxSettings) -> Result<Self, GatewayError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        if let Some(proxy) = settings.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;

        let rps = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credentials: settings.credentials,
            sandbox: settings.sandbox,
            margin_mode: settings.margin_mode,
            rate_limiter,
        })
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, GatewayError> {
        self.send(Method::GET, path, query, None, false).await
    }

    async fn private_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, GatewayError> {
        self.send(Method::GET, path, query, None, true).await
    }

    async fn private_post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Vec<T>, GatewayError> {
        self.send(Method::POST, path, &[], Some(body), true).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        signed: bool,
    ) -> Result<Vec<T>, GatewayError> {
        self.rate_limiter.until_ready().await;

        let request_path = if query.is_empty() {
            path.to_string()
        } else {
            let encoded: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("{}?{}", path, encoded.join("&"))
        };
        let body = body.map(Value::to_string).unwrap_or_default();

        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, request_path));

        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        if signed {
            let credentials = self
                .credentials
                .as_ref()
                .ok_or(GatewayError::Credentials("OKX_API_KEY"))?;
            let timestamp = okx_timestamp(Utc::now());
            let signature = sign_request(
                &credentials.api_secret,
                &timestamp,
                method.as_str(),
                &request_path,
                &body,
            )?;

            request = request
                .header("OK-ACCESS-KEY", &credentials.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", &credentials.passphrase);
        }

        if self.sandbox {
            request = request.header("x-simulated-trading", "1");
        }

        tracing::debug!("OKX {} {}", method, request_path);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            GatewayError::Decode(format!(
                "{} (HTTP {}): {}",
                e,
                status,
                text.chars().take(200).collect::<String>()
            ))
        })?;

        if envelope.code != "0" {
            return Err(GatewayError::Rejected {
                code: envelope.code,
                msg: envelope.msg,
            });
        }

        Ok(envelope.data)
    }

    /// First acknowledgement of an order placement, with per-order status checked
    fn first_ack(acks: Vec<OrderAck>) -> Result<OrderAck, GatewayError> {
        let ack = acks
            .into_iter()
            .next()
            .ok_or(GatewayError::MissingData("order acknowledgement"))?;

        if ack.is_rejected() {
            return Err(GatewayError::Rejected {
                code: ack.s_code,
                msg: ack.s_msg,
            });
        }

        Ok(ack)
    }

    /// Fails on the first item of a batch response whose `sCode` is non-zero
    fn check_acks(acks: Vec<OrderAck>) -> Result<(), GatewayError> {
        match acks.into_iter().find(OrderAck::is_rejected) {
            Some(failed) => Err(GatewayError::Rejected {
                code: failed.s_code,
                msg: failed.s_msg,
            }),
            None => Ok(()),
        }
    }

    async fn place_algo(&self, body: Value) -> Result<String, GatewayError> {
        let acks: Vec<OrderAck> = self.private_post("/api/v5/trade/order-algo", &body).await?;
        let ack = Self::first_ack(acks)?;
        if ack.algo_id.is_empty() {
            return Err(GatewayError::MissingData("algoId"));
        }
        Ok(ack.algo_id)
    }
}

#[async_trait]
impl ExchangeGateway for OkxClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let rows: Vec<Vec<String>> = self
            .public_get(
                "/api/v5/market/candles",
                &[
                    ("instId", symbol.to_string()),
                    ("bar", timeframe.as_bar().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        // OKX returns newest first
        let mut candles = rows
            .iter()
            .map(|row| parse_candle(row))
            .collect::<Result<Vec<_>, _>>()?;
        candles.reverse();
        Ok(candles)
    }

    async fn fetch_open_positions(&self, symbol: &str) -> Result<bool, GatewayError> {
        let positions: Vec<PositionRaw> = self
            .private_get("/api/v5/account/positions", &[("instId", symbol.to_string())])
            .await?;

        Ok(positions
            .iter()
            .filter(|p| p.inst_id.is_empty() || p.inst_id == symbol)
            .any(|p| parse_number(&p.pos).is_some_and(|size| size != 0.0)))
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OrderRef>, GatewayError> {
        let pending: Vec<PendingOrderRaw> = self
            .private_get("/api/v5/trade/orders-pending", &[("instId", symbol.to_string())])
            .await?;

        let mut orders: Vec<OrderRef> = pending
            .into_iter()
            .map(|o| OrderRef {
                id: o.ord_id,
                kind: OrderKind::Standard,
            })
            .collect();

        for ord_type in ALGO_ORDER_TYPES {
            let algos: Vec<PendingAlgoRaw> = self
                .private_get(
                    "/api/v5/trade/orders-algo-pending",
                    &[("instId", symbol.to_string()), ("ordType", ord_type.to_string())],
                )
                .await?;
            orders.extend(algos.into_iter().map(|a| OrderRef {
                id: a.algo_id,
                kind: OrderKind::Algo,
            }));
        }

        Ok(orders)
    }

    async fn cancel_orders(&self, orders: &[OrderRef], symbol: &str) -> Result<(), GatewayError> {
        let standard: Vec<Value> = orders
            .iter()
            .filter(|o| o.kind == OrderKind::Standard)
            .map(|o| json!({ "instId": symbol, "ordId": o.id }))
            .collect();
        let algo: Vec<Value> = orders
            .iter()
            .filter(|o| o.kind == OrderKind::Algo)
            .map(|o| json!({ "instId": symbol, "algoId": o.id }))
            .collect();

        if !standard.is_empty() {
            let acks: Vec<OrderAck> = self
                .private_post("/api/v5/trade/cancel-batch-orders", &Value::Array(standard))
                .await?;
            Self::check_acks(acks)?;
        }

        if !algo.is_empty() {
            let acks: Vec<OrderAck> = self
                .private_post("/api/v5/trade/cancel-algos", &Value::Array(algo))
                .await?;
            Self::check_acks(acks)?;
        }

        Ok(())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        client_order_id: &str,
        tag: &str,
    ) -> Result<String, GatewayError> {
        let body = json!({
            "instId": symbol,
            "tdMode": self.margin_mode.as_str(),
            "side": side.as_str(),
            "posSide": position_side.as_str(),
            "ordType": "market",
            "sz": quantity.to_string(),
            "clOrdId": client_order_id,
            "tag": tag,
        });

        let acks: Vec<OrderAck> = self.private_post("/api/v5/trade/order", &body).await?;
        let ack = Self::first_ack(acks)?;
        if ack.ord_id.is_empty() {
            return Err(GatewayError::MissingData("ordId"));
        }
        Ok(ack.ord_id)
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<FillResult, GatewayError> {
        let details: Vec<OrderDetailRaw> = self
            .private_get(
                "/api/v5/trade/order",
                &[("instId", symbol.to_string()), ("ordId", order_id.to_string())],
            )
            .await?;

        let detail = details
            .into_iter()
            .next()
            .ok_or(GatewayError::MissingData("order detail"))?;

        Ok(FillResult {
            status: parse_order_state(&detail.state),
            average_price: parse_number(&detail.avg_px).filter(|p| *p > 0.0),
            filled_quantity: parse_number(&detail.acc_fill_sz).unwrap_or(0.0),
        })
    }

    async fn place_reduce_only_stop(
        &self,
        symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<String, GatewayError> {
        self.place_algo(json!({
            "instId": symbol,
            "tdMode": self.margin_mode.as_str(),
            "side": side.as_str(),
            "posSide": position_side.as_str(),
            "ordType": "conditional",
            "sz": quantity.to_string(),
            "reduceOnly": true,
            "slTriggerPx": trigger_price.to_string(),
            // -1 executes the stop at market
            "slOrdPx": "-1",
        }))
        .await
    }

    async fn place_reduce_only_take_profit(
        &self,
        symbol: &str,
        side: Side,
        position_side: PositionSide,
        quantity: f64,
        spec: &TakeProfitSpec,
    ) -> Result<String, GatewayError> {
        let mut body = json!({
            "instId": symbol,
            "tdMode": self.margin_mode.as_str(),
            "side": side.as_str(),
            "posSide": position_side.as_str(),
            "sz": quantity.to_string(),
            "reduceOnly": true,
        });

        let extra = match spec {
            TakeProfitSpec::Trailing {
                activation_price,
                callback_spread,
            } => json!({
                "ordType": "move_order_stop",
                "activePx": activation_price.to_string(),
                "callbackSpread": callback_spread.to_string(),
            }),
            TakeProfitSpec::Limit {
                trigger_price,
                limit_price,
            } => json!({
                "ordType": "conditional",
                "tpTriggerPx": trigger_price.to_string(),
                "tpOrdPx": limit_price.to_string(),
            }),
        };

        if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
            target.extend(fields);
        }

        self.place_algo(body).await
    }

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: MarginMode,
        position_side: PositionSide,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "instId": symbol,
            "lever": leverage.to_string(),
            "mgnMode": margin_mode.as_str(),
            "posSide": position_side.as_str(),
        });

        let _: Vec<Value> = self.private_post("/api/v5/account/set-leverage", &body).await?;
        Ok(())
    }

    async fn fetch_balance(&self, currency: &str) -> Result<f64, GatewayError> {
        let balances: Vec<BalanceRaw> = self
            .private_get("/api/v5/account/balance", &[("ccy", currency.to_string())])
            .await?;

        balances
            .iter()
            .flat_map(|b| b.details.iter())
            .find(|d| d.ccy == currency)
            .and_then(|d| parse_number(&d.eq))
            .ok_or(GatewayError::MissingData("balance for currency"))
    }
}

// ============== Helpers ==============

/// OKX signature: base64(HMAC-SHA256(secret, timestamp + method + path + body))
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::Credentials("OKX_API_SECRET"))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// ISO-8601 with milliseconds, as OKX expects in `OK-ACCESS-TIMESTAMP`
fn okx_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn parse_number(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_order_state(state: &str) -> OrderStatus {
    match state {
        "live" => OrderStatus::Open,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "canceled" | "mmp_canceled" => OrderStatus::Canceled,
        other => OrderStatus::Unknown(other.to_string()),
    }
}

/// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`
fn parse_candle(row: &[String]) -> Result<Candle, GatewayError> {
    if row.len() < 6 {
        return Err(GatewayError::Decode(format!(
            "candle row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let field = |i: usize| {
        parse_number(&row[i])
            .ok_or_else(|| GatewayError::Decode(format!("bad candle field {}: '{}'", i, row[i])))
    };

    let millis = row[0]
        .parse::<i64>()
        .map_err(|e| GatewayError::Decode(format!("bad candle timestamp '{}': {}", row[0], e)))?;
    let open_time = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| GatewayError::Decode(format!("candle timestamp out of range: {}", millis)))?;

    Ok(Candle {
        open_time,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candle_row() {
        let row: Vec<String> = ["1700000000000", "100.5", "101", "99.5", "100.8", "12.3", "0", "0", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let candle = parse_candle(&row).unwrap();
        assert_eq!(candle.open_time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.close, 100.8);
        assert_eq!(candle.volume, 12.3);
    }

    #[test]
    fn test_parse_candle_rejects_garbage() {
        let row: Vec<String> = ["1700000000000", "abc", "1", "1", "1", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(matches!(parse_candle(&row), Err(GatewayError::Decode(_))));
        assert!(parse_candle(&row[..3]).is_err());
    }

    #[test]
    fn test_order_state_mapping() {
        assert_eq!(parse_order_state("filled"), OrderStatus::Filled);
        assert_eq!(parse_order_state("live"), OrderStatus::Open);
        assert_eq!(parse_order_state("mmp_canceled"), OrderStatus::Canceled);
        assert_eq!(
            parse_order_state("weird"),
            OrderStatus::Unknown("weird".to_string())
        );
    }

    #[test]
    fn test_timestamp_format() {
        let ts = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(okx_timestamp(ts), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_signature_is_deterministic_base64() {
        let a = sign_request("secret", "2023-11-14T22:13:20.123Z", "GET", "/api/v5/account/balance?ccy=USDT", "").unwrap();
        let b = sign_request("secret", "2023-11-14T22:13:20.123Z", "GET", "/api/v5/account/balance?ccy=USDT", "").unwrap();
        let c = sign_request("other", "2023-11-14T22:13:20.123Z", "GET", "/api/v5/account/balance?ccy=USDT", "").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32-byte digest encodes to 44 base64 characters
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = OkxCredentials {
            api_key: "key".into(),
            api_secret: "super-secret".into(),
            passphrase: "pass".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("super-secret"));
    }
}
