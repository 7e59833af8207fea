use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure of a call to the exchange
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange rejected request (code {code}): {msg}")]
    Rejected { code: String, msg: String },

    #[error("failed to decode exchange response: {0}")]
    Decode(String),

    #[error("exchange response missing {0}")]
    MissingData(&'static str),

    #[error("credentials not configured: {0}")]
    Credentials(&'static str),
}

/// Unusable market data
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("candle {index} is older than its predecessor")]
    Unsorted { index: usize },

    #[error("duplicate candle at {at}")]
    Duplicate { at: DateTime<Utc> },

    #[error("candle {index} has a non-finite or non-positive price")]
    InvalidPrice { index: usize },
}

/// Why a quantity could not be derived
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SizingError {
    #[error("stop distance must be positive, got {0}")]
    NonPositiveStopDistance(f64),

    #[error("risk budget must be positive, got {0}")]
    NonPositiveRiskBudget(f64),

    #[error("leverage must be at least 1, got {0}")]
    InvalidLeverage(u32),

    #[error("quantity {quantity} rounds below lot size {lot_size}")]
    BelowLotSize { quantity: f64, lot_size: f64 },
}

/// Failure that ends a cycle before any order reached the exchange
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("market data rejected: {0}")]
    Data(#[from] DataError),

    #[error("{stage} failed: {source}")]
    Gateway {
        stage: &'static str,
        #[source]
        source: GatewayError,
    },
}

impl CycleError {
    pub fn gateway(stage: &'static str, source: GatewayError) -> Self {
        CycleError::Gateway { stage, source }
    }
}

/// Invalid or unreadable configuration; fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Notification delivery failure
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification endpoint returned {0}")]
    Status(reqwest::StatusCode),
}
