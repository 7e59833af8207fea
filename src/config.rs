//! Bot configuration.
//!
//! Values are layered: built-in defaults, `config/default.toml`, an optional
//! profile under `config/profiles/`, then `BANDBOT__*` environment variables
//! (e.g. `BANDBOT__SYMBOL`, `BANDBOT__SCHEDULE__POLL_INTERVAL_SECS`).
//! The result is validated once and passed by reference to every component.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::exchange::okx::{OkxCredentials, OkxSettings, OKX_API_BASE};
use crate::exchange::MarginMode;
use crate::indicators::IndicatorAdapter;
use crate::models::{Timeframe, TradeMode};
use crate::strategy::{FixedModePolicy, HourTablePolicy, SessionPolicy, VolatilityFilter};

/// OKX returns at most this many candles per request
const MAX_CANDLE_LIMIT: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    /// OKX instrument id, e.g. `BTC-USDT-SWAP`
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Candles fetched per cycle
    pub candle_limit: usize,
    /// EMA period for the centerline
    pub trend_period: usize,
    /// ATR period for the band width
    pub volatility_period: usize,
    pub band_multiplier: f64,
    pub volatility_filter: VolatilityFilter,
    /// Take-profit distance as a multiple of the stop distance
    pub risk_reward: f64,
    pub leverage: u32,
    pub margin_mode: MarginMode,
    /// Quote currency lost if the stop is hit
    pub risk_budget: f64,
    /// Contracts per unit of quote risk per unit of price move
    pub contract_multiplier: f64,
    pub lot_size: f64,
    pub tick_size: f64,
    pub take_profit_mode: TakeProfitMode,
    pub session: SessionConfig,
    pub schedule: ScheduleConfig,
    pub fill: FillConfig,
    pub exchange: ExchangeConfig,
    pub notifier: NotifierConfig,
    /// Detect and size but never send orders
    pub dry_run: bool,
}

/// Shape of the take-profit leg
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfitMode {
    /// Trailing stop activated at the target
    Trailing,
    /// Limit exit at the target, triggered halfway there
    Limit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicyKind {
    HourTable,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub policy: SessionPolicyKind,
    /// UTC hours traded counter-trend by the hour table
    pub counter_trend_hours: Vec<u32>,
    /// Mode used by the fixed policy
    pub fixed_mode: TradeMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicyKind::HourTable,
            counter_trend_hours: (4..=11).collect(),
            fixed_mode: TradeMode::TrendFollowing,
        }
    }
}

impl SessionConfig {
    pub fn build_policy(&self) -> Box<dyn SessionPolicy> {
        match self.policy {
            SessionPolicyKind::HourTable => {
                Box::new(HourTablePolicy::new(self.counter_trend_hours.iter().copied()))
            }
            SessionPolicyKind::Fixed => Box::new(FixedModePolicy(self.fixed_mode)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub poll_interval_secs: u64,
    /// Pause after a failed cycle before the loop resumes
    pub error_backoff_secs: u64,
    /// Start the first cycle on a candle boundary
    pub align_to_timeframe: bool,
    /// Delay after the boundary so the closed candle is published
    pub settle_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            error_backoff_secs: 60,
            align_to_timeframe: false,
            settle_delay_secs: 2,
        }
    }
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// Bounded wait for the entry fill
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FillConfig {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 3,
            poll_interval_ms: 1000,
        }
    }
}

impl FillConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Demo trading
    pub sandbox: bool,
    /// HTTP(S) proxy, e.g. `http://127.0.0.1:7897`
    pub proxy: Option<String>,
    pub requests_per_second: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: OKX_API_BASE.to_string(),
            sandbox: true,
            proxy: None,
            requests_per_second: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct NotifierConfig {
    /// Alerts go to the log only when unset
    pub webhook_url: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::M1,
            candle_limit: 100,
            trend_period: 21,
            volatility_period: 10,
            band_multiplier: 4.0,
            volatility_filter: VolatilityFilter::percent(0.0007),
            risk_reward: 1.0,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            risk_budget: 1.0,
            contract_multiplier: 100.0,
            lot_size: 0.01,
            tick_size: 0.1,
            take_profit_mode: TakeProfitMode::Trailing,
            session: SessionConfig::default(),
            schedule: ScheduleConfig::default(),
            fill: FillConfig::default(),
            exchange: ExchangeConfig::default(),
            notifier: NotifierConfig::default(),
            dry_run: false,
        }
    }
}

impl BotConfig {
    /// Load `default.toml`, the optional profile and the environment
    pub fn load(config_dir: &Path, profile: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        );

        if let Some(profile) = profile {
            let path = config_dir.join("profiles").join(profile);
            builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("BANDBOT")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: BotConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".into());
        }

        let adapter = IndicatorAdapter::new(self.trend_period, self.volatility_period)?;
        // One extra candle so the previous snapshot is defined too
        let needed = adapter.required_history() + 1;
        if self.candle_limit < needed || self.candle_limit > MAX_CANDLE_LIMIT {
            return invalid(format!(
                "candle_limit must be in {}..={} for these periods, got {}",
                needed, MAX_CANDLE_LIMIT, self.candle_limit
            ));
        }

        let positive = [
            ("band_multiplier", self.band_multiplier),
            ("risk_reward", self.risk_reward),
            ("risk_budget", self.risk_budget),
            ("contract_multiplier", self.contract_multiplier),
            ("lot_size", self.lot_size),
            ("tick_size", self.tick_size),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }

        if !self.volatility_filter.threshold.is_finite() || self.volatility_filter.threshold < 0.0 {
            return invalid(format!(
                "volatility_filter.threshold must be >= 0, got {}",
                self.volatility_filter.threshold
            ));
        }

        if !(1..=125).contains(&self.leverage) {
            return invalid(format!("leverage must be in 1..=125, got {}", self.leverage));
        }

        if let Some(hour) = self.session.counter_trend_hours.iter().find(|h| **h >= 24) {
            return invalid(format!("counter_trend_hours contains invalid hour {}", hour));
        }

        if self.schedule.poll_interval_secs == 0 {
            return invalid("schedule.poll_interval_secs must be at least 1".into());
        }

        if self.fill.poll_attempts == 0 {
            return invalid("fill.poll_attempts must be at least 1".into());
        }

        Ok(())
    }

    pub fn okx_settings(&self, credentials: Option<OkxCredentials>) -> OkxSettings {
        OkxSettings {
            base_url: self.exchange.base_url.clone(),
            credentials,
            sandbox: self.exchange.sandbox,
            proxy: self.exchange.proxy.clone(),
            margin_mode: self.margin_mode,
            requests_per_second: self.exchange.requests_per_second,
        }
    }
}
