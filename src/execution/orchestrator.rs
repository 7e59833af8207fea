use chrono::{DateTime, Timelike, Utc};
use std::fmt;
use std::sync::Arc;

use crate::config::{BotConfig, TakeProfitMode};
use crate::error::{ConfigError, CycleError, GatewayError};
use crate::exchange::ExchangeGateway;
use crate::indicators::{Band, IndicatorAdapter};
use crate::models::{
    validate_candles, BreakoutKind, FillResult, OrderIntent, PositionSide, ProtectiveOrders,
    TakeProfitSpec,
};
use crate::notify::{notify_best_effort, Notifier};
use crate::risk::{round_to_tick, PositionSizer};
use crate::strategy::{BreakoutDetector, SessionPolicy};

/// Tag attached to every entry order
pub const ORDER_TAG: &str = "bandbot";

/// Where a cycle stands between signal and protection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    EntrySubmitted,
    EntryConfirmed,
    ProtectiveOrdersPlaced,
    Aborted,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::EntrySubmitted => "entry_submitted",
            CycleState::EntryConfirmed => "entry_confirmed",
            CycleState::ProtectiveOrdersPlaced => "protective_orders_placed",
            CycleState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What one cycle ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No tradable signal this cycle
    NoSignal { reason: String },
    /// A signal fired but could not be turned into an order
    Skipped { reason: String },
    /// Dry-run mode: the order that would have been sent
    DryRun { intent: OrderIntent },
    /// Entry filled and both protective legs accepted
    Protected {
        order_id: String,
        entry_price: f64,
        orders: ProtectiveOrders,
    },
    /// Entry was sent but the cycle could not finish; `at` is the last state reached
    Aborted { at: CycleState, reason: String },
}

impl CycleOutcome {
    pub fn final_state(&self) -> CycleState {
        match self {
            CycleOutcome::NoSignal { .. }
            | CycleOutcome::Skipped { .. }
            | CycleOutcome::DryRun { .. } => CycleState::Idle,
            CycleOutcome::Protected { .. } => CycleState::ProtectiveOrdersPlaced,
            CycleOutcome::Aborted { .. } => CycleState::Aborted,
        }
    }
}

enum FillWait {
    Confirmed { fill: FillResult, price: f64 },
    Unconfirmed(Option<FillResult>),
    Failed(GatewayError),
}

/// Runs one detect-size-enter-protect cycle against an exchange.
///
/// Holds no state between cycles; positions and open orders are read back
/// from the exchange every time.
pub struct Orchestrator<G: ExchangeGateway> {
    gateway: G,
    notifier: Arc<dyn Notifier>,
    session: Box<dyn SessionPolicy>,
    adapter: IndicatorAdapter,
    detector: BreakoutDetector,
    sizer: PositionSizer,
    config: BotConfig,
}

impl<G: ExchangeGateway> Orchestrator<G> {
    pub fn new(
        config: &BotConfig,
        gateway: G,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            gateway,
            notifier,
            session: config.session.build_policy(),
            adapter: IndicatorAdapter::new(config.trend_period, config.volatility_period)?,
            detector: BreakoutDetector::new(config.band_multiplier, config.volatility_filter),
            sizer: PositionSizer::new(config.contract_multiplier, config.lot_size),
            config: config.clone(),
        })
    }

    /// Replace the session policy built from the config
    pub fn with_session_policy(mut self, session: Box<dyn SessionPolicy>) -> Self {
        self.session = session;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// One-off account preparation before the first cycle.
    ///
    /// Logs the quote balance and sets leverage for both position sides.
    /// Returns the balance.
    pub async fn prepare_account(&self) -> Result<f64, GatewayError> {
        let symbol = &self.config.symbol;
        let quote = quote_currency(symbol);

        let balance = self.gateway.fetch_balance(quote).await?;
        tracing::info!("💰 {} balance: {:.4}", quote, balance);

        if self.config.dry_run {
            tracing::info!("Dry run: leaving leverage untouched");
            return Ok(balance);
        }

        for side in [PositionSide::Long, PositionSide::Short] {
            self.gateway
                .set_leverage(symbol, self.config.leverage, self.config.margin_mode, side)
                .await?;
            tracing::info!(
                "Leverage set to {}x ({}, {})",
                self.config.leverage,
                self.config.margin_mode.as_str(),
                side.as_str()
            );
        }

        Ok(balance)
    }

    /// Run a single cycle.
    ///
    /// `Err` means the cycle stopped before any entry order was sent.
    /// Once an entry is submitted every failure is reported as
    /// [`CycleOutcome::Aborted`] instead.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        let symbol = &self.config.symbol;

        let candles = self
            .gateway
            .fetch_candles(symbol, self.config.timeframe, self.config.candle_limit)
            .await
            .map_err(|e| CycleError::gateway("fetch_candles", e))?;
        validate_candles(&candles)?;

        let needed = self.adapter.required_history() + 1;
        if candles.len() < needed {
            return Ok(CycleOutcome::NoSignal {
                reason: format!("warming up: {}/{} candles", candles.len(), needed),
            });
        }

        let snapshots = self.adapter.compute(&candles);

        let has_position = self
            .gateway
            .fetch_open_positions(symbol)
            .await
            .map_err(|e| CycleError::gateway("fetch_open_positions", e))?;

        if let (Some(last), Some(snapshot)) = (candles.last(), snapshots.last()) {
            if let Some(band) = Band::from_snapshot(snapshot, self.detector.multiplier()) {
                tracing::debug!(
                    "{} close={:.2} band=[{:.2}, {:.2}] atr={:.4}",
                    symbol,
                    last.close,
                    band.lower,
                    band.upper,
                    snapshot.volatility.unwrap_or_default()
                );
            }
        }

        let event = self.detector.detect_window(&candles, &snapshots, has_position);
        if has_position {
            return Ok(CycleOutcome::NoSignal {
                reason: "position already open".to_string(),
            });
        }

        let mode = self.session.mode_at(now.hour());
        let (Some(position_side), Some(volatility)) = (mode.side_for(event.kind), event.volatility)
        else {
            return Ok(CycleOutcome::NoSignal {
                reason: "no band breakout".to_string(),
            });
        };

        tracing::info!(
            "🎯 {:?} on {} ({} session {:?}) -> {} entry",
            event.kind,
            symbol,
            self.session.name(),
            mode,
            position_side.as_str()
        );
        notify_best_effort(
            self.notifier.as_ref(),
            &format!("Signal: {} {}", symbol, position_side.as_str()),
            &signal_body(event.kind, position_side, volatility, now),
        )
        .await;

        let stop_distance = volatility;
        let quantity =
            match self
                .sizer
                .size(self.config.risk_budget, self.config.leverage, stop_distance)
            {
                Ok(quantity) => quantity,
                Err(e) => {
                    tracing::warn!("Sizing failed, skipping signal: {}", e);
                    return Ok(CycleOutcome::Skipped {
                        reason: e.to_string(),
                    });
                }
            };

        let intent = OrderIntent {
            position_side,
            quantity,
            stop_distance,
            take_profit_distance: stop_distance * self.config.risk_reward,
        };

        // Protective legs are priced in whole ticks
        let tick = self.config.tick_size;
        if round_to_tick(intent.stop_distance, tick) <= 0.0
            || round_to_tick(intent.take_profit_distance, tick) <= 0.0
        {
            let reason = format!(
                "stop distance {:.6} rounds to zero at tick size {}",
                intent.stop_distance, tick
            );
            tracing::warn!("Skipping signal: {}", reason);
            return Ok(CycleOutcome::Skipped { reason });
        }

        if self.config.dry_run {
            tracing::info!(
                "🧪 Dry run: would {} {} {} (stop distance {:.4})",
                intent.entry_side().as_str(),
                intent.quantity,
                symbol,
                intent.stop_distance
            );
            return Ok(CycleOutcome::DryRun { intent });
        }

        self.cancel_stale_orders().await?;

        let outcome = self.execute(&intent).await;
        if let CycleOutcome::Aborted { at, reason } = &outcome {
            tracing::warn!("⚠️  Cycle aborted at {}: {}", at, reason);
            notify_best_effort(
                self.notifier.as_ref(),
                &format!("Cycle aborted: {}", symbol),
                &format!("state: {}\nreason: {}", at, reason),
            )
            .await;
        }

        Ok(outcome)
    }

    async fn cancel_stale_orders(&self) -> Result<(), CycleError> {
        let symbol = &self.config.symbol;
        let stale = self
            .gateway
            .fetch_open_orders(symbol)
            .await
            .map_err(|e| CycleError::gateway("fetch_open_orders", e))?;

        if stale.is_empty() {
            return Ok(());
        }

        tracing::info!("Cancelling {} stale order(s) on {}", stale.len(), symbol);
        self.gateway
            .cancel_orders(&stale, symbol)
            .await
            .map_err(|e| CycleError::gateway("cancel_orders", e))
    }

    /// Entry, fill confirmation and protective legs
    async fn execute(&self, intent: &OrderIntent) -> CycleOutcome {
        let symbol = &self.config.symbol;
        let client_order_id = uuid::Uuid::new_v4().simple().to_string();

        let mut state = CycleState::Idle;
        advance(&mut state, CycleState::EntrySubmitted);

        let order_id = match self
            .gateway
            .place_market_order(
                symbol,
                intent.entry_side(),
                intent.position_side,
                intent.quantity,
                &client_order_id,
                ORDER_TAG,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                return CycleOutcome::Aborted {
                    at: state,
                    reason: format!("entry order failed: {}", e),
                }
            }
        };
        tracing::info!(
            "📤 Entry sent: {} {} {} (order {}, client id {})",
            intent.entry_side().as_str(),
            intent.quantity,
            symbol,
            order_id,
            client_order_id
        );

        let (fill, entry_price) = match self.await_fill(&order_id).await {
            FillWait::Confirmed { fill, price } => (fill, price),
            FillWait::Unconfirmed(last) => {
                let status = last
                    .map(|f| format!("{:?}", f.status))
                    .unwrap_or_else(|| "unknown".to_string());
                return CycleOutcome::Aborted {
                    at: state,
                    reason: format!(
                        "order {} not confirmed filled after {} checks (last status {})",
                        order_id, self.config.fill.poll_attempts, status
                    ),
                };
            }
            FillWait::Failed(e) => {
                return CycleOutcome::Aborted {
                    at: state,
                    reason: format!("could not query order {}: {}", order_id, e),
                };
            }
        };
        advance(&mut state, CycleState::EntryConfirmed);

        let filled = fill.filled_quantity;
        if !filled.is_finite() || filled <= 0.0 {
            return CycleOutcome::Aborted {
                at: state,
                reason: format!("order {} reports filled quantity {}", order_id, filled),
            };
        }
        tracing::info!("✅ Filled {} @ {:.4}", filled, entry_price);

        let orders = match self.place_protection(intent, entry_price, filled).await {
            Ok(orders) => orders,
            Err(reason) => return CycleOutcome::Aborted { at: state, reason },
        };
        advance(&mut state, CycleState::ProtectiveOrdersPlaced);

        notify_best_effort(
            self.notifier.as_ref(),
            &format!("Opened {} {}", intent.position_side.as_str(), symbol),
            &format!(
                "quantity: {}\nentry: {}\nstop: {}\ntake profit: {}",
                orders.quantity, entry_price, orders.stop_price, orders.take_profit_price
            ),
        )
        .await;

        CycleOutcome::Protected {
            order_id,
            entry_price,
            orders,
        }
    }

    /// Poll the entry order a bounded number of times
    async fn await_fill(&self, order_id: &str) -> FillWait {
        let attempts = self.config.fill.poll_attempts.max(1);
        let mut last_fill = None;
        let mut last_error = None;

        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.fill.poll_interval()).await;

            match self.gateway.get_order(order_id, &self.config.symbol).await {
                Ok(fill) => {
                    if let Some(price) = fill.confirmed_price() {
                        return FillWait::Confirmed { fill, price };
                    }
                    tracing::debug!(
                        "Order {} not filled yet ({:?}), check {}/{}",
                        order_id,
                        fill.status,
                        attempt,
                        attempts
                    );
                    last_fill = Some(fill);
                    last_error = None;
                }
                Err(e) => {
                    tracing::warn!("Order {} query failed ({}/{}): {}", order_id, attempt, attempts, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => FillWait::Failed(e),
            None => FillWait::Unconfirmed(last_fill),
        }
    }

    /// Stop-loss then take-profit, both reduce-only and sized to the fill
    async fn place_protection(
        &self,
        intent: &OrderIntent,
        entry_price: f64,
        quantity: f64,
    ) -> Result<ProtectiveOrders, String> {
        let symbol = &self.config.symbol;
        let tick = self.config.tick_size;
        let side = intent.position_side.exit_side();

        let stop_price = round_to_tick(intent.stop_price(entry_price), tick);
        let take_profit_price = round_to_tick(intent.take_profit_price(entry_price), tick);
        let take_profit = match self.config.take_profit_mode {
            TakeProfitMode::Trailing => TakeProfitSpec::Trailing {
                activation_price: take_profit_price,
                callback_spread: round_to_tick(intent.take_profit_distance, tick),
            },
            TakeProfitMode::Limit => TakeProfitSpec::Limit {
                trigger_price: round_to_tick((entry_price + take_profit_price) / 2.0, tick),
                limit_price: take_profit_price,
            },
        };

        let stop_order_id = self
            .gateway
            .place_reduce_only_stop(symbol, side, intent.position_side, quantity, stop_price)
            .await
            .map_err(|e| format!("stop-loss at {} failed: {}", stop_price, e))?;
        tracing::info!("🛑 Stop-loss {} @ {} (algo {})", quantity, stop_price, stop_order_id);

        let take_profit_order_id = self
            .gateway
            .place_reduce_only_take_profit(symbol, side, intent.position_side, quantity, &take_profit)
            .await
            .map_err(|e| {
                format!(
                    "take-profit at {} failed, position protected by stop {} only: {}",
                    take_profit_price, stop_order_id, e
                )
            })?;
        tracing::info!(
            "🎯 Take-profit {} @ {} (algo {})",
            quantity,
            take_profit_price,
            take_profit_order_id
        );

        Ok(ProtectiveOrders {
            quantity,
            stop_price,
            take_profit_price,
            stop_order_id,
            take_profit_order_id,
        })
    }
}

fn advance(state: &mut CycleState, next: CycleState) {
    tracing::debug!("Cycle state {} -> {}", state, next);
    *state = next;
}

/// `BTC-USDT-SWAP` -> `USDT`
fn quote_currency(symbol: &str) -> &str {
    symbol.split('-').nth(1).unwrap_or("USDT")
}

fn signal_body(
    kind: BreakoutKind,
    position_side: PositionSide,
    volatility: f64,
    now: DateTime<Utc>,
) -> String {
    format!(
        "breakout: {:?}\nside: {}\natr: {:.4}\ntime: {}",
        kind,
        position_side.as_str(),
        volatility,
        now.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_currency() {
        assert_eq!(quote_currency("BTC-USDT-SWAP"), "USDT");
        assert_eq!(quote_currency("ETH-USD-SWAP"), "USD");
        assert_eq!(quote_currency("BTCUSDT"), "USDT");
    }

    #[test]
    fn test_final_states() {
        let no_signal = CycleOutcome::NoSignal {
            reason: "quiet".into(),
        };
        assert_eq!(no_signal.final_state(), CycleState::Idle);

        let aborted = CycleOutcome::Aborted {
            at: CycleState::EntrySubmitted,
            reason: "timeout".into(),
        };
        assert_eq!(aborted.final_state(), CycleState::Aborted);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CycleState::EntryConfirmed.to_string(), "entry_confirmed");
    }
}
