use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use super::orchestrator::{CycleOutcome, Orchestrator};
use crate::config::ScheduleConfig;
use crate::exchange::ExchangeGateway;
use crate::models::Timeframe;

/// Counters returned when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: usize,
    pub errors: usize,
    pub panics: usize,
    pub protected: usize,
    pub aborted: usize,
}

/// Time left until the next multiple of `period_secs` since the epoch
pub fn delay_until_boundary(now: DateTime<Utc>, period_secs: u64) -> Duration {
    if period_secs == 0 {
        return Duration::ZERO;
    }

    let period = period_secs as i64;
    let into_period = now.timestamp().rem_euclid(period);
    let nanos = now.timestamp_subsec_nanos();

    if into_period == 0 && nanos == 0 {
        return Duration::ZERO; // already on a boundary
    }

    Duration::from_secs((period - into_period) as u64) - Duration::from_nanos(nanos as u64)
}

/// Drives [`Orchestrator::run_cycle`] on a fixed interval.
///
/// Cycles never overlap: the next tick is only awaited after the previous
/// cycle returned. Errors and panics inside a cycle are logged and followed
/// by a backoff; they never end the loop.
pub struct Scheduler<G: ExchangeGateway> {
    orchestrator: Orchestrator<G>,
    schedule: ScheduleConfig,
    timeframe: Timeframe,
}

impl<G: ExchangeGateway> Scheduler<G> {
    pub fn new(orchestrator: Orchestrator<G>) -> Self {
        let schedule = orchestrator.config().schedule.clone();
        let timeframe = orchestrator.config().timeframe;
        Self {
            orchestrator,
            schedule,
            timeframe,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<G> {
        &self.orchestrator
    }

    fn first_tick(&self) -> Instant {
        if !self.schedule.align_to_timeframe {
            return Instant::now();
        }
        let delay = delay_until_boundary(Utc::now(), self.timeframe.as_secs())
            + self.schedule.settle_delay();
        tracing::info!(
            "First cycle in {:?} (next {} candle boundary + settle delay)",
            delay,
            self.timeframe
        );
        Instant::now() + delay
    }

    /// Loop until `shutdown` resolves.
    ///
    /// Shutdown is checked while waiting for the next tick or sitting in the
    /// error backoff. A cycle already running is allowed to finish.
    pub async fn run<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval_at(self.first_tick(), self.schedule.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = SchedulerStats::default();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            stats.cycles += 1;
            let cycle = AssertUnwindSafe(self.orchestrator.run_cycle(Utc::now())).catch_unwind();

            let failed = match cycle.await {
                Ok(Ok(outcome)) => {
                    record_outcome(&mut stats, &outcome);
                    false
                }
                Ok(Err(e)) => {
                    stats.errors += 1;
                    tracing::error!("❌ Cycle {} failed: {}", stats.cycles, e);
                    true
                }
                Err(panic) => {
                    stats.panics += 1;
                    tracing::error!("💥 Cycle {} panicked: {}", stats.cycles, panic_message(&panic));
                    true
                }
            };

            if failed {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.schedule.error_backoff()) => {}
                }
            }
        }

        tracing::info!(
            "Scheduler stopped after {} cycles ({} errors, {} panics)",
            stats.cycles,
            stats.errors,
            stats.panics
        );
        stats
    }
}

fn record_outcome(stats: &mut SchedulerStats, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::NoSignal { reason } => tracing::info!("No signal: {}", reason),
        CycleOutcome::Skipped { reason } => tracing::info!("Signal skipped: {}", reason),
        CycleOutcome::DryRun { intent } => tracing::info!("Dry run intent: {:?}", intent),
        CycleOutcome::Protected {
            order_id, orders, ..
        } => {
            stats.protected += 1;
            tracing::info!(
                "Position {} protected: stop {} / take-profit {}",
                order_id,
                orders.stop_order_id,
                orders.take_profit_order_id
            );
        }
        CycleOutcome::Aborted { .. } => stats.aborted += 1,
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_delay_until_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 7, 30).unwrap();
        assert_eq!(delay_until_boundary(now, 900), Duration::from_secs(450));
        assert_eq!(delay_until_boundary(now, 60), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_on_boundary_is_zero() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(delay_until_boundary(now, 900), Duration::ZERO);
    }

    #[test]
    fn test_delay_accounts_for_subsecond() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 59).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(delay_until_boundary(now, 60), Duration::from_millis(750));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&payload), "bang");
    }
}
