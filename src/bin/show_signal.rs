//! Fetch live candles and show the current bands and detector verdict.
//!
//! Uses public endpoints only; no orders are sent.
//!
//! ```text
//! cargo run --bin show_signal -- --profile live-1m --last 5
//! ```

use anyhow::{Context, Result};
use bandbot::config::BotConfig;
use bandbot::exchange::okx::OkxClient;
use bandbot::exchange::ExchangeGateway;
use bandbot::indicators::{Band, IndicatorAdapter};
use bandbot::models::validate_candles;
use bandbot::strategy::BreakoutDetector;
use chrono::{Timelike, Utc};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Show EMA/ATR bands and the breakout verdict")]
struct Args {
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    #[arg(short, long)]
    profile: Option<String>,

    /// Candles to print
    #[arg(short, long, default_value = "5")]
    last: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("bandbot=info")
        .init();

    let args = Args::parse();
    let config = BotConfig::load(&args.config_dir, args.profile.as_deref())
        .context("failed to load configuration")?;

    let client = OkxClient::new(config.okx_settings(None))?;
    let candles = client
        .fetch_candles(&config.symbol, config.timeframe, config.candle_limit)
        .await?;
    validate_candles(&candles).context("exchange returned malformed candles")?;

    let adapter = IndicatorAdapter::new(config.trend_period, config.volatility_period)?;
    let snapshots = adapter.compute(&candles);
    let detector = BreakoutDetector::new(config.band_multiplier, config.volatility_filter);

    println!("\n{} {} ({} candles)", config.symbol, config.timeframe, candles.len());
    println!("{}", "=".repeat(72));
    println!(
        "{:<20} {:>12} {:>12} {:>12} {:>12}",
        "time", "close", "lower", "upper", "atr"
    );

    let start = candles.len().saturating_sub(args.last);
    for (candle, snapshot) in candles.iter().zip(&snapshots).skip(start) {
        match Band::from_snapshot(snapshot, config.band_multiplier) {
            Some(band) => println!(
                "{:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.4}",
                candle.open_time.format("%Y-%m-%d %H:%M"),
                candle.close,
                band.lower,
                band.upper,
                snapshot.volatility.unwrap_or_default()
            ),
            None => println!(
                "{:<20} {:>12.2} {:>12} {:>12} {:>12}",
                candle.open_time.format("%Y-%m-%d %H:%M"),
                candle.close,
                "-",
                "-",
                "-"
            ),
        }
    }

    let event = detector.detect_window(&candles, &snapshots, false);
    let policy = config.session.build_policy();
    let mode = policy.mode_at(Utc::now().hour());

    println!("{}", "=".repeat(72));
    println!("Breakout:  {:?}", event.kind);
    println!("Session:   {} -> {:?}", policy.name(), mode);
    match mode.side_for(event.kind) {
        Some(side) => println!("Action:    open {}", side.as_str()),
        None => println!("Action:    none"),
    }

    Ok(())
}
