use anyhow::{Context, Result};
use bandbot::config::BotConfig;
use bandbot::exchange::okx::{OkxClient, OkxCredentials};
use bandbot::execution::{Orchestrator, Scheduler};
use bandbot::notify::{LogNotifier, Notifier, WebhookNotifier};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "EMA/ATR band breakout trader for OKX swaps")]
struct Args {
    /// Directory holding default.toml and profiles/
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Profile under <config-dir>/profiles, e.g. live-1m
    #[arg(short, long)]
    profile: Option<String>,

    /// Detect and size signals without sending orders
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    let mut config = BotConfig::load(&args.config_dir, args.profile.as_deref())
        .context("failed to load configuration")?;
    if args.dry_run {
        config.dry_run = true;
    }

    tracing::info!("🚀 bandbot starting");
    log_configuration(&config, args.profile.as_deref());

    let credentials = match OkxCredentials::from_env() {
        Ok(credentials) => Some(credentials),
        Err(e) if config.dry_run => {
            tracing::warn!("{}; continuing with public endpoints only", e);
            None
        }
        Err(e) => return Err(e).context("OKX credentials are required for live trading"),
    };

    let has_credentials = credentials.is_some();
    let client = OkxClient::new(config.okx_settings(credentials))
        .context("failed to build OKX client")?;
    let notifier = build_notifier(&config)?;

    let orchestrator = Orchestrator::new(&config, client, notifier)?;

    if has_credentials {
        if let Err(e) = orchestrator.prepare_account().await {
            tracing::error!("Account preparation failed: {}", e);
        }
    }

    let scheduler = Scheduler::new(orchestrator);

    tracing::info!("🔄 Polling every {}s, press Ctrl+C to stop", config.schedule.poll_interval_secs);
    let stats = scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        })
        .await;

    tracing::info!(
        "👋 bandbot stopped: {} cycles, {} protected entries, {} aborted",
        stats.cycles,
        stats.protected,
        stats.aborted
    );
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bandbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_notifier(config: &BotConfig) -> Result<Arc<dyn Notifier>> {
    match config.notifier.webhook_url.as_deref() {
        Some(url) => {
            tracing::info!("Alerts go to webhook");
            Ok(Arc::new(
                WebhookNotifier::new(url).context("failed to build webhook notifier")?,
            ))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

fn log_configuration(config: &BotConfig, profile: Option<&str>) {
    tracing::info!("📊 Configuration (profile {}):", profile.unwrap_or("default"));
    tracing::info!("  Symbol: {} on {} candles", config.symbol, config.timeframe);
    tracing::info!(
        "  Bands: EMA({}) ± {} x ATR({})",
        config.trend_period,
        config.band_multiplier,
        config.volatility_period
    );
    tracing::info!(
        "  Volatility filter: {:?} >= {}",
        config.volatility_filter.mode,
        config.volatility_filter.threshold
    );
    tracing::info!(
        "  Risk: {} per trade, R:R 1:{}, {}x {}",
        config.risk_budget,
        config.risk_reward,
        config.leverage,
        config.margin_mode.as_str()
    );
    tracing::info!("  Take-profit: {:?}", config.take_profit_mode);
    tracing::info!(
        "  Mode: {}{}",
        if config.exchange.sandbox { "demo trading" } else { "LIVE" },
        if config.dry_run { " (dry run)" } else { "" }
    );
}
