use anyhow::Context;
use api_client::YahooFinanceClient;
use chrono::Utc;
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, ConfigArgs, init_tracing, load_config};
use engine::{LiveEngine, SessionScheduler};
use executor::PaperBroker;
use std::sync::Arc;
use std::time::Duration;
use strategies::{ZoneGate, ZoneHistoryStore, compute_levels};

/// The main entry point for the Cassandra session engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Overrides and secrets may live in an optional .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config.config)
        .with_context(|| format!("loading {}", cli.config.config.display()))?;
    let _guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Levels => handle_levels(&config),
        Commands::Zones(args) => handle_zones(&config, args).await,
        Commands::Schedule => handle_schedule(&config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Time-windowed session trading gated by Fibonacci price zones.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled session against the paper broker until Ctrl-C.
    Run,
    /// Print the Fibonacci level ladder.
    Levels,
    /// Fetch the zone history once and print the latest samples.
    Zones(ZonesArgs),
    /// Print the next window of every enabled session.
    Schedule,
}

#[derive(Parser)]
struct ZonesArgs {
    /// How many of the most recent samples to print.
    #[arg(long, default_value_t = 12)]
    last: usize,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_run(config: Config) -> anyhow::Result<()> {
    let (tx, rx) = LiveEngine::channel();
    let broker = Arc::new(PaperBroker::new(tx.clone()));
    let feed = Arc::new(yahoo_feed(&config)?);

    tracing::info!(
        symbol = %config.instrument.symbol,
        sessions = config.enabled_sessions().count(),
        "Starting engine with the paper broker"
    );
    let engine = LiveEngine::new(config, broker, feed, tx, rx)?.with_synthetic_clock();
    engine.run().await?;
    Ok(())
}

fn yahoo_feed(config: &Config) -> anyhow::Result<YahooFinanceClient> {
    let timeout = Duration::from_secs(config.zone_history.request_timeout_secs);
    Ok(YahooFinanceClient::new(timeout)?)
}

fn handle_levels(config: &Config) -> anyhow::Result<()> {
    let fib = &config.fibonacci;
    let levels = compute_levels(fib.base_price, fib.top_price, fib.extended)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Level", "Ratio", "Price", "Zone below", "Zone above"]);
    for level in levels.levels().iter().rev() {
        let zone = |z: Option<core_types::ZoneCode>| z.map_or("-".to_string(), |z| z.to_string());
        table.add_row(vec![
            level.name.to_string(),
            level.ratio.to_string(),
            level.price.round_dp(4).to_string(),
            zone(level.down_zone),
            zone(level.up_zone),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_zones(config: &Config, args: ZonesArgs) -> anyhow::Result<()> {
    let fib = &config.fibonacci;
    let levels = compute_levels(fib.base_price, fib.top_price, fib.extended)?;
    let history = ZoneHistoryStore::new(
        &config.instrument.price_ticker,
        config.instrument.timezone,
        levels,
        &config.zone_history,
    );
    let mut gate = ZoneGate::new(history, fib, &config.zone_history);
    let feed = yahoo_feed(config)?;
    let zone = gate.refresh(&feed, Utc::now()).await;

    let samples = gate.history().samples();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Time", "Close", "Zone"]);
    for sample in &samples[samples.len().saturating_sub(args.last)..] {
        table.add_row(vec![
            sample.timestamp.format("%Y-%m-%d %H:%M %Z").to_string(),
            sample.close.to_string(),
            sample.zone.map_or("-".to_string(), |z| z.to_string()),
        ]);
    }
    println!("{table}");
    println!(
        "{} samples, gating zone {}, entry {}",
        samples.len(),
        zone.map_or("unknown".to_string(), |z| z.to_string()),
        if gate.allows_entry() { "allowed" } else { "inhibited" }
    );
    Ok(())
}

fn handle_schedule(config: &Config) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Session", "Identity", "Opens", "Closes", "Zone gated"]);
    for session in config.enabled_sessions() {
        let scheduler = SessionScheduler::from_params(session, config.instrument.timezone)?;
        let window = scheduler.next_window(now);
        table.add_row(vec![
            session.name.clone(),
            session.comment(&config.instrument.version),
            window.open_at.format("%a %Y-%m-%d %H:%M %Z").to_string(),
            window.close_at.format("%a %Y-%m-%d %H:%M %Z").to_string(),
            session.zone_gated.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
