//! Bracket Trader - Main Entry Point
//!
//! Runs the session control loop by default. Dry run is the default mode;
//! set `BT_TRADING__DRY_RUN=false` with credentials to trade live.

use anyhow::{bail, Context, Result};
use bracket_trader::config::{mask_secret, Config};
use bracket_trader::exchange::discovery::{slug_for, target_dates};
use bracket_trader::exchange::{ClobClient, MarketDiscovery};
use bracket_trader::feed::{PassengerFeed, ReadingPoll, ReadingSource};
use bracket_trader::session::{self, SessionWindow, TickFetcher};
use bracket_trader::strategy::{BracketSet, BudgetPool, ExecutionPlanner, SignalRanker};
use bracket_trader::utils::RetryPolicy;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Bracket Trader CLI
#[derive(Parser)]
#[command(name = "bracket-trader")]
#[command(version, about = "Budget-constrained trading on passenger-volume bracket markets")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the latest reading once against live books (never trades)
    Simulate,

    /// Show target market dates, slugs and resolved outcomes
    Discover {
        /// Resolve this date (YYYY-MM-DD) instead of today's targets
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Print the effective configuration with secrets masked
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration rejected");
        return Err(e.into());
    }

    match cli.command {
        Some(Commands::Simulate) => return run_simulation(&config).await,
        Some(Commands::Discover { date }) => return run_discovery(&config, date.as_deref()).await,
        Some(Commands::ShowConfig) => {
            show_config(&config);
            return Ok(());
        }
        None => {}
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║            Bracket Trader v{}                           ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let wiring = session::build(&config)?;

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    session::run(wiring, shutdown_rx).await;
    info!("👋 Bracket Trader stopped");
    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "bracket-trader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("bracket_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Strategy: {:?}", config.session.strategy);
    info!(
        "   Mode: {}",
        if config.trading.dry_run { "DRY RUN" } else { "LIVE" }
    );
    info!("   Budget: ${}", config.trading.budget_usd);
    info!("   Max Order: ${}", config.trading.max_order_usd);
    info!(
        "   Max Buy Price: {:.0}%",
        config.trading.max_buy_price * Decimal::ONE_HUNDRED
    );
    info!(
        "   Min Edge: {:.0}%",
        config.trading.min_edge * Decimal::ONE_HUNDRED
    );
    info!(
        "   Z-Score Threshold: {} | Min Move: {}",
        config.movement.zscore_threshold, config.movement.min_price_change
    );
    info!(
        "   Scale-In: {:?}% of ${}",
        config.movement.scale_in_pcts,
        config.per_outcome_budget()
    );
    info!(
        "   Window: {:02}:00-{:02}:00 (UTC{:+}){}",
        config.session.window_start_hour,
        config.session.window_end_hour,
        config.session.utc_offset_hours,
        if config.session.weekdays_only { ", weekdays" } else { "" }
    );
    info!(
        "   Poll: {}ms open, {}s idle | Quotes: {:?}",
        config.session.poll_interval_ms,
        config.session.idle_poll_interval_secs,
        config.session.quote_source
    );
}

fn show_config(config: &Config) {
    let mut shown = config.clone();
    shown.polymarket.api_key = mask_secret(&config.polymarket.api_key);
    shown.polymarket.api_secret = mask_secret(&config.polymarket.api_secret);
    shown.polymarket.api_passphrase = mask_secret(&config.polymarket.api_passphrase);

    match serde_json::to_string_pretty(&shown) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "Failed to render configuration"),
    }
}

/// One dry evaluation of the data-event pipeline against live data.
async fn run_simulation(config: &Config) -> Result<()> {
    info!("🧪 [SIMULATE] Fetching latest reading");

    let feed = Arc::new(PassengerFeed::new(&config.feed)?);
    let reading = match feed.get_latest_reading().await? {
        ReadingPoll::Latest(reading) => reading,
        ReadingPoll::Unchanged => bail!("Data source reported no content"),
    };

    let brackets = BracketSet::from_specs(&config.brackets)?;
    let correct = brackets.match_count(reading.passenger_count)?.clone();
    info!(%reading, bracket = %correct, "🎯 [SIMULATE] Reading matched");

    let discovery = session::build_discovery(config)?;
    let market = discovery
        .resolve_outcomes(reading.date)
        .await
        .with_context(|| format!("No market for {}", reading.date))?;

    let clob = Arc::new(ClobClient::new(
        &config.polymarket,
        Duration::from_secs(config.feed.timeout_secs),
    )?);
    let fetcher = TickFetcher::new(
        clob,
        feed,
        Duration::from_millis(config.session.fetch_timeout_ms),
        RetryPolicy::new(config.session.fetch_retries, Duration::from_millis(100)),
    );
    let tokens: Vec<String> = market.outcomes().map(|o| o.token_id.clone()).collect();
    let quotes = fetcher.quotes(&tokens).await;
    info!(quoted = quotes.len(), total = tokens.len(), "📊 [SIMULATE] Books fetched");

    let ranker = SignalRanker::new(brackets, &config.trading);
    let signals = ranker.rank(&correct, &market, &quotes);

    let mut pool = BudgetPool::new(config.trading.budget_usd);
    let orders = ExecutionPlanner::new(config.trading.min_order_usd).allocate(&signals, &mut pool);

    println!();
    println!("Reading:  {}", reading);
    println!("Bracket:  {}", correct);
    println!("Market:   {} ({})", market.title, market.slug);
    println!();
    println!("{:<4} {:<16} {:>8} {:>8} {:>10}", "#", "Outcome", "Price", "Edge", "Size");
    for (i, signal) in signals.iter().enumerate() {
        println!(
            "{:<4} {:<16} {:>8} {:>8} {:>10}",
            i + 1,
            signal.outcome.to_string(),
            signal.price_cap,
            signal.score,
            signal.proposed_size_usd
        );
    }
    println!();
    println!("Planned orders ({}):", orders.len());
    for order in &orders {
        println!(
            "  BUY {} ${} @ <= {}",
            order.outcome, order.amount_usd, order.price_cap
        );
    }
    println!(
        "Budget: ${} of ${} allocated, ${} remaining",
        pool.attempted(),
        pool.total(),
        pool.remaining()
    );

    Ok(())
}

/// Print target dates and the outcomes discovery resolves for them.
async fn run_discovery(config: &Config, date: Option<&str>) -> Result<()> {
    let dates = match date {
        Some(d) => vec![chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}'", d))?],
        None => {
            let window = SessionWindow::from_config(&config.session)?;
            let today = window.local_date(Utc::now());
            info!(%today, "🔍 [DISCOVER] Target dates for today");
            target_dates(today)
        }
    };

    let discovery = session::build_discovery(config)?;
    for date in dates {
        println!("{} -> {}", date, slug_for(date));
        match discovery.resolve_outcomes(date).await {
            Ok(market) => {
                println!("  {}", market.title);
                for m in &market.markets {
                    println!("  {:<12} YES {}", m.bracket.label, m.yes.token_id);
                    println!("  {:<12} NO  {}", "", m.no.token_id);
                }
            }
            Err(e) => {
                warn!(%date, error = %e, "Discovery failed");
                println!("  (not found: {})", e);
            }
        }
    }

    Ok(())
}
