//! Control loop and collaborator wiring.

use crate::config::{Config, QuoteSource, StrategyKind};
use crate::exchange::{BookStream, ClobClient, GammaDiscovery, OrderBookProvider, OrderGateway, PaperGateway};
use crate::feed::PassengerFeed;
use crate::session::controller::{SessionController, SessionDeps, SessionPhase};
use crate::session::fetch::TickFetcher;
use crate::session::observer::TracingObserver;
use crate::session::window::SessionWindow;
use crate::strategy::{
    BracketSet, DataEventStrategy, MovementParams, MovementStrategy, OrderExecutor, SignalRanker,
    Strategy,
};
use crate::utils::RetryPolicy;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Build the configured strategy.
pub fn build_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    let brackets = BracketSet::from_specs(&config.brackets)?;
    let strategy: Box<dyn Strategy> = match config.session.strategy {
        StrategyKind::DataEvent => Box::new(DataEventStrategy::new(
            brackets.clone(),
            SignalRanker::new(brackets, &config.trading),
        )),
        StrategyKind::Movement => Box::new(MovementStrategy::new(MovementParams::from_config(config))),
    };
    Ok(strategy)
}

/// Gamma discovery for the configured brackets and optional fixed slug.
pub fn build_discovery(config: &Config) -> Result<GammaDiscovery> {
    let brackets = BracketSet::from_specs(&config.brackets)?;
    let slug_override = Some(config.polymarket.target_market_slug.clone()).filter(|s| !s.is_empty());
    GammaDiscovery::new(
        &config.polymarket.gamma_url,
        brackets,
        slug_override,
        Duration::from_secs(config.feed.timeout_secs),
    )
    .context("Failed to create market discovery")
}

/// Live collaborators plus the streamed quote cache, when configured.
pub struct Wiring {
    pub controller: SessionController,
    pub stream: Option<Arc<BookStream>>,
}

/// Wire the controller against the venue and the data source.
pub fn build(config: &Config) -> Result<Wiring> {
    let request_timeout = Duration::from_secs(config.feed.timeout_secs);
    let clob = Arc::new(
        ClobClient::new(&config.polymarket, request_timeout).context("Failed to create CLOB client")?,
    );
    let discovery = build_discovery(config)?;
    let feed = PassengerFeed::new(&config.feed).context("Failed to create passenger feed")?;

    let stream = match config.session.quote_source {
        QuoteSource::Stream => Some(Arc::new(BookStream::new(
            &config.polymarket.ws_url,
            Duration::from_millis(config.session.quote_staleness_ms),
        ))),
        QuoteSource::Rest => None,
    };
    let quotes: Arc<dyn OrderBookProvider> = match &stream {
        Some(stream) => stream.clone(),
        None => clob.clone(),
    };

    let gateway: Arc<dyn OrderGateway> = if config.trading.dry_run {
        info!("DRY RUN: orders are simulated by the paper gateway");
        Arc::new(PaperGateway::new())
    } else {
        if !config.has_credentials() {
            anyhow::bail!("Live trading requires POLYMARKET API credentials");
        }
        warn!("LIVE TRADING MODE: real orders will be submitted");
        clob
    };

    let fetcher = TickFetcher::new(
        quotes,
        Arc::new(feed),
        Duration::from_millis(config.session.fetch_timeout_ms),
        RetryPolicy::new(config.session.fetch_retries, Duration::from_millis(100)),
    );
    let deps = SessionDeps {
        discovery: Arc::new(discovery),
        fetcher,
        executor: OrderExecutor::new(gateway),
        observer: Arc::new(TracingObserver),
    };
    let window = SessionWindow::from_config(&config.session)?;
    let controller = SessionController::new(config, window, build_strategy(config)?, deps);

    Ok(Wiring { controller, stream })
}

/// Book stream subscription for one market date.
struct Subscription {
    date: NaiveDate,
    stop: watch::Sender<bool>,
}

/// Tick the controller until shutdown, then close the session.
///
/// A tick in progress always finishes before shutdown is honored, so no
/// order submission is abandoned mid-flight.
pub async fn run(mut wiring: Wiring, mut shutdown: watch::Receiver<bool>) {
    let mut subscription: Option<Subscription> = None;

    info!(strategy = wiring.controller.strategy_name(), "Starting control loop");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let phase = wiring.controller.tick(Utc::now()).await;

        if let Some(stream) = &wiring.stream {
            sync_subscription(stream, &wiring.controller, &mut subscription);
        }

        let delay = wiring.controller.next_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                info!(?phase, "Shutdown signal received");
                break;
            }
        }
    }

    wiring.controller.shutdown();
    if let Some(sub) = subscription.take() {
        let _ = sub.stop.send(true);
    }
    info!("Control loop stopped");
}

/// Keep the book stream subscribed to the live session's tokens.
fn sync_subscription(
    stream: &Arc<BookStream>,
    controller: &SessionController,
    subscription: &mut Option<Subscription>,
) {
    let watched = match controller.phase() {
        SessionPhase::Armed | SessionPhase::Open => controller.watched(),
        SessionPhase::Idle | SessionPhase::Closed => None,
    };

    let current = subscription.as_ref().map(|s| s.date);

    match (watched, current) {
        (Some((date, _)), Some(subscribed)) if subscribed == date => {}
        (Some((date, tokens)), _) => {
            if let Some(old) = subscription.take() {
                let _ = old.stop.send(true);
            }
            let (stop, stop_rx) = watch::channel(false);
            let stream = stream.clone();
            tokio::spawn(async move { stream.run(tokens, stop_rx).await });
            info!(%date, "Book stream subscribed");
            *subscription = Some(Subscription { date, stop });
        }
        (None, Some(_)) => {
            if let Some(old) = subscription.take() {
                let _ = old.stop.send(true);
                info!(date = %old.date, "Book stream unsubscribed");
            }
        }
        (None, None) => {}
    }
}
