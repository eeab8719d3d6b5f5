//! Session Window Controller.
//!
//! ```text
//! Idle ──arm──> Armed ──open──> Open ──close──> Closed ──next day──> Idle
//!                 │                                ^
//!                 └────────window passed───────────┘
//! ```
//!
//! The controller owns the `Session` and its budget. Each call to `tick`
//! performs at most one transition or one evaluation cycle; all I/O for a
//! cycle completes before the strategy runs.

use crate::config::Config;
use crate::exchange::discovery::target_dates;
use crate::exchange::{MarketDay, MarketDiscovery};
use crate::feed::Reading;
use crate::session::fetch::TickFetcher;
use crate::session::observer::{CloseReason, SessionObserver, SessionSummary};
use crate::session::window::SessionWindow;
use crate::strategy::{BudgetPool, ExecutionPlanner, OrderExecutor, Strategy, TickContext};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session; waiting for the next window
    Idle,
    /// Market resolved, window not yet open
    Armed,
    /// Polling and evaluating
    Open,
    /// Window ended, budget exhausted, or shut down
    Closed,
}

/// State for one trading day. Created when armed, dropped when closed.
#[derive(Debug)]
pub struct Session {
    /// Local calendar day the session trades on
    pub local_date: NaiveDate,
    pub market: MarketDay,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub pool: BudgetPool,
    /// Idempotency key: date of the last reading acted on
    pub last_reading_date: Option<NaiveDate>,
    stats: SessionSummary,
}

impl Session {
    /// Accept a reading only once, and only for this session's market date.
    fn accept_reading(&mut self, reading: Reading) -> Option<Reading> {
        if reading.date != self.market.date {
            info!(
                reading_date = %reading.date,
                market_date = %self.market.date,
                "Reading for another date, ignored"
            );
            return None;
        }
        if self.last_reading_date == Some(reading.date) {
            debug!(%reading, "Reading already processed");
            return None;
        }
        self.last_reading_date = Some(reading.date);
        self.stats.readings_processed += 1;
        Some(reading)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            market_date: Some(self.market.date),
            budget_total: self.pool.total(),
            budget_spent: self.pool.committed(),
            budget_attempted: self.pool.attempted(),
            ..self.stats.clone()
        }
    }
}

/// Collaborators the controller drives.
pub struct SessionDeps {
    pub discovery: Arc<dyn MarketDiscovery>,
    pub fetcher: TickFetcher,
    pub executor: OrderExecutor,
    pub observer: Arc<dyn SessionObserver>,
}

pub struct SessionController {
    window: SessionWindow,
    strategy: Box<dyn Strategy>,
    planner: ExecutionPlanner,
    deps: SessionDeps,
    budget_usd: Decimal,
    min_order_usd: Decimal,
    poll_interval: Duration,
    idle_interval: Duration,
    phase: SessionPhase,
    session: Option<Session>,
    /// Local date of the last closed session, so a day is traded once
    closed_on: Option<NaiveDate>,
    last_summary: Option<SessionSummary>,
}

impl SessionController {
    pub fn new(
        config: &Config,
        window: SessionWindow,
        strategy: Box<dyn Strategy>,
        deps: SessionDeps,
    ) -> Self {
        Self {
            window,
            strategy,
            planner: ExecutionPlanner::new(config.trading.min_order_usd),
            deps,
            budget_usd: config.trading.budget_usd,
            min_order_usd: config.trading.min_order_usd,
            poll_interval: Duration::from_millis(config.session.poll_interval_ms),
            idle_interval: Duration::from_secs(config.session.idle_poll_interval_secs),
            phase: SessionPhase::Idle,
            session: None,
            closed_on: None,
            last_summary: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Summary of the most recently closed session.
    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Market date and tokens the live session watches.
    pub fn watched(&self) -> Option<(NaiveDate, Vec<String>)> {
        self.session
            .as_ref()
            .map(|s| (s.market.date, self.strategy.watched_tokens(&s.market)))
    }

    /// Delay before the next tick.
    pub fn next_delay(&self) -> Duration {
        match self.phase {
            SessionPhase::Armed | SessionPhase::Open => self.poll_interval,
            SessionPhase::Idle | SessionPhase::Closed => self.idle_interval,
        }
    }

    /// Advance the state machine at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> SessionPhase {
        match self.phase {
            SessionPhase::Idle => self.try_arm(now).await,
            SessionPhase::Armed => self.try_open(now).await,
            SessionPhase::Open => self.run_cycle(now).await,
            SessionPhase::Closed => self.roll_over(now),
        }
        self.phase
    }

    /// Close any live session without issuing further orders.
    pub fn shutdown(&mut self) {
        if self.session.is_some() {
            self.close(CloseReason::Shutdown);
        }
    }

    async fn try_arm(&mut self, now: DateTime<Utc>) {
        let today = self.window.local_date(now);
        if self.closed_on == Some(today) || !self.window.is_trading_day(today) {
            return;
        }
        let (Some(opens_at), Some(closes_at)) =
            (self.window.opens_at(today), self.window.closes_at(today))
        else {
            warn!(%today, "Window times undefined for date");
            return;
        };
        if now >= closes_at {
            return;
        }

        let Some(market_date) = target_dates(today).last().copied() else {
            return;
        };
        let market = match self.deps.discovery.resolve_outcomes(market_date).await {
            Ok(market) => market,
            Err(e) => {
                warn!(%market_date, error = %e, "Market discovery failed, retrying next tick");
                return;
            }
        };

        info!(
            %today,
            %market_date,
            slug = %market.slug,
            brackets = market.markets.len(),
            %opens_at,
            %closes_at,
            "Session armed"
        );
        self.session = Some(Session {
            local_date: today,
            market,
            opens_at,
            closes_at,
            pool: BudgetPool::new(self.budget_usd),
            last_reading_date: None,
            stats: SessionSummary {
                strategy: self.strategy.name(),
                ..Default::default()
            },
        });
        self.transition(SessionPhase::Armed);
    }

    async fn try_open(&mut self, now: DateTime<Utc>) {
        let Some((opens_at, closes_at, tokens)) = self.session.as_ref().map(|s| {
            (s.opens_at, s.closes_at, self.strategy.watched_tokens(&s.market))
        }) else {
            self.phase = SessionPhase::Idle;
            return;
        };
        if now >= closes_at {
            self.close(CloseReason::WindowEnd);
            return;
        }
        if now < opens_at {
            return;
        }

        let quotes = self.deps.fetcher.quotes(&tokens).await;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.pool.reset(self.budget_usd);
        session.last_reading_date = None;
        let ctx = TickContext {
            market: &session.market,
            quotes: &quotes,
            reading: None,
            now,
        };
        self.strategy.open(&ctx);

        info!(
            market_date = %session.market.date,
            budget = %session.pool.total(),
            quoted = quotes.len(),
            strategy = self.strategy.name(),
            "Session opened"
        );
        self.transition(SessionPhase::Open);
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) {
        let Some((closes_at, tokens)) = self
            .session
            .as_ref()
            .map(|s| (s.closes_at, self.strategy.watched_tokens(&s.market)))
        else {
            self.phase = SessionPhase::Idle;
            return;
        };
        if now >= closes_at {
            self.close(CloseReason::WindowEnd);
            return;
        }

        let (quotes, reading) = if self.strategy.uses_readings() {
            tokio::join!(self.deps.fetcher.quotes(&tokens), self.deps.fetcher.reading())
        } else {
            (self.deps.fetcher.quotes(&tokens).await, None)
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.stats.ticks += 1;
        let reading = reading.and_then(|r| session.accept_reading(r));

        let ctx = TickContext {
            market: &session.market,
            quotes: &quotes,
            reading: reading.as_ref(),
            now,
        };
        let signals = self.strategy.evaluate(&ctx);
        session.stats.triggers_fired = self.strategy.triggers_fired();

        let orders = self.planner.allocate(&signals, &mut session.pool);
        if !orders.is_empty() {
            let report = self.deps.executor.execute(&orders, &mut session.pool).await;
            session.stats.orders_placed += report.placed();
            session.stats.orders_rejected += report.rejected;
        }
        session.pool.settle_tick();

        if session.pool.is_exhausted(self.min_order_usd) {
            self.close(CloseReason::BudgetExhausted);
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        if self.closed_on != Some(self.window.local_date(now)) {
            debug!("New day, waiting for next window");
            self.phase = SessionPhase::Idle;
        }
    }

    fn close(&mut self, reason: CloseReason) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let mut summary = session.summary();
        summary.close_reason = Some(reason);
        self.closed_on = Some(session.local_date);

        let from = self.phase;
        self.phase = SessionPhase::Closed;
        self.deps.observer.on_transition(from, SessionPhase::Closed, &summary);
        self.deps.observer.on_close(&summary);

        self.session = None;
        self.last_summary = Some(summary);
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.phase;
        self.phase = to;
        let summary = self.session.as_ref().map(Session::summary).unwrap_or_default();
        self.deps.observer.on_transition(from, to, &summary);
    }
}
