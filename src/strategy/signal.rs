//! Candidate signals and the strategy interface.

use crate::exchange::{MarketDay, Outcome, OutcomeSide, Quote};
use crate::feed::Reading;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

/// Strategy that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    DataEvent,
    Movement,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::DataEvent => "data_event",
            SignalSource::Movement => "movement",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate buy. Immutable once ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub outcome: Outcome,
    /// Highest acceptable fill price
    pub price_cap: Decimal,
    /// Edge for data-event signals, z for movement signals
    pub score: Decimal,
    /// Requested spend in USD before budget capping
    pub proposed_size_usd: Decimal,
    pub source: SignalSource,
}

impl Signal {
    pub fn side(&self) -> OutcomeSide {
        self.outcome.side
    }
}

/// Everything a strategy may look at for one tick.
///
/// Quotes are keyed by token id. A token without a quote was missing,
/// failed, or timed out this tick and must be treated as unavailable.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub market: &'a MarketDay,
    pub quotes: &'a HashMap<String, Quote>,
    /// A reading that is new for this session, if one arrived this tick
    pub reading: Option<&'a Reading>,
    pub now: DateTime<Utc>,
}

impl<'a> TickContext<'a> {
    pub fn quote(&self, outcome: &Outcome) -> Option<&'a Quote> {
        self.quotes.get(&outcome.token_id)
    }
}

/// A signal-generation strategy, selected once per session.
///
/// Evaluation is synchronous; all I/O happens before the context is built.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    /// Token ids whose quotes this strategy needs each tick.
    fn watched_tokens(&self, market: &MarketDay) -> Vec<String>;

    /// Whether the data source must be polled each tick.
    fn uses_readings(&self) -> bool {
        false
    }

    /// Reset per-session state. Called exactly once when the window opens,
    /// with the opening snapshot.
    fn open(&mut self, ctx: &TickContext<'_>);

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Vec<Signal>;

    /// Signals emitted since the last `open`.
    fn triggers_fired(&self) -> u64;
}
