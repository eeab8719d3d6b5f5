//! Collaborator interfaces the engine consumes.
//!
//! Each trait hides one external dependency so the control loop can run
//! against the live venue, a streamed cache, the paper gateway, or test
//! doubles without change:
//! - `OrderBookProvider`: best ask for one outcome token
//! - `MarketDiscovery`: calendar date to the day's tradable outcomes
//! - `OrderGateway`: fill-or-kill order submission

use crate::error::Result;
use crate::exchange::types::{Fill, MarketDay, Order, Quote};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Source of current best-ask quotes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderBookProvider: Send + Sync {
    /// Best ask for a token. `Ok(None)` means the book has no asks.
    ///
    /// May fail transiently; callers exclude the outcome from the tick.
    async fn get_price(&self, token_id: &str) -> Result<Option<Quote>>;
}

/// Maps a calendar date to the tradable bracket outcomes for that date.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDiscovery: Send + Sync {
    async fn resolve_outcomes(&self, date: NaiveDate) -> Result<MarketDay>;
}

/// Order execution venue.
///
/// Orders are all-or-nothing. An `Err(TraderError::Execution { .. })` with
/// `no_fill_confirmed` set means the venue acknowledged that nothing filled;
/// any other failure leaves the fill state unknown.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Short venue name for logs.
    fn name(&self) -> &'static str;

    async fn submit(&self, order: &Order) -> Result<Fill>;
}
