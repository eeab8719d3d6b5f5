//! Per-tick I/O: concurrent quote fetches and the data-source poll.

use crate::exchange::{OrderBookProvider, Quote};
use crate::feed::{Reading, ReadingPoll, ReadingSource};
use crate::utils::{retry_with_backoff, RetryPolicy};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Gathers one tick's snapshot from the collaborators.
pub struct TickFetcher {
    quotes: Arc<dyn OrderBookProvider>,
    readings: Arc<dyn ReadingSource>,
    /// Bound on a single outcome fetch, retries included
    deadline: Duration,
    policy: RetryPolicy,
}

impl TickFetcher {
    pub fn new(
        quotes: Arc<dyn OrderBookProvider>,
        readings: Arc<dyn ReadingSource>,
        deadline: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            quotes,
            readings,
            deadline,
            policy,
        }
    }

    /// Fetch every token concurrently and wait for all of them. Failed,
    /// empty, or timed-out tokens are left out of the snapshot.
    pub async fn quotes(&self, tokens: &[String]) -> HashMap<String, Quote> {
        let fetches = tokens.iter().map(|token| async move {
            let fetch = retry_with_backoff(token, self.policy, || self.quotes.get_price(token));
            (token, timeout(self.deadline, fetch).await)
        });

        let mut snapshot = HashMap::with_capacity(tokens.len());
        for (token, result) in join_all(fetches).await {
            match result {
                Ok(Ok(Some(quote))) => {
                    snapshot.insert(token.clone(), quote);
                }
                Ok(Ok(None)) => debug!(%token, "No asks"),
                Ok(Err(e)) => warn!(%token, error = %e, "Quote fetch failed, excluded this tick"),
                Err(_) => warn!(%token, deadline = ?self.deadline, "Quote fetch timed out, excluded this tick"),
            }
        }
        snapshot
    }

    /// Latest reading from a changed page, if any. Bounded by the same
    /// deadline as a quote fetch.
    pub async fn reading(&self) -> Option<Reading> {
        let poll = retry_with_backoff("feed", self.policy, || self.readings.get_latest_reading());
        match timeout(self.deadline, poll).await {
            Ok(Ok(ReadingPoll::Latest(reading))) => Some(reading),
            Ok(Ok(ReadingPoll::Unchanged)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "Reading skipped");
                None
            }
            Err(_) => {
                warn!(deadline = ?self.deadline, "Reading fetch timed out, skipped this tick");
                None
            }
        }
    }
}
