//! Polymarket market WebSocket feeding a best-ask cache.
//!
//! `BookStream::run` keeps a subscription alive for a fixed set of tokens,
//! reconnecting with exponential backoff. The cache it fills serves
//! `OrderBookProvider` reads without a network round trip; quotes older
//! than the staleness bound are reported as missing.

use crate::error::{Result, TraderError};
use crate::exchange::traits::OrderBookProvider;
use crate::exchange::types::{OrderBookLevel, Quote};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    assets_ids: &'a [String],
    #[serde(rename = "type")]
    msg_type: &'static str,
}

/// Full book snapshot pushed on subscribe and after trades.
#[derive(Debug, Deserialize)]
struct BookMessage {
    asset_id: String,
    #[serde(default)]
    asks: Vec<OrderBookLevel>,
}

/// Incremental update carrying the new top of book.
#[derive(Debug, Deserialize)]
struct PriceChange {
    asset_id: String,
    #[serde(default)]
    best_ask: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceChangeMessage {
    #[serde(default)]
    price_changes: Vec<PriceChange>,
}

#[derive(Debug, Deserialize)]
struct GenericMessage {
    event_type: Option<String>,
}

/// Exponential reconnect schedule. A connection that got as far as
/// subscribing restarts it from the initial delay.
struct ReconnectBackoff {
    next: Duration,
}

impl ReconnectBackoff {
    fn new() -> Self {
        Self {
            next: INITIAL_RECONNECT_DELAY,
        }
    }

    /// Delay to wait before reconnecting after a dropped connection.
    fn next_delay(&mut self, subscribed: bool) -> Duration {
        if subscribed {
            self.next = INITIAL_RECONNECT_DELAY;
        }
        let delay = self.next;
        self.next = (delay * 2).min(MAX_RECONNECT_DELAY);
        delay
    }
}

/// Streamed best-ask cache for a set of tokens.
pub struct BookStream {
    url: String,
    quotes: Arc<RwLock<HashMap<String, Quote>>>,
    staleness: Duration,
}

impl BookStream {
    pub fn new(url: &str, staleness: Duration) -> Self {
        Self {
            url: url.to_string(),
            quotes: Arc::new(RwLock::new(HashMap::new())),
            staleness,
        }
    }

    /// Run until shutdown, reconnecting with backoff (1s doubling to 60s).
    pub async fn run(&self, token_ids: Vec<String>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = ReconnectBackoff::new();

        loop {
            if *shutdown.borrow() {
                info!("Book stream: shutdown signal received");
                return;
            }

            let mut subscribed = false;
            match self.run_connection(&token_ids, &mut shutdown, &mut subscribed).await {
                Ok(()) => {
                    info!("Book stream: clean shutdown");
                    return;
                }
                Err(e) => {
                    let reconnect_delay = backoff.next_delay(subscribed);
                    warn!(error = %e, delay = ?reconnect_delay, "Book stream disconnected, reconnecting");

                    tokio::select! {
                        _ = tokio::time::sleep(reconnect_delay) => {}
                        _ = shutdown.changed() => {
                            info!("Book stream: shutdown during reconnect delay");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Run a single connection until it fails or shutdown is requested.
    async fn run_connection(
        &self,
        token_ids: &[String],
        shutdown: &mut watch::Receiver<bool>,
        subscribed: &mut bool,
    ) -> Result<()> {
        info!(url = %self.url, tokens = token_ids.len(), "Connecting to market WebSocket");

        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TraderError::fetch("ws", "connect timed out"))?
            .map_err(|e| TraderError::fetch("ws", e))?;

        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::to_string(&SubscribeMessage {
            assets_ids: token_ids,
            msg_type: "market",
        })?;
        write
            .send(Message::Text(subscribe.into()))
            .await
            .map_err(|e| TraderError::fetch("ws", e))?;
        info!(tokens = token_ids.len(), "Subscribed to market books");
        *subscribed = true;

        let mut ping_timer = interval(PING_INTERVAL);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.apply_message(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| TraderError::fetch("ws", e))?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(TraderError::fetch("ws", format!("closed by server: {:?}", frame)));
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            return Err(TraderError::fetch("ws", e));
                        }
                        None => return Err(TraderError::fetch("ws", "stream ended")),
                        _ => {}
                    }
                }

                _ = ping_timer.tick() => {
                    write
                        .send(Message::Text("PING".into()))
                        .await
                        .map_err(|e| TraderError::fetch("ws", e))?;
                }

                _ = shutdown.changed() => {
                    return Ok(());
                }
            }
        }
    }

    /// Apply one text frame (a single event or an array of events).
    /// Returns the number of quotes updated.
    pub async fn apply_message(&self, text: &str) -> usize {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            // PONG and other non-JSON keepalives
            debug!(%text, "Non-JSON frame");
            return 0;
        };

        let events = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        let mut updated = 0;
        let mut quotes = self.quotes.write().await;

        for event in events {
            let kind = serde_json::from_value::<GenericMessage>(event.clone())
                .ok()
                .and_then(|m| m.event_type);

            match kind.as_deref() {
                Some("book") => {
                    let Ok(book) = serde_json::from_value::<BookMessage>(event) else {
                        warn!("Failed to parse book message");
                        continue;
                    };
                    let best = book
                        .asks
                        .iter()
                        .filter(|l| l.size > Decimal::ZERO)
                        .min_by(|a, b| a.price.cmp(&b.price));
                    match best {
                        Some(level) => {
                            quotes.insert(book.asset_id, Quote::new(level.price, level.size));
                        }
                        None => {
                            quotes.remove(&book.asset_id);
                        }
                    }
                    updated += 1;
                }
                Some("price_change") => {
                    let Ok(msg) = serde_json::from_value::<PriceChangeMessage>(event) else {
                        continue;
                    };
                    for change in msg.price_changes {
                        let Some(ask) = change.best_ask.and_then(|p| p.parse::<Decimal>().ok())
                        else {
                            continue;
                        };
                        // Size is refreshed by the next snapshot
                        if let Some(quote) = quotes.get_mut(&change.asset_id) {
                            quote.price = ask;
                            quote.observed_at = Utc::now();
                            updated += 1;
                        }
                    }
                }
                other => debug!(event_type = ?other, "Ignoring market event"),
            }
        }

        updated
    }
}

#[async_trait]
impl OrderBookProvider for BookStream {
    async fn get_price(&self, token_id: &str) -> Result<Option<Quote>> {
        let quotes = self.quotes.read().await;
        let quote = quotes
            .get(token_id)
            .ok_or_else(|| TraderError::fetch("ws", format!("no streamed quote for {}", token_id)))?;

        let age = Utc::now() - quote.observed_at;
        if age.to_std().unwrap_or_default() > self.staleness {
            return Err(TraderError::fetch(
                "ws",
                format!("quote for {} is {}ms old", token_id, age.num_milliseconds()),
            ));
        }
        Ok(Some(quote.clone()))
    }
}
