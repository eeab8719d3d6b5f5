//! Paper gateway for dry runs.
//!
//! Fills every order synthetically at its price cap and keeps the fills so
//! the session summary reads the same as a live session.

use crate::error::{Result, TraderError};
use crate::exchange::traits::OrderGateway;
use crate::exchange::types::{Fill, Order};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Simulated order gateway.
#[derive(Default)]
pub struct PaperGateway {
    fills: Arc<RwLock<Vec<Fill>>>,
    order_id_counter: AtomicU64,
    /// Tokens whose orders are killed instead of filled
    rejected_tokens: HashSet<String>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill every order for these tokens (exercises the rejection path).
    pub fn with_rejections<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub async fn fills(&self) -> Vec<Fill> {
        self.fills.read().await.clone()
    }

    pub async fn total_filled(&self) -> Decimal {
        self.fills.read().await.iter().map(|f| f.amount_usd).sum()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn submit(&self, order: &Order) -> Result<Fill> {
        if self.rejected_tokens.contains(&order.outcome.token_id) {
            return Err(TraderError::Execution {
                token_id: order.outcome.token_id.clone(),
                reason: "paper rejection".into(),
                no_fill_confirmed: true,
            });
        }

        let id = self.order_id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let fill = Fill {
            order_id: format!("paper-{}", id),
            token_id: order.outcome.token_id.clone(),
            amount_usd: order.amount_usd,
            price: order.price_cap,
            filled_at: Utc::now(),
            simulated: true,
        };

        info!(
            order_id = %fill.order_id,
            outcome = %order.outcome,
            price = %fill.price,
            amount = %fill.amount_usd,
            "[DRY RUN] Simulated fill"
        );

        self.fills.write().await.push(fill.clone());
        Ok(fill)
    }
}
