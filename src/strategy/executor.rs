//! Order submission against the budget pool.

use crate::error::TraderError;
use crate::exchange::{Fill, Order, OrderGateway};
use crate::strategy::allocator::BudgetPool;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of submitting one tick's orders.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub fills: Vec<Fill>,
    pub rejected: u64,
    /// Amount of confirmed fills
    pub spent: Decimal,
    /// Amount reserved by every submitted order
    pub attempted: Decimal,
}

impl ExecutionReport {
    pub fn placed(&self) -> u64 {
        self.fills.len() as u64
    }
}

/// Submits planned orders one at a time through a gateway.
///
/// Fill-or-kill orders are never retried: a failed submission with an
/// unknown outcome may already have filled.
pub struct OrderExecutor {
    gateway: Arc<dyn OrderGateway>,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Submit `orders` in order. Each order's slice was reserved by the
    /// planner; confirmed no-fill slices are scheduled for release at the
    /// end of the tick.
    pub async fn execute(&self, orders: &[Order], pool: &mut BudgetPool) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for order in orders {
            report.attempted += order.amount_usd;

            match self.gateway.submit(order).await {
                Ok(fill) => {
                    pool.commit(order.amount_usd);
                    report.spent += order.amount_usd;
                    info!(
                        gateway = self.gateway.name(),
                        outcome = %order.outcome,
                        order_id = %fill.order_id,
                        amount = %order.amount_usd,
                        price = %fill.price,
                        price_cap = %order.price_cap,
                        remaining = %pool.remaining(),
                        "Order filled"
                    );
                    report.fills.push(fill);
                }
                Err(TraderError::Execution {
                    reason,
                    no_fill_confirmed,
                    ..
                }) => {
                    report.rejected += 1;
                    if no_fill_confirmed {
                        pool.schedule_release(order.amount_usd);
                    }
                    warn!(
                        gateway = self.gateway.name(),
                        outcome = %order.outcome,
                        amount = %order.amount_usd,
                        price_cap = %order.price_cap,
                        %reason,
                        no_fill_confirmed,
                        remaining = %pool.remaining(),
                        "Order rejected"
                    );
                }
                Err(e) => {
                    report.rejected += 1;
                    error!(
                        gateway = self.gateway.name(),
                        outcome = %order.outcome,
                        amount = %order.amount_usd,
                        error = %e,
                        remaining = %pool.remaining(),
                        "Order failed with unknown outcome"
                    );
                }
            }
        }

        report
    }
}
