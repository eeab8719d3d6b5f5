//! Budget pool and execution planning.

use crate::error::{Result, TraderError};
use crate::exchange::Order;
use crate::strategy::signal::Signal;
use crate::utils::decimal::floor_cents;
use rust_decimal::Decimal;
use tracing::{debug, error, info};

/// Spend ledger for one session.
///
/// `remaining` only goes down within a tick: every attempted order reserves
/// its slice before submission. Slices the venue confirmed as unfilled are
/// returned by `settle_tick` once the tick is over.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPool {
    total: Decimal,
    remaining: Decimal,
    /// Confirmed fills
    committed: Decimal,
    /// Confirmed no-fill slices awaiting return at tick end
    pending_release: Decimal,
}

impl BudgetPool {
    pub fn new(total: Decimal) -> Self {
        let total = floor_cents(total.max(Decimal::ZERO));
        Self {
            total,
            remaining: total,
            committed: Decimal::ZERO,
            pending_release: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn remaining(&self) -> Decimal {
        self.remaining
    }

    pub fn committed(&self) -> Decimal {
        self.committed
    }

    /// Reserved by attempted orders and not returned.
    pub fn attempted(&self) -> Decimal {
        self.total - self.remaining
    }

    /// Take `amount` out of the pool ahead of submission.
    pub fn reserve(&mut self, amount: Decimal) -> Result<()> {
        if amount > self.remaining || amount < Decimal::ZERO {
            return Err(TraderError::BudgetExceeded {
                requested: amount,
                remaining: self.remaining,
            });
        }
        self.remaining -= amount;
        Ok(())
    }

    /// Record a confirmed fill of a reserved slice.
    pub fn commit(&mut self, amount: Decimal) {
        self.committed += amount;
    }

    /// Mark a reserved slice for return at the end of the tick.
    pub fn schedule_release(&mut self, amount: Decimal) {
        self.pending_release += amount;
    }

    /// Return the tick's confirmed no-fill slices. Returns the amount released.
    pub fn settle_tick(&mut self) -> Decimal {
        let released = self.pending_release;
        if !released.is_zero() {
            // Never above what was reserved and not committed
            let ceiling = self.total - self.committed;
            self.remaining = (self.remaining + released).min(ceiling);
            self.pending_release = Decimal::ZERO;
            debug!(%released, remaining = %self.remaining, "Budget released");
        }
        released
    }

    /// Nothing worth ordering is left.
    pub fn is_exhausted(&self, min_order_usd: Decimal) -> bool {
        self.remaining <= Decimal::ZERO || self.remaining < min_order_usd
    }

    /// Refill to `total` for a new session.
    pub fn reset(&mut self, total: Decimal) {
        *self = Self::new(total);
    }
}

/// Turns ordered signals into orders that fit the pool.
#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    min_order_usd: Decimal,
}

impl ExecutionPlanner {
    pub fn new(min_order_usd: Decimal) -> Self {
        Self { min_order_usd }
    }

    /// Consume `signals` in the given order, reserving each order's size
    /// before the next is considered.
    pub fn allocate(&self, signals: &[Signal], pool: &mut BudgetPool) -> Vec<Order> {
        let mut orders = Vec::new();

        for signal in signals {
            let size = floor_cents(signal.proposed_size_usd.min(pool.remaining()));
            if size <= Decimal::ZERO || size < self.min_order_usd {
                info!(
                    outcome = %signal.outcome,
                    proposed = %signal.proposed_size_usd,
                    remaining = %pool.remaining(),
                    min = %self.min_order_usd,
                    "Skipping signal: negligible size"
                );
                continue;
            }

            if let Err(e) = pool.reserve(size) {
                error!(error = %e, outcome = %signal.outcome, "Allocation defect");
                break;
            }

            info!(
                outcome = %signal.outcome,
                price_cap = %signal.price_cap,
                score = %signal.score,
                size = %size,
                remaining = %pool.remaining(),
                source = %signal.source,
                "Order allocated"
            );

            orders.push(Order {
                outcome: signal.outcome.clone(),
                price_cap: signal.price_cap,
                amount_usd: size,
                strategy: signal.source.as_str(),
            });
        }

        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Outcome, OutcomeSide};
    use crate::strategy::signal::SignalSource;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn signal(token: &str, size: Decimal) -> Signal {
        Signal {
            outcome: Outcome::new(token, OutcomeSide::Yes, token),
            price_cap: dec!(0.40),
            score: dec!(0.60),
            proposed_size_usd: size,
            source: SignalSource::DataEvent,
        }
    }

    #[test]
    fn test_second_order_capped_by_remaining() {
        let mut pool = BudgetPool::new(dec!(50));
        let planner = ExecutionPlanner::new(dec!(1));

        let orders = planner.allocate(&[signal("a", dec!(40)), signal("b", dec!(20))], &mut pool);

        let sizes: Vec<Decimal> = orders.iter().map(|o| o.amount_usd).collect();
        assert_eq!(sizes, vec![dec!(40), dec!(10)]);
        assert_eq!(pool.remaining(), Decimal::ZERO);
        assert_eq!(pool.attempted(), dec!(50));
        assert_eq!(orders[0].strategy, "data_event");
    }

    #[test]
    fn test_negligible_remainder_skipped() {
        let mut pool = BudgetPool::new(dec!(10.50));
        let planner = ExecutionPlanner::new(dec!(1));

        let orders = planner.allocate(
            &[signal("a", dec!(10)), signal("b", dec!(5)), signal("c", dec!(0.4))],
            &mut pool,
        );

        assert_eq!(orders.len(), 1);
        assert_eq!(pool.remaining(), dec!(0.50));
        assert!(pool.is_exhausted(dec!(1)));
    }

    #[test]
    fn test_sizes_round_down_to_cents() {
        let mut pool = BudgetPool::new(dec!(50));
        let planner = ExecutionPlanner::new(dec!(1));

        let orders = planner.allocate(&[signal("a", dec!(3.339))], &mut pool);
        assert_eq!(orders[0].amount_usd, dec!(3.33));
        assert_eq!(pool.remaining(), dec!(46.67));
    }

    #[test]
    fn test_reserve_beyond_remaining_is_error() {
        let mut pool = BudgetPool::new(dec!(10));
        let err = pool.reserve(dec!(10.01)).unwrap_err();
        assert!(matches!(err, TraderError::BudgetExceeded { .. }));
        assert_eq!(pool.remaining(), dec!(10));
    }

    #[test]
    fn test_release_happens_at_tick_end() {
        let mut pool = BudgetPool::new(dec!(50));
        pool.reserve(dec!(30)).unwrap();
        pool.schedule_release(dec!(30));
        assert_eq!(pool.remaining(), dec!(20));

        assert_eq!(pool.settle_tick(), dec!(30));
        assert_eq!(pool.remaining(), dec!(50));
        assert_eq!(pool.settle_tick(), Decimal::ZERO);
    }

    #[test]
    fn test_commit_and_reset() {
        let mut pool = BudgetPool::new(dec!(50));
        pool.reserve(dec!(20)).unwrap();
        pool.commit(dec!(20));
        assert_eq!(pool.committed(), dec!(20));

        pool.reset(dec!(40));
        assert_eq!(pool.total(), dec!(40));
        assert_eq!(pool.remaining(), dec!(40));
        assert_eq!(pool.committed(), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn prop_allocation_never_exceeds_budget(
            total_cents in 0u64..100_000,
            requests in prop::collection::vec(0u64..20_000, 0..20),
        ) {
            let total = Decimal::new(total_cents as i64, 2);
            let mut pool = BudgetPool::new(total);
            let planner = ExecutionPlanner::new(dec!(1));
            let signals: Vec<Signal> = requests
                .iter()
                .enumerate()
                .map(|(i, c)| signal(&format!("t{}", i), Decimal::new(*c as i64, 2)))
                .collect();

            let orders = planner.allocate(&signals, &mut pool);
            let spent: Decimal = orders.iter().map(|o| o.amount_usd).sum();

            prop_assert!(spent <= total);
            prop_assert_eq!(spent + pool.remaining(), total);
            prop_assert!(pool.remaining() >= Decimal::ZERO);
            prop_assert!(orders.iter().all(|o| o.amount_usd >= dec!(1)));
        }
    }
}
