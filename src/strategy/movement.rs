//! Movement strategy: z-score detection of significant price moves on the
//! bracket YES tokens, scaling into a position over several confirmations.
//!
//! Each outcome keeps a `TriggerState` that is re-armed when the window
//! opens: the opening ask becomes the baseline and the rolling window
//! restarts from it. `z = (current - baseline) / std_dev` over the rolling
//! window; a zero standard deviation leaves z undefined.

use crate::config::Config;
use crate::exchange::{MarketDay, Outcome};
use crate::strategy::signal::{Signal, SignalSource, Strategy, TickContext};
use crate::utils::decimal::{floor_cents, sample_std_dev};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// `(current - baseline) / std_dev`, undefined when `std_dev` is zero.
pub fn zscore(current: Decimal, baseline: Decimal, std_dev: Decimal) -> Option<Decimal> {
    if std_dev.is_zero() {
        None
    } else {
        Some((current - baseline) / std_dev)
    }
}

/// Per-outcome detection state for one session.
#[derive(Debug, Clone)]
pub struct TriggerState {
    pub outcome: Outcome,
    pub baseline: Decimal,
    pub current: Decimal,
    history: VecDeque<Decimal>,
    capacity: usize,
    /// Scale-in slices consumed so far
    pub trigger_count: usize,
    pub last_trigger_price: Option<Decimal>,
}

impl TriggerState {
    pub fn new(outcome: Outcome, baseline: Decimal, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut history = VecDeque::with_capacity(capacity);
        history.push_back(baseline);
        Self {
            outcome,
            baseline,
            current: baseline,
            history,
            capacity,
            trigger_count: 0,
            last_trigger_price: None,
        }
    }

    /// Record a new price, evicting the oldest beyond the window.
    pub fn observe(&mut self, price: Decimal) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(price);
        self.current = price;
    }

    pub fn samples(&self) -> usize {
        self.history.len()
    }

    pub fn std_dev(&self) -> Option<Decimal> {
        let window: Vec<Decimal> = self.history.iter().copied().collect();
        sample_std_dev(&window)
    }

    /// z of the current price, once at least `min_samples` are held.
    pub fn zscore(&self, min_samples: usize) -> Option<Decimal> {
        if self.samples() < min_samples {
            return None;
        }
        zscore(self.current, self.baseline, self.std_dev()?)
    }

    fn record_trigger(&mut self) {
        self.trigger_count += 1;
        self.last_trigger_price = Some(self.current);
    }
}

/// Why a candidate did not trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BelowThreshold,
    SmallMove,
    AboveMaxPrice,
    Exhausted,
    SamePlateau,
}

/// Detection thresholds and scale-in sizing.
#[derive(Debug, Clone)]
pub struct MovementParams {
    pub zscore_threshold: Decimal,
    pub min_price_change: Decimal,
    pub max_buy_price: Decimal,
    /// Percentages (0-100) of the per-outcome allocation, in order
    pub scale_in_pcts: Vec<Decimal>,
    /// Original allocation per outcome
    pub per_outcome_budget: Decimal,
    pub rolling_window: usize,
    pub min_samples: usize,
    pub single_outcome_focus: bool,
}

impl MovementParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            zscore_threshold: config.movement.zscore_threshold,
            min_price_change: config.movement.min_price_change,
            max_buy_price: config.trading.max_buy_price,
            scale_in_pcts: config.movement.scale_in_pcts.clone(),
            per_outcome_budget: config.per_outcome_budget(),
            rolling_window: config.movement.rolling_window,
            min_samples: config.movement.min_samples,
            single_outcome_focus: config.movement.single_outcome_focus,
        }
    }

    /// Scale-in percentage for the next trigger, or why there is none.
    pub fn check(&self, state: &TriggerState, z: Decimal) -> Result<Decimal, SkipReason> {
        let price = state.current;

        // Only YES is bought, so only upward moves qualify
        if z < self.zscore_threshold {
            return Err(SkipReason::BelowThreshold);
        }
        if price - state.baseline < self.min_price_change {
            return Err(SkipReason::SmallMove);
        }
        if price > self.max_buy_price {
            return Err(SkipReason::AboveMaxPrice);
        }
        let Some(pct) = self.scale_in_pcts.get(state.trigger_count) else {
            return Err(SkipReason::Exhausted);
        };
        if let Some(last) = state.last_trigger_price {
            if price - last < self.min_price_change {
                return Err(SkipReason::SamePlateau);
            }
        }
        Ok(*pct)
    }

    /// USD size of a scale-in slice.
    pub fn slice_size(&self, pct: Decimal) -> Decimal {
        floor_cents(self.per_outcome_budget * pct / Decimal::ONE_HUNDRED)
    }
}

/// Statistical movement strategy.
pub struct MovementStrategy {
    params: MovementParams,
    /// Keyed by token id
    states: HashMap<String, TriggerState>,
    /// Outcome the session is focused on after its first trigger
    locked: Option<String>,
    fired: u64,
}

impl MovementStrategy {
    pub fn new(params: MovementParams) -> Self {
        Self {
            params,
            states: HashMap::new(),
            locked: None,
            fired: 0,
        }
    }

    pub fn state(&self, token_id: &str) -> Option<&TriggerState> {
        self.states.get(token_id)
    }

    pub fn locked_outcome(&self) -> Option<&str> {
        self.locked.as_deref()
    }

    /// Tokens allowed to trigger this tick.
    fn candidates(&self) -> Vec<String> {
        if !self.params.single_outcome_focus {
            let mut all: Vec<String> = self.states.keys().cloned().collect();
            all.sort();
            return all;
        }
        if let Some(locked) = &self.locked {
            return vec![locked.clone()];
        }

        // Top upward mover; ties resolved by label for determinism
        self.states
            .iter()
            .filter_map(|(token, state)| {
                state
                    .zscore(self.params.min_samples)
                    .filter(|z| *z > Decimal::ZERO)
                    .map(|z| (token, state, z))
            })
            .max_by(|(_, a, za), (_, b, zb)| {
                za.cmp(zb).then_with(|| b.outcome.label.cmp(&a.outcome.label))
            })
            .map(|(token, _, _)| vec![token.clone()])
            .unwrap_or_default()
    }
}

impl Strategy for MovementStrategy {
    fn name(&self) -> &'static str {
        SignalSource::Movement.as_str()
    }

    fn watched_tokens(&self, market: &MarketDay) -> Vec<String> {
        market.yes_outcomes().map(|o| o.token_id.clone()).collect()
    }

    fn open(&mut self, ctx: &TickContext<'_>) {
        self.states.clear();
        self.locked = None;
        self.fired = 0;

        for outcome in ctx.market.yes_outcomes() {
            match ctx.quote(outcome) {
                Some(quote) => {
                    info!(%outcome, baseline = %quote.price, "Baseline set");
                    self.states.insert(
                        outcome.token_id.clone(),
                        TriggerState::new(outcome.clone(), quote.price, self.params.rolling_window),
                    );
                }
                None => warn!(%outcome, "No opening quote, baseline deferred"),
            }
        }
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Vec<Signal> {
        for outcome in ctx.market.yes_outcomes() {
            let Some(quote) = ctx.quote(outcome) else {
                continue;
            };
            match self.states.get_mut(&outcome.token_id) {
                Some(state) => state.observe(quote.price),
                None => {
                    info!(%outcome, baseline = %quote.price, "Late baseline set");
                    self.states.insert(
                        outcome.token_id.clone(),
                        TriggerState::new(outcome.clone(), quote.price, self.params.rolling_window),
                    );
                }
            }
        }

        let mut signals = Vec::new();

        for token in self.candidates() {
            let Some(state) = self.states.get_mut(&token) else {
                continue;
            };
            // Only outcomes quoted this tick may trigger
            if ctx.quotes.get(&token).is_none() {
                continue;
            }
            let Some(z) = state.zscore(self.params.min_samples) else {
                continue;
            };
            debug!(outcome = %state.outcome, price = %state.current, %z, "Top mover");

            match self.params.check(state, z) {
                Ok(pct) => {
                    let size = self.params.slice_size(pct);
                    state.record_trigger();
                    self.fired += 1;
                    info!(
                        outcome = %state.outcome,
                        baseline = %state.baseline,
                        price = %state.current,
                        %z,
                        trigger = state.trigger_count,
                        %pct,
                        %size,
                        "Signal triggered"
                    );
                    if self.params.single_outcome_focus && self.locked.is_none() {
                        info!(outcome = %state.outcome, "Locked to outcome");
                        self.locked = Some(token.clone());
                    }
                    signals.push(Signal {
                        outcome: state.outcome.clone(),
                        price_cap: state.current,
                        score: z,
                        proposed_size_usd: size,
                        source: SignalSource::Movement,
                    });
                }
                Err(SkipReason::BelowThreshold) => {}
                Err(reason) => {
                    info!(
                        outcome = %state.outcome,
                        price = %state.current,
                        %z,
                        trigger = state.trigger_count,
                        ?reason,
                        "Skipping signal"
                    );
                }
            }
        }

        signals
    }

    fn triggers_fired(&self) -> u64 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{OutcomeSide, Quote};
    use crate::strategy::ranker::tests::market_day;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn params() -> MovementParams {
        MovementParams::from_config(&Config::default())
    }

    fn outcome() -> Outcome {
        Outcome::new("1.7M-1.9M", OutcomeSide::Yes, "y2")
    }

    #[test]
    fn test_zscore_scenario_triggers_first_slice() {
        let z = zscore(dec!(0.22), dec!(0.10), dec!(0.03)).unwrap();
        assert_eq!(z, dec!(4));

        let mut state = TriggerState::new(outcome(), dec!(0.10), 60);
        state.observe(dec!(0.22));
        let params = params();
        assert_eq!(params.check(&state, z), Ok(dec!(50)));
        assert_eq!(params.slice_size(dec!(50)), dec!(25));
    }

    #[test]
    fn test_zero_std_dev_is_undefined() {
        assert_eq!(zscore(dec!(0.30), dec!(0.10), Decimal::ZERO), None);

        // The baseline has rolled out of the window; the price moved but is flat
        let mut state = TriggerState::new(outcome(), dec!(0.10), 5);
        for _ in 0..5 {
            state.observe(dec!(0.30));
        }
        assert_eq!(state.samples(), 5);
        assert_eq!(state.zscore(5), None);
    }

    #[test]
    fn test_min_samples_required() {
        let mut state = TriggerState::new(outcome(), dec!(0.10), 60);
        state.observe(dec!(0.10));
        state.observe(dec!(0.40));
        assert!(state.zscore(5).is_none());
        assert!(state.zscore(3).is_some());
    }

    #[test]
    fn test_check_rejections() {
        let params = params();
        let mut state = TriggerState::new(outcome(), dec!(0.10), 60);

        state.observe(dec!(0.13));
        assert_eq!(params.check(&state, dec!(5)), Err(SkipReason::SmallMove));
        assert_eq!(params.check(&state, dec!(1)), Err(SkipReason::BelowThreshold));

        state.observe(dec!(0.97));
        assert_eq!(params.check(&state, dec!(5)), Err(SkipReason::AboveMaxPrice));

        state.observe(dec!(0.30));
        state.record_trigger();
        state.observe(dec!(0.33));
        assert_eq!(params.check(&state, dec!(5)), Err(SkipReason::SamePlateau));
        state.observe(dec!(0.36));
        assert_eq!(params.check(&state, dec!(5)), Ok(dec!(30)));
    }

    #[test]
    fn test_falling_price_never_qualifies() {
        let params = params();
        let mut state = TriggerState::new(outcome(), dec!(0.10), 60);

        state.observe(dec!(0.02));
        assert_eq!(params.check(&state, dec!(-5)), Err(SkipReason::BelowThreshold));
        assert_eq!(params.check(&state, dec!(5)), Err(SkipReason::SmallMove));

        // A pullback after a trigger is not a new plateau
        state.observe(dec!(0.30));
        state.record_trigger();
        state.observe(dec!(0.20));
        assert_eq!(params.check(&state, dec!(5)), Err(SkipReason::SamePlateau));
    }

    #[test]
    fn test_scale_in_exhausts_after_last_slice() {
        let params = params();
        let mut state = TriggerState::new(outcome(), dec!(0.10), 60);
        let mut slices = Vec::new();

        for price in [dec!(0.20), dec!(0.30), dec!(0.40), dec!(0.50)] {
            state.observe(price);
            match params.check(&state, dec!(10)) {
                Ok(pct) => {
                    slices.push(pct);
                    state.record_trigger();
                }
                Err(reason) => assert_eq!(reason, SkipReason::Exhausted),
            }
        }

        assert_eq!(slices, vec![dec!(50), dec!(30), dec!(20)]);
        assert_eq!(state.trigger_count, 3);
        let total: Decimal = slices.iter().copied().sum();
        assert!(total <= Decimal::ONE_HUNDRED);
    }

    fn flat_quotes(market: &MarketDay, overrides: &[(&str, Decimal)]) -> HashMap<String, Quote> {
        let mut quotes: HashMap<String, Quote> = market
            .yes_outcomes()
            .map(|o| (o.token_id.clone(), Quote::new(dec!(0.10), dec!(100))))
            .collect();
        for (token, price) in overrides {
            quotes.insert(token.to_string(), Quote::new(*price, dec!(100)));
        }
        quotes
    }

    fn tick(strategy: &mut MovementStrategy, market: &MarketDay, quotes: &HashMap<String, Quote>) -> Vec<Signal> {
        let ctx = TickContext {
            market,
            quotes,
            reading: None,
            now: Utc::now(),
        };
        strategy.evaluate(&ctx)
    }

    #[test]
    fn test_detector_scales_in_on_successive_moves() {
        let market = market_day();
        let mut strategy = MovementStrategy::new(params());
        let flat = flat_quotes(&market, &[]);
        strategy.open(&TickContext {
            market: &market,
            quotes: &flat,
            reading: None,
            now: Utc::now(),
        });

        for _ in 0..8 {
            assert!(tick(&mut strategy, &market, &flat).is_empty());
        }

        // 9 flat samples then 0.30: z ≈ 3.16
        let jump = flat_quotes(&market, &[("y2", dec!(0.30))]);
        let signals = tick(&mut strategy, &market, &jump);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].outcome.token_id, "y2");
        assert_eq!(signals[0].proposed_size_usd, dec!(25));
        assert_eq!(signals[0].price_cap, dec!(0.30));
        assert_eq!(strategy.locked_outcome(), Some("y2"));

        // Same plateau does not trigger again
        assert!(tick(&mut strategy, &market, &jump).is_empty());

        // A further move of 0.10 confirms: z ≈ 2.77
        let higher = flat_quotes(&market, &[("y2", dec!(0.40))]);
        let signals = tick(&mut strategy, &market, &higher);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].proposed_size_usd, dec!(15));
        assert_eq!(strategy.triggers_fired(), 2);
    }

    #[test]
    fn test_lock_ignores_other_outcomes() {
        let market = market_day();
        let mut strategy = MovementStrategy::new(params());
        let flat = flat_quotes(&market, &[]);
        strategy.open(&TickContext {
            market: &market,
            quotes: &flat,
            reading: None,
            now: Utc::now(),
        });
        for _ in 0..8 {
            tick(&mut strategy, &market, &flat);
        }
        let first = tick(&mut strategy, &market, &flat_quotes(&market, &[("y2", dec!(0.30))]));
        assert_eq!(first.len(), 1);

        // y3 surges harder than y2 ever did, but the session is locked to y2
        let other = flat_quotes(&market, &[("y2", dec!(0.30)), ("y3", dec!(0.50))]);
        assert!(tick(&mut strategy, &market, &other).is_empty());
        assert_eq!(strategy.state("y3").map(|s| s.trigger_count), Some(0));
    }

    #[test]
    fn test_drop_does_not_trigger_or_lock() {
        let market = market_day();
        let mut strategy = MovementStrategy::new(params());
        let flat = flat_quotes(&market, &[]);
        strategy.open(&TickContext {
            market: &market,
            quotes: &flat,
            reading: None,
            now: Utc::now(),
        });
        for _ in 0..8 {
            tick(&mut strategy, &market, &flat);
        }

        // y3 collapses: z ≈ -3.16
        let drop = flat_quotes(&market, &[("y3", dec!(0.02))]);
        assert!(tick(&mut strategy, &market, &drop).is_empty());
        assert_eq!(strategy.locked_outcome(), None);
        assert!(strategy.state("y3").and_then(|s| s.zscore(5)).unwrap() < Decimal::ZERO);

        // The real surge on y2 still triggers: z ≈ 3.32
        let surge = flat_quotes(&market, &[("y3", dec!(0.02)), ("y2", dec!(0.60))]);
        let signals = tick(&mut strategy, &market, &surge);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].outcome.token_id, "y2");
        assert_eq!(signals[0].proposed_size_usd, dec!(25));
        assert!(signals[0].score > Decimal::ZERO);
        assert_eq!(strategy.locked_outcome(), Some("y2"));
        assert_eq!(strategy.state("y3").map(|s| s.trigger_count), Some(0));
    }

    #[test]
    fn test_open_rearms_state() {
        let market = market_day();
        let mut strategy = MovementStrategy::new(params());
        let flat = flat_quotes(&market, &[]);
        let ctx = TickContext {
            market: &market,
            quotes: &flat,
            reading: None,
            now: Utc::now(),
        };
        strategy.open(&ctx);
        for _ in 0..8 {
            tick(&mut strategy, &market, &flat);
        }
        tick(&mut strategy, &market, &flat_quotes(&market, &[("y2", dec!(0.30))]));
        assert_eq!(strategy.triggers_fired(), 1);

        strategy.open(&ctx);
        assert_eq!(strategy.triggers_fired(), 0);
        assert_eq!(strategy.locked_outcome(), None);
        let state = strategy.state("y2").unwrap();
        assert_eq!(state.trigger_count, 0);
        assert_eq!(state.samples(), 1);
    }
}
