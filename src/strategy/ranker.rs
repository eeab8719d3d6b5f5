//! Data-event strategy: once the day's count is known, every bracket's
//! resolution is known too. Buy YES on the correct bracket and NO on the
//! others while the book still prices them below certainty.

use crate::config::TradingConfig;
use crate::exchange::{MarketDay, Outcome, OutcomeSide, Quote};
use crate::strategy::bracket::{Bracket, BracketSet};
use crate::strategy::signal::{Signal, SignalSource, Strategy, TickContext};
use crate::utils::decimal::floor_cents;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, error, info};

/// Expected edge of buying an outcome at `ask` given the correct bracket.
pub trait EdgeModel: Send + Sync {
    fn edge(&self, outcome: &Outcome, ask: Decimal, correct: &Bracket) -> Decimal;
}

/// Every outcome the ranker considers resolves to 1.0 once the count is
/// known (YES on the correct bracket, NO on the rest), so edge is `1 - ask`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionEdge;

impl EdgeModel for ResolutionEdge {
    fn edge(&self, _outcome: &Outcome, ask: Decimal, _correct: &Bracket) -> Decimal {
        Decimal::ONE - ask
    }
}

/// Turns a new reading's correct bracket plus a book snapshot into signals
/// ordered best first.
pub struct SignalRanker {
    model: Box<dyn EdgeModel>,
    brackets: BracketSet,
    max_buy_price: Decimal,
    min_edge: Decimal,
    max_order_usd: Decimal,
}

impl SignalRanker {
    pub fn new(brackets: BracketSet, trading: &TradingConfig) -> Self {
        Self::with_model(brackets, trading, Box::new(ResolutionEdge))
    }

    pub fn with_model(
        brackets: BracketSet,
        trading: &TradingConfig,
        model: Box<dyn EdgeModel>,
    ) -> Self {
        Self {
            model,
            brackets,
            max_buy_price: trading.max_buy_price,
            min_edge: trading.min_edge,
            max_order_usd: trading.max_order_usd,
        }
    }

    /// Rank candidates: edge descending, then closer brackets, then YES
    /// before NO, then label.
    pub fn rank(
        &self,
        correct: &Bracket,
        market: &MarketDay,
        quotes: &HashMap<String, Quote>,
    ) -> Vec<Signal> {
        let mut candidates: Vec<(usize, Signal)> = Vec::new();

        for bracket_market in &market.markets {
            let side = if bracket_market.bracket.label == correct.label {
                OutcomeSide::Yes
            } else {
                OutcomeSide::No
            };
            let outcome = bracket_market.outcome(side);

            let Some(quote) = quotes.get(&outcome.token_id) else {
                debug!(%outcome, "No quote this tick, skipping");
                continue;
            };

            let edge = self.model.edge(outcome, quote.price, correct);
            if quote.price > self.max_buy_price {
                info!(%outcome, price = %quote.price, %edge, max = %self.max_buy_price, "Skipping signal: price above max");
                continue;
            }
            if edge < self.min_edge {
                info!(%outcome, price = %quote.price, %edge, min = %self.min_edge, "Skipping signal: insufficient edge");
                continue;
            }

            let proposed = floor_cents(self.max_order_usd.min(quote.notional()));
            let distance = self
                .brackets
                .distance(&bracket_market.bracket.label, &correct.label)
                .unwrap_or(usize::MAX);

            candidates.push((
                distance,
                Signal {
                    outcome: outcome.clone(),
                    price_cap: quote.price,
                    score: edge,
                    proposed_size_usd: proposed,
                    source: SignalSource::DataEvent,
                },
            ));
        }

        candidates.sort_by(|(da, a), (db, b)| {
            b.score
                .cmp(&a.score)
                .then(da.cmp(db))
                .then(side_rank(a.side()).cmp(&side_rank(b.side())))
                .then(a.outcome.label.cmp(&b.outcome.label))
        });

        candidates.into_iter().map(|(_, signal)| signal).collect()
    }
}

fn side_rank(side: OutcomeSide) -> u8 {
    match side {
        OutcomeSide::Yes => 0,
        OutcomeSide::No => 1,
    }
}

/// Data-event strategy: match each new reading, then rank.
pub struct DataEventStrategy {
    brackets: BracketSet,
    ranker: SignalRanker,
    fired: u64,
}

impl DataEventStrategy {
    pub fn new(brackets: BracketSet, ranker: SignalRanker) -> Self {
        Self {
            brackets,
            ranker,
            fired: 0,
        }
    }
}

impl Strategy for DataEventStrategy {
    fn name(&self) -> &'static str {
        SignalSource::DataEvent.as_str()
    }

    fn watched_tokens(&self, market: &MarketDay) -> Vec<String> {
        market.outcomes().map(|o| o.token_id.clone()).collect()
    }

    fn uses_readings(&self) -> bool {
        true
    }

    fn open(&mut self, _ctx: &TickContext<'_>) {
        self.fired = 0;
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Vec<Signal> {
        let Some(reading) = ctx.reading else {
            return Vec::new();
        };

        let correct = match self.brackets.match_count(reading.passenger_count) {
            Ok(bracket) => bracket.clone(),
            Err(e) => {
                error!(error = %e, %reading, "Reading skipped: bracket match failed");
                return Vec::new();
            }
        };

        info!(%reading, bracket = %correct, "Reading matched bracket");
        let signals = self.ranker.rank(&correct, ctx.market, ctx.quotes);
        for (rank, signal) in signals.iter().enumerate() {
            info!(
                rank = rank + 1,
                outcome = %signal.outcome,
                price = %signal.price_cap,
                edge = %signal.score,
                size = %signal.proposed_size_usd,
                "Signal triggered"
            );
        }
        self.fired += signals.len() as u64;
        signals
    }

    fn triggers_fired(&self) -> u64 {
        self.fired
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::default_brackets;
    use crate::exchange::BracketMarket;
    use crate::feed::Reading;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    pub(crate) fn market_day() -> MarketDay {
        let set = BracketSet::from_specs(&default_brackets()).unwrap();
        let markets = set
            .iter()
            .enumerate()
            .map(|(i, b)| BracketMarket {
                bracket: b.clone(),
                question: format!("TSA passengers {}?", b.label),
                yes: Outcome::new(b.label.clone(), OutcomeSide::Yes, format!("y{}", i)),
                no: Outcome::new(b.label.clone(), OutcomeSide::No, format!("n{}", i)),
            })
            .collect();
        MarketDay {
            date: NaiveDate::from_ymd_opt(2026, 2, 11).unwrap(),
            slug: "number-of-tsa-passengers-february-11".into(),
            title: "Number of TSA Passengers February 11?".into(),
            markets,
        }
    }

    fn quotes(entries: &[(&str, Decimal, Decimal)]) -> HashMap<String, Quote> {
        entries
            .iter()
            .map(|(token, price, size)| (token.to_string(), Quote::new(*price, *size)))
            .collect()
    }

    fn ranker() -> SignalRanker {
        let set = BracketSet::from_specs(&default_brackets()).unwrap();
        SignalRanker::new(set, &TradingConfig::default())
    }

    #[test]
    fn test_yes_on_correct_and_no_on_others() {
        let market = market_day();
        let correct = market.markets[2].bracket.clone(); // 1.7M-1.9M
        let quotes = quotes(&[
            ("y2", dec!(0.40), dec!(100)),
            ("n1", dec!(0.70), dec!(100)),
            ("n3", dec!(0.90), dec!(100)),
            ("y1", dec!(0.10), dec!(100)), // wrong side, never considered
        ]);

        let signals = ranker().rank(&correct, &market, &quotes);
        let ids: Vec<&str> = signals.iter().map(|s| s.outcome.token_id.as_str()).collect();
        assert_eq!(ids, vec!["y2", "n1", "n3"]);
        assert_eq!(signals[0].score, dec!(0.60));
        assert_eq!(signals[0].side(), OutcomeSide::Yes);
    }

    #[test]
    fn test_filters_price_and_edge() {
        let market = market_day();
        let correct = market.markets[2].bracket.clone();
        let quotes = quotes(&[
            ("y2", dec!(0.97), dec!(100)), // above max buy price
            ("n0", dec!(0.96), dec!(100)), // above max buy price
            ("n4", dec!(0.95), dec!(100)), // edge 0.05 passes exactly
        ]);

        let signals = ranker().rank(&correct, &market, &quotes);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].outcome.token_id, "n4");
    }

    #[test]
    fn test_ties_prefer_closer_brackets_then_yes() {
        let market = market_day();
        let correct = market.markets[2].bracket.clone();
        let quotes = quotes(&[
            ("n5", dec!(0.80), dec!(100)),
            ("n0", dec!(0.80), dec!(100)),
            ("n3", dec!(0.80), dec!(100)),
            ("y2", dec!(0.80), dec!(100)),
            ("n1", dec!(0.80), dec!(100)),
        ]);

        let signals = ranker().rank(&correct, &market, &quotes);
        let ids: Vec<&str> = signals.iter().map(|s| s.outcome.token_id.as_str()).collect();
        // distance 0 (YES), distance 1 by label, distance 2, distance 3
        assert_eq!(ids, vec!["y2", "n1", "n3", "n0", "n5"]);
    }

    #[test]
    fn test_proposed_size_capped_by_depth_and_max_order() {
        let market = market_day();
        let correct = market.markets[2].bracket.clone();
        let quotes = quotes(&[("y2", dec!(0.333), dec!(10)), ("n1", dec!(0.5), dec!(1000))]);

        let signals = ranker().rank(&correct, &market, &quotes);
        let by_token: HashMap<_, _> = signals
            .iter()
            .map(|s| (s.outcome.token_id.as_str(), s.proposed_size_usd))
            .collect();
        assert_eq!(by_token["y2"], dec!(3.33));
        assert_eq!(by_token["n1"], dec!(50));
    }

    struct FlatEdge;
    impl EdgeModel for FlatEdge {
        fn edge(&self, outcome: &Outcome, _ask: Decimal, _correct: &Bracket) -> Decimal {
            match outcome.side {
                OutcomeSide::Yes => dec!(0.5),
                OutcomeSide::No => dec!(0.9),
            }
        }
    }

    #[test]
    fn test_edge_model_is_pluggable() {
        let set = BracketSet::from_specs(&default_brackets()).unwrap();
        let ranker = SignalRanker::with_model(set, &TradingConfig::default(), Box::new(FlatEdge));
        let market = market_day();
        let correct = market.markets[2].bracket.clone();
        let quotes = quotes(&[("y2", dec!(0.2), dec!(100)), ("n3", dec!(0.2), dec!(100))]);

        let signals = ranker.rank(&correct, &market, &quotes);
        assert_eq!(signals[0].outcome.token_id, "n3");
    }

    #[test]
    fn test_strategy_matches_reading() {
        let set = BracketSet::from_specs(&default_brackets()).unwrap();
        let mut strategy = DataEventStrategy::new(set.clone(), ranker());
        let market = market_day();
        let quotes = quotes(&[("y2", dec!(0.40), dec!(100))]);
        let reading = Reading::new(market.date, 1_850_000);

        let idle = TickContext {
            market: &market,
            quotes: &quotes,
            reading: None,
            now: Utc::now(),
        };
        assert!(strategy.evaluate(&idle).is_empty());

        let ctx = TickContext {
            reading: Some(&reading),
            ..idle
        };
        let signals = strategy.evaluate(&ctx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].outcome.label, "1.7M-1.9M");
        assert_eq!(strategy.triggers_fired(), 1);
    }
}
