//! Signal generation and budget-constrained execution.
//!
//! Contains the core logic for:
//! - Matching a passenger count to its bracket
//! - Ranking data-event signals by edge
//! - Detecting statistically significant price moves with scale-in
//! - Allocating the session budget across ordered signals
//! - Submitting the resulting orders

mod allocator;
mod bracket;
mod executor;
mod movement;
mod ranker;
mod signal;

pub use allocator::{BudgetPool, ExecutionPlanner};
pub use bracket::{Bracket, BracketSet};
pub use executor::{ExecutionReport, OrderExecutor};
pub use movement::{zscore, MovementParams, MovementStrategy, SkipReason, TriggerState};
pub use ranker::{DataEventStrategy, EdgeModel, ResolutionEdge, SignalRanker};
pub use signal::{Signal, SignalSource, Strategy, TickContext};

#[cfg(test)]
pub(crate) use ranker::tests::market_day;
