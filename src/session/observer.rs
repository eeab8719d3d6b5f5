//! Session observability sink.

use crate::session::controller::SessionPhase;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Why a session closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    WindowEnd,
    BudgetExhausted,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::WindowEnd => "window end",
            CloseReason::BudgetExhausted => "budget exhausted",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Counts and amounts for one session. Carries no credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub market_date: Option<NaiveDate>,
    pub strategy: &'static str,
    pub ticks: u64,
    pub readings_processed: u64,
    pub triggers_fired: u64,
    pub orders_placed: u64,
    pub orders_rejected: u64,
    pub budget_total: Decimal,
    /// Confirmed fills
    pub budget_spent: Decimal,
    /// Reserved by attempted orders
    pub budget_attempted: Decimal,
    pub close_reason: Option<CloseReason>,
}

/// Receives phase transitions and the closing summary.
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver: Send + Sync {
    fn on_transition(&self, from: SessionPhase, to: SessionPhase, summary: &SessionSummary);

    fn on_close(&self, summary: &SessionSummary);
}

/// Writes transitions and summaries to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_transition(&self, from: SessionPhase, to: SessionPhase, summary: &SessionSummary) {
        info!(
            ?from,
            ?to,
            market_date = ?summary.market_date,
            strategy = summary.strategy,
            budget = %summary.budget_total,
            "Session phase changed"
        );
    }

    fn on_close(&self, summary: &SessionSummary) {
        info!(
            market_date = ?summary.market_date,
            strategy = summary.strategy,
            reason = ?summary.close_reason,
            ticks = summary.ticks,
            readings = summary.readings_processed,
            triggers = summary.triggers_fired,
            placed = summary.orders_placed,
            rejected = summary.orders_rejected,
            spent = %summary.budget_spent,
            attempted = %summary.budget_attempted,
            total = %summary.budget_total,
            "Session closed"
        );
        if let Ok(json) = serde_json::to_string(summary) {
            info!(summary = %json, "Session summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_summary_serializes_without_secrets() {
        let summary = SessionSummary {
            market_date: NaiveDate::from_ymd_opt(2026, 2, 11),
            strategy: "movement",
            triggers_fired: 2,
            orders_placed: 2,
            budget_total: dec!(50),
            budget_spent: dec!(40),
            budget_attempted: dec!(40),
            close_reason: Some(CloseReason::BudgetExhausted),
            ..Default::default()
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["market_date"], "2026-02-11");
        assert_eq!(json["close_reason"], "budget_exhausted");
        assert_eq!(json["budget_spent"], "40");
        assert!(json.get("api_key").is_none());
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::WindowEnd.to_string(), "window end");
        assert_eq!(CloseReason::Shutdown.to_string(), "shutdown");
    }
}
