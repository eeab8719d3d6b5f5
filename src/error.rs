//! Error taxonomy for the trading engine.
//!
//! Configuration and bracket-partition errors are fatal at startup. Fetch,
//! parse, and execution errors are contained by the control loop and only
//! affect the current tick or reading. `BudgetExceeded` indicates a defect in
//! the allocator and is logged at error level wherever it surfaces.

use rust_decimal::Decimal;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TraderError>;

#[derive(Debug, Error)]
pub enum TraderError {
    /// Malformed configuration (bracket partition, scale-in list, bounds).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transient I/O failure against a collaborator.
    #[error("Fetch failed ({source_name}): {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    /// A collaborator returned content that could not be interpreted.
    #[error("Parse failed: {0}")]
    Parse(String),

    /// A count matched zero or several brackets.
    #[error("Count {count} matched {matches} brackets (expected exactly one)")]
    BracketMatch { count: u64, matches: usize },

    /// An allocation larger than the remaining budget was attempted.
    #[error("Budget exceeded: requested {requested}, remaining {remaining}")]
    BudgetExceeded {
        requested: Decimal,
        remaining: Decimal,
    },

    /// The venue rejected or failed an order.
    #[error("Order for {token_id} failed: {reason}")]
    Execution {
        token_id: String,
        reason: String,
        /// True when the venue confirmed that nothing was filled.
        no_fill_confirmed: bool,
    },
}

impl TraderError {
    pub fn fetch(source_name: impl Into<String>, message: impl ToString) -> Self {
        TraderError::Fetch {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Errors that should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, TraderError::Fetch { .. })
    }

    /// Errors that must halt startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TraderError::Config(_))
    }
}

impl From<reqwest::Error> for TraderError {
    fn from(err: reqwest::Error) -> Self {
        let source_name = err
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        TraderError::Fetch {
            source_name,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TraderError {
    fn from(err: serde_json::Error) -> Self {
        TraderError::Parse(err.to_string())
    }
}
