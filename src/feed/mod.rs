//! Passenger-volume data source.
//!
//! The source publishes one figure per day. Polling is cheap: an unchanged
//! page is reported as `ReadingPoll::Unchanged` without parsing.

mod scraper;

pub use scraper::{parse_table, PassengerFeed};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// One published daily passenger count. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// Day the count refers to
    pub date: NaiveDate,
    pub passenger_count: u64,
    pub year_ago_count: Option<u64>,
    /// When the source page carrying this reading was fetched
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(date: NaiveDate, passenger_count: u64) -> Self {
        Self {
            date,
            passenger_count,
            year_ago_count: None,
            observed_at: Utc::now(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} passengers", self.date, self.passenger_count)
    }
}

/// Result of one poll of the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingPoll {
    /// Source reports no change since the last poll
    Unchanged,
    /// Newest reading on a changed page
    Latest(Reading),
}

/// Provider of the latest published reading.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn get_latest_reading(&self) -> Result<ReadingPoll>;
}
