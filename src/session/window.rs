//! Daily trading window in the market's local time.

use crate::config::SessionConfig;
use crate::error::{Result, TraderError};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};

/// Window hours at a fixed UTC offset, optionally weekdays only.
#[derive(Debug, Clone, Copy)]
pub struct SessionWindow {
    start_hour: u32,
    end_hour: u32,
    offset: FixedOffset,
    weekdays_only: bool,
}

impl SessionWindow {
    pub fn new(start_hour: u32, end_hour: u32, utc_offset_hours: i32, weekdays_only: bool) -> Result<Self> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(TraderError::Config(format!(
                "invalid window {}:00-{}:00",
                start_hour, end_hour
            )));
        }
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            TraderError::Config(format!("invalid UTC offset {}h", utc_offset_hours))
        })?;
        Ok(Self {
            start_hour,
            end_hour,
            offset,
            weekdays_only,
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::new(
            config.window_start_hour,
            config.window_end_hour,
            config.utc_offset_hours,
            config.weekdays_only,
        )
    }

    /// Calendar date at `now` in the window's local time.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !self.weekdays_only || !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn opens_at(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.at_hour(date, self.start_hour)
    }

    pub fn closes_at(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.at_hour(date, self.end_hour)
    }

    /// `now` falls inside today's window on a trading day.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let date = self.local_date(now);
        if !self.is_trading_day(date) {
            return false;
        }
        match (self.opens_at(date), self.closes_at(date)) {
            (Some(open), Some(close)) => now >= open && now < close,
            _ => false,
        }
    }

    fn at_hour(&self, date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
        let naive = if hour == 24 {
            date.succ_opt()?.and_hms_opt(0, 0, 0)?
        } else {
            date.and_hms_opt(hour, 0, 0)?
        };
        naive
            .and_local_timezone(self.offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> SessionWindow {
        SessionWindow::from_config(&SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_local_date_uses_offset() {
        // 03:00 UTC on the 12th is still the 11th at UTC-5
        let now = Utc.with_ymd_and_hms(2026, 2, 12, 3, 0, 0).unwrap();
        assert_eq!(window().local_date(now), NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
    }

    #[test]
    fn test_open_and_close_instants() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 12).unwrap();
        let w = window();
        assert_eq!(w.opens_at(date), Some(Utc.with_ymd_and_hms(2026, 2, 12, 12, 0, 0).unwrap()));
        assert_eq!(w.closes_at(date), Some(Utc.with_ymd_and_hms(2026, 2, 12, 15, 0, 0).unwrap()));
    }

    #[test]
    fn test_contains_is_half_open() {
        let w = window();
        assert!(!w.contains(Utc.with_ymd_and_hms(2026, 2, 12, 11, 59, 59).unwrap()));
        assert!(w.contains(Utc.with_ymd_and_hms(2026, 2, 12, 12, 0, 0).unwrap()));
        assert!(w.contains(Utc.with_ymd_and_hms(2026, 2, 12, 14, 59, 59).unwrap()));
        assert!(!w.contains(Utc.with_ymd_and_hms(2026, 2, 12, 15, 0, 0).unwrap()));
    }

    #[test]
    fn test_weekends_skipped_when_weekdays_only() {
        let saturday = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        assert!(!window().is_trading_day(saturday));
        assert!(!window().contains(Utc.with_ymd_and_hms(2026, 2, 14, 13, 0, 0).unwrap()));

        let every_day = SessionWindow::new(7, 10, -5, false).unwrap();
        assert!(every_day.is_trading_day(saturday));
    }

    #[test]
    fn test_window_ending_at_midnight() {
        let w = SessionWindow::new(20, 24, 0, false).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 12).unwrap();
        assert_eq!(w.closes_at(date), Some(Utc.with_ymd_and_hms(2026, 2, 13, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert!(matches!(SessionWindow::new(10, 7, -5, true), Err(TraderError::Config(_))));
        assert!(SessionWindow::new(7, 10, 30, true).is_err());
    }
}
