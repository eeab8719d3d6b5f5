//! Gamma API market discovery.
//!
//! The passenger-count market for a date lives under the event slug
//! `number-of-tsa-passengers-<month>-<day>`. Each event holds one binary
//! sub-market per bracket; sub-market titles are parsed back into bounds and
//! matched against the configured bracket set.

use crate::error::{Result, TraderError};
use crate::exchange::traits::MarketDiscovery;
use crate::exchange::types::*;
use crate::strategy::BracketSet;
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Weekday};
use regex::Regex;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SLUG_PREFIX: &str = "number-of-tsa-passengers";

/// Market dates to trade on a given local day.
///
/// The figure published each morning is for the previous day. Monday's
/// publication covers Friday, Saturday, and Sunday, returned oldest first.
pub fn target_dates(today: NaiveDate) -> Vec<NaiveDate> {
    let days_back: &[i64] = match today.weekday() {
        Weekday::Mon => &[3, 2, 1],
        _ => &[1],
    };
    days_back
        .iter()
        .map(|d| today - ChronoDuration::days(*d))
        .collect()
}

/// Event slug for a market date, e.g. `number-of-tsa-passengers-february-11`.
pub fn slug_for(date: NaiveDate) -> String {
    format!(
        "{}-{}-{}",
        SLUG_PREFIX,
        date.format("%B").to_string().to_lowercase(),
        date.day()
    )
}

/// True if the title names this date as "<Month> <day>" (not a longer day).
pub fn title_mentions_date(title: &str, date: NaiveDate) -> bool {
    let title = title.to_lowercase();
    let needle = format!("{} {}", date.format("%B").to_string().to_lowercase(), date.day());

    title.match_indices(&needle).any(|(idx, _)| {
        !title[idx + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// Parses sub-market titles such as `< 1.5M`, `1.5M - 1.7M`, `2.3M+`,
/// `> 2.3M`, `1,500K to 1,700K` into `[lower, upper)` bounds.
pub struct BracketTitleParser {
    below: Regex,
    above: Regex,
    plus: Regex,
    range: Regex,
}

impl BracketTitleParser {
    pub fn new() -> Result<Self> {
        let num = r"(\d+(?:\.\d+)?)\s*([mk]?)";
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|e| TraderError::Config(format!("bracket title pattern: {}", e)))
        };

        Ok(Self {
            below: compile(format!(r"^(?:<|less than|under|below|fewer than)\s*{}", num))?,
            above: compile(format!(r"^(?:>|more than|over|above|greater than)\s*{}", num))?,
            plus: compile(format!(r"^{}\s*(?:\+|or more|or above)", num))?,
            range: compile(format!(r"^{}\s*(?:-|–|to)\s*{}$", num, num))?,
        })
    }

    /// `(lower, upper)` for a title, `None` if it is not a bracket title.
    pub fn parse(&self, title: &str) -> Option<(u64, Option<u64>)> {
        let text = title.trim().to_lowercase().replace(',', "");
        let text = text.trim_end_matches('?').trim();

        if let Some(caps) = self.below.captures(text) {
            return Some((0, Some(scaled(&caps[1], &caps[2])?)));
        }
        if let Some(caps) = self.above.captures(text).or_else(|| self.plus.captures(text)) {
            return Some((scaled(&caps[1], &caps[2])?, None));
        }
        if let Some(caps) = self.range.captures(text) {
            // "1.5 - 1.7M" shares the trailing unit
            let lower_unit = if caps[2].is_empty() { &caps[4] } else { &caps[2] };
            let lower = scaled(&caps[1], lower_unit)?;
            let upper = scaled(&caps[3], &caps[4])?;
            return (upper > lower).then_some((lower, Some(upper)));
        }
        None
    }
}

fn scaled(number: &str, unit: &str) -> Option<u64> {
    let value: Decimal = number.parse().ok()?;
    let multiplier = match unit {
        "m" => Decimal::from(1_000_000),
        "k" => Decimal::from(1_000),
        _ => Decimal::ONE,
    };
    value.checked_mul(multiplier)?.round().to_u64()
}

/// Resolves market dates to tradable outcomes through the Gamma events API.
pub struct GammaDiscovery {
    http: Client,
    base_url: String,
    brackets: BracketSet,
    titles: BracketTitleParser,
    /// Fixed slug that bypasses date-based discovery
    slug_override: Option<String>,
}

impl GammaDiscovery {
    pub fn new(
        base_url: &str,
        brackets: BracketSet,
        slug_override: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            brackets,
            titles: BracketTitleParser::new()?,
            slug_override: slug_override.filter(|s| !s.is_empty()),
        })
    }

    /// Fetch events for a slug.
    #[instrument(skip(self))]
    pub async fn get_events(&self, slug: &str) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("slug", slug)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| TraderError::Parse(format!("gamma events for {}: {}", slug, e)))
    }

    /// Map an event's sub-markets onto the configured brackets.
    fn build_market_day(&self, date: NaiveDate, event: GammaEvent) -> Result<MarketDay> {
        let mut markets = Vec::new();

        for market in event.markets.into_iter().filter(|m| !m.closed) {
            let title = if market.group_item_title.is_empty() {
                market.question.as_str()
            } else {
                market.group_item_title.as_str()
            };

            let Some((lower, upper)) = self.titles.parse(title) else {
                debug!(%title, "Skipping sub-market with unrecognised title");
                continue;
            };
            let Some(bracket) = self.brackets.find_by_bounds(lower, upper) else {
                warn!(%title, lower, ?upper, "Sub-market has no matching configured bracket");
                continue;
            };

            let (yes_token, no_token) = token_pair(&market)?;
            markets.push(BracketMarket {
                bracket: bracket.clone(),
                question: market.question.clone(),
                yes: Outcome::new(bracket.label.clone(), OutcomeSide::Yes, yes_token),
                no: Outcome::new(bracket.label.clone(), OutcomeSide::No, no_token),
            });
        }

        if markets.is_empty() {
            return Err(TraderError::Parse(format!(
                "event '{}' has no sub-markets matching the configured brackets",
                event.slug
            )));
        }

        markets.sort_by_key(|m| self.brackets.index_of(&m.bracket.label));
        if markets.len() < self.brackets.len() {
            let missing: Vec<&str> = self
                .brackets
                .iter()
                .filter(|b| !markets.iter().any(|m| m.bracket.label == b.label))
                .map(|b| b.label.as_str())
                .collect();
            warn!(?missing, "Event does not list every configured bracket");
        }

        Ok(MarketDay {
            date,
            slug: event.slug,
            title: event.title,
            markets,
        })
    }
}

/// YES/NO token ids from the JSON-encoded `clobTokenIds` and `outcomes`.
fn token_pair(market: &GammaMarket) -> Result<(String, String)> {
    let tokens: Vec<String> = serde_json::from_str(&market.clob_token_ids).map_err(|e| {
        TraderError::Parse(format!("clobTokenIds for '{}': {}", market.question, e))
    })?;
    let [first, second]: [String; 2] = tokens.try_into().map_err(|t: Vec<String>| {
        TraderError::Parse(format!(
            "'{}' has {} tokens, expected 2",
            market.question,
            t.len()
        ))
    })?;

    let labels: Vec<String> = serde_json::from_str(&market.outcomes).unwrap_or_default();
    let yes_first = labels
        .first()
        .map_or(true, |label| label.eq_ignore_ascii_case("yes"));

    Ok(if yes_first { (first, second) } else { (second, first) })
}

#[async_trait]
impl MarketDiscovery for GammaDiscovery {
    async fn resolve_outcomes(&self, date: NaiveDate) -> Result<MarketDay> {
        let slug = self
            .slug_override
            .clone()
            .unwrap_or_else(|| slug_for(date));

        let event = self
            .get_events(&slug)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TraderError::fetch("gamma", format!("no event for slug '{}'", slug)))?;

        // A stale or resolved event under a reused slug must not be traded
        if self.slug_override.is_none() && !title_mentions_date(&event.title, date) {
            return Err(TraderError::Parse(format!(
                "event title '{}' does not match {}",
                event.title, date
            )));
        }

        let day = self.build_market_day(date, event)?;
        info!(
            %date,
            slug = %day.slug,
            brackets = day.markets.len(),
            "Resolved market outcomes"
        );
        Ok(day)
    }
}
