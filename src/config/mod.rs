//! Configuration management for the bracket trader.
//!
//! Loads settings from an optional config file, `.env`, and environment
//! variables (prefix `BT`, nested with `__`, e.g. `BT_TRADING__BUDGET_USD`).

use crate::error::TraderError;
use crate::strategy::BracketSet;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Venue endpoints and credentials
    #[serde(default)]
    pub polymarket: PolymarketConfig,
    /// Passenger-volume data source
    #[serde(default)]
    pub feed: FeedConfig,
    /// Budget and price limits
    #[serde(default)]
    pub trading: TradingConfig,
    /// Z-score movement detection
    #[serde(default)]
    pub movement: MovementConfig,
    /// Window timing and polling
    #[serde(default)]
    pub session: SessionConfig,
    /// Bracket partition of the passenger-count domain
    #[serde(default = "default_brackets")]
    pub brackets: Vec<BracketSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketConfig {
    /// CLOB REST endpoint
    #[serde(default = "default_clob_url")]
    pub api_url: String,
    /// Gamma (market metadata) endpoint
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    /// Market WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// L2 API key
    #[serde(default)]
    pub api_key: String,
    /// L2 API secret (base64url)
    #[serde(default)]
    pub api_secret: String,
    /// L2 API passphrase
    #[serde(default)]
    pub api_passphrase: String,
    /// Address that funds orders
    #[serde(default)]
    pub funder_address: String,
    /// Explicit market slug; empty means auto-discover
    #[serde(default)]
    pub target_market_slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Passenger-volume page URL
    #[serde(default = "default_feed_url")]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Total spend allowed per session in USD
    #[serde(default = "default_budget")]
    pub budget_usd: Decimal,
    /// Largest size a single data-event signal may propose
    #[serde(default = "default_max_order")]
    pub max_order_usd: Decimal,
    /// Never buy above this price (0-1)
    #[serde(default = "default_max_buy_price")]
    pub max_buy_price: Decimal,
    /// Minimum edge for a data-event signal (0-1)
    #[serde(default = "default_min_edge")]
    pub min_edge: Decimal,
    /// Orders smaller than this are negligible and skipped
    #[serde(default = "default_min_order")]
    pub min_order_usd: Decimal,
    /// Compute and log orders without sending them to the venue
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Upward z required to trigger
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: Decimal,
    /// Scale-in percentages of the per-outcome allocation, consumed in order
    #[serde(
        default = "default_scale_in_pcts",
        deserialize_with = "deserialize_pct_list"
    )]
    pub scale_in_pcts: Vec<Decimal>,
    /// Minimum absolute move from baseline (and from the last trigger)
    #[serde(default = "default_min_price_change")]
    pub min_price_change: Decimal,
    /// Number of recent prices kept for rolling statistics
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    /// Observations required before z is defined
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Original allocation per outcome; defaults to the session budget
    #[serde(default)]
    pub per_outcome_budget_usd: Option<Decimal>,
    /// Only the top mover may trigger, and the session locks to the first trigger
    #[serde(default = "default_single_outcome_focus")]
    pub single_outcome_focus: bool,
}

/// Which strategy drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DataEvent,
    Movement,
}

/// Where order-book quotes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Rest,
    Stream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Window open hour in the configured local offset
    #[serde(default = "default_window_start_hour")]
    pub window_start_hour: u32,
    /// Window close hour in the configured local offset
    #[serde(default = "default_window_end_hour")]
    pub window_end_hour: u32,
    /// Fixed UTC offset of the market's local time (hours)
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
    /// Tick interval while the window is open
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Tick interval outside the window
    #[serde(default = "default_idle_poll_interval_secs")]
    pub idle_poll_interval_secs: u64,
    /// Deadline for a single outcome fetch within a tick
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Attempts per fetch inside its deadline
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u8,
    #[serde(default = "default_quote_source")]
    pub quote_source: QuoteSource,
    /// Streamed quotes older than this are treated as missing
    #[serde(default = "default_quote_staleness_ms")]
    pub quote_staleness_ms: u64,
}

/// One bracket of the partition: `[lower, upper)`, `upper = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketSpec {
    pub label: String,
    pub lower: u64,
    #[serde(default)]
    pub upper: Option<u64>,
}

impl BracketSpec {
    pub fn new(label: &str, lower: u64, upper: Option<u64>) -> Self {
        Self {
            label: label.to_string(),
            lower,
            upper,
        }
    }
}

/// Accepts either a list (`[50, 30, 20]`) or a comma-separated string
/// (`"50,30,20"`, as set through the environment).
fn deserialize_pct_list<'de, D>(deserializer: D) -> std::result::Result<Vec<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PctList {
        List(Vec<Decimal>),
        Csv(String),
    }

    match PctList::deserialize(deserializer)? {
        PctList::List(list) => Ok(list),
        PctList::Csv(s) => parse_pct_list(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse `"50, 30, 20"` into percentages.
pub fn parse_pct_list(s: &str) -> std::result::Result<Vec<Decimal>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Decimal>()
                .map_err(|e| format!("invalid scale-in percentage '{}': {}", part, e))
        })
        .collect()
}

// Default value functions
fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_feed_url() -> String {
    "https://www.tsa.gov/travel/passenger-volumes".to_string()
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_budget() -> Decimal {
    Decimal::new(50, 0) // $50 per session
}

fn default_max_order() -> Decimal {
    Decimal::new(50, 0)
}

fn default_max_buy_price() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

fn default_min_edge() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_min_order() -> Decimal {
    Decimal::ONE // $1 venue minimum
}

fn default_dry_run() -> bool {
    true
}

fn default_zscore_threshold() -> Decimal {
    Decimal::new(25, 1) // 2.5
}

fn default_scale_in_pcts() -> Vec<Decimal> {
    vec![Decimal::new(50, 0), Decimal::new(30, 0), Decimal::new(20, 0)]
}

fn default_min_price_change() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_rolling_window() -> usize {
    60
}

fn default_min_samples() -> usize {
    5
}

fn default_single_outcome_focus() -> bool {
    true
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Movement
}

fn default_window_start_hour() -> u32 {
    7
}

fn default_window_end_hour() -> u32 {
    10
}

fn default_utc_offset_hours() -> i32 {
    -5 // US Eastern (standard time)
}

fn default_weekdays_only() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_idle_poll_interval_secs() -> u64 {
    30
}

fn default_fetch_timeout_ms() -> u64 {
    1000
}

fn default_fetch_retries() -> u8 {
    2
}

fn default_quote_source() -> QuoteSource {
    QuoteSource::Rest
}

fn default_quote_staleness_ms() -> u64 {
    5000
}

pub fn default_brackets() -> Vec<BracketSpec> {
    vec![
        BracketSpec::new("<1.5M", 0, Some(1_500_000)),
        BracketSpec::new("1.5M-1.7M", 1_500_000, Some(1_700_000)),
        BracketSpec::new("1.7M-1.9M", 1_700_000, Some(1_900_000)),
        BracketSpec::new("1.9M-2.1M", 1_900_000, Some(2_100_000)),
        BracketSpec::new("2.1M-2.3M", 2_100_000, Some(2_300_000)),
        BracketSpec::new(">2.3M", 2_300_000, None),
    ]
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("BT"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::error::Result<()> {
        let trading = &self.trading;
        ensure(
            trading.budget_usd > Decimal::ZERO,
            "budget_usd must be positive",
        )?;
        ensure(
            trading.max_order_usd > Decimal::ZERO,
            "max_order_usd must be positive",
        )?;
        ensure(
            trading.max_buy_price > Decimal::ZERO && trading.max_buy_price <= Decimal::ONE,
            "max_buy_price must be in (0, 1]",
        )?;
        ensure(
            trading.min_edge >= Decimal::ZERO && trading.min_edge <= Decimal::ONE,
            "min_edge must be in [0, 1]",
        )?;
        ensure(
            trading.min_order_usd >= Decimal::ZERO,
            "min_order_usd must not be negative",
        )?;

        let movement = &self.movement;
        ensure(
            !movement.scale_in_pcts.is_empty(),
            "scale_in_pcts must not be empty",
        )?;
        ensure(
            movement.scale_in_pcts.iter().all(|p| *p > Decimal::ZERO),
            "scale_in_pcts entries must be positive",
        )?;
        let total_pct: Decimal = movement.scale_in_pcts.iter().copied().sum();
        ensure(
            total_pct <= Decimal::ONE_HUNDRED,
            "scale_in_pcts must sum to at most 100",
        )?;
        ensure(
            movement.zscore_threshold > Decimal::ZERO,
            "zscore_threshold must be positive",
        )?;
        ensure(
            movement.min_samples >= 2 && movement.rolling_window >= movement.min_samples,
            "rolling_window must be >= min_samples >= 2",
        )?;
        if let Some(per_outcome) = movement.per_outcome_budget_usd {
            ensure(
                per_outcome > Decimal::ZERO,
                "per_outcome_budget_usd must be positive",
            )?;
        }

        let session = &self.session;
        ensure(
            session.window_start_hour < session.window_end_hour && session.window_end_hour <= 24,
            "window_start_hour must be before window_end_hour (<= 24)",
        )?;
        ensure(
            (-12..=14).contains(&session.utc_offset_hours),
            "utc_offset_hours must be within -12..=14",
        )?;
        ensure(session.poll_interval_ms > 0, "poll_interval_ms must be positive")?;
        ensure(session.fetch_timeout_ms > 0, "fetch_timeout_ms must be positive")?;
        ensure(session.fetch_retries > 0, "fetch_retries must be positive")?;

        BracketSet::from_specs(&self.brackets)?;

        Ok(())
    }

    /// Original per-outcome allocation used to size scale-in triggers.
    pub fn per_outcome_budget(&self) -> Decimal {
        self.movement
            .per_outcome_budget_usd
            .unwrap_or(self.trading.budget_usd)
    }

    /// Credentials are present for live order submission.
    pub fn has_credentials(&self) -> bool {
        !self.polymarket.api_key.is_empty()
            && !self.polymarket.api_secret.is_empty()
            && !self.polymarket.api_passphrase.is_empty()
    }
}

fn ensure(condition: bool, message: &str) -> crate::error::Result<()> {
    if condition {
        Ok(())
    } else {
        Err(TraderError::Config(message.to_string()))
    }
}

/// Mask a secret for display, keeping a short prefix and suffix.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        "(not set)".to_string()
    } else if secret.len() > 10 {
        format!("{}...{}", &secret[..6], &secret[secret.len() - 4..])
    } else {
        "****".to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polymarket: PolymarketConfig::default(),
            feed: FeedConfig::default(),
            trading: TradingConfig::default(),
            movement: MovementConfig::default(),
            session: SessionConfig::default(),
            brackets: default_brackets(),
        }
    }
}

impl Default for PolymarketConfig {
    fn default() -> Self {
        Self {
            api_url: default_clob_url(),
            gamma_url: default_gamma_url(),
            ws_url: default_ws_url(),
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),
            funder_address: String::new(),
            target_market_slug: String::new(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_secs: default_feed_timeout(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            budget_usd: default_budget(),
            max_order_usd: default_max_order(),
            max_buy_price: default_max_buy_price(),
            min_edge: default_min_edge(),
            min_order_usd: default_min_order(),
            dry_run: default_dry_run(),
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: default_zscore_threshold(),
            scale_in_pcts: default_scale_in_pcts(),
            min_price_change: default_min_price_change(),
            rolling_window: default_rolling_window(),
            min_samples: default_min_samples(),
            per_outcome_budget_usd: None,
            single_outcome_focus: default_single_outcome_focus(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            window_start_hour: default_window_start_hour(),
            window_end_hour: default_window_end_hour(),
            utc_offset_hours: default_utc_offset_hours(),
            weekdays_only: default_weekdays_only(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_poll_interval_secs: default_idle_poll_interval_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            fetch_retries: default_fetch_retries(),
            quote_source: default_quote_source(),
            quote_staleness_ms: default_quote_staleness_ms(),
        }
    }
}
