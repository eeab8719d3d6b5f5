//! Type definitions for Polymarket CLOB and Gamma API payloads, plus the
//! venue-neutral outcome, quote, order, and fill types used by the engine.

use crate::strategy::Bracket;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a bracket market a token pays out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeSide {
    Yes,
    No,
}

impl fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeSide::Yes => write!(f, "YES"),
            OutcomeSide::No => write!(f, "NO"),
        }
    }
}

/// A tradable token: one side of one bracket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Outcome {
    /// Bracket label this token belongs to
    pub label: String,
    pub side: OutcomeSide,
    /// CLOB token (asset) id
    pub token_id: String,
}

impl Outcome {
    pub fn new(label: impl Into<String>, side: OutcomeSide, token_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            side,
            token_id: token_id.into(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.side, self.label)
    }
}

/// Best ask and the size resting at it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub size: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self {
            price,
            size,
            observed_at: Utc::now(),
        }
    }

    /// USD notional available at the best ask.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// One bracket's YES/NO token pair.
#[derive(Debug, Clone)]
pub struct BracketMarket {
    pub bracket: Bracket,
    pub question: String,
    pub yes: Outcome,
    pub no: Outcome,
}

impl BracketMarket {
    pub fn outcome(&self, side: OutcomeSide) -> &Outcome {
        match side {
            OutcomeSide::Yes => &self.yes,
            OutcomeSide::No => &self.no,
        }
    }
}

/// The day's tradable outcomes for one passenger-count date.
#[derive(Debug, Clone)]
pub struct MarketDay {
    pub date: NaiveDate,
    pub slug: String,
    pub title: String,
    /// Ordered like the bracket set
    pub markets: Vec<BracketMarket>,
}

impl MarketDay {
    /// Every YES and NO outcome.
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.markets.iter().flat_map(|m| [&m.yes, &m.no])
    }

    pub fn yes_outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.markets.iter().map(|m| &m.yes)
    }

    pub fn market(&self, label: &str) -> Option<&BracketMarket> {
        self.markets.iter().find(|m| m.bracket.label == label)
    }
}

/// Order submitted to the venue. Buy-only, fill-or-kill, sized in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub outcome: Outcome,
    /// Limit price; the order must not fill above this
    pub price_cap: Decimal,
    /// USD amount to spend
    pub amount_usd: Decimal,
    /// Strategy that produced the signal
    pub strategy: &'static str,
}

/// Confirmed fill of a fill-or-kill order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: String,
    pub token_id: String,
    pub amount_usd: Decimal,
    pub price: Decimal,
    pub filled_at: DateTime<Utc>,
    /// Produced by the paper gateway rather than the venue
    pub simulated: bool,
}

// ==================== CLOB wire types ====================

/// Single price level in the order book.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
}

/// `GET /book` response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<OrderBookLevel>,
    #[serde(default)]
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Lowest ask with positive size. Levels are not assumed to be sorted.
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks
            .iter()
            .filter(|l| l.size > Decimal::ZERO)
            .min_by(|a, b| a.price.cmp(&b.price))
    }
}

/// Side of a CLOB order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// CLOB order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Fok, // Fill or Kill
    Fak, // Fill and Kill
    Gtc, // Good Till Cancel
}

/// Order body inside a `POST /order` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    #[serde(rename = "tokenID")]
    pub token_id: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub funder: String,
}

/// `POST /order` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOrderRequest {
    pub order: OrderPayload,
    pub owner: String,
    pub order_type: OrderType,
}

/// `POST /order` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    #[serde(rename = "orderID", default)]
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub making_amount: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub taking_amount: Option<Decimal>,
}

impl PostOrderResponse {
    /// A fill-or-kill order either matched in full or did not fill at all.
    pub fn is_matched(&self) -> bool {
        self.success && self.status.eq_ignore_ascii_case("matched")
    }
}

// ==================== Gamma wire types ====================

/// Event returned by `GET /events?slug=...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

/// One bracket sub-market of an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub group_item_title: String,
    /// JSON-encoded list: `["<yes token>", "<no token>"]`
    #[serde(default)]
    pub clob_token_ids: String,
    /// JSON-encoded list: `["Yes", "No"]`
    #[serde(default)]
    pub outcomes: String,
    #[serde(default)]
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_book_best_levels_unsorted() {
        let book: OrderBook = serde_json::from_str(
            r#"{
                "asset_id": "123",
                "bids": [{"price": "0.10", "size": "50"}, {"price": "0.12", "size": "5"}],
                "asks": [{"price": "0.20", "size": "10"}, {"price": "0.15", "size": "0"}, {"price": "0.18", "size": "40"}]
            }"#,
        )
        .unwrap();

        let ask = book.best_ask().unwrap();
        assert_eq!(ask.price, dec!(0.18));
        assert_eq!(ask.size, dec!(40));
    }

    #[test]
    fn test_empty_book_has_no_ask() {
        let book: OrderBook = serde_json::from_str(r#"{"bids": [], "asks": []}"#).unwrap();
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn test_post_order_response_matching() {
        let resp: PostOrderResponse = serde_json::from_str(
            r#"{"success": true, "errorMsg": "", "orderID": "0xabc", "status": "matched",
                "makingAmount": "10", "takingAmount": "50"}"#,
        )
        .unwrap();
        assert!(resp.is_matched());
        assert_eq!(resp.making_amount, Some(dec!(10)));

        let killed: PostOrderResponse = serde_json::from_str(
            r#"{"success": false, "errorMsg": "order couldn't be fully filled. FOK orders are fully filled or killed."}"#,
        )
        .unwrap();
        assert!(!killed.is_matched());
    }

    #[test]
    fn test_post_order_request_serialization() {
        let req = PostOrderRequest {
            order: OrderPayload {
                token_id: "tok".into(),
                side: OrderSide::Buy,
                price: dec!(0.25),
                amount: dec!(10.50),
                funder: "0xfunder".into(),
            },
            owner: "key".into(),
            order_type: OrderType::Fok,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["orderType"], "FOK");
        assert_eq!(json["order"]["tokenID"], "tok");
        assert_eq!(json["order"]["side"], "BUY");
        assert_eq!(json["order"]["amount"], "10.50");
    }

    #[test]
    fn test_quote_notional() {
        let quote = Quote::new(dec!(0.25), dec!(100));
        assert_eq!(quote.notional(), dec!(25));
    }
}
