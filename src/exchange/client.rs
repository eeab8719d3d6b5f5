//! Polymarket CLOB REST client.
//!
//! Public order-book reads plus fill-or-kill order submission authenticated
//! with L2 (API key) HMAC headers.

use crate::config::PolymarketConfig;
use crate::error::{Result, TraderError};
use crate::exchange::traits::{OrderBookProvider, OrderGateway};
use crate::exchange::types::*;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const ORDER_PATH: &str = "/order";

/// Polymarket CLOB client for order books and order placement.
pub struct ClobClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    funder_address: String,
}

impl ClobClient {
    /// Create a new CLOB client from configuration.
    pub fn new(config: &PolymarketConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_passphrase: config.api_passphrase.clone(),
            funder_address: config.funder_address.clone(),
        })
    }

    /// HMAC-SHA256 over `timestamp + method + path + body`, keyed with the
    /// base64url-decoded secret, returned base64url-encoded.
    fn sign(&self, timestamp: i64, method: &str, path: &str, body: &str) -> Result<String> {
        let key = URL_SAFE
            .decode(self.api_secret.as_bytes())
            .map_err(|e| TraderError::Config(format!("api_secret is not base64url: {}", e)))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&key)
            .map_err(|e| TraderError::Config(format!("invalid HMAC key: {}", e)))?;
        mac.update(format!("{}{}{}{}", timestamp, method, path, body).as_bytes());
        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    // ==================== Market Data (Public) ====================

    /// Get the full order book for a token.
    #[instrument(skip(self))]
    pub async fn get_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| TraderError::Parse(format!("order book for {}: {}", token_id, e)))
    }

    // ==================== Orders (Authenticated) ====================

    /// Submit a fill-or-kill buy order.
    #[instrument(skip(self, order), fields(token_id = %order.outcome.token_id, amount = %order.amount_usd))]
    pub async fn post_order(&self, order: &Order) -> Result<Fill> {
        let token_id = order.outcome.token_id.clone();
        let execution_error = |reason: String, no_fill_confirmed: bool| TraderError::Execution {
            token_id: token_id.clone(),
            reason,
            no_fill_confirmed,
        };

        let request = PostOrderRequest {
            order: OrderPayload {
                token_id: order.outcome.token_id.clone(),
                side: OrderSide::Buy,
                price: order.price_cap,
                amount: order.amount_usd,
                funder: self.funder_address.clone(),
            },
            owner: self.api_key.clone(),
            order_type: OrderType::Fok,
        };
        let body = serde_json::to_string(&request)?;
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(timestamp, "POST", ORDER_PATH, &body)?;

        debug!(%body, "Placing FOK order");

        let response = self
            .http
            .post(format!("{}{}", self.base_url, ORDER_PATH))
            .header("Content-Type", "application/json")
            .header("POLY_ADDRESS", &self.funder_address)
            .header("POLY_SIGNATURE", signature)
            .header("POLY_TIMESTAMP", timestamp.to_string())
            .header("POLY_API_KEY", &self.api_key)
            .header("POLY_PASSPHRASE", &self.api_passphrase)
            .body(body)
            .send()
            .await
            // A connect error means the request never reached the venue
            .map_err(|e| execution_error(e.to_string(), e.is_connect()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| execution_error(format!("reading response: {}", e), false))?;

        if !status.is_success() {
            // 4xx is a rejection before matching; anything else is ambiguous
            let rejected = status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT;
            return Err(execution_error(format!("HTTP {}: {}", status, text), rejected));
        }

        let parsed: PostOrderResponse = serde_json::from_str(&text)
            .map_err(|e| execution_error(format!("unreadable response: {}", e), false))?;

        if parsed.is_matched() {
            let amount_usd = parsed.making_amount.unwrap_or(order.amount_usd);
            let price = match parsed.taking_amount {
                Some(shares) if shares > Decimal::ZERO => amount_usd / shares,
                _ => order.price_cap,
            };
            return Ok(Fill {
                order_id: parsed.order_id,
                token_id: order.outcome.token_id.clone(),
                amount_usd,
                price,
                filled_at: Utc::now(),
                simulated: false,
            });
        }

        if !parsed.success {
            return Err(execution_error(parsed.error_msg, true));
        }

        warn!(status = %parsed.status, order_id = %parsed.order_id, "Order accepted but not matched");
        Err(execution_error(
            format!("order {} in status '{}'", parsed.order_id, parsed.status),
            false,
        ))
    }
}

#[async_trait]
impl OrderBookProvider for ClobClient {
    async fn get_price(&self, token_id: &str) -> Result<Option<Quote>> {
        let book = self.get_book(token_id).await?;
        Ok(book.best_ask().map(|level| Quote::new(level.price, level.size)))
    }
}

#[async_trait]
impl OrderGateway for ClobClient {
    fn name(&self) -> &'static str {
        "polymarket"
    }

    async fn submit(&self, order: &Order) -> Result<Fill> {
        self.post_order(order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ClobClient {
        let config = PolymarketConfig {
            api_url: server.uri(),
            api_key: "key-123".into(),
            api_secret: "dGVzdC1zZWNyZXQta2V5LWJ5dGVz".into(),
            api_passphrase: "pass".into(),
            funder_address: "0xfunder".into(),
            ..PolymarketConfig::default()
        };
        ClobClient::new(&config, Duration::from_secs(2)).unwrap()
    }

    fn order() -> Order {
        Order {
            outcome: Outcome::new("1.7M-1.9M", OutcomeSide::Yes, "tok-yes"),
            price_cap: dec!(0.30),
            amount_usd: dec!(10),
            strategy: "data_event",
        }
    }

    #[test]
    fn test_l2_signature_matches_reference_vector() {
        let config = PolymarketConfig {
            api_secret: "dGVzdC1zZWNyZXQta2V5LWJ5dGVz".into(),
            ..PolymarketConfig::default()
        };
        let client = ClobClient::new(&config, Duration::from_secs(1)).unwrap();
        let sig = client.sign(1_700_000_000, "POST", "/order", r#"{"a":1}"#).unwrap();
        assert_eq!(sig, "nLkFCARayxXwfOk9zlzZiaYdJEmLUre70S-UwC-KdD4=");
    }

    #[tokio::test]
    async fn test_get_price_returns_lowest_ask() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book"))
            .and(query_param("token_id", "tok-yes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"asset_id":"tok-yes","bids":[{"price":"0.20","size":"5"}],
                    "asks":[{"price":"0.40","size":"10"},{"price":"0.25","size":"80"}]}"#,
            ))
            .mount(&server)
            .await;

        let quote = client_for(&server).get_price("tok-yes").await.unwrap().unwrap();
        assert_eq!(quote.price, dec!(0.25));
        assert_eq!(quote.size, dec!(80));
    }

    #[tokio::test]
    async fn test_get_price_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).get_price("tok").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_submit_matched_order_is_fill() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .and(header("POLY_API_KEY", "key-123"))
            .and(header("POLY_PASSPHRASE", "pass"))
            .and(header_exists("POLY_SIGNATURE"))
            .and(header_exists("POLY_TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":true,"errorMsg":"","orderID":"0xabc","status":"matched",
                    "makingAmount":"10","takingAmount":"40"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let fill = client_for(&server).submit(&order()).await.unwrap();
        assert_eq!(fill.order_id, "0xabc");
        assert_eq!(fill.amount_usd, dec!(10));
        assert_eq!(fill.price, dec!(0.25));
        assert!(!fill.simulated);
    }

    #[tokio::test]
    async fn test_killed_order_confirms_no_fill() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"success":false,"errorMsg":"order couldn't be fully filled"}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server).submit(&order()).await.unwrap_err();
        assert!(matches!(
            err,
            TraderError::Execution { no_fill_confirmed: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_server_error_leaves_fill_state_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).submit(&order()).await.unwrap_err();
        assert!(matches!(
            err,
            TraderError::Execution { no_fill_confirmed: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_client_error_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid amount"}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).submit(&order()).await.unwrap_err();
        assert!(matches!(
            err,
            TraderError::Execution { no_fill_confirmed: true, .. }
        ));
    }
}
