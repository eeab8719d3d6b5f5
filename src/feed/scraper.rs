//! Passenger-volume page scraper with conditional GET.
//!
//! Every request carries a cache-busting `_` query parameter so the CDN is
//! bypassed, plus `If-Modified-Since` / `If-None-Match` once the server has
//! supplied validators. A `304` costs no body and maps to `Unchanged`.

use crate::config::FeedConfig;
use crate::error::{Result, TraderError};
use crate::feed::{Reading, ReadingPoll, ReadingSource};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DATE_FORMATS: [&str; 4] = ["%m/%d/%Y", "%m/%d/%y", "%B %d, %Y", "%b %d, %Y"];

/// Validators from the last successfully parsed response.
#[derive(Debug, Default, Clone)]
struct Validators {
    last_modified: Option<String>,
    etag: Option<String>,
}

/// Conditional-GET poller for the passenger-volume page.
pub struct PassengerFeed {
    http: Client,
    url: String,
    validators: Mutex<Validators>,
    /// 304 responses
    conditional_hits: AtomicU64,
    /// 200 responses with changed content
    conditional_misses: AtomicU64,
}

impl PassengerFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| TraderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            validators: Mutex::new(Validators::default()),
            conditional_hits: AtomicU64::new(0),
            conditional_misses: AtomicU64::new(0),
        })
    }

    /// `(hits, misses)` of conditional requests so far.
    pub fn conditional_stats(&self) -> (u64, u64) {
        (
            self.conditional_hits.load(Ordering::Relaxed),
            self.conditional_misses.load(Ordering::Relaxed),
        )
    }

    fn current_validators(&self) -> Validators {
        self.validators
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn store_validators(&self, validators: Validators) {
        if let Ok(mut guard) = self.validators.lock() {
            *guard = validators;
        }
    }

    /// Fetch the page; `None` if the server reports it unchanged.
    #[instrument(skip(self))]
    async fn fetch_if_changed(&self) -> Result<Option<(String, Validators)>> {
        let validators = self.current_validators();
        let cache_buster = Utc::now().timestamp_millis().to_string();

        let mut request = self.http.get(&self.url).query(&[("_", cache_buster.as_str())]);
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }
        if let Some(etag) = &validators.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            let hits = self.conditional_hits.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(hits, "304 Not Modified");
            return Ok(None);
        }

        let response = response.error_for_status()?;
        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let fresh = Validators {
            last_modified: header_value(header::LAST_MODIFIED),
            etag: header_value(header::ETAG),
        };

        let body = response.text().await?;
        let misses = self.conditional_misses.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(bytes = body.len(), misses, "Page content changed");
        Ok(Some((body, fresh)))
    }
}

#[async_trait]
impl ReadingSource for PassengerFeed {
    async fn get_latest_reading(&self) -> Result<ReadingPoll> {
        let Some((html, validators)) = self.fetch_if_changed().await? else {
            return Ok(ReadingPoll::Unchanged);
        };

        let readings = parse_table(&html)?;
        // Validators are only kept once the page parsed, so a bad page is refetched
        self.store_validators(validators);

        let (hits, misses) = self.conditional_stats();
        let latest = readings
            .into_iter()
            .next()
            .ok_or_else(|| TraderError::Parse("passenger table has no rows".into()))?;
        info!(
            date = %latest.date,
            count = latest.passenger_count,
            hits,
            misses,
            "Fetched passenger volumes"
        );
        Ok(ReadingPoll::Latest(latest))
    }
}

/// Parse the first HTML table into readings, newest date first.
///
/// Rows whose date or count cannot be read are skipped. A page without a
/// table, or a table without a single readable row, is a parse error.
pub fn parse_table(html: &str) -> Result<Vec<Reading>> {
    let table_re = pattern(r"(?is)<table[^>]*>(.*?)</table>")?;
    let row_re = pattern(r"(?is)<tr[^>]*>(.*?)</tr>")?;
    let cell_re = pattern(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>")?;
    let tag_re = pattern(r"(?s)<[^>]+>")?;

    let table = table_re
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| TraderError::Parse("no table found on passenger page".into()))?
        .as_str();

    let observed_at = Utc::now();
    let mut readings = Vec::new();

    for row in row_re.captures_iter(table) {
        let cells: Vec<String> = cell_re
            .captures_iter(&row[1])
            .map(|c| {
                tag_re
                    .replace_all(&c[1], "")
                    .replace("&nbsp;", " ")
                    .trim()
                    .to_string()
            })
            .collect();

        if cells.len() < 2 {
            continue;
        }
        let (Some(date), Some(count)) = (parse_date(&cells[0]), parse_count(&cells[1])) else {
            debug!(row = ?cells, "Skipping unreadable row");
            continue;
        };

        readings.push(Reading {
            date,
            passenger_count: count,
            year_ago_count: cells.get(2).and_then(|c| parse_count(c)),
            observed_at,
        });
    }

    if readings.is_empty() {
        return Err(TraderError::Parse("passenger table has no readable rows".into()));
    }

    readings.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(readings)
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| TraderError::Parse(format!("pattern {}: {}", re, e)))
}

/// `%Y` also accepts two digits, so short years are left to `%y`.
fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            .filter(|d| d.year() >= 1000)
    })
}

/// Digits only: "2,345,678" and "2 345 678" both read as 2345678.
fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
        <table class="views-table">
          <thead><tr><th>Date</th><th>Numbers</th><th>Last Year</th></tr></thead>
          <tbody>
            <tr><td>2/10/2026</td><td>2,101,450</td><td>1,998,002</td></tr>
            <tr><td class="x"> 2/11/2026 </td><td><span>1,850,000</span></td><td>1,777,120</td></tr>
            <tr><td>not a date</td><td>123</td></tr>
            <tr><td>February 9, 2026</td><td>2,345,678</td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_table_newest_first() {
        let readings = parse_table(PAGE).unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].date, date(2026, 2, 11));
        assert_eq!(readings[0].passenger_count, 1_850_000);
        assert_eq!(readings[0].year_ago_count, Some(1_777_120));
        assert_eq!(readings[2].date, date(2026, 2, 9));
        assert_eq!(readings[2].year_ago_count, None);
    }

    #[test]
    fn test_parse_table_errors() {
        assert!(matches!(
            parse_table("<html>maintenance</html>"),
            Err(TraderError::Parse(_))
        ));
        assert!(matches!(
            parse_table("<table><tr><th>Date</th></tr></table>"),
            Err(TraderError::Parse(_))
        ));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date("02/11/2026"), Some(date(2026, 2, 11)));
        assert_eq!(parse_date("2/11/26"), Some(date(2026, 2, 11)));
        assert_eq!(parse_date("Feb 11, 2026"), Some(date(2026, 2, 11)));
        assert_eq!(parse_date("2026-02-11"), None);
    }

    #[test]
    fn test_parse_count_digits_only() {
        assert_eq!(parse_count("2,345,678"), Some(2_345_678));
        assert_eq!(parse_count("n/a"), None);
    }

    fn feed_for(server: &MockServer) -> PassengerFeed {
        PassengerFeed::new(&FeedConfig {
            url: format!("{}/travel/passenger-volumes", server.uri()),
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_conditional_poll_reports_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/travel/passenger-volumes"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/travel/passenger-volumes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .insert_header("Last-Modified", "Wed, 11 Feb 2026 13:20:00 GMT")
                    .set_body_string(PAGE),
            )
            .mount(&server)
            .await;

        let feed = feed_for(&server);
        let first = feed.get_latest_reading().await.unwrap();
        assert!(matches!(first, ReadingPoll::Latest(ref r) if r.passenger_count == 1_850_000));

        let second = feed.get_latest_reading().await.unwrap();
        assert_eq!(second, ReadingPoll::Unchanged);
        assert_eq!(feed.conditional_stats(), (1, 1));
    }

    #[tokio::test]
    async fn test_requests_carry_cache_buster() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param_is_missing("_"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        assert!(feed_for(&server).get_latest_reading().await.is_ok());
    }

    #[tokio::test]
    async fn test_unparseable_page_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>down</p>"))
            .mount(&server)
            .await;

        let err = feed_for(&server).get_latest_reading().await.unwrap_err();
        assert!(matches!(err, TraderError::Parse(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(feed_for(&server).get_latest_reading().await.unwrap_err().is_transient());
    }
}
