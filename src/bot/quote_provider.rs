//! External stock quote lookup.
//!
//! [`StooqQuoteProvider`] queries stooq's CSV endpoint
//! (`?s=<code>&f=sd2t2ohlcv&h&e=csv`), which answers with a header row and
//! one data row:
//!
//! ```text
//! Symbol,Date,Time,Open,High,Low,Close,Volume
//! AAPL.US,2024-05-06,22:00:09,182.35,184.2,180.42,181.71,78569667
//! ```
//!
//! Unknown symbols come back with `N/D` in every value column.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

/// Quote lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    /// The lookup did not finish within the allotted time.
    #[error("quote lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP request failed.
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("quote provider returned status {0}")]
    Status(u16),

    /// The response body could not be interpreted.
    #[error("malformed quote response: {0}")]
    Malformed(String),

    /// The provider base URL is invalid.
    #[error("invalid quote provider URL: {0}")]
    InvalidUrl(String),
}

/// A single price observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Symbol as reported by the provider.
    pub symbol: String,
    /// Closing price.
    pub price: f64,
}

/// Source of stock prices.
#[async_trait]
pub trait QuoteProvider: Send + Sync + std::fmt::Debug {
    /// Looks up the latest price for `stock_code`.
    ///
    /// # Errors
    ///
    /// Returns a [`QuoteError`] if the lookup fails for any reason.
    async fn fetch_quote(&self, stock_code: &str) -> Result<Quote, QuoteError>;
}

/// Default stooq CSV endpoint.
pub const STOOQ_BASE_URL: &str = "https://stooq.com/q/l/";

/// [`QuoteProvider`] backed by stooq.com.
#[derive(Debug, Clone)]
pub struct StooqQuoteProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl StooqQuoteProvider {
    /// Creates a provider for `base_url` whose requests give up after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::InvalidUrl`] for an unparsable base URL, or
    /// [`QuoteError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, QuoteError> {
        let base_url = Url::parse(base_url).map_err(|e| QuoteError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chat-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn quote_url(&self, stock_code: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("s", stock_code)
            .append_pair("f", "sd2t2ohlcv")
            .append_key_only("h")
            .append_pair("e", "csv");
        url
    }
}

#[async_trait]
impl QuoteProvider for StooqQuoteProvider {
    async fn fetch_quote(&self, stock_code: &str) -> Result<Quote, QuoteError> {
        let response = self.client.get(self.quote_url(stock_code)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(QuoteError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_csv_quote(&body)
    }
}

/// Parses a stooq CSV body, reading the `Close` column of the first data
/// row.
///
/// # Errors
///
/// Returns [`QuoteError::Malformed`] if the body is not valid CSV, the
/// header or data row is missing, or the price is not a finite number.
pub fn parse_csv_quote(body: &str) -> Result<Quote, QuoteError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers().map_err(malformed)?.clone();
    let row = reader
        .records()
        .next()
        .ok_or_else(|| QuoteError::Malformed("missing data row".to_string()))?
        .map_err(malformed)?;

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .and_then(|i| row.get(i))
            .ok_or_else(|| QuoteError::Malformed(format!("missing {name} column")))
    };

    let symbol = column("Symbol")?.to_string();
    let raw_price = column("Close")?;
    let price: f64 = raw_price
        .parse()
        .map_err(|_| QuoteError::Malformed(format!("invalid price: {raw_price}")))?;
    if !price.is_finite() {
        return Err(QuoteError::Malformed(format!("invalid price: {raw_price}")));
    }
    Ok(Quote { symbol, price })
}

fn malformed(err: csv::Error) -> QuoteError {
    QuoteError::Malformed(err.to_string())
}

/// Reply text for a successful lookup.
#[must_use]
pub fn format_quote(stock_code: &str, price: f64) -> String {
    format!("{} quote is ${price:.2}", stock_code.to_uppercase())
}

/// Reply text for a failed lookup.
#[must_use]
pub fn format_failure(stock_code: &str) -> String {
    format!("Error fetching stock data for {stock_code}")
}
