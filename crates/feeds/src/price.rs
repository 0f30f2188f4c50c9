//! Spot-price feed client (exchange rolling-window ticker REST API).

use crate::error::FeedError;
use crate::limiter::{RateLimit, RateLimiter};
use pricebell_core::Pair;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Global exchange REST host.
pub const BINANCE_GLOBAL_HOST: &str = "https://api.binance.com";
/// US-regulated exchange REST host, same ticker API surface.
pub const BINANCE_US_HOST: &str = "https://api.binance.us";

/// Rolling windows accepted by the ticker endpoint.
pub const PRICE_WINDOWS: &[&str] = &[
    "1m", "5m", "15m", "30m", "1h", "2h", "4h", "12h", "1d", "7d",
];

/// Window used when only the last price is needed.
const DEFAULT_WINDOW: &str = "1d";

/// Configuration for the price client.
#[derive(Debug, Clone)]
pub struct PriceClientConfig {
    /// REST host, `BINANCE_GLOBAL_HOST` or `BINANCE_US_HOST`.
    pub base_url: String,
    /// Attempts before a transient failure becomes terminal.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Shared per-process quota for the ticker endpoint.
    pub rate_limit: RateLimit,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl Default for PriceClientConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_GLOBAL_HOST.to_string(),
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            rate_limit: RateLimit::new(10, Duration::from_secs(1)),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Parsed ticker snapshot for one (symbol, window).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticker {
    pub last_price: f64,
    pub price_change_percent: f64,
}

/// Ticker endpoint payload. The exchange encodes numerics as JSON strings.
#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

fn parse_ticker(body: &str, endpoint: &str) -> Result<Ticker, FeedError> {
    let malformed = |detail: String| FeedError::MalformedResponse {
        endpoint: endpoint.to_string(),
        detail,
    };
    let response: TickerResponse =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let last_price = response
        .last_price
        .parse()
        .map_err(|_| malformed(format!("unparsable lastPrice '{}'", response.last_price)))?;
    let price_change_percent = response.price_change_percent.parse().map_err(|_| {
        malformed(format!(
            "unparsable priceChangePercent '{}'",
            response.price_change_percent
        ))
    })?;
    Ok(Ticker {
        last_price,
        price_change_percent,
    })
}

/// Rate-limited, retrying accessor to the exchange price API.
pub struct PriceClient {
    http: reqwest::Client,
    config: PriceClientConfig,
    limiter: RateLimiter,
}

impl PriceClient {
    pub fn new(config: PriceClientConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let limiter = RateLimiter::new(config.rate_limit);
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    /// Latest spot price for a pair.
    pub async fn get_price(&self, pair: &Pair) -> Result<f64, FeedError> {
        let ticker = self.fetch_ticker(&pair.symbol(), DEFAULT_WINDOW).await?;
        Ok(ticker.last_price)
    }

    /// Percent change of a pair over a rolling window (e.g. "1d"), expressed
    /// in percent points (-3.8 for -3.8%).
    pub async fn get_percent_change(&self, pair: &Pair, window: &str) -> Result<f64, FeedError> {
        if !PRICE_WINDOWS.contains(&window) {
            return Err(FeedError::UnsupportedWindow(window.to_string()));
        }
        let ticker = self.fetch_ticker(&pair.symbol(), window).await?;
        Ok(ticker.price_change_percent)
    }

    /// Fetch with bounded retries. Every attempt passes through the shared
    /// limiter; after the retry budget is spent the failure is terminal for
    /// this cycle.
    async fn fetch_ticker(&self, symbol: &str, window: &str) -> Result<Ticker, FeedError> {
        let url = format!(
            "{}/api/v3/ticker?symbol={}&windowSize={}",
            self.config.base_url, symbol, window
        );

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries {
            self.limiter.acquire().await;
            match self.fetch_once(&url).await {
                Ok(ticker) => return Ok(ticker),
                Err(e) => {
                    warn!(symbol, attempt, error = %e, "price fetch failed");
                    last_error = e.to_string();
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(FeedError::UpstreamUnavailable {
            attempts: self.config.max_retries,
            last_error,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Ticker, FeedError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        parse_ticker(&body, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TICKER_BODY: &str = r#"{
        "symbol": "ETHUSDT",
        "priceChange": "-120.5",
        "priceChangePercent": "-3.8",
        "lastPrice": "3100.25",
        "openPrice": "3220.75"
    }"#;

    #[test]
    fn test_parse_ticker() {
        let ticker = parse_ticker(TICKER_BODY, "test").unwrap();
        assert_eq!(ticker.last_price, 3100.25);
        assert_eq!(ticker.price_change_percent, -3.8);
    }

    #[test]
    fn test_parse_ticker_rejects_garbage() {
        assert!(matches!(
            parse_ticker("{\"code\":-1121}", "test"),
            Err(FeedError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_ticker("not json", "test"),
            Err(FeedError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_window() {
        let client = PriceClient::new(PriceClientConfig::default()).unwrap();
        let pair = Pair::new("ETH", "USDT");
        assert!(matches!(
            client.get_percent_change(&pair, "3d").await,
            Err(FeedError::UnsupportedWindow(_))
        ));
    }
}
