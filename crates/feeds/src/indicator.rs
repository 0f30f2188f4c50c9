//! Technical-indicator feed client (bulk indicator REST API).

use crate::error::FeedError;
use crate::limiter::{RateLimit, RateLimiter};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Bulk query endpoint.
pub const BULK_ENDPOINT: &str = "https://api.taapi.io/bulk";
/// Exchange whose candles back the indicator calculations.
pub const DEFAULT_EXCHANGE: &str = "binance";

/// Free-tier quota: one bulk call every 20 seconds. The safety buffer keeps
/// us off the exact window boundary.
const DEFAULT_PERIOD: Duration = Duration::from_secs(20);
const DEFAULT_BUFFER_PCT: f64 = 0.05;

/// Configuration for the indicator client.
#[derive(Debug, Clone)]
pub struct IndicatorClientConfig {
    pub endpoint: String,
    /// API secret, sent in every bulk request body.
    pub api_key: String,
    pub exchange: String,
    pub rate_limit: RateLimit,
    pub timeout: Duration,
}

impl IndicatorClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: BULK_ENDPOINT.to_string(),
            api_key: api_key.into(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            rate_limit: RateLimit::per_period_buffered(DEFAULT_PERIOD, DEFAULT_BUFFER_PCT),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Extract the ordered `result` objects from a bulk response. A response
/// without `mappings` is the API's error shape and is fatal for the cycle.
fn parse_bulk_response(value: Value, endpoint: &str) -> Result<Vec<Map<String, Value>>, FeedError> {
    let malformed = |detail: String| FeedError::MalformedResponse {
        endpoint: endpoint.to_string(),
        detail,
    };

    let mappings = match value.get("mappings").and_then(Value::as_array) {
        Some(mappings) => mappings,
        None => return Err(malformed(format!("missing mappings: {value}"))),
    };

    mappings
        .iter()
        .map(|mapping| {
            mapping
                .get("result")
                .and_then(Value::as_object)
                .cloned()
                .ok_or_else(|| malformed(format!("mapping without result: {mapping}")))
        })
        .collect()
}

/// Rate-limited accessor to the bulk indicator API. One bulk request covers
/// every deduplicated query of one (symbol, interval) aggregate group.
pub struct IndicatorClient {
    http: reqwest::Client,
    config: IndicatorClientConfig,
    limiter: RateLimiter,
}

impl IndicatorClient {
    pub fn new(config: IndicatorClientConfig) -> Result<Self, FeedError> {
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

    /// Issue one bulk query. `indicators` are the wire-format query objects
    /// (`{"indicator": "rsi", "period": 14}`); results come back in request
    /// order, one per query.
    pub async fn bulk(
        &self,
        symbol: &str,
        interval: &str,
        indicators: &[Value],
    ) -> Result<Vec<Map<String, Value>>, FeedError> {
        self.limiter.acquire().await;

        let body = json!({
            "secret": self.config.api_key,
            "construct": {
                "exchange": self.config.exchange,
                "symbol": symbol,
                "interval": interval,
                "indicators": indicators,
            }
        });
        debug!(symbol, interval, queries = indicators.len(), "sending bulk indicator query");

        let response: Value = self
            .http
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        let results = parse_bulk_response(response, &self.config.endpoint)?;
        if results.len() != indicators.len() {
            return Err(FeedError::MalformedResponse {
                endpoint: self.config.endpoint.clone(),
                detail: format!(
                    "expected {} mappings, got {}",
                    indicators.len(),
                    results.len()
                ),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_bulk_response() {
        let body = json!({
            "mappings": [
                { "id": "binance_ETH/USDT_1h_rsi_14", "result": { "value": 41.2 } },
                { "id": "binance_ETH/USDT_1h_macd", "result": {
                    "valueMACD": 1.1, "valueMACDSignal": 0.9, "valueMACDHist": 0.2
                } }
            ]
        });
        let results = parse_bulk_response(body, "test").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("value"), Some(&json!(41.2)));
        assert_eq!(results[1].get("valueMACD"), Some(&json!(1.1)));
    }

    #[test]
    fn test_parse_bulk_response_error_shape() {
        let body = json!({ "error": "rate limit exceeded" });
        assert!(matches!(
            parse_bulk_response(body, "test"),
            Err(FeedError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_bulk_response_mapping_without_result() {
        let body = json!({ "mappings": [ { "id": "x" } ] });
        assert!(matches!(
            parse_bulk_response(body, "test"),
            Err(FeedError::MalformedResponse { .. })
        ));
    }
}
