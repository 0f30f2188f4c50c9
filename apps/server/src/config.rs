//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Application configuration, loaded from a JSON file with serde defaults
/// filling anything the file omits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreSettings,
    pub polling: PollingSettings,
    pub price_feed: PriceFeedSettings,
    pub indicators: IndicatorSettings,
    /// Cap on active alerts per user.
    pub max_alerts_per_user: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            polling: PollingSettings::default(),
            price_feed: PriceFeedSettings::default(),
            indicators: IndicatorSettings::default(),
            max_alerts_per_user: 10,
        }
    }
}

impl AppConfig {
    /// Load the config file, or fall back to defaults when it is absent.
    pub fn load(path: &str) -> Result<Self, std::io::Error> {
        if !Path::new(path).exists() {
            info!(path, "no config file found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Per-user JSON documents under `data_dir`.
    #[default]
    Json,
    /// SQLite database at `database_url`.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Whitelist root for the JSON backend.
    pub data_dir: String,
    /// Connection URL for the SQLite backend.
    pub database_url: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            data_dir: "data/whitelist".to_string(),
            database_url: "sqlite://data/pricebell.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Simple-price sweep period, seconds.
    pub cex_period_secs: u64,
    /// Technical sweep period, seconds.
    pub technical_period_secs: u64,
    /// Backoff after a sweep- or cycle-level failure, seconds.
    pub error_backoff_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            cex_period_secs: 10,
            technical_period_secs: 10,
            error_backoff_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedSettings {
    /// `global` or `us`, selecting the exchange REST host.
    pub location: String,
}

impl Default for PriceFeedSettings {
    fn default() -> Self {
        Self {
            location: "global".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSettings {
    /// Exchange whose candles back the indicator calculations.
    pub exchange: String,
    /// Upstream quota: one bulk call per this many seconds.
    pub period_secs: u64,
    /// Safety buffer added to the quota period.
    pub buffer_pct: f64,
    /// Aggregate snapshot document, carried across restarts.
    pub snapshot_path: String,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            exchange: "binance".to_string(),
            period_secs: 20,
            buffer_pct: 0.05,
            snapshot_path: "data/ta_aggregate.json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Json);
        assert_eq!(config.polling.cex_period_secs, 10);
        assert_eq!(config.max_alerts_per_user, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "store": { "backend": "sqlite", "data_dir": "x", "database_url": "sqlite::memory:" } }"#)
                .unwrap();
        assert_eq!(parsed.store.backend, StoreBackend::Sqlite);
        assert_eq!(parsed.polling.technical_period_secs, 10);
    }

    #[test]
    fn test_round_trip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_alerts_per_user, config.max_alerts_per_user);
    }
}
