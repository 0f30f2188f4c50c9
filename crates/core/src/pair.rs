//! Trading pair definitions.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairError {
    #[error("invalid pair format '{0}', expected BASE/QUOTE (e.g. ETH/USDT)")]
    InvalidFormat(String),
}

/// Base/quote asset pair (e.g. ETH/USDT).
///
/// Serialized in its display form (`"ETH/USDT"`) so persisted alert documents
/// stay human-readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    /// Base asset symbol (e.g. ETH in ETH/USDT)
    pub base: CompactString,
    /// Quote asset symbol (e.g. USDT in ETH/USDT)
    pub quote: CompactString,
}

impl Pair {
    /// Create a pair from base and quote symbols. Symbols are uppercased.
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: CompactString::new(base.to_uppercase()),
            quote: CompactString::new(quote.to_uppercase()),
        }
    }

    /// Exchange ticker symbol without the slash (e.g. "ETHUSDT").
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Spot chart URL on the exchange web UI.
    pub fn chart_url(&self) -> String {
        format!(
            "https://www.binance.com/en/trade/{}_{}?type=spot",
            self.base, self.quote
        )
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| PairError::InvalidFormat(s.to_string()))?;
        if base.trim().is_empty() || quote.trim().is_empty() || quote.contains('/') {
            return Err(PairError::InvalidFormat(s.to_string()));
        }
        Ok(Pair::new(base.trim(), quote.trim()))
    }
}

impl TryFrom<String> for Pair {
    type Error = PairError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pair_parse() {
        let pair: Pair = "eth/usdt".parse().unwrap();
        assert_eq!(pair.base.as_str(), "ETH");
        assert_eq!(pair.quote.as_str(), "USDT");
        assert_eq!(pair.to_string(), "ETH/USDT");
    }

    #[test]
    fn test_pair_symbol() {
        let pair = Pair::new("BTC", "USDT");
        assert_eq!(pair.symbol(), "BTCUSDT");
    }

    #[test]
    fn test_pair_parse_rejects_malformed() {
        assert!("ETHUSDT".parse::<Pair>().is_err());
        assert!("ETH/".parse::<Pair>().is_err());
        assert!("/USDT".parse::<Pair>().is_err());
        assert!("A/B/C".parse::<Pair>().is_err());
    }

    #[test]
    fn test_pair_serde_round_trip() {
        let pair = Pair::new("ETH", "USDT");
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, "\"ETH/USDT\"");
        let back: Pair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair);
    }
}
