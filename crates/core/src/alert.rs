//! Alert definitions and the per-user alert collection.

use crate::catalog::{CatalogError, IndicatorCatalog};
use crate::pair::Pair;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("'{0}' is not a valid comparison (ABOVE, BELOW, PCTCHG, 24HRCHG)")]
    InvalidComparison(String),
    #[error("PCTCHG alerts require an entry price")]
    EntryRequired,
    #[error("technical alerts support only ABOVE or BELOW, got {0}")]
    TechnicalComparison(Comparison),
    #[error("{0} is an invalid cooldown format (use e.g. 30s, 5m, 1h)")]
    InvalidCooldown(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Satisfaction condition applied to the observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "ABOVE")]
    Above,
    #[serde(rename = "BELOW")]
    Below,
    #[serde(rename = "PCTCHG")]
    PctChg,
    #[serde(rename = "24HRCHG")]
    Change24h,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Above => "ABOVE",
            Comparison::Below => "BELOW",
            Comparison::PctChg => "PCTCHG",
            Comparison::Change24h => "24HRCHG",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ABOVE" => Ok(Comparison::Above),
            "BELOW" => Ok(Comparison::Below),
            "PCTCHG" => Ok(Comparison::PctChg),
            "24HRCHG" => Ok(Comparison::Change24h),
            _ => Err(AlertError::InvalidComparison(s.to_string())),
        }
    }
}

/// Re-arm policy. With no cooldown the alert fires once and is deleted on the
/// next pass; with a cooldown it stays registered and re-fires once the
/// cooldown has elapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
    #[serde(default)]
    pub last_triggered: u64,
}

/// Shortest accepted cooldown, to keep re-arming alerts off the hot path.
const MIN_COOLDOWN_SECS: u64 = 5;

impl Trigger {
    /// One-shot trigger: fire once, delete on the next pass.
    pub fn one_shot() -> Self {
        Self::default()
    }

    /// Parse a cooldown string like `30s`, `5m` or `1h`.
    pub fn with_cooldown(cooldown: &str) -> Result<Self, AlertError> {
        let cooldown = cooldown.to_lowercase();
        if !cooldown.is_ascii() || cooldown.len() < 2 {
            return Err(AlertError::InvalidCooldown(cooldown));
        }
        let (digits, unit) = cooldown.split_at(cooldown.len() - 1);
        let value: u64 = digits
            .parse()
            .map_err(|_| AlertError::InvalidCooldown(cooldown.clone()))?;
        let multiplier = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => return Err(AlertError::InvalidCooldown(cooldown.clone())),
        };
        Ok(Self {
            cooldown_seconds: Some(value.saturating_mul(multiplier).max(MIN_COOLDOWN_SECS)),
            last_triggered: 0,
        })
    }

    pub fn is_cooldown(&self) -> bool {
        self.cooldown_seconds.is_some()
    }

    /// Whether the alert may fire at `now` (always true for one-shot alerts).
    pub fn ready(&self, now: u64) -> bool {
        match self.cooldown_seconds {
            Some(cooldown) => now.saturating_sub(self.last_triggered) >= cooldown,
            None => true,
        }
    }
}

/// Variant-specific payload of an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlertKind {
    /// Raw spot-price rule evaluated directly against the price feed.
    #[serde(rename = "s")]
    Simple {
        /// Reference price for PCTCHG comparisons.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry: Option<f64>,
    },
    /// Technical-indicator rule evaluated against the shared aggregate.
    #[serde(rename = "t")]
    Technical {
        /// Uppercase indicator id from the catalog (e.g. "RSI").
        indicator: String,
        /// Candle interval (e.g. "1h").
        interval: String,
        /// Canonical parameter map, defaults filled at creation time.
        params: BTreeMap<String, Value>,
        /// Which output variable of the indicator to compare.
        output_value: String,
    },
}

/// One registered alert: common envelope plus the variant payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub comparison: Comparison,
    pub target: f64,
    /// Satisfied-and-pending-removal flag (one-shot alerts only).
    #[serde(default)]
    pub alerted: bool,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(flatten)]
    pub kind: AlertKind,
}

impl Alert {
    /// Build a simple price alert. PCTCHG requires an entry price; the target
    /// of a PCTCHG alert is a fraction (0.10 = 10%).
    pub fn simple(
        comparison: Comparison,
        target: f64,
        entry: Option<f64>,
        trigger: Trigger,
    ) -> Result<Self, AlertError> {
        if comparison == Comparison::PctChg && entry.is_none() {
            return Err(AlertError::EntryRequired);
        }
        Ok(Self {
            comparison,
            target,
            alerted: false,
            trigger,
            kind: AlertKind::Simple { entry },
        })
    }

    /// Build a technical alert, validated against the catalog: the indicator
    /// must exist, the interval and output variable must be known, and the
    /// parameter map is canonicalized (unknown keys rejected, defaults
    /// filled in catalog order).
    #[allow(clippy::too_many_arguments)]
    pub fn technical(
        catalog: &IndicatorCatalog,
        indicator: &str,
        interval: &str,
        params: &BTreeMap<String, Value>,
        output_value: &str,
        comparison: Comparison,
        target: f64,
        trigger: Trigger,
    ) -> Result<Self, AlertError> {
        if !matches!(comparison, Comparison::Above | Comparison::Below) {
            return Err(AlertError::TechnicalComparison(comparison));
        }
        IndicatorCatalog::validate_interval(interval)?;
        catalog.validate_output(indicator, output_value)?;
        let params = catalog.canonical_params(indicator, params)?;

        Ok(Self {
            comparison,
            target,
            alerted: false,
            trigger,
            kind: AlertKind::Technical {
                indicator: indicator.to_uppercase(),
                interval: interval.to_string(),
                params,
                output_value: output_value.to_string(),
            },
        })
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.kind, AlertKind::Simple { .. })
    }

    pub fn is_technical(&self) -> bool {
        matches!(self.kind, AlertKind::Technical { .. })
    }

    /// One-line description for alert listings.
    pub fn describe(&self) -> String {
        match &self.kind {
            AlertKind::Simple { entry } => match entry {
                Some(entry) => format!("{} {} (entry {})", self.comparison, self.target, entry),
                None => format!("{} {}", self.comparison, self.target),
            },
            AlertKind::Technical {
                indicator,
                interval,
                params,
                output_value,
            } => {
                let params = params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{indicator} {interval} [{params}] {output_value} {} {}",
                    self.comparison, self.target
                )
            }
        }
    }
}

/// Per-user alert collection: pair -> ordered alert list.
///
/// Pairs and alerts keep insertion order because the 1-based positions shown
/// by `/viewalerts` are the handles users cancel alerts with. Serialized as an
/// ordered array of `{pair, alerts}` entries, never a map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertsByPair {
    entries: Vec<PairAlerts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAlerts {
    pub pair: Pair,
    pub alerts: Vec<Alert>,
}

impl AlertsByPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of registered alerts across all pairs.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|e| e.alerts.len()).sum()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.entries.iter().map(|e| &e.pair)
    }

    pub fn get(&self, pair: &Pair) -> Option<&[Alert]> {
        self.entries
            .iter()
            .find(|e| &e.pair == pair)
            .map(|e| e.alerts.as_slice())
    }

    /// Append an alert under a pair, creating the pair entry at the end if it
    /// does not exist yet.
    pub fn push(&mut self, pair: Pair, alert: Alert) {
        match self.entries.iter_mut().find(|e| e.pair == pair) {
            Some(entry) => entry.alerts.push(alert),
            None => self.entries.push(PairAlerts {
                pair,
                alerts: vec![alert],
            }),
        }
    }

    /// Remove the alert at a 1-based index under a pair. Drops the pair entry
    /// when its list becomes empty. Returns the removed alert.
    pub fn remove(&mut self, pair: &Pair, index: usize) -> Option<Alert> {
        let pos = self.entries.iter().position(|e| &e.pair == pair)?;
        let entry = &mut self.entries[pos];
        if index == 0 || index > entry.alerts.len() {
            return None;
        }
        let removed = entry.alerts.remove(index - 1);
        if entry.alerts.is_empty() {
            self.entries.remove(pos);
        }
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Pair, &[Alert])> {
        self.entries.iter().map(|e| (&e.pair, e.alerts.as_slice()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Pair, &mut Vec<Alert>)> {
        self.entries.iter_mut().map(|e| (&e.pair, &mut e.alerts))
    }

    /// Drop pair entries whose alert lists have been emptied.
    pub fn prune_empty(&mut self) {
        self.entries.retain(|e| !e.alerts.is_empty());
    }
}
