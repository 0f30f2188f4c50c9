//! Static reference catalog of supported technical indicators.
//!
//! The catalog is loaded once from an embedded JSON resource and read-only
//! thereafter. It drives validation and parameter defaulting for technical
//! alerts, and tells the poller which output variables each indicator returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Candle intervals accepted for technical alerts.
pub const INTERVALS: &[&str] = &[
    "1m", "5m", "15m", "30m", "1h", "2h", "4h", "12h", "1d", "1w",
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("'{0}' is not a supported indicator")]
    UnknownIndicator(String),
    #[error("'{param}' is not a parameter of {indicator}")]
    UnknownParam { indicator: String, param: String },
    #[error("missing required parameter '{param}' for {indicator}")]
    MissingParam { indicator: String, param: String },
    #[error("'{output}' is not an output variable of {indicator}")]
    UnknownOutput { indicator: String, output: String },
    #[error("'{0}' is not a supported interval")]
    UnknownInterval(String),
    #[error("malformed catalog document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One indicator parameter: id, user-facing description, and default value.
/// A `null` default marks the parameter as required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub id: String,
    pub description: String,
    pub default: Option<Value>,
}

/// Catalog entry for a single indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSpec {
    /// Display name (e.g. "Relative Strength Index").
    pub name: String,
    /// External endpoint template for single-indicator queries.
    pub endpoint: String,
    /// Link to the indicator's upstream documentation.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Parameter specs in canonical order.
    pub params: Vec<ParamSpec>,
    /// Output variable names returned by the API. All outputs are numeric.
    pub output: Vec<String>,
}

/// Immutable indicator reference, keyed by uppercase indicator id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorCatalog {
    indicators: BTreeMap<String, IndicatorSpec>,
}

impl IndicatorCatalog {
    /// Load the catalog shipped with the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(include_str!("../resources/indicators.json"))
    }

    /// Parse a catalog from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look up an indicator by id (case-insensitive).
    pub fn get(&self, id: &str) -> Result<&IndicatorSpec, CatalogError> {
        self.indicators
            .get(&id.to_uppercase())
            .ok_or_else(|| CatalogError::UnknownIndicator(id.to_string()))
    }

    /// All indicator ids in the catalog.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.indicators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Check that an interval is in the supported set.
    pub fn validate_interval(interval: &str) -> Result<(), CatalogError> {
        if INTERVALS.contains(&interval) {
            Ok(())
        } else {
            Err(CatalogError::UnknownInterval(interval.to_string()))
        }
    }

    /// Check that `output` names a declared output variable of `id`.
    pub fn validate_output(&self, id: &str, output: &str) -> Result<(), CatalogError> {
        let spec = self.get(id)?;
        if spec.output.iter().any(|o| o == output) {
            Ok(())
        } else {
            Err(CatalogError::UnknownOutput {
                indicator: id.to_uppercase(),
                output: output.to_string(),
            })
        }
    }

    /// Resolve the full parameter map for an indicator: every declared
    /// parameter is present, taking the given value where supplied and the
    /// catalog default otherwise. Unknown keys in `given` are rejected.
    pub fn canonical_params(
        &self,
        id: &str,
        given: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, CatalogError> {
        let spec = self.get(id)?;

        for key in given.keys() {
            if !spec.params.iter().any(|p| &p.id == key) {
                return Err(CatalogError::UnknownParam {
                    indicator: id.to_uppercase(),
                    param: key.clone(),
                });
            }
        }

        let mut resolved = BTreeMap::new();
        for param in &spec.params {
            let value = match given.get(&param.id) {
                Some(v) => v.clone(),
                None => param
                    .default
                    .clone()
                    .ok_or_else(|| CatalogError::MissingParam {
                        indicator: id.to_uppercase(),
                        param: param.id.clone(),
                    })?,
            };
            resolved.insert(param.id.clone(), value);
        }
        Ok(resolved)
    }
}
