//! Cross-user technical-indicator aggregate.
//!
//! Indicator API calls are the scarce, rate-limited resource. The aggregate
//! merges every user's technical alerts into a deduplicated query set keyed
//! by (symbol, interval), so N users sharing one indicator cost one upstream
//! query. It is rebuilt from scratch every poll cycle and previously fetched
//! values are carried across rebuilds.

use crate::error::EngineError;
use pricebell_core::{AlertKind, AlertsByPair, IndicatorCatalog};
use pricebell_store::{AlertStore, StoreError, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

/// Canonical identity of one deduplicated indicator query: lowercased
/// indicator id plus the full parameter map (defaults filled, keys sorted).
/// Two alerts with equal specs share one upstream query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub indicator: String,
    pub params: BTreeMap<String, Value>,
}

impl QuerySpec {
    /// Canonicalize a technical alert's indicator + params.
    pub fn from_technical(
        indicator: &str,
        params: &BTreeMap<String, Value>,
        catalog: &IndicatorCatalog,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            indicator: indicator.to_lowercase(),
            params: catalog.canonical_params(indicator, params)?,
        })
    }

    /// Wire-format query object for the bulk endpoint:
    /// `{"indicator": "rsi", "period": 14}`.
    pub fn to_bulk_query(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("indicator".to_string(), Value::from(self.indicator.clone()));
        for (key, value) in &self.params {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

/// One aggregate query and its last fetched outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    #[serde(flatten)]
    pub spec: QuerySpec,
    /// Output variable -> last fetched value, `None` until first fetch.
    pub values: BTreeMap<String, Option<f64>>,
    /// Unix seconds of the last successful fetch, 0 if never fetched.
    pub last_update: u64,
}

impl QueryEntry {
    /// Fresh entry with a null slot for every declared output variable.
    pub fn new(spec: QuerySpec, outputs: &[String]) -> Self {
        Self {
            spec,
            values: outputs.iter().map(|o| (o.clone(), None)).collect(),
            last_update: 0,
        }
    }
}

/// The deduplicated query set: symbol -> interval -> entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregate {
    pub groups: BTreeMap<String, BTreeMap<String, Vec<QueryEntry>>>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no queries exist anywhere (no technical alerts registered).
    pub fn is_empty(&self) -> bool {
        self.groups
            .values()
            .all(|intervals| intervals.values().all(Vec::is_empty))
    }

    pub fn total_queries(&self) -> usize {
        self.groups
            .values()
            .map(|intervals| intervals.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    /// Find the entry matching a canonical spec under (symbol, interval).
    pub fn find(&self, symbol: &str, interval: &str, spec: &QuerySpec) -> Option<&QueryEntry> {
        self.groups
            .get(symbol)?
            .get(interval)?
            .iter()
            .find(|entry| &entry.spec == spec)
    }

    fn insert(&mut self, symbol: &str, interval: &str, entry: QueryEntry) {
        self.groups
            .entry(symbol.to_string())
            .or_default()
            .entry(interval.to_string())
            .or_default()
            .push(entry);
    }
}

/// Load every whitelisted user's alerts. A user with unreadable data is
/// logged and skipped; the rebuild proceeds with the rest.
pub async fn collect_user_alerts(
    store: &dyn AlertStore,
) -> Result<Vec<(UserId, AlertsByPair)>, StoreError> {
    let mut collected = Vec::new();
    for user in store.whitelist().await? {
        match store.load_alerts(&user).await {
            Ok(alerts) => collected.push((user, alerts)),
            Err(e) => error!(user, error = %e, "skipping user with unreadable alerts"),
        }
    }
    Ok(collected)
}

/// Rebuild the aggregate from all users' current alerts.
///
/// Exactly one entry exists per distinct (symbol, interval, indicator,
/// params) tuple regardless of how many users reference it. Entries that
/// also existed in `previous` keep their `values`/`last_update`, so rebuild
/// timing never erases live data; new entries start with nulls.
pub fn rebuild(
    users: &[(UserId, AlertsByPair)],
    catalog: &IndicatorCatalog,
    previous: &Aggregate,
) -> Aggregate {
    let mut aggregate = Aggregate::new();

    for (user, alerts) in users {
        for (pair, list) in alerts.iter() {
            let symbol = pair.to_string();
            for alert in list {
                let AlertKind::Technical {
                    indicator,
                    interval,
                    params,
                    ..
                } = &alert.kind
                else {
                    continue;
                };

                let indicator_spec = match catalog.get(indicator) {
                    Ok(spec) => spec,
                    Err(e) => {
                        warn!(user, %pair, error = %e, "skipping alert with unknown indicator");
                        continue;
                    }
                };
                let spec = match QuerySpec::from_technical(indicator, params, catalog) {
                    Ok(spec) => spec,
                    Err(e) => {
                        warn!(user, %pair, error = %e, "skipping alert with invalid params");
                        continue;
                    }
                };

                if aggregate.find(&symbol, interval, &spec).is_some() {
                    continue;
                }

                let entry = match previous.find(&symbol, interval, &spec) {
                    Some(matched) => matched.clone(),
                    None => QueryEntry::new(spec, &indicator_spec.output),
                };
                aggregate.insert(&symbol, interval, entry);
            }
        }
    }

    aggregate
}

/// Shared aggregate snapshot.
///
/// The poller rebuilds into a fresh `Aggregate` and replaces the snapshot in
/// one swap, so the technical evaluator never observes a half-written
/// structure. Each swap is mirrored to a JSON document when a snapshot path
/// is configured, and `restore` resumes from it after a restart.
#[derive(Clone)]
pub struct SharedAggregate {
    inner: Arc<RwLock<Arc<Aggregate>>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl SharedAggregate {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(Aggregate::new()))),
            snapshot_path: snapshot_path.map(Arc::new),
        }
    }

    /// Load the persisted snapshot, if any. A missing or corrupt snapshot is
    /// not fatal; polling starts from an empty aggregate.
    pub async fn restore(&self) -> bool {
        let Some(path) = &self.snapshot_path else {
            return false;
        };
        let raw = match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        match serde_json::from_str::<Aggregate>(&raw) {
            Ok(aggregate) => {
                *self.inner.write().await = Arc::new(aggregate);
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt aggregate snapshot");
                false
            }
        }
    }

    /// Current snapshot. Cheap; readers hold only an `Arc`.
    pub async fn load(&self) -> Arc<Aggregate> {
        self.inner.read().await.clone()
    }

    /// Atomically replace the snapshot and persist it.
    pub async fn swap(&self, aggregate: Aggregate) {
        if let Some(path) = &self.snapshot_path {
            match serde_json::to_string_pretty(&aggregate) {
                Ok(json) => {
                    if let Err(e) = tokio::fs::write(path.as_ref(), json).await {
                        warn!(path = %path.display(), error = %e, "failed to persist aggregate snapshot");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize aggregate snapshot"),
            }
        }
        *self.inner.write().await = Arc::new(aggregate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pricebell_core::{Alert, Comparison, Pair, Trigger};
    use serde_json::json;

    fn catalog() -> IndicatorCatalog {
        IndicatorCatalog::builtin().unwrap()
    }

    fn rsi_alert(catalog: &IndicatorCatalog, params: &BTreeMap<String, Value>) -> Alert {
        Alert::technical(
            catalog,
            "RSI",
            "1h",
            params,
            "value",
            Comparison::Below,
            30.0,
            Trigger::one_shot(),
        )
        .unwrap()
    }

    fn user_with(user: &str, alert: Alert) -> (UserId, AlertsByPair) {
        let mut alerts = AlertsByPair::new();
        alerts.push(Pair::new("ETH", "USDT"), alert);
        (user.to_string(), alerts)
    }

    #[test]
    fn test_rebuild_dedupes_identical_queries() {
        let catalog = catalog();
        let users = vec![
            user_with("1", rsi_alert(&catalog, &BTreeMap::new())),
            user_with("2", rsi_alert(&catalog, &BTreeMap::new())),
        ];

        let aggregate = rebuild(&users, &catalog, &Aggregate::new());
        assert_eq!(aggregate.total_queries(), 1);

        let spec = QuerySpec::from_technical("RSI", &BTreeMap::new(), &catalog).unwrap();
        let entry = aggregate.find("ETH/USDT", "1h", &spec).unwrap();
        assert_eq!(entry.values.get("value"), Some(&None));
        assert_eq!(entry.last_update, 0);
    }

    #[test]
    fn test_rebuild_distinct_params_get_distinct_entries() {
        let catalog = catalog();
        let custom = BTreeMap::from([("period".to_string(), json!(7))]);
        let users = vec![
            user_with("1", rsi_alert(&catalog, &BTreeMap::new())),
            user_with("2", rsi_alert(&catalog, &custom)),
        ];

        let aggregate = rebuild(&users, &catalog, &Aggregate::new());
        assert_eq!(aggregate.total_queries(), 2);

        // User 2's custom period must not displace user 1's default query.
        let default_spec = QuerySpec::from_technical("RSI", &BTreeMap::new(), &catalog).unwrap();
        let custom_spec = QuerySpec::from_technical("RSI", &custom, &catalog).unwrap();
        assert!(aggregate.find("ETH/USDT", "1h", &default_spec).is_some());
        assert!(aggregate.find("ETH/USDT", "1h", &custom_spec).is_some());
    }

    #[test]
    fn test_rebuild_carries_forward_values() {
        let catalog = catalog();
        let users = vec![user_with("1", rsi_alert(&catalog, &BTreeMap::new()))];

        let mut previous = rebuild(&users, &catalog, &Aggregate::new());
        let spec = QuerySpec::from_technical("RSI", &BTreeMap::new(), &catalog).unwrap();
        {
            let entries = previous
                .groups
                .get_mut("ETH/USDT")
                .and_then(|i| i.get_mut("1h"))
                .unwrap();
            entries[0].values.insert("value".to_string(), Some(41.2));
            entries[0].last_update = 1_700_000_000;
        }

        let rebuilt = rebuild(&users, &catalog, &previous);
        let entry = rebuilt.find("ETH/USDT", "1h", &spec).unwrap();
        assert_eq!(entry.values.get("value"), Some(&Some(41.2)));
        assert_eq!(entry.last_update, 1_700_000_000);
    }

    #[test]
    fn test_rebuild_drops_unreferenced_queries() {
        let catalog = catalog();
        let users = vec![user_with("1", rsi_alert(&catalog, &BTreeMap::new()))];
        let previous = rebuild(&users, &catalog, &Aggregate::new());

        // All alerts gone: the rebuilt aggregate weeds out unused queries.
        let rebuilt = rebuild(&[], &catalog, &previous);
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn test_rebuild_ignores_simple_alerts() {
        let catalog = catalog();
        let mut alerts = AlertsByPair::new();
        alerts.push(
            Pair::new("ETH", "USDT"),
            Alert::simple(Comparison::Above, 3000.0, None, Trigger::one_shot()).unwrap(),
        );
        let aggregate = rebuild(&[("1".to_string(), alerts)], &catalog, &Aggregate::new());
        assert!(aggregate.is_empty());
    }

    #[test]
    fn test_bulk_query_shape() {
        let catalog = catalog();
        let spec = QuerySpec::from_technical("MACD", &BTreeMap::new(), &catalog).unwrap();
        let query = spec.to_bulk_query();
        assert_eq!(query.get("indicator"), Some(&json!("macd")));
        assert_eq!(query.get("optInFastPeriod"), Some(&json!(12)));
        assert_eq!(query.get("optInSlowPeriod"), Some(&json!(26)));
    }

    #[tokio::test]
    async fn test_shared_aggregate_swap_and_load() {
        let shared = SharedAggregate::new(None);
        assert!(shared.load().await.is_empty());

        let catalog = catalog();
        let users = vec![user_with("1", rsi_alert(&catalog, &BTreeMap::new()))];
        let aggregate = rebuild(&users, &catalog, &Aggregate::new());
        shared.swap(aggregate.clone()).await;

        assert_eq!(*shared.load().await, aggregate);
    }
}
