//! Indicator poller: the continuous rebuild-fetch-swap cycle feeding the
//! shared aggregate.

use crate::aggregate::{collect_user_alerts, rebuild, SharedAggregate};
use crate::error::EngineError;
use crate::notify::Notifier;
use pricebell_core::{unix_now, IndicatorCatalog};
use pricebell_feeds::{FeedError, IndicatorClient};
use pricebell_store::AlertStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Sleep when no technical alerts are registered anywhere, so the loop
    /// idles instead of spinning.
    pub idle_delay: Duration,
    /// Backoff after a cycle-level failure.
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(500),
            error_backoff: Duration::from_secs(15),
        }
    }
}

/// Runs the aggregate cycle forever: rebuild from all users' alerts, bulk
/// fetch per (symbol, interval) group under the indicator API's rate limit,
/// write values back, swap the shared snapshot.
pub struct IndicatorPoller {
    store: Arc<dyn AlertStore>,
    catalog: Arc<IndicatorCatalog>,
    client: IndicatorClient,
    aggregate: SharedAggregate,
    notifier: Arc<dyn Notifier>,
    config: PollerConfig,
}

impl IndicatorPoller {
    pub fn new(
        store: Arc<dyn AlertStore>,
        catalog: Arc<IndicatorCatalog>,
        client: IndicatorClient,
        aggregate: SharedAggregate,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            client,
            aggregate,
            notifier,
            config,
        }
    }

    /// One full aggregate cycle. Any error leaves the previous snapshot in
    /// place: a failed fetch must never surface half-updated values.
    async fn cycle(&self) -> Result<(), EngineError> {
        let started = Instant::now();

        let users = collect_user_alerts(self.store.as_ref()).await?;
        let previous = self.aggregate.load().await;
        let mut aggregate = rebuild(&users, &self.catalog, &previous);

        if aggregate.is_empty() {
            self.aggregate.swap(aggregate).await;
            tokio::time::sleep(self.config.idle_delay).await;
            return Ok(());
        }

        let mut fetched = 0usize;
        for (symbol, intervals) in aggregate.groups.iter_mut() {
            for (interval, entries) in intervals.iter_mut() {
                if entries.is_empty() {
                    continue;
                }
                let queries: Vec<Value> =
                    entries.iter().map(|e| e.spec.to_bulk_query()).collect();
                let results = self.client.bulk(symbol, interval, &queries).await?;

                let now = unix_now();
                for (entry, result) in entries.iter_mut().zip(results) {
                    for (variable, slot) in entry.values.iter_mut() {
                        match result.get(variable).and_then(Value::as_f64) {
                            Some(value) => *slot = Some(value),
                            None => {
                                return Err(FeedError::MalformedResponse {
                                    endpoint: format!("{symbol} {interval}"),
                                    detail: format!(
                                        "missing output '{variable}' for {}",
                                        entry.spec.indicator
                                    ),
                                }
                                .into())
                            }
                        }
                    }
                    entry.last_update = now;
                    fetched += 1;
                }
            }
        }

        self.aggregate.swap(aggregate).await;
        info!(
            queries = fetched,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indicator aggregate refreshed"
        );
        Ok(())
    }

    /// Poll forever. A failed cycle is critical-logged, reported to admins
    /// and retried after a fixed backoff.
    pub async fn run(&self) {
        warn!("indicator poller started");
        loop {
            if let Err(e) = self.cycle().await {
                error!(error = %e, "indicator poll cycle failed, backing off");
                self.notifier
                    .alert_admins(&format!(
                        "A critical error occurred in the indicator poller \
                         (retrying in {} seconds): {e}",
                        self.config.error_backoff.as_secs(),
                    ))
                    .await;
                tokio::time::sleep(self.config.error_backoff).await;
            }
        }
    }
}
