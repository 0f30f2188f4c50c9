//! Alert processes: one shared sweep driver, one strategy per alert
//! category.
//!
//! A process runs forever in its own task: rate-limited full sweeps over the
//! whitelist, per-user load-evaluate-save under that user's lock, dispatch of
//! satisfied posts to the user's channels. A crash in one process never
//! stops the others; recoverable errors back off and resume.

use crate::aggregate::SharedAggregate;
use crate::error::EngineError;
use crate::evaluate::{evaluate_simple, evaluate_technical, Satisfaction};
use crate::notify::Notifier;
use async_trait::async_trait;
use pricebell_core::{unix_now, Alert, Comparison, IndicatorCatalog, Pair};
use pricebell_feeds::{PriceClient, RateLimit, RateLimiter};
use pricebell_store::{AlertStore, UserConfig, UserLocks};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Rolling window backing 24HRCHG alerts.
const CHANGE_WINDOW: &str = "1d";

/// Variant-specific evaluation plugged into the shared sweep driver.
#[async_trait]
pub trait AlertStrategy: Send + Sync {
    /// Short name for logs and admin messages.
    fn name(&self) -> &'static str;

    /// Header line prepended to every Telegram post.
    fn header(&self) -> &'static str;

    /// Whether this strategy evaluates the given alert.
    fn applies(&self, alert: &Alert) -> bool;

    async fn evaluate(
        &self,
        pair: &Pair,
        alert: &Alert,
    ) -> Result<Option<Satisfaction>, EngineError>;
}

/// Simple-price strategy: evaluates raw spot price and percent-change rules
/// against the live price feed.
pub struct SimpleStrategy {
    prices: Arc<PriceClient>,
}

impl SimpleStrategy {
    pub fn new(prices: Arc<PriceClient>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl AlertStrategy for SimpleStrategy {
    fn name(&self) -> &'static str {
        "cex"
    }

    fn header(&self) -> &'static str {
        "\u{1F514} <b>CEX ALERT:</b> \u{1F514}"
    }

    fn applies(&self, alert: &Alert) -> bool {
        alert.is_simple()
    }

    async fn evaluate(
        &self,
        pair: &Pair,
        alert: &Alert,
    ) -> Result<Option<Satisfaction>, EngineError> {
        let price = self.prices.get_price(pair).await?;
        let window_change = if alert.comparison == Comparison::Change24h {
            Some(self.prices.get_percent_change(pair, CHANGE_WINDOW).await?)
        } else {
            None
        };
        evaluate_simple(pair, alert, price, window_change)
    }
}

/// Technical strategy: evaluates indicator rules against the shared
/// aggregate snapshot maintained by the poller.
pub struct TechnicalStrategy {
    aggregate: SharedAggregate,
    catalog: Arc<IndicatorCatalog>,
}

impl TechnicalStrategy {
    pub fn new(aggregate: SharedAggregate, catalog: Arc<IndicatorCatalog>) -> Self {
        Self { aggregate, catalog }
    }
}

#[async_trait]
impl AlertStrategy for TechnicalStrategy {
    fn name(&self) -> &'static str {
        "technical"
    }

    fn header(&self) -> &'static str {
        "\u{1F514} <b>TECHNICAL ALERT:</b> \u{1F514}"
    }

    fn applies(&self, alert: &Alert) -> bool {
        alert.is_technical()
    }

    async fn evaluate(
        &self,
        pair: &Pair,
        alert: &Alert,
    ) -> Result<Option<Satisfaction>, EngineError> {
        let aggregate = self.aggregate.load().await;
        evaluate_technical(pair, alert, &aggregate, &self.catalog)
    }
}

/// Process tuning.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Minimum time between full sweeps (sleep-and-retry rate limit).
    pub poll_period: Duration,
    /// Backoff after a sweep-level failure.
    pub error_backoff: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(10),
            error_backoff: Duration::from_secs(15),
        }
    }
}

struct Post {
    pair: Pair,
    text: String,
}

/// The shared sweep driver.
pub struct AlertProcess<S> {
    store: Arc<dyn AlertStore>,
    locks: Arc<UserLocks>,
    notifier: Arc<dyn Notifier>,
    strategy: S,
    limiter: RateLimiter,
    config: ProcessConfig,
}

impl<S: AlertStrategy> AlertProcess<S> {
    pub fn new(
        store: Arc<dyn AlertStore>,
        locks: Arc<UserLocks>,
        notifier: Arc<dyn Notifier>,
        strategy: S,
        config: ProcessConfig,
    ) -> Self {
        let limiter = RateLimiter::new(RateLimit::per_period(config.poll_period));
        Self {
            store,
            locks,
            notifier,
            strategy,
            limiter,
            config,
        }
    }

    /// One full pass over a single user:
    /// 1. drop alerts satisfied last cycle (fire-then-delete),
    /// 2. evaluate the remaining alerts this strategy covers,
    /// 3. save once if anything changed,
    /// 4. dispatch satisfied posts to the user's channels.
    pub async fn poll_user_alerts(&self, user: &str) -> Result<(), EngineError> {
        let _guard = self.locks.lock(user).await;

        let mut alerts = self.store.load_alerts(user).await?;
        let config = self.store.load_config(user).await?;

        let mut changed = false;
        let mut posts: Vec<Post> = Vec::new();

        for (pair, list) in alerts.iter_mut() {
            let before = list.len();
            list.retain(|alert| !alert.alerted);
            if list.len() != before {
                changed = true;
            }

            for alert in list.iter_mut() {
                if !self.strategy.applies(alert) {
                    continue;
                }
                let now = unix_now();
                if !alert.trigger.ready(now) {
                    continue;
                }

                match self.strategy.evaluate(pair, alert).await {
                    Ok(Some(satisfaction)) => {
                        if alert.trigger.is_cooldown() {
                            alert.trigger.last_triggered = now;
                        } else {
                            alert.alerted = true;
                        }
                        changed = true;
                        posts.push(Post {
                            pair: pair.clone(),
                            text: satisfaction.post,
                        });
                    }
                    Ok(None) => {}
                    Err(e) if e.is_skippable() => {
                        warn!(user, %pair, error = %e, "skipping alert this cycle");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        alerts.prune_empty();

        if changed {
            self.store.save_alerts(user, &alerts).await?;
        }
        if !posts.is_empty() {
            self.dispatch(user, &config, &posts).await;
        }
        Ok(())
    }

    /// Deliver the user's satisfied posts. Channel failures are collected
    /// and reported; email is a best-effort mirror.
    async fn dispatch(&self, user: &str, config: &UserConfig, posts: &[Post]) {
        for post in posts {
            info!(user, post = %post.text, "alert satisfied");
            let mut text = format!(
                "{}\n{}\n\n<a href='{}'><b>View {} Chart</b></a>",
                self.strategy.header(),
                post.text,
                post.pair.chart_url(),
                post.pair,
            );
            let now = chrono::Utc::now();
            text.push_str(&format!("\n\u{23F0} {}", now.format("%Y-%m-%d %H:%M:%S UTC")));

            let mut failed = Vec::new();
            for channel in &config.channels {
                if let Err(e) = self.notifier.send_to_channel(channel, &text).await {
                    error!(user, channel, error = %e, "channel delivery failed");
                    failed.push(channel.clone());
                }
            }
            if !failed.is_empty() {
                warn!(
                    user,
                    post = %post.text,
                    failed = ?failed,
                    "failed to deliver alert to some channels"
                );
            }

            if config.settings.send_email_alerts && !config.emails.is_empty() {
                self.notifier
                    .send_email(&config.emails, &post.pair.to_string(), &post.text)
                    .await;
            }
        }
    }

    /// One rate-limited sweep over every whitelisted user. A failing user is
    /// logged and skipped; the sweep continues with the rest.
    pub async fn poll_all_alerts(&self) -> Result<(), EngineError> {
        self.limiter.acquire().await;
        for user in self.store.whitelist().await? {
            if let Err(e) = self.poll_user_alerts(&user).await {
                error!(
                    process = self.strategy.name(),
                    user,
                    error = %e,
                    "user sweep failed, continuing with next user"
                );
            }
        }
        Ok(())
    }

    /// Poll forever. Sweep-level failures are critical-logged, pushed to the
    /// admins and retried after a fixed backoff; the loop never terminates
    /// on its own.
    pub async fn run(&self) {
        warn!(process = self.strategy.name(), "alert process started");
        loop {
            if let Err(e) = self.poll_all_alerts().await {
                error!(
                    process = self.strategy.name(),
                    error = %e,
                    "sweep failed, backing off"
                );
                self.notifier
                    .alert_admins(&format!(
                        "A critical error occurred in the {} alert process \
                         (retrying in {} seconds): {e}",
                        self.strategy.name(),
                        self.config.error_backoff.as_secs(),
                    ))
                    .await;
                tokio::time::sleep(self.config.error_backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use pretty_assertions::assert_eq;
    use pricebell_core::{AlertsByPair, Trigger};
    use pricebell_store::StoreError;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory store for exercising the sweep driver.
    #[derive(Default)]
    struct MemoryStore {
        users: Mutex<HashMap<String, (UserConfig, AlertsByPair)>>,
        /// User whose alert document fails to load, simulating corrupt data.
        failing_user: Option<String>,
    }

    impl MemoryStore {
        async fn seed(&self, user: &str, config: UserConfig, alerts: AlertsByPair) {
            self.users
                .lock()
                .await
                .insert(user.to_string(), (config, alerts));
        }
    }

    #[async_trait]
    impl AlertStore for MemoryStore {
        async fn whitelist(&self) -> Result<Vec<String>, StoreError> {
            let mut users: Vec<String> = self.users.lock().await.keys().cloned().collect();
            users.sort();
            Ok(users)
        }

        async fn load_alerts(&self, user: &str) -> Result<AlertsByPair, StoreError> {
            if self.failing_user.as_deref() == Some(user) {
                return Err(StoreError::UnknownUser(user.to_string()));
            }
            self.users
                .lock()
                .await
                .get(user)
                .map(|(_, alerts)| alerts.clone())
                .ok_or_else(|| StoreError::UnknownUser(user.to_string()))
        }

        async fn save_alerts(&self, user: &str, alerts: &AlertsByPair) -> Result<(), StoreError> {
            let mut users = self.users.lock().await;
            let entry = users
                .get_mut(user)
                .ok_or_else(|| StoreError::UnknownUser(user.to_string()))?;
            entry.1 = alerts.clone();
            Ok(())
        }

        async fn load_config(&self, user: &str) -> Result<UserConfig, StoreError> {
            self.users
                .lock()
                .await
                .get(user)
                .map(|(config, _)| config.clone())
                .ok_or_else(|| StoreError::UnknownUser(user.to_string()))
        }

        async fn save_config(&self, user: &str, config: &UserConfig) -> Result<(), StoreError> {
            let mut users = self.users.lock().await;
            let entry = users
                .get_mut(user)
                .ok_or_else(|| StoreError::UnknownUser(user.to_string()))?;
            entry.0 = config.clone();
            Ok(())
        }

        async fn whitelist_user(&self, user: &str, is_admin: bool) -> Result<(), StoreError> {
            self.seed(user, UserConfig::new_for(user, is_admin), AlertsByPair::new())
                .await;
            Ok(())
        }

        async fn blacklist_user(&self, user: &str) -> Result<(), StoreError> {
            self.users.lock().await.remove(user);
            Ok(())
        }
    }

    /// Notifier that records deliveries and fails configured channels.
    #[derive(Default)]
    struct RecordingNotifier {
        failing_channels: Vec<String>,
        sent: Mutex<Vec<(String, String)>>,
        emails: Mutex<Vec<(Vec<String>, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
            if self.failing_channels.iter().any(|c| c == channel) {
                return Err(NotifyError("simulated failure".to_string()));
            }
            self.sent
                .lock()
                .await
                .push((channel.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_email(&self, recipients: &[String], _pair: &str, post: &str) {
            self.emails
                .lock()
                .await
                .push((recipients.to_vec(), post.to_string()));
        }

        async fn alert_admins(&self, _message: &str) {}
    }

    /// Strategy evaluating simple alerts against a fixed price.
    struct FixedPriceStrategy {
        price: f64,
    }

    #[async_trait]
    impl AlertStrategy for FixedPriceStrategy {
        fn name(&self) -> &'static str {
            "cex"
        }

        fn header(&self) -> &'static str {
            "\u{1F514} <b>CEX ALERT:</b> \u{1F514}"
        }

        fn applies(&self, alert: &Alert) -> bool {
            alert.is_simple()
        }

        async fn evaluate(
            &self,
            pair: &Pair,
            alert: &Alert,
        ) -> Result<Option<Satisfaction>, EngineError> {
            evaluate_simple(pair, alert, self.price, Some(0.0))
        }
    }

    fn process(
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        price: f64,
    ) -> AlertProcess<FixedPriceStrategy> {
        AlertProcess::new(
            store,
            Arc::new(UserLocks::new()),
            notifier,
            FixedPriceStrategy { price },
            ProcessConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fire_then_delete_lifecycle() {
        let store = Arc::new(MemoryStore::default());
        store.whitelist_user("1", false).await.unwrap();

        let mut alerts = AlertsByPair::new();
        let eth = Pair::new("ETH", "USDT");
        alerts.push(
            eth.clone(),
            Alert::simple(Comparison::Above, 3000.0, None, Trigger::one_shot()).unwrap(),
        );
        store.save_alerts("1", &alerts).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let process = process(store.clone(), notifier.clone(), 3100.0);

        // Cycle 1: the alert fires and is flagged, not yet removed.
        process.poll_user_alerts("1").await.unwrap();
        let after_first = store.load_alerts("1").await.unwrap();
        assert_eq!(after_first.get(&eth).unwrap().len(), 1);
        assert!(after_first.get(&eth).unwrap()[0].alerted);

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "1");
        assert!(sent[0].1.contains("ETH/USDT ABOVE 3000 TARGET AT 3100"));
        drop(sent);

        // Cycle 2: the flagged alert is removed and the pair key with it.
        process.poll_user_alerts("1").await.unwrap();
        let after_second = store.load_alerts("1").await.unwrap();
        assert!(after_second.get(&eth).is_none());
        assert!(after_second.is_empty());

        // No duplicate post on the second cycle.
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_rearms_instead_of_deleting() {
        let store = Arc::new(MemoryStore::default());
        store.whitelist_user("1", false).await.unwrap();

        let mut alerts = AlertsByPair::new();
        let eth = Pair::new("ETH", "USDT");
        alerts.push(
            eth.clone(),
            Alert::simple(
                Comparison::Above,
                3000.0,
                None,
                Trigger::with_cooldown("1h").unwrap(),
            )
            .unwrap(),
        );
        store.save_alerts("1", &alerts).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let process = process(store.clone(), notifier.clone(), 3100.0);

        process.poll_user_alerts("1").await.unwrap();
        let after_first = store.load_alerts("1").await.unwrap();
        let alert = &after_first.get(&eth).unwrap()[0];
        assert!(!alert.alerted);
        assert!(alert.trigger.last_triggered > 0);

        // Still satisfied, but suppressed while the cooldown runs.
        process.poll_user_alerts("1").await.unwrap();
        let after_second = store.load_alerts("1").await.unwrap();
        assert_eq!(after_second.get(&eth).unwrap().len(), 1);
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_block_others() {
        let store = Arc::new(MemoryStore::default());
        store.whitelist_user("1", false).await.unwrap();

        let mut config = store.load_config("1").await.unwrap();
        config.channels = vec!["bad".to_string(), "good".to_string()];
        store.save_config("1", &config).await.unwrap();

        let mut alerts = AlertsByPair::new();
        alerts.push(
            Pair::new("ETH", "USDT"),
            Alert::simple(Comparison::Above, 3000.0, None, Trigger::one_shot()).unwrap(),
        );
        store.save_alerts("1", &alerts).await.unwrap();

        let notifier = Arc::new(RecordingNotifier {
            failing_channels: vec!["bad".to_string()],
            ..Default::default()
        });
        let process = process(store.clone(), notifier.clone(), 3100.0);
        process.poll_user_alerts("1").await.unwrap();

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "good");
    }

    #[tokio::test]
    async fn test_email_mirrors_post_when_enabled() {
        let store = Arc::new(MemoryStore::default());
        store.whitelist_user("1", false).await.unwrap();

        let mut config = store.load_config("1").await.unwrap();
        config.settings.send_email_alerts = true;
        config.emails = vec!["alerts@example.com".to_string()];
        store.save_config("1", &config).await.unwrap();

        let mut alerts = AlertsByPair::new();
        alerts.push(
            Pair::new("ETH", "USDT"),
            Alert::simple(Comparison::Above, 3000.0, None, Trigger::one_shot()).unwrap(),
        );
        store.save_alerts("1", &alerts).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let process = process(store.clone(), notifier.clone(), 3100.0);
        process.poll_user_alerts("1").await.unwrap();

        let emails = notifier.emails.lock().await;
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, vec!["alerts@example.com"]);
    }

    #[tokio::test]
    async fn test_unsatisfied_alert_is_untouched() {
        let store = Arc::new(MemoryStore::default());
        store.whitelist_user("1", false).await.unwrap();

        let mut alerts = AlertsByPair::new();
        let eth = Pair::new("ETH", "USDT");
        alerts.push(
            eth.clone(),
            Alert::simple(Comparison::Above, 3000.0, None, Trigger::one_shot()).unwrap(),
        );
        store.save_alerts("1", &alerts).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let process = process(store.clone(), notifier.clone(), 2900.0);
        process.poll_user_alerts("1").await.unwrap();

        let after = store.load_alerts("1").await.unwrap();
        assert!(!after.get(&eth).unwrap()[0].alerted);
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_skips_failing_user() {
        // User "1" has corrupt alert data; user "2" must still be swept.
        let store = Arc::new(MemoryStore {
            failing_user: Some("1".to_string()),
            ..Default::default()
        });
        store.whitelist_user("1", false).await.unwrap();
        store.whitelist_user("2", false).await.unwrap();

        let mut alerts = AlertsByPair::new();
        alerts.push(
            Pair::new("ETH", "USDT"),
            Alert::simple(Comparison::Above, 3000.0, None, Trigger::one_shot()).unwrap(),
        );
        store.save_alerts("2", &alerts).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let process = process(store.clone(), notifier.clone(), 3100.0);
        process.poll_all_alerts().await.unwrap();

        assert_eq!(notifier.sent.lock().await.len(), 1);
        assert_eq!(notifier.sent.lock().await[0].0, "2");
    }
}
