//! The `AlertStore` seam between the polling processes, the command layer
//! and persistence.

use crate::config::UserConfig;
use async_trait::async_trait;
use pricebell_core::AlertsByPair;
use thiserror::Error;
use tracing::warn;

/// Telegram user id, as the bot receives it.
pub type UserId = String;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {0} is not whitelisted")]
    UnknownUser(String),
    #[error("user {0} is already whitelisted")]
    AlreadyWhitelisted(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt document: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence for per-user configuration and alerts.
///
/// A failure on one user's data is scoped to that user: sweeps log it and
/// move on to the next user, they never abort the whole pass.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Ids of every whitelisted user.
    async fn whitelist(&self) -> Result<Vec<UserId>, StoreError>;

    async fn load_alerts(&self, user: &str) -> Result<AlertsByPair, StoreError>;

    /// Persist a user's alerts. Pair and alert order must survive the
    /// round-trip.
    async fn save_alerts(&self, user: &str, alerts: &AlertsByPair) -> Result<(), StoreError>;

    async fn load_config(&self, user: &str) -> Result<UserConfig, StoreError>;

    async fn save_config(&self, user: &str, config: &UserConfig) -> Result<(), StoreError>;

    /// Register a user with a default configuration and an empty alert set.
    async fn whitelist_user(&self, user: &str, is_admin: bool) -> Result<(), StoreError>;

    /// Remove a user and everything they own.
    async fn blacklist_user(&self, user: &str) -> Result<(), StoreError>;
}

/// Ids of all admin users. Unreadable users are skipped with a warning, in
/// line with the per-user failure scope.
pub async fn admin_ids(store: &dyn AlertStore) -> Result<Vec<UserId>, StoreError> {
    let mut admins = Vec::new();
    for user in store.whitelist().await? {
        match store.load_config(&user).await {
            Ok(config) if config.is_admin => admins.push(user),
            Ok(_) => {}
            Err(e) => warn!(user, error = %e, "skipping unreadable user config"),
        }
    }
    Ok(admins)
}
