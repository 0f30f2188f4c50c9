//! JSON-file store: one directory per whitelisted user.
//!
//! Layout under the store root:
//!
//! ```text
//! whitelist/
//!   <user_id>/
//!     config.json
//!     alerts.json
//! ```

use crate::config::UserConfig;
use crate::store::{AlertStore, StoreError, UserId};
use async_trait::async_trait;
use pricebell_core::AlertsByPair;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-backed alert store.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_dir(&self, user: &str) -> PathBuf {
        self.root.join(user)
    }

    fn config_path(&self, user: &str) -> PathBuf {
        self.user_dir(user).join("config.json")
    }

    fn alerts_path(&self, user: &str) -> PathBuf {
        self.user_dir(user).join("alerts.json")
    }

    async fn ensure_root(&self) -> Result<(), StoreError> {
        if fs::metadata(&self.root).await.is_err() {
            fs::create_dir_all(&self.root).await?;
        }
        Ok(())
    }

    async fn read_document<T: serde::de::DeserializeOwned>(
        &self,
        user: &str,
        path: &Path,
    ) -> Result<T, StoreError> {
        if fs::metadata(self.user_dir(user)).await.is_err() {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        let raw = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_document<T: serde::Serialize>(
        &self,
        user: &str,
        path: &Path,
        value: &T,
    ) -> Result<(), StoreError> {
        if fs::metadata(self.user_dir(user)).await.is_err() {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        fs::write(path, serde_json::to_string_pretty(value)?).await?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for JsonStore {
    async fn whitelist(&self) -> Result<Vec<UserId>, StoreError> {
        self.ensure_root().await?;
        let mut users = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                users.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        users.sort();
        Ok(users)
    }

    async fn load_alerts(&self, user: &str) -> Result<AlertsByPair, StoreError> {
        self.read_document(user, &self.alerts_path(user)).await
    }

    async fn save_alerts(&self, user: &str, alerts: &AlertsByPair) -> Result<(), StoreError> {
        self.write_document(user, &self.alerts_path(user), alerts)
            .await
    }

    async fn load_config(&self, user: &str) -> Result<UserConfig, StoreError> {
        self.read_document(user, &self.config_path(user)).await
    }

    async fn save_config(&self, user: &str, config: &UserConfig) -> Result<(), StoreError> {
        self.write_document(user, &self.config_path(user), config)
            .await
    }

    async fn whitelist_user(&self, user: &str, is_admin: bool) -> Result<(), StoreError> {
        self.ensure_root().await?;
        let dir = self.user_dir(user);
        if fs::metadata(&dir).await.is_ok() {
            return Err(StoreError::AlreadyWhitelisted(user.to_string()));
        }
        fs::create_dir_all(&dir).await?;

        let seeded: Result<(), StoreError> = async {
            self.save_config(user, &UserConfig::new_for(user, is_admin))
                .await?;
            self.save_alerts(user, &AlertsByPair::new()).await?;
            Ok(())
        }
        .await;

        // Do not leave a half-seeded user directory behind.
        if seeded.is_err() {
            let _ = fs::remove_dir_all(&dir).await;
        }
        seeded
    }

    async fn blacklist_user(&self, user: &str) -> Result<(), StoreError> {
        let dir = self.user_dir(user);
        if fs::metadata(&dir).await.is_err() {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}
