//! SQLite store: one document row per whitelisted user.
//!
//! Config and alerts are kept as JSON text columns, so the documents have the
//! same shape as the file backend and alert order survives round-trips (a
//! JSON array is ordered).

use crate::config::UserConfig;
use crate::store::{AlertStore, StoreError, UserId};
use async_trait::async_trait;
use pricebell_core::AlertsByPair;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Database-backed alert store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database at the given URL (e.g. `sqlite://pricebell.db`
    /// or `sqlite::memory:`), creating it and the schema if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                config TEXT NOT NULL,
                alerts TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_column(&self, user: &str, column: &str) -> Result<String, StoreError> {
        // Column name comes from this module only, never from input.
        let query = format!("SELECT {column} FROM users WHERE user_id = ?");
        sqlx::query_scalar::<_, String>(&query)
            .bind(user)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::UnknownUser(user.to_string()))
    }

    async fn save_column(&self, user: &str, column: &str, value: &str) -> Result<(), StoreError> {
        let query = format!("UPDATE users SET {column} = ? WHERE user_id = ?");
        let result = sqlx::query(&query)
            .bind(value)
            .bind(user)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn whitelist(&self) -> Result<Vec<UserId>, StoreError> {
        let users = sqlx::query_scalar::<_, String>("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn load_alerts(&self, user: &str) -> Result<AlertsByPair, StoreError> {
        let raw = self.load_column(user, "alerts").await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save_alerts(&self, user: &str, alerts: &AlertsByPair) -> Result<(), StoreError> {
        self.save_column(user, "alerts", &serde_json::to_string(alerts)?)
            .await
    }

    async fn load_config(&self, user: &str) -> Result<UserConfig, StoreError> {
        let raw = self.load_column(user, "config").await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save_config(&self, user: &str, config: &UserConfig) -> Result<(), StoreError> {
        self.save_column(user, "config", &serde_json::to_string(config)?)
            .await
    }

    async fn whitelist_user(&self, user: &str, is_admin: bool) -> Result<(), StoreError> {
        let config = serde_json::to_string(&UserConfig::new_for(user, is_admin))?;
        let alerts = serde_json::to_string(&AlertsByPair::new())?;
        let result = sqlx::query(
            "INSERT INTO users (user_id, config, alerts) VALUES (?, ?, ?) \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user)
        .bind(&config)
        .bind(&alerts)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyWhitelisted(user.to_string()));
        }
        Ok(())
    }

    async fn blacklist_user(&self, user: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        Ok(())
    }
}
