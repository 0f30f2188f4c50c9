//! Per-user configuration and alert persistence.
//!
//! One `AlertStore` interface, two interchangeable backends selected at
//! construction: a directory of per-user JSON documents and a SQLite
//! database holding one document row per user.

pub mod config;
pub mod json;
pub mod locks;
pub mod sqlite;
pub mod store;

pub use config::{UserConfig, UserSettings};
pub use json::JsonStore;
pub use locks::UserLocks;
pub use sqlite::SqliteStore;
pub use store::{admin_ids, AlertStore, StoreError, UserId};
