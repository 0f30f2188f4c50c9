//! Error types for the evaluation core.

use pricebell_core::{AlertError, CatalogError, Comparison};
use pricebell_feeds::FeedError;
use pricebell_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("alert error: {0}")]
    Alert(#[from] AlertError),

    /// An alert references an indicator combination the aggregate does not
    /// know about. The builder and evaluator have diverged; this is raised,
    /// never swallowed.
    #[error("no aggregate entry matches {indicator} {interval} for {pair}")]
    DataConsistency {
        pair: String,
        indicator: String,
        interval: String,
    },

    #[error("{comparison} is not valid for technical alerts (ABOVE or BELOW only)")]
    InvalidTechnicalComparison { comparison: Comparison },

    #[error("{comparison} alert is missing its reference input")]
    MissingEntry { comparison: Comparison },
}

impl EngineError {
    /// Whether the error means "skip this alert this cycle" rather than
    /// "fail this user's sweep".
    pub fn is_skippable(&self) -> bool {
        matches!(self, EngineError::Feed(feed) if feed.is_transient())
    }
}
