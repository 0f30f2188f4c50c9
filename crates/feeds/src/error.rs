//! Error types for feed operations.

use thiserror::Error;

/// Errors that can occur while talking to external feeds.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transient failures exhausted the retry budget. Callers skip the
    /// affected item for the current cycle; the sweep itself continues.
    #[error("upstream unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },

    /// The upstream answered with a shape we do not understand. Fatal for
    /// the current poll cycle.
    #[error("malformed response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },

    #[error("unsupported price window '{0}'")]
    UnsupportedWindow(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FeedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FeedError::UpstreamUnavailable { .. })
    }
}
