//! Rate-limited HTTP clients for the external market-data feeds.
//!
//! Two collaborators live here: the spot-price feed (exchange ticker REST
//! API) and the technical-indicator feed (bulk indicator API). Both own a
//! process-wide token-bucket limiter because upstream quotas are shared
//! across all bot users.

pub mod error;
pub mod indicator;
pub mod limiter;
pub mod price;

pub use error::FeedError;
pub use indicator::{IndicatorClient, IndicatorClientConfig};
pub use limiter::{RateLimit, RateLimiter};
pub use price::{PriceClient, PriceClientConfig, Ticker};
