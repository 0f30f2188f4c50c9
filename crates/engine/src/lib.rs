//! Alert evaluation and aggregation core.
//!
//! Three long-running pieces live here: the aggregate builder + indicator
//! poller (one cycle feeding a shared aggregate snapshot), and one alert
//! process per alert category (simple-price and technical) built on a shared
//! sweep driver. They communicate only through the alert store and the
//! aggregate snapshot; each owns its rate limiter and survives its own
//! failures.

pub mod aggregate;
pub mod error;
pub mod evaluate;
pub mod notify;
pub mod poller;
pub mod process;

pub use aggregate::{
    collect_user_alerts, rebuild, Aggregate, QueryEntry, QuerySpec, SharedAggregate,
};
pub use error::EngineError;
pub use evaluate::{evaluate_simple, evaluate_technical, Satisfaction};
pub use notify::{Notifier, NotifyError};
pub use poller::{IndicatorPoller, PollerConfig};
pub use process::{AlertProcess, AlertStrategy, ProcessConfig, SimpleStrategy, TechnicalStrategy};
