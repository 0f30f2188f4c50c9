//! Notifier collaborator seam.
//!
//! The engine formats posts and decides who gets them; actual delivery
//! (Telegram sends, email rendering) lives behind this trait so the
//! processes can be exercised without a network.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Delivery collaborator invoked with finished alert text.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one post to one channel. The sweep driver calls this per
    /// channel and collects failures, so one channel's failure never blocks
    /// delivery to the others.
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotifyError>;

    /// Best-effort email mirror of a post. Failures are logged by the
    /// implementation, never surfaced to the cycle.
    async fn send_email(&self, recipients: &[String], pair: &str, post: &str);

    /// Push a message to every admin user, best effort.
    async fn alert_admins(&self, message: &str);
}
