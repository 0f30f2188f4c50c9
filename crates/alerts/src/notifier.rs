//! Telegram/email implementation of the engine's notifier seam.

use crate::email::EmailClient;
use async_trait::async_trait;
use pricebell_engine::{Notifier, NotifyError};
use pricebell_store::{admin_ids, AlertStore};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

/// Delivers finished alert text over Telegram, mirrors it to email when
/// configured, and broadcasts critical failures to admin users.
pub struct AlertNotifier {
    bot: Bot,
    store: Arc<dyn AlertStore>,
    email: Option<EmailClient>,
}

impl AlertNotifier {
    pub fn new(bot: Bot, store: Arc<dyn AlertStore>, email: Option<EmailClient>) -> Self {
        Self { bot, store, email }
    }

    fn chat_id(channel: &str) -> Result<ChatId, NotifyError> {
        channel
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| NotifyError(format!("invalid chat id '{channel}'")))
    }
}

#[async_trait]
impl Notifier for AlertNotifier {
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        self.bot
            .send_message(Self::chat_id(channel)?, text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }

    async fn send_email(&self, recipients: &[String], pair: &str, post: &str) {
        let Some(client) = &self.email else {
            warn!("email alerts requested but no email credentials are configured");
            return;
        };
        let chart_url = match pair.parse::<pricebell_core::Pair>() {
            Ok(parsed) => parsed.chart_url(),
            Err(_) => String::new(),
        };
        if let Err(e) = client.send_alert(recipients, pair, post, &chart_url).await {
            warn!(recipients = ?recipients, error = %e, "could not send alert email");
        }
    }

    async fn alert_admins(&self, message: &str) {
        let admins = match admin_ids(self.store.as_ref()).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!(error = %e, "could not load admin list");
                return;
            }
        };
        for admin in admins {
            let chat_id = match Self::chat_id(&admin) {
                Ok(chat_id) => chat_id,
                Err(e) => {
                    warn!(admin, error = %e, "skipping admin with invalid chat id");
                    continue;
                }
            };
            if let Err(e) = self.bot.send_message(chat_id, message).await {
                warn!(admin, error = %e, "could not alert admin");
            }
        }
    }
}
