//! Telegram bot command handlers.
//!
//! Thin I/O layer over the store and feeds: parses commands, enforces the
//! whitelist and admin gates, and mutates per-user records under the same
//! per-user locks the evaluator sweeps use.

use crate::commands::{self, ListEdit, NewAlert};
use pricebell_core::{Alert, Comparison, IndicatorCatalog, Pair};
use pricebell_feeds::PriceClient;
use pricebell_store::{admin_ids, AlertStore, StoreError, UserLocks};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Show your current configuration")]
    Start,
    #[command(description = "Create an alert. Simple: /newalert ETH/USDT ABOVE 3000 [COOLDOWN]. \
                             Technical: /newalert ETH/USDT RSI 1h default value BELOW 30 [COOLDOWN]")]
    NewAlert(String),
    #[command(description = "Cancel an alert by index. Usage: /cancelalert ETH/USDT 1")]
    CancelAlert(String),
    #[command(description = "List your alerts. Usage: /viewalerts [PAIR]")]
    ViewAlerts(String),
    #[command(description = "Latest pair price. Usage: /price ETH/USDT")]
    Price(String),
    #[command(description = "List supported technical indicators")]
    Indicators,
    #[command(description = "Show one indicator's parameters. Usage: /indicator RSI")]
    Indicator(String),
    #[command(description = "Show your configuration")]
    ViewConfig,
    #[command(description = "Manage alert channels. Usage: /channels add|remove 123,-456")]
    Channels(String),
    #[command(description = "Manage alert emails. Usage: /emails add|remove you@example.com")]
    Emails(String),
    #[command(description = "Toggle email alerts. Usage: /setemail on|off")]
    SetEmail(String),
    #[command(description = "Whitelist or remove a user (admin). Usage: /whitelist add|remove USER_ID")]
    Whitelist(String),
    #[command(description = "List admin users (admin)")]
    Admins,
    #[command(description = "Show help")]
    Help,
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    store: Arc<dyn AlertStore>,
    locks: Arc<UserLocks>,
    catalog: Arc<IndicatorCatalog>,
    prices: Arc<PriceClient>,
    /// Cap on active alerts per user.
    max_alerts_per_user: usize,
    /// False when no indicator API key is configured.
    technical_enabled: bool,
    /// False when no email credentials are configured.
    email_available: bool,
}

impl TelegramBot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token: &str,
        store: Arc<dyn AlertStore>,
        locks: Arc<UserLocks>,
        catalog: Arc<IndicatorCatalog>,
        prices: Arc<PriceClient>,
        max_alerts_per_user: usize,
        technical_enabled: bool,
        email_available: bool,
    ) -> Self {
        Self {
            bot: Bot::new(token),
            store,
            locks,
            catalog,
            prices,
            max_alerts_per_user,
            technical_enabled,
            email_available,
        }
    }

    /// The underlying bot, for constructing the notifier.
    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Run the command dispatcher. Blocks until the process is interrupted.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.handle_command(bot, msg, cmd).await }
            },
        );

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let Some(user) = msg.from.as_ref() else {
            return Ok(());
        };
        let user_id = user.id.to_string();

        if !self.store.whitelist().await?.contains(&user_id) {
            bot.send_message(msg.chat.id, "You are not whitelisted to use this bot.")
                .await?;
            return Ok(());
        }

        let reply = match cmd {
            Command::Start | Command::ViewConfig => self.view_config(&user_id).await?,
            Command::NewAlert(args) => self.new_alert(&user_id, &args).await?,
            Command::CancelAlert(args) => self.cancel_alert(&user_id, &args).await?,
            Command::ViewAlerts(args) => self.view_alerts(&user_id, &args).await?,
            Command::Price(args) => self.price(&args).await,
            Command::Indicators => self.list_indicators(),
            Command::Indicator(args) => self.show_indicator(&args),
            Command::Channels(args) => self.edit_channels(&user_id, &args).await?,
            Command::Emails(args) => self.edit_emails(&user_id, &args).await?,
            Command::SetEmail(args) => self.set_email(&user_id, &args).await?,
            Command::Whitelist(args) => self.edit_whitelist(&user_id, &args).await?,
            Command::Admins => self.list_admins(&user_id).await?,
            Command::Help => Command::descriptions().to_string(),
        };

        bot.send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn new_alert(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        let parsed = match commands::parse_new_alert(args) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(format!("An error occurred:\n{e}")),
        };

        let _guard = self.locks.lock(user_id).await;
        let mut alerts = self.store.load_alerts(user_id).await?;
        if alerts.total() >= self.max_alerts_per_user {
            return Ok(format!(
                "Maximum active alerts reached ({})",
                self.max_alerts_per_user
            ));
        }

        let (pair, alert) = match parsed {
            NewAlert::Simple {
                pair,
                comparison,
                target,
                trigger,
            } => {
                // PCTCHG tracks movement from the price at creation time.
                let entry = if comparison == Comparison::PctChg {
                    match self.prices.get_price(&pair).await {
                        Ok(price) => Some(price),
                        Err(e) => {
                            return Ok(format!(
                                "Could not fetch the current {pair} price: {e}\n\
                                 Please verify that your pair is listed on the exchange."
                            ))
                        }
                    }
                } else {
                    None
                };
                match Alert::simple(comparison, target, entry, trigger) {
                    Ok(alert) => (pair, alert),
                    Err(e) => return Ok(format!("An error occurred:\n{e}")),
                }
            }
            NewAlert::Technical {
                pair,
                indicator,
                interval,
                params,
                output_value,
                comparison,
                target,
                trigger,
            } => {
                if !self.technical_enabled {
                    return Ok(
                        "Technical alerts are disabled: no indicator API key is configured."
                            .to_string(),
                    );
                }
                match Alert::technical(
                    &self.catalog,
                    &indicator,
                    &interval,
                    &params,
                    &output_value,
                    comparison,
                    target,
                    trigger,
                ) {
                    Ok(alert) => (pair, alert),
                    Err(e) => return Ok(format!("An error occurred:\n{e}")),
                }
            }
        };

        info!(user = user_id, %pair, alert = %alert.describe(), "alert registered");
        alerts.push(pair, alert);
        self.store.save_alerts(user_id, &alerts).await?;
        Ok("Successfully activated new alert!".to_string())
    }

    async fn cancel_alert(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        let (pair, index) = match commands::parse_cancel_alert(args) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(format!("An error occurred:\n{e}")),
        };

        let _guard = self.locks.lock(user_id).await;
        let mut alerts = self.store.load_alerts(user_id).await?;
        let Some(removed) = alerts.remove(&pair, index) else {
            return Ok(format!("No {pair} alert found at index {index}."));
        };
        let all_removed = alerts.get(&pair).is_none();
        self.store.save_alerts(user_id, &alerts).await?;

        Ok(format!(
            "Successfully canceled {pair} alert:\n{}{}",
            removed.describe(),
            if all_removed {
                format!(" (all alerts canceled for {pair})")
            } else {
                String::new()
            }
        ))
    }

    async fn view_alerts(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        let filter: Option<Pair> = match args.split_whitespace().next() {
            Some(token) => match token.parse() {
                Ok(pair) => Some(pair),
                Err(e) => return Ok(format!("An error occurred:\n{e}")),
            },
            None => None,
        };

        let alerts = self.store.load_alerts(user_id).await?;
        let mut lines = Vec::new();
        for (pair, list) in alerts.iter() {
            if let Some(filter) = &filter {
                if pair != filter {
                    continue;
                }
            }
            lines.push(format!("<b>{pair}</b>"));
            for (position, alert) in list.iter().enumerate() {
                lines.push(format!("  {}. {}", position + 1, alert.describe()));
            }
        }

        if lines.is_empty() {
            Ok("No active alerts.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }

    async fn price(&self, args: &str) -> String {
        let pair: Pair = match args.split_whitespace().next().unwrap_or("").parse() {
            Ok(pair) => pair,
            Err(e) => return format!("An error occurred:\n{e}"),
        };
        match self.prices.get_price(&pair).await {
            Ok(price) => format!("{pair}: {price}"),
            Err(e) => format!("Could not fetch the {pair} price: {e}"),
        }
    }

    fn list_indicators(&self) -> String {
        let mut lines = vec!["<b>Supported indicators:</b>".to_string()];
        for id in self.catalog.ids() {
            if let Ok(spec) = self.catalog.get(id) {
                lines.push(format!("{id} - {}", spec.name));
            }
        }
        lines.push("\nUse /indicator ID for parameters.".to_string());
        lines.join("\n")
    }

    fn show_indicator(&self, args: &str) -> String {
        let id = args.split_whitespace().next().unwrap_or("");
        let spec = match self.catalog.get(id) {
            Ok(spec) => spec,
            Err(e) => return format!("An error occurred:\n{e}"),
        };

        let mut lines = vec![
            format!("<b>{} ({})</b>", spec.name, id.to_uppercase()),
            format!("Reference: {}", spec.reference),
            "Parameters:".to_string(),
        ];
        for param in &spec.params {
            let default = param
                .default
                .as_ref()
                .map(|d| format!(" (default {d})"))
                .unwrap_or_else(|| " (required)".to_string());
            lines.push(format!("  {} - {}{default}", param.id, param.description));
        }
        lines.push(format!("Outputs: {}", spec.output.join(", ")));
        lines.join("\n")
    }

    async fn view_config(&self, user_id: &str) -> Result<String, TelegramError> {
        let config = self.store.load_config(user_id).await?;
        let alerts = self.store.load_alerts(user_id).await?;
        Ok(format!(
            "<b>Current Configuration</b>\n\n\
             Active alerts: {}/{}\n\
             Channels: {}\n\
             Emails: {}\n\
             Email alerts: {}\n\
             Admin: {}",
            alerts.total(),
            self.max_alerts_per_user,
            config.channels.join(", "),
            if config.emails.is_empty() {
                "none".to_string()
            } else {
                config.emails.join(", ")
            },
            if config.settings.send_email_alerts {
                "on"
            } else {
                "off"
            },
            if config.is_admin { "yes" } else { "no" },
        ))
    }

    async fn edit_channels(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        let edit = match commands::parse_list_edit(args, "/channels add|remove 123,-456") {
            Ok(edit) => edit,
            Err(e) => return Ok(format!("An error occurred:\n{e}")),
        };

        let _guard = self.locks.lock(user_id).await;
        let mut config = self.store.load_config(user_id).await?;
        let reply = match edit {
            ListEdit::Add(channels) => {
                config.add_channels(&channels);
                format!("Channels now: {}", config.channels.join(", "))
            }
            ListEdit::Remove(channels) => {
                let missing = config.remove_channels(&channels);
                if missing.is_empty() {
                    format!("Channels now: {}", config.channels.join(", "))
                } else {
                    format!("Not registered: {}", missing.join(", "))
                }
            }
        };
        self.store.save_config(user_id, &config).await?;
        Ok(reply)
    }

    async fn edit_emails(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        let edit = match commands::parse_list_edit(args, "/emails add|remove you@example.com") {
            Ok(edit) => edit,
            Err(e) => return Ok(format!("An error occurred:\n{e}")),
        };

        let _guard = self.locks.lock(user_id).await;
        let mut config = self.store.load_config(user_id).await?;
        let reply = match edit {
            ListEdit::Add(emails) => {
                config.add_emails(&emails);
                format!(
                    "Emails now: {}",
                    if config.emails.is_empty() {
                        "none".to_string()
                    } else {
                        config.emails.join(", ")
                    }
                )
            }
            ListEdit::Remove(emails) => {
                let missing = config.remove_emails(&emails);
                if missing.is_empty() {
                    format!(
                        "Emails now: {}",
                        if config.emails.is_empty() {
                            "none".to_string()
                        } else {
                            config.emails.join(", ")
                        }
                    )
                } else {
                    format!("Not registered: {}", missing.join(", "))
                }
            }
        };
        self.store.save_config(user_id, &config).await?;
        Ok(reply)
    }

    async fn set_email(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        let enable = match args.trim().to_lowercase().as_str() {
            "on" => true,
            "off" => false,
            _ => return Ok("Usage: /setemail on|off".to_string()),
        };
        if enable && !self.email_available {
            return Ok("Email alerts are not configured on this bot.".to_string());
        }

        let _guard = self.locks.lock(user_id).await;
        let mut config = self.store.load_config(user_id).await?;
        config.settings.send_email_alerts = enable;
        self.store.save_config(user_id, &config).await?;
        Ok(format!(
            "Email alerts {}",
            if enable { "enabled" } else { "disabled" }
        ))
    }

    async fn require_admin(&self, user_id: &str) -> Result<bool, TelegramError> {
        Ok(self.store.load_config(user_id).await?.is_admin)
    }

    async fn edit_whitelist(&self, user_id: &str, args: &str) -> Result<String, TelegramError> {
        if !self.require_admin(user_id).await? {
            return Ok("This command is restricted to admins.".to_string());
        }
        let edit = match commands::parse_list_edit(args, "/whitelist add|remove USER_ID") {
            Ok(edit) => edit,
            Err(e) => return Ok(format!("An error occurred:\n{e}")),
        };

        let mut replies = Vec::new();
        match edit {
            ListEdit::Add(users) => {
                for user in users {
                    match self.store.whitelist_user(&user, false).await {
                        Ok(()) => replies.push(format!("Whitelisted {user}")),
                        Err(e) => replies.push(format!("Could not whitelist {user}: {e}")),
                    }
                }
            }
            ListEdit::Remove(users) => {
                for user in users {
                    match self.store.blacklist_user(&user).await {
                        Ok(()) => replies.push(format!("Removed {user}")),
                        Err(e) => replies.push(format!("Could not remove {user}: {e}")),
                    }
                }
            }
        }
        Ok(replies.join("\n"))
    }

    async fn list_admins(&self, user_id: &str) -> Result<String, TelegramError> {
        if !self.require_admin(user_id).await? {
            return Ok("This command is restricted to admins.".to_string());
        }
        let admins = admin_ids(self.store.as_ref()).await?;
        Ok(format!("Admins: {}", admins.join(", ")))
    }
}
