//! Per-user configuration document.

use serde::{Deserialize, Serialize};

/// Poll-affecting user preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Mirror every Telegram alert to the user's registered emails.
    #[serde(default)]
    pub send_email_alerts: bool,
}

/// Configuration owned by one whitelisted Telegram user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub settings: UserSettings,
    /// Telegram chat ids that receive this user's alerts.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Email recipients, used only when `send_email_alerts` is on.
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserConfig {
    /// Default configuration for a freshly whitelisted user: their own chat
    /// is the first delivery channel.
    pub fn new_for(user_id: &str, is_admin: bool) -> Self {
        Self {
            settings: UserSettings::default(),
            channels: vec![user_id.to_string()],
            emails: Vec::new(),
            is_admin,
        }
    }

    /// Add channels, skipping ones already present.
    pub fn add_channels(&mut self, channels: &[String]) {
        for channel in channels {
            if !self.channels.contains(channel) {
                self.channels.push(channel.clone());
            }
        }
    }

    /// Remove channels; returns the ones that were not registered.
    pub fn remove_channels(&mut self, channels: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for channel in channels {
            match self.channels.iter().position(|c| c == channel) {
                Some(pos) => {
                    self.channels.remove(pos);
                }
                None => missing.push(channel.clone()),
            }
        }
        missing
    }

    /// Add email recipients, skipping ones already present.
    pub fn add_emails(&mut self, emails: &[String]) {
        for email in emails {
            if !self.emails.contains(email) {
                self.emails.push(email.clone());
            }
        }
    }

    /// Remove email recipients; returns the ones that were not registered.
    pub fn remove_emails(&mut self, emails: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for email in emails {
            match self.emails.iter().position(|e| e == email) {
                Some(pos) => {
                    self.emails.remove(pos);
                }
                None => missing.push(email.clone()),
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_for_seeds_own_channel() {
        let config = UserConfig::new_for("12345", true);
        assert_eq!(config.channels, vec!["12345"]);
        assert!(config.is_admin);
        assert!(!config.settings.send_email_alerts);
    }

    #[test]
    fn test_channel_management() {
        let mut config = UserConfig::new_for("1", false);
        config.add_channels(&["2".to_string(), "1".to_string()]);
        assert_eq!(config.channels, vec!["1", "2"]);

        let missing = config.remove_channels(&["2".to_string(), "9".to_string()]);
        assert_eq!(config.channels, vec!["1"]);
        assert_eq!(missing, vec!["9"]);
    }

    #[test]
    fn test_email_management() {
        let mut config = UserConfig::new_for("1", false);
        config.add_emails(&["a@b.c".to_string()]);
        config.add_emails(&["a@b.c".to_string()]);
        assert_eq!(config.emails, vec!["a@b.c"]);
        assert!(config.remove_emails(&["a@b.c".to_string()]).is_empty());
        assert!(config.emails.is_empty());
    }
}
