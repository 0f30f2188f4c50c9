//! Email delivery via the SendGrid v3 HTTP API.

use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";
const EMAIL_TEMPLATE: &str = include_str!("../resources/email_template.html");

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Email sender credentials.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    /// Verified sender address.
    pub from: String,
}

/// SendGrid mail client. Best effort by contract: callers log failures and
/// never fail a cycle on them.
pub struct EmailClient {
    http: reqwest::Client,
    config: EmailConfig,
}

impl EmailClient {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { http, config })
    }

    /// Render the alert email body from the bundled template.
    pub fn render(pair: &str, post: &str, chart_url: &str) -> String {
        EMAIL_TEMPLATE
            .replace("{pair}", pair)
            .replace("{post}", post)
            .replace("{chart_url}", chart_url)
    }

    /// Send one alert post to all recipients.
    pub async fn send_alert(
        &self,
        recipients: &[String],
        pair: &str,
        post: &str,
        chart_url: &str,
    ) -> Result<(), EmailError> {
        let to: Vec<_> = recipients.iter().map(|email| json!({ "email": email })).collect();
        let body = json!({
            "personalizations": [{ "to": to }],
            "from": { "email": self.config.from },
            "subject": format!("{pair} Crypto Indicator Alert"),
            "content": [{
                "type": "text/html",
                "value": Self::render(pair, post, chart_url),
            }],
        });

        self.http
            .post(SENDGRID_ENDPOINT)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        info!(recipients = ?recipients, pair, "alert email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let html = EmailClient::render(
            "ETH/USDT",
            "ETH/USDT ABOVE 3000 TARGET AT 3100",
            "https://example.com/chart",
        );
        assert!(html.contains("ETH/USDT Alert"));
        assert!(html.contains("ETH/USDT ABOVE 3000 TARGET AT 3100"));
        assert!(html.contains("https://example.com/chart"));
        assert!(!html.contains("{pair}"));
        assert!(!html.contains("{post}"));
        assert!(!html.contains("{chart_url}"));
    }
}
