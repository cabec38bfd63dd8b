// libs/notification-cell/src/services/email.rs
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;

use crate::models::{Channel, NotificationError, OutboundMessage, ResendSendResponse, SendReceipt};
use crate::services::sender::MessageSender;

/// Resend transactional email client.
#[derive(Debug)]
pub struct EmailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_email_configured() {
            return Err(NotificationError::NotConfigured(Channel::Email));
        }

        Ok(Self {
            client: Client::new(),
            api_url: config.resend_api_url.trim_end_matches('/').to_string(),
            api_key: config.resend_api_key.clone(),
            from: config.email_from.clone(),
        })
    }
}

#[async_trait]
impl MessageSender for EmailClient {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    #[instrument(skip(self, message), fields(template = ?message.template))]
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, NotificationError> {
        let to = message.to.trim();
        if !to.contains('@') {
            return Err(NotificationError::InvalidRecipient(message.to.clone()));
        }

        let url = format!("{}/emails", self.api_url);
        debug!("Sending email via Resend to: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": message.subject,
                "html": message.html,
            }))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Resend send failed: {} - {}", status, response_text);
            return Err(NotificationError::ProviderError {
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let parsed: ResendSendResponse = serde_json::from_str(&response_text)
            .map_err(|e| NotificationError::ProviderError {
                message: format!("Failed to parse Resend response: {}", e),
            })?;

        info!("Email sent: {}", parsed.id.as_deref().unwrap_or("<no id>"));

        Ok(SendReceipt {
            channel: Channel::Email,
            provider_message_id: parsed.id,
        })
    }
}
