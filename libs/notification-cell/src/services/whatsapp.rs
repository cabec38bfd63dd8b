// libs/notification-cell/src/services/whatsapp.rs
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;

use crate::models::{
    Channel, NotificationError, OutboundMessage, SendReceipt, WhatsAppSendResponse,
};
use crate::services::sender::MessageSender;

/// WhatsApp Cloud API client sending pre-approved templates.
/// POST {api}/{phone_number_id}/messages
#[derive(Debug)]
pub struct WhatsAppClient {
    client: Client,
    api_url: String,
    phone_number_id: String,
    access_token: String,
    language: String,
}

impl WhatsAppClient {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_whatsapp_configured() {
            return Err(NotificationError::NotConfigured(Channel::WhatsApp));
        }

        Ok(Self {
            client: Client::new(),
            api_url: config.whatsapp_api_url.trim_end_matches('/').to_string(),
            phone_number_id: config.whatsapp_phone_number_id.clone(),
            access_token: config.whatsapp_access_token.clone(),
            language: config.whatsapp_template_language.clone(),
        })
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    #[instrument(skip(self, message), fields(template = message.template.whatsapp_template_name()))]
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, NotificationError> {
        let to = normalize_phone(&message.to)?;
        let url = format!("{}/{}/messages", self.api_url, self.phone_number_id);

        let parameters: Vec<_> = message
            .parameters
            .iter()
            .map(|text| json!({ "type": "text", "text": text }))
            .collect();

        let body = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "template",
            "template": {
                "name": message.template.whatsapp_template_name(),
                "language": { "code": self.language },
                "components": [
                    { "type": "body", "parameters": parameters }
                ]
            }
        });

        debug!("Sending WhatsApp template to: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("WhatsApp send failed: {} - {}", status, response_text);
            return Err(NotificationError::ProviderError {
                message: format!("HTTP {}: {}", status, response_text),
            });
        }

        let parsed: WhatsAppSendResponse = serde_json::from_str(&response_text)
            .map_err(|e| NotificationError::ProviderError {
                message: format!("Failed to parse WhatsApp response: {}", e),
            })?;

        let message_id = parsed.messages.into_iter().next().map(|m| m.id);
        info!("WhatsApp template sent: {}", message_id.as_deref().unwrap_or("<no id>"));

        Ok(SendReceipt {
            channel: Channel::WhatsApp,
            provider_message_id: message_id,
        })
    }
}

/// Brings a Brazilian number to `55DDNNNNNNNN[N]`: digits only, no trunk
/// `0`, country code added when missing.
pub fn normalize_phone(raw: &str) -> Result<String, NotificationError> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(stripped) = digits.strip_prefix('0') {
        digits = stripped.to_string();
    }
    if digits.len() == 10 || digits.len() == 11 {
        digits = format!("55{}", digits);
    }

    let valid = Regex::new(r"^55\d{10,11}$")
        .map(|re| re.is_match(&digits))
        .unwrap_or(false);
    if !valid {
        return Err(NotificationError::InvalidRecipient(raw.to_string()));
    }
    Ok(digits)
}
