// libs/notification-cell/src/services/message_log.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{NotificationError, WhatsAppMessageLog};

/// Audit trail of WhatsApp send attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn record(&self, entry: &WhatsAppMessageLog) -> Result<(), NotificationError>;
}

pub struct SupabaseMessageLog {
    supabase: SupabaseClient,
}

impl SupabaseMessageLog {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }
}

#[async_trait]
impl MessageLog for SupabaseMessageLog {
    async fn record(&self, entry: &WhatsAppMessageLog) -> Result<(), NotificationError> {
        let body = serde_json::to_value(entry)
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let _: Value = self.supabase
            .request(Method::POST, "/rest/v1/whatsapp_messages", None, Some(body))
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        debug!("Logged {} WhatsApp message to {}", entry.message_type, entry.to_phone);
        Ok(())
    }
}
