// libs/notification-cell/src/services/event_bus.rs
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{NotificationError, NotificationEvent};

/// Fire-and-forget publication of workflow events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, events: &[NotificationEvent]) -> Result<(), NotificationError>;
}

/// Inngest event API: POST {base}/e/{event_key} with a JSON array of events.
#[derive(Debug)]
pub struct InngestClient {
    client: Client,
    base_url: String,
    event_key: String,
}

impl InngestClient {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_event_bus_configured() {
            return Err(NotificationError::EventBusNotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.inngest_base_url.trim_end_matches('/').to_string(),
            event_key: config.inngest_event_key.clone(),
        })
    }
}

#[async_trait]
impl EventBus for InngestClient {
    async fn publish(&self, events: &[NotificationEvent]) -> Result<(), NotificationError> {
        if events.is_empty() {
            return Ok(());
        }

        let url = format!("{}/e/{}", self.base_url, self.event_key);
        debug!("Publishing {} events", events.len());

        let response = self
            .client
            .post(&url)
            .json(events)
            .send()
            .await
            .map_err(|e| NotificationError::EventBusError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Event publish failed: {} - {}", status, body);
            return Err(NotificationError::EventBusError {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        info!("Published {} events", events.len());
        Ok(())
    }
}
