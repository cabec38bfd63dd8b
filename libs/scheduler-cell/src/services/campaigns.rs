// libs/scheduler-cell/src/services/campaigns.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{CampaignRecord, SchedulerError};

/// History of reactivation outreach, one row per queued event.
#[async_trait]
pub trait CampaignLog: Send + Sync {
    async fn record(&self, records: &[CampaignRecord]) -> Result<(), SchedulerError>;
}

pub struct SupabaseCampaignLog {
    supabase: SupabaseClient,
}

impl SupabaseCampaignLog {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }
}

#[async_trait]
impl CampaignLog for SupabaseCampaignLog {
    async fn record(&self, records: &[CampaignRecord]) -> Result<(), SchedulerError> {
        if records.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_value(records)
            .map_err(|e| SchedulerError::Outbox(e.to_string()))?;

        let _: Value = self.supabase
            .request(Method::POST, "/rest/v1/reactivation_campaigns", None, Some(body))
            .await
            .map_err(|e| SchedulerError::Outbox(e.to_string()))?;
        Ok(())
    }
}
