// libs/notification-cell/src/services/outbox.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{NotificationError, NotificationEvent, OutboxEntry, RelaySummary};
use crate::services::event_bus::{EventBus, InngestClient};

const RETRY_BASE_SECONDS: i64 = 60;
const RETRY_CAP_SECONDS: i64 = 6 * 60 * 60;
const RELAY_BATCH_SIZE: usize = 100;

/// Durable record of events that still have to reach the event bus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(
        &self,
        events: &[NotificationEvent],
        now: DateTime<Utc>,
    ) -> Result<usize, NotificationError>;

    /// Pending entries whose next attempt is due, oldest first.
    async fn pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxEntry>, NotificationError>;

    async fn mark_dispatched(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), NotificationError>;

    async fn mark_attempt_failed(
        &self,
        id: Uuid,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        give_up: bool,
    ) -> Result<(), NotificationError>;
}

pub struct SupabaseOutboxStore {
    supabase: SupabaseClient,
}

impl SupabaseOutboxStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }

    async fn patch(&self, id: Uuid, body: Value) -> Result<(), NotificationError> {
        let path = format!("/rest/v1/notification_outbox?id=eq.{}", id);
        let _: Value = self.supabase
            .request(Method::PATCH, &path, None, Some(body))
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for SupabaseOutboxStore {
    async fn enqueue(
        &self,
        events: &[NotificationEvent],
        now: DateTime<Utc>,
    ) -> Result<usize, NotificationError> {
        if events.is_empty() {
            return Ok(0);
        }

        let rows: Vec<Value> = events
            .iter()
            .map(|event| {
                json!({
                    "id": Uuid::new_v4(),
                    "name": event.name,
                    "data": event.data,
                    "status": "pending",
                    "attempts": 0,
                    "next_attempt_at": timestamp(now),
                    "created_at": timestamp(now),
                })
            })
            .collect();

        let inserted: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notification_outbox",
                None,
                Some(Value::Array(rows)),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(db_error)?;

        debug!("Enqueued {} outbox entries", inserted.len());
        Ok(inserted.len())
    }

    async fn pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<OutboxEntry>, NotificationError> {
        let path = format!(
            "/rest/v1/notification_outbox?status=eq.pending&next_attempt_at=lte.{}&order=created_at.asc&limit={}",
            timestamp(now),
            limit,
        );
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(db_error)
    }

    async fn mark_dispatched(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), NotificationError> {
        self.patch(
            id,
            json!({
                "status": "dispatched",
                "dispatched_at": timestamp(at),
                "last_error": null,
            }),
        )
        .await
    }

    async fn mark_attempt_failed(
        &self,
        id: Uuid,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        give_up: bool,
    ) -> Result<(), NotificationError> {
        self.patch(
            id,
            json!({
                "status": if give_up { "failed" } else { "pending" },
                "attempts": attempts,
                "last_error": error,
                "next_attempt_at": timestamp(next_attempt_at),
            }),
        )
        .await
    }
}

/// Moves pending outbox entries onto the event bus. Delivery is
/// at-least-once: an entry whose publish succeeded but whose bookkeeping
/// failed is published again on the next pass.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    max_attempts: u32,
}

impl OutboxRelay {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        Ok(Self::with_parts(
            Arc::new(SupabaseOutboxStore::new(config)),
            Arc::new(InngestClient::new(config)?),
            config.outbox_max_attempts,
        ))
    }

    pub fn with_parts(store: Arc<dyn OutboxStore>, bus: Arc<dyn EventBus>, max_attempts: u32) -> Self {
        Self {
            store,
            bus,
            max_attempts: max_attempts.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn relay(&self, now: DateTime<Utc>) -> Result<RelaySummary, NotificationError> {
        let entries = self.store.pending(now, RELAY_BATCH_SIZE).await?;
        let mut summary = RelaySummary::default();

        for entry in entries {
            match self.bus.publish(&[entry.event()]).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_dispatched(entry.id, now).await {
                        warn!("Outbox entry {} published but not marked: {}", entry.id, e);
                    }
                    summary.dispatched += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    let give_up = attempts >= self.max_attempts;
                    let next_attempt_at = now + retry_delay(entry.attempts);

                    if give_up {
                        error!("Outbox entry {} ({}) failed after {} attempts: {}", entry.id, entry.name, attempts, e);
                        summary.failed += 1;
                    } else {
                        warn!("Outbox entry {} ({}) will retry at {}: {}", entry.id, entry.name, next_attempt_at, e);
                        summary.retried += 1;
                    }

                    if let Err(mark_err) = self.store
                        .mark_attempt_failed(entry.id, attempts, &e.to_string(), next_attempt_at, give_up)
                        .await
                    {
                        warn!("Could not record failed attempt for outbox entry {}: {}", entry.id, mark_err);
                    }
                }
            }
        }

        info!(
            "Outbox relay: {} dispatched, {} retried, {} failed",
            summary.dispatched, summary.retried, summary.failed
        );
        Ok(summary)
    }
}

/// Exponential backoff from one minute, capped at six hours.
pub fn retry_delay(previous_attempts: u32) -> Duration {
    let factor = 1i64 << previous_attempts.min(20);
    Duration::seconds((RETRY_BASE_SECONDS * factor).min(RETRY_CAP_SECONDS))
}

fn db_error(error: anyhow::Error) -> NotificationError {
    NotificationError::DatabaseError(error.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
