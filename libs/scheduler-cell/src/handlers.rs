// libs/scheduler-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use notification_cell::models::RelaySummary;
use notification_cell::services::OutboxRelay;
use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{PatientTriggerResult, ReactivationSummary, ReminderRunSummary};
use crate::services::{ReactivationScanner, ReminderScanner};

#[axum::debug_handler]
pub async fn run_reminders(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<ReminderRunSummary>, AppError> {
    info!("Reminder scan triggered over HTTP");
    let now = Utc::now().with_timezone(&config.clinic_offset());
    let summary = ReminderScanner::new(&config).run(now).await?;
    Ok(Json(summary))
}

#[axum::debug_handler]
pub async fn run_reactivation(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<ReactivationSummary>, AppError> {
    info!("Reactivation scan triggered over HTTP");
    let now = Utc::now().with_timezone(&config.clinic_offset());
    let summary = ReactivationScanner::new(&config).run(now).await?;
    Ok(Json(summary))
}

#[axum::debug_handler]
pub async fn trigger_patient_reactivation(
    State(config): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<PatientTriggerResult>, AppError> {
    let now = Utc::now().with_timezone(&config.clinic_offset());
    let result = ReactivationScanner::new(&config)
        .trigger_for_patient(patient_id, now)
        .await?;
    Ok(Json(result))
}

#[axum::debug_handler]
pub async fn relay_outbox(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<RelaySummary>, AppError> {
    let relay = OutboxRelay::new(&config)?;
    Ok(Json(relay.relay(Utc::now()).await?))
}
