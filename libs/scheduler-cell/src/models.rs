use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::{AppointmentError, ReminderWindow};
use notification_cell::models::{Channel, NotificationError};
use patient_cell::models::PatientError;
use shared_models::error::AppError;

// ==============================================================================
// REMINDER RUN
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderRunSummary {
    pub reminders_24h: usize,
    pub reminders_2h: usize,
    /// Due appointments left alone because no channel could reach the patient.
    pub skipped: usize,
    pub errors: Vec<ReminderFailure>,
}

impl ReminderRunSummary {
    pub fn record_sent(&mut self, window: ReminderWindow) {
        match window {
            ReminderWindow::TwentyFourHours => self.reminders_24h += 1,
            ReminderWindow::TwoHours => self.reminders_2h += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderFailure {
    pub appointment_id: Uuid,
    pub window: ReminderWindow,
    pub error: String,
}

// ==============================================================================
// REACTIVATION RUN
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactivationSummary {
    pub patients_scanned: usize,
    pub inactive_patients: usize,
    pub events_queued: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTriggerResult {
    pub patient_id: Uuid,
    pub channels: Vec<Channel>,
    pub events_queued: usize,
}

/// Patient in the reactivation window together with their last visit.
#[derive(Debug, Clone, PartialEq)]
pub struct InactivePatient {
    pub patient_id: Uuid,
    pub last_appointment_date: NaiveDate,
    pub days_since_last_visit: i64,
}

/// Row of `reactivation_campaigns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub patient_id: Uuid,
    pub organization_id: Uuid,
    pub channel: Channel,
    pub status: String,
    pub queued_at: DateTime<Utc>,
}

impl CampaignRecord {
    pub fn queued(patient_id: Uuid, organization_id: Uuid, channel: Channel, at: DateTime<Utc>) -> Self {
        Self {
            patient_id,
            organization_id,
            channel,
            status: "queued".to_string(),
            queued_at: at,
        }
    }
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("Appointment store error: {0}")]
    Store(String),

    #[error("Patient directory error: {0}")]
    Directory(String),

    #[error("Outbox error: {0}")]
    Outbox(String),

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<AppointmentError> for SchedulerError {
    fn from(err: AppointmentError) -> Self {
        SchedulerError::Store(err.to_string())
    }
}

impl From<PatientError> for SchedulerError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => SchedulerError::PatientNotFound,
            other => SchedulerError::Directory(other.to_string()),
        }
    }
}

impl From<NotificationError> for SchedulerError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotConfigured(_) | NotificationError::EventBusNotConfigured => {
                SchedulerError::NotConfigured(err.to_string())
            }
            other => SchedulerError::Outbox(other.to_string()),
        }
    }
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::PatientNotFound => AppError::NotFound(err.to_string()),
            SchedulerError::NotConfigured(msg) => AppError::Internal(msg),
            SchedulerError::Store(msg)
            | SchedulerError::Directory(msg)
            | SchedulerError::Outbox(msg) => AppError::Database(msg),
        }
    }
}
