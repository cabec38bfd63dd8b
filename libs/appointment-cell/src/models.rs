// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;

use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A scheduled session. `date` and the times are clinic wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub organization_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub therapist_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reminder_sent_24h: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_sent_2h: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn reminder_marker(&self, window: ReminderWindow) -> Option<DateTime<Utc>> {
        match window {
            ReminderWindow::TwentyFourHours => self.reminder_sent_24h,
            ReminderWindow::TwoHours => self.reminder_sent_2h,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Agendado,
    Confirmado,
    #[serde(alias = "realizado", alias = "attended")]
    Concluido,
    Cancelado,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Concluido | AppointmentStatus::Cancelado)
    }

    /// Statuses that still expect the patient to show up.
    pub fn awaits_reminder(&self) -> bool {
        matches!(self, AppointmentStatus::Agendado | AppointmentStatus::Confirmado)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Agendado => write!(f, "agendado"),
            AppointmentStatus::Confirmado => write!(f, "confirmado"),
            AppointmentStatus::Concluido => write!(f, "concluido"),
            AppointmentStatus::Cancelado => write!(f, "cancelado"),
        }
    }
}

// ==============================================================================
// REMINDER MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReminderWindow {
    #[serde(rename = "reminder_24h")]
    TwentyFourHours,
    #[serde(rename = "reminder_2h")]
    TwoHours,
}

impl ReminderWindow {
    pub const ALL: [ReminderWindow; 2] = [ReminderWindow::TwentyFourHours, ReminderWindow::TwoHours];

    /// Value written to `whatsapp_messages.message_type` and
    /// `appointment_reminders.reminder_type`.
    pub fn message_type(&self) -> &'static str {
        match self {
            ReminderWindow::TwentyFourHours => "reminder_24h",
            ReminderWindow::TwoHours => "reminder_2h",
        }
    }

    pub fn marker_column(&self) -> &'static str {
        match self {
            ReminderWindow::TwentyFourHours => "reminder_sent_24h",
            ReminderWindow::TwoHours => "reminder_sent_2h",
        }
    }

    pub fn lead_time(&self) -> Duration {
        match self {
            ReminderWindow::TwentyFourHours => Duration::hours(24),
            ReminderWindow::TwoHours => Duration::hours(2),
        }
    }
}

impl fmt::Display for ReminderWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_type())
    }
}

/// Delivery state of one (appointment, window) reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReminderStatus {
    NotSent,
    Sending { claimed_at: DateTime<Utc> },
    Sent { sent_at: DateTime<Utc> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderRecordStatus {
    Sending,
    Sent,
    Failed,
}

/// Row of `appointment_reminders`, unique on (appointment_id, reminder_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub appointment_id: Uuid,
    pub reminder_type: ReminderWindow,
    pub status: ReminderRecordStatus,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReminderRecord {
    pub fn state(&self) -> ReminderStatus {
        match self.status {
            ReminderRecordStatus::Sent => match self.sent_at {
                Some(sent_at) => ReminderStatus::Sent { sent_at },
                None => ReminderStatus::Failed {
                    reason: "sent without timestamp".to_string(),
                },
            },
            ReminderRecordStatus::Sending => match self.claimed_at {
                Some(claimed_at) => ReminderStatus::Sending { claimed_at },
                None => ReminderStatus::NotSent,
            },
            ReminderRecordStatus::Failed => ReminderStatus::Failed {
                reason: self.error.clone().unwrap_or_default(),
            },
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub organization_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
    pub therapist_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment end time must be after its start time")]
    InvalidTimeRange,

    #[error("Reminder marker {0} is already set")]
    MarkerAlreadySet(ReminderWindow),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound => AppError::NotFound(error.to_string()),
            AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::MarkerAlreadySet(_) => AppError::Conflict(error.to_string()),
            AppointmentError::InvalidTimeRange => AppError::ValidationError(error.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

/// Postgres `time` columns come back as `HH:MM:SS`; clients often send `HH:MM`.
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid wall-clock time '{}'", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }
}
