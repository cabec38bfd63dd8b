// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, ReminderRecord,
    ReminderStatus, ReminderWindow,
};

/// Persistence seam for appointments and their reminder bookkeeping.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Open appointments on `date` whose marker for `window` is unset.
    async fn due_for_reminder(
        &self,
        window: ReminderWindow,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Takes ownership of one (appointment, window) reminder. Returns `false`
    /// when another run already owns it or it was already sent.
    async fn claim_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        at: DateTime<Utc>,
    ) -> Result<bool, AppointmentError>;

    /// Sets the marker for `window`. Never overwrites a marker already set.
    async fn complete_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        at: DateTime<Utc>,
    ) -> Result<(), AppointmentError>;

    async fn fail_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        reason: &str,
    ) -> Result<(), AppointmentError>;

    async fn reminder_state(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
    ) -> Result<ReminderStatus, AppointmentError>;

    async fn completed_since(&self, since: NaiveDate) -> Result<Vec<Appointment>, AppointmentError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError>;

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError>;

    async fn update_schedule(
        &self,
        appointment_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError>;

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError>;
}

pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(db_error)?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string())))
            .collect()
    }

    async fn patch_appointment(&self, path: &str, body: Value) -> Result<Vec<Value>, AppointmentError> {
        self.supabase
            .request_with_headers(
                Method::PATCH,
                path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(db_error)
    }

    fn single(rows: Vec<Value>) -> Result<Appointment, AppointmentError> {
        let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn due_for_reminder(
        &self,
        window: ReminderWindow,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?date=eq.{}&status=in.(agendado,confirmado)&{}=is.null&select=*",
            date.format("%Y-%m-%d"),
            window.marker_column(),
        );
        debug!("Loading {} candidates for {}", window, date);
        self.fetch(&path).await
    }

    async fn claim_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        at: DateTime<Utc>,
    ) -> Result<bool, AppointmentError> {
        let inserted: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointment_reminders?on_conflict=appointment_id,reminder_type",
                None,
                Some(json!({
                    "appointment_id": appointment_id,
                    "reminder_type": window.message_type(),
                    "status": "sending",
                    "claimed_at": timestamp(at),
                })),
                Some(SupabaseClient::insert_if_absent()),
            )
            .await
            .map_err(db_error)?;

        if !inserted.is_empty() {
            return Ok(true);
        }

        // A failed attempt from an earlier run may be retried.
        let path = format!(
            "/rest/v1/appointment_reminders?appointment_id=eq.{}&reminder_type=eq.{}&status=eq.failed",
            appointment_id,
            window.message_type(),
        );
        let reclaimed: Vec<Value> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(json!({
                    "status": "sending",
                    "claimed_at": timestamp(at),
                    "error": null,
                })),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(db_error)?;

        if reclaimed.is_empty() {
            debug!("Reminder {} for appointment {} is owned elsewhere", window, appointment_id);
        }
        Ok(!reclaimed.is_empty())
    }

    async fn complete_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        at: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let column = window.marker_column();
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&{}=is.null",
            appointment_id, column
        );
        let mut body = serde_json::Map::new();
        body.insert(column.to_string(), json!(timestamp(at)));

        let updated = self.patch_appointment(&path, Value::Object(body)).await?;
        if updated.is_empty() {
            warn!("Marker {} already set on appointment {}", column, appointment_id);
            return Err(AppointmentError::MarkerAlreadySet(window));
        }

        let record_path = format!(
            "/rest/v1/appointment_reminders?appointment_id=eq.{}&reminder_type=eq.{}",
            appointment_id,
            window.message_type(),
        );
        // The marker is authoritative once set; a stale claim row only needs a manual reset.
        let closed: anyhow::Result<Value> = self.supabase
            .request(
                Method::PATCH,
                &record_path,
                None,
                Some(json!({ "status": "sent", "sent_at": timestamp(at) })),
            )
            .await;
        if let Err(e) = closed {
            warn!(
                "Marker {} set on appointment {} but its reminder row was not closed: {}",
                column, appointment_id, e
            );
        }

        Ok(())
    }

    async fn fail_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        reason: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_reminders?appointment_id=eq.{}&reminder_type=eq.{}&status=eq.sending",
            appointment_id,
            window.message_type(),
        );
        let _: Value = self.supabase
            .request(
                Method::PATCH,
                &path,
                None,
                Some(json!({ "status": "failed", "error": reason })),
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn reminder_state(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
    ) -> Result<ReminderStatus, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_reminders?appointment_id=eq.{}&reminder_type=eq.{}&select=*",
            appointment_id,
            window.message_type(),
        );
        let records: Vec<ReminderRecord> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(db_error)?;

        Ok(records
            .first()
            .map(ReminderRecord::state)
            .unwrap_or(ReminderStatus::NotSent))
    }

    async fn completed_since(&self, since: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?status=in.(concluido,realizado,attended)&date=gte.{}&select=*",
            since.format("%Y-%m-%d"),
        );
        self.fetch(&path).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&select=*", appointment_id);
        self.fetch(&path)
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let now = timestamp(Utc::now());
        let body = json!({
            "patient_id": request.patient_id,
            "therapist_id": request.therapist_id,
            "organization_id": request.organization_id,
            "date": request.date.format("%Y-%m-%d").to_string(),
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "status": AppointmentStatus::Agendado,
            "therapist_name": request.therapist_name,
            "notes": request.notes,
            "created_at": now,
            "updated_at": now,
        });

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(db_error)?;

        Self::single(rows)
    }

    async fn update_schedule(
        &self,
        appointment_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows = self
            .patch_appointment(
                &path,
                json!({
                    "date": date.format("%Y-%m-%d").to_string(),
                    "start_time": start_time.format("%H:%M:%S").to_string(),
                    "end_time": end_time.format("%H:%M:%S").to_string(),
                    "updated_at": timestamp(Utc::now()),
                }),
            )
            .await?;
        Self::single(rows)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows = self
            .patch_appointment(
                &path,
                json!({
                    "status": status,
                    "updated_at": timestamp(Utc::now()),
                }),
            )
            .await?;
        Self::single(rows)
    }
}

fn db_error(error: anyhow::Error) -> AppointmentError {
    AppointmentError::DatabaseError(error.to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
