#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, ReminderStatus,
    ReminderWindow,
};
use appointment_cell::services::AppointmentStore;
use notification_cell::models::{
    Channel, NotificationError, NotificationEvent, OutboundMessage, OutboxEntry, SendReceipt,
    WhatsAppMessageLog,
};
use notification_cell::services::{MessageLog, MessageSender, OutboxStore};
use patient_cell::models::{
    NotificationPreferences, Organization, OrganizationSettings, Patient, PatientError,
};
use patient_cell::services::PatientDirectory;
use scheduler_cell::models::{CampaignRecord, SchedulerError};
use scheduler_cell::services::CampaignLog;

pub fn clinic_time(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
}

pub fn appointment(patient: &Patient, date: NaiveDate, start: NaiveTime) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        therapist_id: Uuid::new_v4(),
        organization_id: patient.organization_id,
        date,
        start_time: start,
        end_time: start + chrono::Duration::minutes(50),
        status: AppointmentStatus::Agendado,
        therapist_name: Some("Dra. Ana".to_string()),
        notes: None,
        reminder_sent_24h: None,
        reminder_sent_2h: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn completed_visit(patient: &Patient, date: NaiveDate) -> Appointment {
    let mut visit = appointment(patient, date, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    visit.status = AppointmentStatus::Concluido;
    visit
}

pub fn patient(organization_id: Uuid, phone: Option<&str>, email: Option<&str>) -> Patient {
    Patient {
        id: Uuid::new_v4(),
        name: "Maria Souza".to_string(),
        phone: phone.map(str::to_string),
        email: email.map(str::to_string),
        organization_id,
        active: true,
        notification_preferences: NotificationPreferences::default(),
    }
}

pub fn organization(whatsapp_enabled: Option<bool>, email_enabled: Option<bool>) -> Organization {
    Organization {
        id: Uuid::new_v4(),
        name: Some("Clinica Movimento".to_string()),
        settings: OrganizationSettings {
            whatsapp_enabled,
            email_enabled,
        },
    }
}

// ==============================================================================
// APPOINTMENT STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryAppointments {
    pub appointments: Mutex<Vec<Appointment>>,
    pub reminders: Mutex<HashMap<(Uuid, ReminderWindow), ReminderStatus>>,
    pub fail_queries: bool,
    pub fail_marks: bool,
}

impl InMemoryAppointments {
    pub fn with(appointments: Vec<Appointment>) -> Self {
        Self {
            appointments: Mutex::new(appointments),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_queries: true,
            ..Default::default()
        }
    }

    pub fn failing_marks(appointments: Vec<Appointment>) -> Self {
        Self {
            appointments: Mutex::new(appointments),
            fail_marks: true,
            ..Default::default()
        }
    }

    pub fn get(&self, id: Uuid) -> Appointment {
        self.appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .unwrap()
    }

    pub fn state(&self, id: Uuid, window: ReminderWindow) -> ReminderStatus {
        self.reminders
            .lock()
            .unwrap()
            .get(&(id, window))
            .cloned()
            .unwrap_or(ReminderStatus::NotSent)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointments {
    async fn due_for_reminder(
        &self,
        window: ReminderWindow,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if self.fail_queries {
            return Err(AppointmentError::DatabaseError("connection refused".to_string()));
        }
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.date == date && a.status.awaits_reminder() && a.reminder_marker(window).is_none())
            .cloned()
            .collect())
    }

    async fn claim_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        at: DateTime<Utc>,
    ) -> Result<bool, AppointmentError> {
        let mut reminders = self.reminders.lock().unwrap();
        match reminders.get(&(appointment_id, window)) {
            None | Some(ReminderStatus::NotSent) | Some(ReminderStatus::Failed { .. }) => {
                reminders.insert((appointment_id, window), ReminderStatus::Sending { claimed_at: at });
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn complete_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        at: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if self.fail_marks {
            return Err(AppointmentError::DatabaseError("marker write timed out".to_string()));
        }
        let mut appointments = self.appointments.lock().unwrap();
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or(AppointmentError::NotFound)?;

        let marker = match window {
            ReminderWindow::TwentyFourHours => &mut appointment.reminder_sent_24h,
            ReminderWindow::TwoHours => &mut appointment.reminder_sent_2h,
        };
        if marker.is_some() {
            return Err(AppointmentError::MarkerAlreadySet(window));
        }
        *marker = Some(at);

        self.reminders
            .lock()
            .unwrap()
            .insert((appointment_id, window), ReminderStatus::Sent { sent_at: at });
        Ok(())
    }

    async fn fail_reminder(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
        reason: &str,
    ) -> Result<(), AppointmentError> {
        let mut reminders = self.reminders.lock().unwrap();
        if let Some(ReminderStatus::Sending { .. }) = reminders.get(&(appointment_id, window)) {
            reminders.insert(
                (appointment_id, window),
                ReminderStatus::Failed { reason: reason.to_string() },
            );
        }
        Ok(())
    }

    async fn reminder_state(
        &self,
        appointment_id: Uuid,
        window: ReminderWindow,
    ) -> Result<ReminderStatus, AppointmentError> {
        Ok(self.state(appointment_id, window))
    }

    async fn completed_since(&self, since: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        if self.fail_queries {
            return Err(AppointmentError::DatabaseError("connection refused".to_string()));
        }
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status == AppointmentStatus::Concluido && a.date >= since)
            .cloned()
            .collect())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == appointment_id)
            .cloned()
            .ok_or(AppointmentError::NotFound)
    }

    async fn create_appointment(
        &self,
        _request: &CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        unimplemented!("scanners never book")
    }

    async fn update_schedule(
        &self,
        _appointment_id: Uuid,
        _date: NaiveDate,
        _start_time: NaiveTime,
        _end_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError> {
        unimplemented!("scanners never reschedule")
    }

    async fn update_status(
        &self,
        _appointment_id: Uuid,
        _status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        unimplemented!("scanners never change status")
    }
}

// ==============================================================================
// PATIENT DIRECTORY
// ==============================================================================

#[derive(Default)]
pub struct StaticDirectory {
    pub patients: Vec<Patient>,
    pub organizations: Vec<Organization>,
}

#[async_trait]
impl PatientDirectory for StaticDirectory {
    async fn active_patients(&self) -> Result<Vec<Patient>, PatientError> {
        Ok(self.patients.iter().filter(|p| p.active).cloned().collect())
    }

    async fn patients_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Patient>, PatientError> {
        Ok(self
            .patients
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn get_patient(&self, patient_id: Uuid) -> Result<Patient, PatientError> {
        self.patients
            .iter()
            .find(|p| p.id == patient_id)
            .cloned()
            .ok_or(PatientError::NotFound)
    }

    async fn organizations_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Organization>, PatientError> {
        Ok(self
            .organizations
            .iter()
            .filter(|o| ids.contains(&o.id))
            .cloned()
            .collect())
    }
}

// ==============================================================================
// DISPATCH
// ==============================================================================

pub struct RecordingSender {
    channel: Channel,
    fail: bool,
    pub sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(channel: Channel) -> Self {
        Self {
            channel,
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, NotificationError> {
        if self.fail {
            return Err(NotificationError::ProviderError {
                message: "HTTP 503: upstream unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(SendReceipt {
            channel: self.channel,
            provider_message_id: Some(format!("msg-{}", self.sent_count())),
        })
    }
}

#[derive(Default)]
pub struct RecordingLog {
    pub entries: Mutex<Vec<WhatsAppMessageLog>>,
}

#[async_trait]
impl MessageLog for RecordingLog {
    async fn record(&self, entry: &WhatsAppMessageLog) -> Result<(), NotificationError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryOutbox {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl MemoryOutbox {
    pub fn names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.name.clone()).collect()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn enqueue(
        &self,
        events: &[NotificationEvent],
        _now: DateTime<Utc>,
    ) -> Result<usize, NotificationError> {
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(events.len())
    }

    async fn pending(&self, _now: DateTime<Utc>, _limit: usize) -> Result<Vec<OutboxEntry>, NotificationError> {
        Ok(Vec::new())
    }

    async fn mark_dispatched(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        _id: Uuid,
        _attempts: u32,
        _error: &str,
        _next_attempt_at: DateTime<Utc>,
        _give_up: bool,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCampaigns {
    pub records: Mutex<Vec<CampaignRecord>>,
}

#[async_trait]
impl CampaignLog for MemoryCampaigns {
    async fn record(&self, records: &[CampaignRecord]) -> Result<(), SchedulerError> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}
