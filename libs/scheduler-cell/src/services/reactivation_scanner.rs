// libs/scheduler-cell/src/services/reactivation_scanner.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::Appointment;
use appointment_cell::services::{AppointmentStore, SupabaseAppointmentStore};
use notification_cell::models::{Channel, NotificationEvent};
use notification_cell::services::{OutboxStore, SupabaseOutboxStore};
use patient_cell::models::{Organization, Patient};
use patient_cell::services::{ChannelPolicy, PatientDirectory, SupabasePatientDirectory};
use shared_config::AppConfig;

use crate::models::{
    CampaignRecord, InactivePatient, PatientTriggerResult, ReactivationSummary, SchedulerError,
};
use crate::services::campaigns::{CampaignLog, SupabaseCampaignLog};

pub const LOOKBACK_DAYS: i64 = 60;
pub const MIN_DAYS_INACTIVE: i64 = 30;
pub const MAX_DAYS_INACTIVE: i64 = 37;

pub struct ReactivationScanner {
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn PatientDirectory>,
    outbox: Arc<dyn OutboxStore>,
    campaigns: Arc<dyn CampaignLog>,
}

impl ReactivationScanner {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            Arc::new(SupabaseAppointmentStore::new(config)),
            Arc::new(SupabasePatientDirectory::new(config)),
            Arc::new(SupabaseOutboxStore::new(config)),
            Arc::new(SupabaseCampaignLog::new(config)),
        )
    }

    pub fn with_parts(
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn PatientDirectory>,
        outbox: Arc<dyn OutboxStore>,
        campaigns: Arc<dyn CampaignLog>,
    ) -> Self {
        Self {
            appointments,
            directory,
            outbox,
            campaigns,
        }
    }

    /// Weekly pass: queue outreach for patients whose last completed visit
    /// was 30 to 37 days ago. Events go to the outbox; the relay delivers them.
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<ReactivationSummary, SchedulerError> {
        let today = now.date_naive();

        let patients = self.directory.active_patients().await?;
        let completed = self
            .appointments
            .completed_since(today - Duration::days(LOOKBACK_DAYS))
            .await?;
        let last_visits = last_completed_visits(&completed);

        let inactive: Vec<(&Patient, InactivePatient)> = patients
            .iter()
            .filter_map(|patient| {
                inactive_patient(patient, &last_visits, today).map(|found| (patient, found))
            })
            .collect();

        let mut summary = ReactivationSummary {
            patients_scanned: patients.len(),
            inactive_patients: inactive.len(),
            events_queued: 0,
        };
        debug!(
            "{} of {} active patients are due for reactivation",
            summary.inactive_patients, summary.patients_scanned
        );

        if inactive.is_empty() {
            return Ok(summary);
        }

        let organizations = self
            .organizations_for(inactive.iter().map(|(p, _)| p.organization_id))
            .await?;

        let mut events = Vec::new();
        let mut records = Vec::new();
        let queued_at = now.with_timezone(&Utc);
        for (patient, found) in &inactive {
            let organization = organizations.get(&patient.organization_id);
            for channel in eligible_channels(patient, organization) {
                events.push(reactivation_event(channel, patient, organization, Some(found)));
                records.push(CampaignRecord::queued(patient.id, patient.organization_id, channel, queued_at));
            }
        }

        summary.events_queued = self.queue(&events, &records, queued_at).await?;

        info!(
            "Reactivation scan: {} scanned, {} inactive, {} events queued",
            summary.patients_scanned, summary.inactive_patients, summary.events_queued
        );
        Ok(summary)
    }

    /// Manual outreach for one patient, without the inactivity window.
    #[instrument(skip(self))]
    pub async fn trigger_for_patient(
        &self,
        patient_id: Uuid,
        now: DateTime<FixedOffset>,
    ) -> Result<PatientTriggerResult, SchedulerError> {
        let patient = self.directory.get_patient(patient_id).await?;
        let organizations = self
            .organizations_for(std::iter::once(patient.organization_id))
            .await?;
        let organization = organizations.get(&patient.organization_id);

        let channels = eligible_channels(&patient, organization);
        let events: Vec<NotificationEvent> = channels
            .iter()
            .map(|channel| reactivation_event(*channel, &patient, organization, None))
            .collect();

        let queued_at = now.with_timezone(&Utc);
        let records: Vec<CampaignRecord> = channels
            .iter()
            .map(|channel| CampaignRecord::queued(patient.id, patient.organization_id, *channel, queued_at))
            .collect();

        let events_queued = self.queue(&events, &records, queued_at).await?;
        info!("Manual reactivation for patient {}: {} events queued", patient.id, events_queued);

        Ok(PatientTriggerResult {
            patient_id: patient.id,
            channels,
            events_queued,
        })
    }

    async fn organizations_for(
        &self,
        ids: impl Iterator<Item = Uuid>,
    ) -> Result<HashMap<Uuid, Organization>, SchedulerError> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = ids.filter(|id| seen.insert(*id)).collect();

        Ok(self
            .directory
            .organizations_by_ids(&ids)
            .await?
            .into_iter()
            .map(|org| (org.id, org))
            .collect())
    }

    async fn queue(
        &self,
        events: &[NotificationEvent],
        records: &[CampaignRecord],
        at: DateTime<Utc>,
    ) -> Result<usize, SchedulerError> {
        if events.is_empty() {
            return Ok(0);
        }

        let queued = self.outbox.enqueue(events, at).await?;
        if let Err(e) = self.campaigns.record(records).await {
            warn!("Failed to record reactivation campaigns: {}", e);
        }
        Ok(queued)
    }
}

/// Most recent completed visit per patient.
pub fn last_completed_visits(completed: &[Appointment]) -> HashMap<Uuid, NaiveDate> {
    let mut last: HashMap<Uuid, NaiveDate> = HashMap::new();
    for appointment in completed {
        last.entry(appointment.patient_id)
            .and_modify(|date| {
                if appointment.date > *date {
                    *date = appointment.date;
                }
            })
            .or_insert(appointment.date);
    }
    last
}

/// `Some` when the patient can still be reached and their last visit falls
/// inside the reactivation window.
pub fn inactive_patient(
    patient: &Patient,
    last_visits: &HashMap<Uuid, NaiveDate>,
    today: NaiveDate,
) -> Option<InactivePatient> {
    if patient.notification_preferences.opted_out_of_all() || !patient.has_contact() {
        return None;
    }

    let last = *last_visits.get(&patient.id)?;
    let days = (today - last).num_days();
    if !(MIN_DAYS_INACTIVE..=MAX_DAYS_INACTIVE).contains(&days) {
        return None;
    }

    Some(InactivePatient {
        patient_id: patient.id,
        last_appointment_date: last,
        days_since_last_visit: days,
    })
}

fn eligible_channels(patient: &Patient, organization: Option<&Organization>) -> Vec<Channel> {
    let eligibility = ChannelPolicy::evaluate(patient, organization);
    let mut channels = Vec::with_capacity(eligibility.count());
    if eligibility.whatsapp {
        channels.push(Channel::WhatsApp);
    }
    if eligibility.email {
        channels.push(Channel::Email);
    }
    channels
}

fn reactivation_event(
    channel: Channel,
    patient: &Patient,
    organization: Option<&Organization>,
    inactivity: Option<&InactivePatient>,
) -> NotificationEvent {
    let mut data = json!({
        "patientId": patient.id,
        "organizationId": patient.organization_id,
        "patientName": patient.name,
        "clinicName": organization.map(|o| o.display_name()).unwrap_or("FisioFlow"),
        "lastAppointmentDate": inactivity.map(|i| i.last_appointment_date.format("%Y-%m-%d").to_string()),
        "daysSinceLastVisit": inactivity.map(|i| i.days_since_last_visit),
    });
    match channel {
        Channel::WhatsApp => data["phone"] = json!(patient.phone),
        Channel::Email => data["email"] = json!(patient.email),
    }
    NotificationEvent::new(channel.reactivation_event(), data)
}
