// libs/scheduler-cell/src/services/reminder_scanner.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, ReminderStatus, ReminderWindow};
use appointment_cell::services::{AppointmentStore, SupabaseAppointmentStore};
use notification_cell::models::{
    Channel, DeliveryStatus, MessageContext, MessageTemplate, OutboundMessage, WhatsAppMessageLog,
};
use notification_cell::services::{
    normalize_phone, EmailClient, MessageLog, MessageSender, SupabaseMessageLog, WhatsAppClient,
};
use patient_cell::models::{Organization, Patient};
use patient_cell::services::{ChannelPolicy, PatientDirectory, SupabasePatientDirectory};
use shared_config::AppConfig;

use crate::models::{ReminderFailure, ReminderRunSummary, SchedulerError};

/// The 2h reminder goes out only while the session starts between 90 and
/// 150 minutes from now, both ends included.
const TWO_HOUR_WINDOW_MIN: i64 = 90 * 60;
const TWO_HOUR_WINDOW_MAX: i64 = 150 * 60;

enum Outcome {
    Sent,
    Skipped,
    ClaimedElsewhere,
}

pub struct ReminderScanner {
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn PatientDirectory>,
    whatsapp: Option<Arc<dyn MessageSender>>,
    email: Option<Arc<dyn MessageSender>>,
    message_log: Arc<dyn MessageLog>,
}

impl ReminderScanner {
    pub fn new(config: &AppConfig) -> Self {
        let whatsapp: Option<Arc<dyn MessageSender>> = match WhatsAppClient::new(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("WhatsApp reminders disabled: {}", e);
                None
            }
        };
        let email: Option<Arc<dyn MessageSender>> = match EmailClient::new(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Email reminders disabled: {}", e);
                None
            }
        };

        Self::with_parts(
            Arc::new(SupabaseAppointmentStore::new(config)),
            Arc::new(SupabasePatientDirectory::new(config)),
            whatsapp,
            email,
            Arc::new(SupabaseMessageLog::new(config)),
        )
    }

    pub fn with_parts(
        appointments: Arc<dyn AppointmentStore>,
        directory: Arc<dyn PatientDirectory>,
        whatsapp: Option<Arc<dyn MessageSender>>,
        email: Option<Arc<dyn MessageSender>>,
        message_log: Arc<dyn MessageLog>,
    ) -> Self {
        Self {
            appointments,
            directory,
            whatsapp,
            email,
            message_log,
        }
    }

    /// One scan of both windows at clinic wall-clock time `now`.
    ///
    /// Query failures abort the scan. Anything that goes wrong for a single
    /// appointment lands in `errors` and the scan moves on.
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<ReminderRunSummary, SchedulerError> {
        let mut summary = ReminderRunSummary::default();

        let tomorrow = (now + Duration::hours(24)).date_naive();
        let due_24h = self
            .appointments
            .due_for_reminder(ReminderWindow::TwentyFourHours, tomorrow)
            .await?;
        debug!("{} appointments due for the 24h reminder", due_24h.len());
        self.process_window(ReminderWindow::TwentyFourHours, due_24h, now, &mut summary)
            .await?;

        let today = now.date_naive();
        let due_2h: Vec<Appointment> = self
            .appointments
            .due_for_reminder(ReminderWindow::TwoHours, today)
            .await?
            .into_iter()
            .filter(|appointment| in_two_hour_window(appointment, now))
            .collect();
        debug!("{} appointments inside the 2h window", due_2h.len());
        self.process_window(ReminderWindow::TwoHours, due_2h, now, &mut summary)
            .await?;

        info!(
            "Reminder scan: {} x 24h, {} x 2h, {} skipped, {} errors",
            summary.reminders_24h,
            summary.reminders_2h,
            summary.skipped,
            summary.errors.len()
        );
        Ok(summary)
    }

    async fn process_window(
        &self,
        window: ReminderWindow,
        due: Vec<Appointment>,
        now: DateTime<FixedOffset>,
        summary: &mut ReminderRunSummary,
    ) -> Result<(), SchedulerError> {
        if due.is_empty() {
            return Ok(());
        }

        let patient_ids: Vec<Uuid> = unique(due.iter().map(|a| a.patient_id));
        let patients: HashMap<Uuid, Patient> = self
            .directory
            .patients_by_ids(&patient_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let org_ids: Vec<Uuid> = unique(due.iter().map(|a| a.organization_id));
        let organizations: HashMap<Uuid, Organization> = self
            .directory
            .organizations_by_ids(&org_ids)
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        for appointment in &due {
            let patient = patients.get(&appointment.patient_id);
            let organization = organizations.get(&appointment.organization_id);

            match self.remind(appointment, window, patient, organization, now).await {
                Ok(Outcome::Sent) => summary.record_sent(window),
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Ok(Outcome::ClaimedElsewhere) => {}
                Err(error) => {
                    warn!("{} for appointment {} failed: {}", window, appointment.id, error);
                    summary.errors.push(ReminderFailure {
                        appointment_id: appointment.id,
                        window,
                        error,
                    });
                }
            }
        }
        Ok(())
    }

    async fn remind(
        &self,
        appointment: &Appointment,
        window: ReminderWindow,
        patient: Option<&Patient>,
        organization: Option<&Organization>,
        now: DateTime<FixedOffset>,
    ) -> Result<Outcome, String> {
        let Some(patient) = patient else {
            debug!("Appointment {} has no readable patient, skipping", appointment.id);
            return Ok(Outcome::Skipped);
        };

        let Some((sender, to)) = self.pick_channel(patient, organization) else {
            debug!("No reachable channel for patient {}, skipping", patient.id);
            return Ok(Outcome::Skipped);
        };

        let at = now.with_timezone(&Utc);
        let claimed = self
            .appointments
            .claim_reminder(appointment.id, window, at)
            .await
            .map_err(|e| e.to_string())?;
        if !claimed {
            match self.appointments.reminder_state(appointment.id, window).await {
                Ok(state) => match held_since(&state) {
                    Some(claimed_at) => warn!(
                        "{} for appointment {} held in sending since {}; reset its appointment_reminders row if no run is in flight",
                        window, appointment.id, claimed_at
                    ),
                    None => debug!("{} for appointment {} already handled: {:?}", window, appointment.id, state),
                },
                Err(e) => debug!("{} for appointment {} claimed elsewhere ({})", window, appointment.id, e),
            }
            return Ok(Outcome::ClaimedElsewhere);
        }

        let template = match window {
            ReminderWindow::TwentyFourHours => MessageTemplate::AppointmentReminder24h,
            ReminderWindow::TwoHours => MessageTemplate::AppointmentReminder2h,
        };
        let context = MessageContext {
            patient_name: patient.name.clone(),
            clinic_name: organization
                .map(|o| o.display_name().to_string())
                .unwrap_or_else(|| "FisioFlow".to_string()),
            appointment_date: Some(appointment.date),
            appointment_time: Some(appointment.start_time),
            therapist_name: appointment.therapist_name.clone(),
        };
        let message = template.render(sender.channel(), &to, &context);

        match sender.send(&message).await {
            Ok(receipt) => {
                if message.channel == Channel::WhatsApp {
                    self.log_whatsapp(appointment, &message, receipt.provider_message_id, None, at)
                        .await;
                }
                self.appointments
                    .complete_reminder(appointment.id, window, at)
                    .await
                    .map_err(|e| e.to_string())?;
                info!("{} sent for appointment {} via {}", window, appointment.id, message.channel);
                Ok(Outcome::Sent)
            }
            Err(send_error) => {
                let reason = send_error.to_string();
                if message.channel == Channel::WhatsApp {
                    self.log_whatsapp(appointment, &message, None, Some(reason.clone()), at)
                        .await;
                }
                if let Err(e) = self
                    .appointments
                    .fail_reminder(appointment.id, window, &reason)
                    .await
                {
                    warn!("Could not release reminder claim for {}: {}", appointment.id, e);
                }
                Err(reason)
            }
        }
    }

    /// WhatsApp first, email as fallback.
    fn pick_channel(
        &self,
        patient: &Patient,
        organization: Option<&Organization>,
    ) -> Option<(Arc<dyn MessageSender>, String)> {
        let eligibility = ChannelPolicy::evaluate(patient, organization);

        if eligibility.whatsapp {
            if let (Some(sender), Some(phone)) = (&self.whatsapp, &patient.phone) {
                return Some((sender.clone(), phone.clone()));
            }
        }
        if eligibility.email {
            if let (Some(sender), Some(email)) = (&self.email, &patient.email) {
                return Some((sender.clone(), email.clone()));
            }
        }
        None
    }

    async fn log_whatsapp(
        &self,
        appointment: &Appointment,
        message: &OutboundMessage,
        message_id: Option<String>,
        error: Option<String>,
        at: DateTime<Utc>,
    ) {
        let entry = WhatsAppMessageLog {
            appointment_id: Some(appointment.id),
            patient_id: appointment.patient_id,
            organization_id: appointment.organization_id,
            to_phone: normalize_phone(&message.to).unwrap_or_else(|_| message.to.clone()),
            message_type: message.template.message_type().to_string(),
            template_name: message.template.whatsapp_template_name().to_string(),
            message_id,
            status: if error.is_some() { DeliveryStatus::Failed } else { DeliveryStatus::Sent },
            error,
            created_at: at,
        };

        if let Err(e) = self.message_log.record(&entry).await {
            warn!("Failed to log WhatsApp message for appointment {}: {}", appointment.id, e);
        }
    }
}

fn in_two_hour_window(appointment: &Appointment, now: DateTime<FixedOffset>) -> bool {
    let until_start = (appointment.starts_at() - now.naive_local()).num_seconds();
    (TWO_HOUR_WINDOW_MIN..=TWO_HOUR_WINDOW_MAX).contains(&until_start)
}

/// Claim time of a reminder still marked as sending.
fn held_since(state: &ReminderStatus) -> Option<DateTime<Utc>> {
    match state {
        ReminderStatus::Sending { claimed_at } => Some(*claimed_at),
        _ => None,
    }
}

fn unique(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
