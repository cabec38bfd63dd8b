mod support;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};

use appointment_cell::models::{Appointment, ReminderStatus, ReminderWindow};
use notification_cell::models::{Channel, DeliveryStatus, MessageTemplate};
use notification_cell::services::MessageSender;
use patient_cell::models::{NotificationPreferences, Organization, Patient};
use scheduler_cell::models::SchedulerError;
use scheduler_cell::ReminderScanner;

use support::*;

struct Harness {
    store: Arc<InMemoryAppointments>,
    whatsapp: Arc<RecordingSender>,
    email: Arc<RecordingSender>,
    log: Arc<RecordingLog>,
    scanner: ReminderScanner,
}

fn harness(
    appointments: Vec<Appointment>,
    patients: Vec<Patient>,
    organizations: Vec<Organization>,
    whatsapp: RecordingSender,
) -> Harness {
    let store = Arc::new(InMemoryAppointments::with(appointments));
    let whatsapp = Arc::new(whatsapp);
    let email = Arc::new(RecordingSender::new(Channel::Email));
    let log = Arc::new(RecordingLog::default());

    let scanner = ReminderScanner::with_parts(
        store.clone(),
        Arc::new(StaticDirectory { patients, organizations }),
        Some(whatsapp.clone() as Arc<dyn MessageSender>),
        Some(email.clone() as Arc<dyn MessageSender>),
        log.clone(),
    );

    Harness { store, whatsapp, email, log, scanner }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn appointment_exactly_a_day_ahead_gets_one_whatsapp_reminder() {
    let org = organization(Some(true), None);
    let maria = patient(org.id, Some("(11) 98888-7777"), None);
    let tomorrow = appointment(&maria, date(2026, 10, 19), time(9, 0));
    let appointment_id = tomorrow.id;
    let now = clinic_time(2026, 10, 18, 9, 0);

    let h = harness(vec![tomorrow], vec![maria], vec![org], RecordingSender::new(Channel::WhatsApp));
    let summary = h.scanner.run(now).await.unwrap();

    assert_eq!(summary.reminders_24h, 1);
    assert_eq!(summary.reminders_2h, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(h.whatsapp.sent_count(), 1);
    assert_eq!(h.email.sent_count(), 0);

    let sent = h.whatsapp.sent.lock().unwrap()[0].clone();
    assert_eq!(sent.template, MessageTemplate::AppointmentReminder24h);
    assert_eq!(sent.parameters, vec!["Maria Souza", "19/10/2026", "09:00", "Dra. Ana"]);

    let entries = h.log.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message_type, "reminder_24h");
    assert_eq!(entries[0].to_phone, "5511988887777");
    assert_eq!(entries[0].status, DeliveryStatus::Sent);
    assert_eq!(entries[0].appointment_id, Some(appointment_id));

    let stored = h.store.get(appointment_id);
    assert_eq!(stored.reminder_sent_24h, Some(now.with_timezone(&Utc)));
    assert_eq!(stored.reminder_sent_2h, None);
    assert_matches!(
        h.store.state(appointment_id, ReminderWindow::TwentyFourHours),
        ReminderStatus::Sent { .. }
    );
}

#[tokio::test]
async fn rerunning_the_scan_never_sends_twice() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let tomorrow = appointment(&maria, date(2026, 10, 19), time(15, 0));
    let now = clinic_time(2026, 10, 18, 9, 0);

    let h = harness(vec![tomorrow], vec![maria], vec![org], RecordingSender::new(Channel::WhatsApp));
    let first = h.scanner.run(now).await.unwrap();
    let second = h.scanner.run(clinic_time(2026, 10, 18, 9, 30)).await.unwrap();

    assert_eq!(first.reminders_24h, 1);
    assert_eq!(second.reminders_24h, 0);
    assert_eq!(h.whatsapp.sent_count(), 1);
}

#[tokio::test]
async fn appointments_with_a_marker_are_left_alone() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let mut tomorrow = appointment(&maria, date(2026, 10, 19), time(9, 0));
    let earlier = clinic_time(2026, 10, 18, 8, 30).with_timezone(&Utc);
    tomorrow.reminder_sent_24h = Some(earlier);
    let id = tomorrow.id;

    let h = harness(vec![tomorrow], vec![maria], vec![org], RecordingSender::new(Channel::WhatsApp));
    let summary = h.scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();

    assert_eq!(summary.reminders_24h, 0);
    assert_eq!(h.whatsapp.sent_count(), 0);
    assert_eq!(h.store.get(id).reminder_sent_24h, Some(earlier));
}

#[tokio::test]
async fn two_hour_reminder_fires_only_inside_the_band() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let now = clinic_time(2026, 10, 18, 8, 0);
    let today = date(2026, 10, 18);

    let in_one_hour = appointment(&maria, today, time(9, 0));
    let at_lower_edge = appointment(&maria, today, time(9, 30));
    let at_upper_edge = appointment(&maria, today, time(10, 30));
    let just_past_band = appointment(&maria, today, time(10, 31));
    let edge_ids = [at_lower_edge.id, at_upper_edge.id];
    let outside_ids = [in_one_hour.id, just_past_band.id];

    let h = harness(
        vec![in_one_hour, at_lower_edge, at_upper_edge, just_past_band],
        vec![maria],
        vec![org],
        RecordingSender::new(Channel::WhatsApp),
    );
    let summary = h.scanner.run(now).await.unwrap();

    assert_eq!(summary.reminders_2h, 2);
    assert_eq!(h.whatsapp.sent_count(), 2);
    for id in edge_ids {
        assert!(h.store.get(id).reminder_sent_2h.is_some());
    }
    for id in outside_ids {
        assert!(h.store.get(id).reminder_sent_2h.is_none());
        assert_eq!(h.store.state(id, ReminderWindow::TwoHours), ReminderStatus::NotSent);
    }
}

#[tokio::test]
async fn appointment_in_one_hour_gets_no_two_hour_reminder() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let soon = appointment(&maria, date(2026, 10, 18), time(11, 0));
    let id = soon.id;

    let h = harness(vec![soon], vec![maria], vec![org], RecordingSender::new(Channel::WhatsApp));
    let summary = h.scanner.run(clinic_time(2026, 10, 18, 10, 0)).await.unwrap();

    assert_eq!(summary.reminders_2h, 0);
    assert_eq!(h.whatsapp.sent_count(), 0);
    assert!(h.store.get(id).reminder_sent_2h.is_none());
}

#[tokio::test]
async fn failed_sends_are_reported_and_retried_on_the_next_run() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let tomorrow = appointment(&maria, date(2026, 10, 19), time(9, 0));
    let id = tomorrow.id;
    let now = clinic_time(2026, 10, 18, 9, 0);

    let h = harness(
        vec![tomorrow.clone()],
        vec![maria.clone()],
        vec![org.clone()],
        RecordingSender::failing(Channel::WhatsApp),
    );
    let summary = h.scanner.run(now).await.unwrap();

    assert_eq!(summary.reminders_24h, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].appointment_id, id);
    assert_eq!(summary.errors[0].window, ReminderWindow::TwentyFourHours);
    assert!(h.store.get(id).reminder_sent_24h.is_none());
    assert_matches!(
        h.store.state(id, ReminderWindow::TwentyFourHours),
        ReminderStatus::Failed { .. }
    );

    let entries = h.log.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, DeliveryStatus::Failed);
    assert!(entries[0].error.is_some());

    // Same store, healthy provider: the failed reminder is claimed again.
    let healthy = Arc::new(RecordingSender::new(Channel::WhatsApp));
    let retry = ReminderScanner::with_parts(
        h.store.clone(),
        Arc::new(StaticDirectory { patients: vec![maria], organizations: vec![org] }),
        Some(healthy.clone() as Arc<dyn MessageSender>),
        None,
        Arc::new(RecordingLog::default()),
    );
    let summary = retry.run(clinic_time(2026, 10, 18, 9, 30)).await.unwrap();

    assert_eq!(summary.reminders_24h, 1);
    assert_eq!(healthy.sent_count(), 1);
    assert!(h.store.get(id).reminder_sent_24h.is_some());
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let org = organization(None, None);
    let reachable = patient(org.id, None, Some("joao@example.com"));
    let unreachable_phone = patient(org.id, Some("123"), None);
    let ok = appointment(&reachable, date(2026, 10, 19), time(9, 0));
    let broken = appointment(&unreachable_phone, date(2026, 10, 19), time(10, 0));

    let whatsapp = Arc::new(RecordingSender::failing(Channel::WhatsApp));
    let email = Arc::new(RecordingSender::new(Channel::Email));
    let store = Arc::new(InMemoryAppointments::with(vec![broken, ok]));
    let scanner = ReminderScanner::with_parts(
        store.clone(),
        Arc::new(StaticDirectory {
            patients: vec![reachable, unreachable_phone],
            organizations: vec![org],
        }),
        Some(whatsapp as Arc<dyn MessageSender>),
        Some(email.clone() as Arc<dyn MessageSender>),
        Arc::new(RecordingLog::default()),
    );

    let summary = scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();
    assert_eq!(summary.reminders_24h, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(email.sent_count(), 1);
}

#[tokio::test]
async fn email_is_the_fallback_channel() {
    let org = organization(Some(false), Some(true));
    let maria = patient(org.id, Some("11988887777"), Some("maria@example.com"));
    let tomorrow = appointment(&maria, date(2026, 10, 19), time(9, 0));

    let h = harness(vec![tomorrow], vec![maria], vec![org], RecordingSender::new(Channel::WhatsApp));
    let summary = h.scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();

    assert_eq!(summary.reminders_24h, 1);
    assert_eq!(h.whatsapp.sent_count(), 0);
    assert_eq!(h.email.sent_count(), 1);
    assert!(h.log.entries.lock().unwrap().is_empty());

    let sent = h.email.sent.lock().unwrap()[0].clone();
    assert_eq!(sent.to, "maria@example.com");
    assert!(sent.subject.contains("amanhã"));
}

#[tokio::test]
async fn unreachable_patients_are_skipped_without_a_marker() {
    let org = organization(None, None);
    let mut opted_out = patient(org.id, Some("11988887777"), Some("maria@example.com"));
    opted_out.notification_preferences = NotificationPreferences {
        whatsapp: Some(false),
        email: Some(false),
    };
    let tomorrow = appointment(&opted_out, date(2026, 10, 19), time(9, 0));
    let id = tomorrow.id;

    let h = harness(vec![tomorrow], vec![opted_out], vec![org], RecordingSender::new(Channel::WhatsApp));
    let summary = h.scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.reminders_24h, 0);
    assert!(summary.errors.is_empty());
    assert!(h.store.get(id).reminder_sent_24h.is_none());
    assert_eq!(h.store.state(id, ReminderWindow::TwentyFourHours), ReminderStatus::NotSent);
}

#[tokio::test]
async fn reminders_claimed_by_another_run_are_not_sent() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let tomorrow = appointment(&maria, date(2026, 10, 19), time(9, 0));
    let id = tomorrow.id;

    let h = harness(vec![tomorrow], vec![maria], vec![org], RecordingSender::new(Channel::WhatsApp));
    h.store.reminders.lock().unwrap().insert(
        (id, ReminderWindow::TwentyFourHours),
        ReminderStatus::Sending { claimed_at: Utc::now() },
    );

    let summary = h.scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();

    assert_eq!(summary.reminders_24h, 0);
    assert!(summary.errors.is_empty());
    assert_eq!(h.whatsapp.sent_count(), 0);
}

#[tokio::test]
async fn query_failures_abort_the_run() {
    let scanner = ReminderScanner::with_parts(
        Arc::new(InMemoryAppointments::failing()),
        Arc::new(StaticDirectory::default()),
        Some(Arc::new(RecordingSender::new(Channel::WhatsApp)) as Arc<dyn MessageSender>),
        None,
        Arc::new(RecordingLog::default()),
    );

    let result = scanner.run(clinic_time(2026, 10, 18, 9, 0)).await;
    assert_matches!(result, Err(SchedulerError::Store(_)));
}

#[tokio::test]
async fn missing_patient_rows_count_as_skipped() {
    let org = organization(None, None);
    let ghost = patient(org.id, Some("11988887777"), None);
    let tomorrow = appointment(&ghost, date(2026, 10, 19), time(9, 0));

    let h = harness(vec![tomorrow], vec![], vec![org], RecordingSender::new(Channel::WhatsApp));
    let summary = h.scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(h.whatsapp.sent_count(), 0);
}

#[tokio::test]
async fn a_marker_write_failure_after_sending_is_never_resent() {
    let org = organization(None, None);
    let maria = patient(org.id, Some("11988887777"), None);
    let tomorrow = appointment(&maria, date(2026, 10, 19), time(9, 0));
    let id = tomorrow.id;

    let store = Arc::new(InMemoryAppointments::failing_marks(vec![tomorrow]));
    let whatsapp = Arc::new(RecordingSender::new(Channel::WhatsApp));
    let scanner = ReminderScanner::with_parts(
        store.clone(),
        Arc::new(StaticDirectory { patients: vec![maria], organizations: vec![org] }),
        Some(whatsapp.clone() as Arc<dyn MessageSender>),
        None,
        Arc::new(RecordingLog::default()),
    );

    let summary = scanner.run(clinic_time(2026, 10, 18, 9, 0)).await.unwrap();
    assert_eq!(whatsapp.sent_count(), 1);
    assert_eq!(summary.reminders_24h, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].appointment_id, id);
    assert!(store.get(id).reminder_sent_24h.is_none());
    assert_matches!(
        store.state(id, ReminderWindow::TwentyFourHours),
        ReminderStatus::Sending { .. }
    );

    // The claim stays held, so the next run leaves the appointment alone.
    let rerun = scanner.run(clinic_time(2026, 10, 18, 9, 30)).await.unwrap();
    assert_eq!(whatsapp.sent_count(), 1);
    assert_eq!(rerun.reminders_24h, 0);
    assert!(rerun.errors.is_empty());
}
