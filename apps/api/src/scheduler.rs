use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use notification_cell::services::OutboxRelay;
use scheduler_cell::services::{reactivation_time, REACTIVATION_WEEKDAY};
use scheduler_cell::{next_weekly_run, ReactivationScanner, ReminderScanner};
use shared_config::AppConfig;

/// Spawns the in-process cron loops. Each loop runs its job to completion
/// before waiting for the next tick, so one process never overlaps itself.
pub fn spawn(config: Arc<AppConfig>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(reminder_loop(config.clone(), shutdown.clone())),
        tokio::spawn(outbox_loop(config.clone(), shutdown.clone())),
        tokio::spawn(reactivation_loop(config, shutdown)),
    ]
}

async fn reminder_loop(config: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(config.reminder_scan_interval_minutes.max(1) * 60);
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Reminder scan every {:?}", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now().with_timezone(&config.clinic_offset());
                match ReminderScanner::new(&config).run(now).await {
                    Ok(summary) if !summary.errors.is_empty() => {
                        warn!("Reminder scan finished with {} errors", summary.errors.len());
                    }
                    Ok(_) => {}
                    Err(e) => error!("Reminder scan aborted: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Reminder loop stopped");
}

async fn outbox_loop(config: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) {
    let relay = match OutboxRelay::new(&config) {
        Ok(relay) => relay,
        Err(e) => {
            warn!("Outbox relay disabled: {}", e);
            return;
        }
    };

    let period = Duration::from_secs(config.outbox_relay_interval_minutes.max(1) * 60);
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = relay.relay(Utc::now()).await {
                    error!("Outbox relay pass failed: {}", e);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Outbox loop stopped");
}

async fn reactivation_loop(config: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let now = Utc::now().with_timezone(&config.clinic_offset());
        let next = next_weekly_run(now, REACTIVATION_WEEKDAY, reactivation_time());
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("Next reactivation scan at {}", next);

        tokio::select! {
            _ = time::sleep(wait) => {
                let now = Utc::now().with_timezone(&config.clinic_offset());
                match ReactivationScanner::new(&config).run(now).await {
                    Ok(summary) => info!("Reactivation scan queued {} events", summary.events_queued),
                    Err(e) => error!("Reactivation scan aborted: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Reactivation loop stopped");
}
