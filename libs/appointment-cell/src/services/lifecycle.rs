// libs/appointment-cell/src/services/lifecycle.rs
use chrono::NaiveTime;
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Agendado => vec![
                AppointmentStatus::Confirmado,
                AppointmentStatus::Concluido,
                AppointmentStatus::Cancelado,
            ],
            AppointmentStatus::Confirmado => vec![
                AppointmentStatus::Concluido,
                AppointmentStatus::Cancelado,
            ],
            // Terminal states
            AppointmentStatus::Concluido => vec![],
            AppointmentStatus::Cancelado => vec![],
        }
    }

    /// Only open appointments can move, and the new slot must not be inverted.
    pub fn validate_reschedule(
        &self,
        current_status: AppointmentStatus,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<(), AppointmentError> {
        if current_status.is_terminal() {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot reschedule an appointment that is {}",
                current_status
            )));
        }
        Self::validate_time_range(start_time, end_time)
    }

    pub fn validate_time_range(start_time: NaiveTime, end_time: NaiveTime) -> Result<(), AppointmentError> {
        if end_time <= start_time {
            return Err(AppointmentError::InvalidTimeRange);
        }
        Ok(())
    }
}
