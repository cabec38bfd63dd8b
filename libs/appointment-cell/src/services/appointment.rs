// libs/appointment-cell/src/services/appointment.rs
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelAppointmentRequest,
    CreateAppointmentRequest, RescheduleAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

/// Booking-side mutations. Reminder markers are left untouched by every
/// operation here; cancelling is a status change, never a delete.
pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_store(Arc::new(SupabaseAppointmentStore::new(config)))
    }

    pub fn with_store(store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    pub async fn create(&self, request: CreateAppointmentRequest) -> Result<Appointment, AppointmentError> {
        AppointmentLifecycleService::validate_time_range(request.start_time, request.end_time)?;
        let appointment = self.store.create_appointment(&request).await?;
        info!("Appointment {} booked for {}", appointment.id, appointment.starts_at());
        Ok(appointment)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store.get_appointment(appointment_id).await
    }

    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.store.get_appointment(appointment_id).await?;
        self.lifecycle
            .validate_reschedule(current.status, request.start_time, request.end_time)?;

        let updated = self.store
            .update_schedule(appointment_id, request.date, request.start_time, request.end_time)
            .await?;
        info!(
            "Appointment {} moved from {} to {}",
            appointment_id,
            current.starts_at(),
            updated.starts_at()
        );
        Ok(updated)
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let updated = self.transition(appointment_id, AppointmentStatus::Cancelado).await?;
        info!(
            "Appointment {} cancelled ({})",
            appointment_id,
            request.reason.as_deref().unwrap_or("no reason given")
        );
        Ok(updated)
    }

    /// Marks the session as attended; it then counts as the patient's last visit.
    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Concluido).await
    }

    pub async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.store.get_appointment(appointment_id).await?;
        self.lifecycle.validate_status_transition(current.status, new_status)?;
        self.store.update_status(appointment_id, new_status).await
    }
}
