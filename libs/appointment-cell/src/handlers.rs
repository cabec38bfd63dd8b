// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentStatus, CancelAppointmentRequest, CreateAppointmentRequest,
    RescheduleAppointmentRequest, UpdateStatusRequest,
};
use crate::services::appointment::AppointmentService;

#[axum::debug_handler]
pub async fn create_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    debug!("User {} booking appointment for patient {}", user.id, request.patient_id);
    let service = AppointmentService::new(&config);
    Ok(Json(service.create(request).await?))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let service = AppointmentService::new(&config);
    Ok(Json(service.get(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    debug!("User {} rescheduling appointment {}", user.id, appointment_id);
    let service = AppointmentService::new(&config);
    Ok(Json(service.reschedule(appointment_id, request).await?))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    debug!("User {} cancelling appointment {}", user.id, appointment_id);
    let service = AppointmentService::new(&config);
    Ok(Json(service.cancel(appointment_id, request).await?))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    let service = AppointmentService::new(&config);
    let updated = match request.status {
        AppointmentStatus::Concluido => service.complete(appointment_id).await?,
        status => service.transition(appointment_id, status).await?,
    };
    Ok(Json(updated))
}
