// libs/scheduler-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::post,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::service_role_middleware;

use crate::handlers;

pub fn scheduler_routes(state: Arc<AppConfig>) -> Router {
    let service_routes = Router::new()
        .route("/reminders/run", post(handlers::run_reminders))
        .route("/reactivation/run", post(handlers::run_reactivation))
        .route("/reactivation/patients/{patient_id}", post(handlers::trigger_patient_reactivation))
        .route("/outbox/relay", post(handlers::relay_outbox))
        .layer(middleware::from_fn_with_state(state.clone(), service_role_middleware));

    Router::new()
        .merge(service_routes)
        .with_state(state)
}
