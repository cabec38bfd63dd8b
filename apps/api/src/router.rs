use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use scheduler_cell::router::scheduler_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "FisioFlow scheduling API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/scheduler", scheduler_routes(state.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    #[tokio::test]
    async fn root_answers_without_auth() {
        let app = create_router(TestConfig::default().to_arc());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cells_are_mounted_behind_auth() {
        let app = create_router(TestConfig::default().to_arc());
        for (verb, uri) in [("POST", "/scheduler/reminders/run"), ("POST", "/appointments")] {
            let response = app
                .clone()
                .oneshot(Request::builder().method(verb).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }
}
