use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&config, &request)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Like `auth_middleware`, but only lets service role tokens through. Cron
/// invocations of the scanners authenticate this way.
pub async fn service_role_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&config, &request)?;

    if !user.is_service_role() {
        return Err(AppError::Forbidden("Service role token required".to_string()));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn authenticate<B>(config: &AppConfig, request: &Request<B>) -> Result<User, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    validate_token(token, &config.supabase_jwt_secret).map_err(AppError::Auth)
}
