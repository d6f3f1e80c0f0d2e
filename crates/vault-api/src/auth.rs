use std::sync::Arc;
use std::time::Duration;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, info};

use vault_backend::Backend;
use vault_backend::config::FirebaseConfig;
use vault_types::api::{ApiResponse, LoginRequest, RegisterRequest};
use vault_types::auth::{AuthError, AuthResult};
use vault_types::models::User;
use vault_types::session::BootState;

use crate::bootstrap::AuthBootstrap;
use crate::error::ApiResult;

/// How long an auth handler waits for its session change to reach the bootstrap.
const SETTLE_WITHIN: Duration = Duration::from_secs(1);

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub backend: Arc<dyn Backend>,
    pub auth: AuthBootstrap,
    pub firebase: FirebaseConfig,
}

pub fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials | AuthError::WrongEmailOrPassword => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::AlreadyRegistered | AuthError::EmailInUse => StatusCode::CONFLICT,
        AuthError::InvalidEmail | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
        AuthError::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn respond(
    state: &AppState,
    result: AuthResult<User>,
    success: StatusCode,
) -> (StatusCode, Json<ApiResponse<User>>) {
    let status = match &result {
        Ok(user) => {
            state.auth.settle(Some(&user.id), SETTLE_WITHIN).await;
            success
        }
        Err(e) => {
            debug!("Auth request rejected: {}", e);
            auth_status(e)
        }
    };
    (status, Json(ApiResponse::from(result)))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let result = state
        .backend
        .register(&req.email, &req.password, req.name.as_deref())
        .await;
    if let Ok(user) = &result {
        info!("Registered user {}", user.id);
    }
    respond(&state, result, StatusCode::CREATED).await
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let result = state.backend.login(&req.email, &req.password).await;
    respond(&state, result, StatusCode::OK).await
}

pub async fn logout(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.backend.logout().await?;
    state.auth.settle(None, SETTLE_WITHIN).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn auth_state(State(state): State<AppState>) -> Json<BootState> {
    Json(state.auth.state())
}

pub async fn config_report(State(state): State<AppState>) -> String {
    state.firebase.report()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_and_local_failures_share_statuses() {
        assert_eq!(auth_status(&AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(auth_status(&AuthError::WrongEmailOrPassword), StatusCode::UNAUTHORIZED);
        assert_eq!(auth_status(&AuthError::AlreadyRegistered), StatusCode::CONFLICT);
        assert_eq!(auth_status(&AuthError::EmailInUse), StatusCode::CONFLICT);
        assert_eq!(auth_status(&AuthError::WeakPassword), StatusCode::BAD_REQUEST);
    }
}
