use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use vault_backend::error::VaultError;
use vault_types::api::ErrorBody;

/// Errors a handler can answer with. Rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Sign in to access your vault")]
    Unauthorized,

    /// The bootstrap has not settled, or has failed.
    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Vault(e) => match e {
                VaultError::AccountNotFound(_) => StatusCode::NOT_FOUND,
                VaultError::NotAuthenticated => StatusCode::UNAUTHORIZED,
                VaultError::Remote { .. } | VaultError::Http(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
