use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use vault_types::session::BootState;

use crate::AppState;
use crate::error::ApiError;

/// Admit the request only while a user is signed in.
///
/// Inserts the session [`User`](vault_types::models::User) as a request
/// extension for the handlers behind it.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = match state.auth.state() {
        BootState::Authenticated { user } => user,
        BootState::Anonymous => return Err(ApiError::Unauthorized),
        BootState::Initializing => {
            return Err(ApiError::Unavailable(
                "Authentication is still initializing".into(),
            ));
        }
        BootState::Error { message } => return Err(ApiError::Unavailable(message)),
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
