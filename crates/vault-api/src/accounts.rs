use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::debug;

use vault_backend::error::VaultError;
use vault_types::api::{AccountQuery, CreateAccountRequest, UpdateAccountRequest};
use vault_types::models::{NewAccount, SocialAccount, User};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// The session user's accounts, newest first.
///
/// Reads fail open: a store error shows up as an empty vault.
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<AccountQuery>,
) -> Json<Vec<SocialAccount>> {
    let needle = query.q.as_deref().map(str::trim).unwrap_or_default();

    let accounts = state
        .backend
        .get_accounts(&user.id)
        .await
        .into_iter()
        .filter(|a| a.matches(needle))
        .map(|a| if query.reveal { a } else { a.masked() })
        .collect();

    Json(accounts)
}

pub async fn create_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateAccountRequest>,
) -> ApiResult<(StatusCode, Json<SocialAccount>)> {
    let platform = req.platform.trim();
    let username = req.username.trim();
    if platform.is_empty() || username.is_empty() {
        return Err(ApiError::BadRequest(
            "Platform and username are required".into(),
        ));
    }

    let account = state
        .backend
        .create_account(NewAccount {
            user_id: user.id,
            platform: platform.to_string(),
            username: username.to_string(),
            password: req.password.filter(|p| !p.is_empty()),
            profile_url: req.profile_url.filter(|u| !u.trim().is_empty()),
            note: req.note,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateAccountRequest>,
) -> ApiResult<Json<SocialAccount>> {
    if !owns(&state, &user, &id).await? {
        return Err(VaultError::AccountNotFound(id).into());
    }
    let updated = state.backend.update_account(&id, patch).await?;
    Ok(Json(updated))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if owns(&state, &user, &id).await? {
        state.backend.delete_account(&id).await?;
    } else {
        debug!("Delete of {} ignored: not in vault of {}", id, user.id);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Whether `id` names one of `user`'s accounts. Store errors propagate.
async fn owns(state: &AppState, user: &User, id: &str) -> ApiResult<bool> {
    let accounts = state.backend.try_get_accounts(&user.id).await?;
    Ok(accounts.iter().any(|a| a.id == id))
}
