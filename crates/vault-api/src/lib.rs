//! HTTP surface of the vault.
//!
//! Auth routes are public. Account routes sit behind [`middleware::require_session`]
//! and always act on behalf of the signed-in user.

pub mod accounts;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod middleware;

use axum::{
    Router,
    routing::{get, patch, post},
};

pub use auth::{AppState, AppStateInner};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/state", get(auth::auth_state))
        .route("/config/report", get(auth::config_report));

    let protected_routes = Router::new()
        .route(
            "/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/accounts/{id}",
            patch(accounts::update_account).delete(accounts::delete_account),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
