//! Persistence for the vault: one contract, two interchangeable stores.
//!
//! [`local::LocalBackend`] keeps everything in an on-device key-value file.
//! [`remote::RemoteBackend`] delegates sign-in to a hosted identity service
//! and keeps accounts in a hosted document store. Callers hold an
//! `Arc<dyn Backend>` chosen once at startup by [`connect`].

pub mod config;
pub mod error;
pub mod local;
pub mod password;
pub mod remote;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use vault_db::Database;
use vault_types::auth::AuthResult;
use vault_types::models::{AccountPatch, NewAccount, SocialAccount, User};

use crate::config::{BackendKind, VaultConfig};
use crate::error::{Result, VaultError};
use crate::session::{AuthCallback, Unsubscribe};

/// Source of session-change notifications.
pub trait AuthNotifier: Send + Sync {
    /// Register `callback` for the current session and every later change.
    /// The subscription ends when the returned handle is dropped.
    fn on_auth_change(&self, callback: AuthCallback) -> Result<Unsubscribe>;
}

#[async_trait]
pub trait Backend: AuthNotifier {
    fn kind(&self) -> BackendKind;

    async fn login(&self, email: &str, password: &str) -> AuthResult<User>;

    async fn register(&self, email: &str, password: &str, name: Option<&str>) -> AuthResult<User>;

    async fn logout(&self) -> Result<()>;

    /// Accounts owned by `user_id`, newest first. May fail.
    async fn try_get_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>>;

    /// Accounts owned by `user_id`, newest first.
    ///
    /// Never fails: errors are logged and read as an empty vault.
    async fn get_accounts(&self, user_id: &str) -> Vec<SocialAccount> {
        match self.try_get_accounts(user_id).await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("Error fetching accounts for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    async fn create_account(&self, account: NewAccount) -> Result<SocialAccount>;

    async fn update_account(&self, id: &str, patch: AccountPatch) -> Result<SocialAccount>;

    async fn delete_account(&self, id: &str) -> Result<()>;
}

/// Build the backend the configuration asks for.
///
/// The data file holds the whole vault for the local store and only the
/// persisted session for the remote one.
pub async fn connect(config: &VaultConfig) -> Result<Arc<dyn Backend>> {
    let path = config.data_path.clone();
    let db = tokio::task::spawn_blocking(move || Database::open(&path))
        .await?
        .map_err(VaultError::Storage)?;
    let db = Arc::new(db);

    let backend: Arc<dyn Backend> = match config.backend {
        BackendKind::Local => {
            let latency = if config.simulate_latency {
                local::LocalLatency::default()
            } else {
                local::LocalLatency::none()
            };
            Arc::new(local::LocalBackend::new(db, latency))
        }
        BackendKind::Remote => remote::RemoteBackend::connect(&config.firebase, db)?,
    };

    info!("Using {:?} backend", backend.kind());
    Ok(backend)
}
