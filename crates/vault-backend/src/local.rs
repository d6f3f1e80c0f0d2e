use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use vault_db::Database;
use vault_types::auth::{AuthError, AuthResult, validate_credentials};
use vault_types::models::{
    AccountPatch, NewAccount, SocialAccount, User, default_name, sort_newest_first,
};

use crate::config::BackendKind;
use crate::error::{Result, VaultError};
use crate::session::{AuthCallback, SessionHub, Unsubscribe};
use crate::{AuthNotifier, Backend, password};

pub const USERS_KEY: &str = "socialvault_users";
pub const ACCOUNTS_KEY: &str = "socialvault_accounts";
pub const SESSION_KEY: &str = "socialvault_session";

/// A registered user as kept in the users record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    id: String,
    email: String,
    /// Argon2 PHC string, never the password itself.
    password: String,
    #[serde(default)]
    name: Option<String>,
}

impl StoredUser {
    fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Artificial delay before each operation, so a UI built against this store
/// behaves the way it will against a hosted one.
#[derive(Debug, Clone, Copy)]
pub struct LocalLatency {
    pub login: Duration,
    pub register: Duration,
    pub read: Duration,
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl LocalLatency {
    pub fn none() -> Self {
        Self {
            login: Duration::ZERO,
            register: Duration::ZERO,
            read: Duration::ZERO,
            create: Duration::ZERO,
            update: Duration::ZERO,
            delete: Duration::ZERO,
        }
    }
}

impl Default for LocalLatency {
    fn default() -> Self {
        Self {
            login: Duration::from_millis(600),
            register: Duration::from_millis(800),
            read: Duration::from_millis(400),
            create: Duration::from_millis(400),
            update: Duration::from_millis(300),
            delete: Duration::from_millis(300),
        }
    }
}

/// Vault kept entirely on this device in three JSON records: users,
/// accounts and the current session.
pub struct LocalBackend {
    db: Arc<Database>,
    latency: LocalLatency,
    hub: SessionHub,
}

impl LocalBackend {
    pub fn new(db: Arc<Database>, latency: LocalLatency) -> Self {
        let hub = SessionHub::new();
        let backend = Self { db, latency, hub };
        backend.hub.publish(backend.get_session());
        backend
    }

    /// The user recorded as signed in, if any.
    pub fn get_session(&self) -> Option<User> {
        match self.db.get_json::<User>(SESSION_KEY) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable session record: {}", e);
                None
            }
        }
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Run blocking storage work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

/// Recover a typed error smuggled through a storage closure.
fn auth_failure(e: anyhow::Error) -> AuthError {
    match e.downcast::<AuthError>() {
        Ok(auth) => auth,
        Err(e) => {
            error!("Local auth storage failure: {}", e);
            AuthError::Failed
        }
    }
}

fn data_failure(e: anyhow::Error) -> VaultError {
    match e.downcast::<VaultError>() {
        Ok(vault) => vault,
        Err(e) => VaultError::Storage(e),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthNotifier for LocalBackend {
    fn on_auth_change(&self, callback: AuthCallback) -> Result<Unsubscribe> {
        self.hub.subscribe(callback)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        self.pause(self.latency.login).await;

        let email = normalize_email(email);
        let password = password.to_string();

        let user = self
            .blocking(move |db| {
                let users: Vec<StoredUser> = db.get_json(USERS_KEY)?.unwrap_or_default();
                let matched = users
                    .iter()
                    .find(|u| u.email == email && password::verify(&password, &u.password))
                    .map(StoredUser::to_user)
                    .ok_or(AuthError::InvalidCredentials)?;

                db.set_json(SESSION_KEY, &matched)?;
                Ok(matched)
            })
            .await
            .map_err(auth_failure)?;

        debug!("Local login for {}", user.id);
        self.hub.publish(Some(user.clone()));
        Ok(user)
    }

    async fn register(&self, email: &str, password: &str, name: Option<&str>) -> AuthResult<User> {
        self.pause(self.latency.register).await;

        validate_credentials(email, password)?;

        let email = normalize_email(email);
        let password = password.to_string();
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name(&email))
            .to_string();

        let user = self
            .blocking(move |db| {
                let hash = password::hash(&password)?;
                let stored = StoredUser {
                    id: Uuid::new_v4().to_string(),
                    email,
                    password: hash,
                    name: Some(name),
                };

                db.update_json(USERS_KEY, |users: &mut Vec<StoredUser>| {
                    if users.iter().any(|u| u.email == stored.email) {
                        return Err(AuthError::AlreadyRegistered.into());
                    }
                    users.push(stored.clone());
                    Ok(())
                })?;

                let user = stored.to_user();
                db.set_json(SESSION_KEY, &user)?;
                Ok(user)
            })
            .await
            .map_err(auth_failure)?;

        debug!("Local registration for {}", user.id);
        self.hub.publish(Some(user.clone()));
        Ok(user)
    }

    async fn logout(&self) -> Result<()> {
        self.blocking(|db| db.remove_item(SESSION_KEY))
            .await
            .map_err(data_failure)?;
        self.hub.publish(None);
        Ok(())
    }

    async fn try_get_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        self.pause(self.latency.read).await;

        let user_id = user_id.to_string();
        let mut accounts = self
            .blocking(move |db| {
                let all: Vec<SocialAccount> = db.get_json(ACCOUNTS_KEY)?.unwrap_or_default();
                Ok(all
                    .into_iter()
                    .filter(|a| a.user_id == user_id)
                    .collect::<Vec<_>>())
            })
            .await
            .map_err(data_failure)?;

        sort_newest_first(&mut accounts);
        Ok(accounts)
    }

    async fn create_account(&self, account: NewAccount) -> Result<SocialAccount> {
        self.pause(self.latency.create).await;

        self.blocking(move |db| {
            db.update_json(ACCOUNTS_KEY, |all: &mut Vec<SocialAccount>| {
                // Keep creation times strictly increasing so newest-first is total.
                let now = chrono::Utc::now().timestamp_millis();
                let created_at = match all.iter().map(|a| a.created_at).max() {
                    Some(latest) if latest >= now => latest + 1,
                    _ => now,
                };

                let created =
                    SocialAccount::from_new(Uuid::new_v4().to_string(), created_at, account);
                all.push(created.clone());
                Ok(created)
            })
        })
        .await
        .map_err(data_failure)
    }

    async fn update_account(&self, id: &str, patch: AccountPatch) -> Result<SocialAccount> {
        self.pause(self.latency.update).await;

        let id = id.to_string();
        self.blocking(move |db| {
            db.update_json(ACCOUNTS_KEY, |all: &mut Vec<SocialAccount>| {
                let account = all
                    .iter_mut()
                    .find(|a| a.id == id)
                    .ok_or_else(|| VaultError::AccountNotFound(id.clone()))?;
                patch.apply(account);
                Ok(account.clone())
            })
        })
        .await
        .map_err(data_failure)
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.pause(self.latency.delete).await;

        let id = id.to_string();
        self.blocking(move |db| {
            db.update_json(ACCOUNTS_KEY, |all: &mut Vec<SocialAccount>| {
                all.retain(|a| a.id != id);
                Ok(())
            })
        })
        .await
        .map_err(data_failure)
    }
}
