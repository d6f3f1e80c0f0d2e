pub mod firestore;
pub mod identity;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vault_db::Database;
use vault_types::auth::{AuthResult, validate_credentials};
use vault_types::models::{AccountPatch, NewAccount, SocialAccount, User, default_name};

use crate::config::{BackendKind, FirebaseConfig};
use crate::error::{Result, VaultError};
use crate::session::{AuthCallback, SessionHub, Unsubscribe};
use crate::{AuthNotifier, Backend};

use firestore::FirestoreClient;
use identity::{IdentityClient, auth_error, expires_in_ms};

/// Where the signed-in token pair is kept between runs.
pub const REMOTE_SESSION_KEY: &str = "socialvault_remote_session";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Refresh this long before the id token actually expires.
const EXPIRY_SLACK_MS: i64 = 60_000;

/// Decode a service response, turning its error envelope into `VaultError::Remote`.
pub(crate) async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    Err(VaultError::Remote {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    user: User,
    id_token: String,
    refresh_token: String,
    /// Epoch milliseconds.
    expires_at: i64,
}

impl RemoteSession {
    fn is_stale(&self, now: i64) -> bool {
        now + EXPIRY_SLACK_MS >= self.expires_at
    }
}

/// The signed-in session plus a counter bumped by every sign-in and sign-out.
///
/// Startup restore only installs its result if the counter has not moved.
#[derive(Debug, Default)]
struct SessionSlot {
    current: Option<RemoteSession>,
    generation: u64,
}

/// Vault backed by the hosted identity service and document store.
///
/// The account password field is stored in the document as given; sign-in
/// passwords only ever go to the identity service.
pub struct RemoteBackend {
    identity: IdentityClient,
    store: FirestoreClient,
    db: Arc<Database>,
    session: Mutex<SessionSlot>,
    hub: SessionHub,
}

impl RemoteBackend {
    /// Validate settings, build the clients and start restoring any saved session.
    ///
    /// Subscribers hear nothing until the restore finishes.
    pub fn connect(config: &FirebaseConfig, db: Arc<Database>) -> Result<Arc<Self>> {
        let api_key = config.require_api_key()?;
        let project_id = config.require_project_id()?;

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let backend = Arc::new(Self {
            identity: IdentityClient::new(
                http.clone(),
                &config.identity_endpoint,
                &config.securetoken_endpoint,
                api_key,
            ),
            store: FirestoreClient::new(http, &config.firestore_endpoint, project_id),
            db,
            session: Mutex::new(SessionSlot::default()),
            hub: SessionHub::new(),
        });

        let restoring = backend.clone();
        tokio::spawn(async move { restoring.restore_session().await });

        info!("Remote backend configured for project {}", project_id);
        Ok(backend)
    }

    /// Runs once, from `connect`. Any sign-in or sign-out that lands first
    /// takes precedence over the saved session.
    async fn restore_session(&self) {
        let generation = 0;

        let saved = match self.load_saved().await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Could not read saved session: {}", e);
                None
            }
        };

        let Some(saved) = saved else {
            let slot = self.session.lock().await;
            if slot.generation == generation {
                self.hub.publish(None);
            }
            return;
        };

        let refreshed = self.identity.refresh(&saved.refresh_token).await;

        let mut slot = self.session.lock().await;
        if slot.generation != generation {
            debug!("Session changed while restoring; discarding restored session");
            return;
        }

        let mut session = saved;
        match refreshed {
            Ok(grant) => {
                session.id_token = grant.id_token;
                session.refresh_token = grant.refresh_token;
                session.expires_at = now_ms() + expires_in_ms(&grant.expires_in);
                if let Err(e) = self.save(Some(&session)).await {
                    warn!("Could not persist refreshed session: {}", e);
                }
            }
            Err(VaultError::Remote { status, message }) => {
                info!("Saved session rejected ({}): {}", status, message);
                if let Err(e) = self.save(None).await {
                    warn!("Could not clear rejected session: {}", e);
                }
                self.hub.publish(None);
                return;
            }
            // Unreachable service: keep the cached user, refresh on first use.
            Err(e) => warn!("Session refresh deferred: {}", e),
        }

        debug!("Restored session for {}", session.user.id);
        let user = session.user.clone();
        slot.current = Some(session);
        self.hub.publish(Some(user));
    }

    async fn load_saved(&self) -> Result<Option<RemoteSession>> {
        let db = self.db.clone();
        let saved = tokio::task::spawn_blocking(move || db.get_json(REMOTE_SESSION_KEY))
            .await?
            .map_err(VaultError::Storage)?;
        Ok(saved)
    }

    async fn save(&self, session: Option<&RemoteSession>) -> Result<()> {
        let db = self.db.clone();
        let session = session.cloned();
        tokio::task::spawn_blocking(move || match session {
            Some(s) => db.set_json(REMOTE_SESSION_KEY, &s),
            None => db.remove_item(REMOTE_SESSION_KEY),
        })
        .await?
        .map_err(VaultError::Storage)
    }

    /// Install a fresh sign-in. Save and publish happen under the session
    /// lock so a concurrent restore or sign-out cannot reorder them.
    async fn establish(&self, session: RemoteSession) -> User {
        let mut slot = self.session.lock().await;
        slot.generation += 1;
        if let Err(e) = self.save(Some(&session)).await {
            warn!("Could not persist session: {}", e);
        }
        let user = session.user.clone();
        slot.current = Some(session);
        self.hub.publish(Some(user.clone()));
        user
    }

    /// A usable id token, refreshed first if it is about to expire.
    async fn id_token(&self) -> Result<String> {
        let mut slot = self.session.lock().await;
        let session = slot.current.as_mut().ok_or(VaultError::NotAuthenticated)?;

        if session.is_stale(now_ms()) {
            let grant = self.identity.refresh(&session.refresh_token).await?;
            session.id_token = grant.id_token;
            session.refresh_token = grant.refresh_token;
            session.expires_at = now_ms() + expires_in_ms(&grant.expires_in);
            let refreshed = session.clone();

            if let Err(e) = self.save(Some(&refreshed)).await {
                warn!("Could not persist refreshed session: {}", e);
            }
            return Ok(refreshed.id_token);
        }

        Ok(session.id_token.clone())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl AuthNotifier for RemoteBackend {
    fn on_auth_change(&self, callback: AuthCallback) -> Result<Unsubscribe> {
        self.hub.subscribe(callback)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        let grant = self.identity.sign_in(email.trim(), password).await.map_err(|e| {
            debug!("Sign-in rejected: {}", e);
            auth_error(&e)
        })?;

        let user = User {
            id: grant.local_id,
            email: grant.email.unwrap_or_else(|| email.trim().to_string()),
            name: grant.display_name.filter(|n| !n.is_empty()),
        };

        Ok(self
            .establish(RemoteSession {
                user,
                id_token: grant.id_token,
                refresh_token: grant.refresh_token,
                expires_at: now_ms() + expires_in_ms(&grant.expires_in),
            })
            .await)
    }

    async fn register(&self, email: &str, password: &str, name: Option<&str>) -> AuthResult<User> {
        validate_credentials(email, password)?;

        let grant = self.identity.sign_up(email.trim(), password).await.map_err(|e| {
            debug!("Sign-up rejected: {}", e);
            auth_error(&e)
        })?;

        let email = grant.email.unwrap_or_else(|| email.trim().to_string());
        let requested = name.map(str::trim).filter(|n| !n.is_empty());

        // The account exists at this point; a failed profile update only loses the name.
        let name = match requested {
            Some(name) => match self.identity.set_display_name(&grant.id_token, name).await {
                Ok(()) => Some(name.to_string()),
                Err(e) => {
                    warn!("Could not set display name for {}: {}", grant.local_id, e);
                    None
                }
            },
            None => Some(default_name(&email).to_string()),
        };

        let user = User {
            id: grant.local_id,
            email,
            name,
        };

        Ok(self
            .establish(RemoteSession {
                user,
                id_token: grant.id_token,
                refresh_token: grant.refresh_token,
                expires_at: now_ms() + expires_in_ms(&grant.expires_in),
            })
            .await)
    }

    async fn logout(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        slot.generation += 1;
        slot.current = None;
        self.save(None).await?;
        self.hub.publish(None);
        Ok(())
    }

    async fn try_get_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        let token = self.id_token().await?;
        self.store.list_accounts(&token, user_id).await
    }

    async fn create_account(&self, account: NewAccount) -> Result<SocialAccount> {
        let token = self.id_token().await?;
        let created = self
            .store
            .create_account(&token, &account, now_ms())
            .await?;
        debug!("Account created with id {}", created.id);
        Ok(created)
    }

    async fn update_account(&self, id: &str, patch: AccountPatch) -> Result<SocialAccount> {
        let token = self.id_token().await?;
        self.store.patch_account(&token, id, &patch).await
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        let token = self.id_token().await?;
        self.store.delete_account(&token, id).await
    }
}
