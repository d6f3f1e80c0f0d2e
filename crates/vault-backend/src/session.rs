use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vault_types::models::User;

use crate::error::{Result, VaultError};

/// Called with the signed-in user, or `None` after sign-out.
pub type AuthCallback = Box<dyn Fn(Option<User>) + Send + Sync + 'static>;

/// What a backend knows about the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSnapshot {
    /// Session restore still in flight. Subscribers hear nothing yet.
    Pending,
    Known(Option<User>),
}

/// Fan-out of session changes to subscribers.
///
/// Subscribers always receive the latest known state first, then each change.
/// Rapid changes may be coalesced; the last one is always delivered.
pub struct SessionHub {
    tx: watch::Sender<AuthSnapshot>,
}

impl SessionHub {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::Pending);
        Self { tx }
    }

    pub fn publish(&self, user: Option<User>) {
        self.tx.send_replace(AuthSnapshot::Known(user));
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        match &*self.tx.borrow() {
            AuthSnapshot::Known(user) => user.clone(),
            AuthSnapshot::Pending => None,
        }
    }

    /// Deliver session changes to `callback` until the returned handle is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, callback: AuthCallback) -> Result<Unsubscribe> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| VaultError::Subscription(e.to_string()))?;

        let mut rx = self.tx.subscribe();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        handle.spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if let AuthSnapshot::Known(user) = snapshot {
                    if cancelled.is_cancelled() {
                        break;
                    }
                    callback(user);
                }

                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Auth subscriber stopped");
        });

        Ok(Unsubscribe { token })
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a live auth subscription. Dropping it unsubscribes.
pub struct Unsubscribe {
    token: CancellationToken,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.token.cancel();
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
