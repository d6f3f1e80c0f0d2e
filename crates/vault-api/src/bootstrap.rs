//! Startup authentication: wait for the first session notification, but not
//! forever.
//!
//! Two callbacks race to resolve the bootstrap: the auth subscription and a
//! fixed timer. Whichever claims the [`ResolveLatch`] first decides the
//! outcome. A timeout or a failed subscription leaves the bootstrap in
//! [`BootState::Error`] until the process restarts.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vault_backend::AuthNotifier;
use vault_backend::session::{AuthCallback, Unsubscribe};
use vault_types::models::User;
use vault_types::session::BootState;

pub const CONNECTIVITY_MESSAGE: &str = "Unable to reach the authentication service. \
Check your network connection and that the Firebase configuration is correct.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Notified,
    TimedOut,
    SetupFailed,
}

/// Resolve-once flag shared by the notification and timer callbacks.
#[derive(Debug, Default)]
pub struct ResolveLatch {
    winner: OnceLock<Resolution>,
}

impl ResolveLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the latch. Returns false if something else got there first.
    pub fn resolve(&self, by: Resolution) -> bool {
        self.winner.set(by).is_ok()
    }

    pub fn winner(&self) -> Option<Resolution> {
        self.winner.get().copied()
    }
}

pub struct AuthBootstrap {
    state: Arc<watch::Sender<BootState>>,
    latch: Arc<ResolveLatch>,
    subscription: Mutex<Option<Unsubscribe>>,
    teardown: CancellationToken,
}

impl AuthBootstrap {
    /// Subscribe to `notifier` and start the timeout.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount<N: AuthNotifier + ?Sized>(notifier: &N, timeout: Duration) -> Self {
        let (tx, _) = watch::channel(BootState::Initializing);
        let state = Arc::new(tx);
        let latch = Arc::new(ResolveLatch::new());
        let teardown = CancellationToken::new();

        let callback: AuthCallback = {
            let state = state.clone();
            let latch = latch.clone();
            let teardown = teardown.clone();
            Box::new(move |user: Option<User>| {
                if teardown.is_cancelled() {
                    return;
                }
                // After the first notification, keep following sign-in and sign-out.
                if latch.resolve(Resolution::Notified)
                    || latch.winner() == Some(Resolution::Notified)
                {
                    let next = BootState::from_user(user);
                    debug!("Auth state is now {:?}", next);
                    state.send_replace(next);
                }
            })
        };

        let subscription = match notifier.on_auth_change(callback) {
            Ok(sub) => Some(sub),
            Err(e) => {
                error!("Failed to subscribe to auth changes: {}", e);
                if latch.resolve(Resolution::SetupFailed) {
                    state.send_replace(BootState::Error {
                        message: format!("Failed to initialize authentication: {}", e),
                    });
                }
                None
            }
        };

        if subscription.is_some() {
            let deadline = tokio::time::Instant::now() + timeout;
            let state = state.clone();
            let latch = latch.clone();
            let cancelled = teardown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancelled.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        if latch.resolve(Resolution::TimedOut) {
                            warn!("No auth notification within {:?}", timeout);
                            state.send_replace(BootState::Error {
                                message: CONNECTIVITY_MESSAGE.to_string(),
                            });
                        }
                    }
                }
            });
        }

        Self {
            state,
            latch,
            subscription: Mutex::new(subscription),
            teardown,
        }
    }

    pub fn state(&self) -> BootState {
        self.state.borrow().clone()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.latch.winner()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootState> {
        self.state.subscribe()
    }

    /// Wait until the bootstrap leaves `Initializing`.
    pub async fn resolved(&self) -> BootState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(BootState::is_resolved).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        }
    }

    /// Wait, at most `within`, for the published session to show `user_id`.
    ///
    /// Sign-in and sign-out reach the bootstrap through the subscription task,
    /// so a handler calls this before answering to keep the next request in
    /// step. Returns early once the bootstrap is in error.
    pub async fn settle(&self, user_id: Option<&str>, within: Duration) -> BootState {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(|s| s.is_error() || s.user().map(|u| u.id.as_str()) == user_id);
        if tokio::time::timeout(within, settled).await.is_err() {
            debug!("Auth state did not settle within {:?}", within);
        }
        self.state()
    }

    /// Unsubscribe and cancel the timer. No state changes happen afterwards.
    pub fn teardown(&self) {
        if self.teardown.is_cancelled() {
            return;
        }
        self.teardown.cancel();
        if let Ok(mut sub) = self.subscription.lock() {
            if let Some(sub) = sub.take() {
                sub.unsubscribe();
            }
        }
        info!("Auth bootstrap torn down");
    }
}

impl Drop for AuthBootstrap {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}
