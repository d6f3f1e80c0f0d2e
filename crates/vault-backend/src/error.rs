use thiserror::Error;

/// Settings problems. Fatal to startup; each message says how to fix it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Missing Firebase API key. Set FIREBASE_API_KEY (and the other FIREBASE_* variables) \
         in the environment or a .env file, or set VAULT_BACKEND=local to use on-device storage."
    )]
    MissingApiKey,

    #[error("Missing required setting {0}. Set it in the environment or a .env file.")]
    Missing(&'static str),

    #[error("Invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Failure of a vault data operation. Carries the underlying message.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote service error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Auth subscription failed: {0}")]
    Subscription(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, VaultError>;
