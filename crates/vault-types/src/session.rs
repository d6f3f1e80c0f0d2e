use serde::{Deserialize, Serialize};

use crate::models::User;

/// Where startup authentication currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BootState {
    /// Waiting for the first auth notification.
    Initializing,
    Authenticated { user: User },
    Anonymous,
    /// Terminal until restart.
    Error { message: String },
}

impl BootState {
    pub fn from_user(user: Option<User>) -> Self {
        match user {
            Some(user) => Self::Authenticated { user },
            None => Self::Anonymous,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated { user } => Some(user),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Initializing)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
