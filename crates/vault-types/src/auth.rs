use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way sign-in or sign-up can fail, worded for the person at the form.
///
/// The on-device store reports `InvalidCredentials` and `AlreadyRegistered`;
/// the hosted identity service's codes map to `WrongEmailOrPassword` and
/// `EmailInUse`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    AlreadyRegistered,

    #[error("Email is already in use.")]
    EmailInUse,

    #[error("Invalid email or password.")]
    WrongEmailOrPassword,

    #[error("Invalid email address.")]
    InvalidEmail,

    #[error("Password should be at least 6 characters.")]
    WeakPassword,

    #[error("Authentication failed. Please try again.")]
    Failed,
}

pub type AuthResult<T> = Result<T, AuthError>;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Form-level checks shared by both backends before anything is stored.
pub fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(AuthError::InvalidEmail),
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_email() {
        assert_eq!(validate_credentials("nobody", "secret1"), Err(AuthError::InvalidEmail));
        assert_eq!(validate_credentials("@x.com", "secret1"), Err(AuthError::InvalidEmail));
        assert_eq!(validate_credentials("a@", "secret1"), Err(AuthError::InvalidEmail));
    }

    #[test]
    fn rejects_short_password() {
        assert_eq!(validate_credentials("a@x.com", "12345"), Err(AuthError::WeakPassword));
        assert!(validate_credentials("a@x.com", "123456").is_ok());
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
        assert_eq!(AuthError::EmailInUse.to_string(), "Email is already in use.");
        assert_eq!(AuthError::WrongEmailOrPassword.to_string(), "Invalid email or password.");
        assert_eq!(AuthError::Failed.to_string(), "Authentication failed. Please try again.");
    }
}
