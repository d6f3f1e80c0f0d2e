use serde::{Deserialize, Serialize};
use serde_json::json;

use vault_types::auth::AuthError;

use crate::error::{Result, VaultError};
use crate::remote::read_json;

/// Tokens issued by a password sign-in or sign-up.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds, as a decimal string.
    pub expires_in: String,
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Tokens issued by the refresh endpoint. Note the snake_case wire names.
#[derive(Debug, Deserialize)]
pub struct RefreshGrant {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

/// Client for the hosted identity service's REST API.
pub struct IdentityClient {
    http: reqwest::Client,
    identity_base: String,
    token_base: String,
    api_key: String,
}

impl IdentityClient {
    pub fn new(http: reqwest::Client, identity_base: &str, token_base: &str, api_key: &str) -> Self {
        Self {
            http,
            identity_base: identity_base.trim_end_matches('/').to_string(),
            token_base: token_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}", self.identity_base, method)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<TokenGrant> {
        let resp = self
            .http
            .post(self.endpoint("signUp"))
            .query(&[("key", &self.api_key)])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenGrant> {
        let resp = self
            .http
            .post(self.endpoint("signInWithPassword"))
            .query(&[("key", &self.api_key)])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn set_display_name(&self, id_token: &str, name: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint("update"))
            .query(&[("key", &self.api_key)])
            .json(&json!({
                "idToken": id_token,
                "displayName": name,
                "returnSecureToken": false,
            }))
            .send()
            .await?;
        read_json::<serde_json::Value>(resp).await?;
        Ok(())
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant> {
        let resp = self
            .http
            .post(format!("{}/v1/token", self.token_base))
            .query(&[("key", &self.api_key)])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        read_json(resp).await
    }
}

/// Lifetime in milliseconds from the service's `expiresIn` seconds string.
pub fn expires_in_ms(expires_in: &str) -> i64 {
    expires_in.trim().parse::<i64>().unwrap_or(3600) * 1000
}

/// Map a rejected identity call onto the user-facing vocabulary.
///
/// The service reports e.g. `EMAIL_EXISTS` or
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
pub fn auth_error(err: &VaultError) -> AuthError {
    let VaultError::Remote { message, .. } = err else {
        return AuthError::Failed;
    };
    let code = message.split([' ', ':']).next().unwrap_or_default();

    match code {
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            AuthError::WrongEmailOrPassword
        }
        "WEAK_PASSWORD" => AuthError::WeakPassword,
        _ => AuthError::Failed,
    }
}
