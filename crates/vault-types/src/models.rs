use serde::{Deserialize, Deserializer, Serialize};

/// Shown in place of a stored password until the caller asks to reveal it.
pub const PASSWORD_MASK: &str = "••••••••";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl User {
    /// Display name, falling back to the local part of the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or_else(|| default_name(&self.email))
    }
}

/// Local part of an email address, used when no name was given at sign-up.
pub fn default_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// A tracked social-media login. Owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialAccount {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub note: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl SocialAccount {
    pub fn from_new(id: String, created_at: i64, new: NewAccount) -> Self {
        Self {
            id,
            user_id: new.user_id,
            platform: new.platform,
            username: new.username,
            password: new.password,
            profile_url: new.profile_url,
            note: new.note,
            created_at,
        }
    }

    /// Case-insensitive substring match over platform, username and note.
    /// An empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.platform.to_lowercase().contains(&query)
            || self.username.to_lowercase().contains(&query)
            || self.note.to_lowercase().contains(&query)
    }

    pub fn masked(mut self) -> Self {
        if self.password.is_some() {
            self.password = Some(PASSWORD_MASK.to_string());
        }
        self
    }
}

/// Sort newest first, the order every listing uses.
pub fn sort_newest_first(accounts: &mut [SocialAccount]) {
    accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Payload for creating an account. The id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub user_id: String,
    pub platform: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub note: String,
}

/// Partial update. Absent fields are left alone; `null` clears an optional field.
///
/// Ownership and creation time are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AccountPatch {
    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.field_paths().is_empty()
    }

    pub fn apply(&self, account: &mut SocialAccount) {
        if let Some(platform) = &self.platform {
            account.platform = platform.clone();
        }
        if let Some(username) = &self.username {
            account.username = username.clone();
        }
        if let Some(password) = &self.password {
            account.password = password.clone();
        }
        if let Some(profile_url) = &self.profile_url {
            account.profile_url = profile_url.clone();
        }
        if let Some(note) = &self.note {
            account.note = note.clone();
        }
    }

    /// Wire names of the fields this patch touches.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.platform.is_some() {
            paths.push("platform");
        }
        if self.username.is_some() {
            paths.push("username");
        }
        if self.password.is_some() {
            paths.push("password");
        }
        if self.profile_url.is_some() {
            paths.push("profileUrl");
        }
        if self.note.is_some() {
            paths.push("note");
        }
        paths
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> SocialAccount {
        SocialAccount {
            id: "acc-1".into(),
            user_id: "user-1".into(),
            platform: "GitHub".into(),
            username: "octocat".into(),
            password: Some("hunter22".into()),
            profile_url: Some("https://github.com/octocat".into()),
            note: "Work account".into(),
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let acc = account();
        assert!(acc.matches("github"));
        assert!(acc.matches("OCTO"));
        assert!(acc.matches("work"));
        assert!(acc.matches(""));
        assert!(!acc.matches("twitter"));
        // profile url is not searched
        assert!(!acc.matches("https"));
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: AccountPatch = serde_json::from_str(r#"{"password": null}"#).unwrap();
        assert_eq!(patch.password, Some(None));
        assert_eq!(patch.profile_url, None);

        let mut acc = account();
        patch.apply(&mut acc);
        assert_eq!(acc.password, None);
        assert_eq!(acc.profile_url.as_deref(), Some("https://github.com/octocat"));
        assert_eq!(patch.field_paths(), vec!["password"]);
    }

    #[test]
    fn patch_cannot_carry_owner() {
        let patch: AccountPatch =
            serde_json::from_str(r#"{"note": "x", "userId": "someone-else"}"#).unwrap();
        let mut acc = account();
        patch.apply(&mut acc);
        assert_eq!(acc.user_id, "user-1");
        assert_eq!(acc.note, "x");
    }

    #[test]
    fn masked_hides_only_present_passwords() {
        let acc = account().masked();
        assert_eq!(acc.password.as_deref(), Some(PASSWORD_MASK));

        let mut bare = account();
        bare.password = None;
        assert_eq!(bare.masked().password, None);
    }

    #[test]
    fn account_serializes_camel_case() {
        let json = serde_json::to_value(account()).unwrap();
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["profileUrl"], "https://github.com/octocat");
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let user = User {
            id: "u".into(),
            email: "ada@example.com".into(),
            name: None,
        };
        assert_eq!(user.display_name(), "ada");
    }
}
