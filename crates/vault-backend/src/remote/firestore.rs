use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use vault_types::models::{AccountPatch, NewAccount, SocialAccount, sort_newest_first};

use crate::error::{Result, VaultError};
use crate::remote::read_json;

pub const ACCOUNTS_COLLECTION: &str = "social_accounts";

/// A stored document in the service's typed-value JSON encoding.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    document: Option<Document>,
}

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

fn integer_value(i: i64) -> Value {
    // 64-bit integers travel as decimal strings
    json!({ "integerValue": i.to_string() })
}

fn read_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn read_integer(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = fields.get(key)?;
    if let Some(raw) = value.get("integerValue") {
        return match raw {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
    }
    value.get("doubleValue")?.as_f64().map(|f| f as i64)
}

/// Encode a new account. Absent optional fields are omitted.
pub fn encode_new(account: &NewAccount, created_at: i64) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("platform".into(), string_value(&account.platform));
    fields.insert("username".into(), string_value(&account.username));
    if let Some(password) = &account.password {
        fields.insert("password".into(), string_value(password));
    }
    if let Some(url) = &account.profile_url {
        fields.insert("profileUrl".into(), string_value(url));
    }
    fields.insert("note".into(), string_value(&account.note));
    fields.insert("userId".into(), string_value(&account.user_id));
    fields.insert("createdAt".into(), integer_value(created_at));
    fields
}

/// Encode the set fields of a patch. Fields cleared to `None` are left out
/// here but stay in the update mask, which removes them from the document.
pub fn encode_patch(patch: &AccountPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(platform) = &patch.platform {
        fields.insert("platform".into(), string_value(platform));
    }
    if let Some(username) = &patch.username {
        fields.insert("username".into(), string_value(username));
    }
    if let Some(Some(password)) = &patch.password {
        fields.insert("password".into(), string_value(password));
    }
    if let Some(Some(url)) = &patch.profile_url {
        fields.insert("profileUrl".into(), string_value(url));
    }
    if let Some(note) = &patch.note {
        fields.insert("note".into(), string_value(note));
    }
    fields
}

pub fn decode_account(doc: &Document) -> Result<SocialAccount> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| VaultError::Malformed("document has no name".into()))?;

    let required = |key: &str| {
        read_string(&doc.fields, key)
            .ok_or_else(|| VaultError::Malformed(format!("document {} lacks {}", id, key)))
    };

    Ok(SocialAccount {
        id: id.to_string(),
        user_id: required("userId")?,
        platform: required("platform")?,
        username: required("username")?,
        password: read_string(&doc.fields, "password"),
        profile_url: read_string(&doc.fields, "profileUrl"),
        note: read_string(&doc.fields, "note").unwrap_or_default(),
        created_at: read_integer(&doc.fields, "createdAt").ok_or_else(|| {
            VaultError::Malformed(format!("document {} lacks createdAt", id))
        })?,
    })
}

/// Client for the hosted document store's REST API.
pub struct FirestoreClient {
    http: reqwest::Client,
    documents_url: String,
}

impl FirestoreClient {
    pub fn new(http: reqwest::Client, base: &str, project_id: &str) -> Self {
        Self {
            http,
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                base.trim_end_matches('/'),
                project_id
            ),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.documents_url, ACCOUNTS_COLLECTION)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, ACCOUNTS_COLLECTION, id)
    }

    /// All accounts owned by `user_id`, newest first.
    ///
    /// Filters on the server, sorts here, so no composite index is needed.
    pub async fn list_accounts(&self, id_token: &str, user_id: &str) -> Result<Vec<SocialAccount>> {
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": ACCOUNTS_COLLECTION }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": "userId" },
                        "op": "EQUAL",
                        "value": string_value(user_id),
                    }
                }
            }
        });

        let resp = self
            .http
            .post(format!("{}:runQuery", self.documents_url))
            .bearer_auth(id_token)
            .json(&query)
            .send()
            .await?;
        let rows: Vec<QueryRow> = read_json(resp).await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for doc in rows.iter().filter_map(|r| r.document.as_ref()) {
            match decode_account(doc) {
                Ok(account) => accounts.push(account),
                Err(e) => warn!("Skipping unreadable account document: {}", e),
            }
        }
        debug!("Fetched {} accounts for user {}", accounts.len(), user_id);

        sort_newest_first(&mut accounts);
        Ok(accounts)
    }

    pub async fn get_account(&self, id_token: &str, id: &str) -> Result<SocialAccount> {
        let resp = self
            .http
            .get(self.document_url(id))
            .bearer_auth(id_token)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(VaultError::AccountNotFound(id.to_string()));
        }
        let doc: Document = read_json(resp).await?;
        decode_account(&doc)
    }

    pub async fn create_account(
        &self,
        id_token: &str,
        account: &NewAccount,
        created_at: i64,
    ) -> Result<SocialAccount> {
        let body = Document {
            name: String::new(),
            fields: encode_new(account, created_at),
        };

        let resp = self
            .http
            .post(self.collection_url())
            .bearer_auth(id_token)
            .json(&body)
            .send()
            .await?;
        let doc: Document = read_json(resp).await?;
        decode_account(&doc)
    }

    /// Apply `patch` to an existing document. Fails if it does not exist.
    pub async fn patch_account(
        &self,
        id_token: &str,
        id: &str,
        patch: &AccountPatch,
    ) -> Result<SocialAccount> {
        let paths = patch.field_paths();
        if paths.is_empty() {
            return self.get_account(id_token, id).await;
        }

        let mut params: Vec<(&str, &str)> = paths
            .iter()
            .map(|p| ("updateMask.fieldPaths", *p))
            .collect();
        params.push(("currentDocument.exists", "true"));

        let body = Document {
            name: String::new(),
            fields: encode_patch(patch),
        };

        let resp = self
            .http
            .patch(self.document_url(id))
            .query(&params)
            .bearer_auth(id_token)
            .json(&body)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(VaultError::AccountNotFound(id.to_string()));
        }
        let doc: Document = read_json(resp).await?;
        decode_account(&doc)
    }

    /// Deleting a document that does not exist succeeds.
    pub async fn delete_account(&self, id_token: &str, id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.document_url(id))
            .bearer_auth(id_token)
            .send()
            .await?;
        read_json::<Value>(resp).await?;
        Ok(())
    }
}
