use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const API_KEY: &str = "FIREBASE_API_KEY";
pub const AUTH_DOMAIN: &str = "FIREBASE_AUTH_DOMAIN";
pub const PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
pub const STORAGE_BUCKET: &str = "FIREBASE_STORAGE_BUCKET";
pub const MESSAGING_SENDER_ID: &str = "FIREBASE_MESSAGING_SENDER_ID";
pub const APP_ID: &str = "FIREBASE_APP_ID";
pub const MEASUREMENT_ID: &str = "FIREBASE_MEASUREMENT_ID";

/// Variables a complete hosted deployment must set.
pub const REQUIRED_VARS: [&str; 6] = [
    API_KEY,
    AUTH_DOMAIN,
    PROJECT_ID,
    STORAGE_BUCKET,
    MESSAGING_SENDER_ID,
    APP_ID,
];

const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_SECURETOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com";
const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";

pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Hosted auth and document store.
    Remote,
    /// On-device key-value file.
    Local,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "firebase" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(ConfigError::Invalid {
                name: "VAULT_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Hosted-service settings, exactly as deployed.
#[derive(Debug, Clone, Default)]
pub struct FirebaseConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub measurement_id: Option<String>,
    pub identity_endpoint: String,
    pub securetoken_endpoint: String,
    pub firestore_endpoint: String,
}

/// Outcome of checking the hosted-service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiagnosis {
    pub missing_vars: Vec<&'static str>,
    pub is_complete: bool,
    pub has_any_values: bool,
    pub has_api_key: bool,
}

impl FirebaseConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            api_key: get(API_KEY),
            auth_domain: get(AUTH_DOMAIN),
            project_id: get(PROJECT_ID),
            storage_bucket: get(STORAGE_BUCKET),
            messaging_sender_id: get(MESSAGING_SENDER_ID),
            app_id: get(APP_ID),
            measurement_id: get(MEASUREMENT_ID),
            identity_endpoint: get("FIREBASE_IDENTITY_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_IDENTITY_ENDPOINT.into()),
            securetoken_endpoint: get("FIREBASE_SECURETOKEN_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_SECURETOKEN_ENDPOINT.into()),
            firestore_endpoint: get("FIREBASE_FIRESTORE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_FIRESTORE_ENDPOINT.into()),
        }
    }

    /// Settings for a service running at `base` (emulator or test fake).
    pub fn for_endpoint(base: &str, api_key: &str, project_id: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            project_id: Some(project_id.to_string()),
            identity_endpoint: base.to_string(),
            securetoken_endpoint: base.to_string(),
            firestore_endpoint: base.to_string(),
            ..Self::default()
        }
    }

    fn entries(&self) -> [(&'static str, Option<&str>); 7] {
        [
            (API_KEY, self.api_key.as_deref()),
            (AUTH_DOMAIN, self.auth_domain.as_deref()),
            (PROJECT_ID, self.project_id.as_deref()),
            (STORAGE_BUCKET, self.storage_bucket.as_deref()),
            (MESSAGING_SENDER_ID, self.messaging_sender_id.as_deref()),
            (APP_ID, self.app_id.as_deref()),
            (MEASUREMENT_ID, self.measurement_id.as_deref()),
        ]
    }

    pub fn diagnose(&self) -> ConfigDiagnosis {
        let entries = self.entries();
        let missing_vars: Vec<&'static str> = entries
            .iter()
            .filter(|(name, value)| REQUIRED_VARS.contains(name) && value.is_none())
            .map(|(name, _)| *name)
            .collect();

        ConfigDiagnosis {
            is_complete: missing_vars.is_empty(),
            missing_vars,
            has_any_values: entries.iter().any(|(_, v)| v.is_some()),
            has_api_key: self.api_key.is_some(),
        }
    }

    /// Human-readable summary with values truncated, safe to log.
    pub fn report(&self) -> String {
        let diagnosis = self.diagnose();
        let mut report = String::from("\n=== Firebase Configuration Report ===\n");

        if diagnosis.has_any_values {
            report.push_str("Environment variables detected:\n");
            for (name, value) in self.entries() {
                let _ = writeln!(report, "  {}: {}", name, preview(value));
            }
        } else {
            report.push_str("No Firebase environment variables detected.\n");
        }

        if diagnosis.missing_vars.is_empty() {
            report.push_str("\nAll required environment variables are present.\n");
        } else {
            report.push_str("\nMissing required variables:\n");
            for name in &diagnosis.missing_vars {
                let _ = writeln!(report, "  - {}", name);
            }
            report.push_str("\nThese variables must be set in your deployment environment.\n");
        }

        report.push_str("=====================================\n");
        report
    }

    pub(crate) fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    pub(crate) fn require_project_id(&self) -> Result<&str, ConfigError> {
        self.project_id
            .as_deref()
            .ok_or(ConfigError::Missing(PROJECT_ID))
    }
}

fn preview(value: Option<&str>) -> String {
    match value {
        Some(v) if v.chars().count() > 10 => {
            format!("{}...", v.chars().take(10).collect::<String>())
        }
        Some(v) => v.to_string(),
        None => "NOT SET".to_string(),
    }
}

/// Everything the vault needs to start.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub backend: BackendKind,
    pub firebase: FirebaseConfig,
    pub data_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub auth_timeout: Duration,
    pub simulate_latency: bool,
}

impl VaultConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let firebase = FirebaseConfig::from_lookup(&lookup);

        // Hosted by default once it has a key; otherwise stay on-device.
        let backend = match lookup("VAULT_BACKEND") {
            Some(raw) => raw.parse()?,
            None if firebase.api_key.is_some() => BackendKind::Remote,
            None => BackendKind::Local,
        };

        let port = parse_or("VAULT_PORT", lookup("VAULT_PORT"), 3000)?;
        let timeout_ms = parse_or(
            "VAULT_AUTH_TIMEOUT_MS",
            lookup("VAULT_AUTH_TIMEOUT_MS"),
            DEFAULT_AUTH_TIMEOUT.as_millis() as u64,
        )?;
        let simulate_latency = parse_or(
            "VAULT_SIMULATE_LATENCY",
            lookup("VAULT_SIMULATE_LATENCY"),
            true,
        )?;

        Ok(Self {
            backend,
            firebase,
            data_path: lookup("VAULT_DATA_PATH")
                .unwrap_or_else(|| "socialvault.db".into())
                .into(),
            host: lookup("VAULT_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
            auth_timeout: Duration::from_millis(timeout_ms),
            simulate_latency,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_defaults_to_local() {
        let config = VaultConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.port, 3000);
        assert_eq!(config.auth_timeout, Duration::from_millis(5000));
        assert!(config.simulate_latency);
    }

    #[test]
    fn api_key_selects_remote() {
        let config = VaultConfig::from_lookup(lookup(&[(API_KEY, "AIzaSyExample")])).unwrap();
        assert_eq!(config.backend, BackendKind::Remote);
    }

    #[test]
    fn explicit_backend_wins() {
        let config = VaultConfig::from_lookup(lookup(&[
            (API_KEY, "AIzaSyExample"),
            ("VAULT_BACKEND", "local"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Local);

        let err = VaultConfig::from_lookup(lookup(&[("VAULT_BACKEND", "cloud")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "VAULT_BACKEND", .. }));
    }

    #[test]
    fn bad_port_is_reported() {
        let err = VaultConfig::from_lookup(lookup(&[("VAULT_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("VAULT_PORT"));
    }

    #[test]
    fn diagnosis_lists_missing_required_vars() {
        let firebase = FirebaseConfig::from_lookup(lookup(&[
            (API_KEY, "AIzaSyExample"),
            (PROJECT_ID, "vault-demo"),
            (MEASUREMENT_ID, "G-123"),
        ]));
        let diagnosis = firebase.diagnose();
        assert!(diagnosis.has_api_key);
        assert!(diagnosis.has_any_values);
        assert!(!diagnosis.is_complete);
        assert_eq!(
            diagnosis.missing_vars,
            vec![AUTH_DOMAIN, STORAGE_BUCKET, MESSAGING_SENDER_ID, APP_ID]
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let firebase = FirebaseConfig::from_lookup(lookup(&[(API_KEY, "  ")]));
        let diagnosis = firebase.diagnose();
        assert!(!diagnosis.has_api_key);
        assert!(!diagnosis.has_any_values);
    }

    #[test]
    fn report_truncates_values() {
        let firebase = FirebaseConfig::from_lookup(lookup(&[(API_KEY, "AIzaSyVeryLongSecretKey")]));
        let report = firebase.report();
        assert!(report.contains("FIREBASE_API_KEY: AIzaSyVery..."));
        assert!(!report.contains("LongSecretKey"));
        assert!(report.contains("FIREBASE_APP_ID: NOT SET"));
        assert!(report.contains("  - FIREBASE_APP_ID"));
    }

    #[test]
    fn report_for_empty_environment() {
        let report = FirebaseConfig::from_lookup(lookup(&[])).report();
        assert!(report.contains("No Firebase environment variables detected."));
    }
}
