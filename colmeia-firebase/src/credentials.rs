//! Service-account credentials and Firebase configuration.

use colmeia_core::{ColmeiaError, ConfigError, IdentityError, IdentityResult};
use jsonwebtoken::EncodingKey;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

// ============================================================================
// SERVICE ACCOUNT KEY
// ============================================================================

#[derive(Deserialize)]
struct RawServiceAccount {
    project_id: String,
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// A Google service-account key, as downloaded from the Firebase console.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key_id: Option<String>,
    pub token_uri: String,
    private_key: SecretString,
}

impl ServiceAccountKey {
    /// Parse the JSON key file contents.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let parsed: RawServiceAccount =
            serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
                field: "FIREBASE_CREDENTIALS_PATH".to_string(),
                value: "<service account json>".to_string(),
                reason: e.to_string(),
            })?;
        if parsed.client_email.is_empty() || parsed.private_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "FIREBASE_CREDENTIALS_PATH".to_string(),
                value: "<service account json>".to_string(),
                reason: "client_email and private_key are required".to_string(),
            });
        }
        Ok(Self {
            project_id: parsed.project_id,
            client_email: parsed.client_email,
            private_key_id: parsed.private_key_id.filter(|id| !id.is_empty()),
            token_uri: parsed
                .token_uri
                .filter(|uri| !uri.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            private_key: SecretString::from(parsed.private_key),
        })
    }

    /// Read and parse a key file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: "FIREBASE_CREDENTIALS_PATH".to_string(),
            value: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// RS256 signing key built from the PEM private key.
    pub fn encoding_key(&self) -> IdentityResult<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes()).map_err(|e| {
            IdentityError::Signing {
                reason: format!("invalid service account private key: {}", e),
            }
        })
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Firebase settings read from the environment.
#[derive(Clone, Default)]
pub struct FirebaseConfig {
    /// Path to the service-account JSON key.
    pub credentials_path: Option<PathBuf>,
    /// Overrides the project named in the key file.
    pub project_id: Option<String>,
    /// Web API key, needed for password sign-in.
    pub api_key: Option<SecretString>,
    pub firestore_emulator_host: Option<String>,
    pub auth_emulator_host: Option<String>,
    /// Reject ID tokens issued before the account's `validSince`.
    pub check_revoked: bool,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl FirebaseConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FIREBASE_CREDENTIALS_PATH`
    /// - `FIREBASE_PROJECT_ID`
    /// - `FIREBASE_API_KEY`
    /// - `FIRESTORE_EMULATOR_HOST`
    /// - `FIREBASE_AUTH_EMULATOR_HOST`
    /// - `FIREBASE_CHECK_REVOKED` (default: false)
    pub fn from_env() -> Self {
        Self {
            credentials_path: non_empty_var("FIREBASE_CREDENTIALS_PATH").map(PathBuf::from),
            project_id: non_empty_var("FIREBASE_PROJECT_ID"),
            api_key: non_empty_var("FIREBASE_API_KEY").map(SecretString::from),
            firestore_emulator_host: non_empty_var("FIRESTORE_EMULATOR_HOST"),
            auth_emulator_host: non_empty_var("FIREBASE_AUTH_EMULATOR_HOST"),
            check_revoked: std::env::var("FIREBASE_CHECK_REVOKED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Whether both services point at local emulators.
    pub fn uses_emulators(&self) -> bool {
        self.firestore_emulator_host.is_some() && self.auth_emulator_host.is_some()
    }

    /// Load the service-account key, if a path is configured.
    pub fn load_credentials(&self) -> Result<Option<ServiceAccountKey>, ConfigError> {
        self.credentials_path
            .as_ref()
            .map(ServiceAccountKey::from_file)
            .transpose()
    }

    /// Resolve the project id from the override or the key file.
    pub fn resolve_project_id(
        &self,
        credentials: Option<&ServiceAccountKey>,
    ) -> Result<String, ColmeiaError> {
        self.project_id
            .clone()
            .or_else(|| credentials.map(|c| c.project_id.clone()))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ColmeiaError::Config(ConfigError::MissingRequired {
                    field: "FIREBASE_PROJECT_ID".to_string(),
                })
            })
    }
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("credentials_path", &self.credentials_path)
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("firestore_emulator_host", &self.firestore_emulator_host)
            .field("auth_emulator_host", &self.auth_emulator_host)
            .field("check_revoked", &self.check_revoked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmeia_test_utils::keys::{test_service_account_json, TEST_CLIENT_EMAIL};

    #[test]
    fn test_parse_service_account() {
        let key = ServiceAccountKey::from_json(&test_service_account_json("demo")).unwrap();
        assert_eq!(key.project_id, "demo");
        assert_eq!(key.client_email, TEST_CLIENT_EMAIL);
        assert!(key.encoding_key().is_ok());
    }

    #[test]
    fn test_missing_token_uri_uses_default() {
        let raw = serde_json::json!({
            "project_id": "p",
            "client_email": "a@p.iam.gserviceaccount.com",
            "private_key": "x",
        })
        .to_string();
        let key = ServiceAccountKey::from_json(&raw).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.private_key_id.is_none());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = ServiceAccountKey::from_json(&test_service_account_json("demo")).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_rejects_incomplete_key() {
        let raw = r#"{"project_id":"p","client_email":"","private_key":""}"#;
        assert!(ServiceAccountKey::from_json(raw).is_err());
    }

    #[test]
    fn test_project_override_wins() {
        let key = ServiceAccountKey::from_json(&test_service_account_json("from-key")).unwrap();
        let config = FirebaseConfig {
            project_id: Some("override".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_project_id(Some(&key)).unwrap(), "override");
        assert_eq!(
            FirebaseConfig::default()
                .resolve_project_id(Some(&key))
                .unwrap(),
            "from-key"
        );
        assert!(FirebaseConfig::default().resolve_project_id(None).is_err());
    }
}
