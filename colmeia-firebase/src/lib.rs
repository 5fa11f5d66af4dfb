//! Colmeia Firebase
//!
//! Google Cloud clients used by the API server:
//!
//! - [`FirestoreStore`]: the document store, over the Firestore REST API
//! - [`FirebaseAuth`]: ID token verification, account administration and
//!   password sign-in
//! - [`ServiceAccountTokenSource`]: OAuth2 access tokens for both
//!
//! Setting `FIRESTORE_EMULATOR_HOST` and `FIREBASE_AUTH_EMULATOR_HOST` routes
//! traffic to the local emulators instead.

pub mod auth;
pub mod credentials;
pub mod firestore;
pub mod jwks;
pub mod token;
pub mod value;

pub use auth::FirebaseAuth;
pub use credentials::{FirebaseConfig, ServiceAccountKey};
pub use firestore::FirestoreStore;
pub use jwks::JwksCache;
pub use token::{ServiceAccountTokenSource, StaticTokenSource, TokenSource};

use colmeia_core::{ColmeiaError, ColmeiaResult, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to every Google API request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The Firebase clients, built once at startup.
#[derive(Debug, Clone)]
pub struct FirebaseApp {
    pub project_id: String,
    pub firestore: Arc<FirestoreStore>,
    pub auth: Arc<FirebaseAuth>,
}

impl FirebaseApp {
    /// Build the clients from configuration.
    ///
    /// Credentials are required unless both emulators are configured.
    pub fn from_config(config: &FirebaseConfig) -> ColmeiaResult<Self> {
        let credentials = config.load_credentials()?.map(Arc::new);
        let project_id = config.resolve_project_id(credentials.as_deref())?;

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                ColmeiaError::Config(colmeia_core::ConfigError::InvalidValue {
                    field: "http_client".to_string(),
                    value: String::new(),
                    reason: e.to_string(),
                })
            })?;

        let service_tokens: Option<Arc<dyn TokenSource>> = credentials.as_ref().map(|key| {
            Arc::new(ServiceAccountTokenSource::new(http.clone(), key.clone()))
                as Arc<dyn TokenSource>
        });
        let emulator_tokens: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::emulator());
        let missing_credentials = || {
            ColmeiaError::Config(colmeia_core::ConfigError::MissingRequired {
                field: "FIREBASE_CREDENTIALS_PATH".to_string(),
            })
        };

        let firestore = match &config.firestore_emulator_host {
            Some(host) => {
                tracing::info!(host = %host, "Using Firestore emulator");
                FirestoreStore::emulator(http.clone(), host, &project_id, emulator_tokens.clone())
            }
            None => FirestoreStore::new(
                http.clone(),
                &project_id,
                service_tokens.clone().ok_or_else(missing_credentials)?,
            ),
        };

        let mut auth = match &config.auth_emulator_host {
            Some(host) => {
                tracing::info!(host = %host, "Using Firebase Auth emulator");
                FirebaseAuth::new(http.clone(), project_id.clone(), emulator_tokens)
                    .with_emulator(host)
            }
            None => FirebaseAuth::new(
                http.clone(),
                project_id.clone(),
                service_tokens.ok_or_else(missing_credentials)?,
            ),
        };
        auth = auth
            .with_api_key(config.api_key.clone())
            .with_clock(Arc::new(SystemClock))
            .check_revoked(config.check_revoked);
        if let Some(key) = credentials {
            auth = auth.with_credentials(key);
        }

        Ok(Self {
            project_id,
            firestore: Arc::new(firestore),
            auth: Arc::new(auth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulators_need_no_credentials() {
        let config = FirebaseConfig {
            project_id: Some("demo-colmeia".to_string()),
            firestore_emulator_host: Some("localhost:8080".to_string()),
            auth_emulator_host: Some("localhost:9099".to_string()),
            ..Default::default()
        };
        let app = FirebaseApp::from_config(&config).unwrap();
        assert_eq!(app.project_id, "demo-colmeia");
        assert_eq!(app.auth.project_id(), "demo-colmeia");
    }

    #[test]
    fn test_production_requires_credentials() {
        let config = FirebaseConfig {
            project_id: Some("demo-colmeia".to_string()),
            ..Default::default()
        };
        assert!(FirebaseApp::from_config(&config).is_err());
    }
}
