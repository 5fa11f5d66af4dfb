//! OAuth2 access tokens for Google APIs.
//!
//! The service-account flow signs a short-lived RS256 assertion with the
//! account's private key and exchanges it at the token endpoint. Tokens are
//! cached and refreshed shortly before they expire.

use crate::credentials::ServiceAccountKey;
use async_trait::async_trait;
use colmeia_core::{Clock, IdentityError, IdentityResult, SystemClock};
use jsonwebtoken::{encode, Algorithm, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scopes requested for Firestore and the Identity Toolkit admin API.
pub const SCOPES: &str = "https://www.googleapis.com/auth/datastore \
https://www.googleapis.com/auth/identitytoolkit \
https://www.googleapis.com/auth/firebase";

/// Lifetime of a signed assertion, in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this many seconds before the token expires.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Access token used by the emulators.
pub const EMULATOR_TOKEN: &str = "owner";

/// Source of bearer tokens for outgoing Google API requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> IdentityResult<String>;
}

/// Fixed token, used against the emulators.
#[derive(Debug, Clone)]
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn emulator() -> Self {
        Self::new(EMULATOR_TOKEN)
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> IdentityResult<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: i64,
}

/// Service-account token source with an in-memory cache.
pub struct ServiceAccountTokenSource {
    http: Client,
    key: Arc<ServiceAccountKey>,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(http: Client, key: Arc<ServiceAccountKey>) -> Self {
        Self::with_clock(http, key, Arc::new(SystemClock))
    }

    pub fn with_clock(http: Client, key: Arc<ServiceAccountKey>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            key,
            clock,
            cached: RwLock::new(None),
        }
    }

    /// Build the signed JWT assertion for the token exchange.
    pub fn signed_assertion(&self, now: i64) -> IdentityResult<String> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        encode(&header, &claims, &self.key.encoding_key()?).map_err(|e| IdentityError::Signing {
            reason: e.to_string(),
        })
    }

    async fn fetch(&self, now: i64) -> IdentityResult<CachedToken> {
        let assertion = self.signed_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed {
                status: 0,
                message: format!("token exchange failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::RequestFailed {
                status: status.as_u16(),
                message: format!("token exchange rejected: {}", body),
            });
        }

        let parsed: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| IdentityError::InvalidResponse {
                    reason: format!("token response: {}", e),
                })?;
        tracing::debug!(
            client_email = %self.key.client_email,
            expires_in = parsed.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
            "Obtained service account access token"
        );
        Ok(CachedToken {
            token: SecretString::from(parsed.access_token),
            expires_at: now + parsed.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> IdentityResult<String> {
        let now = self.clock.now_epoch_secs();
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at - REFRESH_MARGIN_SECS > now {
                    return Ok(token.token.expose_secret().to_string());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if token.expires_at - REFRESH_MARGIN_SECS > now {
                return Ok(token.token.expose_secret().to_string());
            }
        }
        let fresh = self.fetch(now).await?;
        let value = fresh.token.expose_secret().to_string();
        *cached = Some(fresh);
        Ok(value)
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("client_email", &self.key.client_email)
            .field("token_uri", &self.key.token_uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Form, Json, Router};
    use colmeia_core::FixedClock;
    use colmeia_test_utils::keys::{test_decoding_key, test_service_account_json_with_token_uri};
    use jsonwebtoken::{decode, Validation};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_token_server(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(
                        form.get("grant_type").map(String::as_str),
                        Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
                    );
                    Json(serde_json::json!({
                        "access_token": "ya29.test",
                        "expires_in": 3600,
                        "token_type": "Bearer"
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/token", addr)
    }

    #[test]
    fn test_assertion_claims() {
        let key = ServiceAccountKey::from_json(&test_service_account_json_with_token_uri(
            "demo",
            "https://oauth2.example/token",
        ))
        .unwrap();
        let source = ServiceAccountTokenSource::new(Client::new(), Arc::new(key));
        let assertion = source.signed_assertion(1_700_000_000).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.set_audience(&["https://oauth2.example/token"]);
        let data =
            decode::<serde_json::Value>(&assertion, &test_decoding_key(), &validation).unwrap();
        assert_eq!(data.claims["scope"], SCOPES);
        assert_eq!(data.claims["exp"], 1_700_003_600);
    }

    #[tokio::test]
    async fn test_token_is_cached_until_refresh_margin() {
        let hits = Arc::new(AtomicUsize::new(0));
        let uri = spawn_token_server(hits.clone()).await;
        let key = Arc::new(
            ServiceAccountKey::from_json(&test_service_account_json_with_token_uri("demo", &uri))
                .unwrap(),
        );

        let source =
            ServiceAccountTokenSource::with_clock(Client::new(), key.clone(), Arc::new(FixedClock(1_000)));
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Same cache contents seen from inside the refresh margin.
        let late = ServiceAccountTokenSource::with_clock(
            Client::new(),
            key,
            Arc::new(FixedClock(1_000 + 3600 - 30)),
        );
        *late.cached.write().await = Some(CachedToken {
            token: SecretString::from("old".to_string()),
            expires_at: 1_000 + 3600,
        });
        assert_eq!(late.access_token().await.unwrap(), "ya29.test");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticTokenSource::emulator();
        assert_eq!(source.access_token().await.unwrap(), EMULATOR_TOKEN);
    }
}
