//! Public keys for Firebase ID token signatures.

use colmeia_core::{Clock, IdentityError, IdentityResult, SystemClock};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::RwLock;

/// JWKS endpoint for Firebase ID tokens.
pub const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Cache lifetime when the response carries no `max-age`.
const DEFAULT_MAX_AGE_SECS: i64 = 3600;

struct CachedKeys {
    keys: JwkSet,
    expires_at: i64,
}

/// Key set cache honoring the endpoint's `Cache-Control: max-age`.
pub struct JwksCache {
    source: Option<(Client, String)>,
    clock: Arc<dyn Clock>,
    state: RwLock<Option<CachedKeys>>,
}

/// Extract `max-age` seconds from a `Cache-Control` header.
pub fn max_age_secs(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .find_map(|directive| directive.trim().strip_prefix("max-age=")?.parse().ok())
}

impl JwksCache {
    /// Cache fetching from `url`.
    pub fn new(http: Client, url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: Some((http, url.into())),
            clock,
            state: RwLock::new(None),
        }
    }

    /// Cache over the Google securetoken endpoint.
    pub fn securetoken(http: Client, clock: Arc<dyn Clock>) -> Self {
        Self::new(http, SECURETOKEN_JWKS_URL, clock)
    }

    /// A fixed key set that never refreshes.
    pub fn fixed(keys: JwkSet) -> Self {
        Self {
            source: None,
            clock: Arc::new(SystemClock),
            state: RwLock::new(Some(CachedKeys {
                keys,
                expires_at: i64::MAX,
            })),
        }
    }

    /// Decoding key for `kid`, refreshing the set when it has expired.
    pub async fn decoding_key(&self, kid: &str) -> IdentityResult<DecodingKey> {
        let now = self.clock.now_epoch_secs();
        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref().filter(|c| c.expires_at > now) {
                return find_key(&cached.keys, kid);
            }
        }

        let mut state = self.state.write().await;
        if let Some(cached) = state.as_ref().filter(|c| c.expires_at > now) {
            return find_key(&cached.keys, kid);
        }
        let fresh = self.fetch(now).await?;
        let key = find_key(&fresh.keys, kid);
        *state = Some(fresh);
        key
    }

    async fn fetch(&self, now: i64) -> IdentityResult<CachedKeys> {
        let Some((http, url)) = &self.source else {
            return Err(IdentityError::invalid_token("signing keys unavailable"));
        };
        let response = http
            .get(url)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed {
                status: 0,
                message: format!("fetching signing keys: {}", e),
            })?;
        if !response.status().is_success() {
            return Err(IdentityError::RequestFailed {
                status: response.status().as_u16(),
                message: "fetching signing keys".to_string(),
            });
        }
        let max_age = max_age_secs(response.headers()).unwrap_or(DEFAULT_MAX_AGE_SECS);
        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse {
                reason: format!("signing keys: {}", e),
            })?;
        tracing::debug!(keys = keys.keys.len(), max_age, "Refreshed ID token signing keys");
        Ok(CachedKeys {
            keys,
            expires_at: now + max_age,
        })
    }
}

fn find_key(keys: &JwkSet, kid: &str) -> IdentityResult<DecodingKey> {
    let jwk = keys
        .find(kid)
        .ok_or_else(|| IdentityError::invalid_token(format!("unknown key id {}", kid)))?;
    DecodingKey::from_jwk(jwk)
        .map_err(|e| IdentityError::invalid_token(format!("unusable signing key: {}", e)))
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("url", &self.source.as_ref().map(|(_, url)| url))
            .finish()
    }
}
