//! Firebase Authentication.
//!
//! ID token verification runs locally against the securetoken key set. Account
//! administration and password sign-in go through the Identity Toolkit REST
//! API. Custom tokens are minted with the service-account key.

use crate::credentials::ServiceAccountKey;
use crate::jwks::JwksCache;
use crate::token::TokenSource;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use colmeia_core::{
    Clock, IdentityError, IdentityProvider, IdentityResult, IdentityUser, SignInResult,
    SystemClock, VerifiedToken,
};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

const IDENTITY_TOOLKIT_HOST: &str = "https://identitytoolkit.googleapis.com";

/// Audience of custom tokens.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Clock skew tolerated on `exp`, `iat` and `auth_time`.
pub const CLOCK_SKEW_SECS: i64 = 60;

const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3600;
const MAX_UID_LEN: usize = 128;
const EMULATOR_SIGNER: &str = "firebase-auth-emulator@example.com";

// ============================================================================
// CLAIMS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct IdTokenClaims {
    sub: String,
    aud: String,
    iss: String,
    exp: i64,
    iat: i64,
    #[serde(default)]
    auth_time: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CustomTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    uid: &'a str,
}

/// Check the claims of a decoded ID token against `project_id` at `now`.
fn check_claims(claims: &IdTokenClaims, project_id: &str, now: i64) -> IdentityResult<()> {
    if claims.aud != project_id {
        return Err(IdentityError::invalid_token(format!(
            "unexpected audience {}",
            claims.aud
        )));
    }
    let expected_issuer = format!("https://securetoken.google.com/{}", project_id);
    if claims.iss != expected_issuer {
        return Err(IdentityError::invalid_token(format!(
            "unexpected issuer {}",
            claims.iss
        )));
    }
    if claims.sub.is_empty() || claims.sub.len() > MAX_UID_LEN {
        return Err(IdentityError::invalid_token("subject must be 1 to 128 characters"));
    }
    if claims.exp < now - CLOCK_SKEW_SECS {
        return Err(IdentityError::invalid_token("token expired"));
    }
    if claims.iat > now + CLOCK_SKEW_SECS {
        return Err(IdentityError::invalid_token("token issued in the future"));
    }
    match claims.auth_time {
        Some(auth_time) if auth_time <= now + CLOCK_SKEW_SECS => Ok(()),
        Some(_) => Err(IdentityError::invalid_token("auth_time is in the future")),
        None => Err(IdentityError::invalid_token("auth_time missing")),
    }
}

// ============================================================================
// IDENTITY TOOLKIT WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    valid_since: Option<String>,
}

impl From<RawUser> for IdentityUser {
    fn from(raw: RawUser) -> Self {
        IdentityUser {
            uid: raw.local_id,
            email: raw.email,
            display_name: raw.display_name.filter(|n| !n.is_empty()),
            disabled: raw.disabled,
            valid_since: raw.valid_since.and_then(|v| v.parse().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ToolkitErrorEnvelope {
    error: ToolkitError,
}

#[derive(Debug, Deserialize)]
struct ToolkitError {
    #[serde(default)]
    message: String,
}

/// Map an Identity Toolkit error response to an [`IdentityError`].
///
/// `subject` is the email or uid the request was about.
pub fn map_toolkit_error(status: u16, body: &str, subject: &str) -> IdentityError {
    let message = serde_json::from_str::<ToolkitErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    let code = message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or_default();
    match code {
        "EMAIL_EXISTS" => IdentityError::EmailExists {
            email: subject.to_string(),
        },
        "USER_NOT_FOUND" | "EMAIL_NOT_FOUND" => IdentityError::UserNotFound {
            id: subject.to_string(),
        },
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => IdentityError::InvalidCredentials,
        "USER_DISABLED" => IdentityError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::TooManyAttempts,
        _ => IdentityError::RequestFailed { status, message },
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// [`IdentityProvider`] backed by Firebase Authentication.
pub struct FirebaseAuth {
    http: Client,
    project_id: String,
    identity_base: String,
    emulator: bool,
    credentials: Option<Arc<ServiceAccountKey>>,
    tokens: Arc<dyn TokenSource>,
    api_key: Option<SecretString>,
    keys: Arc<JwksCache>,
    clock: Arc<dyn Clock>,
    check_revoked: bool,
}

impl FirebaseAuth {
    pub fn new(http: Client, project_id: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            keys: Arc::new(JwksCache::securetoken(http.clone(), clock.clone())),
            http,
            project_id: project_id.into(),
            identity_base: IDENTITY_TOOLKIT_HOST.to_string(),
            emulator: false,
            credentials: None,
            tokens,
            api_key: None,
            clock,
            check_revoked: false,
        }
    }

    /// Talk to the Auth emulator on `host` (e.g. `localhost:9099`).
    ///
    /// Emulator tokens are unsigned, so signatures are not checked.
    pub fn with_emulator(mut self, host: &str) -> Self {
        self.identity_base = format!("http://{}/identitytoolkit.googleapis.com", host);
        self.emulator = true;
        self
    }

    pub fn with_identity_base(mut self, base: impl Into<String>) -> Self {
        self.identity_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<ServiceAccountKey>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_keys(mut self, keys: JwksCache) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn check_revoked(mut self, enabled: bool) -> Self {
        self.check_revoked = enabled;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn admin_url(&self, action: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.identity_base, self.project_id, action
        )
    }

    async fn decode_claims(&self, token: &str) -> IdentityResult<IdTokenClaims> {
        if self.emulator {
            return decode_unverified(token);
        }
        let header = decode_header(token)
            .map_err(|e| IdentityError::invalid_token(format!("malformed header: {}", e)))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::invalid_token(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::invalid_token("missing key id"))?;
        let key = self.keys.decoding_key(&kid).await?;

        // Signature only; claims are checked against our own clock.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        decode::<IdTokenClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| IdentityError::invalid_token(e.to_string()))
    }

    /// POST a JSON body to the Identity Toolkit and decode the response.
    async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
        bearer: bool,
        subject: &str,
    ) -> IdentityResult<T> {
        let mut request = self.http.post(url).json(body);
        if bearer {
            request = request.bearer_auth(self.tokens.access_token().await?);
        }
        let response = request
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed {
                status: 0,
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_toolkit_error(status.as_u16(), &text, subject));
        }
        response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse {
                reason: e.to_string(),
            })
    }

    async fn lookup(&self, body: Value, subject: &str) -> IdentityResult<Option<IdentityUser>> {
        let url = self.admin_url("accounts:lookup");
        match self.post::<LookupResponse>(&url, &body, true, subject).await {
            Ok(found) => Ok(found.users.into_iter().next().map(IdentityUser::from)),
            Err(IdentityError::UserNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Decode the payload of an emulator token without checking its signature.
fn decode_unverified(token: &str) -> IdentityResult<IdTokenClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| IdentityError::invalid_token("malformed token"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IdentityError::invalid_token(format!("malformed payload: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| IdentityError::invalid_token(format!("malformed claims: {}", e)))
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn verify_id_token(&self, token: &str) -> IdentityResult<VerifiedToken> {
        let claims = self.decode_claims(token).await?;
        let now = self.clock.now_epoch_secs();
        check_claims(&claims, &self.project_id, now)?;
        let auth_time = claims.auth_time.unwrap_or(claims.iat);

        if self.check_revoked {
            let user = self
                .get_user(&claims.sub)
                .await?
                .ok_or_else(|| IdentityError::invalid_token("user no longer exists"))?;
            if user.disabled {
                return Err(IdentityError::UserDisabled);
            }
            if user.valid_since.is_some_and(|since| auth_time < since) {
                return Err(IdentityError::TokenRevoked);
            }
        }

        Ok(VerifiedToken {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
            auth_time,
            issued_at: claims.iat,
        })
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> IdentityResult<IdentityUser> {
        let body = json!({
            "email": email,
            "password": password,
            "displayName": display_name,
        });
        let created: RawUser = self
            .post(&self.admin_url("accounts"), &body, true, email)
            .await?;
        tracing::info!(uid = %created.local_id, "Created identity account");
        Ok(IdentityUser {
            uid: created.local_id,
            email: Some(email.to_string()),
            display_name: Some(display_name.to_string()),
            disabled: false,
            valid_since: None,
        })
    }

    async fn get_user(&self, uid: &str) -> IdentityResult<Option<IdentityUser>> {
        self.lookup(json!({ "localId": [uid] }), uid).await
    }

    async fn get_user_by_email(&self, email: &str) -> IdentityResult<Option<IdentityUser>> {
        self.lookup(json!({ "email": [email] }), email).await
    }

    async fn delete_user(&self, uid: &str) -> IdentityResult<()> {
        let _: Value = self
            .post(
                &self.admin_url("accounts:delete"),
                &json!({ "localId": uid }),
                true,
                uid,
            )
            .await?;
        tracing::info!(uid = %uid, "Deleted identity account");
        Ok(())
    }

    async fn revoke_refresh_tokens(&self, uid: &str) -> IdentityResult<()> {
        let now = self.clock.now_epoch_secs();
        let _: Value = self
            .post(
                &self.admin_url("accounts:update"),
                &json!({ "localId": uid, "validSince": now.to_string() }),
                true,
                uid,
            )
            .await?;
        Ok(())
    }

    async fn create_custom_token(&self, uid: &str) -> IdentityResult<String> {
        if uid.is_empty() || uid.len() > MAX_UID_LEN {
            return Err(IdentityError::Signing {
                reason: "uid must be 1 to 128 characters".to_string(),
            });
        }
        let now = self.clock.now_epoch_secs();
        match &self.credentials {
            Some(credentials) => {
                let claims = CustomTokenClaims {
                    iss: &credentials.client_email,
                    sub: &credentials.client_email,
                    aud: CUSTOM_TOKEN_AUDIENCE,
                    iat: now,
                    exp: now + CUSTOM_TOKEN_LIFETIME_SECS,
                    uid,
                };
                let mut header = Header::new(Algorithm::RS256);
                header.kid = credentials.private_key_id.clone();
                encode(&header, &claims, &credentials.encoding_key()?).map_err(|e| {
                    IdentityError::Signing {
                        reason: e.to_string(),
                    }
                })
            }
            None if self.emulator => {
                let claims = CustomTokenClaims {
                    iss: EMULATOR_SIGNER,
                    sub: EMULATOR_SIGNER,
                    aud: CUSTOM_TOKEN_AUDIENCE,
                    iat: now,
                    exp: now + CUSTOM_TOKEN_LIFETIME_SECS,
                    uid,
                };
                let payload = serde_json::to_vec(&claims).map_err(|e| IdentityError::Signing {
                    reason: e.to_string(),
                })?;
                Ok(format!(
                    "{}.{}.",
                    URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#),
                    URL_SAFE_NO_PAD.encode(payload)
                ))
            }
            None => Err(IdentityError::Signing {
                reason: "service account credentials are not configured".to_string(),
            }),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<SignInResult> {
        let key = match (&self.api_key, self.emulator) {
            (Some(key), _) => key.expose_secret().to_string(),
            (None, true) => "emulator".to_string(),
            (None, false) => {
                return Err(IdentityError::RequestFailed {
                    status: 0,
                    message: "FIREBASE_API_KEY is not configured".to_string(),
                })
            }
        };
        let url = format!(
            "{}/v1/accounts:signInWithPassword?key={}",
            self.identity_base, key
        );
        let body = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let signed_in: SignInResponse = self.post(&url, &body, false, email).await?;
        Ok(SignInResult {
            uid: signed_in.local_id,
            id_token: signed_in.id_token,
            refresh_token: signed_in.refresh_token,
            expires_in: signed_in.expires_in.parse().unwrap_or(3600),
        })
    }
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("project_id", &self.project_id)
            .field("identity_base", &self.identity_base)
            .field("emulator", &self.emulator)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("check_revoked", &self.check_revoked)
            .finish()
    }
}
