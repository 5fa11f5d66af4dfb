//! Axum middleware for authentication and rate limiting
//!
//! Authentication verifies the Firebase ID token from the `Authorization`
//! header, injects [`AuthContext`] into the request extensions and makes sure
//! the caller has a `users` row. Rate limiting keys requests by uid once
//! authenticated, by client IP otherwise.

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::{SharedIdentity, SharedRelational};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// The authenticated caller, as established from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AuthContext {
    /// Display name used when provisioning the caller's user row.
    fn provisioning_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for authentication middleware.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub identity: SharedIdentity,
    /// Used for just-in-time user provisioning.
    pub relational: SharedRelational,
}

impl AuthMiddlewareState {
    pub fn new(identity: SharedIdentity, relational: SharedRelational) -> Self {
        Self {
            identity,
            relational,
        }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Extract the bearer token from an `Authorization` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Axum middleware for authentication.
///
/// 1. Rejects requests without an `Authorization` header (401)
/// 2. Rejects non-Bearer schemes, empty tokens and tokens that fail
///    verification with the same `Invalid token` message (401)
/// 3. Injects [`AuthContext`] into request extensions
/// 4. Ensures the caller's user row exists; a failure here is only logged
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| {
            AuthMiddlewareError(ApiError::unauthorized("Authorization header missing"))
        })?;

    let token = header_value
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| AuthMiddlewareError(ApiError::invalid_token()))?;

    let verified = state.identity.verify_id_token(token).await.map_err(|e| {
        tracing::debug!(error = %e, "ID token rejected");
        AuthMiddlewareError(ApiError::invalid_token())
    })?;

    let auth = AuthContext {
        uid: verified.uid,
        email: verified.email,
        name: verified.name,
    };

    if let Some(email) = auth.email.as_deref() {
        match state
            .relational
            .user_ensure(&auth.uid, email, &auth.provisioning_name())
            .await
        {
            Ok(true) => tracing::info!(user_id = %auth.uid, "Provisioned user row on first request"),
            Ok(false) => {}
            Err(e) => tracing::warn!(user_id = %auth.uid, error = %e, "User provisioning failed"),
        }
    }

    request.extensions_mut().insert(auth);

    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed Axum extractor for the authenticated caller.
///
/// `auth_middleware` must be applied to the route; without it the extractor
/// rejects with 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "AuthContext not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// RATE LIMITING MIDDLEWARE
// ============================================================================

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Key for rate limiting: the client IP or the authenticated uid.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    Ip(IpAddr),
    User(String),
}

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    limiters: Arc<DashMap<RateLimitKey, Arc<DirectRateLimiter>>>,
}

impl RateLimitState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn limit_for(&self, key: &RateLimitKey) -> u32 {
        match key {
            RateLimitKey::Ip(_) => self.config.rate_limit_unauthenticated,
            RateLimitKey::User(_) => self.config.rate_limit_authenticated,
        }
    }

    fn get_or_create_limiter(&self, key: &RateLimitKey) -> Arc<DirectRateLimiter> {
        let limiter = self.limiters.entry(key.clone()).or_insert_with(|| {
            let quota = Quota::per_minute(
                NonZeroU32::new(self.limit_for(key)).unwrap_or(NonZeroU32::MIN),
            )
            .allow_burst(NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN));
            Arc::new(RateLimiter::direct(quota))
        });
        limiter.clone()
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until a request would be allowed again
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::too_many_requests(Some(self.retry_after)).into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Client IP, preferring proxy headers over the connection address.
fn extract_client_ip(request: &Request) -> IpAddr {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    let real_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok());
    if let Some(ip) = real_ip {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Rate limiting middleware.
///
/// Must be layered inside `auth_middleware` on protected routes so the
/// [`AuthContext`] is already present. Returns 429 with `retry-after` when a
/// key is over its quota.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let key = match request.extensions().get::<AuthContext>() {
        Some(auth) => RateLimitKey::User(auth.uid.clone()),
        None => RateLimitKey::Ip(extract_client_ip(&request)),
    };

    let limiter = state.get_or_create_limiter(&key);
    match limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                "x-ratelimit-limit",
                HeaderValue::from_str(&state.limit_for(&key).to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("60")),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            tracing::warn!(key = ?key, retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use colmeia_core::IdentityProvider;
    use colmeia_storage::RelationalStore;
    use colmeia_test_utils::{InMemoryRelationalStore, MockIdentityProvider};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct Harness {
        identity: MockIdentityProvider,
        relational: InMemoryRelationalStore,
        app: Router,
    }

    fn harness() -> Harness {
        let identity = MockIdentityProvider::new();
        let relational = InMemoryRelationalStore::new();
        let state = AuthMiddlewareState::new(
            Arc::new(identity.clone()),
            Arc::new(relational.clone()),
        );
        let app = Router::new()
            .route(
                "/protected",
                get(|AuthExtractor(auth): AuthExtractor| async move { auth.uid }),
            )
            .layer(middleware::from_fn_with_state(state, auth_middleware));
        Harness {
            identity,
            relational,
            app,
        }
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/protected");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let h = harness();
        let (status, body) = call(h.app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Authorization header missing"));
    }

    #[tokio::test]
    async fn test_wrong_scheme_and_empty_token_are_invalid() {
        for value in ["Basic abc", "Bearer ", "Bearer    ", "bearer x"] {
            let h = harness();
            let (status, body) = call(h.app, Some(value)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", value);
            assert!(body.contains("Invalid token"), "{}", value);
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let h = harness();
        let (status, body) = call(h.app, Some("Bearer not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("INVALID_TOKEN"));
    }

    #[tokio::test]
    async fn test_valid_token_injects_context_and_provisions_user() {
        let h = harness();
        let uid = h.identity.add_user("ana@colmeia.io", "pw", "Ana");
        let token = h.identity.issue_token(&uid);

        let (status, body) = call(h.app, Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, uid);

        let row = h.relational.user_get(&uid).await.unwrap().unwrap();
        assert_eq!(row.email, "ana@colmeia.io");
        assert_eq!(row.display_name, "Ana");
    }

    #[tokio::test]
    async fn test_token_without_name_provisions_from_email() {
        let h = harness();
        let token = h.identity.token_for("uid-x", Some("bob@colmeia.io"), None);
        let (status, _) = call(h.app, Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
        let row = h.relational.user_get("uid-x").await.unwrap().unwrap();
        assert_eq!(row.display_name, "bob");
    }

    #[tokio::test]
    async fn test_revoked_token_is_invalid() {
        let h = harness();
        let uid = h.identity.add_user("c@colmeia.io", "pw", "C");
        let token = h.identity.issue_token(&uid);
        h.identity.revoke_refresh_tokens(&uid).await.unwrap();
        let (status, _) = call(h.app, Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Token abc"), None);
    }

    fn limited_app(per_minute: u32, burst: u32) -> Router {
        let config = ApiConfig {
            rate_limit_enabled: true,
            rate_limit_unauthenticated: per_minute,
            rate_limit_burst: burst,
            ..ApiConfig::default()
        };
        Router::new()
            .route("/open", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                RateLimitState::new(config),
                rate_limit_middleware,
            ))
    }

    async fn hit(app: &Router, ip: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/open")
                    .header("x-forwarded-for", ip)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_after_burst() {
        let app = limited_app(1, 2);
        assert_eq!(hit(&app, "10.0.0.1").await.status(), StatusCode::OK);
        assert_eq!(hit(&app, "10.0.0.1").await.status(), StatusCode::OK);

        let rejected = hit(&app, "10.0.0.1").await;
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(rejected.headers().contains_key("retry-after"));

        // Other clients have their own bucket
        assert_eq!(hit(&app, "10.0.0.2").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_reports_limit_header() {
        let app = limited_app(60, 5);
        let response = hit(&app, "10.0.0.3").await;
        assert_eq!(
            response.headers().get("x-ratelimit-limit").unwrap(),
            "60"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_disabled_passes_everything() {
        let config = ApiConfig {
            rate_limit_enabled: false,
            ..ApiConfig::default()
        };
        let app = Router::new()
            .route("/open", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                RateLimitState::new(config),
                rate_limit_middleware,
            ));
        for _ in 0..50 {
            assert_eq!(hit(&app, "10.0.0.9").await.status(), StatusCode::OK);
        }
    }

    #[test]
    fn test_client_ip_falls_back_to_localhost() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(
            extract_client_ip(&request),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }
}
