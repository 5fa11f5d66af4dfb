//! REST API Routes Module
//!
//! Route handlers organized by resource:
//! - users: registration, login, logout and profile
//! - workspaces: CRUD and membership
//! - tasks: dual-written task CRUD
//! - ai: AI microservice proxy and interaction history
//! - health: Kubernetes-compatible liveness and readiness checks

pub mod ai;
pub mod health;
pub mod task;
pub mod user;
pub mod workspace;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    BoxError, Json, Router,
};
use colmeia_storage::RelationalStore;
use serde::{Deserialize, Serialize};
use tower::{
    timeout::{error::Elapsed, TimeoutLayer},
    ServiceBuilder,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_middleware, rate_limit_middleware, AuthMiddlewareState, RateLimitState};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// `{message}` body used by acknowledgement responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A required string field, trimmed. Missing and blank are both rejected.
pub(crate) fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::missing_field(field))
}

pub(crate) fn parse_workspace_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::invalid_input("Invalid workspace id"))
}

/// Reject callers who are not members of the workspace.
pub(crate) async fn require_member(
    relational: &dyn RelationalStore,
    uid: &str,
    workspace_id: i64,
) -> ApiResult<()> {
    if relational.member_is(uid, workspace_id).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not a member of this workspace"))
    }
}

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// SECURE ROUTER BUILDER
// ============================================================================

/// Builder for the API router with auth and rate limiting wired in.
///
/// Public routes (health, register, login) are rate-limited per client IP.
/// Every other route requires a verified ID token and is rate-limited per
/// user. `/metrics` and the OpenAPI document are left open.
pub struct SecureRouterBuilder {
    state: AppState,
    api_config: ApiConfig,
    auth_state: AuthMiddlewareState,
    rate_limit_state: RateLimitState,
}

impl SecureRouterBuilder {
    pub fn new(state: AppState, api_config: ApiConfig) -> Self {
        let auth_state = AuthMiddlewareState::new(state.identity.clone(), state.relational.clone());
        let rate_limit_state = RateLimitState::new(api_config.clone());
        Self {
            state,
            api_config,
            auth_state,
            rate_limit_state,
        }
    }

    fn build_public_routes(&self) -> Router<AppState> {
        Router::new()
            .nest("/health", health::create_router())
            .merge(user::public_router())
            .layer(from_fn_with_state(
                self.rate_limit_state.clone(),
                rate_limit_middleware,
            ))
    }

    fn build_protected_routes(&self) -> Router<AppState> {
        // Auth is the outer layer so the limiter sees the caller's uid
        Router::new()
            .merge(user::protected_router())
            .merge(workspace::create_router())
            .merge(task::create_router())
            .merge(ai::create_router())
            .layer(from_fn_with_state(
                self.rate_limit_state.clone(),
                rate_limit_middleware,
            ))
            .layer(from_fn_with_state(self.auth_state.clone(), auth_middleware))
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS - handles preflight requests
    /// 2. Observability - tracing and metrics
    /// 3. Request timeout
    /// 4. Auth (protected routes only)
    /// 5. Rate limiting
    pub fn build(self) -> Router {
        let mut router = Router::new()
            .merge(self.build_public_routes())
            .merge(self.build_protected_routes())
            .route("/metrics", get(metrics_handler))
            .route("/openapi.json", get(openapi_json));

        #[cfg(feature = "swagger-ui")]
        {
            use utoipa_swagger_ui::SwaggerUi;
            router = router.merge(
                SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
            );
        }

        let cors = build_cors_layer(&self.api_config);
        let router = with_request_timeout(
            router.with_state(self.state),
            self.api_config.request_timeout,
        );

        router
            .layer(from_fn(observability_middleware))
            .layer(cors)
    }
}

// ============================================================================
// TIMEOUT LAYER
// ============================================================================

/// Answer requests still running after `timeout` with a 504.
pub(crate) fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(timeout)),
    )
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        tracing::warn!("Request timed out");
        ApiError::timeout("request")
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        ApiError::internal_error("Internal server error")
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer. An empty origin list allows any origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(3600));

    if config.allows_any_origin() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Create the complete API router.
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    SecureRouterBuilder::new(state, api_config.clone()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use colmeia_test_utils::InMemoryRelationalStore;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  ana ".into()), "name").unwrap(), "ana");
        let err = required(Some("   ".into()), "name").unwrap_err();
        assert_eq!(err.message, "Required field 'name' is missing");
        assert!(required(None, "name").is_err());
    }

    #[test]
    fn test_parse_workspace_id() {
        assert_eq!(parse_workspace_id("42").unwrap(), 42);
        let err = parse_workspace_id("abc").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid workspace id");
    }

    #[tokio::test]
    async fn test_require_member() {
        let store = InMemoryRelationalStore::new();
        store.user_insert("uid-1", "a@colmeia.io", "A").await.unwrap();
        let ws = store
            .workspace_create_public("uid-1", "W", "")
            .await
            .unwrap();
        assert!(require_member(&store, "uid-1", ws.id).await.is_ok());
        let err = require_member(&store, "uid-2", ws.id).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    fn slow_app(timeout: Duration) -> Router {
        let router = Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "late"
                }),
            );
        with_request_timeout(router, timeout)
    }

    #[tokio::test]
    async fn test_request_timeout_answers_504() {
        use axum::body::Body;
        use axum::http::Request;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let app = slow_app(Duration::from_millis(20));
        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "TIMEOUT");
        assert_eq!(body["message"], "Operation 'request' timed out");
    }

    #[tokio::test]
    async fn test_request_within_timeout_passes() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let app = slow_app(Duration::from_secs(5));
        let response = app
            .oneshot(Request::builder().uri("/fast").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
