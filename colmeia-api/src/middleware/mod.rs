//! Middleware for the Colmeia API
//!
//! # Middleware Order
//!
//! On protected routes authentication runs before rate limiting, so the
//! limiter can key by uid:
//!
//! ```ignore
//! Router::new()
//!     .route("/workspaces", get(handler))
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//! ```

mod auth;

pub use auth::{
    auth_middleware, rate_limit_middleware, AuthContext, AuthExtractor,
    AuthMiddlewareError, AuthMiddlewareState, RateLimitError, RateLimitKey, RateLimitState,
};
