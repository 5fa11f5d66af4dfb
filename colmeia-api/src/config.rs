//! API Configuration Module
//!
//! Server, CORS, rate limiting and AI proxy settings. Configuration is loaded
//! from environment variables with defaults suited to development; production
//! deployments are checked by [`validate_for_production`].

use crate::constants::{
    DEFAULT_AI_TIMEOUT_SECS, DEFAULT_BIND_ADDR, DEFAULT_RATE_LIMIT_AUTHENTICATED,
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_UNAUTHENTICATED, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SERVER_PORT,
};
use crate::error::{ApiError, ApiResult};
use colmeia_firebase::FirebaseConfig;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Split a comma-separated origin list, dropping blanks.
///
/// A list made only of `*` means "allow any origin" and is returned empty.
pub fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.iter().all(|o| o == "*") {
        return Vec::new();
    }
    origins
}

/// Lenient boolean parsing for environment flags.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|s| parse_flag(&s))
        .unwrap_or(default)
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the listener, CORS and rate limiting.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub port: u16,

    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,

    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Requests per minute per client IP on public routes.
    pub rate_limit_unauthenticated: u32,

    /// Requests per minute per user on protected routes.
    pub rate_limit_authenticated: u32,

    /// Burst capacity above the steady rate.
    pub rate_limit_burst: u32,

    /// Longest a request may run before it is answered with a timeout.
    pub request_timeout: Duration,

    /// Deployment environment name (`development`, `production`, ...).
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_SERVER_PORT,
            cors_origins: Vec::new(),
            rate_limit_enabled: true,
            rate_limit_unauthenticated: DEFAULT_RATE_LIMIT_UNAUTHENTICATED,
            rate_limit_authenticated: DEFAULT_RATE_LIMIT_AUTHENTICATED,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SERVER_PORT`: Listening port (default: 8080)
    /// - `COLMEIA_BIND_ADDR`: Bind address (default: 0.0.0.0)
    /// - `CORS_ALLOWED_ORIGINS`: Comma-separated origins (empty or `*` = any)
    /// - `COLMEIA_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `COLMEIA_RATE_LIMIT_UNAUTHENTICATED`: Requests per minute per IP (default: 60)
    /// - `COLMEIA_RATE_LIMIT_AUTHENTICATED`: Requests per minute per user (default: 600)
    /// - `COLMEIA_RATE_LIMIT_BURST`: Burst capacity (default: 20)
    /// - `COLMEIA_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 60)
    /// - `COLMEIA_ENVIRONMENT`: Deployment environment (default: development)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_non_empty("COLMEIA_BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: env_parse("SERVER_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or_default(),
            rate_limit_enabled: env_flag("COLMEIA_RATE_LIMIT_ENABLED", true),
            rate_limit_unauthenticated: env_parse(
                "COLMEIA_RATE_LIMIT_UNAUTHENTICATED",
                defaults.rate_limit_unauthenticated,
            ),
            rate_limit_authenticated: env_parse(
                "COLMEIA_RATE_LIMIT_AUTHENTICATED",
                defaults.rate_limit_authenticated,
            ),
            rate_limit_burst: env_parse("COLMEIA_RATE_LIMIT_BURST", defaults.rate_limit_burst),
            request_timeout: Duration::from_secs(env_parse(
                "COLMEIA_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            environment: env_non_empty("COLMEIA_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Whether the configured environment is production.
    pub fn is_production(&self) -> bool {
        matches!(
            self.environment.to_ascii_lowercase().as_str(),
            "production" | "prod"
        )
    }

    /// Whether CORS accepts any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty()
    }

    /// Resolve the socket address to listen on.
    pub fn socket_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_addr, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

// ============================================================================
// AI PROXY CONFIGURATION
// ============================================================================

/// Settings for the AI microservice client.
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Base URL of the AI microservice. The AI routes answer 503 without it.
    pub base_url: Option<String>,
    /// Optional bearer key sent on every call.
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
        }
    }
}

impl AiConfig {
    /// Create AiConfig from environment variables.
    ///
    /// - `AI_API_BASE_URL`: Base URL of the AI microservice
    /// - `AI_API_KEY`: Optional bearer key
    /// - `AI_API_TIMEOUT_SECS`: Request timeout (default: 30)
    pub fn from_env() -> Self {
        Self {
            base_url: env_non_empty("AI_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            api_key: env_non_empty("AI_API_KEY").map(SecretString::from),
            timeout: Duration::from_secs(env_parse("AI_API_TIMEOUT_SECS", DEFAULT_AI_TIMEOUT_SECS)),
        }
    }
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

/// Reject settings that are only acceptable during development.
pub fn validate_for_production(
    api: &ApiConfig,
    firebase: &FirebaseConfig,
    ai: &AiConfig,
) -> ApiResult<()> {
    if api.allows_any_origin() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set CORS_ALLOWED_ORIGINS.",
        ));
    }
    if firebase.credentials_path.is_none() {
        return Err(ApiError::invalid_input(
            "Firebase credentials not configured for production. Set FIREBASE_CREDENTIALS_PATH.",
        ));
    }
    if ai.base_url.is_none() {
        return Err(ApiError::invalid_input(
            "AI service not configured for production. Set AI_API_BASE_URL.",
        ));
    }
    if !api.rate_limit_enabled {
        tracing::warn!("Rate limiting is disabled in production");
    }
    Ok(())
}
