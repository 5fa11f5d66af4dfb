//! Constants for the Colmeia API
//!
//! Centralized default values used throughout the API.

// ============================================================================
// SERVER
// ============================================================================

/// Default listening port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default time a request may take before it is answered with 504
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Default rate limit for unauthenticated requests (per minute, per IP)
pub const DEFAULT_RATE_LIMIT_UNAUTHENTICATED: u32 = 60;

/// Default rate limit for authenticated requests (per minute, per user)
pub const DEFAULT_RATE_LIMIT_AUTHENTICATED: u32 = 600;

/// Default burst size for rate limiting
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 20;

// ============================================================================
// DATABASE
// ============================================================================

pub const DEFAULT_DB_POOL_MAX_SIZE: usize = 16;

pub const DEFAULT_DB_POOL_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// AI PROXY
// ============================================================================

/// Default timeout for calls to the AI microservice
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

/// Language assumed by the code review service when none is given
pub const DEFAULT_CODE_LANGUAGE: &str = "Python";

/// Tasks included in the task assistant's workspace context
pub const TASK_ASSISTANT_MAX_TASKS: usize = 15;

/// Default page size for the AI history listing
pub const DEFAULT_AI_HISTORY_LIMIT: usize = 20;

/// Maximum page size for the AI history listing
pub const MAX_AI_HISTORY_LIMIT: usize = 100;

// ============================================================================
// ORPHAN SWEEP
// ============================================================================

pub const DEFAULT_ORPHAN_SWEEP_INTERVAL_SECS: u64 = 900;

/// Age a document must reach before it can be treated as an orphan
pub const DEFAULT_ORPHAN_SWEEP_GRACE_SECS: u64 = 300;

/// Workspaces reconciled per pass
pub const DEFAULT_ORPHAN_SWEEP_BATCH: i64 = 50;

// ============================================================================
// SESSION
// ============================================================================

/// Cookie value that clears the session cookie on logout
pub const CLEARED_SESSION_COOKIE: &str = "session=; Path=/; Max-Age=0; HttpOnly";
