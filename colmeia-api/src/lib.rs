//! Colmeia API - REST layer of the collaborative workspace backend
//!
//! Users, workspaces and task stubs live in PostgreSQL; task details and AI
//! interaction history live in Firestore. Writes that span both stores are
//! ordered and compensated in [`services`], and the [`jobs::orphan_sweep`]
//! job removes whatever a failed compensation left behind.

#[macro_use]
pub mod macros;

pub mod ai;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use ai::AiClient;
pub use config::{validate_for_production, AiConfig, ApiConfig};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{orphan_sweep_task, OrphanSweepConfig};
pub use middleware::{auth_middleware, AuthContext, AuthExtractor, AuthMiddlewareState};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::{AppState, SharedDocuments, SharedIdentity, SharedRelational};
