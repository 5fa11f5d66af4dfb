//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use colmeia_core::IdentityProvider;
use colmeia_storage::{DocumentStore, RelationalStore};

use crate::ai::AiClient;

/// Relational store shared across handlers.
pub type SharedRelational = Arc<dyn RelationalStore>;

/// Document store shared across handlers.
pub type SharedDocuments = Arc<dyn DocumentStore>;

/// Identity provider shared across handlers.
pub type SharedIdentity = Arc<dyn IdentityProvider>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Users, workspaces, membership and task stubs.
    pub relational: SharedRelational,
    /// Task details and AI interaction history.
    pub documents: SharedDocuments,
    pub identity: SharedIdentity,
    /// Client for the AI microservice. `None` when no base URL is configured,
    /// in which case the AI routes answer 503.
    pub ai: Option<Arc<AiClient>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        relational: SharedRelational,
        documents: SharedDocuments,
        identity: SharedIdentity,
        ai: Option<AiClient>,
    ) -> Self {
        Self {
            relational,
            documents,
            identity,
            ai: ai.map(Arc::new),
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(SharedRelational, relational);
crate::impl_from_ref!(SharedDocuments, documents);
crate::impl_from_ref!(SharedIdentity, identity);
crate::impl_from_ref!(Instant, start_time);
