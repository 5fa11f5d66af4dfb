//! Colmeia Core - Domain Types
//!
//! Data structures shared by every crate of the workspace: relational
//! entities, task documents, AI payloads, error enums and the identity
//! provider trait. No I/O happens here.

use chrono::{DateTime, Utc};

pub mod ai;
pub mod entities;
pub mod error;
pub mod identity;
pub mod task;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use ai::{
    AiErrorField, AiHistoryEntry, AiServiceType, CodeReviewRequest, CodeReviewResponse,
    MemberContext, MindMapRequest, MindMapResponse, SummarizeRequest, SummarizeResponse,
    TaskAssistantRequest, TaskAssistantResponse, TaskContext, WorkspaceContext,
};
pub use entities::{MemberRole, TaskStub, UserRecord, UserWorkspace, Workspace, WorkspaceMember};
pub use error::{
    ColmeiaError, ColmeiaResult, ConfigError, IdentityError, StorageError, StoreKind,
    StoreResult, ValidationError,
};
pub use identity::{
    Clock, FixedClock, IdentityProvider, IdentityResult, IdentityUser, SignInResult, SystemClock,
    VerifiedToken,
};
pub use task::{
    format_doc_timestamp, parse_doc_timestamp, TaskDetail, TaskPatch, DEFAULT_TASK_STATUS,
};
