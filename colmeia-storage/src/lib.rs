//! Colmeia Storage
//!
//! The two persistence seams of the backend: a [`RelationalStore`] for users,
//! workspaces, membership and task stubs, and a [`DocumentStore`] for task
//! details and AI history. Production implementations live in `colmeia-api`
//! (PostgreSQL) and `colmeia-firebase` (Firestore); the in-memory versions
//! here back the test suites.

pub mod document;
pub mod memory;
pub mod path;
pub mod relational;

pub use document::{Direction, Document, DocumentStore, Fields, ListQuery, MAX_BATCH_WRITES};
pub use memory::{FailPoint, InMemoryDocumentStore, InMemoryRelationalStore};
pub use path::{CollectionPath, DocPath};
pub use relational::{RelationalStore, PRIVATE_WORKSPACE_DESCRIPTION};
