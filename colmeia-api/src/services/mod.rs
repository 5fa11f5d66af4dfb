//! Operations spanning both stores.
//!
//! Handlers stay thin and call these with the store trait objects from the
//! application state, which keeps the ordering rules of the dual writes in
//! one place and testable over the in-memory stores.

pub mod reconcile;
pub mod task;
pub mod workspace;

pub use reconcile::{reconcile_workspace, ReconcileReport};
pub use task::{
    create_task, delete_task, get_task, list_tasks, update_task, CreatedTask, NewTask,
    TaskResponse,
};
pub use workspace::{delete_workspace, purge_workspace_documents, PurgeReport};
