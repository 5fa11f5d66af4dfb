//! Workspace snapshot sent to the task assistant.

use colmeia_core::{task::fields, MemberContext, TaskContext, WorkspaceContext};
use colmeia_storage::{path, Direction, DocumentStore, ListQuery, RelationalStore};

use crate::constants::TASK_ASSISTANT_MAX_TASKS;
use crate::error::{ApiError, ApiResult};

const LOAD_FAILED: &str = "Failed to load workspace data";

/// Gather the workspace, its members and its most recently updated tasks.
///
/// Workspace and member lookups must succeed; the task list is best-effort
/// and comes back empty when the document store fails.
pub async fn build_workspace_context(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    workspace_id: i64,
    user_message: &str,
) -> ApiResult<WorkspaceContext> {
    let workspace = relational
        .workspace_get(workspace_id)
        .await
        .map_err(|e| {
            tracing::error!(workspace_id, error = %e, "Workspace lookup failed");
            ApiError::internal_error(LOAD_FAILED)
        })?
        .ok_or_else(|| {
            tracing::error!(workspace_id, "Workspace missing while building assistant context");
            ApiError::internal_error(LOAD_FAILED)
        })?;

    let members = relational.member_list(workspace_id).await.map_err(|e| {
        tracing::error!(workspace_id, error = %e, "Member listing failed");
        ApiError::internal_error(LOAD_FAILED)
    })?;

    let query = ListQuery::all()
        .order_by(fields::LAST_UPDATED_AT, Direction::Descending)
        .limit(TASK_ASSISTANT_MAX_TASKS);
    let tasks = match documents
        .list(&path::tasks_collection(workspace_id), query)
        .await
    {
        Ok(docs) => docs
            .iter()
            .map(|doc| TaskContext {
                title: doc.str_field("title").unwrap_or_default().to_string(),
                status: doc.str_field("status").unwrap_or_default().to_string(),
                priority: doc.str_field("priority").unwrap_or_default().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!(workspace_id, error = %e, "Task fetch for assistant context failed");
            Vec::new()
        }
    };

    Ok(WorkspaceContext {
        workspace_id: workspace_id.to_string(),
        workspace_name: workspace.name,
        workspace_description: workspace.description,
        members: members
            .into_iter()
            .map(|m| MemberContext {
                name: m.display_name,
                role: m.role.as_str().to_string(),
            })
            .collect(),
        tasks,
        user_message: user_message.to_string(),
    })
}
