//! Task dual-write.
//!
//! The detail document is written first and the relational stub second. A
//! failed stub insert is compensated by deleting the document; a failed
//! compensation leaves an orphan document that the orphan sweep removes
//! later. Updates and deletes also touch the document first.

use colmeia_core::{
    format_doc_timestamp, task::fields, TaskDetail, TaskPatch, Timestamp, DEFAULT_TASK_STATUS,
};
use colmeia_storage::{path, Direction, Document, DocumentStore, ListQuery, RelationalStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics::with_metrics;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Body of a task creation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = DateTime))]
    pub expiration_date: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub attachment: Option<Value>,
}

impl NewTask {
    /// Validate and turn into the document written to the store.
    pub fn into_detail(
        self,
        workspace_id: i64,
        creator_uid: &str,
        now: Timestamp,
    ) -> ApiResult<TaskDetail> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::missing_field("title"))?;
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_STATUS.to_string());

        Ok(TaskDetail {
            title,
            description: self.description.unwrap_or_default(),
            status,
            priority: self.priority.unwrap_or_default(),
            expiration_date: self.expiration_date,
            attachment: self.attachment,
            workspace_id_pg: workspace_id,
            creator_firebase_uid: creator_uid.to_string(),
            created_at: now,
            last_updated_at: now,
            last_updated_by_firebase_uid: None,
        })
    }
}

/// A task as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub expiration_date: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub attachment: Option<Value>,
    pub creator_firebase_uid: String,
    pub created_at: String,
    pub last_updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_by_firebase_uid: Option<String>,
}

impl TaskResponse {
    pub fn from_detail(id: impl Into<String>, detail: TaskDetail) -> Self {
        Self {
            id: id.into(),
            title: detail.title,
            description: detail.description,
            status: detail.status,
            priority: detail.priority,
            expiration_date: detail.expiration_date.as_ref().map(format_doc_timestamp),
            attachment: detail.attachment,
            creator_firebase_uid: detail.creator_firebase_uid,
            created_at: format_doc_timestamp(&detail.created_at),
            last_updated_at: format_doc_timestamp(&detail.last_updated_at),
            last_updated_by_firebase_uid: detail.last_updated_by_firebase_uid,
        }
    }

    fn from_document(doc: Document) -> Result<Self, serde_json::Error> {
        let detail = TaskDetail::from_fields(doc.fields)?;
        Ok(Self::from_detail(doc.id, detail))
    }
}

/// Outcome of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatedTask {
    /// The document was read back.
    Full(TaskResponse),
    /// Both writes succeeded but the read-back did not.
    Acknowledged { doc_id: String },
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Create a task in both stores.
pub async fn create_task(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    workspace_id: i64,
    creator_uid: &str,
    detail: TaskDetail,
) -> ApiResult<CreatedTask> {
    let created_by = relational
        .user_internal_id(creator_uid)
        .await?
        .ok_or_else(|| {
            tracing::error!(user_id = %creator_uid, "Task creator has no user record");
            ApiError::internal_error("Creator has no user record")
        })?;

    let doc_id = Uuid::new_v4().to_string();
    let doc_path = path::task_doc(workspace_id, &doc_id)?;
    let fields = detail.into_fields().map_err(|e| {
        tracing::error!(error = %e, "Task detail encoding failed");
        ApiError::internal_error("Failed to encode task")
    })?;

    if let Err(e) = documents.set(&doc_path, fields).await {
        tracing::error!(workspace_id, doc_id = %doc_id, error = %e, "Task document write failed");
        return Err(ApiError::document_store_error("Failed to create task"));
    }

    if let Err(e) = relational
        .task_stub_insert(&doc_id, workspace_id, created_by)
        .await
    {
        tracing::warn!(
            workspace_id,
            doc_id = %doc_id,
            error = %e,
            "Task stub insert failed, deleting document"
        );
        match documents.delete(&doc_path).await {
            Ok(()) => with_metrics(|m| m.record_compensation("task_create", true)),
            Err(cleanup) => {
                tracing::error!(
                    workspace_id,
                    doc_id = %doc_id,
                    error = %cleanup,
                    "Compensating delete failed, task document is orphaned"
                );
                with_metrics(|m| m.record_compensation("task_create", false));
            }
        }
        return Err(ApiError::database_error("Failed to create task record"));
    }

    tracing::info!(workspace_id, doc_id = %doc_id, user_id = %creator_uid, "Task created");

    let read_back = match documents.get(&doc_path).await {
        Ok(Some(doc)) => TaskResponse::from_document(doc).ok(),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(workspace_id, doc_id = %doc_id, error = %e, "Task read-back failed");
            None
        }
    };
    Ok(match read_back {
        Some(task) => CreatedTask::Full(task),
        None => CreatedTask::Acknowledged { doc_id },
    })
}

/// All tasks of a workspace, oldest first. Undecodable documents are skipped.
pub async fn list_tasks(
    documents: &dyn DocumentStore,
    workspace_id: i64,
) -> ApiResult<Vec<TaskResponse>> {
    let query = ListQuery::all().order_by(fields::CREATED_AT, Direction::Ascending);
    let docs = documents
        .list(&path::tasks_collection(workspace_id), query)
        .await
        .map_err(|e| {
            tracing::error!(workspace_id, error = %e, "Task listing failed");
            ApiError::document_store_error("Failed to fetch tasks")
        })?;

    Ok(docs
        .into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match TaskResponse::from_document(doc) {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!(workspace_id, doc_id = %id, error = %e, "Skipping malformed task");
                    None
                }
            }
        })
        .collect())
}

pub async fn get_task(
    documents: &dyn DocumentStore,
    workspace_id: i64,
    doc_id: &str,
) -> ApiResult<TaskResponse> {
    let doc_path = path::task_doc(workspace_id, doc_id)?;
    let doc = documents
        .get(&doc_path)
        .await
        .map_err(|e| {
            tracing::error!(workspace_id, doc_id, error = %e, "Task fetch failed");
            ApiError::document_store_error("Failed to fetch task")
        })?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    TaskResponse::from_document(doc).map_err(|e| {
        tracing::error!(workspace_id, doc_id, error = %e, "Malformed task document");
        ApiError::internal_error("Failed to read task")
    })
}

/// Apply a partial update, then bump the stub's `updated_at`.
pub async fn update_task(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    workspace_id: i64,
    doc_id: &str,
    patch: &TaskPatch,
    updated_by: &str,
    now: Timestamp,
) -> ApiResult<()> {
    if matches!(&patch.title, Some(title) if title.trim().is_empty()) {
        return Err(ApiError::invalid_input("Title cannot be empty"));
    }
    let changes = patch
        .to_update_fields(updated_by, &now)
        .ok_or_else(|| ApiError::invalid_input("No fields to update"))?;

    let doc_path = path::task_doc(workspace_id, doc_id)?;
    match documents.update(&doc_path, changes).await {
        Ok(()) => {}
        Err(colmeia_core::StorageError::NotFound { .. }) => {
            return Err(ApiError::not_found("Task not found"))
        }
        Err(e) => {
            tracing::error!(workspace_id, doc_id, error = %e, "Task document update failed");
            return Err(ApiError::document_store_error("Failed to update task"));
        }
    }

    match relational.task_stub_touch(doc_id, workspace_id).await {
        Ok(0) => tracing::warn!(workspace_id, doc_id, "Updated task has no stub"),
        Ok(_) => {}
        Err(e) => tracing::warn!(workspace_id, doc_id, error = %e, "Task stub touch failed"),
    }
    Ok(())
}

/// Delete the document, then the stub.
pub async fn delete_task(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    workspace_id: i64,
    doc_id: &str,
) -> ApiResult<()> {
    let doc_path = path::task_doc(workspace_id, doc_id)?;
    if let Err(e) = documents.delete(&doc_path).await {
        tracing::error!(workspace_id, doc_id, error = %e, "Task document delete failed");
        return Err(ApiError::document_store_error(
            "Failed to delete task from primary store",
        ));
    }

    match relational.task_stub_delete(doc_id, workspace_id).await {
        Ok(0) => {
            tracing::warn!(workspace_id, doc_id, "Deleted task had no stub");
            Ok(())
        }
        Ok(_) => {
            tracing::info!(workspace_id, doc_id, "Task deleted");
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                workspace_id,
                doc_id,
                error = %e,
                "Task stub delete failed after document delete"
            );
            Err(ApiError::database_error(
                "Task deleted from primary store, but failed to delete record",
            ))
        }
    }
}
