//! Task REST API Routes
//!
//! Members of a workspace manage its tasks. The dual-write itself lives in
//! [`crate::services::task`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use colmeia_core::TaskPatch;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{parse_workspace_id, require_member, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::services::{self, CreatedTask, NewTask, TaskResponse};
use crate::state::{SharedDocuments, SharedRelational, AppState};

/// Returned when the task was written but could not be read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatedAck {
    pub message: String,
    pub firestore_doc_id: String,
}

fn parse_task_id(raw: &str) -> ApiResult<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| ApiError::invalid_input("Invalid task id"))
}

/// Parse the workspace id and check the caller belongs to it.
async fn member_workspace(
    relational: &SharedRelational,
    uid: &str,
    raw_id: &str,
) -> ApiResult<i64> {
    let workspace_id = parse_workspace_id(raw_id)?;
    require_member(relational.as_ref(), uid, workspace_id).await?;
    Ok(workspace_id)
}

/// POST /workspaces/{id}/tasks
#[utoipa::path(
    post,
    path = "/workspaces/{id}/tasks",
    tag = "Tasks",
    params(("id" = i64, Path, description = "Workspace id")),
    request_body = NewTask,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Missing title", body = ApiError),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 500, description = "Dual-write failed", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
    Json(req): Json<NewTask>,
) -> ApiResult<Response> {
    let workspace_id = member_workspace(&relational, &auth.uid, &raw_id).await?;
    let detail = req.into_detail(workspace_id, &auth.uid, chrono::Utc::now())?;

    let created = services::create_task(
        relational.as_ref(),
        documents.as_ref(),
        workspace_id,
        &auth.uid,
        detail,
    )
    .await?;

    Ok(match created {
        CreatedTask::Full(task) => (StatusCode::CREATED, Json(task)).into_response(),
        CreatedTask::Acknowledged { doc_id } => (
            StatusCode::CREATED,
            Json(TaskCreatedAck {
                message: "Task created successfully".to_string(),
                firestore_doc_id: doc_id,
            }),
        )
            .into_response(),
    })
}

/// GET /workspaces/{id}/tasks
#[utoipa::path(
    get,
    path = "/workspaces/{id}/tasks",
    tag = "Tasks",
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Tasks, oldest first", body = [TaskResponse]),
        (status = 403, description = "Not a member", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    let workspace_id = member_workspace(&relational, &auth.uid, &raw_id).await?;
    Ok(Json(
        services::list_tasks(documents.as_ref(), workspace_id).await?,
    ))
}

/// GET /workspaces/{id}/tasks/{task_id}
#[utoipa::path(
    get,
    path = "/workspaces/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = i64, Path, description = "Workspace id"),
        ("task_id" = String, Path, description = "Task document id"),
    ),
    responses(
        (status = 200, description = "Task", body = TaskResponse),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 404, description = "Task not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path((raw_id, raw_task_id)): Path<(String, String)>,
) -> ApiResult<Json<TaskResponse>> {
    let workspace_id = member_workspace(&relational, &auth.uid, &raw_id).await?;
    let task_id = parse_task_id(&raw_task_id)?;
    Ok(Json(
        services::get_task(documents.as_ref(), workspace_id, &task_id).await?,
    ))
}

/// PUT /workspaces/{id}/tasks/{task_id} - Partial update
#[utoipa::path(
    put,
    path = "/workspaces/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = i64, Path, description = "Workspace id"),
        ("task_id" = String, Path, description = "Task document id"),
    ),
    request_body = TaskPatch,
    responses(
        (status = 200, description = "Task updated", body = MessageResponse),
        (status = 400, description = "Empty patch or blank title", body = ApiError),
        (status = 404, description = "Task not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path((raw_id, raw_task_id)): Path<(String, String)>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Json<MessageResponse>> {
    let workspace_id = member_workspace(&relational, &auth.uid, &raw_id).await?;
    let task_id = parse_task_id(&raw_task_id)?;

    services::update_task(
        relational.as_ref(),
        documents.as_ref(),
        workspace_id,
        &task_id,
        &patch,
        &auth.uid,
        chrono::Utc::now(),
    )
    .await?;
    Ok(Json(MessageResponse::new("Task updated successfully")))
}

/// DELETE /workspaces/{id}/tasks/{task_id}
#[utoipa::path(
    delete,
    path = "/workspaces/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = i64, Path, description = "Workspace id"),
        ("task_id" = String, Path, description = "Task document id"),
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 500, description = "Delete failed", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path((raw_id, raw_task_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let workspace_id = member_workspace(&relational, &auth.uid, &raw_id).await?;
    let task_id = parse_task_id(&raw_task_id)?;

    services::delete_task(
        relational.as_ref(),
        documents.as_ref(),
        workspace_id,
        &task_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/workspaces/:workspace_id/tasks",
            get(list_tasks).post(create_task),
        )
        .route(
            "/workspaces/:workspace_id/tasks/:task_id",
            get(get_task).put(update_task).delete(delete_task),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_id_accepts_uuid() {
        let id = "0b0e1a4e-5d3c-4f53-9a4e-2f7a2d7c1b10";
        assert_eq!(parse_task_id(id).unwrap(), id);
    }

    #[test]
    fn test_parse_task_id_rejects_path_segments() {
        for raw in ["abc", "../x", "a/b", ""] {
            let err = parse_task_id(raw).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(err.message, "Invalid task id");
        }
    }
}
