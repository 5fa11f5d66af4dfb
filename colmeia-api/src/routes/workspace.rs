//! Workspace REST API Routes
//!
//! Workspaces and their membership. Deletion goes through
//! [`crate::services::workspace`], which purges the document store first.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use colmeia_core::{MemberRole, UserWorkspace, Workspace, WorkspaceMember};
use serde::{Deserialize, Serialize};

use super::{parse_workspace_id, require_member, required, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::services;
use crate::state::{AppState, SharedDocuments, SharedRelational};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkspaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AddMemberRequest {
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberRequest {
    pub user_firebase_uid: Option<String>,
}

/// Fetch a workspace, 404 when it does not exist.
async fn load_workspace(relational: &SharedRelational, workspace_id: i64) -> ApiResult<Workspace> {
    relational
        .workspace_get(workspace_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Workspace not found"))
}

/// Fetch a workspace the caller owns.
async fn load_owned(
    relational: &SharedRelational,
    workspace_id: i64,
    uid: &str,
    action: &str,
) -> ApiResult<Workspace> {
    let workspace = load_workspace(relational, workspace_id).await?;
    if !workspace.is_owned_by(uid) {
        return Err(ApiError::forbidden(format!(
            "Only the owner can {} this workspace",
            action
        )));
    }
    Ok(workspace)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /workspaces - Workspaces the caller belongs to
#[utoipa::path(
    get,
    path = "/workspaces",
    tag = "Workspaces",
    responses(
        (status = 200, description = "Workspaces ordered by name", body = [UserWorkspace]),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_workspaces(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<Vec<UserWorkspace>>> {
    Ok(Json(relational.workspace_list_for_user(&auth.uid).await?))
}

/// POST /workspaces - Create a public workspace
#[utoipa::path(
    post,
    path = "/workspaces",
    tag = "Workspaces",
    request_body = WorkspaceRequest,
    responses(
        (status = 201, description = "Workspace created", body = Workspace),
        (status = 400, description = "Missing name", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_workspace(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<WorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = required(req.name, "name")?;
    let description = req.description.unwrap_or_default();
    let workspace = relational
        .workspace_create_public(&auth.uid, &name, description.trim())
        .await?;
    tracing::info!(workspace_id = workspace.id, user_id = %auth.uid, "Workspace created");
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// POST /workspaces/private - Create the caller's personal workspace
#[utoipa::path(
    post,
    path = "/workspaces/private",
    tag = "Workspaces",
    responses(
        (status = 201, description = "Workspace created", body = Workspace),
        (status = 409, description = "Private workspace exists", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_private_workspace(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<impl IntoResponse> {
    let workspace = relational.workspace_create_private(&auth.uid).await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// GET /workspaces/{id}
#[utoipa::path(
    get,
    path = "/workspaces/{id}",
    tag = "Workspaces",
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace", body = Workspace),
        (status = 403, description = "Private and not a member", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_workspace(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Workspace>> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    let workspace = load_workspace(&relational, workspace_id).await?;
    if !workspace.is_public {
        require_member(relational.as_ref(), &auth.uid, workspace_id).await?;
    }
    Ok(Json(workspace))
}

/// PUT /workspaces/{id} - Rename or describe a workspace (owner only)
#[utoipa::path(
    put,
    path = "/workspaces/{id}",
    tag = "Workspaces",
    params(("id" = i64, Path, description = "Workspace id")),
    request_body = WorkspaceRequest,
    responses(
        (status = 204, description = "Updated"),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_workspace(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
    Json(req): Json<WorkspaceRequest>,
) -> ApiResult<StatusCode> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    load_owned(&relational, workspace_id, &auth.uid, "update").await?;
    let name = required(req.name, "name")?;
    let description = req.description.unwrap_or_default();

    if !relational
        .workspace_update(workspace_id, &name, description.trim())
        .await?
    {
        return Err(ApiError::not_found("Workspace not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /workspaces/{id} - Delete a workspace and all of its documents
#[utoipa::path(
    delete,
    path = "/workspaces/{id}",
    tag = "Workspaces",
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 500, description = "Document purge failed, nothing deleted", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_workspace(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    services::delete_workspace(
        relational.as_ref(),
        documents.as_ref(),
        workspace_id,
        &auth.uid,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /workspaces/{id}/members
#[utoipa::path(
    get,
    path = "/workspaces/{id}/members",
    tag = "Workspaces",
    params(("id" = i64, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Members", body = [WorkspaceMember]),
        (status = 403, description = "Not a member", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Vec<WorkspaceMember>>> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    require_member(relational.as_ref(), &auth.uid, workspace_id).await?;
    Ok(Json(relational.member_list(workspace_id).await?))
}

/// POST /workspaces/{id}/members - Add a user by email (owner only)
#[utoipa::path(
    post,
    path = "/workspaces/{id}/members",
    tag = "Workspaces",
    params(("id" = i64, Path, description = "Workspace id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = MessageResponse),
        (status = 400, description = "Unknown user or already a member", body = ApiError),
        (status = 403, description = "Not the owner", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_member(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    load_owned(&relational, workspace_id, &auth.uid, "add members to").await?;
    let email = required(req.email, "email")?;
    let role = MemberRole::parse_or_member(req.role.as_deref());

    relational.member_add(workspace_id, &email, role).await?;
    tracing::info!(workspace_id, role = %role, "Member added");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User added to workspace successfully")),
    ))
}

/// DELETE /workspaces/{id}/members - Remove a member (owner, or the member themself)
#[utoipa::path(
    delete,
    path = "/workspaces/{id}/members",
    tag = "Workspaces",
    params(("id" = i64, Path, description = "Workspace id")),
    request_body = RemoveMemberRequest,
    responses(
        (status = 204, description = "Member removed"),
        (status = 400, description = "Cannot remove the owner", body = ApiError),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Membership not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_member(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
    Json(req): Json<RemoveMemberRequest>,
) -> ApiResult<StatusCode> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    let target = required(req.user_firebase_uid, "userFirebaseUid")?;
    let workspace = load_workspace(&relational, workspace_id).await?;

    if workspace.is_owned_by(&target) {
        return Err(ApiError::invalid_input("Cannot remove the workspace owner"));
    }
    if !workspace.is_owned_by(&auth.uid) && auth.uid != target {
        return Err(ApiError::forbidden(
            "Only the owner can remove other members",
        ));
    }

    if !relational.member_remove(workspace_id, &target).await? {
        return Err(ApiError::not_found("Membership not found"));
    }
    tracing::info!(workspace_id, user_id = %target, "Member removed");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route("/workspaces/private", post(create_private_workspace))
        .route(
            "/workspaces/:workspace_id",
            get(get_workspace)
                .put(update_workspace)
                .delete(delete_workspace),
        )
        .route(
            "/workspaces/:workspace_id/members",
            get(list_members).post(add_member).delete(remove_member),
        )
}
