//! OpenAPI Specification for the Colmeia API
//!
//! Generated with utoipa from the route annotations and the request and
//! response types. Served at `/openapi.json`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{ai, health, task, user, workspace, MessageResponse};
use crate::services::{NewTask, TaskResponse};

use colmeia_core::{
    CodeReviewResponse, MemberRole, MindMapResponse, SummarizeResponse, TaskAssistantResponse,
    TaskPatch, UserRecord, UserWorkspace, Workspace, WorkspaceMember,
};

/// OpenAPI document for the Colmeia API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Colmeia API",
        version = "0.1.0",
        description = "Collaborative workspaces, dual-written tasks and an AI assistant proxy",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Users", description = "Registration, login and profiles"),
        (name = "Workspaces", description = "Workspaces and membership"),
        (name = "Tasks", description = "Tasks stored across both stores"),
        (name = "AI", description = "AI microservice proxy and interaction history"),
        (name = "Health", description = "Liveness and readiness checks")
    ),
    paths(
        // === User Routes ===
        user::register,
        user::login,
        user::logout,
        user::get_current_user,
        user::update_current_user,
        user::delete_current_user,
        user::list_users,
        user::get_user,

        // === Workspace Routes ===
        workspace::list_workspaces,
        workspace::create_workspace,
        workspace::create_private_workspace,
        workspace::get_workspace,
        workspace::update_workspace,
        workspace::delete_workspace,
        workspace::list_members,
        workspace::add_member,
        workspace::remove_member,

        // === Task Routes ===
        task::create_task,
        task::list_tasks,
        task::get_task,
        task::update_task,
        task::delete_task,

        // === AI Routes ===
        ai::code_review,
        ai::summarize,
        ai::mindmap_ideas,
        ai::task_assistant,
        ai::ai_history,

        // === Health Routes ===
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(
        schemas(
            ApiError,
            ErrorCode,
            MessageResponse,

            user::RegisterRequest,
            user::RegisterResponse,
            user::LoginRequest,
            user::LoginResponse,
            user::UpdateUserRequest,
            UserRecord,

            workspace::WorkspaceRequest,
            workspace::AddMemberRequest,
            workspace::RemoveMemberRequest,
            Workspace,
            UserWorkspace,
            WorkspaceMember,
            MemberRole,

            NewTask,
            TaskPatch,
            TaskResponse,
            task::TaskCreatedAck,

            ai::CodeReviewInput,
            ai::TextInput,
            ai::TaskAssistantInput,
            CodeReviewResponse,
            SummarizeResponse,
            MindMapResponse,
            TaskAssistantResponse,

            health::HealthResponse,
            health::HealthStatus,
            health::HealthDetails,
            health::ComponentHealth,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the Firebase ID token bearer scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Firebase ID token"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    /// Generate the OpenAPI document as a JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
