//! AI REST API Routes
//!
//! Thin proxies to the AI microservice. Validation failures use the usual
//! error envelope; AI failures use the shapes described in [`crate::ai::proxy`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use colmeia_core::{
    AiErrorField, AiServiceType, CodeReviewRequest, CodeReviewResponse, MindMapRequest,
    MindMapResponse, SummarizeRequest, SummarizeResponse, TaskAssistantRequest,
    TaskAssistantResponse,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::{parse_workspace_id, require_member, required};
use crate::ai::{self, history, AiCall, AiClient};
use crate::constants::{DEFAULT_AI_HISTORY_LIMIT, DEFAULT_CODE_LANGUAGE, MAX_AI_HISTORY_LIMIT};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::{AppState, SharedDocuments, SharedRelational};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CodeReviewInput {
    pub code: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TextInput {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskAssistantInput {
    pub user_message: Option<String>,
    /// Workspace id as a string. Bare numbers are accepted too.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub workspace_id: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn effective_limit(&self) -> usize {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_AI_HISTORY_LIMIT)
            .min(MAX_AI_HISTORY_LIMIT)
    }
}

fn client(state: &AppState) -> ApiResult<Arc<AiClient>> {
    state
        .ai
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("AI service is not configured"))
}

fn workspace_id_from(raw: Option<Value>) -> ApiResult<i64> {
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => parse_workspace_id(&s),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ApiError::invalid_input("Invalid workspace id")),
        Some(Value::Null) | None => Err(ApiError::missing_field("workspace_id")),
        Some(Value::String(_)) => Err(ApiError::missing_field("workspace_id")),
        Some(_) => Err(ApiError::invalid_input("Invalid workspace id")),
    }
}

/// Run one proxied call and turn the outcome into a response.
async fn proxy<Req, Resp>(
    client: &AiClient,
    state: &AppState,
    service: AiServiceType,
    user_id: &str,
    workspace_id: i64,
    frontend_payload: Value,
    request: &Req,
) -> Response
where
    Req: Serialize,
    Resp: DeserializeOwned + Serialize + AiErrorField,
{
    let call = AiCall {
        service,
        user_id,
        workspace_id,
        frontend_payload,
        request,
    };
    match ai::proxy::run::<Req, Resp>(client, state.documents.as_ref(), call).await {
        Ok(body) => Json(body).into_response(),
        Err(failure) => failure.into_response(),
    }
}

fn payload<T: Serialize>(input: &T) -> Value {
    serde_json::to_value(input).unwrap_or(Value::Null)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /ai/code-review
#[utoipa::path(
    post,
    path = "/ai/code-review",
    tag = "AI",
    request_body = CodeReviewInput,
    responses(
        (status = 200, description = "Review", body = CodeReviewResponse),
        (status = 400, description = "Missing code", body = ApiError),
        (status = 503, description = "AI service not configured", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn code_review(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<CodeReviewInput>,
) -> ApiResult<Response> {
    let client = client(&state)?;
    let frontend_payload = payload(&input);
    let code = input
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::missing_field("code"))?;
    let language = input
        .language
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_CODE_LANGUAGE.to_string());

    let request = CodeReviewRequest { code, language };
    Ok(proxy::<_, CodeReviewResponse>(
        &client,
        &state,
        AiServiceType::CodeReview,
        &auth.uid,
        0,
        frontend_payload,
        &request,
    )
    .await)
}

/// POST /ai/summarize
#[utoipa::path(
    post,
    path = "/ai/summarize",
    tag = "AI",
    request_body = TextInput,
    responses(
        (status = 200, description = "Summary", body = SummarizeResponse),
        (status = 400, description = "Missing text", body = ApiError),
        (status = 503, description = "AI service not configured", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn summarize(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<TextInput>,
) -> ApiResult<Response> {
    let client = client(&state)?;
    let frontend_payload = payload(&input);
    let text = required(input.text, "text")?;

    Ok(proxy::<_, SummarizeResponse>(
        &client,
        &state,
        AiServiceType::TextSummary,
        &auth.uid,
        0,
        frontend_payload,
        &SummarizeRequest { text },
    )
    .await)
}

/// POST /ai/mindmap-ideas
#[utoipa::path(
    post,
    path = "/ai/mindmap-ideas",
    tag = "AI",
    request_body = TextInput,
    responses(
        (status = 200, description = "Mind map ideas", body = MindMapResponse),
        (status = 400, description = "Missing text", body = ApiError),
        (status = 503, description = "AI service not configured", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn mindmap_ideas(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<TextInput>,
) -> ApiResult<Response> {
    let client = client(&state)?;
    let frontend_payload = payload(&input);
    let text = required(input.text, "text")?;

    Ok(proxy::<_, MindMapResponse>(
        &client,
        &state,
        AiServiceType::MindmapIdeas,
        &auth.uid,
        0,
        frontend_payload,
        &MindMapRequest { text },
    )
    .await)
}

/// POST /ai/task-assistant - Suggestions based on a workspace snapshot
#[utoipa::path(
    post,
    path = "/ai/task-assistant",
    tag = "AI",
    request_body = TaskAssistantInput,
    responses(
        (status = 200, description = "Suggestions", body = TaskAssistantResponse),
        (status = 400, description = "Missing or invalid field", body = ApiError),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 503, description = "AI service not configured", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn task_assistant(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<TaskAssistantInput>,
) -> ApiResult<Response> {
    let client = client(&state)?;
    let frontend_payload = payload(&input);
    let user_message = required(input.user_message, "user_message")?;
    let workspace_id = workspace_id_from(input.workspace_id)?;
    require_member(state.relational.as_ref(), &auth.uid, workspace_id).await?;

    let workspace_context = ai::build_workspace_context(
        state.relational.as_ref(),
        state.documents.as_ref(),
        workspace_id,
        &user_message,
    )
    .await?;

    Ok(proxy::<_, TaskAssistantResponse>(
        &client,
        &state,
        AiServiceType::TaskAssistant,
        &auth.uid,
        workspace_id,
        frontend_payload,
        &TaskAssistantRequest { workspace_context },
    )
    .await)
}

/// GET /workspaces/{id}/ai-history - Recent AI interactions, newest first
#[utoipa::path(
    get,
    path = "/workspaces/{id}/ai-history",
    tag = "AI",
    params(
        ("id" = i64, Path, description = "Workspace id"),
        ("limit" = Option<usize>, Query, description = "Entries to return, default 20, at most 100"),
    ),
    responses(
        (status = 200, description = "History entries, each with its document id"),
        (status = 403, description = "Not a member", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn ai_history(
    State(relational): State<SharedRelational>,
    State(documents): State<SharedDocuments>,
    AuthExtractor(auth): AuthExtractor,
    Path(raw_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Value>>> {
    let workspace_id = parse_workspace_id(&raw_id)?;
    require_member(relational.as_ref(), &auth.uid, workspace_id).await?;

    let entries = history::list_recent(documents.as_ref(), workspace_id, query.effective_limit())
        .await
        .map_err(|e| {
            tracing::error!(workspace_id, error = %e, "AI history listing failed");
            ApiError::document_store_error("Failed to load AI history")
        })?;
    Ok(Json(entries))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ai/code-review", post(code_review))
        .route("/ai/summarize", post(summarize))
        .route("/ai/mindmap-ideas", post(mindmap_ideas))
        .route("/ai/task-assistant", post(task_assistant))
        .route("/workspaces/:workspace_id/ai-history", get(ai_history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_history_limit_defaults_and_caps() {
        assert_eq!(HistoryQuery { limit: None }.effective_limit(), 20);
        assert_eq!(HistoryQuery { limit: Some(0) }.effective_limit(), 20);
        assert_eq!(HistoryQuery { limit: Some(5) }.effective_limit(), 5);
        assert_eq!(HistoryQuery { limit: Some(5000) }.effective_limit(), 100);
    }

    #[test]
    fn test_workspace_id_from_string_or_number() {
        assert_eq!(workspace_id_from(Some(json!("12"))).unwrap(), 12);
        assert_eq!(workspace_id_from(Some(json!(7))).unwrap(), 7);
    }

    #[test]
    fn test_workspace_id_rejections() {
        let err = workspace_id_from(Some(json!("twelve"))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid workspace id");

        let err = workspace_id_from(None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = workspace_id_from(Some(json!([1]))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
