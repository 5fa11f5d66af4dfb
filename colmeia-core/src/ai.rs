//! Payloads exchanged with the AI microservice and the interaction history.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The AI services proxied by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiServiceType {
    TaskAssistant,
    CodeReview,
    TextSummary,
    MindmapIdeas,
}

impl AiServiceType {
    /// Path on the AI microservice.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            AiServiceType::TaskAssistant => "/assistente-tarefas",
            AiServiceType::CodeReview => "/code-review",
            AiServiceType::TextSummary => "/summarize",
            AiServiceType::MindmapIdeas => "/mindmap-ideas",
        }
    }

    /// Message returned to clients when the AI call fails without a structured error.
    pub fn failure_message(&self) -> &'static str {
        match self {
            AiServiceType::TaskAssistant => "Failed to communicate with the task assistant",
            AiServiceType::CodeReview => "Failed to process code review",
            AiServiceType::TextSummary => "Failed to process summary",
            AiServiceType::MindmapIdeas => "Failed to generate mind map ideas",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiServiceType::TaskAssistant => "task_assistant",
            AiServiceType::CodeReview => "code_review",
            AiServiceType::TextSummary => "text_summary",
            AiServiceType::MindmapIdeas => "mindmap_ideas",
        }
    }
}

impl fmt::Display for AiServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI response bodies that may carry an `error` field instead of a result.
pub trait AiErrorField {
    fn ai_error(&self) -> Option<&str>;
}

// ============================================================================
// REQUEST / RESPONSE PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReviewRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CodeReviewResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub review: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SummarizeResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMapRequest {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MindMapResponse {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mind_map_ideas: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssistantRequest {
    pub workspace_context: WorkspaceContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskAssistantResponse {
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

macro_rules! impl_ai_error_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl AiErrorField for $ty {
                fn ai_error(&self) -> Option<&str> {
                    self.error.as_deref().filter(|msg| !msg.is_empty())
                }
            }
        )*
    };
}

impl_ai_error_field!(
    CodeReviewResponse,
    SummarizeResponse,
    MindMapResponse,
    TaskAssistantResponse,
);

// ============================================================================
// WORKSPACE CONTEXT
// ============================================================================

/// Snapshot of a workspace sent to the task assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceContext {
    pub workspace_id: String,
    pub workspace_name: String,
    pub workspace_description: String,
    pub members: Vec<MemberContext>,
    pub tasks: Vec<TaskContext>,
    pub user_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberContext {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub title: String,
    pub status: String,
    pub priority: String,
}

// ============================================================================
// INTERACTION HISTORY
// ============================================================================

/// One AI call as recorded in `workspaces/{id}/ai_request_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiHistoryEntry {
    pub user_id: String,
    pub workspace_id_pg: i64,
    pub ai_service_type: AiServiceType,
    pub timestamp: String,
    pub frontend_request_payload: Value,
    pub request_to_ai: Value,
    pub response_from_ai: Value,
    pub ai_status_code: u16,
    #[serde(default)]
    pub ai_error: Option<String>,
}

impl AiHistoryEntry {
    pub fn timestamp(&self) -> Option<Timestamp> {
        crate::task::parse_doc_timestamp(&self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_paths() {
        assert_eq!(AiServiceType::CodeReview.endpoint_path(), "/code-review");
        assert_eq!(AiServiceType::TaskAssistant.endpoint_path(), "/assistente-tarefas");
    }

    #[test]
    fn test_service_type_serializes_snake_case() {
        let json = serde_json::to_value(AiServiceType::MindmapIdeas).unwrap();
        assert_eq!(json, "mindmap_ideas");
        assert_eq!(AiServiceType::TextSummary.to_string(), "text_summary");
    }

    #[test]
    fn test_ai_error_field_ignores_empty_string() {
        let resp = SummarizeResponse {
            summary: String::new(),
            error: Some(String::new()),
        };
        assert!(resp.ai_error().is_none());

        let resp: CodeReviewResponse =
            serde_json::from_str(r#"{"error":"model overloaded"}"#).unwrap();
        assert_eq!(resp.ai_error(), Some("model overloaded"));
    }

    #[test]
    fn test_task_assistant_response_defaults() {
        let resp: TaskAssistantResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.suggestions.is_empty());
        assert!(resp.error.is_none());
    }
}
