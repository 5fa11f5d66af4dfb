//! Interpreting AI service replies and the shared call path of the AI routes.
//!
//! Failures do not use the usual error envelope. A reply carrying a string
//! `error` field becomes `{"error_ia": msg}`; anything else becomes
//! `{"error": <service message>, "details": <raw body>}`. Both keep the AI
//! service's status code, except that transport failures and broken 2xx
//! replies answer 502.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use colmeia_core::{AiErrorField, AiHistoryEntry, AiServiceType};
use colmeia_storage::DocumentStore;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use super::client::{AiCallOutcome, AiClient};
use super::history;
use crate::telemetry::metrics::with_metrics;

// ============================================================================
// FAILURES
// ============================================================================

/// A failed AI call, as returned to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum AiFailure {
    /// The AI service reported an error message of its own.
    Reported { status: StatusCode, message: String },
    /// No usable reply.
    Failed {
        status: StatusCode,
        message: &'static str,
        details: Value,
    },
}

impl AiFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            AiFailure::Reported { status, .. } | AiFailure::Failed { status, .. } => *status,
        }
    }

    /// Text stored as `aiError` in the interaction history.
    fn history_error(&self) -> String {
        match self {
            AiFailure::Reported { message, .. } => message.clone(),
            AiFailure::Failed {
                message, details, ..
            } => match details {
                Value::String(detail) if !detail.is_empty() => {
                    format!("{}: {}", message, detail)
                }
                _ => message.to_string(),
            },
        }
    }
}

impl IntoResponse for AiFailure {
    fn into_response(self) -> Response {
        match self {
            AiFailure::Reported { status, message } => {
                (status, Json(json!({ "error_ia": message }))).into_response()
            }
            AiFailure::Failed {
                status,
                message,
                details,
            } => (status, Json(json!({ "error": message, "details": details }))).into_response(),
        }
    }
}

/// Map an AI status to the status returned to clients. 0 and invalid codes become 502.
fn client_status(status: u16) -> StatusCode {
    if status == 0 {
        return StatusCode::BAD_GATEWAY;
    }
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// The raw body as JSON when it parses, as a string otherwise.
fn raw_details(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn error_field(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("error")
        .and_then(Value::as_str)
        .filter(|msg| !msg.is_empty())
        .map(str::to_string)
}

/// Decide what an HTTP reply from the AI service means.
pub fn interpret<R>(service: AiServiceType, outcome: &AiCallOutcome) -> Result<R, AiFailure>
where
    R: DeserializeOwned + AiErrorField,
{
    if outcome.is_success() {
        let decoded: R = serde_json::from_slice(&outcome.body).map_err(|e| {
            tracing::warn!(service = %service, error = %e, "Undecodable AI response");
            AiFailure::Failed {
                status: StatusCode::BAD_GATEWAY,
                message: service.failure_message(),
                details: raw_details(&outcome.body),
            }
        })?;
        if let Some(message) = decoded.ai_error() {
            return Err(AiFailure::Reported {
                status: StatusCode::BAD_GATEWAY,
                message: message.to_string(),
            });
        }
        return Ok(decoded);
    }

    let status = client_status(outcome.status);
    match error_field(&outcome.body) {
        Some(message) => Err(AiFailure::Reported { status, message }),
        None => Err(AiFailure::Failed {
            status,
            message: service.failure_message(),
            details: raw_details(&outcome.body),
        }),
    }
}

/// What the history records as the AI's response.
fn history_response<R: Serialize>(body: &[u8], result: &Result<R, AiFailure>) -> Value {
    match result {
        Ok(decoded) => serde_json::to_value(decoded).unwrap_or_else(|_| raw_details(body)),
        Err(AiFailure::Reported { message, .. }) => json!({ "error": message }),
        Err(AiFailure::Failed { .. }) => raw_details(body),
    }
}

// ============================================================================
// CALL PATH
// ============================================================================

/// One proxied call, with what the history needs to know about it.
pub struct AiCall<'a, Req: ?Sized> {
    pub service: AiServiceType,
    pub user_id: &'a str,
    /// 0 for services not tied to a workspace.
    pub workspace_id: i64,
    /// Body received from the client.
    pub frontend_payload: Value,
    /// Body sent to the AI service.
    pub request: &'a Req,
}

/// Call the AI service, interpret the reply and record the exchange.
///
/// The history write is best-effort and never changes the result.
pub async fn run<Req, Resp>(
    client: &AiClient,
    documents: &dyn DocumentStore,
    call: AiCall<'_, Req>,
) -> Result<Resp, AiFailure>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned + Serialize + AiErrorField,
{
    let called = client.call(call.service, call.request).await;
    let (status, body, result, outcome_label) = match called {
        Ok(outcome) => {
            let result = interpret::<Resp>(call.service, &outcome);
            let label = if result.is_ok() { "success" } else { "ai_error" };
            (outcome.status, outcome.body, result, label)
        }
        Err(e) => {
            tracing::warn!(service = %call.service, error = %e, "AI call failed");
            let failure = AiFailure::Failed {
                status: StatusCode::BAD_GATEWAY,
                message: call.service.failure_message(),
                details: Value::String(e.message.clone()),
            };
            (0, Vec::new(), Err(failure), "transport_error")
        }
    };

    with_metrics(|m| m.record_ai_request(call.service.as_str(), outcome_label));

    let entry = AiHistoryEntry {
        user_id: call.user_id.to_string(),
        workspace_id_pg: call.workspace_id,
        ai_service_type: call.service,
        timestamp: colmeia_core::format_doc_timestamp(&chrono::Utc::now()),
        frontend_request_payload: call.frontend_payload,
        request_to_ai: serde_json::to_value(call.request).unwrap_or(Value::Null),
        response_from_ai: history_response(&body, &result),
        ai_status_code: status,
        ai_error: result.as_ref().err().map(AiFailure::history_error),
    };
    history::record(documents, entry).await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmeia_core::{CodeReviewResponse, SummarizeResponse};

    fn outcome(status: u16, body: &str) -> AiCallOutcome {
        AiCallOutcome {
            status,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_success_decodes() {
        let result: Result<CodeReviewResponse, _> =
            interpret(AiServiceType::CodeReview, &outcome(200, r#"{"review":"ok"}"#));
        assert_eq!(result.unwrap().review, "ok");
    }

    #[test]
    fn test_error_field_on_failure_status_is_reported() {
        let result: Result<SummarizeResponse, _> = interpret(
            AiServiceType::TextSummary,
            &outcome(422, r#"{"error":"text too long"}"#),
        );
        assert_eq!(
            result.unwrap_err(),
            AiFailure::Reported {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "text too long".to_string(),
            }
        );
    }

    #[test]
    fn test_error_field_on_success_status_is_bad_gateway() {
        let result: Result<SummarizeResponse, _> = interpret(
            AiServiceType::TextSummary,
            &outcome(200, r#"{"error":"model overloaded"}"#),
        );
        let failure = result.unwrap_err();
        assert_eq!(failure.status(), StatusCode::BAD_GATEWAY);
        assert!(matches!(failure, AiFailure::Reported { .. }));
    }

    #[test]
    fn test_unstructured_failure_keeps_raw_body() {
        let result: Result<SummarizeResponse, _> =
            interpret(AiServiceType::TextSummary, &outcome(500, "upstream exploded"));
        assert_eq!(
            result.unwrap_err(),
            AiFailure::Failed {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Failed to process summary",
                details: Value::String("upstream exploded".to_string()),
            }
        );
    }

    #[test]
    fn test_json_failure_body_kept_as_json() {
        let result: Result<SummarizeResponse, _> =
            interpret(AiServiceType::TextSummary, &outcome(503, r#"{"detail":"busy"}"#));
        match result.unwrap_err() {
            AiFailure::Failed { details, .. } => assert_eq!(details["detail"], "busy"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_success_is_failure() {
        let result: Result<CodeReviewResponse, _> =
            interpret(AiServiceType::CodeReview, &outcome(200, "not json"));
        assert_eq!(result.unwrap_err().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_status_zero_is_bad_gateway() {
        assert_eq!(client_status(0), StatusCode::BAD_GATEWAY);
        assert_eq!(client_status(1000), StatusCode::BAD_GATEWAY);
        assert_eq!(client_status(404), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_history_response_shapes() {
        let ok: Result<SummarizeResponse, AiFailure> = Ok(SummarizeResponse {
            summary: "short".to_string(),
            error: None,
        });
        assert_eq!(history_response(b"", &ok), json!({"summary": "short"}));

        let reported: Result<SummarizeResponse, AiFailure> = Err(AiFailure::Reported {
            status: StatusCode::BAD_REQUEST,
            message: "bad".to_string(),
        });
        assert_eq!(history_response(b"", &reported), json!({"error": "bad"}));

        let failed: Result<SummarizeResponse, AiFailure> = Err(AiFailure::Failed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "x",
            details: Value::Null,
        });
        assert_eq!(history_response(b"plain", &failed), json!("plain"));
    }
}
