//! AI proxy routes against a stub AI service on a local port.

mod support;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use colmeia_storage::{path, DocumentStore, ListQuery};
use serde_json::{json, Value};
use support::TestApp;

async fn code_review(Json(body): Json<Value>) -> Response {
    let language = body["language"].as_str().unwrap_or("?").to_string();
    Json(json!({ "review": format!("reviewed as {}", language) })).into_response()
}

async fn summarize(Json(body): Json<Value>) -> Response {
    match body["text"].as_str() {
        Some("too long") => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "text too long"})),
        )
            .into_response(),
        Some("explode") => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        _ => Json(json!({"summary": "short"})).into_response(),
    }
}

async fn mindmap() -> Response {
    Json(json!({"error": "model overloaded"})).into_response()
}

async fn assistant(Json(body): Json<Value>) -> Response {
    let ctx = &body["workspace_context"];
    Json(json!({
        "suggestions": [
            ctx["workspace_name"].as_str().unwrap_or_default(),
            ctx["user_message"].as_str().unwrap_or_default(),
        ]
    }))
    .into_response()
}

/// Start the stub AI service and return its base URL.
async fn spawn_ai_stub() -> String {
    let router = Router::new()
        .route("/code-review", post(code_review))
        .route("/summarize", post(summarize))
        .route("/mindmap-ideas", post(mindmap))
        .route("/assistente-tarefas", post(assistant));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn history(app: &TestApp, workspace_id: i64) -> Vec<Value> {
    app.documents
        .list(&path::history_collection(workspace_id), ListQuery::all())
        .await
        .unwrap()
        .into_iter()
        .map(|doc| Value::Object(doc.fields))
        .collect()
}

#[tokio::test]
async fn ai_routes_answer_503_without_configuration() {
    let app = TestApp::new();
    let ana = app.user("ana@colmeia.io", "Ana").await;
    let res = app.post("/ai/summarize", &ana.token, json!({"text": "hi"})).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn code_review_defaults_language_and_records_history() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;

    let res = app
        .post("/ai/code-review", &ana.token, json!({"code": "print(1)"}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["review"], "reviewed as Python");

    let entries = history(&app, 0).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["aiServiceType"], "code_review");
    assert_eq!(entries[0]["aiStatusCode"], 200);
    assert_eq!(entries[0]["userId"], ana.uid);
    assert_eq!(entries[0]["frontendRequestPayload"]["code"], "print(1)");
    assert_eq!(entries[0]["requestToAi"]["language"], "Python");
}

#[tokio::test]
async fn code_review_requires_code() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;

    let res = app.post("/ai/code-review", &ana.token, json!({"language": "Rust"})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(history(&app, 0).await.is_empty());
}

#[tokio::test]
async fn structured_ai_error_keeps_status() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;

    let res = app.post("/ai/summarize", &ana.token, json!({"text": "too long"})).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body, json!({"error_ia": "text too long"}));

    let entries = history(&app, 0).await;
    assert_eq!(entries[0]["aiStatusCode"], 422);
    assert_eq!(entries[0]["aiError"], "text too long");
}

#[tokio::test]
async fn unstructured_ai_error_carries_raw_details() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;

    let res = app.post("/ai/summarize", &ana.token, json!({"text": "explode"})).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body["error"], "Failed to process summary");
    assert_eq!(res.body["details"], "upstream exploded");
}

#[tokio::test]
async fn error_field_on_success_is_bad_gateway() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;

    let res = app.post("/ai/mindmap-ideas", &ana.token, json!({"text": "ideas"})).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(res.body["error_ia"], "model overloaded");
}

#[tokio::test]
async fn unreachable_ai_service_is_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let app = TestApp::with_ai(&format!("http://{}", addr));
    let ana = app.user("ana@colmeia.io", "Ana").await;

    let res = app.post("/ai/summarize", &ana.token, json!({"text": "hi"})).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(res.body["error"], "Failed to process summary");

    let entries = history(&app, 0).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["aiStatusCode"], 0);
}

#[tokio::test]
async fn task_assistant_sends_workspace_context() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;
    let ws = app.workspace(&ana, "Launch").await;

    let res = app
        .post(
            "/ai/task-assistant",
            &ana.token,
            json!({"user_message": "what next?", "workspace_id": ws.to_string()}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["suggestions"], json!(["Launch", "what next?"]));

    let entries = history(&app, ws).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["workspaceIdPg"], ws);
    assert_eq!(
        entries[0]["requestToAi"]["workspace_context"]["workspace_id"],
        ws.to_string()
    );
}

#[tokio::test]
async fn task_assistant_validation_and_membership() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;
    let bia = app.user("bia@colmeia.io", "Bia").await;
    let ws = app.workspace(&ana, "Launch").await;

    let res = app
        .post("/ai/task-assistant", &ana.token, json!({"user_message": "hi", "workspace_id": "abc"}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post("/ai/task-assistant", &ana.token, json!({"workspace_id": ws.to_string()}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .post(
            "/ai/task-assistant",
            &bia.token,
            json!({"user_message": "hi", "workspace_id": ws.to_string()}),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(history(&app, ws).await.is_empty());
}

#[tokio::test]
async fn ai_history_lists_newest_first_for_members() {
    let app = TestApp::with_ai(&spawn_ai_stub().await);
    let ana = app.user("ana@colmeia.io", "Ana").await;
    let bia = app.user("bia@colmeia.io", "Bia").await;
    let ws = app.workspace(&ana, "Launch").await;

    for message in ["one", "two", "three"] {
        let res = app
            .post(
                "/ai/task-assistant",
                &ana.token,
                json!({"user_message": message, "workspace_id": ws.to_string()}),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let uri = format!("/workspaces/{}/ai-history?limit=2", ws);
    let res = app.get(&uri, &ana.token).await;
    assert_eq!(res.status, StatusCode::OK);
    let entries = res.body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["frontendRequestPayload"]["user_message"], "three");
    assert!(entries[0]["id"].is_string());

    let res = app.get(&uri, &bia.token).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}
