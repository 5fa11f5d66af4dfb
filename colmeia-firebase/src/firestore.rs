//! Firestore REST v1 document store.

use crate::token::TokenSource;
use crate::value::{decode_fields, encode_fields};
use async_trait::async_trait;
use colmeia_core::{StorageError, StoreKind, StoreResult};
use colmeia_storage::{
    CollectionPath, Direction, DocPath, Document, DocumentStore, Fields, ListQuery,
    MAX_BATCH_WRITES,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Quote a field path segment unless it is a plain identifier.
fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// [`DocumentStore`] backed by the Firestore REST API.
pub struct FirestoreStore {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    /// `projects/{project}/databases/(default)/documents`
    documents_root: String,
    /// Scheme and host, without a trailing slash.
    host: String,
}

impl FirestoreStore {
    pub fn new(http: Client, project_id: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_host(http, FIRESTORE_HOST, project_id, tokens)
    }

    /// Point the store at the emulator listening on `host` (e.g. `localhost:8080`).
    pub fn emulator(http: Client, host: &str, project_id: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_host(http, &format!("http://{}", host), project_id, tokens)
    }

    pub fn with_host(
        http: Client,
        host: &str,
        project_id: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            tokens,
            documents_root: format!("projects/{}/databases/(default)/documents", project_id),
            host: host.trim_end_matches('/').to_string(),
        }
    }

    fn base_url(&self) -> String {
        format!("{}/v1/{}", self.host, self.documents_root)
    }

    fn doc_url(&self, path: &DocPath) -> String {
        format!("{}/{}", self.base_url(), path)
    }

    fn full_name(&self, path: &DocPath) -> String {
        format!("{}/{}", self.documents_root, path)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| StorageError::Unavailable {
                store: StoreKind::Document,
                reason: format!("no access token: {}", e),
            })?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable {
                store: StoreKind::Document,
                reason: e.to_string(),
            })
    }

    /// Turn a non-success response into a storage error.
    async fn failure(response: Response, path: &str) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| format!("{} {}", e.error.status, e.error.message))
            .unwrap_or(body);
        map_status(status, path, detail)
    }

    fn to_document(raw: RawDocument) -> StoreResult<Document> {
        let id = raw.name.rsplit('/').next().unwrap_or_default().to_string();
        let fields = match raw.fields {
            Some(fields) => decode_fields(&fields)?,
            None => Fields::new(),
        };
        Ok(Document::new(id, fields))
    }
}

fn map_status(status: StatusCode, path: &str, detail: String) -> StorageError {
    if status == StatusCode::NOT_FOUND {
        return StorageError::not_found("Document", path);
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return StorageError::Unavailable {
            store: StoreKind::Document,
            reason: format!("{}: {}", status.as_u16(), detail.trim()),
        };
    }
    StorageError::document(format!("{}: {}", status.as_u16(), detail.trim()))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let response = self.send(self.http.get(self.doc_url(path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::failure(response, &path.to_string()).await);
        }
        let raw: RawDocument = response
            .json()
            .await
            .map_err(|e| StorageError::Decode {
                reason: e.to_string(),
            })?;
        Self::to_document(raw).map(Some)
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self
            .send(self.http.patch(self.doc_url(path)).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &path.to_string()).await);
        }
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        let url = format!("{}/{}", self.base_url(), collection);
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self.send(self.http.post(url).json(&body)).await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &collection.to_string()).await);
        }
        let raw: RawDocument = response
            .json()
            .await
            .map_err(|e| StorageError::Decode {
                reason: e.to_string(),
            })?;
        Ok(Self::to_document(raw)?.id)
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        let mut query: Vec<(&str, String)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", quote_field_path(k)))
            .collect();
        query.push(("currentDocument.exists", "true".to_string()));
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self
            .send(self.http.patch(self.doc_url(path)).query(&query).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &path.to_string()).await);
        }
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        let response = self.send(self.http.delete(self.doc_url(path))).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::failure(response, &path.to_string()).await)
    }

    async fn list(
        &self,
        collection: &CollectionPath,
        query: ListQuery,
    ) -> StoreResult<Vec<Document>> {
        let url = match collection.parent() {
            Some(parent) => format!("{}:runQuery", self.doc_url(&parent)),
            None => format!("{}:runQuery", self.base_url()),
        };

        let mut structured = json!({ "from": [{ "collectionId": collection.id() }] });
        if let Some((field, direction)) = &query.order_by {
            let direction = match direction {
                Direction::Ascending => "ASCENDING",
                Direction::Descending => "DESCENDING",
            };
            structured["orderBy"] = json!([{
                "field": { "fieldPath": quote_field_path(field) },
                "direction": direction,
            }]);
        }
        if let Some(limit) = query.limit {
            structured["limit"] = json!(limit);
        }

        let response = self
            .send(
                self.http
                    .post(url)
                    .json(&json!({ "structuredQuery": structured })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &collection.to_string()).await);
        }
        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| StorageError::Decode {
                reason: e.to_string(),
            })?;
        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(Self::to_document)
            .collect()
    }

    async fn delete_many(&self, paths: &[DocPath]) -> StoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        if paths.len() > MAX_BATCH_WRITES {
            return Err(StorageError::BatchTooLarge {
                size: paths.len(),
                limit: MAX_BATCH_WRITES,
            });
        }
        let writes: Vec<Value> = paths
            .iter()
            .map(|p| json!({ "delete": self.full_name(p) }))
            .collect();
        let url = format!("{}:commit", self.base_url());
        let response = self
            .send(self.http.post(url).json(&json!({ "writes": writes })))
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, "documents:commit").await);
        }
        tracing::debug!(count = paths.len(), "Committed batch delete");
        Ok(())
    }
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("host", &self.host)
            .field("documents_root", &self.documents_root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenSource;
    use axum::{
        body::Bytes,
        extract::{Path, RawQuery, State},
        http::{HeaderMap, Method, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::any,
        Json, Router,
    };
    use colmeia_storage::path::{task_doc, tasks_collection};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Captured {
        method: Method,
        path: String,
        query: Option<String>,
        auth: Option<String>,
        body: Value,
    }

    #[derive(Clone, Default)]
    struct StubState {
        requests: Arc<Mutex<Vec<Captured>>>,
        reply: Arc<Mutex<Option<(u16, Value)>>>,
    }

    async fn record(
        State(state): State<StubState>,
        method: Method,
        Path(rest): Path<String>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        state.requests.lock().unwrap().push(Captured {
            method,
            path: rest,
            query,
            auth: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });
        let (status, reply) = state
            .reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or((200, json!({})));
        (AxumStatus::from_u16(status).unwrap(), Json(reply))
    }

    async fn spawn_stub(state: StubState) -> String {
        let app = Router::new()
            .route("/*rest", any(record))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn store_with(state: &StubState) -> FirestoreStore {
        let host = spawn_stub(state.clone()).await;
        FirestoreStore::with_host(
            Client::new(),
            &host,
            "demo",
            Arc::new(StaticTokenSource::emulator()),
        )
    }

    fn reply(state: &StubState, status: u16, body: Value) {
        *state.reply.lock().unwrap() = Some((status, body));
    }

    fn last(state: &StubState) -> Captured {
        state.requests.lock().unwrap().last().cloned().unwrap()
    }

    const ROOT: &str = "v1/projects/demo/databases/(default)/documents";

    #[tokio::test]
    async fn test_get_decodes_document() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(
            &state,
            200,
            json!({
                "name": "projects/demo/databases/(default)/documents/workspaces/1/tasks/abc",
                "fields": {"title": {"stringValue": "T"}, "workspaceIdPg": {"integerValue": "1"}}
            }),
        );
        let doc = store.get(&task_doc(1, "abc").unwrap()).await.unwrap().unwrap();
        assert_eq!(doc.id, "abc");
        assert_eq!(doc.fields["workspaceIdPg"], json!(1));

        let captured = last(&state);
        assert_eq!(captured.method, Method::GET);
        assert_eq!(captured.path, format!("{}/workspaces/1/tasks/abc", ROOT));
        assert_eq!(captured.auth.as_deref(), Some("Bearer owner"));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(&state, 404, json!({"error": {"code": 404, "message": "nope", "status": "NOT_FOUND"}}));
        assert!(store.get(&task_doc(1, "x").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_sends_mask_and_precondition() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(&state, 200, json!({"name": "x"}));
        let mut fields = Fields::new();
        fields.insert("status".into(), json!("done"));
        store
            .update(&task_doc(1, "abc").unwrap(), fields)
            .await
            .unwrap();
        let captured = last(&state);
        assert_eq!(captured.method, Method::PATCH);
        let query = captured.query.unwrap();
        assert!(query.contains("updateMask.fieldPaths=status"));
        assert!(query.contains("currentDocument.exists=true"));
        assert_eq!(captured.body["fields"]["status"], json!({"stringValue": "done"}));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(&state, 404, json!({"error": {"message": "No document to update", "status": "NOT_FOUND"}}));
        let err = store
            .update(&task_doc(1, "abc").unwrap(), Fields::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_treats_missing_as_success() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(&state, 404, json!({}));
        assert!(store.delete(&task_doc(1, "abc").unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_builds_structured_query() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(
            &state,
            200,
            json!([
                {"document": {"name": "a/b/workspaces/1/tasks/t1", "fields": {}}, "readTime": "x"},
                {"readTime": "x"}
            ]),
        );
        let docs = store
            .list(
                &tasks_collection(1),
                ListQuery::all()
                    .order_by("createdAt", Direction::Ascending)
                    .limit(10),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "t1");

        let captured = last(&state);
        assert_eq!(captured.path, format!("{}/workspaces/1:runQuery", ROOT));
        let query = &captured.body["structuredQuery"];
        assert_eq!(query["from"][0]["collectionId"], "tasks");
        assert_eq!(query["orderBy"][0]["direction"], "ASCENDING");
        assert_eq!(query["limit"], 10);
    }

    #[tokio::test]
    async fn test_delete_many_commits_batch() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(&state, 200, json!({"writeResults": []}));
        let paths = vec![task_doc(1, "a").unwrap(), task_doc(1, "b").unwrap()];
        store.delete_many(&paths).await.unwrap();
        let captured = last(&state);
        assert_eq!(captured.path, format!("{}:commit", ROOT));
        assert_eq!(
            captured.body["writes"][1]["delete"],
            "projects/demo/databases/(default)/documents/workspaces/1/tasks/b"
        );
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let state = StubState::default();
        let store = store_with(&state).await;
        reply(&state, 503, json!({"error": {"message": "backend", "status": "UNAVAILABLE"}}));
        let err = store
            .set(&task_doc(1, "a").unwrap(), Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(quote_field_path("createdAt"), "createdAt");
        assert_eq!(quote_field_path("with-dash"), "`with-dash`");
    }
}
