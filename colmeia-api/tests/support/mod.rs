//! Shared harness for the route tests.
//!
//! Builds the full router over the in-memory stores and the mock identity
//! provider, with rate limiting off.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use colmeia_api::config::{AiConfig, ApiConfig};
use colmeia_api::{create_api_router, AiClient, AppState};
use colmeia_storage::RelationalStore;
use colmeia_test_utils::{InMemoryDocumentStore, InMemoryRelationalStore, MockIdentityProvider};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub relational: Arc<InMemoryRelationalStore>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub identity: Arc<MockIdentityProvider>,
}

/// A registered caller.
pub struct TestUser {
    pub uid: String,
    pub email: String,
    pub token: String,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Router whose AI client points at `base_url`.
    pub fn with_ai(base_url: &str) -> Self {
        Self::build(Some(base_url.to_string()))
    }

    fn build(ai_base_url: Option<String>) -> Self {
        let relational = Arc::new(InMemoryRelationalStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let identity = Arc::new(MockIdentityProvider::new());

        let ai = AiClient::from_config(&AiConfig {
            base_url: ai_base_url,
            ..AiConfig::default()
        })
        .expect("AI client");

        let state = AppState::new(
            relational.clone(),
            documents.clone(),
            identity.clone(),
            ai,
        );
        let api_config = ApiConfig {
            rate_limit_enabled: false,
            ..ApiConfig::default()
        };

        Self {
            router: create_api_router(state, &api_config),
            relational,
            documents,
            identity,
        }
    }

    /// Create an identity account and its users row, and issue a token.
    pub async fn user(&self, email: &str, display_name: &str) -> TestUser {
        let uid = self.identity.add_user(email, "secret-pw", display_name);
        self.relational
            .user_insert(&uid, email, display_name)
            .await
            .expect("user row");
        let token = self.identity.issue_token(&uid);
        TestUser {
            uid,
            email: email.to_string(),
            token,
        }
    }

    /// Create a public workspace owned by `owner` and return its id.
    pub async fn workspace(&self, owner: &TestUser, name: &str) -> i64 {
        self.relational
            .workspace_create_public(&owner.uid, name, "")
            .await
            .expect("workspace")
            .id
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str, body: Option<Value>) -> TestResponse {
        self.request(Method::DELETE, uri, Some(token), body).await
    }
}
