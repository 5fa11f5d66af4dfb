//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Every request gets an OpenTelemetry server span (continuing a W3C
//! `traceparent` when present), a Prometheus sample and one log line.

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use opentelemetry::{
    context::FutureExt as _,
    global,
    trace::{SpanKind, Status, TraceContextExt, Tracer},
    Context, KeyValue,
};
use opentelemetry_http::HeaderExtractor;
use regex::Regex;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::with_metrics;

static UUID_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .ok()
});

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^-?\d+$").ok());

fn segment_matches(pattern: &Lazy<Option<Regex>>, segment: &str) -> bool {
    pattern
        .as_ref()
        .map(|re| re.is_match(segment))
        .unwrap_or(false)
}

/// Replace numeric path segments with `:id` and UUID segments with `:uuid`.
///
/// Keeps metric label cardinality bounded.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment_matches(&UUID_SEGMENT, segment) {
                ":uuid"
            } else if segment_matches(&NUMERIC_SEGMENT, segment) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let parent_context = extract_trace_context(request.headers());

    let tracer = global::tracer("colmeia-api");
    let span = tracer
        .span_builder(format!("{} {}", method, normalized_path))
        .with_kind(SpanKind::Server)
        .with_attributes(vec![
            KeyValue::new("http.method", method.to_string()),
            KeyValue::new("http.target", path.clone()),
            KeyValue::new("http.route", normalized_path.clone()),
        ])
        .start_with_context(&tracer, &parent_context);
    let cx = parent_context.with_span(span);

    let tracing_span = info_span!(
        "http_request",
        http.method = %method,
        http.route = %normalized_path,
        otel.kind = "server",
    );

    let response = next
        .run(request)
        .instrument(tracing_span)
        .with_context(cx.clone())
        .await;

    let duration = start.elapsed();
    let status = response.status();

    with_metrics(|m| {
        m.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        )
    });

    let span = cx.span();
    span.set_attribute(KeyValue::new("http.status_code", status.as_u16() as i64));
    if status.is_server_error() {
        span.set_status(Status::error("Server error"));
    } else {
        span.set_status(Status::Ok);
    }
    span.end();

    tracing::info!(
        method = %method,
        path = %normalized_path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        remote_addr = %remote_addr,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/workspaces/4/tasks/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/workspaces/:id/tasks/:uuid");
    }

    #[test]
    fn test_normalize_path_consecutive_ids() {
        assert_eq!(normalize_path("/a/1/2/3"), "/a/:id/:id/:id");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
        assert_eq!(normalize_path("/workspaces/private"), "/workspaces/private");
    }

    #[test]
    fn test_normalize_path_keeps_mixed_segments() {
        assert_eq!(normalize_path("/users/uid-12"), "/users/uid-12");
        assert_eq!(normalize_path("/v2/items"), "/v2/items");
    }

    proptest! {
        #[test]
        fn prop_numeric_ids_never_leak(ids in proptest::collection::vec(0u64..u64::MAX, 1..5)) {
            let path: String = ids.iter().map(|id| format!("/workspaces/{}", id)).collect();
            let normalized = normalize_path(&path);
            prop_assert!(!normalized.chars().any(|c| c.is_ascii_digit()));
        }

        #[test]
        fn prop_normalize_is_idempotent(path in "(/[a-z0-9-]{0,12}){0,6}") {
            let once = normalize_path(&path);
            prop_assert_eq!(normalize_path(&once), once.clone());
        }

        #[test]
        fn prop_segment_count_preserved(path in "(/[a-z0-9]{1,8}){0,6}") {
            let normalized = normalize_path(&path);
            prop_assert_eq!(normalized.split('/').count(), path.split('/').count());
        }
    }
}
