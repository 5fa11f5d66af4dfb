//! Prometheus Metrics Definitions
//!
//! Request metrics plus counters for the consistency machinery: dual-write
//! compensations, AI proxy calls and orphans removed by the sweep.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance, registered with the default registry on first use.
pub static METRICS: Lazy<ApiResult<ColmeiaMetrics>> = Lazy::new(ColmeiaMetrics::new);

/// Container for all Colmeia metrics.
#[derive(Clone)]
pub struct ColmeiaMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: operation, outcome (compensated / orphaned)
    pub dual_write_compensations_total: CounterVec,

    /// labels: service, outcome (success / ai_error / transport_error)
    pub ai_requests_total: CounterVec,

    /// labels: kind (stub / document)
    pub orphans_removed_total: CounterVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl ColmeiaMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "colmeia_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "colmeia_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            dual_write_compensations_total: register_counter_vec!(
                "colmeia_dual_write_compensations_total",
                "Compensating writes after a partial dual-write failure",
                &["operation", "outcome"]
            )
            .map_err(|e| registration_error("dual_write_compensations_total", e))?,

            ai_requests_total: register_counter_vec!(
                "colmeia_ai_requests_total",
                "Calls made to the AI microservice",
                &["service", "outcome"]
            )
            .map_err(|e| registration_error("ai_requests_total", e))?,

            orphans_removed_total: register_counter_vec!(
                "colmeia_orphans_removed_total",
                "Orphaned task stubs and documents removed by reconciliation",
                &["kind"]
            )
            .map_err(|e| registration_error("orphans_removed_total", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a compensation attempt. `succeeded == false` means data was orphaned.
    pub fn record_compensation(&self, operation: &str, succeeded: bool) {
        let outcome = if succeeded { "compensated" } else { "orphaned" };
        self.dual_write_compensations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_ai_request(&self, service: &str, outcome: &str) {
        self.ai_requests_total
            .with_label_values(&[service, outcome])
            .inc();
    }

    pub fn record_orphans_removed(&self, kind: &str, count: u64) {
        if count > 0 {
            self.orphans_removed_total
                .with_label_values(&[kind])
                .inc_by(count as f64);
        }
    }
}

/// Run `f` against the global metrics, if they registered.
pub fn with_metrics(f: impl FnOnce(&ColmeiaMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so the colmeia_* families exist before the first scrape
    let _ = METRICS.as_ref();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> &'static ColmeiaMetrics {
        match METRICS.as_ref() {
            Ok(m) => m,
            Err(e) => panic!("Metrics init failed: {}", e.message),
        }
    }

    #[test]
    fn test_record_http_request() {
        let m = metrics();
        m.record_http_request("GET", "/workspaces/:id", 200, 0.015);
        let count = m
            .http_requests_total
            .with_label_values(&["GET", "/workspaces/:id", "200"])
            .get();
        assert!(count >= 1.0);
    }

    #[test]
    fn test_record_compensation_outcomes() {
        let m = metrics();
        let before = m
            .dual_write_compensations_total
            .with_label_values(&["test_op", "orphaned"])
            .get();
        m.record_compensation("test_op", false);
        m.record_compensation("test_op", true);
        let after = m
            .dual_write_compensations_total
            .with_label_values(&["test_op", "orphaned"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_zero_orphans_not_recorded() {
        let m = metrics();
        m.record_orphans_removed("test_kind", 0);
        m.record_orphans_removed("test_kind", 3);
        let value = m.orphans_removed_total.with_label_values(&["test_kind"]).get();
        assert_eq!(value, 3.0);
    }

    #[tokio::test]
    async fn test_metrics_handler_exposes_families() {
        metrics().record_ai_request("code_review", "success");
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
