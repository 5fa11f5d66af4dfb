//! Colmeia Telemetry - Observability Infrastructure
//!
//! OpenTelemetry tracing, Prometheus metrics and the request middleware
//! that feeds both.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, ColmeiaMetrics, METRICS};
pub use middleware::{normalize_path, observability_middleware};
pub use tracer::{init_tracer, TelemetryConfig, TelemetryGuard};
