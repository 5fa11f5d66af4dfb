//! OpenTelemetry Tracer Initialization
//!
//! Installs the JSON log subscriber and, when an OTLP endpoint is set, an
//! HTTP span exporter bridged through `tracing-opentelemetry`.

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{env_flag, env_parse};
use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "colmeia_api=debug,tower_http=debug,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP HTTP endpoint for traces. No exporter when unset.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Trace sampling ratio (0.0 to 1.0)
    pub trace_sample_rate: f64,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: "colmeia-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            trace_sample_rate: 1.0,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Read `COLMEIA_OTLP_ENDPOINT`, `COLMEIA_SERVICE_NAME`,
    /// `COLMEIA_ENVIRONMENT`, `COLMEIA_TRACE_SAMPLE_RATE` and
    /// `COLMEIA_METRICS_ENABLED`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            otlp_endpoint: std::env::var("COLMEIA_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            service_name: std::env::var("COLMEIA_SERVICE_NAME").unwrap_or(defaults.service_name),
            service_version: defaults.service_version,
            environment: std::env::var("COLMEIA_ENVIRONMENT").unwrap_or(defaults.environment),
            trace_sample_rate: env_parse("COLMEIA_TRACE_SAMPLE_RATE", defaults.trace_sample_rate),
            metrics_enabled: env_flag("COLMEIA_METRICS_ENABLED", defaults.metrics_enabled),
        }
    }

    fn sampler(&self) -> Sampler {
        if self.trace_sample_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.trace_sample_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.trace_sample_rate)
        }
    }
}

/// Keeps the tracer provider alive. Call [`TelemetryGuard::shutdown`] before
/// exit to flush pending spans.
pub struct TelemetryGuard {
    provider: SdkTracerProvider,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(error = %e, "Tracer shutdown failed");
            return;
        }
        tracing::info!("Tracer shutdown complete");
    }
}

/// Build the tracer provider: batch OTLP export when an endpoint is set,
/// spans kept local otherwise.
fn build_provider(config: &TelemetryConfig) -> ApiResult<SdkTracerProvider> {
    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", config.service_version.clone()),
            KeyValue::new("deployment.environment", config.environment.clone()),
        ])
        .build();

    let builder = SdkTracerProvider::builder()
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| {
                    ApiError::internal_error(format!("Failed to create OTLP exporter: {}", e))
                })?;
            builder.with_batch_exporter(exporter).build()
        }
        None => builder.build(),
    };
    Ok(provider)
}

/// Initialize the tracer and the tracing subscriber.
///
/// Call once at startup, before anything logs.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<TelemetryGuard> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let provider = build_provider(config)?;
    let tracer = provider.tracer("colmeia-api");
    global::set_tracer_provider(provider.clone());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { provider })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "colmeia-api");
        assert_eq!(config.trace_sample_rate, 1.0);
        assert!(config.metrics_enabled);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_telemetry_config_from_env() {
        let _endpoint = EnvVarGuard::set("COLMEIA_OTLP_ENDPOINT", Some("http://collector:4318"));
        let _rate = EnvVarGuard::set("COLMEIA_TRACE_SAMPLE_RATE", Some("0.25"));
        let _metrics = EnvVarGuard::set("COLMEIA_METRICS_ENABLED", Some("false"));

        let config = TelemetryConfig::from_env();
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://collector:4318"));
        assert_eq!(config.trace_sample_rate, 0.25);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_sampler_selection() {
        let on = TelemetryConfig::default();
        assert!(matches!(on.sampler(), Sampler::AlwaysOn));

        let off = TelemetryConfig {
            trace_sample_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(off.sampler(), Sampler::AlwaysOff));

        let ratio = TelemetryConfig {
            trace_sample_rate: 0.5,
            ..Default::default()
        };
        assert!(matches!(ratio.sampler(), Sampler::TraceIdRatioBased(r) if r == 0.5));
    }

    #[test]
    fn test_provider_without_endpoint_builds() {
        let provider = build_provider(&TelemetryConfig::default()).unwrap();
        let _tracer = provider.tracer("test");
        assert!(provider.shutdown().is_ok());
    }
}
