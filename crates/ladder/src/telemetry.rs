//! Tracing setup.
//!
//! Every service operation runs inside a `tracing` span keyed by the ids it
//! acts on. [`init`] prints spans and events to stdout and, when built with
//! the `otel` feature and given an endpoint, exports spans to an
//! OpenTelemetry collector over OTLP/gRPC:
//!
//! ```text
//! use ladder::telemetry::{self, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let _telemetry = telemetry::init(TelemetryConfig::from_env())?;
//!     // spans are flushed when the guard is dropped
//!     Ok(())
//! }
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,ladder=debug";

/// Configuration for [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name reported to the collector. Default: `"ladder"`.
    pub service_name: String,
    /// OTLP endpoint URL. Spans are only exported when this is set.
    pub otlp_endpoint: Option<String>,
    /// Log filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ladder".to_string(),
            otlp_endpoint: None,
            log_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Defaults overridden by `LADDER_SERVICE_NAME` and `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(name) = lookup("LADDER_SERVICE_NAME").filter(|v| !v.trim().is_empty()) {
            config.service_name = name;
        }
        config.otlp_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty());
        config
    }
}

/// Keeps exporters alive. With OTLP export enabled, dropping it flushes
/// pending spans and shuts the tracer provider down.
#[must_use = "dropping the guard stops span export"]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

#[cfg(feature = "otel")]
impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("OpenTelemetry shutdown error: {e}");
            }
        }
    }
}

/// Install the global subscriber. Hold the returned guard for the lifetime
/// of the process.
pub fn init(config: TelemetryConfig) -> Result<TelemetryGuard, Box<dyn std::error::Error>> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(&config.log_filter))
        .with(tracing_subscriber::fmt::layer().with_target(true));

    #[cfg(feature = "otel")]
    if let Some(endpoint) = &config.otlp_endpoint {
        use opentelemetry::trace::TracerProvider as _;

        let provider = otlp_provider(endpoint, &config.service_name)?;
        let tracer = provider.tracer(config.service_name.clone());
        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
        tracing::info!(endpoint = %endpoint, "exporting spans over OTLP");
        return Ok(TelemetryGuard {
            provider: Some(provider),
        });
    }

    registry.try_init()?;
    #[cfg(not(feature = "otel"))]
    if let Some(endpoint) = &config.otlp_endpoint {
        tracing::warn!(endpoint = %endpoint, "OTLP endpoint ignored: built without the otel feature");
    }
    Ok(TelemetryGuard {
        #[cfg(feature = "otel")]
        provider: None,
    })
}

#[cfg(feature = "otel")]
fn otlp_provider(
    endpoint: &str,
    service_name: &str,
) -> Result<opentelemetry_sdk::trace::TracerProvider, Box<dyn std::error::Error>> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::resource::Resource;
    use opentelemetry_sdk::trace::TracerProvider;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let resource =
        Resource::new_with_defaults([KeyValue::new("service.name", service_name.to_string())]);
    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(resource)
        .build())
}

fn env_filter(fallback: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
}
