//! Log subscriber setup with optional OTLP span export.

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use serde::Deserialize;
use trace_header::TraceHeaderConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Target of the injector's diagnostic events.
const INJECTOR_TARGET: &str = "trace_header";

/// `[tracing]` section of the proxy config.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP collector endpoint (e.g. "http://localhost:4317").
    /// Unset means no span export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub protocol: OtlpProtocol,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

fn default_service_name() -> String {
    "trace-header-proxy".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            otlp_endpoint: None,
            protocol: OtlpProtocol::default(),
            log_level: default_log_level(),
        }
    }
}

/// Flushes exported spans when dropped. Hold it for the life of the process.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(ref mut provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {e}");
            }
        }
    }
}

/// Filter from `log_level`, falling back to `info` when it does not parse.
///
/// With `verbose` trace headers the injector's target is forced to `info`, so
/// a quieter global level can not swallow the per-request trace id lines.
fn build_filter(log_level: &str, verbose: bool) -> EnvFilter {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if !verbose {
        return filter;
    }
    match format!("{INJECTOR_TARGET}=info").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

fn otlp_provider(config: &TracingConfig, endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?,
    };

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build())
}

/// Install the global subscriber: fmt logging on stderr, plus OTLP span
/// export when an endpoint is configured and the exporter builds.
pub fn init_tracing(config: &TracingConfig, trace_header: &TraceHeaderConfig) -> TracingGuard {
    let export = config
        .otlp_endpoint
        .as_deref()
        .map(|endpoint| (endpoint, otlp_provider(config, endpoint)));

    let (provider, export_error) = match export {
        Some((_, Ok(provider))) => (Some(provider), None),
        Some((endpoint, Err(e))) => (None, Some((endpoint, e))),
        None => (None, None),
    };

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(build_filter(&config.log_level, trace_header.verbose))
        .init();

    match (&provider, export_error) {
        (Some(_), _) => tracing::info!(
            endpoint = ?config.otlp_endpoint,
            service = %config.service_name,
            protocol = ?config.protocol,
            "OpenTelemetry OTLP tracing initialized"
        ),
        (None, Some((endpoint, e))) => tracing::warn!(
            error = %e,
            endpoint = %endpoint,
            "OTLP exporter failed to initialize, running with fmt-only tracing"
        ),
        (None, None) => {}
    }

    TracingGuard { provider }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_log_level_falls_back_to_info() {
        let filter = build_filter("proxy=notalevel", false).to_string();
        assert!(filter.contains("info"), "filter was {filter}");
        assert!(!filter.contains("proxy"), "filter was {filter}");
    }

    #[test]
    fn test_valid_log_level_kept() {
        let filter = build_filter("warn", false).to_string();
        assert!(filter.contains("warn"), "filter was {filter}");
        assert!(!filter.contains("trace_header"), "filter was {filter}");
    }

    #[test]
    fn test_verbose_forces_injector_target() {
        let filter = build_filter("warn", true).to_string();
        assert!(filter.contains("trace_header=info"), "filter was {filter}");
        assert!(filter.contains("warn"), "filter was {filter}");
    }
}
