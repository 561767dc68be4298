//! OTLP exporter setup and TracingGuard.

use std::time::Duration;

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{OtlpProtocol, TracingConfig};

/// Guard that flushes and shuts down the tracer provider.
///
/// Call [`TracingGuard::shutdown`] during graceful shutdown to bound the
/// flush; dropping the guard without it falls back to an unbounded flush.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl TracingGuard {
    /// Whether spans are being exported to an OTLP collector.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Flush pending spans and shut the exporter down, waiting at most `timeout`.
    pub fn shutdown(mut self, timeout: Duration) {
        if let Some(provider) = self.provider.take() {
            tracing::info!(timeout_ms = timeout.as_millis() as u64, "Flushing tracer provider");
            if let Err(e) = provider.shutdown_with_timeout(timeout) {
                eprintln!("Failed to shutdown tracer provider: {e}");
            }
        }
    }
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

/// OpenTelemetry layer that exports spans only.
///
/// Log events are left to the fmt layer and never become span events, so a
/// span's events are exactly the ones added through `OpenTelemetrySpanExt`.
pub fn span_layer<S>(tracer: SdkTracer) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(filter_fn(|metadata| metadata.is_span()))
}

/// Initialize the tracing subsystem with OTLP export and fmt logging.
///
/// If the OTLP exporter fails to initialize (e.g. endpoint unreachable),
/// falls back to fmt-only tracing so the service can start without a collector.
///
/// Returns a [`TracingGuard`] that must be held for the lifetime of the application
/// to ensure traces are flushed on shutdown.
pub fn init_tracing(config: &TracingConfig) -> TracingGuard {
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Skip OTLP entirely if no endpoint is configured
    let endpoint = match &config.otlp_endpoint {
        Some(url) => url.clone(),
        None => {
            init_fmt_only(env_filter);
            return TracingGuard { provider: None };
        }
    };

    match try_init_with_otlp(config, &endpoint, env_filter) {
        Ok(guard) => guard,
        Err(e) => {
            // OTLP failed: fall back to fmt-only so the service still starts
            let env_filter =
                EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
            init_fmt_only(env_filter);

            tracing::warn!(
                error = %e,
                endpoint = %endpoint,
                "OTLP exporter failed to initialize, running with fmt-only tracing"
            );

            TracingGuard { provider: None }
        }
    }
}

fn init_fmt_only(env_filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}

/// Resource describing this process: name, version and, when configured,
/// namespace and instance id.
fn build_resource(config: &TracingConfig) -> Resource {
    let mut attributes = vec![KeyValue::new(
        "service.version",
        config.service_version.clone(),
    )];
    if let Some(namespace) = &config.namespace {
        attributes.push(KeyValue::new("service.namespace", namespace.clone()));
    }
    if let Some(instance) = &config.instance_name {
        attributes.push(KeyValue::new("service.instance.id", instance.clone()));
    }

    Resource::builder_empty()
        .with_service_name(config.service_name.clone())
        .with_attributes(attributes)
        .build()
}

/// Try to initialize tracing with OTLP export. Returns Err if the exporter
/// cannot be built.
fn try_init_with_otlp(
    config: &TracingConfig,
    endpoint: &str,
    env_filter: EnvFilter,
) -> Result<TracingGuard> {
    let otlp_exporter = match config.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?,
    };

    let provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_batch_exporter(otlp_exporter)
        .with_resource(build_resource(config))
        .build();

    // Inbound `traceparent` headers parent the request spans
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer = provider.tracer(config.service_name.clone());

    tracing_subscriber::registry()
        .with(span_layer(tracer))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();

    tracing::info!(
        endpoint = %endpoint,
        service = %config.service_name,
        version = %config.service_version,
        protocol = ?config.protocol,
        "OpenTelemetry OTLP tracing initialized"
    );

    Ok(TracingGuard {
        provider: Some(provider),
    })
}
