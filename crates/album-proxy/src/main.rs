//! album-proxy: forwards the album API to album-store, annotating one
//! OpenTelemetry span per request and normalizing every failure into a
//! `{"message": ...}` envelope.

mod config;
mod metrics;
mod model;
mod proxy;
mod server;

use std::sync::Arc;
use std::time::Duration;

use config::ProxyConfig;
use proxy::client::HttpUpstream;
use server::AppState;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("PROXY_CONFIG").ok())
        .unwrap_or_else(|| "album-proxy.toml".to_string());

    let config = ProxyConfig::load(&config_path)?;

    // The tonic gRPC exporter needs a reactor, so the runtime comes first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Falls back to fmt-only logging when no collector is configured
        let tracing_guard = album_tracing::init_tracing(&config.tracing);
        let shutdown_timeout = Duration::from_millis(config.server.shutdown_timeout_ms);

        tracing::info!(
            config_path = %config_path,
            version = %config.tracing.service_version,
            listen_address = %config.server.listen_address,
            upstream_url = %config.upstream.url,
            exporting = tracing_guard.is_exporting(),
            "Starting album-proxy"
        );

        let result = run(config).await;

        tracing_guard.shutdown(shutdown_timeout);
        tracing::info!("album-proxy exiting");
        result
    })
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let upstream = HttpUpstream::new(Duration::from_secs(config.upstream.timeout_secs))?;
    let metrics = metrics::install_recorder()?;

    let state = AppState {
        config,
        upstream: Arc::new(upstream),
        metrics,
    };

    server::run(state).await
}
