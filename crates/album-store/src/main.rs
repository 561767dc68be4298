//! album-store: in-memory album collection served over HTTP.

mod config;
mod error;
mod model;
mod server;
mod store;

use std::time::Duration;

use config::StoreConfig;
use server::AppState;
use store::AlbumStore;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("STORE_CONFIG").ok())
        .unwrap_or_else(|| "album-store.toml".to_string());

    let config = StoreConfig::load(&config_path)?;

    // The tonic gRPC exporter needs a reactor, so the runtime comes first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = album_tracing::init_tracing(&config.tracing);
        let shutdown_timeout = Duration::from_millis(config.server.shutdown_timeout_ms);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            "Starting album-store"
        );

        let state = AppState {
            config,
            store: AlbumStore::default(),
        };
        let result = server::run(state).await;

        tracing_guard.shutdown(shutdown_timeout);
        tracing::info!("album-store exiting");
        result
    })
}
