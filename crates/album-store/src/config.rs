//! Configuration types and loading logic.

use album_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Top-level store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_tracing")]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:9080".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    500
}

fn default_tracing() -> TracingConfig {
    TracingConfig {
        service_name: "album-store".to_string(),
        ..TracingConfig::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tracing: default_tracing(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. `ALBUM_SERVICE_URL` for the listen address
    /// 2. Environment variables (STORE_ prefix, __ for nesting)
    /// 3. TOML config file
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: StoreConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("STORE_").split("__"))
            .join(("tracing.service_name", "album-store"))
            .extract()?;

        if let Ok(addr) = std::env::var("ALBUM_SERVICE_URL") {
            if !addr.is_empty() {
                config.server.listen_address = addr;
            }
        }

        Ok(config)
    }
}
