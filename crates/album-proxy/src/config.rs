//! Configuration types and loading logic.

use album_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upper bound for draining in-flight requests and flushing spans on shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Largest inbound request body accepted; bigger bodies get 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// album-store upstream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL without trailing slash, e.g. "http://localhost:9080".
    #[serde(default = "default_upstream_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:9070".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    500
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_upstream_url() -> String {
    "http://localhost:9080".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl ProxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. `ALBUM_STORE_URL` for the upstream URL
    /// 2. Environment variables (PROXY_ prefix, __ for nesting)
    /// 3. TOML config file
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config: ProxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("PROXY_").split("__"))
            .extract()?;

        if let Ok(url) = std::env::var("ALBUM_STORE_URL") {
            if !url.is_empty() {
                config.upstream.url = url;
            }
        }

        Ok(config)
    }
}
