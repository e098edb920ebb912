//! Configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use trace_header::TraceHeaderConfig;

use crate::telemetry::TracingConfig;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub trace_header: TraceHeaderSection,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// `[trace_header]` section: the injector settings plus its instance name.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TraceHeaderSection {
    /// Name reported in the injector's log fields.
    #[serde(default = "default_middleware_name")]
    pub name: String,

    #[serde(flatten)]
    pub header: TraceHeaderConfig,
}

impl Default for TraceHeaderSection {
    fn default() -> Self {
        Self {
            name: default_middleware_name(),
            header: TraceHeaderConfig::default(),
        }
    }
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// Upstream every request is forwarded to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_middleware_name() -> String {
    "trace-header".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:3080".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (TRACE_HEADER_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: ProxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("TRACE_HEADER_").split("__"))
            .extract()?;

        Ok(config)
    }
}
