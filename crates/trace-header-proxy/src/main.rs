//! trace-header-proxy: reverse proxy that stamps a trace id header on every request.

mod config;
mod forward;
mod server;
mod telemetry;

use std::time::Duration;

use config::ProxyConfig;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("TRACE_HEADER_PROXY_CONFIG").ok())
        .unwrap_or_else(|| "trace-header-proxy.toml".to_string());

    let upstream_override = args
        .iter()
        .position(|a| a == "--upstream-url")
        .and_then(|i| args.get(i + 1).cloned());

    let mut config = ProxyConfig::load(&config_path)?;
    if let Some(url) = upstream_override {
        config.upstream.url = url;
    }

    // The tonic OTLP exporter needs a reactor, so build the runtime first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let _tracing_guard = telemetry::init_tracing(&config.tracing, &config.trace_header.header);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            upstream_url = %config.upstream.url,
            header_name = %config.trace_header.header.header_name,
            "Starting trace-header-proxy"
        );

        run(config).await
    })
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_secs))
        .build()?;

    server::run(config, client).await
}
