//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use trace_header::{TraceHeaderInjector, TraceHeaderLayer};

use crate::config::ProxyConfig;
use crate::forward;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub trace_header: HeaderName,
}

/// Build and run the HTTP server.
pub async fn run(config: ProxyConfig, client: reqwest::Client) -> anyhow::Result<()> {
    let injector = TraceHeaderInjector::new(Some(&config.trace_header.header))?
        .with_name(&config.trace_header.name);
    let layer = TraceHeaderLayer::from_injector(injector);
    tracing::info!(
        middleware = %layer.injector().name(),
        header = %layer.injector().header_name(),
        "Trace header middleware installed"
    );
    let state = AppState {
        client,
        upstream_url: config.upstream.url.clone(),
        trace_header: layer.injector().header_name().clone(),
    };
    let app = router(state, layer);

    let listen_addr = config.server.listen_address;
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "trace-header-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("trace-header-proxy shut down gracefully");
    Ok(())
}

/// Routes wrapped so the trace header is set before the request span opens.
pub fn router(state: AppState, layer: TraceHeaderLayer) -> Router {
    let header = state.trace_header.clone();
    let make_span = move |req: &Request<Body>| {
        let trace_id = req
            .headers()
            .get(&header)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::info_span!(
            "proxy_request",
            method = %req.method(),
            path = %req.uri().path(),
            trace_id = %trace_id,
        )
    };

    Router::new()
        .route("/health", get(handle_health))
        .fallback(handle_forward)
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(layer)
}

/// Catch-all handler: every method and path goes to the upstream.
async fn handle_forward(State(state): State<Arc<AppState>>, request: Request) -> Response {
    forward::forward(
        &state.client,
        &state.upstream_url,
        &state.trace_header,
        request,
    )
    .await
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use tower::ServiceExt;
    use trace_header::TraceHeaderConfig;

    use super::*;

    /// Upstream that answers with the trace id values it received, one per line.
    async fn spawn_upstream() -> String {
        async fn echo(headers: HeaderMap) -> String {
            headers
                .get_all("x-trace-id")
                .iter()
                .map(|v| v.to_str().unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n")
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(echo);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Upstream that sends the received trace id values back as response headers.
    async fn spawn_header_echo_upstream() -> String {
        async fn echo(headers: HeaderMap) -> (HeaderMap, &'static str) {
            let mut echoed = HeaderMap::new();
            for value in headers.get_all("x-trace-id") {
                echoed.append("x-trace-id", value.clone());
            }
            (echoed, "ok")
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(echo);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn proxy(upstream_url: String, prefix: &str) -> Router {
        let layer = TraceHeaderLayer::new(Some(TraceHeaderConfig {
            header_prefix: prefix.to_string(),
            header_name: String::new(),
            verbose: true,
        }))
        .unwrap();
        let state = AppState {
            client: reqwest::Client::new(),
            upstream_url,
            trace_header: layer.injector().header_name().clone(),
        };
        router(state, layer)
    }

    fn get_request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_generated_id_reaches_upstream() {
        let upstream = spawn_upstream().await;
        let app = proxy(upstream, "svc1-");

        let response = app
            .oneshot(get_request("/v1/items?page=2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let echoed = response.headers().get("x-trace-id").unwrap().clone();
        let seen = body_text(response).await;

        let token = seen.strip_prefix("svc1-").unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(echoed, seen.as_str());
    }

    #[tokio::test]
    async fn test_existing_id_forwarded_unchanged() {
        let upstream = spawn_upstream().await;
        let app = proxy(upstream, "svc1-");

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/submit")
            .header("X-Trace-Id", "abc-123")
            .body(Body::from("payload"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(body_text(response).await, "abc-123");
    }

    #[tokio::test]
    async fn test_health_answers_locally() {
        let app = proxy("http://127.0.0.1:1".to_string(), "");

        let response = app
            .oneshot(get_request("/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let app = proxy(format!("http://{addr}"), "");

        let response = app
            .oneshot(get_request("/anything"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().contains_key("x-trace-id"));
    }

    #[tokio::test]
    async fn test_upstream_trace_header_not_duplicated() {
        let upstream = spawn_header_echo_upstream().await;
        let app = proxy(upstream, "");

        let request = axum::http::Request::builder()
            .uri("/echo")
            .header("X-Trace-Id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let values: Vec<_> = response.headers().get_all("x-trace-id").iter().collect();
        assert_eq!(values, vec!["abc-123"]);
    }
}
