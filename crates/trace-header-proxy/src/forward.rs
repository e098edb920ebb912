//! Raw forwarding to the upstream.
//!
//! Request bodies are buffered, response bodies are streamed back verbatim.
//! Only hop-by-hop headers are dropped.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// Request bodies are buffered up to this size before forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Forward any request to `upstream_base` + original path and query.
///
/// The request's `trace_header` values are copied onto the response so callers
/// can correlate without reading upstream logs, unless the upstream already
/// answered with that header.
pub async fn forward(
    client: &reqwest::Client,
    upstream_base: &str,
    trace_header: &HeaderName,
    request: Request,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{path_and_query}", upstream_base.trim_end_matches('/'));

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let mut req_builder = client
        .request(parts.method.clone(), url.as_str())
        .body(body);

    for (name, value) in parts.headers.iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        req_builder = req_builder.header(name, value);
    }

    let upstream_result = req_builder.send().await;

    let mut response = build_response(upstream_result, start);
    if !response.headers().contains_key(trace_header) {
        for value in parts.headers.get_all(trace_header) {
            response
                .headers_mut()
                .append(trace_header.clone(), value.clone());
        }
    }
    response
}

/// Build an axum Response from the upstream reqwest result, streaming the body back.
fn build_response(
    upstream_result: Result<reqwest::Response, reqwest::Error>,
    start: Instant,
) -> Response {
    let upstream_resp = match upstream_result {
        Ok(resp) => resp,
        Err(e) => {
            let latency = start.elapsed().as_millis() as u64;
            if e.is_timeout() {
                tracing::error!(error = %e, latency_ms = latency, "Upstream timeout");
                return (StatusCode::GATEWAY_TIMEOUT, "upstream timeout").into_response();
            }
            tracing::error!(error = %e, latency_ms = latency, "Upstream connection error");
            return (StatusCode::BAD_GATEWAY, "upstream connection error").into_response();
        }
    };

    let status = upstream_resp.status();
    tracing::info!(
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Forward complete"
    );

    let mut response_builder = Response::builder().status(status);
    for (name, value) in upstream_resp.headers().iter() {
        if is_hop_by_hop(name) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    let body = Body::from_stream(upstream_resp.bytes_stream());

    response_builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}
