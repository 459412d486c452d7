//! Request/response logging.
//!
//! Tags every request with a UUID, logs one structured line per completed
//! request, and echoes the id back in `x-request-id` so client reports can
//! be correlated with server logs.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub async fn request_log_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    request.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis();
    tracing::info!(
        target: "http",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = elapsed_ms as u64,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Request id attached to extensions for downstream handlers.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);
