//! Database proxy handlers, one per calling convention.
//!
//! `POST /api/proxy` is RPC mode, a JSON envelope describing the upstream
//! call; the response is wrapped.
//! `ANY /api/proxy/*path` is gateway mode, a verbatim passthrough; the
//! upstream status, body, and relayed headers come back unwrapped so an
//! unmodified Supabase SDK client only needs the base URL swapped.

use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::client_ip;
use crate::proxy::normalizer;
use crate::proxy::types::{RpcPayload, UpstreamResult};
use crate::state::AppState;

/// RPC-mode entry point.
pub async fn rpc_proxy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload: RpcPayload = if body.is_empty() {
        RpcPayload::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            ApiError::Validation(format!("Envelope JSON non valido: {err}"))
        })?
    };

    let ip = client_ip(&headers, Some(addr));
    let canonical = normalizer::canonicalize_rpc(payload, raw_query.as_deref())?;
    let result = state.pipeline.run(&ip, &canonical).await?;

    let status = StatusCode::from_u16(result.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(rpc_envelope(&result))).into_response())
}

/// Gateway-mode entry point.
pub async fn gateway_proxy(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    Path(tail): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, Some(addr));
    let canonical =
        normalizer::canonicalize_gateway(&method, &tail, raw_query.as_deref(), &headers, &body)?;
    let result = state.pipeline.run(&ip, &canonical).await?;
    Ok(relay_response(result))
}

/// Wrapped response for RPC callers.
fn rpc_envelope(result: &UpstreamResult) -> Value {
    json!({
        "success": result.success,
        "statusCode": result.status_code,
        "statusText": result.status_text,
        "data": result.data,
        "headers": result.headers,
        "duration": result.duration_ms,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// Unwrapped relay for gateway callers: upstream status and body verbatim,
/// headers restricted to the forwarder's allow-list.
fn relay_response(result: UpstreamResult) -> Response {
    let status = StatusCode::from_u16(result.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let is_json = result
        .headers
        .get("content-type")
        .map(|value| value.contains("json"))
        // The synthetic transport-failure result carries a JSON body.
        .unwrap_or(true);

    let body = match &result.data {
        Value::Null => Body::empty(),
        Value::String(raw) if !is_json => Body::from(raw.clone()),
        data => match serde_json::to_vec(data) {
            Ok(bytes) => Body::from(bytes),
            Err(err) => {
                return ApiError::Internal(format!("serializzazione risposta fallita: {err}"))
                    .into_response()
            }
        },
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    for (name, value) in &result.headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    if is_json && !response.headers().contains_key(CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}
