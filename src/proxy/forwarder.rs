//! Upstream forwarder.
//!
//! Executes a canonical [`ProxyRequest`] against the Supabase host. This is
//! the credential boundary: the caller's own `authorization`/`apikey`
//! headers are dropped and the server-held service-role key is injected
//! into every outbound call.

use std::collections::HashMap;
use std::time::Instant;

use axum::http::Method;
use serde_json::Value;
use url::Url;

use crate::config::UpstreamConfig;
use crate::proxy::types::{ProxyRequest, UpstreamResult};

/// Caller-supplied headers that are never forwarded. Prevents header
/// smuggling and credential leakage toward the upstream.
const STRIPPED_CALLER_HEADERS: &[&str] = &[
    "authorization",
    "apikey",
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
];

/// The only upstream response headers relayed back to the caller.
const RELAYED_RESPONSE_HEADERS: &[&str] =
    &["content-type", "content-range", "preference-applied", "x-client-info"];

/// Methods that conventionally carry a request body.
const BODY_METHODS: &[Method] = &[Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

pub struct Forwarder {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

impl Forwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
        })
    }

    /// Execute the request and relay the outcome.
    ///
    /// Upstream 4xx/5xx are normal results; only transport-level failures
    /// (DNS, connect, timeout) produce the synthetic 500 variant. This
    /// method never returns an error to its caller.
    pub async fn forward(&self, request: &ProxyRequest) -> UpstreamResult {
        let started = Instant::now();

        let url = match self.build_url(request) {
            Ok(url) => url,
            Err(message) => {
                return UpstreamResult::transport_failure(message, elapsed_ms(started));
            }
        };

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in outbound_headers(&request.headers, &self.service_role_key) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if BODY_METHODS.contains(&request.method) {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    target_path = %request.target_path,
                    error = %err,
                    "upstream transport failure"
                );
                return UpstreamResult::transport_failure(err.to_string(), elapsed_ms(started));
            }
        };

        let status = response.status();
        let headers = relayed_headers(response.headers());

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return UpstreamResult::transport_failure(
                    format!("failed to read upstream body: {err}"),
                    elapsed_ms(started),
                );
            }
        };

        // Upstream may legitimately return non-JSON; pass raw text through.
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        UpstreamResult {
            success: status.is_success() || status.is_redirection(),
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            data,
            headers,
            duration_ms: elapsed_ms(started),
        }
    }

    fn build_url(&self, request: &ProxyRequest) -> Result<Url, String> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.target_path))
            .map_err(|e| format!("invalid upstream URL: {e}"))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Build the outbound header set: caller headers minus the stripped set,
/// with the privileged credential always overriding `apikey` and
/// `Authorization`.
pub fn outbound_headers(
    caller: &HashMap<String, String>,
    service_role_key: &str,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = caller
        .iter()
        .filter(|(name, _)| !STRIPPED_CALLER_HEADERS.contains(&name.to_lowercase().as_str()))
        .map(|(name, value)| (name.to_lowercase(), value.clone()))
        .collect();

    headers.push(("apikey".to_string(), service_role_key.to_string()));
    headers.push(("authorization".to_string(), format!("Bearer {service_role_key}")));
    headers
}

fn relayed_headers(upstream: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    RELAYED_RESPONSE_HEADERS
        .iter()
        .filter_map(|name| {
            upstream
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
