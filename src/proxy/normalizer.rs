//! Request normalizer and mode router.
//!
//! Two calling conventions share the proxy endpoint:
//!
//! - **RPC mode**: a JSON envelope (`method`, `path`, `query`, `headers`,
//!   `body`) posted to the proxy mount.
//! - **Gateway mode**: the inbound request itself, with the proxy mount
//!   prefix stripped, as though the Supabase SDK were talking straight to
//!   the upstream host.
//!
//! Both resolve to one canonical [`ProxyRequest`]; downstream components
//! never see the original ambiguous shape.

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use serde_json::Value;

use crate::error::ApiError;
use crate::proxy::types::{ProxyRequest, RpcPayload, MAX_TARGET_PATH_LEN, NAMESPACE_ROOTS, REST_ROOT};

/// Canonicalize an RPC-style envelope.
///
/// `raw_query` is the query string of the inbound proxy URL itself; its
/// parameters are merged without overwriting anything parsed from `path`.
pub fn canonicalize_rpc(payload: RpcPayload, raw_query: Option<&str>) -> Result<ProxyRequest, ApiError> {
    let method = validate_method(payload.method.as_deref().unwrap_or("GET"))?;

    let raw_path = payload.path.unwrap_or_else(|| format!("{REST_ROOT}/"));
    if raw_path.chars().count() > MAX_TARGET_PATH_LEN {
        return Err(ApiError::Validation(format!(
            "Il campo 'path' supera la lunghezza massima di {MAX_TARGET_PATH_LEN} caratteri"
        )));
    }

    let (path, mut query) = split_path_query(&raw_path);
    let path = collapse_slashes(&path);
    validate_target_path(&path)?;

    if let Some(envelope_query) = payload.query {
        merge_query(&mut query, object_to_pairs(&envelope_query, "query")?);
    }
    if let Some(raw) = raw_query {
        merge_query(&mut query, parse_query_string(raw));
    }

    let headers = match payload.headers {
        Some(value) => object_to_pairs(&value, "headers")?.into_iter().collect(),
        None => HashMap::new(),
    };

    Ok(ProxyRequest { method, target_path: path, query, headers, body: payload.body })
}

/// Canonicalize a gateway-style passthrough request.
///
/// `tail` is the path below the proxy mount; the upstream namespace is
/// located anywhere within it, so nested mount prefixes are tolerated.
pub fn canonicalize_gateway(
    method: &Method,
    tail: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ProxyRequest, ApiError> {
    let method = validate_method(method.as_str())?;

    let path = collapse_slashes(&format!("/{}", tail.trim_start_matches('/')));
    let target = extract_namespace_path(&path).ok_or_else(|| {
        ApiError::Validation(format!(
            "Il percorso non contiene un namespace upstream riconosciuto ({})",
            NAMESPACE_ROOTS.join(", ")
        ))
    })?;
    validate_target_path(&target)?;

    let (target_path, mut query) = split_path_query(&target);
    if let Some(raw) = raw_query {
        merge_query(&mut query, parse_query_string(raw));
    }

    let headers = header_map_to_hashmap(headers);
    let body = parse_gateway_body(body)?;

    Ok(ProxyRequest { method, target_path, query, headers, body })
}

/// The six verbs the upstream REST API accepts.
pub fn validate_method(raw: &str) -> Result<Method, ApiError> {
    match raw.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        other => Err(ApiError::Validation(format!("Metodo HTTP non supportato: {other}"))),
    }
}

fn validate_target_path(path: &str) -> Result<(), ApiError> {
    if path.chars().count() > MAX_TARGET_PATH_LEN {
        return Err(ApiError::Validation(format!(
            "Il percorso supera la lunghezza massima di {MAX_TARGET_PATH_LEN} caratteri"
        )));
    }
    if !NAMESPACE_ROOTS.iter().any(|root| is_at_namespace_root(path, root)) {
        return Err(ApiError::Validation(format!(
            "Il percorso deve iniziare con un namespace riconosciuto ({})",
            NAMESPACE_ROOTS.join(", ")
        )));
    }
    Ok(())
}

fn is_at_namespace_root(path: &str, root: &str) -> bool {
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

/// First occurrence of a recognized namespace root at a segment boundary.
fn extract_namespace_path(path: &str) -> Option<String> {
    let mut best: Option<usize> = None;
    for root in NAMESPACE_ROOTS {
        let mut from = 0;
        while let Some(offset) = path[from..].find(root) {
            let idx = from + offset;
            let at_boundary = idx == 0 || path.as_bytes()[idx - 1] == b'/';
            let after = &path[idx + root.len()..];
            if at_boundary && (after.is_empty() || after.starts_with('/') || after.starts_with('?')) {
                best = Some(best.map_or(idx, |b| b.min(idx)));
                break;
            }
            from = idx + 1;
        }
    }
    best.map(|idx| path[idx..].to_string())
}

/// Prefix stripping can leave `//`; collapse every run of slashes.
fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    out
}

/// Split an embedded query string off a path, preserving pair order.
fn split_path_query(raw: &str) -> (String, Vec<(String, String)>) {
    match raw.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query_string(query)),
        None => (raw.to_string(), Vec::new()),
    }
}

fn parse_query_string(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Append extra pairs without overwriting a key already present.
/// Duplicate keys are not re-added.
fn merge_query(query: &mut Vec<(String, String)>, extra: Vec<(String, String)>) {
    for (key, value) in extra {
        if !query.iter().any(|(existing, _)| *existing == key) {
            query.push((key, value));
        }
    }
}

/// Flatten a JSON object of scalars into string pairs, preserving order.
fn object_to_pairs(value: &Value, field: &str) -> Result<Vec<(String, String)>, ApiError> {
    let map = value.as_object().ok_or_else(|| {
        ApiError::Validation(format!("Il campo '{field}' deve essere un oggetto JSON"))
    })?;

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            _ => {
                return Err(ApiError::Validation(format!(
                    "Il campo '{field}.{key}' deve essere un valore scalare"
                )))
            }
        };
        pairs.push((key.clone(), rendered));
    }
    Ok(pairs)
}

fn header_map_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

fn parse_gateway_body(body: &[u8]) -> Result<Option<Value>, ApiError> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|_| ApiError::Validation("Il body della richiesta deve essere JSON valido".into()))
}
