use std::collections::HashMap;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream namespace roots the proxy will forward to.
pub const NAMESPACE_ROOTS: &[&str] = &["/rest/v1", "/auth/v1", "/storage/v1"];

/// Root of the REST data API, used for table resolution and RPC defaults.
pub const REST_ROOT: &str = "/rest/v1";

/// Maximum accepted length for a client-specified target path.
pub const MAX_TARGET_PATH_LEN: usize = 500;

/// Canonical upstream request, produced once per inbound call by the
/// normalizer regardless of calling convention, consumed by the forwarder.
/// Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    pub method: Method,
    /// Always begins with one of [`NAMESPACE_ROOTS`].
    pub target_path: String,
    /// Ordered query pairs. Order is preserved from the caller.
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

/// JSON envelope of the legacy RPC-style calling convention.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcPayload {
    pub method: Option<String>,
    pub path: Option<String>,
    pub query: Option<Value>,
    pub headers: Option<Value>,
    pub body: Option<Value>,
}

/// Outcome of the dangerous-operation detector for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DangerAssessment {
    pub is_safe: bool,
    pub reason: String,
    pub matched_operation: Option<String>,
}

impl DangerAssessment {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: "no blocked operation detected".to_string(),
            matched_operation: None,
        }
    }

    pub fn blocked(reason: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
            matched_operation: Some(operation.into()),
        }
    }
}

/// Outcome of the table access policy for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAccessDecision {
    pub allowed: bool,
    pub reason: String,
    pub resolved_table: Option<String>,
}

impl TableAccessDecision {
    pub fn allow(reason: impl Into<String>, table: Option<String>) -> Self {
        Self { allowed: true, reason: reason.into(), resolved_table: table }
    }

    pub fn deny(reason: impl Into<String>, table: Option<String>) -> Self {
        Self { allowed: false, reason: reason.into(), resolved_table: table }
    }
}

/// Result of one upstream call, relayed to the original caller.
///
/// Upstream 4xx/5xx are successful proxy outcomes (`success=false` but no
/// error raised); only transport failures produce the synthetic 500 variant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamResult {
    pub success: bool,
    pub status_code: u16,
    pub status_text: String,
    /// Parsed JSON when the upstream body is JSON, raw text otherwise.
    pub data: Value,
    /// Only the fixed allow-list of relayed headers.
    pub headers: HashMap<String, String>,
    pub duration_ms: u64,
}

impl UpstreamResult {
    /// Synthetic result for transport-level failures (DNS, connect, timeout).
    pub fn transport_failure(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            status_code: 500,
            status_text: "Upstream Unreachable".to_string(),
            data: serde_json::json!({
                "errore": "Servizio upstream non raggiungibile",
                "codice": "UPSTREAM_UNREACHABLE",
                "dettagli": message.into(),
            }),
            headers: HashMap::new(),
            duration_ms,
        }
    }
}
