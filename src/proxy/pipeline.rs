//! Policy pipeline orchestrator.
//!
//! Five gates in fixed order, each able to short-circuit:
//!
//! 1. rate limit        -> 429 (middleware, [`crate::middleware::rate_limit`])
//! 2. schema validation -> 400 (normalizer, [`crate::proxy::normalizer`])
//! 3. dangerous-operation check -> 403
//! 4. table access policy       -> 403
//! 5. upstream forward (terminal)
//!
//! Gates 1-2 run before a canonical request exists; this struct owns gates
//! 3-5, which all operate on the canonical [`ProxyRequest`]. No retries at
//! this layer; the pipeline is stateless per invocation.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::proxy::danger::DangerDetector;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::tables;
use crate::proxy::types::{ProxyRequest, UpstreamResult};

pub struct PolicyPipeline {
    detector: DangerDetector,
    policy: crate::config::PolicyConfig,
    forwarder: Arc<Forwarder>,
}

impl PolicyPipeline {
    pub fn new(config: &AppConfig, forwarder: Arc<Forwarder>) -> Self {
        Self {
            detector: DangerDetector::new(&config.policy),
            policy: config.policy.clone(),
            forwarder,
        }
    }

    /// Run gates 3-5 on a canonical request.
    ///
    /// Policy denials are returned as structured errors (HTTP 403 at the
    /// surface); the forward gate itself never fails, folding transport
    /// errors into the [`UpstreamResult`].
    pub async fn run(
        &self,
        client_ip: &str,
        request: &ProxyRequest,
    ) -> Result<UpstreamResult, ApiError> {
        // Gate 3: dangerous-operation check.
        let assessment = self.detector.assess(&request.method, request.body.as_ref());
        if !assessment.is_safe {
            let operation = assessment
                .matched_operation
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            tracing::warn!(
                target: "security_audit",
                client_ip = %client_ip,
                matched_keyword = %operation,
                path = %request.target_path,
                body_snippet = %body_snippet(request),
                "blocked dangerous operation"
            );
            return Err(ApiError::DangerousOperation {
                operation,
                details: assessment.reason,
            });
        }

        // Gate 4: table access policy.
        let decision = tables::evaluate(&self.policy, &request.target_path, request.body.as_ref());
        if !decision.allowed {
            tracing::warn!(
                target: "security_audit",
                client_ip = %client_ip,
                table = decision.resolved_table.as_deref().unwrap_or("<unresolved>"),
                path = %request.target_path,
                reason = %decision.reason,
                "denied table access"
            );
            return Err(ApiError::TableAccessDenied {
                table: decision.resolved_table,
                details: decision.reason,
            });
        }

        // Gate 5: forward (terminal).
        Ok(self.forwarder.forward(request).await)
    }
}

/// Truncated body excerpt for audit entries. Operators depend on this for
/// incident response; 200 chars keeps log lines bounded.
fn body_snippet(request: &ProxyRequest) -> String {
    match &request.body {
        Some(body) => body.to_string().chars().take(200).collect(),
        None => String::new(),
    }
}
