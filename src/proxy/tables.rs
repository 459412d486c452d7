//! Table access policy.
//!
//! Resolves the target table of a request and evaluates it against the
//! allow/deny configuration. The deny-list has absolute priority.

use serde_json::Value;

use crate::config::PolicyConfig;
use crate::proxy::types::{TableAccessDecision, REST_ROOT};

/// Resolve a table name from the target path, falling back to an explicit
/// `table`/`tableName` body field. Names are case-folded.
pub fn resolve_table(target_path: &str, body: Option<&Value>) -> Option<String> {
    if let Some(name) = table_from_path(target_path) {
        return Some(name);
    }

    let body = body?;
    for field in ["table", "tableName"] {
        if let Some(name) = body.get(field).and_then(Value::as_str) {
            let name = name.trim().to_lowercase();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

/// Path segment immediately following the REST API root:
/// `/rest/v1/{name}` (query string and trailing segments ignored).
fn table_from_path(target_path: &str) -> Option<String> {
    let rest = target_path.strip_prefix(REST_ROOT)?;
    let rest = rest.strip_prefix('/')?;
    let segment = rest.split(['/', '?']).next().unwrap_or_default();
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_lowercase())
}

/// Evaluate table access. Precedence is a contract:
/// empty lists allow, unresolvable names deny only under an allow-list,
/// deny-list beats allow-list, allow-list membership decides the rest.
pub fn evaluate(policy: &PolicyConfig, target_path: &str, body: Option<&Value>) -> TableAccessDecision {
    let resolved = resolve_table(target_path, body);

    // 1. No restriction configured at all.
    if policy.allowed_tables.is_empty() && policy.denied_tables.is_empty() {
        return TableAccessDecision::allow("no table restrictions configured", resolved);
    }

    let name = match resolved {
        Some(name) => name,
        None => {
            // 2. Unresolvable resource: a deny-list alone cannot apply,
            // but an allow-list demands a provable table name.
            return if policy.allowed_tables.is_empty() {
                TableAccessDecision::allow("no table resolved; deny-list cannot apply", None)
            } else {
                TableAccessDecision::deny(
                    "no table resolved; allow-list requires an identifiable table",
                    None,
                )
            };
        }
    };

    // 3. Deny-list has absolute priority.
    if policy.denied_tables.contains(&name) {
        return TableAccessDecision::deny("table is in the deny-list", Some(name));
    }

    // 4./5./6. Allow-list membership decides.
    if policy.allowed_tables.is_empty() {
        TableAccessDecision::allow("no allow-list configured", Some(name))
    } else if policy.allowed_tables.contains(&name) {
        TableAccessDecision::allow("table is in the allow-list", Some(name))
    } else {
        TableAccessDecision::deny("table is not in the allow-list", Some(name))
    }
}
