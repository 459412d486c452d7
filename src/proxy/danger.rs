//! Dangerous-operation detector.
//!
//! Pattern-based screening of inbound requests for SQL-level destructive
//! operations, independent of transport shape. This is a defense-in-depth
//! heuristic layered in front of upstream row-level security, not a SQL
//! parser.

use axum::http::Method;
use regex::Regex;
use serde_json::Value;

use crate::config::PolicyConfig;
use crate::proxy::types::DangerAssessment;

/// Body fields that commonly carry raw query text, checked by substring.
const FREE_TEXT_FIELDS: &[&str] = &["query", "sql", "rawQuery", "command"];

/// Body fields naming a remote procedure to invoke.
const RPC_FIELDS: &[&str] = &["rpc", "function"];

struct KeywordPatterns {
    keyword: String,
    /// `<keyword> TABLE|DATABASE|SCHEMA|IF ...`
    object_noun: Regex,
    /// Keyword as the first token of the payload.
    leading: Regex,
}

/// Compiled detector, built once at boot from the policy configuration.
pub struct DangerDetector {
    patterns: Vec<KeywordPatterns>,
}

impl DangerDetector {
    pub fn new(policy: &PolicyConfig) -> Self {
        let patterns = policy
            .blocked_operations
            .iter()
            .map(|keyword| {
                let escaped = regex::escape(keyword);
                KeywordPatterns {
                    keyword: keyword.clone(),
                    object_noun: Regex::new(&format!(
                        r"\b{escaped}\s+(TABLE|DATABASE|SCHEMA|IF)\b"
                    ))
                    .expect("object noun pattern"),
                    leading: Regex::new(&format!(r#"^[\s"'\[{{]*{escaped}\b"#))
                        .expect("leading keyword pattern"),
                }
            })
            .collect();
        Self { patterns }
    }

    /// Inspect method and body for an attempt to invoke a destructive
    /// schema/data operation. Returns a structured decision; never panics
    /// on caller input.
    pub fn assess(&self, method: &Method, body: Option<&Value>) -> DangerAssessment {
        let method_upper = method.as_str().to_uppercase();

        // 1. The HTTP method itself names a blocked operation.
        for entry in &self.patterns {
            if method_upper == entry.keyword {
                return DangerAssessment::blocked("method not permitted", &entry.keyword);
            }
        }

        let body = match body {
            Some(body) => body,
            None => return DangerAssessment::safe(),
        };

        // 2. Whole-body pattern scan. The object-noun pairing avoids false
        // positives on benign substrings such as a column named truncate_at.
        let serialized = body.to_string().to_uppercase();
        for entry in &self.patterns {
            if entry.object_noun.is_match(&serialized) || entry.leading.is_match(&serialized) {
                return DangerAssessment::blocked(
                    format!("blocked operation '{}' in request body", entry.keyword),
                    &entry.keyword,
                );
            }
        }

        // 3. Free-text fields carrying raw query text: substring match.
        for (field, value) in collect_string_fields(body) {
            if FREE_TEXT_FIELDS.contains(&field.as_str()) {
                let upper = value.to_uppercase();
                for entry in &self.patterns {
                    if upper.contains(&entry.keyword) {
                        return DangerAssessment::blocked(
                            format!("blocked operation '{}' in field '{field}'", entry.keyword),
                            &entry.keyword,
                        );
                    }
                }
            }

            // 4. Remote procedure names containing a blocked keyword.
            if RPC_FIELDS.contains(&field.as_str()) {
                let upper = value.to_uppercase();
                for entry in &self.patterns {
                    if upper.contains(&entry.keyword) {
                        return DangerAssessment::blocked(
                            format!(
                                "blocked operation '{}' in procedure name '{value}'",
                                entry.keyword
                            ),
                            &entry.keyword,
                        );
                    }
                }
            }
        }

        DangerAssessment::safe()
    }
}

/// Walk the body and collect every (field name, string value) pair,
/// descending into nested objects and arrays.
fn collect_string_fields(value: &Value) -> Vec<(String, String)> {
    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

fn walk(value: &Value, found: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if let Value::String(text) = child {
                    found.push((key.clone(), text.clone()));
                }
                walk(child, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::merged_blocked_operations;
    use serde_json::json;

    fn detector() -> DangerDetector {
        let policy = PolicyConfig {
            blocked_operations: merged_blocked_operations(""),
            ..Default::default()
        };
        DangerDetector::new(&policy)
    }

    #[test]
    fn baseline_keywords_with_table_noun_are_blocked_any_casing() {
        let detector = detector();
        for keyword in ["TRUNCATE", "drop", "Alter", "cReAtE", "GRANT", "revoke"] {
            let body = json!({ "payload": format!("{keyword} TABLE x") });
            let assessment = detector.assess(&Method::POST, Some(&body));
            assert!(!assessment.is_safe, "{keyword} TABLE x must be blocked");
            assert_eq!(
                assessment.matched_operation.as_deref(),
                Some(keyword.to_uppercase().as_str())
            );
        }
    }

    #[test]
    fn drop_database_and_drop_if_are_blocked() {
        let detector = detector();
        for text in ["DROP DATABASE prod", "drop if exists notes", "TRUNCATE SCHEMA public"] {
            let body = json!({ "payload": text });
            assert!(!detector.assess(&Method::POST, Some(&body)).is_safe, "{text}");
        }
    }

    #[test]
    fn keyword_as_leading_token_is_blocked() {
        let detector = detector();
        let body = json!("truncate notes cascade");
        assert!(!detector.assess(&Method::POST, Some(&body)).is_safe);
    }

    #[test]
    fn benign_substrings_are_safe() {
        let detector = detector();
        for body in [
            json!({ "name": "my_drop_zone" }),
            json!({ "column": "truncate_at" }),
            json!({ "note": "the grant application was altered" }),
            json!({ "select": "*", "limit": 15 }),
        ] {
            let assessment = detector.assess(&Method::POST, Some(&body));
            assert!(assessment.is_safe, "false positive on {body}");
        }
    }

    #[test]
    fn free_text_fields_match_by_substring() {
        let detector = detector();
        let body = json!({ "query": "TRUNCATE TABLE notes" });
        assert!(!detector.assess(&Method::POST, Some(&body)).is_safe);

        let nested = json!({ "filters": { "sql": "drop table notes" } });
        assert!(!detector.assess(&Method::POST, Some(&nested)).is_safe);
    }

    #[test]
    fn rpc_field_naming_blocked_procedure_is_blocked() {
        let detector = detector();
        let body = json!({ "rpc": "drop_all_tables" });
        assert!(!detector.assess(&Method::POST, Some(&body)).is_safe);

        let safe = json!({ "rpc": "match_notes" });
        assert!(detector.assess(&Method::POST, Some(&safe)).is_safe);
    }

    #[test]
    fn blocked_method_name_fails_before_body_inspection() {
        let detector = detector();
        let method = Method::from_bytes(b"DROP").unwrap();
        let assessment = detector.assess(&method, None);
        assert!(!assessment.is_safe);
        assert_eq!(assessment.reason, "method not permitted");
    }

    #[test]
    fn operator_configured_keywords_are_honored() {
        let policy = PolicyConfig {
            blocked_operations: merged_blocked_operations("vacuum"),
            ..Default::default()
        };
        let detector = DangerDetector::new(&policy);
        let body = json!({ "query": "VACUUM FULL notes" });
        assert!(!detector.assess(&Method::POST, Some(&body)).is_safe);
    }

    #[test]
    fn missing_body_is_safe() {
        assert!(detector().assess(&Method::GET, None).is_safe);
    }
}
