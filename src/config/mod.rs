use std::collections::BTreeSet;
use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operations that destroy data or structure or alter permissions.
/// Always blocked; operator-configured additions are merged on top.
pub const BASELINE_BLOCKED_OPERATIONS: &[&str] =
    &["TRUNCATE", "DROP", "ALTER", "CREATE", "GRANT", "REVOKE"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub policy: PolicyConfig,
    pub rate_limit: RateLimitConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Supabase project (no trailing slash).
    pub base_url: String,
    /// Server-held privileged credential. Never exposed to callers.
    pub service_role_key: String,
    /// Full timeout budget for a single outbound call.
    pub timeout_secs: u64,
}

/// Table and operation policy, read once at boot and immutable thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Case-insensitive table allow-list. Empty = no restriction.
    pub allowed_tables: BTreeSet<String>,
    /// Case-insensitive table deny-list. Empty = no restriction.
    pub denied_tables: BTreeSet<String>,
    /// Baseline blocked keywords plus operator additions, uppercased.
    pub blocked_operations: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub provider: EmbeddingProviderKind,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
}

impl AiConfig {
    /// Whether the configured provider has its API key available.
    pub fn is_configured(&self) -> bool {
        match self.provider {
            EmbeddingProviderKind::OpenAi => self.openai_api_key.is_some(),
            EmbeddingProviderKind::Gemini => self.gemini_api_key.is_some(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// A missing upstream URL or privileged credential is a hard failure:
    /// the service must refuse to start rather than serve requests with a
    /// broken security boundary.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required_var("SUPABASE_URL")?.trim_end_matches('/').to_string();
        let service_role_key = required_var("SUPABASE_SERVICE_ROLE_KEY")?;

        let port = env::var("VOICENOTES_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3000);

        let provider = match env::var("EMBEDDING_PROVIDER").as_deref() {
            Ok("gemini") => EmbeddingProviderKind::Gemini,
            Ok("openai") | Err(_) => EmbeddingProviderKind::OpenAi,
            Ok(other) => {
                return Err(ConfigError::InvalidVar {
                    name: "EMBEDDING_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            server: ServerConfig {
                port,
                max_body_bytes: parsed_var("MAX_BODY_BYTES", 2 * 1024 * 1024),
            },
            upstream: UpstreamConfig {
                base_url,
                service_role_key,
                timeout_secs: parsed_var("UPSTREAM_TIMEOUT_SECS", 30),
            },
            policy: PolicyConfig {
                allowed_tables: csv_set(&env::var("PROXY_ALLOWED_TABLES").unwrap_or_default()),
                denied_tables: csv_set(&env::var("PROXY_DENIED_TABLES").unwrap_or_default()),
                blocked_operations: merged_blocked_operations(
                    &env::var("PROXY_BLOCKED_OPERATIONS").unwrap_or_default(),
                ),
            },
            rate_limit: RateLimitConfig {
                enabled: parsed_var("PROXY_RATE_LIMIT_ENABLED", true),
                requests: parsed_var("PROXY_RATE_LIMIT_REQUESTS", 60),
                window_secs: parsed_var("PROXY_RATE_LIMIT_WINDOW_SECS", 60),
            },
            ai: AiConfig {
                provider,
                openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
                gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|s| !s.is_empty()),
                chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| default_chat_model(provider)),
            },
        })
    }

    /// Copy of the config with secrets replaced, for `voicenotes config` output.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.upstream.service_role_key = redact(&copy.upstream.service_role_key);
        copy.ai.openai_api_key = copy.ai.openai_api_key.as_deref().map(redact);
        copy.ai.gemini_api_key = copy.ai.gemini_api_key.as_deref().map(redact);
        copy
    }
}

fn default_chat_model(provider: EmbeddingProviderKind) -> String {
    match provider {
        EmbeddingProviderKind::OpenAi => "gpt-4o-mini".to_string(),
        EmbeddingProviderKind::Gemini => "gemini-2.0-flash".to_string(),
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated list into a lowercased set, skipping blanks.
pub fn csv_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Baseline blocked keywords merged with operator additions.
/// Union, case-insensitive, deduplicated.
pub fn merged_blocked_operations(extra: &str) -> BTreeSet<String> {
    let mut set: BTreeSet<String> = BASELINE_BLOCKED_OPERATIONS
        .iter()
        .map(|s| s.to_string())
        .collect();
    for word in extra.split(',') {
        let word = word.trim().to_uppercase();
        if !word.is_empty() {
            set.insert(word);
        }
    }
    set
}

fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}***", &secret[..4])
    }
}
