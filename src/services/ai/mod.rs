//! Embedding and chat-completion providers.
//!
//! One trait covers both workflows so the ask endpoint and the batch
//! embedding job share a single abstraction. Providers retry transient
//! failures with exponential backoff before giving up.

pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

use crate::config::{AiConfig, EmbeddingProviderKind};

/// Must match the pgvector column dimension on the notes table.
pub const EXPECTED_VECTOR_DIMENSION: usize = 1536;

/// Per-text input cap; both models accept long inputs, this is a safe bound.
pub const MAX_TEXT_LENGTH: usize = 8000;

/// Attempts per API call before the operation is reported as failed.
pub const MAX_RETRIES: u32 = 3;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected AI provider response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError>;

    async fn chat(&self, system: &str, user: &str) -> Result<String, AiError>;
}

/// Build the configured provider, or `None` when no API key is available.
/// The proxy surfaces keep working without one; ask/embed report 503.
pub fn provider_from_config(config: &AiConfig) -> Option<Arc<dyn AiProvider>> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => config.openai_api_key.as_ref().map(|key| {
            Arc::new(openai::OpenAiProvider::new(key.clone(), config.chat_model.clone()))
                as Arc<dyn AiProvider>
        }),
        EmbeddingProviderKind::Gemini => config.gemini_api_key.as_ref().map(|key| {
            Arc::new(gemini::GeminiProvider::new(key.clone(), config.chat_model.clone()))
                as Arc<dyn AiProvider>
        }),
    }
}

/// Clip a text to the embedding input cap on a char boundary.
pub fn clip_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_LENGTH) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Exponential backoff delay for the given attempt (1-based): 2^attempt
/// seconds, with up to 10% jitter to avoid thundering herds.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = base_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(base_ms + jitter)
}

/// Run an API call with retry and exponential backoff.
pub async fn with_retry<T, F, Fut>(label: &str, mut call: F) -> Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AiError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_RETRIES => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    operation = label,
                    attempt,
                    max_attempts = MAX_RETRIES,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "AI call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(operation = label, attempts = attempt, error = %err, "AI call failed");
                return Err(err);
            }
        }
    }
}

/// Log when a provider returns a vector of unexpected dimension. The value
/// is still used; the mismatch surfaces at upsert time if the column
/// disagrees.
pub fn check_dimension(provider: &str, embedding: &[f32]) {
    if embedding.len() != EXPECTED_VECTOR_DIMENSION {
        tracing::warn!(
            provider,
            dimension = embedding.len(),
            expected = EXPECTED_VECTOR_DIMENSION,
            "unexpected embedding dimension"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_text_is_a_noop_below_the_cap() {
        assert_eq!(clip_text("ciao"), "ciao");
    }

    #[test]
    fn clip_text_cuts_at_char_boundary() {
        let long = "è".repeat(MAX_TEXT_LENGTH + 5);
        let clipped = clip_text(&long);
        assert_eq!(clipped.chars().count(), MAX_TEXT_LENGTH);
    }

    #[test]
    fn backoff_grows_exponentially() {
        assert!(backoff_delay(1).as_millis() >= 2000);
        assert!(backoff_delay(2).as_millis() >= 4000);
        assert!(backoff_delay(3).as_millis() >= 8000);
    }

    #[tokio::test]
    async fn with_retry_returns_first_success() {
        let mut calls = 0;
        let result: Result<u32, AiError> = with_retry("test", || {
            calls += 1;
            async move { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }
}
