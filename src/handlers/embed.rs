//! On-demand embedding endpoint.

use std::time::Instant;

use axum::{body::Bytes, extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::services::ai::MAX_TEXT_LENGTH;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EmbedPayload {
    pub text: String,
}

/// `POST /api/embed`: embed a single text with the configured provider.
pub async fn embed(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let payload: EmbedPayload = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(format!("Payload JSON non valido: {err}")))?;

    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("Il campo 'text' è obbligatorio".into()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::Validation(format!(
            "Il testo supera la lunghezza massima di {MAX_TEXT_LENGTH} caratteri"
        )));
    }

    let provider = state.ai.as_ref().ok_or(ApiError::AiNotConfigured)?;

    let started = Instant::now();
    let embedding = provider
        .embed(text)
        .await
        .map_err(|err| ApiError::AiProvider(err.to_string()))?;

    let dimension = embedding.len();
    Ok(Json(json!({
        "embedding": embedding,
        "dimension": dimension,
        "provider": provider.name(),
        "duration": started.elapsed().as_millis() as u64,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
