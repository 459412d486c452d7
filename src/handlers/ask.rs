//! AI question answering endpoint.

use std::time::Instant;

use axum::{body::Bytes, extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::services::answer;
use crate::state::AppState;

const MAX_QUESTION_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct AskPayload {
    pub question: String,
    #[serde(default)]
    pub match_count: Option<u8>,
    #[serde(default)]
    pub match_threshold: Option<f32>,
}

/// `POST /api/ask`: answer a question against the note archive.
pub async fn ask(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let payload: AskPayload = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(format!("Payload JSON non valido: {err}")))?;

    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("Il campo 'question' è obbligatorio".into()));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::Validation(format!(
            "La domanda supera la lunghezza massima di {MAX_QUESTION_CHARS} caratteri"
        )));
    }

    let provider = state.ai.as_ref().ok_or(ApiError::AiNotConfigured)?;

    let started = Instant::now();
    let outcome = answer::answer_question(
        provider.as_ref(),
        &state.forwarder,
        question,
        payload.match_count,
        payload.match_threshold,
    )
    .await?;

    Ok(Json(json!({
        "answer": outcome.answer,
        "sources": outcome.sources,
        "matches": outcome.matches,
        "duration": started.elapsed().as_millis() as u64,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
