//! AI question answering over the user's notes.
//!
//! Thin sequential orchestration: embed the question, run the pgvector
//! similarity RPC through the forwarder (so the privileged-credential
//! boundary stays in one place), then ask the chat model to answer from
//! the retrieved snippets. Retries live inside the provider calls.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::types::ProxyRequest;
use crate::services::ai::AiProvider;

pub const DEFAULT_MATCH_COUNT: u8 = 5;
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;
const MAX_MATCH_COUNT: u8 = 20;
const SNIPPET_MAX_CHARS: usize = 1200;

/// Vector search RPC exposed by the Supabase project.
const MATCH_NOTES_RPC: &str = "/rest/v1/rpc/match_notes";

const SYSTEM_PROMPT: &str = "Sei l'assistente personale delle note vocali dell'utente. \
Rispondi alla domanda basandoti esclusivamente sulle note fornite. \
Se le note non contengono informazioni sufficienti, dillo chiaramente. \
Rispondi nella lingua della domanda, in modo conciso.";

#[derive(Debug, Deserialize)]
pub struct MatchedNote {
    pub id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub similarity: Option<f32>,
}

#[derive(Debug)]
pub struct AskOutcome {
    pub answer: String,
    pub sources: Vec<Value>,
    pub matches: usize,
}

/// Answer a question against the note archive.
pub async fn answer_question(
    provider: &dyn AiProvider,
    forwarder: &Forwarder,
    question: &str,
    match_count: Option<u8>,
    match_threshold: Option<f32>,
) -> Result<AskOutcome, ApiError> {
    let match_count = match_count.unwrap_or(DEFAULT_MATCH_COUNT).clamp(1, MAX_MATCH_COUNT);
    let match_threshold = match_threshold
        .unwrap_or(DEFAULT_MATCH_THRESHOLD)
        .clamp(0.0, 1.0);

    let embedding = provider
        .embed(question)
        .await
        .map_err(|err| ApiError::AiProvider(err.to_string()))?;

    let search = ProxyRequest {
        method: axum::http::Method::POST,
        target_path: MATCH_NOTES_RPC.to_string(),
        query: Vec::new(),
        headers: std::collections::HashMap::new(),
        body: Some(json!({
            "query_embedding": embedding,
            "match_threshold": match_threshold,
            "match_count": match_count,
        })),
    };

    let result = forwarder.forward(&search).await;
    if !result.success {
        tracing::error!(
            status = result.status_code,
            "vector search RPC failed"
        );
        return Err(ApiError::Internal(
            "La ricerca nelle note non è al momento disponibile".to_string(),
        ));
    }

    let notes: Vec<MatchedNote> = serde_json::from_value(result.data)
        .map_err(|err| ApiError::Internal(format!("risposta della ricerca non valida: {err}")))?;

    if notes.is_empty() {
        return Ok(AskOutcome {
            answer: "Non ho trovato note pertinenti alla domanda.".to_string(),
            sources: Vec::new(),
            matches: 0,
        });
    }

    let context = build_context(&notes);
    let user_prompt = format!("Domanda: {question}\n\nNote:\n{context}");
    let answer = provider
        .chat(SYSTEM_PROMPT, &user_prompt)
        .await
        .map_err(|err| ApiError::AiProvider(err.to_string()))?;

    Ok(AskOutcome {
        answer,
        sources: notes.iter().map(|note| note.id.clone()).collect(),
        matches: notes.len(),
    })
}

/// Numbered snippets, one per retrieved note. Transcription is preferred
/// over the excerpt; both are clipped to keep the prompt bounded.
pub fn build_context(notes: &[MatchedNote]) -> String {
    notes
        .iter()
        .enumerate()
        .map(|(index, note)| {
            let title = note.title.as_deref().unwrap_or("(senza titolo)");
            let body = note
                .transcription
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .or(note.excerpt.as_deref())
                .unwrap_or("");
            let clipped: String = body.chars().take(SNIPPET_MAX_CHARS).collect();
            format!("[{}] {title}\n{clipped}", index + 1)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
