//! Batch embedding processor.
//!
//! Finds completed notes that still lack an embedding, generates vectors
//! through the configured provider, and writes them back via PostgREST.
//! Invoked from the CLI (`voicenotes embed`), typically on a schedule.

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::proxy::forwarder::Forwarder;
use crate::proxy::types::ProxyRequest;
use crate::services::ai::AiProvider;

/// Maximum rows fetched per run, to avoid timeouts and API overload.
pub const BATCH_LIMIT: usize = 50;

/// Pause between embedding calls, to stay clear of provider rate limits.
pub const DELAY_BETWEEN_CALLS_MS: u64 = 200;

/// Texts embedded per provider call.
const CHUNK_SIZE: usize = 10;

const NOTE_COLUMNS: &str = "id,title,excerpt,categories,tags,transcription";

#[derive(Debug, Deserialize)]
pub struct NoteRow {
    pub id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(default)]
    pub transcription: Option<String>,
}

#[derive(Debug, Default)]
pub struct JobReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Run one batch pass. `dry_run` generates embeddings without writing
/// anything back.
pub async fn run(
    forwarder: &Forwarder,
    provider: &dyn AiProvider,
    limit: usize,
    dry_run: bool,
) -> anyhow::Result<JobReport> {
    let limit = limit.min(BATCH_LIMIT).max(1);
    let notes = fetch_pending_notes(forwarder, limit).await?;

    let mut report = JobReport { fetched: notes.len(), ..Default::default() };
    if notes.is_empty() {
        tracing::info!("no notes pending embedding");
        return Ok(report);
    }

    tracing::info!(
        count = notes.len(),
        provider = provider.name(),
        dry_run,
        "processing notes"
    );

    // Notes whose searchable fields are all empty cannot be embedded.
    let mut workable: Vec<(&NoteRow, String)> = Vec::new();
    for note in &notes {
        let text = build_embedding_text(note);
        if text.is_empty() {
            tracing::warn!(note_id = %note.id, "note has no embeddable text, skipping");
            report.skipped += 1;
        } else {
            workable.push((note, text));
        }
    }

    for chunk in workable.chunks(CHUNK_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = match provider.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(err) => {
                tracing::error!(error = %err, count = chunk.len(), "embedding batch failed");
                report.failed += chunk.len();
                continue;
            }
        };

        for ((note, _), embedding) in chunk.iter().zip(embeddings) {
            if dry_run {
                tracing::info!(note_id = %note.id, "[dry-run] would update embedding");
                report.processed += 1;
                continue;
            }
            if store_embedding(forwarder, &note.id, &embedding).await {
                report.processed += 1;
            } else {
                report.failed += 1;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(DELAY_BETWEEN_CALLS_MS)).await;
    }

    tracing::info!(
        fetched = report.fetched,
        processed = report.processed,
        failed = report.failed,
        skipped = report.skipped,
        "embedding run complete"
    );
    Ok(report)
}

async fn fetch_pending_notes(forwarder: &Forwarder, limit: usize) -> anyhow::Result<Vec<NoteRow>> {
    let request = ProxyRequest {
        method: axum::http::Method::GET,
        target_path: "/rest/v1/notes".to_string(),
        query: vec![
            ("select".to_string(), NOTE_COLUMNS.to_string()),
            ("status".to_string(), "eq.completed".to_string()),
            ("embedding".to_string(), "is.null".to_string()),
            ("limit".to_string(), limit.to_string()),
        ],
        headers: std::collections::HashMap::new(),
        body: None,
    };

    let result = forwarder.forward(&request).await;
    if !result.success {
        bail!(
            "failed to fetch pending notes: upstream returned {} {}",
            result.status_code,
            result.status_text
        );
    }
    serde_json::from_value(result.data).context("unexpected notes payload from upstream")
}

async fn store_embedding(forwarder: &Forwarder, note_id: &Value, embedding: &[f32]) -> bool {
    let id_filter = match note_id {
        Value::String(id) => format!("eq.{id}"),
        Value::Number(id) => format!("eq.{id}"),
        other => {
            tracing::error!(note_id = %other, "unsupported note id type");
            return false;
        }
    };

    let request = ProxyRequest {
        method: axum::http::Method::PATCH,
        target_path: "/rest/v1/notes".to_string(),
        query: vec![("id".to_string(), id_filter)],
        headers: std::collections::HashMap::from([(
            "prefer".to_string(),
            "return=minimal".to_string(),
        )]),
        body: Some(json!({ "embedding": embedding })),
    };

    let result = forwarder.forward(&request).await;
    if !result.success {
        tracing::error!(
            note_id = %note_id,
            status = result.status_code,
            "failed to store embedding"
        );
    }
    result.success
}

/// Compose the text sent to the embedding provider. Field order and the
/// `" | "` separator are part of the index format: changing them degrades
/// similarity against vectors already stored.
pub fn build_embedding_text(note: &NoteRow) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = trimmed(&note.title) {
        parts.push(format!("Title: {title}"));
    }
    if let Some(excerpt) = trimmed(&note.excerpt) {
        parts.push(format!("Excerpt: {excerpt}"));
    }
    if let Some(categories) = trimmed(&note.categories) {
        parts.push(format!("Category: {categories}"));
    }
    if let Some(tags) = note.tags.as_ref().and_then(render_tags) {
        parts.push(format!("Tags: {tags}"));
    }
    if let Some(transcription) = trimmed(&note.transcription) {
        parts.push(format!("Content: {transcription}"));
    }

    parts.join(" | ")
}

fn trimmed(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Tags arrive either as a JSON array or as a string holding JSON; a plain
/// string that fails to parse is treated as a single tag.
fn render_tags(tags: &Value) -> Option<String> {
    let list: Vec<String> = match tags {
        Value::Array(items) => items.iter().map(render_tag).collect(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items.iter().map(render_tag).collect(),
            _ => vec![raw.clone()],
        },
        _ => return None,
    };

    let list: Vec<String> = list.into_iter().filter(|t| !t.is_empty()).collect();
    if list.is_empty() {
        None
    } else {
        Some(list.join(", "))
    }
}

fn render_tag(tag: &Value) -> String {
    match tag {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
