//! Google Gemini provider: `gemini-embedding-001` embeddings (batched) and
//! `generateContent` chat.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_dimension, clip_text, with_retry, AiError, AiProvider, EXPECTED_VECTOR_DIMENSION};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const EMBEDDING_MODEL: &str = "models/gemini-embedding-001";

/// Gemini accepts up to 100 texts per batch call; stay well below.
pub const GEMINI_BATCH_SIZE: usize = 10;

/// Notes are indexed for retrieval, so embeddings are optimized for it.
const TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    chat_model: String,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, chat_model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, chat_model }
    }

    fn embed_request(text: &str) -> Value {
        json!({
            "model": EMBEDDING_MODEL,
            "content": { "parts": [{ "text": text }] },
            "taskType": TASK_TYPE,
            "outputDimensionality": EXPECTED_VECTOR_DIMENSION,
        })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let response = self
            .client
            .post(format!("{API_BASE}/{EMBEDDING_MODEL}:embedContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::embed_request(text))
            .send()
            .await?;

        let parsed: EmbedContentResponse = super::openai::read_api_response(response).await?;
        check_dimension("gemini", &parsed.embedding.values);
        Ok(parsed.embedding.values)
    }

    async fn batch_once(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AiError> {
        let requests: Vec<Value> = texts.iter().map(|text| Self::embed_request(text)).collect();

        let response = self
            .client
            .post(format!("{API_BASE}/{EMBEDDING_MODEL}:batchEmbedContents"))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        let parsed: BatchEmbedResponse = super::openai::read_api_response(response).await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(AiError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        let embeddings: Vec<Vec<f32>> = parsed.embeddings.into_iter().map(|e| e.values).collect();
        for embedding in &embeddings {
            check_dimension("gemini", embedding);
        }
        Ok(embeddings)
    }

    async fn chat_once(&self, body: &Value) -> Result<String, AiError> {
        let response = self
            .client
            .post(format!("{API_BASE}/models/{}:generateContent", self.chat_model))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let parsed: GenerateContentResponse = super::openai::read_api_response(response).await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| AiError::MalformedResponse("no candidates returned".into()))
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let clipped = clip_text(text);
        with_retry("gemini embed", || self.embed_once(clipped)).await
    }

    /// Batch embedding in chunks of [`GEMINI_BATCH_SIZE`]; one retried API
    /// call per chunk.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(GEMINI_BATCH_SIZE) {
            let clipped: Vec<&str> = chunk.iter().map(|t| clip_text(t)).collect();
            let embeddings = with_retry("gemini embed batch", || self.batch_once(&clipped)).await?;
            all.extend(embeddings);
        }
        Ok(all)
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
        });
        with_retry("gemini chat", || self.chat_once(&body)).await
    }
}
