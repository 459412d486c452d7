//! OpenAI provider: `text-embedding-3-small` embeddings and chat
//! completions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_dimension, clip_text, with_retry, AiError, AiProvider};

const API_BASE: &str = "https://api.openai.com/v1";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    chat_model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, chat_model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, chat_model }
    }

    async fn embeddings_once(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AiError> {
        let response = self
            .client
            .post(format!("{API_BASE}/embeddings"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": EMBEDDING_MODEL, "input": inputs }))
            .send()
            .await?;

        let parsed: EmbeddingResponse = read_api_response(response).await?;
        if parsed.data.len() != inputs.len() {
            return Err(AiError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|row| row.embedding).collect();
        for embedding in &embeddings {
            check_dimension("openai", embedding);
        }
        Ok(embeddings)
    }

    async fn chat_once(&self, body: &Value) -> Result<String, AiError> {
        let response = self
            .client
            .post(format!("{API_BASE}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let parsed: ChatResponse = read_api_response(response).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AiError::MalformedResponse("no chat choices returned".into()))
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let inputs = [clip_text(text)];
        let mut embeddings = with_retry("openai embed", || self.embeddings_once(&inputs)).await?;
        embeddings
            .pop()
            .ok_or_else(|| AiError::MalformedResponse("empty embedding list".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let clipped: Vec<&str> = texts.iter().map(|t| clip_text(t)).collect();
        with_retry("openai embed batch", || self.embeddings_once(&clipped)).await
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
        let body = json!({
            "model": self.chat_model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });
        with_retry("openai chat", || self.chat_once(&body)).await
    }
}

/// Map a non-2xx response to [`AiError::Api`], otherwise deserialize.
pub(super) async fn read_api_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AiError> {
    let status = response.status();
    if !status.is_success() {
        let message: String = response.text().await.unwrap_or_default().chars().take(300).collect();
        return Err(AiError::Api { status: status.as_u16(), message });
    }
    response
        .json()
        .await
        .map_err(|err| AiError::MalformedResponse(err.to_string()))
}
