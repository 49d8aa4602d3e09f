//! OpenAI-compatible HTTP clients for embeddings and chat completion
//!
//! Both endpoints follow the OpenAI wire format, which Ollama and llama.cpp
//! also serve, so one client covers the common local and hosted backends.

use super::{CompletionProvider, EmbeddingProvider, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// OpenAI-compatible embeddings client
///
/// `POST {base_url}/v1/embeddings` with `{ "model": ..., "input": text }`,
/// response `{ "data": [ { "embedding": [...] } ] }`.
pub struct OpenAiEmbeddingsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsItem>,
}

#[derive(Deserialize)]
struct EmbeddingsItem {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingsClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingsClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.is_empty() {
            return Err(ProviderError::InvalidInput("empty text".to_string()));
        }

        let body = json!({ "model": self.model, "input": text });

        let mut request = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "embeddings HTTP {}",
                response.status()
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(format!("missing data array: {}", e)))?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BadResponse("empty data array".to_string()))?;

        if first.embedding.len() <= 1 {
            return Err(ProviderError::BadResponse(format!(
                "embedding vector looks wrong (dim={})",
                first.embedding.len()
            )));
        }

        Ok(first.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat client
///
/// `POST {base_url}/v1/chat/completions`, single user message, non-streaming;
/// response `choices[0].message.content`.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
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

impl OpenAiChatClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChatClient {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": false,
        });

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "chat HTTP {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(format!("missing choices: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::BadResponse("empty choices array".to_string()))
    }
}
