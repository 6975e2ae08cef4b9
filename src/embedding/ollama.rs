//! Ollama-backed embedding model.
//!
//! Issues `POST /api/embed` against a local Ollama runtime. The request asks the runtime to
//! truncate over-long inputs so that oversized chunks degrade the same way the in-process model
//! does. The HTTP client is async; `embed` drives it on the captured runtime handle and therefore
//! must be called from a blocking worker thread, never from an async task.

use super::{EmbeddingModel, EmbeddingModelError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Handle;

/// Embedding model served by an Ollama runtime.
pub struct OllamaEmbeddingModel {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
    runtime: Handle,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingModel {
    /// Build a client for `base_url`, capturing the current tokio runtime.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        max_tokens: usize,
    ) -> Result<Self, EmbeddingModelError> {
        let runtime = Handle::try_current().map_err(|error| {
            EmbeddingModelError::Backend(format!("no tokio runtime available: {error}"))
        })?;
        let http = Client::builder()
            .user_agent("docvec/embed")
            .build()
            .map_err(|error| EmbeddingModelError::Backend(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            max_tokens: max_tokens.max(1),
            runtime,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingModelError> {
        let payload = json!({
            "model": self.model,
            "input": text,
            "truncate": true,
            "options": { "num_ctx": self.max_tokens },
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingModelError::Backend(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingModelError::Backend(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EmbeddingModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;
        let vector = body.embeddings.into_iter().next().ok_or_else(|| {
            EmbeddingModelError::InvalidResponse("Ollama returned no embeddings".into())
        })?;

        if vector.len() != self.dimension {
            return Err(EmbeddingModelError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

impl EmbeddingModel for OllamaEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingModelError> {
        if text.is_empty() {
            return Err(EmbeddingModelError::EmptyInput);
        }
        self.runtime.block_on(self.request(text))
    }
}
