//! Embedding model abstraction and adapters.
//!
//! A model turns one chunk of text into one fixed-width vector. Calls are blocking because real
//! backends are CPU/accelerator bound; the pipeline runs them on tokio's blocking pool (see
//! [`crate::pipeline::EmbeddingPool`]). Models are built once at startup and shared behind an
//! `Arc`, so implementations must tolerate concurrent `embed` calls.

mod hashing;
mod ollama;

pub use hashing::HashingEmbeddingModel;
pub use ollama::OllamaEmbeddingModel;

use crate::config::{Config, EmbeddingProvider};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingModelError {
    /// Tokenizer could not be loaded or failed on the input.
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    /// Input produced no tokens, so there is nothing to pool.
    #[error("input produced no tokens")]
    EmptyInput,
    /// Backend refused or failed the forward pass (device error, out of memory, HTTP failure).
    #[error("embedding backend failed: {0}")]
    Backend(String),
    /// Backend answered with something that is not a usable vector.
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
pub trait EmbeddingModel: Send + Sync {
    /// Identifier reported in health output.
    fn name(&self) -> &str;

    /// Width of every vector this model returns.
    fn dimension(&self) -> usize;

    /// Token window; inputs beyond it are truncated, not rejected.
    fn max_tokens(&self) -> usize;

    /// Embed one piece of text. Blocks the calling thread.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingModelError>;
}

/// Build the embedding model selected by configuration.
///
/// Must be called from within a tokio runtime: remote adapters capture the runtime handle so
/// that blocking worker threads can drive their HTTP calls.
pub fn build_embedding_model(
    config: &Config,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingModelError> {
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        max_tokens = config.embedding_max_tokens,
        "Loading embedding model"
    );
    let model: Arc<dyn EmbeddingModel> = match config.embedding_provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbeddingModel::new(
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.embedding_max_tokens,
        )?),
        EmbeddingProvider::Ollama => {
            let base_url = config.ollama_url.clone().ok_or_else(|| {
                EmbeddingModelError::Backend("OLLAMA_URL is not configured".into())
            })?;
            Arc::new(OllamaEmbeddingModel::new(
                base_url,
                config.embedding_model.clone(),
                config.embedding_dimension,
                config.embedding_max_tokens,
            )?)
        }
    };
    Ok(model)
}
