//! Pipeline service coordinating extraction, segmentation, embedding, and aggregation.

use crate::{
    access_log::{RequestContext, log_failure},
    config::Config,
    embedding::EmbeddingModel,
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::{
        aggregate::aggregate,
        chunking::segment,
        extract::extract,
        pool::EmbeddingPool,
        types::{
            ChunkingOptions, DocumentRequest, PipelineError, PipelineOutcome, PipelineResult,
            PipelineStage,
        },
    },
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for a [`PipelineService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Segmentation parameters.
    pub chunking: ChunkingOptions,
    /// Maximum concurrent model calls across all requests.
    pub workers: usize,
    /// Optional deadline per chunk embedding.
    pub embedding_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            workers: 4,
            embedding_timeout: None,
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            chunking: ChunkingOptions {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
            },
            workers: config.embedding_workers,
            embedding_timeout: config.embedding_timeout,
        }
    }
}

/// Static description of the loaded model and pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub model: String,
    /// Vector width.
    pub dimension: usize,
    /// Token window.
    pub max_tokens: usize,
    /// Concurrent model calls allowed.
    pub workers: usize,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Turn one document into one vector.
    async fn embed_document(
        &self,
        request: DocumentRequest,
        context: &RequestContext,
    ) -> PipelineResult;

    /// Describe the model serving requests.
    fn model_info(&self) -> ModelInfo;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs the document embedding pipeline.
///
/// Owns the worker pool (and through it the process-wide model) plus the metrics registry.
/// Construct once near process start and share it through an `Arc`.
pub struct PipelineService {
    pool: EmbeddingPool,
    chunking: ChunkingOptions,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineService {
    /// Build a service around an already loaded model.
    pub fn new(model: Arc<dyn EmbeddingModel>, settings: PipelineSettings) -> Self {
        tracing::info!(
            model = model.name(),
            dimension = model.dimension(),
            workers = settings.workers,
            chunk_size = settings.chunking.chunk_size,
            chunk_overlap = settings.chunking.chunk_overlap,
            "Pipeline ready"
        );
        Self {
            pool: EmbeddingPool::new(model, settings.workers, settings.embedding_timeout),
            chunking: settings.chunking,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Extract, segment, embed, and aggregate a document.
    ///
    /// Failures are logged here, once, through the access log, and counted in metrics.
    pub async fn embed_document(
        &self,
        request: DocumentRequest,
        context: &RequestContext,
    ) -> PipelineResult {
        match self.run(request, context).await {
            Ok(outcome) => {
                self.metrics.record_document(outcome.num_chunks as u64);
                tracing::info!(
                    request_id = %context.request_id,
                    chunks = outcome.num_chunks,
                    dimension = outcome.dimension,
                    "Document embedded"
                );
                Ok(outcome)
            }
            Err(error) => {
                self.metrics.record_failure();
                log_failure(context, &error);
                Err(error)
            }
        }
    }

    async fn run(&self, request: DocumentRequest, context: &RequestContext) -> PipelineResult {
        let request_id = context.request_id;
        let DocumentRequest { content_type, body } = request;
        tracing::debug!(%request_id, stage = %PipelineStage::Received, content_type = %content_type, bytes = body.len());

        let text = extract(&content_type, &body)?;
        drop(body);
        tracing::debug!(%request_id, stage = %PipelineStage::Extracted, chars = text.chars().count());

        let chunks = segment(&text, &self.chunking)?;
        drop(text);
        let num_chunks = chunks.len();
        tracing::debug!(%request_id, stage = %PipelineStage::Segmented, chunks = num_chunks);

        tracing::debug!(%request_id, stage = %PipelineStage::Embedding, workers = self.pool.workers());
        let vectors = self.pool.embed_chunks(chunks).await?;
        if vectors.len() != num_chunks {
            return Err(PipelineError::Internal(format!(
                "expected {num_chunks} chunk vectors, got {}",
                vectors.len()
            )));
        }

        let document_embedding = aggregate(&vectors)?;
        let dimension = document_embedding.values.len();
        tracing::debug!(%request_id, stage = %PipelineStage::Aggregated, dimension);

        tracing::debug!(%request_id, stage = %PipelineStage::Completed);
        Ok(PipelineOutcome {
            num_chunks,
            dimension,
            document_embedding,
        })
    }

    /// Describe the loaded model and pool size.
    pub fn model_info(&self) -> ModelInfo {
        let model = self.pool.model();
        ModelInfo {
            model: model.name().to_string(),
            dimension: model.dimension(),
            max_tokens: model.max_tokens(),
            workers: self.pool.workers(),
        }
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn embed_document(
        &self,
        request: DocumentRequest,
        context: &RequestContext,
    ) -> PipelineResult {
        PipelineService::embed_document(self, request, context).await
    }

    fn model_info(&self) -> ModelInfo {
        PipelineService::model_info(self)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}
