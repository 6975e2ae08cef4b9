//! Core data types and error definitions for the document pipeline.

use crate::embedding::EmbeddingModelError;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Media types the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `application/json` carrying `{"text": "..."}`.
    Json,
    /// `text/plain`, UTF-8.
    PlainText,
    /// `application/pdf`.
    Pdf,
}

impl ContentType {
    /// Resolve a declared `Content-Type` value, ignoring parameters such as `charset`.
    pub fn parse(declared: &str) -> Result<Self, PipelineError> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Ok(Self::Json),
            "text/plain" => Ok(Self::PlainText),
            "application/pdf" => Ok(Self::Pdf),
            _ => Err(PipelineError::UnsupportedMediaType(declared.trim().to_string())),
        }
    }

    /// Canonical media type string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::PlainText => "text/plain",
            Self::Pdf => "application/pdf",
        }
    }
}

/// A document submitted for embedding: declared media type plus raw payload.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// Media type exactly as the caller declared it (may be unsupported or empty).
    pub content_type: String,
    /// Raw request body.
    pub body: Bytes,
}

impl DocumentRequest {
    /// Bundle a declared content type with its payload.
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

/// Segmentation parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Upper bound on characters per chunk.
    pub chunk_size: usize,
    /// Characters of the previous chunk repeated at the head of the next.
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::config::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// One contiguous span of the extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in segmentation order; drives result ordering.
    pub index: usize,
    /// Chunk contents.
    pub text: String,
    /// Character offset of the first character within the extracted text.
    pub start_offset: usize,
}

/// Vector produced for a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkVector {
    /// Index of the chunk this vector belongs to.
    pub index: usize,
    /// Model output.
    pub values: Vec<f32>,
}

/// Vector representing the whole document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocumentVector {
    /// Coordinate-wise mean of all chunk vectors.
    pub values: Vec<f32>,
}

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Number of chunks the document was split into.
    pub num_chunks: usize,
    /// Width of each chunk vector and of the document vector.
    pub dimension: usize,
    /// Aggregated document vector.
    pub document_embedding: DocumentVector,
}

impl PipelineOutcome {
    /// Shape of the chunk-vector matrix, `[num_chunks, dimension]`.
    pub fn chunk_embedding_shape(&self) -> [usize; 2] {
        [self.num_chunks, self.dimension]
    }
}

/// Either a [`PipelineOutcome`] or the classified failure.
pub type PipelineResult = Result<PipelineOutcome, PipelineError>;

/// Stages a request moves through; failure can happen from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Request accepted, nothing done yet.
    Received,
    /// Text extracted from the payload.
    Extracted,
    /// Text split into chunks.
    Segmented,
    /// Chunk embeddings dispatched to the worker pool.
    Embedding,
    /// Chunk vectors combined.
    Aggregated,
    /// Response ready.
    Completed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Segmented => "segmented",
            Self::Embedding => "embedding",
            Self::Aggregated => "aggregated",
            Self::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Failure classification shared by logs, metrics, and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/empty text, unparseable JSON, unreadable or textless PDF.
    InvalidInput,
    /// Declared media type is not supported.
    UnsupportedMediaType,
    /// Segmenter produced nothing or was misconfigured.
    SegmentationError,
    /// The embedding model failed for at least one chunk.
    EmbeddingError,
    /// Chunk vectors disagree on width.
    DimensionMismatch,
    /// Aggregation received no vectors.
    EmptyAggregation,
    /// Any other broken invariant.
    InternalError,
}

impl ErrorKind {
    /// Client errors are the caller's fault; everything else is ours.
    pub fn is_client_error(self) -> bool {
        matches!(self, Self::InvalidInput | Self::UnsupportedMediaType)
    }

    /// HTTP status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::UnsupportedMediaType => 415,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Invariant violations detected while averaging chunk vectors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    /// A vector's width differs from the first vector's.
    #[error("chunk {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Width of the first vector.
        expected: usize,
        /// Width of the offending vector.
        actual: usize,
        /// Chunk index of the offending vector.
        index: usize,
    },
    /// No vectors to aggregate.
    #[error("no chunk vectors to aggregate")]
    EmptyAggregation,
}

/// Errors emitted by the document pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Payload is malformed or has no usable text.
    #[error("{0}")]
    InvalidInput(String),
    /// Declared media type is not supported.
    #[error("Unsupported content type: {}", display_media_type(.0))]
    UnsupportedMediaType(String),
    /// Segmenter could not produce chunks.
    #[error("Failed to segment document: {0}")]
    Segmentation(String),
    /// Embedding model failed for a chunk.
    #[error("Failed to embed chunk {index}: {source}")]
    Embedding {
        /// Chunk that failed.
        index: usize,
        /// Underlying model failure.
        #[source]
        source: EmbeddingModelError,
    },
    /// A chunk embedding exceeded the configured deadline.
    #[error("Embedding chunk {index} timed out after {timeout:?}")]
    EmbeddingTimeout {
        /// Chunk that timed out.
        index: usize,
        /// Configured deadline.
        timeout: Duration,
    },
    /// Chunk vectors could not be combined.
    #[error("Failed to aggregate chunk vectors: {0}")]
    Aggregation(#[from] AggregationError),
    /// Any other broken invariant (worker panic, count mismatch, ...).
    #[error("Internal pipeline failure: {0}")]
    Internal(String),
}

fn display_media_type(value: &str) -> &str {
    if value.is_empty() { "<missing>" } else { value }
}

impl PipelineError {
    /// Taxonomy tag of this failure.
    ///
    /// Aggregation invariants surface as `InternalError` to the orchestrator; the specific
    /// aggregation tag is still available through [`PipelineError::detail_kind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            Self::Segmentation(_) => ErrorKind::SegmentationError,
            Self::Embedding { .. } | Self::EmbeddingTimeout { .. } => ErrorKind::EmbeddingError,
            Self::Aggregation(_) | Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Most specific tag available, used for logging.
    pub fn detail_kind(&self) -> ErrorKind {
        match self {
            Self::Aggregation(AggregationError::DimensionMismatch { .. }) => {
                ErrorKind::DimensionMismatch
            }
            Self::Aggregation(AggregationError::EmptyAggregation) => ErrorKind::EmptyAggregation,
            other => other.kind(),
        }
    }

    /// HTTP status code for this failure.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message safe to hand back to callers. Internal causes stay in the logs.
    pub fn public_detail(&self) -> String {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::UnsupportedMediaType => self.to_string(),
            ErrorKind::EmbeddingError => "Failed to generate document embedding".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}
