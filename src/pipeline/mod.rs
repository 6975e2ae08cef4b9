//! Document embedding pipeline: extraction, segmentation, pooled embedding, and aggregation.

pub mod aggregate;
pub mod chunking;
pub mod extract;
mod pool;
mod service;
pub mod types;

pub use pool::EmbeddingPool;
pub use service::{ModelInfo, PipelineApi, PipelineService, PipelineSettings};
pub use types::{
    AggregationError, Chunk, ChunkVector, ChunkingOptions, ContentType, DocumentRequest,
    DocumentVector, ErrorKind, PipelineError, PipelineOutcome, PipelineResult, PipelineStage,
};
