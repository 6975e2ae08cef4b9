#![deny(missing_docs)]

//! Core library for docvec: whole-document embeddings built from overlapping chunks.

/// Structured access and error events.
pub mod access_log;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding model abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Extraction, segmentation, pooled embedding, and aggregation.
pub mod pipeline;
