use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity since startup.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_embedded: AtomicU64,
    chunks_embedded: AtomicU64,
    failed_requests: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an embedded document and the number of chunks it was split into.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_embedded.fetch_add(1, Ordering::Relaxed);
        self.chunks_embedded.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a request that ended in any pipeline failure.
    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_embedded: self.documents_embedded.load(Ordering::Relaxed),
            chunks_embedded: self.chunks_embedded.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Documents embedded successfully.
    pub documents_embedded: u64,
    /// Chunks embedded across all successful documents.
    pub chunks_embedded: u64,
    /// Requests that failed anywhere in the pipeline.
    pub failed_requests: u64,
}
