//! Bounded fan-out of chunk embeddings onto the blocking thread pool.
//!
//! Every chunk gets its own task. A task waits for a permit from a semaphore shared by all
//! requests, then runs the model on `spawn_blocking`. The permit count is therefore the global
//! limit on concurrent model calls. Results come back in completion order and are re-sorted by
//! chunk index before they leave the pool.

use super::types::{Chunk, ChunkVector, PipelineError};
use crate::embedding::EmbeddingModel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Process-wide executor for chunk embeddings.
#[derive(Clone)]
pub struct EmbeddingPool {
    model: Arc<dyn EmbeddingModel>,
    permits: Arc<Semaphore>,
    workers: usize,
    timeout: Option<Duration>,
}

impl EmbeddingPool {
    /// Create a pool allowing `workers` concurrent model calls.
    pub fn new(model: Arc<dyn EmbeddingModel>, workers: usize, timeout: Option<Duration>) -> Self {
        let workers = workers.max(1);
        Self {
            model,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            timeout,
        }
    }

    /// Model shared by every worker.
    pub fn model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.model
    }

    /// Maximum concurrent model calls.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Embed every chunk, returning vectors ordered by chunk index.
    ///
    /// The first failure wins: remaining tasks are aborted when the join set is dropped, and a
    /// model call already running on a blocking thread finishes with its result discarded.
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<ChunkVector>, PipelineError> {
        let expected = chunks.len();
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let model = Arc::clone(&self.model);
            let permits = Arc::clone(&self.permits);
            let timeout = self.timeout;
            tasks.spawn(async move { embed_one(model, permits, timeout, chunk).await });
        }

        let mut vectors = Vec::with_capacity(expected);
        while let Some(joined) = tasks.join_next().await {
            let vector = joined.map_err(|error| {
                PipelineError::Internal(format!("chunk embedding task failed: {error}"))
            })??;
            vectors.push(vector);
        }

        vectors.sort_by_key(|vector| vector.index);
        Ok(vectors)
    }
}

async fn embed_one(
    model: Arc<dyn EmbeddingModel>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
    chunk: Chunk,
) -> Result<ChunkVector, PipelineError> {
    let Chunk { index, text, .. } = chunk;
    let permit = permits
        .acquire_owned()
        .await
        .map_err(|_| PipelineError::Internal("embedding pool is closed".into()))?;

    // Held on the blocking thread: a timed-out call keeps its permit until the model returns.
    let call = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        model.embed(&text)
    });
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| PipelineError::EmbeddingTimeout {
                index,
                timeout: limit,
            })?,
        None => call.await,
    };

    let values = joined
        .map_err(|error| PipelineError::Internal(format!("embedding worker panicked: {error}")))?
        .map_err(|source| PipelineError::Embedding { index, source })?;
    Ok(ChunkVector { index, values })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedding::EmbeddingModelError;
    use crate::pipeline::types::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Model whose output encodes the input, with configurable delays and failures.
    pub(crate) struct ScriptedModel {
        pub(crate) dimension: usize,
        pub(crate) fail_on: Option<String>,
        pub(crate) delay_for: fn(&str) -> Duration,
        pub(crate) in_flight: AtomicUsize,
        pub(crate) peak: AtomicUsize,
        pub(crate) completion_order: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fail_on: None,
                delay_for: |_| Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                completion_order: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn encode(&self, text: &str) -> Vec<f32> {
            let chars = text.chars().count() as f32;
            let first = text.chars().next().map_or(0.0, |ch| ch as u32 as f32);
            (0..self.dimension)
                .map(|slot| chars + first * (slot as f32 + 1.0))
                .collect()
        }
    }

    impl EmbeddingModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_tokens(&self) -> usize {
            usize::MAX
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingModelError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep((self.delay_for)(text));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completion_order
                .lock()
                .expect("order lock")
                .push(text.to_string());

            if self.fail_on.as_deref().is_some_and(|needle| text.contains(needle)) {
                return Err(EmbeddingModelError::Backend("simulated device failure".into()));
            }
            Ok(self.encode(text))
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text: text.to_string(),
                start_offset: index * 10,
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_follow_chunk_order_not_completion_order() {
        let mut model = ScriptedModel::new(4);
        // Earlier chunks sleep longer, so they finish last.
        model.delay_for = |text| match text {
            "a" => Duration::from_millis(120),
            "b" => Duration::from_millis(60),
            _ => Duration::ZERO,
        };
        let model = Arc::new(model);
        let pool = EmbeddingPool::new(model.clone(), 4, None);

        let vectors = pool
            .embed_chunks(chunks(&["a", "b", "c"]))
            .await
            .expect("vectors");

        let indexes: Vec<usize> = vectors.iter().map(|vector| vector.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(vectors[0].values, model.encode("a"));
        assert_eq!(vectors[2].values, model.encode("c"));

        let completed = model.completion_order.lock().unwrap().clone();
        assert_eq!(completed.first().map(String::as_str), Some("c"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_count_bounds_concurrency() {
        let mut model = ScriptedModel::new(2);
        model.delay_for = |_| Duration::from_millis(20);
        let model = Arc::new(model);
        let pool = EmbeddingPool::new(model.clone(), 2, None);

        let texts: Vec<String> = (0..8).map(|i| format!("chunk-{i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = pool.embed_chunks(chunks(&refs)).await.expect("vectors");

        assert_eq!(vectors.len(), 8);
        assert!(model.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_failure_fails_the_batch() {
        let mut model = ScriptedModel::new(3);
        model.fail_on = Some("boom".into());
        let pool = EmbeddingPool::new(Arc::new(model), 4, None);

        let error = pool
            .embed_chunks(chunks(&["fine", "boom", "also fine"]))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::EmbeddingError);
        assert!(matches!(error, PipelineError::Embedding { index: 1, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_chunks_hit_the_deadline() {
        let mut model = ScriptedModel::new(3);
        model.delay_for = |_| Duration::from_millis(300);
        let pool = EmbeddingPool::new(Arc::new(model), 2, Some(Duration::from_millis(20)));

        let error = pool.embed_chunks(chunks(&["slow"])).await.unwrap_err();
        assert!(matches!(error, PipelineError::EmbeddingTimeout { index: 0, .. }));
        assert_eq!(error.kind(), ErrorKind::EmbeddingError);
    }
}
