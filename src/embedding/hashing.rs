//! Deterministic in-process embedding model.
//!
//! Tokenizes with the `cl100k_base` BPE, truncates to the token window, gives every token id a
//! fixed pseudo-random vector derived from SHA-256, and mean-pools over token positions. The
//! output is reproducible bit for bit, which makes it a dependable default for local runs and
//! tests when no model runtime is available.

use super::{EmbeddingModel, EmbeddingModelError};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Tokenize, hash, and mean-pool embedding model.
pub struct HashingEmbeddingModel {
    name: String,
    dimension: usize,
    max_tokens: usize,
    encoder: Arc<CoreBPE>,
}

impl HashingEmbeddingModel {
    /// Load the tokenizer and construct the model.
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        max_tokens: usize,
    ) -> Result<Self, EmbeddingModelError> {
        if dimension == 0 {
            return Err(EmbeddingModelError::Backend(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        let encoder =
            cl100k_base().map_err(|error| EmbeddingModelError::Tokenization(error.to_string()))?;
        Ok(Self {
            name: name.into(),
            dimension,
            max_tokens: max_tokens.max(1),
            encoder: Arc::new(encoder),
        })
    }

    fn accumulate_token(token: u32, sums: &mut [f64]) {
        let digest = Sha256::digest(token.to_le_bytes());
        let mut seed_bytes = [0_u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        let mut state = u64::from_le_bytes(seed_bytes);

        for slot in sums.iter_mut() {
            let bits = splitmix64(&mut state);
            // Top 53 bits as a unit float, shifted into [-1, 1).
            let unit = (bits >> 11) as f64 / (1_u64 << 53) as f64;
            *slot += unit * 2.0 - 1.0;
        }
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl EmbeddingModel for HashingEmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingModelError> {
        let mut tokens = self.encoder.encode_ordinary(text);
        if tokens.is_empty() {
            return Err(EmbeddingModelError::EmptyInput);
        }
        if tokens.len() > self.max_tokens {
            tracing::debug!(
                tokens = tokens.len(),
                max_tokens = self.max_tokens,
                "Truncating input to model window"
            );
            tokens.truncate(self.max_tokens);
        }

        let mut sums = vec![0.0_f64; self.dimension];
        for token in &tokens {
            Self::accumulate_token(*token, &mut sums);
        }

        let count = tokens.len() as f64;
        Ok(sums.into_iter().map(|sum| (sum / count) as f32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(max_tokens: usize) -> HashingEmbeddingModel {
        HashingEmbeddingModel::new("test-hashing", 32, max_tokens).expect("model")
    }

    #[test]
    fn produces_configured_dimension() {
        let vector = model(512).embed("hello world").expect("embedding");
        assert_eq!(vector.len(), 32);
        assert!(vector.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn embedding_is_idempotent() {
        let model = model(512);
        let first = model.embed("The quick brown fox").expect("first");
        let second = model.embed("The quick brown fox").expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn different_text_yields_different_vectors() {
        let model = model(512);
        let left = model.embed("alpha beta").expect("left");
        let right = model.embed("gamma delta").expect("right");
        assert_ne!(left, right);
    }

    #[test]
    fn truncates_silently_past_the_token_window() {
        let model = model(4);
        let long = "word ".repeat(200);
        let truncated = model.embed(&long).expect("long input still embeds");
        let window = model.embed(&"word ".repeat(4)).expect("window");
        assert_eq!(truncated.len(), 32);
        // Only the first four tokens count, and those are identical.
        assert_eq!(truncated, window);
    }

    #[test]
    fn empty_input_is_rejected() {
        let error = model(512).embed("").unwrap_err();
        assert!(matches!(error, EmbeddingModelError::EmptyInput));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(HashingEmbeddingModel::new("bad", 0, 16).is_err());
    }
}
