//! Mean aggregation of chunk vectors.

use super::types::{AggregationError, ChunkVector, DocumentVector};

/// Average chunk vectors coordinate by coordinate.
///
/// Vectors are expected in chunk-index order; sums are accumulated in `f64` in that order so the
/// result is deterministic for a given input.
pub fn aggregate(vectors: &[ChunkVector]) -> Result<DocumentVector, AggregationError> {
    let first = vectors.first().ok_or(AggregationError::EmptyAggregation)?;
    let expected = first.values.len();

    let mut sums = vec![0.0_f64; expected];
    for vector in vectors {
        if vector.values.len() != expected {
            return Err(AggregationError::DimensionMismatch {
                expected,
                actual: vector.values.len(),
                index: vector.index,
            });
        }
        for (sum, value) in sums.iter_mut().zip(&vector.values) {
            *sum += f64::from(*value);
        }
    }

    let count = vectors.len() as f64;
    Ok(DocumentVector {
        values: sums.into_iter().map(|sum| (sum / count) as f32).collect(),
    })
}
