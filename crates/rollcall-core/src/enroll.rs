//! Enrollment averaging.
//!
//! Registration captures several embedding samples of the same face and
//! stores their component-wise mean as the identity's representative
//! vector.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no embedding samples collected")]
    NoSamples,
    #[error("sample dimensionality mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Average a set of embedding samples into one representative vector.
///
/// A single sample is returned unchanged. All samples must share the
/// dimensionality of the first.
pub fn average_embeddings(samples: &[Embedding]) -> Result<Embedding, EnrollError> {
    let first = samples.first().ok_or(EnrollError::NoSamples)?;
    let dim = first.len();

    let mut sums = vec![0.0f32; dim];
    for sample in samples {
        if sample.len() != dim {
            return Err(EnrollError::DimensionMismatch {
                expected: dim,
                got: sample.len(),
            });
        }
        for (acc, v) in sums.iter_mut().zip(sample.values.iter()) {
            *acc += v;
        }
    }

    let n = samples.len() as f32;
    for acc in &mut sums {
        *acc /= n;
    }

    Ok(Embedding::new(sums))
}
