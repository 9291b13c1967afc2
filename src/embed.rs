//! Deterministic feature-hashing embedder and vector similarity helpers.
//!
//! `HashingEmbedder` is not a semantic model; it maps lowercase words onto a fixed
//! number of signed buckets so lexical overlap turns into cosine similarity. It is the
//! default for tests and offline use. Production deployments plug a real model in
//! through [`TextEmbedder`].

use unicode_segmentation::UnicodeSegmentation;

use crate::constants::DEFAULT_HASHING_DIMENSION;
use crate::error::{ClaimtrailError, Result};
use crate::types::TextEmbedder;

#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(ClaimtrailError::config("embedding dimension must be positive"));
        }
        Ok(Self { dimension })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(index) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

impl TextEmbedder for HashingEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.unicode_words() {
            let (bucket, sign) = self.bucket(&word.to_lowercase());
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }
}

/// Scale `vector` to unit length; zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity in `[-1, 1]`; 0 when either side has no magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Embed `texts` in batches of `batch_size`, checking the returned dimension.
pub(crate) fn embed_in_batches(
    embedder: &dyn TextEmbedder,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let expected = embedder.embedding_dimension();
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = embedder.embed_chunks(batch)?;
        if vectors.len() != batch.len() {
            return Err(ClaimtrailError::Embedding {
                reason: format!("expected {} vectors, got {}", batch.len(), vectors.len()),
            });
        }
        for vector in vectors {
            if vector.len() != expected {
                return Err(ClaimtrailError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            out.push(vector);
        }
    }
    Ok(out)
}
