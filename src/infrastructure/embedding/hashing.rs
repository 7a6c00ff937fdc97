//! Offline embedder based on signed feature hashing

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

pub const HASHING_MODEL: &str = "hashing-v1";

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions` buckets with a
/// sign taken from the same digest; the vector is L2-normalized. Texts sharing vocabulary
/// land close together, which is enough for local runs and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn model(&self) -> &str {
        HASHING_MODEL
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }
}
