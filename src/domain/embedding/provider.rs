//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

/// Trait for text embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Embed a batch of texts; the result has one vector per input, in input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Model identifier recorded alongside the vectors it produced
    fn model(&self) -> &str;

    /// Vector dimensionality, when known up front
    fn dimensions(&self) -> Option<usize>;

    /// Embed a single text
    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, DomainError> {
        self.embed(&[input.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DomainError::provider(self.provider_name(), "Embedding response was empty")
            })
    }
}
