use anyhow::Result;
use async_trait::async_trait;

use crate::error::ProviderError;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embed: Send + Sync {
    /// One vector per input, in input order.
    async fn generate(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    async fn generate_single(&self, text: &str) -> Result<Vec<f32>> {
        self.generate(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("embeddings", "no embedding returned").into())
    }
}
