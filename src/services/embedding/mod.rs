//! Embedding providers.
//!
//! Ingestion and querying must use the same provider and model; vectors from
//! different models live in unrelated spaces and their distances mean nothing.

mod ollama;
mod onnx;

pub use ollama::OllamaEmbedder;
pub use onnx::OnnxEmbedder;
pub(crate) use onnx::normalize;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProviderKind};

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed several texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Length of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Model identifier, for status output.
    fn model(&self) -> &str;
}

/// Build the configured provider once; callers share it through the `Arc`.
pub fn create_embedder(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::Onnx => Ok(Arc::new(OnnxEmbedder::load(config)?)),
        EmbeddingProviderKind::Ollama => Ok(Arc::new(OllamaEmbedder::new(config)?)),
    }
}
