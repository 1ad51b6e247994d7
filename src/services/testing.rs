//! Deterministic providers for pipeline tests.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{EmbeddingError, GenerationError};
use crate::services::embedding::normalize;
use crate::services::{EmbeddingProvider, GenerationProvider};

/// Hashes character trigrams into a fixed number of buckets.
///
/// Identical texts map to identical unit vectors, so a chunk searched by its
/// own text scores 1.0 under cosine.
pub struct HashEmbedder {
    pub dimension: usize,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(8)
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        let mut v = vec![0f32; self.dimension];
        for window in chars.windows(3.min(chars.len()).max(1)) {
            let mut h: usize = 17;
            for c in window {
                h = h.wrapping_mul(31).wrapping_add(*c as usize);
            }
            v[h % self.dimension] += 1.0;
        }
        normalize(&v)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::ConnectionError("connection refused".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hash-trigram"
    }
}

/// Replays a fixed list of fragments and records every prompt it receives.
pub struct ScriptedGenerator {
    pub fragments: Vec<Result<String, ()>>,
    pub streaming: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            streaming: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Emits `fragments`, then fails mid-stream.
    pub fn failing_after(fragments: &[&str]) -> Self {
        let mut generator = Self::new(fragments);
        generator.fragments.push(Err(()));
        generator
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn items(&self) -> Vec<Result<String, GenerationError>> {
        self.fragments
            .iter()
            .map(|f| {
                f.clone().map_err(|_| {
                    GenerationError::MalformedResponse("unexpected token at line 3".to_string())
                })
            })
            .collect()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.items().into_iter().collect()
    }

    async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, GenerationError>>, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(stream::iter(self.items()).boxed())
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn url(&self) -> &str {
        "scripted://"
    }
}
