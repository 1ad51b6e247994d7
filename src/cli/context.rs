//! Providers built once per process and shared by the command handlers.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Config, RetrievalConfig};
use crate::services::{
    EmbeddingProvider, IngestPipeline, OllamaGenerator, RagPipeline, RetrievalTarget, VectorStore,
    create_embedder, open_stores, readiness_policy,
};

pub struct AppContext {
    pub config: Config,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<OllamaGenerator>,
    /// One store per distinct URL; the configured default URL is always present.
    pub stores: HashMap<String, Arc<dyn VectorStore>>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let embedder =
            create_embedder(&config.embedding).context("failed to initialise embedding provider")?;
        let generator = Arc::new(
            OllamaGenerator::new(&config.generation)
                .context("failed to initialise generation client")?,
        );

        let targets = config.retrieval.resolved_targets(&config.vector_store);
        let urls = std::iter::once(config.vector_store.url.as_str())
            .chain(targets.iter().map(|t| t.url.as_str()));
        let stores = open_stores(&config.vector_store, urls).context("failed to open vector store")?;

        Ok(Self {
            config,
            embedder,
            generator,
            stores,
        })
    }

    /// Store at the configured default URL, used for ingestion and clearing.
    pub fn default_store(&self) -> Result<Arc<dyn VectorStore>> {
        self.stores
            .get(&self.config.vector_store.url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no store for {}", self.config.vector_store.url))
    }

    pub fn rag_pipeline(&self) -> Result<RagPipeline> {
        self.rag_pipeline_with(&self.config.retrieval)
    }

    pub fn rag_pipeline_with(&self, retrieval: &RetrievalConfig) -> Result<RagPipeline> {
        let targets = retrieval
            .resolved_targets(&self.config.vector_store)
            .into_iter()
            .map(|target| {
                let store = self
                    .stores
                    .get(&target.url)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no store for {}", target.url))?;
                Ok(RetrievalTarget {
                    store,
                    collection: target.collection,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RagPipeline::new(
            Arc::clone(&self.embedder),
            self.generator.clone(),
            targets,
            retrieval,
        ))
    }

    pub fn ingest_pipeline(&self) -> Result<IngestPipeline> {
        Ok(IngestPipeline::new(
            Arc::clone(&self.embedder),
            self.default_store()?,
            &self.config.indexing,
            self.config.embedding.batch_size as usize,
            readiness_policy(&self.config.vector_store),
        ))
    }
}
