//! Ingestion pipeline: load, chunk, embed, insert.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::models::{IndexingConfig, Metric};
use crate::services::{
    EmbeddingProvider, TextChunker, VectorStore, embed_chunks, wait_until_ready,
};
use crate::sources::LocalSource;
use crate::utils::RetryConfig;

/// One ingestion run.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub directory: PathBuf,
    pub pattern: String,
    pub collection: String,
    /// Keep existing records instead of recreating the collection.
    pub append: bool,
}

/// Progress notifications emitted while ingesting.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    WaitingForStore { attempt: u32, max_attempts: u32 },
    Loaded { documents: usize, chunks: usize },
    BatchEmbedded { embedded: usize, total: usize },
    BatchWritten { written: usize, total: usize },
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub directory: String,
    pub pattern: String,
    pub collection: String,
    pub files_matched: usize,
    pub documents_loaded: usize,
    pub files_skipped: usize,
    pub chunks_written: usize,
    pub recreated: bool,
    pub duration_ms: u64,
}

pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunker: TextChunker,
    max_file_size: u64,
    batch_size: usize,
    readiness: RetryConfig,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        indexing: &IndexingConfig,
        batch_size: usize,
        readiness: RetryConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker: TextChunker::from_config(indexing),
            max_file_size: indexing.max_file_size,
            batch_size: batch_size.max(1),
            readiness,
        }
    }

    /// Ingest every matching file under the request directory.
    ///
    /// Nothing is written when no document could be loaded, and every chunk
    /// is embedded before the target collection is touched, so a failing
    /// embedder leaves existing records in place.
    pub async fn ingest(
        &self,
        request: &IngestRequest,
        mut on_event: impl FnMut(IngestEvent),
    ) -> Result<IngestReport, IngestError> {
        let start = Instant::now();

        let source = LocalSource::new(
            request.directory.clone(),
            &request.pattern,
            self.max_file_size,
        )?;
        let loaded = tokio::task::spawn_blocking(move || source.load())
            .await
            .map_err(|e| IngestError::WalkError(e.to_string()))??;

        if loaded.documents.is_empty() {
            return Err(IngestError::NoDocuments {
                directory: request.directory.display().to_string(),
                pattern: request.pattern.clone(),
            });
        }
        for path in &loaded.skipped {
            warn!(path = %path.display(), "file skipped");
        }

        let chunks: Vec<_> = loaded
            .documents
            .iter()
            .flat_map(|doc| self.chunker.chunk(doc))
            .collect();
        let total = chunks.len();
        on_event(IngestEvent::Loaded {
            documents: loaded.documents.len(),
            chunks: total,
        });

        wait_until_ready(self.store.as_ref(), &self.readiness, |attempt, max_attempts| {
            on_event(IngestEvent::WaitingForStore {
                attempt,
                max_attempts,
            })
        })
        .await?;

        let mut records = Vec::with_capacity(total);
        for batch in chunks.chunks(self.batch_size) {
            records.extend(embed_chunks(self.embedder.as_ref(), batch).await?);
            on_event(IngestEvent::BatchEmbedded {
                embedded: records.len(),
                total,
            });
        }

        let recreated = self.prepare_collection(request).await?;

        let mut written = 0;
        let mut records = records.into_iter();
        loop {
            let batch: Vec<_> = records.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            written += batch.len();
            self.store.insert(&request.collection, batch).await?;
            on_event(IngestEvent::BatchWritten { written, total });
        }

        let report = IngestReport {
            directory: request.directory.display().to_string(),
            pattern: request.pattern.clone(),
            collection: request.collection.clone(),
            files_matched: loaded.files_matched,
            documents_loaded: loaded.documents.len(),
            files_skipped: loaded.skipped.len(),
            chunks_written: written,
            recreated,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            collection = %report.collection,
            documents = report.documents_loaded,
            chunks = report.chunks_written,
            duration_ms = report.duration_ms,
            "ingestion complete"
        );

        Ok(report)
    }

    /// Recreate the target collection, or create it when appending to a
    /// missing one. Returns whether existing records were dropped.
    async fn prepare_collection(&self, request: &IngestRequest) -> Result<bool, IngestError> {
        let dimension = self.embedder.dimension() as u64;
        let exists = self.store.collection_exists(&request.collection).await?;

        if request.append && exists {
            return Ok(false);
        }
        if request.append {
            self.store
                .create_collection(&request.collection, dimension, Metric::Cosine)
                .await?;
            return Ok(false);
        }

        self.store
            .reset_collection(&request.collection, dimension, Metric::Cosine)
            .await?;
        Ok(exists)
    }
}

/// Drop and recreate a collection empty.
pub async fn clear_collection(
    store: &dyn VectorStore,
    collection: &str,
    dimension: usize,
) -> Result<(), IngestError> {
    store
        .reset_collection(collection, dimension as u64, Metric::Cosine)
        .await?;
    info!(collection, "collection cleared");
    Ok(())
}
