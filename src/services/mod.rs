mod batch;
mod chunker;
mod embedding;
mod generation;
mod ingest;
mod rag;
mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::embed_chunks;
pub use chunker::TextChunker;
pub use embedding::{EmbeddingProvider, OllamaEmbedder, OnnxEmbedder, create_embedder};
pub use generation::{GenerationProvider, OllamaGenerator};
pub use ingest::{IngestEvent, IngestPipeline, IngestReport, IngestRequest, clear_collection};
pub use rag::{
    CONTEXT_DELIMITER, RagPipeline, Retrieval, RetrievalTarget, build_prompt, merge_hits,
};
pub use vector_store::{
    CollectionInfo, MemoryBackend, QdrantBackend, VectorStore, check_dimensions, open_store,
    open_stores, readiness_policy, wait_until_ready,
};
