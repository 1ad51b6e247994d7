mod config;
mod conversation;
mod document;
mod search;

pub use config::{
    CollectionTarget, Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_FILE_PATTERN, DEFAULT_GENERATION_MODEL, DEFAULT_OLLAMA_URL,
    DEFAULT_QDRANT_URL, EmbeddingConfig, EmbeddingProviderKind, GenerationConfig, IndexingConfig,
    OutputConfig, ResolvedConfig, RetrievalConfig, TargetConfig, VectorDriver, VectorStoreConfig,
    model_dir_name,
};
pub use conversation::{Conversation, Message, Role};
pub use document::{CollectionRecord, Document, DocumentChunk, DocumentMetadata, SOURCE_KEY};
pub use search::{Answer, AnswerTimings, Metric, OutputFormat, SearchHit};
