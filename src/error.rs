//! Error types for ragchat.

use thiserror::Error;

use crate::models::Metric;
use crate::utils::retry::Retryable;

/// Coarse classification shared by every domain error.
///
/// The interactive surface uses it to choose a message; the retry layer uses
/// it to decide whether a connectivity wait is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Vector store, embedding server or generation endpoint unreachable.
    ServiceUnavailable,
    /// No documents to ingest, or an empty question.
    EmptyInput,
    /// Embedding dimension does not match the collection configuration.
    DimensionMismatch,
    /// A provider answered with something we could not decode.
    MalformedResponse,
    /// Anything else (I/O, configuration, model loading).
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            ErrorKind::EmptyInput => write!(f, "empty input"),
            ErrorKind::DimensionMismatch => write!(f, "dimension mismatch"),
            ErrorKind::MalformedResponse => write!(f, "malformed response"),
            ErrorKind::Other => write!(f, "error"),
        }
    }
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding model error: {0}")]
    ModelError(String),

    #[error("embedding timeout")]
    Timeout,
}

impl EmbeddingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => {
                ErrorKind::ServiceUnavailable
            }
            EmbeddingError::RequestError(e) if e.is_connect() || e.is_timeout() => {
                ErrorKind::ServiceUnavailable
            }
            EmbeddingError::InvalidResponse(_) => ErrorKind::MalformedResponse,
            EmbeddingError::ServerError(_)
            | EmbeddingError::RequestError(_)
            | EmbeddingError::ModelError(_) => ErrorKind::Other,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("vector store not ready after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error(
        "embedding dimension {actual} does not match collection '{collection}' dimension {expected}"
    )]
    DimensionMismatch {
        collection: String,
        expected: u64,
        actual: u64,
    },

    #[error("insert error: {0}")]
    InsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("delete error: {0}")]
    DeleteError(String),
}

impl VectorStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VectorStoreError::ConnectionError(_) | VectorStoreError::Unavailable { .. } => {
                ErrorKind::ServiceUnavailable
            }
            VectorStoreError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::InsertError(msg)
            | VectorStoreError::SearchError(msg)
            | VectorStoreError::DeleteError(msg)
                if looks_unreachable(msg) =>
            {
                ErrorKind::ServiceUnavailable
            }
            _ => ErrorKind::Other,
        }
    }
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ServiceUnavailable
    }
}

fn looks_unreachable(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("timeout")
        || msg.contains("connection")
        || msg.contains("unavailable")
        || msg.contains("transport error")
}

/// Errors related to the generation endpoint.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to reach generation endpoint: {0}")]
    ConnectionError(String),

    #[error("generation endpoint error: {0}")]
    ServerError(String),

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("generation timeout")]
    Timeout,
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::ConnectionError(_) | GenerationError::Timeout => {
                ErrorKind::ServiceUnavailable
            }
            GenerationError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            GenerationError::ServerError(_) => ErrorKind::Other,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_connect() || e.is_request() {
            GenerationError::ConnectionError(e.to_string())
        } else if e.is_decode() {
            GenerationError::MalformedResponse(e.to_string())
        } else {
            GenerationError::ServerError(e.to_string())
        }
    }
}

/// Errors related to ingestion runs.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no documents matching '{pattern}' found in {directory}")]
    NoDocuments { directory: String, pattern: String },

    #[error("invalid file pattern '{0}'")]
    InvalidPattern(String),

    #[error("directory walk error: {0}")]
    WalkError(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::NoDocuments { .. } => ErrorKind::EmptyInput,
            IngestError::Embedding(e) => e.kind(),
            IngestError::VectorStore(e) => e.kind(),
            IngestError::InvalidPattern(_) | IngestError::WalkError(_) => ErrorKind::Other,
        }
    }
}

/// Errors related to answering a question.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("no retrieval targets configured")]
    NoTargets,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error(
        "collections '{first}' ({first_metric}) and '{second}' ({second_metric}) rank scores in opposite directions"
    )]
    MixedMetrics {
        first: String,
        first_metric: Metric,
        second: String,
        second_metric: Metric,
    },

    #[error("answer abandoned")]
    Abandoned,
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::EmptyQuestion => ErrorKind::EmptyInput,
            QueryError::Embedding(e) => e.kind(),
            QueryError::VectorStore(e) => e.kind(),
            QueryError::Generation(e) => e.kind(),
            QueryError::NoTargets | QueryError::MixedMetrics { .. } | QueryError::Abandoned => {
                ErrorKind::Other
            }
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Classify an error chain by its first domain error.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<QueryError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<IngestError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<VectorStoreError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<EmbeddingError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<GenerationError>() {
            return e.kind();
        }
    }
    ErrorKind::Other
}
