use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_FILE_PATTERN: &str = "**/*.txt";

const APP_DIR: &str = "ragchat";
const PROJECT_DIR: &str = ".ragchat";

/// Environment variables recognised on top of the config files.
pub const ENV_QDRANT_URL: &str = "QDRANT_URL";
pub const ENV_COLLECTION_NAME: &str = "COLLECTION_NAME";
pub const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
pub const ENV_OLLAMA_MODEL: &str = "OLLAMA_MODEL";
pub const ENV_EMBEDDING_PROVIDER: &str = "RAGCHAT_EMBEDDING_PROVIDER";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// A loaded configuration plus the files it came from.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub config: Config,
    pub project_path: Option<PathBuf>,
    pub global_path: Option<PathBuf>,
}

impl Config {
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
    }

    pub fn project_path() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .map(|p| p.join(PROJECT_DIR).join("config.toml"))
    }

    /// Default location of downloaded ONNX models.
    pub fn models_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join(APP_DIR).join("models"))
    }

    /// Load the project config if present, else the global one, else defaults,
    /// then apply environment overrides.
    pub fn load() -> Result<ResolvedConfig, ConfigError> {
        let mut resolved = ResolvedConfig::default();

        let project = Self::project_path().filter(|p| p.exists());
        let global = Self::global_path().filter(|p| p.exists());

        resolved.config = match (&project, &global) {
            (Some(path), _) | (None, Some(path)) => Self::load_from(path)?,
            (None, None) => Self::default(),
        };
        resolved.project_path = project;
        resolved.global_path = global;

        resolved
            .config
            .apply_env(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
        resolved.config.validate()?;
        Ok(resolved)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from environment-style variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_QDRANT_URL) {
            self.vector_store.url = url;
        }
        if let Some(collection) = lookup(ENV_COLLECTION_NAME) {
            self.vector_store.collection = collection;
        }
        if let Some(url) = lookup(ENV_OLLAMA_URL) {
            self.generation.url.clone_from(&url);
            if self.embedding.provider == EmbeddingProviderKind::Ollama {
                self.embedding.url = url;
            }
        }
        if let Some(model) = lookup(ENV_OLLAMA_MODEL) {
            self.generation.model = model;
        }
        if let Some(provider) = lookup(ENV_EMBEDDING_PROVIDER)
            && let Ok(provider) = provider.parse()
        {
            self.embedding.provider = provider;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexing.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "indexing.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.indexing.chunk_overlap >= self.indexing.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "indexing.chunk_overlap ({}) must be smaller than indexing.chunk_size ({})",
                self.indexing.chunk_overlap, self.indexing.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 || self.retrieval.merge_limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k and retrieval.merge_limit must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if let Some(template) = &self.retrieval.prompt_template
            && !(template.contains("{context}") && template.contains("{question}"))
        {
            return Err(ConfigError::ValidationError(
                "retrieval.prompt_template must contain {context} and {question}".to_string(),
            ));
        }
        if self.vector_store.connect_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "vector_store.connect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// In-process ONNX Runtime inference.
    #[default]
    Onnx,
    /// Ollama `/api/embed` endpoint.
    Ollama,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "onnx" => Ok(EmbeddingProviderKind::Onnx),
            "ollama" => Ok(EmbeddingProviderKind::Ollama),
            _ => Err(format!("unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderKind::Onnx => write!(f, "onnx"),
            EmbeddingProviderKind::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Model identifier. For `onnx` this names the model directory, for
    /// `ollama` the model tag.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Explicit ONNX model directory (`model.onnx` + `tokenizer.json`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    /// Directory holding the ONNX model files.
    pub fn model_dir(&self) -> Option<PathBuf> {
        self.model_path.clone().or_else(|| {
            Config::models_dir().map(|dir| dir.join(model_dir_name(&self.model)))
        })
    }
}

/// `org/name` model ids map to `org--name` directory names.
pub fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_max_tokens() -> u32 {
    128
}

fn default_batch_size() -> u32 {
    32
}

fn default_embedding_timeout() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            model_path: None,
            url: default_ollama_url(),
            dimension: default_embedding_dimension(),
            max_tokens: default_max_tokens(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    /// Process-local index; contents vanish when the process exits.
    Memory,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_interval")]
    pub connect_interval_secs: u64,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_connect_attempts() -> u32 {
    15
}

fn default_connect_interval() -> u64 {
    2
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            collection: default_collection(),
            api_key: None,
            connect_attempts: default_connect_attempts(),
            connect_interval_secs: default_connect_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default = "default_stream")]
    pub stream: bool,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_stream() -> bool {
    true
}

fn default_generation_timeout() -> u64 {
    300
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_generation_model(),
            temperature: 0.0,
            seed: None,
            stream: default_stream(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Characters shared by adjacent chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,
}

fn default_file_pattern() -> String {
    DEFAULT_FILE_PATTERN.to_string()
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_chunk_size() -> u32 {
    1000
}

fn default_chunk_overlap() -> u32 {
    100
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            file_pattern: default_file_pattern(),
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// One collection to search, optionally on another Qdrant server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A fully resolved retrieval target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    pub url: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Nearest records requested per collection.
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Records kept after merging several collections.
    #[serde(default = "default_merge_limit")]
    pub merge_limit: u32,

    /// Collections to query. Empty means `vector_store.collection`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,

    /// Custom grounding prompt with `{context}` and `{question}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl RetrievalConfig {
    pub fn resolved_targets(&self, store: &VectorStoreConfig) -> Vec<CollectionTarget> {
        if self.targets.is_empty() {
            return vec![CollectionTarget {
                url: store.url.clone(),
                collection: store.collection.clone(),
            }];
        }
        self.targets
            .iter()
            .map(|t| CollectionTarget {
                url: t.url.clone().unwrap_or_else(|| store.url.clone()),
                collection: t.collection.clone(),
            })
            .collect()
    }
}

fn default_top_k() -> u32 {
    3
}

fn default_merge_limit() -> u32 {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            merge_limit: default_merge_limit(),
            targets: Vec::new(),
            prompt_template: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub default_format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.vector_store.url, DEFAULT_QDRANT_URL);
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
        assert_eq!(config.generation.model, DEFAULT_GENERATION_MODEL);
        assert_eq!(config.indexing.chunk_size, 1000);
        assert_eq!(config.indexing.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.vector_store.connect_attempts, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [vector_store]
            collection = "datenbank_eins"

            [generation]
            model = "mistral"
            "#,
        )
        .unwrap();

        assert_eq!(config.vector_store.collection, "datenbank_eins");
        assert_eq!(config.vector_store.url, DEFAULT_QDRANT_URL);
        assert_eq!(config.generation.model, "mistral");
        assert!(config.generation.stream);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_QDRANT_URL, "http://vdb_1:6334"),
            (ENV_COLLECTION_NAME, "datenbank_zwei"),
            (ENV_OLLAMA_URL, "http://host.docker.internal:11434"),
            (ENV_OLLAMA_MODEL, "llama3.2"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.vector_store.url, "http://vdb_1:6334");
        assert_eq!(config.vector_store.collection, "datenbank_zwei");
        assert_eq!(config.generation.url, "http://host.docker.internal:11434");
        assert_eq!(config.generation.model, "llama3.2");
        // onnx embeddings do not use the Ollama URL
        assert_eq!(config.embedding.url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_validate_rejects_overlap_larger_than_chunk() {
        let mut config = Config::default();
        config.indexing.chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_prompt_template() {
        let mut config = Config::default();
        config.retrieval.prompt_template = Some("Answer: {question}".to_string());
        assert!(config.validate().is_err());

        config.retrieval.prompt_template = Some("{context}\n\nQ: {question}".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolved_targets() {
        let store = VectorStoreConfig::default();
        let mut retrieval = RetrievalConfig::default();
        assert_eq!(
            retrieval.resolved_targets(&store),
            vec![CollectionTarget {
                url: DEFAULT_QDRANT_URL.to_string(),
                collection: DEFAULT_COLLECTION.to_string(),
            }]
        );

        retrieval.targets = vec![
            TargetConfig {
                collection: "datenbank_eins".to_string(),
                url: Some("http://vdb_1:6334".to_string()),
            },
            TargetConfig {
                collection: "datenbank_zwei".to_string(),
                url: None,
            },
        ];
        let targets = retrieval.resolved_targets(&store);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].url, "http://vdb_1:6334");
        assert_eq!(targets[1].url, DEFAULT_QDRANT_URL);
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.retrieval.top_k = 5;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 5);
    }

    #[test]
    fn test_model_dir_name() {
        assert_eq!(
            model_dir_name(DEFAULT_EMBEDDING_MODEL),
            "sentence-transformers--paraphrase-multilingual-MiniLM-L12-v2"
        );
    }
}
