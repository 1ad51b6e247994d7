//! Vector store abstraction layer.
//!
//! A trait over the Qdrant service and an in-process index, so the ingestion
//! and query pipelines never depend on a concrete backend.

mod memory;
mod qdrant;

pub use memory::MemoryBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::VectorStoreError;
use crate::models::{CollectionRecord, Metric, SearchHit, VectorDriver, VectorStoreConfig};
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

/// What a backend reports about a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub dimension: u64,
    pub metric: Metric,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check that the store is reachable.
    async fn health_check(&self) -> Result<(), VectorStoreError>;

    /// Describe a collection, or `None` if it does not exist.
    async fn collection_info(&self, name: &str)
    -> Result<Option<CollectionInfo>, VectorStoreError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        Ok(self.collection_info(name).await?.is_some())
    }

    /// Create a collection. Fails if it already exists.
    async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: Metric,
    ) -> Result<(), VectorStoreError>;

    /// Drop a collection and everything in it. Missing collections are ignored.
    async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    /// Drop and recreate a collection empty.
    async fn reset_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: Metric,
    ) -> Result<(), VectorStoreError> {
        if self.collection_exists(name).await? {
            self.delete_collection(name).await?;
        }
        self.create_collection(name, dimension, metric).await
    }

    /// Insert records. Every vector must match the collection dimension.
    async fn insert(
        &self,
        name: &str,
        records: Vec<CollectionRecord>,
    ) -> Result<(), VectorStoreError>;

    /// The `k` records closest to `vector`, best first.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: u64,
    ) -> Result<Vec<SearchHit>, VectorStoreError>;

    /// Number of records in a collection; zero when it does not exist.
    async fn count(&self, name: &str) -> Result<u64, VectorStoreError> {
        Ok(self
            .collection_info(name)
            .await?
            .map_or(0, |info| info.points_count))
    }

    fn driver(&self) -> VectorDriver;

    fn url(&self) -> &str;
}

/// Reject any record whose vector length differs from the collection's.
pub fn check_dimensions(
    collection: &str,
    expected: u64,
    records: &[CollectionRecord],
) -> Result<(), VectorStoreError> {
    match records.iter().find(|r| r.vector.len() as u64 != expected) {
        Some(record) => Err(VectorStoreError::DimensionMismatch {
            collection: collection.to_string(),
            expected,
            actual: record.vector.len() as u64,
        }),
        None => Ok(()),
    }
}

/// Open one backend per distinct URL.
///
/// The memory driver shares a single index across every URL so that all
/// targets of a session see the same data.
pub fn open_stores<'a>(
    config: &VectorStoreConfig,
    urls: impl IntoIterator<Item = &'a str>,
) -> Result<HashMap<String, Arc<dyn VectorStore>>, VectorStoreError> {
    let mut stores: HashMap<String, Arc<dyn VectorStore>> = HashMap::new();
    let shared_memory: Arc<dyn VectorStore> = Arc::new(MemoryBackend::new());

    for url in urls {
        if stores.contains_key(url) {
            continue;
        }
        let store: Arc<dyn VectorStore> = match config.driver {
            VectorDriver::Qdrant => Arc::new(QdrantBackend::new(url, config.api_key.as_deref())?),
            VectorDriver::Memory => Arc::clone(&shared_memory),
        };
        stores.insert(url.to_string(), store);
    }

    Ok(stores)
}

/// Open the backend for the configured default URL.
pub fn open_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    let mut stores = open_stores(config, [config.url.as_str()])?;
    stores
        .remove(&config.url)
        .ok_or_else(|| VectorStoreError::ConnectionError(config.url.clone()))
}

/// Retry policy for waiting on the store at startup.
pub fn readiness_policy(config: &VectorStoreConfig) -> RetryConfig {
    RetryConfig::fixed(
        config.connect_attempts,
        Duration::from_secs(config.connect_interval_secs),
    )
}

/// Poll the store until it answers a health check or attempts run out.
pub async fn wait_until_ready(
    store: &dyn VectorStore,
    policy: &RetryConfig,
    mut on_retry: impl FnMut(u32, u32),
) -> Result<(), VectorStoreError> {
    let max_attempts = policy.max_attempts;
    let result = with_retry(
        policy,
        || store.health_check(),
        |attempt, _: &VectorStoreError| on_retry(attempt, max_attempts),
    )
    .await;

    match result {
        RetryResult::Success(()) => {
            info!(url = store.url(), "vector store ready");
            Ok(())
        }
        RetryResult::Failed {
            last_error,
            attempts,
        } => Err(VectorStoreError::Unavailable {
            attempts,
            last_error: last_error.to_string(),
        }),
    }
}
