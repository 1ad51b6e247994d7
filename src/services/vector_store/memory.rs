//! In-process vector index.
//!
//! Exact nearest-neighbour search over every stored record. Used for
//! offline sessions and as the store behind pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CollectionInfo, VectorStore, check_dimensions};
use crate::error::VectorStoreError;
use crate::models::{CollectionRecord, Metric, SearchHit, VectorDriver};

const MEMORY_URL: &str = "memory://";

#[derive(Debug)]
struct MemoryCollection {
    dimension: u64,
    metric: Metric,
    records: Vec<CollectionRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        Metric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Metric::Euclid => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

#[async_trait]
impl VectorStore for MemoryBackend {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn collection_info(
        &self,
        name: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| CollectionInfo {
            points_count: c.records.len() as u64,
            dimension: c.dimension,
            metric: c.metric,
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: Metric,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(VectorStoreError::CollectionError(format!(
                "collection '{}' already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                metric,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn insert(
        &self,
        name: &str,
        records: Vec<CollectionRecord>,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        check_dimensions(name, collection.dimension, &records)?;

        for record in records {
            match collection.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => collection.records.push(record),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: u64,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        if vector.len() as u64 != collection.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: collection.dimension,
                actual: vector.len() as u64,
            });
        }

        let metric = collection.metric;
        let mut scored: Vec<(f32, &CollectionRecord)> = collection
            .records
            .iter()
            .map(|r| (score(metric, vector, &r.vector), r))
            .collect();
        scored.sort_by(|a, b| metric.compare(a.0, b.0));

        Ok(scored
            .into_iter()
            .take(k as usize)
            .map(|(score, r)| SearchHit {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score,
                collection: name.to_string(),
            })
            .collect())
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Memory
    }

    fn url(&self) -> &str {
        MEMORY_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SOURCE_KEY;
    use std::collections::BTreeMap;

    fn record(id: &str, text: &str, vector: Vec<f32>) -> CollectionRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), format!("/data/{id}.txt"));
        CollectionRecord {
            id: id.to_string(),
            text: text.to_string(),
            vector,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_insert_then_search_finds_exact_match() {
        let store = MemoryBackend::new();
        store.create_collection("docs", 3, Metric::Cosine).await.unwrap();
        store
            .insert(
                "docs",
                vec![
                    record("a", "alpha", vec![1.0, 0.0, 0.0]),
                    record("b", "beta", vec![0.0, 1.0, 0.0]),
                    record("c", "gamma", vec![0.7, 0.7, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("docs", &[0.0, 1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "beta");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].text, "gamma");
        assert_eq!(hits[0].source(), "/data/b.txt");
        assert_eq!(store.count("docs").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_euclid_orders_ascending() {
        let store = MemoryBackend::new();
        store.create_collection("docs", 2, Metric::Euclid).await.unwrap();
        store
            .insert(
                "docs",
                vec![
                    record("far", "far", vec![5.0, 5.0]),
                    record("near", "near", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("docs", &[1.0, 1.0], 5).await.unwrap();
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].score < hits[1].score);
    }

    #[tokio::test]
    async fn test_reset_empties_collection() {
        let store = MemoryBackend::new();
        store.create_collection("docs", 2, Metric::Cosine).await.unwrap();
        store
            .insert("docs", vec![record("a", "alpha", vec![1.0, 0.0])])
            .await
            .unwrap();

        store.reset_collection("docs", 2, Metric::Cosine).await.unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 0);
        assert!(store.search("docs", &[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = MemoryBackend::new();
        store.create_collection("docs", 3, Metric::Cosine).await.unwrap();

        let err = store
            .insert("docs", vec![record("a", "alpha", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = MemoryBackend::new();
        store.create_collection("docs", 2, Metric::Cosine).await.unwrap();
        store
            .insert("docs", vec![record("a", "old", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .insert("docs", vec![record("a", "new", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.search("docs", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = MemoryBackend::new();
        assert!(!store.collection_exists("docs").await.unwrap());
        assert_eq!(store.count("docs").await.unwrap(), 0);
        assert!(matches!(
            store.search("docs", &[1.0], 1).await.unwrap_err(),
            VectorStoreError::CollectionNotFound(_)
        ));
        store.delete_collection("docs").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let store = MemoryBackend::new();
        store.create_collection("docs", 2, Metric::Cosine).await.unwrap();
        assert!(store.create_collection("docs", 2, Metric::Cosine).await.is_err());
    }
}
