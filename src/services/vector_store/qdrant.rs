//! Qdrant vector store backend.
//!
//! Points use the `{ page_content, metadata }` payload layout, which keeps
//! collections interchangeable with LangChain-style loaders.

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{CollectionInfo, VectorStore, check_dimensions};
use crate::error::VectorStoreError;
use crate::models::{CollectionRecord, Metric, SearchHit, VectorDriver};

const CONTENT_KEY: &str = "page_content";
const METADATA_KEY: &str = "metadata";

pub struct QdrantBackend {
    client: Qdrant,
    url: String,
}

impl QdrantBackend {
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(url);

        if let Some(api_key) = api_key {
            builder = builder.api_key(api_key.to_string());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    fn build_payload(record: &CollectionRecord) -> Result<Payload, VectorStoreError> {
        let json = serde_json::json!({
            CONTENT_KEY: record.text,
            METADATA_KEY: record.metadata,
        });
        Payload::try_from(json).map_err(|e| VectorStoreError::InsertError(e.to_string()))
    }

    fn parse_hit(collection: &str, point: qdrant_client::qdrant::ScoredPoint) -> SearchHit {
        let payload = point.payload;

        let text = payload
            .get(CONTENT_KEY)
            .and_then(value_to_string)
            .unwrap_or_default();

        let metadata: BTreeMap<String, String> = match payload.get(METADATA_KEY).map(|v| &v.kind)
        {
            Some(Some(Kind::StructValue(s))) => s
                .fields
                .iter()
                .filter_map(|(k, v)| value_to_string(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let id = match point.id.and_then(|id| id.point_id_options) {
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid,
            Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
            None => String::new(),
        };

        SearchHit {
            id,
            text,
            metadata,
            score: point.score,
            collection: collection.to_string(),
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        Some(Kind::IntegerValue(n)) => Some(n.to_string()),
        Some(Kind::DoubleValue(n)) => Some(n.to_string()),
        Some(Kind::BoolValue(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn to_distance(metric: Metric) -> Distance {
    match metric {
        Metric::Cosine => Distance::Cosine,
        Metric::Dot => Distance::Dot,
        Metric::Euclid => Distance::Euclid,
    }
}

fn from_distance(distance: i32) -> Metric {
    match Distance::try_from(distance) {
        Ok(Distance::Dot) => Metric::Dot,
        Ok(Distance::Euclid | Distance::Manhattan) => Metric::Euclid,
        _ => Metric::Cosine,
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
    }

    async fn collection_info(
        &self,
        name: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        if !self.collection_exists(name).await? {
            return Ok(None);
        }

        let response = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let Some(info) = response.result else {
            return Ok(None);
        };

        let params = info
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        let (dimension, metric) = match params {
            Some(VectorsConfigKind::Params(p)) => (p.size, from_distance(p.distance)),
            _ => {
                return Err(VectorStoreError::CollectionError(format!(
                    "collection '{}' has no single unnamed vector configuration",
                    name
                )));
            }
        };

        Ok(Some(CollectionInfo {
            points_count: info.points_count.unwrap_or(0),
            dimension,
            metric,
        }))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: u64,
        metric: Metric,
    ) -> Result<(), VectorStoreError> {
        let create = CreateCollectionBuilder::new(name)
            .vectors_config(VectorParamsBuilder::new(dimension, to_distance(metric)));

        self.client
            .create_collection(create)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        debug!(collection = name, dimension, %metric, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        if !self.collection_exists(name).await? {
            return Ok(());
        }

        self.client
            .delete_collection(name)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        debug!(collection = name, "deleted collection");
        Ok(())
    }

    async fn insert(
        &self,
        name: &str,
        records: Vec<CollectionRecord>,
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let info = self
            .collection_info(name)
            .await?
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        check_dimensions(name, info.dimension, &records)?;

        let points = records
            .into_iter()
            .map(|record| {
                let payload = Self::build_payload(&record)?;
                Ok(PointStruct::new(record.id, record.vector, payload))
            })
            .collect::<Result<Vec<PointStruct>, VectorStoreError>>()?;

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| VectorStoreError::InsertError(e.to_string()))?;

        debug!(collection = name, count, "inserted points");
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: u64,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        if !self.collection_exists(name).await? {
            return Err(VectorStoreError::CollectionNotFound(name.to_string()));
        }

        let request = SearchPointsBuilder::new(name, vector.to_vec(), k).with_payload(true);

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| Self::parse_hit(name, point))
            .collect())
    }

    async fn count(&self, name: &str) -> Result<u64, VectorStoreError> {
        if !self.collection_exists(name).await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(response.result.map_or(0, |r| r.count))
    }

    fn driver(&self) -> VectorDriver {
        VectorDriver::Qdrant
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{PointId, ScoredPoint};

    #[test]
    fn test_payload_layout() {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "/data/db1/a.pdf".to_string());
        let record = CollectionRecord {
            id: "7b0c1e9a-2f5e-5c1d-9a55-0d6f8a3c1b2e".to_string(),
            text: "Urlaub wird im Portal beantragt.".to_string(),
            vector: vec![0.1, 0.2],
            metadata,
        };

        let payload: HashMap<String, Value> = QdrantBackend::build_payload(&record).unwrap().into();
        assert_eq!(
            payload.get(CONTENT_KEY).and_then(value_to_string).as_deref(),
            Some("Urlaub wird im Portal beantragt.")
        );
        assert!(matches!(
            payload.get(METADATA_KEY).map(|v| &v.kind),
            Some(Some(Kind::StructValue(_)))
        ));
    }

    #[test]
    fn test_parse_hit() {
        let record = CollectionRecord {
            id: "x".to_string(),
            text: "chunk text".to_string(),
            vector: Vec::new(),
            metadata: [("source".to_string(), "/data/a.txt".to_string())]
                .into_iter()
                .collect(),
        };
        let payload: HashMap<String, Value> = QdrantBackend::build_payload(&record).unwrap().into();

        let point = ScoredPoint {
            id: Some(PointId::from(42u64)),
            payload,
            score: 0.87,
            ..Default::default()
        };

        let hit = QdrantBackend::parse_hit("datenbank_eins", point);
        assert_eq!(hit.id, "42");
        assert_eq!(hit.text, "chunk text");
        assert_eq!(hit.source(), "/data/a.txt");
        assert_eq!(hit.collection, "datenbank_eins");
        assert!((hit.score - 0.87).abs() < f32::EPSILON);
    }

    #[test]
    fn test_distance_mapping() {
        assert_eq!(from_distance(Distance::Cosine as i32), Metric::Cosine);
        assert_eq!(from_distance(Distance::Dot as i32), Metric::Dot);
        assert_eq!(from_distance(Distance::Manhattan as i32), Metric::Euclid);
        assert_eq!(to_distance(Metric::Euclid), Distance::Euclid);
    }
}
