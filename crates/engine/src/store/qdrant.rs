//! Qdrant-backed vector store
//!
//! Maps the `VectorStore` capability onto qdrant-client: one collection with
//! two named vector spaces (`dense` with a configurable distance, `sparse`
//! with the IDF modifier), payload filters for soft-delete exclusion, and
//! cursor scroll for lifecycle scans.

use super::{
    ChunkPayload, CollectionSchema, Point, PointFilter, QueryVector, ScoredPoint, ScrollPage,
    StoredPoint, VectorStore,
};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, Modifier, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, SetPayloadPointsBuilder, SparseVectorParamsBuilder,
    SparseVectorsConfigBuilder, UpsertPointsBuilder, Value, Vector, VectorParamsBuilder,
    VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use recall_common::config::{DistanceKind, StoreConfig};
use recall_common::errors::{EngineError, Result};
use recall_common::{DENSE_VECTOR_NAME, SPARSE_VECTOR_NAME};
use std::collections::HashMap;
use uuid::Uuid;

/// Qdrant `VectorStore` implementation
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Build a client from configuration. Does not touch the network;
    /// reachability is checked by `VectorStoreManager::connect`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("Failed to build Qdrant client: {}", e),
            })?;

        Ok(Self { client })
    }
}

fn build_filter(filter: &PointFilter) -> Filter {
    let mut must = Vec::new();
    if let Some(file_id) = &filter.file_id {
        must.push(Condition::matches("file_id", file_id.clone()));
    }
    if let Some(source) = &filter.source {
        must.push(Condition::matches("source", source.clone()));
    }

    let mut must_not = Vec::new();
    if !filter.include_deleted {
        must_not.push(Condition::matches("is_deleted", true));
    }

    Filter {
        must,
        must_not,
        ..Default::default()
    }
}

fn to_point_struct(point: Point) -> Result<PointStruct> {
    let payload_json = serde_json::to_value(&point.payload)?;
    let payload = Payload::try_from(payload_json)
        .map_err(|e| EngineError::store(format!("Payload conversion failed: {}", e)))?;

    let mut vectors: HashMap<String, Vector> = HashMap::new();
    vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::new_dense(point.dense));
    vectors.insert(
        SPARSE_VECTOR_NAME.to_string(),
        Vector::new_sparse(point.sparse.indices, point.sparse.values),
    );

    Ok(PointStruct::new(point.id.to_string(), vectors, payload))
}

fn parse_point_id(id: Option<PointId>) -> Result<Uuid> {
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(s)) => Uuid::parse_str(&s)
            .map_err(|e| EngineError::store(format!("Malformed point id {}: {}", s, e))),
        Some(PointIdOptions::Num(n)) => Err(EngineError::store(format!(
            "Unexpected numeric point id {}",
            n
        ))),
        None => Err(EngineError::store("Point without id")),
    }
}

fn parse_payload(payload: HashMap<String, Value>) -> Result<ChunkPayload> {
    let json = serde_json::Value::Object(
        payload
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::from(v)))
            .collect(),
    );
    Ok(serde_json::from_value(json)?)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn health_check(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::store(format!("Health check failed: {}", e)))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| EngineError::store(format!("List collections failed: {}", e)))?;

        Ok(response
            .collections
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let distance = match schema.distance {
            DistanceKind::Cosine => Distance::Cosine,
            DistanceKind::Dot => Distance::Dot,
        };

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR_NAME,
            VectorParamsBuilder::new(schema.vector_size as u64, distance),
        );

        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(
            SPARSE_VECTOR_NAME,
            SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
        );

        let request = CreateCollectionBuilder::new(&schema.name)
            .vectors_config(vectors)
            .sparse_vectors_config(sparse);

        match self.client.create_collection(request).await {
            Ok(_) => Ok(()),
            // Concurrent initializers race on creation; existing is fine
            Err(e) if e.to_string().contains("already exists") => {
                tracing::debug!(collection = %schema.name, "Collection already exists");
                Ok(())
            }
            Err(e) => Err(EngineError::store(format!(
                "Create collection failed: {}",
                e
            ))),
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(to_point_struct)
            .collect::<Result<_>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map(|_| ())
            .map_err(|e| EngineError::store(format!("Upsert failed: {}", e)))
    }

    async fn search(
        &self,
        collection: &str,
        query: QueryVector,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let filter = build_filter(filter);

        let request = match query {
            QueryVector::Dense(vector) => {
                SearchPointsBuilder::new(collection, vector, limit as u64)
                    .vector_name(DENSE_VECTOR_NAME)
                    .filter(filter)
                    .with_payload(true)
            }
            QueryVector::Sparse(sparse) => {
                SearchPointsBuilder::new(collection, sparse.values, limit as u64)
                    .sparse_indices(sparse.indices)
                    .vector_name(SPARSE_VECTOR_NAME)
                    .filter(filter)
                    .with_payload(true)
            }
        };

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| EngineError::store(format!("Search failed: {}", e)))?;

        response
            .result
            .into_iter()
            .map(|hit| {
                Ok(ScoredPoint {
                    id: parse_point_id(hit.id)?,
                    score: hit.score,
                    payload: parse_payload(hit.payload)?,
                })
            })
            .collect()
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
        offset: Option<Uuid>,
    ) -> Result<ScrollPage> {
        let mut request = ScrollPointsBuilder::new(collection)
            .filter(build_filter(filter))
            .limit(limit as u32)
            .with_payload(true);

        if let Some(id) = offset {
            request = request.offset(PointId::from(id.to_string()));
        }

        let response = self
            .client
            .scroll(request)
            .await
            .map_err(|e| EngineError::store(format!("Scroll failed: {}", e)))?;

        let points = response
            .result
            .into_iter()
            .map(|point| {
                Ok(StoredPoint {
                    id: parse_point_id(point.id)?,
                    payload: parse_payload(point.payload)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let next_offset = match response.next_page_offset {
            Some(id) => Some(parse_point_id(Some(id))?),
            None => None,
        };

        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    async fn set_payload(
        &self,
        collection: &str,
        point_id: Uuid,
        payload: &ChunkPayload,
    ) -> Result<()> {
        let payload_json = serde_json::to_value(payload)?;
        let payload = Payload::try_from(payload_json)
            .map_err(|e| EngineError::store(format!("Payload conversion failed: {}", e)))?;

        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(collection, payload)
                    .points_selector(PointsIdsList {
                        ids: vec![PointId::from(point_id.to_string())],
                    })
                    .wait(true),
            )
            .await
            .map(|_| ())
            .map_err(|e| EngineError::store(format!("Set payload failed: {}", e)))
    }

    async fn delete(&self, collection: &str, point_ids: &[Uuid]) -> Result<()> {
        let ids: Vec<PointId> = point_ids
            .iter()
            .map(|id| PointId::from(id.to_string()))
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map(|_| ())
            .map_err(|e| EngineError::store(format!("Delete failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_excludes_deleted_by_default() {
        let filter = build_filter(&PointFilter::live());
        assert!(filter.must.is_empty());
        assert_eq!(filter.must_not.len(), 1);
    }

    #[test]
    fn test_filter_by_file_id_includes_deleted() {
        let filter = build_filter(&PointFilter::by_file_id("doc1"));
        assert_eq!(filter.must.len(), 1);
        assert!(filter.must_not.is_empty());
    }

    #[test]
    fn test_point_id_roundtrip() {
        let id = Uuid::new_v4();
        let point_id = PointId::from(id.to_string());
        assert_eq!(parse_point_id(Some(point_id)).unwrap(), id);
    }
}
