//! In-memory vector store
//!
//! A faithful single-process stand-in for the real backend: named dense +
//! sparse scoring, payload filters, cursor scroll. Backs the unit and
//! integration tests, the same way the mock embedder backs model seams.

use super::{
    Chunk, ChunkPayload, CollectionSchema, Point, PointFilter, QueryVector, ScoredPoint,
    ScrollPage, StoredPoint, VectorStore,
};
use async_trait::async_trait;
use recall_common::config::DistanceKind;
use recall_common::errors::{EngineError, Result};
use recall_common::SparseVector;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Record {
    dense: Vec<f32>,
    sparse: SparseVector,
    payload: ChunkPayload,
}

struct Collection {
    schema: CollectionSchema,
    // BTreeMap keeps scroll order stable and cursors meaningful
    points: BTreeMap<Uuid, Record>,
}

/// In-memory `VectorStore` implementation
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    fail_next_upserts: AtomicU32,
    fail_next_set_payloads: AtomicU32,
    fail_next_deletes: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upsert calls fail, for retry-path tests
    pub fn fail_next_upserts(&self, n: u32) {
        self.fail_next_upserts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` payload updates fail, for skip-and-continue tests
    pub fn fail_next_set_payloads(&self, n: u32) {
        self.fail_next_set_payloads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` delete calls fail, for skip-and-continue tests
    pub fn fail_next_deletes(&self, n: u32) {
        self.fail_next_deletes.store(n, Ordering::SeqCst);
    }

    /// Number of points currently stored in a collection
    pub async fn point_count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    /// Fetch one chunk's payload by document key and chunk id
    pub async fn find_chunk(
        &self,
        collection: &str,
        file_id: &str,
        chunk_id: i64,
    ) -> Option<Chunk> {
        let collections = self.collections.read().await;
        let coll = collections.get(collection)?;
        coll.points.values().find_map(|record| {
            let p = &record.payload;
            if p.file_id == file_id && p.chunk_id == chunk_id {
                Some(Chunk {
                    chunk_id: p.chunk_id,
                    content: p.content.clone(),
                    file_id: p.file_id.clone(),
                    parent_chunk_id: p.parent_chunk_id,
                    source: p.source.clone(),
                    file_created_at: p.file_created_at.clone(),
                })
            } else {
                None
            }
        })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let weights: HashMap<u32, f32> = a
        .indices
        .iter()
        .copied()
        .zip(a.values.iter().copied())
        .collect();

    b.indices
        .iter()
        .zip(b.values.iter())
        .filter_map(|(idx, val)| weights.get(idx).map(|w| w * val))
        .sum()
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections.keys().cloned().collect())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let mut collections = self.collections.write().await;
        // Racing initializers both succeed, first writer wins
        collections
            .entry(schema.name.clone())
            .or_insert_with(|| Collection {
                schema: schema.clone(),
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let pending = self.fail_next_upserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_upserts.store(pending - 1, Ordering::SeqCst);
            return Err(EngineError::store("injected upsert failure"));
        }

        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::store(format!("unknown collection {}", collection)))?;

        for point in points {
            if point.sparse.is_empty() {
                return Err(EngineError::store("empty sparse vector"));
            }
            coll.points.insert(
                point.id,
                Record {
                    dense: point.dense,
                    sparse: point.sparse,
                    payload: point.payload,
                },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: QueryVector,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| EngineError::store(format!("unknown collection {}", collection)))?;

        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|(_, record)| filter.matches(&record.payload))
            .map(|(id, record)| {
                let score = match &query {
                    QueryVector::Dense(q) => match coll.schema.distance {
                        DistanceKind::Cosine => cosine(q, &record.dense),
                        DistanceKind::Dot => dot(q, &record.dense),
                    },
                    QueryVector::Sparse(q) => sparse_dot(q, &record.sparse),
                };
                ScoredPoint {
                    id: *id,
                    score,
                    payload: record.payload.clone(),
                }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
        offset: Option<Uuid>,
    ) -> Result<ScrollPage> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| EngineError::store(format!("unknown collection {}", collection)))?;

        let lower = match offset {
            Some(id) => Bound::Included(id),
            None => Bound::Unbounded,
        };

        let mut points = Vec::new();
        let mut next_offset = None;

        for (id, record) in coll.points.range((lower, Bound::Unbounded)) {
            if !filter.matches(&record.payload) {
                continue;
            }
            if points.len() == limit {
                next_offset = Some(*id);
                break;
            }
            points.push(StoredPoint {
                id: *id,
                payload: record.payload.clone(),
            });
        }

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
        let pending = self.fail_next_set_payloads.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_set_payloads
                .store(pending - 1, Ordering::SeqCst);
            return Err(EngineError::store("injected set_payload failure"));
        }

        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::store(format!("unknown collection {}", collection)))?;

        let record = coll
            .points
            .get_mut(&point_id)
            .ok_or_else(|| EngineError::store(format!("unknown point {}", point_id)))?;

        record.payload = payload.clone();
        Ok(())
    }

    async fn delete(&self, collection: &str, point_ids: &[Uuid]) -> Result<()> {
        let pending = self.fail_next_deletes.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_deletes.store(pending - 1, Ordering::SeqCst);
            return Err(EngineError::store("injected delete failure"));
        }

        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| EngineError::store(format!("unknown collection {}", collection)))?;

        for id in point_ids {
            coll.points.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CollectionSchema {
        CollectionSchema {
            name: "test".to_string(),
            vector_size: 4,
            distance: DistanceKind::Cosine,
        }
    }

    fn point(id: u128, file_id: &str, chunk_id: i64, dense: Vec<f32>) -> Point {
        Point {
            id: Uuid::from_u128(id),
            dense,
            sparse: SparseVector {
                indices: vec![chunk_id as u32 + 1],
                values: vec![1.0],
            },
            payload: ChunkPayload {
                schema_version: super::super::PAYLOAD_SCHEMA_VERSION,
                chunk_id,
                content: format!("chunk {}", chunk_id),
                file_id: file_id.to_string(),
                parent_chunk_id: 0,
                source: None,
                file_created_at: None,
                is_deleted: false,
            },
        }
    }

    #[tokio::test]
    async fn test_dense_search_orders_by_similarity() {
        let store = InMemoryStore::new();
        store.create_collection(&schema()).await.unwrap();
        store
            .upsert(
                "test",
                vec![
                    point(1, "doc", 1, vec![1.0, 0.0, 0.0, 0.0]),
                    point(2, "doc", 2, vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "test",
                QueryVector::Dense(vec![1.0, 0.1, 0.0, 0.0]),
                &PointFilter::live(),
                10,
            )
            .await
            .unwrap();

        assert_eq!(hits[0].payload.chunk_id, 1);
    }

    #[tokio::test]
    async fn test_scroll_pages_through_everything() {
        let store = InMemoryStore::new();
        store.create_collection(&schema()).await.unwrap();

        let points: Vec<Point> = (0..7)
            .map(|i| point(i as u128 + 1, "doc", i, vec![1.0, 0.0, 0.0, 0.0]))
            .collect();
        store.upsert("test", points).await.unwrap();

        let mut seen = 0;
        let mut offset = None;
        loop {
            let page = store
                .scroll("test", &PointFilter::by_file_id("doc"), 3, offset)
                .await
                .unwrap();
            seen += page.points.len();
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, 7);
    }

    #[tokio::test]
    async fn test_injected_upsert_failure_clears() {
        let store = InMemoryStore::new();
        store.create_collection(&schema()).await.unwrap();
        store.fail_next_upserts(1);

        let batch = vec![point(1, "doc", 1, vec![1.0, 0.0, 0.0, 0.0])];
        assert!(store.upsert("test", batch.clone()).await.is_err());
        assert!(store.upsert("test", batch).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_mutation_failures_clear() {
        let store = InMemoryStore::new();
        store.create_collection(&schema()).await.unwrap();

        let p = point(1, "doc", 1, vec![1.0, 0.0, 0.0, 0.0]);
        let payload = p.payload.clone();
        store.upsert("test", vec![p]).await.unwrap();

        store.fail_next_set_payloads(1);
        let id = Uuid::from_u128(1);
        assert!(store.set_payload("test", id, &payload).await.is_err());
        assert!(store.set_payload("test", id, &payload).await.is_ok());

        store.fail_next_deletes(1);
        assert!(store.delete("test", &[id]).await.is_err());
        assert!(store.delete("test", &[id]).await.is_ok());
        assert_eq!(store.point_count("test").await, 0);
    }
}
