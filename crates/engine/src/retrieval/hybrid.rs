//! Hybrid search engine
//!
//! Runs the dense and sparse searches in parallel, fuses the two candidate
//! sets, and hands the pool to the reranker when one is configured. Either
//! side may fail or come back empty; the other side then serves results on
//! its own, without normalization.

use super::{fuse, FusedCandidate, Reranker, RetrievedChunk, SearchRequest};
use crate::store::{PointFilter, QueryVector, ScoredPoint, VectorStoreManager};
use recall_common::errors::Result;
use recall_common::{EmbeddingCache, SparseEncoder};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Dense + sparse retrieval over one managed collection
pub struct HybridSearchEngine {
    manager: Arc<VectorStoreManager>,
    cache: Arc<EmbeddingCache>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    reranker: Option<Reranker>,
}

impl HybridSearchEngine {
    pub fn new(
        manager: Arc<VectorStoreManager>,
        cache: Arc<EmbeddingCache>,
        sparse_encoder: Arc<dyn SparseEncoder>,
        reranker: Option<Reranker>,
    ) -> Self {
        Self {
            manager,
            cache,
            sparse_encoder,
            reranker,
        }
    }

    /// Retrieve the most relevant chunks for a query.
    ///
    /// An empty (or whitespace-only) query yields no results rather than an
    /// error. A query whose sparse encoding has no active terms searches the
    /// dense space only.
    #[instrument(skip(self, request), fields(limit = request.limit))]
    pub async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let dense_vector = self.cache.get_embedding(query).await?;
        let sparse_vector = match self.sparse_encoder.encode(query).await {
            Ok(encoding) if encoding.is_valid => Some(encoding.vector),
            Ok(_) => {
                debug!("Query has no sparse terms, dense-only search");
                None
            }
            Err(e) => {
                warn!(error = %e, "Sparse encoding failed, dense-only search");
                None
            }
        };

        let filter = PointFilter {
            include_deleted: request.include_deleted,
            ..PointFilter::default()
        };
        let fetch_limit = request
            .candidates_limit
            .saturating_mul(request.candidates_multiplier)
            .max(request.limit);

        let dense_search = self
            .manager
            .search(QueryVector::Dense(dense_vector), &filter, fetch_limit);

        let mut candidates = match sparse_vector {
            Some(sparse) => {
                let sparse_search =
                    self.manager
                        .search(QueryVector::Sparse(sparse), &filter, fetch_limit);
                let (dense_result, sparse_result) = tokio::join!(dense_search, sparse_search);

                match (dense_result, sparse_result) {
                    // An empty side would only dampen the other's scores
                    (Ok(dense), Ok(sparse)) if sparse.is_empty() => single_side(dense),
                    (Ok(dense), Ok(sparse)) if dense.is_empty() => single_side(sparse),
                    (Ok(dense), Ok(sparse)) => {
                        debug!(
                            dense = dense.len(),
                            sparse = sparse.len(),
                            "Fusing candidate sets"
                        );
                        fuse(
                            dense,
                            sparse,
                            request.dense_weight,
                            request.sparse_weight,
                            request.normalization,
                        )
                    }
                    (Ok(dense), Err(e)) => {
                        warn!(error = %e, "Sparse search failed, dense results only");
                        single_side(dense)
                    }
                    (Err(e), Ok(sparse)) => {
                        warn!(error = %e, "Dense search failed, sparse results only");
                        single_side(sparse)
                    }
                    (Err(dense_err), Err(sparse_err)) => {
                        warn!(sparse_error = %sparse_err, "Both searches failed");
                        return Err(dense_err);
                    }
                }
            }
            None => single_side(dense_search.await?),
        };

        candidates.truncate(request.candidates_limit);

        let pool: Vec<RetrievedChunk> = candidates
            .iter()
            .map(|c| RetrievedChunk::from_payload(&c.payload, c.score))
            .collect();

        let results = match &self.reranker {
            Some(reranker) => reranker.rerank(query, pool, request.limit).await,
            None => {
                let mut pool = pool;
                pool.truncate(request.limit);
                pool
            }
        };

        debug!(results = results.len(), "Retrieval complete");
        Ok(results)
    }
}

/// One candidate set standing alone keeps its raw scores and store order
fn single_side(points: Vec<ScoredPoint>) -> Vec<FusedCandidate> {
    points
        .into_iter()
        .map(|p| FusedCandidate {
            id: p.id,
            score: p.score,
            payload: p.payload,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::Normalization;
    use super::*;
    use crate::store::{Chunk, ChunkPayload, InMemoryStore, Point};
    use recall_common::config::{CacheConfig, DistanceKind, StoreConfig};
    use recall_common::embeddings::{Embedder, MockCrossEncoder, MockEmbedder, MockSparseEncoder};
    use uuid::Uuid;

    fn store_config() -> StoreConfig {
        StoreConfig {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection_name: "test".to_string(),
            vector_size: 128,
            distance: DistanceKind::Cosine,
            connect_attempts: 5,
            upsert_batch_size: 64,
            write_retries: 3,
        }
    }

    async fn seeded_engine(
        contents: &[&str],
        with_reranker: bool,
    ) -> (HybridSearchEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(VectorStoreManager::new(store.clone(), store_config()));
        manager.ensure_collection().await.unwrap();

        let embedder = Arc::new(MockEmbedder::new(128));
        let sparse_encoder = Arc::new(MockSparseEncoder);

        let mut points = Vec::new();
        for (i, content) in contents.iter().enumerate() {
            let chunk = Chunk {
                chunk_id: i as i64 + 1,
                content: content.to_string(),
                file_id: "doc".to_string(),
                parent_chunk_id: 0,
                source: None,
                file_created_at: None,
            };
            points.push(Point {
                id: Uuid::from_u128(i as u128 + 1),
                dense: embedder.embed(content).await.unwrap(),
                sparse: sparse_encoder.encode(content).await.unwrap().vector,
                payload: ChunkPayload::from_chunk(&chunk),
            });
        }
        manager.store(points).await.unwrap();

        let cache = Arc::new(EmbeddingCache::new(
            embedder,
            &CacheConfig { max_entries: 64 },
        ));
        let reranker = with_reranker.then(|| Reranker::new(Arc::new(MockCrossEncoder)));

        (
            HybridSearchEngine::new(manager, cache, sparse_encoder, reranker),
            store,
        )
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let (engine, _) = seeded_engine(&["some indexed content here"], false).await;

        for mode in [
            Normalization::MinMax,
            Normalization::ZScore,
            Normalization::None,
        ] {
            for query in ["", "   ", "\n\t"] {
                let mut request = SearchRequest::new(query);
                request.normalization = mode;
                let results = engine.retrieve(&request).await.unwrap();
                assert!(results.is_empty(), "query {:?} returned results", query);
            }
        }
    }

    #[tokio::test]
    async fn test_relevant_chunk_ranks_first() {
        let (engine, _) = seeded_engine(
            &[
                "the embedding cache stores dense vectors for reuse",
                "basil and thyme grow well in sunny herb gardens",
                "sourdough bread needs a long slow fermentation",
            ],
            false,
        )
        .await;

        let results = engine
            .retrieve(&SearchRequest::new("embedding cache dense vectors"))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk_id, 1);
        assert!(results[0].metadata.file_id == "doc");
    }

    #[tokio::test]
    async fn test_sparse_weight_zero_matches_dense_order() {
        let contents = [
            "retrieval pipelines fuse scores from two spaces",
            "weather patterns shift with the season",
            "retrieval quality depends on chunking",
        ];
        let (engine, _) = seeded_engine(&contents, false).await;

        let mut request = SearchRequest::new("retrieval scores spaces");
        request.dense_weight = 1.0;
        request.sparse_weight = 0.0;
        let hybrid = engine.retrieve(&request).await.unwrap();

        // The same ranking the dense side alone produces
        let dense_vector = engine.cache.get_embedding(&request.query).await.unwrap();
        let dense = engine
            .manager
            .search(QueryVector::Dense(dense_vector), &PointFilter::live(), 50)
            .await
            .unwrap();

        let hybrid_ids: Vec<i64> = hybrid.iter().map(|c| c.chunk_id).collect();
        let dense_ids: Vec<i64> = dense.iter().map(|p| p.payload.chunk_id).collect();
        assert_eq!(hybrid_ids, dense_ids);
    }

    #[tokio::test]
    async fn test_symbol_only_query_uses_dense_side() {
        // "???" has no sparse terms; retrieval must not error out
        let (engine, _) = seeded_engine(&["plain indexed text"], false).await;

        let results = engine.retrieve(&SearchRequest::new("???")).await.unwrap();
        // Dense mock embeds the punctuation to nothing shared, so empty is fine
        assert!(results.len() <= 1);
    }

    #[tokio::test]
    async fn test_soft_deleted_points_are_excluded() {
        let (engine, store) = seeded_engine(
            &[
                "shared topic sentence about caching",
                "another shared topic sentence about caching",
            ],
            false,
        )
        .await;

        // Soft-delete point 1 directly
        let chunk = store.find_chunk("test", "doc", 1).await.unwrap();
        let mut payload = ChunkPayload::from_chunk(&chunk);
        payload.is_deleted = true;
        engine
            .manager
            .set_payload(Uuid::from_u128(1), &payload)
            .await
            .unwrap();

        let results = engine
            .retrieve(&SearchRequest::new("shared topic sentence caching"))
            .await
            .unwrap();
        assert!(results.iter().all(|c| c.chunk_id != 1));

        let mut with_deleted = SearchRequest::new("shared topic sentence caching");
        with_deleted.include_deleted = true;
        let results = engine.retrieve(&with_deleted).await.unwrap();
        assert!(results.iter().any(|c| c.chunk_id == 1));
    }

    #[tokio::test]
    async fn test_reranker_sets_original_rank() {
        let (engine, _) = seeded_engine(
            &[
                "caching dense embeddings speeds retrieval",
                "gardens need water and patience",
            ],
            true,
        )
        .await;

        let results = engine
            .retrieve(&SearchRequest::new("caching dense embeddings retrieval"))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results[0].original_rank.is_some());
    }

    #[tokio::test]
    async fn test_limit_caps_results() {
        let contents: Vec<String> = (0..8)
            .map(|i| format!("document {} mentions caching and retrieval", i))
            .collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        let (engine, _) = seeded_engine(&refs, false).await;

        let mut request = SearchRequest::new("caching retrieval");
        request.limit = 3;
        let results = engine.retrieve(&request).await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
