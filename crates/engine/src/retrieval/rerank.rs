//! Cross-encoder reranking
//!
//! Rescores the fused candidate pool with a cross-encoder and keeps the
//! top results. Reranking is best-effort: if the model call fails, the
//! fused order is kept and simply truncated.

use super::RetrievedChunk;
use recall_common::CrossEncoder;
use std::sync::Arc;
use tracing::{debug, warn};

/// Best-effort cross-encoder reordering of fused candidates
pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self { encoder }
    }

    /// Rescore `candidates` against `query` and return the top `limit` in
    /// the new order. Each survivor records its pre-rerank position
    /// (1-based) in `original_rank`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedChunk>,
        limit: usize,
    ) -> Vec<RetrievedChunk> {
        if candidates.is_empty() {
            return candidates;
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();

        let scores = match self.encoder.score_pairs(query, &documents).await {
            Ok(scores) if scores.len() == documents.len() => scores,
            Ok(scores) => {
                warn!(
                    expected = documents.len(),
                    got = scores.len(),
                    "Reranker returned wrong score count, keeping fused order"
                );
                return truncate(candidates, limit);
            }
            Err(e) => {
                warn!(error = %e, "Reranking failed, keeping fused order");
                return truncate(candidates, limit);
            }
        };

        let mut rescored: Vec<RetrievedChunk> = candidates
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(rank, (mut chunk, score))| {
                chunk.original_rank = Some(rank + 1);
                chunk.score = score;
                chunk
            })
            .collect();

        rescored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        rescored.truncate(limit);

        debug!(results = rescored.len(), "Reranking applied");
        rescored
    }
}

fn truncate(mut candidates: Vec<RetrievedChunk>, limit: usize) -> Vec<RetrievedChunk> {
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::super::ChunkMetadata;
    use super::*;
    use recall_common::embeddings::{FailingCrossEncoder, MockCrossEncoder};

    fn chunk(chunk_id: i64, content: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id,
            content: content.to_string(),
            score,
            original_rank: None,
            metadata: ChunkMetadata {
                file_id: "doc".to_string(),
                parent_chunk_id: 0,
                file_created_at: None,
                source: None,
            },
        }
    }

    #[tokio::test]
    async fn test_rerank_reorders_and_records_original_rank() {
        // The mock scores by query-token overlap: the last candidate wins
        let candidates = vec![
            chunk(1, "nothing relevant here", 0.9),
            chunk(2, "partially about caching", 0.8),
            chunk(3, "caching embeddings for retrieval", 0.7),
        ];

        let reranker = Reranker::new(Arc::new(MockCrossEncoder));
        let results = reranker
            .rerank("caching embeddings retrieval", candidates, 3)
            .await;

        assert_eq!(results[0].chunk_id, 3);
        assert_eq!(results[0].original_rank, Some(3));
        assert_eq!(results.last().unwrap().chunk_id, 1);
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_limit() {
        let candidates = vec![
            chunk(1, "caching a", 0.9),
            chunk(2, "caching b", 0.8),
            chunk(3, "unrelated", 0.7),
        ];

        let reranker = Reranker::new(Arc::new(MockCrossEncoder));
        let results = reranker.rerank("caching", candidates, 2).await;

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_fused_order() {
        let candidates = vec![
            chunk(1, "first", 0.9),
            chunk(2, "second", 0.8),
            chunk(3, "third", 0.7),
        ];

        let reranker = Reranker::new(Arc::new(FailingCrossEncoder));
        let results = reranker.rerank("query", candidates, 2).await;

        let order: Vec<i64> = results.iter().map(|c| c.chunk_id).collect();
        assert_eq!(order, vec![1, 2]);
        assert!(results.iter().all(|c| c.original_rank.is_none()));
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let reranker = Reranker::new(Arc::new(MockCrossEncoder));
        assert!(reranker.rerank("query", Vec::new(), 5).await.is_empty());
    }
}
