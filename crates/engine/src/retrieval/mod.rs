//! Hybrid retrieval
//!
//! Dense and sparse searches run in parallel, their scores are normalized
//! per candidate set, fused by weighted sum, and optionally reordered by a
//! cross-encoder reranker.

mod fusion;
mod hybrid;
mod rerank;

pub use fusion::{fuse, normalize_scores, FusedCandidate};
pub use hybrid::HybridSearchEngine;
pub use rerank::Reranker;

use crate::store::ChunkPayload;
use recall_common::config::SearchConfig;
use recall_common::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Score normalization applied to each candidate set independently
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// (score - min) / (max - min); a flat set maps to 1.0 (0.0 when all
    /// scores are zero)
    MinMax,
    /// (score - mean) / std; a zero-variance set maps to 0.0
    ZScore,
    /// Raw scores pass through unchanged
    None,
}

impl std::str::FromStr for Normalization {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min_max" => Ok(Normalization::MinMax),
            "z_score" => Ok(Normalization::ZScore),
            "none" => Ok(Normalization::None),
            other => Err(EngineError::Configuration {
                message: format!("Unknown normalization: {}", other),
            }),
        }
    }
}

/// Search request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// Final result count
    pub limit: usize,

    /// Candidate pool size before reranking
    pub candidates_limit: usize,

    /// Dense score weight in fusion (0.0 - 1.0)
    pub dense_weight: f32,

    /// Sparse score weight in fusion (0.0 - 1.0)
    pub sparse_weight: f32,

    /// Score normalization mode
    pub normalization: Normalization,

    /// Per-side over-fetch multiplier
    pub candidates_multiplier: usize,

    /// Include soft-deleted points (off by default)
    pub include_deleted: bool,
}

impl SearchRequest {
    /// A request with default tuning for the given query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// A request using configured search defaults
    pub fn from_config(query: impl Into<String>, config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            query: query.into(),
            limit: config.limit,
            candidates_limit: config.candidates_limit,
            dense_weight: config.dense_weight,
            sparse_weight: config.sparse_weight,
            normalization: config.normalization.parse()?,
            candidates_multiplier: config.candidates_multiplier,
            include_deleted: false,
        })
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: 10,
            candidates_limit: 50,
            dense_weight: 0.7,
            sparse_weight: 0.3,
            normalization: Normalization::MinMax,
            candidates_multiplier: 2,
            include_deleted: false,
        }
    }
}

/// Chunk metadata surfaced with every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_id: String,
    pub parent_chunk_id: i64,
    pub file_created_at: Option<String>,
    pub source: Option<String>,
}

/// One ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk id within its document
    pub chunk_id: i64,

    /// Chunk content
    pub content: String,

    /// Final relevance score
    pub score: f32,

    /// Position before reranking (set only when a reranker ran)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_rank: Option<usize>,

    /// Document-level metadata
    pub metadata: ChunkMetadata,
}

impl RetrievedChunk {
    pub(crate) fn from_payload(payload: &ChunkPayload, score: f32) -> Self {
        Self {
            chunk_id: payload.chunk_id,
            content: payload.content.clone(),
            score,
            original_rank: None,
            metadata: ChunkMetadata {
                file_id: payload.file_id.clone(),
                parent_chunk_id: payload.parent_chunk_id,
                file_created_at: payload.file_created_at.clone(),
                source: payload.source.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_parse() {
        assert_eq!(
            "min_max".parse::<Normalization>().unwrap(),
            Normalization::MinMax
        );
        assert_eq!(
            "z_score".parse::<Normalization>().unwrap(),
            Normalization::ZScore
        );
        assert_eq!("none".parse::<Normalization>().unwrap(), Normalization::None);
        assert!("rrf".parse::<Normalization>().is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = SearchRequest::new("query");
        assert_eq!(request.limit, 10);
        assert!(!request.include_deleted);
        assert_eq!(request.normalization, Normalization::MinMax);
    }
}
