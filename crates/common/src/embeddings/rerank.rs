//! Cross-encoder relevance scoring
//!
//! Scores (query, passage) pairs jointly in one batched call. More accurate
//! than vector similarity alone, and priced accordingly, so it only runs on
//! the fused candidate set.

use super::retry_backoff;
use crate::config::RerankerConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for cross-encoder relevance models
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score every (query, document) pair in one batched inference call.
    /// Returns one score per document, in input order.
    async fn score_pairs(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// HTTP cross-encoder client (TEI-style /rerank endpoint)
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

impl HttpCrossEncoder {
    /// Create from configuration. Returns None when no endpoint is set,
    /// which disables reranking entirely.
    pub fn from_config(config: &RerankerConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("Failed to build rerank HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
        }))
    }

    async fn make_request(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let request = RerankRequest {
            query,
            texts: documents,
            model: &self.model,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| EngineError::Embedding {
            message: format!("Rerank request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Embedding {
                message: format!("Rerank API error {}: {}", status, body),
            });
        }

        let scores: Vec<RerankScore> =
            response.json().await.map_err(|e| EngineError::Embedding {
                message: format!("Failed to parse rerank response: {}", e),
            })?;

        // The service returns entries sorted by score; map back to input order
        let mut ordered = vec![0.0f32; documents.len()];
        for entry in scores {
            if entry.index >= documents.len() {
                return Err(EngineError::Embedding {
                    message: format!("Rerank index {} out of range", entry.index),
                });
            }
            ordered[entry.index] = entry.score;
        }

        Ok(ordered)
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score_pairs(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            match self.make_request(query, documents).await {
                Ok(scores) => return Ok(scores),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Rerank request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| EngineError::embedding("Unknown rerank error after retries")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock cross-encoder for testing.
///
/// Scores a pair by query-token overlap with the document, so documents
/// lexically closer to the query rank higher in a predictable way.
pub struct MockCrossEncoder;

impl MockCrossEncoder {
    fn overlap(query: &str, document: &str) -> f32 {
        let doc_tokens: std::collections::HashSet<String> = document
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        query
            .split_whitespace()
            .filter(|t| doc_tokens.contains(&t.to_lowercase()))
            .count() as f32
    }
}

#[async_trait]
impl CrossEncoder for MockCrossEncoder {
    async fn score_pairs(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        Ok(documents
            .iter()
            .map(|doc| Self::overlap(query, doc))
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-rerank"
    }
}

/// A cross-encoder that always fails. Used to exercise fallback paths.
pub struct FailingCrossEncoder;

#[async_trait]
impl CrossEncoder for FailingCrossEncoder {
    async fn score_pairs(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>> {
        Err(EngineError::embedding("forced rerank failure"))
    }

    fn model_name(&self) -> &str {
        "failing-rerank"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scores_track_overlap() {
        let encoder = MockCrossEncoder;
        let docs = vec![
            "rust ownership and borrowing".to_string(),
            "gardening tips for spring".to_string(),
        ];
        let scores = encoder.score_pairs("rust borrowing", &docs).await.unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[tokio::test]
    async fn test_empty_documents() {
        let encoder = MockCrossEncoder;
        let scores = encoder.score_pairs("query", &[]).await.unwrap();
        assert!(scores.is_empty());
    }
}
