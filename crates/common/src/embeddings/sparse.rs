//! Sparse (lexical) encoding
//!
//! Produces term-index/weight pairs for the store's sparse vector space.
//! A zero-term encoding never reaches the store: the sentinel vector
//! `{indices: [0], values: [0.0]}` is substituted and the encoding is
//! marked invalid so callers can tell the two cases apart.

use super::retry_backoff;
use crate::config::SparseConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Variable-length term-index/weight pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// The degenerate stand-in for an encoding with no active terms.
    ///
    /// Keeps the never-empty invariant on persisted sparse vectors while
    /// scoring as a no-op against any real query.
    pub fn sentinel() -> Self {
        Self {
            indices: vec![0],
            values: vec![0.0],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A sparse encoding plus its validity flag.
///
/// `is_valid == false` means the encoder produced no active terms and the
/// vector is the sentinel, not a genuine single-term encoding.
#[derive(Debug, Clone)]
pub struct SparseEncoding {
    pub vector: SparseVector,
    pub is_valid: bool,
}

impl SparseEncoding {
    /// Wrap a raw encoder output, substituting the sentinel when empty
    pub fn from_raw(vector: SparseVector) -> Self {
        if vector.is_empty() {
            Self {
                vector: SparseVector::sentinel(),
                is_valid: false,
            }
        } else {
            Self {
                vector,
                is_valid: true,
            }
        }
    }
}

/// Trait for sparse term-weight encoding
#[async_trait]
pub trait SparseEncoder: Send + Sync {
    /// Encode a single text; never returns an empty vector
    async fn encode(&self, text: &str) -> Result<SparseEncoding>;

    /// Encode multiple texts, order-preserving
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<SparseEncoding>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// HTTP sparse encoder client (TEI-style /embed_sparse endpoint)
pub struct HttpSparseEncoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct SparseRequest<'a> {
    inputs: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct SparseTerm {
    index: u32,
    value: f32,
}

impl HttpSparseEncoder {
    /// Create a new sparse encoder from configuration
    pub fn from_config(config: &SparseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("Failed to build sparse HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<SparseTerm>>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            match self.make_request(texts).await {
                Ok(terms) => return Ok(terms),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Sparse encoding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EngineError::embedding("Unknown sparse encoder error after retries")
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<SparseTerm>>> {
        let request = SparseRequest {
            inputs: texts,
            model: &self.model,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| EngineError::Embedding {
            message: format!("Sparse request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Embedding {
                message: format!("Sparse API error {}: {}", status, body),
            });
        }

        let terms: Vec<Vec<SparseTerm>> =
            response.json().await.map_err(|e| EngineError::Embedding {
                message: format!("Failed to parse sparse response: {}", e),
            })?;

        if terms.len() != texts.len() {
            return Err(EngineError::Embedding {
                message: format!(
                    "Sparse encoder returned {} vectors for {} inputs",
                    terms.len(),
                    texts.len()
                ),
            });
        }

        Ok(terms)
    }
}

#[async_trait]
impl SparseEncoder for HttpSparseEncoder {
    async fn encode(&self, text: &str) -> Result<SparseEncoding> {
        let mut encodings = self.encode_batch(&[text.to_string()]).await?;
        encodings
            .pop()
            .ok_or_else(|| EngineError::embedding("Empty sparse response"))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<SparseEncoding>> {
        let raw = self.request_with_retry(texts).await?;

        Ok(raw
            .into_iter()
            .map(|terms| {
                let vector = SparseVector {
                    indices: terms.iter().map(|t| t.index).collect(),
                    values: terms.iter().map(|t| t.value).collect(),
                };
                SparseEncoding::from_raw(vector)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock sparse encoder for testing.
///
/// Hashes each token into a 16-bit term index with its occurrence count as
/// the weight. Stopword-free inputs of punctuation only yield the sentinel.
pub struct MockSparseEncoder;

impl MockSparseEncoder {
    fn encode_text(text: &str) -> SparseEncoding {
        use std::collections::hash_map::DefaultHasher;
        use std::collections::BTreeMap;
        use std::hash::{Hash, Hasher};

        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in text.split_whitespace() {
            let normalized = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            normalized.hash(&mut hasher);
            let index = (hasher.finish() % u64::from(u16::MAX)) as u32;
            *counts.entry(index).or_insert(0.0) += 1.0;
        }

        SparseEncoding::from_raw(SparseVector {
            indices: counts.keys().copied().collect(),
            values: counts.values().copied().collect(),
        })
    }
}

#[async_trait]
impl SparseEncoder for MockSparseEncoder {
    async fn encode(&self, text: &str) -> Result<SparseEncoding> {
        Ok(Self::encode_text(text))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<SparseEncoding>> {
        Ok(texts.iter().map(|t| Self::encode_text(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-sparse"
    }
}
