//! Configuration management for the Recall engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Vector store configuration
    pub store: StoreConfig,

    /// Dense embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Sparse encoder configuration
    pub sparse: SparseConfig,

    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,

    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Search defaults
    pub search: SearchConfig,

    /// Embedding cache configuration
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Vector database URL (gRPC endpoint)
    #[serde(default = "default_store_url")]
    pub url: String,

    /// API key for the vector database
    pub api_key: Option<String>,

    /// Collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Dense vector dimensionality
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    /// Dense distance metric: cosine or dot
    #[serde(default = "default_distance")]
    pub distance: DistanceKind,

    /// Connect attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Upsert batch size
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,

    /// Retries per failed upsert batch
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
}

/// Distance metric for the dense vector space
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceKind {
    Cosine,
    Dot,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding endpoint (OpenAI-compatible /embeddings)
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_inference_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SparseConfig {
    /// Sparse encoding endpoint
    #[serde(default = "default_sparse_endpoint")]
    pub endpoint: String,

    /// API key for the sparse encoder
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_sparse_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_inference_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankerConfig {
    /// Rerank endpoint; None disables reranking
    pub endpoint: Option<String>,

    /// API key for the rerank service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries per request
    #[serde(default = "default_inference_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Chunking strategy: recursive or semantic
    #[serde(default = "default_chunking_strategy")]
    pub strategy: String,

    /// Target chunk size in tokens (recursive strategy)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Backward overlap budget in tokens (recursive strategy)
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Adjacent-sentence similarity threshold (semantic strategy)
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,

    /// Minimum chunk length in characters (semantic strategy)
    #[serde(default = "default_min_chunk_length")]
    pub min_chunk_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Final result count
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Candidate pool size before reranking
    #[serde(default = "default_candidates_limit")]
    pub candidates_limit: usize,

    /// Dense score weight in fusion
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,

    /// Sparse score weight in fusion
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f32,

    /// Score normalization: min_max, z_score, or none
    #[serde(default = "default_normalization")]
    pub normalization: String,

    /// Per-side over-fetch multiplier
    #[serde(default = "default_candidates_multiplier")]
    pub candidates_multiplier: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum cached embeddings
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

// Default value functions
fn default_store_url() -> String { "http://localhost:6334".to_string() }
fn default_collection_name() -> String { "recall_chunks".to_string() }
fn default_vector_size() -> usize { 768 }
fn default_distance() -> DistanceKind { DistanceKind::Cosine }
fn default_connect_attempts() -> u32 { 5 }
fn default_upsert_batch_size() -> usize { 64 }
fn default_write_retries() -> u32 { 3 }
fn default_embedding_endpoint() -> String { "http://localhost:8081/embeddings".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_inference_timeout() -> u64 { 30 }
fn default_inference_retries() -> u32 { 3 }
fn default_embedding_batch_size() -> usize { 32 }
fn default_sparse_endpoint() -> String { "http://localhost:8082/embed_sparse".to_string() }
fn default_sparse_model() -> String { "prithivida/Splade_PP_en_v1".to_string() }
fn default_rerank_model() -> String { "BAAI/bge-reranker-base".to_string() }
fn default_chunking_strategy() -> String { "recursive".to_string() }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_semantic_threshold() -> f32 { 0.3 }
fn default_min_chunk_length() -> usize { 50 }
fn default_limit() -> usize { 10 }
fn default_candidates_limit() -> usize { 50 }
fn default_dense_weight() -> f32 { 0.7 }
fn default_sparse_weight() -> f32 { 0.3 }
fn default_normalization() -> String { "min_max".to_string() }
fn default_candidates_multiplier() -> usize { 2 }
fn default_cache_entries() -> usize { 10_000 }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // Pick up a .env file when present, before reading the environment
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__STORE__URL=http://qdrant:6334
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                url: default_store_url(),
                api_key: None,
                collection_name: default_collection_name(),
                vector_size: default_vector_size(),
                distance: default_distance(),
                connect_attempts: default_connect_attempts(),
                upsert_batch_size: default_upsert_batch_size(),
                write_retries: default_write_retries(),
            },
            embedding: EmbeddingConfig {
                endpoint: default_embedding_endpoint(),
                api_key: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_inference_timeout(),
                max_retries: default_inference_retries(),
                batch_size: default_embedding_batch_size(),
            },
            sparse: SparseConfig {
                endpoint: default_sparse_endpoint(),
                api_key: None,
                model: default_sparse_model(),
                timeout_secs: default_inference_timeout(),
                max_retries: default_inference_retries(),
            },
            reranker: RerankerConfig {
                endpoint: None,
                api_key: None,
                model: default_rerank_model(),
                timeout_secs: default_inference_timeout(),
                max_retries: default_inference_retries(),
            },
            chunking: ChunkingConfig {
                strategy: default_chunking_strategy(),
                chunk_size: default_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
                semantic_threshold: default_semantic_threshold(),
                min_chunk_length: default_min_chunk_length(),
            },
            search: SearchConfig {
                limit: default_limit(),
                candidates_limit: default_candidates_limit(),
                dense_weight: default_dense_weight(),
                sparse_weight: default_sparse_weight(),
                normalization: default_normalization(),
                candidates_multiplier: default_candidates_multiplier(),
            },
            cache: CacheConfig {
                max_entries: default_cache_entries(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.connect_attempts, 5);
        assert_eq!(config.store.write_retries, 3);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.search.normalization, "min_max");
    }

    #[test]
    fn test_distance_kind_serde() {
        let kind: DistanceKind = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(kind, DistanceKind::Cosine);
        let kind: DistanceKind = serde_json::from_str("\"dot\"").unwrap();
        assert_eq!(kind, DistanceKind::Dot);
    }

    #[test]
    fn test_weights_sum_to_one_by_default() {
        let config = AppConfig::default();
        let sum = config.search.dense_weight + config.search.sparse_weight;
        assert!((sum - 1.0).abs() < f32::EPSILON);
    }
}
