//! Recall Common Library
//!
//! Shared code for the Recall retrieval engine including:
//! - Error types and handling
//! - Configuration management
//! - Embedding client abstractions (dense, sparse, cross-encoder)
//! - Bounded embedding cache

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;

// Re-export commonly used types
pub use cache::EmbeddingCache;
pub use config::AppConfig;
pub use embeddings::rerank::CrossEncoder;
pub use embeddings::sparse::{SparseEncoder, SparseEncoding, SparseVector};
pub use embeddings::Embedder;
pub use errors::{EngineError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the dense vector space in the store collection
pub const DENSE_VECTOR_NAME: &str = "dense";

/// Name of the sparse vector space in the store collection
pub const SPARSE_VECTOR_NAME: &str = "sparse";
