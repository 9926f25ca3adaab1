//! Recall Engine
//!
//! The retrieval and lifecycle core:
//! - Vector store abstraction with Qdrant and in-memory backends
//! - Text chunking (recursive token-budget and semantic strategies)
//! - The indexing write path
//! - Hybrid dense + sparse search with fusion and optional reranking
//! - Bulk point lifecycle operations

pub mod chunking;
pub mod lifecycle;
pub mod pipeline;
pub mod retrieval;
pub mod store;

// Re-export the main entry points
pub use lifecycle::{LifecycleManager, LifecycleReport};
pub use pipeline::IndexingPipeline;
pub use retrieval::{HybridSearchEngine, RetrievedChunk, SearchRequest};
pub use store::{Chunk, InMemoryStore, QdrantStore, VectorStore, VectorStoreManager};
