//! Vector store abstraction
//!
//! The external vector database is an opaque capability: create a
//! collection, upsert points, search, scroll, patch payloads, delete.
//! Everything engine-side goes through the `VectorStore` trait so the same
//! retrieval and lifecycle code runs against the real backend and the
//! in-memory one used in tests.

mod manager;
mod memory;
mod qdrant;

pub use manager::VectorStoreManager;
pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

use async_trait::async_trait;
use recall_common::config::DistanceKind;
use recall_common::errors::{EngineError, Result};
use recall_common::SparseVector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current persisted payload schema version
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// A unit of indexed text, as supplied by collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential within a parent document, unique per `file_id`
    pub chunk_id: i64,

    /// Chunk text; must be non-empty after trimming
    pub content: String,

    /// Logical document/thread identifier. For email threads this is the
    /// composite `"{thread_id},{last_processed_message_id}"` boundary key.
    pub file_id: String,

    /// Coarser ancestor chunk; 0 means no parent
    pub parent_chunk_id: i64,

    /// Provenance tag (object URL, "gmail_thread", ...)
    pub source: Option<String>,

    /// ISO-8601 creation timestamp of the source document
    pub file_created_at: Option<String>,
}

/// The persisted payload schema. This struct is the only thing serialized
/// into store payloads; fields outside it never leak into persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub chunk_id: i64,
    pub content: String,
    pub file_id: String,
    pub parent_chunk_id: i64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub file_created_at: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

fn default_schema_version() -> u32 {
    PAYLOAD_SCHEMA_VERSION
}

impl ChunkPayload {
    /// Build the persisted payload for a freshly indexed chunk
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            chunk_id: chunk.chunk_id,
            content: chunk.content.clone(),
            file_id: chunk.file_id.clone(),
            parent_chunk_id: chunk.parent_chunk_id,
            source: chunk.source.clone(),
            file_created_at: chunk.file_created_at.clone(),
            is_deleted: false,
        }
    }
}

/// One persisted unit: id, both named vectors, payload
#[derive(Debug, Clone)]
pub struct Point {
    pub id: Uuid,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: ChunkPayload,
}

/// A search hit with its raw similarity score
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// A scrolled point (no score)
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: Uuid,
    pub payload: ChunkPayload,
}

/// One page of a cursor scan
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    /// Cursor for the next page; None means the scan is finished
    pub next_offset: Option<Uuid>,
}

/// Query vector for one side of hybrid search
#[derive(Debug, Clone)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

/// Payload filter for search and scroll.
///
/// Search excludes soft-deleted points unless `include_deleted` is set;
/// lifecycle scans typically set it so restore and purge see every point.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    pub file_id: Option<String>,
    pub source: Option<String>,
    pub include_deleted: bool,
}

impl PointFilter {
    /// Match every live (not soft-deleted) point
    pub fn live() -> Self {
        Self::default()
    }

    /// Match every point with the given file_id, deleted or not
    pub fn by_file_id(file_id: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id.into()),
            source: None,
            include_deleted: true,
        }
    }

    /// Match every point with the given source, deleted or not
    pub fn by_source(source: impl Into<String>) -> Self {
        Self {
            file_id: None,
            source: Some(source.into()),
            include_deleted: true,
        }
    }

    /// Whether a payload passes this filter
    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        if let Some(file_id) = &self.file_id {
            if &payload.file_id != file_id {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if payload.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if !self.include_deleted && payload.is_deleted {
            return false;
        }
        true
    }
}

/// Collection schema parameters exposed at init
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    pub name: String,
    /// Dense dimensionality
    pub vector_size: usize,
    /// Dense distance metric; the sparse space always uses the IDF modifier
    pub distance: DistanceKind,
}

/// Opaque vector database capability
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Cheap liveness probe
    async fn health_check(&self) -> Result<()>;

    /// Names of existing collections
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a collection with named dense + sparse vector spaces.
    /// An "already exists" response counts as success; concurrent
    /// initializers may race on creation.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    /// Upsert a batch of points
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Top-k search on one vector space
    async fn search(
        &self,
        collection: &str,
        query: QueryVector,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Cursor-based scan of matching points
    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        limit: usize,
        offset: Option<Uuid>,
    ) -> Result<ScrollPage>;

    /// Replace one point's payload
    async fn set_payload(
        &self,
        collection: &str,
        point_id: Uuid,
        payload: &ChunkPayload,
    ) -> Result<()>;

    /// Bulk delete by point ids
    async fn delete(&self, collection: &str, point_ids: &[Uuid]) -> Result<()>;
}

/// Validate the chunk input contract shared by indexing entry points
pub fn validate_chunks(chunks: &[Chunk]) -> Result<()> {
    if chunks.is_empty() {
        return Err(EngineError::invalid_input("empty chunk list"));
    }

    for chunk in chunks {
        if chunk.file_id.trim().is_empty() {
            return Err(EngineError::invalid_input(format!(
                "chunk {} has no file_id",
                chunk.chunk_id
            )));
        }
        if chunk.content.trim().is_empty() {
            return Err(EngineError::invalid_input(format!(
                "chunk {} of {} has empty content",
                chunk.chunk_id, chunk.file_id
            )));
        }
    }

    Ok(())
}
