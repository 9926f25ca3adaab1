//! Indexing pipeline
//!
//! Ties chunking, dense embedding (through the cache), sparse encoding,
//! and batched storage into the write path. Every point gets a fresh v4
//! uuid; re-indexing a document therefore appends rather than overwrites,
//! and callers delete the old boundary first when replacing.

use crate::chunking::{process_chunks, Chunker};
use crate::store::{validate_chunks, Chunk, ChunkPayload, Point, VectorStoreManager};
use recall_common::errors::Result;
use recall_common::{EmbeddingCache, SparseEncoder};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Write path from raw text to stored points
pub struct IndexingPipeline {
    chunker: Arc<dyn Chunker>,
    cache: Arc<EmbeddingCache>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    manager: Arc<VectorStoreManager>,
}

impl IndexingPipeline {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        cache: Arc<EmbeddingCache>,
        sparse_encoder: Arc<dyn SparseEncoder>,
        manager: Arc<VectorStoreManager>,
    ) -> Self {
        Self {
            chunker,
            cache,
            sparse_encoder,
            manager,
        }
    }

    /// Chunk and index one raw document. Returns the stored point count;
    /// a document that chunks to nothing stores nothing.
    #[instrument(skip(self, text, source, file_created_at))]
    pub async fn index_document(
        &self,
        text: &str,
        file_id: &str,
        source: Option<String>,
        file_created_at: Option<String>,
    ) -> Result<usize> {
        let pieces = self.chunker.split(text).await?;
        if pieces.is_empty() {
            debug!(file_id, "Document chunked to nothing");
            return Ok(0);
        }

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, content)| Chunk {
                chunk_id: i as i64 + 1,
                content,
                file_id: file_id.to_string(),
                parent_chunk_id: 0,
                source: source.clone(),
                file_created_at: file_created_at.clone(),
            })
            .collect();

        self.index_chunks(chunks).await
    }

    /// Re-chunk coarse parent chunks into finer units and index them
    #[instrument(skip(self, parent_chunks), fields(parents = parent_chunks.len()))]
    pub async fn reindex_parents(
        &self,
        parent_chunks: &[Chunk],
        file_id: &str,
    ) -> Result<usize> {
        validate_chunks(parent_chunks)?;
        let chunks = process_chunks(self.chunker.as_ref(), parent_chunks, file_id).await?;
        if chunks.is_empty() {
            debug!(file_id, "Parents chunked to nothing");
            return Ok(0);
        }
        self.index_chunks(chunks).await
    }

    /// Embed, encode, and store pre-built chunks
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn index_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        validate_chunks(&chunks)?;

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let dense = self.cache.get_embeddings(&contents).await?;
        let sparse = self.sparse_encoder.encode_batch(&contents).await?;

        let points: Vec<Point> = chunks
            .iter()
            .zip(dense)
            .zip(sparse)
            .map(|((chunk, dense), sparse)| Point {
                id: Uuid::new_v4(),
                dense,
                sparse: sparse.vector,
                payload: ChunkPayload::from_chunk(chunk),
            })
            .collect();

        let written = self.manager.store(points).await?;
        info!(written, "Chunks indexed");
        Ok(written)
    }
}
