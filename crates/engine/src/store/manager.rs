//! Vector store manager
//!
//! Owns the collection schema, connection retry, and batched writes. All
//! other engine components reach the store through this type so the
//! collection name and write policy live in exactly one place.

use super::{
    ChunkPayload, CollectionSchema, Point, PointFilter, QueryVector, ScoredPoint, ScrollPage,
    VectorStore,
};
use recall_common::config::StoreConfig;
use recall_common::errors::{EngineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Store manager wrapping a `VectorStore` backend
pub struct VectorStoreManager {
    store: Arc<dyn VectorStore>,
    config: StoreConfig,
}

impl VectorStoreManager {
    pub fn new(store: Arc<dyn VectorStore>, config: StoreConfig) -> Self {
        Self { store, config }
    }

    /// The managed collection name
    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    /// Configured upsert batch size
    pub fn upsert_batch_size(&self) -> usize {
        self.config.upsert_batch_size.max(1)
    }

    /// Probe the store until it answers, with exponentially increasing
    /// delay (base 1s, doubling) between attempts.
    pub async fn connect(&self) -> Result<()> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.store.health_check().await {
                Ok(()) => {
                    info!(attempt, "Vector store reachable");
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = Duration::from_secs(1 << (attempt - 1));
                        warn!(
                            attempt,
                            max_attempts = attempts,
                            delay_secs = delay.as_secs(),
                            error = %last_error,
                            "Vector store unreachable, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(EngineError::Connectivity {
            attempts,
            message: last_error,
        })
    }

    /// Create the collection if it does not exist. Safe to call from
    /// concurrent initializers.
    pub async fn ensure_collection(&self) -> Result<()> {
        let existing = self.store.list_collections().await?;
        if existing.iter().any(|name| name == &self.config.collection_name) {
            return Ok(());
        }

        let schema = CollectionSchema {
            name: self.config.collection_name.clone(),
            vector_size: self.config.vector_size,
            distance: self.config.distance,
        };

        info!(
            collection = %schema.name,
            vector_size = schema.vector_size,
            "Creating collection"
        );
        self.store.create_collection(&schema).await
    }

    /// Batched upsert with per-batch retry.
    ///
    /// Each batch is retried up to `write_retries` times with exponential
    /// backoff (base 1s). A batch that still fails surfaces
    /// `EngineError::Write`; earlier batches may already be durable, so the
    /// caller can detect the partial write by catching the error.
    pub async fn store(&self, points: Vec<Point>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let batch_size = self.upsert_batch_size();
        let total = points.len();
        let mut written = 0;

        let batches: Vec<Vec<Point>> = points
            .chunks(batch_size)
            .map(|batch| batch.to_vec())
            .collect();

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let batch_len = batch.len();
            self.upsert_with_retry(batch, batch_index).await?;
            written += batch_len;
        }

        info!(points = total, batches = total.div_ceil(batch_size), "Stored points");
        Ok(written)
    }

    async fn upsert_with_retry(&self, batch: Vec<Point>, batch_index: usize) -> Result<()> {
        let retries = self.config.write_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self
                .store
                .upsert(&self.config.collection_name, batch.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        batch_index,
                        attempt = attempt + 1,
                        max_retries = retries,
                        error = %last_error,
                        "Batch upsert failed"
                    );
                }
            }
        }

        Err(EngineError::Write {
            attempts: retries,
            message: last_error,
        })
    }

    /// Top-k search against the managed collection
    pub async fn search(
        &self,
        query: QueryVector,
        filter: &PointFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.store
            .search(&self.config.collection_name, query, filter, limit)
            .await
    }

    /// Cursor scan against the managed collection
    pub async fn scroll(
        &self,
        filter: &PointFilter,
        limit: usize,
        offset: Option<Uuid>,
    ) -> Result<ScrollPage> {
        self.store
            .scroll(&self.config.collection_name, filter, limit, offset)
            .await
    }

    /// Replace one point's payload
    pub async fn set_payload(&self, point_id: Uuid, payload: &ChunkPayload) -> Result<()> {
        self.store
            .set_payload(&self.config.collection_name, point_id, payload)
            .await
    }

    /// Bulk delete by point ids
    pub async fn delete(&self, point_ids: &[Uuid]) -> Result<()> {
        self.store
            .delete(&self.config.collection_name, point_ids)
            .await
    }
}
