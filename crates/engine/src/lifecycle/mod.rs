//! Point lifecycle management
//!
//! Bulk mutations over the collection: soft-delete and restore by document,
//! timestamp backfill, hard deletion, and age-based cleanup. All operations
//! stream scroll pages, mutating each page before fetching the next, so
//! only the current page is ever held in memory. Mutations are best-effort:
//! a point that fails to mutate is recorded in the report and skipped,
//! never retried inline, and never aborts the rest of the batch. Scroll
//! failures do abort, since the scan itself is broken at that point.

use crate::store::{ChunkPayload, PointFilter, StoredPoint, VectorStoreManager};
use chrono::{DateTime, Utc};
use recall_common::errors::Result;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Scroll page size for lifecycle scans
const SCROLL_PAGE_SIZE: usize = 300;

/// Sub-batch size for bulk deletes
const DELETE_BATCH_SIZE: usize = 100;

/// Source tag scanned by age-based cleanup; only ingested email threads
/// expire, uploaded documents stay until deleted explicitly
const CLEANUP_SOURCE: &str = "gmail_thread";

/// Outcome of one bulk lifecycle operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleReport {
    /// Points the scan selected for mutation
    pub attempted: usize,
    /// Points mutated successfully
    pub succeeded: usize,
    /// Points whose mutation failed and was skipped
    pub failed_ids: Vec<Uuid>,
}

impl LifecycleReport {
    /// True when every selected point was mutated
    pub fn is_complete(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

/// Bulk mutation operations over the managed collection
pub struct LifecycleManager {
    manager: Arc<VectorStoreManager>,
}

impl LifecycleManager {
    pub fn new(manager: Arc<VectorStoreManager>) -> Self {
        Self { manager }
    }

    /// Soft-delete every point of a document
    pub async fn mark_deleted(&self, file_id: &str) -> Result<LifecycleReport> {
        self.update_is_deleted_flag(file_id, true).await
    }

    /// Restore every point of a document
    pub async fn restore(&self, file_id: &str) -> Result<LifecycleReport> {
        self.update_is_deleted_flag(file_id, false).await
    }

    /// Set the soft-delete flag on every point of a document.
    ///
    /// Points already in the target state are skipped without counting as
    /// attempted, so repeating the call is harmless.
    #[instrument(skip(self))]
    pub async fn update_is_deleted_flag(
        &self,
        file_id: &str,
        deleted: bool,
    ) -> Result<LifecycleReport> {
        let report = self
            .patch_matching(&PointFilter::by_file_id(file_id), |payload| {
                if payload.is_deleted == deleted {
                    return false;
                }
                payload.is_deleted = deleted;
                true
            })
            .await?;

        info!(
            file_id,
            deleted,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Soft-delete flag updated"
        );
        Ok(report)
    }

    /// Backfill `file_created_at` on every point of a document
    #[instrument(skip(self))]
    pub async fn update_file_created_at(
        &self,
        file_id: &str,
        file_created_at: &str,
    ) -> Result<LifecycleReport> {
        let report = self
            .patch_matching(&PointFilter::by_file_id(file_id), |payload| {
                if payload.file_created_at.as_deref() == Some(file_created_at) {
                    return false;
                }
                payload.file_created_at = Some(file_created_at.to_string());
                true
            })
            .await?;

        info!(
            file_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Creation timestamp backfilled"
        );
        Ok(report)
    }

    /// Hard-delete every point of a document, soft-deleted ones included
    #[instrument(skip(self))]
    pub async fn delete_by_file_id(&self, file_id: &str) -> Result<LifecycleReport> {
        let report = self
            .delete_matching(&PointFilter::by_file_id(file_id), |_| true)
            .await?;

        info!(
            file_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Document deleted"
        );
        Ok(report)
    }

    /// Hard-delete every point of one embedding boundary.
    ///
    /// The boundary key is the composite `file_id` (for email threads,
    /// `"{thread_id},{last_processed_message_id}"`), so this is document
    /// deletion under the boundary's identifier.
    pub async fn delete_by_embedding_id(&self, embedding_id: &str) -> Result<LifecycleReport> {
        self.delete_by_file_id(embedding_id).await
    }

    /// Hard-delete every email-thread point whose source document predates
    /// `cutoff`.
    ///
    /// Points without a parsable `file_created_at` are left alone; age
    /// cannot be established for them.
    #[instrument(skip(self))]
    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<LifecycleReport> {
        let report = self
            .delete_matching(&PointFilter::by_source(CLEANUP_SOURCE), |point| {
                let Some(raw) = point.payload.file_created_at.as_deref() else {
                    return false;
                };
                match DateTime::parse_from_rfc3339(raw) {
                    Ok(created_at) => created_at.with_timezone(&Utc) < cutoff,
                    Err(e) => {
                        warn!(
                            point_id = %point.id,
                            file_created_at = raw,
                            error = %e,
                            "Unparsable timestamp, point kept"
                        );
                        false
                    }
                }
            })
            .await?;

        info!(
            cutoff = %cutoff,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Cleanup finished"
        );
        Ok(report)
    }

    /// Rewrite the payload of every matching point, one scroll page at a
    /// time. `apply` edits the payload in place and returns whether the
    /// point needs writing; untouched points do not count as attempted.
    async fn patch_matching<F>(&self, filter: &PointFilter, mut apply: F) -> Result<LifecycleReport>
    where
        F: FnMut(&mut ChunkPayload) -> bool + Send,
    {
        let mut report = LifecycleReport::default();
        let mut offset = None;

        loop {
            let page = self
                .manager
                .scroll(filter, SCROLL_PAGE_SIZE, offset)
                .await?;

            for point in page.points {
                let mut payload = point.payload;
                if !apply(&mut payload) {
                    continue;
                }

                report.attempted += 1;
                match self.manager.set_payload(point.id, &payload).await {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        warn!(point_id = %point.id, error = %e, "Payload update failed, skipping");
                        report.failed_ids.push(point.id);
                    }
                }
            }

            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(report)
    }

    /// Delete every selected point, one scroll page at a time, in
    /// sub-batches; a failed batch marks all its ids failed. Deleting
    /// already-returned points cannot move the scroll cursor.
    async fn delete_matching<F>(
        &self,
        filter: &PointFilter,
        mut select: F,
    ) -> Result<LifecycleReport>
    where
        F: FnMut(&StoredPoint) -> bool + Send,
    {
        let mut report = LifecycleReport::default();
        let mut offset = None;

        loop {
            let page = self
                .manager
                .scroll(filter, SCROLL_PAGE_SIZE, offset)
                .await?;

            let ids: Vec<Uuid> = page
                .points
                .iter()
                .filter(|p| select(p))
                .map(|p| p.id)
                .collect();

            for batch in ids.chunks(DELETE_BATCH_SIZE) {
                report.attempted += batch.len();
                match self.manager.delete(batch).await {
                    Ok(()) => report.succeeded += batch.len(),
                    Err(e) => {
                        warn!(batch_len = batch.len(), error = %e, "Delete batch failed, skipping");
                        report.failed_ids.extend_from_slice(batch);
                    }
                }
            }

            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(report)
    }
}
