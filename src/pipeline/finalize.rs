//! Batch finalization: persist completed pages as the merged artifact.
//!
//! Completed pages accumulate into small batches (default 5) and flush when
//! the batch fills or the range ends, bounding the work lost if the process
//! is interrupted mid-range. Each flush is a load-merge-persist against the
//! artifact's content-addressed key, so flushing is idempotent per page and
//! monotonic across ranges; invariants enforced by
//! [`ExtractedTextArtifact::merge`], exercised here.

use crate::artifact::{ExtractedTextArtifact, PageEntry};
use crate::error::PipelineError;
use crate::services::IngestService;
use crate::session::ContentHash;
use std::sync::Arc;
use tracing::{debug, info};

/// Accumulates page results for one range and flushes them in batches.
pub(crate) struct BatchFinalizer {
    ingest: Arc<dyn IngestService>,
    key: String,
    content_hash: ContentHash,
    filename: String,
    total_pages: u32,
    batch: Vec<PageEntry>,
    batch_size: usize,
    pages_flushed: usize,
}

impl BatchFinalizer {
    pub fn new(
        ingest: Arc<dyn IngestService>,
        content_hash: ContentHash,
        filename: impl Into<String>,
        total_pages: u32,
        batch_size: usize,
    ) -> Self {
        let key = ExtractedTextArtifact::key_for(&content_hash);
        BatchFinalizer {
            ingest,
            key,
            content_hash,
            filename: filename.into(),
            total_pages,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            pages_flushed: 0,
        }
    }

    /// The artifact key every flush targets.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pages persisted so far (flushed batches only).
    pub fn pages_flushed(&self) -> usize {
        self.pages_flushed
    }

    /// Queue one completed page; flushes when the batch fills.
    pub async fn push(&mut self, entry: PageEntry) -> Result<(), PipelineError> {
        self.batch.push(entry);
        if self.batch.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Persist the pending batch, merging into the existing artifact.
    ///
    /// Suspension point: the persist call. The caller checks cancellation
    /// before invoking this.
    pub async fn flush(&mut self) -> Result<(), PipelineError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let mut artifact = self
            .ingest
            .fetch(&self.key)
            .await
            .map_err(|e| self.persist_error(e.to_string()))?
            .unwrap_or_else(|| {
                ExtractedTextArtifact::new(
                    self.content_hash.clone(),
                    self.filename.clone(),
                    self.total_pages,
                )
            });

        let count = self.batch.len();
        artifact.merge(self.batch.drain(..));
        self.ingest
            .persist(&self.key, &artifact)
            .await
            .map_err(|e| self.persist_error(e.to_string()))?;

        self.pages_flushed += count;
        debug!(
            "Flushed {} pages to {} ({} total in artifact)",
            count,
            self.key,
            artifact.page_count()
        );
        Ok(())
    }

    /// Flush any remainder and return the artifact key.
    pub async fn finish(mut self) -> Result<String, PipelineError> {
        self.flush().await?;
        info!("Finalized {} pages under {}", self.pages_flushed, self.key);
        Ok(self.key)
    }

    /// Drop queued pages without persisting them (cancellation).
    pub fn discard_pending(&mut self) {
        self.batch.clear();
    }

    fn persist_error(&self, detail: String) -> PipelineError {
        PipelineError::PersistFailed {
            content_hash: self.content_hash.to_string(),
            extracted_key: self.key.clone(),
            detail,
        }
    }
}
