//! Pipeline stages and the [`DocumentPipeline`] facade.
//!
//! Each submodule implements exactly one stage; keeping stages separate
//! makes each independently testable and lets backends be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ probe ──▶ scheduler ──▶ render ──▶ encode ──▶ ocr ──▶ finalize
//! (hash)  (fast path) (bounded ∥)  (trait)    (base64)  (retry)  (batched)
//! ```
//!
//! 1. [`probe`]     - content hash + embedded-text fast path
//! 2. [`scheduler`] - one task per page, at most `concurrency` in flight
//! 3. [`encode`]    - PNG/base64 wrap of the rendered page
//! 4. [`ocr`]       - the only stage with retried network I/O
//! 5. [`finalize`]  - batched, idempotent merge into the artifact
//!
//! The facade stitches these together under a per-run
//! [`CancellationToken`], checkpoints progress into the session store after
//! every range, and hands back an early answer as soon as enough pages are
//! merged, with the remainder exposed as an explicit [`RemainderHandle`]
//! rather than a fire-and-forget task.

pub mod encode;
pub mod finalize;
pub mod ocr;
pub mod probe;
pub mod scheduler;

use crate::artifact::{ExtractedTextArtifact, PageEntry};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::finalize::BatchFinalizer;
use crate::pipeline::ocr::PageOutcome;
use crate::policy::{self, Phase};
use crate::services::{IngestService, OcrService, PageRenderer, ProbeStatus};
use crate::session::{
    ContentHash, ContinuationRange, DocumentSession, PageRange, SessionStore, SessionStoreError,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Outcomes ─────────────────────────────────────────────────────────────

/// Terminal disposition of one range run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every page in the requested range reached a terminal outcome and
    /// was finalized.
    Complete,
    /// An early answer was returned; the remainder is still processing
    /// behind the attached [`RemainderHandle`].
    Partial,
    /// Cancellation was observed; unfinalized results were discarded.
    Cancelled,
}

/// Final accounting for one processed range.
#[derive(Debug)]
pub struct RangeSummary {
    pub range: PageRange,
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub extracted_key: String,
    pub status: RunStatus,
}

/// Join handle for the pages still processing after an early answer.
///
/// The caller decides the join point: `join().await` to wait for full
/// coverage, or `detach()` to let the remainder finish on its own (progress
/// still checkpoints through the session store either way).
#[derive(Debug)]
pub struct RemainderHandle {
    handle: JoinHandle<Result<RangeSummary, PipelineError>>,
}

impl RemainderHandle {
    /// Wait for the remainder of the range to finish.
    pub async fn join(self) -> Result<RangeSummary, PipelineError> {
        self.handle
            .await
            .map_err(|e| PipelineError::Internal(format!("range driver panicked: {e}")))?
    }

    /// Let the remainder run unobserved.
    pub fn detach(self) {
        drop(self.handle);
    }
}

/// Result of [`DocumentPipeline::start`].
#[derive(Debug)]
pub enum StartOutcome {
    /// The document carries machine-readable text; nothing was rendered or
    /// OCR'd.
    Embedded {
        content_hash: ContentHash,
        extracted_key: String,
        page_count: u32,
    },
    /// OCR ran (or is still running past an early answer).
    Ocr(OcrRunOutcome),
}

impl StartOutcome {
    /// The artifact key, whichever path produced it.
    pub fn extracted_key(&self) -> &str {
        match self {
            StartOutcome::Embedded { extracted_key, .. } => extracted_key,
            StartOutcome::Ocr(o) => &o.extracted_key,
        }
    }
}

/// Result of an OCR range run (`start` on the OCR path, or `resume`).
#[derive(Debug)]
pub struct OcrRunOutcome {
    pub content_hash: ContentHash,
    pub extracted_key: String,
    /// Pages already merged into the artifact when this was returned.
    pub pages_ready: usize,
    pub pages_failed: usize,
    pub status: RunStatus,
    /// Present when some pages failed; the artifact contains inline markers.
    pub warning: Option<String>,
    /// Offer to process the next chunk when the page cap truncated the run.
    pub continuation: Option<ContinuationRange>,
    /// Present when `status == Partial`.
    pub remainder: Option<RemainderHandle>,
}

// ── Facade ───────────────────────────────────────────────────────────────

/// The resumable document OCR pipeline.
///
/// Owns no backends: renderer, OCR service, ingest store, and session
/// store are injected. One logical owner mutates a session at a time;
/// concurrent runs for the same content hash are refused.
pub struct DocumentPipeline {
    renderer: Arc<dyn PageRenderer>,
    ocr: Arc<dyn OcrService>,
    ingest: Arc<dyn IngestService>,
    sessions: Arc<dyn SessionStore>,
    config: PipelineConfig,
    active: Arc<Mutex<HashMap<ContentHash, CancellationToken>>>,
}

impl DocumentPipeline {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        ocr: Arc<dyn OcrService>,
        ingest: Arc<dyn IngestService>,
        sessions: Arc<dyn SessionStore>,
        config: PipelineConfig,
    ) -> Self {
        DocumentPipeline {
            renderer,
            ocr,
            ingest,
            sessions,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ingest a document: fast-path to embedded text, or OCR up to
    /// `page_cap` pages from the session's checkpoint.
    ///
    /// Returns as soon as the early-answer threshold is met; the rest of
    /// the range keeps processing behind the outcome's `remainder` handle.
    /// A persisted session for the same bytes resumes from its checkpoint;
    /// a cancelled one is reset to a fresh run.
    pub async fn start(
        &self,
        document: &[u8],
        filename: &str,
        page_cap: u32,
    ) -> Result<StartOutcome, PipelineError> {
        if page_cap == 0 {
            return Err(PipelineError::InvalidConfig("page_cap must be >= 1".into()));
        }

        let mut phase = Phase::Init;
        phase.advance(Phase::Hashing);
        let hash = ContentHash::of(document);
        info!("Starting ingestion of '{}' ({})", filename, hash);

        let existing = self.load_session(&hash, "start").await?;
        let session = match existing {
            Some(s) if s.cancelled => {
                debug!("Session {} was cancelled; resetting to a fresh run", hash);
                None
            }
            Some(s) if s.is_complete() => {
                // Everything already extracted in a previous invocation.
                let key = s
                    .extracted_key
                    .clone()
                    .unwrap_or_else(|| ExtractedTextArtifact::key_for(&hash));
                return Ok(StartOutcome::Ocr(OcrRunOutcome {
                    content_hash: hash,
                    extracted_key: key,
                    pages_ready: s.page_count as usize,
                    pages_failed: 0,
                    status: RunStatus::Complete,
                    warning: None,
                    continuation: None,
                    remainder: None,
                }));
            }
            other => other,
        };

        let session = match session {
            Some(s) => {
                debug!(
                    "Resuming session {} from page {} of {}",
                    hash, s.next_page_start, s.page_count
                );
                s
            }
            None => {
                phase.advance(Phase::Probing);
                let outcome = probe::probe_document(&self.ingest, &self.renderer, document).await?;
                if let ProbeStatus::EmbeddedOk { extracted_key } = outcome.status {
                    phase.advance(Phase::EmbeddedReady);
                    let s = DocumentSession::embedded(
                        hash.clone(),
                        filename,
                        outcome.page_count,
                        extracted_key.clone(),
                    );
                    self.store_session(s, "start").await?;
                    info!("Embedded text fast path for {}", hash);
                    return Ok(StartOutcome::Embedded {
                        content_hash: hash,
                        extracted_key,
                        page_count: outcome.page_count,
                    });
                }
                if outcome.page_count == 0 {
                    return Err(PipelineError::EmptyDocument {
                        filename: filename.to_string(),
                    });
                }
                let s = DocumentSession::new(hash.clone(), filename, outcome.page_count);
                self.store_session(s.clone(), "start").await?;
                s
            }
        };

        let plan = policy::plan_range(&session, page_cap).ok_or_else(|| {
            PipelineError::Internal(format!("no plannable range for incomplete session {hash}"))
        })?;

        let outcome = self
            .run_ocr_range(document, session, plan.range, plan.continuation)
            .await?;
        Ok(StartOutcome::Ocr(outcome))
    }

    /// Process the next chunk of a previously started document.
    ///
    /// The session persisted under the document's hash carries the
    /// checkpoint, so continuation works across independent invocations.
    /// A missing session is fatal to this call: the caller must re-submit
    /// through [`start`](Self::start).
    pub async fn resume(
        &self,
        document: &[u8],
        range: PageRange,
    ) -> Result<OcrRunOutcome, PipelineError> {
        let hash = ContentHash::of(document);
        info!("Resuming {} for range {}", hash, range);

        let session = self
            .load_session(&hash, "resume")
            .await?
            .ok_or_else(|| PipelineError::SessionNotFound {
                content_hash: hash.to_string(),
            })?;

        if session.cancelled {
            return Err(PipelineError::SessionCancelled {
                content_hash: hash.to_string(),
            });
        }
        if range.end > session.page_count || range.start > session.next_page_start {
            return Err(PipelineError::RangeOutOfBounds {
                content_hash: hash.to_string(),
                start: range.start,
                end: range.end,
                page_count: session.page_count,
                next_page_start: session.next_page_start,
            });
        }

        let continuation =
            policy::continuation_after(range.end, session.page_count, range.len());
        self.run_ocr_range(document, session, range, continuation)
            .await
    }

    /// Request cancellation for the document's in-flight run, or mark an
    /// idle session cancelled.
    ///
    /// Cooperative: in-flight page work stops at its next suspension point
    /// and nothing observed after the cancel is finalized. Returns `true`
    /// when a session or run existed for the hash.
    pub async fn cancel(&self, hash: &ContentHash) -> Result<bool, PipelineError> {
        if let Some(token) = self.active.lock().await.get(hash) {
            info!("Cancelling in-flight run for {}", hash);
            token.cancel();
            return Ok(true);
        }

        match self.load_session(hash, "cancel").await? {
            Some(mut s) => {
                s.cancelled = true;
                self.store_session(s, "cancel").await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Dispatch one range: spawn the driver, wait for the early answer (or
    /// completion, whichever comes first), and package the outcome.
    async fn run_ocr_range(
        &self,
        document: &[u8],
        session: DocumentSession,
        range: PageRange,
        continuation: Option<ContinuationRange>,
    ) -> Result<OcrRunOutcome, PipelineError> {
        let hash = session.content_hash.clone();

        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if active.contains_key(&hash) {
                return Err(PipelineError::RunInFlight {
                    content_hash: hash.to_string(),
                });
            }
            active.insert(hash.clone(), cancel.clone());
        }

        let driver = RangeDriver {
            renderer: Arc::clone(&self.renderer),
            ocr: Arc::clone(&self.ocr),
            ingest: Arc::clone(&self.ingest),
            sessions: Arc::clone(&self.sessions),
            config: self.config.clone(),
            document: Arc::new(document.to_vec()),
            session,
            range,
            cancel,
        };

        let (early_tx, early_rx) = oneshot::channel();
        let active = Arc::clone(&self.active);
        let cleanup_hash = hash.clone();
        let handle = tokio::spawn(async move {
            let result = driver.run(early_tx).await;
            active.lock().await.remove(&cleanup_hash);
            result
        });

        let extracted_key = ExtractedTextArtifact::key_for(&hash);

        let snapshot = match early_rx.await {
            Ok(s) => s,
            // Driver exited without an early answer: a fatal error.
            Err(_) => {
                let err = match handle.await {
                    Ok(Ok(summary)) => {
                        return Err(PipelineError::Internal(format!(
                            "range driver for {} finished silently ({:?})",
                            hash, summary.status
                        )))
                    }
                    Ok(Err(e)) => e,
                    Err(e) => PipelineError::Internal(format!("range driver panicked: {e}")),
                };
                return Err(err);
            }
        };

        if snapshot.finished {
            // Range already finished (completed or cancelled) before or at
            // the early-answer threshold; surface the final summary.
            let summary = RemainderHandle { handle }.join().await?;
            return Ok(OcrRunOutcome {
                content_hash: hash,
                extracted_key: summary.extracted_key,
                pages_ready: summary.pages_ok + summary.pages_failed,
                pages_failed: summary.pages_failed,
                status: summary.status,
                warning: failure_warning(summary.pages_failed, range.len()),
                continuation: match summary.status {
                    RunStatus::Cancelled => None,
                    _ => continuation,
                },
                remainder: None,
            });
        }

        Ok(OcrRunOutcome {
            content_hash: hash,
            extracted_key,
            pages_ready: snapshot.pages_ready,
            pages_failed: snapshot.pages_failed,
            status: RunStatus::Partial,
            warning: failure_warning(snapshot.pages_failed, range.len()),
            continuation,
            remainder: Some(RemainderHandle { handle }),
        })
    }

    async fn load_session(
        &self,
        hash: &ContentHash,
        stage: &'static str,
    ) -> Result<Option<DocumentSession>, PipelineError> {
        self.sessions
            .get(hash)
            .await
            .map_err(|e| store_error(hash, stage, e))
    }

    async fn store_session(
        &self,
        session: DocumentSession,
        stage: &'static str,
    ) -> Result<(), PipelineError> {
        let hash = session.content_hash.clone();
        self.sessions
            .put(session)
            .await
            .map_err(|e| store_error(&hash, stage, e))
    }
}

fn store_error(hash: &ContentHash, stage: &'static str, e: SessionStoreError) -> PipelineError {
    PipelineError::SessionStoreFailed {
        content_hash: hash.to_string(),
        stage,
        detail: e.to_string(),
    }
}

fn failure_warning(failed: usize, range_len: u32) -> Option<String> {
    (failed > 0).then(|| {
        format!("{failed} of {range_len} pages failed OCR; artifact contains inline failure markers")
    })
}

// ── Range driver ─────────────────────────────────────────────────────────

/// Early-answer notification from the driver to the caller-facing future.
struct EarlySnapshot {
    pages_ready: usize,
    pages_failed: usize,
    /// True when the range is already finished (no remainder exists).
    finished: bool,
}

/// Owns one range dispatch end to end: consume scheduler outcomes, feed
/// the finalizer, fire the early answer, checkpoint the session.
struct RangeDriver {
    renderer: Arc<dyn PageRenderer>,
    ocr: Arc<dyn OcrService>,
    ingest: Arc<dyn IngestService>,
    sessions: Arc<dyn SessionStore>,
    config: PipelineConfig,
    document: Arc<Vec<u8>>,
    session: DocumentSession,
    range: PageRange,
    cancel: CancellationToken,
}

impl RangeDriver {
    async fn run(
        mut self,
        early_tx: oneshot::Sender<EarlySnapshot>,
    ) -> Result<RangeSummary, PipelineError> {
        let mut phase = Phase::OcrRunning;
        let range = self.range;
        let threshold =
            policy::early_answer_threshold(self.config.early_answer_pages, range.len());

        if let Some(ref progress) = self.config.progress {
            progress.on_range_start(range.start, range.end);
        }

        let mut finalizer = BatchFinalizer::new(
            Arc::clone(&self.ingest),
            self.session.content_hash.clone(),
            self.session.filename.clone(),
            self.session.page_count,
            self.config.batch_size,
        );

        let mut stream = std::pin::pin!(scheduler::run_range(
            Arc::clone(&self.renderer),
            Arc::clone(&self.ocr),
            Arc::clone(&self.document),
            range,
            self.config.clone(),
            self.cancel.clone(),
        ));

        let mut pages_ok = 0usize;
        let mut pages_failed = 0usize;
        let mut first_error: Option<String> = None;
        let mut early_tx = Some(early_tx);
        let mut cancelled = false;

        while let Some(outcome) = stream.next().await {
            // A cancel observed at any point poisons the rest of the range:
            // results that raced past the token check are discarded, never
            // finalized.
            if self.cancel.is_cancelled() {
                cancelled = true;
            }
            if cancelled {
                continue;
            }

            match outcome {
                PageOutcome::Done(success) => {
                    pages_ok += 1;
                    if let Some(ref progress) = self.config.progress {
                        progress.on_page_done(success.page, success.text.len());
                    }
                    finalizer
                        .push(PageEntry {
                            page: success.page,
                            text: success.text,
                        })
                        .await?;
                }
                PageOutcome::Failed(err) => {
                    pages_failed += 1;
                    warn!("Page {} failed permanently: {}", err.page(), err);
                    if let Some(ref progress) = self.config.progress {
                        progress.on_page_failed(err.page(), err.to_string());
                    }
                    if first_error.is_none() {
                        first_error = Some(err.to_string());
                    }
                    finalizer
                        .push(PageEntry {
                            page: err.page(),
                            text: err.as_marker(),
                        })
                        .await?;
                }
                PageOutcome::Cancelled { page } => {
                    debug!("Page {} observed cancellation", page);
                    cancelled = true;
                    continue;
                }
            }

            let terminal = pages_ok + pages_failed;
            if early_tx.is_some() && terminal >= threshold && terminal < range.len() as usize {
                // Suspension point: the flush persists over the network.
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    continue;
                }
                finalizer.flush().await?;
                phase.advance(Phase::OcrPartialReady);
                if let Some(ref progress) = self.config.progress {
                    progress.on_early_answer(terminal);
                }
                info!(
                    "Early answer for {}: {}/{} pages ready",
                    self.session.content_hash,
                    terminal,
                    range.len()
                );
                if let Some(tx) = early_tx.take() {
                    let _ = tx.send(EarlySnapshot {
                        pages_ready: terminal,
                        pages_failed,
                        finished: false,
                    });
                }
            }
        }

        if cancelled || self.cancel.is_cancelled() {
            return self.finish_cancelled(phase, finalizer, early_tx).await;
        }

        if pages_ok == 0 && self.session.processed_ranges.is_empty() {
            // Nothing usable was produced and there is no prior progress to
            // fall back on; fail the request rather than hand back an
            // artifact of nothing but markers.
            return Err(PipelineError::AllPagesFailed {
                range,
                total: range.len() as usize,
                first_error: first_error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let extracted_key = finalizer.finish().await?;
        self.session.record_range(range);
        self.session.extracted_key = Some(extracted_key.clone());
        let hash = self.session.content_hash.clone();
        self.sessions
            .put(self.session)
            .await
            .map_err(|e| store_error(&hash, "checkpoint", e))?;
        phase.advance(Phase::OcrComplete);

        if let Some(ref progress) = self.config.progress {
            progress.on_range_complete(pages_ok, pages_failed);
        }
        info!(
            "Range {} complete for {}: {} ok, {} failed",
            range, hash, pages_ok, pages_failed
        );

        if let Some(tx) = early_tx {
            let _ = tx.send(EarlySnapshot {
                pages_ready: pages_ok + pages_failed,
                pages_failed,
                finished: true,
            });
        }

        Ok(RangeSummary {
            range,
            pages_ok,
            pages_failed,
            extracted_key,
            status: RunStatus::Complete,
        })
    }

    async fn finish_cancelled(
        mut self,
        mut phase: Phase,
        mut finalizer: BatchFinalizer,
        early_tx: Option<oneshot::Sender<EarlySnapshot>>,
    ) -> Result<RangeSummary, PipelineError> {
        finalizer.discard_pending();
        phase.advance(Phase::Cancelled);

        self.session.cancelled = true;
        let hash = self.session.content_hash.clone();
        self.sessions
            .put(self.session)
            .await
            .map_err(|e| store_error(&hash, "cancel checkpoint", e))?;
        info!("Range {} cancelled for {}", self.range, hash);

        let flushed = finalizer.pages_flushed();
        if let Some(tx) = early_tx {
            let _ = tx.send(EarlySnapshot {
                pages_ready: flushed,
                pages_failed: 0,
                finished: true,
            });
        }
        if let Some(ref progress) = self.config.progress {
            progress.on_range_complete(flushed, 0);
        }

        Ok(RangeSummary {
            range: self.range,
            pages_ok: flushed,
            pages_failed: 0,
            extracted_key: finalizer.key().to_string(),
            status: RunStatus::Cancelled,
        })
    }
}
