//! Error types for the pagetext library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`], **fatal**: the request cannot proceed at all
//!   (missing session on resume, a range the session cannot accept,
//!   persistence failures). Returned as `Err(PipelineError)` from the
//!   top-level [`crate::pipeline::DocumentPipeline`] methods.
//!
//! * [`PageError`], **non-fatal**: a single page failed (render glitch,
//!   OCR retries exhausted) but the rest of the range is fine. The failure
//!   is merged into the extracted-text artifact as a visible
//!   `"OCR failed for page N: <reason>"` marker so a human reviewing the
//!   output knows coverage is incomplete.
//!
//! Cancellation is deliberately neither: it is a distinct outcome
//! ([`crate::pipeline::RunStatus::Cancelled`]), never mixed into failure
//! handling.

use crate::session::PageRange;
use thiserror::Error;

/// All fatal errors returned by the pagetext library.
///
/// Page-level failures use [`PageError`] and are recovered locally rather
/// than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Session errors ────────────────────────────────────────────────────
    /// A resume was requested for a hash with no persisted session.
    ///
    /// Continuation cannot proceed without the session's checkpoint, so the
    /// caller must re-submit the source document via `start`.
    #[error(
        "no session found for content hash {content_hash}; \
         re-submit the source document with start()"
    )]
    SessionNotFound { content_hash: String },

    /// The persisted session is marked cancelled; `resume` refuses it.
    #[error("session {content_hash} was cancelled; call start() to begin a fresh run")]
    SessionCancelled { content_hash: String },

    /// A run for this hash is already in flight; concurrent runs against
    /// one session are not supported and must be serialized by the caller.
    #[error("a run is already in flight for content hash {content_hash}")]
    RunInFlight { content_hash: String },

    /// The requested range does not fit the session's page count or skips
    /// ahead of the checkpoint.
    #[error(
        "range {start}-{end} is invalid for session {content_hash} \
         ({page_count} pages, next unprocessed page {next_page_start})"
    )]
    RangeOutOfBounds {
        content_hash: String,
        start: u32,
        end: u32,
        page_count: u32,
        next_page_start: u32,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The renderer could not open the document at all.
    #[error("document could not be opened for {stage}: {detail}")]
    DocumentUnreadable { stage: &'static str, detail: String },

    /// The document reports zero pages; there is nothing to process.
    #[error("document '{filename}' has no pages")]
    EmptyDocument { filename: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The session store failed; progress cannot be checkpointed.
    #[error("session store failed during {stage} for {content_hash}: {detail}")]
    SessionStoreFailed {
        content_hash: String,
        stage: &'static str,
        detail: String,
    },

    /// Persisting the merged artifact failed.
    #[error("failed to persist artifact {extracted_key} for {content_hash}: {detail}")]
    PersistFailed {
        content_hash: String,
        extracted_key: String,
        detail: String,
    },

    /// Every page in the range failed; there is no artifact worth returning.
    #[error("all {total} pages in range {range} failed; first error: {first_error}")]
    AllPagesFailed {
        range: PageRange,
        total: usize,
        first_error: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, closed channel).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The owning range continues; the failure is rendered into the artifact
/// via [`PageError::as_marker`] at the page's position.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The rendering collaborator failed for this page.
    #[error("page {page}: render failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// The OCR service failed after all attempts.
    #[error("page {page}: OCR failed after {attempts} attempts: {detail}")]
    OcrFailed {
        page: u32,
        attempts: u32,
        detail: String,
    },

    /// The OCR service permanently rejected this page's image.
    #[error("page {page}: OCR rejected content: {detail}")]
    Rejected { page: u32, detail: String },
}

impl PageError {
    /// 1-indexed page this error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::OcrFailed { page, .. }
            | PageError::Rejected { page, .. } => *page,
        }
    }

    /// The inline text recorded in the artifact in place of the page's text.
    ///
    /// The marker keeps failed pages visible in merged output instead of
    /// silently shrinking coverage.
    pub fn as_marker(&self) -> String {
        let reason = match self {
            PageError::RenderFailed { detail, .. } => detail,
            PageError::OcrFailed { detail, .. } => detail,
            PageError::Rejected { detail, .. } => detail,
        };
        format!("OCR failed for page {}: {}", self.page(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_mentions_resubmit() {
        let e = PipelineError::SessionNotFound {
            content_hash: "abc123".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("re-submit"), "got: {msg}");
    }

    #[test]
    fn range_out_of_bounds_display() {
        let e = PipelineError::RangeOutOfBounds {
            content_hash: "abc".into(),
            start: 16,
            end: 30,
            page_count: 20,
            next_page_start: 16,
        };
        let msg = e.to_string();
        assert!(msg.contains("16-30"));
        assert!(msg.contains("20 pages"));
    }

    #[test]
    fn page_error_marker_format() {
        let e = PageError::OcrFailed {
            page: 4,
            attempts: 3,
            detail: "service overloaded".into(),
        };
        assert_eq!(e.as_marker(), "OCR failed for page 4: service overloaded");
        assert_eq!(e.page(), 4);
    }

    #[test]
    fn render_failure_marker_carries_page() {
        let e = PageError::RenderFailed {
            page: 9,
            detail: "bitmap allocation failed".into(),
        };
        assert!(e.as_marker().starts_with("OCR failed for page 9:"));
    }
}
