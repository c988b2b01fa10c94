//! External collaborator contracts.
//!
//! The pipeline consumes three services it does not implement: a page
//! renderer, an OCR service, and a storage/ingestion service. Each is an
//! `async_trait` object injected as `Arc<dyn _>` so callers bring their own
//! backends and tests bring scripted mocks. The pipeline never assumes
//! anything about a collaborator beyond the contract here.

use crate::artifact::ExtractedTextArtifact;
use image::DynamicImage;
use thiserror::Error;

// ── Page renderer ────────────────────────────────────────────────────────

/// Renderer failure for one page. Propagates as a page error, never fatal.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Converts one document page into an image suitable for OCR.
///
/// Rendering backends are typically CPU-bound native libraries; an
/// implementation wrapping one should move the work off the async runtime
/// (`tokio::task::spawn_blocking`) before returning.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render the given 1-indexed page.
    async fn render_page(&self, document: &[u8], page: u32) -> Result<DynamicImage, RenderError>;

    /// Total number of pages in the document.
    async fn page_count(&self, document: &[u8]) -> Result<u32, RenderError>;
}

// ── OCR service ──────────────────────────────────────────────────────────

/// A rendered page encoded for the OCR request body: lossless PNG plus its
/// base64 form (OCR APIs accept images inline in JSON).
#[derive(Debug, Clone)]
pub struct EncodedPage {
    /// 1-indexed page number.
    pub page: u32,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
    /// Base64 of `png`, ready for a JSON request body.
    pub base64: String,
}

/// OCR service failure. The transient/permanent split drives the retry
/// policy: transient errors are retried with backoff, everything else fails
/// the page immediately.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// HTTP 429-class response; back off and retry.
    #[error("OCR service rate-limited: {0}")]
    RateLimited(String),

    /// Service overloaded or briefly unavailable; retry.
    #[error("OCR service overloaded: {0}")]
    Overloaded(String),

    /// The service rejected this image's content; retrying cannot help.
    #[error("OCR service rejected content: {0}")]
    Rejected(String),

    /// Any other permanent failure.
    #[error("OCR call failed: {0}")]
    Failed(String),
}

impl OcrError {
    /// Whether the retry policy should attempt this page again.
    pub fn is_transient(&self) -> bool {
        matches!(self, OcrError::RateLimited(_) | OcrError::Overloaded(_))
    }
}

/// Sends one rendered page to the OCR service and returns recognized text.
#[async_trait::async_trait]
pub trait OcrService: Send + Sync {
    async fn recognize(&self, image: &EncodedPage) -> Result<String, OcrError>;
}

// ── Storage / ingestion service ──────────────────────────────────────────

/// Ingestion/storage failure. Probe failures degrade to the OCR path;
/// persist failures are fatal to the owning flush.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct IngestError(pub String);

/// Whether the document already carries machine-extractable text.
#[derive(Debug, Clone)]
pub enum ProbeStatus {
    /// Embedded text is usable; the pipeline short-circuits to this key.
    EmbeddedOk { extracted_key: String },
    /// No usable embedded text; run OCR.
    NeedsOcr,
}

/// Result of the embedded-text probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub page_count: u32,
}

/// Storage/ingestion collaborator: embedded-text probing plus artifact
/// persistence.
#[async_trait::async_trait]
pub trait IngestService: Send + Sync {
    /// Ask whether the document has machine-extractable text already.
    async fn probe_embedded_text(&self, document: &[u8]) -> Result<ProbeOutcome, IngestError>;

    /// Fetch a previously persisted artifact, if any.
    async fn fetch(&self, key: &str) -> Result<Option<ExtractedTextArtifact>, IngestError>;

    /// Persist the merged artifact under `key`, replacing any prior blob.
    async fn persist(&self, key: &str, artifact: &ExtractedTextArtifact)
        -> Result<(), IngestError>;
}
