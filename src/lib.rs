//! # pagetext
//!
//! Resumable, concurrency-bounded document OCR pipeline.
//!
//! ## Why this crate?
//!
//! Turning a large scanned document into searchable text means coordinating
//! bounded parallel work against a rate-limited OCR service, tolerating
//! failures page by page, checkpointing progress so an interrupted range
//! can be resumed, and producing a usable partial answer long before the
//! last page finishes. This crate is that coordination layer and nothing
//! else: rendering, OCR, and storage are caller-supplied collaborators.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document bytes
//!  │
//!  ├─ 1. Identify   blake3 content hash keys all state
//!  ├─ 2. Probe      embedded text? short-circuit, no page is ever rendered
//!  ├─ 3. Schedule   page tasks, at most `concurrency` in flight
//!  ├─ 4. Recognize  per-page OCR with retry/backoff, failures kept inline
//!  ├─ 5. Finalize   batched merge into one page-ordered artifact
//!  └─ 6. Answer     early result at ~3 pages; continuation when capped
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagetext::{DocumentPipeline, MemorySessionStore, PipelineConfig, StartOutcome};
//! use std::sync::Arc;
//! # use pagetext::{IngestService, OcrService, PageRenderer};
//! # fn collaborators() -> (Arc<dyn PageRenderer>, Arc<dyn OcrService>, Arc<dyn IngestService>) { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (renderer, ocr, ingest) = collaborators();
//!     let pipeline = DocumentPipeline::new(
//!         renderer,
//!         ocr,
//!         ingest,
//!         MemorySessionStore::new(),
//!         PipelineConfig::default(),
//!     );
//!
//!     let bytes = std::fs::read("scan.pdf")?;
//!     match pipeline.start(&bytes, "scan.pdf", 15).await? {
//!         StartOutcome::Embedded { extracted_key, .. } => {
//!             println!("already extracted: {extracted_key}");
//!         }
//!         StartOutcome::Ocr(outcome) => {
//!             println!("early answer: {}", outcome.extracted_key);
//!             if let Some(remainder) = outcome.remainder {
//!                 remainder.join().await?; // or .detach()
//!             }
//!             if let Some(next) = outcome.continuation {
//!                 let more = pipeline.resume(&bytes, next.range()).await?;
//!                 println!("continued: {}", more.extracted_key);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! * The merged artifact is always ordered by page index, whatever the
//!   completion order was.
//! * Finalizing a page twice never duplicates it; merging a later range
//!   never erases an earlier one.
//! * A page that keeps failing transiently is attempted exactly
//!   `max_attempts` times, then surfaces inline as
//!   `"OCR failed for page N: <reason>"`.
//! * After `cancel()`, no new page task starts and nothing observed after
//!   the cancel is finalized.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod services;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{ExtractedTextArtifact, PageEntry};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{PageError, PipelineError};
pub use pipeline::{
    DocumentPipeline, OcrRunOutcome, RangeSummary, RemainderHandle, RunStatus, StartOutcome,
};
pub use progress::{NoopProgress, PipelineProgress};
pub use services::{
    EncodedPage, IngestError, IngestService, OcrError, OcrService, PageRenderer, ProbeOutcome,
    ProbeStatus, RenderError,
};
pub use session::{
    ContentHash, ContinuationRange, DocumentSession, MemorySessionStore, PageRange, SessionStore,
    SessionStoreError,
};
