//! Content identification and the embedded-text fast path.
//!
//! Digitally authored documents usually carry machine-readable text
//! already; probing for it first is the dominant fast path, and a document
//! that passes never renders or OCRs a single page. A prober failure is
//! never fatal: the pipeline degrades to the OCR path rather than failing
//! the whole request over an advisory check.

use crate::error::PipelineError;
use crate::services::{IngestService, PageRenderer, ProbeOutcome, ProbeStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Probe for embedded text, degrading to `NeedsOcr` on prober errors.
///
/// When the probe errors (or reports a zero page count), the page count is
/// re-established through the renderer so the OCR path always starts from a
/// trustworthy total.
pub async fn probe_document(
    ingest: &Arc<dyn IngestService>,
    renderer: &Arc<dyn PageRenderer>,
    document: &[u8],
) -> Result<ProbeOutcome, PipelineError> {
    let outcome = match ingest.probe_embedded_text(document).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Embedded-text probe failed, falling back to OCR: {e}");
            ProbeOutcome {
                status: ProbeStatus::NeedsOcr,
                page_count: 0,
            }
        }
    };

    if let ProbeStatus::EmbeddedOk { ref extracted_key } = outcome.status {
        debug!("Embedded text found, key {extracted_key}");
        return Ok(outcome);
    }

    // The probe may not know the page count on the degraded path.
    let page_count = if outcome.page_count > 0 {
        outcome.page_count
    } else {
        renderer
            .page_count(document)
            .await
            .map_err(|e| PipelineError::DocumentUnreadable {
                stage: "page count",
                detail: e.to_string(),
            })?
    };

    Ok(ProbeOutcome {
        status: ProbeStatus::NeedsOcr,
        page_count,
    })
}
