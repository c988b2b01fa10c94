//! Bounded-concurrency page scheduling.
//!
//! One task per page in the range, started in page order, at most
//! `concurrency` in flight. Completion order is **not** guaranteed and
//! nothing downstream may assume it: all ordering for persistence happens
//! at finalize time by page index.
//!
//! ## Cancellation
//!
//! The token is checked cooperatively before each suspension point: page
//! render and OCR call. `buffer_unordered` only polls a page's future when
//! a slot frees up, so a cancelled run stops dispatching immediately; an
//! in-flight render is allowed to finish and its result is discarded as
//! [`PageOutcome::Cancelled`].

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::pipeline::{encode, ocr};
use crate::pipeline::ocr::PageOutcome;
use crate::services::{OcrService, PageRenderer};
use crate::session::PageRange;
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Dispatch every page in `range` and yield outcomes as they complete.
pub(crate) fn run_range(
    renderer: Arc<dyn PageRenderer>,
    service: Arc<dyn OcrService>,
    document: Arc<Vec<u8>>,
    range: PageRange,
    config: PipelineConfig,
    cancel: CancellationToken,
) -> impl Stream<Item = PageOutcome> {
    let concurrency = config.concurrency;
    debug!("Dispatching range {} with concurrency {}", range, concurrency);

    stream::iter(range.pages().map(move |page| {
        let renderer = Arc::clone(&renderer);
        let service = Arc::clone(&service);
        let document = Arc::clone(&document);
        let config = config.clone();
        let cancel = cancel.clone();
        async move { run_page(&renderer, &service, &document, page, &config, &cancel).await }
    }))
    .buffer_unordered(concurrency)
}

/// One page task: render, encode, recognize.
async fn run_page(
    renderer: &Arc<dyn PageRenderer>,
    service: &Arc<dyn OcrService>,
    document: &[u8],
    page: u32,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> PageOutcome {
    // Suspension point: page render.
    if cancel.is_cancelled() {
        return PageOutcome::Cancelled { page };
    }
    let image = match renderer.render_page(document, page).await {
        Ok(img) => img,
        Err(e) => {
            return PageOutcome::Failed(PageError::RenderFailed {
                page,
                detail: e.to_string(),
            })
        }
    };

    // The render above may have finished after a cancel landed; discard it.
    if cancel.is_cancelled() {
        return PageOutcome::Cancelled { page };
    }

    let encoded = match encode::encode_page(page, &image) {
        Ok(e) => e,
        Err(e) => return PageOutcome::Failed(e),
    };

    ocr::ocr_page(service, &encoded, config, cancel).await
}
