//! Per-page OCR worker: drive one recognize call with retry and backoff.
//!
//! ## Retry strategy
//!
//! Rate-limit and overload responses are frequent under concurrent load and
//! almost always clear within seconds. Each retry waits
//! `retry_backoff_ms * 2^(retry-1)` capped at `retry_backoff_cap_ms`, plus
//! random jitter so concurrent workers do not retry in lockstep against a
//! recovering service. Permanent failures are not retried at all.
//!
//! An OCR call that returns empty or whitespace-only text is treated as a
//! transient failure and retried: on the happy path empty output is
//! indistinguishable from an unrecoverable render, and accepting it would
//! silently punch a hole in coverage.

use crate::config::PipelineConfig;
use crate::error::PageError;
use crate::services::{EncodedPage, OcrService};
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Text successfully recognized for one page.
#[derive(Debug, Clone)]
pub struct PageSuccess {
    pub page: u32,
    pub text: String,
    /// OCR attempts consumed, first try included.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Terminal state of one page task.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Done(PageSuccess),
    Failed(PageError),
    /// Cancellation observed before the page's next suspension point.
    Cancelled { page: u32 },
}

impl PageOutcome {
    pub fn page(&self) -> u32 {
        match self {
            PageOutcome::Done(s) => s.page,
            PageOutcome::Failed(e) => e.page(),
            PageOutcome::Cancelled { page } => *page,
        }
    }
}

/// Recognize one encoded page, retrying transient failures.
pub(crate) async fn ocr_page(
    service: &Arc<dyn OcrService>,
    encoded: &EncodedPage,
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> PageOutcome {
    let page = encoded.page;
    let start = Instant::now();
    let mut last_err = String::new();

    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            let delay = backoff_ms(config.retry_backoff_ms, config.retry_backoff_cap_ms, attempt - 1);
            let jitter = rand::rng().random_range(0..=delay / 4);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page,
                attempt - 1,
                config.max_attempts - 1,
                delay + jitter
            );
            sleep(Duration::from_millis(delay + jitter)).await;
        }

        // Suspension point: the network call. Cancellation is checked
        // immediately before it, never mid-flight.
        if cancel.is_cancelled() {
            return PageOutcome::Cancelled { page };
        }

        match service.recognize(encoded).await {
            Ok(text) if text.trim().is_empty() => {
                last_err = "OCR returned empty text".to_string();
                warn!("Page {}: attempt {} returned empty text", page, attempt);
            }
            Ok(text) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!("Page {}: recognized {} chars in {}ms", page, text.len(), duration_ms);
                return PageOutcome::Done(PageSuccess {
                    page,
                    text,
                    attempts: attempt,
                    duration_ms,
                });
            }
            Err(e) if e.is_transient() => {
                last_err = e.to_string();
                warn!("Page {}: attempt {} failed: {}", page, attempt, last_err);
            }
            Err(crate::services::OcrError::Rejected(detail)) => {
                return PageOutcome::Failed(PageError::Rejected { page, detail });
            }
            Err(e) => {
                return PageOutcome::Failed(PageError::OcrFailed {
                    page,
                    attempts: attempt,
                    detail: e.to_string(),
                });
            }
        }
    }

    PageOutcome::Failed(PageError::OcrFailed {
        page,
        attempts: config.max_attempts,
        detail: last_err,
    })
}

/// Delay before the `retry`-th retry (1-based): base doubling per retry,
/// capped.
fn backoff_ms(base: u64, cap: u64, retry: u32) -> u64 {
    base.saturating_mul(1u64 << (retry.saturating_sub(1)).min(16)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_four_seconds() {
        assert_eq!(backoff_ms(500, 4_000, 1), 500);
        assert_eq!(backoff_ms(500, 4_000, 2), 1_000);
        assert_eq!(backoff_ms(500, 4_000, 3), 2_000);
        assert_eq!(backoff_ms(500, 4_000, 4), 4_000);
        assert_eq!(backoff_ms(500, 4_000, 5), 4_000);
        assert_eq!(backoff_ms(500, 4_000, 40), 4_000);
    }

    #[test]
    fn backoff_respects_custom_base() {
        assert_eq!(backoff_ms(100, 4_000, 1), 100);
        assert_eq!(backoff_ms(100, 4_000, 3), 400);
    }
}
