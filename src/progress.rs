//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an `Arc<dyn PipelineProgress>` via
//! [`crate::config::PipelineConfigBuilder::progress`] to receive real-time
//! events as a range is processed. Callbacks are the least-invasive
//! integration point: callers can forward events to a channel, a WebSocket,
//! or a progress bar without the library knowing how the host application
//! communicates.

/// Called by the pipeline as it works through a page range.
///
/// Implementations must be `Send + Sync`; with `concurrency > 1` the
/// per-page methods may be called from different tasks at once. All methods
/// default to no-ops so callers only override what they care about.
pub trait PipelineProgress: Send + Sync {
    /// Called once when a range is dispatched.
    fn on_range_start(&self, start: u32, end: u32) {
        let _ = (start, end);
    }

    /// Called when a page's text is recognized.
    fn on_page_done(&self, page: u32, text_len: usize) {
        let _ = (page, text_len);
    }

    /// Called when a page fails after all attempts.
    fn on_page_failed(&self, page: u32, error: String) {
        let _ = (page, error);
    }

    /// Called when the early-answer threshold is reached and the partial
    /// artifact has been flushed.
    fn on_early_answer(&self, pages_ready: usize) {
        let _ = pages_ready;
    }

    /// Called once when the range finishes (including after cancellation).
    fn on_range_complete(&self, pages_ok: usize, pages_failed: usize) {
        let _ = (pages_ok, pages_failed);
    }
}

/// No-op implementation for callers that do not track progress.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        done: AtomicUsize,
        failed: AtomicUsize,
    }

    impl PipelineProgress for Counting {
        fn on_page_done(&self, _page: u32, _len: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_failed(&self, _page: u32, _error: String) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_does_not_panic() {
        let p = NoopProgress;
        p.on_range_start(1, 5);
        p.on_page_done(1, 42);
        p.on_page_failed(2, "boom".into());
        p.on_early_answer(3);
        p.on_range_complete(4, 1);
    }

    #[test]
    fn counting_callback_receives_events() {
        let p = Arc::new(Counting {
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });
        let dyn_p: Arc<dyn PipelineProgress> = Arc::clone(&p) as _;
        dyn_p.on_page_done(1, 10);
        dyn_p.on_page_done(2, 20);
        dyn_p.on_page_failed(3, "err".into());
        assert_eq!(p.done.load(Ordering::SeqCst), 2);
        assert_eq!(p.failed.load(Ordering::SeqCst), 1);
    }
}
