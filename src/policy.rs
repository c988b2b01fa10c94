//! Early-answer and continuation policy.
//!
//! Pure decision logic, kept separate from the orchestration so it can be
//! unit-tested without mocks: the run phase machine, the page-cap range
//! planner, and the early-answer threshold rule.

use crate::session::{ContinuationRange, DocumentSession, PageRange};

// ── Phase machine ────────────────────────────────────────────────────────

/// Lifecycle of one pipeline request over a session.
///
/// `EmbeddedReady` and `OcrComplete` are terminal-success phases;
/// `Cancelled` and `Error` are reachable from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Hashing,
    Probing,
    EmbeddedReady,
    OcrRunning,
    OcrPartialReady,
    OcrComplete,
    Cancelled,
    Error,
}

impl Phase {
    /// Whether the run can go nowhere else from here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::EmbeddedReady | Phase::OcrComplete | Phase::Cancelled | Phase::Error
        )
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition(&self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        // Cancellation and errors cut in from any non-terminal phase.
        if matches!(next, Phase::Cancelled | Phase::Error) {
            return true;
        }
        matches!(
            (self, next),
            (Phase::Init, Phase::Hashing)
                | (Phase::Hashing, Phase::Probing)
                | (Phase::Probing, Phase::EmbeddedReady)
                | (Phase::Probing, Phase::OcrRunning)
                | (Phase::OcrRunning, Phase::OcrPartialReady)
                | (Phase::OcrRunning, Phase::OcrComplete)
                | (Phase::OcrPartialReady, Phase::OcrComplete)
        )
    }

    /// Move to `next`, panicking in debug builds on an illegal transition.
    /// The orchestrator drives this; illegal transitions are programming
    /// errors, not runtime conditions.
    pub fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.can_transition(next),
            "illegal phase transition {self:?} → {next:?}"
        );
        *self = next;
    }
}

// ── Range planning ───────────────────────────────────────────────────────

/// The range to process now and, when the cap truncates the document, the
/// continuation to offer afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    pub range: PageRange,
    pub continuation: Option<ContinuationRange>,
}

/// Plan the next chunk of work for a session under a per-request page cap.
///
/// Returns `None` when the session has no unprocessed pages left.
pub fn plan_range(session: &DocumentSession, page_cap: u32) -> Option<RangePlan> {
    if session.is_complete() || page_cap == 0 {
        return None;
    }
    let start = session.next_page_start;
    let end = session
        .page_count
        .min(start.saturating_add(page_cap.saturating_sub(1)));
    let continuation = continuation_after(end, session.page_count, page_cap);
    Some(RangePlan {
        range: PageRange::new(start, end),
        continuation,
    })
}

/// The continuation offer for the pages beyond `end`, if any remain.
pub fn continuation_after(end: u32, page_count: u32, page_cap: u32) -> Option<ContinuationRange> {
    if end >= page_count || page_cap == 0 {
        return None;
    }
    let next_start = end + 1;
    Some(ContinuationRange {
        start: next_start,
        end: page_count.min(next_start.saturating_add(page_cap.saturating_sub(1))),
        total_pages: page_count,
    })
}

// ── Early answer ─────────────────────────────────────────────────────────

/// Pages that must reach a terminal outcome before an early answer fires
/// for a range of `range_len` pages: the configured threshold, or the whole
/// range when it is smaller.
pub fn early_answer_threshold(configured: usize, range_len: u32) -> usize {
    configured.min(range_len as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ContentHash;

    fn session(page_count: u32) -> DocumentSession {
        DocumentSession::new(ContentHash::of(b"doc"), "doc.pdf", page_count)
    }

    #[test]
    fn happy_path_phases_are_legal() {
        let mut p = Phase::Init;
        p.advance(Phase::Hashing);
        p.advance(Phase::Probing);
        p.advance(Phase::OcrRunning);
        p.advance(Phase::OcrPartialReady);
        p.advance(Phase::OcrComplete);
        assert!(p.is_terminal());
    }

    #[test]
    fn embedded_short_circuit_is_terminal() {
        let mut p = Phase::Probing;
        p.advance(Phase::EmbeddedReady);
        assert!(p.is_terminal());
        assert!(!p.can_transition(Phase::OcrRunning));
    }

    #[test]
    fn cancel_cuts_in_from_any_non_terminal_phase() {
        for p in [Phase::Init, Phase::Hashing, Phase::Probing, Phase::OcrRunning, Phase::OcrPartialReady] {
            assert!(p.can_transition(Phase::Cancelled), "{p:?}");
            assert!(p.can_transition(Phase::Error), "{p:?}");
        }
        assert!(!Phase::OcrComplete.can_transition(Phase::Cancelled));
        assert!(!Phase::Cancelled.can_transition(Phase::Error));
    }

    #[test]
    fn skipping_partial_ready_is_legal() {
        // A small range can complete before the early-answer threshold fires.
        assert!(Phase::OcrRunning.can_transition(Phase::OcrComplete));
    }

    #[test]
    fn plan_respects_page_cap_and_offers_continuation() {
        let s = session(20);
        let plan = plan_range(&s, 15).unwrap();
        assert_eq!(plan.range, PageRange::new(1, 15));
        assert_eq!(
            plan.continuation,
            Some(ContinuationRange {
                start: 16,
                end: 20,
                total_pages: 20
            })
        );
    }

    #[test]
    fn plan_for_final_chunk_has_no_continuation() {
        let mut s = session(20);
        s.record_range(PageRange::new(1, 15));
        let plan = plan_range(&s, 15).unwrap();
        assert_eq!(plan.range, PageRange::new(16, 20));
        assert!(plan.continuation.is_none());
    }

    #[test]
    fn plan_for_complete_session_is_none() {
        let mut s = session(5);
        s.record_range(PageRange::new(1, 5));
        assert!(plan_range(&s, 15).is_none());
    }

    #[test]
    fn small_document_fits_one_chunk() {
        let s = session(4);
        let plan = plan_range(&s, 15).unwrap();
        assert_eq!(plan.range, PageRange::new(1, 4));
        assert!(plan.continuation.is_none());
    }

    #[test]
    fn threshold_shrinks_to_small_ranges() {
        assert_eq!(early_answer_threshold(3, 10), 3);
        assert_eq!(early_answer_threshold(3, 2), 2);
        assert_eq!(early_answer_threshold(3, 1), 1);
        assert_eq!(early_answer_threshold(0, 10), 1);
    }
}
