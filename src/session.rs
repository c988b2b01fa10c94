//! Durable session state: the resumable record of OCR progress.
//!
//! One [`DocumentSession`] exists per content hash. It is created on the
//! first ingestion attempt, mutated as page ranges complete, and never
//! deleted automatically; callers clear it explicitly through the store.
//! The session is the round-trip token for continuation: a caller that
//! holds the hash plus processed ranges can resume a partially processed
//! document in a completely separate invocation.
//!
//! # Why a store trait instead of a global registry?
//!
//! Keying every session in one process-wide map hides shared mutable state
//! and makes tests order-dependent. [`SessionStore`] is an explicit
//! `get`/`put`/`delete` interface injected into the pipeline; the shipped
//! [`MemorySessionStore`] is suitable for tests and single-process callers,
//! and persistent backends implement the same three methods.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

// ── Content hash ─────────────────────────────────────────────────────────

/// Deterministic fingerprint of document bytes.
///
/// Every other piece of pipeline state (session, artifact key, cancellation
/// registry entry) is keyed by this value, so identity is stable across
/// retries, restarts, and renamed files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash the raw document bytes (blake3, hex-encoded).
    pub fn of(document: &[u8]) -> Self {
        ContentHash(blake3::hash(document).to_hex().to_string())
    }

    /// The hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Page ranges ──────────────────────────────────────────────────────────

/// A contiguous inclusive span of 1-indexed page numbers dispatched as one
/// unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Construct a range; `start` and `end` are inclusive and 1-indexed.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start >= 1 && start <= end);
        PageRange { start, end }
    }

    /// Number of pages in the range.
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false // by construction start <= end
    }

    /// Iterate the 1-indexed page numbers in order.
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    fn overlaps_or_adjacent(&self, other: &PageRange) -> bool {
        self.start <= other.end.saturating_add(1) && other.start <= self.end.saturating_add(1)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The next page range offered to a caller when a page cap truncates a run.
///
/// Derived from the session at response time; never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationRange {
    pub start: u32,
    pub end: u32,
    pub total_pages: u32,
}

impl ContinuationRange {
    /// The span as a plain [`PageRange`], for handing back to `resume`.
    pub fn range(&self) -> PageRange {
        PageRange::new(self.start, self.end)
    }
}

// ── Document session ─────────────────────────────────────────────────────

/// Durable, resumable record of OCR progress for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSession {
    pub content_hash: ContentHash,
    pub filename: String,
    pub page_count: u32,
    /// Key of the merged extracted-text artifact, once any batch persisted.
    pub extracted_key: Option<String>,
    /// Completed spans: non-overlapping, sorted, coalesced.
    pub processed_ranges: Vec<PageRange>,
    /// First page not yet covered by a processed range. `page_count + 1`
    /// once the document is fully processed.
    pub next_page_start: u32,
    pub cancelled: bool,
}

impl DocumentSession {
    /// Fresh session for a document that needs OCR.
    pub fn new(content_hash: ContentHash, filename: impl Into<String>, page_count: u32) -> Self {
        DocumentSession {
            content_hash,
            filename: filename.into(),
            page_count,
            extracted_key: None,
            processed_ranges: Vec::new(),
            next_page_start: 1,
            cancelled: false,
        }
    }

    /// Session for a document whose embedded text was usable as-is: the
    /// whole page span is recorded processed under the existing key.
    pub fn embedded(
        content_hash: ContentHash,
        filename: impl Into<String>,
        page_count: u32,
        extracted_key: String,
    ) -> Self {
        let mut s = Self::new(content_hash, filename, page_count);
        s.extracted_key = Some(extracted_key);
        if page_count > 0 {
            s.record_range(PageRange::new(1, page_count));
        }
        s
    }

    /// True once every page is covered by a processed range.
    pub fn is_complete(&self) -> bool {
        self.next_page_start > self.page_count
    }

    /// Record a completed range, coalescing with neighbours and advancing
    /// the checkpoint.
    ///
    /// Ranges arrive in dispatch order during normal operation, but the
    /// merge handles overlap and adjacency so re-running a range (after a
    /// crash between finalize and checkpoint) is harmless.
    pub fn record_range(&mut self, range: PageRange) {
        let mut merged = range;
        let mut kept: Vec<PageRange> = Vec::with_capacity(self.processed_ranges.len() + 1);
        for r in self.processed_ranges.drain(..) {
            if r.overlaps_or_adjacent(&merged) {
                merged = PageRange::new(merged.start.min(r.start), merged.end.max(r.end));
            } else {
                kept.push(r);
            }
        }
        kept.push(merged);
        kept.sort_by_key(|r| r.start);
        self.processed_ranges = kept;
        self.next_page_start = self.first_gap();
    }

    /// First page from 1 not covered by any processed range.
    fn first_gap(&self) -> u32 {
        let mut next = 1u32;
        for r in &self.processed_ranges {
            if r.start > next {
                break;
            }
            next = next.max(r.end + 1);
        }
        next.min(self.page_count + 1)
    }

    /// Check the structural invariant; used by the store on `put` in debug
    /// builds and directly by tests.
    pub fn invariant_holds(&self) -> bool {
        let mut prev_end = 0u32;
        for r in &self.processed_ranges {
            if r.start <= prev_end || r.end > self.page_count {
                return false;
            }
            prev_end = r.end;
        }
        self.next_page_start >= 1 && self.next_page_start <= self.page_count + 1
    }
}

// ── Session store ────────────────────────────────────────────────────────

/// Error from a session store backend.
#[derive(Debug, thiserror::Error)]
#[error("session store: {0}")]
pub struct SessionStoreError(pub String);

/// Abstract, injected persistence for [`DocumentSession`] records.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, hash: &ContentHash) -> Result<Option<DocumentSession>, SessionStoreError>;
    async fn put(&self, session: DocumentSession) -> Result<(), SessionStoreError>;
    async fn delete(&self, hash: &ContentHash) -> Result<(), SessionStoreError>;
}

/// In-memory store backed by a mutexed map.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<ContentHash, DocumentSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, hash: &ContentHash) -> Result<Option<DocumentSession>, SessionStoreError> {
        Ok(self.sessions.lock().await.get(hash).cloned())
    }

    async fn put(&self, session: DocumentSession) -> Result<(), SessionStoreError> {
        debug_assert!(session.invariant_holds());
        self.sessions
            .lock()
            .await
            .insert(session.content_hash.clone(), session);
        Ok(())
    }

    async fn delete(&self, hash: &ContentHash) -> Result<(), SessionStoreError> {
        self.sessions.lock().await.remove(hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> ContentHash {
        ContentHash::of(b"test document bytes")
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(ContentHash::of(b"abc"), ContentHash::of(b"abc"));
        assert_ne!(ContentHash::of(b"abc"), ContentHash::of(b"abd"));
        assert_eq!(ContentHash::of(b"abc").as_str().len(), 64);
    }

    #[test]
    fn record_range_advances_checkpoint() {
        let mut s = DocumentSession::new(hash(), "doc.pdf", 20);
        assert_eq!(s.next_page_start, 1);

        s.record_range(PageRange::new(1, 15));
        assert_eq!(s.next_page_start, 16);
        assert_eq!(s.processed_ranges, vec![PageRange::new(1, 15)]);
        assert!(!s.is_complete());

        s.record_range(PageRange::new(16, 20));
        assert_eq!(s.next_page_start, 21);
        assert_eq!(s.processed_ranges, vec![PageRange::new(1, 20)]);
        assert!(s.is_complete());
        assert!(s.invariant_holds());
    }

    #[test]
    fn record_range_is_idempotent() {
        let mut s = DocumentSession::new(hash(), "doc.pdf", 10);
        s.record_range(PageRange::new(1, 5));
        s.record_range(PageRange::new(1, 5));
        assert_eq!(s.processed_ranges, vec![PageRange::new(1, 5)]);
        assert_eq!(s.next_page_start, 6);
    }

    #[test]
    fn gap_before_later_range_keeps_checkpoint_low() {
        let mut s = DocumentSession::new(hash(), "doc.pdf", 20);
        // Out-of-order completion leaves the checkpoint at the first gap.
        s.record_range(PageRange::new(6, 10));
        assert_eq!(s.next_page_start, 1);
        s.record_range(PageRange::new(1, 5));
        assert_eq!(s.next_page_start, 11);
        assert_eq!(s.processed_ranges, vec![PageRange::new(1, 10)]);
    }

    #[test]
    fn embedded_session_is_complete() {
        let s = DocumentSession::embedded(hash(), "doc.pdf", 7, "extracted/xyz".into());
        assert!(s.is_complete());
        assert_eq!(s.extracted_key.as_deref(), Some("extracted/xyz"));
        assert!(s.invariant_holds());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySessionStore::new();
        let s = DocumentSession::new(hash(), "doc.pdf", 3);
        store.put(s.clone()).await.unwrap();

        let got = store.get(&s.content_hash).await.unwrap().unwrap();
        assert_eq!(got.filename, "doc.pdf");
        assert_eq!(got.page_count, 3);

        store.delete(&s.content_hash).await.unwrap();
        assert!(store.get(&s.content_hash).await.unwrap().is_none());
    }

    #[test]
    fn session_serde_round_trip() {
        let mut s = DocumentSession::new(hash(), "doc.pdf", 20);
        s.record_range(PageRange::new(1, 15));
        let json = serde_json::to_string(&s).unwrap();
        let back: DocumentSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.next_page_start, 16);
        assert_eq!(back.processed_ranges, s.processed_ranges);
    }
}
