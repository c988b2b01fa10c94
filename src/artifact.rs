//! The extracted-text artifact: merged, page-ordered OCR output.
//!
//! The artifact is the single source of truth for "what text do we have so
//! far" for one document. Every finalize flush merges a batch of pages into
//! it under the same content-addressed key, so the invariants live here:
//!
//! * **Keyed by page index**: merging the same page twice keeps one entry;
//!   last write wins.
//! * **Monotonic**: a later merge of a different range never erases pages
//!   recorded earlier.
//! * **Ordered**: entries are always sorted ascending by page number, no
//!   matter in which order pages completed.

use crate::session::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page's extracted text (or its inline failure marker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    /// 1-indexed page number.
    pub page: u32,
    pub text: String,
}

/// Merged page texts plus identifying metadata, addressable by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTextArtifact {
    pub content_hash: ContentHash,
    pub filename: String,
    pub total_pages: u32,
    /// Always sorted ascending by `page`, one entry per page.
    pub pages: Vec<PageEntry>,
}

impl ExtractedTextArtifact {
    pub fn new(content_hash: ContentHash, filename: impl Into<String>, total_pages: u32) -> Self {
        ExtractedTextArtifact {
            content_hash,
            filename: filename.into(),
            total_pages,
            pages: Vec::new(),
        }
    }

    /// Stable storage key for the artifact of a given document.
    ///
    /// Deriving the key from the content hash makes every finalize of the
    /// same document target the same blob, which is what lets batches,
    /// early answers, and continuations all accumulate into one artifact.
    pub fn key_for(hash: &ContentHash) -> String {
        format!("extracted/{hash}")
    }

    /// Merge a batch of page entries into the artifact.
    ///
    /// Entries are keyed by page number: a duplicate page replaces the old
    /// text, every other page is untouched, and the result is re-sorted.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = PageEntry>) {
        let mut by_page: BTreeMap<u32, String> = self
            .pages
            .drain(..)
            .map(|e| (e.page, e.text))
            .collect();
        for entry in batch {
            by_page.insert(entry.page, entry.text);
        }
        self.pages = by_page
            .into_iter()
            .map(|(page, text)| PageEntry { page, text })
            .collect();
    }

    /// Number of pages recorded so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Join all page texts in page order.
    ///
    /// Failure markers appear inline at their page position, so consumers
    /// see exactly where coverage gaps are.
    pub fn merged_text(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.pages.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            out.push_str(&entry.text);
        }
        out
    }
}
