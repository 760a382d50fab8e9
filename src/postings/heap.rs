//! Multiway merge over per-term document vectors.
//!
//! The index stores postings column major (one [`DocVector`] per term).
//! [`PostingHeap`] inverts that on demand: a min-heap of borrowed read
//! cursors, ordered by `(doc_id, term_id)`, streams the postings of
//! every term in global document order, so a retrieval pass can rebuild
//! one document's complete term vector at a time without materializing
//! the whole row-major matrix.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::binary_heap::PeekMut;

use crate::postings::vector::{DocVector, Posting};

/// A read cursor over one term's posting slice.
#[derive(Debug)]
struct MergeCursor<'a> {
    /// Term id the postings belong to.
    term_id: u32,
    /// Borrowed posting slice, never empty while the cursor is live.
    postings: &'a [Posting],
    /// Index of the next posting to surface.
    pos: usize,
}

impl MergeCursor<'_> {
    fn sort_key(&self) -> (u32, u32) {
        (self.postings[self.pos].doc_id, self.term_id)
    }
}

impl PartialEq for MergeCursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for MergeCursor<'_> {}

impl PartialOrd for MergeCursor<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCursor<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: lowest (doc_id, term_id) comes first
        other.sort_key().cmp(&self.sort_key())
    }
}

/// One posting surfaced by the merge, tagged with its term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeItem {
    pub doc_id: u32,
    pub term_id: u32,
    pub count: u32,
    pub weight: f32,
}

/// One term's contribution to a reconstructed document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermEntry {
    pub term_id: u32,
    pub count: u32,
    pub weight: f32,
}

/// A document's sparse term vector, reconstructed by the merge.
///
/// Entries are in ascending term id order.
#[derive(Debug, Clone, PartialEq)]
pub struct TermVector {
    pub doc_id: u32,
    pub entries: Vec<TermEntry>,
}

impl TermVector {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A min-heap of posting cursors, merged in `(doc_id, term_id)` order.
///
/// Built once per retrieval pass and driven to exhaustion. The heap
/// borrows the vectors it reads, so the index cannot be mutated while a
/// pass is running.
#[derive(Debug)]
pub struct PostingHeap<'a> {
    heap: BinaryHeap<MergeCursor<'a>>,
}

impl<'a> PostingHeap<'a> {
    /// Build a heap over `(term_id, vector)` pairs.
    ///
    /// Empty vectors contribute nothing and are skipped up front.
    pub fn new<I>(vectors: I) -> Self
    where
        I: IntoIterator<Item = (u32, &'a DocVector)>,
    {
        let cursors: Vec<MergeCursor<'a>> = vectors
            .into_iter()
            .filter(|(_, vector)| !vector.is_empty())
            .map(|(term_id, vector)| MergeCursor {
                term_id,
                postings: &vector.postings,
                pos: 0,
            })
            .collect();

        PostingHeap {
            heap: BinaryHeap::from(cursors),
        }
    }

    /// Number of live cursors.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The `(doc_id, term_id)` pair the next advance will surface.
    pub fn peek(&self) -> Option<(u32, u32)> {
        self.heap.peek().map(MergeCursor::sort_key)
    }

    /// The full posting the next advance will surface.
    pub fn peek_entry(&self) -> Option<MergeItem> {
        self.heap.peek().map(|cursor| {
            let posting = cursor.postings[cursor.pos];
            MergeItem {
                doc_id: posting.doc_id,
                term_id: cursor.term_id,
                count: posting.count,
                weight: posting.weight,
            }
        })
    }

    /// Surface the smallest `(doc_id, term_id)` posting and step its
    /// cursor, dropping the cursor once its slice is spent.
    pub fn advance(&mut self) -> Option<MergeItem> {
        let mut top = self.heap.peek_mut()?;

        let posting = top.postings[top.pos];
        let item = MergeItem {
            doc_id: posting.doc_id,
            term_id: top.term_id,
            count: posting.count,
            weight: posting.weight,
        };

        top.pos += 1;
        if top.pos == top.postings.len() {
            PeekMut::pop(top);
        }
        Some(item)
    }

    /// Reconstruct the term vector of the lowest pending document.
    ///
    /// Returns `None` once every cursor is spent.
    pub fn next_document(&mut self) -> Option<TermVector> {
        let (doc_id, _) = self.peek()?;

        let mut entries = Vec::new();
        while let Some((next_doc, _)) = self.peek() {
            if next_doc != doc_id {
                break;
            }
            if let Some(item) = self.advance() {
                entries.push(TermEntry {
                    term_id: item.term_id,
                    count: item.count,
                    weight: item.weight,
                });
            }
        }

        Some(TermVector { doc_id, entries })
    }

    /// Reconstruct the next document accepted by a predicate, discarding
    /// rejected ones.
    pub fn next_document_matching<F>(&mut self, mut accept: F) -> Option<TermVector>
    where
        F: FnMut(u32) -> bool,
    {
        while let Some((doc_id, _)) = self.peek() {
            if accept(doc_id) {
                return self.next_document();
            }
            self.skip_document(doc_id);
        }
        None
    }

    /// Discard every pending posting for one document.
    fn skip_document(&mut self, doc_id: u32) {
        while let Some((next_doc, _)) = self.peek() {
            if next_doc != doc_id {
                break;
            }
            self.advance();
        }
    }
}
