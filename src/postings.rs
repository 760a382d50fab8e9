//! Term-document posting storage and retrieval.
//!
//! Postings are stored column major: one sorted [`DocVector`] per term,
//! owned by a [`TermDocIndex`] that interns term strings into stable
//! ids. Retrieval inverts the columns through a [`PostingHeap`], which
//! streams complete per-document term vectors in ascending document
//! order.

pub mod heap;
pub mod index;
pub mod vector;

pub use heap::{MergeItem, PostingHeap, TermEntry, TermVector};
pub use index::{CountMode, IndexConfig, IndexStats, TermDocIndex};
pub use vector::{DocVector, FormatVersion, Posting};
