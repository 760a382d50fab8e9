//! # Xiphos
//!
//! A compact sparse-postings engine: term-document vectors, streaming
//! per-document reconstruction, and disk-backed position logs.
//!
//! ## Features
//!
//! - Column-major posting storage with stable, dense term ids
//! - Heap-merged retrieval that rebuilds documents in ascending order
//! - Delta-encoded position logs with a shared memory budget and
//!   largest-first disk spill
//! - Checksummed, rename-atomic persistence
//! - Pluggable storage backends
//!
//! ## Layout
//!
//! [`postings`] holds the in-memory side: [`postings::TermDocIndex`]
//! owns one [`postings::DocVector`] per term, and
//! [`postings::PostingHeap`] merges them back into per-document term
//! vectors. [`poslog`] holds the disk-backed side: a
//! [`poslog::TermPositionIndex`] of append-only position logs.
//! [`container`] and [`storage`] are the persistence substrate both
//! sides share.

pub mod container;
pub mod error;
pub mod poslog;
pub mod postings;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::error::{Result, XiphosError};
    pub use crate::poslog::{MemoryBudget, PositionLogConfig, TermPositionIndex};
    pub use crate::postings::{
        CountMode, DocVector, FormatVersion, IndexConfig, PostingHeap, TermDocIndex, TermVector,
    };
    pub use crate::storage::{FileStorage, MemoryStorage, Storage, StorageConfig};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
