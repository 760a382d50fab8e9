//! Disk-backed term position logs.
//!
//! Each term owns a [`PositionVector`]: an append-only, delta-encoded
//! log of `(doc_id, position)` pairs with an in-memory open buffer and
//! a chain of checksummed on-disk segments. A [`TermPositionIndex`]
//! owns every vector, sharing one data file and one [`MemoryBudget`]
//! across them, and spills the largest buffers to disk when the budget
//! is exceeded.

pub mod budget;
pub mod codec;
pub mod index;
pub mod vector;

pub use budget::MemoryBudget;
pub use index::{PositionLogConfig, PositionLogStats, TermPositionIndex};
pub use vector::PositionVector;
