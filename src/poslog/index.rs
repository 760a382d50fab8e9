//! The term position index: every term's position vector, one shared
//! data file, one shared memory budget.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::container::GrowableVec;
use crate::error::{Result, XiphosError};
use crate::poslog::budget::MemoryBudget;
use crate::poslog::vector::{NO_NEXT_SEGMENT, PositionVector, PositionVectorMeta};
use crate::storage::{Storage, StorageFile};

/// Name of the shared segment data file inside a storage directory.
pub const POSITIONS_FILE: &str = "positions.bin";
/// Name of the per-term metadata table.
pub const META_FILE: &str = "positions_meta.bin";

/// First threshold of the flush cascade, in buffered bytes.
const CASCADE_START: u64 = 10;

/// Configuration for a position index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionLogConfig {
    /// Open-buffer byte capacity before a vector rolls over to disk on
    /// its own.
    pub segment_capacity: usize,
    /// Total buffered bytes allowed across all vectors before the flush
    /// cascade runs.
    pub budget_ceiling: u64,
}

impl Default for PositionLogConfig {
    fn default() -> Self {
        PositionLogConfig {
            segment_capacity: 64,
            budget_ceiling: 1 << 20,
        }
    }
}

/// Summary counters for a position index.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionLogStats {
    pub term_count: u32,
    pub entry_count: u64,
    pub buffered_bytes: u64,
    pub budget_used: u64,
    pub budget_ceiling: u64,
}

/// All terms' position logs over one storage directory.
///
/// Vectors are addressed by the caller's term id; ids are dense, and
/// adding to an id beyond the current end creates the vectors in
/// between. Buffered bytes across every vector are charged against one
/// [`MemoryBudget`]; when an add pushes past the ceiling the cascade in
/// [`run_flush_cascade`] spills the largest buffers until the index is
/// back inside it.
///
/// [`run_flush_cascade`]: TermPositionIndex::run_flush_cascade
#[derive(Debug)]
pub struct TermPositionIndex {
    vectors: GrowableVec<PositionVector>,
    file: Box<dyn StorageFile>,
    budget: MemoryBudget,
    config: PositionLogConfig,
}

impl TermPositionIndex {
    /// Create a fresh index in `storage`, discarding any saved one.
    pub fn create(storage: &dyn Storage, config: PositionLogConfig) -> Result<Self> {
        for name in [POSITIONS_FILE, META_FILE] {
            if storage.file_exists(name) {
                storage.delete_file(name)?;
            }
        }
        let file = storage.open_rw(POSITIONS_FILE)?;
        Ok(TermPositionIndex {
            vectors: GrowableVec::new(),
            file,
            budget: MemoryBudget::new(config.budget_ceiling),
            config,
        })
    }

    /// Open an index saved with [`save`].
    ///
    /// [`save`]: TermPositionIndex::save
    pub fn open(storage: &dyn Storage, config: PositionLogConfig) -> Result<Self> {
        let metas: GrowableVec<PositionVectorMeta> = GrowableVec::load_from(storage, META_FILE)?;
        let file = storage.open_rw(POSITIONS_FILE)?;
        let data_len = file.len()?;

        let mut vectors = GrowableVec::new();
        for meta in metas.iter() {
            if meta.first_segment != NO_NEXT_SEGMENT && meta.first_segment >= data_len {
                return Err(XiphosError::corrupt(format!(
                    "position metadata points past the data file: {} >= {data_len}",
                    meta.first_segment
                )));
            }
            vectors.push(PositionVector::from_meta(meta)?);
        }

        Ok(TermPositionIndex {
            vectors,
            file,
            budget: MemoryBudget::new(config.budget_ceiling),
            config,
        })
    }

    /// Persist the index: flush every open buffer, sync the data file,
    /// and write the metadata table through a temporary name.
    pub fn save(&mut self, storage: &dyn Storage) -> Result<()> {
        self.flush_all()?;
        self.file.sync_data()?;

        let mut metas = GrowableVec::new();
        for vector in self.vectors.iter() {
            metas.push(vector.to_meta());
        }
        let tmp_meta = format!("{META_FILE}.tmp");
        metas.save_to(storage, &tmp_meta)?;
        storage.rename_file(&tmp_meta, META_FILE)?;
        Ok(())
    }

    /// The active configuration.
    pub fn config(&self) -> PositionLogConfig {
        self.config
    }

    /// The shared budget.
    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// Number of term vectors, including empty gap-fill ones.
    pub fn term_count(&self) -> u32 {
        self.vectors.len()
    }

    /// Pairs recorded for one term; 0 for ids never added to.
    pub fn count(&self, term_id: u32) -> u64 {
        self.vectors.get(term_id).map_or(0, PositionVector::count)
    }

    /// Record that `term_id` occurred in `doc_id` at `position`.
    ///
    /// Pairs of one term must arrive in log order; see
    /// [`PositionVector::append`]. Different terms are independent.
    pub fn add(&mut self, term_id: u32, doc_id: u32, position: u32) -> Result<()> {
        while self.vectors.len() <= term_id {
            self.vectors.push(PositionVector::new());
        }
        self.vectors[term_id].append(
            self.file.as_mut(),
            doc_id,
            position,
            &mut self.budget,
            self.config.segment_capacity,
        )?;

        if self.budget.over() {
            self.run_flush_cascade()?;
        }
        Ok(())
    }

    /// Read the next pair of one term, `None` when exhausted or the id
    /// is unknown.
    pub fn read_next(&mut self, term_id: u32) -> Result<Option<(u32, u32)>> {
        match self.vectors.get_mut(term_id) {
            Some(vector) => vector.read_next(self.file.as_mut()),
            None => Ok(None),
        }
    }

    /// Push the most recently read pair of `term_id` back.
    ///
    /// # Panics
    ///
    /// Panics on an unknown id or an occupied unread slot.
    pub fn unread(&mut self, term_id: u32, pair: (u32, u32)) {
        self.vectors[term_id].unread(pair);
    }

    /// Reset one term's read cursor to the start of its log.
    ///
    /// # Panics
    ///
    /// Panics on an unknown id.
    pub fn rewind(&mut self, term_id: u32) {
        self.vectors[term_id].rewind();
    }

    /// Reset every term's read cursor.
    pub fn rewind_all(&mut self) {
        for vector in self.vectors.iter_mut() {
            vector.rewind();
        }
    }

    /// Spill every open buffer to disk.
    pub fn flush_all(&mut self) -> Result<()> {
        for vector in self.vectors.iter_mut() {
            vector.flush(self.file.as_mut(), &mut self.budget)?;
        }
        Ok(())
    }

    /// Bring buffered bytes back inside the budget.
    ///
    /// Passes run at descending thresholds, spilling every vector
    /// buffering more than the threshold, so the largest buffers go
    /// first and a pass at 0 clears everything. Stops as soon as the
    /// budget is satisfied.
    fn run_flush_cascade(&mut self) -> Result<()> {
        for threshold in (0..=CASCADE_START).rev() {
            if !self.budget.over() {
                break;
            }
            let mut flushed = 0u32;
            for vector in self.vectors.iter_mut() {
                if vector.buffered_bytes() as u64 > threshold {
                    vector.flush(self.file.as_mut(), &mut self.budget)?;
                    flushed += 1;
                }
            }
            debug!(
                "flush cascade pass (threshold {threshold}): spilled {flushed} vectors, \
                 {} of {} budget bytes in use",
                self.budget.used(),
                self.budget.ceiling()
            );
        }
        Ok(())
    }

    /// Summary counters.
    pub fn stats(&self) -> PositionLogStats {
        let mut entry_count = 0;
        let mut buffered_bytes = 0;
        for vector in self.vectors.iter() {
            entry_count += vector.count();
            buffered_bytes += vector.buffered_bytes() as u64;
        }
        PositionLogStats {
            term_count: self.vectors.len(),
            entry_count,
            buffered_bytes,
            budget_used: self.budget.used(),
            budget_ceiling: self.budget.ceiling(),
        }
    }
}
