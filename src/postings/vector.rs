//! Per-term document vectors.
//!
//! A [`DocVector`] is the column of the index for one term: a sparse,
//! doc-id-sorted list of postings plus a term-level score. Mutation goes
//! through sorted insert-or-accumulate, so the list never holds
//! duplicate ids and never exposes an unsorted state.

use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{StorageInput, StorageOutput};

/// A single posting: one document's entry in a term's vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    /// Document ID.
    pub doc_id: u32,
    /// Number of occurrences of the term in the document.
    pub count: u32,
    /// Weight for this posting, rewritten by scoring passes.
    pub weight: f32,
}

/// On-disk field width for posting entries.
///
/// `Legacy` files carry 16-bit document ids and counts, `Wide` files
/// carry 32-bit ones. The weight is a 32-bit float in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FormatVersion {
    Legacy,
    Wide,
}

impl FormatVersion {
    /// Encoded bytes per posting entry.
    pub fn entry_len(self) -> u64 {
        match self {
            FormatVersion::Legacy => 2 + 2 + 4,
            FormatVersion::Wide => 4 + 4 + 4,
        }
    }
}

impl From<FormatVersion> for u32 {
    fn from(version: FormatVersion) -> u32 {
        match version {
            FormatVersion::Legacy => 1,
            FormatVersion::Wide => 2,
        }
    }
}

impl TryFrom<u32> for FormatVersion {
    type Error = XiphosError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(FormatVersion::Legacy),
            2 => Ok(FormatVersion::Wide),
            other => Err(XiphosError::format(
                "format version",
                "1 or 2",
                other.to_string(),
            )),
        }
    }
}

static COUNT_CLAMP_WARNED: AtomicBool = AtomicBool::new(false);
static LEGACY_CLAMP_WARNED: AtomicBool = AtomicBool::new(false);

/// A sparse posting list for one term, sorted by document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocVector {
    /// Term-level score, typically an idf value set by a scoring pass.
    pub score: f32,
    /// Postings in strictly ascending `doc_id` order, no duplicates.
    pub postings: Vec<Posting>,
}

impl DocVector {
    /// Create a new empty vector.
    pub fn new() -> Self {
        DocVector::default()
    }

    /// Create a new empty vector with a term score.
    pub fn with_score(score: f32) -> Self {
        DocVector {
            score,
            postings: Vec::new(),
        }
    }

    /// Number of documents in this vector.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Locate the posting for a document id.
    pub fn lookup(&self, doc_id: u32) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|pos| &self.postings[pos])
    }

    /// Find or create the posting for `doc_id`, keeping the list sorted.
    fn entry(&mut self, doc_id: u32) -> &mut Posting {
        // Occurrences usually arrive in document order, so the common
        // case touches the last entry.
        let pos = match self.postings.last() {
            Some(last) if last.doc_id == doc_id => self.postings.len() - 1,
            Some(last) if last.doc_id < doc_id => {
                self.postings.push(Posting {
                    doc_id,
                    count: 0,
                    weight: 0.0,
                });
                self.postings.len() - 1
            }
            _ => match self.postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
                Ok(pos) => pos,
                Err(pos) => {
                    self.postings.insert(
                        pos,
                        Posting {
                            doc_id,
                            count: 0,
                            weight: 0.0,
                        },
                    );
                    pos
                }
            },
        };
        &mut self.postings[pos]
    }

    /// Accumulate a count and weight delta onto a document's posting,
    /// creating it zero-initialized if absent.
    ///
    /// The count saturates at `u32::MAX` rather than wrapping; the first
    /// time that happens a warning is logged.
    pub fn add_or_accumulate(
        &mut self,
        doc_id: u32,
        delta_count: u32,
        delta_weight: f32,
    ) -> &mut Posting {
        let posting = self.entry(doc_id);

        match posting.count.checked_add(delta_count) {
            Some(count) => posting.count = count,
            None => {
                posting.count = u32::MAX;
                if !COUNT_CLAMP_WARNED.swap(true, Ordering::Relaxed) {
                    warn!("posting count clamped at u32::MAX for document {doc_id}");
                }
            }
        }
        posting.weight += delta_weight;
        posting
    }

    /// Overwrite a document's count and weight, creating the posting if
    /// absent.
    pub fn set_exact(&mut self, doc_id: u32, count: u32, weight: f32) -> &mut Posting {
        let posting = self.entry(doc_id);
        posting.count = count;
        posting.weight = weight;
        posting
    }

    /// Encoded size in bytes under a format version, excluding any
    /// enclosing framing.
    pub fn encoded_len(&self, version: FormatVersion) -> u64 {
        // length + score + entries
        4 + 4 + self.postings.len() as u64 * version.entry_len()
    }

    /// Write this vector through a struct writer.
    ///
    /// Layout: `length: u32, score: f32`, then per posting the id and
    /// count at the version's width plus an `f32` weight. A zero length
    /// is the valid empty encoding.
    pub fn write_to<W: StorageOutput>(
        &self,
        writer: &mut StructWriter<W>,
        version: FormatVersion,
    ) -> Result<()> {
        writer.write_u32(self.postings.len() as u32)?;
        writer.write_f32(self.score)?;

        for posting in &self.postings {
            match version {
                FormatVersion::Legacy => {
                    if posting.doc_id > u16::MAX as u32 {
                        return Err(XiphosError::format(
                            "document id",
                            format!("<= {}", u16::MAX),
                            posting.doc_id.to_string(),
                        ));
                    }
                    let count = if posting.count > u16::MAX as u32 {
                        if !LEGACY_CLAMP_WARNED.swap(true, Ordering::Relaxed) {
                            warn!(
                                "posting count clamped to u16::MAX writing legacy format \
                                 (document {})",
                                posting.doc_id
                            );
                        }
                        u16::MAX
                    } else {
                        posting.count as u16
                    };
                    writer.write_u16(posting.doc_id as u16)?;
                    writer.write_u16(count)?;
                }
                FormatVersion::Wide => {
                    writer.write_u32(posting.doc_id)?;
                    writer.write_u32(posting.count)?;
                }
            }
            writer.write_f32(posting.weight)?;
        }
        Ok(())
    }

    /// Read a vector written by [`write_to`] with the same version.
    ///
    /// The version comes from the index manifest; decoding with the
    /// wrong one misframes every entry, so callers must resolve it
    /// first.
    ///
    /// [`write_to`]: DocVector::write_to
    pub fn read_from<R: StorageInput>(
        reader: &mut StructReader<R>,
        version: FormatVersion,
    ) -> Result<Self> {
        let len = reader.read_u32()? as usize;
        let score = reader.read_f32()?;

        let mut postings = Vec::with_capacity(len);
        let mut prev_doc_id = None;

        for _ in 0..len {
            let (doc_id, count) = match version {
                FormatVersion::Legacy => {
                    (reader.read_u16()? as u32, reader.read_u16()? as u32)
                }
                FormatVersion::Wide => (reader.read_u32()?, reader.read_u32()?),
            };
            let weight = reader.read_f32()?;

            if prev_doc_id.is_some_and(|prev| doc_id <= prev) {
                return Err(XiphosError::corrupt(format!(
                    "posting list out of order at document {doc_id}"
                )));
            }
            prev_doc_id = Some(doc_id);

            postings.push(Posting {
                doc_id,
                count,
                weight,
            });
        }

        Ok(DocVector { score, postings })
    }
}
