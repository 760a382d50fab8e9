//! The term-document index: vocabulary, posting storage, persistence.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::container::KeyedVec;
use crate::error::{Result, XiphosError};
use crate::postings::heap::PostingHeap;
use crate::postings::vector::{DocVector, FormatVersion};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

/// Name of the binary term file inside an index directory.
pub const TERMS_FILE: &str = "terms.bin";
/// Name of the JSON manifest inside an index directory.
pub const MANIFEST_FILE: &str = "index.json";

const TERMS_MAGIC: u32 = u32::from_le_bytes(*b"XTD1");

/// How occurrence counts are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CountMode {
    /// Count every occurrence of a term in a document.
    #[default]
    Occurrences,
    /// Record presence only; counts are 0 or 1.
    Binary,
}

/// Configuration for a term-document index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Counting policy applied at ingest.
    pub count_mode: CountMode,
    /// On-disk posting field width used when saving.
    pub format_version: FormatVersion,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            count_mode: CountMode::Occurrences,
            format_version: FormatVersion::Wide,
        }
    }
}

/// Summary counters for an index.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndexStats {
    pub term_count: u32,
    pub doc_count: u32,
    pub posting_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    format_version: FormatVersion,
    doc_count: u32,
    term_count: u32,
    term_file: String,
}

/// A term-document index: one [`DocVector`] per term, addressed by term
/// string or by the stable term id assigned at first sight.
///
/// This is the column-major half of the engine. Row-major access (all
/// terms of one document) goes through [`posting_heap`].
///
/// [`posting_heap`]: TermDocIndex::posting_heap
#[derive(Debug, Default)]
pub struct TermDocIndex {
    terms: KeyedVec<DocVector>,
    doc_count: u32,
    config: IndexConfig,
}

impl TermDocIndex {
    /// Create a new empty index.
    pub fn new(config: IndexConfig) -> Self {
        TermDocIndex {
            terms: KeyedVec::new(),
            doc_count: 0,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> IndexConfig {
        self.config
    }

    /// Change the counting policy for subsequent adds.
    pub fn set_count_mode(&mut self, mode: CountMode) {
        self.config.count_mode = mode;
    }

    /// Record one occurrence of `term` in `doc_id` and return the term's
    /// id, interning the term on first sight.
    ///
    /// Occurrences of one document should be fed contiguously and in
    /// ascending document order for best behavior, but any order is
    /// correct.
    pub fn add_occurrence(&mut self, term: &str, doc_id: u32) -> u32 {
        self.doc_count = self.doc_count.max(doc_id.saturating_add(1));

        let term_id = self.terms.get_or_add_with(term, DocVector::new);
        let posting = self.terms[term_id].add_or_accumulate(doc_id, 1, 0.0);
        if self.config.count_mode == CountMode::Binary && posting.count > 1 {
            posting.count = 1;
        }
        term_id
    }

    /// Look up a term's id without interning it.
    pub fn term_id(&self, term: &str) -> Option<u32> {
        self.terms.find_by_key(term)
    }

    /// The term string for an id.
    pub fn term(&self, term_id: u32) -> Option<&str> {
        self.terms.key(term_id)
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> u32 {
        self.terms.len()
    }

    /// One past the highest document id seen.
    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// A term's posting vector.
    pub fn vector(&self, term_id: u32) -> Option<&DocVector> {
        self.terms.get(term_id)
    }

    /// Mutable access to a term's posting vector, for scoring passes
    /// that rewrite weights between retrievals.
    pub fn vector_mut(&mut self, term_id: u32) -> Option<&mut DocVector> {
        self.terms.get_mut(term_id)
    }

    /// Iterate over `(term, vector)` pairs in term id order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, &DocVector)> {
        self.terms.entries()
    }

    /// Build a merge heap over every term in the index.
    pub fn posting_heap(&self) -> PostingHeap<'_> {
        PostingHeap::new(
            self.terms
                .iter()
                .enumerate()
                .map(|(term_id, vector)| (term_id as u32, vector)),
        )
    }

    /// Build a merge heap over a subset of terms.
    ///
    /// Unknown term ids contribute nothing.
    pub fn posting_heap_for(&self, term_ids: &[u32]) -> PostingHeap<'_> {
        PostingHeap::new(
            term_ids
                .iter()
                .filter_map(|&term_id| self.terms.get(term_id).map(|vector| (term_id, vector))),
        )
    }

    /// Summary counters.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            term_count: self.terms.len(),
            doc_count: self.doc_count,
            posting_count: self.terms.iter().map(|v| v.len() as u64).sum(),
        }
    }

    /// Persist the index into a storage directory.
    ///
    /// Writes the binary term file and the JSON manifest, each through a
    /// temporary name and a rename, so a reader never observes a half
    /// written index.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        let version = self.config.format_version;

        let tmp_terms = format!("{TERMS_FILE}.tmp");
        let output = storage.create_output(&tmp_terms)?;
        let mut writer = StructWriter::new(output);
        writer.write_u32(TERMS_MAGIC)?;
        writer.write_u32(u32::from(version))?;
        writer.write_u32(self.doc_count)?;
        writer.write_u32(self.terms.len())?;
        for (term, vector) in self.terms.entries() {
            writer.write_string(term)?;
            vector.write_to(&mut writer, version)?;
        }
        writer.close()?;
        storage.rename_file(&tmp_terms, TERMS_FILE)?;

        let manifest = IndexManifest {
            format_version: version,
            doc_count: self.doc_count,
            term_count: self.terms.len(),
            term_file: TERMS_FILE.to_string(),
        };
        let tmp_manifest = format!("{MANIFEST_FILE}.tmp");
        let mut output = storage.create_output(&tmp_manifest)?;
        output.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
        output.close()?;
        storage.rename_file(&tmp_manifest, MANIFEST_FILE)?;

        Ok(())
    }

    /// Open an index saved with [`save`].
    ///
    /// The manifest's format version governs decoding. The count mode is
    /// not persisted; the opened index starts with the default one.
    ///
    /// [`save`]: TermDocIndex::save
    pub fn open(storage: &dyn Storage) -> Result<Self> {
        let mut input = storage.open_input(MANIFEST_FILE)?;
        let mut json = Vec::new();
        input.read_to_end(&mut json)?;
        let manifest: IndexManifest = serde_json::from_slice(&json)?;

        let input = storage.open_input(&manifest.term_file)?;
        let mut reader = StructReader::new(input);

        let magic = reader.read_u32()?;
        if magic != TERMS_MAGIC {
            return Err(XiphosError::format(
                "term file magic",
                format!("{TERMS_MAGIC:#010x}"),
                format!("{magic:#010x}"),
            ));
        }

        let version = FormatVersion::try_from(reader.read_u32()?)?;
        if version != manifest.format_version {
            return Err(XiphosError::format(
                "term file version",
                u32::from(manifest.format_version).to_string(),
                u32::from(version).to_string(),
            ));
        }

        let doc_count = reader.read_u32()?;
        let term_count = reader.read_u32()?;
        if term_count != manifest.term_count {
            return Err(XiphosError::corrupt(format!(
                "term count disagrees with manifest: {term_count} vs {}",
                manifest.term_count
            )));
        }

        let mut terms = KeyedVec::new();
        for _ in 0..term_count {
            let term = reader.read_string()?;
            let vector = DocVector::read_from(&mut reader, version)?;
            terms
                .try_add_with_key(&term, vector)
                .map_err(|e| XiphosError::corrupt(format!("invalid term file: {e}")))?;
        }
        reader.verify_checksum()?;

        Ok(TermDocIndex {
            terms,
            doc_count,
            config: IndexConfig {
                count_mode: CountMode::default(),
                format_version: version,
            },
        })
    }
}
