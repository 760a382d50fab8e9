//! Integration tests for the full ingest-and-rebuild pipeline: term
//! postings and position logs filled side by side, documents rebuilt in
//! order through the posting heap, positions streamed back per term.

use std::collections::HashMap;

use xiphos::error::Result;
use xiphos::poslog::{PositionLogConfig, TermPositionIndex};
use xiphos::postings::{IndexConfig, TermDocIndex};
use xiphos::storage::{MemoryStorage, StorageConfig};

const WORDS: &[&str] = &[
    "delta", "segment", "budget", "vector", "posting", "merge", "cursor", "chain",
];

/// Deterministic tokenized corpus; the token index is its position.
fn corpus(doc_count: usize) -> Vec<Vec<&'static str>> {
    let mut documents = Vec::with_capacity(doc_count);
    for i in 0..doc_count {
        let length = 5 + (i % 6);
        let mut tokens = Vec::with_capacity(length);
        for p in 0..length {
            tokens.push(WORDS[(i * 3 + p * 5) % WORDS.len()]);
        }
        documents.push(tokens);
    }
    documents
}

struct Ingested {
    postings: TermDocIndex,
    positions: TermPositionIndex,
    /// Reference positions per `(doc_id, term_id)`.
    reference: HashMap<(u32, u32), Vec<u32>>,
}

fn ingest(doc_count: usize) -> Result<Ingested> {
    let storage = MemoryStorage::new(StorageConfig::default());
    let config = PositionLogConfig {
        segment_capacity: 8,
        budget_ceiling: 48,
    };

    let mut postings = TermDocIndex::new(IndexConfig::default());
    let mut positions = TermPositionIndex::create(&storage, config)?;
    let mut reference: HashMap<(u32, u32), Vec<u32>> = HashMap::new();

    for (doc_id, tokens) in corpus(doc_count).iter().enumerate() {
        let doc_id = doc_id as u32;
        for (position, token) in tokens.iter().enumerate() {
            let term_id = postings.add_occurrence(token, doc_id);
            positions.add(term_id, doc_id, position as u32)?;
            reference
                .entry((doc_id, term_id))
                .or_default()
                .push(position as u32);
        }
    }

    Ok(Ingested {
        postings,
        positions,
        reference,
    })
}

#[test]
fn test_documents_come_back_in_order_with_counts() -> Result<()> {
    let ingested = ingest(25)?;
    let reference = &ingested.reference;

    let mut heap = ingested.postings.posting_heap();
    let mut seen_docs = 0u32;
    let mut previous = None;
    while let Some(tv) = heap.next_document() {
        if let Some(prev) = previous {
            assert!(tv.doc_id > prev, "documents out of order");
        }
        previous = Some(tv.doc_id);
        seen_docs += 1;

        for entry in &tv.entries {
            let expected = &reference[&(tv.doc_id, entry.term_id)];
            assert_eq!(entry.count as usize, expected.len());
        }
    }
    assert_eq!(seen_docs, ingested.postings.doc_count());

    Ok(())
}

#[test]
fn test_positions_stream_alongside_the_heap() -> Result<()> {
    let mut ingested = ingest(25)?;
    let reference = &ingested.reference;

    // Walk documents in order; for each term of a document, drain that
    // document's positions and push the first foreign pair back.
    let mut heap = ingested.postings.posting_heap();
    while let Some(tv) = heap.next_document() {
        for entry in &tv.entries {
            let mut streamed = Vec::new();
            while let Some(pair) = ingested.positions.read_next(entry.term_id)? {
                if pair.0 != tv.doc_id {
                    ingested.positions.unread(entry.term_id, pair);
                    break;
                }
                streamed.push(pair.1);
            }

            assert_eq!(&streamed, &reference[&(tv.doc_id, entry.term_id)]);
        }
    }

    // Every log is fully consumed.
    for term_id in 0..ingested.positions.term_count() {
        assert_eq!(ingested.positions.read_next(term_id)?, None);
    }

    Ok(())
}

#[test]
fn test_predicate_skips_whole_documents() -> Result<()> {
    let ingested = ingest(30)?;

    let mut heap = ingested.postings.posting_heap();
    let mut kept = Vec::new();
    while let Some(tv) = heap.next_document_matching(|doc_id| doc_id % 2 == 0) {
        kept.push(tv.doc_id);
    }

    let expected: Vec<u32> = (0..ingested.postings.doc_count())
        .filter(|d| d % 2 == 0)
        .collect();
    assert_eq!(kept, expected);

    Ok(())
}

#[test]
fn test_subset_heap_rebuilds_partial_documents() -> Result<()> {
    let ingested = ingest(25)?;
    let reference = &ingested.reference;

    let chosen: Vec<u32> = ["delta", "merge"]
        .iter()
        .filter_map(|t| ingested.postings.term_id(t))
        .collect();
    assert_eq!(chosen.len(), 2);

    let mut heap = ingested.postings.posting_heap_for(&chosen);
    while let Some(tv) = heap.next_document() {
        for entry in &tv.entries {
            assert!(chosen.contains(&entry.term_id));
            assert_eq!(
                entry.count as usize,
                reference[&(tv.doc_id, entry.term_id)].len()
            );
        }
    }

    Ok(())
}

#[test]
fn test_rewound_positions_replay_after_flush_all() -> Result<()> {
    let mut ingested = ingest(12)?;
    let reference = &ingested.reference;

    // Consume everything, spill, then replay from the start.
    for term_id in 0..ingested.positions.term_count() {
        while ingested.positions.read_next(term_id)?.is_some() {}
    }
    ingested.positions.flush_all()?;
    ingested.positions.rewind_all();

    for term_id in 0..ingested.positions.term_count() {
        let mut streamed: HashMap<u32, Vec<u32>> = HashMap::new();
        while let Some((doc_id, position)) = ingested.positions.read_next(term_id)? {
            streamed.entry(doc_id).or_default().push(position);
        }
        for (doc_id, positions) in streamed {
            assert_eq!(&positions, &reference[&(doc_id, term_id)]);
        }
    }

    Ok(())
}
