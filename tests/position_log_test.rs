//! Integration tests for the disk-backed position log.

use xiphos::error::Result;
use xiphos::poslog::{PositionLogConfig, TermPositionIndex};
use xiphos::storage::{FileStorage, StorageConfig};
use tempfile::TempDir;

/// Deterministic positions: term `t` appears in every `(t + 2)`th
/// document at a handful of ascending positions.
fn reference_positions(term_count: u32, doc_count: u32) -> Vec<Vec<(u32, u32)>> {
    let mut expected = Vec::new();
    for term_id in 0..term_count {
        let mut pairs = Vec::new();
        for doc_id in (0..doc_count).step_by(term_id as usize + 2) {
            for k in 0..(1 + (doc_id + term_id) % 3) {
                pairs.push((doc_id, doc_id * 5 + k * 11 + term_id));
            }
        }
        expected.push(pairs);
    }
    expected
}

fn ingest(index: &mut TermPositionIndex, expected: &[Vec<(u32, u32)>]) -> Result<()> {
    for (term_id, pairs) in expected.iter().enumerate() {
        for &(doc_id, position) in pairs {
            index.add(term_id as u32, doc_id, position)?;
        }
    }
    Ok(())
}

fn drain_term(index: &mut TermPositionIndex, term_id: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::new();
    while let Some(pair) = index.read_next(term_id).unwrap() {
        pairs.push(pair);
    }
    pairs
}

#[test]
fn test_ingest_and_read_back_on_disk() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path(), StorageConfig::default())?;

    let config = PositionLogConfig {
        segment_capacity: 16,
        budget_ceiling: 256,
    };
    let mut index = TermPositionIndex::create(&storage, config)?;

    let expected = reference_positions(6, 50);
    ingest(&mut index, &expected)?;
    assert!(!index.budget().over());

    for (term_id, pairs) in expected.iter().enumerate() {
        assert_eq!(index.count(term_id as u32), pairs.len() as u64);
        assert_eq!(&drain_term(&mut index, term_id as u32), pairs);
    }

    Ok(())
}

#[test]
fn test_budget_never_exceeded_during_ingest() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path(), StorageConfig::default())?;

    let config = PositionLogConfig {
        segment_capacity: 1 << 16,
        budget_ceiling: 32,
    };
    let mut index = TermPositionIndex::create(&storage, config)?;

    let expected = reference_positions(10, 60);
    for (term_id, pairs) in expected.iter().enumerate() {
        for &(doc_id, position) in pairs {
            index.add(term_id as u32, doc_id, position)?;
            assert!(!index.budget().over());
        }
    }

    for (term_id, pairs) in expected.iter().enumerate() {
        assert_eq!(&drain_term(&mut index, term_id as u32), pairs);
    }

    Ok(())
}

#[test]
fn test_restart_continues_every_term() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path(), StorageConfig::default())?;

    let config = PositionLogConfig {
        segment_capacity: 12,
        budget_ceiling: 128,
    };
    let expected = reference_positions(5, 30);

    {
        let mut index = TermPositionIndex::create(&storage, config)?;
        ingest(&mut index, &expected)?;
        index.save(&storage)?;
    }

    // A new process opens the saved log and keeps appending.
    let mut index = TermPositionIndex::open(&storage, config)?;
    assert_eq!(index.term_count(), 5);

    let mut continued = expected.clone();
    for (term_id, pairs) in continued.iter_mut().enumerate() {
        let pair = (100, term_id as u32);
        index.add(term_id as u32, pair.0, pair.1)?;
        pairs.push(pair);
    }

    for (term_id, pairs) in continued.iter().enumerate() {
        assert_eq!(index.count(term_id as u32), pairs.len() as u64);
        assert_eq!(&drain_term(&mut index, term_id as u32), pairs);
    }

    Ok(())
}

#[test]
fn test_restart_after_partial_read_rewinds_cleanly() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path(), StorageConfig::default())?;

    let config = PositionLogConfig {
        segment_capacity: 8,
        budget_ceiling: 64,
    };
    let expected = reference_positions(3, 20);

    {
        let mut index = TermPositionIndex::create(&storage, config)?;
        ingest(&mut index, &expected)?;
        // Read part of term 0 before saving.
        index.read_next(0)?;
        index.read_next(0)?;
        index.save(&storage)?;
    }

    // Cursors are not persisted; a fresh open reads from the start.
    let mut index = TermPositionIndex::open(&storage, config)?;
    for (term_id, pairs) in expected.iter().enumerate() {
        assert_eq!(&drain_term(&mut index, term_id as u32), pairs);
    }

    Ok(())
}

#[test]
fn test_open_without_save_fails() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path(), StorageConfig::default())?;

    assert!(TermPositionIndex::open(&storage, PositionLogConfig::default()).is_err());

    Ok(())
}

#[test]
fn test_truncated_metadata_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path(), StorageConfig::default())?;

    let config = PositionLogConfig::default();
    {
        let mut index = TermPositionIndex::create(&storage, config)?;
        index.add(0, 1, 1)?;
        index.save(&storage)?;
    }

    // Chop the tail off the metadata table.
    let path = temp_dir.path().join("positions_meta.bin");
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 6).unwrap();
    file.sync_all().unwrap();

    assert!(TermPositionIndex::open(&storage, config).is_err());

    Ok(())
}
