//! Per-term position vectors: an append-only pair log with a disk
//! spill path.
//!
//! A [`PositionVector`] records `(doc_id, position)` pairs for one term,
//! doc ids non-decreasing and positions strictly increasing within a
//! document. Pairs are delta-encoded into an in-memory open buffer;
//! when the buffer rolls over its byte capacity, or the owner flushes
//! it, the buffer is closed to disk as one segment in a per-term chain.
//! Closed segments are never rewritten except for the single
//! continuation-pointer patch that links the next one, so the chain
//! grows without rewriting history.
//!
//! Reading is transparent across the buffered/flushed boundary: the
//! read cursor walks the segment chain first, verifying each segment's
//! checksum as it leaves it, and continues into the open buffer.

use std::io::{Read, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::container::FixedRecord;
use crate::error::{Result, XiphosError};
use crate::poslog::budget::MemoryBudget;
use crate::poslog::codec;
use crate::storage::StorageFile;

/// Continuation-pointer sentinel: no next segment yet.
pub(crate) const NO_NEXT_SEGMENT: u64 = u64::MAX;

/// Where the read cursor sits in the chain.
#[derive(Debug, Clone)]
enum ReadPos {
    /// About to enter the segment at this file offset.
    Pending { seek: u64 },
    /// Inside a segment: next unread byte, pairs left, and the running
    /// checksum of the bytes consumed so far.
    Disk {
        seek: u64,
        remaining: u64,
        hasher: crc32fast::Hasher,
    },
    /// Inside the open buffer at this byte offset.
    Buffer { offset: usize },
}

#[derive(Debug, Clone)]
struct ReadCursor {
    /// Pairs decoded from the stream so far.
    consumed: u64,
    /// Delta bases for decoding.
    last_doc: u32,
    last_pos: i64,
    pos: ReadPos,
    /// One-slot undo buffer.
    unread: Option<(u32, u32)>,
}

impl ReadCursor {
    fn start(first_segment: Option<u64>) -> Self {
        ReadCursor {
            consumed: 0,
            last_doc: 0,
            last_pos: -1,
            pos: match first_segment {
                Some(seek) => ReadPos::Pending { seek },
                None => ReadPos::Buffer { offset: 0 },
            },
            unread: None,
        }
    }
}

/// Fixed-stride snapshot of a vector's chain state, persisted by the
/// index once the open buffer has been flushed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PositionVectorMeta {
    pub count: u64,
    pub closed_count: u64,
    pub first_segment: u64,
    pub next_ptr_slot: u64,
    pub last_doc_id: u32,
    pub last_pos: i64,
}

impl FixedRecord for PositionVectorMeta {
    const ENCODED_LEN: usize = 8 + 8 + 8 + 8 + 4 + 8;

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.count)?;
        writer.write_u64::<LittleEndian>(self.closed_count)?;
        writer.write_u64::<LittleEndian>(self.first_segment)?;
        writer.write_u64::<LittleEndian>(self.next_ptr_slot)?;
        writer.write_u32::<LittleEndian>(self.last_doc_id)?;
        writer.write_i64::<LittleEndian>(self.last_pos)?;
        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(PositionVectorMeta {
            count: reader.read_u64::<LittleEndian>()?,
            closed_count: reader.read_u64::<LittleEndian>()?,
            first_segment: reader.read_u64::<LittleEndian>()?,
            next_ptr_slot: reader.read_u64::<LittleEndian>()?,
            last_doc_id: reader.read_u32::<LittleEndian>()?,
            last_pos: reader.read_i64::<LittleEndian>()?,
        })
    }
}

/// Append-only `(doc_id, position)` log for one term.
///
/// All disk access goes through the shared positions file handed in by
/// the owner; every operation seeks before touching it, so many vectors
/// can interleave on one file.
#[derive(Debug, Clone)]
pub struct PositionVector {
    /// Total pairs appended.
    count: u64,
    /// Pairs living in closed segments.
    closed_count: u64,
    /// Open segment encoding.
    buf: Vec<u8>,
    /// Delta bases for encoding.
    write_last_doc: u32,
    write_last_pos: i64,
    /// Offset of the first closed segment.
    first_segment: Option<u64>,
    /// Offset of the most recent closed segment's pointer slot.
    next_ptr_slot: Option<u64>,
    read: ReadCursor,
}

impl Default for PositionVector {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionVector {
    /// Create a new empty vector.
    pub fn new() -> Self {
        PositionVector {
            count: 0,
            closed_count: 0,
            buf: Vec::new(),
            write_last_doc: 0,
            write_last_pos: -1,
            first_segment: None,
            next_ptr_slot: None,
            read: ReadCursor::start(None),
        }
    }

    /// Total pairs in the vector.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes held in the open buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Append one pair.
    ///
    /// # Panics
    ///
    /// Panics unless the pair strictly advances the log: the doc id must
    /// grow, or stay equal with a greater position. Feeding pairs out of
    /// order is a caller bug.
    pub fn append(
        &mut self,
        file: &mut dyn StorageFile,
        doc_id: u32,
        position: u32,
        budget: &mut MemoryBudget,
        capacity: usize,
    ) -> Result<()> {
        let advancing = doc_id > self.write_last_doc
            || (doc_id == self.write_last_doc && i64::from(position) > self.write_last_pos);
        assert!(
            advancing,
            "position appended out of order: ({doc_id}, {position}) after ({}, {})",
            self.write_last_doc, self.write_last_pos
        );

        // A document element only when the doc id moves; the position
        // base resets so position deltas are always >= 1.
        let mut encoded = Vec::with_capacity(8);
        let pos_base = if doc_id != self.write_last_doc {
            codec::encode_element(u64::from(doc_id - self.write_last_doc), true, &mut encoded);
            -1
        } else {
            self.write_last_pos
        };
        codec::encode_element((i64::from(position) - pos_base) as u64, false, &mut encoded);

        // Pairs never straddle segments.
        if !self.buf.is_empty() && self.buf.len() + encoded.len() > capacity {
            self.close_segment(file, budget)?;
        }

        self.write_last_doc = doc_id;
        self.write_last_pos = i64::from(position);
        self.buf.extend_from_slice(&encoded);
        budget.charge(encoded.len() as u64);
        self.count += 1;
        Ok(())
    }

    /// Close the open buffer to disk, releasing its budget charge.
    ///
    /// A no-op when nothing is buffered. An in-buffer read cursor is
    /// migrated to the equivalent on-disk position, so reads continue
    /// transparently.
    pub fn flush(&mut self, file: &mut dyn StorageFile, budget: &mut MemoryBudget) -> Result<()> {
        self.close_segment(file, budget)
    }

    fn close_segment(&mut self, file: &mut dyn StorageFile, budget: &mut MemoryBudget) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let buf_entries = self.count - self.closed_count;
        let seg_offset = file.seek(SeekFrom::End(0))?;

        let mut out = Vec::with_capacity(4 + self.buf.len() + 12);
        out.write_u32::<LittleEndian>(buf_entries as u32)?;
        out.extend_from_slice(&self.buf);
        out.write_u32::<LittleEndian>(crc32fast::hash(&self.buf))?;
        out.write_u64::<LittleEndian>(NO_NEXT_SEGMENT)?;
        file.write_all(&out)?;

        // Link the new segment into the chain.
        if let Some(slot) = self.next_ptr_slot {
            file.seek(SeekFrom::Start(slot))?;
            file.write_u64::<LittleEndian>(seg_offset)?;
        } else {
            self.first_segment = Some(seg_offset);
        }
        self.next_ptr_slot = Some(seg_offset + 4 + self.buf.len() as u64 + 4);

        if let ReadPos::Buffer { offset } = self.read.pos {
            let consumed_in_buf = self.read.consumed - self.closed_count;
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&self.buf[..offset]);
            self.read.pos = ReadPos::Disk {
                seek: seg_offset + 4 + offset as u64,
                remaining: buf_entries - consumed_in_buf,
                hasher,
            };
        }

        debug!(
            "closed position segment: {buf_entries} entries, {} bytes at offset {seg_offset}",
            self.buf.len()
        );
        budget.release(self.buf.len() as u64);
        self.closed_count += buf_entries;
        self.buf.clear();
        Ok(())
    }

    /// Read the next pair, or `None` when every appended pair has been
    /// read.
    ///
    /// The unread slot is served first. Results are identical whether
    /// the data is still buffered or already flushed.
    pub fn read_next(&mut self, file: &mut dyn StorageFile) -> Result<Option<(u32, u32)>> {
        if let Some(pair) = self.read.unread.take() {
            return Ok(Some(pair));
        }
        if self.read.consumed == self.count {
            return Ok(None);
        }

        loop {
            match &mut self.read.pos {
                ReadPos::Pending { seek } => {
                    let seek = *seek;
                    file.seek(SeekFrom::Start(seek))?;
                    let entry_count = file.read_u32::<LittleEndian>()?;
                    self.read.pos = ReadPos::Disk {
                        seek: seek + 4,
                        remaining: u64::from(entry_count),
                        hasher: crc32fast::Hasher::new(),
                    };
                }
                ReadPos::Disk {
                    seek,
                    remaining,
                    hasher,
                } => {
                    if *remaining == 0 {
                        // Leaving the segment: verify its checksum, then
                        // follow the continuation pointer.
                        let end = *seek;
                        let computed = hasher.clone().finalize();

                        file.seek(SeekFrom::Start(end))?;
                        let stored = file.read_u32::<LittleEndian>()?;
                        if stored != computed {
                            return Err(XiphosError::corrupt(format!(
                                "segment checksum mismatch: stored {stored:#010x}, \
                                 computed {computed:#010x}"
                            )));
                        }

                        let next = file.read_u64::<LittleEndian>()?;
                        if next == NO_NEXT_SEGMENT {
                            self.read.pos = ReadPos::Buffer { offset: 0 };
                        } else {
                            if next <= end {
                                return Err(XiphosError::corrupt(format!(
                                    "segment pointer goes backwards: {next} <= {end}"
                                )));
                            }
                            if next.saturating_add(4) > file.len()? {
                                return Err(XiphosError::corrupt(format!(
                                    "segment pointer out of range: {next}"
                                )));
                            }
                            self.read.pos = ReadPos::Pending { seek: next };
                        }
                        continue;
                    }

                    file.seek(SeekFrom::Start(*seek))?;
                    let mut reader = SegmentByteReader {
                        file: &mut *file,
                        hasher,
                        read: 0,
                    };
                    let pair =
                        decode_pair(&mut reader, &mut self.read.last_doc, &mut self.read.last_pos)?;
                    let consumed_bytes = reader.read;

                    *seek += consumed_bytes;
                    *remaining -= 1;
                    self.read.consumed += 1;
                    return Ok(Some(pair));
                }
                ReadPos::Buffer { offset } => {
                    let mut slice = &self.buf[*offset..];
                    let before = slice.len();
                    let pair =
                        decode_pair(&mut slice, &mut self.read.last_doc, &mut self.read.last_pos)?;

                    *offset += before - slice.len();
                    self.read.consumed += 1;
                    return Ok(Some(pair));
                }
            }
        }
    }

    /// Push one pair back so the next read returns it again.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already occupied; only the most recently
    /// read pair may be pushed back, once.
    pub fn unread(&mut self, pair: (u32, u32)) {
        assert!(
            self.read.unread.is_none(),
            "unread slot already occupied"
        );
        self.read.unread = Some(pair);
    }

    /// Reset the read cursor to the start of the chain.
    pub fn rewind(&mut self) {
        self.read = ReadCursor::start(self.first_segment);
    }

    pub(crate) fn to_meta(&self) -> PositionVectorMeta {
        debug_assert!(self.buf.is_empty(), "metadata captured with buffered data");
        PositionVectorMeta {
            count: self.count,
            closed_count: self.closed_count,
            first_segment: self.first_segment.unwrap_or(NO_NEXT_SEGMENT),
            next_ptr_slot: self.next_ptr_slot.unwrap_or(NO_NEXT_SEGMENT),
            last_doc_id: self.write_last_doc,
            last_pos: self.write_last_pos,
        }
    }

    pub(crate) fn from_meta(meta: &PositionVectorMeta) -> Result<Self> {
        if meta.count != meta.closed_count {
            return Err(XiphosError::corrupt(format!(
                "position vector metadata lost {} buffered entries",
                meta.count - meta.closed_count
            )));
        }

        let first_segment =
            (meta.first_segment != NO_NEXT_SEGMENT).then_some(meta.first_segment);
        Ok(PositionVector {
            count: meta.count,
            closed_count: meta.closed_count,
            buf: Vec::new(),
            write_last_doc: meta.last_doc_id,
            write_last_pos: meta.last_pos,
            first_segment,
            next_ptr_slot: (meta.next_ptr_slot != NO_NEXT_SEGMENT).then_some(meta.next_ptr_slot),
            read: ReadCursor::start(first_segment),
        })
    }
}

/// Byte source over one on-disk segment, feeding the running checksum.
struct SegmentByteReader<'a> {
    file: &'a mut dyn StorageFile,
    hasher: &'a mut crc32fast::Hasher,
    read: u64,
}

impl Read for SegmentByteReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.file.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

/// Decode one logical pair: an optional document element followed by
/// exactly one position element.
fn decode_pair<R: Read>(
    reader: &mut R,
    last_doc: &mut u32,
    last_pos: &mut i64,
) -> Result<(u32, u32)> {
    let (value, document) = codec::decode_element(reader)?;
    let pos_delta = if document {
        let delta = u32::try_from(value)
            .map_err(|_| XiphosError::corrupt("document id delta overflow"))?;
        *last_doc = last_doc
            .checked_add(delta)
            .ok_or_else(|| XiphosError::corrupt("document id overflow"))?;
        *last_pos = -1;

        let (next, document) = codec::decode_element(reader)?;
        if document {
            return Err(XiphosError::corrupt("consecutive document elements"));
        }
        next
    } else {
        value
    };

    if pos_delta == 0 {
        return Err(XiphosError::corrupt("zero position delta"));
    }
    if pos_delta > u64::from(u32::MAX) + 1 {
        return Err(XiphosError::corrupt("position delta overflow"));
    }
    let pos = *last_pos + pos_delta as i64;
    if pos > i64::from(u32::MAX) {
        return Err(XiphosError::corrupt("position overflow"));
    }
    *last_pos = pos;
    Ok((*last_doc, pos as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    use crate::storage::{MemoryStorage, Storage, StorageConfig, StorageFile};

    fn test_file(storage: &MemoryStorage) -> Box<dyn StorageFile> {
        storage.open_rw("pv.bin").unwrap()
    }

    fn append_all(
        vector: &mut PositionVector,
        file: &mut dyn StorageFile,
        budget: &mut MemoryBudget,
        capacity: usize,
        pairs: &[(u32, u32)],
    ) {
        for &(doc_id, position) in pairs {
            vector
                .append(file, doc_id, position, budget, capacity)
                .unwrap();
        }
    }

    fn drain(vector: &mut PositionVector, file: &mut dyn StorageFile) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        while let Some(pair) = vector.read_next(file).unwrap() {
            pairs.push(pair);
        }
        pairs
    }

    const PAIRS: &[(u32, u32)] = &[
        (0, 0),
        (0, 3),
        (0, 9),
        (2, 1),
        (2, 2),
        (5, 0),
        (9, 100),
        (9, 10_000),
    ];

    #[test]
    fn test_buffered_roundtrip() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, PAIRS);
        assert_eq!(vector.count(), PAIRS.len() as u64);

        assert_eq!(drain(&mut vector, file.as_mut()), PAIRS);
        assert_eq!(vector.read_next(file.as_mut()).unwrap(), None);
    }

    #[test]
    fn test_flushed_roundtrip() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, PAIRS);
        vector.flush(file.as_mut(), &mut budget).unwrap();
        assert_eq!(budget.used(), 0);
        assert_eq!(vector.buffered_bytes(), 0);

        assert_eq!(drain(&mut vector, file.as_mut()), PAIRS);
    }

    #[test]
    fn test_tiny_capacity_chains_segments() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        // Capacity of 3 bytes forces a segment every pair or two.
        append_all(&mut vector, file.as_mut(), &mut budget, 3, PAIRS);
        assert!(storage.file_size("pv.bin").unwrap() > 0);

        assert_eq!(drain(&mut vector, file.as_mut()), PAIRS);
    }

    #[test]
    fn test_flush_mid_read_is_transparent() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, PAIRS);

        let mut pairs = Vec::new();
        for _ in 0..3 {
            pairs.push(vector.read_next(file.as_mut()).unwrap().unwrap());
        }
        vector.flush(file.as_mut(), &mut budget).unwrap();
        pairs.extend(drain(&mut vector, file.as_mut()));

        assert_eq!(pairs, PAIRS);
    }

    #[test]
    fn test_reads_interleave_with_appends() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        vector.append(file.as_mut(), 1, 5, &mut budget, 64).unwrap();
        assert_eq!(vector.read_next(file.as_mut()).unwrap(), Some((1, 5)));
        assert_eq!(vector.read_next(file.as_mut()).unwrap(), None);

        // The reader picks up new appends after reporting exhaustion.
        vector.append(file.as_mut(), 1, 7, &mut budget, 64).unwrap();
        vector.flush(file.as_mut(), &mut budget).unwrap();
        vector.append(file.as_mut(), 2, 0, &mut budget, 64).unwrap();

        assert_eq!(vector.read_next(file.as_mut()).unwrap(), Some((1, 7)));
        assert_eq!(vector.read_next(file.as_mut()).unwrap(), Some((2, 0)));
        assert_eq!(vector.read_next(file.as_mut()).unwrap(), None);
    }

    #[test]
    fn test_unread_serves_first() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, PAIRS);

        let first = vector.read_next(file.as_mut()).unwrap().unwrap();
        vector.unread(first);
        assert_eq!(vector.read_next(file.as_mut()).unwrap(), Some(first));

        let rest = drain(&mut vector, file.as_mut());
        assert_eq!(rest, &PAIRS[1..]);
    }

    #[test]
    #[should_panic(expected = "unread slot already occupied")]
    fn test_double_unread_panics() {
        let mut vector = PositionVector::new();
        vector.unread((1, 1));
        vector.unread((2, 2));
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_stale_position_panics() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        vector.append(file.as_mut(), 3, 5, &mut budget, 64).unwrap();
        let _ = vector.append(file.as_mut(), 3, 5, &mut budget, 64);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_backwards_document_panics() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        vector.append(file.as_mut(), 3, 5, &mut budget, 64).unwrap();
        let _ = vector.append(file.as_mut(), 2, 9, &mut budget, 64);
    }

    #[test]
    fn test_rewind_rereads_chain() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 4, PAIRS);
        assert_eq!(drain(&mut vector, file.as_mut()), PAIRS);

        vector.rewind();
        assert_eq!(drain(&mut vector, file.as_mut()), PAIRS);
    }

    #[test]
    fn test_corrupt_segment_detected() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, PAIRS);
        vector.flush(file.as_mut(), &mut budget).unwrap();

        // Flip a byte inside the segment body (offset 4 skips the count).
        file.seek(SeekFrom::Start(5)).unwrap();
        file.write_all(&[0xff]).unwrap();

        let mut result = Ok(Some((0, 0)));
        while let Ok(Some(_)) = result {
            result = vector.read_next(file.as_mut());
        }
        assert!(result.is_err(), "corruption was not detected");
    }

    #[test]
    fn test_corrupt_pointer_detected() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, &PAIRS[..3]);
        vector.flush(file.as_mut(), &mut budget).unwrap();
        let first_slot = vector.next_ptr_slot.unwrap();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, &PAIRS[3..]);
        vector.flush(file.as_mut(), &mut budget).unwrap();

        // Point the first segment's continuation past the file end.
        let len = file.len().unwrap();
        file.seek(SeekFrom::Start(first_slot)).unwrap();
        file.write_u64::<LittleEndian>(len + 1000).unwrap();

        vector.rewind();
        let mut result = Ok(Some((0, 0)));
        while let Ok(Some(_)) = result {
            result = vector.read_next(file.as_mut());
        }
        assert!(result.is_err(), "bad pointer was not detected");
    }

    #[test]
    fn test_backwards_pointer_detected() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, &PAIRS[..3]);
        vector.flush(file.as_mut(), &mut budget).unwrap();
        let first_slot = vector.next_ptr_slot.unwrap();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, &PAIRS[3..]);
        vector.flush(file.as_mut(), &mut budget).unwrap();

        // A pointer back into the current segment would loop forever.
        file.seek(SeekFrom::Start(first_slot)).unwrap();
        file.write_u64::<LittleEndian>(0).unwrap();

        vector.rewind();
        let mut result = Ok(Some((0, 0)));
        while let Ok(Some(_)) = result {
            result = vector.read_next(file.as_mut());
        }
        assert!(result.is_err(), "backwards pointer was not detected");
    }

    #[test]
    fn test_budget_charges_and_releases() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 1 << 16, PAIRS);
        assert_eq!(budget.used() as usize, vector.buffered_bytes());
        assert!(budget.used() > 0);

        vector.flush(file.as_mut(), &mut budget).unwrap();
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_meta_restores_read_and_append() {
        let storage = MemoryStorage::new(StorageConfig::default());
        let mut file = test_file(&storage);
        let mut budget = MemoryBudget::new(1 << 20);
        let mut vector = PositionVector::new();

        append_all(&mut vector, file.as_mut(), &mut budget, 5, PAIRS);
        vector.flush(file.as_mut(), &mut budget).unwrap();
        let meta = vector.to_meta();
        drop(vector);

        let mut restored = PositionVector::from_meta(&meta).unwrap();
        assert_eq!(restored.count(), PAIRS.len() as u64);
        assert_eq!(drain(&mut restored, file.as_mut()), PAIRS);

        // Appends keep extending the same chain.
        restored
            .append(file.as_mut(), 11, 2, &mut budget, 5)
            .unwrap();
        restored.flush(file.as_mut(), &mut budget).unwrap();

        restored.rewind();
        let mut expected: Vec<(u32, u32)> = PAIRS.to_vec();
        expected.push((11, 2));
        assert_eq!(drain(&mut restored, file.as_mut()), expected);
    }

    #[test]
    fn test_meta_rejects_unflushed_counts() {
        let meta = PositionVectorMeta {
            count: 5,
            closed_count: 3,
            first_segment: 0,
            next_ptr_slot: 20,
            last_doc_id: 4,
            last_pos: 7,
        };
        assert!(PositionVector::from_meta(&meta).is_err());
    }
}
