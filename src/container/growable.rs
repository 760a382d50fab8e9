//! Growable sequence with stable integer indices.

use log::debug;

use crate::container::record::FixedRecord;
use crate::error::{Result, XiphosError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Magic number for plain container files.
pub const GROWABLE_MAGIC: u32 = u32::from_le_bytes(*b"XGV1");

/// A growable sequence addressed by stable `u32` indices.
///
/// Entries are only ever appended, so an index handed out by [`push`]
/// stays valid for the life of the container.
///
/// [`push`]: GrowableVec::push
#[derive(Debug, Clone, Default)]
pub struct GrowableVec<T> {
    items: Vec<T>,
}

impl<T> GrowableVec<T> {
    /// Create a new empty container.
    pub fn new() -> Self {
        GrowableVec { items: Vec::new() }
    }

    /// Create a new container with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        GrowableVec {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append an item and return its permanent index.
    pub fn push(&mut self, item: T) -> u32 {
        assert!(
            self.items.len() < u32::MAX as usize,
            "container index overflow"
        );

        let index = self.items.len() as u32;
        self.items.push(item);
        index
    }

    /// Get an item by index.
    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }

    /// Get a mutable reference to an item by index.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.items.get_mut(index as usize)
    }

    /// Number of items in the container.
    pub fn len(&self) -> u32 {
        self.items.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the items in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterate mutably over the items in index order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// View the items as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T> std::ops::Index<u32> for GrowableVec<T> {
    type Output = T;

    fn index(&self, index: u32) -> &T {
        let len = self.len();
        self.get(index)
            .unwrap_or_else(|| panic!("container index {index} out of range (len {len})"))
    }
}

impl<T> std::ops::IndexMut<u32> for GrowableVec<T> {
    fn index_mut(&mut self, index: u32) -> &mut T {
        let len = self.len();
        self.get_mut(index)
            .unwrap_or_else(|| panic!("container index {index} out of range (len {len})"))
    }
}

impl<'a, T> IntoIterator for &'a GrowableVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: FixedRecord> GrowableVec<T> {
    /// Write all records through a struct writer.
    ///
    /// Layout: magic, length, stride, then `length` records back to back.
    pub fn write_records<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_u32(GROWABLE_MAGIC)?;
        writer.write_u32(self.len())?;
        writer.write_u32(T::ENCODED_LEN as u32)?;

        let mut buf = Vec::with_capacity(T::ENCODED_LEN);
        for item in &self.items {
            buf.clear();
            item.encode(&mut buf)?;
            debug_assert_eq!(buf.len(), T::ENCODED_LEN);
            writer.write_bytes(&buf)?;
        }
        Ok(())
    }

    /// Read records written by [`write_records`].
    ///
    /// [`write_records`]: GrowableVec::write_records
    pub fn read_records<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Self> {
        let magic = reader.read_u32()?;
        if magic != GROWABLE_MAGIC {
            return Err(XiphosError::format(
                "container magic",
                format!("{GROWABLE_MAGIC:#010x}"),
                format!("{magic:#010x}"),
            ));
        }

        let len = reader.read_u32()?;
        let stride = reader.read_u32()?;
        if stride as usize != T::ENCODED_LEN {
            return Err(XiphosError::format(
                "record stride",
                T::ENCODED_LEN.to_string(),
                stride.to_string(),
            ));
        }

        let mut items = Vec::with_capacity(len as usize);
        let mut buf = vec![0u8; T::ENCODED_LEN];
        for _ in 0..len {
            reader.read_bytes(&mut buf)?;
            let mut slice: &[u8] = &buf;
            items.push(T::decode(&mut slice)?);
        }

        Ok(GrowableVec { items })
    }

    /// Save the container to a named, checksummed storage file.
    pub fn save_to(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let output = storage.create_output(name)?;
        let mut writer = StructWriter::new(output);
        self.write_records(&mut writer)?;
        writer.close()
    }

    /// Load a container saved with [`save_to`], verifying its checksum.
    ///
    /// [`save_to`]: GrowableVec::save_to
    pub fn load_from(storage: &dyn Storage, name: &str) -> Result<Self> {
        let input = storage.open_input(name)?;
        let mut reader = StructReader::new(input);
        let vec = Self::read_records(&mut reader)?;
        reader.verify_checksum()?;
        Ok(vec)
    }

    /// Append one record to an open, headerless record stream.
    ///
    /// The stream carries no length or checksum, so appends survive a
    /// crash at any byte boundary; [`read_appended`] drops a torn tail.
    ///
    /// [`read_appended`]: GrowableVec::read_appended
    pub fn append_record(output: &mut dyn StorageOutput, record: &T) -> Result<()> {
        let mut buf = Vec::with_capacity(T::ENCODED_LEN);
        record.encode(&mut buf)?;
        debug_assert_eq!(buf.len(), T::ENCODED_LEN);
        output.write_all(&buf)?;
        Ok(())
    }

    /// Read every whole record from a headerless record stream.
    pub fn read_appended(input: &mut dyn StorageInput) -> Result<Self> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;

        let torn = data.len() % T::ENCODED_LEN;
        if torn != 0 {
            debug!("dropping {torn} trailing bytes of torn record");
        }

        let mut items = Vec::with_capacity(data.len() / T::ENCODED_LEN);
        for chunk in data.chunks_exact(T::ENCODED_LEN) {
            let mut slice: &[u8] = chunk;
            items.push(T::decode(&mut slice)?);
        }

        Ok(GrowableVec { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use std::io::{Read, Write};

    use crate::storage::{MemoryStorage, StorageConfig};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Sample {
        id: u32,
        weight: f32,
    }

    impl FixedRecord for Sample {
        const ENCODED_LEN: usize = 8;

        fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
            writer.write_u32::<LittleEndian>(self.id)?;
            writer.write_f32::<LittleEndian>(self.weight)?;
            Ok(())
        }

        fn decode<R: Read>(reader: &mut R) -> Result<Self> {
            Ok(Sample {
                id: reader.read_u32::<LittleEndian>()?,
                weight: reader.read_f32::<LittleEndian>()?,
            })
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct WideSample {
        id: u64,
        weight: f32,
    }

    impl FixedRecord for WideSample {
        const ENCODED_LEN: usize = 12;

        fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
            writer.write_u64::<LittleEndian>(self.id)?;
            writer.write_f32::<LittleEndian>(self.weight)?;
            Ok(())
        }

        fn decode<R: Read>(reader: &mut R) -> Result<Self> {
            Ok(WideSample {
                id: reader.read_u64::<LittleEndian>()?,
                weight: reader.read_f32::<LittleEndian>()?,
            })
        }
    }

    fn storage() -> MemoryStorage {
        MemoryStorage::new(StorageConfig::default())
    }

    #[test]
    fn test_push_returns_stable_indices() {
        let mut vec = GrowableVec::new();

        for i in 0..100u32 {
            let index = vec.push(Sample {
                id: i,
                weight: i as f32,
            });
            assert_eq!(index, i);
        }

        assert_eq!(vec.len(), 100);
        assert_eq!(vec.get(42).unwrap().id, 42);
        assert_eq!(vec[99].id, 99);
        assert!(vec.get(100).is_none());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_out_of_range_panics() {
        let mut vec = GrowableVec::new();
        vec.push(Sample { id: 1, weight: 0.0 });
        let _ = vec[1];
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut vec = GrowableVec::new();
        let index = vec.push(Sample { id: 1, weight: 0.5 });

        vec.get_mut(index).unwrap().weight = 2.5;
        assert_eq!(vec[index].weight, 2.5);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let storage = storage();

        let mut vec = GrowableVec::new();
        for i in 0..10u32 {
            vec.push(Sample {
                id: i * 7,
                weight: i as f32 * 0.5,
            });
        }

        vec.save_to(&storage, "samples.bin").unwrap();

        let loaded: GrowableVec<Sample> = GrowableVec::load_from(&storage, "samples.bin").unwrap();
        assert_eq!(loaded.len(), 10);
        assert_eq!(loaded.as_slice(), vec.as_slice());
    }

    #[test]
    fn test_empty_container_roundtrip() {
        let storage = storage();

        let vec: GrowableVec<Sample> = GrowableVec::new();
        vec.save_to(&storage, "empty.bin").unwrap();

        let loaded: GrowableVec<Sample> = GrowableVec::load_from(&storage, "empty.bin").unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let storage = storage();

        let output = storage.create_output("bad.bin").unwrap();
        let mut writer = StructWriter::new(output);
        writer.write_u32(0x1234_5678).unwrap();
        writer.write_u32(0).unwrap();
        writer.write_u32(8).unwrap();
        writer.close().unwrap();

        let err = GrowableVec::<Sample>::load_from(&storage, "bad.bin").unwrap_err();
        assert!(err.to_string().contains("container magic"));
    }

    #[test]
    fn test_stride_mismatch_rejected() {
        let storage = storage();

        let mut vec = GrowableVec::new();
        vec.push(WideSample { id: 9, weight: 1.0 });
        vec.save_to(&storage, "wide.bin").unwrap();

        let err = GrowableVec::<Sample>::load_from(&storage, "wide.bin").unwrap_err();
        assert!(err.to_string().contains("record stride"));
        assert!(err.to_string().contains("expected 8"));
    }

    #[test]
    fn test_appended_records_roundtrip() {
        let storage = storage();

        let mut output = storage.create_output("log.bin").unwrap();
        for i in 0..5u32 {
            GrowableVec::append_record(
                output.as_mut(),
                &Sample {
                    id: i,
                    weight: i as f32,
                },
            )
            .unwrap();
        }
        output.close().unwrap();

        let mut input = storage.open_input("log.bin").unwrap();
        let loaded: GrowableVec<Sample> = GrowableVec::read_appended(input.as_mut()).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[4].id, 4);
    }

    #[test]
    fn test_appended_torn_tail_dropped() {
        let storage = storage();

        let mut output = storage.create_output("log.bin").unwrap();
        for i in 0..3u32 {
            GrowableVec::append_record(output.as_mut(), &Sample { id: i, weight: 0.0 }).unwrap();
        }
        // A crash mid append leaves a partial record behind.
        output.write_all(&[0xab, 0xcd]).unwrap();
        output.close().unwrap();

        let mut input = storage.open_input("log.bin").unwrap();
        let loaded: GrowableVec<Sample> = GrowableVec::read_appended(input.as_mut()).unwrap();
        assert_eq!(loaded.len(), 3);
    }
}
