//! Growable sequence with a string key table.

use ahash::AHashMap;

use crate::container::growable::GrowableVec;
use crate::container::record::FixedRecord;
use crate::error::{Result, XiphosError};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::varint;

/// Magic number for keyed container files.
pub const KEYED_MAGIC: u32 = u32::from_le_bytes(*b"XKV1");

/// A growable sequence whose entries are also addressable by string key.
///
/// Every index maps to exactly one non-empty key and back. Keys are
/// assigned once at insertion and never change, which is what makes the
/// returned indices usable as permanent ids (term ids, for instance).
#[derive(Debug, Clone, Default)]
pub struct KeyedVec<T> {
    items: GrowableVec<T>,
    keys: Vec<String>,
    by_key: AHashMap<String, u32>,
}

impl<T> KeyedVec<T> {
    /// Create a new empty keyed container.
    pub fn new() -> Self {
        KeyedVec {
            items: GrowableVec::new(),
            keys: Vec::new(),
            by_key: AHashMap::new(),
        }
    }

    /// Append an item under a key and return its permanent index.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty or already present. Both are caller
    /// bugs, not data errors.
    pub fn add_with_key(&mut self, key: &str, item: T) -> u32 {
        match self.try_add_with_key(key, item) {
            Ok(index) => index,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible insert used when keys come from stored data.
    pub(crate) fn try_add_with_key(&mut self, key: &str, item: T) -> Result<u32> {
        if key.is_empty() {
            return Err(XiphosError::container("empty key"));
        }
        if self.by_key.contains_key(key) {
            return Err(XiphosError::container(format!("duplicate key: {key}")));
        }

        let index = self.items.push(item);
        self.keys.push(key.to_string());
        self.by_key.insert(key.to_string(), index);
        Ok(index)
    }

    /// Look up the index for a key without mutating anything.
    pub fn find_by_key(&self, key: &str) -> Option<u32> {
        self.by_key.get(key).copied()
    }

    /// Return the index for a key, inserting a fresh item if absent.
    pub fn get_or_add_with<F: FnOnce() -> T>(&mut self, key: &str, make: F) -> u32 {
        match self.find_by_key(key) {
            Some(index) => index,
            None => self.add_with_key(key, make()),
        }
    }

    /// Get an item by index.
    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index)
    }

    /// Get a mutable reference to an item by index.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Get the key for an index.
    pub fn key(&self, index: u32) -> Option<&str> {
        self.keys.get(index as usize).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> u32 {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over `(key, item)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &T)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.items.iter())
    }

    /// Iterate over items in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterate mutably over items in index order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> std::ops::Index<u32> for KeyedVec<T> {
    type Output = T;

    fn index(&self, index: u32) -> &T {
        &self.items[index]
    }
}

impl<T> std::ops::IndexMut<u32> for KeyedVec<T> {
    fn index_mut(&mut self, index: u32) -> &mut T {
        &mut self.items[index]
    }
}

impl<T: FixedRecord> KeyedVec<T> {
    /// Write all entries through a struct writer.
    ///
    /// Layout: magic, length, stride, then `length` entries of
    /// length-prefixed key followed by the fixed-stride record.
    pub fn write_records<W: StorageOutput>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_u32(KEYED_MAGIC)?;
        writer.write_u32(self.len())?;
        writer.write_u32(T::ENCODED_LEN as u32)?;

        let mut buf = Vec::with_capacity(T::ENCODED_LEN);
        for (key, item) in self.entries() {
            writer.write_string(key)?;
            buf.clear();
            item.encode(&mut buf)?;
            debug_assert_eq!(buf.len(), T::ENCODED_LEN);
            writer.write_bytes(&buf)?;
        }
        Ok(())
    }

    /// Read entries written by [`write_records`].
    ///
    /// [`write_records`]: KeyedVec::write_records
    pub fn read_records<R: StorageInput>(reader: &mut StructReader<R>) -> Result<Self> {
        let magic = reader.read_u32()?;
        if magic != KEYED_MAGIC {
            return Err(XiphosError::format(
                "keyed container magic",
                format!("{KEYED_MAGIC:#010x}"),
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

        let mut vec = KeyedVec::new();
        let mut buf = vec![0u8; T::ENCODED_LEN];
        for _ in 0..len {
            let key = reader.read_string()?;
            reader.read_bytes(&mut buf)?;
            let mut slice: &[u8] = &buf;
            let item = T::decode(&mut slice)?;
            vec.try_add_with_key(&key, item)
                .map_err(|e| XiphosError::corrupt(format!("invalid keyed container: {e}")))?;
        }
        Ok(vec)
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
    /// [`save_to`]: KeyedVec::save_to
    pub fn load_from(storage: &dyn Storage, name: &str) -> Result<Self> {
        let input = storage.open_input(name)?;
        let mut reader = StructReader::new(input);
        let vec = Self::read_records(&mut reader)?;
        reader.verify_checksum()?;
        Ok(vec)
    }

    /// Append one entry to an open, headerless entry stream.
    ///
    /// Companion to [`read_appended`] for logs that must survive a
    /// crash mid write.
    ///
    /// [`read_appended`]: KeyedVec::read_appended
    pub fn append_entry(output: &mut dyn StorageOutput, key: &str, record: &T) -> Result<()> {
        let mut buf = Vec::with_capacity(key.len() + T::ENCODED_LEN + 2);
        varint::write_u64(&mut buf, key.len() as u64)?;
        buf.extend_from_slice(key.as_bytes());
        record.encode(&mut buf)?;
        output.write_all(&buf)?;
        Ok(())
    }

    /// Read every whole entry from a headerless entry stream.
    ///
    /// A torn final entry is dropped; a duplicate or empty key in the
    /// middle of the stream is corruption.
    pub fn read_appended(input: &mut dyn StorageInput) -> Result<Self> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;

        let mut vec = KeyedVec::new();
        let mut offset = 0usize;

        while offset < data.len() {
            let Ok((key_len, prefix_len)) = varint::decode_u64(&data[offset..]) else {
                break;
            };
            let key_start = offset + prefix_len;
            // A corrupt prefix can claim a length near u64::MAX; treat
            // anything the remaining bytes cannot hold as a torn tail.
            let Some(key_end) = usize::try_from(key_len)
                .ok()
                .and_then(|len| key_start.checked_add(len))
            else {
                break;
            };
            let Some(entry_end) = key_end.checked_add(T::ENCODED_LEN) else {
                break;
            };
            if entry_end > data.len() {
                break;
            }

            let key = std::str::from_utf8(&data[key_start..key_end])
                .map_err(|e| XiphosError::corrupt(format!("invalid key bytes: {e}")))?;
            let mut slice: &[u8] = &data[key_end..entry_end];
            let item = T::decode(&mut slice)?;

            vec.try_add_with_key(key, item)
                .map_err(|e| XiphosError::corrupt(format!("invalid entry stream: {e}")))?;
            offset = entry_end;
        }

        Ok(vec)
    }
}
