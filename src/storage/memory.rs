//! In-memory storage implementation for testing and ephemeral indexes.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::{
    FileMetadata, Storage, StorageConfig, StorageError, StorageFile, StorageInput, StorageOutput,
};

type Buffer = Arc<RwLock<Vec<u8>>>;

/// An in-memory storage implementation.
///
/// All files live in one shared map, so outputs are visible to
/// subsequent inputs without any filesystem involvement. Useful for
/// tests and for indexes that never need to survive the process.
#[derive(Debug)]
pub struct MemoryStorage {
    files: Arc<RwLock<AHashMap<String, Buffer>>>,
    closed: bool,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new(_config: StorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(AHashMap::new())),
            closed: false,
        }
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(StorageError::StorageClosed.into())
        } else {
            Ok(())
        }
    }

    fn buffer(&self, name: &str) -> Option<Buffer> {
        self.files.read().get(name).cloned()
    }

    fn buffer_or_create(&self, name: &str) -> Buffer {
        let mut files = self.files.write();
        files
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.check_closed()?;

        let buffer = self
            .buffer(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        // Inputs read a snapshot taken at open time.
        let data = buffer.read().clone();
        Ok(Box::new(MemoryInput { data, pos: 0 }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_closed()?;

        let buffer = self.buffer_or_create(name);
        buffer.write().clear();
        Ok(Box::new(MemoryOutput { buffer, pos: 0 }))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_closed()?;

        let buffer = self.buffer_or_create(name);
        let pos = buffer.read().len() as u64;
        Ok(Box::new(MemoryOutput { buffer, pos }))
    }

    fn open_rw(&self, name: &str) -> Result<Box<dyn StorageFile>> {
        self.check_closed()?;

        let buffer = self.buffer_or_create(name);
        Ok(Box::new(MemoryFile { buffer, pos: 0 }))
    }

    fn file_exists(&self, name: &str) -> bool {
        if self.closed {
            return false;
        }

        self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_closed()?;

        self.files.write().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.check_closed()?;

        let mut files: Vec<String> = self.files.read().keys().cloned().collect();
        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.check_closed()?;

        let buffer = self
            .buffer(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;
        let size = buffer.read().len() as u64;
        Ok(size)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        Ok(FileMetadata {
            size: self.file_size(name)?,
            modified: 0,
            created: 0,
            readonly: false,
        })
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_closed()?;

        let mut files = self.files.write();
        let buffer = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;
        files.insert(new_name.to_string(), buffer);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.check_closed()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn seek_position(len: u64, current: u64, pos: SeekFrom) -> std::io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => offset as i64,
        SeekFrom::End(offset) => len as i64 + offset,
        SeekFrom::Current(offset) => current as i64 + offset,
    };

    if target < 0 {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "seek before start of buffer",
        ))
    } else {
        Ok(target as u64)
    }
}

fn write_at(data: &mut Vec<u8>, pos: u64, buf: &[u8]) {
    let pos = pos as usize;
    let end = pos + buf.len();
    if end > data.len() {
        data.resize(end, 0);
    }
    data[pos..end].copy_from_slice(buf);
}

fn read_at(data: &[u8], pos: u64, buf: &mut [u8]) -> usize {
    let pos = pos as usize;
    if pos >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - pos);
    buf[..n].copy_from_slice(&data[pos..pos + n]);
    n
}

/// A reader over a snapshot of an in-memory file.
#[derive(Debug)]
pub struct MemoryInput {
    data: Vec<u8>,
    pos: u64,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = read_at(&self.data, self.pos, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.pos = seek_position(self.data.len() as u64, self.pos, pos)?;
        Ok(self.pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A writer into a shared in-memory file.
#[derive(Debug)]
pub struct MemoryOutput {
    buffer: Buffer,
    pos: u64,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        write_at(&mut self.buffer.write(), self.pos, buf);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.buffer.read().len() as u64;
        self.pos = seek_position(len, self.pos, pos)?;
        Ok(self.pos)
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.pos)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A read-write handle into a shared in-memory file.
#[derive(Debug)]
pub struct MemoryFile {
    buffer: Buffer,
    pos: u64,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = read_at(&self.buffer.read(), self.pos, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        write_at(&mut self.buffer.write(), self.pos, buf);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.buffer.read().len() as u64;
        self.pos = seek_position(len, self.pos, pos)?;
        Ok(self.pos)
    }
}

impl StorageFile for MemoryFile {
    fn len(&self) -> Result<u64> {
        Ok(self.buffer.read().len() as u64)
    }

    fn sync_data(&mut self) -> Result<()> {
        Ok(())
    }
}
