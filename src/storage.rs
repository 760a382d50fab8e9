//! Storage abstraction layer for xiphos.
//!
//! This module exposes a pluggable storage facade shared by the container,
//! posting-list, and position-log layers. File and memory backends can be
//! swapped without touching higher-level code, which keeps index structures
//! testable against in-memory buffers and deployable against real files.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at a directory
//! - Buffered sequential readers/writers, unbuffered read-write handles
//!
//! ## MemoryStorage
//! - In-memory storage for testing and temporary indexes
//! - Fast but non-persistent
//!
//! Three stream flavors exist because the index needs all three access
//! patterns: [`StorageInput`] for sequential decode, [`StorageOutput`] for
//! sequential encode, and [`StorageFile`] for the position log, which
//! interleaves appends, backward pointer patches, and reads on one file.

use std::io::{Read, Seek, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

pub mod file;
pub mod memory;
pub mod structured;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// File metadata information.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes.
    pub size: u64,

    /// Last modified time (seconds since epoch).
    pub modified: u64,

    /// Creation time (seconds since epoch).
    pub created: u64,

    /// Whether the file is read-only.
    pub readonly: bool,
}

/// A trait for storage backends that can store and retrieve index files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for sequential reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any existing contents.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open a file for appending, creating it if it does not exist.
    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open a file for combined reading and writing, creating it if it does
    /// not exist. Existing contents are preserved.
    ///
    /// This is the handle the position log uses: segment appends, next-pointer
    /// patches, and chain reads all go through one seekable stream.
    fn open_rw(&self, name: &str) -> Result<Box<dyn StorageFile>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Get file metadata.
    fn metadata(&self, name: &str) -> Result<FileMetadata>;

    /// Rename a file.
    ///
    /// Used for atomic replacement: write to a temporary name, then rename
    /// over the final name so readers never observe partial data.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Sync all pending writes to storage.
    fn sync(&self) -> Result<()>;

    /// Close the storage and release resources.
    fn close(&mut self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;

    /// Close the input stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Seek + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Get the current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Close the output stream.
    fn close(&mut self) -> Result<()>;
}

/// A trait for read-write random access to one storage file.
pub trait StorageFile: Read + Write + Seek + Send + std::fmt::Debug {
    /// Current length of the file in bytes.
    fn len(&self) -> Result<u64>;

    /// Whether the file is currently empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush buffered writes down to the storage medium.
    fn sync_data(&mut self) -> Result<()>;
}

// Box forwarding impls so trait objects can be used where generics are
// expected (e.g. StructWriter<Box<dyn StorageOutput>>).

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageFile for Box<dyn StorageFile> {
    fn len(&self) -> Result<u64> {
        self.as_ref().len()
    }

    fn sync_data(&mut self) -> Result<()> {
        self.as_mut().sync_data()
    }
}

/// Configuration for storage backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Buffer size for sequential I/O operations.
    pub buffer_size: usize,

    /// Whether to sync writes immediately on flush.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            buffer_size: 65536,
            sync_writes: false,
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),

    /// Storage is closed.
    StorageClosed,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::StorageClosed => write!(f, "Storage is closed"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for XiphosError {
    fn from(err: StorageError) -> Self {
        XiphosError::storage(err.to_string())
    }
}
