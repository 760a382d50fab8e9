//! Error types for the xiphos library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`XiphosError`] enum. Caller bugs (non-monotonic position appends,
//! duplicate vocabulary keys, double `unread`) are not errors: they panic,
//! because continuing would risk writing a corrupted on-disk structure.
//!
//! # Examples
//!
//! ```
//! use xiphos::error::{Result, XiphosError};
//!
//! fn check_magic(found: &[u8]) -> Result<()> {
//!     if found != b"XIPH" {
//!         return Err(XiphosError::format("container magic", "XIPH", format!("{found:?}")));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for xiphos operations.
#[derive(Error, Debug)]
pub enum XiphosError {
    /// I/O errors (file operations, stream read/write).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Container-related errors (growable/keyed sequence persistence).
    #[error("Container error: {0}")]
    Container(String),

    /// Index-related errors (term index, posting lists, merge).
    #[error("Index error: {0}")]
    Index(String),

    /// Storage-related errors (backend open/create/delete failures).
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted structure did not match the expected format.
    #[error("Format mismatch in {what}: expected {expected}, found {found}")]
    Format {
        /// Which structure was being decoded.
        what: String,
        /// The format token the reader expected.
        expected: String,
        /// The token actually present in the stream.
        found: String,
    },

    /// A persisted structure is damaged (bad checksum, dangling or cyclic
    /// segment pointer, truncated stream).
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// JSON serialization/deserialization errors (index manifest).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error from collaborating code.
    #[error("Error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with [`XiphosError`].
pub type Result<T> = std::result::Result<T, XiphosError>;

impl XiphosError {
    /// Create a new container error.
    pub fn container<S: Into<String>>(msg: S) -> Self {
        XiphosError::Container(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        XiphosError::Index(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        XiphosError::Storage(msg.into())
    }

    /// Create a new format-mismatch error naming expected vs found tokens.
    pub fn format<W, E, F>(what: W, expected: E, found: F) -> Self
    where
        W: Into<String>,
        E: Into<String>,
        F: Into<String>,
    {
        XiphosError::Format {
            what: what.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a new corrupt-data error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        XiphosError::Corrupt(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        XiphosError::Other(msg.into())
    }
}
