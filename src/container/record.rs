//! Fixed-stride record codec trait for container persistence.

use std::io::{Read, Write};

use crate::error::Result;

/// A record with a fixed binary encoding.
///
/// Containers persist records back to back at a constant stride, so the
/// encoded form of every value must occupy exactly [`ENCODED_LEN`] bytes.
///
/// [`ENCODED_LEN`]: FixedRecord::ENCODED_LEN
pub trait FixedRecord: Sized {
    /// Encoded size in bytes.
    const ENCODED_LEN: usize;

    /// Encode this record into a byte stream.
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()>;

    /// Decode one record from a byte stream.
    fn decode<R: Read>(reader: &mut R) -> Result<Self>;
}
