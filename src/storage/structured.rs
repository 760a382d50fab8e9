//! Structured binary I/O with checksums.
//!
//! [`StructWriter`] and [`StructReader`] read and write little-endian
//! fixed-width fields, varints, and length-prefixed strings over the
//! storage traits, maintaining a running CRC32 so a file can carry a
//! trailing checksum of everything in front of it.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, XiphosError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// Writes structured binary data with a running checksum.
pub struct StructWriter<W: StorageOutput> {
    output: W,
    hasher: crc32fast::Hasher,
    written: u64,
    closed: bool,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new struct writer wrapping a storage output.
    pub fn new(output: W) -> Self {
        StructWriter {
            output,
            hasher: crc32fast::Hasher::new(),
            written: 0,
            closed: false,
        }
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(XiphosError::storage("writer is closed"))
        } else {
            Ok(())
        }
    }

    /// Write raw bytes, folding them into the checksum.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.check_closed()?;
        self.output.write_all(buf)?;
        self.hasher.update(buf);
        self.written += buf.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write_bytes(&buf)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(&buf)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write_bytes(&buf)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, value);
        self.write_bytes(&buf)
    }

    /// Write an unsigned integer in 7-bit varint encoding.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let buf = varint::encode_u64(value);
        self.write_bytes(&buf)
    }

    /// Write a varint length prefix followed by UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_bytes(value.as_bytes())
    }

    /// Number of bytes written so far, excluding the checksum trailer.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// The checksum of everything written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Write the checksum trailer and close the underlying output.
    pub fn close(&mut self) -> Result<()> {
        self.check_closed()?;

        let checksum = self.hasher.clone().finalize();
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, checksum);
        self.output.write_all(&buf)?;

        self.output.close()?;
        self.closed = true;
        Ok(())
    }
}

impl<W: StorageOutput> std::fmt::Debug for StructWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("written", &self.written)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Reads structured binary data, verifying a trailing checksum on demand.
pub struct StructReader<R: StorageInput> {
    input: R,
    hasher: crc32fast::Hasher,
    read: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new struct reader wrapping a storage input.
    pub fn new(input: R) -> Self {
        StructReader {
            input,
            hasher: crc32fast::Hasher::new(),
            read: 0,
        }
    }

    /// Read exactly `buf.len()` bytes, folding them into the checksum.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf)?;
        self.hasher.update(buf);
        self.read += buf.len() as u64;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(LittleEndian::read_f32(&buf))
    }

    /// Read an unsigned integer in 7-bit varint encoding.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                return Err(XiphosError::corrupt("varint overflow"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a varint length prefix followed by UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|e| XiphosError::corrupt(format!("invalid UTF-8: {e}")))
    }

    /// Number of bytes read so far, excluding the checksum trailer.
    pub fn position(&self) -> u64 {
        self.read
    }

    /// Read the checksum trailer and compare it against the bytes
    /// consumed so far.
    ///
    /// Call this after the body has been fully read.
    pub fn verify_checksum(&mut self) -> Result<()> {
        let mut buf = [0u8; 4];
        self.input.read_exact(&mut buf)?;
        let stored = LittleEndian::read_u32(&buf);
        let computed = self.hasher.clone().finalize();

        if stored != computed {
            return Err(XiphosError::corrupt(format!(
                "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }
        Ok(())
    }
}

impl<R: StorageInput> std::fmt::Debug for StructReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructReader")
            .field("read", &self.read)
            .finish()
    }
}
