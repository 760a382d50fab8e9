//! Variable-length element codec for the position log.
//!
//! The log is a stream of elements in two interleaved kinds: document
//! elements carry a document id delta, position elements a position
//! delta. The leading byte holds 6 payload bits plus a kind flag and a
//! continuation flag; continuation bytes hold 7 payload bits plus a
//! continuation flag. Low-order groups come first.

use std::io::Read;

use crate::error::{Result, XiphosError};

/// Leading-byte flag marking a document element.
const DOC_FLAG: u8 = 0b0100_0000;
/// Continuation flag, on every byte that has a successor.
const MORE_FLAG: u8 = 0b1000_0000;
/// Payload mask of the leading byte.
const LEAD_PAYLOAD: u8 = 0b0011_1111;
/// Payload mask of continuation bytes.
const CONT_PAYLOAD: u8 = 0b0111_1111;

/// Append one encoded element to `buf`.
pub fn encode_element(value: u64, document: bool, buf: &mut Vec<u8>) {
    let mut lead = (value as u8) & LEAD_PAYLOAD;
    if document {
        lead |= DOC_FLAG;
    }

    let mut rest = value >> 6;
    if rest != 0 {
        lead |= MORE_FLAG;
    }
    buf.push(lead);

    while rest != 0 {
        let mut byte = (rest as u8) & CONT_PAYLOAD;
        rest >>= 7;
        if rest != 0 {
            byte |= MORE_FLAG;
        }
        buf.push(byte);
    }
}

/// Encoded size of one element in bytes.
pub fn encoded_len(value: u64) -> usize {
    let mut len = 1;
    let mut rest = value >> 6;
    while rest != 0 {
        len += 1;
        rest >>= 7;
    }
    len
}

/// Decode one element, returning `(value, is_document)`.
///
/// Works over any byte source; the position log reads from both its
/// in-memory buffer and the segment chain on disk.
pub fn decode_element<R: Read>(reader: &mut R) -> Result<(u64, bool)> {
    let lead = read_byte(reader)?;
    let document = lead & DOC_FLAG != 0;
    let mut value = u64::from(lead & LEAD_PAYLOAD);
    let mut shift = 6u32;
    let mut more = lead & MORE_FLAG != 0;

    while more {
        let byte = read_byte(reader)?;
        if shift >= 64 {
            return Err(XiphosError::corrupt("position element overflow"));
        }
        value |= u64::from(byte & CONT_PAYLOAD) << shift;
        shift += 7;
        more = byte & MORE_FLAG != 0;
    }

    Ok((value, document))
}

fn read_byte<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}
