//! Shared utility modules used across xiphos components.

pub mod varint;
