//! Growable little-endian writer with back-patching.
//!
//! Container formats frequently emit a size or count before the data it
//! describes is known. [`BinaryWriter`] keeps the whole output in memory so a
//! placeholder can be reserved, the payload written, and the placeholder
//! patched afterwards.

use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, Result};

/// Little-endian output buffer.
///
/// # Example
///
/// ```
/// use bnsdat_common::BinaryWriter;
///
/// let mut writer = BinaryWriter::new();
/// let size_at = writer.reserve_i32();
/// writer.write_u16(8);
/// writer.patch_i32(size_at, 2).unwrap();
///
/// assert_eq!(writer.into_inner(), vec![2, 0, 0, 0, 8, 0]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current write position (the number of bytes written).
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer and return the output.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a zero i32 placeholder and return its position.
    pub fn reserve_i32(&mut self) -> usize {
        let position = self.position();
        self.write_i32(0);
        position
    }

    /// Write a zero i64 placeholder and return its position.
    pub fn reserve_i64(&mut self) -> usize {
        let position = self.position();
        self.write_i64(0);
        position
    }

    fn patch_slot(&mut self, position: usize, size: usize) -> Result<&mut [u8]> {
        let len = self.buf.len();
        self.buf
            .get_mut(position..position + size)
            .ok_or(Error::FieldOutOfRange {
                offset: position,
                size,
                len,
            })
    }

    /// Overwrite a previously written i32.
    pub fn patch_i32(&mut self, position: usize, value: i32) -> Result<()> {
        LittleEndian::write_i32(self.patch_slot(position, 4)?, value);
        Ok(())
    }

    /// Overwrite a previously written i64.
    pub fn patch_i64(&mut self, position: usize, value: i64) -> Result<()> {
        LittleEndian::write_i64(self.patch_slot(position, 8)?, value);
        Ok(())
    }
}
