//! Read and write options.
//!
//! Nothing in a datafile says whether its size fields are 32 or 64 bits wide,
//! so the width is always chosen by the caller.

use bnsdat_common::{BinaryReader, BinaryWriter};

use crate::{Error, Result};

/// Default upper bound for the inflated payload of one compressed block.
pub const DEFAULT_COMPRESSION_BLOCK_SIZE: usize = 0xFFFF;

/// Default zlib compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Width of the size and count integers in headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntWidth {
    #[default]
    Bits32,
    Bits64,
}

impl IntWidth {
    #[inline]
    pub const fn is_64(self) -> bool {
        matches!(self, IntWidth::Bits64)
    }

    /// Encoded size in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            IntWidth::Bits32 => 4,
            IntWidth::Bits64 => 8,
        }
    }

    pub(crate) fn read(self, reader: &mut BinaryReader<'_>) -> Result<i64> {
        Ok(match self {
            IntWidth::Bits32 => reader.read_i32()? as i64,
            IntWidth::Bits64 => reader.read_i64()?,
        })
    }

    pub(crate) fn write(self, writer: &mut BinaryWriter, what: &'static str, value: i64) -> Result<()> {
        match self {
            IntWidth::Bits32 => writer.write_i32(narrow(what, value)?),
            IntWidth::Bits64 => writer.write_i64(value),
        }
        Ok(())
    }

    pub(crate) fn reserve(self, writer: &mut BinaryWriter) -> usize {
        match self {
            IntWidth::Bits32 => writer.reserve_i32(),
            IntWidth::Bits64 => writer.reserve_i64(),
        }
    }

    pub(crate) fn patch(
        self,
        writer: &mut BinaryWriter,
        position: usize,
        what: &'static str,
        value: i64,
    ) -> Result<()> {
        match self {
            IntWidth::Bits32 => writer.patch_i32(position, narrow(what, value)?)?,
            IntWidth::Bits64 => writer.patch_i64(position, value)?,
        }
        Ok(())
    }
}

/// Narrow a header value to the `i32` most fields use.
pub(crate) fn narrow(what: &'static str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::FieldOverflow {
        what,
        value: value as u64,
    })
}

/// Narrow a byte length or element count to `i32`.
pub(crate) fn len_i32(what: &'static str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::FieldOverflow {
        what,
        value: len as u64,
    })
}

/// Options for reading a datafile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadOptions {
    /// Width of the header size fields.
    pub width: IntWidth,
    /// Defer decoding of tables and the name table until first access.
    pub lazy: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            width: IntWidth::Bits32,
            lazy: true,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(mut self, width: IntWidth) -> Self {
        self.width = width;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }
}

/// Options for writing tables and datafiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriteOptions {
    /// Inflated payload size above which a compressed block is closed.
    pub compression_block_size: usize,
    /// zlib level used for compressed blocks.
    pub compression_level: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression_block_size: DEFAULT_COMPRESSION_BLOCK_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compression_block_size(mut self, size: usize) -> Self {
        self.compression_block_size = size;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }
}
