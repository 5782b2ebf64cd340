//! Uncompressed record streams.
//!
//! ```text
//! [size i32][compressed u8 = 0][record count i32][wide only: i32 = 0]
//! [records size i32][lookup size i32][marker u8 = 1]
//! [record][record]...[padding][string lookup]
//! ```
//!
//! `size` counts every byte after itself. `records size` spans from the byte
//! after the marker to the start of the lookup, so it includes the padding.

use bnsdat_common::{BinaryReader, BinaryWriter};

use crate::config::len_i32;
use crate::record::{RecordMemory, RECORD_SUB_HEADER_SIZE};
use crate::{Error, Result};

/// Marker byte that closes the stream header.
pub const UNCOMPRESSED_MARKER: u8 = 1;

/// Reads records one at a time from an uncompressed stream.
#[derive(Debug)]
pub struct UncompressedRecordReader {
    record_count: i32,
    records_read: i32,
    lookup_start: usize,
    lookup_size: usize,
}

/// Everything after the last record of an uncompressed stream.
#[derive(Debug, Clone, Copy)]
pub struct UncompressedTail<'a> {
    pub padding: &'a [u8],
    pub lookup: &'a [u8],
    /// Declared record count minus records actually read.
    pub record_count_offset: i32,
}

fn non_negative(what: &'static str, value: i32) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::UnexpectedValue {
        what,
        expected: 0,
        actual: value as i64,
    })
}

impl UncompressedRecordReader {
    /// Parse the stream header. `reader` must sit just past the compressed
    /// flag.
    pub fn initialize(reader: &mut BinaryReader<'_>, wide: bool) -> Result<Self> {
        let record_count = reader.read_i32()?;
        if wide {
            let reserved = reader.read_i32()?;
            if reserved != 0 {
                return Err(Error::UnexpectedValue {
                    what: "wide record stream reserved field",
                    expected: 0,
                    actual: reserved as i64,
                });
            }
        }
        let records_size = non_negative("records size", reader.read_i32()?)?;
        let lookup_size = non_negative("string lookup size", reader.read_i32()?)?;

        let marker = reader.read_u8()?;
        if marker != UNCOMPRESSED_MARKER {
            return Err(Error::UnexpectedValue {
                what: "uncompressed stream marker",
                expected: UNCOMPRESSED_MARKER as i64,
                actual: marker as i64,
            });
        }

        Ok(Self {
            record_count,
            records_read: 0,
            lookup_start: reader.position() + records_size,
            lookup_size,
        })
    }

    /// Read the next record, skipping 6-byte sentinels.
    pub fn read<'a>(&mut self, reader: &mut BinaryReader<'a>) -> Result<Option<RecordMemory<'a>>> {
        loop {
            self.check_position(reader)?;
            if self.records_read == self.record_count || reader.position() == self.lookup_start {
                return Ok(None);
            }

            let size = reader.peek_u16_at(4)? as usize;
            if size < RECORD_SUB_HEADER_SIZE {
                return Err(Error::RecordTooSmall {
                    size,
                    minimum: RECORD_SUB_HEADER_SIZE,
                });
            }
            let data = reader.read_bytes(size)?;
            self.records_read += 1;
            self.check_position(reader)?;

            if size > RECORD_SUB_HEADER_SIZE {
                return Ok(Some(RecordMemory { data, lookup: &[] }));
            }
        }
    }

    /// Collect the padding and lookup, leaving `reader` at the end of the
    /// stream.
    pub fn finish<'a>(self, reader: &mut BinaryReader<'a>) -> Result<UncompressedTail<'a>> {
        self.check_position(reader)?;
        let position = reader.position();
        let padding = reader.slice_at(position, self.lookup_start - position)?;
        let lookup = reader.slice_at(self.lookup_start, self.lookup_size)?;
        reader.seek(self.lookup_start + self.lookup_size);

        Ok(UncompressedTail {
            padding,
            lookup,
            record_count_offset: self.record_count.wrapping_sub(self.records_read),
        })
    }

    fn check_position(&self, reader: &BinaryReader<'_>) -> Result<()> {
        if reader.position() > self.lookup_start {
            return Err(Error::ReadPastLookup {
                position: reader.position(),
                lookup_start: self.lookup_start,
            });
        }
        Ok(())
    }
}

/// Writes an uncompressed stream, patching sizes once the records are out.
#[derive(Debug)]
pub struct UncompressedRecordWriter {
    size_at: usize,
    count_at: usize,
    records_size_at: usize,
    lookup_size_at: usize,
    records_start: usize,
    records_written: usize,
}

impl UncompressedRecordWriter {
    pub fn begin(writer: &mut BinaryWriter, wide: bool) -> Self {
        let size_at = writer.reserve_i32();
        writer.write_bool(false);
        let count_at = writer.reserve_i32();
        if wide {
            writer.write_i32(0);
        }
        let records_size_at = writer.reserve_i32();
        let lookup_size_at = writer.reserve_i32();
        writer.write_u8(UNCOMPRESSED_MARKER);

        Self {
            size_at,
            count_at,
            records_size_at,
            lookup_size_at,
            records_start: writer.position(),
            records_written: 0,
        }
    }

    pub fn write_record(&mut self, writer: &mut BinaryWriter, data: &[u8]) {
        writer.write_bytes(data);
        self.records_written += 1;
    }

    pub fn finish(
        self,
        writer: &mut BinaryWriter,
        padding: &[u8],
        lookup: &[u8],
        record_count_offset: i32,
    ) -> Result<()> {
        writer.write_bytes(padding);
        writer.write_bytes(lookup);

        let end = writer.position();
        let count = len_i32("record count", self.records_written)?.wrapping_add(record_count_offset);
        writer.patch_i32(self.size_at, len_i32("table size", end - self.size_at - 4)?)?;
        writer.patch_i32(self.count_at, count)?;
        writer.patch_i32(
            self.records_size_at,
            len_i32("records size", end - self.records_start - lookup.len())?,
        )?;
        writer.patch_i32(self.lookup_size_at, len_i32("string lookup size", lookup.len())?)?;
        Ok(())
    }
}
