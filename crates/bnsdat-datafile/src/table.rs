//! Tables: a typed header plus a record stream.
//!
//! # Header layout
//!
//! ```text
//! [element count u8][type i16][major version u16][minor version u16]
//! [size i32][compressed u8]
//! ```
//!
//! `size` counts every byte after the size field, so a whole table spans
//! `size + 11` bytes.
//!
//! A table read lazily only remembers the [`Source`] range it came from. Its
//! records are decoded the first time they are asked for, and a table whose
//! records were never touched is written back by copying that range.

use std::io::Read;
use std::sync::{Arc, OnceLock};

use bnsdat_common::{BinaryReader, BinaryWriter, Source, SourceRef};
use byteorder::{LittleEndian, ReadBytesExt};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::codec::{
    CompressedRecordReader, CompressedRecordWriter, UncompressedRecordReader, UncompressedRecordWriter,
};
use crate::config::{IntWidth, WriteOptions};
use crate::record::{Record, RecordLookup, SharedLookup};
use crate::string_lookup::{StringLookup, StringLookupBuilder};
use crate::{Error, Result};

/// Size of the fixed table header, compressed flag included.
pub const TABLE_HEADER_SIZE: usize = 12;

/// Bytes of a table that precede the data counted by its size field.
pub const TABLE_SIZE_FIELD_END: u64 = 11;

/// Fixed table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableHeader {
    pub element_count: u8,
    pub table_type: i16,
    pub major_version: u16,
    pub minor_version: u16,
    /// Size as read from the file. Re-encoding computes a fresh value.
    pub size: i32,
    pub is_compressed: bool,
}

impl TableHeader {
    pub fn new(table_type: i16, major_version: u16, minor_version: u16, is_compressed: bool) -> Self {
        Self {
            element_count: 1,
            table_type,
            major_version,
            minor_version,
            size: 0,
            is_compressed,
        }
    }

    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self> {
        Ok(Self {
            element_count: reader.read_u8()?,
            table_type: reader.read_i16()?,
            major_version: reader.read_u16()?,
            minor_version: reader.read_u16()?,
            size: reader.read_i32()?,
            is_compressed: reader.read_bool()?,
        })
    }

    /// Read the header from a stream, as done while scanning lazily.
    pub fn read_from<R: Read + ?Sized>(stream: &mut R) -> Result<Self> {
        Ok(Self {
            element_count: stream.read_u8()?,
            table_type: stream.read_i16::<LittleEndian>()?,
            major_version: stream.read_u16::<LittleEndian>()?,
            minor_version: stream.read_u16::<LittleEndian>()?,
            size: stream.read_i32::<LittleEndian>()?,
            is_compressed: stream.read_u8()? != 0,
        })
    }

    /// Total bytes occupied by the table.
    pub fn total_len(&self) -> Result<u64> {
        u64::try_from(self.size)
            .ok()
            .filter(|&size| size > 0)
            .map(|size| size + TABLE_SIZE_FIELD_END)
            .ok_or(Error::UnexpectedValue {
                what: "table size",
                expected: 1,
                actual: self.size as i64,
            })
    }

    /// Whether the uncompressed stream carries the extra reserved field.
    pub fn uses_wide_stream(&self, width: IntWidth) -> bool {
        width.is_64() && !self.is_compressed && self.element_count == 1
    }

    fn write_prefix(&self, writer: &mut BinaryWriter) {
        writer.write_u8(self.element_count);
        writer.write_i16(self.table_type);
        writer.write_u16(self.major_version);
        writer.write_u16(self.minor_version);
    }
}

/// Decoded records of a table.
#[derive(Debug)]
pub struct TableContents {
    pub records: Vec<Record>,
    /// Lookup shared by every record of an uncompressed table. Unused for
    /// compressed tables.
    pub string_lookup: SharedLookup,
    /// Bytes between the last record and the lookup.
    pub padding: Vec<u8>,
    /// Declared record count minus the records actually present.
    pub record_count_offset: i32,
}

impl TableContents {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            string_lookup: Arc::new(RwLock::new(StringLookup::new())),
            padding: Vec::new(),
            record_count_offset: 0,
        }
    }
}

#[derive(Debug)]
struct LazySource {
    source: SourceRef,
    width: IntWidth,
}

/// A table of records.
#[derive(Debug)]
pub struct Table {
    header: TableHeader,
    lazy: Option<LazySource>,
    contents: OnceLock<TableContents>,
}

impl Table {
    /// An empty table.
    pub fn new(header: TableHeader) -> Self {
        let contents = OnceLock::new();
        let _ = contents.set(TableContents::empty());
        Self {
            header,
            lazy: None,
            contents,
        }
    }

    /// A table that decodes `source` on first access. `source` must cover
    /// the whole table, header included.
    pub fn lazy(header: TableHeader, source: SourceRef, width: IntWidth) -> Self {
        Self {
            header,
            lazy: Some(LazySource { source, width }),
            contents: OnceLock::new(),
        }
    }

    /// Decode a complete table from `data`.
    pub fn decode(data: &[u8], width: IntWidth) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let header = TableHeader::read(&mut reader)?;
        let contents = decode_body(&mut reader, &header, width)?;
        check_consumed(&header, reader.position());

        let lock = OnceLock::new();
        let _ = lock.set(contents);
        Ok(Self {
            header,
            lazy: None,
            contents: lock,
        })
    }

    #[inline]
    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut TableHeader {
        &mut self.header
    }

    #[inline]
    pub fn table_type(&self) -> i16 {
        self.header.table_type
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.header.is_compressed
    }

    /// Whether the records have been decoded.
    pub fn is_loaded(&self) -> bool {
        self.contents.get().is_some()
    }

    /// The byte range this table was read from, if it was read lazily.
    pub fn source(&self) -> Option<&SourceRef> {
        self.lazy.as_ref().map(|lazy| &lazy.source)
    }

    /// Decode the records if that has not happened yet.
    pub fn load(&self) -> Result<&TableContents> {
        if let Some(contents) = self.contents.get() {
            return Ok(contents);
        }
        let Some(lazy) = &self.lazy else {
            return Err(Error::Unsupported("table has neither records nor a source"));
        };

        let bytes = lazy.source.read_bytes()?;
        let mut reader = BinaryReader::new(&bytes);
        let header = TableHeader::read(&mut reader)?;
        let contents = decode_body(&mut reader, &header, lazy.width)?;
        check_consumed(&header, reader.position());

        debug!(
            table_type = header.table_type,
            records = contents.records.len(),
            compressed = header.is_compressed,
            "loaded table"
        );
        // a concurrent loader may have won; both decoded the same bytes
        Ok(self.contents.get_or_init(|| contents))
    }

    fn load_mut(&mut self) -> Result<&mut TableContents> {
        self.load()?;
        self.contents
            .get_mut()
            .ok_or(Error::Unsupported("table has neither records nor a source"))
    }

    pub fn records(&self) -> Result<&[Record]> {
        Ok(&self.load()?.records)
    }

    pub fn records_mut(&mut self) -> Result<&mut Vec<Record>> {
        Ok(&mut self.load_mut()?.records)
    }

    pub fn contents_mut(&mut self) -> Result<&mut TableContents> {
        self.load_mut()
    }

    pub fn padding(&self) -> Result<&[u8]> {
        Ok(&self.load()?.padding)
    }

    pub fn record_count_offset(&self) -> Result<i32> {
        Ok(self.load()?.record_count_offset)
    }

    /// Handle to the table-wide lookup.
    pub fn string_lookup(&self) -> Result<SharedLookup> {
        Ok(Arc::clone(&self.load()?.string_lookup))
    }

    /// Replace the table-wide lookup. Records sharing it see the new bytes.
    pub fn set_string_lookup(&mut self, lookup: StringLookup) -> Result<()> {
        *self.load()?.string_lookup.write() = lookup;
        Ok(())
    }

    /// A builder that continues the table-wide lookup.
    pub fn string_builder(&self) -> Result<StringLookupBuilder> {
        let lookup = self.load()?.string_lookup.read().clone();
        Ok(StringLookupBuilder::resume(lookup))
    }

    /// Append a record. In an uncompressed table the record is attached to
    /// the table-wide lookup.
    pub fn push_record(&mut self, mut record: Record) -> Result<()> {
        let compressed = self.header.is_compressed;
        let contents = self.load_mut()?;
        if !compressed {
            record.set_lookup(RecordLookup::Shared(Arc::clone(&contents.string_lookup)));
        }
        contents.records.push(record);
        Ok(())
    }

    /// Switch between the two stream encodings.
    ///
    /// Compressing gives every record its own copy of the table lookup.
    /// Going the other way would need to merge per-record lookups and
    /// rewrite the offsets stored in records, which requires the schema.
    pub fn set_compressed(&mut self, compressed: bool) -> Result<()> {
        if compressed == self.header.is_compressed {
            return Ok(());
        }
        if !compressed {
            return Err(Error::Unsupported(
                "converting a compressed table to uncompressed",
            ));
        }
        let contents = self.load_mut()?;
        let lookup = contents.string_lookup.read().clone();
        for record in &mut contents.records {
            record.set_lookup(RecordLookup::Owned(lookup.clone()));
        }
        contents.padding.clear();
        contents.record_count_offset = 0;
        self.header.is_compressed = true;
        Ok(())
    }

    /// Encode into `writer`.
    pub fn write_to(&self, writer: &mut BinaryWriter, width: IntWidth, options: &WriteOptions) -> Result<()> {
        let Some(contents) = self.contents.get() else {
            return self.write_passthrough(writer);
        };

        self.header.write_prefix(writer);
        if self.header.is_compressed {
            let mut ordered: Vec<&Record> = contents.records.iter().collect();
            ordered.sort_by_key(|record| (record.variant(), record.id()));

            let mut stream = CompressedRecordWriter::begin(writer, options);
            for record in ordered {
                record
                    .lookup()
                    .with(|lookup| stream.write_record(writer, record.data(), lookup.as_bytes()))?;
            }
            stream.finish(writer)
        } else {
            let wide = self.header.uses_wide_stream(width);
            let mut stream = UncompressedRecordWriter::begin(writer, wide);
            for record in &contents.records {
                stream.write_record(writer, record.data());
            }
            let lookup = contents.string_lookup.read();
            stream.finish(
                writer,
                &contents.padding,
                lookup.as_bytes(),
                contents.record_count_offset,
            )
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self, width: IntWidth, options: &WriteOptions) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::new();
        self.write_to(&mut writer, width, options)?;
        Ok(writer.into_inner())
    }

    fn write_passthrough(&self, writer: &mut BinaryWriter) -> Result<()> {
        let Some(lazy) = &self.lazy else {
            return Err(Error::Unsupported("table has neither records nor a source"));
        };
        let bytes = lazy.source.read_bytes()?;
        let body = bytes.get(TABLE_HEADER_SIZE..).ok_or(bnsdat_common::Error::UnexpectedEof {
            needed: TABLE_HEADER_SIZE,
            available: bytes.len(),
        })?;

        self.header.write_prefix(writer);
        writer.write_i32(self.header.size);
        writer.write_bool(self.header.is_compressed);
        writer.write_bytes(body);
        Ok(())
    }
}

fn decode_body(reader: &mut BinaryReader<'_>, header: &TableHeader, width: IntWidth) -> Result<TableContents> {
    let mut contents = TableContents::empty();

    if header.is_compressed {
        let mut stream = CompressedRecordReader::initialize(reader)?;
        while let Some(block) = stream.next_block(reader)? {
            for memory in block.records() {
                let memory = memory?;
                let lookup = RecordLookup::Owned(StringLookup::from_bytes(memory.lookup.to_vec()));
                contents.records.push(memory.to_record(lookup)?);
            }
        }
    } else {
        let mut stream = UncompressedRecordReader::initialize(reader, header.uses_wide_stream(width))?;
        while let Some(memory) = stream.read(reader)? {
            let lookup = RecordLookup::Shared(Arc::clone(&contents.string_lookup));
            contents.records.push(memory.to_record(lookup)?);
        }
        let tail = stream.finish(reader)?;
        *contents.string_lookup.write() = StringLookup::from_bytes(tail.lookup.to_vec());
        contents.padding = tail.padding.to_vec();
        contents.record_count_offset = tail.record_count_offset;
    }

    Ok(contents)
}

fn check_consumed(header: &TableHeader, consumed: usize) {
    if let Ok(declared) = header.total_len() {
        if declared != consumed as u64 {
            warn!(
                table_type = header.table_type,
                declared,
                consumed,
                "table size field disagrees with decoded length"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnsdat_common::{MemorySource, Ref};

    fn sample_record(id: i32, variant: i32, size: u16) -> Record {
        let mut record = Record::new(2, size, Ref::new(id, variant)).unwrap();
        record.set(16, id * 10).unwrap();
        record
    }

    fn uncompressed_table() -> Table {
        let mut table = Table::new(TableHeader::new(7, 3, 1, false));
        let mut builder = table.string_builder().unwrap();
        for id in [3, 1, 2] {
            let mut record = sample_record(id, 0, 24);
            record.set_string(20, &mut builder, &format!("name{id}")).unwrap();
            table.push_record(record).unwrap();
        }
        table.set_string_lookup(builder.finish()).unwrap();
        table
    }

    fn compressed_table() -> Table {
        let mut table = Table::new(TableHeader::new(9, 1, 0, true));
        for (id, variant) in [(5, 1), (2, 0), (1, 1), (9, 0)] {
            let mut record = sample_record(id, variant, 24);
            let mut builder = StringLookupBuilder::new();
            record.set_string(20, &mut builder, &format!("r{id}")).unwrap();
            record.set_lookup(RecordLookup::Owned(builder.finish()));
            table.push_record(record).unwrap();
        }
        table
    }

    #[test]
    fn test_header_total_len() {
        let mut header = TableHeader::new(1, 0, 0, false);
        header.size = 100;
        assert_eq!(header.total_len().unwrap(), 111);
        header.size = -1;
        assert!(header.total_len().is_err());
    }

    #[test]
    fn test_wide_stream_selection() {
        let mut header = TableHeader::new(1, 0, 0, false);
        assert!(header.uses_wide_stream(IntWidth::Bits64));
        assert!(!header.uses_wide_stream(IntWidth::Bits32));
        header.element_count = 2;
        assert!(!header.uses_wide_stream(IntWidth::Bits64));
        header.element_count = 1;
        header.is_compressed = true;
        assert!(!header.uses_wide_stream(IntWidth::Bits64));
    }

    #[test]
    fn test_uncompressed_roundtrip_keeps_order() {
        for width in [IntWidth::Bits32, IntWidth::Bits64] {
            let bytes = uncompressed_table().to_bytes(width, &WriteOptions::default()).unwrap();
            let decoded = Table::decode(&bytes, width).unwrap();

            let ids: Vec<i32> = decoded.records().unwrap().iter().map(Record::id).collect();
            assert_eq!(ids, vec![3, 1, 2]);
            assert_eq!(decoded.records().unwrap()[1].get_string(20).unwrap(), "name1");
            assert_eq!(decoded.header().size as usize, bytes.len() - 11);
            assert_eq!(decoded.to_bytes(width, &WriteOptions::default()).unwrap(), bytes);
        }
    }

    #[test]
    fn test_compressed_sorted_by_variant_then_id() {
        let bytes = compressed_table().to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap();
        let decoded = Table::decode(&bytes, IntWidth::Bits32).unwrap();

        let keys: Vec<Ref> = decoded.records().unwrap().iter().map(Record::key).collect();
        assert_eq!(
            keys,
            vec![Ref::new(2, 0), Ref::new(9, 0), Ref::new(1, 1), Ref::new(5, 1)]
        );
        for record in decoded.records().unwrap() {
            assert!(!record.lookup().is_shared());
            assert_eq!(record.get_string(20).unwrap(), format!("r{}", record.id()));
        }
        assert_eq!(decoded.to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap(), bytes);
    }

    #[test]
    fn test_empty_tables_roundtrip() {
        for compressed in [false, true] {
            let table = Table::new(TableHeader::new(4, 0, 0, compressed));
            let bytes = table.to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap();
            let decoded = Table::decode(&bytes, IntWidth::Bits32).unwrap();
            assert!(decoded.records().unwrap().is_empty());
            assert_eq!(decoded.to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap(), bytes);
        }
    }

    #[test]
    fn test_lazy_passthrough_and_load() {
        let bytes = uncompressed_table().to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap();
        let header = TableHeader::read(&mut BinaryReader::new(&bytes)).unwrap();
        let source: SourceRef = Arc::new(MemorySource::new(bytes.clone()));

        let untouched = Table::lazy(header, Arc::clone(&source), IntWidth::Bits32);
        assert!(!untouched.is_loaded());
        assert_eq!(untouched.to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap(), bytes);
        assert!(!untouched.is_loaded());

        let mut touched = Table::lazy(header, source, IntWidth::Bits32);
        assert_eq!(touched.records().unwrap().len(), 3);
        assert!(touched.is_loaded());
        touched.records_mut().unwrap().pop();
        let shorter = touched.to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap();
        assert_eq!(Table::decode(&shorter, IntWidth::Bits32).unwrap().records().unwrap().len(), 2);
    }

    #[test]
    fn test_set_compressed() {
        let mut table = uncompressed_table();
        table.set_compressed(true).unwrap();
        assert!(table.is_compressed());

        let bytes = table.to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap();
        let decoded = Table::decode(&bytes, IntWidth::Bits32).unwrap();
        let names: Vec<String> = decoded
            .records()
            .unwrap()
            .iter()
            .map(|r| r.get_string(20).unwrap())
            .collect();
        assert_eq!(names, vec!["name1", "name2", "name3"]);

        let mut compressed = compressed_table();
        assert!(matches!(
            compressed.set_compressed(false),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_corrupt_table_is_rejected() {
        let mut bytes = uncompressed_table().to_bytes(IntWidth::Bits32, &WriteOptions::default()).unwrap();
        // uncompressed marker sits after prefix(7) + size(4) + flag(1) + count/sizes(12)
        bytes[24] = 0;
        assert!(Table::decode(&bytes, IntWidth::Bits32).is_err());
    }
}
