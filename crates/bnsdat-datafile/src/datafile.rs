//! The datafile container.
//!
//! # Layout
//!
//! ```text
//! [magic 8][version u8][client version u16 x4]
//! [total table size][table count][alias map size][alias count][max buffer size]
//! [created at u32][reserved 58]
//! [name table, only when table count > 10]
//! [table]...
//! ```
//!
//! The five size and count fields are `i32` or `i64` depending on the
//! [`IntWidth`] passed by the caller.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use bnsdat_common::{
    BinaryReader, BinaryWriter, ByteArraySource, FileSource, MemorySource, Source, SourceRef, SourceStream,
};
use tracing::debug;

use crate::config::{IntWidth, ReadOptions, WriteOptions};
use crate::name_table::NameTable;
use crate::table::{Table, TableHeader};
use crate::{Error, Result};

/// Magic of every known datafile.
pub const MAGIC: [u8; 8] = *b"TADBOSLB";

/// Size of the reserved block closing the header.
pub const RESERVED_SIZE: usize = 58;

/// A name table follows the header only above this many tables.
pub const NAME_TABLE_THRESHOLD: usize = 10;

/// Datafile header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatafileHeader {
    pub magic: [u8; 8],
    pub version: u8,
    pub client_version: [u16; 4],
    pub total_table_size: i64,
    /// Table count as read. Writing always stores the actual count.
    pub table_count: i64,
    pub alias_map_size: i64,
    pub alias_count: i64,
    pub max_buffer_size: i64,
    /// Unix seconds.
    pub created_at: u32,
    pub reserved: [u8; RESERVED_SIZE],
}

impl Default for DatafileHeader {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            version: 0,
            client_version: [0; 4],
            total_table_size: 0,
            table_count: 0,
            alias_map_size: 0,
            alias_count: 0,
            max_buffer_size: 0,
            created_at: 0,
            reserved: [0; RESERVED_SIZE],
        }
    }
}

impl DatafileHeader {
    /// Encoded size for `width`.
    pub const fn encoded_len(width: IntWidth) -> usize {
        8 + 1 + 8 + 5 * width.size() + 4 + RESERVED_SIZE
    }

    pub fn read(reader: &mut BinaryReader<'_>, width: IntWidth) -> Result<Self> {
        let magic = reader.read_array::<8>()?;
        let version = reader.read_u8()?;
        let mut client_version = [0u16; 4];
        for part in &mut client_version {
            *part = reader.read_u16()?;
        }

        Ok(Self {
            magic,
            version,
            client_version,
            total_table_size: width.read(reader)?,
            table_count: width.read(reader)?,
            alias_map_size: width.read(reader)?,
            alias_count: width.read(reader)?,
            max_buffer_size: width.read(reader)?,
            created_at: reader.read_u32()?,
            reserved: reader.read_array::<RESERVED_SIZE>()?,
        })
    }

    /// Write the header with an alias map size placeholder, returning the
    /// placeholder position.
    pub fn write(
        &self,
        writer: &mut BinaryWriter,
        width: IntWidth,
        table_count: usize,
        alias_count: i64,
    ) -> Result<usize> {
        writer.write_bytes(&self.magic);
        writer.write_u8(self.version);
        for part in self.client_version {
            writer.write_u16(part);
        }
        width.write(writer, "total table size", self.total_table_size)?;
        width.write(writer, "table count", table_count as i64)?;
        let alias_map_size_at = width.reserve(writer);
        width.write(writer, "alias count", alias_count)?;
        width.write(writer, "max buffer size", self.max_buffer_size)?;
        writer.write_u32(self.created_at);
        writer.write_bytes(&self.reserved);
        Ok(alias_map_size_at)
    }

    fn table_count(&self) -> Result<usize> {
        usize::try_from(self.table_count).map_err(|_| Error::UnexpectedValue {
            what: "table count",
            expected: 0,
            actual: self.table_count,
        })
    }

    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic).into_owned()
    }
}

/// A datafile: header, optional alias name table and tables.
#[derive(Debug)]
pub struct Datafile {
    pub header: DatafileHeader,
    /// Width of the header and table size fields. Not stored in the file.
    pub width: IntWidth,
    pub name_table: Option<NameTable>,
    pub tables: Vec<Table>,
}

impl Datafile {
    /// An empty datafile.
    pub fn new(width: IntWidth) -> Self {
        Self {
            header: DatafileHeader::default(),
            width,
            name_table: None,
            tables: Vec::new(),
        }
    }

    /// Open a datafile on disk. Lazy reads keep the file closed between
    /// accesses; eager reads map it into memory.
    pub fn open<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let source: SourceRef = if options.lazy {
            Arc::new(FileSource::open(path)?)
        } else {
            Arc::new(MemorySource::map_file(path)?)
        };
        debug!(path = %path.display(), lazy = options.lazy, "opening datafile");
        Self::from_source(source, options)
    }

    /// Read a datafile from an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, options: &ReadOptions) -> Result<Self> {
        let source: SourceRef = Arc::new(ByteArraySource::new(bytes)?);
        Self::from_source(source, options)
    }

    pub fn from_source(source: SourceRef, options: &ReadOptions) -> Result<Self> {
        if options.lazy {
            Self::scan(&source, options.width)
        } else {
            let bytes = source.read_bytes()?;
            Self::decode(&bytes, options.width)
        }
    }

    /// Decode every table of `data` up front.
    pub fn decode(data: &[u8], width: IntWidth) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let header = DatafileHeader::read(&mut reader, width)?;
        let table_count = header.table_count()?;

        let name_table = if table_count > NAME_TABLE_THRESHOLD {
            Some(NameTable::read(&mut reader, width)?)
        } else {
            None
        };

        let mut slices = Vec::with_capacity(table_count.min(1024));
        for index in 0..table_count {
            let start = reader.position();
            let table_header = TableHeader::read(&mut reader).map_err(|e| e.in_table(index))?;
            let len = table_header.total_len().map_err(|e| e.in_table(index))? as usize;
            slices.push(reader.slice_at(start, len).map_err(|e| Error::from(e).in_table(index))?);
            reader.seek(start + len);
        }

        let tables = decode_tables(&slices, width)?;
        debug!(tables = tables.len(), bytes = data.len(), "decoded datafile");

        Ok(Self {
            header,
            width,
            name_table,
            tables,
        })
    }

    /// Walk the table headers only, leaving every table and the name table
    /// to be decoded on first access.
    pub fn scan(source: &SourceRef, width: IntWidth) -> Result<Self> {
        let mut stream = source.open_stream()?;

        let mut raw_header = vec![0u8; DatafileHeader::encoded_len(width)];
        stream.read_exact(&mut raw_header)?;
        let header = DatafileHeader::read(&mut BinaryReader::new(&raw_header), width)?;
        let table_count = header.table_count()?;

        let name_table = if table_count > NAME_TABLE_THRESHOLD {
            Some(NameTable::scan(&mut stream, source, width)?)
        } else {
            None
        };

        let mut tables = Vec::with_capacity(table_count.min(1024));
        for index in 0..table_count {
            let table = scan_table(&mut *stream, source, width).map_err(|e| e.in_table(index))?;
            tables.push(table);
        }

        debug!(tables = tables.len(), bytes = source.len(), "scanned datafile");
        Ok(Self {
            header,
            width,
            name_table,
            tables,
        })
    }

    /// Decode every table that is still lazy.
    pub fn load_all(&self) -> Result<()> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            self.tables
                .par_iter()
                .enumerate()
                .try_for_each(|(index, table)| table.load().map(|_| ()).map_err(|e| e.in_table(index)))?;
        }
        #[cfg(not(feature = "parallel"))]
        {
            for (index, table) in self.tables.iter().enumerate() {
                table.load().map_err(|e| e.in_table(index))?;
            }
        }

        if let Some(name_table) = &self.name_table {
            name_table.entries()?;
        }
        Ok(())
    }

    /// First table of the given type.
    pub fn table_by_type(&self, table_type: i16) -> Option<&Table> {
        self.tables.iter().find(|table| table.table_type() == table_type)
    }

    /// Encode the whole datafile.
    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        let write_name_table = self.tables.len() > NAME_TABLE_THRESHOLD;
        if write_name_table && self.name_table.is_none() {
            return Err(Error::MissingNameTable {
                tables: self.tables.len(),
            });
        }

        let encoded = encode_tables(&self.tables, self.width, options)?;
        let body_len: usize = encoded.iter().map(Vec::len).sum();

        let mut writer = BinaryWriter::with_capacity(DatafileHeader::encoded_len(self.width) + body_len);
        let alias_count = match &self.name_table {
            Some(name_table) => name_table.len() as i64,
            None => self.header.alias_count,
        };
        let alias_map_size_at = self.header.write(&mut writer, self.width, self.tables.len(), alias_count)?;

        let alias_map_size = match &self.name_table {
            Some(name_table) if write_name_table => {
                let start = writer.position();
                name_table.write_to(&mut writer, self.width)?;
                (writer.position() - start) as i64
            }
            Some(_) => 0,
            None => self.header.alias_map_size,
        };
        self.width
            .patch(&mut writer, alias_map_size_at, "alias map size", alias_map_size)?;

        for table in encoded {
            writer.write_bytes(&table);
        }

        debug!(tables = self.tables.len(), bytes = writer.position(), "encoded datafile");
        Ok(writer.into_inner())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, options: &WriteOptions) -> Result<()> {
        let bytes = self.to_bytes(options)?;
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&bytes)?;
        out.flush()?;
        Ok(())
    }
}

fn scan_table(stream: &mut dyn SourceStream, source: &SourceRef, width: IntWidth) -> Result<Table> {
    let start = stream.stream_position()?;
    let header = TableHeader::read_from(stream)?;
    let len = header.total_len()?;
    stream.seek(SeekFrom::Start(start + len))?;
    Ok(Table::lazy(header, source.sub_range(start, len)?, width))
}

fn decode_tables(slices: &[&[u8]], width: IntWidth) -> Result<Vec<Table>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        slices
            .par_iter()
            .enumerate()
            .map(|(index, data)| Table::decode(data, width).map_err(|e| e.in_table(index)))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        slices
            .iter()
            .enumerate()
            .map(|(index, data)| Table::decode(data, width).map_err(|e| e.in_table(index)))
            .collect()
    }
}

/// Encode each table into its own buffer.
fn encode_tables(tables: &[Table], width: IntWidth, options: &WriteOptions) -> Result<Vec<Vec<u8>>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        tables
            .par_iter()
            .enumerate()
            .map(|(index, table)| table.to_bytes(width, options).map_err(|e| e.in_table(index)))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        tables
            .iter()
            .enumerate()
            .map(|(index, table)| table.to_bytes(width, options).map_err(|e| e.in_table(index)))
            .collect()
    }
}
