//! Records: raw byte buffers with a fixed 16-byte header.
//!
//! # Header layout
//!
//! | offset | type  | meaning                        |
//! |--------|-------|--------------------------------|
//! | 0      | `u8`  | node kind                      |
//! | 2      | `i16` | subclass type                  |
//! | 4      | `u16` | record size, header included   |
//! | 8      | `i32` | id                             |
//! | 12     | `i32` | variant                        |
//!
//! Bytes 8..16 together form the record's [`Ref`]. Everything past the header
//! is laid out by an external schema and reached through typed accessors at
//! byte offsets.

use std::sync::Arc;

use bnsdat_common::{get_field, set_field, Field, Native, Ref};
use parking_lot::RwLock;

use crate::config::len_i32;
use crate::string_lookup::{StringLookup, StringLookupBuilder};
use crate::{Error, Result};

pub const NODE_KIND_OFFSET: usize = 0;
pub const SUBCLASS_OFFSET: usize = 2;
pub const DATA_SIZE_OFFSET: usize = 4;
pub const ID_OFFSET: usize = 8;
pub const VARIANT_OFFSET: usize = 12;

/// Size of the fixed record header.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Size of the leading sub-header that carries the record size.
pub const RECORD_SUB_HEADER_SIZE: usize = 6;

/// String lookup shared by all records of an uncompressed table.
pub type SharedLookup = Arc<RwLock<StringLookup>>;

/// Where a record's strings live.
#[derive(Debug, Clone)]
pub enum RecordLookup {
    /// The table-wide lookup of an uncompressed table.
    Shared(SharedLookup),
    /// A lookup private to this record, as in compressed tables.
    Owned(StringLookup),
}

impl RecordLookup {
    /// Run `f` with read access to the lookup.
    pub fn with<R>(&self, f: impl FnOnce(&StringLookup) -> R) -> R {
        match self {
            RecordLookup::Shared(shared) => f(&shared.read()),
            RecordLookup::Owned(owned) => f(owned),
        }
    }

    /// Run `f` with write access to the lookup.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut StringLookup) -> R) -> R {
        match self {
            RecordLookup::Shared(shared) => f(&mut shared.write()),
            RecordLookup::Owned(owned) => f(owned),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, RecordLookup::Shared(_))
    }
}

/// Borrowed view of one encoded record and its lookup bytes.
#[derive(Debug, Clone, Copy)]
pub struct RecordMemory<'a> {
    pub data: &'a [u8],
    /// Per-record lookup bytes; empty for uncompressed tables.
    pub lookup: &'a [u8],
}

impl<'a> RecordMemory<'a> {
    pub fn subclass(&self) -> i16 {
        get_field(self.data, SUBCLASS_OFFSET).unwrap_or_default()
    }

    /// Copy into an owned record.
    pub fn to_record(&self, lookup: RecordLookup) -> Result<Record> {
        Record::from_bytes(self.data.to_vec(), lookup)
    }
}

/// A decoded record.
///
/// Cloning duplicates the record: the bytes are copied, an owned lookup is
/// copied, and a shared lookup stays shared with the table.
#[derive(Debug, Clone)]
pub struct Record {
    data: Vec<u8>,
    lookup: RecordLookup,
}

impl Record {
    /// A zeroed record of `size` bytes with an empty owned lookup.
    pub fn new(subclass: i16, size: u16, key: Ref) -> Result<Self> {
        let size = size as usize;
        if size < RECORD_HEADER_SIZE {
            return Err(Error::RecordTooSmall {
                size,
                minimum: RECORD_HEADER_SIZE,
            });
        }
        let mut record = Self {
            data: vec![0; size],
            lookup: RecordLookup::Owned(StringLookup::new()),
        };
        record.set(DATA_SIZE_OFFSET, size as u16)?;
        record.set_subclass(subclass);
        record.set_key(key);
        Ok(record)
    }

    /// Wrap encoded record bytes. The size field must match the buffer.
    pub fn from_bytes(data: Vec<u8>, lookup: RecordLookup) -> Result<Self> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(Error::RecordTooSmall {
                size: data.len(),
                minimum: RECORD_HEADER_SIZE,
            });
        }
        let declared: u16 = get_field(&data, DATA_SIZE_OFFSET)?;
        if declared as usize != data.len() {
            return Err(Error::UnexpectedValue {
                what: "record size",
                expected: data.len() as i64,
                actual: declared as i64,
            });
        }
        Ok(Self { data, lookup })
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the payload. The length is fixed; use
    /// [`Record::resize`] to change it.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_parts(self) -> (Vec<u8>, RecordLookup) {
        (self.data, self.lookup)
    }

    pub fn as_memory(&self) -> RecordMemory<'_> {
        RecordMemory {
            data: &self.data,
            lookup: &[],
        }
    }

    /// Grow or truncate the payload, keeping the size field in step.
    pub fn resize(&mut self, size: u16) -> Result<()> {
        let size = size as usize;
        if size < RECORD_HEADER_SIZE {
            return Err(Error::RecordTooSmall {
                size,
                minimum: RECORD_HEADER_SIZE,
            });
        }
        self.data.resize(size, 0);
        self.set(DATA_SIZE_OFFSET, size as u16)
    }

    #[inline]
    fn header<T: Field>(&self, offset: usize) -> T {
        // the constructors guarantee a full header
        T::read_field(&self.data[offset..offset + T::SIZE])
    }

    #[inline]
    fn set_header<T: Field>(&mut self, offset: usize, value: T) {
        value.write_field(&mut self.data[offset..offset + T::SIZE]);
    }

    pub fn node_kind(&self) -> u8 {
        self.header(NODE_KIND_OFFSET)
    }

    pub fn set_node_kind(&mut self, kind: u8) {
        self.set_header(NODE_KIND_OFFSET, kind);
    }

    pub fn subclass(&self) -> i16 {
        self.header(SUBCLASS_OFFSET)
    }

    pub fn set_subclass(&mut self, subclass: i16) {
        self.set_header(SUBCLASS_OFFSET, subclass);
    }

    pub fn data_size(&self) -> u16 {
        self.header(DATA_SIZE_OFFSET)
    }

    pub fn id(&self) -> i32 {
        self.header(ID_OFFSET)
    }

    pub fn variant(&self) -> i32 {
        self.header(VARIANT_OFFSET)
    }

    pub fn key(&self) -> Ref {
        self.header(ID_OFFSET)
    }

    pub fn set_key(&mut self, key: Ref) {
        self.set_header(ID_OFFSET, key);
    }

    /// Read a typed value at `offset`.
    #[inline]
    pub fn get<T: Field>(&self, offset: usize) -> Result<T> {
        Ok(get_field(&self.data, offset)?)
    }

    /// Write a typed value at `offset`.
    #[inline]
    pub fn set<T: Field>(&mut self, offset: usize, value: T) -> Result<()> {
        Ok(set_field(&mut self.data, offset, value)?)
    }

    pub fn lookup(&self) -> &RecordLookup {
        &self.lookup
    }

    pub fn lookup_mut(&mut self) -> &mut RecordLookup {
        &mut self.lookup
    }

    pub fn set_lookup(&mut self, lookup: RecordLookup) {
        self.lookup = lookup;
    }

    /// A builder that continues this record's own lookup, for editing the
    /// strings of a compressed-table record.
    pub fn string_builder(&self) -> StringLookupBuilder {
        StringLookupBuilder::resume(self.lookup.with(StringLookup::clone))
    }

    /// Resolve the string whose lookup offset is stored at `offset`.
    pub fn get_string(&self, offset: usize) -> Result<String> {
        let string_offset: i32 = self.get(offset)?;
        self.lookup.with(|lookup| lookup.get_string(string_offset))
    }

    /// Store `value` through `builder` and write its offset at `offset`.
    pub fn set_string(
        &mut self,
        offset: usize,
        builder: &mut StringLookupBuilder,
        value: &str,
    ) -> Result<()> {
        let string_offset = builder.append(value)?;
        self.set(offset, string_offset)
    }

    /// Resolve a [`Native`] string field.
    pub fn get_native(&self, offset: usize) -> Result<String> {
        let native: Native = self.get(offset)?;
        self.lookup.with(|lookup| lookup.get_string(native.offset))
    }

    /// Store a [`Native`] string field. Native strings are never shared.
    ///
    /// The stored size is the UTF-16 byte length including the terminator.
    pub fn set_native(
        &mut self,
        offset: usize,
        builder: &mut StringLookupBuilder,
        value: &str,
    ) -> Result<()> {
        let units = value.encode_utf16().count();
        let string_size = len_i32("native string size", (units + 1) * 2)?;
        let string_offset = builder.append_unique(value)?;
        self.set(offset, Native::new(string_size, string_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnsdat_common::{IconRef, TRef};

    #[test]
    fn test_new_record_header() {
        let record = Record::new(3, 32, Ref::new(100, 2)).unwrap();

        assert_eq!(record.data().len(), 32);
        assert_eq!(record.data_size(), 32);
        assert_eq!(record.subclass(), 3);
        assert_eq!(record.id(), 100);
        assert_eq!(record.variant(), 2);
        assert_eq!(record.key(), Ref::new(100, 2));
        assert_eq!(&record.data()[8..16], &[100, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            Record::new(0, 8, Ref::NONE),
            Err(Error::RecordTooSmall { size: 8, .. })
        ));
        assert!(Record::from_bytes(vec![0; 6], RecordLookup::Owned(StringLookup::new())).is_err());
    }

    #[test]
    fn test_size_mismatch() {
        let mut data = vec![0u8; 20];
        data[4] = 24;
        assert!(matches!(
            Record::from_bytes(data, RecordLookup::Owned(StringLookup::new())),
            Err(Error::UnexpectedValue { what: "record size", .. })
        ));
    }

    #[test]
    fn test_typed_access() {
        let mut record = Record::new(0, 48, Ref::new(1, 0)).unwrap();
        record.set(16, 0x1234_5678i32).unwrap();
        record.set(20, TRef::new(5, 6, 7)).unwrap();
        record.set(32, IconRef::new(9, 1, 1)).unwrap();
        record.set(44, true).unwrap();

        assert_eq!(record.get::<i32>(16).unwrap(), 0x1234_5678);
        assert_eq!(record.get::<TRef>(20).unwrap(), TRef::new(5, 6, 7));
        assert_eq!(record.get::<IconRef>(32).unwrap(), IconRef::new(9, 1, 1));
        assert!(record.get::<bool>(44).unwrap());
        assert!(record.get::<i64>(44).is_err());
        assert!(record.set(47, 0u16).is_err());
    }

    #[test]
    fn test_resize_keeps_size_field() {
        let mut record = Record::new(0, 16, Ref::new(1, 0)).unwrap();
        record.resize(24).unwrap();
        assert_eq!(record.data_size(), 24);
        assert_eq!(record.data().len(), 24);
        assert!(record.resize(4).is_err());
    }

    #[test]
    fn test_strings_with_builder() {
        let mut record = Record::new(0, 32, Ref::new(1, 0)).unwrap();
        let mut builder = StringLookupBuilder::new();
        record.set_string(16, &mut builder, "sword").unwrap();
        record.set_string(20, &mut builder, "sword").unwrap();
        record.set_native(24, &mut builder, "sword").unwrap();
        record.set_lookup(RecordLookup::Owned(builder.finish()));

        assert_eq!(record.get::<i32>(16).unwrap(), record.get::<i32>(20).unwrap());
        assert_eq!(record.get_string(20).unwrap(), "sword");
        assert_eq!(record.get::<Native>(24).unwrap().string_size, 12);
        assert_ne!(record.get::<Native>(24).unwrap().offset, record.get::<i32>(16).unwrap());
        assert_eq!(record.get_native(24).unwrap(), "sword");
    }

    #[test]
    fn test_duplicate_lookup_semantics() {
        let shared: SharedLookup = Arc::new(RwLock::new(StringLookup::new()));
        let mut in_table = Record::new(0, 16, Ref::new(1, 0)).unwrap();
        in_table.set_lookup(RecordLookup::Shared(Arc::clone(&shared)));
        let copy = in_table.clone();
        shared.write().append_string("late").unwrap();
        assert_eq!(copy.lookup().with(|l| l.len()), 2 + 10);

        let mut owned = Record::new(0, 16, Ref::new(2, 0)).unwrap();
        let owned_copy = owned.clone();
        owned.lookup_mut().with_mut(|l| l.append_string("only mine").unwrap());
        assert_eq!(owned_copy.lookup().with(|l| l.len()), 2);
    }

    #[test]
    fn test_native_size_counts_terminator() {
        let mut record = Record::new(0, 32, Ref::new(1, 0)).unwrap();
        let mut builder = StringLookupBuilder::new();
        record.set_native(16, &mut builder, "").unwrap();
        record.set_native(24, &mut builder, "검").unwrap();
        record.set_lookup(RecordLookup::Owned(builder.finish()));

        assert_eq!(record.get::<Native>(16).unwrap().string_size, 2);
        assert_eq!(record.get::<Native>(24).unwrap().string_size, 4);
        assert_eq!(record.get_native(24).unwrap(), "검");
    }
}
