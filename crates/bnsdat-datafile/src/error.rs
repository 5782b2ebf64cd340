//! Error types for the datafile crate.

use thiserror::Error;

/// Errors that can occur while reading or writing datafiles.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] bnsdat_common::Error),

    /// A marker or mandated constant had the wrong value.
    #[error("invalid {what}: expected {expected}, got {actual}")]
    UnexpectedValue {
        what: &'static str,
        expected: i64,
        actual: i64,
    },

    /// The uncompressed record stream ran into its string lookup.
    #[error("read past string lookup: position {position}, lookup starts at {lookup_start}")]
    ReadPastLookup { position: usize, lookup_start: usize },

    /// A record declared a size too small to hold its header.
    #[error("record size {size} is smaller than the {minimum}-byte record header")]
    RecordTooSmall { size: usize, minimum: usize },

    /// The offsets of a compressed block do not describe its payload.
    #[error("corrupt compressed block: {0}")]
    CorruptBlock(String),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Compression error.
    #[error("compression error: {0}")]
    Compression(String),

    /// A value does not fit the on-disk field that must hold it.
    #[error("{what} value {value} does not fit its field")]
    FieldOverflow { what: &'static str, value: u64 },

    /// Tables beyond the inline limit require an alias name table.
    #[error("a datafile with {tables} tables requires a name table")]
    MissingNameTable { tables: usize },

    /// A name table entry range points outside the entry array.
    #[error("corrupt name table: {0}")]
    CorruptNameTable(String),

    /// A string offset points outside its lookup.
    #[error("string offset {offset} outside lookup of {len} bytes")]
    InvalidStringOffset { offset: i64, len: usize },

    /// A string could not be decoded.
    #[error("invalid string data: {0}")]
    InvalidString(String),

    /// Operation not supported for this table layout.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A table failed to decode or encode.
    #[error("table {index}: {source}")]
    Table {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bytes that do not follow the container format.
    Format,
    /// A string or offset that does not resolve to a value.
    InvalidReference,
    /// A caller-side contract was broken, such as an offset that cannot be
    /// represented or a field access outside a record.
    ResourceMisuse,
    /// The underlying storage failed.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use bnsdat_common::Error as C;

        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Common(inner) => match inner {
                C::Io(_) => ErrorKind::Io,
                C::InvalidReference(_) | C::InvalidValue(_) => ErrorKind::InvalidReference,
                C::FieldOutOfRange { .. }
                | C::SourceOverflow { .. }
                | C::SourceOutOfBounds { .. } => ErrorKind::ResourceMisuse,
                _ => ErrorKind::Format,
            },
            Error::InvalidStringOffset { .. } => ErrorKind::InvalidReference,
            Error::FieldOverflow { .. } | Error::Unsupported(_) => ErrorKind::ResourceMisuse,
            Error::Table { source, .. } => source.kind(),
            _ => ErrorKind::Format,
        }
    }

    pub(crate) fn in_table(self, index: usize) -> Self {
        Error::Table {
            index,
            source: Box::new(self),
        }
    }
}

/// Result type for datafile operations.
pub type Result<T> = std::result::Result<T, Error>;
