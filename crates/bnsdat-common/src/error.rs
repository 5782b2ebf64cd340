//! Error types for bnsdat-common.

use thiserror::Error;

/// Common error type for bnsdat operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A string could not be parsed as a reference.
    #[error("invalid reference: {0:?}")]
    InvalidReference(String),

    /// A textual value could not be parsed.
    #[error("invalid value: {0:?}")]
    InvalidValue(String),

    /// Typed field access outside of a buffer.
    #[error("field access out of range: offset {offset} + {size} exceeds buffer of {len} bytes")]
    FieldOutOfRange {
        offset: usize,
        size: usize,
        len: usize,
    },

    /// A source range does not fit the index width of its backing store.
    #[error("source range overflow: offset {offset} + length {length} exceeds {limit}")]
    SourceOverflow { offset: u64, length: u64, limit: u64 },

    /// A sub-range extends past the end of its parent source.
    #[error("source range out of bounds: offset {offset} + length {length} exceeds {available}")]
    SourceOutOfBounds {
        offset: u64,
        length: u64,
        available: u64,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing null terminator in string.
    #[error("string missing null terminator")]
    MissingNullTerminator,
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
