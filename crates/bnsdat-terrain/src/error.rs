//! Error types for terrain handling.

use thiserror::Error;

/// Errors that can occur when working with terrain files.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] bnsdat_common::Error),

    /// A section offset lies outside the file or before the previous one.
    #[error("invalid {section} offset {offset} (file body is {len} bytes)")]
    InvalidOffset {
        section: &'static str,
        offset: i64,
        len: usize,
    },

    /// The sector section is not a whole number of sectors.
    #[error("sector section of {0} bytes is not a multiple of 12")]
    SectorAlignment(usize),

    /// The file is too large for its 32-bit size field.
    #[error("terrain body of {0} bytes does not fit the size field")]
    TooLarge(usize),
}

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, Error>;
