//! The two record stream encodings.
//!
//! Which one a table uses is decided by the compressed flag in its header.
//! Both start with the table size field, so each writer owns that field and
//! patches it when the stream is complete.

mod compressed;
mod uncompressed;

pub use compressed::{CompressedBlock, CompressedRecordReader, CompressedRecordWriter, COMPRESSED_MARKER};
pub use uncompressed::{
    UncompressedRecordReader, UncompressedRecordWriter, UncompressedTail, UNCOMPRESSED_MARKER,
};
