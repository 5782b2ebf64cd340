//! Common utilities for bnsdat.
//!
//! This crate provides the foundational types shared by every bnsdat crate:
//!
//! - [`BinaryReader`] - Zero-copy little-endian reading from byte slices
//! - [`BinaryWriter`] - Little-endian output with placeholder back-patching
//! - [`Ref`], [`TRef`], [`IconRef`] - Record reference types
//! - [`Field`] - Typed values at raw byte offsets ([`get_field`], [`set_field`])
//! - [`Source`] - Repeatable byte ranges over files, buffers and memory maps

mod error;
mod field;
mod reader;
mod refs;
mod values;
mod writer;

pub mod source;

pub use error::{Error, Result};
pub use field::{get_field, set_field, Field};
pub use reader::BinaryReader;
pub use refs::{IconRef, Ref, TRef};
pub use source::{ByteArraySource, FileSource, MemorySource, Source, SourceRef, SourceStream};
pub use values::{BoundingBox, IColor, Native, Vector16, Vector32};
pub use writer::BinaryWriter;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
