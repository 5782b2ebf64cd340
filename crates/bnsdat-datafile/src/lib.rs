//! Reader and writer for the datafile container.
//!
//! A datafile is a header, an optional alias [`NameTable`] and a sequence of
//! [`Table`]s. Each table holds fixed-header [`Record`]s in one of two
//! stream encodings (plain, or zlib-compressed blocks) plus the UTF-16
//! [`StringLookup`] its string fields point into.
//!
//! # Quick Start
//!
//! ```no_run
//! use bnsdat_datafile::{Datafile, IntWidth, ReadOptions, WriteOptions};
//!
//! let options = ReadOptions::new().width(IntWidth::Bits64);
//! let mut datafile = Datafile::open("xml64.dat", &options)?;
//!
//! // only this table gets decoded; the rest are copied through on write
//! for record in datafile.tables[3].records_mut()? {
//!     record.set(16, 0i32)?;
//! }
//!
//! if let Some(names) = &datafile.name_table {
//!     println!("{:?}", names.resolve("item:sword_01")?);
//! }
//!
//! datafile.write_to_file("xml64.patched.dat", &WriteOptions::default())?;
//! # Ok::<(), bnsdat_datafile::Error>(())
//! ```
//!
//! # Features
//!
//! - `parallel` (default): decode and encode tables on the rayon thread pool
//! - `serde`: `Serialize`/`Deserialize` for options, table headers and references

use hashbrown::HashMap as FastHashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;

pub(crate) type FxHashMap<K, V> = FastHashMap<K, V, BuildHasherDefault<FxHasher>>;

pub mod codec;
mod compression;
mod config;
mod datafile;
mod error;
pub mod name_table;
mod record;
mod string_lookup;
mod table;

pub use config::{IntWidth, ReadOptions, WriteOptions, DEFAULT_COMPRESSION_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL};
pub use datafile::{Datafile, DatafileHeader, MAGIC, NAME_TABLE_THRESHOLD, RESERVED_SIZE};
pub use error::{Error, ErrorKind, Result};
pub use name_table::{NameTable, NameTableEntry, Rebuilder};
pub use record::{
    Record, RecordLookup, RecordMemory, SharedLookup, DATA_SIZE_OFFSET, ID_OFFSET, NODE_KIND_OFFSET,
    RECORD_HEADER_SIZE, RECORD_SUB_HEADER_SIZE, SUBCLASS_OFFSET, VARIANT_OFFSET,
};
pub use string_lookup::{StringLookup, StringLookupBuilder, Strings};
pub use table::{Table, TableContents, TableHeader, TABLE_HEADER_SIZE};

pub use bnsdat_common::{IconRef, Ref, TRef};
