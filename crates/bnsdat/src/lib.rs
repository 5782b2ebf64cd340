//! bnsdat - datafile container library.
//!
//! This crate provides a unified interface to the bnsdat crates.
//!
//! # Crates
//!
//! - [`bnsdat_common`] - Common utilities (binary reading, references, byte sources)
//! - [`bnsdat_datafile`] - Datafile container, tables, records and the alias name table
//! - [`bnsdat_terrain`] - Terrain (`.cterrain`) container
//!
//! # Example
//!
//! ```no_run
//! use bnsdat::prelude::*;
//!
//! let datafile = Datafile::open("xml.dat", &ReadOptions::new())?;
//! println!("Tables: {}", datafile.tables.len());
//!
//! if let Some(names) = &datafile.name_table {
//!     for (alias, key) in names.aliases()?.iter().take(10) {
//!         println!("{alias} -> {key}");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use bnsdat_common as common;
pub use bnsdat_datafile as datafile;
pub use bnsdat_terrain as terrain;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use bnsdat_common::{BinaryReader, BinaryWriter, IconRef, Ref, Source, TRef};
    pub use bnsdat_datafile::{
        Datafile, IntWidth, NameTable, ReadOptions, Record, StringLookup, StringLookupBuilder, Table, WriteOptions,
    };
    pub use bnsdat_terrain::BinTerrain;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
