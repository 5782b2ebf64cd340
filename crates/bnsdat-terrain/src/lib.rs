//! Terrain container handling for bnsdat.
//!
//! `.cterrain` files ship next to the datafiles and carry a grid of
//! [`TerrainSector`]s followed by four opaque data blocks. They are read and
//! written byte for byte so they can be repacked after editing.
//!
//! # Example
//!
//! ```no_run
//! use bnsdat_terrain::BinTerrain;
//!
//! let mut terrain = BinTerrain::open("zone_1100.cterrain")?;
//! terrain.sectors[0].value1 = 0;
//! std::fs::write("zone_1100.cterrain", terrain.to_bytes()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod terrain;

pub use error::{Error, Result};
pub use terrain::{BinTerrain, TerrainBlock, TerrainSector, FIRST_SECTION_OFFSET, HEADER_SIZE};
