//! The `.cterrain` container.
//!
//! ```text
//! 0x00  version        i16
//! 0x02  size           i32   body length, everything after `version`
//! 0x06  unk06          i32
//! 0x0A  zone id        i16
//! 0x0C  unkC0          i16
//! 0x0E  unkE0          20 bytes
//! 0x22  sector count x i16
//! 0x24  sector count y i16
//! 0x26  unk26          i32
//! 0x2A  offset1, (attr, offset) x4   nine i64
//! 0x72  sectors, then the four data blocks
//! ```
//!
//! Offsets count from the end of the `version` field, so the first section
//! always sits at `0x70`. The last data block runs to the end of the file.

use std::mem::size_of;
use std::path::Path;

use bnsdat_common::{BinaryReader, BinaryWriter, MemorySource, Source};
use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, Result};

/// Size of the fixed header, including the version field.
pub const HEADER_SIZE: usize = 0x72;

/// Offsets are relative to this position.
const BODY_START: usize = 2;

/// Offset of the first section within the body.
pub const FIRST_SECTION_OFFSET: i64 = (HEADER_SIZE - BODY_START) as i64;

const SECTION_NAMES: [&str; 5] = ["sector", "data2", "data3", "data4", "data5"];

/// One terrain sector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct TerrainSector {
    pub sector_class: i32,
    pub value1: i32,
    pub value2: i32,
}

/// An opaque data block and the attribute stored beside its offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerrainBlock {
    pub attribute: i64,
    pub data: Vec<u8>,
}

/// A decoded terrain file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinTerrain {
    pub version: i16,
    pub unk06: i32,
    pub zone_id: i16,
    pub unk_c0: i16,
    pub unk_e0: [u8; 20],
    pub sector_count_x: i16,
    pub sector_count_y: i16,
    pub unk26: i32,
    pub sectors: Vec<TerrainSector>,
    /// The data2 through data5 blocks, in file order.
    pub blocks: [TerrainBlock; 4],
}

impl BinTerrain {
    /// Memory-map and decode a terrain file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = MemorySource::map_file(path)?;
        Self::read(source.as_slice())
    }

    /// Decode a terrain file held by any source.
    pub fn from_source(source: &dyn Source) -> Result<Self> {
        let bytes = source.read_bytes()?;
        Self::read(&bytes)
    }

    /// Decode a terrain file from bytes.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);

        let version = reader.read_i16()?;
        let size = reader.read_i32()?;
        let unk06 = reader.read_i32()?;
        let zone_id = reader.read_i16()?;
        let unk_c0 = reader.read_i16()?;
        let unk_e0 = reader.read_array::<20>()?;
        let sector_count_x = reader.read_i16()?;
        let sector_count_y = reader.read_i16()?;
        let unk26 = reader.read_i32()?;

        let mut offsets = [0i64; 5];
        let mut attributes = [0i64; 4];
        offsets[0] = reader.read_i64()?;
        for (attribute, offset) in attributes.iter_mut().zip(&mut offsets[1..]) {
            *attribute = reader.read_i64()?;
            *offset = reader.read_i64()?;
        }

        let body_len = data.len() - BODY_START;
        if usize::try_from(size).ok() != Some(body_len) {
            warn!(size, body_len, "terrain size field disagrees with file length");
        }

        let mut starts = [0usize; 5];
        for (index, &offset) in offsets.iter().enumerate() {
            let start = usize::try_from(offset)
                .ok()
                .filter(|&start| start <= body_len)
                .filter(|&start| index == 0 || start >= starts[index - 1])
                .ok_or(Error::InvalidOffset {
                    section: SECTION_NAMES[index],
                    offset,
                    len: body_len,
                })?;
            starts[index] = start;
        }

        let body = &data[BODY_START..];
        let sections: [&[u8]; 5] = std::array::from_fn(|index| {
            let end = starts.get(index + 1).copied().unwrap_or(body_len);
            &body[starts[index]..end]
        });

        let sector_bytes = sections[0];
        if sector_bytes.len() % size_of::<TerrainSector>() != 0 {
            return Err(Error::SectorAlignment(sector_bytes.len()));
        }
        let mut sector_reader = BinaryReader::new(sector_bytes);
        let mut sectors = Vec::with_capacity(sector_bytes.len() / size_of::<TerrainSector>());
        while !sector_reader.is_empty() {
            sectors.push(sector_reader.read_struct::<TerrainSector>()?);
        }

        let blocks = std::array::from_fn(|index| TerrainBlock {
            attribute: attributes[index],
            data: sections[index + 1].to_vec(),
        });

        debug!(zone_id, sectors = sectors.len(), "read terrain");

        Ok(Self {
            version,
            unk06,
            zone_id,
            unk_c0,
            unk_e0,
            sector_count_x,
            sector_count_y,
            unk26,
            sectors,
            blocks,
        })
    }

    /// Bytes taken by the sectors and data blocks.
    pub fn payload_len(&self) -> usize {
        self.sectors.len() * size_of::<TerrainSector>()
            + self.blocks.iter().map(|block| block.data.len()).sum::<usize>()
    }

    /// Encode into a writer. Sections are laid out back to back after the
    /// header, whatever gaps the file was read with.
    pub fn write_to(&self, writer: &mut BinaryWriter) -> Result<()> {
        let body_len = HEADER_SIZE - BODY_START + self.payload_len();
        let size = i32::try_from(body_len).map_err(|_| Error::TooLarge(body_len))?;

        writer.write_i16(self.version);
        writer.write_i32(size);
        writer.write_i32(self.unk06);
        writer.write_i16(self.zone_id);
        writer.write_i16(self.unk_c0);
        writer.write_bytes(&self.unk_e0);
        writer.write_i16(self.sector_count_x);
        writer.write_i16(self.sector_count_y);
        writer.write_i32(self.unk26);

        let mut offset = FIRST_SECTION_OFFSET;
        writer.write_i64(offset);
        offset += (self.sectors.len() * size_of::<TerrainSector>()) as i64;
        for block in &self.blocks {
            writer.write_i64(block.attribute);
            writer.write_i64(offset);
            offset += block.data.len() as i64;
        }

        writer.write_bytes(self.sectors.as_bytes());
        for block in &self.blocks {
            writer.write_bytes(&block.data);
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(HEADER_SIZE + self.payload_len());
        self.write_to(&mut writer)?;
        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnsdat_common::ByteArraySource;

    fn sample() -> BinTerrain {
        let mut unk_e0 = [0u8; 20];
        unk_e0[3] = 0x7F;
        BinTerrain {
            version: 3,
            unk06: 0x1234,
            zone_id: 1100,
            unk_c0: -1,
            unk_e0,
            sector_count_x: 2,
            sector_count_y: 1,
            unk26: 9,
            sectors: vec![
                TerrainSector { sector_class: 1, value1: 10, value2: -10 },
                TerrainSector { sector_class: 2, value1: 20, value2: -20 },
            ],
            blocks: [
                TerrainBlock { attribute: 4, data: vec![1, 2, 3] },
                TerrainBlock { attribute: 0, data: Vec::new() },
                TerrainBlock { attribute: 7, data: vec![0xAA; 16] },
                TerrainBlock { attribute: -2, data: vec![5; 5] },
            ],
        }
    }

    fn i64_at(bytes: &[u8], position: usize) -> i64 {
        i64::from_le_bytes(bytes[position..position + 8].try_into().unwrap())
    }

    #[test]
    fn test_sector_layout() {
        assert_eq!(size_of::<TerrainSector>(), 12);
        assert_eq!(FIRST_SECTION_OFFSET, 0x70);
    }

    #[test]
    fn test_write_layout() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 24 + 3 + 16 + 5);

        let size = i32::from_le_bytes(bytes[2..6].try_into().unwrap());
        assert_eq!(size as usize, bytes.len() - 2);

        assert_eq!(i64_at(&bytes, 0x2A), 0x70);
        assert_eq!(i64_at(&bytes, 0x32), 4);
        assert_eq!(i64_at(&bytes, 0x3A), 0x70 + 24);
        assert_eq!(i64_at(&bytes, 0x4A), 0x70 + 27);
        assert_eq!(i64_at(&bytes, 0x5A), 0x70 + 27);
        assert_eq!(i64_at(&bytes, 0x6A), 0x70 + 43);

        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 4], &1i32.to_le_bytes());
    }

    #[test]
    fn test_repack_is_byte_exact() {
        let bytes = sample().to_bytes().unwrap();
        let terrain = BinTerrain::read(&bytes).unwrap();
        assert_eq!(terrain, sample());
        assert_eq!(terrain.to_bytes().unwrap(), bytes);

        let source = ByteArraySource::new(bytes.clone()).unwrap();
        assert_eq!(BinTerrain::from_source(&source).unwrap(), terrain);
    }

    #[test]
    fn test_empty_terrain() {
        let terrain = BinTerrain::default();
        let bytes = terrain.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(BinTerrain::read(&bytes).unwrap(), terrain);
    }

    #[test]
    fn test_offset_past_end() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0x3A..0x42].copy_from_slice(&10_000i64.to_le_bytes());
        assert!(matches!(
            BinTerrain::read(&bytes),
            Err(Error::InvalidOffset { section: "data2", offset: 10_000, .. })
        ));
    }

    #[test]
    fn test_partial_sector() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0x3A..0x42].copy_from_slice(&(0x70i64 + 13).to_le_bytes());
        assert!(matches!(BinTerrain::read(&bytes), Err(Error::SectorAlignment(13))));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(BinTerrain::read(&bytes[..40]), Err(Error::Common(_))));
    }
}
