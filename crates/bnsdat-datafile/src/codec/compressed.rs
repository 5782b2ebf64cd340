//! Compressed record streams.
//!
//! ```text
//! [size i32][compressed u8 = 1][block count i32][marker u16 = 8]
//! block*:
//!   [low key u64][high key u64][compressed size u16][zlib payload]
//!   [decompressed size u16][record count i32][record offset u16]*
//! ```
//!
//! An inflated block payload is the concatenation of `record ++ lookup` for
//! each record it holds. A record's data ends at its declared size; its
//! lookup runs from there to the next record's offset, or to the end of the
//! payload for the last record.

use bnsdat_common::{get_field, BinaryReader, BinaryWriter, Ref};
use tracing::trace;

use crate::compression::{compress_zlib, decompress_zlib_sized};
use crate::config::{len_i32, WriteOptions};
use crate::record::{RecordMemory, DATA_SIZE_OFFSET, ID_OFFSET, RECORD_SUB_HEADER_SIZE};
use crate::{Error, Result};

/// Marker that closes the compressed stream header.
pub const COMPRESSED_MARKER: u16 = 8;

/// Reads a compressed stream one block at a time.
#[derive(Debug)]
pub struct CompressedRecordReader {
    block_count: i32,
    blocks_read: i32,
}

impl CompressedRecordReader {
    /// Parse the stream header. `reader` must sit just past the compressed
    /// flag.
    pub fn initialize(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let block_count = reader.read_i32()?;
        let marker = reader.read_u16()?;
        if marker != COMPRESSED_MARKER {
            return Err(Error::UnexpectedValue {
                what: "compressed stream marker",
                expected: COMPRESSED_MARKER as i64,
                actual: marker as i64,
            });
        }
        Ok(Self {
            block_count,
            blocks_read: 0,
        })
    }

    pub fn block_count(&self) -> i32 {
        self.block_count
    }

    /// Read and inflate the next block.
    pub fn next_block(&mut self, reader: &mut BinaryReader<'_>) -> Result<Option<CompressedBlock>> {
        if self.blocks_read >= self.block_count {
            return Ok(None);
        }
        self.blocks_read += 1;

        let low_key = Ref::from_u64(reader.read_u64()?);
        let high_key = Ref::from_u64(reader.read_u64()?);
        let compressed_size = reader.read_u16()? as usize;
        let compressed = reader.read_bytes(compressed_size)?;
        let decompressed_size = reader.read_u16()? as usize;
        let record_count = reader.read_i32()?;
        let record_count = usize::try_from(record_count).map_err(|_| {
            Error::CorruptBlock(format!("negative record count {record_count}"))
        })?;
        let offsets = (0..record_count)
            .map(|_| reader.read_u16())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut payload = decompress_zlib_sized(compressed, decompressed_size)?;
        if payload.len() < decompressed_size {
            return Err(Error::CorruptBlock(format!(
                "inflated {} bytes, header declares {decompressed_size}",
                payload.len()
            )));
        }
        payload.truncate(decompressed_size);

        trace!(
            block = self.blocks_read - 1,
            records = record_count,
            compressed_size,
            decompressed_size,
            "read compressed block"
        );

        Ok(Some(CompressedBlock {
            low_key,
            high_key,
            payload,
            offsets,
        }))
    }
}

/// One inflated block of a compressed stream.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    pub low_key: Ref,
    pub high_key: Ref,
    pub payload: Vec<u8>,
    pub offsets: Vec<u16>,
}

impl CompressedBlock {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The `index`th record and its lookup.
    pub fn record(&self, index: usize) -> Result<RecordMemory<'_>> {
        let start = *self.offsets.get(index).ok_or_else(|| {
            Error::CorruptBlock(format!("record {index} of a {}-record block", self.offsets.len()))
        })? as usize;
        let end = self
            .offsets
            .get(index + 1)
            .map_or(self.payload.len(), |&next| next as usize);
        if start > end || end > self.payload.len() || end - start < RECORD_SUB_HEADER_SIZE {
            return Err(Error::CorruptBlock(format!(
                "record {index} spans {start}..{end} of {} bytes",
                self.payload.len()
            )));
        }

        let data_size = get_field::<u16>(&self.payload[start..end], DATA_SIZE_OFFSET)? as usize;
        if data_size > end - start {
            return Err(Error::CorruptBlock(format!(
                "record {index} declares {data_size} bytes in a {}-byte slot",
                end - start
            )));
        }

        let data_end = start + data_size;
        Ok(RecordMemory {
            data: &self.payload[start..data_end],
            lookup: &self.payload[data_end..end],
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Result<RecordMemory<'_>>> + '_ {
        (0..self.offsets.len()).map(move |index| self.record(index))
    }
}

#[derive(Debug)]
struct PendingBlock {
    low_key: u64,
    high_key: u64,
    payload: Vec<u8>,
    offsets: Vec<u16>,
}

/// Packs records greedily into zlib blocks.
///
/// A block is closed before a record that would push its inflated payload
/// past the configured block size. A record larger than the block size gets a
/// block of its own.
#[derive(Debug)]
pub struct CompressedRecordWriter {
    size_at: usize,
    block_count_at: usize,
    blocks_written: i32,
    block_size: usize,
    level: u32,
    pending: Option<PendingBlock>,
}

impl CompressedRecordWriter {
    pub fn begin(writer: &mut BinaryWriter, options: &WriteOptions) -> Self {
        let size_at = writer.reserve_i32();
        writer.write_bool(true);
        let block_count_at = writer.reserve_i32();
        writer.write_u16(COMPRESSED_MARKER);

        Self {
            size_at,
            block_count_at,
            blocks_written: 0,
            block_size: options.compression_block_size,
            level: options.compression_level,
            pending: None,
        }
    }

    /// Append a record and its lookup. Records must arrive in key order.
    pub fn write_record(&mut self, writer: &mut BinaryWriter, data: &[u8], lookup: &[u8]) -> Result<()> {
        let key: u64 = get_field(data, ID_OFFSET)?;
        let size = data.len() + lookup.len();

        if let Some(block) = &self.pending {
            if block.payload.len() + size > self.block_size {
                self.flush_block(writer)?;
            }
        }

        let block = self.pending.get_or_insert_with(|| PendingBlock {
            low_key: key,
            high_key: key,
            payload: Vec::new(),
            offsets: Vec::new(),
        });
        let offset = u16::try_from(block.payload.len()).map_err(|_| Error::FieldOverflow {
            what: "record offset in block",
            value: block.payload.len() as u64,
        })?;
        block.offsets.push(offset);
        block.payload.extend_from_slice(data);
        block.payload.extend_from_slice(lookup);
        block.high_key = key;
        Ok(())
    }

    pub fn finish(mut self, writer: &mut BinaryWriter) -> Result<()> {
        self.flush_block(writer)?;

        let end = writer.position();
        writer.patch_i32(self.size_at, len_i32("table size", end - self.size_at - 4)?)?;
        writer.patch_i32(self.block_count_at, self.blocks_written)?;
        Ok(())
    }

    fn flush_block(&mut self, writer: &mut BinaryWriter) -> Result<()> {
        let Some(block) = self.pending.take() else {
            return Ok(());
        };

        let decompressed_size = u16::try_from(block.payload.len()).map_err(|_| Error::FieldOverflow {
            what: "block decompressed size",
            value: block.payload.len() as u64,
        })?;
        let compressed = compress_zlib(&block.payload, self.level)?;
        let compressed_size = u16::try_from(compressed.len()).map_err(|_| Error::FieldOverflow {
            what: "block compressed size",
            value: compressed.len() as u64,
        })?;

        writer.write_u64(block.low_key);
        writer.write_u64(block.high_key);
        writer.write_u16(compressed_size);
        writer.write_bytes(&compressed);
        writer.write_u16(decompressed_size);
        writer.write_i32(len_i32("block record count", block.offsets.len())?);
        for offset in &block.offsets {
            writer.write_u16(*offset);
        }

        trace!(
            block = self.blocks_written,
            records = block.offsets.len(),
            compressed_size,
            decompressed_size,
            "wrote compressed block"
        );
        self.blocks_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(size: u16, id: i32, variant: i32) -> Vec<u8> {
        let mut data = vec![0u8; size as usize];
        data[4..6].copy_from_slice(&size.to_le_bytes());
        data[8..12].copy_from_slice(&id.to_le_bytes());
        data[12..16].copy_from_slice(&variant.to_le_bytes());
        data
    }

    fn encode(records: &[(Vec<u8>, Vec<u8>)], block_size: usize) -> Vec<u8> {
        let options = WriteOptions::new().compression_block_size(block_size);
        let mut writer = BinaryWriter::new();
        let mut stream = CompressedRecordWriter::begin(&mut writer, &options);
        for (data, lookup) in records {
            stream.write_record(&mut writer, data, lookup).unwrap();
        }
        stream.finish(&mut writer).unwrap();
        writer.into_inner()
    }

    fn blocks(data: &[u8]) -> Vec<CompressedBlock> {
        let mut reader = BinaryReader::new_at(data, 5);
        let mut stream = CompressedRecordReader::initialize(&mut reader).unwrap();
        let mut blocks = Vec::new();
        while let Some(block) = stream.next_block(&mut reader).unwrap() {
            blocks.push(block);
        }
        assert!(reader.is_empty());
        blocks
    }

    #[test]
    fn test_header_layout() {
        let data = encode(&[(record(16, 1, 0), vec![0, 0])], 0xFFFF);
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_i32().unwrap() as usize, data.len() - 4);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_i32().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), COMPRESSED_MARKER);
    }

    #[test]
    fn test_records_and_lookups_recovered() {
        let input = vec![
            (record(16, 1, 0), vec![0, 0]),
            (record(20, 2, 0), vec![0, 0, b'a', 0, 0, 0]),
            (record(16, 3, 0), vec![]),
        ];
        let data = encode(&input, 0xFFFF);
        let blocks = blocks(&data);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offsets, vec![0, 18, 44]);
        let decoded: Vec<_> = blocks[0]
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r.data.to_vec(), r.lookup.to_vec())
            })
            .collect();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_block_boundaries_and_keys() {
        // each record + lookup is 20 bytes; a 50-byte block holds two
        let input: Vec<_> = (1..=5).map(|id| (record(16, id, 0), vec![0u8; 4])).collect();
        let blocks = blocks(&encode(&input, 50));

        assert_eq!(blocks.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(blocks[0].low_key, Ref::new(1, 0));
        assert_eq!(blocks[0].high_key, Ref::new(2, 0));
        assert_eq!(blocks[1].low_key, Ref::new(3, 0));
        assert_eq!(blocks[1].high_key, Ref::new(4, 0));
        assert_eq!(blocks[2].low_key, Ref::new(5, 0));
        assert_eq!(blocks[2].high_key, Ref::new(5, 0));
        assert!(blocks.iter().all(|b| b.payload.len() <= 50));
    }

    #[test]
    fn test_oversized_record_gets_own_block() {
        let input = vec![
            (record(64, 1, 0), vec![]),
            (record(16, 2, 0), vec![]),
        ];
        let blocks = blocks(&encode(&input, 32));

        // no empty block precedes the oversized record
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].payload.len(), 64);
        assert_eq!(blocks[1].low_key, Ref::new(2, 0));
    }

    #[test]
    fn test_empty_stream() {
        let data = encode(&[], 0xFFFF);
        assert_eq!(data.len(), 4 + 1 + 4 + 2);
        assert!(blocks(&data).is_empty());
    }

    #[test]
    fn test_block_payload_overflow() {
        let options = WriteOptions::new().compression_block_size(usize::MAX);
        let mut writer = BinaryWriter::new();
        let mut stream = CompressedRecordWriter::begin(&mut writer, &options);
        let big = record(0xFFF0, 1, 0);
        stream.write_record(&mut writer, &big, &[]).unwrap();
        stream.write_record(&mut writer, &record(16, 2, 0), &[]).unwrap();
        assert!(matches!(
            stream.finish(&mut writer),
            Err(Error::FieldOverflow { what: "block decompressed size", .. })
        ));
    }

    #[test]
    fn test_bad_marker() {
        let mut data = encode(&[], 0xFFFF);
        data[9] = 9;
        let mut reader = BinaryReader::new_at(&data, 5);
        assert!(CompressedRecordReader::initialize(&mut reader).is_err());
    }

    #[test]
    fn test_corrupt_offsets() {
        let block = CompressedBlock {
            low_key: Ref::NONE,
            high_key: Ref::NONE,
            payload: record(16, 1, 0),
            offsets: vec![0, 20],
        };
        assert!(matches!(block.record(0), Err(Error::CorruptBlock(_))));
    }
}
