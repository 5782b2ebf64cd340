//! zlib helpers for compressed record blocks.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{Error, Result};

/// Inflate a zlib stream.
pub fn decompress_zlib(data: &[u8], output: &mut Vec<u8>) -> Result<()> {
    let mut decoder = ZlibDecoder::new(data);

    output.clear();
    decoder
        .read_to_end(output)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    Ok(())
}

/// Inflate a zlib stream whose output size is known in advance.
pub fn decompress_zlib_sized(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size);
    decompress_zlib(data, &mut output)?;
    Ok(output)
}

/// Deflate into a zlib stream.
pub fn compress_zlib(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| Error::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))
}
