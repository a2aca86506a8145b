//! Decompression of one gzip member: header, DEFLATE payload, trailer.

use std::io::{BufReader, Read, Seek};

use log::{debug, warn};

use crate::error::{GzipResult, InflateError};
use crate::gzip::{original_size, GzipHeader, GzipTrailer, TRAILER_LEN};
use crate::inflate::inflate_with_capacity;

#[derive(Debug)]
pub struct Unzipped {
    pub header: GzipHeader,
    pub output: Vec<u8>,
    pub blocks: usize,
    /// Member size on disk: header, compressed data and trailer.
    pub compressed_len: u64,
    /// Non-zero bytes followed the trailer and were ignored.
    pub trailing_garbage: bool,
}

/// Decompresses the gzip member at the current position of `input` and
/// checks it against its trailer.
pub fn unzip<R: Read + Seek>(input: &mut R, force: u32) -> GzipResult<Unzipped> {
    let size_hint = match original_size(input) {
        Ok(size) => size as usize,
        Err(err) => {
            debug!("original size unavailable: {}", err);
            0
        }
    };

    let mut reader = BufReader::new(input);
    let header = GzipHeader::read(&mut reader, force)?;
    let inflated = inflate_with_capacity(&mut reader, size_hint)?;
    let trailer = GzipTrailer::read(&mut reader).map_err(InflateError::from)?;
    trailer.verify(&inflated.output)?;

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest)?;
    let trailing_garbage = rest.iter().any(|&b| b != 0);
    if trailing_garbage {
        warn!("decompression OK, trailing garbage ignored");
    } else if !rest.is_empty() {
        debug!("decompression OK, {} trailing zero bytes ignored", rest.len());
    }

    debug!(
        "{} block(s), {} bytes out, crc 0x{:08x}",
        inflated.blocks,
        inflated.output.len(),
        trailer.crc32
    );

    Ok(Unzipped {
        compressed_len: header.len as u64 + inflated.bytes_in + TRAILER_LEN,
        header,
        output: inflated.output,
        blocks: inflated.blocks,
        trailing_garbage,
    })
}
