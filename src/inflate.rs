//! Block-by-block DEFLATE decoding: the block state machine and the LZ77
//! expansion of literal/length/distance symbols into output bytes.

use std::io::Read;
use std::mem;

use log::{debug, trace};

use crate::bits::BitReader;
use crate::dynamic::{read_code_length_lengths, read_code_lengths, BlockCounts, DynamicHeader, END_OF_BLOCK};
use crate::error::{InflateError, InflateResult, PartialOutput};
use crate::huffman::HuffmanTree;

const BTYPE_DYNAMIC: u8 = 2;

/// Largest output preallocation taken from a caller's size hint.
const MAX_PREALLOC: usize = 64 << 20;

/// Copy lengths for length codes 257..=285.
static LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31,
    35, 43, 51, 59, 67, 83, 99, 115, 131, 163, 195, 227, 258,
];

/// Extra bits for length codes 257..=285.
static LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2,
    3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Copy offsets for distance codes 0..=29.
static DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193,
    257, 385, 513, 769, 1025, 1537, 2049, 3073, 4097, 6145,
    8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes 0..=29.
static DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6,
    7, 7, 8, 8, 9, 9, 10, 10, 11, 11,
    12, 12, 13, 13,
];

/// Base length and extra-bit count of a length symbol (257..=285).
pub fn length_code(symbol: u16) -> InflateResult<(usize, u32)> {
    match symbol {
        257..=285 => {
            let i = (symbol - 257) as usize;
            Ok((LENGTH_BASE[i] as usize, LENGTH_EXTRA[i] as u32))
        }
        _ => Err(InflateError::malformed(format!("invalid length symbol {}", symbol))),
    }
}

/// Base distance and extra-bit count of a distance symbol (0..=29).
pub fn distance_code(symbol: u16) -> InflateResult<(usize, u32)> {
    match symbol {
        0..=29 => {
            let i = symbol as usize;
            Ok((DIST_BASE[i] as usize, DIST_EXTRA[i] as u32))
        }
        _ => Err(InflateError::malformed(format!("invalid distance symbol {}", symbol))),
    }
}

pub fn read_length<R: Read>(symbol: u16, bits: &mut BitReader<R>) -> InflateResult<usize> {
    let (base, extra) = length_code(symbol)?;
    Ok(base + bits.read_bits(extra)? as usize)
}

pub fn read_distance<R: Read>(symbol: u16, bits: &mut BitReader<R>) -> InflateResult<usize> {
    let (base, extra) = distance_code(symbol)?;
    Ok(base + bits.read_bits(extra)? as usize)
}

/// Appends `length` bytes copied from `distance` bytes back.
///
/// Overlapping copies (`distance < length`) read bytes this same copy has
/// just written.
pub fn copy_match(output: &mut Vec<u8>, distance: usize, length: usize) -> InflateResult<()> {
    let available = output.len();
    if distance == 0 || distance > available {
        return Err(InflateError::InvalidBackReference { distance, available });
    }
    let start = available - distance;
    if distance >= length {
        output.extend_from_within(start..start + length);
    } else {
        output.reserve(length);
        for i in 0..length {
            let b = output[start + i];
            output.push(b);
        }
    }
    Ok(())
}

/// Decodes symbols until end-of-block, appending to `output`.
pub fn expand_symbols<R: Read>(
    bits: &mut BitReader<R>,
    litlen: &mut HuffmanTree,
    dist: &mut HuffmanTree,
    output: &mut Vec<u8>,
) -> InflateResult<()> {
    loop {
        let symbol = litlen.decode_symbol(bits)?;
        match symbol as usize {
            lit @ 0..=255 => output.push(lit as u8),
            END_OF_BLOCK => return Ok(()),
            _ => {
                let length = read_length(symbol, bits)?;
                let dist_symbol = dist.decode_symbol(bits)?;
                let distance = read_distance(dist_symbol, bits)?;
                copy_match(output, distance, length)?;
            }
        }
    }
}

#[derive(Debug)]
enum Stage {
    AwaitBlockHeader,
    ReadDynamicHeader {
        final_block: bool,
    },
    DecodeLengthAlphabet {
        final_block: bool,
        counts: BlockCounts,
    },
    DecodeLitLenAndDistAlphabets {
        final_block: bool,
        counts: BlockCounts,
        cl_tree: HuffmanTree,
    },
    ExpandSymbols {
        final_block: bool,
        litlen: HuffmanTree,
        dist: HuffmanTree,
    },
    Done,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::AwaitBlockHeader => "AwaitBlockHeader",
            Stage::ReadDynamicHeader { .. } => "ReadDynamicHeader",
            Stage::DecodeLengthAlphabet { .. } => "DecodeLengthAlphabet",
            Stage::DecodeLitLenAndDistAlphabets { .. } => "DecodeLitLenAndDistAlphabets",
            Stage::ExpandSymbols { .. } => "ExpandSymbols",
            Stage::Done => "Done",
        }
    }
}

/// Result of one complete run.
#[derive(Debug)]
pub struct Inflated {
    pub output: Vec<u8>,
    pub blocks: usize,
    /// Compressed bytes consumed, including the partly used last byte.
    pub bytes_in: u64,
}

#[cfg(test)]
pub fn inflate<R: Read>(reader: R) -> InflateResult<Inflated> {
    inflate_with_capacity(reader, 0)
}

/// Decodes a DEFLATE stream made of dynamic Huffman blocks.
///
/// Reading stops right after the end-of-block symbol of the block flagged
/// final; `reader` is left on the byte after the one holding that symbol's
/// last bit. `size_hint` only preallocates the output.
pub fn inflate_with_capacity<R: Read>(reader: R, size_hint: usize) -> InflateResult<Inflated> {
    let mut bits = BitReader::new(reader);
    let mut output = Vec::with_capacity(size_hint.min(MAX_PREALLOC));
    let mut blocks = 0usize;
    let mut stage = Stage::AwaitBlockHeader;

    loop {
        trace!("stage {}", stage.name());
        stage = match stage {
            Stage::AwaitBlockHeader => {
                let final_block = bits.read_bits(1)? == 1;
                let btype = bits.read_bits(2)? as u8;
                if btype != BTYPE_DYNAMIC {
                    debug!(
                        "block {}: type {} not supported, {} bytes decoded so far",
                        blocks + 1,
                        btype,
                        output.len()
                    );
                    return Err(InflateError::UnsupportedBlockType {
                        block: blocks + 1,
                        btype,
                        partial: PartialOutput(mem::take(&mut output)),
                    });
                }
                Stage::ReadDynamicHeader { final_block }
            }
            Stage::ReadDynamicHeader { final_block } => {
                let counts = BlockCounts::read(&mut bits)?;
                debug!(
                    "block {}: BFINAL={} HLIT={} HDIST={} HCLEN={}",
                    blocks + 1,
                    final_block as u8,
                    counts.hlit,
                    counts.hdist,
                    counts.hclen
                );
                Stage::DecodeLengthAlphabet { final_block, counts }
            }
            Stage::DecodeLengthAlphabet { final_block, counts } => {
                let cl_lengths = read_code_length_lengths(&mut bits, counts.hclen)?;
                trace!("code-length alphabet lengths {:?}", cl_lengths);
                let cl_tree = HuffmanTree::from_complete_lengths(&cl_lengths)?;
                Stage::DecodeLitLenAndDistAlphabets {
                    final_block,
                    counts,
                    cl_tree,
                }
            }
            Stage::DecodeLitLenAndDistAlphabets {
                final_block,
                counts,
                mut cl_tree,
            } => {
                let lengths = read_code_lengths(&mut bits, &mut cl_tree, counts.hlit + counts.hdist)?;
                let header = DynamicHeader::from_code_lengths(counts, lengths)?;
                let (litlen, dist) = header.build_trees()?;
                trace!("trees built, max code lengths {} / {}", litlen.max_len(), dist.max_len());
                Stage::ExpandSymbols {
                    final_block,
                    litlen,
                    dist,
                }
            }
            Stage::ExpandSymbols {
                final_block,
                mut litlen,
                mut dist,
            } => {
                let before = output.len();
                expand_symbols(&mut bits, &mut litlen, &mut dist, &mut output)?;
                blocks += 1;
                debug!("block {}: {} bytes", blocks, output.len() - before);
                if final_block {
                    Stage::Done
                } else {
                    Stage::AwaitBlockHeader
                }
            }
            Stage::Done => {
                trace!("{} padding bits left in last byte", bits.available_bits());
                bits.align_to_byte();
                return Ok(Inflated {
                    output,
                    blocks,
                    bytes_in: bits.bytes_in(),
                });
            }
        };
    }
}
