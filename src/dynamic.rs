//! Dynamic Huffman block header (BTYPE=2): the HLIT/HDIST/HCLEN counts, the
//! code-length alphabet, and the run-length coded code lengths of the two
//! data alphabets.

use std::io::Read;

use log::trace;

use crate::bits::BitReader;
use crate::error::{InflateError, InflateResult};
use crate::huffman::HuffmanTree;

/// Order in which the code-length alphabet's own lengths are transmitted.
pub const CODE_LENGTH_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

pub const END_OF_BLOCK: usize = 256;

const REPEAT_PREVIOUS: u16 = 16;
const REPEAT_ZERO_SHORT: u16 = 17;
const REPEAT_ZERO_LONG: u16 = 18;

/// Alphabet sizes announced at the top of a dynamic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCounts {
    /// Literal/length code lengths present, 257..=288.
    pub hlit: usize,
    /// Distance code lengths present, 1..=32.
    pub hdist: usize,
    /// Code-length code lengths present, 4..=19.
    pub hclen: usize,
}

impl BlockCounts {
    pub fn read<R: Read>(bits: &mut BitReader<R>) -> InflateResult<Self> {
        let hlit = bits.read_bits(5)? as usize + 257;
        let hdist = bits.read_bits(5)? as usize + 1;
        let hclen = bits.read_bits(4)? as usize + 4;
        Ok(Self { hlit, hdist, hclen })
    }
}

/// Reads `hclen` 3-bit lengths into their permuted slots; the rest stay 0.
pub fn read_code_length_lengths<R: Read>(bits: &mut BitReader<R>, hclen: usize) -> InflateResult<[u8; 19]> {
    let mut lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
        lengths[slot] = bits.read_bits(3)? as u8;
    }
    Ok(lengths)
}

/// Number of extra bits following a code-length symbol.
pub fn extra_bits_for(symbol: u16) -> u32 {
    match symbol {
        REPEAT_PREVIOUS => 2,
        REPEAT_ZERO_SHORT => 3,
        REPEAT_ZERO_LONG => 7,
        _ => 0,
    }
}

/// Appends what one code-length symbol stands for, given its extra-bits
/// value.
pub fn apply_code_length_symbol(symbol: u16, extra: u32, lengths: &mut Vec<u8>) -> InflateResult<()> {
    match symbol {
        0..=15 => lengths.push(symbol as u8),
        REPEAT_PREVIOUS => {
            let prev = *lengths
                .last()
                .ok_or_else(|| InflateError::malformed("repeat code 16 with no previous length"))?;
            let n = extra as usize + 3;
            lengths.extend(std::iter::repeat(prev).take(n));
        }
        REPEAT_ZERO_SHORT => lengths.extend(std::iter::repeat(0).take(extra as usize + 3)),
        REPEAT_ZERO_LONG => lengths.extend(std::iter::repeat(0).take(extra as usize + 11)),
        _ => return Err(InflateError::malformed(format!("invalid code-length symbol {}", symbol))),
    }
    Ok(())
}

/// Decodes exactly `count` code lengths through the code-length tree.
///
/// A repeat that would run past `count` is malformed.
pub fn read_code_lengths<R: Read>(
    bits: &mut BitReader<R>,
    cl_tree: &mut HuffmanTree,
    count: usize,
) -> InflateResult<Vec<u8>> {
    let mut lengths = Vec::with_capacity(count);
    while lengths.len() < count {
        let symbol = cl_tree.decode_symbol(bits)?;
        let extra = bits.read_bits(extra_bits_for(symbol))?;
        apply_code_length_symbol(symbol, extra, &mut lengths)?;
        trace!("code-length symbol {} (+{}) -> {} lengths", symbol, extra, lengths.len());
    }
    if lengths.len() > count {
        return Err(InflateError::malformed(format!(
            "code lengths overrun: {} decoded, {} expected",
            lengths.len(),
            count
        )));
    }
    Ok(lengths)
}

/// Everything a dynamic block header carries, fixed once parsed.
#[derive(Debug, Clone)]
pub struct DynamicHeader {
    pub counts: BlockCounts,
    pub litlen_lengths: Vec<u8>,
    pub dist_lengths: Vec<u8>,
}

impl DynamicHeader {
    /// Splits the HLIT+HDIST decoded lengths into the two alphabets.
    pub fn from_code_lengths(counts: BlockCounts, mut lengths: Vec<u8>) -> InflateResult<Self> {
        if lengths.len() != counts.hlit + counts.hdist {
            return Err(InflateError::malformed("code length count does not match HLIT + HDIST"));
        }
        let dist_lengths = lengths.split_off(counts.hlit);
        Ok(Self {
            counts,
            litlen_lengths: lengths,
            dist_lengths,
        })
    }

    /// Literal/length and distance decode trees for this block.
    pub fn build_trees(&self) -> InflateResult<(HuffmanTree, HuffmanTree)> {
        if self.litlen_lengths[END_OF_BLOCK] == 0 {
            return Err(InflateError::malformed("missing end-of-block code"));
        }
        trace!(
            "building trees for {} literal/length and {} distance codes",
            self.counts.hlit,
            self.counts.hdist
        );
        let litlen = HuffmanTree::from_lengths(&self.litlen_lengths)?;
        let dist = HuffmanTree::from_lengths(&self.dist_lengths)?;
        Ok((litlen, dist))
    }
}
