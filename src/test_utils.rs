//! Bit-exact fixture builders for the decoder tests.

use crate::dynamic::CODE_LENGTH_ORDER;
use crate::huffman::{CanonicalCodes, Codeword};

#[macro_export]
macro_rules! assert_slices_eq {
    ($left:expr, $right:expr) => {
        let left = &$left[..];
        let right = &$right[..];
        if left != right {
            if left.len() != right.len() {
                panic!(
                    "assertion failed: `(left == right)`\n  left len: {},\n right len: {}",
                    left.len(),
                    right.len()
                );
            }
            for (i, (a, b)) in left.iter().zip(right.iter()).enumerate() {
                if a != b {
                    let start = i.saturating_sub(16);
                    let end = (i + 16).min(left.len());
                    panic!(
                        "assertion failed: `(left == right)` at index {}\n  left: {:02X?}\n right: {:02X?}",
                        i,
                        &left[start..end],
                        &right[start..end]
                    );
                }
            }
        }
    };
}

/// LSB-first bit packer, the inverse of `BitReader`.
#[derive(Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    n: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bits(&mut self, value: u32, n: u32) {
        assert!(n <= 32);
        if n == 0 {
            return;
        }
        self.acc |= ((value as u64) & ((1u64 << n) - 1)) << self.n;
        self.n += n;
        while self.n >= 8 {
            self.bytes.push(self.acc as u8);
            self.acc >>= 8;
            self.n -= 8;
        }
    }

    /// Huffman codes go out most-significant bit first.
    pub fn write_code(&mut self, code: Codeword) {
        for i in (0..code.len).rev() {
            self.write_bits(((code.bits >> i) & 1) as u32, 1);
        }
    }

    /// Pads the last byte with zero bits.
    pub fn finish(mut self) -> Vec<u8> {
        if self.n > 0 {
            self.bytes.push(self.acc as u8);
        }
        self.bytes
    }
}

/// Code-length alphabet lengths used by the fixtures: every one of the 19
/// symbols is encodable (13 codes of 4 bits, 6 of 5 bits).
pub fn fixture_code_length_lengths() -> [u8; 19] {
    let mut lengths = [4u8; 19];
    for len in lengths.iter_mut().skip(13) {
        *len = 5;
    }
    lengths
}

/// One code-length alphabet symbol plus the value of its extra bits.
#[derive(Clone, Copy)]
pub struct ClSymbol(pub u8, pub u32);

/// Writes BFINAL, BTYPE=2 and a dynamic header whose code-length section is
/// the literal `cl_symbols` stream.
pub fn write_dynamic_header_raw(w: &mut BitWriter, final_block: bool, hlit: usize, hdist: usize, cl_symbols: &[ClSymbol]) {
    let cl_lengths = fixture_code_length_lengths();
    let cl_codes = CanonicalCodes::build(&cl_lengths).unwrap();

    w.write_bits(final_block as u32, 1);
    w.write_bits(2, 2);
    w.write_bits((hlit - 257) as u32, 5);
    w.write_bits((hdist - 1) as u32, 5);
    w.write_bits(19 - 4, 4);
    for &sym in CODE_LENGTH_ORDER.iter() {
        w.write_bits(cl_lengths[sym] as u32, 3);
    }
    for &ClSymbol(sym, extra) in cl_symbols {
        w.write_code(cl_codes.get(sym as usize).unwrap());
        match sym {
            16 => w.write_bits(extra, 2),
            17 => w.write_bits(extra, 3),
            18 => w.write_bits(extra, 7),
            _ => {}
        }
    }
}

/// Writes a dynamic block header for the given alphabets, sending each
/// length as a plain code-length symbol. Returns the codes to encode data
/// with.
pub fn write_dynamic_header(
    w: &mut BitWriter,
    final_block: bool,
    litlen: &[u8],
    dist: &[u8],
) -> (CanonicalCodes, CanonicalCodes) {
    let stream: Vec<ClSymbol> = litlen.iter().chain(dist.iter()).map(|&l| ClSymbol(l, 0)).collect();
    write_dynamic_header_raw(w, final_block, litlen.len(), dist.len(), &stream);
    (
        CanonicalCodes::build(litlen).unwrap(),
        CanonicalCodes::build(dist).unwrap(),
    )
}

/// A complete literal/length table over all 286 symbols: 226 codes of 8 bits
/// and 60 of 9 bits.
pub fn full_litlen_lengths() -> Vec<u8> {
    let mut lengths = vec![8u8; 286];
    for len in lengths.iter_mut().skip(226) {
        *len = 9;
    }
    lengths
}

/// A complete distance table over all 30 symbols: 2 codes of 4 bits, 28 of 5.
pub fn full_dist_lengths() -> Vec<u8> {
    let mut lengths = vec![5u8; 30];
    lengths[0] = 4;
    lengths[1] = 4;
    lengths
}
