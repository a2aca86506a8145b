//! Canonical Huffman codes (RFC-1951 §3.2.2) and the bit-by-bit decode trie
//! built from them.

use std::io::Read;

use crate::bits::BitReader;
use crate::error::{InflateError, InflateResult};

/// Longest code length DEFLATE allows.
pub const MAX_BITS: usize = 15;

/// A code value and its length; the value is sent most-significant bit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codeword {
    pub bits: u16,
    pub len: u8,
}

impl Codeword {
    /// True when `self` is a bit-prefix of `other` (or equal to it).
    #[cfg(test)]
    pub fn is_prefix_of(&self, other: &Codeword) -> bool {
        self.len <= other.len && (other.bits >> (other.len - self.len)) == self.bits
    }
}

/// Symbol index to codeword, `None` for symbols of length 0.
#[derive(Debug, Clone)]
pub struct CanonicalCodes {
    codes: Vec<Option<Codeword>>,
    max_len: u8,
}

impl CanonicalCodes {
    /// Assigns canonical codes to a code-length array.
    ///
    /// Fails on oversubscribed tables and on incomplete ones, except for an
    /// empty table or one holding a single code of length 1.
    pub fn build(lengths: &[u8]) -> InflateResult<Self> {
        Self::assign(lengths, true)
    }

    /// Like [`build`](Self::build) but without the single-code exception.
    /// The code-length alphabet must always be complete.
    pub fn build_complete(lengths: &[u8]) -> InflateResult<Self> {
        Self::assign(lengths, false)
    }

    fn assign(lengths: &[u8], allow_single_code: bool) -> InflateResult<Self> {
        let mut bl_count = [0u16; MAX_BITS + 1];
        for &len in lengths {
            if len as usize > MAX_BITS {
                return Err(InflateError::malformed(format!("code length {} exceeds {}", len, MAX_BITS)));
            }
            bl_count[len as usize] += 1;
        }
        bl_count[0] = 0;

        let used: u16 = bl_count.iter().sum();
        let max_len = (1..=MAX_BITS).rev().find(|&l| bl_count[l] != 0).unwrap_or(0) as u8;

        let mut left: i32 = 1;
        for &count in &bl_count[1..] {
            left <<= 1;
            left -= count as i32;
            if left < 0 {
                return Err(InflateError::malformed("oversubscribed code table"));
            }
        }
        let single_code = allow_single_code && used == 1 && bl_count[1] == 1;
        if left > 0 && used != 0 && !single_code {
            return Err(InflateError::malformed("incomplete code table"));
        }

        let mut next_code = [0u16; MAX_BITS + 2];
        let mut code = 0u16;
        for bits in 1..=MAX_BITS {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        let codes = lengths
            .iter()
            .map(|&len| {
                if len == 0 {
                    return None;
                }
                let bits = next_code[len as usize];
                next_code[len as usize] += 1;
                Some(Codeword { bits, len })
            })
            .collect();

        Ok(Self { codes, max_len })
    }

    #[cfg(test)]
    pub fn get(&self, symbol: usize) -> Option<Codeword> {
        self.codes.get(symbol).copied().flatten()
    }

    /// `(symbol, codeword)` for every symbol that has one, in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, Codeword)> + '_ {
        self.codes
            .iter()
            .enumerate()
            .filter_map(|(sym, code)| code.map(|c| (sym as u16, c)))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.codes.iter().all(Option::is_none)
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }
}

const NO_CHILD: u32 = 0;
const ROOT: u32 = 0;

#[derive(Debug, Clone, Copy)]
enum Node {
    // Child slots hold arena indices; the root is never anybody's child, so
    // index 0 doubles as "absent".
    Branch([u32; 2]),
    Leaf(u16),
}

/// Binary trie over the codes of one alphabet, stored in an index arena.
///
/// Decoding walks one bit at a time from a cursor. After a symbol comes out
/// the cursor stays on its leaf until [`reset_cursor`](Self::reset_cursor).
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    cursor: u32,
    max_len: u8,
}

impl HuffmanTree {
    pub fn from_lengths(lengths: &[u8]) -> InflateResult<Self> {
        Self::from_codes(&CanonicalCodes::build(lengths)?)
    }

    pub fn from_complete_lengths(lengths: &[u8]) -> InflateResult<Self> {
        Self::from_codes(&CanonicalCodes::build_complete(lengths)?)
    }

    pub fn from_codes(codes: &CanonicalCodes) -> InflateResult<Self> {
        let mut tree = Self {
            nodes: vec![Node::Branch([NO_CHILD; 2])],
            cursor: ROOT,
            max_len: codes.max_len(),
        };
        for (symbol, code) in codes.iter() {
            tree.insert(code, symbol)?;
        }
        Ok(tree)
    }

    fn insert(&mut self, code: Codeword, symbol: u16) -> InflateResult<()> {
        let mut node = ROOT;
        for i in (0..code.len).rev() {
            let bit = ((code.bits >> i) & 1) as usize;
            let last = i == 0;
            let children = match self.nodes[node as usize] {
                Node::Branch(children) => children,
                Node::Leaf(_) => return Err(InflateError::malformed("code collides with a shorter code")),
            };
            let child = children[bit];
            if last {
                if child != NO_CHILD {
                    return Err(InflateError::malformed("duplicate code in table"));
                }
                let leaf = self.push(Node::Leaf(symbol));
                self.set_child(node, bit, leaf);
            } else if child == NO_CHILD {
                let branch = self.push(Node::Branch([NO_CHILD; 2]));
                self.set_child(node, bit, branch);
                node = branch;
            } else {
                node = child;
            }
        }
        Ok(())
    }

    fn push(&mut self, node: Node) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    fn set_child(&mut self, parent: u32, bit: usize, child: u32) {
        if let Node::Branch(children) = &mut self.nodes[parent as usize] {
            children[bit] = child;
        }
    }

    /// Advances the cursor by one bit. Returns the symbol once a leaf is
    /// reached, `None` while more bits are needed.
    pub fn next_node(&mut self, bit: u32) -> InflateResult<Option<u16>> {
        let children = match self.nodes[self.cursor as usize] {
            Node::Branch(children) => children,
            Node::Leaf(_) => return Err(InflateError::malformed("decode cursor was not reset")),
        };
        let child = children[(bit & 1) as usize];
        if child == NO_CHILD {
            return Err(InflateError::malformed("undefined Huffman code"));
        }
        self.cursor = child;
        match self.nodes[child as usize] {
            Node::Leaf(symbol) => Ok(Some(symbol)),
            Node::Branch(_) => Ok(None),
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = ROOT;
    }

    /// Reads bits until a full code is seen and returns its symbol, leaving
    /// the cursor back on the root.
    pub fn decode_symbol<R: Read>(&mut self, bits: &mut BitReader<R>) -> InflateResult<u16> {
        self.reset_cursor();
        loop {
            let bit = bits.read_bit()?;
            if let Some(symbol) = self.next_node(bit)? {
                self.reset_cursor();
                return Ok(symbol);
            }
        }
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }
}
