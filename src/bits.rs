//! LSB-first bit reader over a byte source.
//!
//! Bytes are pulled from the inner reader one at a time and only when the
//! residual buffer cannot satisfy a request, so the inner reader is never
//! advanced past the byte holding the last bit consumed.

use std::io::Read;

use byteorder::ReadBytesExt;

use crate::error::InflateResult;

pub struct BitReader<R> {
    inner: R,
    bb: u64, // residual bits, next bit in stream order at bit 0
    bk: u32, // number of valid bits in bb
    bytes_in: u64,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bb: 0,
            bk: 0,
            bytes_in: 0,
        }
    }

    /// Make sure at least `n` bits sit in the residual buffer.
    fn need_bits(&mut self, n: u32) -> InflateResult<()> {
        while self.bk < n {
            let byte = self.inner.read_u8()?;
            self.bb |= (byte as u64) << self.bk;
            self.bk += 8;
            self.bytes_in += 1;
        }
        Ok(())
    }

    fn dump_bits(&mut self, n: u32) {
        self.bb >>= n;
        self.bk -= n;
    }

    /// Reads the next `n` bits (at most 32), first bit read landing in bit 0.
    pub fn read_bits(&mut self, n: u32) -> InflateResult<u32> {
        let value = self.peek_bits(n)?;
        self.dump_bits(n);
        Ok(value)
    }

    /// Like [`read_bits`](Self::read_bits) but leaves the bits in place.
    pub fn peek_bits(&mut self, n: u32) -> InflateResult<u32> {
        debug_assert!(n <= 32, "read of {} bits", n);
        if n == 0 {
            return Ok(0);
        }
        self.need_bits(n)?;
        Ok((self.bb & ((1u64 << n) - 1)) as u32)
    }

    pub fn read_bit(&mut self) -> InflateResult<u32> {
        self.read_bits(1)
    }

    /// Discards the unread bits of the current byte.
    pub fn align_to_byte(&mut self) {
        let n = self.bk % 8;
        self.dump_bits(n);
    }

    pub fn available_bits(&self) -> u32 {
        self.bk
    }

    /// Number of whole bytes pulled from the inner reader so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InflateError;
    use std::io::Cursor;

    #[test]
    fn reads_lsb_first_within_a_byte() {
        let data = [0b1011_0110u8];
        let mut bits = BitReader::new(&data[..]);
        assert_eq!(bits.read_bits(1).unwrap(), 0);
        assert_eq!(bits.read_bits(1).unwrap(), 1);
        assert_eq!(bits.read_bits(2).unwrap(), 0b01);
        assert_eq!(bits.read_bits(4).unwrap(), 0b1011);
    }

    #[test]
    fn fields_straddle_byte_boundaries() {
        // 5 + 5 + 4 bits, the layout of HLIT/HDIST/HCLEN.
        let data = [0b1110_0011u8, 0b0010_1101];
        let mut bits = BitReader::new(&data[..]);
        assert_eq!(bits.read_bits(5).unwrap(), 0b00011);
        assert_eq!(bits.read_bits(5).unwrap(), 0b01_111);
        assert_eq!(bits.read_bits(4).unwrap(), 0b1011);
        assert_eq!(bits.available_bits(), 2);
    }

    #[test]
    fn peek_does_not_consume() {
        let data = [0x12u8, 0x34];
        let mut bits = BitReader::new(&data[..]);
        assert_eq!(bits.peek_bits(12).unwrap(), 0x412);
        assert_eq!(bits.peek_bits(12).unwrap(), 0x412);
        assert_eq!(bits.read_bits(4).unwrap(), 0x2);
        assert_eq!(bits.read_bits(12).unwrap(), 0x341);
    }

    #[test]
    fn wide_reads_assemble_in_stream_order() {
        let data = [0x78u8, 0x56, 0x34, 0x12, 0xff];
        let mut bits = BitReader::new(&data[..]);
        assert_eq!(bits.read_bits(3).unwrap(), 0);
        assert_eq!(bits.read_bits(32).unwrap(), 0xe246_8acf);
    }

    #[test]
    fn exhausted_source_is_end_of_stream() {
        let data = [0xffu8];
        let mut bits = BitReader::new(&data[..]);
        assert_eq!(bits.read_bits(7).unwrap(), 0x7f);
        assert!(matches!(bits.read_bits(2), Err(InflateError::EndOfStream)));
    }

    #[test]
    fn never_reads_ahead_of_need() {
        let mut cursor = Cursor::new(vec![0xaau8, 0xbb, 0xcc]);
        {
            let mut bits = BitReader::new(&mut cursor);
            bits.read_bits(9).unwrap();
            assert_eq!(bits.bytes_in(), 2);
            bits.align_to_byte();
            assert_eq!(bits.available_bits(), 0);
        }
        assert_eq!(cursor.position(), 2);
    }
}
