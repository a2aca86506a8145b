//! GZIP member framing (RFC-1952): the header in front of the DEFLATE data
//! and the CRC32/ISIZE trailer behind it.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};
use log::debug;

use crate::error::{GzipError, GzipResult};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub const DEFLATED: u8 = 8;

// gzip flag byte
pub const HEADER_CRC: u8 = 0x02; // bit 1 set: CRC16 for the gzip header
pub const EXTRA_FIELD: u8 = 0x04; // bit 2 set: extra field present
pub const ORIG_NAME: u8 = 0x08; // bit 3 set: original file name present
pub const COMMENT: u8 = 0x10; // bit 4 set: file comment present
pub const ENCRYPTED: u8 = 0x20; // bit 5 set: file is encrypted
pub const RESERVED: u8 = 0xC0; // bits 6 and 7: reserved

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GzipHeader {
    pub flags: u8,
    /// Modification time in seconds since the epoch, 0 when unknown.
    pub mtime: u32,
    pub xfl: u8,
    pub os: u8,
    pub extra: Option<Vec<u8>>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub header_crc: Option<u16>,
    /// Bytes the header occupied on disk.
    pub len: usize,
}

/// Reader wrapper remembering every byte it hands out, for FHCRC.
struct Recorder<'a, R> {
    inner: &'a mut R,
    seen: Vec<u8>,
}

impl<R: Read> Read for Recorder<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

fn read_zero_terminated<R: Read>(input: &mut R) -> io::Result<String> {
    let mut s = String::new();
    loop {
        let c = input.read_u8()?;
        if c == 0 {
            return Ok(s);
        }
        // Header strings are ISO 8859-1.
        s.push(c as char);
    }
}

impl GzipHeader {
    /// Reads a member header. `force` at 2 or more tolerates reserved flag
    /// bits and a bad header checksum, as `gzip -ff` does.
    pub fn read<R: Read>(input: &mut R, force: u32) -> GzipResult<Self> {
        let mut rec = Recorder {
            inner: input,
            seen: Vec::with_capacity(16),
        };

        let mut magic = [0u8; 2];
        rec.read_exact(&mut magic).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => GzipError::NotGzip,
            _ => GzipError::Io(err),
        })?;
        if magic != GZIP_MAGIC {
            return Err(GzipError::NotGzip);
        }
        let method = rec.read_u8()?;
        if method != DEFLATED {
            return Err(GzipError::UnknownMethod(method));
        }
        let flags = rec.read_u8()?;
        if flags & ENCRYPTED != 0 {
            return Err(GzipError::Encrypted);
        }
        if flags & RESERVED != 0 && force <= 1 {
            return Err(GzipError::ReservedFlags(flags));
        }
        let mtime = rec.read_u32::<LittleEndian>()?;
        let xfl = rec.read_u8()?;
        let os = rec.read_u8()?;

        let extra = if flags & EXTRA_FIELD != 0 {
            let len = rec.read_u16::<LittleEndian>()? as usize;
            let mut field = vec![0u8; len];
            rec.read_exact(&mut field)?;
            debug!("extra field of {} bytes ignored", len);
            Some(field)
        } else {
            None
        };
        let name = if flags & ORIG_NAME != 0 {
            Some(read_zero_terminated(&mut rec)?)
        } else {
            None
        };
        let comment = if flags & COMMENT != 0 {
            Some(read_zero_terminated(&mut rec)?)
        } else {
            None
        };

        let header_crc = if flags & HEADER_CRC != 0 {
            let computed = (CRC32.checksum(&rec.seen) & 0xffff) as u16;
            let stored = rec.read_u16::<LittleEndian>()?;
            if stored != computed && force <= 1 {
                return Err(GzipError::HeaderChecksum { stored, computed });
            }
            Some(stored)
        } else {
            None
        };

        let header = GzipHeader {
            flags,
            mtime,
            xfl,
            os,
            extra,
            name,
            comment,
            header_crc,
            len: rec.seen.len(),
        };
        debug!(
            "gzip header: flags=0x{:02x} mtime={} xfl={} os={} name={:?} comment={:?} extra={:?} crc16={:?} ({} bytes)",
            header.flags,
            header.mtime,
            header.xfl,
            header.os,
            header.name,
            header.comment,
            header.extra.as_ref().map(Vec::len),
            header.header_crc,
            header.len
        );
        Ok(header)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipTrailer {
    pub crc32: u32,
    /// Uncompressed length modulo 2^32.
    pub isize: u32,
}

pub const TRAILER_LEN: u64 = 8;

impl GzipTrailer {
    pub fn read<R: Read>(input: &mut R) -> io::Result<Self> {
        let crc32 = input.read_u32::<LittleEndian>()?;
        let isize = input.read_u32::<LittleEndian>()?;
        Ok(Self { crc32, isize })
    }

    /// Checks decoded bytes against the stored checksum and length.
    pub fn verify(&self, output: &[u8]) -> GzipResult<()> {
        let computed = CRC32.checksum(output);
        if computed != self.crc32 {
            return Err(GzipError::CrcMismatch {
                stored: self.crc32,
                computed,
            });
        }
        let len = output.len() as u32;
        if len != self.isize {
            return Err(GzipError::LengthMismatch {
                stored: self.isize,
                computed: len,
            });
        }
        Ok(())
    }
}

/// Reads ISIZE from the last four bytes without moving the stream.
pub fn original_size<R: Read + Seek>(input: &mut R) -> io::Result<u32> {
    let pos = input.stream_position()?;
    input.seek(SeekFrom::End(-4))?;
    let size = input.read_u32::<LittleEndian>();
    input.seek(SeekFrom::Start(pos))?;
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header_bytes(flags: u8, tail: &[u8]) -> Vec<u8> {
        let mut h = vec![0x1f, 0x8b, DEFLATED, flags, 0x78, 0x56, 0x34, 0x12, 0x00, 0x03];
        h.extend_from_slice(tail);
        h
    }

    #[test]
    fn minimal_header() {
        let bytes = header_bytes(0, &[]);
        let header = GzipHeader::read(&mut &bytes[..], 0).unwrap();
        assert_eq!(header.mtime, 0x1234_5678);
        assert_eq!(header.os, 3);
        assert_eq!(header.name, None);
        assert_eq!(header.len, 10);
    }

    #[test]
    fn optional_fields() {
        let mut tail = vec![3, 0, b'x', b'y', b'z'];
        tail.extend_from_slice(b"FAQ.txt\0");
        tail.extend_from_slice(b"caf\xe9\0");
        let bytes = header_bytes(EXTRA_FIELD | ORIG_NAME | COMMENT, &tail);
        let mut input = &bytes[..];
        let header = GzipHeader::read(&mut input, 0).unwrap();
        assert_eq!(header.extra.as_deref(), Some(&b"xyz"[..]));
        assert_eq!(header.name.as_deref(), Some("FAQ.txt"));
        assert_eq!(header.comment.as_deref(), Some("café"));
        assert_eq!(header.len, bytes.len());
        assert!(input.is_empty());
    }

    #[test]
    fn header_crc_is_checked() {
        let mut bytes = header_bytes(HEADER_CRC | ORIG_NAME, b"a\0");
        let crc = (CRC32.checksum(&bytes) & 0xffff) as u16;
        let mut good = bytes.clone();
        good.extend_from_slice(&crc.to_le_bytes());
        let header = GzipHeader::read(&mut &good[..], 0).unwrap();
        assert_eq!(header.header_crc, Some(crc));

        bytes.extend_from_slice(&(crc ^ 1).to_le_bytes());
        assert!(matches!(
            GzipHeader::read(&mut &bytes[..], 0),
            Err(GzipError::HeaderChecksum { .. })
        ));
        assert!(GzipHeader::read(&mut &bytes[..], 2).is_ok());
    }

    #[test]
    fn rejects_foreign_input() {
        assert!(matches!(GzipHeader::read(&mut &b"PK\x03\x04"[..], 0), Err(GzipError::NotGzip)));
        assert!(matches!(GzipHeader::read(&mut &b"\x1f"[..], 0), Err(GzipError::NotGzip)));
        let mut bytes = header_bytes(0, &[]);
        bytes[2] = 7;
        assert!(matches!(GzipHeader::read(&mut &bytes[..], 0), Err(GzipError::UnknownMethod(7))));
        assert!(matches!(
            GzipHeader::read(&mut &header_bytes(ENCRYPTED, &[])[..], 0),
            Err(GzipError::Encrypted)
        ));
        assert!(matches!(
            GzipHeader::read(&mut &header_bytes(0x40, &[])[..], 1),
            Err(GzipError::ReservedFlags(0x40))
        ));
    }

    #[test]
    fn trailer_verification() {
        let data = b"hello, world\n";
        let trailer = GzipTrailer {
            crc32: CRC32.checksum(data),
            isize: data.len() as u32,
        };
        trailer.verify(data).unwrap();
        assert!(matches!(trailer.verify(b"hello, world!"), Err(GzipError::CrcMismatch { .. })));
        let short = GzipTrailer { isize: 3, ..trailer };
        assert!(matches!(short.verify(data), Err(GzipError::LengthMismatch { .. })));
    }

    #[test]
    fn reads_isize_and_restores_position() {
        let mut bytes = header_bytes(0, &[0xaa, 0xbb]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1234u32.to_le_bytes());
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(3);
        assert_eq!(original_size(&mut cursor).unwrap(), 1234);
        assert_eq!(cursor.position(), 3);
        cursor.set_position(12);
        let trailer = GzipTrailer::read(&mut cursor).unwrap();
        assert_eq!(trailer, GzipTrailer { crc32: 0, isize: 1234 });
    }
}
