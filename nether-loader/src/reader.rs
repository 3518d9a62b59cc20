//! Bounds-checked byte cursor
//!
//! Every read checks the requested length against the bytes that remain, with
//! checked arithmetic, so a corrupt declared length or offset is reported as
//! [`ReadError`] before any slice is taken.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::ReadError;

/// Cursor over an in-memory byte stream
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Reader positioned at an absolute offset
    pub fn at(data: &'a [u8], offset: u64) -> Result<Self, ReadError> {
        let mut reader = Self::new(data);
        reader.seek(offset)?;
        Ok(reader)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move to an absolute offset; the end of the data is a valid position
    pub fn seek(&mut self, offset: u64) -> Result<(), ReadError> {
        match usize::try_from(offset) {
            Ok(offset) if offset <= self.data.len() => {
                self.pos = offset;
                Ok(())
            }
            _ => Err(ReadError::OffsetOutOfRange {
                offset,
                len: self.data.len(),
            }),
        }
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ReadError> {
        self.bytes(count).map(|_| ())
    }

    /// Take the next `count` bytes
    pub fn bytes(&mut self, count: usize) -> Result<&'a [u8], ReadError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(ReadError::UnexpectedEof {
                offset: self.pos,
                wanted: count,
                available: self.remaining(),
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Take up to `count` bytes, fewer when the data ends first
    pub fn bytes_lenient(&mut self, count: usize) -> &'a [u8] {
        let count = count.min(self.remaining());
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        slice
    }

    /// Sub-reader over the next `count` bytes
    pub fn sub(&mut self, count: usize) -> Result<ByteReader<'a>, ReadError> {
        self.bytes(count).map(ByteReader::new)
    }

    pub fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8, ReadError> {
        Ok(self.u8()? as i8)
    }

    pub fn u16_le(&mut self) -> Result<u16, ReadError> {
        self.bytes(2).map(LittleEndian::read_u16)
    }

    pub fn u16_be(&mut self) -> Result<u16, ReadError> {
        self.bytes(2).map(BigEndian::read_u16)
    }

    pub fn u32_le(&mut self) -> Result<u32, ReadError> {
        self.bytes(4).map(LittleEndian::read_u32)
    }

    pub fn u32_be(&mut self) -> Result<u32, ReadError> {
        self.bytes(4).map(BigEndian::read_u32)
    }

    pub fn tag(&mut self) -> Result<[u8; 4], ReadError> {
        let bytes = self.bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Fixed-length, NUL-padded text field
    pub fn string(&mut self, len: usize) -> Result<String, ReadError> {
        self.bytes(len).map(read_string)
    }
}

/// Decode a NUL-terminated or fixed-length string
pub(crate) fn read_string(bytes: &[u8]) -> String {
    // Find null terminator or end of slice
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    // Trim trailing spaces and convert
    String::from_utf8_lossy(&bytes[..len])
        .trim_end()
        .to_string()
}

/// Non-advancing slice check used by format probes
pub(crate) fn slice_at(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    data.get(offset..offset.checked_add(len)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_and_big_endian() {
        let data = [0x34, 0x12, 0x12, 0x34, 0x78, 0x56, 0x34, 0x12];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.u16_le().unwrap(), 0x1234);
        assert_eq!(r.u16_be().unwrap(), 0x1234);
        assert_eq!(r.u32_le().unwrap(), 0x1234_5678);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_fails_without_advancing() {
        let data = [1, 2, 3];
        let mut r = ByteReader::new(&data);
        r.skip(2).unwrap();
        assert_eq!(
            r.u16_le(),
            Err(ReadError::UnexpectedEof {
                offset: 2,
                wanted: 2,
                available: 1
            })
        );
        assert_eq!(r.position(), 2);
        assert_eq!(r.u8().unwrap(), 3);
    }

    #[test]
    fn test_overflowing_lengths_are_rejected() {
        let data = [0u8; 8];
        let mut r = ByteReader::new(&data);
        r.skip(4).unwrap();
        assert!(r.bytes(usize::MAX).is_err());
        assert!(r.seek(u64::MAX).is_err());
        assert!(r.seek(8).is_ok());
        assert!(r.seek(9).is_err());
    }

    #[test]
    fn test_read_string() {
        assert_eq!(read_string(b"Hello\0World"), "Hello");
        assert_eq!(read_string(b"No null"), "No null");
        assert_eq!(read_string(b"Trailing   "), "Trailing");
        assert_eq!(read_string(b""), "");
    }

    #[test]
    fn test_lenient_bytes_stop_at_end() {
        let data = [1, 2, 3];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.bytes_lenient(10), &[1u8, 2, 3]);
        assert!(r.bytes_lenient(1).is_empty());
    }
}
