//! Tag + length + payload chunk iteration
//!
//! Used by the chunked container formats. A declared length that exceeds the
//! bytes left in the stream (or overflows) is reported as
//! [`ReadError::ChunkOverrun`] before the payload is touched.

use crate::error::ReadError;
use crate::reader::ByteReader;

/// Byte order of chunk length fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthOrder {
    Little,
    Big,
}

/// One chunk of a container
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    /// Four-character tag
    pub tag: [u8; 4],
    /// Absolute offset of the payload
    pub offset: usize,
    /// Payload bytes
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }

    pub fn reader(&self) -> ByteReader<'a> {
        ByteReader::new(self.data)
    }
}

/// Iterator over consecutive chunks
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    reader: ByteReader<'a>,
    order: LengthOrder,
    pad_to_even: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(reader: ByteReader<'a>, order: LengthOrder) -> Self {
        Self {
            reader,
            order,
            pad_to_even: false,
        }
    }

    /// Skip the pad byte that follows odd-sized payloads (IFF/RIFF style)
    pub fn padded(mut self) -> Self {
        self.pad_to_even = true;
        self
    }

    /// Next chunk, `None` once fewer than a header's worth of bytes remain
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>, ReadError> {
        if self.reader.remaining() < 8 {
            return Ok(None);
        }
        let tag = self.reader.tag()?;
        let declared = match self.order {
            LengthOrder::Little => self.reader.u32_le()?,
            LengthOrder::Big => self.reader.u32_be()?,
        };
        let available = self.reader.remaining();
        let len = usize::try_from(declared)
            .ok()
            .filter(|&len| len <= available)
            .ok_or_else(|| ReadError::ChunkOverrun {
                tag: String::from_utf8_lossy(&tag).into_owned(),
                declared: u64::from(declared),
                available,
            })?;
        let offset = self.reader.position();
        let data = self.reader.bytes(len)?;
        if self.pad_to_even && len % 2 == 1 && self.reader.remaining() > 0 {
            self.reader.skip(1)?;
        }
        Ok(Some(Chunk { tag, offset, data }))
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error
                self.reader = ByteReader::new(&[]);
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_le(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_iterates_chunks_in_order() {
        let mut data = chunk_le(b"MAIN", &[1, 2, 3]);
        data.extend(chunk_le(b"ORDR", &[4]));
        let chunks: Vec<_> = ChunkReader::new(ByteReader::new(&data), LengthOrder::Little)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0].tag, b"MAIN");
        assert_eq!(chunks[0].data, &[1u8, 2, 3]);
        assert_eq!(chunks[1].offset, 19);
    }

    #[test]
    fn test_declared_length_past_end_is_rejected() {
        let mut data = b"INST".to_vec();
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&[0; 10]);
        let mut chunks = ChunkReader::new(ByteReader::new(&data), LengthOrder::Little);
        match chunks.next() {
            Some(Err(ReadError::ChunkOverrun {
                declared,
                available,
                ..
            })) => {
                assert_eq!(declared, 1000);
                assert_eq!(available, 10);
            }
            other => panic!("expected overrun, got {:?}", other),
        }
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_max_length_does_not_overflow() {
        let mut data = b"PATT".to_vec();
        data.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut chunks = ChunkReader::new(ByteReader::new(&data), LengthOrder::Big);
        assert!(matches!(chunks.next(), Some(Err(ReadError::ChunkOverrun { .. }))));
    }

    #[test]
    fn test_padding_skips_odd_byte() {
        let mut data = chunk_le(b"AAAA", &[9]);
        data.push(0);
        data.extend(chunk_le(b"BBBB", &[]));
        let chunks: Vec<_> = ChunkReader::new(ByteReader::new(&data), LengthOrder::Little)
            .padded()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(&chunks[1].tag, b"BBBB");
    }
}
