//! Reference decoder: the checks a receiving daemon applies.
//!
//! Zero-copy; every field in [`DatagramView`] borrows from the input buffer.

use super::message::{
    datagram_checksum, read_u16, read_u32, read_u64, Addressing, ANY_PARTITION_API_KEY, API_KEY_OFFSET,
    API_VERSION, API_VERSION_OFFSET, CHECKSUM_OFFSET, FLAGS_OFFSET, HEADER_SIZE, PARTITION_KEY_API_KEY,
    SIZE_FIELD_SIZE, TIMESTAMP_OFFSET,
};
use crate::error::DecodeError;

/// Parsed datagram, borrowing from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramView<'a> {
    pub addressing: Addressing,
    pub api_version: u16,
    pub flags: u16,
    pub checksum: u32,
    pub timestamp: u64,
    pub topic: &'a str,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> DatagramView<'a> {
    /// Parse exactly one datagram; `buf` must be the whole received unit.
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        let declared = read_u32(buf, 0) as usize;
        if declared != buf.len() {
            return Err(DecodeError::SizeMismatch {
                declared,
                actual: buf.len(),
            });
        }

        let api_key = read_u16(buf, API_KEY_OFFSET);
        if api_key != ANY_PARTITION_API_KEY && api_key != PARTITION_KEY_API_KEY {
            return Err(DecodeError::UnknownApiKey(api_key));
        }

        let api_version = read_u16(buf, API_VERSION_OFFSET);
        if api_version != API_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                api_key,
                version: api_version,
            });
        }

        let expected = read_u32(buf, CHECKSUM_OFFSET);
        let computed = datagram_checksum(buf);
        if expected != computed {
            return Err(DecodeError::ChecksumMismatch { expected, computed });
        }

        let timestamp = read_u64(buf, TIMESTAMP_OFFSET);
        let mut r = FieldReader {
            buf,
            pos: HEADER_SIZE,
        };

        let topic_size = r.u16("topic size")? as usize;
        let topic = r.bytes(topic_size, "topic")?;
        let topic = match std::str::from_utf8(topic) {
            Ok(t) if !t.is_empty() => t,
            _ => return Err(DecodeError::InvalidTopic),
        };

        let addressing = if api_key == PARTITION_KEY_API_KEY {
            Addressing::PartitionKey(r.u32("partition key")?)
        } else {
            Addressing::AnyPartition
        };

        let key_size = r.u32("key size")? as usize;
        let key = r.bytes(key_size, "key")?;
        let value_size = r.u32("value size")? as usize;
        let value = r.bytes(value_size, "value")?;

        if r.pos != buf.len() {
            return Err(DecodeError::TrailingBytes(buf.len() - r.pos));
        }

        Ok(Self {
            addressing,
            api_version,
            flags: read_u16(buf, FLAGS_OFFSET),
            checksum: expected,
            timestamp,
            topic,
            key,
            value,
        })
    }

    pub fn partition_key(&self) -> Option<u32> {
        self.addressing.partition_key()
    }
}

struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn bytes(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(DecodeError::FieldOverrun { field })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let b = self.bytes(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let b = self.bytes(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Splits a byte stream into datagrams using the size field.
///
/// Untuk stream socket: datagram datang berurutan tanpa batas.
pub struct Decoder<'a> {
    buffer: &'a [u8],
    read_pos: usize,
}

impl<'a> Decoder<'a> {
    #[inline(always)]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
        }
    }

    /// Next complete datagram, or `None` if only a partial one remains.
    ///
    /// A complete but invalid datagram is still consumed, so the stream
    /// stays in sync as long as its size field is sane.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<DatagramView<'a>, DecodeError>> {
        let rest = &self.buffer[self.read_pos..];
        if rest.len() < SIZE_FIELD_SIZE {
            return None;
        }

        let declared = read_u32(rest, 0) as usize;
        if declared < HEADER_SIZE {
            // Cannot frame past this; swallow the rest.
            self.read_pos = self.buffer.len();
            return Some(Err(DecodeError::Truncated {
                needed: HEADER_SIZE,
                available: declared,
            }));
        }
        if rest.len() < declared {
            return None;
        }

        self.read_pos += declared;
        Some(DatagramView::parse(&rest[..declared]))
    }

    /// Bytes belonging to complete datagrams returned so far.
    #[inline(always)]
    pub fn consumed(&self) -> usize {
        self.read_pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::{encode_any_partition, encode_partition_key};
    use crate::protocol::message::{CHECKSUM_RANGE, VALUE_SIZE_FIELD_SIZE};

    /// Re-patch the checksum after editing a field.
    fn fix_checksum(bytes: &mut [u8]) {
        let sum = datagram_checksum(bytes);
        bytes[CHECKSUM_RANGE].copy_from_slice(&sum.to_be_bytes());
    }

    #[test]
    fn test_parse_any_partition() {
        let dg = encode_any_partition("orders", 1_700_000_000_000, None, b"hello world").unwrap();
        let view = DatagramView::parse(dg.as_bytes()).unwrap();

        assert_eq!(view.addressing, Addressing::AnyPartition);
        assert_eq!(view.topic, "orders");
        assert_eq!(view.timestamp, 1_700_000_000_000);
        assert!(view.key.is_empty());
        assert_eq!(view.value, b"hello world");
        assert_eq!(view.partition_key(), None);
    }

    #[test]
    fn test_parse_partition_key() {
        let dg = encode_partition_key(12345, "some topic", 9, Some(&b"k1"[..]), b"").unwrap();
        let view = DatagramView::parse(dg.as_bytes()).unwrap();

        assert_eq!(view.partition_key(), Some(12345));
        assert_eq!(view.key, b"k1");
        assert!(view.value.is_empty());
    }

    #[test]
    fn test_reject_size_mismatch() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        bytes.pop();
        assert!(matches!(
            DatagramView::parse(&bytes),
            Err(DecodeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_reject_corrupted_payload() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            DatagramView::parse(&bytes),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_reject_unknown_api_key() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        bytes[API_KEY_OFFSET..API_KEY_OFFSET + 2].copy_from_slice(&999u16.to_be_bytes());
        assert_eq!(DatagramView::parse(&bytes), Err(DecodeError::UnknownApiKey(999)));
    }

    #[test]
    fn test_reject_field_overrun() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        // Claim a huge topic, then fix up the checksum so only the bounds check fires.
        bytes[HEADER_SIZE..HEADER_SIZE + 2].copy_from_slice(&u16::MAX.to_be_bytes());
        fix_checksum(&mut bytes);

        assert_eq!(
            DatagramView::parse(&bytes),
            Err(DecodeError::FieldOverrun { field: "topic" })
        );
    }

    #[test]
    fn test_reject_unsupported_version() {
        let mut bytes = encode_partition_key(1, "t", 1, None, b"abc").unwrap().into_vec();
        bytes[API_VERSION_OFFSET..API_VERSION_OFFSET + 2].copy_from_slice(&2u16.to_be_bytes());
        assert_eq!(
            DatagramView::parse(&bytes),
            Err(DecodeError::UnsupportedVersion {
                api_key: PARTITION_KEY_API_KEY,
                version: 2
            })
        );
    }

    #[test]
    fn test_reject_zero_checksum_field() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        bytes[CHECKSUM_RANGE].fill(0);
        assert!(matches!(
            DatagramView::parse(&bytes),
            Err(DecodeError::ChecksumMismatch { expected: 0, .. })
        ));
    }

    #[test]
    fn test_reject_trailing_bytes() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        // Value size says 1 of the 3 value bytes.
        let value_size_at = bytes.len() - 3 - VALUE_SIZE_FIELD_SIZE;
        bytes[value_size_at..value_size_at + 4].copy_from_slice(&1u32.to_be_bytes());
        fix_checksum(&mut bytes);

        assert_eq!(DatagramView::parse(&bytes), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn test_reject_empty_topic() {
        let mut bytes = encode_any_partition("t", 1, None, b"abc").unwrap().into_vec();
        bytes[HEADER_SIZE..HEADER_SIZE + 2].copy_from_slice(&0u16.to_be_bytes());
        fix_checksum(&mut bytes);

        assert_eq!(DatagramView::parse(&bytes), Err(DecodeError::InvalidTopic));
    }

    #[test]
    fn test_reject_non_utf8_topic() {
        let mut bytes = encode_any_partition("ab", 1, None, b"abc").unwrap().into_vec();
        bytes[HEADER_SIZE + 2] = 0xFF;
        fix_checksum(&mut bytes);

        assert_eq!(DatagramView::parse(&bytes), Err(DecodeError::InvalidTopic));
    }

    #[test]
    fn test_decoder_swallows_rest_after_undersized_frame() {
        let good = encode_any_partition("a", 1, None, b"never seen").unwrap();
        let mut stream = 5u32.to_be_bytes().to_vec();
        stream.extend_from_slice(good.as_bytes());

        let mut decoder = Decoder::new(&stream);
        assert_eq!(
            decoder.next(),
            Some(Err(DecodeError::Truncated {
                needed: HEADER_SIZE,
                available: 5
            }))
        );
        assert!(decoder.next().is_none());
        assert_eq!(decoder.consumed(), stream.len());
        assert_eq!(decoder.remaining(), 0);
    }

    #[test]
    fn test_decoder_splits_stream() {
        let a = encode_any_partition("a", 1, None, b"first").unwrap();
        let b = encode_partition_key(2, "b", 2, None, b"second").unwrap();

        let mut stream = Vec::new();
        stream.extend_from_slice(a.as_bytes());
        stream.extend_from_slice(b.as_bytes());
        stream.extend_from_slice(&a.as_bytes()[..5]); // partial third

        let mut decoder = Decoder::new(&stream);
        assert_eq!(decoder.next().unwrap().unwrap().value, b"first");
        assert_eq!(decoder.next().unwrap().unwrap().value, b"second");
        assert!(decoder.next().is_none());
        assert_eq!(decoder.consumed(), a.len() + b.len());
        assert_eq!(decoder.remaining(), 5);
    }
}
