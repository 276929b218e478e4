//! Datagram Encoder
//!
//! Validate semua panjang dulu, baru alokasi satu buffer dengan ukuran final.
//! Tidak ada resize, tidak ada buffer perantara, tidak ada I/O.

use super::message::{
    datagram_checksum, Addressing, Datagram, Message, API_VERSION, CHECKSUM_RANGE,
    MAX_DATAGRAM_SIZE, MAX_TOPIC_SIZE,
};
use crate::error::EncodeError;

/// Size limits enforced at encode time.
///
/// Must agree with the daemon's configuration. Values larger than the
/// protocol caps are clamped down to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_topic_size: usize,
    pub max_datagram_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_topic_size: MAX_TOPIC_SIZE,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

impl Limits {
    pub fn new(max_topic_size: usize, max_datagram_size: usize) -> Self {
        Self {
            max_topic_size: max_topic_size.min(MAX_TOPIC_SIZE),
            max_datagram_size: max_datagram_size.min(MAX_DATAGRAM_SIZE),
        }
    }
}

/// Total size of a datagram for the given addressing and field sizes.
///
/// `None` if the sum overflows `usize`.
#[inline]
pub fn datagram_size(
    addressing: Addressing,
    topic_size: usize,
    key_size: usize,
    value_size: usize,
) -> Option<usize> {
    addressing
        .fixed_size()
        .checked_add(topic_size)?
        .checked_add(key_size)?
        .checked_add(value_size)
}

pub fn any_partition_size(topic_size: usize, key_size: usize, value_size: usize) -> Option<usize> {
    datagram_size(Addressing::AnyPartition, topic_size, key_size, value_size)
}

pub fn partition_key_size(topic_size: usize, key_size: usize, value_size: usize) -> Option<usize> {
    datagram_size(Addressing::PartitionKey(0), topic_size, key_size, value_size)
}

/// Stateless encoder. Safe to share between threads; each call owns its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatagramEncoder {
    limits: Limits,
}

impl DatagramEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            limits: Limits::new(limits.max_topic_size, limits.max_datagram_size),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn encode_any_partition(
        &self,
        topic: &str,
        timestamp: u64,
        key: Option<&[u8]>,
        value: &[u8],
    ) -> Result<Datagram, EncodeError> {
        let msg = Message {
            topic,
            timestamp,
            key,
            value,
        };
        self.encode(Addressing::AnyPartition, &msg)
    }

    pub fn encode_partition_key(
        &self,
        partition_key: u32,
        topic: &str,
        timestamp: u64,
        key: Option<&[u8]>,
        value: &[u8],
    ) -> Result<Datagram, EncodeError> {
        let msg = Message {
            topic,
            timestamp,
            key,
            value,
        };
        self.encode(Addressing::PartitionKey(partition_key), &msg)
    }

    /// Validate and size the message without building it.
    pub fn checked_size(&self, addressing: Addressing, msg: &Message<'_>) -> Result<usize, EncodeError> {
        let max = self.limits.max_datagram_size;
        let topic_len = msg.topic.len();

        if topic_len == 0 || topic_len > self.limits.max_topic_size {
            return Err(EncodeError::TopicTooLong {
                len: topic_len,
                max: self.limits.max_topic_size,
            });
        }

        // Fast rejection: any single field over the limit already loses.
        let key_len = msg.key_bytes().len();
        let value_len = msg.value.len();
        if value_len > max || key_len > max {
            return Err(EncodeError::DatagramTooLarge {
                size: addressing
                    .fixed_size()
                    .saturating_add(topic_len)
                    .saturating_add(key_len)
                    .saturating_add(value_len),
                max,
            });
        }

        let size = datagram_size(addressing, topic_len, key_len, value_len).unwrap_or(usize::MAX);
        if size > max {
            return Err(EncodeError::DatagramTooLarge { size, max });
        }

        Ok(size)
    }

    /// Encode one message. Either a complete, checksummed datagram or an error.
    pub fn encode(&self, addressing: Addressing, msg: &Message<'_>) -> Result<Datagram, EncodeError> {
        let size = self.checked_size(addressing, msg)?;

        let mut buf = vec![0u8; size].into_boxed_slice();
        let written = write_fields(&mut buf, size, addressing, msg);
        debug_assert_eq!(written, size);

        let checksum = datagram_checksum(&buf);
        buf[CHECKSUM_RANGE].copy_from_slice(&checksum.to_be_bytes());

        Ok(Datagram::from_encoded(buf))
    }
}

/// Sequential big-endian writer over a pre-sized buffer.
struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    #[inline(always)]
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    #[inline(always)]
    fn put_u16(&mut self, v: u16) {
        self.put(&v.to_be_bytes());
    }

    #[inline(always)]
    fn put_u32(&mut self, v: u32) {
        self.put(&v.to_be_bytes());
    }

    #[inline(always)]
    fn put_u64(&mut self, v: u64) {
        self.put(&v.to_be_bytes());
    }
}

// Sizes are validated by the caller, so the narrowing casts below cannot truncate:
// size <= MAX_DATAGRAM_SIZE < u32::MAX and topic <= MAX_TOPIC_SIZE < u16::MAX.
fn write_fields(buf: &mut [u8], size: usize, addressing: Addressing, msg: &Message<'_>) -> usize {
    let key = msg.key_bytes();
    let mut w = FieldWriter { buf, pos: 0 };

    w.put_u32(size as u32);
    w.put_u16(addressing.api_key());
    w.put_u16(API_VERSION);
    w.put_u16(0); // flags
    w.put_u32(0); // checksum, patched after
    w.put_u64(msg.timestamp);
    w.put_u16(msg.topic.len() as u16);
    w.put(msg.topic.as_bytes());
    if let Addressing::PartitionKey(partition_key) = addressing {
        w.put_u32(partition_key);
    }
    w.put_u32(key.len() as u32);
    w.put(key);
    w.put_u32(msg.value.len() as u32);
    w.put(msg.value);

    w.pos
}

/// [`DatagramEncoder::encode_any_partition`] with default limits.
pub fn encode_any_partition(
    topic: &str,
    timestamp: u64,
    key: Option<&[u8]>,
    value: &[u8],
) -> Result<Datagram, EncodeError> {
    DatagramEncoder::new().encode_any_partition(topic, timestamp, key, value)
}

/// [`DatagramEncoder::encode_partition_key`] with default limits.
pub fn encode_partition_key(
    partition_key: u32,
    topic: &str,
    timestamp: u64,
    key: Option<&[u8]>,
    value: &[u8],
) -> Result<Datagram, EncodeError> {
    DatagramEncoder::new().encode_partition_key(partition_key, topic, timestamp, key, value)
}
