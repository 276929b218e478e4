//! Dory Datagram Format (protocol version 1)
//!
//! Layout (big-endian):
//! ┌──────────────────────────────────────────────────────────┐
//! │ size u32 │ api_key u16 │ api_version u16 │ flags u16     │
//! │ checksum u32 │ timestamp u64                             │  22 bytes fixed
//! ├──────────────────────────────────────────────────────────┤
//! │ topic_size u16 │ topic                                   │
//! │ partition_key u32            (PartitionKey variant only) │
//! │ key_size u32 │ key                                       │
//! │ value_size u32 │ value                                   │
//! └──────────────────────────────────────────────────────────┘
//!
//! Checksum adalah Adler-32 atas semua byte kecuali field checksum itu sendiri.
//! A computed sum of 0 is written as `0xFFFF_FFFF` instead, so a zero field
//! always means an unpatched placeholder. Real Adler-32 never yields
//! `0xFFFF_FFFF` (both halves stay below 65521), so the mapping is unambiguous.

use std::ops::Range;

pub const SIZE_FIELD_SIZE: usize = 4;
pub const API_KEY_FIELD_SIZE: usize = 2;
pub const API_VERSION_FIELD_SIZE: usize = 2;
pub const FLAGS_FIELD_SIZE: usize = 2;
pub const CHECKSUM_FIELD_SIZE: usize = 4;
pub const TIMESTAMP_FIELD_SIZE: usize = 8;
pub const TOPIC_SIZE_FIELD_SIZE: usize = 2;
pub const PARTITION_KEY_FIELD_SIZE: usize = 4;
pub const KEY_SIZE_FIELD_SIZE: usize = 4;
pub const VALUE_SIZE_FIELD_SIZE: usize = 4;

pub const API_KEY_OFFSET: usize = SIZE_FIELD_SIZE;
pub const API_VERSION_OFFSET: usize = API_KEY_OFFSET + API_KEY_FIELD_SIZE;
pub const FLAGS_OFFSET: usize = API_VERSION_OFFSET + API_VERSION_FIELD_SIZE;
pub const CHECKSUM_OFFSET: usize = FLAGS_OFFSET + FLAGS_FIELD_SIZE;
pub const TIMESTAMP_OFFSET: usize = CHECKSUM_OFFSET + CHECKSUM_FIELD_SIZE;

/// Size, variant tag, checksum and timestamp.
pub const HEADER_SIZE: usize = TIMESTAMP_OFFSET + TIMESTAMP_FIELD_SIZE;

pub const ANY_PARTITION_FIXED_SIZE: usize =
    HEADER_SIZE + TOPIC_SIZE_FIELD_SIZE + KEY_SIZE_FIELD_SIZE + VALUE_SIZE_FIELD_SIZE;
pub const PARTITION_KEY_FIXED_SIZE: usize = ANY_PARTITION_FIXED_SIZE + PARTITION_KEY_FIELD_SIZE;

pub const ANY_PARTITION_API_KEY: u16 = 256;
pub const PARTITION_KEY_API_KEY: u16 = 257;
pub const API_VERSION: u16 = 1;

/// Kafka's own limit on topic names.
pub const MAX_TOPIC_SIZE: usize = (1 << 15) - 1;

/// 200 KiB, below the single-send limit of a Linux UNIX domain datagram socket.
pub const MAX_DATAGRAM_SIZE: usize = 200 * 1024;

/// Addressing mode, the variant tag carried in the api key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Addressing {
    /// Daemon chooses the partition.
    AnyPartition,
    /// Caller pins the partition; the value is carried verbatim.
    PartitionKey(u32),
}

impl Addressing {
    #[inline(always)]
    pub fn api_key(&self) -> u16 {
        match self {
            Self::AnyPartition => ANY_PARTITION_API_KEY,
            Self::PartitionKey(_) => PARTITION_KEY_API_KEY,
        }
    }

    /// Fixed overhead of this variant (header + length fields).
    #[inline(always)]
    pub fn fixed_size(&self) -> usize {
        match self {
            Self::AnyPartition => ANY_PARTITION_FIXED_SIZE,
            Self::PartitionKey(_) => PARTITION_KEY_FIXED_SIZE,
        }
    }

    pub fn partition_key(&self) -> Option<u32> {
        match self {
            Self::AnyPartition => None,
            Self::PartitionKey(k) => Some(*k),
        }
    }
}

/// Logical message, borrowed from the caller for one encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub topic: &'a str,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    pub key: Option<&'a [u8]>,
    pub value: &'a [u8],
}

impl<'a> Message<'a> {
    pub fn new(topic: &'a str, timestamp: u64, value: &'a [u8]) -> Self {
        Self {
            topic,
            timestamp,
            key: None,
            value,
        }
    }

    pub fn with_key(mut self, key: &'a [u8]) -> Self {
        self.key = Some(key);
        self
    }

    /// Key bytes; an absent key encodes exactly like an empty one.
    #[inline(always)]
    pub fn key_bytes(&self) -> &'a [u8] {
        self.key.unwrap_or(&[])
    }
}

/// Finished datagram, ready for exactly one send.
///
/// Bytes tidak bisa diubah setelah dibuat; hanya encoder yang bisa membuatnya.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Datagram {
    bytes: Box<[u8]>,
}

impl Datagram {
    /// Caller (encoder) guarantees `bytes` is complete and checksummed.
    pub(crate) fn from_encoded(bytes: Box<[u8]>) -> Self {
        debug_assert!(bytes.len() >= HEADER_SIZE);
        Self { bytes }
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: every datagram carries at least the fixed header.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Value of the size field.
    pub fn declared_size(&self) -> usize {
        read_u32(&self.bytes, 0) as usize
    }

    pub fn api_key(&self) -> u16 {
        read_u16(&self.bytes, API_KEY_OFFSET)
    }

    pub fn checksum(&self) -> u32 {
        read_u32(&self.bytes, CHECKSUM_OFFSET)
    }

    pub fn addressing(&self) -> Addressing {
        match self.api_key() {
            PARTITION_KEY_API_KEY => {
                let topic_size = read_u16(&self.bytes, HEADER_SIZE) as usize;
                let off = HEADER_SIZE + TOPIC_SIZE_FIELD_SIZE + topic_size;
                Addressing::PartitionKey(read_u32(&self.bytes, off))
            }
            _ => Addressing::AnyPartition,
        }
    }

    /// Give up the immutability guarantee and take the raw bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl AsRef<[u8]> for Datagram {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[inline(always)]
pub(crate) fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

#[inline(always)]
pub(crate) fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline(always)]
pub(crate) fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_be_bytes(b)
}

const ADLER_MOD: u32 = 65521;
// Largest n such that 255n(n+1)/2 + (n+1)(MOD-1) fits in a u32.
const ADLER_NMAX: usize = 5552;

/// Adler-32 running state.
#[derive(Debug, Clone, Copy)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Adler32 {
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        for chunk in data.chunks(ADLER_NMAX) {
            for &byte in chunk {
                self.a += byte as u32;
                self.b += self.a;
            }
            self.a %= ADLER_MOD;
            self.b %= ADLER_MOD;
        }
    }

    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// Byte range covered by the checksum field.
pub const CHECKSUM_RANGE: Range<usize> = CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_FIELD_SIZE;

/// Written in place of a computed sum of 0. Unreachable by Adler-32 itself.
pub const ZERO_SUM_CHECKSUM: u32 = 0xFFFF_FFFF;

/// Checksum over everything except the checksum field. Never 0.
#[inline]
pub fn datagram_checksum(buf: &[u8]) -> u32 {
    let mut adler = Adler32::new();
    adler.update(&buf[..CHECKSUM_RANGE.start]);
    adler.update(&buf[CHECKSUM_RANGE.end..]);
    match adler.finish() {
        0 => ZERO_SUM_CHECKSUM,
        sum => sum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(HEADER_SIZE, 22);
        assert_eq!(CHECKSUM_OFFSET, 10);
        assert_eq!(ANY_PARTITION_FIXED_SIZE, 32);
        assert_eq!(PARTITION_KEY_FIXED_SIZE, 36);
    }

    #[test]
    fn test_adler32_known_vectors() {
        let mut a = Adler32::new();
        assert_eq!(a.finish(), 1);
        a.update(b"Wikipedia");
        assert_eq!(a.finish(), 0x11E6_0398);
    }

    #[test]
    fn test_adler32_incremental_matches_oneshot() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 256) as u8).collect();

        let mut whole = Adler32::new();
        whole.update(&data);

        let mut split = Adler32::new();
        split.update(&data[..7]);
        split.update(&data[7..12_345]);
        split.update(&data[12_345..]);

        assert_eq!(whole.finish(), split.finish());
    }

    #[test]
    fn test_adler32_large_run_of_ff() {
        // Worst case for the deferred modulo.
        let data = vec![0xFFu8; 100_000];
        let mut a = Adler32::new();
        a.update(&data);

        let (mut sa, mut sb) = (1u64, 0u64);
        for &x in &data {
            sa = (sa + x as u64) % 65521;
            sb = (sb + sa) % 65521;
        }
        assert_eq!(a.finish(), ((sb << 16) | sa) as u32);
    }

    #[test]
    fn test_zero_sum_substitute_is_not_adler() {
        // Largest reachable Adler-32 has both halves at MOD - 1.
        let max = ((ADLER_MOD - 1) << 16) | (ADLER_MOD - 1);
        assert!(ZERO_SUM_CHECKSUM > max);
    }

    #[test]
    fn test_addressing_tags() {
        assert_eq!(Addressing::AnyPartition.api_key(), 256);
        assert_eq!(Addressing::PartitionKey(7).api_key(), 257);
        assert_eq!(Addressing::PartitionKey(7).partition_key(), Some(7));
        assert_eq!(Addressing::AnyPartition.partition_key(), None);
    }

    #[test]
    fn test_absent_key_is_empty() {
        let msg = Message::new("t", 0, b"v");
        assert!(msg.key_bytes().is_empty());
        assert_eq!(msg.with_key(b"k").key_bytes(), b"k");
    }
}
