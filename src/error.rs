//! Error types for encoding, decoding and sending datagrams.

use std::io;
use std::path::PathBuf;

/// Failure to build a datagram. Nothing is allocated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Topic is empty or longer than the allowed maximum.
    #[error("topic length {len} is outside 1..={max} bytes")]
    TopicTooLong { len: usize, max: usize },

    /// Header plus topic, key and value would exceed the maximum datagram size.
    #[error("datagram size {size} exceeds maximum of {max} bytes")]
    DatagramTooLarge { size: usize, max: usize },
}

/// Reasons a receiver rejects a datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated datagram: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("declared size {declared} does not match received size {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("unknown api key {0}")]
    UnknownApiKey(u16),

    #[error("unsupported api version {version} for api key {api_key}")]
    UnsupportedVersion { api_key: u16, version: u16 },

    #[error("checksum mismatch: header says {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("topic is empty or not valid UTF-8")]
    InvalidTopic,

    #[error("{field} field runs past end of datagram")]
    FieldOverrun { field: &'static str },

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Transport failure while handing a datagram to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("socket path too long: {}", .0.display())]
    PathTooLong(PathBuf),

    #[error("short write: sent {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}
