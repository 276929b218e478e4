//! Protocol Layer: Dory datagram encoding
//!
//! Prinsip desain:
//! - Validate-then-allocate: panjang dihitung dan dicek sebelum alokasi
//! - Fixed header, big-endian fields, Adler-32 checksum
//! - Pure functions: tidak ada I/O, aman dipanggil dari thread mana saja

mod decoder;
mod encoder;
mod message;

pub use decoder::{DatagramView, Decoder};
pub use encoder::{
    any_partition_size, datagram_size, encode_any_partition, encode_partition_key, partition_key_size,
    DatagramEncoder, Limits,
};
pub use message::{
    datagram_checksum, Addressing, Adler32, Datagram, Message, ANY_PARTITION_API_KEY,
    ANY_PARTITION_FIXED_SIZE, API_VERSION, CHECKSUM_OFFSET, HEADER_SIZE, MAX_DATAGRAM_SIZE,
    MAX_TOPIC_SIZE, PARTITION_KEY_API_KEY, PARTITION_KEY_FIXED_SIZE, ZERO_SUM_CHECKSUM,
};
