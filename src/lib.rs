//! Dory Client - producer side of the Dory datagram protocol
//!
//! Arsitektur:
//! - Pure encoder: validate, size, allocate once, write, checksum
//! - Reference decoder: what the daemon checks on every receive
//! - Network: UNIX datagram, UNIX stream and local TCP senders
//!
//! ```
//! use dory_client::protocol::{encode_any_partition, DatagramView};
//!
//! let dg = encode_any_partition("orders", 1_700_000_000_000, None, b"hello world").unwrap();
//! let view = DatagramView::parse(dg.as_bytes()).unwrap();
//! assert_eq!(view.topic, "orders");
//! assert_eq!(view.value, b"hello world");
//! ```

pub mod error;
pub mod network;
pub mod protocol;

pub use error::{DecodeError, EncodeError, SendError};
pub use protocol::{Addressing, Datagram, DatagramEncoder, DatagramView, Limits, Message};
