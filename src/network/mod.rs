//! Network Layer: getting datagrams to (and, for testing, from) the daemon
//!
//! - Senders: UNIX datagram, UNIX stream, local TCP. Blocking, one send per datagram.
//! - Sink: mio event loop that receives and validates datagrams like the daemon.
//!
//! The encoder never touches any of this; it only produces bytes.

#[cfg(unix)]
mod connection;
mod sender;
#[cfg(unix)]
mod server;

#[cfg(unix)]
pub use connection::Connection;
pub use sender::{Sender, TcpSender};
#[cfg(unix)]
pub use sender::{max_socket_path_len, UnixDgSender, UnixStreamSender};
#[cfg(unix)]
pub use server::{Received, Sink, SinkStats};
