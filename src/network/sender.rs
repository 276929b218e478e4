//! Senders: hand a finished datagram to the daemon.
//!
//! Satu datagram = satu send. Retry bukan urusan sender; error dikembalikan ke caller.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixDatagram, UnixStream};
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SendError;
use crate::protocol::Datagram;

/// Transport to the daemon's well-known endpoint.
pub trait Sender {
    /// Send one complete datagram.
    fn send(&mut self, datagram: &Datagram) -> Result<(), SendError>;

    /// Send raw bytes unchanged. Used to inject malformed datagrams in tests.
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SendError>;
}

/// Capacity of `sockaddr_un.sun_path`, minus the trailing NUL.
#[cfg(unix)]
pub fn max_socket_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len() - 1
}

#[cfg(unix)]
fn check_socket_path(path: &Path) -> Result<(), SendError> {
    use std::os::unix::ffi::OsStrExt;

    if path.as_os_str().as_bytes().len() > max_socket_path_len() {
        return Err(SendError::PathTooLong(path.to_path_buf()));
    }
    Ok(())
}

/// UNIX domain datagram socket sender.
#[cfg(unix)]
pub struct UnixDgSender {
    socket: UnixDatagram,
    path: PathBuf,
}

#[cfg(unix)]
impl UnixDgSender {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, SendError> {
        let path = path.as_ref();
        check_socket_path(path)?;

        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        debug!(path = %path.display(), "connected unix datagram socket");

        Ok(Self {
            socket,
            path: path.to_path_buf(),
        })
    }

    /// Raise `SO_SNDBUF` so large datagrams are not refused by the kernel.
    pub fn set_send_buffer(&self, bytes: usize) -> Result<(), SendError> {
        use std::os::unix::io::AsRawFd;

        let optval = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);
        // SAFETY: fd is owned by self.socket and optval outlives the call.
        let ret = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_SNDBUF,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl Sender for UnixDgSender {
    fn send(&mut self, datagram: &Datagram) -> Result<(), SendError> {
        self.send_bytes(datagram.as_bytes())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        let written = self.socket.send(bytes)?;
        if written != bytes.len() {
            return Err(SendError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }
}

/// UNIX domain stream socket sender. Datagrams are framed by their size field.
#[cfg(unix)]
pub struct UnixStreamSender {
    stream: UnixStream,
}

#[cfg(unix)]
impl UnixStreamSender {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, SendError> {
        let path = path.as_ref();
        check_socket_path(path)?;

        let stream = UnixStream::connect(path)?;
        debug!(path = %path.display(), "connected unix stream socket");
        Ok(Self { stream })
    }
}

#[cfg(unix)]
impl Sender for UnixStreamSender {
    fn send(&mut self, datagram: &Datagram) -> Result<(), SendError> {
        self.send_bytes(datagram.as_bytes())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }
}

/// Local TCP sender (127.0.0.1 only).
pub struct TcpSender {
    stream: TcpStream,
}

impl TcpSender {
    pub fn connect(port: u16) -> Result<Self, SendError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let stream = TcpStream::connect(addr)?;
        // Satu datagram per write; jangan ditahan Nagle.
        stream.set_nodelay(true)?;
        debug!(%addr, "connected tcp socket");
        Ok(Self { stream })
    }
}

impl Sender for TcpSender {
    fn send(&mut self, datagram: &Datagram) -> Result<(), SendError> {
        self.send_bytes(datagram.as_bytes())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_path_too_long_rejected_before_connect() {
        let long = PathBuf::from(format!("/tmp/{}", "x".repeat(max_socket_path_len())));
        assert!(matches!(
            UnixDgSender::connect(&long),
            Err(SendError::PathTooLong(p)) if p == long
        ));
        assert!(matches!(
            UnixStreamSender::connect(&long),
            Err(SendError::PathTooLong(_))
        ));
    }

    #[test]
    fn test_missing_socket_is_io_error() {
        let path = std::env::temp_dir().join(format!("dory_missing_{}.sock", std::process::id()));
        assert!(matches!(UnixDgSender::connect(&path), Err(SendError::Io(_))));
    }
}
