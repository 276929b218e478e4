//! Sink: a local stand-in for the daemon's input side.
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing: one UNIX datagram
//! socket plus an optional UNIX stream listener, every received unit parsed
//! with [`DatagramView::parse`]. Invalid datagrams are dropped with a warning,
//! the way the daemon does.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mio::net::{UnixDatagram, UnixListener, UnixStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use super::Connection;
use crate::error::DecodeError;
use crate::protocol::{DatagramView, Decoder, MAX_DATAGRAM_SIZE};

const DATAGRAM_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;
const EVENTS_CAPACITY: usize = 256;

/// Sink counters
#[derive(Debug, Default)]
pub struct SinkStats {
    pub datagrams_accepted: AtomicU64,
    pub datagrams_rejected: AtomicU64,
    pub bytes_received: AtomicU64,
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

impl SinkStats {
    pub fn log(&self, uptime: Duration) {
        let accepted = self.datagrams_accepted.load(Ordering::Relaxed);
        let rejected = self.datagrams_rejected.load(Ordering::Relaxed);
        info!(
            uptime_secs = uptime.as_secs_f64(),
            accepted,
            rejected,
            rate = accepted as f64 / uptime.as_secs_f64().max(f64::EPSILON),
            kib_in = self.bytes_received.load(Ordering::Relaxed) / 1024,
            connections = self.connections_active.load(Ordering::Relaxed),
            "sink stats"
        );
    }
}

/// Owned copy of a received datagram's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub topic: String,
    pub timestamp: u64,
    pub partition_key: Option<u32>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl<'a> From<DatagramView<'a>> for Received {
    fn from(view: DatagramView<'a>) -> Self {
        Self {
            topic: view.topic.to_owned(),
            timestamp: view.timestamp,
            partition_key: view.partition_key(),
            key: view.key.to_vec(),
            value: view.value.to_vec(),
        }
    }
}

pub struct Sink {
    poll: Poll,
    datagram_socket: UnixDatagram,
    datagram_path: PathBuf,
    listener: Option<(UnixListener, PathBuf)>,
    connections: HashMap<Token, Connection<UnixStream>>,
    next_token: usize,
    recv_buffer: Box<[u8]>,
    stats: SinkStats,
}

impl Sink {
    /// Bind the datagram socket and, if given, a stream listener.
    ///
    /// Stale socket files at either path are removed first.
    pub fn bind(datagram_path: impl AsRef<Path>, stream_path: Option<&Path>) -> io::Result<Self> {
        let poll = Poll::new()?;

        let datagram_path = datagram_path.as_ref().to_path_buf();
        remove_stale(&datagram_path)?;
        let mut datagram_socket = UnixDatagram::bind(&datagram_path)?;

        // The socket file exists from here on; Drop only runs once Self is built.
        let listener = register_and_listen(&poll, &mut datagram_socket, stream_path).map_err(|e| {
            let _ = std::fs::remove_file(&datagram_path);
            e
        })?;

        info!(path = %datagram_path.display(), "sink listening (datagram)");
        if let Some((_, path)) = &listener {
            info!(path = %path.display(), "sink listening (stream)");
        }

        Ok(Self {
            poll,
            datagram_socket,
            datagram_path,
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            // One byte extra so an oversized datagram shows up as a size mismatch.
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE + 1].into_boxed_slice(),
            stats: SinkStats::default(),
        })
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    /// Wait up to `timeout` for activity and handle it.
    ///
    /// `on_datagram` sees every valid datagram. Returns how many were accepted.
    pub fn poll_once<F>(&mut self, timeout: Option<Duration>, mut on_datagram: F) -> io::Result<usize>
    where
        F: FnMut(DatagramView<'_>),
    {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        match self.poll.poll(&mut events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e),
        }

        let mut accepted = 0;
        for event in events.iter() {
            match event.token() {
                DATAGRAM_TOKEN => accepted += self.drain_datagrams(&mut on_datagram)?,
                LISTENER_TOKEN => self.accept_connections()?,
                token => accepted += self.read_connection(token, &mut on_datagram),
            }
        }
        Ok(accepted)
    }

    fn drain_datagrams<F>(&mut self, on_datagram: &mut F) -> io::Result<usize>
    where
        F: FnMut(DatagramView<'_>),
    {
        let mut accepted = 0;
        loop {
            let n = match self.datagram_socket.recv(&mut self.recv_buffer) {
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            };
            self.stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);

            match DatagramView::parse(&self.recv_buffer[..n]) {
                Ok(view) => {
                    debug!(topic = view.topic, size = n, "accepted datagram");
                    self.stats.datagrams_accepted.fetch_add(1, Ordering::Relaxed);
                    on_datagram(view);
                    accepted += 1;
                }
                Err(e) => reject(&self.stats, n, &e),
            }
        }
        Ok(accepted)
    }

    fn accept_connections(&mut self) -> io::Result<()> {
        let Some((listener, _)) = self.listener.as_mut() else {
            return Ok(());
        };

        loop {
            match listener.accept() {
                Ok((mut stream, _addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)?;
                    self.connections.insert(token, Connection::new(stream));
                    self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                    debug!(client = token.0, "stream client connected");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn read_connection<F>(&mut self, token: Token, on_datagram: &mut F) -> usize
    where
        F: FnMut(DatagramView<'_>),
    {
        let Some(conn) = self.connections.get_mut(&token) else {
            return 0;
        };

        let mut accepted = 0;
        let mut closed = false;
        // Edge-triggered: read until WouldBlock or EOF.
        loop {
            let before = conn.readable().len();
            match conn.fill_read_buffer() {
                Ok(n) if n == before => break,
                Ok(_) => {}
                Err(e) => {
                    if e.kind() != io::ErrorKind::ConnectionReset {
                        warn!(client = token.0, error = %e, "stream read failed");
                    }
                    closed = true;
                    break;
                }
            }

            let mut decoder = Decoder::new(conn.readable());
            let mut complete = 0u64;
            let mut frame_start = 0;
            while let Some(res) = decoder.next() {
                complete += 1;
                let frame = decoder.consumed() - frame_start;
                frame_start = decoder.consumed();
                self.stats.bytes_received.fetch_add(frame as u64, Ordering::Relaxed);

                match res {
                    Ok(view) => {
                        debug!(client = token.0, topic = view.topic, size = frame, "accepted datagram");
                        self.stats.datagrams_accepted.fetch_add(1, Ordering::Relaxed);
                        on_datagram(view);
                        accepted += 1;
                    }
                    Err(e) => reject(&self.stats, frame, &e),
                }
            }
            let consumed = decoder.consumed();
            conn.consume(consumed, complete);
        }

        if closed {
            if let Some(mut conn) = self.connections.remove(&token) {
                let _ = self.poll.registry().deregister(conn.stream_mut());
                debug!(
                    client = token.0,
                    datagrams = conn.datagrams_received(),
                    "stream client disconnected"
                );
            }
            self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        }

        accepted
    }
}

fn register_and_listen(
    poll: &Poll,
    datagram_socket: &mut UnixDatagram,
    stream_path: Option<&Path>,
) -> io::Result<Option<(UnixListener, PathBuf)>> {
    poll.registry()
        .register(datagram_socket, DATAGRAM_TOKEN, Interest::READABLE)?;

    let Some(path) = stream_path else {
        return Ok(None);
    };
    remove_stale(path)?;
    let mut listener = UnixListener::bind(path)?;
    if let Err(e) = poll
        .registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
    {
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(Some((listener, path.to_path_buf())))
}

impl Drop for Sink {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.datagram_path);
        if let Some((_, path)) = &self.listener {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn reject(stats: &SinkStats, size: usize, err: &DecodeError) {
    stats.datagrams_rejected.fetch_add(1, Ordering::Relaxed);
    warn!(size, error = %err, "dropping invalid datagram");
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
