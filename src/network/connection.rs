//! Stream connection dengan buffered reads
//!
//! Stream sockets carry datagrams back to back; this buffers partial
//! reads until a whole datagram (by its size field) is available.

use std::io::{self, Read};

use crate::protocol::MAX_DATAGRAM_SIZE;

/// Room for two maximum-size datagrams so one partial never blocks a whole one.
const READ_BUFFER_SIZE: usize = 2 * MAX_DATAGRAM_SIZE;

/// Buffered reader side of one accepted stream client.
pub struct Connection<S> {
    stream: S,
    read_buffer: Box<[u8]>,
    read_pos: usize,
    read_len: usize,
    datagrams_received: u64,
}

impl<S: Read> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            read_pos: 0,
            read_len: 0,
            datagrams_received: 0,
        }
    }

    /// Read from the socket into the internal buffer.
    ///
    /// Returns bytes now readable. `ConnectionReset` signals EOF.
    pub fn fill_read_buffer(&mut self) -> io::Result<usize> {
        // Compact buffer jika perlu
        if self.read_pos > 0 {
            let remaining = self.read_len - self.read_pos;
            if remaining > 0 {
                self.read_buffer.copy_within(self.read_pos..self.read_len, 0);
            }
            self.read_len = remaining;
            self.read_pos = 0;
        }

        if self.read_len == self.read_buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "read buffer full without a complete datagram",
            ));
        }

        match self.stream.read(&mut self.read_buffer[self.read_len..]) {
            Ok(0) => Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection closed")),
            Ok(n) => {
                self.read_len += n;
                Ok(self.read_len)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(self.read_len - self.read_pos),
            Err(e) => Err(e),
        }
    }

    /// Readable data slice (zero-copy)
    #[inline(always)]
    pub fn readable(&self) -> &[u8] {
        &self.read_buffer[self.read_pos..self.read_len]
    }

    /// Consume `n` bytes that formed `datagrams` complete datagrams.
    #[inline(always)]
    pub fn consume(&mut self, n: usize, datagrams: u64) {
        self.read_pos += n.min(self.read_len - self.read_pos);
        self.datagrams_received += datagrams;
    }

    pub fn datagrams_received(&self) -> u64 {
        self.datagrams_received
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_any_partition, Decoder};
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_reassembles_split_datagrams() {
        let a = encode_any_partition("t", 1, None, b"one").unwrap();
        let b = encode_any_partition("t", 2, None, b"two").unwrap();
        let mut bytes = a.as_bytes().to_vec();
        bytes.extend_from_slice(b.as_bytes());

        let mut conn = Connection::new(Trickle {
            inner: Cursor::new(bytes),
            chunk: 7,
        });

        let mut values = Vec::new();
        loop {
            match conn.fill_read_buffer() {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
            let mut decoder = Decoder::new(conn.readable());
            let mut count = 0;
            while let Some(res) = decoder.next() {
                values.push(res.unwrap().value.to_vec());
                count += 1;
            }
            let consumed = decoder.consumed();
            conn.consume(consumed, count);
        }

        assert_eq!(values, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(conn.datagrams_received(), 2);
    }
}
