//! Byte transports underneath a channel
//!
//! A [`Transport`] only has to report readiness within a bounded wait and hand
//! back whatever bytes are currently available. [`TcpTransport`] is the
//! production implementation; tests drive channels with scripted transports.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// Connection-oriented, ordered byte stream used by a channel.
pub trait Transport {
    /// Send all of `bytes`
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Wait at most `timeout` for at least one byte to become readable.
    ///
    /// Returns `Ok(false)` when the wait elapsed without data.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Receive whatever is available right now without blocking.
    ///
    /// Returns `Ok(0)` when nothing is pending. A closed peer is reported as
    /// an `UnexpectedEof` error.
    fn recv_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the connection
    fn shutdown(&mut self) -> io::Result<()>;
}

/// TCP implementation of [`Transport`]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `addr`, optionally bounding the connect call.
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Option<Duration>,
        tcp_nodelay: bool,
    ) -> io::Result<Self> {
        let stream = match connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(tcp_nodelay)?;
        debug!("Connected to {}", addr);
        Ok(Self { stream })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Address of the remote end
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

fn closed_by_peer() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        // A zero read timeout is rejected by the OS
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_nonblocking(false)?;
        self.stream.set_read_timeout(Some(timeout))?;

        let mut probe = [0u8; 1];
        let result = self.stream.peek(&mut probe);
        self.stream.set_read_timeout(None)?;

        match result {
            Ok(0) => Err(closed_by_peer()),
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                trace!("No data within {:?}", timeout);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn recv_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.stream.set_nonblocking(true)?;
        let result = self.stream.read(buf);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(0) => Err(closed_by_peer()),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}
