//! Solver-side frame server
//!
//! Serves the latest published payload to one viewer at a time, answering the
//! command bytes the viewer's channel sends.

use crate::protocol::{self, Command, PayloadUnit, DEFAULT_HEADER_LEN};
use crate::types::GridDimensions;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors that can occur while serving frames
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Frame server has shut down")]
    Closed,
}

/// Configuration for the frame server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How the frame header measures the payload
    pub payload_unit: PayloadUnit,
    /// Fixed length of the frame header
    pub header_len: usize,
    /// Largest single write of payload bytes
    pub chunk_size: usize,
    /// Status byte placed in frame headers
    pub status: u8,
    /// TCP no-delay setting
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            payload_unit: PayloadUnit::Bytes,
            header_len: DEFAULT_HEADER_LEN,
            chunk_size: 10 * 1024,
            status: 0,
            tcp_nodelay: true,
        }
    }
}

/// Handle used to publish new payloads to a running server
#[derive(Clone)]
pub struct FramePublisher {
    tx: Sender<Vec<u8>>,
    /// Used to drop payloads the server never picked up
    stale: Receiver<Vec<u8>>,
    /// Disconnects when the server is dropped
    server_alive: Receiver<()>,
}

impl FramePublisher {
    /// Replace the payload served to subsequent polls
    pub fn publish(&self, payload: Vec<u8>) -> Result<(), ServeError> {
        if let Err(TryRecvError::Disconnected) = self.server_alive.try_recv() {
            return Err(ServeError::Closed);
        }
        while self.stale.try_recv().is_ok() {}
        self.tx.send(payload).map_err(|_| ServeError::Closed)
    }
}

/// Statistics about one served session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Handshakes answered
    pub handshakes: u64,
    /// Frames sent
    pub frames_served: u64,
    /// Whether the viewer sent a disconnect notice
    pub disconnect_notice: bool,
}

/// TCP server speaking the solver half of the protocol
pub struct FrameServer {
    listener: TcpListener,
    config: ServerConfig,
    dimensions: GridDimensions,
    payload: Vec<u8>,
    updates: Receiver<Vec<u8>>,
    sequence: u8,
    _alive: Sender<()>,
}

impl FrameServer {
    /// Bind a frame server for a grid of the given dimensions
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        dimensions: GridDimensions,
    ) -> Result<(Self, FramePublisher), ServeError> {
        Self::bind_with_config(addr, dimensions, ServerConfig::default())
    }

    /// Bind a frame server with custom configuration
    pub fn bind_with_config<A: ToSocketAddrs>(
        addr: A,
        dimensions: GridDimensions,
        config: ServerConfig,
    ) -> Result<(Self, FramePublisher), ServeError> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| ServeError::Bind(format!("Failed to bind: {e}")))?;

        info!(
            "Frame server listening on {} for grid {}",
            listener.local_addr()?,
            dimensions
        );

        let (tx, rx) = unbounded();
        let (alive_tx, alive_rx) = bounded(0);
        let publisher = FramePublisher {
            tx,
            stale: rx.clone(),
            server_alive: alive_rx,
        };
        let server = Self {
            listener,
            config,
            dimensions,
            payload: Vec::new(),
            updates: rx,
            sequence: 0,
            _alive: alive_tx,
        };
        Ok((server, publisher))
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one viewer and answer its commands until it leaves
    pub fn serve_one(&mut self) -> Result<SessionStats, ServeError> {
        let (mut stream, addr) = self.listener.accept()?;
        info!("Accepted viewer {}", addr);
        stream.set_nodelay(self.config.tcp_nodelay)?;

        let stats = self.serve_stream(&mut stream)?;
        info!(
            "Viewer {} left after {} frames",
            addr, stats.frames_served
        );
        Ok(stats)
    }

    fn serve_stream(&mut self, stream: &mut TcpStream) -> Result<SessionStats, ServeError> {
        let mut stats = SessionStats::default();
        let mut command = [0u8; 1];

        loop {
            match stream.read(&mut command) {
                Ok(0) => {
                    debug!("Viewer closed the connection");
                    return Ok(stats);
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            match Command::from_u8(command[0]) {
                Some(Command::Handshake) => {
                    trace!("Handshake requested");
                    let sequence = self.next_sequence();
                    let response = protocol::encode_handshake(sequence, self.dimensions);
                    stream.write_all(&response)?;
                    stats.handshakes += 1;
                }
                Some(Command::Poll) => {
                    self.take_latest();
                    self.send_frame(stream)?;
                    stats.frames_served += 1;
                }
                Some(Command::Disconnect) => {
                    debug!("Viewer sent disconnect notice");
                    stats.disconnect_notice = true;
                    return Ok(stats);
                }
                None => warn!("Unhandled command byte: {}", command[0]),
            }
        }
    }

    fn send_frame(&mut self, stream: &mut TcpStream) -> Result<(), ServeError> {
        let declared = self.config.payload_unit.declared_len(self.payload.len());
        let header = protocol::encode_frame_header(
            self.config.status,
            self.next_sequence(),
            declared,
            self.config.header_len,
        );
        stream.write_all(&header)?;

        for chunk in self.payload.chunks(self.config.chunk_size.max(1)) {
            stream.write_all(chunk)?;
        }
        stream.flush()?;

        trace!("Sent frame of {} bytes", self.payload.len());
        Ok(())
    }

    fn take_latest(&mut self) {
        while let Ok(payload) = self.updates.try_recv() {
            self.payload = payload;
        }
    }

    fn next_sequence(&mut self) -> u8 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Serve viewers one after another on a background thread.
    ///
    /// The thread exits on the first accept or IO error.
    pub fn spawn(mut self) -> thread::JoinHandle<()> {
        thread::spawn(move || loop {
            if let Err(e) = self.serve_one() {
                warn!("Frame server stopped: {}", e);
                break;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(config.header_len, DEFAULT_HEADER_LEN);
        assert_eq!(config.chunk_size, 10 * 1024);
    }

    #[test]
    fn test_server_bind() {
        let (server, _publisher) =
            FrameServer::bind("127.0.0.1:0", GridDimensions::new(2, 2, 2)).unwrap();
        assert!(server.local_addr().is_ok());
    }

    #[test]
    fn test_publish_after_shutdown_fails() {
        let (server, publisher) =
            FrameServer::bind("127.0.0.1:0", GridDimensions::new(1, 1, 1)).unwrap();
        drop(server);
        assert!(matches!(
            publisher.publish(vec![0; 4]),
            Err(ServeError::Closed)
        ));
    }

    #[test]
    fn test_raw_session() {
        let (mut server, publisher) =
            FrameServer::bind("127.0.0.1:0", GridDimensions::new(4, 3, 2)).unwrap();
        let addr = server.local_addr().unwrap();
        publisher.publish(protocol::encode_f32s(&[0.5; 24])).unwrap();

        let handle = thread::spawn(move || server.serve_one());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&[Command::Handshake.as_byte()]).unwrap();
        let mut handshake = [0u8; 6];
        stream.read_exact(&mut handshake).unwrap();
        assert_eq!(&handshake[3..], &[4, 3, 2]);

        stream.write_all(&[Command::Poll.as_byte()]).unwrap();
        let mut header = vec![0u8; DEFAULT_HEADER_LEN];
        stream.read_exact(&mut header).unwrap();
        let header = protocol::parse_frame_header(&header).unwrap();
        assert_eq!(header.declared_len, 96);
        assert_eq!(header.sequence, 1);

        let mut payload = vec![0u8; 96];
        stream.read_exact(&mut payload).unwrap();
        assert_eq!(protocol::decode_f32s(&payload), vec![0.5; 24]);

        stream.write_all(&[Command::Disconnect.as_byte()]).unwrap();
        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.handshakes, 1);
        assert_eq!(stats.frames_served, 1);
        assert!(stats.disconnect_notice);
    }
}
