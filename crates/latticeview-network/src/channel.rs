//! Polling channel that pulls lattice frames from a solver
//!
//! One [`Channel`] exists per logical stream (velocity, density, or a
//! combined Vec4 stream). The host calls [`Channel::poll`] once per tick. A
//! frame is either decoded and handed to the apply callback in full, or the
//! attempt is abandoned and the target is left untouched.

use crate::protocol::{
    self, Command, Decoder, PayloadUnit, ProtocolError, DEFAULT_HEADER_LEN,
    DEFAULT_MAX_PAYLOAD_SIZE, HANDSHAKE_LEN,
};
use crate::transport::{TcpTransport, Transport};
use crate::types::GridDimensions;

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Error type returned by apply callbacks
pub type ApplyError = Box<dyn std::error::Error + Send + Sync>;

/// Callback that installs a decoded frame into its target
pub type ApplyFn<T, S> = Box<dyn FnMut(&mut S, Vec<T>, GridDimensions) -> Result<(), ApplyError>>;

/// Connection state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Configuration for a polling channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Solver host, loopback by default
    pub host: IpAddr,
    /// Solver port
    pub port: u16,
    /// How the frame header measures the payload
    pub payload_unit: PayloadUnit,
    /// Fixed length of the frame header on the wire
    pub header_len: usize,
    /// Consecutive empty receives tolerated while accumulating bytes
    pub retry_budget: u32,
    /// Readiness wait between empty receives
    pub retry_interval: Duration,
    /// Bound on the wait for the first response byte
    pub header_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Option<Duration>,
    /// Maximum payload size in bytes
    pub max_payload_size: usize,
    /// TCP no-delay setting
    pub tcp_nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4000,
            payload_unit: PayloadUnit::Bytes,
            header_len: DEFAULT_HEADER_LEN,
            retry_budget: 1000,
            retry_interval: Duration::from_millis(1),
            header_timeout: Duration::from_secs(2),
            connect_timeout: Some(Duration::from_secs(1)),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl ChannelConfig {
    /// Default configuration for a loopback port
    pub fn loopback(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Set the payload unit
    pub fn with_payload_unit(mut self, unit: PayloadUnit) -> Self {
        self.payload_unit = unit;
        self
    }

    /// Set the retry budget
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Set the bounded header wait
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Socket address of the solver endpoint
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Why a poll attempt was abandoned
#[derive(Debug)]
pub enum AbortReason {
    /// Nothing arrived within the header timeout
    HeaderTimeout,
    /// The retry budget ran out before the declared bytes arrived
    RetryBudgetExhausted { received: usize, expected: usize },
    /// The header could not be parsed or declared an unusable length
    Protocol(ProtocolError),
    /// Socket-level failure
    Io(io::Error),
    /// The apply callback refused the decoded frame
    Rejected(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTimeout => write!(f, "no response within header timeout"),
            Self::RetryBudgetExhausted { received, expected } => {
                write!(f, "retry budget exhausted after {received} of {expected} bytes")
            }
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Rejected(e) => write!(f, "frame rejected: {e}"),
        }
    }
}

/// Result of a single [`Channel::poll`]
#[derive(Debug)]
pub enum PollOutcome {
    /// A full frame was decoded and applied
    Applied { elements: usize, sequence: u8 },
    /// The channel has no connection
    NotConnected,
    /// The attempt was abandoned; the target is unchanged
    Aborted(AbortReason),
}

impl PollOutcome {
    /// Whether a frame was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Result of [`Channel::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Handshake completed with these dimensions
    Connected(GridDimensions),
    /// The channel was already connected
    AlreadyConnected,
    /// Connecting failed; call `connect` again later
    Failed,
}

/// Statistics about polled data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Number of frames applied
    pub frames_applied: u64,
    /// Number of poll attempts abandoned
    pub attempts_aborted: u64,
    /// Total bytes received, headers included
    pub bytes_received: u64,
}

/// Polling client for one solver stream.
///
/// `T` is the decoded element type and `S` the target the apply callback
/// mutates.
pub struct Channel<T, S> {
    name: String,
    config: ChannelConfig,
    state: ChannelState,
    transport: Option<Box<dyn Transport>>,
    dimensions: GridDimensions,
    last_sequence: Option<u8>,
    stale: bool,
    decode: Decoder<T>,
    apply: ApplyFn<T, S>,
    stats: ChannelStats,
}

impl<T, S> Channel<T, S> {
    /// Create a disconnected channel
    pub fn new(
        name: impl Into<String>,
        config: ChannelConfig,
        decode: Decoder<T>,
        apply: impl FnMut(&mut S, Vec<T>, GridDimensions) -> Result<(), ApplyError> + 'static,
    ) -> Self {
        let name = name.into();
        info!("Channel '{}' targets {}", name, config.endpoint());
        Self {
            name,
            config,
            state: ChannelState::Disconnected,
            transport: None,
            dimensions: GridDimensions::default(),
            last_sequence: None,
            stale: false,
            decode,
            apply: Box::new(apply),
            stats: ChannelStats::default(),
        }
    }

    /// Channel name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current connection state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether the handshake has completed
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// Dimensions reported by the last handshake
    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    /// Sequence byte of the last applied frame
    pub fn last_sequence(&self) -> Option<u8> {
        self.last_sequence
    }

    /// The channel configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Get statistics about polled data
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Open a TCP connection to the configured endpoint and handshake.
    ///
    /// Failures are logged and reported as [`ConnectOutcome::Failed`]; the
    /// channel stays disconnected and nothing is retried internally.
    pub fn connect(&mut self) -> ConnectOutcome {
        if self.is_connected() {
            return ConnectOutcome::AlreadyConnected;
        }

        self.state = ChannelState::Connecting;
        let endpoint = self.config.endpoint();
        match TcpTransport::connect(endpoint, self.config.connect_timeout, self.config.tcp_nodelay)
        {
            Ok(transport) => self.attach(Box::new(transport)),
            Err(e) => {
                debug!("Channel '{}' could not connect to {}: {}", self.name, endpoint, e);
                self.state = ChannelState::Disconnected;
                ConnectOutcome::Failed
            }
        }
    }

    /// Handshake over an already open transport.
    pub fn attach(&mut self, mut transport: Box<dyn Transport>) -> ConnectOutcome {
        if self.is_connected() {
            return ConnectOutcome::AlreadyConnected;
        }

        self.state = ChannelState::Connecting;
        match handshake(transport.as_mut(), &self.config) {
            Ok(dims) => {
                info!("Channel '{}' connected, grid {}", self.name, dims);
                self.dimensions = dims;
                self.transport = Some(transport);
                self.stale = false;
                self.state = ChannelState::Connected;
                self.stats.bytes_received += HANDSHAKE_LEN as u64;
                ConnectOutcome::Connected(dims)
            }
            Err(reason) => {
                debug!("Channel '{}' handshake failed: {}", self.name, reason);
                let _ = transport.shutdown();
                self.state = ChannelState::Disconnected;
                ConnectOutcome::Failed
            }
        }
    }

    /// Request the current frame and apply it to `target`.
    ///
    /// Blocks for at most the header timeout plus the retry budget. An
    /// abandoned attempt leaves `target` exactly as it was.
    pub fn poll(&mut self, target: &mut S) -> PollOutcome {
        if !self.is_connected() {
            return PollOutcome::NotConnected;
        }

        match self.poll_inner(target) {
            Ok((elements, sequence)) => {
                self.stats.frames_applied += 1;
                self.last_sequence = Some(sequence);
                trace!(
                    "Channel '{}' applied frame seq={} ({} elements)",
                    self.name,
                    sequence,
                    elements
                );
                PollOutcome::Applied { elements, sequence }
            }
            Err(reason) => {
                self.stats.attempts_aborted += 1;
                self.handle_abort(&reason);
                PollOutcome::Aborted(reason)
            }
        }
    }

    fn poll_inner(&mut self, target: &mut S) -> Result<(usize, u8), AbortReason> {
        let transport = match self.transport.as_deref_mut() {
            Some(transport) => transport,
            None => return Err(AbortReason::Io(io::ErrorKind::NotConnected.into())),
        };

        if self.stale {
            let dropped = drain(transport).map_err(AbortReason::Io)?;
            if dropped > 0 {
                debug!("Channel '{}' discarded {} stale bytes", self.name, dropped);
            }
            self.stale = false;
        }

        transport
            .send(&[Command::Poll.as_byte()])
            .map_err(AbortReason::Io)?;

        if !transport
            .wait_readable(self.config.header_timeout)
            .map_err(AbortReason::Io)?
        {
            return Err(AbortReason::HeaderTimeout);
        }

        let header_bytes = accumulate(transport, self.config.header_len, &self.config)?;
        self.stats.bytes_received += header_bytes.len() as u64;
        let header = protocol::parse_frame_header(&header_bytes).map_err(AbortReason::Protocol)?;

        let byte_len = self
            .config
            .payload_unit
            .byte_len(header.declared_len)
            .map_err(AbortReason::Protocol)?;
        if byte_len > self.config.max_payload_size {
            return Err(AbortReason::Protocol(ProtocolError::PayloadTooLarge {
                size: byte_len,
                max_size: self.config.max_payload_size,
            }));
        }

        let payload = accumulate(transport, byte_len, &self.config)?;
        self.stats.bytes_received += payload.len() as u64;

        let data = (self.decode)(&payload);
        let elements = data.len();
        (self.apply)(target, data, self.dimensions)
            .map_err(|e| AbortReason::Rejected(e.to_string()))?;

        Ok((elements, header.sequence))
    }

    fn handle_abort(&mut self, reason: &AbortReason) {
        match reason {
            AbortReason::Io(e) if is_disconnect(e) => {
                warn!("Channel '{}' lost its connection: {}", self.name, e);
                if let Some(mut transport) = self.transport.take() {
                    let _ = transport.shutdown();
                }
                self.state = ChannelState::Disconnected;
            }
            AbortReason::Rejected(_) => {
                warn!("Channel '{}' poll aborted: {}", self.name, reason);
            }
            _ => {
                debug!("Channel '{}' poll aborted: {}", self.name, reason);
                // Unread bytes of this response may still arrive
                self.stale = true;
            }
        }
    }

    /// Tell the solver this viewer is leaving and release the connection.
    pub fn close(&mut self) {
        if !self.is_connected() {
            debug!("Channel '{}' close ignored, not connected", self.name);
            return;
        }

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.send(&[Command::Disconnect.as_byte()]) {
                debug!("Channel '{}' disconnect notice failed: {}", self.name, e);
            }
            let _ = transport.shutdown();
        }

        self.state = ChannelState::Disconnected;
        info!(
            "Channel '{}' closed. Applied {} frames, {} bytes",
            self.name, self.stats.frames_applied, self.stats.bytes_received
        );
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

fn handshake(
    transport: &mut dyn Transport,
    config: &ChannelConfig,
) -> Result<GridDimensions, AbortReason> {
    transport
        .send(&[Command::Handshake.as_byte()])
        .map_err(AbortReason::Io)?;

    if !transport
        .wait_readable(config.header_timeout)
        .map_err(AbortReason::Io)?
    {
        return Err(AbortReason::HeaderTimeout);
    }

    let response = accumulate(transport, HANDSHAKE_LEN, config)?;
    let response = protocol::parse_handshake(&response).map_err(AbortReason::Protocol)?;
    Ok(response.dimensions)
}

/// Receive exactly `expected` bytes, tolerating at most `retry_budget`
/// consecutive empty receives.
fn accumulate(
    transport: &mut dyn Transport,
    expected: usize,
    config: &ChannelConfig,
) -> Result<Vec<u8>, AbortReason> {
    let mut buf = vec![0u8; expected];
    let mut filled = 0;
    let mut idle = 0u32;

    while filled < expected {
        let n = transport
            .recv_available(&mut buf[filled..])
            .map_err(AbortReason::Io)?;

        if n > 0 {
            filled += n;
            idle = 0;
            continue;
        }

        idle += 1;
        if idle > config.retry_budget {
            return Err(AbortReason::RetryBudgetExhausted {
                received: filled,
                expected,
            });
        }
        transport
            .wait_readable(config.retry_interval)
            .map_err(AbortReason::Io)?;
    }

    Ok(buf)
}

/// Discard everything currently readable
fn drain(transport: &mut dyn Transport) -> io::Result<usize> {
    let mut scratch = [0u8; 4096];
    let mut dropped = 0;
    loop {
        let n = transport.recv_available(&mut scratch)?;
        if n == 0 {
            return Ok(dropped);
        }
        dropped += n;
    }
}
