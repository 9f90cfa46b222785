//! Network library for streaming lattice snapshots from a fluid solver
//!
//! This crate implements the binary polling protocol spoken between a solver
//! process and the viewer: a stateless frame codec, a polling [`Channel`] that
//! accumulates frames under a bounded retry budget and hands them to an
//! injected apply callback, and a [`FrameServer`] for the solver side.

pub mod channel;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use channel::{
    AbortReason, ApplyError, Channel, ChannelConfig, ChannelState, ChannelStats, ConnectOutcome,
    PollOutcome,
};
pub use protocol::{Command, Decoder, PayloadUnit, ProtocolError};
pub use server::{FramePublisher, FrameServer, ServeError, ServerConfig, SessionStats};
pub use transport::{TcpTransport, Transport};
pub use types::{FrameHeader, GridDimensions, HandshakeResponse};
