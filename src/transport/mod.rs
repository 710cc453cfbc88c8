//! Transport seam between the engine and the wire.
//!
//! The engine never touches sockets directly: a [`Connector`] strategy turns
//! a [`ConnectionConfig`](crate::config::ConnectionConfig) into an
//! established [`Transport`], split into reader and writer halves so the
//! dedicated reader task and concurrent senders can work independently.
//! TLS and stream compression are negotiated (or not) by the connector and
//! reported through [`TransportInfo`].

mod codec;
pub mod memory;
mod tcp;

pub use codec::{StanzaCodec, MAX_FRAME_SIZE};
pub use memory::{MockConnector, MockServerConfig};
pub use tcp::TcpConnector;

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::packet::Packet;

/// Capabilities and peer identity of an established transport.
#[derive(Debug, Clone)]
pub struct TransportInfo {
    /// Peer description for logging.
    pub peer: String,
    /// Encryption negotiated.
    pub secure: bool,
    /// Stream compression negotiated.
    pub compressed: bool,
}

/// Inbound half of an established transport.
#[async_trait]
pub trait PacketReader: Send {
    /// Read the next packet. `Ok(None)` means the peer closed the stream.
    async fn read_packet(&mut self) -> Result<Option<Packet>, TransportError>;
}

/// Outbound half of an established transport.
#[async_trait]
pub trait PacketWriter: Send {
    async fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Flush and shut down the outbound side.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An established transport, split for concurrent use.
pub struct Transport {
    pub reader: Box<dyn PacketReader>,
    pub writer: Box<dyn PacketWriter>,
    pub info: TransportInfo,
}

/// Strategy for establishing transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Transport, TransportError>;
}
